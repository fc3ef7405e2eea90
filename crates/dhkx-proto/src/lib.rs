//! dhkx wire protocol
//!
//! Request/response payloads exchanged between the key-exchange client and its
//! peer. Every remote call is one request envelope answered by one response
//! envelope.
//!
//! # Envelope
//!
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ method: u8 │ CBOR-encoded inner payload   │
//! └────────────┴──────────────────────────────┘
//! ```
//!
//! The method byte identifies the payload type, so the CBOR body carries no
//! variant tag. Envelopes larger than [`MAX_MESSAGE_SIZE`] are rejected before
//! any CBOR parsing happens.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod method;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use method::Method;
pub use payloads::{
    EncryptedMessage, ErrorReply, PingPong, PublicKeyMessage, Request, Response, SendResult,
};

/// ALPN protocol identifier negotiated during the QUIC/TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"dhkx";

/// Upper bound on an encoded envelope (method byte included).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
