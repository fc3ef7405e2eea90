//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Envelope contained no bytes at all
    #[error("empty envelope")]
    Empty,

    /// Method byte does not name a known call
    #[error("unknown method {0:#04x}")]
    UnknownMethod(u8),

    /// Method is valid but not allowed in this direction
    #[error("method {method:?} is not a {direction}")]
    WrongDirection {
        /// Method found in the envelope
        method: crate::Method,
        /// Expected direction ("request" or "response")
        direction: &'static str,
    },

    /// Envelope exceeds [`crate::MAX_MESSAGE_SIZE`]
    #[error("message too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// CBOR serialization failed
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),
}
