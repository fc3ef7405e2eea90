//! dhkx Cryptographic Primitives
//!
//! Finite-field Diffie-Hellman over a configured prime group, plus the
//! symmetric layer keyed by the agreed secret. Pure functions: callers provide
//! the randomness source, so tests can run with seeded generators.
//!
//! # Key Lifecycle
//!
//! Every exchange cycle starts from nothing and ends with nothing. A fresh
//! ephemeral key pair is generated, combined with the peer's public key, and
//! the resulting secret is reduced to a single-use message key.
//!
//! ```text
//! DomainParameters (p, g, bits)
//!        │
//!        ▼
//! KeyPair: x = random prime, X = g^x mod p
//!        │  ◄── peer public key Y (range-checked)
//!        ▼
//! SharedSecret: Y^x mod p
//!        │
//!        ▼
//! SHA-256 → SessionKey (32 bytes)
//!        │
//!        ▼
//! XChaCha20-Poly1305 → hex ciphertext
//! ```
//!
//! # Security
//!
//! Key hygiene:
//! - `KeyPair`, `SharedSecret` and `SessionKey` overwrite their contents on
//!   drop, on every exit path (including task cancellation)
//! - None of them implement `Serialize`; `Debug` output is redacted
//!
//! Peer input:
//! - Peer public keys outside `[2, p - 2]` are rejected before use, closing
//!   the trivial small-subgroup confinement values (0, 1, p - 1)
//!
//! Authenticity:
//! - Each session key encrypts exactly one message, so the nonce is derived
//!   from the sequence number and encryption is deterministic
//! - A wrong key, wrong sequence or modified ciphertext fails authentication
//!
//! Not provided: constant-time big-integer arithmetic and peer identity
//! authentication.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod dh;
mod error;
pub mod kdf;
pub mod prime;
mod wipe;

pub use cipher::{decrypt, encrypt};
pub use dh::{DomainParameters, KeyPair, SharedSecret, mod_pow, validate_peer_public_key};
pub use error::{CipherError, DhError};
pub use kdf::{SESSION_KEY_SIZE, SessionKey, derive_session_key};
pub use num_bigint::BigUint;
pub use prime::{MILLER_RABIN_ROUNDS, generate_prime, is_probable_prime};
