//! Error types for key agreement and message encryption.

use thiserror::Error;

/// Errors from domain parameter validation, key generation and agreement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DhError {
    /// Domain parameters violate the group invariants
    #[error("invalid domain parameters: {reason}")]
    InvalidParameters {
        /// Which invariant failed
        reason: String,
    },

    /// Requested private key size cannot hold a prime
    #[error("invalid key size: {bits} bits (minimum 2)")]
    InvalidKeySize {
        /// Requested size
        bits: u32,
    },

    /// No prime candidate passed within the attempt budget
    ///
    /// Practically only reachable with a broken randomness source.
    #[error("no prime found after {attempts} candidates")]
    Randomness {
        /// Candidates tried
        attempts: u32,
    },

    /// Peer public key is outside `[2, modulus - 2]`
    #[error("invalid peer public key: {reason}")]
    InvalidPeerKey {
        /// Which bound was violated
        reason: &'static str,
    },
}

/// Errors from decrypting a peer-bound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Ciphertext is not valid hex
    #[error("ciphertext is not hex: {0}")]
    Encoding(String),

    /// Ciphertext is shorter than nonce plus tag
    #[error("ciphertext truncated: {len} bytes")]
    Truncated {
        /// Decoded length
        len: usize,
    },

    /// Nonce does not belong to the expected exchange cycle
    #[error("nonce does not match sequence {expected}")]
    NonceMismatch {
        /// Sequence the caller expected
        expected: u64,
    },

    /// Authentication tag or key is wrong
    #[error("authentication failed")]
    Authentication,
}
