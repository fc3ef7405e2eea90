//! Error types for configuration, connections, RPC calls and exchange cycles.
//!
//! Only [`CoordinatorError`] ever leaves the coordinator loop. Everything else
//! is absorbed into a cycle outcome or a reconnect attempt.

use std::{path::PathBuf, time::Duration};

use dhkx_crypto::DhError;
use dhkx_proto::ProtocolError;
use thiserror::Error;

/// Configuration could not be loaded or is malformed.
///
/// Startup retries these until the configuration becomes valid.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was tried
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Document is not valid JSON for the expected schema
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A numeric field is not a decimal integer
    #[error("{field} is not a decimal integer: {value:?}")]
    InvalidNumber {
        /// Field name as written in the document
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Key size is zero, negative, or too large
    #[error("key size must be positive, got {0}")]
    InvalidKeySize(i64),

    /// Generator is not strictly between 1 and the modulus
    #[error("generator {0} is not in (1, modulus)")]
    InvalidGenerator(String),

    /// Remaining group invariants (modulus too small)
    #[error(transparent)]
    InvalidParameters(#[from] DhError),
}

/// Failure to establish a channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// TLS credentials could not be loaded
    ///
    /// Fatal: the client must not fall back to an unauthenticated channel
    /// when its configuration asks for TLS.
    #[error("failed to load TLS credentials: {0}")]
    Credentials(String),

    /// Endpoint could not be resolved or parsed
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Peer did not accept the connection
    #[error("peer unreachable: {0}")]
    Unreachable(String),
}

impl ConnectError {
    /// Whether this error must stop the client instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Credentials(_))
    }
}

/// Failure of a single remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Deadline elapsed before the reply arrived
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Call that timed out
        operation: &'static str,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Channel broke; the connection must be re-established
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// No channel is established
    #[error("not connected")]
    NotConnected,

    /// Peer answered with an error reply
    #[error("peer error {code}: {message}")]
    Remote {
        /// Peer error code
        code: u16,
        /// Peer detail
        message: String,
    },

    /// Reply could not be decoded or did not match the request
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RpcError {
    /// Whether the channel is unusable after this error.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::NotConnected)
    }
}

impl From<ProtocolError> for RpcError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Failure of the public-key exchange; aborts the cycle before encryption.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Exchange call failed
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Key generation failed or the peer key was rejected
    #[error(transparent)]
    Crypto(#[from] DhError),

    /// Peer answered for a different cycle
    #[error("peer replied for sequence {actual}, expected {expected}")]
    SequenceMismatch {
        /// Sequence we sent
        expected: i64,
        /// Sequence the peer returned
        actual: i64,
    },
}

impl ExchangeError {
    /// Whether the channel is unusable after this error.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Rpc(err) if err.is_connection_lost())
    }
}

/// Errors that stop the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Connecting failed in a way retrying cannot fix
    #[error("fatal connection error: {0}")]
    Fatal(ConnectError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_credentials_are_fatal() {
        assert!(ConnectError::Credentials("bad pem".into()).is_fatal());
        assert!(!ConnectError::InvalidEndpoint("x".into()).is_fatal());
        assert!(!ConnectError::Unreachable("refused".into()).is_fatal());
    }

    #[test]
    fn connection_lost_classification() {
        assert!(RpcError::ConnectionLost("reset".into()).is_connection_lost());
        assert!(RpcError::NotConnected.is_connection_lost());
        assert!(
            !RpcError::Timeout { operation: "ping", after: Duration::from_secs(10) }
                .is_connection_lost()
        );
        assert!(!RpcError::Remote { code: 1, message: "no".into() }.is_connection_lost());

        assert!(ExchangeError::Rpc(RpcError::NotConnected).is_connection_lost());
        assert!(
            !ExchangeError::SequenceMismatch { expected: 1, actual: 2 }.is_connection_lost()
        );
    }
}
