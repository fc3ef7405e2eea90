//! Client error types.

use dhkx_core::CoordinatorError;
use thiserror::Error;

/// Errors that end the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The coordinator stopped on an unrecoverable error
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}
