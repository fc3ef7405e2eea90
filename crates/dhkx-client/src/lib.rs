//! dhkx client
//!
//! Production wiring of the session lifecycle: QUIC channels to the peer,
//! OS time and entropy, and the startup loop that waits for a usable
//! configuration before exchanging keys.
//!
//! # Components
//!
//! - [`QuicConnector`]: dials the peer, TLS 1.3 with ALPN `dhkx`
//! - [`SystemEnv`]: wall-clock time and getrandom entropy
//! - [`run`]: configuration retry, then the coordinator until shutdown

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod app;
mod error;
pub mod system_env;
pub mod transport;

pub use app::{CONFIG_RETRY_INTERVAL, ClientOptions, Exit, load_until_valid, run};
pub use error::ClientError;
pub use system_env::SystemEnv;
pub use transport::{DEFAULT_HANDSHAKE_TIMEOUT, QuicChannel, QuicConnector};
