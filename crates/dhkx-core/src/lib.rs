//! dhkx session lifecycle
//!
//! Everything between "configuration loaded" and "ciphertext delivered":
//! domain parameters, the connection to the peer, and the coordinator that
//! runs key-exchange cycles over it. No sockets, clocks or entropy are used
//! directly; they come in through [`Connector`] and [`Environment`], so the
//! same code runs in production and in deterministic simulation.
//!
//! # Cycle
//!
//! ```text
//! Ready ─► generate KeyPair ─► ExchangePublicKey(N) ─► validate peer key
//!       ─► SharedSecret ─► SessionKey ─► encrypt ─► SendEncryptedMessage(N)
//!       ─► N += 1 ─► pause ─► Ready
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod exchange;
pub mod params;

pub use channel::{Connector, Endpoint, RpcChannel, TlsSettings};
pub use config::{ClientConfig, DhConfig, ExchangeConfig, ServerConfig};
pub use connection::{ConnectionManager, ConnectionSettings, LinkEvent, PROBE_MESSAGE};
pub use env::{EnvRng, Environment};
pub use error::{ConfigError, ConnectError, CoordinatorError, ExchangeError, RpcError};
pub use exchange::{
    CycleOutcome, CycleReport, ExchangeCoordinator, ExchangeState, INITIAL_SEQUENCE,
    TransitionObserver,
};
pub use params::{ParameterProvider, ParameterSource};
