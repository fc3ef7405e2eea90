//! Deterministic simulation harness for the dhkx client.
//!
//! In-memory implementations of the [`Environment`](dhkx_core::Environment)
//! and [`Connector`](dhkx_core::Connector) seams. Time is tokio's paused
//! clock, randomness is a seeded ChaCha stream, and the peer runs in process,
//! so a scenario replays identically for a given seed.
//!
//! # Fault Injection
//!
//! [`SimNetwork`] queues faults per dial and per call method: unreachable
//! peers, bad credentials, hung or broken calls, error replies, mismatched
//! sequences and invalid peer keys.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold after any run, whatever
//! the fault schedule. Use [`InvariantRegistry::standard()`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_connector;
pub mod sim_env;
pub mod sim_peer;
pub mod trace;

pub use invariants::{
    DeliveriesMatchReports, Invariant, InvariantKind, InvariantRegistry, InvariantResult,
    LegalTransitions, RunSnapshot, SendFollowsExchange, SequenceContiguity, Violation,
};
pub use scenario::{Scenario, SimCoordinator};
pub use sim_connector::{CallFault, DialFault, SimChannel, SimConnector, SimNetwork};
pub use sim_env::SimEnv;
pub use sim_peer::{DECRYPT_FAILED, Delivery, SimPeer};
pub use trace::TransitionLog;
