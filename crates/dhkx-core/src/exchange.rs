//! Exchange coordinator.
//!
//! Drives one client through repeated key-exchange cycles. Each cycle uses
//! a fresh ephemeral key pair and a sequence number, and the session key
//! encrypts exactly one message.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Probing ──► Ready ◄──────────────┐
//!      ▲               │             │          │                  │
//!      └───────────────┴─────────────┘          ▼                  │
//!        (connect/probe failed, backoff)    Exchanging ──abort────►┤
//!                                               │                  │
//!                                               ▼                  │
//!                                           Encrypting ──► Sending ┘
//! ```
//!
//! Any connection-lost error during a cycle tears the channel down and
//! returns to `Disconnected`.
//!
//! # Invariants
//!
//! - The sequence number starts at 1 and increments by exactly 1 for every
//!   cycle that starts, whatever its outcome
//! - A failed exchange aborts the cycle: nothing is encrypted or sent
//! - Key material lives only inside one cycle; every exit path (including
//!   cancellation of the future) drops and wipes it

use std::{future::Future, sync::Arc, time::Duration};

use dhkx_crypto::{DomainParameters, KeyPair, SessionKey, derive_session_key, encrypt};
use dhkx_proto::{EncryptedMessage, PublicKeyMessage, SendResult};

use crate::{
    channel::Connector,
    config::ExchangeConfig,
    connection::{ConnectionManager, LinkEvent},
    env::{EnvRng, Environment},
    error::{CoordinatorError, ExchangeError, RpcError},
};

/// First sequence number used.
pub const INITIAL_SEQUENCE: u64 = 1;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// No channel
    Disconnected,
    /// Dialing the peer
    Connecting,
    /// Waiting for the liveness probe
    Probing,
    /// Connected, between cycles
    Ready,
    /// Public keys in flight
    Exchanging,
    /// Session key derived, encrypting the payload
    Encrypting,
    /// Ciphertext in flight
    Sending,
}

impl From<LinkEvent> for ExchangeState {
    fn from(event: LinkEvent) -> Self {
        match event {
            LinkEvent::Connecting => Self::Connecting,
            LinkEvent::Probing => Self::Probing,
            LinkEvent::Up => Self::Ready,
            LinkEvent::Down => Self::Disconnected,
        }
    }
}

/// Receives every state transition, in order.
pub trait TransitionObserver: Send {
    /// Called after the coordinator moved from `from` to `to`.
    fn on_transition(&mut self, from: ExchangeState, to: ExchangeState);
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Peer acknowledged the message with result code 0
    Delivered,
    /// Peer acknowledged the message with a non-zero result code
    Rejected {
        /// Peer result code
        result_code: i32,
    },
    /// Message was sent but the acknowledgement failed
    SendFailed(RpcError),
    /// Exchange failed; nothing was sent
    ExchangeFailed(ExchangeError),
}

impl CycleOutcome {
    /// Whether the cycle ended with a broken channel.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::SendFailed(err) => err.is_connection_lost(),
            Self::ExchangeFailed(err) => err.is_connection_lost(),
            Self::Delivered | Self::Rejected { .. } => false,
        }
    }
}

/// Result and timings of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Sequence number the cycle used
    pub sequence: u64,
    /// How the cycle ended
    pub outcome: CycleOutcome,
    /// Time from cycle start until the exchange finished or failed
    pub exchange_elapsed: Duration,
    /// Time from cycle start until the acknowledgement or abort
    pub total_elapsed: Duration,
}

/// Cycle timing and payload, resolved from [`ExchangeConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct CycleSettings {
    exchange_timeout: Duration,
    send_timeout: Duration,
    cycle_interval: Duration,
    reconnect_backoff: Duration,
    payload: Vec<u8>,
}

impl From<&ExchangeConfig> for CycleSettings {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            exchange_timeout: config.exchange_timeout(),
            send_timeout: config.send_timeout(),
            cycle_interval: config.cycle_interval(),
            reconnect_backoff: config.reconnect_backoff(),
            payload: config.payload.as_bytes().to_vec(),
        }
    }
}

/// Current state plus the optional observer it is reported to.
struct StateTracker {
    state: ExchangeState,
    observer: Option<Box<dyn TransitionObserver>>,
}

impl StateTracker {
    fn transition(&mut self, to: ExchangeState) {
        let from = self.state;
        self.state = to;
        tracing::debug!("State {from:?} -> {to:?}");

        if let Some(observer) = self.observer.as_mut() {
            observer.on_transition(from, to);
        }
    }
}

/// Runs key-exchange cycles against one peer.
pub struct ExchangeCoordinator<C: Connector, E: Environment> {
    settings: CycleSettings,
    params: Arc<DomainParameters>,
    connection: ConnectionManager<C, E>,
    env: E,
    tracker: StateTracker,
    sequence: u64,
}

impl<C: Connector, E: Environment> ExchangeCoordinator<C, E> {
    /// Create a coordinator in `Disconnected` with sequence 1.
    pub fn new(
        config: &ExchangeConfig,
        params: Arc<DomainParameters>,
        connection: ConnectionManager<C, E>,
        env: E,
    ) -> Self {
        Self {
            settings: CycleSettings::from(config),
            params,
            connection,
            env,
            tracker: StateTracker { state: ExchangeState::Disconnected, observer: None },
            sequence: INITIAL_SEQUENCE,
        }
    }

    /// Report every transition to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: impl TransitionObserver + 'static) -> Self {
        self.tracker.observer = Some(Box::new(observer));
        self
    }

    /// Current state.
    pub fn state(&self) -> ExchangeState {
        self.tracker.state
    }

    /// Sequence number the next cycle will use.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Connect and probe until the peer answers; no-op when already `Ready`.
    ///
    /// Returns the number of failed attempts (each followed by one backoff).
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::Fatal` if TLS credentials cannot be loaded
    pub async fn establish(&mut self) -> Result<u32, CoordinatorError> {
        if self.tracker.state == ExchangeState::Ready {
            return Ok(0);
        }

        let tracker = &mut self.tracker;
        let failed = self
            .connection
            .reconnect_with_backoff(|event| tracker.transition(event.into()))
            .await
            .map_err(CoordinatorError::Fatal)?;

        tracing::info!("Connected to {} after {failed} failed attempt(s)", self.endpoint());
        Ok(failed)
    }

    /// Run one cycle, establishing the connection first if needed.
    ///
    /// The sequence number advances whatever the outcome. A connection-lost
    /// outcome leaves the coordinator `Disconnected`; otherwise it returns to
    /// `Ready`. No pause is taken here; see [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::Fatal` from [`establish`](Self::establish)
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CoordinatorError> {
        self.establish().await?;

        let sequence = self.sequence;
        let started = self.env.now();

        let (outcome, exchange_elapsed) = self.exchange_and_send(sequence, started).await;
        let report = CycleReport {
            sequence,
            outcome,
            exchange_elapsed,
            total_elapsed: self.env.now() - started,
        };

        self.sequence += 1;
        log_report(&report);

        if report.outcome.is_connection_lost() {
            self.connection.teardown();
            self.tracker.transition(ExchangeState::Disconnected);
        } else {
            self.tracker.transition(ExchangeState::Ready);
        }

        Ok(report)
    }

    /// Run cycles forever.
    ///
    /// Pauses the cycle interval after each cycle, or the reconnect backoff
    /// after a lost connection.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::Fatal`; nothing else stops the loop
    pub async fn run(&mut self) -> Result<(), CoordinatorError> {
        loop {
            self.run_cycle().await?;

            let pause = match self.tracker.state {
                ExchangeState::Disconnected => self.settings.reconnect_backoff,
                _ => self.settings.cycle_interval,
            };
            self.env.sleep(pause).await;
        }
    }

    /// Run cycles until `shutdown` completes, then tear down the channel.
    ///
    /// The in-flight cycle is dropped at shutdown, which wipes any key
    /// material it held.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::Fatal` if it occurs before shutdown
    pub async fn run_until(
        &mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), CoordinatorError> {
        let interrupted = tokio::select! {
            result = self.run() => Some(result),
            () = shutdown => None,
        };

        let Some(result) = interrupted else {
            tracing::info!("Shutdown requested at sequence {}", self.sequence);
            self.shutdown();
            return Ok(());
        };

        self.shutdown();
        result
    }

    fn shutdown(&mut self) {
        self.connection.teardown();
        if self.tracker.state != ExchangeState::Disconnected {
            self.tracker.transition(ExchangeState::Disconnected);
        }
    }

    fn endpoint(&self) -> String {
        self.connection.settings().endpoint.to_string()
    }

    /// Exchanging → Encrypting → Sending. Returns the outcome and the time
    /// spent until the exchange finished.
    async fn exchange_and_send(
        &mut self,
        sequence: u64,
        started: E::Instant,
    ) -> (CycleOutcome, Duration) {
        self.tracker.transition(ExchangeState::Exchanging);

        let exchanged = self.exchange(sequence).await;
        let exchange_elapsed = self.env.now() - started;

        let session_key = match exchanged {
            Ok(key) => key,
            Err(err) => return (CycleOutcome::ExchangeFailed(err), exchange_elapsed),
        };

        self.tracker.transition(ExchangeState::Encrypting);
        let ciphertext = encrypt(&self.settings.payload, &session_key, sequence);
        drop(session_key);
        tracing::info!("{sequence}. Encrypted data = {ciphertext}");

        self.tracker.transition(ExchangeState::Sending);
        let message = EncryptedMessage { sequence: sequence as i64, ciphertext };
        let outcome = match self
            .connection
            .send_encrypted_message(message, self.settings.send_timeout)
            .await
        {
            Ok(SendResult { result_code: SendResult::OK }) => CycleOutcome::Delivered,
            Ok(SendResult { result_code }) => CycleOutcome::Rejected { result_code },
            Err(err) => CycleOutcome::SendFailed(err),
        };

        (outcome, exchange_elapsed)
    }

    /// Generate a key pair, swap public keys and derive the session key.
    async fn exchange(&mut self, sequence: u64) -> Result<SessionKey, ExchangeError> {
        let params = Arc::clone(&self.params);
        let key_pair = KeyPair::generate(&params, &mut EnvRng::new(&self.env))?;

        let wire_sequence = sequence as i64;
        let offer =
            PublicKeyMessage { sequence: wire_sequence, public_key: key_pair.public_key_bytes() };
        let answer =
            self.connection.exchange_public_key(offer, self.settings.exchange_timeout).await?;

        if answer.sequence != wire_sequence {
            return Err(ExchangeError::SequenceMismatch {
                expected: wire_sequence,
                actual: answer.sequence,
            });
        }

        let secret = key_pair.agree(&answer.public_key)?;
        Ok(derive_session_key(&secret))
    }
}

fn log_report(report: &CycleReport) {
    let sequence = report.sequence;
    let exchange_ms = report.exchange_elapsed.as_millis() as u64;
    let total_ms = report.total_elapsed.as_millis() as u64;

    match &report.outcome {
        CycleOutcome::Delivered => {
            tracing::info!(sequence, exchange_ms, total_ms, "cycle delivered");
        },
        CycleOutcome::Rejected { result_code } => {
            tracing::warn!(sequence, exchange_ms, total_ms, result_code, "peer rejected message");
        },
        CycleOutcome::SendFailed(err) => {
            tracing::warn!(sequence, exchange_ms, total_ms, "send failed: {err}");
        },
        CycleOutcome::ExchangeFailed(err) => {
            tracing::warn!(
                sequence,
                exchange_ms,
                total_ms,
                "exchange failed, cycle aborted: {err}"
            );
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_events_map_to_states() {
        assert_eq!(ExchangeState::from(LinkEvent::Connecting), ExchangeState::Connecting);
        assert_eq!(ExchangeState::from(LinkEvent::Probing), ExchangeState::Probing);
        assert_eq!(ExchangeState::from(LinkEvent::Up), ExchangeState::Ready);
        assert_eq!(ExchangeState::from(LinkEvent::Down), ExchangeState::Disconnected);
    }

    #[test]
    fn outcome_connection_lost_classification() {
        assert!(!CycleOutcome::Delivered.is_connection_lost());
        assert!(!CycleOutcome::Rejected { result_code: 4 }.is_connection_lost());
        assert!(CycleOutcome::SendFailed(RpcError::ConnectionLost("reset".into()))
            .is_connection_lost());
        assert!(!CycleOutcome::SendFailed(RpcError::Timeout {
            operation: "send_encrypted_message",
            after: Duration::from_secs(120)
        })
        .is_connection_lost());
        assert!(CycleOutcome::ExchangeFailed(ExchangeError::Rpc(RpcError::NotConnected))
            .is_connection_lost());
    }

    #[test]
    fn tracker_reports_every_transition() {
        struct Recorder(std::sync::Arc<std::sync::Mutex<Vec<(ExchangeState, ExchangeState)>>>);

        impl TransitionObserver for Recorder {
            fn on_transition(&mut self, from: ExchangeState, to: ExchangeState) {
                self.0.lock().unwrap().push((from, to));
            }
        }

        let log = std::sync::Arc::default();
        let mut tracker = StateTracker {
            state: ExchangeState::Disconnected,
            observer: Some(Box::new(Recorder(std::sync::Arc::clone(&log)))),
        };

        tracker.transition(ExchangeState::Connecting);
        tracker.transition(ExchangeState::Probing);

        assert_eq!(*log.lock().unwrap(), vec![
            (ExchangeState::Disconnected, ExchangeState::Connecting),
            (ExchangeState::Connecting, ExchangeState::Probing),
        ]);
        assert_eq!(tracker.state, ExchangeState::Probing);
    }
}
