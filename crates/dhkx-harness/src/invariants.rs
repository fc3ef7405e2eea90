//! Invariant checks over a finished simulation run.
//!
//! A run is summarized in a [`RunSnapshot`]: the cycle reports the client
//! produced, the calls that crossed the simulated network, the messages the
//! peer decrypted and the coordinator's transitions. Invariants state what
//! must hold for any fault schedule, not for one scenario.

use std::{collections::BTreeSet, fmt};

use dhkx_core::{CycleOutcome, CycleReport, ExchangeState, INITIAL_SEQUENCE};
use dhkx_proto::Method;

use crate::{SimNetwork, TransitionLog, sim_peer::Delivery};

/// Invariant identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvariantKind {
    /// Sequences run 1, 2, 3, ... with no gap or repeat
    SequenceContiguity,
    /// Exactly one send per cycle whose exchange succeeded
    SendFollowsExchange,
    /// Peer deliveries are exactly the delivered cycles
    DeliveriesMatchReports,
    /// Transitions chain and follow the state diagram
    LegalTransitions,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Violated invariant
    pub invariant: InvariantKind,
    /// What went wrong
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Observable outcome of a run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// Reports of every cycle, in order
    pub reports: Vec<CycleReport>,
    /// Calls seen by the network, in order
    pub calls: Vec<Method>,
    /// Messages the peer decrypted
    pub deliveries: Vec<Delivery>,
    /// Coordinator transitions
    pub transitions: Vec<(ExchangeState, ExchangeState)>,
}

impl RunSnapshot {
    /// Capture the network and transition log after `reports` were produced.
    pub fn capture(reports: &[CycleReport], network: &SimNetwork, log: &TransitionLog) -> Self {
        Self {
            reports: reports.to_vec(),
            calls: network.calls(),
            deliveries: network.deliveries(),
            transitions: log.entries(),
        }
    }
}

/// Property that must hold for every run.
pub trait Invariant: Send + Sync {
    /// Identifier for reporting.
    fn kind(&self) -> InvariantKind;

    /// Check the invariant against a run.
    fn check(&self, run: &RunSnapshot) -> InvariantResult;
}

/// See [`InvariantKind::SequenceContiguity`].
pub struct SequenceContiguity;

impl Invariant for SequenceContiguity {
    fn kind(&self) -> InvariantKind {
        InvariantKind::SequenceContiguity
    }

    fn check(&self, run: &RunSnapshot) -> InvariantResult {
        for (expected, report) in (INITIAL_SEQUENCE..).zip(&run.reports) {
            if report.sequence != expected {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!("expected sequence {expected}, cycle used {}", report.sequence),
                });
            }
        }
        Ok(())
    }
}

/// See [`InvariantKind::SendFollowsExchange`].
pub struct SendFollowsExchange;

impl Invariant for SendFollowsExchange {
    fn kind(&self) -> InvariantKind {
        InvariantKind::SendFollowsExchange
    }

    fn check(&self, run: &RunSnapshot) -> InvariantResult {
        let exchanged = run
            .reports
            .iter()
            .filter(|r| !matches!(r.outcome, CycleOutcome::ExchangeFailed(_)))
            .count();
        let sent = run.calls.iter().filter(|&&m| m == Method::SendEncryptedMessage).count();

        if sent != exchanged {
            return Err(Violation {
                invariant: self.kind(),
                message: format!("{exchanged} successful exchanges but {sent} sends"),
            });
        }

        let exchanges = run.calls.iter().filter(|&&m| m == Method::ExchangePublicKey).count();
        if exchanges < run.reports.len() {
            return Err(Violation {
                invariant: self.kind(),
                message: format!("{} cycles but only {exchanges} exchanges", run.reports.len()),
            });
        }

        Ok(())
    }
}

/// See [`InvariantKind::DeliveriesMatchReports`].
pub struct DeliveriesMatchReports;

impl Invariant for DeliveriesMatchReports {
    fn kind(&self) -> InvariantKind {
        InvariantKind::DeliveriesMatchReports
    }

    fn check(&self, run: &RunSnapshot) -> InvariantResult {
        let delivered: BTreeSet<i64> = run
            .reports
            .iter()
            .filter(|r| r.outcome == CycleOutcome::Delivered)
            .map(|r| r.sequence as i64)
            .collect();
        let received: BTreeSet<i64> = run.deliveries.iter().map(|d| d.sequence).collect();

        if delivered != received || received.len() != run.deliveries.len() {
            return Err(Violation {
                invariant: self.kind(),
                message: format!("client delivered {delivered:?}, peer decrypted {received:?}"),
            });
        }
        Ok(())
    }
}

/// See [`InvariantKind::LegalTransitions`].
pub struct LegalTransitions;

impl LegalTransitions {
    fn allowed(from: ExchangeState, to: ExchangeState) -> bool {
        use ExchangeState::{
            Connecting, Disconnected, Encrypting, Exchanging, Probing, Ready, Sending,
        };

        matches!(
            (from, to),
            (Disconnected, Connecting)
                | (Connecting, Probing)
                | (Probing, Ready)
                | (Ready, Exchanging)
                | (Exchanging, Encrypting | Ready)
                | (Encrypting, Sending)
                | (Sending, Ready)
        ) || (to == Disconnected && from != Disconnected)
    }
}

impl Invariant for LegalTransitions {
    fn kind(&self) -> InvariantKind {
        InvariantKind::LegalTransitions
    }

    fn check(&self, run: &RunSnapshot) -> InvariantResult {
        if let Some(&(first, _)) = run.transitions.first() {
            if first != ExchangeState::Disconnected {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!("run started in {first:?}"),
                });
            }
        }

        for window in run.transitions.windows(2) {
            let ((_, reached), (next_from, _)) = (window[0], window[1]);
            if reached != next_from {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!("reached {reached:?} but next transition left {next_from:?}"),
                });
            }
        }

        match run.transitions.iter().find(|&&(from, to)| !Self::allowed(from, to)) {
            Some((from, to)) => Err(Violation {
                invariant: self.kind(),
                message: format!("illegal transition {from:?} -> {to:?}"),
            }),
            None => Ok(()),
        }
    }
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every invariant in this module.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(SequenceContiguity);
        registry.add(SendFollowsExchange);
        registry.add(DeliveriesMatchReports);
        registry.add(LegalTransitions);
        registry
    }

    /// Add an invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, returning every violation.
    pub fn check_all(&self, run: &RunSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(run).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, run: &RunSnapshot, context: &str) {
        if let Err(violations) = self.check_all(run) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dhkx_core::{ExchangeError, RpcError};

    use super::*;

    fn report(sequence: u64, outcome: CycleOutcome) -> CycleReport {
        CycleReport {
            sequence,
            outcome,
            exchange_elapsed: Duration::ZERO,
            total_elapsed: Duration::ZERO,
        }
    }

    fn run(reports: Vec<CycleReport>, calls: Vec<Method>, deliveries: Vec<i64>) -> RunSnapshot {
        RunSnapshot {
            reports,
            calls,
            deliveries: deliveries
                .into_iter()
                .map(|sequence| Delivery { sequence, plaintext: Vec::new() })
                .collect(),
            transitions: Vec::new(),
        }
    }

    #[test]
    fn standard_registry_has_every_invariant() {
        assert_eq!(InvariantRegistry::standard().len(), 4);
        assert!(InvariantRegistry::new().is_empty());
    }

    #[test]
    fn clean_run_passes() {
        let snapshot = run(
            vec![
                report(1, CycleOutcome::Delivered),
                report(2, CycleOutcome::ExchangeFailed(ExchangeError::Rpc(RpcError::NotConnected))),
            ],
            vec![Method::ExchangePublicKey, Method::SendEncryptedMessage, Method::ExchangePublicKey],
            vec![1],
        );

        assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
    }

    #[test]
    fn skipped_sequence_is_violation() {
        let reports = vec![report(1, CycleOutcome::Delivered), report(3, CycleOutcome::Delivered)];
        let snapshot = run(reports, vec![], vec![]);

        let err = SequenceContiguity.check(&snapshot).unwrap_err();
        assert_eq!(err.invariant, InvariantKind::SequenceContiguity);
    }

    #[test]
    fn send_after_failed_exchange_is_violation() {
        let snapshot = run(
            vec![report(1, CycleOutcome::ExchangeFailed(ExchangeError::SequenceMismatch {
                expected: 1,
                actual: 2,
            }))],
            vec![Method::ExchangePublicKey, Method::SendEncryptedMessage],
            vec![],
        );

        assert!(SendFollowsExchange.check(&snapshot).is_err());
    }

    #[test]
    fn undelivered_decryption_is_violation() {
        let snapshot = run(
            vec![report(1, CycleOutcome::Rejected { result_code: 1 })],
            vec![Method::ExchangePublicKey, Method::SendEncryptedMessage],
            vec![1],
        );

        assert!(DeliveriesMatchReports.check(&snapshot).is_err());
    }

    #[test]
    fn transitions_must_chain_and_be_legal() {
        use ExchangeState::{Connecting, Disconnected, Encrypting, Probing, Ready};

        let mut snapshot = run(vec![], vec![], vec![]);
        snapshot.transitions = vec![(Disconnected, Connecting), (Probing, Ready)];
        assert!(LegalTransitions.check(&snapshot).is_err());

        snapshot.transitions = vec![(Disconnected, Connecting), (Connecting, Encrypting)];
        assert!(LegalTransitions.check(&snapshot).is_err());

        snapshot.transitions = vec![
            (Disconnected, Connecting),
            (Connecting, Probing),
            (Probing, Disconnected),
            (Disconnected, Connecting),
        ];
        assert!(LegalTransitions.check(&snapshot).is_ok());
    }
}
