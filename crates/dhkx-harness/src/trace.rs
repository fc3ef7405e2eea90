//! Recorded state transitions.

use std::{
    fmt::Write as _,
    sync::{Arc, Mutex, PoisonError},
};

use dhkx_core::{ExchangeState, TransitionObserver};

/// [`TransitionObserver`] that records every transition.
///
/// Clones share one log: hand one to the coordinator, keep one to inspect.
#[derive(Clone, Default)]
pub struct TransitionLog {
    entries: Arc<Mutex<Vec<(ExchangeState, ExchangeState)>>>,
}

impl TransitionLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions recorded so far.
    pub fn entries(&self) -> Vec<(ExchangeState, ExchangeState)> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// States visited, starting with the first `from`.
    pub fn states(&self) -> Vec<ExchangeState> {
        let entries = self.entries();
        let mut states: Vec<_> = entries.first().map(|&(from, _)| from).into_iter().collect();
        states.extend(entries.iter().map(|&(_, to)| to));
        states
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// One `From -> To` line per transition.
    pub fn render(&self) -> String {
        self.entries().iter().fold(String::new(), |mut out, (from, to)| {
            let _ = writeln!(out, "{from:?} -> {to:?}");
            out
        })
    }
}

impl TransitionObserver for TransitionLog {
    fn on_transition(&mut self, from: ExchangeState, to: ExchangeState) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).push((from, to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let log = TransitionLog::new();
        let mut observer = log.clone();

        observer.on_transition(ExchangeState::Disconnected, ExchangeState::Connecting);
        observer.on_transition(ExchangeState::Connecting, ExchangeState::Probing);

        assert_eq!(log.states(), vec![
            ExchangeState::Disconnected,
            ExchangeState::Connecting,
            ExchangeState::Probing,
        ]);
        assert_eq!(log.render(), "Disconnected -> Connecting\nConnecting -> Probing\n");

        log.clear();
        assert!(log.entries().is_empty());
        assert!(log.states().is_empty());
    }
}
