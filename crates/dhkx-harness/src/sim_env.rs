//! Simulation environment: tokio's virtual clock and a seeded RNG.
//!
//! Tests run under `#[tokio::test(start_paused = true)]`, so sleeps and
//! deadlines complete instantly in wall-clock time while virtual time
//! advances exactly. Every sleep is recorded so tests can count backoffs.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use dhkx_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministic environment for simulation.
///
/// Clones share the RNG stream and the sleep log.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl SimEnv {
    /// Environment with a fixed default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment whose randomness is fully determined by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of sleeps of exactly `duration`.
    pub fn sleeps_of(&self, duration: Duration) -> usize {
        self.sleeps().iter().filter(|&&d| d == duration).count()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
