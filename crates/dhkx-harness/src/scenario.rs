//! Wiring for one simulated client against one simulated peer.

use std::sync::Arc;

use dhkx_core::{
    ConnectionManager, ConnectionSettings, CycleReport, Endpoint, ExchangeConfig,
    ExchangeCoordinator, ParameterProvider, ParameterSource, TlsSettings,
};
use dhkx_crypto::DomainParameters;

use crate::{RunSnapshot, SimConnector, SimEnv, SimNetwork, TransitionLog};

/// Coordinator type every scenario drives.
pub type SimCoordinator = ExchangeCoordinator<SimConnector, SimEnv>;

/// Network, environment and transition log for one run.
pub struct Scenario {
    /// Simulated network and peer
    pub network: SimNetwork,
    /// Client environment
    pub env: SimEnv,
    /// Coordinator transitions
    pub log: TransitionLog,
    /// Timing and payload for the client
    pub exchange: ExchangeConfig,
    params: Arc<DomainParameters>,
}

impl Scenario {
    /// Default parameters and timings; client and peer seeded from `seed`.
    ///
    /// # Errors
    ///
    /// - `ConfigError` if the compiled-in parameters fail validation
    pub fn new(seed: u64) -> Result<Self, dhkx_core::ConfigError> {
        let params = ParameterProvider::load(ParameterSource::Defaults)?;
        Ok(Self::with_params(params, seed))
    }

    /// Scenario over custom parameters.
    pub fn with_params(params: Arc<DomainParameters>, seed: u64) -> Self {
        Self {
            network: SimNetwork::new(Arc::clone(&params), seed.wrapping_add(1)),
            env: SimEnv::with_seed(seed),
            log: TransitionLog::new(),
            exchange: ExchangeConfig::default(),
            params,
        }
    }

    /// Coordinator dialing this scenario's network, reporting to its log.
    pub fn coordinator(&self) -> SimCoordinator {
        let settings = ConnectionSettings::new(
            Endpoint { host: "peer.sim".to_string(), port: 4433 },
            TlsSettings::Disabled,
            &self.exchange,
        );
        let connection =
            ConnectionManager::new(self.network.connector(), self.env.clone(), settings);

        ExchangeCoordinator::new(
            &self.exchange,
            Arc::clone(&self.params),
            connection,
            self.env.clone(),
        )
        .with_observer(self.log.clone())
    }

    /// Snapshot of the run for invariant checks.
    pub fn snapshot(&self, reports: &[CycleReport]) -> RunSnapshot {
        RunSnapshot::capture(reports, &self.network, &self.log)
    }
}
