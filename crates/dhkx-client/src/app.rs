//! Client startup and main loop.
//!
//! Startup retries until both the configuration document and the domain
//! parameters it selects are valid, then hands over to the exchange
//! coordinator. Shutdown can arrive at any point and always wins.

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use dhkx_core::{
    ClientConfig, ConnectionManager, ConnectionSettings, CycleOutcome, Environment,
    ExchangeCoordinator, ParameterProvider,
};
use dhkx_crypto::DomainParameters;

use crate::{error::ClientError, system_env::SystemEnv, transport::QuicConnector};

/// Pause between attempts to load a broken configuration.
pub const CONFIG_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Startup options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Configuration document tried first
    pub config_path: PathBuf,
    /// Tried when `config_path` cannot be read
    pub fallback_path: Option<PathBuf>,
    /// Run a single cycle and stop
    pub once: bool,
}

/// How the client stopped, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Shutdown was requested
    Interrupted,
    /// The single cycle requested with `once` finished
    Completed(CycleOutcome),
}

/// Run the client until `shutdown` completes.
///
/// # Errors
///
/// - `ClientError::Coordinator` if the coordinator hits a fatal error
pub async fn run(
    options: &ClientOptions,
    shutdown: impl Future<Output = ()>,
) -> Result<Exit, ClientError> {
    let env = SystemEnv::new();
    tokio::pin!(shutdown);

    let loaded = tokio::select! {
        loaded = load_until_valid(options, &env) => Some(loaded),
        () = &mut shutdown => None,
    };
    let Some((config, params)) = loaded else {
        tracing::info!("Shutdown requested before configuration was loaded");
        return Ok(Exit::Interrupted);
    };

    let connector = QuicConnector::new(config.exchange.probe_timeout());
    let connection =
        ConnectionManager::new(connector, env.clone(), ConnectionSettings::from_config(&config));
    let mut coordinator = ExchangeCoordinator::new(&config.exchange, params, connection, env);

    tracing::info!("{} starting key exchange with {}", config.app_name, config.server.endpoint());

    if options.once {
        let report = tokio::select! {
            report = coordinator.run_cycle() => report?,
            () = &mut shutdown => return Ok(Exit::Interrupted),
        };
        return Ok(Exit::Completed(report.outcome));
    }

    coordinator.run_until(shutdown).await?;
    Ok(Exit::Interrupted)
}

/// Load configuration and parameters, retrying every
/// [`CONFIG_RETRY_INTERVAL`] until both are valid.
pub async fn load_until_valid<E: Environment>(
    options: &ClientOptions,
    env: &E,
) -> (ClientConfig, Arc<DomainParameters>) {
    let mut attempt = 1u32;

    loop {
        let loaded = ClientConfig::load(&options.config_path, options.fallback_path.as_deref())
            .and_then(|config| {
                let params = ParameterProvider::load(config.dh_config.as_ref().into())?;
                Ok((config, params))
            });

        match loaded {
            Ok(loaded) => return loaded,
            Err(err) => {
                tracing::error!(
                    "Configuration unusable (attempt {attempt}): {err}; retrying in {:?}",
                    CONFIG_RETRY_INTERVAL
                );
            },
        }

        attempt += 1;
        env.sleep(CONFIG_RETRY_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use dhkx_harness::SimEnv;
    use tempfile::NamedTempFile;

    use super::*;

    const VALID: &str = r#"{
        "appName": "dh-client",
        "gRPCServerConfig": { "tlsEnable": false, "url": "127.0.0.1", "port": 4433 }
    }"#;

    fn options(path: PathBuf) -> ClientOptions {
        ClientOptions { config_path: path, fallback_path: None, once: false }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_configuration_becomes_valid() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "appName": "#).unwrap();
        let env = SimEnv::new();
        let options = options(file.path().to_path_buf());

        let fix = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            std::fs::write(file.path(), VALID).unwrap();
        };
        let ((config, params), ()) = tokio::join!(load_until_valid(&options, &env), fix);

        assert_eq!(config.app_name, "dh-client");
        assert_eq!(params.key_size_bits(), 256);
        assert_eq!(env.sleeps_of(CONFIG_RETRY_INTERVAL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_parameters_are_retried_too() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "gRPCServerConfig": { "tlsEnable": false, "url": "127.0.0.1", "port": 4433 },
                "dhConfig": { "modulus": "23", "generator": "1", "keySize": 4 }
            }"#,
        )
        .unwrap();
        let env = SimEnv::new();
        let options = options(file.path().to_path_buf());

        let fix = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            std::fs::write(file.path(), VALID).unwrap();
        };
        let ((config, _), ()) = tokio::join!(load_until_valid(&options, &env), fix);

        assert_eq!(config.dh_config, None);
        assert_eq!(env.sleeps_of(CONFIG_RETRY_INTERVAL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_configuration_is_interrupted() {
        let options = options(PathBuf::from("/nonexistent/config-adapter.json"));

        let exit = run(&options, tokio::time::sleep(Duration::from_secs(10))).await.unwrap();

        assert_eq!(exit, Exit::Interrupted);
    }
}
