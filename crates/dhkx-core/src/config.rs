//! Client configuration document.
//!
//! JSON with camelCase keys. `dhConfig` and `exchange` are optional; missing
//! sections fall back to compiled-in defaults.
//!
//! ```json
//! {
//!   "appName": "dh-client",
//!   "gRPCServerConfig": {
//!     "tlsEnable": true,
//!     "url": "peer.example",
//!     "port": 4433,
//!     "certFile": "/config/ca.pem"
//!   },
//!   "dhConfig": { "modulus": "...", "generator": "7", "keySize": 256 },
//!   "exchange": { "probeTimeoutSecs": 10, "reconnectBackoffSecs": 3 }
//! }
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    channel::{Endpoint, TlsSettings},
    error::ConfigError,
};

/// Complete client configuration. Read-only after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Name reported in logs
    #[serde(default)]
    pub app_name: String,

    /// Peer endpoint and TLS settings
    #[serde(rename = "gRPCServerConfig")]
    pub server: ServerConfig,

    /// Domain parameters; compiled-in defaults when absent
    #[serde(default)]
    pub dh_config: Option<DhConfig>,

    /// Timing and payload of the exchange loop
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

/// Peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Verify the peer against `cert_file`
    #[serde(default)]
    pub tls_enable: bool,
    /// Peer host name or address
    pub url: String,
    /// Peer port
    pub port: u16,
    /// PEM trust root, used when TLS is enabled
    #[serde(default)]
    pub cert_file: String,
    /// Accepted for compatibility; the client does not authenticate itself
    #[serde(default)]
    pub key_file: String,
    /// Name expected in the peer certificate; defaults to `url`
    #[serde(default)]
    pub server_name: Option<String>,
}

/// Domain parameters as written in configuration.
///
/// Big integers are decimal strings because JSON numbers cannot carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhConfig {
    /// Prime modulus `p`, decimal
    pub modulus: String,
    /// Generator `g`, decimal
    pub generator: String,
    /// Private key size in bits
    pub key_size: i64,
}

/// Exchange loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExchangeConfig {
    /// Liveness probe deadline
    pub probe_timeout_secs: u64,
    /// Wait after a failed connect/probe or a lost connection
    pub reconnect_backoff_secs: u64,
    /// Public-key exchange deadline
    pub exchange_timeout_secs: u64,
    /// Encrypted message deadline
    pub send_timeout_secs: u64,
    /// Pause between cycles
    pub cycle_interval_secs: u64,
    /// Plaintext encrypted every cycle
    pub payload: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            reconnect_backoff_secs: 3,
            exchange_timeout_secs: 120,
            send_timeout_secs: 120,
            cycle_interval_secs: 1,
            payload: "The quick brown fox jumps over the lazy dog".to_string(),
        }
    }
}

impl ExchangeConfig {
    /// Liveness probe deadline.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Backoff between reconnect attempts.
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    /// Public-key exchange deadline.
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    /// Encrypted message deadline.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Pause between cycles.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

impl ServerConfig {
    /// Dial target.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint { host: self.url.clone(), port: self.port }
    }

    /// Transport security requested by this configuration.
    pub fn tls(&self) -> TlsSettings {
        if self.tls_enable {
            TlsSettings::Enabled {
                ca_cert: self.cert_file.clone().into(),
                server_name: self.server_name.clone().unwrap_or_else(|| self.url.clone()),
            }
        } else {
            TlsSettings::Disabled
        }
    }
}

impl ClientConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Parse` if the JSON is malformed or misses required
    ///   fields
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `primary`, falling back to `fallback` if it cannot be read.
    ///
    /// Each failure is logged. A file that exists but fails to parse is not
    /// skipped in favor of the fallback.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` if neither path is readable (reports the last
    ///   path tried)
    /// - `ConfigError::Parse` if the chosen file is malformed
    pub fn load(primary: &Path, fallback: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, document) = match read(primary) {
            Ok(document) => (primary, document),
            Err(err) => {
                tracing::warn!("{err}");
                let Some(fallback) = fallback else {
                    return Err(err);
                };
                let document = read(fallback).inspect_err(|err| tracing::warn!("{err}"))?;
                (fallback, document)
            },
        };

        tracing::info!("Loaded configuration from {}", path.display());
        let config = Self::from_json(&document)?;
        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        let server = &self.server;
        tracing::info!(
            app = %self.app_name,
            endpoint = %server.endpoint(),
            tls = server.tls_enable,
            cert_file = %server.cert_file,
            key_file = %server.key_file,
            custom_parameters = self.dh_config.is_some(),
            "client configuration"
        );
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })
}
