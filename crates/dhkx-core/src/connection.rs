//! Connection manager.
//!
//! Owns the single RPC channel to the peer: dialing, the liveness probe,
//! reconnect-with-backoff, per-call deadlines and teardown. A channel is
//! always torn down before a new one is dialed.

use std::{future::Future, time::Duration};

use dhkx_proto::{EncryptedMessage, PublicKeyMessage, SendResult};

use crate::{
    channel::{Connector, Endpoint, RpcChannel, TlsSettings},
    config::{ClientConfig, ExchangeConfig},
    env::Environment,
    error::{ConnectError, RpcError},
};

/// Text carried by the liveness probe.
pub const PROBE_MESSAGE: &str = "PING";

/// Where to connect and how patiently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Peer address
    pub endpoint: Endpoint,
    /// Transport security
    pub tls: TlsSettings,
    /// Liveness probe deadline
    pub probe_timeout: Duration,
    /// Wait after each failed connect or probe
    pub reconnect_backoff: Duration,
}

impl ConnectionSettings {
    /// Settings for the peer named in `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.server.endpoint(), config.server.tls(), &config.exchange)
    }

    /// Settings for `endpoint` with the timing of `exchange`.
    pub fn new(endpoint: Endpoint, tls: TlsSettings, exchange: &ExchangeConfig) -> Self {
        Self {
            endpoint,
            tls,
            probe_timeout: exchange.probe_timeout(),
            reconnect_backoff: exchange.reconnect_backoff(),
        }
    }
}

/// Progress of a reconnect attempt, reported as it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Dialing the peer
    Connecting,
    /// Channel open, probe in flight
    Probing,
    /// Probe answered
    Up,
    /// Connect or probe failed; channel torn down
    Down,
}

/// Owns the channel to the peer.
pub struct ConnectionManager<C: Connector, E: Environment> {
    connector: C,
    env: E,
    settings: ConnectionSettings,
    channel: Option<C::Channel>,
}

impl<C: Connector, E: Environment> ConnectionManager<C, E> {
    /// Create a manager with no channel.
    pub fn new(connector: C, env: E, settings: ConnectionSettings) -> Self {
        Self { connector, env, settings, channel: None }
    }

    /// Connection settings in use.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Whether a channel is currently held.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Tear down any previous channel and dial the peer.
    ///
    /// # Errors
    ///
    /// Whatever the connector reports; see [`ConnectError::is_fatal`].
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.teardown();

        let channel = self.connector.connect(&self.settings.endpoint, &self.settings.tls).await?;
        self.channel = Some(channel);

        tracing::debug!("Channel established to {}", self.settings.endpoint);
        Ok(())
    }

    /// Send a liveness probe under the probe deadline.
    ///
    /// Timeouts and errors yield `false`; they are never raised.
    pub async fn probe(&mut self) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };

        let deadline = self.settings.probe_timeout;
        match with_deadline("ping", deadline, channel.ping(PROBE_MESSAGE)).await {
            Ok(reply) => {
                tracing::info!("Ping answer: {reply}");
                true
            },
            Err(err) => {
                tracing::warn!("Ping failed: {err}");
                false
            },
        }
    }

    /// Connect and probe until the peer answers.
    ///
    /// Every failed attempt tears down the channel and waits the reconnect
    /// backoff exactly once before retrying. Progress is reported through
    /// `on_event`.
    ///
    /// Returns the number of failed attempts before success.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ConnectError`]; no backoff is taken for it.
    pub async fn reconnect_with_backoff(
        &mut self,
        mut on_event: impl FnMut(LinkEvent) + Send,
    ) -> Result<u32, ConnectError> {
        let mut failed_attempts = 0u32;

        loop {
            on_event(LinkEvent::Connecting);

            match self.connect().await {
                Ok(()) => {
                    on_event(LinkEvent::Probing);
                    if self.probe().await {
                        on_event(LinkEvent::Up);
                        return Ok(failed_attempts);
                    }
                },
                Err(err) if err.is_fatal() => {
                    tracing::error!("Connect to {} failed: {err}", self.settings.endpoint);
                    on_event(LinkEvent::Down);
                    return Err(err);
                },
                Err(err) => {
                    tracing::warn!("Connect to {} failed: {err}", self.settings.endpoint);
                },
            }

            self.teardown();
            on_event(LinkEvent::Down);
            failed_attempts += 1;

            tracing::info!(
                "Retrying in {:?} (attempt {})",
                self.settings.reconnect_backoff,
                failed_attempts + 1
            );
            self.env.sleep(self.settings.reconnect_backoff).await;
        }
    }

    /// Exchange public keys under `deadline`.
    ///
    /// # Errors
    ///
    /// - `RpcError::NotConnected` without a channel
    /// - `RpcError::Timeout` if the deadline elapses
    /// - whatever the channel reports
    pub async fn exchange_public_key(
        &mut self,
        offer: PublicKeyMessage,
        deadline: Duration,
    ) -> Result<PublicKeyMessage, RpcError> {
        let channel = self.channel.as_mut().ok_or(RpcError::NotConnected)?;
        with_deadline("exchange_public_key", deadline, channel.exchange_public_key(offer)).await
    }

    /// Deliver a ciphertext under `deadline`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`exchange_public_key`](Self::exchange_public_key).
    pub async fn send_encrypted_message(
        &mut self,
        message: EncryptedMessage,
        deadline: Duration,
    ) -> Result<SendResult, RpcError> {
        let channel = self.channel.as_mut().ok_or(RpcError::NotConnected)?;
        with_deadline("send_encrypted_message", deadline, channel.send_encrypted_message(message))
            .await
    }

    /// Close and drop the channel, if any.
    pub fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            tracing::debug!("Channel to {} closed", self.settings.endpoint);
        }
    }
}

impl<C: Connector, E: Environment> Drop for ConnectionManager<C, E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Run a remote call with a deadline. An elapsed deadline is
/// `RpcError::Timeout`, never a panic or a hang.
pub async fn with_deadline<T>(
    operation: &'static str,
    deadline: Duration,
    call: impl Future<Output = Result<T, RpcError>>,
) -> Result<T, RpcError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout { operation, after: deadline }),
    }
}
