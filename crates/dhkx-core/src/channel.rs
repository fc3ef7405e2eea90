//! RPC channel seam.
//!
//! The coordinator never touches sockets. A [`Connector`] dials the peer and
//! hands back an [`RpcChannel`]; the channel carries one [`Request`] and
//! returns one [`Response`] per call. Production implements both over QUIC,
//! the simulation harness over an in-memory peer.

use std::{fmt, future::Future, path::PathBuf};

use dhkx_proto::{EncryptedMessage, PingPong, PublicKeyMessage, Request, Response, SendResult};

use crate::error::{ConnectError, RpcError};

/// Peer address as dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// Port
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Transport security for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSettings {
    /// Peer certificate is not verified; the channel is unauthenticated
    Disabled,
    /// Peer certificate must chain to `ca_cert` and match `server_name`
    Enabled {
        /// PEM file with the trust root(s)
        ca_cert: PathBuf,
        /// Expected peer name
        server_name: String,
    },
}

/// Establishes channels to the peer.
pub trait Connector: Send {
    /// Channel produced by a successful connect.
    type Channel: RpcChannel;

    /// Dial `endpoint`.
    ///
    /// # Errors
    ///
    /// - `ConnectError::Credentials` if TLS material cannot be loaded (fatal)
    /// - `ConnectError::InvalidEndpoint` / `Unreachable` otherwise (retried)
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        tls: &TlsSettings,
    ) -> impl Future<Output = Result<Self::Channel, ConnectError>> + Send;
}

/// Request/response channel to the peer.
///
/// Implementors provide [`call`](RpcChannel::call) and
/// [`close`](RpcChannel::close); the typed operations are built on top and
/// reject replies that do not match the request.
pub trait RpcChannel: Send {
    /// Send one request and wait for its reply. No deadline is applied here.
    ///
    /// A [`Response::Error`] reply is returned as `Ok`; the typed operations
    /// turn it into [`RpcError::Remote`].
    fn call(&mut self, request: Request) -> impl Future<Output = Result<Response, RpcError>> + Send;

    /// Release the channel. Further calls fail.
    fn close(&mut self);

    /// Liveness probe; returns the peer's reply text.
    fn ping(&mut self, message: &str) -> impl Future<Output = Result<String, RpcError>> + Send {
        let request = Request::Ping(PingPong { message: message.to_string() });
        async move {
            match self.call(request).await? {
                Response::Pong(pong) => Ok(pong.message),
                other => Err(unexpected(&other)),
            }
        }
    }

    /// Offer our public key for a cycle; returns the peer's.
    fn exchange_public_key(
        &mut self,
        offer: PublicKeyMessage,
    ) -> impl Future<Output = Result<PublicKeyMessage, RpcError>> + Send {
        async move {
            match self.call(Request::ExchangePublicKey(offer)).await? {
                Response::PublicKey(answer) => Ok(answer),
                other => Err(unexpected(&other)),
            }
        }
    }

    /// Deliver a ciphertext; returns the peer's result code.
    fn send_encrypted_message(
        &mut self,
        message: EncryptedMessage,
    ) -> impl Future<Output = Result<SendResult, RpcError>> + Send {
        async move {
            match self.call(Request::SendEncryptedMessage(message)).await? {
                Response::SendResult(result) => Ok(result),
                other => Err(unexpected(&other)),
            }
        }
    }
}

fn unexpected(response: &Response) -> RpcError {
    match response {
        Response::Error(reply) => {
            RpcError::Remote { code: reply.code, message: reply.message.clone() }
        },
        other => RpcError::Protocol(format!("unexpected reply {:?}", other.method())),
    }
}

#[cfg(test)]
mod tests {
    use dhkx_proto::ErrorReply;

    use super::*;

    /// Replies with a fixed response to every request.
    struct Canned(Response);

    impl RpcChannel for Canned {
        fn call(
            &mut self,
            _request: Request,
        ) -> impl Future<Output = Result<Response, RpcError>> + Send {
            std::future::ready(Ok(self.0.clone()))
        }

        fn close(&mut self) {}
    }

    #[tokio::test]
    async fn typed_call_accepts_matching_reply() {
        let mut channel = Canned(Response::Pong(PingPong { message: "PONG".into() }));
        assert_eq!(channel.ping("PING").await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn error_reply_becomes_remote_error() {
        let mut channel =
            Canned(Response::Error(ErrorReply::new(ErrorReply::INVALID_PUBLIC_KEY, "range")));

        let result = channel
            .exchange_public_key(PublicKeyMessage { sequence: 1, public_key: vec![2] })
            .await;

        assert_eq!(
            result,
            Err(RpcError::Remote { code: ErrorReply::INVALID_PUBLIC_KEY, message: "range".into() })
        );
    }

    #[tokio::test]
    async fn mismatched_reply_is_protocol_error() {
        let mut channel = Canned(Response::Pong(PingPong { message: "PONG".into() }));

        let result = channel
            .send_encrypted_message(EncryptedMessage { sequence: 1, ciphertext: "00".into() })
            .await;

        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[test]
    fn endpoint_display() {
        let endpoint = Endpoint { host: "peer.local".into(), port: 4433 };
        assert_eq!(endpoint.to_string(), "peer.local:4433");
    }
}
