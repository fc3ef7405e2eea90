//! In-memory key-exchange peer.
//!
//! Plays the server side of every call: answers probes, runs its half of
//! the Diffie-Hellman agreement per sequence number, and decrypts what the
//! client sends. Each session key is consumed by the message it decrypts.

use std::{collections::HashMap, sync::Arc};

use dhkx_core::PROBE_MESSAGE;
use dhkx_crypto::{DomainParameters, KeyPair, SessionKey, decrypt, derive_session_key};
use dhkx_proto::{
    EncryptedMessage, ErrorReply, PingPong, PublicKeyMessage, Request, Response, SendResult,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Result code for a ciphertext that fails to decrypt.
pub const DECRYPT_FAILED: i32 = 1;

/// Peer-side record of one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Sequence the message was sent under
    pub sequence: i64,
    /// Decrypted payload
    pub plaintext: Vec<u8>,
}

/// Server half of the protocol.
pub struct SimPeer {
    params: Arc<DomainParameters>,
    rng: ChaCha20Rng,
    sessions: HashMap<i64, SessionKey>,
    deliveries: Vec<Delivery>,
}

impl SimPeer {
    /// Peer using `params` with randomness derived from `seed`.
    pub fn new(params: Arc<DomainParameters>, seed: u64) -> Self {
        Self {
            params,
            rng: ChaCha20Rng::seed_from_u64(seed),
            sessions: HashMap::new(),
            deliveries: Vec::new(),
        }
    }

    /// Messages decrypted so far, in arrival order.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Sequences with an agreed key that no message has used yet.
    pub fn pending_sequences(&self) -> Vec<i64> {
        let mut pending: Vec<_> = self.sessions.keys().copied().collect();
        pending.sort_unstable();
        pending
    }

    /// Serve one request.
    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Ping(PingPong { message }) => {
                let reply = if message == PROBE_MESSAGE { "PONG".to_string() } else { message };
                Response::Pong(PingPong { message: reply })
            },
            Request::ExchangePublicKey(offer) => self.exchange(&offer),
            Request::SendEncryptedMessage(message) => self.receive(&message),
        }
    }

    fn exchange(&mut self, offer: &PublicKeyMessage) -> Response {
        let key_pair = match KeyPair::generate(&self.params, &mut self.rng) {
            Ok(pair) => pair,
            Err(err) => {
                return Response::Error(ErrorReply::new(ErrorReply::INTERNAL, err.to_string()));
            },
        };

        let secret = match key_pair.agree(&offer.public_key) {
            Ok(secret) => secret,
            Err(err) => {
                return Response::Error(ErrorReply::new(
                    ErrorReply::INVALID_PUBLIC_KEY,
                    err.to_string(),
                ));
            },
        };

        self.sessions.insert(offer.sequence, derive_session_key(&secret));
        tracing::debug!(sequence = offer.sequence, "peer agreed session key");

        Response::PublicKey(PublicKeyMessage {
            sequence: offer.sequence,
            public_key: key_pair.public_key_bytes(),
        })
    }

    fn receive(&mut self, message: &EncryptedMessage) -> Response {
        let Some(key) = self.sessions.remove(&message.sequence) else {
            return Response::Error(ErrorReply::new(
                ErrorReply::UNKNOWN_SEQUENCE,
                format!("no exchange for sequence {}", message.sequence),
            ));
        };

        match decrypt(&message.ciphertext, &key, message.sequence as u64) {
            Ok(plaintext) => {
                self.deliveries.push(Delivery { sequence: message.sequence, plaintext });
                Response::SendResult(SendResult { result_code: SendResult::OK })
            },
            Err(err) => {
                tracing::debug!(sequence = message.sequence, "peer decrypt failed: {err}");
                Response::SendResult(SendResult { result_code: DECRYPT_FAILED })
            },
        }
    }
}
