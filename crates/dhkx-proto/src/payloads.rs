//! CBOR-encoded request and response payloads.
//!
//! # Invariants
//!
//! Each [`Request`] and [`Response`] variant maps to exactly one [`Method`]
//! (enforced by match exhaustiveness). Decoding an encoded envelope yields an
//! equal value.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    MAX_MESSAGE_SIZE, Method,
    errors::{ProtocolError, Result},
};

/// Free-form liveness probe body, used for both Ping and Pong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPong {
    /// Probe text (the client sends `"PING"`)
    pub message: String,
}

/// One side's ephemeral public key, tagged with the cycle's sequence number.
///
/// The key is the minimal big-endian encoding of the DH public value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyMessage {
    /// Exchange cycle this key belongs to
    pub sequence: i64,
    /// Big-endian public key bytes, carried as a CBOR byte string
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
}

/// Ciphertext produced under the session key of cycle `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Exchange cycle whose key encrypted this message
    pub sequence: i64,
    /// Hex-encoded `nonce || ciphertext || tag`
    pub ciphertext: String,
}

/// Peer acknowledgement for an [`EncryptedMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Zero on success, peer-defined otherwise
    pub result_code: i32,
}

impl SendResult {
    /// Message was decrypted and accepted.
    pub const OK: i32 = 0;
}

/// Error reply returned in place of the expected response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Error code
    pub code: u16,
    /// Human-readable detail
    pub message: String,
}

impl ErrorReply {
    /// Request could not be decoded.
    pub const INVALID_REQUEST: u16 = 0x0001;
    /// Public key was rejected by the peer.
    pub const INVALID_PUBLIC_KEY: u16 = 0x0002;
    /// No key exchange is known for the sequence number.
    pub const UNKNOWN_SEQUENCE: u16 = 0x0003;
    /// Peer-side failure unrelated to the request.
    pub const INTERNAL: u16 = 0x00FF;

    /// Create an error reply.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Client-to-peer calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness probe
    Ping(PingPong),
    /// Offer our ephemeral public key for a cycle
    ExchangePublicKey(PublicKeyMessage),
    /// Deliver a message encrypted under the cycle's session key
    SendEncryptedMessage(EncryptedMessage),
}

/// Peer-to-client replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply to [`Request::Ping`]
    Pong(PingPong),
    /// Reply to [`Request::ExchangePublicKey`]
    PublicKey(PublicKeyMessage),
    /// Reply to [`Request::SendEncryptedMessage`]
    SendResult(SendResult),
    /// Peer could not serve the request
    Error(ErrorReply),
}

impl Request {
    /// Method byte for this request.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::Ping(_) => Method::Ping,
            Self::ExchangePublicKey(_) => Method::ExchangePublicKey,
            Self::SendEncryptedMessage(_) => Method::SendEncryptedMessage,
        }
    }

    /// Encode into a method-tagged envelope.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::TooLarge` if the envelope exceeds the size limit
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Ping(inner) => encode_envelope(self.method(), inner),
            Self::ExchangePublicKey(inner) => encode_envelope(self.method(), inner),
            Self::SendEncryptedMessage(inner) => encode_envelope(self.method(), inner),
        }
    }

    /// Decode a request envelope.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::TooLarge` before parsing if the input is oversized
    /// - `ProtocolError::UnknownMethod` / `WrongDirection` for bad method bytes
    /// - `ProtocolError::CborDecode` if the body does not match the method
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (method, body) = split_envelope(bytes)?;

        match method {
            Method::Ping => Ok(Self::Ping(decode_body(body)?)),
            Method::ExchangePublicKey => Ok(Self::ExchangePublicKey(decode_body(body)?)),
            Method::SendEncryptedMessage => Ok(Self::SendEncryptedMessage(decode_body(body)?)),
            Method::Pong | Method::PublicKey | Method::SendResult | Method::Error => {
                Err(ProtocolError::WrongDirection { method, direction: "request" })
            },
        }
    }
}

impl Response {
    /// Method byte for this response.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::Pong(_) => Method::Pong,
            Self::PublicKey(_) => Method::PublicKey,
            Self::SendResult(_) => Method::SendResult,
            Self::Error(_) => Method::Error,
        }
    }

    /// Encode into a method-tagged envelope.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::TooLarge` if the envelope exceeds the size limit
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Pong(inner) => encode_envelope(self.method(), inner),
            Self::PublicKey(inner) => encode_envelope(self.method(), inner),
            Self::SendResult(inner) => encode_envelope(self.method(), inner),
            Self::Error(inner) => encode_envelope(self.method(), inner),
        }
    }

    /// Decode a response envelope.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Request::decode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (method, body) = split_envelope(bytes)?;

        match method {
            Method::Pong => Ok(Self::Pong(decode_body(body)?)),
            Method::PublicKey => Ok(Self::PublicKey(decode_body(body)?)),
            Method::SendResult => Ok(Self::SendResult(decode_body(body)?)),
            Method::Error => Ok(Self::Error(decode_body(body)?)),
            Method::Ping | Method::ExchangePublicKey | Method::SendEncryptedMessage => {
                Err(ProtocolError::WrongDirection { method, direction: "response" })
            },
        }
    }
}

fn encode_envelope<T: Serialize>(method: Method, inner: &T) -> Result<Vec<u8>> {
    let mut buf = vec![method.to_u8()];
    ciborium::ser::into_writer(inner, &mut buf)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;

    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge { size: buf.len(), max: MAX_MESSAGE_SIZE });
    }

    Ok(buf)
}

/// Size check happens before the method byte or body is inspected.
fn split_envelope(bytes: &[u8]) -> Result<(Method, &[u8])> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE });
    }

    let Some((&first, body)) = bytes.split_first() else {
        return Err(ProtocolError::Empty);
    };

    let method = Method::from_u8(first).ok_or(ProtocolError::UnknownMethod(first))?;
    Ok((method, body))
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    ciborium::de::from_reader(body).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_envelope_starts_with_method_byte() {
        let request = Request::Ping(PingPong { message: "PING".to_string() });
        let bytes = request.encode().unwrap();

        assert_eq!(bytes[0], Method::Ping.to_u8());
        assert_eq!(Request::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn response_cannot_be_decoded_as_request() {
        let response = Response::Pong(PingPong { message: "PONG".to_string() });
        let bytes = response.encode().unwrap();

        let result = Request::decode(&bytes);
        assert!(matches!(
            result,
            Err(ProtocolError::WrongDirection { method: Method::Pong, direction: "request" })
        ));
    }

    #[test]
    fn request_cannot_be_decoded_as_response() {
        let request = Request::SendEncryptedMessage(EncryptedMessage {
            sequence: 3,
            ciphertext: "00ff".to_string(),
        });
        let bytes = request.encode().unwrap();

        assert!(matches!(Response::decode(&bytes), Err(ProtocolError::WrongDirection { .. })));
    }

    #[test]
    fn empty_envelope_is_rejected() {
        assert_eq!(Request::decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(Response::decode(&[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert_eq!(Request::decode(&[0x42, 0xA0]), Err(ProtocolError::UnknownMethod(0x42)));
    }

    #[test]
    fn mismatched_body_fails_cbor_decode() {
        // Method says PublicKey, body is a PingPong
        let mut bytes = vec![Method::PublicKey.to_u8()];
        ciborium::ser::into_writer(&PingPong { message: "x".to_string() }, &mut bytes).unwrap();

        assert!(matches!(Response::decode(&bytes), Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn oversized_input_rejected_before_parsing() {
        let mut bytes = vec![0u8; MAX_MESSAGE_SIZE + 1];
        bytes[0] = Method::Ping.to_u8();

        assert_eq!(
            Request::decode(&bytes),
            Err(ProtocolError::TooLarge { size: MAX_MESSAGE_SIZE + 1, max: MAX_MESSAGE_SIZE })
        );
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        let request = Request::SendEncryptedMessage(EncryptedMessage {
            sequence: 1,
            ciphertext: "a".repeat(MAX_MESSAGE_SIZE),
        });

        assert!(matches!(request.encode(), Err(ProtocolError::TooLarge { .. })));
    }

    #[test]
    fn public_key_is_a_cbor_byte_string() {
        let key = vec![0xABu8; 100];
        let request = Request::ExchangePublicKey(PublicKeyMessage { sequence: 1, public_key: key });
        let bytes = request.encode().unwrap();

        // method byte, map(2), "sequence", 1, "public_key", bytes(100) header, key
        let overhead = 1 + 1 + 9 + 1 + 11 + 2;
        assert_eq!(bytes.len(), overhead + 100);
        assert_eq!(&bytes[overhead - 2..overhead], &[0x58, 100]);

        let body: ciborium::Value = ciborium::de::from_reader(&bytes[1..]).unwrap();
        let field = body
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_text() == Some("public_key"))
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(field, ciborium::Value::Bytes(vec![0xAB; 100]));
        assert_eq!(Request::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn error_reply_round_trips() {
        let response = Response::Error(ErrorReply::new(ErrorReply::UNKNOWN_SEQUENCE, "seq 9"));
        let bytes = response.encode().unwrap();

        assert_eq!(Response::decode(&bytes).unwrap(), response);
    }
}
