//! Fuzz target for hostile CBOR bodies behind valid method bytes
//!
//! # Strategy
//!
//! - Deeply nested: arrays/maps nested to arbitrary depth (stack overflow)
//! - Huge lengths: CBOR claiming massive byte/string/array lengths (memory)
//! - Type confusion: a valid body for one method sent under another
//! - Oversized: envelopes just past the size limit
//!
//! # Invariants
//!
//! - Decoding completes quickly and never panics
//! - Huge claimed lengths are rejected, not allocated
//! - Envelopes over the limit are rejected before parsing

#![no_main]

use arbitrary::Arbitrary;
use dhkx_proto::{
    EncryptedMessage, MAX_MESSAGE_SIZE, Method, PingPong, ProtocolError, PublicKeyMessage,
    Request, Response,
};
use libfuzzer_sys::fuzz_target;

const METHODS: [Method; 7] = [
    Method::Ping,
    Method::ExchangePublicKey,
    Method::SendEncryptedMessage,
    Method::Pong,
    Method::PublicKey,
    Method::SendResult,
    Method::Error,
];

#[derive(Debug, Clone, Arbitrary)]
enum CborAttack {
    DeeplyNested { depth: u8, map: bool },
    HugeLength { claimed_len_exponent: u8, major: u8 },
    TypeConfusion { sequence: i64, key: Vec<u8>, text: String, target: u8 },
    Oversized { extra: u16 },
}

fuzz_target!(|attack: CborAttack| {
    match attack {
        CborAttack::DeeplyNested { depth, map } => {
            let body = nested(usize::from(depth % 64), map);
            decode_under_every_method(&body);
        },

        CborAttack::HugeLength { claimed_len_exponent, major } => {
            let exponent = u32::from(claimed_len_exponent % 33);
            let claimed = if exponent == 32 { u32::MAX } else { 1u32 << exponent };
            let header = match major % 3 {
                0 => 0x5A,
                1 => 0x7A,
                _ => 0x9A,
            };

            let mut body = vec![header];
            body.extend_from_slice(&claimed.to_be_bytes());
            body.extend(std::iter::repeat_n(0x01, (claimed as usize).min(8)));
            decode_under_every_method(&body);
        },

        CborAttack::TypeConfusion { sequence, key, text, target } => {
            let requests = [
                Request::Ping(PingPong { message: text.clone() }),
                Request::ExchangePublicKey(PublicKeyMessage { sequence, public_key: key }),
                Request::SendEncryptedMessage(EncryptedMessage { sequence, ciphertext: text }),
            ];
            let method = METHODS[usize::from(target) % METHODS.len()];

            for request in requests {
                let Ok(encoded) = request.encode() else { continue };
                let mut confused = encoded.clone();
                confused[0] = method.to_u8();

                if let Ok(decoded) = Request::decode(&confused) {
                    assert_eq!(decoded.method(), method);
                }
                let _ = Response::decode(&confused);
            }
        },

        CborAttack::Oversized { extra } => {
            let mut envelope = vec![0u8; MAX_MESSAGE_SIZE + 1 + usize::from(extra)];
            envelope[0] = Method::Ping.to_u8();

            assert!(matches!(Request::decode(&envelope), Err(ProtocolError::TooLarge { .. })));
            assert!(matches!(Response::decode(&envelope), Err(ProtocolError::TooLarge { .. })));
        },
    }
});

fn decode_under_every_method(body: &[u8]) {
    for method in METHODS {
        let mut envelope = vec![method.to_u8()];
        envelope.extend_from_slice(body);
        let _ = Request::decode(&envelope);
        let _ = Response::decode(&envelope);
    }
}

fn nested(depth: usize, map: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(depth * 3 + 1);
    for _ in 0..depth {
        if map {
            bytes.extend_from_slice(&[0xA1, 0x61, b'a']);
        } else {
            bytes.push(0x81);
        }
    }
    bytes.push(0x01);
    bytes
}
