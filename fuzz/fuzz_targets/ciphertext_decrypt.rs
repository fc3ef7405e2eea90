//! Fuzz target for ciphertext decoding and decryption
//!
//! # Invariants
//!
//! - Arbitrary text never panics `decrypt`
//! - Tampering with any byte of a valid ciphertext fails decryption
//! - Valid ciphertexts decrypt only under their own sequence number

#![no_main]

use arbitrary::Arbitrary;
use dhkx_crypto::{SessionKey, decrypt, encrypt};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 32],
    sequence: u64,
    plaintext: Vec<u8>,
    garbage: String,
    flip_at: usize,
    flip_mask: u8,
}

fuzz_target!(|input: Input| {
    let key = SessionKey::from_bytes(input.key);

    let _ = decrypt(&input.garbage, &key, input.sequence);

    let encoded = encrypt(&input.plaintext, &key, input.sequence);
    assert_eq!(decrypt(&encoded, &key, input.sequence).expect("own ciphertext"), input.plaintext);
    assert!(decrypt(&encoded, &key, input.sequence.wrapping_add(1)).is_err());

    let mut raw = hex_bytes(&encoded);
    if input.flip_mask != 0 {
        let index = input.flip_at % raw.len();
        raw[index] ^= input.flip_mask;
        assert!(decrypt(&to_hex(&raw), &key, input.sequence).is_err());
    }
});

fn hex_bytes(text: &str) -> Vec<u8> {
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).expect("encrypt emits hex"))
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
