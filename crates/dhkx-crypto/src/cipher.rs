//! Message encryption using `XChaCha20-Poly1305`
//!
//! Each session key encrypts exactly one message, so the nonce is derived
//! from the exchange sequence number instead of randomness. The output is
//! deterministic for a fixed `(plaintext, key, sequence)`.
//!
//! Wire form (hex-encoded): `nonce (24) || ciphertext || tag (16)`.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CipherError, kdf::SessionKey};

/// `XChaCha20` nonce size
const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Fixed nonce prefix; the remaining 8 bytes are the sequence number
const NONCE_LABEL: &[u8; 16] = b"dhkx-msg-nonce\0\0";

/// Encrypt `plaintext` under the cycle's session key.
///
/// Returns lowercase hex of `nonce || ciphertext || tag`.
pub fn encrypt(plaintext: &[u8], key: &SessionKey, sequence: u64) -> String {
    let nonce = build_nonce(sequence);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut wire = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    wire.extend_from_slice(&nonce);
    wire.extend_from_slice(&ciphertext);
    hex::encode(wire)
}

/// Decrypt a message produced by [`encrypt`] (peer side).
///
/// # Errors
///
/// - `CipherError::Encoding` if the input is not hex
/// - `CipherError::Truncated` if shorter than nonce plus tag
/// - `CipherError::NonceMismatch` if the nonce was not built for `sequence`
/// - `CipherError::Authentication` on wrong key or tampered ciphertext
pub fn decrypt(encoded: &str, key: &SessionKey, sequence: u64) -> Result<Vec<u8>, CipherError> {
    let wire = hex::decode(encoded).map_err(|e| CipherError::Encoding(e.to_string()))?;

    if wire.len() < NONCE_SIZE + POLY1305_TAG_SIZE {
        return Err(CipherError::Truncated { len: wire.len() });
    }

    let (nonce, ciphertext) = wire.split_at(NONCE_SIZE);
    if nonce != build_nonce(sequence) {
        return Err(CipherError::NonceMismatch { expected: sequence });
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::Authentication)
}

/// Build a 24-byte nonce for `XChaCha20`.
///
/// Structure:
/// - bytes 0-15: fixed label
/// - bytes 16-23: sequence (big-endian)
fn build_nonce(sequence: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..16].copy_from_slice(NONCE_LABEL);
    nonce[16..].copy_from_slice(&sequence.to_be_bytes());
    nonce
}
