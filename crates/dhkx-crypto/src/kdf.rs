//! Session key derivation from the DH shared secret.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::dh::SharedSecret;

/// Session key length in bytes (SHA-256 output).
pub const SESSION_KEY_SIZE: usize = 32;

/// Single-use symmetric key for one exchange cycle.
///
/// Zeroized on drop. Deliberately not `Clone`: one cycle, one key, one
/// message.
#[derive(PartialEq, Eq)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Raw key bytes for the AEAD.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Derive the session key: SHA-256 over the secret's minimal big-endian bytes.
///
/// Deterministic: both parties holding the same secret derive the same key.
pub fn derive_session_key(secret: &SharedSecret) -> SessionKey {
    let bytes = secret.to_bytes_be();
    let digest = Sha256::digest(bytes.as_slice());

    let mut key = [0u8; SESSION_KEY_SIZE];
    key.copy_from_slice(&digest);
    SessionKey { key }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::*;
    use crate::dh::{DomainParameters, KeyPair};

    fn secret_with_value_two() -> (DomainParameters, BigUint) {
        let params = DomainParameters::new(BigUint::from(23u32), BigUint::from(5u32), 4).unwrap();
        (params, BigUint::from(6u32))
    }

    #[test]
    fn derivation_is_deterministic() {
        let (params, private) = secret_with_value_two();
        let pair = KeyPair::from_private(&params, private);

        let first = derive_session_key(&pair.agree(&[19]).unwrap());
        let second = derive_session_key(&pair.agree(&[19]).unwrap());

        assert_eq!(first, second, "same secret must produce same key");
    }

    #[test]
    fn digest_of_known_secret() {
        let (params, private) = secret_with_value_two();
        let pair = KeyPair::from_private(&params, private);
        let key = derive_session_key(&pair.agree(&[19]).unwrap());

        // SHA-256 of the single byte 0x02
        let expected = Sha256::digest([0x02u8]);
        assert_eq!(key.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn different_secrets_give_different_keys() {
        let (params, private) = secret_with_value_two();
        let pair = KeyPair::from_private(&params, private);

        let a = derive_session_key(&pair.agree(&[19]).unwrap());
        let b = derive_session_key(&pair.agree(&[8]).unwrap());

        assert_ne!(a, b);
    }

    #[test]
    fn debug_is_redacted() {
        let key = SessionKey::from_bytes([0xAB; SESSION_KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SessionKey(<redacted>)");
    }
}
