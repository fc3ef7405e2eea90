//! Finite-field Diffie-Hellman over a configured prime modulus.
//!
//! # Invariants
//!
//! - `DomainParameters` can only be constructed in a valid state:
//!   `modulus > 3`, `1 < generator < modulus`, `key_size_bits >= 2`
//! - A `KeyPair` borrows its parameters, so it cannot outlive them or be
//!   combined with a peer key from a different group
//! - Peer keys are range-checked before any exponentiation

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::{
    error::DhError,
    prime::generate_prime,
    wipe::{Scrubbed, mul_mod, wipe_biguint},
};

/// Group parameters shared by both parties.
///
/// The modulus is trusted to be prime (it comes from configuration); it is
/// not re-tested here.
#[derive(Clone, PartialEq, Eq)]
pub struct DomainParameters {
    modulus: BigUint,
    generator: BigUint,
    key_size_bits: u32,
}

impl DomainParameters {
    /// Validate and build domain parameters.
    ///
    /// # Errors
    ///
    /// - `DhError::InvalidParameters` if `modulus <= 3` or the generator is
    ///   not strictly between 1 and the modulus
    /// - `DhError::InvalidKeySize` if `key_size_bits < 2`
    pub fn new(
        modulus: BigUint,
        generator: BigUint,
        key_size_bits: u32,
    ) -> Result<Self, DhError> {
        if modulus <= BigUint::from(3u32) {
            return Err(DhError::InvalidParameters {
                reason: format!("modulus must be greater than 3, got {modulus}"),
            });
        }

        if generator <= BigUint::one() || generator >= modulus {
            return Err(DhError::InvalidParameters {
                reason: format!("generator {generator} is not in (1, modulus)"),
            });
        }

        if key_size_bits < 2 {
            return Err(DhError::InvalidKeySize { bits: key_size_bits });
        }

        Ok(Self { modulus, generator, key_size_bits })
    }

    /// Prime modulus `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Generator `g`.
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Bit length of generated private keys.
    pub fn key_size_bits(&self) -> u32 {
        self.key_size_bits
    }
}

impl fmt::Debug for DomainParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainParameters")
            .field("modulus_bits", &self.modulus.bits())
            .field("generator", &self.generator)
            .field("key_size_bits", &self.key_size_bits)
            .finish()
    }
}

/// Modular exponentiation by left-to-right square-and-multiply.
///
/// Computes `base^exponent mod modulus`. Not constant-time: running time
/// depends on the exponent's bit pattern. Every intermediate power is wiped
/// once it is superseded.
///
/// # Panics
///
/// Panics if `modulus` is zero.
pub fn mod_pow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    assert!(!modulus.is_zero(), "modulus must be non-zero");

    if modulus.is_one() {
        return BigUint::zero();
    }

    let base = Scrubbed::new(base % modulus);
    let mut result = Scrubbed::new(BigUint::one());

    for bit in (0..exponent.bits()).rev() {
        result.set(mul_mod(&result, &result, modulus));
        if exponent.bit(bit) {
            result.set(mul_mod(&result, &base, modulus));
        }
    }

    result.into_inner()
}

/// Parse and range-check a peer's public key.
///
/// Accepts only values in `[2, modulus - 2]`. The excluded values (0, 1 and
/// `modulus - 1`) confine the shared secret to a subgroup of order at most 2.
///
/// # Errors
///
/// - `DhError::InvalidPeerKey` for empty input or out-of-range values
pub fn validate_peer_public_key(
    params: &DomainParameters,
    bytes: &[u8],
) -> Result<BigUint, DhError> {
    if bytes.is_empty() {
        return Err(DhError::InvalidPeerKey { reason: "empty" });
    }

    let value = BigUint::from_bytes_be(bytes);

    if value < BigUint::from(2u32) {
        return Err(DhError::InvalidPeerKey { reason: "below 2" });
    }

    if value >= &params.modulus - 1u32 {
        return Err(DhError::InvalidPeerKey { reason: "above modulus - 2" });
    }

    Ok(value)
}

/// Ephemeral key pair for one exchange cycle.
///
/// The private exponent is wiped when the pair is dropped.
pub struct KeyPair<'p> {
    params: &'p DomainParameters,
    private_key: BigUint,
    public_key: BigUint,
}

impl<'p> KeyPair<'p> {
    /// Generate a fresh key pair: a random prime private key of
    /// `params.key_size_bits()` bits and `g^x mod p`.
    ///
    /// # Errors
    ///
    /// - `DhError::Randomness` if prime generation exhausts its attempts
    pub fn generate<R>(params: &'p DomainParameters, rng: &mut R) -> Result<Self, DhError>
    where
        R: CryptoRng + RngCore,
    {
        let private_key = generate_prime(params.key_size_bits, rng)?;
        Ok(Self::from_private(params, private_key))
    }

    /// Build a key pair from a known private key.
    ///
    /// Intended for known-answer tests; production code uses
    /// [`KeyPair::generate`].
    pub fn from_private(params: &'p DomainParameters, private_key: BigUint) -> Self {
        let public_key = mod_pow(&params.generator, &private_key, &params.modulus);
        Self { params, private_key, public_key }
    }

    /// Public value `g^x mod p`.
    pub fn public_key(&self) -> &BigUint {
        &self.public_key
    }

    /// Minimal big-endian encoding of the public key, as sent on the wire.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_bytes_be()
    }

    /// Compute the shared secret with the peer's public key.
    ///
    /// # Errors
    ///
    /// - `DhError::InvalidPeerKey` if the peer key fails range validation
    pub fn agree(&self, peer_public_key: &[u8]) -> Result<SharedSecret, DhError> {
        let mut peer = validate_peer_public_key(self.params, peer_public_key)?;
        let value = mod_pow(&peer, &self.private_key, &self.params.modulus);
        wipe_biguint(&mut peer);

        Ok(SharedSecret { value })
    }
}

impl Drop for KeyPair<'_> {
    fn drop(&mut self) {
        wipe_biguint(&mut self.private_key);
    }
}

impl fmt::Debug for KeyPair<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key_bits", &self.public_key.bits())
            .finish()
    }
}

/// Agreed secret `Y^x mod p`. Wiped on drop.
pub struct SharedSecret {
    value: BigUint,
}

impl SharedSecret {
    /// Secret as an integer.
    pub fn as_biguint(&self) -> &BigUint {
        &self.value
    }

    /// Minimal big-endian encoding, zeroized when the returned buffer drops.
    pub fn to_bytes_be(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.value.to_bytes_be())
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        wipe_biguint(&mut self.value);
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn toy_params() -> DomainParameters {
        DomainParameters::new(BigUint::from(23u32), BigUint::from(5u32), 4).unwrap()
    }

    #[test]
    fn worked_example_p23_g5() {
        let params = toy_params();
        let alice = KeyPair::from_private(&params, BigUint::from(6u32));
        let bob = KeyPair::from_private(&params, BigUint::from(15u32));

        assert_eq!(alice.public_key(), &BigUint::from(8u32));
        assert_eq!(bob.public_key(), &BigUint::from(19u32));

        let alice_secret = alice.agree(&bob.public_key_bytes()).unwrap();
        let bob_secret = bob.agree(&alice.public_key_bytes()).unwrap();

        assert_eq!(alice_secret.as_biguint(), &BigUint::from(2u32));
        assert_eq!(bob_secret.as_biguint(), &BigUint::from(2u32));
    }

    #[test]
    fn mod_pow_edge_cases() {
        let m = BigUint::from(23u32);
        assert_eq!(mod_pow(&BigUint::from(5u32), &BigUint::zero(), &m), BigUint::one());
        assert_eq!(mod_pow(&BigUint::zero(), &BigUint::from(5u32), &m), BigUint::zero());
        assert_eq!(
            mod_pow(&BigUint::from(5u32), &BigUint::from(5u32), &BigUint::one()),
            BigUint::zero()
        );
        // base larger than modulus is reduced first
        assert_eq!(
            mod_pow(&BigUint::from(28u32), &BigUint::from(2u32), &m),
            BigUint::from(2u32)
        );
    }

    #[test]
    fn mod_pow_matches_library_exponentiation() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let modulus = (BigUint::one() << 521u32) - 1u32;

        for _ in 0..16 {
            let base = num_bigint::RandBigInt::gen_biguint(&mut rng, 600);
            let exponent = num_bigint::RandBigInt::gen_biguint(&mut rng, 256);
            assert_eq!(mod_pow(&base, &exponent, &modulus), base.modpow(&exponent, &modulus));
        }
    }

    #[test]
    fn rejects_invalid_parameters() {
        let g = BigUint::from(2u32);
        assert!(matches!(
            DomainParameters::new(BigUint::from(3u32), g.clone(), 8),
            Err(DhError::InvalidParameters { .. })
        ));
        assert!(matches!(
            DomainParameters::new(BigUint::from(23u32), BigUint::one(), 8),
            Err(DhError::InvalidParameters { .. })
        ));
        assert!(matches!(
            DomainParameters::new(BigUint::from(23u32), BigUint::from(23u32), 8),
            Err(DhError::InvalidParameters { .. })
        ));
        assert_eq!(
            DomainParameters::new(BigUint::from(23u32), g, 0),
            Err(DhError::InvalidKeySize { bits: 0 })
        );
    }

    #[test]
    fn peer_key_range_is_enforced() {
        let params = toy_params();
        let reject = |v: u32| validate_peer_public_key(&params, &BigUint::from(v).to_bytes_be());

        assert!(matches!(reject(0), Err(DhError::InvalidPeerKey { reason: "below 2" })));
        assert!(matches!(reject(1), Err(DhError::InvalidPeerKey { reason: "below 2" })));
        assert!(matches!(reject(22), Err(DhError::InvalidPeerKey { .. })));
        assert!(matches!(reject(23), Err(DhError::InvalidPeerKey { .. })));
        assert!(matches!(reject(1000), Err(DhError::InvalidPeerKey { .. })));
        assert!(matches!(
            validate_peer_public_key(&params, &[]),
            Err(DhError::InvalidPeerKey { reason: "empty" })
        ));

        assert_eq!(validate_peer_public_key(&params, &[2]).unwrap(), BigUint::from(2u32));
        assert_eq!(validate_peer_public_key(&params, &[21]).unwrap(), BigUint::from(21u32));
        // leading zero bytes do not change the value
        assert_eq!(validate_peer_public_key(&params, &[0, 0, 19]).unwrap(), BigUint::from(19u32));
    }

    #[test]
    fn agree_rejects_out_of_range_peer() {
        let params = toy_params();
        let alice = KeyPair::from_private(&params, BigUint::from(6u32));

        assert!(alice.agree(&[0]).is_err());
        assert!(alice.agree(&[22]).is_err());
    }

    #[test]
    fn generated_key_has_configured_size() {
        let params = DomainParameters::new(
            (BigUint::one() << 127u32) - 1u32,
            BigUint::from(3u32),
            64,
        )
        .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);

        let pair = KeyPair::generate(&params, &mut rng).unwrap();
        assert_eq!(pair.private_key.bits(), 64);
        assert_eq!(
            pair.public_key(),
            &params.generator().modpow(&pair.private_key, params.modulus())
        );
    }

    #[test]
    fn debug_output_is_redacted() {
        let params = toy_params();
        let pair = KeyPair::from_private(&params, BigUint::from(6u32));
        let secret = pair.agree(&[19]).unwrap();

        let pair_debug = format!("{pair:?}");
        assert!(pair_debug.contains("<redacted>"));
        assert!(!pair_debug.contains("private_key: 6"));
        assert_eq!(format!("{secret:?}"), "SharedSecret(<redacted>)");
    }
}
