//! Fuzz target for peer public key validation and agreement
//!
//! # Invariants
//!
//! - Arbitrary peer bytes never panic validation or agreement
//! - Accepted keys lie in `[2, p - 2]`
//! - Agreement succeeds exactly when validation does

#![no_main]

use arbitrary::Arbitrary;
use dhkx_crypto::{BigUint, DomainParameters, KeyPair, validate_peer_public_key};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    modulus: u64,
    private_key: u32,
    peer_key: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Any odd modulus above 256; validation does not depend on primality.
    let modulus = BigUint::from(input.modulus | 0x101);
    let Ok(params) = DomainParameters::new(modulus.clone(), BigUint::from(2u32), 16) else {
        return;
    };

    let validated = validate_peer_public_key(&params, &input.peer_key);
    if let Ok(value) = &validated {
        assert!(*value >= BigUint::from(2u32));
        assert!(*value <= &modulus - 2u32);
    }

    let pair = KeyPair::from_private(&params, BigUint::from(input.private_key.max(2)));
    assert_eq!(pair.agree(&input.peer_key).is_ok(), validated.is_ok());
});
