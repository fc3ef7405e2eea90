//! Random prime generation with Miller-Rabin testing.
//!
//! Private keys are random primes of an exact bit length. Candidates are odd
//! integers with the top bit forced set; each is screened by trial division
//! and then by [`MILLER_RABIN_ROUNDS`] rounds with random witnesses.

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use crate::{
    dh::mod_pow,
    error::DhError,
    wipe::{Scrubbed, mul_mod, wipe_biguint},
};

/// Miller-Rabin rounds per candidate.
///
/// A composite survives one round with probability at most 1/4, so 40 rounds
/// bound the false-positive rate by 2^-80.
pub const MILLER_RABIN_ROUNDS: u32 = 40;

/// Candidates tried per requested bit before giving up.
///
/// Roughly `0.35 * bits` odd candidates are needed on average (prime number
/// theorem), so this leaves a wide margin for honest randomness.
const ATTEMPTS_PER_BIT: u32 = 16;

/// Lower bound on the attempt budget for tiny key sizes.
const MIN_ATTEMPTS: u32 = 64;

/// Primes used for trial division before Miller-Rabin.
const SMALL_PRIMES: [u32; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Generate a random prime of exactly `bits` bits.
///
/// # Errors
///
/// - `DhError::InvalidKeySize` if `bits < 2`
/// - `DhError::Randomness` if no candidate passes within the attempt budget
pub fn generate_prime<R>(bits: u32, rng: &mut R) -> Result<BigUint, DhError>
where
    R: CryptoRng + RngCore,
{
    if bits < 2 {
        return Err(DhError::InvalidKeySize { bits });
    }

    let attempts = bits.saturating_mul(ATTEMPTS_PER_BIT).max(MIN_ATTEMPTS);
    let top_bit = u64::from(bits - 1);

    for _ in 0..attempts {
        let mut candidate = rng.gen_biguint(u64::from(bits));
        candidate.set_bit(top_bit, true);
        candidate.set_bit(0, true);

        if is_probable_prime(&candidate, MILLER_RABIN_ROUNDS, rng) {
            return Ok(candidate);
        }

        wipe_biguint(&mut candidate);
    }

    Err(DhError::Randomness { attempts })
}

/// Probabilistic primality test.
///
/// Trial division by small primes, then `rounds` Miller-Rabin rounds with
/// witnesses drawn uniformly from `[2, n - 2]`. Never reports a prime as
/// composite.
///
/// Values derived from `n` (a private key candidate) are wiped before they
/// are freed.
pub fn is_probable_prime<R>(n: &BigUint, rounds: u32, rng: &mut R) -> bool
where
    R: CryptoRng + RngCore,
{
    let two = BigUint::from(2u32);
    if *n < two {
        return false;
    }

    for &p in &SMALL_PRIMES {
        if *n == BigUint::from(p) {
            return true;
        }
        if (n % p).is_zero() {
            return false;
        }
    }

    // n - 1 = d * 2^s with d odd
    let n_minus_one = Scrubbed::new(n - 1u32);
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = Scrubbed::new(&*n_minus_one >> s);
    let witness_span = Scrubbed::new(n - 3u32);

    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_below(&witness_span) + 2u32;
        let mut x = Scrubbed::new(mod_pow(&a, &d, n));

        if x.is_one() || *x == *n_minus_one {
            continue;
        }

        for _ in 1..s {
            x.set(mul_mod(&x, &x, n));
            if *x == *n_minus_one {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(0x5eed)
    }

    #[test]
    fn small_values() {
        let mut rng = rng();
        let primes: Vec<u32> =
            (0u32..120).filter(|&n| is_probable_prime(&BigUint::from(n), 10, &mut rng)).collect();

        assert_eq!(primes, vec![
            2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79,
            83, 89, 97, 101, 103, 107, 109, 113
        ]);
    }

    #[test]
    fn carmichael_numbers_are_composite() {
        let mut rng = rng();
        // Fermat pseudoprimes to every coprime base
        for n in [561u64, 1105, 1729, 2465, 2821, 6601, 8911, 41041] {
            assert!(!is_probable_prime(&BigUint::from(n), MILLER_RABIN_ROUNDS, &mut rng), "{n}");
        }
    }

    #[test]
    fn strong_pseudoprimes_survive_trial_division_but_not_random_witnesses() {
        let mut rng = rng();
        // Strong pseudoprimes to bases 2, 3, 5, 7 (and beyond); all factors exceed 97
        for n in [3_215_031_751u64, 2_152_302_898_747, 3_474_749_660_383, 341_550_071_728_321] {
            assert!(!is_probable_prime(&BigUint::from(n), MILLER_RABIN_ROUNDS, &mut rng), "{n}");
        }
    }

    #[test]
    fn known_large_prime() {
        let mut rng = rng();
        // 2^127 - 1
        let m127 = (BigUint::one() << 127u32) - 1u32;
        assert!(is_probable_prime(&m127, MILLER_RABIN_ROUNDS, &mut rng));

        // 2^128 + 1 = 59649589127497217 * 5704689200685129054721
        let f7 = (BigUint::one() << 128u32) + 1u32;
        assert!(!is_probable_prime(&f7, MILLER_RABIN_ROUNDS, &mut rng));
    }

    #[test]
    fn generated_prime_has_exact_bit_length() {
        let mut rng = rng();
        for bits in [2u32, 3, 8, 17, 64, 128] {
            let p = generate_prime(bits, &mut rng).unwrap();
            assert_eq!(p.bits(), u64::from(bits));
            assert!(p.bit(0) || p == BigUint::from(2u32));
        }
    }

    #[test]
    fn generated_prime_passes_independent_check() {
        let mut rng = rng();
        let p = generate_prime(96, &mut rng).unwrap();

        // Fermat check with num-bigint's own exponentiation
        for base in [2u32, 3, 5, 7, 11] {
            let b = BigUint::from(base);
            assert!(b.modpow(&(&p - 1u32), &p).is_one());
        }
    }

    #[test]
    fn rejects_too_small_key_size() {
        let mut rng = rng();
        assert_eq!(generate_prime(0, &mut rng), Err(DhError::InvalidKeySize { bits: 0 }));
        assert_eq!(generate_prime(1, &mut rng), Err(DhError::InvalidKeySize { bits: 1 }));
    }

    /// Produces all-zero output; every candidate becomes `2^(bits-1) + 1`.
    struct StuckRng;

    impl RngCore for StuckRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    impl CryptoRng for StuckRng {}

    #[test]
    fn stuck_randomness_exhausts_attempts() {
        // 2^7 + 1 = 129 = 3 * 43, so the only candidate is composite
        let result = generate_prime(8, &mut StuckRng);
        assert_eq!(result, Err(DhError::Randomness { attempts: MIN_ATTEMPTS.max(8 * 16) }));
    }
}
