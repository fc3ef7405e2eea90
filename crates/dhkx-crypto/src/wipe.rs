//! In-place clearing of big-integer key material.

use std::ops::Deref;

use num_bigint::BigUint;

/// Overwrite every limb of `value` with zero.
///
/// Bits are cleared from least to most significant. `BigUint` only truncates
/// its limb vector once the top limb is zero, so all limbs are overwritten in
/// their current allocation before any shrink can happen.
///
/// Copies made by earlier arithmetic are not reachable from here; values
/// derived from secrets are held in [`Scrubbed`] for that reason.
pub(crate) fn wipe_biguint(value: &mut BigUint) {
    let bits = value.bits();
    for bit in 0..bits {
        value.set_bit(bit, false);
    }
}

/// A `BigUint` derived from key material, wiped when dropped or replaced.
///
/// Scratch buffers allocated inside `num-bigint` division are outside its
/// reach.
pub(crate) struct Scrubbed(BigUint);

impl Scrubbed {
    pub(crate) fn new(value: BigUint) -> Self {
        Self(value)
    }

    /// Store `value`, wiping the previous one.
    pub(crate) fn set(&mut self, value: BigUint) {
        let mut previous = std::mem::replace(&mut self.0, value);
        wipe_biguint(&mut previous);
    }

    /// Release the value without wiping it.
    pub(crate) fn into_inner(mut self) -> BigUint {
        std::mem::take(&mut self.0)
    }
}

impl Deref for Scrubbed {
    type Target = BigUint;

    fn deref(&self) -> &BigUint {
        &self.0
    }
}

impl Drop for Scrubbed {
    fn drop(&mut self) {
        wipe_biguint(&mut self.0);
    }
}

/// `a * b mod m` with the unreduced product wiped before it is freed.
pub(crate) fn mul_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    let product = Scrubbed::new(a * b);
    &*product % m
}

#[cfg(test)]
mod tests {
    use num_traits::Zero;

    use super::*;

    #[test]
    fn wipe_leaves_zero() {
        let mut value = BigUint::parse_bytes(b"123456789012345678901234567890", 10).unwrap();
        wipe_biguint(&mut value);
        assert!(value.is_zero());
    }

    #[test]
    fn wipe_of_zero_is_noop() {
        let mut value = BigUint::zero();
        wipe_biguint(&mut value);
        assert!(value.is_zero());
    }

    #[test]
    fn scrubbed_set_and_release() {
        let mut held = Scrubbed::new(BigUint::from(7u32));
        held.set(BigUint::from(11u32));
        assert_eq!(*held, BigUint::from(11u32));
        assert_eq!(held.into_inner(), BigUint::from(11u32));
    }

    #[test]
    fn mul_mod_reduces() {
        let m = (BigUint::from(1u32) << 127u32) - 1u32;
        let a = &m - 2u32;
        let b = &m - 3u32;

        // (-2)(-3) = 6 mod m
        assert_eq!(mul_mod(&a, &b, &m), BigUint::from(6u32));
    }
}
