//! Base-10 string and big-integer codecs for field elements.
//!
//! Everything that crosses the JSON boundary (persisted polls, circuit
//! inputs) carries field elements as decimal strings.

use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;

use crate::error::CryptoError;
use crate::Field;

/// Lift a field element into an arbitrary-precision unsigned integer.
pub fn field_to_biguint(value: &Field) -> BigUint {
    value.into_bigint().into()
}

/// Reduce an unsigned integer into the field.
pub fn biguint_to_field(value: &BigUint) -> Field {
    Field::from(value.clone())
}

/// Render a field element as a base-10 string.
pub fn field_to_dec_string(value: &Field) -> String {
    field_to_biguint(value).to_str_radix(10)
}

/// Parse a base-10 string into a field element.
///
/// # Error
/// Fails on non-decimal input and on values at or above the field modulus:
/// persisted data is required to be canonical, silent reduction would let two
/// distinct strings decode to the same element.
pub fn field_from_dec_str(value: &str) -> Result<Field, CryptoError> {
    let parsed = BigUint::parse_bytes(value.as_bytes(), 10)
        .ok_or_else(|| CryptoError::InvalidFieldString(value.to_owned()))?;
    if parsed >= field_modulus() {
        return Err(CryptoError::InvalidFieldString(value.to_owned()));
    }
    Ok(Field::from(parsed))
}

/// The BN254 scalar field modulus as a big integer.
pub fn field_modulus() -> BigUint {
    Field::MODULUS.into()
}

/// Big-endian 32-byte encoding, the layout hash preimages are packed with.
pub fn field_to_be_bytes(value: &Field) -> [u8; 32] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Narrow a field element to a `u64`, if it fits.
pub fn field_to_u64(value: &Field) -> Option<u64> {
    u64::try_from(field_to_biguint(value)).ok()
}

/// Narrow a field element to a tree/array index, if it fits.
pub fn field_to_usize(value: &Field) -> Option<usize> {
    field_to_u64(value).and_then(|v| usize::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn dec_string_round_trip() {
        let mut rng = ChaCha20Rng::from_seed([3u8; 32]);
        for _ in 0..20 {
            let value = Field::rand(&mut rng);
            let encoded = field_to_dec_string(&value);
            assert_eq!(field_from_dec_str(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn rejects_non_canonical_strings() {
        assert!(field_from_dec_str("not a number").is_err());
        assert!(field_from_dec_str("").is_err());
        let modulus = field_modulus().to_str_radix(10);
        assert!(field_from_dec_str(&modulus).is_err());
    }

    #[test]
    fn be_bytes_are_fixed_width() {
        assert_eq!(field_to_be_bytes(&Field::from(1u64))[31], 1);
        assert_eq!(field_to_be_bytes(&Field::from(0u64)), [0u8; 32]);
    }

    #[test]
    fn narrows_small_values_only() {
        assert_eq!(field_to_u64(&Field::from(42u64)), Some(42));
        let huge = Field::from(u64::MAX) + Field::from(1u64);
        assert_eq!(field_to_u64(&huge), None);
    }
}
