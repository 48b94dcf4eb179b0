//! Two's-complement normalization of 32-bit wire integers.
//!
//! The confidential backend stores trend metrics as unsigned 32-bit
//! ciphertexts with wrapping arithmetic, so a negative trend arrives as a
//! large unsigned value after decryption.

/// 2^31, the first unsigned value that represents a negative number
pub const SIGN_BIT: u32 = 0x8000_0000;

const TWO_POW_32: i64 = 1 << 32;

/// Convert an unsigned 32-bit wire value into its signed domain value.
///
/// Values below 2^31 are unchanged; values at or above map to `value - 2^32`.
pub fn normalize_signed32(value: u32) -> i32 {
    if value >= SIGN_BIT {
        (i64::from(value) - TWO_POW_32) as i32
    } else {
        value as i32
    }
}

/// Normalize a decrypted wire value that is expected to fit in 32 bits.
///
/// Returns `None` when the value is wider than 32 bits, which means the
/// handle was not a 32-bit ciphertext.
pub fn normalize_wire(value: u64) -> Option<i32> {
    u32::try_from(value).ok().map(normalize_signed32)
}

/// Inverse of [`normalize_signed32`]: the wire encoding of a signed value.
pub fn to_wire32(value: i32) -> u32 {
    if value < 0 {
        (i64::from(value) + TWO_POW_32) as u32
    } else {
        value as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(normalize_signed32(0), 0);
        assert_eq!(normalize_signed32(SIGN_BIT - 1), i32::MAX);
        assert_eq!(normalize_signed32(SIGN_BIT), i32::MIN);
        assert_eq!(normalize_signed32(u32::MAX), -1);
    }

    #[test]
    fn test_all_ones_trend_is_minus_one() {
        assert_eq!(normalize_wire(4_294_967_295), Some(-1));
    }

    #[test]
    fn test_wide_values_rejected() {
        assert_eq!(normalize_wire(1u64 << 32), None);
        assert_eq!(normalize_wire(42), Some(42));
    }

    proptest! {
        #[test]
        fn non_negative_range_is_identity(v in 0u32..SIGN_BIT) {
            prop_assert_eq!(i64::from(normalize_signed32(v)), i64::from(v));
        }

        #[test]
        fn upper_range_is_shifted_negative(v in SIGN_BIT..=u32::MAX) {
            let n = normalize_signed32(v);
            prop_assert_eq!(i64::from(n), i64::from(v) - (1i64 << 32));
            prop_assert!(n < 0);
        }

        #[test]
        fn normalization_is_a_bijection(v in any::<u32>(), s in any::<i32>()) {
            prop_assert_eq!(to_wire32(normalize_signed32(v)), v);
            prop_assert_eq!(normalize_signed32(to_wire32(s)), s);
        }
    }
}
