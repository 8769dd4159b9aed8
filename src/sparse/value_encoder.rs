//! Feature weights travel through the postings as term frequencies: the
//! frequency holds the upper bits of the weight's `f32` representation.

use crate::error::{IrisError, Result};

const SHIFT: u32 = 15;

/// Largest weight that survives the round trip.
pub const MAX_FEATURE_VALUE: f32 = 65_000.0;

pub fn decode_feature_value(freq: i32) -> f32 {
    f32::from_bits((freq as u32) << SHIFT)
}

/// Inverse of [`decode_feature_value`], truncating the low mantissa bits.
pub fn encode_feature_value(value: f32) -> Result<i32> {
    if !value.is_finite() || value <= 0.0 || value > MAX_FEATURE_VALUE {
        return Err(IrisError::invalid_argument(format!(
            "feature value must be a positive finite number up to {MAX_FEATURE_VALUE}, got {value}"
        )));
    }
    Ok((value.to_bits() >> SHIFT) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_leading_bits() {
        for value in [0.5_f32, 1.0, 2.0, 3.0, 12.5] {
            let freq = encode_feature_value(value).unwrap();
            assert_eq!(decode_feature_value(freq), value);
        }
        let lossy = decode_feature_value(encode_feature_value(1.2345).unwrap());
        assert!((lossy - 1.2345).abs() < 0.01);
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(encode_feature_value(0.0).is_err());
        assert!(encode_feature_value(f32::INFINITY).is_err());
    }
}
