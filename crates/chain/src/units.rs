//! Token amount arithmetic on U256 / I256.
//!
//! Raw on-chain integers are normalized by dividing by `10^decimals`
//! (truncating); deltas between snapshots are signed.

use alloy::primitives::{I256, U256};

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Power of 10 as U256. Exponents past 77 saturate to `U256::MAX`.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64)
            .checked_pow(U256::from(exp))
            .unwrap_or(U256::MAX)
    }
}

/// Scale a raw token amount down by `10^decimals`.
///
/// Example: `normalize(123456789, 6) == 123`, `normalize(x, 0) == x`.
#[inline(always)]
pub fn normalize(raw: U256, decimals: u8) -> U256 {
    raw / pow10(decimals)
}

/// Signed variant of [`normalize`]; truncates toward zero.
pub fn normalize_signed(raw: I256, decimals: u8) -> I256 {
    let magnitude = normalize(raw.unsigned_abs(), decimals);
    let scaled = I256::from_raw(magnitude);
    if raw.is_negative() {
        -scaled
    } else {
        scaled
    }
}

/// `new - old` as a signed integer.
pub fn delta(new: U256, old: U256) -> I256 {
    if new >= old {
        I256::from_raw(new - old)
    } else {
        -I256::from_raw(old - new)
    }
}

/// `|value| >= threshold`.
pub fn exceeds(value: I256, threshold: U256) -> bool {
    value.unsigned_abs() >= threshold
}

/// Convert to f64 for display ratios only.
pub fn to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        let v: u128 = value.to();
        v as f64
    } else {
        let limbs = value.as_limbs();
        let mut out = 0.0;
        for limb in limbs.iter().rev() {
            out = out * (u64::MAX as f64 + 1.0) + *limb as f64;
        }
        out
    }
}

/// Percentage `value / total * 100` for display.
pub fn pct_f64(value: U256, total: U256) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    to_f64(value) * 100.0 / to_f64(total)
}

/// Decimal rendering with `,` thousands separators.
pub fn readable(value: U256) -> String {
    group_thousands(&value.to_string())
}

/// Signed decimal rendering with `,` thousands separators.
pub fn readable_signed(value: I256) -> String {
    let digits = group_thousands(&value.unsigned_abs().to_string());
    if value.is_negative() {
        format!("-{digits}")
    } else {
        digits
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow10_lookup() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(pow10(40), U256::from(10u64).pow(U256::from(40u64)));
        assert_eq!(pow10(200), U256::MAX);
    }

    #[test]
    fn test_normalize() {
        let raw = U256::from(123_456_789u64);
        assert_eq!(normalize(raw, 6), U256::from(123u64));
        assert_eq!(normalize(raw, 0), raw);
        assert_eq!(normalize(raw, 18), U256::ZERO);
    }

    #[test]
    fn test_normalize_signed_truncates_toward_zero() {
        let raw = I256::try_from(-2_500_000i64).unwrap();
        assert_eq!(normalize_signed(raw, 6), I256::try_from(-2i64).unwrap());
        let raw = I256::try_from(2_500_000i64).unwrap();
        assert_eq!(normalize_signed(raw, 6), I256::try_from(2i64).unwrap());
    }

    #[test]
    fn test_delta_and_threshold() {
        let up = delta(U256::from(150u64), U256::from(100u64));
        let down = delta(U256::from(100u64), U256::from(150u64));
        assert_eq!(up, I256::try_from(50i64).unwrap());
        assert_eq!(down, I256::try_from(-50i64).unwrap());
        assert!(exceeds(down, U256::from(50u64)));
        assert!(!exceeds(down, U256::from(51u64)));
    }

    #[test]
    fn test_readable() {
        assert_eq!(readable(U256::ZERO), "0");
        assert_eq!(readable(U256::from(999u64)), "999");
        assert_eq!(readable(U256::from(1_000u64)), "1,000");
        assert_eq!(readable(U256::from(12_345_678u64)), "12,345,678");
        assert_eq!(readable_signed(I256::try_from(-1_234i64).unwrap()), "-1,234");
    }

    #[test]
    fn test_pct() {
        assert!((pct_f64(U256::from(1u64), U256::from(4u64)) - 25.0).abs() < 1e-9);
        assert_eq!(pct_f64(U256::from(1u64), U256::ZERO), 0.0);
    }
}
