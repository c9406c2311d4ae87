//! Integer money arithmetic.
//!
//! All amounts in the system are `i64` in the smallest currency unit
//! (e.g. cents). The weighted-average cost must stay an exact integer unit,
//! so recomputation divides with rounding to nearest rather than truncation.

/// Divide `numerator / denominator`, rounding half away from zero.
///
/// The denominator must be positive (it is always a stock quantity at the
/// call sites). The result is clamped into `i64` after computing in `i128`,
/// which cannot overflow for any pair of in-range money × quantity products.
pub fn div_round(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0, "div_round requires a positive denominator");
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rounds_to_nearest_not_truncates() {
        // 20000 / 15 = 1333.33... -> 1333
        assert_eq!(div_round(20_000, 15), 1_333);
        // 25000 / 15 = 1666.66... -> 1667
        assert_eq!(div_round(25_000, 15), 1_667);
    }

    #[test]
    fn half_rounds_away_from_zero() {
        assert_eq!(div_round(5, 2), 3);
        assert_eq!(div_round(-5, 2), -3);
    }

    #[test]
    fn exact_division_is_exact() {
        assert_eq!(div_round(10_000, 10), 1_000);
        assert_eq!(div_round(0, 7), 0);
    }

    proptest! {
        /// Rounded quotient is never further than 0.5 from the true quotient.
        #[test]
        fn stays_within_half_of_true_quotient(
            num in -1_000_000_000_000i128..1_000_000_000_000i128,
            den in 1i128..1_000_000i128,
        ) {
            let q = div_round(num, den) as i128;
            // |q*den - num| <= den/2 rounded up
            let diff = (q * den - num).abs();
            prop_assert!(diff * 2 <= den);
        }
    }
}
