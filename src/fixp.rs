//! Q13 fixed-point helpers
//!
//! PLL feedback coefficients carry a fractional part with an implied
//! denominator of 8192 (13 bits). The helpers here centralize the wide
//! intermediate arithmetic so the overflow bounds live in one place instead
//! of being re-justified at every call site: a kHz value fits in 32 bits and
//! a Q13 coefficient fits in 23 bits, so the product always fits in 64 bits.

/// Denominator of the fractional NDIV encoding.
pub const Q13_ONE: u32 = 8192;

/// Half of [`Q13_ONE`]; added before a truncating shift-down to round the
/// fractional part to the nearest integer.
pub const Q13_HALF: u32 = 4096;

/// Builds a Q13 coefficient from integer and fractional parts.
pub const fn q13(int: u32, frac: u32) -> u64 {
    int as u64 * Q13_ONE as u64 + frac as u64
}

/// `khz * coeff / div / 8192`, dividing by `div` before the denominator to
/// preserve precision, truncating at each step.
///
/// Returns `None` when the result does not fit the 32-bit kHz word; callers
/// treat that as a firmware-fatal condition, never a rounding problem.
pub fn mul_q13_khz(khz: u32, coeff_q13: u64, div: u32) -> Option<u32> {
    if div == 0 {
        return None;
    }
    let wide = (khz as u64).checked_mul(coeff_q13)?;
    let out = wide / div as u64 / Q13_ONE as u64;
    if out > u32::max_value() as u64 {
        None
    } else {
        Some(out as u32)
    }
}

/// Rounds a Q13 value to the nearest integer, halves up.
pub const fn q13_round(value_q13: u64) -> u64 {
    (value_q13 + Q13_HALF as u64) / Q13_ONE as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coefficients_are_exact() {
        // 27 MHz * 30 / 1
        assert_eq!(mul_q13_khz(27_000, q13(30, 0), 1), Some(810_000));
    }

    #[test]
    fn fractional_part_scales_by_8192() {
        // coeff = 30 + 4096/8192 = 30.5
        assert_eq!(mul_q13_khz(27_000, q13(30, 4096), 1), Some(823_500));
    }

    #[test]
    fn divisor_applies_before_denominator() {
        assert_eq!(mul_q13_khz(27_000, q13(60, 0), 2), Some(810_000));
    }

    #[test]
    fn overflow_and_zero_divisor_are_refused() {
        assert_eq!(mul_q13_khz(u32::max_value(), q13(61, 0), 1), None);
        assert_eq!(mul_q13_khz(27_000, q13(30, 0), 0), None);
    }

    #[test]
    fn rounding_is_to_nearest() {
        assert_eq!(q13_round(q13(30, 4095)), 30);
        assert_eq!(q13_round(q13(30, 4096)), 31);
    }
}
