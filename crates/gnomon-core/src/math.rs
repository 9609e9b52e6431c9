//! Math helpers for no_std compatibility.
//!
//! In no_std mode, f64 doesn't have transcendental methods like log10 or
//! round. This module provides the few we need using libm, plus the rounding
//! integer division the histogram leans on.

/// Base-10 logarithm.
#[inline]
pub fn log10(x: f64) -> f64 {
    libm::log10(x)
}

/// Round to nearest integer, ties away from zero.
#[inline]
pub fn round(x: f64) -> f64 {
    libm::round(x)
}

/// Integer division rounded to nearest instead of truncated.
#[inline]
pub fn round_div(dividend: u64, divisor: u64) -> u64 {
    (dividend + divisor / 2) / divisor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_div_rounds_to_nearest() {
        assert_eq!(round_div(10, 4), 3); // 2.5 rounds up
        assert_eq!(round_div(9, 4), 2); // 2.25 rounds down
        assert_eq!(round_div(0, 4), 0);
        assert_eq!(round_div(7, 1), 7);
    }

    #[test]
    fn round_ties_away_from_zero() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(2.4), 2.0);
        assert_eq!(round(-2.5), -3.0);
    }
}
