//! Agent Intelligence Functions
//!
//! The pure mechanisms through which agents adjust their aspirations in
//! response to market activity: first-order adaptive anchoring on prices and
//! dividends, trend detection over the per-transaction price-change signs,
//! and the representativeness adjustment applied after a detected trend.

/// Direction detected in the tail of a market's price-change signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Rising,
    Falling,
    None,
}

/// First-order adaptive update anchored on a transaction price:
/// `alpha * price + (1 - alpha) * aspiration`.
pub fn price_anchor(aspiration: f64, price: f64, alpha: f64) -> f64 {
    alpha * price + (1.0 - alpha) * aspiration
}

/// First-order adaptive update anchored on a dividend payoff, applied at
/// period end. Unrealized securities anchor on a dividend of zero.
pub fn dividend_anchor(aspiration: f64, dividend: f64, beta: f64) -> f64 {
    beta * dividend + (1.0 - beta) * aspiration
}

/// Scan the last `phi` price-change signs (+1 rising, -1 falling, 0 equal).
///
/// Returns `Falling` if all of the last `phi` signs are -1, `Rising` if all
/// are +1, and `None` otherwise. Histories shorter than `phi` and tails
/// containing any zero never form a pattern.
pub fn detect_pattern(phi: usize, signs: &[i8]) -> Pattern {
    if phi == 0 || signs.len() < phi {
        return Pattern::None;
    }
    let tail = &signs[signs.len() - phi..];
    if tail.iter().all(|&s| s == -1) {
        Pattern::Falling
    } else if tail.iter().all(|&s| s == 1) {
        Pattern::Rising
    } else {
        Pattern::None
    }
}

/// Per-security representativeness adjustment (variant 1).
///
/// A falling streak caps the aspiration at `epsilon` (a floor bet that the
/// security is worthless); a rising streak lifts it to the full dividend.
pub fn pattern_adjust(aspiration: f64, dividend: f64, epsilon: f64, pattern: Pattern) -> f64 {
    match pattern {
        Pattern::Falling => aspiration.min(epsilon),
        Pattern::Rising => dividend,
        Pattern::None => aspiration,
    }
}

/// Rescaling factor `(c + 1) / c` used by the cross-security elimination
/// heuristic (variant 2) when one of `c + 1` uncertain states is ruled out.
pub fn rescale_factor(c: usize) -> f64 {
    (c + 1) as f64 / c as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_anchor_blends() {
        assert!((price_anchor(0.4, 0.8, 0.5) - 0.6).abs() < 1e-12);
        // alpha = 0 keeps the old aspiration, alpha = 1 adopts the price.
        assert_eq!(price_anchor(0.4, 0.8, 0.0), 0.4);
        assert_eq!(price_anchor(0.4, 0.8, 1.0), 0.8);
    }

    #[test]
    fn test_dividend_anchor_on_unrealized_decays() {
        let next = dividend_anchor(0.6, 0.0, 0.25);
        assert!((next - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_detect_pattern_requires_full_window() {
        assert_eq!(detect_pattern(3, &[-1, -1]), Pattern::None);
        assert_eq!(detect_pattern(3, &[-1, -1, -1]), Pattern::Falling);
        assert_eq!(detect_pattern(3, &[1, -1, -1, -1]), Pattern::Falling);
        assert_eq!(detect_pattern(2, &[1, 1]), Pattern::Rising);
    }

    #[test]
    fn test_detect_pattern_zero_tail_is_none() {
        assert_eq!(detect_pattern(2, &[0, 0]), Pattern::None);
        assert_eq!(detect_pattern(2, &[-1, 0]), Pattern::None);
        assert_eq!(detect_pattern(1, &[0]), Pattern::None);
    }

    #[test]
    fn test_detect_pattern_only_looks_at_tail() {
        // An old falling streak is forgotten once a rise interrupts it.
        assert_eq!(detect_pattern(2, &[-1, -1, 1]), Pattern::None);
        assert_eq!(detect_pattern(1, &[-1, -1, 1]), Pattern::Rising);
    }

    #[test]
    fn test_pattern_adjust_floor_is_not_raised() {
        // Falling streak caps at epsilon but never lifts a lower aspiration.
        assert_eq!(pattern_adjust(0.5, 1.0, 0.1, Pattern::Falling), 0.1);
        assert_eq!(pattern_adjust(0.05, 1.0, 0.1, Pattern::Falling), 0.05);
        assert_eq!(pattern_adjust(0.5, 1.0, 0.1, Pattern::Rising), 1.0);
        assert_eq!(pattern_adjust(0.5, 1.0, 0.1, Pattern::None), 0.5);
    }

    #[test]
    fn test_rescale_factor() {
        assert_eq!(rescale_factor(1), 2.0);
        assert_eq!(rescale_factor(4), 1.25);
    }
}
