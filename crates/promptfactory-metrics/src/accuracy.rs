use promptfactory_core::model::Rating;

const PREVIOUS_WEIGHT: f64 = 0.3;
const QUALITY_WEIGHT: f64 = 0.7;
const GOOD_GAIN: f64 = 0.15;
const BAD_PENALTY: f64 = 0.30;

fn clamp_pct(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 100.0)
}

/// Blend the previous accuracy with a fresh judge score, then nudge it by
/// each thumbs rating. Gains and penalties are taken against the blended
/// base, not the running value, so rating order does not matter.
pub fn blend_accuracy(original_accuracy: f64, overall_quality: f64, ratings: &[Rating]) -> f64 {
    let base = PREVIOUS_WEIGHT * clamp_pct(original_accuracy)
        + QUALITY_WEIGHT * clamp_pct(overall_quality);

    let mut score = base;
    for rating in ratings {
        match rating {
            Rating::Good => score += GOOD_GAIN * (100.0 - base),
            Rating::Bad => score -= BAD_PENALTY * base,
        }
    }

    (clamp_pct(score) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_feedback_keeps_base() {
        assert_eq!(blend_accuracy(50.0, 50.0, &[]), 50.0);
    }

    #[test]
    fn test_single_signals() {
        assert_eq!(blend_accuracy(50.0, 50.0, &[Rating::Good]), 57.5);
        assert_eq!(blend_accuracy(50.0, 50.0, &[Rating::Bad]), 35.0);
    }

    #[test]
    fn test_mixed_signals_are_order_independent() {
        assert_eq!(blend_accuracy(50.0, 50.0, &[Rating::Good, Rating::Bad]), 42.5);
        assert_eq!(blend_accuracy(50.0, 50.0, &[Rating::Bad, Rating::Good]), 42.5);
    }

    #[test]
    fn test_clamps_at_both_ends() {
        assert_eq!(blend_accuracy(100.0, 100.0, &[Rating::Good; 5]), 100.0);
        assert_eq!(blend_accuracy(10.0, 10.0, &[Rating::Bad; 5]), 0.0);
        assert_eq!(blend_accuracy(250.0, -40.0, &[]), 30.0);
    }

    #[test]
    fn test_rounds_to_one_decimal() {
        // 0.3 * 33 + 0.7 * 77 = 63.8
        assert_eq!(blend_accuracy(33.0, 77.0, &[]), 63.8);
        // base 63.8, +0.15 * 36.2 = 69.23
        assert_eq!(blend_accuracy(33.0, 77.0, &[Rating::Good]), 69.2);
    }
}
