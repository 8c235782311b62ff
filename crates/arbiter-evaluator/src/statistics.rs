//! Statistics shared by the evaluator and (for agent-vs-best comparisons)
//! the orchestrator.

use arbiter_core::types::StatisticalSignificance;

const Z_95: f64 = 1.959_963_985_4;

/// 95% normal-approximation confidence interval for a proportion.
pub fn confidence_interval_95(successes: usize, trials: usize) -> Option<(f64, f64)> {
    if trials == 0 {
        return None;
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let margin = Z_95 * (p * (1.0 - p) / n).sqrt();
    Some(((p - margin).max(0.0), (p + margin).min(1.0)))
}

/// Two-tailed p-value for "is the observed proportion different from
/// `null_rate`", via the normal approximation to the binomial (adequate
/// at the sample sizes this evaluator runs; an exact test is unnecessary
/// complexity here).
pub fn binomial_two_tailed_p_value(successes: usize, trials: usize, null_rate: f64) -> Option<f64> {
    if trials == 0 {
        return None;
    }
    let n = trials as f64;
    let p_hat = successes as f64 / n;
    let se = (null_rate * (1.0 - null_rate) / n).sqrt();
    if se <= 0.0 {
        return None;
    }
    let z = (p_hat - null_rate) / se;
    Some(2.0 * (1.0 - standard_normal_cdf(z.abs())))
}

/// Abramowitz & Stegun 7.1.26 approximation of the standard normal CDF.
fn standard_normal_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.231_641_9 * x);
    let poly = t * (0.319_381_530 + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let pdf = (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    1.0 - pdf * poly
}

/// `StatisticalSignificance` for a win rate estimated over `trials` games,
/// compared against `null_rate` (the evaluator's default is 0.5: "is this
/// agent distinguishable from a coin flip against this opponent"). Uses a
/// fixed significance level of 0.05.
pub fn significance_vs_null(successes: usize, trials: usize, null_rate: f64) -> StatisticalSignificance {
    let rate = if trials == 0 { 0.0 } else { successes as f64 / trials as f64 };
    let p_value = binomial_two_tailed_p_value(successes, trials, null_rate);
    StatisticalSignificance {
        sample_size: trials,
        confidence_interval: confidence_interval_95(successes, trials),
        p_value,
        is_significant: p_value.is_some_and(|p| p < 0.05),
        effect_size: (rate - null_rate).abs(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

/// Cohen's-h-style fixed thresholds: < 0.05 negligible, < 0.15 small,
/// < 0.30 medium, else large.
pub fn classify_effect_size(effect_size: f64) -> EffectSize {
    if effect_size < 0.05 {
        EffectSize::Negligible
    } else if effect_size < 0.15 {
        EffectSize::Small
    } else if effect_size < 0.30 {
        EffectSize::Medium
    } else {
        EffectSize::Large
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_interval_widens_with_fewer_trials() {
        let narrow = confidence_interval_95(50, 100).unwrap();
        let wide = confidence_interval_95(5, 10).unwrap();
        assert!((wide.1 - wide.0) > (narrow.1 - narrow.0));
    }

    #[test]
    fn p_value_is_small_for_extreme_deviation_from_null() {
        let p = binomial_two_tailed_p_value(95, 100, 0.5).unwrap();
        assert!(p < 0.001);
    }

    #[test]
    fn p_value_is_large_for_rate_matching_null() {
        let p = binomial_two_tailed_p_value(50, 100, 0.5).unwrap();
        assert!(p > 0.5);
    }

    #[test]
    fn effect_size_thresholds_classify_as_expected() {
        assert_eq!(classify_effect_size(0.01), EffectSize::Negligible);
        assert_eq!(classify_effect_size(0.10), EffectSize::Small);
        assert_eq!(classify_effect_size(0.20), EffectSize::Medium);
        assert_eq!(classify_effect_size(0.50), EffectSize::Large);
    }
}
