//! Convergence detector: stability analysis over a
//! sliding window of performance scores.

use arbiter_core::config::ConvergenceConfig;
use arbiter_core::types::PerformanceSnapshot;
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceStatus {
    Converged,
    Improving,
    Stagnant,
}

/// Ordinary least-squares slope of `scores` against their index.
fn ols_slope(scores: &[f64]) -> f64 {
    let n = scores.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..scores.len()).map(|i| i as f64).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = scores.iter().sum::<f64>() / n;
    let numerator: f64 = xs.iter().zip(scores).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let denominator: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

fn mean(scores: &[f64]) -> f64 {
    scores.iter().sum::<f64>() / scores.len().max(1) as f64
}

fn std_dev(scores: &[f64], mean: f64) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (scores.len() - 1) as f64;
    variance.sqrt()
}

/// `1 / (1 + σ/|μ|)`, with the degenerate case `σ≈0 and μ≈0 → 1`.
fn stability(scores: &[f64]) -> f64 {
    let mu = mean(scores);
    let sigma = std_dev(scores, mu);
    if sigma.abs() < 1e-9 && mu.abs() < 1e-9 {
        return 1.0;
    }
    1.0 / (1.0 + sigma / mu.abs().max(1e-9))
}

/// Maintains a bounded sliding window of `PerformanceSnapshot`s and reports
/// trend/stability/status on demand.
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    window: VecDeque<PerformanceSnapshot>,
}

#[derive(Clone, Copy, Debug)]
pub struct ConvergenceReport {
    pub status: ConvergenceStatus,
    pub trend: f64,
    pub stability: f64,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig) -> Self {
        let window = VecDeque::with_capacity(config.window);
        Self { config, window }
    }

    pub fn record(&mut self, snapshot: PerformanceSnapshot) {
        self.window.push_back(snapshot);
        while self.window.len() > self.config.window {
            self.window.pop_front();
        }
    }

    /// `None` until the window has at least two points.
    pub fn evaluate(&self) -> Option<ConvergenceReport> {
        if self.window.len() < 2 {
            return None;
        }
        let scores: Vec<f64> = self.window.iter().map(|s| s.overall_score).collect();
        let trend = ols_slope(&scores);
        let stability = stability(&scores);

        let status = if stability > self.config.stability_threshold && trend.abs() < self.config.trend_threshold {
            ConvergenceStatus::Converged
        } else if trend > self.config.trend_threshold {
            ConvergenceStatus::Improving
        } else {
            ConvergenceStatus::Stagnant
        };

        Some(ConvergenceReport { status, trend, stability })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cycle: usize, score: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            cycle,
            overall_score: score,
            win_rate: score,
            draw_rate: 0.0,
            loss: 0.1,
            entropy: 0.5,
        }
    }

    #[test]
    fn flat_scores_converge() {
        let mut detector = ConvergenceDetector::new(ConvergenceConfig::default());
        for cycle in 0..10 {
            detector.record(snapshot(cycle, 0.8));
        }
        let report = detector.evaluate().unwrap();
        assert_eq!(report.status, ConvergenceStatus::Converged);
        assert!((report.stability - 1.0).abs() < 1e-6);
    }

    #[test]
    fn steadily_rising_scores_are_improving() {
        let mut detector = ConvergenceDetector::new(ConvergenceConfig::default());
        for cycle in 0..10 {
            detector.record(snapshot(cycle, 0.1 * cycle as f64));
        }
        let report = detector.evaluate().unwrap();
        assert_eq!(report.status, ConvergenceStatus::Improving);
        assert!(report.trend > 0.0);
    }

    #[test]
    fn noisy_flat_scores_are_stagnant_not_converged() {
        let mut detector = ConvergenceDetector::new(ConvergenceConfig::default());
        let noisy = [0.2, 0.8, 0.1, 0.9, 0.3, 0.7, 0.2, 0.8, 0.1, 0.9];
        for (cycle, score) in noisy.into_iter().enumerate() {
            detector.record(snapshot(cycle, score));
        }
        let report = detector.evaluate().unwrap();
        assert_eq!(report.status, ConvergenceStatus::Stagnant);
    }

    #[test]
    fn window_never_grows_past_configured_size() {
        let mut config = ConvergenceConfig::default();
        config.window = 3;
        let mut detector = ConvergenceDetector::new(config);
        for cycle in 0..10 {
            detector.record(snapshot(cycle, cycle as f64));
        }
        assert_eq!(detector.window.len(), 3);
    }

    proptest::proptest! {
        #[test]
        fn window_never_exceeds_configured_size_for_any_sequence(
            window_size in 1usize..20,
            scores in proptest::collection::vec(-10.0f64..10.0, 0..50),
        ) {
            let mut config = ConvergenceConfig::default();
            config.window = window_size;
            let mut detector = ConvergenceDetector::new(config);
            for (cycle, score) in scores.iter().enumerate() {
                detector.record(snapshot(cycle, *score));
                proptest::prop_assert!(detector.window.len() <= window_size);
            }
        }

        #[test]
        fn stability_is_always_in_unit_interval(
            scores in proptest::collection::vec(-1000.0f64..1000.0, 2..50),
        ) {
            let s = stability(&scores);
            proptest::prop_assert!(s.is_finite());
            proptest::prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
