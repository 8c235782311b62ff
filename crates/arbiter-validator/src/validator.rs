//! Training validator: inspects pre/post-update metrics
//! and the latest `UpdateResult`, raising typed issues and maintaining
//! exponentially smoothed gradient/entropy signals. Never mutates the
//! agent; it only reports.

use arbiter_agent::{AgentMetrics, UpdateResult};
use arbiter_core::config::ValidatorConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueType {
    ExplodingGradients,
    VanishingGradients,
    PolicyCollapse,
    NumericalInstability,
    LargeLossChange,
    ExplorationInsufficient,
    QValueOverestimation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Issue {
    pub kind: IssueType,
    pub severity: Severity,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<Issue>,
    pub smoothed_gradient_norm: f64,
    pub smoothed_entropy: f64,
}

/// Maintains EMAs across calls. One instance tracks one agent's training.
pub struct TrainingValidator {
    config: ValidatorConfig,
    ema_gradient_norm: Option<f64>,
    ema_entropy: Option<f64>,
    last_loss: Option<f64>,
}

impl TrainingValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            ema_gradient_norm: None,
            ema_entropy: None,
            last_loss: None,
        }
    }

    fn smooth(previous: Option<f64>, new_value: f64, smoothing_new: f64) -> f64 {
        match previous {
            Some(ema) => smoothing_new * new_value + (1.0 - smoothing_new) * ema,
            None => new_value,
        }
    }

    /// Run one check. `pre`/`post` are the agent's `get_metrics()` snapshot
    /// before and after the batch; `episode_index` is used only in issue
    /// messages.
    pub fn check(&mut self, pre: &AgentMetrics, post: &AgentMetrics, update: &UpdateResult, episode_index: usize) -> ValidationReport {
        let mut issues = Vec::new();

        if !update.loss.is_finite() || !update.gradient_norm.is_finite() {
            issues.push(Issue {
                kind: IssueType::NumericalInstability,
                severity: Severity::Critical,
                message: format!(
                    "episode {episode_index}: non-finite update (loss={}, grad_norm={})",
                    update.loss, update.gradient_norm
                ),
            });
        }

        let grad_norm = update.gradient_norm as f64;
        self.ema_gradient_norm = Some(Self::smooth(self.ema_gradient_norm, grad_norm, self.config.smoothing_new));
        let smoothed_gradient_norm = self.ema_gradient_norm.unwrap_or(grad_norm);

        if update.gradient_norm as f64 > self.config.clip_threshold {
            issues.push(Issue {
                kind: IssueType::ExplodingGradients,
                severity: Severity::Critical,
                message: format!(
                    "episode {episode_index}: gradient_norm {:.4} exceeds clip_threshold {:.4}",
                    update.gradient_norm, self.config.clip_threshold
                ),
            });
        } else if (update.gradient_norm as f64) < self.config.min_gradient_norm {
            issues.push(Issue {
                kind: IssueType::VanishingGradients,
                severity: Severity::Warning,
                message: format!(
                    "episode {episode_index}: gradient_norm {:.6} below min_gradient_norm {:.6}",
                    update.gradient_norm, self.config.min_gradient_norm
                ),
            });
        }

        let entropy = update.policy_entropy as f64;
        self.ema_entropy = Some(Self::smooth(self.ema_entropy, entropy, self.config.smoothing_new));
        let smoothed_entropy = self.ema_entropy.unwrap_or(entropy);

        if entropy < self.config.min_policy_entropy {
            issues.push(Issue {
                kind: IssueType::PolicyCollapse,
                severity: Severity::Warning,
                message: format!(
                    "episode {episode_index}: policy_entropy {:.4} below min_policy_entropy {:.4}",
                    entropy, self.config.min_policy_entropy
                ),
            });
        }

        let loss = update.loss as f64;
        if let Some(previous) = self.last_loss {
            let delta = (loss - previous).abs();
            if delta > self.config.large_loss_change {
                issues.push(Issue {
                    kind: IssueType::LargeLossChange,
                    severity: Severity::Warning,
                    message: format!("episode {episode_index}: |Δloss| {delta:.4} exceeds threshold {:.4}", self.config.large_loss_change),
                });
            }
        }
        self.last_loss = Some(loss);

        if post.exploration_rate < pre.exploration_rate && post.recent_loss > pre.recent_loss {
            issues.push(Issue {
                kind: IssueType::ExplorationInsufficient,
                severity: Severity::Info,
                message: format!(
                    "episode {episode_index}: exploration decayed ({:.4} -> {:.4}) while loss regressed ({:.4} -> {:.4})",
                    pre.exploration_rate, post.exploration_rate, pre.recent_loss, post.recent_loss
                ),
            });
        }

        if let (Some(q_mean), Some(target_mean)) = (update.q_value_mean, update.target_value_mean) {
            let overestimate = (q_mean - target_mean) as f64;
            if overestimate > self.config.q_overestimation_bound {
                issues.push(Issue {
                    kind: IssueType::QValueOverestimation,
                    severity: Severity::Warning,
                    message: format!(
                        "episode {episode_index}: q_value_mean exceeds target_value_mean by {overestimate:.4}"
                    ),
                });
            }
        }

        let is_valid = !issues.iter().any(|i| i.severity == Severity::Critical);
        for issue in &issues {
            match issue.severity {
                Severity::Critical => log::error!("{}", issue.message),
                Severity::Warning => log::warn!("{}", issue.message),
                Severity::Info => log::info!("{}", issue.message),
            }
        }

        ValidationReport {
            is_valid,
            issues,
            smoothed_gradient_norm,
            smoothed_entropy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> AgentMetrics {
        AgentMetrics {
            exploration_rate: 0.2,
            internal_buffer_size: 0,
            episode_count: 0,
            recent_loss: 0.5,
            recent_entropy: 0.8,
        }
    }

    #[test]
    fn non_finite_update_is_critical_and_invalid() {
        let mut validator = TrainingValidator::new(ValidatorConfig::default());
        let update = UpdateResult {
            loss: f32::NAN,
            gradient_norm: 1.0,
            policy_entropy: 0.5,
            q_value_mean: None,
            target_value_mean: None,
        };
        let report = validator.check(&metrics(), &metrics(), &update, 0);
        assert!(!report.is_valid);
        assert!(report.issues.iter().any(|i| i.kind == IssueType::NumericalInstability));
    }

    #[test]
    fn exploding_gradient_flagged_above_clip_threshold() {
        let mut validator = TrainingValidator::new(ValidatorConfig::default());
        let update = UpdateResult {
            loss: 0.1,
            gradient_norm: 100.0,
            policy_entropy: 0.5,
            q_value_mean: None,
            target_value_mean: None,
        };
        let report = validator.check(&metrics(), &metrics(), &update, 1);
        assert!(report.issues.iter().any(|i| i.kind == IssueType::ExplodingGradients));
    }

    #[test]
    fn low_entropy_flags_policy_collapse() {
        let mut validator = TrainingValidator::new(ValidatorConfig::default());
        let update = UpdateResult {
            loss: 0.1,
            gradient_norm: 0.5,
            policy_entropy: 0.0001,
            q_value_mean: None,
            target_value_mean: None,
        };
        let report = validator.check(&metrics(), &metrics(), &update, 2);
        assert!(report.issues.iter().any(|i| i.kind == IssueType::PolicyCollapse));
        assert!(report.is_valid);
    }

    #[test]
    fn ema_smooths_toward_new_value_over_repeated_calls() {
        let mut validator = TrainingValidator::new(ValidatorConfig::default());
        let update = UpdateResult {
            loss: 0.1,
            gradient_norm: 1.0,
            policy_entropy: 0.5,
            q_value_mean: None,
            target_value_mean: None,
        };
        let first = validator.check(&metrics(), &metrics(), &update, 0).smoothed_gradient_norm;
        let second = validator.check(&metrics(), &metrics(), &update, 1).smoothed_gradient_norm;
        assert!((first - 1.0).abs() < 1e-9);
        assert!((second - 1.0).abs() < 1e-9);
    }
}
