//! Training configuration. Every recognized key is an
//! explicit field; an unrecognized key is rejected at init via
//! `#[serde(deny_unknown_fields)]`, and every numeric knob is range-checked
//! in `validate()` — both paths return `Error::Config`, matching the
//! design note "unknown keys are rejected at init with ConfigError."

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    Dqn,
    PolicyGradient,
    ActorCritic,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CleanupStrategy {
    OldestFirst,
    LowestQuality,
    Random,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SamplingStrategy {
    Uniform,
    Recent,
    Mixed { p_recent: f64 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Mixed { p_recent: 0.5 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OpponentStrategy {
    CopyMain { opp_freq: usize },
    Historical { opp_freq: usize, lag: usize },
    Adaptive { adapt_threshold: f64 },
    Fixed,
}

impl Default for OpponentStrategy {
    fn default() -> Self {
        Self::CopyMain { opp_freq: 2 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionPolicy {
    pub keep_best: bool,
    pub keep_last_n: usize,
    pub keep_every_n: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_best: true,
            keep_last_n: 5,
            keep_every_n: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExplorationSchedule {
    pub warmup_cycles: usize,
    pub warmup_rate: f64,
    pub eps_start: f64,
    pub eps_end: f64,
    pub eps_cycles: usize,
}

impl Default for ExplorationSchedule {
    fn default() -> Self {
        Self {
            warmup_cycles: 2,
            warmup_rate: 0.5,
            eps_start: 0.3,
            eps_end: 0.05,
            eps_cycles: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AdaptiveScheduling {
    pub enabled: bool,
    pub window: usize,
    pub improvement_threshold: f64,
    pub games_min: usize,
    pub training_ratio_max: f64,
}

impl Default for AdaptiveScheduling {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 5,
            improvement_threshold: 0.01,
            games_min: 2,
            training_ratio_max: 4.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RollbackPolicy {
    pub enabled: bool,
    pub warmup_cycles: usize,
    pub window: usize,
    pub threshold: f64,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            warmup_cycles: 2,
            window: 3,
            threshold: 0.15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ValidatorConfig {
    pub smoothing_new: f64,
    pub clip_threshold: f64,
    pub min_gradient_norm: f64,
    pub min_policy_entropy: f64,
    pub large_loss_change: f64,
    pub q_overestimation_bound: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            smoothing_new: 0.2,
            clip_threshold: 10.0,
            min_gradient_norm: 1e-6,
            min_policy_entropy: 0.01,
            large_loss_change: 5.0,
            q_overestimation_bound: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EvaluationConfig {
    pub games: usize,
    pub step_limit_penalty: f32,
    pub adjudication_material_threshold: i32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            games: 20,
            step_limit_penalty: 0.0,
            adjudication_material_threshold: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConvergenceConfig {
    pub enabled: bool,
    pub window: usize,
    pub stability_threshold: f64,
    pub trend_threshold: f64,
    pub stop_on_converged: bool,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 10,
            stability_threshold: 0.9,
            trend_threshold: 0.01,
            stop_on_converged: false,
        }
    }
}

/// Top-level recognized configuration. Every recognized field maps to a
/// CLI surface parameter or a component contract knob; anything else
/// fails to parse.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrainingConfig {
    pub name: String,
    pub controller_type: ControllerType,
    pub iterations: usize,
    pub deterministic_flag: bool,
    pub learning_rate: f64,
    pub exploration_rate: f64,
    pub batch_size: usize,
    pub games_per_cycle: usize,
    pub seed: u64,

    pub concurrent_workers: usize,
    pub max_steps: usize,
    pub step_limit_penalty: f32,

    pub experience_capacity: usize,
    pub cleanup_ratio: f64,
    pub cleanup_strategy: CleanupStrategy,
    pub sampling_strategy: SamplingStrategy,
    pub training_ratio: f64,
    pub max_batches: usize,

    pub exploration_schedule: ExplorationSchedule,
    pub opponent_warmup_cycles: usize,
    pub opponent_strategy: OpponentStrategy,

    pub evaluation: EvaluationConfig,
    pub checkpoint_interval: usize,
    pub checkpoint_base_dir: String,
    pub retention: RetentionPolicy,

    pub adaptive: AdaptiveScheduling,
    pub rollback: RollbackPolicy,
    pub validator: ValidatorConfig,
    pub convergence: ConvergenceConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            name: "arbiter-run".to_string(),
            controller_type: ControllerType::Dqn,
            iterations: 100,
            deterministic_flag: true,
            learning_rate: 1e-3,
            exploration_rate: 0.2,
            batch_size: 64,
            games_per_cycle: 10,
            seed: 0,

            concurrent_workers: num_cpus_hint(),
            max_steps: 200,
            step_limit_penalty: -0.1,

            experience_capacity: 100_000,
            cleanup_ratio: 0.2,
            cleanup_strategy: CleanupStrategy::OldestFirst,
            sampling_strategy: SamplingStrategy::default(),
            training_ratio: 1.0,
            max_batches: 32,

            exploration_schedule: ExplorationSchedule::default(),
            opponent_warmup_cycles: 0,
            opponent_strategy: OpponentStrategy::default(),

            evaluation: EvaluationConfig::default(),
            checkpoint_interval: 5,
            checkpoint_base_dir: "checkpoints".to_string(),
            retention: RetentionPolicy::default(),

            adaptive: AdaptiveScheduling::default(),
            rollback: RollbackPolicy::default(),
            validator: ValidatorConfig::default(),
            convergence: ConvergenceConfig::default(),
        }
    }
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TrainingConfig {
    /// Parse and validate a TOML configuration file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every numeric knob. Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("name must not be empty"));
        }
        if self.iterations == 0 {
            return Err(Error::config("iterations must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if self.games_per_cycle == 0 {
            return Err(Error::config("games_per_cycle must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(Error::config("exploration_rate must be in [0, 1]"));
        }
        if self.learning_rate <= 0.0 {
            return Err(Error::config("learning_rate must be > 0"));
        }
        if self.concurrent_workers == 0 {
            return Err(Error::config("concurrent_workers must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(Error::config("max_steps must be > 0"));
        }
        if self.experience_capacity == 0 {
            return Err(Error::config("experience_capacity must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.cleanup_ratio) {
            return Err(Error::config("cleanup_ratio must be in [0, 1]"));
        }
        if let SamplingStrategy::Mixed { p_recent } = self.sampling_strategy {
            if !(0.0..=1.0).contains(&p_recent) {
                return Err(Error::config("sampling_strategy.p_recent must be in [0, 1]"));
            }
        }
        if self.training_ratio <= 0.0 {
            return Err(Error::config("training_ratio must be > 0"));
        }
        if self.max_batches == 0 {
            return Err(Error::config("max_batches must be > 0"));
        }
        let es = &self.exploration_schedule;
        if !(0.0..=1.0).contains(&es.warmup_rate) {
            return Err(Error::config("exploration_schedule.warmup_rate must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&es.eps_start) || !(0.0..=1.0).contains(&es.eps_end) {
            return Err(Error::config("exploration_schedule eps bounds must be in [0, 1]"));
        }
        if self.evaluation.games == 0 && self.checkpoint_interval == 0 {
            log::warn!("evaluation.games and checkpoint_interval are both 0; no evaluation or periodic checkpoints will occur");
        }
        if self.checkpoint_base_dir.trim().is_empty() {
            return Err(Error::config("checkpoint_base_dir must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.adaptive.improvement_threshold) {
            return Err(Error::config("adaptive.improvement_threshold must be in [0, 1]"));
        }
        if self.adaptive.training_ratio_max < self.training_ratio {
            return Err(Error::config(
                "adaptive.training_ratio_max must be >= training_ratio",
            ));
        }
        if !(0.0..=1.0).contains(&self.rollback.threshold) {
            return Err(Error::config("rollback.threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.validator.smoothing_new) {
            return Err(Error::config("validator.smoothing_new must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.convergence.stability_threshold) {
            return Err(Error::config("convergence.stability_threshold must be in [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        TrainingConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let toml = r#"
            name = "x"
            unknown_field = 42
        "#;
        let err = TrainingConfig::parse(toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn out_of_range_exploration_rate_is_rejected() {
        let mut config = TrainingConfig::default();
        config.exploration_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml = r#"
            name = "smoke-test"
            seed = 42
        "#;
        let config = TrainingConfig::parse(toml).expect("should parse with defaults");
        assert_eq!(config.seed, 42);
        assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
    }
}
