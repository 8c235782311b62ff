//! Agent facade contract.

use arbiter_core::error::Result;
use arbiter_core::{Action, Probability, StateVector};
use std::path::Path;

/// Snapshot of per-batch learning signals. Produced by `train_batch`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateResult {
    pub loss: f32,
    pub gradient_norm: f32,
    pub policy_entropy: f32,
    pub q_value_mean: Option<f32>,
    pub target_value_mean: Option<f32>,
}

impl UpdateResult {
    pub fn has_nonfinite(&self) -> bool {
        !self.loss.is_finite() || !self.gradient_norm.is_finite() || !self.policy_entropy.is_finite()
    }
}

/// Snapshot of agent-internal bookkeeping, returned by `get_metrics`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AgentMetrics {
    pub exploration_rate: f64,
    pub internal_buffer_size: usize,
    pub episode_count: usize,
    pub recent_loss: f32,
    pub recent_entropy: f32,
}

/// For DQN-like learners: given a state, returns the set of actions
/// currently legal there, used to mask target values.
pub type ActionProvider = Box<dyn Fn(&StateVector) -> Vec<Action> + Send + Sync>;

/// Polymorphic handle over the learner. Action selection
/// and batched update are never safe to call concurrently with each other
/// or with themselves on the same agent; callers serialize access with a
/// mutex.
pub trait Agent: Send {
    /// Must return one of `valid_actions`. The orchestrator falls back to
    /// `valid_actions[0]` and records an error if it doesn't.
    fn select_action(&mut self, state: &StateVector, valid_actions: &[Action]) -> Action;

    /// One parameter update from the given mini-batch.
    fn train_batch(&mut self, transitions: &[arbiter_core::types::Transition]) -> Result<UpdateResult>;

    fn get_metrics(&self) -> AgentMetrics;

    /// No-op if the concrete learner doesn't have an exploration rate.
    fn set_exploration_rate(&mut self, _rate: Probability) {}

    /// No-op if the concrete learner isn't DQN-like.
    fn set_next_action_provider(&mut self, _provider: ActionProvider) {}

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;

    /// Clears internal transient state (e.g. an internal replay buffer)
    /// but preserves learned parameters.
    fn reset(&mut self);
}
