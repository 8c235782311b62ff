//! Data model shared across the pipeline.

use crate::{Action, Probability, Reward, StateVector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single `(state, action, reward, next_state, done)` record. Immutable
/// once emitted; owned by the producing self-play worker until the game
/// ends, then moved into the experience store.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: StateVector,
    pub action: Action,
    pub reward: Reward,
    pub next_state: StateVector,
    pub done: bool,
    pub termination_reason: Option<TerminationReason>,
    pub move_number: Option<u32>,
}

impl Transition {
    pub fn new(state: StateVector, action: Action, reward: Reward, next_state: StateVector, done: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
            termination_reason: None,
            move_number: None,
        }
    }

    pub fn with_termination(mut self, reason: TerminationReason) -> Self {
        self.termination_reason = Some(reason);
        self
    }

    pub fn with_move_number(mut self, n: u32) -> Self {
        self.move_number = Some(n);
        self
    }

    /// Mark `done` and fold the step-limit penalty into the reward,
    /// tagging the reason, unless it is already tagged with one.
    pub fn apply_step_limit_penalty(&mut self, penalty: Reward) {
        if self.termination_reason != Some(TerminationReason::StepLimit) {
            self.reward += penalty;
            self.done = true;
            self.termination_reason = Some(TerminationReason::StepLimit);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    Draw,
    Ongoing,
}

impl GameOutcome {
    pub fn is_decisive(&self) -> bool {
        matches!(self, Self::WhiteWins | Self::BlackWins)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    Checkmate,
    Stalemate,
    DrawRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    GameEnded(EndReason),
    StepLimit,
    Manual,
    Error,
}

/// Owned by the producing self-play worker, transferred to the store once
/// the game completes.
#[derive(Clone, Debug)]
pub struct SelfPlayGameResult {
    pub game_id: uuid::Uuid,
    pub length: usize,
    pub outcome: GameOutcome,
    pub termination_reason: TerminationReason,
    pub duration: Duration,
    pub transitions: Vec<Transition>,
    pub final_position_fen: String,
}

/// Aggregates over one orchestrator cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub cycle: usize,
    pub games_played: usize,
    pub transitions_collected: usize,
    pub average_game_length: f64,
    pub average_loss: f64,
    pub average_gradient_norm: f64,
    pub average_entropy: f64,
    pub batch_count: usize,
    pub win_rate: f64,
    pub draw_rate: f64,
    pub loss_rate: f64,
    pub performance_score: f64,
    pub duration: Duration,
}

/// One point in the convergence detector's sliding window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub cycle: usize,
    pub overall_score: f64,
    pub win_rate: f64,
    pub draw_rate: f64,
    pub loss: f64,
    pub entropy: f64,
}

/// Result of comparing two rate estimates (evaluator head-to-head, or
/// agent-vs-best).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StatisticalSignificance {
    pub sample_size: usize,
    pub confidence_interval: Option<(f64, f64)>,
    pub p_value: Option<f64>,
    pub is_significant: bool,
    pub effect_size: f64,
}
