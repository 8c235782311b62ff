//! Environment facade contract.

use arbiter_core::types::GameOutcome;
use arbiter_core::{Action, Reward, StateVector};

/// `status()` return type. Reuses the same sum type as
/// `SelfPlayGameResult::outcome` — a terminal environment's `status()` and
/// the outcome later recorded for the game are the same value.
pub type GameStatus = GameOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

/// Extra bookkeeping returned alongside a `step()` call. `illegal` lets the
/// orchestrator distinguish "the environment rejected this action" (an
/// `EnvironmentError`) from an ordinary terminal step.
#[derive(Clone, Debug, Default)]
pub struct StepInfo {
    pub illegal: bool,
    pub note: Option<String>,
}

/// `chess_metrics()` return value, consumed by reporting collaborators.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChessMetrics {
    pub game_length: usize,
    pub capture_count: usize,
    pub check_count: usize,
    pub legal_move_rate: f64,
}

/// Reward shaping configuration, supplied to the environment at
/// construction.
#[derive(Clone, Copy, Debug)]
pub struct RewardConfig {
    pub win_reward: Reward,
    pub loss_reward: Reward,
    pub draw_reward: Reward,
    pub step_penalty: Reward,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            win_reward: 1.0,
            loss_reward: -1.0,
            draw_reward: 0.0,
            step_penalty: 0.0,
        }
    }
}

/// Polymorphic handle over the rules engine. The chess
/// rules engine itself — move generation, legality, FEN encoding — is an
/// external collaborator; this crate specifies only the contract it must
/// expose and a toy implementation (`toy::ToyEnvironment`) used to exercise
/// the rest of the pipeline in tests.
pub trait Environment: Send {
    /// Reset to the starting position and return the initial state vector.
    fn reset(&mut self) -> StateVector;

    /// Apply `action` for the side to move. Reward shaping is entirely the
    /// environment's responsibility.
    fn step(&mut self, action: Action) -> (StateVector, Reward, bool, StepInfo);

    /// Legal actions from the current state. An empty result ends the game.
    fn valid_actions(&self, state: &StateVector) -> Vec<Action>;

    fn is_terminal(&self, state: &StateVector) -> bool;

    fn status(&self) -> GameStatus;

    fn board_fen(&self) -> String;

    fn active_color(&self) -> Color;

    fn chess_metrics(&self) -> ChessMetrics;

    /// Positive favors White, negative favors Black. Used by the material
    /// adjudication rule shared by the self-play pool and the evaluator.
    fn material_balance(&self) -> i32;
}

/// Construct fresh `Environment` instances, one per game, each configured
/// with the same reward shaping. Self-play workers and the evaluator both
/// need a factory rather than a shared instance since games run
/// concurrently.
pub trait EnvironmentFactory: Send + Sync {
    type Env: Environment;
    fn build(&self, reward_config: RewardConfig) -> Self::Env;
}
