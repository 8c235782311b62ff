//! Environment facade and a toy game used to exercise the
//! rest of the pipeline without a real chess engine.

pub mod toy;
pub mod traits;

pub use traits::{ChessMetrics, Color, Environment, EnvironmentFactory, GameStatus, RewardConfig, StepInfo};
