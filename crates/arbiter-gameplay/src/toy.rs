//! A minimal deterministic two-player game used to exercise the generic
//! self-play/training machinery without a real chess engine, the same way
//! this codebase's own MCCFR core is exercised against a toy
//! Rock-Paper-Scissors game (`src/mccfr/rps`) before being pointed at the
//! real (and far more expensive) game.
//!
//! Rules: `start` tokens on the table; each ply the side to move removes
//! between 1 and `max_remove` tokens; whoever removes the last token wins.

use crate::traits::{ChessMetrics, Color, Environment, EnvironmentFactory, GameStatus, RewardConfig, StepInfo};
use arbiter_core::types::GameOutcome;
use arbiter_core::{Action, Reward, StateVector};

#[derive(Clone, Debug)]
pub struct ToyEnvironment {
    start: u32,
    max_remove: u32,
    remaining: u32,
    ply: usize,
    active: Color,
    last_mover: Option<Color>,
    reward_config: RewardConfig,
}

impl ToyEnvironment {
    pub fn new(start: u32, max_remove: u32, reward_config: RewardConfig) -> Self {
        Self {
            start,
            max_remove,
            remaining: start,
            ply: 0,
            active: Color::White,
            last_mover: None,
            reward_config,
        }
    }

    fn state_vector(&self) -> StateVector {
        vec![self.remaining as f32]
    }
}

impl Environment for ToyEnvironment {
    fn reset(&mut self) -> StateVector {
        self.remaining = self.start;
        self.ply = 0;
        self.active = Color::White;
        self.last_mover = None;
        self.state_vector()
    }

    fn step(&mut self, action: Action) -> (StateVector, Reward, bool, StepInfo) {
        let valid = self.valid_actions(&self.state_vector());
        if !valid.contains(&action) {
            return (
                self.state_vector(),
                0.0,
                false,
                StepInfo {
                    illegal: true,
                    note: Some(format!("action {action} not in {valid:?}")),
                },
            );
        }
        let amount = (action as u32 + 1).min(self.remaining);
        self.remaining -= amount;
        self.ply += 1;
        self.last_mover = Some(self.active);
        let done = self.remaining == 0;
        let reward = if done {
            self.reward_config.win_reward
        } else {
            self.reward_config.step_penalty
        };
        self.active = self.active.opposite();
        (self.state_vector(), reward, done, StepInfo::default())
    }

    fn valid_actions(&self, state: &StateVector) -> Vec<Action> {
        let remaining = state.first().copied().unwrap_or(0.0) as u32;
        if remaining == 0 {
            return Vec::new();
        }
        (0..self.max_remove.min(remaining))
            .map(|a| a as Action)
            .collect()
    }

    fn is_terminal(&self, state: &StateVector) -> bool {
        state.first().copied().unwrap_or(0.0) <= 0.0
    }

    fn status(&self) -> GameStatus {
        if self.remaining > 0 {
            return GameOutcome::Ongoing;
        }
        match self.last_mover {
            Some(Color::White) => GameOutcome::WhiteWins,
            Some(Color::Black) => GameOutcome::BlackWins,
            None => GameOutcome::Ongoing,
        }
    }

    fn board_fen(&self) -> String {
        format!("toy:remaining={}:active={:?}", self.remaining, self.active)
    }

    fn active_color(&self) -> Color {
        self.active
    }

    fn chess_metrics(&self) -> ChessMetrics {
        ChessMetrics {
            game_length: self.ply,
            capture_count: 0,
            check_count: 0,
            legal_move_rate: 1.0,
        }
    }

    fn material_balance(&self) -> i32 {
        match self.active {
            Color::White => self.remaining as i32,
            Color::Black => -(self.remaining as i32),
        }
    }
}

pub struct ToyEnvironmentFactory {
    pub start: u32,
    pub max_remove: u32,
}

impl Default for ToyEnvironmentFactory {
    fn default() -> Self {
        Self {
            start: 21,
            max_remove: 3,
        }
    }
}

impl EnvironmentFactory for ToyEnvironmentFactory {
    type Env = ToyEnvironment;
    fn build(&self, reward_config: RewardConfig) -> Self::Env {
        ToyEnvironment::new(self.start, self.max_remove, reward_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn someone_wins_by_taking_last_token() {
        let mut env = ToyEnvironment::new(4, 3, RewardConfig::default());
        let mut state = env.reset();
        let mut done = false;
        while !done {
            let valid = env.valid_actions(&state);
            let action = *valid.last().unwrap();
            let (next, _, d, info) = env.step(action);
            assert!(!info.illegal);
            state = next;
            done = d;
        }
        assert_ne!(env.status(), GameOutcome::Ongoing);
    }

    #[test]
    fn illegal_action_is_reported_without_mutating_state() {
        let mut env = ToyEnvironment::new(4, 3, RewardConfig::default());
        env.reset();
        let (_, _, done, info) = env.step(99);
        assert!(info.illegal);
        assert!(!done);
    }
}
