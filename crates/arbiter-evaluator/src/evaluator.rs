//! Evaluator: plays fixed-opponent games to estimate
//! win/draw/loss rates with color alternation, confidence intervals, and
//! head-to-head significance.

use crate::statistics::{confidence_interval_95, significance_vs_null};
use arbiter_agent::Agent;
use arbiter_core::types::{GameOutcome, StatisticalSignificance};
use arbiter_gameplay::{Color, Environment, EnvironmentFactory, RewardConfig};
use std::sync::Mutex;

/// Descriptive tag for which baseline the evaluator is being run against.
/// The concrete opponent (heuristic evaluation function, depth-limited
/// search) is an external collaborator; this crate only
/// needs it exposed as an `Agent`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OpponentKind {
    Heuristic,
    MinimaxDepth(u32),
    Mixed { p_heuristic: f64, p_depth1: f64, p_depth2: f64 },
}

#[derive(Clone, Copy, Debug)]
pub struct EvalConfig {
    pub games: usize,
    pub max_steps: usize,
    pub step_limit_penalty: f32,
    pub adjudication_material_threshold: i32,
}

#[derive(Clone, Debug)]
pub struct EvaluationReport {
    pub opponent: OpponentKind,
    pub games_played: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub draw_rate: f64,
    pub loss_rate: f64,
    pub win_rate_ci_95: Option<(f64, f64)>,
    pub vs_coin_flip: StatisticalSignificance,
    pub average_game_length: f64,
}

pub struct Evaluator {
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    /// Plays `config.games` games of `factory`'s environment between
    /// `agent` (the one being measured) and `opponent`, with color
    /// alternation: even index -> `agent` plays White.
    pub fn run<F>(&self, factory: &F, reward_config: RewardConfig, agent: &Mutex<Box<dyn Agent>>, opponent: &Mutex<Box<dyn Agent>>, opponent_kind: OpponentKind) -> EvaluationReport
    where
        F: EnvironmentFactory,
    {
        let mut wins = 0usize;
        let mut draws = 0usize;
        let mut losses = 0usize;
        let mut total_length = 0usize;

        for index in 0..self.config.games {
            let agent_color = if index % 2 == 0 { Color::White } else { Color::Black };
            let mut env = factory.build(reward_config);
            let (outcome, length) = self.play_one(&mut env, agent, opponent, agent_color);
            total_length += length;
            match (outcome, agent_color) {
                (GameOutcome::WhiteWins, Color::White) | (GameOutcome::BlackWins, Color::Black) => wins += 1,
                (GameOutcome::Draw, _) => draws += 1,
                (GameOutcome::Ongoing, _) => draws += 1,
                _ => losses += 1,
            }
        }

        let games_played = self.config.games;
        let n = games_played.max(1) as f64;
        let win_rate = wins as f64 / n;
        let draw_rate = draws as f64 / n;
        let loss_rate = losses as f64 / n;

        EvaluationReport {
            opponent: opponent_kind,
            games_played,
            wins,
            draws,
            losses,
            win_rate,
            draw_rate,
            loss_rate,
            win_rate_ci_95: confidence_interval_95(wins, games_played),
            vs_coin_flip: significance_vs_null(wins, wins + losses, 0.5),
            average_game_length: if games_played == 0 { 0.0 } else { total_length as f64 / games_played as f64 },
        }
    }

    fn play_one(&self, env: &mut dyn Environment, agent: &Mutex<Box<dyn Agent>>, opponent: &Mutex<Box<dyn Agent>>, agent_color: Color) -> (GameOutcome, usize) {
        let mut state = env.reset();
        let mut step = 0usize;

        loop {
            if env.is_terminal(&state) {
                return (env.status(), step);
            }
            let valid = env.valid_actions(&state);
            if valid.is_empty() {
                return (env.status(), step);
            }
            if step >= self.config.max_steps {
                break;
            }

            let active = env.active_color();
            let mover = if active == agent_color { agent } else { opponent };
            let action = {
                let mut guard = mover.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let selected = guard.select_action(&state, &valid);
                if valid.contains(&selected) {
                    selected
                } else {
                    log::error!("evaluator: agent returned invalid action {selected}");
                    valid[0]
                }
            };

            let (next_state, _reward, done, info) = env.step(action);
            step += 1;
            if info.illegal {
                continue;
            }
            state = next_state;
            if done {
                return (env.status(), step);
            }
        }

        let material = env.material_balance();
        let outcome = if material.abs() < self.config.adjudication_material_threshold {
            GameOutcome::Draw
        } else if material > 0 {
            GameOutcome::WhiteWins
        } else {
            GameOutcome::BlackWins
        };
        (outcome, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_agent::LinearAgent;
    use arbiter_gameplay::toy::ToyEnvironmentFactory;

    #[test]
    fn evaluation_report_rates_sum_to_one() {
        let evaluator = Evaluator::new(EvalConfig {
            games: 8,
            max_steps: 50,
            step_limit_penalty: 0.0,
            adjudication_material_threshold: 3,
        });
        let factory = ToyEnvironmentFactory::default();
        let agent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 1)) as Box<dyn Agent>);
        let opponent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 2)) as Box<dyn Agent>);

        let report = evaluator.run(&factory, RewardConfig::default(), &agent, &opponent, OpponentKind::Heuristic);
        assert_eq!(report.wins + report.draws + report.losses, 8);
        assert!((report.win_rate + report.draw_rate + report.loss_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn color_alternation_assigns_white_on_even_indices() {
        let evaluator = Evaluator::new(EvalConfig {
            games: 1,
            max_steps: 50,
            step_limit_penalty: 0.0,
            adjudication_material_threshold: 3,
        });
        let factory = ToyEnvironmentFactory::default();
        let mut env = factory.build(RewardConfig::default());
        let agent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 1)) as Box<dyn Agent>);
        let opponent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 2)) as Box<dyn Agent>);
        let (_outcome, length) = evaluator.play_one(&mut env, &agent, &opponent, Color::White);
        assert!(length > 0);
    }
}
