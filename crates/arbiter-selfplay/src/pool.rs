//! Self-play worker pool: plays `G` complete games per
//! cycle across up to `C` rayon worker threads, alternating colors, and
//! flattens the results into a transition stream for the Experience Store.

use arbiter_agent::Agent;
use arbiter_core::error::{Error, Result};
use arbiter_core::types::{EndReason, GameOutcome, SelfPlayGameResult, TerminationReason};
use arbiter_gameplay::{Color, Environment, EnvironmentFactory, RewardConfig};
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Which side the learning agent plays, per game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorAssignment {
    /// Even game index -> learning agent plays White.
    Alternate,
    Fixed(Color),
}

impl ColorAssignment {
    pub fn learner_color(&self, game_index: usize) -> Color {
        match self {
            Self::Alternate => {
                if game_index % 2 == 0 {
                    Color::White
                } else {
                    Color::Black
                }
            }
            Self::Fixed(c) => *c,
        }
    }
}

/// Cooperative stop signal shared between the Orchestrator and a running
/// pool. Checked at game boundaries only, never mid-game.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub concurrent_workers: usize,
    pub max_steps: usize,
    pub step_limit_penalty: f32,
    pub adjudication_material_threshold: i32,
    pub colors: ColorAssignment,
}

/// Produces games between the learning agent and an opponent agent over
/// an environment built fresh per game. Holds no state across `run` calls;
/// the calling Orchestrator owns the thread pool's lifetime.
pub struct WorkerPool {
    config: PoolConfig,
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrent_workers.max(1))
            .build()
            .map_err(|e| Error::config(format!("building worker pool: {e}")))?;
        Ok(Self { config, pool })
    }

    /// Plays `games` games, stopping early at the next game boundary if
    /// `stop` is set. Returns whatever games completed before that point.
    /// `games` is read fresh from the caller each cycle rather than fixed
    /// at construction time, so adaptive scheduling can change it between
    /// calls.
    pub fn run<F>(
        &self,
        games: usize,
        factory: &F,
        reward_config: RewardConfig,
        learner: &Mutex<Box<dyn Agent>>,
        opponent: &Mutex<Box<dyn Agent>>,
        stop: &StopFlag,
    ) -> Vec<SelfPlayGameResult>
    where
        F: EnvironmentFactory + Sync,
    {
        use rayon::iter::IntoParallelIterator;
        use rayon::iter::ParallelIterator;

        self.pool.install(|| {
            (0..games)
                .into_par_iter()
                .take_any_while(|_| !stop.is_stopped())
                .map(|index| {
                    let learner_color = self.config.colors.learner_color(index);
                    let mut env = factory.build(reward_config);
                    play_one_game(&mut env, learner, opponent, learner_color, &self.config)
                })
                .collect()
        })
    }
}

fn play_one_game(
    env: &mut dyn Environment,
    learner: &Mutex<Box<dyn Agent>>,
    opponent: &Mutex<Box<dyn Agent>>,
    learner_color: Color,
    config: &PoolConfig,
) -> SelfPlayGameResult {
    let started = Instant::now();
    let mut state = env.reset();
    let mut transitions = Vec::new();
    let mut step = 0usize;
    let mut termination = TerminationReason::GameEnded(EndReason::Stalemate);

    loop {
        if env.is_terminal(&state) {
            termination = outcome_to_termination(env.status());
            break;
        }
        let valid = env.valid_actions(&state);
        if valid.is_empty() {
            termination = outcome_to_termination(env.status());
            break;
        }
        if step >= config.max_steps {
            break;
        }

        let active = env.active_color();
        let agent = if active == learner_color { learner } else { opponent };
        let action = {
            let mut guard = agent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let selected = guard.select_action(&state, &valid);
            if valid.contains(&selected) {
                selected
            } else {
                log::error!("agent returned invalid action {selected}, valid={valid:?}");
                valid[0]
            }
        };

        let (next_state, reward, done, info) = env.step(action);
        step += 1;
        if info.illegal {
            log::warn!("illegal step reported by environment: {:?}", info.note);
            continue;
        }
        let mut transition =
            arbiter_core::types::Transition::new(state.clone(), action, reward, next_state.clone(), done)
                .with_move_number(step as u32);
        state = next_state;
        if done {
            termination = outcome_to_termination(env.status());
            transition = transition.with_termination(termination);
            transitions.push(transition);
            break;
        }
        transitions.push(transition);
    }

    if step >= config.max_steps && !env.is_terminal(&state) {
        if let Some(last) = transitions.last_mut() {
            last.apply_step_limit_penalty(config.step_limit_penalty);
        }
        termination = TerminationReason::StepLimit;
    }

    let outcome = resolve_outcome(env, step >= config.max_steps, config.adjudication_material_threshold);

    SelfPlayGameResult {
        game_id: uuid::Uuid::new_v4(),
        length: transitions.len(),
        outcome,
        termination_reason: termination,
        duration: started.elapsed(),
        transitions,
        final_position_fen: env.board_fen(),
    }
}

fn outcome_to_termination(outcome: GameOutcome) -> TerminationReason {
    match outcome {
        GameOutcome::WhiteWins | GameOutcome::BlackWins => TerminationReason::GameEnded(EndReason::Checkmate),
        GameOutcome::Draw => TerminationReason::GameEnded(EndReason::DrawRule),
        GameOutcome::Ongoing => TerminationReason::StepLimit,
    }
}

/// Natural terminal: trust `status()`. Step-limit: adjudicate by material
/// balance.
fn resolve_outcome(env: &dyn Environment, hit_step_limit: bool, material_threshold: i32) -> GameOutcome {
    let status = env.status();
    if !hit_step_limit || status.is_decisive() {
        return status;
    }
    let material = env.material_balance();
    if material.abs() < material_threshold {
        GameOutcome::Draw
    } else if material > 0 {
        GameOutcome::WhiteWins
    } else {
        GameOutcome::BlackWins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_agent::LinearAgent;
    use arbiter_gameplay::toy::{ToyEnvironmentFactory, ToyEnvironment};

    fn config() -> PoolConfig {
        PoolConfig {
            concurrent_workers: 2,
            max_steps: 50,
            step_limit_penalty: -0.1,
            adjudication_material_threshold: 3,
            colors: ColorAssignment::Alternate,
        }
    }

    #[test]
    fn runs_requested_number_of_games_to_completion() {
        let pool = WorkerPool::new(config()).unwrap();
        let factory = ToyEnvironmentFactory::default();
        let learner = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 1)) as Box<dyn Agent>);
        let opponent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 2)) as Box<dyn Agent>);
        let stop = StopFlag::new();

        let results = pool.run(6, &factory, RewardConfig::default(), &learner, &opponent, &stop);
        assert_eq!(results.len(), 6);
        for game in &results {
            assert!(!game.transitions.is_empty());
        }
    }

    #[test]
    fn a_different_games_count_is_observed_on_the_next_call() {
        let pool = WorkerPool::new(config()).unwrap();
        let factory = ToyEnvironmentFactory::default();
        let learner = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 1)) as Box<dyn Agent>);
        let opponent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 2)) as Box<dyn Agent>);
        let stop = StopFlag::new();

        let first = pool.run(6, &factory, RewardConfig::default(), &learner, &opponent, &stop);
        let second = pool.run(3, &factory, RewardConfig::default(), &learner, &opponent, &stop);
        assert_eq!(first.len(), 6);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn stop_flag_halts_before_next_game_boundary() {
        let pool = WorkerPool::new(config()).unwrap();
        let factory = ToyEnvironmentFactory::default();
        let learner = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 1)) as Box<dyn Agent>);
        let opponent = Mutex::new(Box::new(LinearAgent::new(1, 3, 0.05, 2)) as Box<dyn Agent>);
        let stop = StopFlag::new();
        stop.request_stop();

        let results = pool.run(6, &factory, RewardConfig::default(), &learner, &opponent, &stop);
        assert!(results.len() <= 6);
        let _ = ToyEnvironment::new(1, 1, RewardConfig::default());
    }
}
