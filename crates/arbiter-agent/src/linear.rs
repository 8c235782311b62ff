//! A minimal linear softmax-policy agent. The real function approximator
//! is out of scope; this gives the rest of the pipeline a
//! concrete, fast-to-train `Agent` to exercise against in tests and small
//! runs, the same role this codebase's own toy Rock-Paper-Scissors
//! strategy profile plays for its CFR core.

use crate::traits::{ActionProvider, Agent, AgentMetrics, UpdateResult};
use arbiter_core::error::{Error, Result};
use arbiter_core::types::Transition;
use arbiter_core::{Action, Probability, StateVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Serialize, Deserialize)]
struct Params {
    state_dim: usize,
    num_actions: usize,
    weights: Vec<f32>, // row-major, num_actions x state_dim
    bias: Vec<f32>,
}

impl Params {
    fn zeroed(state_dim: usize, num_actions: usize) -> Self {
        Self {
            state_dim,
            num_actions,
            weights: vec![0.0; state_dim * num_actions],
            bias: vec![0.0; num_actions],
        }
    }

    fn logit(&self, state: &[f32], action: Action) -> f32 {
        let row = &self.weights[action * self.state_dim..(action + 1) * self.state_dim];
        row.iter().zip(state).map(|(w, s)| w * s).sum::<f32>() + self.bias[action]
    }
}

/// Linear softmax policy over a fixed action space, trained with a simple
/// REINFORCE-style update. Non-reentrant by construction (`&mut self`
/// throughout): callers serialize access via a per-agent mutex.
pub struct LinearAgent {
    params: Params,
    learning_rate: f32,
    exploration_rate: Probability,
    episode_count: usize,
    recent_loss: f32,
    recent_entropy: f32,
    action_provider: Option<ActionProvider>,
    rng: SmallRng,
}

impl LinearAgent {
    pub fn new(state_dim: usize, num_actions: usize, learning_rate: f32, seed: u64) -> Self {
        Self {
            params: Params::zeroed(state_dim, num_actions),
            learning_rate,
            exploration_rate: 0.1,
            episode_count: 0,
            recent_loss: 0.0,
            recent_entropy: 0.0,
            action_provider: None,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn masked_actions(&self, state: &StateVector, valid_actions: &[Action]) -> Vec<Action> {
        if let Some(provider) = &self.action_provider {
            let masked = provider(state);
            if !masked.is_empty() {
                return masked;
            }
        }
        valid_actions.to_vec()
    }

    /// Softmax over the logits restricted to `actions`, returned in the
    /// same order as `actions`.
    fn policy(&self, state: &[f32], actions: &[Action]) -> Vec<f32> {
        let logits: Vec<f32> = actions.iter().map(|&a| self.params.logit(state, a)).collect();
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum::<f32>().max(f32::MIN_POSITIVE);
        exps.iter().map(|&e| e / sum).collect()
    }
}

impl Agent for LinearAgent {
    fn select_action(&mut self, state: &StateVector, valid_actions: &[Action]) -> Action {
        if valid_actions.is_empty() {
            return 0;
        }
        let actions = self.masked_actions(state, valid_actions);
        let actions: Vec<Action> = actions.into_iter().filter(|a| valid_actions.contains(a)).collect();
        let actions = if actions.is_empty() { valid_actions.to_vec() } else { actions };

        if self.rng.random::<f64>() < self.exploration_rate {
            let idx = self.rng.random_range(0..actions.len());
            return actions[idx];
        }
        let probs = self.policy(state, &actions);
        let (best_idx, _) = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .expect("actions is non-empty");
        actions[best_idx]
    }

    fn train_batch(&mut self, transitions: &[Transition]) -> Result<UpdateResult> {
        if transitions.is_empty() {
            return Ok(UpdateResult::default());
        }
        let num_actions = self.params.num_actions;
        let mut grad_w = vec![0.0f32; self.params.weights.len()];
        let mut grad_b = vec![0.0f32; self.params.bias.len()];
        let mut total_loss = 0.0f32;
        let mut total_entropy = 0.0f32;

        for transition in transitions {
            let all_actions: Vec<Action> = (0..num_actions).collect();
            let probs = self.policy(&transition.state, &all_actions);
            let entropy: f32 = probs
                .iter()
                .filter(|&&p| p > 0.0)
                .map(|&p| -p * p.ln())
                .sum();
            total_entropy += entropy;

            let action = transition.action.min(num_actions - 1);
            let p_action = probs[action].max(f32::MIN_POSITIVE);
            total_loss += -p_action.ln() * transition.reward.max(0.0).max(1e-3);

            for (a, &p) in probs.iter().enumerate() {
                let indicator = if a == action { 1.0 } else { 0.0 };
                let advantage = (indicator - p) * transition.reward;
                let row = a * self.params.state_dim;
                for (d, &s) in transition.state.iter().enumerate() {
                    grad_w[row + d] += advantage * s;
                }
                grad_b[a] += advantage;
            }
        }

        let n = transitions.len() as f32;
        let scale = self.learning_rate / n;
        for (w, g) in self.params.weights.iter_mut().zip(grad_w.iter()) {
            *w += scale * g;
        }
        for (b, g) in self.params.bias.iter_mut().zip(grad_b.iter()) {
            *b += scale * g;
        }

        let gradient_norm = (grad_w.iter().map(|g| g * g).sum::<f32>()
            + grad_b.iter().map(|g| g * g).sum::<f32>())
        .sqrt();
        let loss = total_loss / n;
        let entropy = total_entropy / n;

        if !loss.is_finite() || !gradient_norm.is_finite() {
            return Err(Error::numerical(format!(
                "non-finite update: loss={loss} grad_norm={gradient_norm}"
            )));
        }

        self.recent_loss = loss;
        self.recent_entropy = entropy;
        self.episode_count += transitions.iter().filter(|t| t.done).count();

        Ok(UpdateResult {
            loss,
            gradient_norm,
            policy_entropy: entropy,
            q_value_mean: None,
            target_value_mean: None,
        })
    }

    fn get_metrics(&self) -> AgentMetrics {
        AgentMetrics {
            exploration_rate: self.exploration_rate,
            internal_buffer_size: 0,
            episode_count: self.episode_count,
            recent_loss: self.recent_loss,
            recent_entropy: self.recent_entropy,
        }
    }

    fn set_exploration_rate(&mut self, rate: Probability) {
        self.exploration_rate = rate.clamp(0.0, 1.0);
    }

    fn set_next_action_provider(&mut self, provider: ActionProvider) {
        self.action_provider = Some(provider);
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e.to_string()))?;
        }
        let json = serde_json::to_vec(&self.params).map_err(|e| Error::io(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| Error::io(format!("writing {}: {e}", path.display())))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(format!("reading {}: {e}", path.display())))?;
        let params: Params = serde_json::from_slice(&bytes).map_err(|e| Error::agent(e.to_string()))?;
        self.params = params;
        Ok(())
    }

    fn reset(&mut self) {
        self.episode_count = 0;
        self.recent_loss = 0.0;
        self.recent_entropy = 0.0;
    }
}
