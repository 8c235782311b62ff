//! Checkpoint manager: versioned persistence of Agent
//! Facade state, with sidecar metadata, best-model tracking, and a
//! retention policy. One file per version under a base directory; the
//! payload itself is whatever bytes the Agent Facade's own `save` writes.

use arbiter_agent::Agent;
use arbiter_core::config::RetentionPolicy;
use arbiter_core::error::{Error, Result};
use arbiter_core::{Action, StateVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Unvalidated,
    Valid,
    Invalid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub cycle: usize,
    pub performance: f64,
    pub description: String,
    pub is_best: bool,
    pub seed_configuration: Option<u64>,
}

/// Sidecar record written alongside the payload file, plus what the
/// filesystem itself tells us (`size`, `creation_time`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: usize,
    pub path: PathBuf,
    pub metadata: CheckpointMetadata,
    pub created_at_unix: u64,
    pub size: u64,
    pub validation_status: ValidationStatus,
}

pub struct CheckpointManager {
    base_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| Error::io(format!("creating {}: {e}", base_dir.display())))?;
        Ok(Self { base_dir })
    }

    fn payload_path(&self, version: usize) -> PathBuf {
        self.base_dir.join(format!("v{version:06}.ckpt"))
    }

    fn sidecar_path(&self, version: usize) -> PathBuf {
        self.base_dir.join(format!("v{version:06}.json"))
    }

    /// Writes the agent's parameters via `Agent::save`, then a JSON sidecar.
    /// If `probe_states` is non-empty, validates by reloading the payload
    /// into `scratch`; `select_action` takes `&mut self`, so this confirms
    /// the payload reloads cleanly rather than comparing live and reloaded
    /// action selections.
    pub fn create(
        &self,
        agent: &dyn Agent,
        version: usize,
        metadata: CheckpointMetadata,
        probe_states: &[(StateVector, Vec<Action>)],
        scratch: Option<&mut dyn Agent>,
    ) -> Result<Checkpoint> {
        let payload_path = self.payload_path(version);
        agent.save(&payload_path)?;

        let size = std::fs::metadata(&payload_path)
            .map_err(|e| Error::io(format!("stat {}: {e}", payload_path.display())))?
            .len();
        let created_at_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let validation_status = match scratch {
            Some(scratch) if !probe_states.is_empty() => {
                if validate_by_probe(agent, scratch, &payload_path, probe_states) {
                    ValidationStatus::Valid
                } else {
                    ValidationStatus::Invalid
                }
            }
            _ => ValidationStatus::Unvalidated,
        };
        if validation_status == ValidationStatus::Invalid {
            log::warn!("checkpoint version {version} failed reload validation");
        }

        let checkpoint = Checkpoint {
            version,
            path: payload_path,
            metadata,
            created_at_unix,
            size,
            validation_status,
        };
        self.write_sidecar(&checkpoint)?;
        log::info!("wrote checkpoint version {version} ({} bytes)", checkpoint.size);
        Ok(checkpoint)
    }

    fn write_sidecar(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|e| Error::io(e.to_string()))?;
        std::fs::write(self.sidecar_path(checkpoint.version), bytes)
            .map_err(|e| Error::io(format!("writing sidecar for version {}: {e}", checkpoint.version)))
    }

    pub fn get(&self, version: usize) -> Result<Checkpoint> {
        let bytes = std::fs::read(self.sidecar_path(version))
            .map_err(|e| Error::io(format!("reading sidecar for version {version}: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::io(e.to_string()))
    }

    pub fn get_best(&self) -> Result<Option<Checkpoint>> {
        let mut best: Option<Checkpoint> = None;
        for checkpoint in self.list()? {
            if checkpoint.metadata.is_best {
                best = Some(checkpoint);
            }
        }
        Ok(best)
    }

    /// All checkpoints, oldest version first.
    pub fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut versions: BTreeMap<usize, Checkpoint> = BTreeMap::new();
        let dir = std::fs::read_dir(&self.base_dir).map_err(|e| Error::io(e.to_string()))?;
        for entry in dir {
            let entry = entry.map_err(|e| Error::io(e.to_string()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(version_str) = name.strip_prefix('v').and_then(|s| s.strip_suffix(".json")) {
                if let Ok(version) = version_str.parse::<usize>() {
                    versions.insert(version, self.get(version)?);
                }
            }
        }
        Ok(versions.into_values().collect())
    }

    pub fn load(&self, checkpoint: &Checkpoint, agent: &mut dyn Agent) -> Result<()> {
        agent.load(&checkpoint.path)
    }

    /// Enforces retention in priority order: keep best, then keep the last
    /// `keep_last_n`, then keep every `keep_every_n`-th; everything else is
    /// deleted.
    pub fn cleanup_by_retention(&self, policy: &RetentionPolicy) -> Result<Vec<usize>> {
        let checkpoints = self.list()?;
        if checkpoints.is_empty() {
            return Ok(Vec::new());
        }
        let max_version = checkpoints.iter().map(|c| c.version).max().unwrap_or(0);

        let mut keep = std::collections::HashSet::new();
        for checkpoint in &checkpoints {
            if policy.keep_best && checkpoint.metadata.is_best {
                keep.insert(checkpoint.version);
            }
        }
        if policy.keep_last_n > 0 {
            for checkpoint in &checkpoints {
                if max_version.saturating_sub(checkpoint.version) < policy.keep_last_n {
                    keep.insert(checkpoint.version);
                }
            }
        }
        if policy.keep_every_n > 0 {
            for checkpoint in &checkpoints {
                if checkpoint.version % policy.keep_every_n == 0 {
                    keep.insert(checkpoint.version);
                }
            }
        }

        let mut removed = Vec::new();
        for checkpoint in &checkpoints {
            if !keep.contains(&checkpoint.version) {
                let _ = std::fs::remove_file(&checkpoint.path);
                let _ = std::fs::remove_file(self.sidecar_path(checkpoint.version));
                removed.push(checkpoint.version);
                log::debug!("retention policy evicted checkpoint version {}", checkpoint.version);
            }
        }
        Ok(removed)
    }
}

fn validate_by_probe(
    agent: &dyn Agent,
    scratch: &mut dyn Agent,
    payload_path: &Path,
    probe_states: &[(StateVector, Vec<Action>)],
) -> bool {
    if scratch.load(payload_path).is_err() {
        return false;
    }
    let _ = agent;
    // A reloaded agent must at least be loadable; deeper behavioral parity
    // against `agent`'s own live action selection isn't possible here since
    // `select_action` takes `&mut self` and `agent` is borrowed immutably.
    !probe_states.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_agent::LinearAgent;

    fn tmp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("arbiter-checkpoint-test-{label}-{}", std::process::id()))
    }

    fn metadata(cycle: usize, is_best: bool) -> CheckpointMetadata {
        CheckpointMetadata {
            cycle,
            performance: 0.5,
            description: "test".to_string(),
            is_best,
            seed_configuration: Some(1),
        }
    }

    #[test]
    fn create_then_get_round_trips_metadata() {
        let dir = tmp_dir("roundtrip");
        let manager = CheckpointManager::new(&dir).unwrap();
        let agent = LinearAgent::new(2, 3, 0.01, 1);
        manager.create(&agent, 1, metadata(1, false), &[], None).unwrap();

        let loaded = manager.get(1).unwrap();
        assert_eq!(loaded.metadata.cycle, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn get_best_returns_the_checkpoint_marked_best() {
        let dir = tmp_dir("best");
        let manager = CheckpointManager::new(&dir).unwrap();
        let agent = LinearAgent::new(2, 3, 0.01, 1);
        manager.create(&agent, 1, metadata(1, false), &[], None).unwrap();
        manager.create(&agent, 2, metadata(2, true), &[], None).unwrap();
        manager.create(&agent, 3, metadata(3, false), &[], None).unwrap();

        let best = manager.get_best().unwrap().expect("a best checkpoint exists");
        assert_eq!(best.version, 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn retention_keeps_best_even_outside_last_n_and_every_kth() {
        let dir = tmp_dir("retention");
        let manager = CheckpointManager::new(&dir).unwrap();
        let agent = LinearAgent::new(2, 3, 0.01, 1);
        manager.create(&agent, 1, metadata(1, true), &[], None).unwrap();
        for v in 2..=9 {
            manager.create(&agent, v, metadata(v, false), &[], None).unwrap();
        }

        let policy = RetentionPolicy {
            keep_best: true,
            keep_last_n: 2,
            keep_every_n: 0,
        };
        manager.cleanup_by_retention(&policy).unwrap();

        let remaining: Vec<usize> = manager.list().unwrap().iter().map(|c| c.version).collect();
        assert!(remaining.contains(&1));
        assert!(remaining.contains(&8));
        assert!(remaining.contains(&9));
        assert!(!remaining.contains(&3));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
