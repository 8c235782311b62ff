//! Typed error kinds shared across the pipeline.
//!
//! Callers that need to react differently to, say, a numerical blowup
//! versus a checkpoint write failure match on the variant; callers that
//! just want to log and move on treat it as an opaque `std::error::Error`.

use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration. Fatal during initialization.
    #[error("config error: {0}")]
    Config(String),

    /// Checkpoint or sidecar read/write failure. Retried once by the
    /// caller, then logged.
    #[error("io error: {0}")]
    Io(String),

    /// Agent save/load/update failure. The batch or checkpoint is skipped;
    /// the cycle continues.
    #[error("agent error: {0}")]
    Agent(String),

    /// Invalid action or illegal step info from the environment. The game
    /// is aborted; the worker pool logs and continues.
    #[error("environment error: {0}")]
    Environment(String),

    /// Informational, non-fatal. May influence later policy but never
    /// aborts anything by itself.
    #[error("validation issue: {0}")]
    Validation(String),

    /// NaN/Infinity encountered in an `UpdateResult`. Aborts that batch
    /// only.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Pause/stop requested. Graceful stop between cycles.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
    pub fn io(msg: impl fmt::Display) -> Self {
        Self::Io(msg.to_string())
    }
    pub fn agent(msg: impl fmt::Display) -> Self {
        Self::Agent(msg.to_string())
    }
    pub fn environment(msg: impl fmt::Display) -> Self {
        Self::Environment(msg.to_string())
    }
    pub fn validation(msg: impl fmt::Display) -> Self {
        Self::Validation(msg.to_string())
    }
    pub fn numerical(msg: impl fmt::Display) -> Self {
        Self::Numerical(msg.to_string())
    }
    pub fn cancelled(msg: impl fmt::Display) -> Self {
        Self::Cancelled(msg.to_string())
    }

    /// True for error kinds that the orchestrator recovers from locally
    /// (within a game or a batch) rather than surfacing at cycle
    /// granularity.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Agent(_) | Self::Environment(_) | Self::Numerical(_) | Self::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
