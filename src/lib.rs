//! Training orchestrator: the top-level loop that
//! interleaves self-play, experience integration, batch training,
//! evaluation, checkpointing, adaptive scheduling, rollback, opponent
//! update, and convergence detection.

pub mod orchestrator;

pub use orchestrator::{ControlHandle, Orchestrator, OrchestratorState};

pub use arbiter_agent::{Agent, LinearAgent};
pub use arbiter_checkpoint::{Checkpoint, CheckpointManager, CheckpointMetadata};
pub use arbiter_convergence::{ConvergenceDetector, ConvergenceStatus};
pub use arbiter_core::config::TrainingConfig;
pub use arbiter_core::error::{Error, Result};
pub use arbiter_core::rng::RngRegistry;
pub use arbiter_core::types::CycleMetrics;
pub use arbiter_evaluator::{EvalConfig, Evaluator, OpponentKind};
pub use arbiter_experience::ExperienceStore;
pub use arbiter_gameplay::{Environment, EnvironmentFactory, RewardConfig};
pub use arbiter_selfplay::{ColorAssignment, PoolConfig, StopFlag, WorkerPool};
pub use arbiter_validator::TrainingValidator;

/// Progress bar styled the way this codebase styles its own long-running
/// training loops.
pub fn progress(total: u64) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(1);
    let style = indicatif::ProgressStyle::with_template("{spinner:.cyan} {elapsed} ~ cycle {pos}/{len} {wide_bar:.cyan}")
        .expect("progress bar template is valid");
    let bar = indicatif::ProgressBar::new(total);
    bar.set_style(style);
    bar.enable_steady_tick(tick);
    bar
}

/// Initialize combined terminal + file logging and install a ctrl-c
/// handler that requests a graceful stop through `handle` rather than
/// exiting immediately.
pub fn init_logging(log_dir: impl AsRef<std::path::Path>, handle: ControlHandle) -> Result<()> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir).map_err(|e| Error::io(format!("creating {}: {e}", log_dir.display())))?;

    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let file = std::fs::File::create(log_dir.join(format!("{time}.log")))
        .map_err(|e| Error::io(format!("creating log file: {e}")))?;
    let file_logger = simplelog::WriteLogger::new(log::LevelFilter::Debug, config.clone(), file);
    let term_logger = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term_logger, file_logger])
        .map_err(|e| Error::config(format!("initializing logger: {e}")))?;

    ctrlc::set_handler(move || {
        log::warn!("ctrl-c received, requesting graceful stop");
        handle.stop();
    })
    .map_err(|e| Error::config(format!("installing ctrl-c handler: {e}")))
}
