//! `trainer` — the CLI surface. Business logic lives in the library crate;
//! this binary is the thin process entry point, mirroring this codebase's
//! own `main.rs` dispatch onto library functions.

use arbiter::{init_logging, progress, Agent, ControlHandle, LinearAgent, Orchestrator, TrainingConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trainer", about = "Self-play reinforcement learning training orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a training session to completion (or until stopped/converged).
    Train {
        /// Path to a TOML config file; falls back to `TrainingConfig::default()` if omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory logs are written to.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
    },
    /// Render a table of known checkpoints for a given checkpoint directory.
    Status {
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,
    },
    /// Explain how to pause a running session (no out-of-process IPC exists; see notice).
    Pause,
    /// Explain how to resume a running session.
    Resume,
    /// Explain how to stop a running session.
    Stop,
    /// Anything else named in the enclosing tool's CLI surface but not implemented here.
    #[command(external_subcommand)]
    Unsupported(Vec<String>),
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Train { config, log_dir } => run_train(config, log_dir),
        Command::Status { checkpoint_dir } => run_status(checkpoint_dir),
        Command::Pause | Command::Resume | Command::Stop => run_lifecycle_notice(),
        Command::Unsupported(args) => run_unsupported(args),
    };
    std::process::exit(code);
}

fn run_train(config_path: Option<PathBuf>, log_dir: PathBuf) -> i32 {
    let config = match config_path {
        Some(path) => match TrainingConfig::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("config error: {e}");
                return 1;
            }
        },
        None => TrainingConfig::default(),
    };

    let factory = arbiter_gameplay::toy::ToyEnvironmentFactory::default();
    let state_dim = 1;
    let num_actions = factory.max_remove as usize;

    let learner: Box<dyn Agent> = Box::new(LinearAgent::new(state_dim, num_actions, config.learning_rate as f32, config.seed));
    let opponent: Box<dyn Agent> = Box::new(LinearAgent::new(state_dim, num_actions, config.learning_rate as f32, config.seed.wrapping_add(1)));
    let heuristic: Box<dyn Agent> = Box::new(LinearAgent::new(state_dim, num_actions, 0.0, config.seed.wrapping_add(2)));

    let mut orchestrator = match Orchestrator::new(config.clone(), factory, learner, opponent, Some(heuristic)) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("initialization error: {e}");
            return 1;
        }
    };

    let handle: ControlHandle = orchestrator.control_handle();
    if let Err(e) = init_logging(&log_dir, handle) {
        eprintln!("logging error: {e}");
        return 1;
    }

    let bar = progress(config.iterations as u64);
    log::info!("starting run '{}' for {} cycles (seed={})", config.name, config.iterations, config.seed);

    let result = orchestrator.run();
    bar.finish_and_clear();

    match result {
        Ok(()) => {
            log::info!("training finished in state {:?}", orchestrator.state());
            0
        }
        Err(e) => {
            eprintln!("training error: {e}");
            1
        }
    }
}

fn run_status(checkpoint_dir: PathBuf) -> i32 {
    let manager = match arbiter::CheckpointManager::new(&checkpoint_dir) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("status error: {e}");
            return 1;
        }
    };
    let checkpoints = match manager.list() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("status error: {e}");
            return 1;
        }
    };

    if checkpoints.is_empty() {
        println!("no checkpoints found under {}", checkpoint_dir.display());
        return 0;
    }

    println!("+---------+--------+------------+-------+------------------------+");
    println!("| version | cycle  | performance| best  | description            |");
    println!("+---------+--------+------------+-------+------------------------+");
    for checkpoint in &checkpoints {
        println!(
            "| {:>7} | {:>6} | {:>10.4} | {:^5} | {:<23}|",
            checkpoint.version,
            checkpoint.metadata.cycle,
            checkpoint.metadata.performance,
            if checkpoint.metadata.is_best { "yes" } else { "" },
            truncate(&checkpoint.metadata.description, 23),
        );
    }
    println!("+---------+--------+------------+-------+------------------------+");
    0
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}

fn run_lifecycle_notice() -> i32 {
    println!(
        "pause/resume/stop act on a running `train` process's in-process ControlHandle; \
         this core has no out-of-process IPC channel to reach one (multi-host/distributed \
         control is out of scope). Sending SIGINT (ctrl-c) to a running `trainer train` \
         process requests a graceful stop at the next cycle boundary."
    );
    0
}

fn run_unsupported(args: Vec<String>) -> i32 {
    eprintln!("`{}` is not implemented in this core", args.join(" "));
    1
}
