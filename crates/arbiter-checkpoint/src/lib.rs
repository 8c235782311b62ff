//! Checkpoint manager.

pub mod manager;

pub use manager::{Checkpoint, CheckpointManager, CheckpointMetadata, ValidationStatus};
