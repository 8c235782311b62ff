//! Bounded experience store.

mod store;

pub use store::ExperienceStore;
pub use arbiter_core::config::{CleanupStrategy, SamplingStrategy};
