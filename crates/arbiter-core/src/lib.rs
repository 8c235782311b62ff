//! Shared foundation for the arbiter self-play training pipeline.
//!
//! This crate has no dependency on any other `arbiter-*` crate: it supplies
//! the type aliases, data model, error kinds, RNG registry, and
//! configuration that every other component is built against, so that
//! ownership flows strictly outward from here and cyclic references
//! between components never arise.

pub mod config;
pub mod error;
pub mod rng;
pub mod types;

/// Dimensional type aliases, named the way the rest of the codebase names
/// its numeric quantities (see `Chips`/`Utility`/`Probability` elsewhere in
/// this codebase) so a reader can tell at a glance what a bare `f32` means.
pub type Probability = f32;
pub type Reward = f32;
pub type StateVector = Vec<f32>;
pub type Action = usize;

pub use error::Error;
pub use rng::RngRegistry;

/// Random instance generation, used by property tests and toy fixtures.
/// Mirrors the `Arbitrary` trait used throughout this codebase's own test
/// fixtures.
pub trait Arbitrary {
    fn random() -> Self;
}
