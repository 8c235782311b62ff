//! Convergence detector.

pub mod detector;

pub use detector::{ConvergenceDetector, ConvergenceReport, ConvergenceStatus};
