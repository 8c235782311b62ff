//! Training validator.

pub mod validator;

pub use validator::{Issue, IssueType, Severity, TrainingValidator, ValidationReport};
