//! Self-play worker pool.

pub mod pool;

pub use pool::{ColorAssignment, PoolConfig, StopFlag, WorkerPool};
