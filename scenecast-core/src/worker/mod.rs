//! Capture workers and the pool that coordinates them.

pub mod child;
pub mod pool;
