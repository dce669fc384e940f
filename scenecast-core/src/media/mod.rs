//! Media scene synchronization.

pub mod sync;
