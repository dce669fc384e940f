//! Render orchestration.

pub mod options;
pub mod pipeline;
