//! Frame timing.

pub mod window;
