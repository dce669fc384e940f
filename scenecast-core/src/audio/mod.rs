//! In-process audio mixing.

pub mod mix;
