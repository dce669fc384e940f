//! Frame cache keyed by a render fingerprint.

pub mod frame_cache;
