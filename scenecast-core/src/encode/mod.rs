//! Encoding backends built on the system `ffmpeg` binary.

pub mod ffmpeg;
