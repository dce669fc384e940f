//! scenecast renders browser-hosted scene animations to video files.
//!
//! A page exposes a scene object (timing via `getDelay()`, `getDuration()`, `getIterationCount()`,
//! `getPlaySpeed()`, seeking via `setTime()`) and optionally a media scene listing audio tracks.
//! The engine seeks the scene frame by frame, captures screenshots across parallel workers and
//! encodes the image sequence with `ffmpeg`.
//!
//! # Pipeline overview
//!
//! 1. **Timing**: scene timing + requested clipping → inclusive frame window ([`record_window`])
//! 2. **Cache**: a fingerprint of the window decides whether the previous capture is reused
//!    ([`FrameCache`])
//! 3. **Capture**: a [`WorkerPool`] splits the window across workers by stride; each worker owns a
//!    page and writes `frame{n}.{ext}` into the cache folder
//! 4. **Media**: tracks reported by the media scene are fetched and merged into one mp3
//! 5. **Encode**: a [`Recorder`] strategy turns frames and audio into the output container
//!
//! The browser is reached through the [`BrowserLauncher`]/[`Browser`]/[`Page`] traits;
//! [`DriverLauncher`] implements them over an external automation process.
#![forbid(unsafe_code)]

mod audio;
mod cache;
mod encode;
mod foundation;
mod media;
mod page;
mod recorder;
mod render;
mod timing;
mod worker;

pub use audio::mix::{
    AudioManifest, AudioPcm, AudioSegment, MIX_SAMPLE_RATE, build_audio_manifest,
    decode_audio_f32_stereo, mix_manifest, write_mix_to_f32le_file,
};
pub use cache::frame_cache::{CacheFingerprint, FINGERPRINT_FILE, FrameCache};
pub use encode::ffmpeg::{
    AudioInputConfig, EncodeConfig, FfmpegEncoder, encode_image_sequence, encode_pcm_to_mp3,
    ensure_parent_dir, has_audio_stream, is_ffmpeg_available,
};
pub use foundation::core::{ImageType, VideoFormat, frame_file_name};
pub use foundation::error::{RenderError, RenderResult};
pub use media::sync::{
    DefaultFetchFile, FetchFile, MediaSceneInfo, MediaSource, MediaTrack, ResolvedTrack,
    get_media_info, resolve_media_source, resolve_tracks,
};
pub use page::driver::DriverLauncher;
pub use page::{Browser, BrowserLauncher, Page, PageOptions, ScreenshotRequest, evaluate_number};
pub use recorder::binary::{BinaryRecorder, atempo_chain, merge_filter};
pub use recorder::render::RenderRecorder;
pub use recorder::{
    CaptureEnd, CapturedFrame, EncodeOptions, MERGE_AUDIO_FILE, RecordSession, Recorder,
};
pub use render::options::{CreatedHook, RenderOptions};
pub use render::pipeline::{
    OutputPlan, RenderSummary, VideoOutput, evaluate_animator, render, render_with,
    render_with_recorder, resolve_input_url,
};
pub use timing::window::{
    AnimatorInfo, IterationCount, RecordInfoOptions, RecordWindow, record_window,
};
pub use worker::child::{
    CaptureWorker, ChildOptions, IsolatedWorker, PrimaryWorker, RecordOptions, WorkerState,
    record_frames,
};
pub use worker::pool::WorkerPool;
