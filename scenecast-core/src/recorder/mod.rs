//! Recorder strategies: turn captured frames and merged audio into encoded bytes.
//!
//! Both strategies share a [`RecordSession`] holding the animator timing, the media fetcher, the
//! bound worker pool and the merged audio. They differ only in how media is merged and how frames
//! reach the encoder:
//!
//! - [`binary::BinaryRecorder`] hands the frame files and media to a user-supplied ffmpeg binary.
//! - [`render::RenderRecorder`] decodes frames in-process and streams raw pixels to `ffmpeg`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use url::Url;

use crate::foundation::core::{ImageType, VideoFormat, frame_file_name};
use crate::foundation::error::{RenderError, RenderResult};
use crate::media::sync::{DefaultFetchFile, FetchFile, MediaSceneInfo};
use crate::timing::window::{AnimatorInfo, RecordInfoOptions, RecordWindow, record_window};
use crate::worker::pool::WorkerPool;

pub mod binary;
pub mod render;

/// Name of the merged audio track inside the cache folder.
pub const MERGE_AUDIO_FILE: &str = "merge.mp3";

/// Encoding request passed to [`Recorder::record`].
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeOptions {
    pub format: VideoFormat,
    pub fps: u32,
    pub start_time: f64,
    pub iteration: f64,
    pub duration: f64,
    pub multi: usize,
    pub codec: Option<String>,
    pub bitrate: String,
    pub cpu_used: Option<u32>,
    pub alpha: bool,
}

impl EncodeOptions {
    pub fn record_info(&self) -> RecordInfoOptions {
        RecordInfoOptions {
            fps: self.fps,
            start_time: self.start_time,
            iteration: self.iteration,
            duration: self.duration,
            multi: self.multi,
        }
    }
}

/// Sent once capture is confirmed complete, before encoding starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureEnd {
    pub frames: u64,
    /// Frames came from a previous run's cache.
    pub cached: bool,
}

/// A frame file ready for encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    pub offset: u64,
    pub path: PathBuf,
}

struct CaptureBinding {
    image_type: ImageType,
    pool: WorkerPool,
    is_cache: bool,
    cache_folder: PathBuf,
}

/// State shared by every recorder strategy.
#[derive(Default)]
pub struct RecordSession {
    animator: Option<AnimatorInfo>,
    fetch_file: Option<Arc<dyn FetchFile>>,
    capturing: Option<CaptureBinding>,
    capture_end: Option<SyncSender<CaptureEnd>>,
    captured: Option<Vec<CapturedFrame>>,
    audio: Option<Vec<u8>>,
}

impl RecordSession {
    pub fn animator(&self) -> Option<&AnimatorInfo> {
        self.animator.as_ref()
    }

    pub fn audio(&self) -> Option<&[u8]> {
        self.audio.as_deref()
    }

    pub fn set_audio(&mut self, audio: Vec<u8>) {
        self.audio = Some(audio);
    }

    pub fn has_fetch_file(&self) -> bool {
        self.fetch_file.is_some()
    }

    /// The injected fetcher, or a [`DefaultFetchFile`] when none was set.
    pub fn fetch_file(&mut self) -> RenderResult<Arc<dyn FetchFile>> {
        if let Some(fetch) = &self.fetch_file {
            return Ok(fetch.clone());
        }
        let fetch: Arc<dyn FetchFile> = Arc::new(DefaultFetchFile::new(None)?);
        self.fetch_file = Some(fetch.clone());
        Ok(fetch)
    }

    pub fn image_type(&self) -> Option<ImageType> {
        self.capturing.as_ref().map(|c| c.image_type)
    }

    pub fn cache_folder(&self) -> Option<&Path> {
        self.capturing.as_ref().map(|c| c.cache_folder.as_path())
    }

    /// Merged audio file to mux, when media was recorded and written to the cache folder.
    pub fn merged_audio_path(&self) -> Option<PathBuf> {
        self.audio.as_ref()?;
        let path = self.cache_folder()?.join(MERGE_AUDIO_FILE);
        path.is_file().then_some(path)
    }

    /// Produce the frames of `window`, capturing them unless the cache is reused.
    ///
    /// Workers are disconnected on every path. The capture-end signal is sent only after every
    /// frame file is present. Later calls return the same frames without capturing again, so one
    /// capture can feed several encodes.
    pub fn capture(&mut self, window: &RecordWindow) -> RenderResult<Vec<CapturedFrame>> {
        if let Some(frames) = &self.captured {
            return Ok(frames.clone());
        }
        let binding = self
            .capturing
            .as_mut()
            .ok_or_else(|| RenderError::capture("no worker pool bound to the recorder"))?;

        if binding.is_cache {
            binding.pool.disconnect_all()?;
        } else {
            binding.pool.capture(window)?;
        }

        let mut frames = Vec::with_capacity(window.frame_count() as usize);
        for offset in 0..window.frame_count() {
            let path = binding
                .cache_folder
                .join(frame_file_name(offset, binding.image_type));
            if !path.is_file() {
                return Err(RenderError::capture(format!(
                    "missing captured frame '{}'",
                    path.display()
                )));
            }
            frames.push(CapturedFrame { offset, path });
        }

        if let Some(tx) = self.capture_end.take() {
            let _ = tx.send(CaptureEnd {
                frames: frames.len() as u64,
                cached: binding.is_cache,
            });
        }
        self.captured = Some(frames.clone());
        Ok(frames)
    }

    /// Drop the bound pool (disconnecting its workers) and per-run state.
    pub fn reset(&mut self) {
        if let Some(mut binding) = self.capturing.take()
            && let Err(e) = binding.pool.disconnect_all()
        {
            tracing::warn!(error = %e, "failed to disconnect workers on destroy");
        }
        self.capture_end = None;
        self.captured = None;
        self.audio = None;
    }
}

/// Strategy interface turning a scene capture into encoded video bytes.
pub trait Recorder: Send {
    fn session(&self) -> &RecordSession;

    fn session_mut(&mut self) -> &mut RecordSession;

    /// Acquire encoder resources. Paired with [`Recorder::destroy`].
    fn init(&mut self) -> RenderResult<()>;

    /// Release every resource, including a still-bound worker pool.
    fn destroy(&mut self);

    /// Resolve and merge the media scene's tracks into one audio payload.
    fn record_media(&mut self, info: &MediaSceneInfo, input_url: &Url) -> RenderResult<()>;

    /// Capture (unless cached), signal capture end and encode.
    fn record(&mut self, opts: &EncodeOptions) -> RenderResult<Vec<u8>>;

    fn set_animator(&mut self, info: AnimatorInfo) {
        self.session_mut().animator = Some(info);
    }

    fn record_info(&self, opts: &RecordInfoOptions) -> RenderResult<RecordWindow> {
        let animator = self
            .session()
            .animator()
            .ok_or_else(|| RenderError::timing("animator info was not set"))?;
        record_window(opts, animator)
    }

    fn set_fetch_file(&mut self, fetch: Arc<dyn FetchFile>) {
        self.session_mut().fetch_file = Some(fetch);
    }

    /// Merged audio (mp3) produced by [`Recorder::record_media`].
    fn audio_file(&self) -> Option<&[u8]> {
        self.session().audio()
    }

    fn set_render_capturing(
        &mut self,
        image_type: ImageType,
        pool: WorkerPool,
        is_cache: bool,
        cache_folder: PathBuf,
    ) {
        self.session_mut().captured = None;
        self.session_mut().capturing = Some(CaptureBinding {
            image_type,
            pool,
            is_cache,
            cache_folder,
        });
    }

    /// One-shot receiver for the capture-end signal of the next [`Recorder::record`].
    fn capture_end(&mut self) -> Receiver<CaptureEnd> {
        let (tx, rx) = sync_channel(1);
        self.session_mut().capture_end = Some(tx);
        rx
    }
}

/// Removes a scratch file on drop.
pub(crate) struct TempFileGuard(pub(crate) Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Scratch path for track `index` fetched from `url`, keeping its extension for ffmpeg probing.
pub(crate) fn media_scratch_path(folder: &Path, index: usize, url: &str) -> PathBuf {
    let ext = Path::new(url.split(['?', '#']).next().unwrap_or_default())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");
    folder.join(format!("media{index}.{ext}"))
}

/// Audio window matching the video window.
pub(crate) fn audio_window(window: &RecordWindow, fps: u32) -> (f64, f64) {
    let span = window.end_time - window.start_time;
    let duration = if span > 0.0 {
        span
    } else {
        1.0 / f64::from(fps.max(1))
    };
    (window.start_time, duration)
}

#[cfg(test)]
#[path = "../../tests/unit/recorder/mod.rs"]
mod tests;
