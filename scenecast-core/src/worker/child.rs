use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::core::{ImageType, frame_file_name};
use crate::foundation::error::{RenderError, RenderResult};
use crate::page::{Browser, BrowserLauncher, Page, PageOptions, ScreenshotRequest};
use crate::timing::window::{sample_time, stride_frames};

/// Settings shared by every capture worker of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildOptions {
    /// The page has no scene timeline, only a media scene.
    pub has_only_media: bool,
    pub name: String,
    pub media: String,
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub delay: f64,
    pub has_media: bool,
    pub referer: Option<String>,
    pub image_type: ImageType,
    pub alpha: bool,
    pub buffer: bool,
    pub cache_folder: PathBuf,
    pub play_speed: f64,
    pub fps: u32,
    /// Wall-clock end of the record window.
    pub end_time: f64,
    /// First recorded frame; frame files are numbered relative to it.
    pub skip_frame: u64,
}

impl ChildOptions {
    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            name: self.name.clone(),
            media: self.media.clone(),
            width: self.width,
            height: self.height,
            path: self.path.clone(),
            scale: self.scale,
            referer: self.referer.clone(),
        }
    }

    /// Scene time (play-speed scaled, delay included) shown on `frame`.
    pub fn scene_time(&self, frame: u64) -> f64 {
        sample_time(frame, self.fps, self.end_time) * self.play_speed
    }

    pub fn frame_path(&self, frame: u64) -> PathBuf {
        self.cache_folder.join(frame_file_name(
            frame.saturating_sub(self.skip_frame),
            self.image_type,
        ))
    }
}

/// Frames one worker captures: `start_frame + worker_index + k * workers` up to `end_frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordOptions {
    pub start_frame: u64,
    pub end_frame: u64,
    pub worker_index: usize,
    pub workers: usize,
}

impl RecordOptions {
    pub fn frames(&self) -> impl Iterator<Item = u64> + use<> {
        stride_frames(
            self.start_frame,
            self.end_frame,
            self.worker_index,
            self.workers,
        )
    }
}

/// Lifecycle of a capture worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Started,
    Recording,
    Disconnected,
    Failed,
}

/// One parallel capture stream.
pub trait CaptureWorker: Send {
    fn index(&self) -> usize;

    fn state(&self) -> WorkerState;

    /// Prepare the worker's page. Called once, before any [`CaptureWorker::record`].
    fn start(&mut self, opts: &ChildOptions) -> RenderResult<()>;

    /// Capture the worker's stride of frames into the cache folder. Returns the frame count.
    fn record(&mut self, rec: &RecordOptions) -> RenderResult<u64>;

    /// Release the page and its browser. Safe to call more than once.
    fn disconnect(&mut self) -> RenderResult<()>;
}

/// Seek `page` to each frame of `rec` and write a screenshot per frame.
#[tracing::instrument(level = "debug", skip(page, opts), fields(worker = rec.worker_index))]
pub fn record_frames(
    page: &mut dyn Page,
    opts: &ChildOptions,
    rec: &RecordOptions,
) -> RenderResult<u64> {
    let mut captured = 0u64;
    for frame in rec.frames() {
        let time = opts.scene_time(frame);
        if !opts.has_only_media {
            page.evaluate(&format!("{}.setTime({}, true)", opts.name, time - opts.delay))?;
        }
        if opts.has_media {
            page.evaluate(&format!("{}.setTime({time})", opts.media))?;
        }

        let path = opts.frame_path(frame);
        let bytes = page.screenshot(&ScreenshotRequest {
            path: &path,
            image_type: opts.image_type,
            omit_background: opts.alpha,
            buffer: opts.buffer,
        })?;
        if let Some(bytes) = bytes {
            std::fs::write(&path, bytes)
                .with_context(|| format!("failed to write frame '{}'", path.display()))?;
        }
        tracing::trace!(frame, time, "captured");
        captured += 1;
    }
    Ok(captured)
}

/// Worker 0: reuses the page the render already opened, and owns the primary browser.
pub struct PrimaryWorker {
    browser: Box<dyn Browser>,
    page: Box<dyn Page>,
    options: Option<ChildOptions>,
    state: WorkerState,
}

impl PrimaryWorker {
    pub fn new(browser: Box<dyn Browser>, page: Box<dyn Page>) -> Self {
        Self {
            browser,
            page,
            options: None,
            state: WorkerState::Uninitialized,
        }
    }

    /// Launch a browser and open the scene page on it.
    pub fn open(launcher: &dyn BrowserLauncher, opts: &PageOptions) -> RenderResult<Self> {
        let mut browser = launcher.launch()?;
        match browser.open_page(opts) {
            Ok(page) => Ok(Self::new(browser, page)),
            Err(e) => {
                if let Err(close_err) = browser.close() {
                    tracing::warn!(error = %close_err, "failed to close browser after open error");
                }
                Err(e)
            }
        }
    }

    pub fn page_mut(&mut self) -> &mut dyn Page {
        self.page.as_mut()
    }
}

impl CaptureWorker for PrimaryWorker {
    fn index(&self) -> usize {
        0
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn start(&mut self, opts: &ChildOptions) -> RenderResult<()> {
        tracing::info!("Start Worker 0");
        self.options = Some(opts.clone());
        self.state = WorkerState::Started;
        Ok(())
    }

    fn record(&mut self, rec: &RecordOptions) -> RenderResult<u64> {
        let opts = self
            .options
            .as_ref()
            .ok_or_else(|| RenderError::capture("worker 0 recorded before start"))?;
        self.state = WorkerState::Recording;
        let result = record_frames(self.page.as_mut(), opts, rec);
        self.state = if result.is_ok() {
            WorkerState::Started
        } else {
            WorkerState::Failed
        };
        result
    }

    fn disconnect(&mut self) -> RenderResult<()> {
        if self.state == WorkerState::Disconnected {
            return Ok(());
        }
        self.state = WorkerState::Disconnected;
        self.browser.close()
    }
}

impl Drop for PrimaryWorker {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "failed to close primary browser");
        }
    }
}

/// Worker `index >= 1`: launches and owns its own browser and page.
pub struct IsolatedWorker {
    index: usize,
    launcher: Arc<dyn BrowserLauncher>,
    browser: Option<Box<dyn Browser>>,
    page: Option<Box<dyn Page>>,
    options: Option<ChildOptions>,
    state: WorkerState,
}

impl IsolatedWorker {
    pub fn new(index: usize, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            index,
            launcher,
            browser: None,
            page: None,
            options: None,
            state: WorkerState::Uninitialized,
        }
    }
}

impl CaptureWorker for IsolatedWorker {
    fn index(&self) -> usize {
        self.index
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn start(&mut self, opts: &ChildOptions) -> RenderResult<()> {
        tracing::info!("Start Worker {}", self.index);
        let browser = self.browser.insert(self.launcher.launch()?);
        match browser.open_page(&opts.page_options()) {
            Ok(page) => {
                self.page = Some(page);
                self.options = Some(opts.clone());
                self.state = WorkerState::Started;
                Ok(())
            }
            Err(e) => {
                self.state = WorkerState::Failed;
                Err(RenderError::capture(format!(
                    "worker {} failed to open page: {e}",
                    self.index
                )))
            }
        }
    }

    fn record(&mut self, rec: &RecordOptions) -> RenderResult<u64> {
        let (Some(page), Some(opts)) = (self.page.as_mut(), self.options.as_ref()) else {
            return Err(RenderError::capture(format!(
                "worker {} recorded before start",
                self.index
            )));
        };
        self.state = WorkerState::Recording;
        let result = record_frames(page.as_mut(), opts, rec);
        self.state = if result.is_ok() {
            WorkerState::Started
        } else {
            WorkerState::Failed
        };
        result
    }

    fn disconnect(&mut self) -> RenderResult<()> {
        if self.state == WorkerState::Disconnected {
            return Ok(());
        }
        self.state = WorkerState::Disconnected;
        self.page = None;
        match self.browser.take() {
            Some(mut browser) => browser.close(),
            None => Ok(()),
        }
    }
}

impl Drop for IsolatedWorker {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(worker = self.index, error = %e, "failed to close worker browser");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/child.rs"]
mod tests;
