//! The render entry point: page → timing → cache → capture → encode → output files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use url::Url;

use crate::cache::frame_cache::{CacheFingerprint, FrameCache};
use crate::encode::ffmpeg::ensure_parent_dir;
use crate::foundation::core::VideoFormat;
use crate::foundation::error::{RenderError, RenderResult};
use crate::media::sync::{DefaultFetchFile, MediaSceneInfo, get_media_info};
use crate::page::driver::DriverLauncher;
use crate::page::{BrowserLauncher, Page, PageOptions, evaluate_number};
use crate::recorder::binary::BinaryRecorder;
use crate::recorder::render::RenderRecorder;
use crate::recorder::{EncodeOptions, MERGE_AUDIO_FILE, Recorder};
use crate::render::options::RenderOptions;
use crate::timing::window::{AnimatorInfo, IterationCount, RecordInfoOptions, RecordWindow};
use crate::worker::child::{CaptureWorker, ChildOptions, PrimaryWorker};
use crate::worker::pool::WorkerPool;

/// What a finished render produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSummary {
    pub window: RecordWindow,
    pub used_cache: bool,
    pub has_media: bool,
    pub only_media: bool,
    pub video_outputs: Vec<PathBuf>,
    pub audio_output: Option<PathBuf>,
    pub elapsed: Duration,
}

/// A requested video output file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoOutput {
    pub path: PathBuf,
    pub format: VideoFormat,
}

/// Output files split by kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputPlan {
    pub videos: Vec<VideoOutput>,
    pub audio: Option<PathBuf>,
}

impl OutputPlan {
    /// Split a comma separated output list. Unknown extensions are ignored.
    pub fn parse(output: &str) -> Self {
        let mut plan = Self::default();
        for item in output.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let path = PathBuf::from(item);
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if let Some(format) = VideoFormat::from_extension(&ext) {
                plan.videos.push(VideoOutput { path, format });
            } else if ext == "mp3" {
                if plan.audio.is_none() {
                    plan.audio = Some(path);
                }
            } else {
                tracing::warn!(output = item, "ignoring output with unknown extension");
            }
        }
        plan
    }
}

/// Render with the process-backed page driver named in `options.driver`.
pub fn render(options: RenderOptions) -> RenderResult<RenderSummary> {
    options.validate()?;
    let launcher = Arc::new(DriverLauncher::from_command(&options.driver)?);
    render_with(options, launcher)
}

/// Render with a caller-supplied browser launcher, choosing the recorder from the options.
pub fn render_with(
    options: RenderOptions,
    launcher: Arc<dyn BrowserLauncher>,
) -> RenderResult<RenderSummary> {
    let recorder: Box<dyn Recorder> = match &options.ffmpeg_path {
        Some(path) => Box::new(BinaryRecorder::new(
            path,
            &options.cache_folder,
            options.ffmpeg_log,
        )),
        None => Box::new(RenderRecorder::new(&options.cache_folder, options.ffmpeg_log)),
    };
    render_with_recorder(options, launcher, recorder)
}

/// Render with an explicit recorder. `destroy` runs on every path once the recorder exists.
pub fn render_with_recorder(
    options: RenderOptions,
    launcher: Arc<dyn BrowserLauncher>,
    mut recorder: Box<dyn Recorder>,
) -> RenderResult<RenderSummary> {
    options.validate()?;
    let log = RunLog {
        enabled: !options.no_log,
    };
    let started = Instant::now();
    log.info(format_args!("Start Render"));

    let input_url = resolve_input_url(&options.input)?;
    let outputs = OutputPlan::parse(&options.output);

    if let Some(created) = &options.created {
        created(recorder.as_mut());
    }
    let result = recorder.init().and_then(|()| {
        run(
            &options,
            &launcher,
            recorder.as_mut(),
            &input_url,
            &outputs,
            &log,
        )
    });
    recorder.destroy();

    let mut summary = result?;
    summary.elapsed = started.elapsed();
    log.info(format_args!(
        "End Render (Rendering Time: {:.3}s)",
        summary.elapsed.as_secs_f64()
    ));
    Ok(summary)
}

fn run(
    options: &RenderOptions,
    launcher: &Arc<dyn BrowserLauncher>,
    recorder: &mut dyn Recorder,
    input_url: &Url,
    outputs: &OutputPlan,
    log: &RunLog,
) -> RenderResult<RenderSummary> {
    let page_options = PageOptions {
        name: options.name.clone(),
        media: options.media.clone(),
        width: options.width,
        height: options.height,
        path: input_url.to_string(),
        scale: options.scale,
        referer: options.referer.clone(),
    };
    let mut primary = PrimaryWorker::open(launcher.as_ref(), &page_options)?;

    let media_info = get_media_info(primary.page_mut(), &options.media);
    let has_media = media_info.is_some();
    let (animator, only_media) =
        match evaluate_animator(primary.page_mut(), &options.name, options.iteration) {
            Ok(animator) => (animator, false),
            Err(e) => match &media_info {
                Some(info) => {
                    log.info(format_args!("Only Media Scene"));
                    (AnimatorInfo::media_only(info.duration), true)
                }
                None => {
                    return Err(RenderError::timing(format!(
                        "scene '{}' is not available: {e}",
                        options.name
                    )));
                }
            },
        };
    recorder.set_animator(animator);

    let window = recorder.record_info(&RecordInfoOptions {
        fps: options.fps,
        start_time: options.start_time,
        iteration: options.iteration,
        duration: options.duration,
        multi: options.multi.max(1),
    })?;

    let fingerprint =
        CacheFingerprint::new(&options.input, &window, options.fps, options.image_type)?;
    let cache = FrameCache::new(&options.cache_folder, options.cache);
    let is_cache = cache.should_use_cache(&fingerprint);
    cache.prepare(is_cache)?;

    if let Some(info) = &media_info {
        record_media(recorder, options, info, input_url)?;
    }

    let mut summary = RenderSummary {
        window,
        used_cache: is_cache,
        has_media,
        only_media,
        video_outputs: Vec::new(),
        audio_output: None,
        elapsed: Duration::ZERO,
    };

    if outputs.videos.is_empty() {
        log.info(format_args!("No Video"));
        let (Some(audio_path), Some(audio)) = (&outputs.audio, recorder.audio_file()) else {
            return Err(RenderError::configuration("Add Audio Input"));
        };
        write_output(audio_path, audio)?;
        log.info(format_args!("Audio File is created"));
        summary.audio_output = Some(audio_path.clone());
        primary.disconnect()?;
        if !options.cache {
            clear_after_outputs(&cache);
        }
        return Ok(summary);
    }

    if let Some(audio) = recorder.audio_file() {
        let path = cache.folder().join(MERGE_AUDIO_FILE);
        std::fs::write(&path, audio)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }

    let child_options = ChildOptions {
        has_only_media: only_media,
        name: options.name.clone(),
        media: options.media.clone(),
        path: input_url.to_string(),
        width: options.width,
        height: options.height,
        scale: options.scale,
        delay: animator.delay,
        has_media,
        referer: options.referer.clone(),
        image_type: options.image_type,
        alpha: options.alpha,
        buffer: options.buffer,
        cache_folder: options.cache_folder.clone(),
        play_speed: animator.effective_play_speed(),
        fps: options.fps,
        end_time: window.end_time,
        skip_frame: window.start_frame,
    };
    let workers = options.multi.max(1);
    let mut pool = WorkerPool::new(primary, child_options);
    if is_cache {
        log.info(format_args!(
            "Use Cache (startTime: {}, endTime: {}, fps: {}, startFrame: {}, endFrame: {})",
            window.start_time, window.end_time, options.fps, window.start_frame, window.end_frame
        ));
    } else {
        log.info(format_args!(
            "Start Workers (startTime: {}, endTime: {}, fps: {}, startFrame: {}, endFrame: {}, workers: {})",
            window.start_time,
            window.end_time,
            options.fps,
            window.start_frame,
            window.end_frame,
            workers
        ));
        pool.spawn_isolated(launcher.clone(), workers);
    }
    recorder.set_render_capturing(
        options.image_type,
        pool,
        is_cache,
        options.cache_folder.clone(),
    );

    // One capture feeds every container; each distinct format is encoded once.
    let capture_end = recorder.capture_end();
    let mut encoded = Vec::<(VideoFormat, Vec<u8>)>::new();
    let mut writes = Vec::with_capacity(outputs.videos.len());
    for video in &outputs.videos {
        let slot = match encoded.iter().position(|(format, _)| *format == video.format) {
            Some(slot) => slot,
            None => {
                let data = recorder.record(&encode_options(options, video.format))?;
                encoded.push((video.format, data));
                encoded.len() - 1
            }
        };
        writes.push((&video.path, slot));
    }

    if options.cache && capture_end.try_recv().is_ok() {
        cache.persist(&fingerprint)?;
    }

    for (path, slot) in writes {
        write_output(path, &encoded[slot].1)?;
        summary.video_outputs.push(path.clone());
    }
    log.info(format_args!("Created Video: {}", options.output));

    if let (Some(audio_path), Some(audio)) = (&outputs.audio, recorder.audio_file()) {
        write_output(audio_path, audio)?;
        summary.audio_output = Some(audio_path.clone());
    }

    if !options.cache {
        clear_after_outputs(&cache);
    }
    Ok(summary)
}

fn encode_options(options: &RenderOptions, format: VideoFormat) -> EncodeOptions {
    EncodeOptions {
        format,
        fps: options.fps,
        start_time: options.start_time,
        iteration: options.iteration,
        duration: options.duration,
        multi: options.multi.max(1),
        codec: options.codec.clone(),
        bitrate: options.bitrate.clone(),
        cpu_used: options.cpu_used,
        alpha: options.alpha,
    }
}

/// Outputs are already on disk, so a leftover cache folder is not worth failing the run.
fn clear_after_outputs(cache: &FrameCache) {
    if let Err(e) = cache.clear() {
        tracing::warn!(folder = %cache.folder().display(), error = %e, "failed to clear cache folder");
    }
}

fn record_media(
    recorder: &mut dyn Recorder,
    options: &RenderOptions,
    info: &MediaSceneInfo,
    input_url: &Url,
) -> RenderResult<()> {
    if !recorder.session().has_fetch_file() {
        recorder.set_fetch_file(Arc::new(DefaultFetchFile::new(options.referer.clone())?));
    }
    recorder.record_media(info, input_url)
}

/// Read the scene's timing. A requested iteration count replaces the scene's own.
pub fn evaluate_animator(
    page: &mut dyn Page,
    name: &str,
    iteration: f64,
) -> RenderResult<AnimatorInfo> {
    let iteration_count = if iteration > 0.0 {
        IterationCount::Finite(iteration)
    } else {
        IterationCount::from_value(&page.evaluate(&format!("{name}.getIterationCount()"))?)?
    };
    let delay = evaluate_number(page, &format!("{name}.getDelay()"))?;
    let play_speed = evaluate_number(page, &format!("{name}.getPlaySpeed()"))?;
    let duration = evaluate_number(page, &format!("{name}.getDuration()"))?;
    Ok(AnimatorInfo {
        delay,
        duration,
        iteration_count,
        play_speed,
    })
}

/// `http(s)` inputs are kept; anything else is a file path made absolute.
pub fn resolve_input_url(input: &str) -> RenderResult<Url> {
    let lower = input.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Url::parse(input.trim())
            .map_err(|e| RenderError::configuration(format!("invalid input url '{input}': {e}")));
    }
    let absolute = std::path::absolute(Path::new(input))
        .with_context(|| format!("failed to resolve input path '{input}'"))?;
    Url::from_file_path(&absolute).map_err(|()| {
        RenderError::configuration(format!(
            "input path '{}' cannot be expressed as a file url",
            absolute.display()
        ))
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> RenderResult<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write output '{}'", path.display()))?;
    Ok(())
}

/// Run milestones, silenced by `noLog`.
struct RunLog {
    enabled: bool,
}

impl RunLog {
    fn info(&self, message: fmt::Arguments<'_>) {
        if self.enabled {
            tracing::info!("{message}");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;
