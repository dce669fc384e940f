use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use rayon::prelude::*;
use url::Url;

use crate::audio::mix::{
    AudioPcm, MIX_SAMPLE_RATE, build_audio_manifest, decode_audio_f32_stereo, mix_manifest,
    write_mix_to_f32le_file,
};
use crate::encode::ffmpeg::{
    AudioInputConfig, EncodeConfig, FfmpegEncoder, encode_pcm_to_mp3, is_ffmpeg_available,
};
use crate::foundation::error::{RenderError, RenderResult};
use crate::media::sync::{MediaSceneInfo, MediaTrack, resolve_tracks};
use crate::recorder::{
    CapturedFrame, EncodeOptions, RecordSession, Recorder, TempFileGuard, audio_window,
    media_scratch_path,
};

/// Frames decoded in parallel before being streamed in order.
const DECODE_CHUNK: usize = 64;

/// Default recorder: decodes frames in-process and streams raw RGBA to `ffmpeg` on `PATH`.
pub struct RenderRecorder {
    session: RecordSession,
    program: PathBuf,
    cache_folder: PathBuf,
    log: bool,
}

impl RenderRecorder {
    pub fn new(cache_folder: impl Into<PathBuf>, log: bool) -> Self {
        Self {
            session: RecordSession::default(),
            program: PathBuf::from("ffmpeg"),
            cache_folder: cache_folder.into(),
            log,
        }
    }

    fn decode_track(&self, index: usize, url: &str, bytes: &[u8]) -> RenderResult<AudioPcm> {
        let path = media_scratch_path(&self.cache_folder, index, url);
        let _guard = TempFileGuard(Some(path.clone()));
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        decode_audio_f32_stereo(&self.program, &path, MIX_SAMPLE_RATE)
    }
}

impl Recorder for RenderRecorder {
    fn session(&self) -> &RecordSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RecordSession {
        &mut self.session
    }

    fn init(&mut self) -> RenderResult<()> {
        if !is_ffmpeg_available(&self.program) {
            tracing::warn!("ffmpeg was not found on PATH; encoding will fail");
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.session.reset();
    }

    fn record_media(&mut self, info: &MediaSceneInfo, input_url: &Url) -> RenderResult<()> {
        let fetch = self.session.fetch_file()?;
        let resolved = resolve_tracks(info, input_url, fetch.as_ref())?;
        if resolved.is_empty() {
            return Err(RenderError::media("media scene has no playable tracks"));
        }
        std::fs::create_dir_all(&self.cache_folder).with_context(|| {
            format!("failed to create '{}'", self.cache_folder.display())
        })?;

        let mut tracks = Vec::<(MediaTrack, Arc<AudioPcm>)>::with_capacity(resolved.len());
        for (i, r) in resolved.iter().enumerate() {
            let pcm = self.decode_track(i, &r.track.url, &r.bytes)?;
            tracks.push((r.track.clone(), Arc::new(pcm)));
        }
        let manifest = build_audio_manifest(info.duration, &tracks);
        if manifest.total_samples == 0 {
            return Err(RenderError::media("media scene decoded to silence"));
        }
        let mix = mix_manifest(&manifest);

        let pcm_path = self.cache_folder.join("merge.f32le");
        let mp3_path = self.cache_folder.join("merge.tmp.mp3");
        let _pcm_guard = TempFileGuard(Some(pcm_path.clone()));
        let _mp3_guard = TempFileGuard(Some(mp3_path.clone()));
        write_mix_to_f32le_file(&mix, &pcm_path)?;
        encode_pcm_to_mp3(
            &self.program,
            &pcm_path,
            manifest.sample_rate,
            manifest.channels,
            &mp3_path,
            self.log,
        )
        .map_err(|e| RenderError::media(format!("failed to encode merged audio: {e}")))?;

        let audio = std::fs::read(&mp3_path)
            .with_context(|| format!("failed to read '{}'", mp3_path.display()))?;
        tracing::debug!(
            segments = manifest.segments.len(),
            bytes = audio.len(),
            "merged media"
        );
        self.session.set_audio(audio);
        Ok(())
    }

    fn record(&mut self, opts: &EncodeOptions) -> RenderResult<Vec<u8>> {
        let window = self.record_info(&opts.record_info())?;
        let frames = self.session.capture(&window)?;
        let first = frames
            .first()
            .ok_or_else(|| RenderError::capture("no frames captured"))?;
        let (width, height) = image::image_dimensions(&first.path)
            .map_err(|e| RenderError::encode(format!("failed to read frame size: {e}")))?;

        let audio = self.session.merged_audio_path().map(|path| {
            let (offset_sec, duration_sec) = audio_window(&window, opts.fps);
            AudioInputConfig {
                path,
                offset_sec,
                duration_sec,
            }
        });
        let out_path = self
            .cache_folder
            .join(format!("output.{}", opts.format.extension()));
        let _out_guard = TempFileGuard(Some(out_path.clone()));

        let mut encoder = FfmpegEncoder::new(EncodeConfig {
            program: self.program.clone(),
            width,
            height,
            fps: opts.fps,
            format: opts.format,
            codec: opts.codec.clone(),
            bitrate: opts.bitrate.clone(),
            cpu_used: opts.cpu_used,
            alpha: opts.alpha,
            audio,
            out_path: out_path.clone(),
            log: self.log,
        })?;

        for chunk in frames.chunks(DECODE_CHUNK) {
            let decoded = chunk
                .par_iter()
                .map(|frame| decode_frame(frame, width, height))
                .collect::<Vec<_>>();
            for rgba in decoded {
                encoder.push_frame(&rgba?)?;
            }
        }
        tracing::debug!(frames = encoder.frames(), "streamed frames");
        encoder.finish()?;

        std::fs::read(&out_path)
            .with_context(|| format!("failed to read encoded video '{}'", out_path.display()))
            .map_err(Into::into)
    }
}

fn decode_frame(frame: &CapturedFrame, width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let img = open_rgba(&frame.path)?;
    if img.width() != width || img.height() != height {
        return Err(RenderError::encode(format!(
            "frame {} is {}x{}, expected {width}x{height}",
            frame.offset,
            img.width(),
            img.height()
        )));
    }
    Ok(img.into_raw())
}

fn open_rgba(path: &Path) -> RenderResult<image::RgbaImage> {
    let img = image::open(path)
        .map_err(|e| RenderError::encode(format!("failed to decode '{}': {e}", path.display())))?;
    Ok(img.to_rgba8())
}

#[cfg(test)]
#[path = "../../tests/unit/recorder/render.rs"]
mod tests;
