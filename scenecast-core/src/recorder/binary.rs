use std::path::PathBuf;
use std::process::Command;

use anyhow::Context as _;
use url::Url;

use crate::audio::mix::MIX_SAMPLE_RATE;
use crate::encode::ffmpeg::{
    AudioInputConfig, EncodeConfig, encode_image_sequence, has_audio_stream, is_ffmpeg_available,
    run_ffmpeg,
};
use crate::foundation::error::{RenderError, RenderResult};
use crate::media::sync::{MediaSceneInfo, MediaTrack, resolve_tracks};
use crate::recorder::{
    EncodeOptions, RecordSession, Recorder, TempFileGuard, audio_window, media_scratch_path,
};

/// Recorder driving a user-supplied ffmpeg binary over files in the cache folder.
pub struct BinaryRecorder {
    session: RecordSession,
    ffmpeg_path: PathBuf,
    cache_folder: PathBuf,
    log: bool,
}

impl BinaryRecorder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, cache_folder: impl Into<PathBuf>, log: bool) -> Self {
        Self {
            session: RecordSession::default(),
            ffmpeg_path: ffmpeg_path.into(),
            cache_folder: cache_folder.into(),
            log,
        }
    }
}

impl Recorder for BinaryRecorder {
    fn session(&self) -> &RecordSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RecordSession {
        &mut self.session
    }

    fn init(&mut self) -> RenderResult<()> {
        if !is_ffmpeg_available(&self.ffmpeg_path) {
            return Err(RenderError::configuration(format!(
                "ffmpeg binary '{}' could not be run",
                self.ffmpeg_path.display()
            )));
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

        let mut guards = Vec::with_capacity(resolved.len() + 1);
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-loglevel", if self.log { "info" } else { "error" }]);
        let mut tracks = Vec::with_capacity(resolved.len());
        for (i, track) in resolved.iter().enumerate() {
            let path = media_scratch_path(&self.cache_folder, i, &track.track.url);
            std::fs::write(&path, &track.bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            guards.push(TempFileGuard(Some(path.clone())));
            if !has_audio_stream(&self.ffmpeg_path, &path)? {
                tracing::debug!(url = %track.track.url, "media track has no audio stream");
                continue;
            }
            cmd.arg("-i").arg(&path);
            tracks.push(track.track.clone());
        }

        if tracks.is_empty() {
            // Only silent tracks: the timeline is silence of the scene's length.
            if info.duration <= 0.0 {
                return Err(RenderError::media("media scene decoded to silence"));
            }
            cmd.args(["-f", "lavfi", "-i"])
                .arg(format!("anullsrc=r={MIX_SAMPLE_RATE}:cl=stereo"))
                .args(["-map", "0:a"]);
        } else {
            cmd.args(["-filter_complex", &merge_filter(&tracks), "-map", "[out]"]);
        }
        if info.duration > 0.0 {
            cmd.args(["-t", &info.duration.to_string()]);
        }
        let out_path = self.cache_folder.join("merge.tmp.mp3");
        cmd.args(["-c:a", "libmp3lame", "-b:a", "192k"]).arg(&out_path);
        guards.push(TempFileGuard(Some(out_path.clone())));

        run_ffmpeg(cmd, self.log)
            .map_err(|e| RenderError::media(format!("failed to merge media: {e}")))?;
        let audio = std::fs::read(&out_path)
            .with_context(|| format!("failed to read '{}'", out_path.display()))?;
        tracing::debug!(tracks = tracks.len(), bytes = audio.len(), "merged media");
        self.session.set_audio(audio);
        Ok(())
    }

    fn record(&mut self, opts: &EncodeOptions) -> RenderResult<Vec<u8>> {
        let window = self.record_info(&opts.record_info())?;
        let frames = self.session.capture(&window)?;
        let image_type = self
            .session
            .image_type()
            .ok_or_else(|| RenderError::capture("no worker pool bound to the recorder"))?;
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

        let cfg = EncodeConfig {
            program: self.ffmpeg_path.clone(),
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
        };
        encode_image_sequence(&cfg, &self.cache_folder, image_type, frames.len() as u64)?;

        std::fs::read(&out_path)
            .with_context(|| format!("failed to read encoded video '{}'", out_path.display()))
            .map_err(Into::into)
    }
}

/// `filter_complex` graph laying every input track onto the scene timeline into `[out]`.
pub fn merge_filter(tracks: &[MediaTrack]) -> String {
    let mut graph = String::new();
    for (i, track) in tracks.iter().enumerate() {
        let mut chain = vec![match track.seek_end() {
            Some(end) => format!("atrim=start={}:end={end}", track.seek_start()),
            None => format!("atrim=start={}", track.seek_start()),
        }];
        chain.push("asetpts=PTS-STARTPTS".to_string());
        chain.extend(atempo_chain(track.effective_play_speed()));
        chain.push(format!("volume={}", track.effective_volume()));
        let delay_ms = (track.delay.max(0.0) * 1000.0).round() as u64;
        chain.push(format!("adelay={delay_ms}|{delay_ms}"));
        graph.push_str(&format!("[{i}:a]{}[a{i}];", chain.join(",")));
    }
    for i in 0..tracks.len() {
        graph.push_str(&format!("[a{i}]"));
    }
    graph.push_str(&format!(
        "amix=inputs={}:duration=longest:normalize=0[out]",
        tracks.len()
    ));
    graph
}

/// `atempo` only accepts factors in `[0.5, 2]`; larger changes are chained.
pub fn atempo_chain(speed: f64) -> Vec<String> {
    let mut speed = if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    };
    let mut out = Vec::new();
    while speed > 2.0 {
        out.push("atempo=2".to_string());
        speed /= 2.0;
    }
    while speed < 0.5 {
        out.push("atempo=0.5".to_string());
        speed /= 0.5;
    }
    if (speed - 1.0).abs() > f64::EPSILON {
        out.push(format!("atempo={speed}"));
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/recorder/binary.rs"]
mod tests;
