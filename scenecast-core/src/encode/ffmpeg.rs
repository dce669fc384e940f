use std::io::{BufRead as _, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use crate::foundation::core::{ImageType, VideoFormat};
use crate::foundation::error::{RenderError, RenderResult};

/// Audio track muxed next to the video stream.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioInputConfig {
    pub path: PathBuf,
    /// Seconds skipped at the start of the audio file.
    pub offset_sec: f64,
    /// Seconds of audio kept after the offset.
    pub duration_sec: f64,
}

/// Settings for one ffmpeg video encode.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeConfig {
    /// ffmpeg executable, `ffmpeg` resolves through `PATH`.
    pub program: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: VideoFormat,
    /// Video codec; `None` picks the container default.
    pub codec: Option<String>,
    pub bitrate: String,
    /// libvpx `-cpu-used` speed setting.
    pub cpu_used: Option<u32>,
    pub alpha: bool,
    pub audio: Option<AudioInputConfig>,
    pub out_path: PathBuf,
    /// Forward ffmpeg's own log output to tracing.
    pub log: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::encode("encode width/height must be non-zero"));
        }
        if self.fps == 0 {
            return Err(RenderError::encode("encode fps must be non-zero"));
        }
        if self.bitrate.trim().is_empty() {
            return Err(RenderError::encode("encode bitrate must not be empty"));
        }
        if let Some(audio) = &self.audio
            && (!audio.offset_sec.is_finite()
                || audio.offset_sec < 0.0
                || !audio.duration_sec.is_finite()
                || audio.duration_sec <= 0.0)
        {
            return Err(RenderError::encode(format!(
                "invalid audio window {}s + {}s",
                audio.offset_sec, audio.duration_sec
            )));
        }
        Ok(())
    }

    pub fn codec(&self) -> &str {
        self.codec
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(self.format.default_codec())
    }

    /// Whether transparency survives into the output file.
    pub fn keeps_alpha(&self) -> bool {
        self.alpha && self.format == VideoFormat::Webm
    }
}

/// Return `true` when `program -version` runs successfully.
pub fn is_ffmpeg_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether ffmpeg finds at least one audio stream in `path`.
pub fn has_audio_stream(program: &Path, path: &Path) -> RenderResult<bool> {
    // Without an output ffmpeg exits non-zero after printing the input streams.
    let out = Command::new(program)
        .args(["-hide_banner", "-i"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| RenderError::encode(format!("failed to inspect media with ffmpeg: {e}")))?;
    let stderr = String::from_utf8_lossy(&out.stderr);
    Ok(stderr
        .lines()
        .any(|line| line.contains("Stream #") && line.contains("Audio:")))
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> RenderResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Streams raw RGBA8 frames into an ffmpeg child process.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<String>>,
    scratch: Vec<u8>,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig) -> RenderResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !is_ffmpeg_available(&cfg.program) {
            return Err(RenderError::encode(format!(
                "ffmpeg is required for video encoding, but '{}' could not be run",
                cfg.program.display()
            )));
        }

        let mut cmd = Command::new(&cfg.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args(["-y", "-loglevel", log_level(cfg.log)]);
        cmd.args([
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
        ]);
        push_audio_input(&mut cmd, cfg.audio.as_ref());
        push_output_args(&mut cmd, &cfg);
        tracing::debug!(command = ?cmd, "spawning ffmpeg");

        let mut child = cmd.spawn().map_err(|e| {
            RenderError::encode(format!(
                "failed to spawn '{}': {e}",
                cfg.program.display()
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::encode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = drain_stderr(stderr, cfg.log);

        Ok(Self {
            scratch: vec![0u8; cfg.width as usize * cfg.height as usize * 4],
            cfg,
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            frames: 0,
        })
    }

    /// Write one straight-alpha RGBA8 frame.
    pub fn push_frame(&mut self, rgba: &[u8]) -> RenderResult<()> {
        if rgba.len() != self.scratch.len() {
            return Err(RenderError::encode(format!(
                "frame size mismatch: got {} bytes, expected {} for {}x{}",
                rgba.len(),
                self.scratch.len(),
                self.cfg.width,
                self.cfg.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RenderError::encode("ffmpeg encoder is already finalized"));
        };
        let bytes = if self.cfg.keeps_alpha() {
            rgba
        } else {
            flatten_to_opaque_rgba8(&mut self.scratch, rgba, [0, 0, 0, 255])?;
            &self.scratch
        };
        stdin.write_all(bytes).map_err(|e| {
            RenderError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finish(mut self) -> RenderResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| RenderError::encode("ffmpeg encoder is already finalized"))?;
        let status = child
            .wait()
            .map_err(|e| RenderError::encode(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = join_drain(self.stderr_drain.take())?;

        if !status.success() {
            return Err(RenderError::encode(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Encode `frames` image files named `frame{n}.{ext}` (n from 0) in `folder`.
pub fn encode_image_sequence(
    cfg: &EncodeConfig,
    folder: &Path,
    image_type: ImageType,
    frames: u64,
) -> RenderResult<()> {
    cfg.validate()?;
    ensure_parent_dir(&cfg.out_path)?;

    let mut cmd = Command::new(&cfg.program);
    cmd.args(["-y", "-loglevel", log_level(cfg.log)]);
    cmd.args([
        "-framerate",
        &cfg.fps.to_string(),
        "-start_number",
        "0",
        "-f",
        "image2",
        "-i",
    ])
    .arg(folder.join(format!("frame%d.{}", image_type.extension())));
    push_audio_input(&mut cmd, cfg.audio.as_ref());
    cmd.args(["-frames:v", &frames.to_string()]);
    push_output_args(&mut cmd, cfg);
    run_ffmpeg(cmd, cfg.log)
}

/// Encode raw interleaved `f32le` PCM to an mp3 file.
pub fn encode_pcm_to_mp3(
    program: &Path,
    pcm_path: &Path,
    sample_rate: u32,
    channels: u16,
    out_path: &Path,
    log: bool,
) -> RenderResult<()> {
    ensure_parent_dir(out_path)?;
    let mut cmd = Command::new(program);
    cmd.args(["-y", "-loglevel", log_level(log)]);
    cmd.args([
        "-f",
        "f32le",
        "-ar",
        &sample_rate.to_string(),
        "-ac",
        &channels.to_string(),
        "-i",
    ])
    .arg(pcm_path)
    .args(["-vn", "-c:a", "libmp3lame", "-b:a", "192k"])
    .arg(out_path);
    run_ffmpeg(cmd, log)
}

/// Run a one-shot ffmpeg invocation to completion.
pub fn run_ffmpeg(mut cmd: Command, log: bool) -> RenderResult<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    tracing::debug!(command = ?cmd, "running ffmpeg");

    let mut child = cmd
        .spawn()
        .map_err(|e| RenderError::encode(format!("failed to spawn ffmpeg: {e}")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RenderError::encode("failed to open ffmpeg stderr (unexpected)"))?;
    let drain = drain_stderr(stderr, log);
    let status = child
        .wait()
        .map_err(|e| RenderError::encode(format!("failed to wait for ffmpeg: {e}")))?;
    let stderr = join_drain(Some(drain))?;

    if !status.success() {
        return Err(RenderError::encode(format!(
            "ffmpeg exited with status {status}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

fn log_level(log: bool) -> &'static str {
    if log { "info" } else { "error" }
}

fn push_audio_input(cmd: &mut Command, audio: Option<&AudioInputConfig>) {
    if let Some(audio) = audio {
        cmd.args([
            "-ss",
            &audio.offset_sec.to_string(),
            "-t",
            &audio.duration_sec.to_string(),
            "-i",
        ])
        .arg(&audio.path);
    }
}

fn push_output_args(cmd: &mut Command, cfg: &EncodeConfig) {
    cmd.args(output_args(cfg)).arg(&cfg.out_path);
}

/// Codec, rate control and container arguments placed after every input.
pub fn output_args(cfg: &EncodeConfig) -> Vec<String> {
    let mut args = vec![
        "-map".to_string(),
        "0:v:0".to_string(),
        // yuv420p needs even dimensions.
        "-vf".to_string(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string(),
        "-c:v".to_string(),
        cfg.codec().to_string(),
        "-b:v".to_string(),
        cfg.bitrate.clone(),
        "-pix_fmt".to_string(),
        cfg.format.pixel_format(cfg.alpha).to_string(),
    ];
    if let Some(cpu_used) = cfg.cpu_used {
        args.extend(["-cpu-used".to_string(), cpu_used.to_string()]);
    }
    if cfg.keeps_alpha() {
        args.extend(["-auto-alt-ref".to_string(), "0".to_string()]);
    }
    if cfg.audio.is_some() {
        args.extend([
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:a".to_string(),
            cfg.format.default_audio_codec().to_string(),
        ]);
    } else {
        args.push("-an".to_string());
    }
    if cfg.format == VideoFormat::Mp4 {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args
}

fn drain_stderr(stderr: std::process::ChildStderr, log: bool) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            if log {
                tracing::info!(target: "ffmpeg", "{line}");
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> RenderResult<String> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| RenderError::encode("ffmpeg stderr drain thread panicked")),
        None => Ok(String::new()),
    }
}

/// Composite straight-alpha RGBA8 over an opaque background.
pub(crate) fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    bg_rgba: [u8; 4],
) -> RenderResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(RenderError::encode(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = u16::from(bg_rgba[0]);
    let bg_g = u16::from(bg_rgba[1]);
    let bg_b = u16::from(bg_rgba[2]);

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        let r = mul_div255(u16::from(s[0]), a) + mul_div255(bg_r, inv);
        let g = mul_div255(u16::from(s[1]), a) + mul_div255(bg_g, inv);
        let b = mul_div255(u16::from(s[2]), a) + mul_div255(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
