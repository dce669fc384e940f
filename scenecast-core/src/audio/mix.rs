use std::path::Path;
use std::sync::Arc;

use crate::foundation::error::{RenderError, RenderResult};
use crate::media::sync::MediaTrack;

/// Sample rate of the mixing timeline.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Decoded interleaved PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }

    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / f64::from(self.sample_rate)
        }
    }
}

#[derive(Clone, Debug)]
/// One scheduled audio contribution in timeline sample space.
pub struct AudioSegment {
    pub timeline_start_sample: u64,
    pub timeline_end_sample: u64,
    pub source_start_sec: f64,
    pub source_end_sec: Option<f64>,
    pub playback_rate: f64,
    pub volume: f32,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    pub source_interleaved_f32: Arc<Vec<f32>>,
}

#[derive(Clone, Debug)]
/// Audio mixing plan for a whole media scene.
pub struct AudioManifest {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_samples: u64,
    pub segments: Vec<AudioSegment>,
}

/// Lay decoded tracks onto a timeline of `duration` seconds.
///
/// A zero `duration` sizes the timeline to the last track end.
pub fn build_audio_manifest(duration: f64, tracks: &[(MediaTrack, Arc<AudioPcm>)]) -> AudioManifest {
    let rate = f64::from(MIX_SAMPLE_RATE);
    let mut segments = Vec::with_capacity(tracks.len());

    for (track, pcm) in tracks {
        if pcm.frames() == 0 || pcm.channels == 0 {
            continue;
        }
        let source_len = pcm.duration_sec();
        let source_start_sec = track.seek_start();
        let source_end_sec = track.seek_end().map(|end| end.min(source_len));
        let playing = (source_end_sec.unwrap_or(source_len) - source_start_sec).max(0.0)
            / track.effective_play_speed();

        let start = (track.delay.max(0.0) * rate).round() as u64;
        let end = start + (playing * rate).round() as u64;
        if end <= start {
            continue;
        }
        segments.push(AudioSegment {
            timeline_start_sample: start,
            timeline_end_sample: end,
            source_start_sec,
            source_end_sec,
            playback_rate: track.effective_play_speed(),
            volume: track.effective_volume() as f32,
            source_sample_rate: pcm.sample_rate,
            source_channels: pcm.channels,
            source_interleaved_f32: Arc::new(pcm.interleaved_f32.clone()),
        });
    }

    let total_samples = if duration.is_finite() && duration > 0.0 {
        (duration * rate).round() as u64
    } else {
        segments
            .iter()
            .map(|s| s.timeline_end_sample)
            .max()
            .unwrap_or(0)
    };
    for seg in &mut segments {
        seg.timeline_end_sample = seg.timeline_end_sample.min(total_samples);
    }
    segments.retain(|s| s.timeline_end_sample > s.timeline_start_sample);

    AudioManifest {
        sample_rate: MIX_SAMPLE_RATE,
        channels: 2,
        total_samples,
        segments,
    }
}

/// Mix all manifest segments into interleaved output PCM.
pub fn mix_manifest(manifest: &AudioManifest) -> Vec<f32> {
    let frames = manifest.total_samples as usize;
    let mut out = vec![0.0f32; frames * usize::from(manifest.channels)];

    for seg in &manifest.segments {
        mix_segment(&mut out, manifest, seg);
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    out
}

fn mix_segment(out: &mut [f32], manifest: &AudioManifest, seg: &AudioSegment) {
    let src = seg.source_interleaved_f32.as_ref();
    let src_frames = src.len() / usize::from(seg.source_channels.max(1));
    if src_frames == 0 || seg.timeline_end_sample <= seg.timeline_start_sample {
        return;
    }

    for dst_sample in seg.timeline_start_sample..seg.timeline_end_sample {
        let rel_sec =
            (dst_sample - seg.timeline_start_sample) as f64 / f64::from(manifest.sample_rate);
        let src_sec = seg.source_start_sec + rel_sec * seg.playback_rate;
        if let Some(end_sec) = seg.source_end_sec
            && src_sec >= end_sec
        {
            break;
        }

        let src_pos = src_sec * f64::from(seg.source_sample_rate);
        if !src_pos.is_finite() || src_pos < 0.0 {
            break;
        }
        let src_frame0 = src_pos.floor() as usize;
        if src_frame0 >= src_frames {
            break;
        }
        let src_frame1 = (src_frame0 + 1).min(src_frames - 1);
        let frac = (src_pos - src_frame0 as f64) as f32;
        let dst_idx = dst_sample as usize * usize::from(manifest.channels);

        let (l, r) = if seg.source_channels == 1 {
            let v0 = src[src_frame0];
            let v1 = src[src_frame1];
            let v = v0 + ((v1 - v0) * frac);
            (v, v)
        } else {
            let i0 = src_frame0 * usize::from(seg.source_channels);
            let i1 = src_frame1 * usize::from(seg.source_channels);
            (
                src[i0] + ((src[i1] - src[i0]) * frac),
                src[i0 + 1] + ((src[i1 + 1] - src[i0 + 1]) * frac),
            )
        };

        out[dst_idx] += l * seg.volume;
        if manifest.channels > 1 {
            out[dst_idx + 1] += r * seg.volume;
        }
    }
}

/// Write interleaved `f32` PCM samples to a raw little-endian `.f32le` file.
pub fn write_mix_to_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> RenderResult<()> {
    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        RenderError::media(format!(
            "failed to write mixed audio file '{}': {e}",
            out_path.display()
        ))
    })
}

/// Decode any audio-bearing file to stereo interleaved `f32` PCM at `sample_rate`.
pub fn decode_audio_f32_stereo(
    program: &Path,
    path: &Path,
    sample_rate: u32,
) -> RenderResult<AudioPcm> {
    let out = std::process::Command::new(program)
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| RenderError::media(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // Video files without an audio stream decode to silence.
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("Output file #0 does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(RenderError::media(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm_from_f32le(&out.stdout)?,
    })
}

fn pcm_from_f32le(bytes: &[u8]) -> RenderResult<Vec<f32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RenderError::media(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
#[path = "../../tests/unit/audio/mix.rs"]
mod tests;
