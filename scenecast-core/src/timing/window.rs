//! Conversion between scene timing (delay, duration, iterations, play speed) and the inclusive
//! frame range a render captures.

use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};

/// Tolerance used when snapping `time * fps` onto integer frame indices.
const FRAME_EPSILON: f64 = 1e-9;

/// Iteration count reported by a scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IterationCount {
    Finite(f64),
    Infinite,
}

impl IterationCount {
    /// Interpret a value returned by the page (`2`, `"2"` or `"infinite"`).
    pub fn from_value(value: &serde_json::Value) -> RenderResult<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Self::Finite)
                .ok_or_else(|| RenderError::timing(format!("invalid iteration count {n}"))),
            serde_json::Value::String(s) if s.trim() == "infinite" => Ok(Self::Infinite),
            serde_json::Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Self::Finite)
                .map_err(|_| RenderError::timing(format!("invalid iteration count '{s}'"))),
            other => Err(RenderError::timing(format!(
                "invalid iteration count {other}"
            ))),
        }
    }

    /// Iterations covered by one render; an infinite scene renders its first iteration.
    pub fn render_iterations(self) -> f64 {
        match self {
            Self::Finite(n) if n.is_finite() && n > 0.0 => n,
            Self::Finite(_) => 0.0,
            Self::Infinite => 1.0,
        }
    }
}

/// Timing metadata of the animation being recorded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimatorInfo {
    pub delay: f64,
    pub duration: f64,
    pub iteration_count: IterationCount,
    pub play_speed: f64,
}

impl AnimatorInfo {
    /// Timing for a page that only hosts a media scene.
    pub fn media_only(duration: f64) -> Self {
        Self {
            delay: 0.0,
            duration,
            iteration_count: IterationCount::Finite(1.0),
            play_speed: 1.0,
        }
    }

    /// Play speed with non-positive values treated as normal speed.
    pub fn effective_play_speed(&self) -> f64 {
        if self.play_speed.is_finite() && self.play_speed > 0.0 {
            self.play_speed
        } else {
            1.0
        }
    }
}

/// User-requested clipping of the timeline. Zero means "unset".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordInfoOptions {
    pub fps: u32,
    pub start_time: f64,
    pub iteration: f64,
    pub duration: f64,
    /// Number of capture workers; only affects striping, never the window bounds.
    pub multi: usize,
}

impl Default for RecordInfoOptions {
    fn default() -> Self {
        Self {
            fps: 60,
            start_time: 0.0,
            iteration: 0.0,
            duration: 0.0,
            multi: 1,
        }
    }
}

/// Inclusive frame range and matching wall-clock times of a render.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWindow {
    pub start_frame: u64,
    pub end_frame: u64,
    pub start_time: f64,
    pub end_time: f64,
}

impl RecordWindow {
    pub fn frame_count(&self) -> u64 {
        self.end_frame - self.start_frame + 1
    }

    pub fn frames(&self) -> std::ops::RangeInclusive<u64> {
        self.start_frame..=self.end_frame
    }

    /// Frames assigned to `worker` out of `workers` by stride distribution.
    pub fn stride(&self, worker: usize, workers: usize) -> impl Iterator<Item = u64> + use<> {
        stride_frames(self.start_frame, self.end_frame, worker, workers)
    }

    pub fn sample_time(&self, frame: u64, fps: u32) -> f64 {
        sample_time(frame, fps, self.end_time)
    }
}

/// `start + worker, start + worker + workers, ...` up to `end` inclusive.
pub fn stride_frames(
    start_frame: u64,
    end_frame: u64,
    worker: usize,
    workers: usize,
) -> impl Iterator<Item = u64> + use<> {
    let first = start_frame + worker as u64;
    (first..=end_frame).step_by(workers.max(1))
}

/// Wall-clock time sampled for `frame`, clamped to `end_time`.
pub fn sample_time(frame: u64, fps: u32, end_time: f64) -> f64 {
    (frame as f64 / f64::from(fps)).min(end_time)
}

/// Compute the inclusive frame window for an animator and the requested clipping.
pub fn record_window(
    opts: &RecordInfoOptions,
    animator: &AnimatorInfo,
) -> RenderResult<RecordWindow> {
    if opts.fps == 0 {
        return Err(RenderError::configuration("fps must be > 0"));
    }
    for (label, v) in [
        ("startTime", opts.start_time),
        ("iteration", opts.iteration),
        ("duration", opts.duration),
    ] {
        if !v.is_finite() || v < 0.0 {
            return Err(RenderError::configuration(format!(
                "{label} must be a non-negative number, got {v}"
            )));
        }
    }
    for (label, v) in [("delay", animator.delay), ("duration", animator.duration)] {
        if !v.is_finite() {
            return Err(RenderError::timing(format!(
                "scene reported a non-finite {label}"
            )));
        }
    }

    let fps = f64::from(opts.fps);
    let speed = animator.effective_play_speed();
    let iterations = if opts.iteration > 0.0 {
        opts.iteration
    } else {
        animator.iteration_count.render_iterations()
    };
    let total = (animator.delay.max(0.0) + animator.duration.max(0.0) * iterations) / speed;

    let start_time = opts.start_time;
    let end_time = if opts.duration > 0.0 {
        start_time + opts.duration
    } else {
        total
    };

    let start_frame = (start_time * fps + FRAME_EPSILON).floor() as u64;
    if end_time <= start_time {
        return Ok(RecordWindow {
            start_frame,
            end_frame: start_frame,
            start_time,
            end_time: start_time,
        });
    }
    let end_frame = ((end_time * fps - FRAME_EPSILON).ceil() as u64).max(start_frame);

    Ok(RecordWindow {
        start_frame,
        end_frame,
        start_time,
        end_time,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/timing/window.rs"]
mod tests;
