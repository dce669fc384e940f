use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Deserializer};

use crate::foundation::core::ImageType;
use crate::foundation::error::{RenderError, RenderResult};
use crate::recorder::Recorder;

/// Hook receiving the recorder right after it is created, before `init`.
pub type CreatedHook = Arc<dyn Fn(&mut dyn Recorder) + Send + Sync>;

/// Everything a render run is parameterized by.
///
/// Deserializes from camelCase JSON; every field has a default.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Global name of the scene object in the page.
    pub name: String,
    /// Global name of the media scene object in the page.
    pub media: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Page to render: an `http(s)://` URL or a local file path.
    pub input: String,
    /// Comma separated output files (`.mp4`, `.webm`, `.mp3`).
    pub output: String,
    pub start_time: f64,
    pub duration: f64,
    pub iteration: f64,
    pub scale: f64,
    /// Number of parallel capture workers; 0 behaves like 1.
    pub multi: usize,
    pub bitrate: String,
    pub codec: Option<String>,
    pub referer: Option<String>,
    pub image_type: ImageType,
    #[serde(deserialize_with = "deserialize_flag")]
    pub alpha: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub cache: bool,
    pub cache_folder: PathBuf,
    #[serde(deserialize_with = "deserialize_flag")]
    pub buffer: bool,
    pub cpu_used: Option<u32>,
    /// Use this ffmpeg binary with the file-based recorder.
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub ffmpeg_log: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub no_log: bool,
    /// Page driver command line.
    pub driver: Vec<String>,
    #[serde(skip)]
    pub created: Option<CreatedHook>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            name: "scene".to_string(),
            media: "mediaScene".to_string(),
            fps: 60,
            width: 1920,
            height: 1080,
            input: "./index.html".to_string(),
            output: "output.mp4".to_string(),
            start_time: 0.0,
            duration: 0.0,
            iteration: 0.0,
            scale: 1.0,
            multi: 1,
            bitrate: "4096k".to_string(),
            codec: None,
            referer: None,
            image_type: ImageType::Png,
            alpha: false,
            cache: false,
            cache_folder: PathBuf::from(".scene_cache"),
            buffer: false,
            cpu_used: None,
            ffmpeg_path: None,
            ffmpeg_log: false,
            no_log: false,
            driver: vec!["scenecast-driver".to_string()],
            created: None,
        }
    }
}

impl std::fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOptions")
            .field("name", &self.name)
            .field("media", &self.media)
            .field("fps", &self.fps)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("start_time", &self.start_time)
            .field("duration", &self.duration)
            .field("iteration", &self.iteration)
            .field("scale", &self.scale)
            .field("multi", &self.multi)
            .field("bitrate", &self.bitrate)
            .field("codec", &self.codec)
            .field("referer", &self.referer)
            .field("image_type", &self.image_type)
            .field("alpha", &self.alpha)
            .field("cache", &self.cache)
            .field("cache_folder", &self.cache_folder)
            .field("buffer", &self.buffer)
            .field("cpu_used", &self.cpu_used)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ffmpeg_log", &self.ffmpeg_log)
            .field("no_log", &self.no_log)
            .field("driver", &self.driver)
            .field("created", &self.created.as_ref().map(|_| "Fn"))
            .finish()
    }
}

impl RenderOptions {
    /// Load options from a JSON file.
    pub fn from_path(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read options file '{}'", path.display()))?;
        let options: Self = serde_json::from_str(&text)?;
        Ok(options)
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.fps == 0 {
            return Err(RenderError::configuration("fps must be > 0"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::configuration("width/height must be > 0"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(RenderError::configuration("scale must be > 0"));
        }
        for (label, v) in [
            ("startTime", self.start_time),
            ("duration", self.duration),
            ("iteration", self.iteration),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(RenderError::configuration(format!(
                    "{label} must be a non-negative number"
                )));
            }
        }
        if self.name.trim().is_empty() {
            return Err(RenderError::configuration("scene name must not be empty"));
        }
        if self.output.split(',').all(|o| o.trim().is_empty()) {
            return Err(RenderError::configuration("no output file given"));
        }
        if self.cache_folder.as_os_str().is_empty() {
            return Err(RenderError::configuration("cacheFolder must not be empty"));
        }
        if self.driver.is_empty() {
            return Err(RenderError::configuration("driver command must not be empty"));
        }
        Ok(())
    }
}

/// Accept `true`/`false`, numbers (non-zero is true) or null.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        serde_json::Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean or number, got {other}"
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/options.rs"]
mod tests;
