use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;

use crate::foundation::core::{ImageType, frame_file_name};
use crate::foundation::error::RenderResult;
use crate::timing::window::RecordWindow;

/// Name of the fingerprint file stored inside the cache folder.
pub const FINGERPRINT_FILE: &str = "cache.txt";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintFields<'a> {
    input_path: &'a str,
    start_time: f64,
    end_time: f64,
    fps: u32,
    start_frame: u64,
    end_frame: u64,
    image_type: ImageType,
}

/// Serialized description of everything that determines the captured frames.
///
/// Two runs with equal fingerprints capture identical frame sets. Comparison is an exact string
/// match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheFingerprint(String);

impl CacheFingerprint {
    pub fn new(
        input_path: &str,
        window: &RecordWindow,
        fps: u32,
        image_type: ImageType,
    ) -> RenderResult<Self> {
        let fields = FingerprintFields {
            input_path,
            start_time: window.start_time,
            end_time: window.end_time,
            fps,
            start_frame: window.start_frame,
            end_frame: window.end_frame,
            image_type,
        };
        Ok(Self(serde_json::to_string(&fields)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk frame cache: a folder of captured frames plus the fingerprint of the run that
/// produced them.
#[derive(Clone, Debug)]
pub struct FrameCache {
    folder: PathBuf,
    enabled: bool,
}

impl FrameCache {
    pub fn new(folder: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            folder: folder.into(),
            enabled,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.folder.join(FINGERPRINT_FILE)
    }

    pub fn frame_path(&self, offset: u64, image_type: ImageType) -> PathBuf {
        self.folder.join(frame_file_name(offset, image_type))
    }

    /// Returns `true` when caching is enabled and the stored fingerprint matches exactly.
    ///
    /// A missing or unreadable fingerprint file is a miss, never an error.
    pub fn should_use_cache(&self, fingerprint: &CacheFingerprint) -> bool {
        if !self.enabled {
            return false;
        }
        match std::fs::read_to_string(self.fingerprint_path()) {
            Ok(stored) => stored == fingerprint.as_str(),
            Err(e) => {
                tracing::debug!(error = %e, "no readable cache fingerprint");
                false
            }
        }
    }

    /// Make the folder ready for a run. A miss wipes the folder so no stale frames survive.
    pub fn prepare(&self, hit: bool) -> RenderResult<()> {
        if !hit {
            self.clear()?;
        }
        std::fs::create_dir_all(&self.folder).with_context(|| {
            format!("failed to create cache folder '{}'", self.folder.display())
        })?;
        Ok(())
    }

    /// Record `fingerprint` as describing the folder contents.
    ///
    /// Must only be called after capture and encode have both completed.
    pub fn persist(&self, fingerprint: &CacheFingerprint) -> RenderResult<()> {
        let path = self.fingerprint_path();
        std::fs::write(&path, fingerprint.as_str())
            .with_context(|| format!("failed to write cache fingerprint '{}'", path.display()))?;
        Ok(())
    }

    /// Remove the cache folder and everything in it.
    pub fn clear(&self) -> RenderResult<()> {
        match std::fs::remove_dir_all(&self.folder) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!(
                    "failed to remove cache folder '{}'",
                    self.folder.display()
                ))
                .into()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame_cache.rs"]
mod tests;
