use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};

/// Screenshot container written into the cache folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageType {
    pub fn parse(value: &str) -> RenderResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            other => Err(RenderError::configuration(format!(
                "unsupported image type '{other}' (expected png or jpeg)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    /// Whether screenshots of this type can carry an alpha channel.
    pub fn supports_alpha(self) -> bool {
        matches!(self, Self::Png)
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video container selected from an output file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    Mp4,
    Webm,
}

impl VideoFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "webm" => Some(Self::Webm),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn default_codec(self) -> &'static str {
        match self {
            Self::Mp4 => "libx264",
            Self::Webm => "libvpx-vp9",
        }
    }

    /// Output pixel format; only webm keeps an alpha plane.
    pub fn pixel_format(self, alpha: bool) -> &'static str {
        match (self, alpha) {
            (Self::Webm, true) => "yuva420p",
            _ => "yuv420p",
        }
    }

    pub fn default_audio_codec(self) -> &'static str {
        match self {
            Self::Mp4 => "aac",
            Self::Webm => "libopus",
        }
    }
}

/// File name of a captured frame, relative to the cache folder.
///
/// `offset` is the frame index minus the first recorded frame, so every capture pass yields a
/// zero-based image sequence.
pub fn frame_file_name(offset: u64, image_type: ImageType) -> String {
    format!("frame{offset}.{}", image_type.extension())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
