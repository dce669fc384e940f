//! Media scene metadata and media byte fetching.
//!
//! A page may host a media scene next to the animated scene. Its `getInfo()` report lists every
//! audio/video track with the timing needed to lay it onto the render timeline.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::foundation::error::{RenderError, RenderResult};
use crate::page::Page;

/// Timing report of a page's media scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSceneInfo {
    pub duration: f64,
    pub medias: Vec<MediaTrack>,
}

/// One media element of the scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaTrack {
    pub url: String,
    /// Scene time at which the track starts playing.
    pub delay: f64,
    /// Source window `[start, end]` in seconds; `end <= start` plays to the end of the source.
    pub seek: (f64, f64),
    pub play_speed: f64,
    pub volume: f64,
}

impl Default for MediaTrack {
    fn default() -> Self {
        Self {
            url: String::new(),
            delay: 0.0,
            seek: (0.0, 0.0),
            play_speed: 1.0,
            volume: 1.0,
        }
    }
}

impl MediaTrack {
    pub fn seek_start(&self) -> f64 {
        self.seek.0.max(0.0)
    }

    pub fn seek_end(&self) -> Option<f64> {
        (self.seek.1 > self.seek_start()).then_some(self.seek.1)
    }

    pub fn effective_play_speed(&self) -> f64 {
        if self.play_speed.is_finite() && self.play_speed > 0.0 {
            self.play_speed
        } else {
            1.0
        }
    }

    pub fn effective_volume(&self) -> f64 {
        if self.volume.is_finite() {
            self.volume.max(0.0)
        } else {
            1.0
        }
    }
}

/// Read the media scene report, or `None` when the page has no usable media scene.
pub fn get_media_info(page: &mut dyn Page, media: &str) -> Option<MediaSceneInfo> {
    if media.trim().is_empty() {
        return None;
    }
    let value = match page.evaluate(&format!("{media}.finish().getInfo()")) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(media, error = %e, "no media scene");
            return None;
        }
    };
    if !value.is_object() {
        return None;
    }
    match serde_json::from_value::<MediaSceneInfo>(value) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!(media, error = %e, "unreadable media scene info");
            None
        }
    }
}

/// Where a track's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaSource {
    Local(PathBuf),
    Remote(Url),
}

/// Resolve a track URL against the URL of the page that declared it.
pub fn resolve_media_source(source: &str, page_url: &Url) -> RenderResult<MediaSource> {
    let url = match Url::parse(source) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => page_url
            .join(source)
            .map_err(|e| RenderError::media(format!("invalid media url '{source}': {e}")))?,
        Err(e) => {
            return Err(RenderError::media(format!(
                "invalid media url '{source}': {e}"
            )));
        }
    };

    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(MediaSource::Local)
            .map_err(|()| RenderError::media(format!("invalid file url '{url}'"))),
        "http" | "https" => Ok(MediaSource::Remote(url)),
        other => Err(RenderError::media(format!(
            "unsupported media scheme '{other}' in '{source}'"
        ))),
    }
}

/// Loads the bytes of a media source.
pub trait FetchFile: Send + Sync {
    fn fetch(&self, source: &MediaSource) -> RenderResult<Vec<u8>>;
}

impl<F> FetchFile for F
where
    F: Fn(&MediaSource) -> RenderResult<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, source: &MediaSource) -> RenderResult<Vec<u8>> {
        self(source)
    }
}

/// Reads local files from disk and downloads remote ones over HTTP.
pub struct DefaultFetchFile {
    client: reqwest::blocking::Client,
    referer: Option<String>,
}

impl DefaultFetchFile {
    pub fn new(referer: Option<String>) -> RenderResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, referer })
    }
}

impl FetchFile for DefaultFetchFile {
    fn fetch(&self, source: &MediaSource) -> RenderResult<Vec<u8>> {
        match source {
            MediaSource::Local(path) => std::fs::read(path).map_err(|e| {
                RenderError::media(format!("failed to read '{}': {e}", path.display()))
            }),
            MediaSource::Remote(url) => {
                let mut request = self.client.get(url.clone());
                if let Some(referer) = &self.referer {
                    request = request.header(reqwest::header::REFERER, referer);
                }
                let response = request
                    .send()
                    .map_err(|e| RenderError::media(format!("failed to fetch '{url}': {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(RenderError::media(format!(
                        "fetching '{url}' returned {status}"
                    )));
                }
                let bytes = response
                    .bytes()
                    .map_err(|e| RenderError::media(format!("failed to read '{url}': {e}")))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// A track together with its fetched bytes.
#[derive(Clone, Debug)]
pub struct ResolvedTrack {
    pub track: MediaTrack,
    pub source: MediaSource,
    pub bytes: Vec<u8>,
}

/// Resolve and fetch every track of `info`. Tracks without a URL are skipped.
pub fn resolve_tracks(
    info: &MediaSceneInfo,
    page_url: &Url,
    fetch: &dyn FetchFile,
) -> RenderResult<Vec<ResolvedTrack>> {
    let mut out = Vec::with_capacity(info.medias.len());
    for track in &info.medias {
        if track.url.trim().is_empty() {
            continue;
        }
        let source = resolve_media_source(&track.url, page_url)?;
        tracing::debug!(url = %track.url, ?source, "fetching media");
        let bytes = fetch.fetch(&source)?;
        out.push(ResolvedTrack {
            track: track.clone(),
            source,
            bytes,
        });
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/media/sync.rs"]
mod tests;
