//! Page-controller boundary.
//!
//! The engine never drives a browser directly. It talks to a [`Browser`] obtained from a
//! [`BrowserLauncher`], opens [`Page`]s on it, evaluates script expressions and takes
//! screenshots. [`driver`] provides an implementation backed by an external automation process.

use std::path::Path;

use serde::Serialize;

use crate::foundation::core::ImageType;
use crate::foundation::error::RenderResult;

/// Process-backed page driver speaking JSON lines over stdio.
pub mod driver;

/// Options used to open the page hosting the scene.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageOptions {
    pub name: String,
    pub media: String,
    pub width: u32,
    pub height: u32,
    /// Absolute page URL (`http(s)://` or `file://`).
    pub path: String,
    pub scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

/// One viewport capture.
#[derive(Clone, Copy, Debug)]
pub struct ScreenshotRequest<'a> {
    /// Destination of the image inside the cache folder.
    pub path: &'a Path,
    pub image_type: ImageType,
    /// Capture with a transparent background.
    pub omit_background: bool,
    /// Return the encoded image instead of letting the page write `path`.
    pub buffer: bool,
}

/// A controlled page.
pub trait Page: Send {
    /// Evaluate a script expression and return its JSON value.
    fn evaluate(&mut self, script: &str) -> RenderResult<serde_json::Value>;

    /// Capture the viewport.
    ///
    /// With `request.buffer` the encoded image is returned and the caller writes it; otherwise
    /// the page writes `request.path` itself and `None` is returned.
    fn screenshot(&mut self, request: &ScreenshotRequest<'_>) -> RenderResult<Option<Vec<u8>>>;
}

/// A browser instance able to host pages.
pub trait Browser: Send {
    fn open_page(&mut self, opts: &PageOptions) -> RenderResult<Box<dyn Page>>;

    /// Close the browser and every page it owns.
    fn close(&mut self) -> RenderResult<()>;
}

/// Factory for browsers; isolated capture workers launch one each.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self) -> RenderResult<Box<dyn Browser>>;
}

/// Evaluate `script` and require a finite number.
pub fn evaluate_number(page: &mut dyn Page, script: &str) -> RenderResult<f64> {
    let value = page.evaluate(script)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            crate::foundation::error::RenderError::capture(format!(
                "`{script}` returned {value}, expected a number"
            ))
        })
}
