/// Convenience result type used across scenecast.
pub type RenderResult<T> = Result<T, RenderError>;

/// Top-level error taxonomy used by the render engine.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Invalid user-provided options or an output request that cannot be satisfied.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The page did not report a usable scene timeline.
    #[error("timing error: {0}")]
    Timing(String),

    /// Errors while fetching, decoding or merging media tracks.
    #[error("media error: {0}")]
    Media(String),

    /// Errors raised by a capture worker or its page.
    #[error("capture error: {0}")]
    Capture(String),

    /// Errors raised by the encoding backend.
    #[error("encode error: {0}")]
    Encode(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// Build a [`RenderError::Configuration`] value.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`RenderError::Timing`] value.
    pub fn timing(msg: impl Into<String>) -> Self {
        Self::Timing(msg.into())
    }

    /// Build a [`RenderError::Media`] value.
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    /// Build a [`RenderError::Capture`] value.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Build a [`RenderError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`RenderError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<std::io::Error> for RenderError {
    fn from(value: std::io::Error) -> Self {
        Self::Other(anyhow::Error::new(value))
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(value: serde_json::Error) -> Self {
        Self::serde(value.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
