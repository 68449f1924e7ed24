pub type StudioResult<T> = Result<T, StudioError>;

/// A symbol renderer rejected a request.
///
/// Renderers must reject payloads that violate symbology constraints (fixed-length numeric
/// formats, checksum digits, unsupported characters) instead of silently truncating them.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("payload rejected: {0}")]
    Rejected(String),

    #[error("invalid render options: {0}")]
    InvalidOptions(String),

    #[error("{0} output is not supported by this renderer")]
    Unsupported(&'static str),
}

impl RenderError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Rejected(r) | Self::InvalidOptions(r) => r.clone(),
            Self::Unsupported(what) => format!("{what} output is not supported"),
        }
    }
}

/// Overlay (logo) composition failed. Never fatal: the base render is still published.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("overlay image is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("overlay data is not a recognized image format")]
    NotAnImage,

    #[error("failed to decode overlay image: {0}")]
    Decode(String),

    #[error("failed to draw overlay: {0}")]
    Draw(String),
}

/// The key-value store could not be read or written.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("storage io error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage key '{0}' is not a valid key")]
    InvalidKey(String),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// One export format failed; other formats and the preview are unaffected.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("failed to encode {format}: {reason}")]
    Encode { format: &'static str, reason: String },

    #[error("document export unavailable: {0}")]
    Document(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum StudioError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("overlay error: {0}")]
    Overlay(#[from] OverlayError),

    #[error("export error: {0}")]
    Export(#[from] ExportError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
