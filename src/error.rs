//! Error types shared by every stage of the pipeline
//!
//! Input absence (no file chosen) is not an error and never reaches this type;
//! a missing hour is, because it must block an export before any side effect.

use std::path::PathBuf;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Export was requested without an hour value
    #[error("no hour entered; an hour is required before exporting")]
    MissingHour,

    /// A source image or video could not be turned into pixels
    #[error("media decode failed during {stage}: {reason}")]
    MediaDecodeFailed { stage: &'static str, reason: String },

    /// A library write would push the store past its quota.
    /// The store is left exactly as it was before the write.
    #[error("storage quota exceeded: {required} bytes required, {quota} bytes available")]
    StorageQuotaExceeded { required: u64, quota: u64 },

    /// An index does not address a library entry
    #[error("photo index {index} is out of range (library holds {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The composite renderer failed to produce a raster
    #[error("capture failed: {0}")]
    Capture(String),

    /// A batch export stopped part way. Files in `saved` were written and kept.
    #[error("export stopped at job {job} of {total} ({} file(s) already saved): {source}", .saved.len())]
    ExportAborted {
        job: usize,
        total: usize,
        saved: Vec<PathBuf>,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn decode(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::MediaDecodeFailed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn capture(reason: impl Into<String>) -> Self {
        Self::Capture(reason.into())
    }

    /// True for the quota condition, including when it aborted an export
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Self::StorageQuotaExceeded { .. } => true,
            Self::ExportAborted { source, .. } => source.is_quota_exceeded(),
            _ => false,
        }
    }
}
