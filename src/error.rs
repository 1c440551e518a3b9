//! Error taxonomy for news-harvest.
//!
//! Failures that corrupt a single unit of work (one target, one item) are
//! contained where they happen; failures that threaten the whole run
//! (storage, configuration, catalog) escalate through [`Error`] to the
//! retry supervisor or abort outright.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The work catalog is missing, malformed, or internally inconsistent.
    /// Fatal: retrying cannot fix a bad catalog.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The configuration file is missing, unparseable, or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Reading or writing the checkpoint store failed. Fatal to the current
    /// attempt; the retry supervisor decides whether to try again.
    #[error("checkpoint store error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// The configured output format is not one of the recognized options.
    #[error("unsupported output format: '{0}' (expected json, binary, or columnar)")]
    UnsupportedFormat(String),

    /// Encoding or decoding a result list or output artifact failed.
    #[error("serialization error: {0}")]
    Encode(String),

    /// The retry supervisor exhausted its attempts.
    #[error("run failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failed fetch for one target. Always recovered locally: the target
/// contributes nothing to the item's results and the item carries on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
