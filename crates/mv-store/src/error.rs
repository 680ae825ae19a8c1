//! Error types for the report store

use std::path::PathBuf;

/// Report store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("i/o error at {}: {source}", .path.display())]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Report could not be encoded
    #[error("failed to encode report: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Stored file is not a valid report
    #[error("malformed report at {}: {source}", .path.display())]
    Malformed {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Every sequence suffix for this kind and timestamp is taken
    #[error("no free report name for {stem}")]
    Exhausted {
        /// File name stem
        stem: String,
    },
}
