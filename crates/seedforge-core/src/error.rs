use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Core error type for project documents.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be read or written.
    #[error("Project file '{}': {source}. Fix: check that the path exists and is accessible.", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid JSON or does not match the project shape.
    #[error("Project: invalid project document: {0}. Fix: correct the JSON structure.")]
    Json(#[from] serde_json::Error),
    /// The document parsed but carries a value the model cannot represent.
    #[error("{0}")]
    InvalidDocument(Diagnostic),
}

/// Convenience alias for results returned by seedforge-core.
pub type Result<T> = std::result::Result<T, Error>;
