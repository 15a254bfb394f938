use std::path::PathBuf;

use seedforge_core::CycleError;
use thiserror::Error;

/// Planning and ledger errors. Every variant renders `<Location>: <issue>. Fix: <hint>.`
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("Table '{0}': table not found in project. Fix: select tables defined in the project.")]
    UnknownTable(String),
    #[error(
        "Table '{0}': row count is unknown. Fix: build the plan from a prepared generation run or set row_count."
    )]
    MissingRowCount(String),
    #[error("Row override '{table}': {issue}. Fix: {hint}.")]
    RowOverride {
        table: String,
        issue: String,
        hint: String,
    },
    #[error(
        "Plan options: chunk_size_rows must be between 1 and {max}, got {value}. Fix: set chunk_size_rows within that range."
    )]
    InvalidChunkSize { value: u64, max: u64 },
    #[error("Run ledger '{}': {source}. Fix: check that the ledger path is readable and writable.", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Run ledger: invalid JSON: {0}. Fix: delete the ledger file to start a fresh run.")]
    Json(#[from] serde_json::Error),
    #[error(
        "Run ledger: document does not match the ledger schema: {0}. Fix: delete the ledger file to start a fresh run."
    )]
    Schema(String),
    #[error("Run ledger: {issue}. Fix: {hint}.")]
    Mismatch { issue: String, hint: String },
}

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, PlanError>;
