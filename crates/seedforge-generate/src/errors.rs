use std::path::PathBuf;

use seedforge_core::{CycleError, Diagnostic};
use seedforge_plan::PlanError;
use thiserror::Error;

use crate::generators::DuplicateGeneratorError;

/// Errors emitted by the generation engine.
///
/// Every variant renders as `<Location>: <issue>. Fix: <hint>.`
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The project failed validation; generation never started.
    #[error("{}", join_diagnostics(.0))]
    Schema(Vec<Diagnostic>),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    /// FK cardinality or business-key uniqueness cannot be met.
    #[error(
        "{}",
        capacity_message(.table, .business_key.as_deref(), .attempted, .issue, .hint)
    )]
    Capacity {
        table: String,
        business_key: Option<String>,
        attempted: u32,
        issue: String,
        hint: String,
    },
    #[error("Table '{table}', column '{column}': generator '{generator}' {issue}. Fix: {hint}.")]
    GeneratorParam {
        table: String,
        column: String,
        generator: String,
        issue: String,
        hint: String,
    },
    /// A partition failed in a way that may succeed on retry.
    #[error(
        "Partition '{partition_id}': worker failed after {attempts} attempt(s): {message}. Fix: rerun with the run ledger to resume, or lower the worker count."
    )]
    TransientWorker {
        partition_id: String,
        attempts: u32,
        message: String,
    },
    #[error(transparent)]
    Duplicate(#[from] DuplicateGeneratorError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Table '{table}': failed to write rows: {message}. Fix: check that the output target is writable.")]
    Sink { table: String, message: String },
    #[error("Output '{}': {source}. Fix: check that the path exists and is writable.", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV output: {0}. Fix: check that the output directory is writable.")]
    Csv(#[from] csv::Error),
    #[error("Report: {0}. Fix: report this as a bug.")]
    Json(#[from] serde_json::Error),
    #[error("Table '{0}': table not found in project. Fix: use a table defined in the project.")]
    UnknownTable(String),
}

impl GenerationError {
    /// Failures a partition retry may clear. Only worker panics qualify: generation is
    /// deterministic, and sink writes are never replayed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::TransientWorker { .. })
    }

    pub(crate) fn param(
        table: &str,
        column: &str,
        generator: &str,
        issue: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        GenerationError::GeneratorParam {
            table: table.to_string(),
            column: column.to_string(),
            generator: generator.to_string(),
            issue: issue.into(),
            hint: hint.into(),
        }
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn capacity_message(
    table: &str,
    business_key: Option<&str>,
    attempted: &u32,
    issue: &str,
    hint: &str,
) -> String {
    let mut detail = Vec::new();
    if let Some(key) = business_key {
        detail.push(format!("business key {key}"));
    }
    if *attempted > 0 {
        detail.push(format!("attempted {attempted}"));
    }
    if detail.is_empty() {
        format!("Table '{table}': {issue}. Fix: {hint}.")
    } else {
        format!("Table '{table}': {issue} ({}). Fix: {hint}.", detail.join(", "))
    }
}
