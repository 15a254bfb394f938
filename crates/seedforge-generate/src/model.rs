use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for the generation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Maximum attempts to build a unique business key or a changed SCD2 version.
    pub max_attempts_row: u32,
    /// Added to every row number to form the primary key.
    pub pk_offset: u64,
    /// Upper bound of drawn SCD2 versions when `business_key_unique_count` is unset.
    pub scd2_default_max_versions: u32,
    /// What to do when child-table versions exceed the parent's `max_children`.
    pub child_capacity_policy: ChildCapacityPolicy,
    /// Base directory for relative `sample_csv` paths.
    pub asset_root: Option<PathBuf>,
    /// Null share for nullable columns without `constraints.null_rate`.
    pub default_null_rate: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_attempts_row: 50,
            pk_offset: 0,
            scd2_default_max_versions: 3,
            child_capacity_policy: ChildCapacityPolicy::Fail,
            asset_root: None,
            default_null_rate: 0.05,
        }
    }
}

/// Policy for SCD2 child tables whose versions outgrow the parent's child slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildCapacityPolicy {
    /// Abort with a capacity error.
    #[default]
    Fail,
    /// Drop trailing versions until every parent fits, and report it.
    Cap,
}

/// Options for partition execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub worker_count: usize,
    /// Retries per partition before falling back to sequential execution.
    pub retry_limit: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            retry_limit: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Summary of a generated table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rows_planned: u64,
    pub rows_generated: u64,
    pub entities: u64,
    pub retries: u64,
}

/// Structured generation warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl GenerationIssue {
    pub fn table(code: &str, table: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            table: Some(table.to_string()),
            column: None,
        }
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub status: RunStatus,
    pub tables: Vec<TableReport>,
    pub partitions_total: u64,
    pub partitions_completed: u64,
    pub partitions_skipped: u64,
    pub partition_retries: u64,
    pub fallback_used: bool,
    pub row_retries: u64,
    pub generator_usage: BTreeMap<String, u64>,
    pub warnings_by_code: BTreeMap<String, u64>,
    pub warnings: Vec<GenerationIssue>,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            tables: Vec::new(),
            partitions_total: 0,
            partitions_completed: 0,
            partitions_skipped: 0,
            partition_retries: 0,
            fallback_used: false,
            row_retries: 0,
            generator_usage: BTreeMap::new(),
            warnings_by_code: BTreeMap::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record_generator_usage(&mut self, id: &str, count: u64) {
        *self.generator_usage.entry(id.to_string()).or_insert(0) += count;
    }

    pub fn record_warning(&mut self, issue: GenerationIssue) {
        *self.warnings_by_code.entry(issue.code.clone()).or_insert(0) += 1;
        self.warnings.push(issue);
    }

    pub fn record_rows(&mut self, table: &str, rows: u64, retries: u64) {
        if let Some(entry) = self.tables.iter_mut().find(|entry| entry.table == table) {
            entry.rows_generated += rows;
            entry.retries += retries;
        }
        self.row_retries += retries;
    }

    pub fn rows_generated(&self) -> u64 {
        self.tables.iter().map(|table| table.rows_generated).sum()
    }
}
