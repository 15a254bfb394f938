use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE_ROWS: u64 = 10_000;
pub const MAX_CHUNK_SIZE_ROWS: u64 = 1_000_000;
pub const MAX_ROW_OVERRIDE: u64 = 10_000_000;

/// A contiguous, 1-based inclusive row range of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Partition {
    pub partition_id: String,
    pub table: String,
    pub stage: u32,
    pub chunk_index: u32,
    pub start_row: u64,
    pub end_row: u64,
}

impl Partition {
    pub fn new(table: &str, stage: u32, chunk_index: u32, start_row: u64, end_row: u64) -> Self {
        Self {
            partition_id: Self::make_id(table, stage, chunk_index),
            table: table.to_string(),
            stage,
            chunk_index,
            start_row,
            end_row,
        }
    }

    /// `<table>|stage=<stage>|chunk=<chunk_index>`
    pub fn make_id(table: &str, stage: u32, chunk_index: u32) -> String {
        format!("{table}|stage={stage}|chunk={chunk_index}")
    }

    pub fn rows(&self) -> u64 {
        self.end_row + 1 - self.start_row
    }
}

/// Ordered partitions. Stages are non-decreasing along `partitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PartitionPlan {
    pub project_name: String,
    pub seed: u64,
    pub chunk_size_rows: u64,
    /// Requested tables plus their required parents, in generation order.
    pub selected_tables: Vec<String>,
    pub partitions: Vec<Partition>,
}

impl PartitionPlan {
    pub fn stage_count(&self) -> u32 {
        self.partitions
            .iter()
            .map(|partition| partition.stage + 1)
            .max()
            .unwrap_or(0)
    }

    /// Partitions grouped by stage, in stage order.
    pub fn stages(&self) -> Vec<Vec<&Partition>> {
        let mut stages: Vec<Vec<&Partition>> = vec![Vec::new(); self.stage_count() as usize];
        for partition in &self.partitions {
            stages[partition.stage as usize].push(partition);
        }
        stages
    }

    pub fn partitions_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Partition> + 'a {
        self.partitions
            .iter()
            .filter(move |partition| partition.table == table)
    }

    pub fn total_rows(&self) -> u64 {
        self.partitions.iter().map(Partition::rows).sum()
    }
}

/// Options for partition planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    #[serde(default = "default_chunk_size_rows")]
    pub chunk_size_rows: u64,
    /// Tables to generate; empty selects every table.
    #[serde(default)]
    pub selected_tables: Vec<String>,
    /// Row counts replacing the project's `row_count`, applied with `apply_row_overrides`.
    #[serde(default)]
    pub row_overrides: BTreeMap<String, u64>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            chunk_size_rows: DEFAULT_CHUNK_SIZE_ROWS,
            selected_tables: Vec::new(),
            row_overrides: BTreeMap::new(),
        }
    }
}

fn default_chunk_size_rows() -> u64 {
    DEFAULT_CHUNK_SIZE_ROWS
}
