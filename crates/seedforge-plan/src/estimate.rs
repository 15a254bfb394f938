//! Rough per-table cost estimates shown next to a partition plan.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use seedforge_core::Project;

use crate::model::PartitionPlan;
use crate::planner::RowUnits;

const MEMORY_BYTES_PER_CELL: f64 = 48.0;
const WRITE_BYTES_PER_CELL: f64 = 24.0;
const ROWS_PER_SECOND: f64 = 75_000.0;
const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkloadEstimate {
    pub table: String,
    pub rows: u64,
    pub memory_mb: f64,
    pub write_mb: f64,
    pub seconds: f64,
    pub risk: RiskLevel,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkloadSummary {
    pub tables: usize,
    pub partitions: usize,
    pub stages: u32,
    pub rows: u64,
    pub memory_mb: f64,
    pub write_mb: f64,
    pub seconds: f64,
    pub highest_risk: RiskLevel,
}

/// Estimates for every table in `plan`, plus their totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkloadReport {
    pub estimates: Vec<WorkloadEstimate>,
    pub summary: WorkloadSummary,
}

/// Estimate rows, memory, CSV size and time for each planned table.
pub fn estimate_workload(
    project: &Project,
    units: &dyn RowUnits,
    plan: &PartitionPlan,
) -> WorkloadReport {
    let estimates: Vec<WorkloadEstimate> = plan
        .selected_tables
        .iter()
        .map(|table| {
            let columns = project
                .table(table)
                .map_or(1, |spec| spec.columns.len().max(1));
            let rows = units.row_count(table).unwrap_or(0);
            estimate_table(table, rows, columns, plan.chunk_size_rows)
        })
        .collect();
    let summary = summarize(&estimates, plan);
    WorkloadReport { estimates, summary }
}

fn estimate_table(table: &str, rows: u64, columns: usize, chunk_size_rows: u64) -> WorkloadEstimate {
    let cells = rows as f64 * columns as f64;
    let memory_mb = round3(cells * MEMORY_BYTES_PER_CELL / MIB);
    let write_mb = round3(cells * WRITE_BYTES_PER_CELL / MIB);
    let complexity = 1.0 + columns.saturating_sub(4) as f64 * 0.08;
    let seconds = round3(rows as f64 * complexity / ROWS_PER_SECOND);

    let (risk, mut recommendation) = if memory_mb >= 512.0 || seconds >= 20.0 {
        (
            RiskLevel::High,
            "reduce row overrides or split the run with --tables",
        )
    } else if memory_mb >= 128.0 || seconds >= 5.0 {
        (
            RiskLevel::Medium,
            "review chunk_size_rows and worker_count before a full run",
        )
    } else {
        (RiskLevel::Low, "suitable for a single run")
    };
    if rows > chunk_size_rows.saturating_mul(4) {
        recommendation = "row target is large relative to the chunk size; consider raising chunk_size_rows";
    }

    WorkloadEstimate {
        table: table.to_string(),
        rows,
        memory_mb,
        write_mb,
        seconds,
        risk,
        recommendation: recommendation.to_string(),
    }
}

fn summarize(estimates: &[WorkloadEstimate], plan: &PartitionPlan) -> WorkloadSummary {
    WorkloadSummary {
        tables: estimates.len(),
        partitions: plan.partitions.len(),
        stages: plan.stage_count(),
        rows: estimates.iter().map(|estimate| estimate.rows).sum(),
        memory_mb: round3(estimates.iter().map(|estimate| estimate.memory_mb).sum()),
        write_mb: round3(estimates.iter().map(|estimate| estimate.write_mb).sum()),
        seconds: round3(estimates.iter().map(|estimate| estimate.seconds).sum()),
        highest_risk: estimates
            .iter()
            .map(|estimate| estimate.risk)
            .max()
            .unwrap_or(RiskLevel::Low),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
