//! Dry runs that time a plan without writing files.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use seedforge_plan::{MemoryLedger, PartitionPlan, WorkloadReport, estimate_workload};

use crate::engine::{PreparedRun, Row};
use crate::errors::GenerationError;
use crate::model::RuntimeOptions;
use crate::output::RowSink;
use crate::runtime::{CancellationToken, PartitionRuntime, ProgressListener};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBenchmark {
    pub table: String,
    pub rows: u64,
    /// Unquoted CSV size: cell bytes plus one separator per cell, header excluded.
    pub rendered_bytes: u64,
}

/// Measured run next to the static estimate for the same plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub workload: WorkloadReport,
    pub tables: Vec<TableBenchmark>,
    pub rows_generated: u64,
    pub rendered_mb: f64,
    pub duration_ms: u64,
    pub rows_per_second: f64,
    pub cancelled: bool,
}

/// Renders and counts rows, then drops them.
#[derive(Default)]
struct CountingSink {
    tables: BTreeMap<String, TableBenchmark>,
}

impl CountingSink {
    fn entry(&mut self, table: &str) -> &mut TableBenchmark {
        self.tables
            .entry(table.to_string())
            .or_insert_with(|| TableBenchmark {
                table: table.to_string(),
                rows: 0,
                rendered_bytes: 0,
            })
    }
}

impl RowSink for CountingSink {
    fn begin_table(&mut self, table: &str, _columns: &[String]) -> Result<(), GenerationError> {
        self.entry(table);
        Ok(())
    }

    fn write_row(&mut self, table: &str, row: &Row) -> Result<(), GenerationError> {
        let cells = row.render();
        let bytes = cells.iter().map(|cell| cell.len() as u64).sum::<u64>() + cells.len() as u64;
        let entry = self.entry(table);
        entry.rows += 1;
        entry.rendered_bytes += bytes;
        Ok(())
    }
}

/// Generate every partition of `plan` in memory and report throughput.
///
/// Cancellation stops at a partition boundary and returns what was measured so far.
pub fn run_benchmark(
    prepared: &PreparedRun<'_>,
    plan: &PartitionPlan,
    options: RuntimeOptions,
    events: &dyn ProgressListener,
    cancel: &CancellationToken,
) -> Result<BenchmarkReport, GenerationError> {
    let workload = estimate_workload(prepared.project(), prepared, plan);
    let mut sink = CountingSink::default();
    let mut ledger = MemoryLedger::new();

    let start = Instant::now();
    let outcome = PartitionRuntime::new(options).run(
        prepared,
        plan,
        &mut sink,
        &mut ledger,
        events,
        cancel,
    )?;
    let elapsed = start.elapsed();

    let tables: Vec<TableBenchmark> = plan
        .selected_tables
        .iter()
        .filter_map(|table| sink.tables.remove(table))
        .collect();
    let rows_generated = tables.iter().map(|table| table.rows).sum::<u64>();
    let bytes = tables.iter().map(|table| table.rendered_bytes).sum::<u64>();
    let seconds = elapsed.as_secs_f64();
    let rows_per_second = if seconds > 0.0 {
        (rows_generated as f64 / seconds).round()
    } else {
        0.0
    };

    let report = BenchmarkReport {
        workload,
        tables,
        rows_generated,
        rendered_mb: (bytes as f64 / (1024.0 * 1024.0) * 1000.0).round() / 1000.0,
        duration_ms: elapsed.as_millis() as u64,
        rows_per_second,
        cancelled: outcome.is_cancelled(),
    };
    info!(
        project = %plan.project_name,
        rows = report.rows_generated,
        duration_ms = report.duration_ms,
        cancelled = report.cancelled,
        "benchmark finished"
    );
    Ok(report)
}
