//! Partition execution.
//!
//! Partitions of one stage are generated in windows of `worker_count` on a rayon
//! pool; results are written to the sink in plan order, so the output never
//! depends on the worker count. A stage starts only after the previous stage is
//! fully written.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::ThreadPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use seedforge_plan::{Partition, PartitionPlan, RunLedger};

use crate::engine::{PreparedRun, RowBatch};
use crate::errors::GenerationError;
use crate::model::{GenerationReport, RunStatus, RuntimeOptions};
use crate::output::RowSink;

/// Shared flag checked at partition boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Completed,
    /// Already complete in the run ledger.
    Skipped,
    Retrying,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: u32,
    pub table: String,
    pub partition_id: String,
    /// Rows of `table` written by this run so far.
    pub rows_done: u64,
    pub status: PartitionStatus,
}

pub trait ProgressListener: Sync {
    fn on_event(&self, event: &ProgressEvent);
}

pub struct NoopListener;

impl ProgressListener for NoopListener {
    fn on_event(&self, _event: &ProgressEvent) {}
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressEvent) + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(GenerationReport),
    /// Stopped at a partition boundary; every written partition is in the ledger.
    Cancelled(GenerationReport),
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }

    pub fn report(&self) -> &GenerationReport {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Cancelled(report) => report,
        }
    }

    pub fn into_report(self) -> GenerationReport {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Cancelled(report) => report,
        }
    }
}

/// Mutable state of one run.
struct RunState<'s> {
    sink: &'s mut dyn RowSink,
    ledger: &'s mut dyn RunLedger,
    events: &'s dyn ProgressListener,
    report: GenerationReport,
    rows_done: BTreeMap<String, u64>,
    fallback: bool,
}

pub struct PartitionRuntime {
    options: RuntimeOptions,
}

impl PartitionRuntime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Execute `plan` against `prepared`, skipping partitions the ledger already holds.
    pub fn run(
        &self,
        prepared: &PreparedRun<'_>,
        plan: &PartitionPlan,
        sink: &mut dyn RowSink,
        ledger: &mut dyn RunLedger,
        events: &dyn ProgressListener,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, GenerationError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let workers = self.options.worker_count.max(1);
        let pool = if workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => Some(pool),
                Err(err) => {
                    warn!(error = %err, "worker pool unavailable; running sequentially");
                    None
                }
            }
        } else {
            None
        };

        let mut state = RunState {
            sink,
            ledger,
            events,
            report: prepared.new_report(run_id.clone()),
            rows_done: BTreeMap::new(),
            fallback: false,
        };
        state.report.partitions_total = plan.partitions.len() as u64;
        info!(
            run_id = %run_id,
            project = %plan.project_name,
            partitions = plan.partitions.len(),
            workers,
            "partition run started"
        );

        for table in prepared.tables() {
            if plan.selected_tables.contains(table)
                && let Some(layout) = prepared.layout(table)
            {
                state.sink.begin_table(table, &layout.columns)?;
            }
        }

        for stage in plan.stages() {
            let mut pending = Vec::with_capacity(stage.len());
            for partition in stage {
                if state.ledger.is_partition_complete(&partition.partition_id) {
                    state.report.partitions_skipped += 1;
                    state.emit(partition, PartitionStatus::Skipped);
                } else {
                    pending.push(partition);
                }
            }

            let mut next = 0;
            while next < pending.len() {
                if cancel.is_cancelled() {
                    return Ok(self.finish(state, start, true));
                }
                let active = if state.fallback { None } else { pool.as_ref() };
                let width = if active.is_some() { workers } else { 1 };
                let window = &pending[next..(next + width).min(pending.len())];
                next += window.len();

                let results: Vec<Result<RowBatch, GenerationError>> = match active {
                    Some(pool) => pool.install(|| {
                        window
                            .par_iter()
                            .map(|partition| guarded(prepared, partition))
                            .collect()
                    }),
                    None => window
                        .iter()
                        .map(|partition| guarded(prepared, partition))
                        .collect(),
                };

                for (partition, result) in window.iter().zip(results) {
                    let (batch, retries) =
                        self.settle(prepared, partition, result, pool.as_ref(), &mut state)?;
                    state.commit(partition, batch, retries)?;
                }
            }
        }

        Ok(self.finish(state, start, false))
    }

    /// Retry a failed partition; exhausted retries on the pool fall back to the calling thread.
    fn settle(
        &self,
        prepared: &PreparedRun<'_>,
        partition: &Partition,
        first: Result<RowBatch, GenerationError>,
        pool: Option<&ThreadPool>,
        state: &mut RunState<'_>,
    ) -> Result<(RowBatch, u32), GenerationError> {
        let mut attempts: u32 = 1;
        let mut result = first;
        loop {
            let err = match result {
                Ok(batch) => return Ok((batch, attempts - 1)),
                Err(err) => err,
            };
            let active = if state.fallback { None } else { pool };
            if err.is_transient() && attempts <= self.options.retry_limit {
                warn!(
                    partition_id = %partition.partition_id,
                    attempt = attempts,
                    error = %err,
                    "partition failed; retrying"
                );
                state.report.partition_retries += 1;
                state.emit(partition, PartitionStatus::Retrying);
                result = match active {
                    Some(pool) => pool.install(|| guarded(prepared, partition)),
                    None => guarded(prepared, partition),
                };
                attempts += 1;
                continue;
            }
            if err.is_transient() && active.is_some() {
                warn!(
                    partition_id = %partition.partition_id,
                    attempts,
                    "retries exhausted; continuing sequentially"
                );
                state.fallback = true;
                state.report.fallback_used = true;
                result = guarded(prepared, partition);
                attempts += 1;
                continue;
            }

            let err = match err {
                GenerationError::TransientWorker { message, .. } => {
                    GenerationError::TransientWorker {
                        partition_id: partition.partition_id.clone(),
                        attempts,
                        message,
                    }
                }
                other => other,
            };
            state
                .ledger
                .mark_partition_failed(partition, attempts - 1, &err.to_string())?;
            state.emit(partition, PartitionStatus::Failed);
            warn!(partition_id = %partition.partition_id, error = %err, "partition failed");
            return Err(err);
        }
    }

    fn finish(&self, state: RunState<'_>, start: Instant, cancelled: bool) -> RunOutcome {
        let mut report = state.report;
        report.duration_ms = start.elapsed().as_millis() as u64;
        report.status = if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        info!(
            run_id = %report.run_id,
            status = ?report.status,
            rows = report.rows_generated(),
            completed = report.partitions_completed,
            skipped = report.partitions_skipped,
            retries = report.partition_retries,
            fallback = report.fallback_used,
            duration_ms = report.duration_ms,
            "partition run finished"
        );
        if cancelled {
            RunOutcome::Cancelled(report)
        } else {
            RunOutcome::Completed(report)
        }
    }
}

impl RunState<'_> {
    fn commit(
        &mut self,
        partition: &Partition,
        batch: RowBatch,
        retries: u32,
    ) -> Result<(), GenerationError> {
        let table = partition.table.as_str();
        for row in &batch.rows {
            self.sink.write_row(table, row)?;
        }
        self.sink.flush(table)?;
        self.ledger.mark_partition_complete(partition, retries)?;

        let rows = batch.rows.len() as u64;
        *self.rows_done.entry(table.to_string()).or_insert(0) += rows;
        self.report.record_rows(table, rows, batch.retries);
        for (id, count) in &batch.generator_usage {
            self.report.record_generator_usage(id, *count);
        }
        self.report.partitions_completed += 1;
        self.emit(partition, PartitionStatus::Completed);
        Ok(())
    }

    fn emit(&self, partition: &Partition, status: PartitionStatus) {
        self.events.on_event(&ProgressEvent {
            stage: partition.stage,
            table: partition.table.clone(),
            partition_id: partition.partition_id.clone(),
            rows_done: self.rows_done.get(&partition.table).copied().unwrap_or(0),
            status,
        });
    }
}

/// Generate one partition; a panic becomes a transient worker error.
fn guarded(prepared: &PreparedRun<'_>, partition: &Partition) -> Result<RowBatch, GenerationError> {
    match catch_unwind(AssertUnwindSafe(|| {
        prepared.generate_rows(&partition.table, partition.start_row, partition.end_row)
    })) {
        Ok(result) => result,
        Err(panic) => Err(GenerationError::TransientWorker {
            partition_id: partition.partition_id.clone(),
            attempts: 1,
            message: panic_message(panic),
        }),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during generation".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "panic during generation");
    }
}
