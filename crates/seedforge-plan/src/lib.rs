//! Partition plan contracts and run-ledger persistence.
//!
//! A plan splits each selected table into contiguous row ranges grouped by FK
//! stage. The plan is descriptive only; an executor consumes it stage by stage.

pub mod errors;
pub mod estimate;
pub mod ledger;
pub mod model;
pub mod planner;
pub mod schema;

pub use errors::{PlanError, Result};
pub use estimate::{RiskLevel, WorkloadEstimate, WorkloadReport, WorkloadSummary, estimate_workload};
pub use ledger::{
    ExecutionMode, JsonFileLedger, LedgerDocument, LedgerEntry, LedgerHeader, MemoryLedger,
    PartitionState, RunLedger,
};
pub use model::{
    DEFAULT_CHUNK_SIZE_ROWS, MAX_CHUNK_SIZE_ROWS, MAX_ROW_OVERRIDE, Partition, PartitionPlan, PlanOptions,
};
pub use planner::{RowUnits, apply_row_overrides, plan_partitions, resolve_selection};
pub use schema::{ledger_json_schema, plan_json_schema};
