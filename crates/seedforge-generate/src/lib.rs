//! Deterministic synthetic data generation for seedforge projects.
//!
//! A project is validated into typed column plans, every table is laid out
//! (row counts, FK parents, business-key identities) and rows are then produced
//! per partition. Any row range can be generated on its own, so sequential and
//! partitioned runs write identical output.

pub mod assets;
pub mod benchmark;
pub mod engine;
pub mod errors;
pub mod foreign;
pub mod generators;
pub mod layout;
pub mod model;
pub mod output;
pub mod params;
pub mod planner;
pub mod runtime;
pub mod scd;
pub mod validate;

pub use benchmark::{BenchmarkReport, TableBenchmark, run_benchmark};
pub use engine::{GenerationEngine, PreparedRun, Row, RowBatch, RowEngine, RowMeta};
pub use errors::GenerationError;
pub use generators::{GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry};
pub use model::{
    ChildCapacityPolicy, GenerateOptions, GenerationIssue, GenerationReport, RunStatus,
    RuntimeOptions, TableReport,
};
pub use output::{CsvSink, MemorySink, RowSink};
pub use planner::PartitionPlanner;
pub use runtime::{
    CancellationToken, NoopListener, PartitionRuntime, PartitionStatus, ProgressEvent,
    ProgressListener, RunOutcome,
};
pub use scd::VersionState;
pub use validate::{ValidatedProject, analyze, validate};
