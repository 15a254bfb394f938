//! Core contracts and helpers for seedforge.
//!
//! This crate defines the project schema model, the diagnostic contract shared
//! by validation and generation, dependency ordering, stable seed derivation and
//! the project JSON load/save contract.

pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod io;
pub mod schema;
pub mod seed;

pub use diagnostics::{Diagnostic, Location};
pub use error::{Error, Result};
pub use graph::{CycleError, CycleScope, TableStage, order_columns, order_tables, table_stages};
pub use io::{
    load_project, project_fingerprint, project_from_json, project_json_schema, project_to_json,
    save_project,
};
pub use schema::{
    ColumnConstraints, ColumnSpec, DataType, Project, Relationship, ScdMode, TableSpec,
};
pub use seed::derive_seed;

/// Default seed applied when a project document omits one.
pub const DEFAULT_SEED: u64 = 12345;

/// Default row count for tables without an explicit `row_count`.
pub const DEFAULT_ROW_COUNT: u64 = 100;
