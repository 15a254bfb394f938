//! Row sinks. The runtime writes partitions in plan order, so a sink sees each
//! table's rows in ascending row number.

pub mod csv;
pub mod memory;

pub use self::csv::CsvSink;
pub use self::memory::{MemorySink, MemoryTable};

use crate::engine::Row;
use crate::errors::GenerationError;

/// Destination for generated rows.
pub trait RowSink {
    /// Called once per table before its first row.
    fn begin_table(&mut self, _table: &str, _columns: &[String]) -> Result<(), GenerationError> {
        Ok(())
    }

    fn write_row(&mut self, table: &str, row: &Row) -> Result<(), GenerationError>;

    /// Called after every partition; rows written so far must be durable afterwards.
    fn flush(&mut self, _table: &str) -> Result<(), GenerationError> {
        Ok(())
    }
}
