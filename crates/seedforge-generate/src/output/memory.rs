use std::collections::BTreeMap;

use super::RowSink;
use crate::engine::Row;
use crate::errors::GenerationError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Keeps every row in memory; used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn rows(&self, name: &str) -> &[Row] {
        self.tables
            .get(name)
            .map(|table| table.rows.as_slice())
            .unwrap_or_default()
    }

    /// Rows of `name` as CSV cells.
    pub fn rendered(&self, name: &str) -> Vec<Vec<String>> {
        self.rows(name).iter().map(Row::render).collect()
    }

    pub fn into_tables(self) -> BTreeMap<String, MemoryTable> {
        self.tables
    }
}

impl RowSink for MemorySink {
    fn begin_table(&mut self, table: &str, columns: &[String]) -> Result<(), GenerationError> {
        let entry = self.tables.entry(table.to_string()).or_default();
        if entry.columns.is_empty() {
            entry.columns = columns.to_vec();
        }
        Ok(())
    }

    fn write_row(&mut self, table: &str, row: &Row) -> Result<(), GenerationError> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .rows
            .push(row.clone());
        Ok(())
    }
}
