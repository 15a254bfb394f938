use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::RowSink;
use crate::engine::Row;
use crate::errors::GenerationError;

type TableWriter = csv::Writer<CountingWriter<BufWriter<File>>>;

/// Writes `<dir>/<table>.csv`, one file per table, header first.
pub struct CsvSink {
    dir: PathBuf,
    append: bool,
    writers: BTreeMap<String, TableWriter>,
}

impl CsvSink {
    /// Fresh output; existing table files are truncated when their table starts.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, GenerationError> {
        Self::open(dir.as_ref(), false)
    }

    /// Resumed output; rows are appended to existing table files without a second header.
    pub fn resume(dir: impl AsRef<Path>) -> Result<Self, GenerationError> {
        Self::open(dir.as_ref(), true)
    }

    fn open(dir: &Path, append: bool) -> Result<Self, GenerationError> {
        fs::create_dir_all(dir).map_err(|source| GenerationError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            append,
            writers: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    /// Bytes written by this sink so far, headers included.
    pub fn bytes_written(&self) -> u64 {
        self.writers
            .values()
            .map(|writer| writer.get_ref().bytes_written())
            .sum()
    }

    /// Flush every table and return the total bytes written.
    pub fn finish(mut self) -> Result<u64, GenerationError> {
        for writer in self.writers.values_mut() {
            writer.flush().map_err(csv::Error::from)?;
        }
        Ok(self.bytes_written())
    }

    fn writer(&mut self, table: &str) -> Result<&mut TableWriter, GenerationError> {
        self.writers.get_mut(table).ok_or_else(|| GenerationError::Sink {
            table: table.to_string(),
            message: "rows written before the table was started".to_string(),
        })
    }
}

impl RowSink for CsvSink {
    fn begin_table(&mut self, table: &str, columns: &[String]) -> Result<(), GenerationError> {
        if self.writers.contains_key(table) {
            return Ok(());
        }
        let path = self.table_path(table);
        let io_error = |source| GenerationError::Io {
            path: path.clone(),
            source,
        };
        let existing = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
        let continuing = self.append && existing > 0;
        let file = if continuing {
            OpenOptions::new().append(true).open(&path).map_err(io_error)?
        } else {
            File::create(&path).map_err(io_error)?
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(CountingWriter::new(BufWriter::new(file)));
        if !continuing {
            writer.write_record(columns)?;
        }
        debug!(table, path = %path.display(), append = continuing, "csv table opened");
        self.writers.insert(table.to_string(), writer);
        Ok(())
    }

    fn write_row(&mut self, table: &str, row: &Row) -> Result<(), GenerationError> {
        self.writer(table)?.write_record(row.render())?;
        Ok(())
    }

    fn flush(&mut self, table: &str) -> Result<(), GenerationError> {
        self.writer(table)?.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
