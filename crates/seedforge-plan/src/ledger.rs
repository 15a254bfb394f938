use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use jsonschema::JSONSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{PlanError, Result};
use crate::model::Partition;
use crate::schema::ledger_json_schema;

/// Records partition completion so interrupted runs can resume.
pub trait RunLedger: Send {
    fn is_partition_complete(&self, partition_id: &str) -> bool;

    fn mark_partition_complete(&mut self, partition: &Partition, retry_count: u32) -> Result<()>;

    fn mark_partition_failed(
        &mut self,
        _partition: &Partition,
        _retry_count: u32,
        _error: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// In-process ledger; nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    completed: BTreeSet<String>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.completed.iter().map(String::as_str)
    }
}

impl RunLedger for MemoryLedger {
    fn is_partition_complete(&self, partition_id: &str) -> bool {
        self.completed.contains(partition_id)
    }

    fn mark_partition_complete(&mut self, partition: &Partition, _retry_count: u32) -> Result<()> {
        self.completed.insert(partition.partition_id.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartitionState {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    pub table: String,
    pub stage: u32,
    pub chunk_index: u32,
    pub status: PartitionState,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Identity of the run a ledger belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerHeader {
    pub project_name: String,
    pub project_seed: u64,
    pub project_fingerprint: String,
    pub mode: ExecutionMode,
    pub worker_count: u32,
    pub selected_tables: Vec<String>,
}

/// On-disk ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerDocument {
    pub project_name: String,
    pub project_seed: u64,
    pub project_fingerprint: String,
    pub mode: ExecutionMode,
    pub worker_count: u32,
    pub selected_tables: Vec<String>,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
    #[serde(default)]
    pub partitions: BTreeMap<String, LedgerEntry>,
}

impl LedgerDocument {
    fn from_header(header: &LedgerHeader) -> Self {
        Self {
            project_name: header.project_name.clone(),
            project_seed: header.project_seed,
            project_fingerprint: header.project_fingerprint.clone(),
            mode: header.mode,
            worker_count: header.worker_count,
            selected_tables: header.selected_tables.clone(),
            updated_at: Utc::now().to_rfc3339(),
            partitions: BTreeMap::new(),
        }
    }

    pub fn completed_count(&self) -> usize {
        self.partitions
            .values()
            .filter(|entry| entry.status == PartitionState::Completed)
            .count()
    }
}

/// Ledger persisted as JSON and rewritten atomically after every update.
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    document: LedgerDocument,
}

impl JsonFileLedger {
    /// Open an existing ledger for the same project, or start a new one.
    pub fn open_or_create(path: impl AsRef<Path>, header: LedgerHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let mut ledger = Self::load(&path)?;
            ledger.check_header(&header)?;
            ledger.document.mode = header.mode;
            ledger.document.worker_count = header.worker_count;
            info!(
                path = %path.display(),
                completed = ledger.document.completed_count(),
                "run ledger resumed"
            );
            return Ok(ledger);
        }

        let ledger = Self {
            path,
            document: LedgerDocument::from_header(&header),
        };
        ledger.persist()?;
        info!(path = %ledger.path.display(), "run ledger created");
        Ok(ledger)
    }

    /// Load and schema-check a ledger file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).map_err(|source| PlanError::Io {
            path: path.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw)?;
        validate_ledger_json(&value)?;
        let document: LedgerDocument = serde_json::from_value(value)?;
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &LedgerDocument {
        &self.document
    }

    fn check_header(&self, header: &LedgerHeader) -> Result<()> {
        let doc = &self.document;
        if doc.project_fingerprint != header.project_fingerprint {
            return Err(PlanError::Mismatch {
                issue: format!(
                    "ledger '{}' was written for a different project definition",
                    self.path.display()
                ),
                hint: "delete the ledger or use the original project".to_string(),
            });
        }
        if doc.project_seed != header.project_seed {
            return Err(PlanError::Mismatch {
                issue: format!(
                    "ledger seed {} does not match project seed {}",
                    doc.project_seed, header.project_seed
                ),
                hint: "delete the ledger or use the original project".to_string(),
            });
        }
        if doc.selected_tables != header.selected_tables {
            return Err(PlanError::Mismatch {
                issue: "ledger table selection differs from the requested selection".to_string(),
                hint: "rerun with the original --tables selection or delete the ledger".to_string(),
            });
        }
        Ok(())
    }

    fn record(&mut self, partition: &Partition, entry: LedgerEntry) -> Result<()> {
        self.document
            .partitions
            .insert(partition.partition_id.clone(), entry);
        self.document.updated_at = Utc::now().to_rfc3339();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.document)?;
        write_bytes_atomic(&self.path, &data).map_err(|source| PlanError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl RunLedger for JsonFileLedger {
    fn is_partition_complete(&self, partition_id: &str) -> bool {
        self.document
            .partitions
            .get(partition_id)
            .is_some_and(|entry| entry.status == PartitionState::Completed)
    }

    fn mark_partition_complete(&mut self, partition: &Partition, retry_count: u32) -> Result<()> {
        debug!(partition_id = %partition.partition_id, retry_count, "partition recorded");
        self.record(
            partition,
            LedgerEntry {
                table: partition.table.clone(),
                stage: partition.stage,
                chunk_index: partition.chunk_index,
                status: PartitionState::Completed,
                retry_count,
                error_message: None,
            },
        )
    }

    fn mark_partition_failed(
        &mut self,
        partition: &Partition,
        retry_count: u32,
        error: &str,
    ) -> Result<()> {
        self.record(
            partition,
            LedgerEntry {
                table: partition.table.clone(),
                stage: partition.stage,
                chunk_index: partition.chunk_index,
                status: PartitionState::Failed,
                retry_count,
                error_message: Some(error.to_string()),
            },
        )
    }
}

fn validate_ledger_json(value: &Value) -> Result<()> {
    let schema = serde_json::to_value(ledger_json_schema())?;
    let compiled = JSONSchema::compile(&schema).map_err(|err| PlanError::Schema(err.to_string()))?;
    if let Err(errors) = compiled.validate(value) {
        let messages: Vec<String> = errors
            .map(|error| format!("{} at '{}'", error, error.instance_path))
            .collect();
        return Err(PlanError::Schema(messages.join("; ")));
    }
    Ok(())
}

fn write_bytes_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger.json".to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)
}
