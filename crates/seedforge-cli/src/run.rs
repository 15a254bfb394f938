use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seedforge_generate::{GenerateOptions, GenerationReport, RunStatus, RuntimeOptions};

pub const REPORT_FILE: &str = "generation_report.json";
pub const MANIFEST_FILE: &str = "run.json";
pub const LEDGER_FILE: &str = "run_ledger.json";

/// Run metadata written next to the generated CSV files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub project: String,
    pub project_path: PathBuf,
    pub project_fingerprint: String,
    pub seed: u64,
    pub chunk_size_rows: u64,
    pub tables: Vec<String>,
    pub resumed: bool,
    pub status: RunStatus,
    pub generate: GenerateOptions,
    pub runtime: RuntimeOptions,
}

/// Paths of the artifacts inside an output directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub out_dir: PathBuf,
}

impl RunPaths {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    pub fn report_path(&self) -> PathBuf {
        self.out_dir.join(REPORT_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.out_dir.join(LEDGER_FILE)
    }
}

pub fn read_manifest(path: &Path) -> io::Result<Option<RunManifest>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map(Some).map_err(io::Error::other)
}

pub fn write_run_artifacts(
    paths: &RunPaths,
    manifest: &RunManifest,
    report: &GenerationReport,
) -> io::Result<()> {
    write_json_atomic(&paths.report_path(), report)?;
    write_json_atomic(&paths.manifest_path(), manifest)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    write_bytes_atomic(path, &data)
}

fn write_bytes_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid path for atomic write"))?;
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)
}
