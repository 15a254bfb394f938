use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use seedforge_generate::{GenerateOptions, RuntimeOptions};
use seedforge_plan::DEFAULT_CHUNK_SIZE_ROWS;

/// Settings file picked up from the working directory.
pub const SETTINGS_FILE: &str = "seedforge.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings '{}': {source}. Fix: check that the file exists and is readable.", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Settings '{}': {source}. Fix: correct the TOML or remove unknown keys.", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `seedforge.toml`. Every table is optional; command-line flags override it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub generate: GenerateOptions,
    pub plan: PlanSettings,
    pub runtime: RuntimeOptions,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub chunk_size_rows: u64,
    /// Tables to generate; parents are added automatically.
    pub tables: Vec<String>,
    /// Row counts replacing the project's, keyed by table.
    pub row_overrides: BTreeMap<String, u64>,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            chunk_size_rows: DEFAULT_CHUNK_SIZE_ROWS,
            tables: Vec::new(),
            row_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Extra JSON log file, appended to.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// Load `explicit`, or `./seedforge.toml` when present, or defaults.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, SettingsError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let local = PathBuf::from(SETTINGS_FILE);
            if !local.exists() {
                return Ok(Settings::default());
            }
            local
        }
    };
    let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| SettingsError::Toml { path, source })
}
