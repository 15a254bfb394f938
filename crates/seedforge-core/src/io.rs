use std::fs;
use std::path::Path;

use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::schema::{
    ColumnConstraints, ColumnSpec, DataType, Project, Relationship, ScdMode, TableSpec,
};
use crate::DEFAULT_SEED;

const SEMANTIC_NUMERIC_DTYPES: &[&str] = &["latitude", "longitude", "money", "percent"];

/// Emit the JSON Schema for canonical project documents.
pub fn project_json_schema() -> RootSchema {
    schema_for!(Project)
}

/// Load a project document from disk, accepting legacy fields.
pub fn load_project(path: &Path) -> Result<Project> {
    let contents = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    project_from_json(&contents)
}

/// Save a project in canonical form. `load_project(save_project(p)) == p`.
pub fn save_project(path: &Path, project: &Project) -> Result<()> {
    let encoded = project_to_json(project)?;
    fs::write(path, encoded).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn project_to_json(project: &Project) -> Result<String> {
    Ok(serde_json::to_string_pretty(project)?)
}

/// Parse a project document.
///
/// Legacy documents are accepted: `table_name`, `foreign_keys`, the `float` dtype and the
/// flat column fields `min_value`, `max_value`, `choices` and `pattern`.
pub fn project_from_json(contents: &str) -> Result<Project> {
    let document: ProjectDocument = serde_json::from_str(contents)?;
    document.into_project()
}

/// Stable SHA-256 fingerprint of the canonical project encoding.
pub fn project_fingerprint(project: &Project) -> Result<String> {
    let encoded = serde_json::to_vec(project)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    name: String,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    tables: Vec<TableDocument>,
    #[serde(default, alias = "foreign_keys")]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct TableDocument {
    #[serde(alias = "table_name")]
    name: String,
    #[serde(default)]
    row_count: Option<u64>,
    #[serde(default)]
    business_key_unique_count: Option<u64>,
    #[serde(default)]
    columns: Vec<ColumnDocument>,
    #[serde(default)]
    business_key: Option<Vec<String>>,
    #[serde(default)]
    business_key_static_columns: Option<Vec<String>>,
    #[serde(default)]
    business_key_changing_columns: Option<Vec<String>>,
    #[serde(default)]
    scd_mode: Option<String>,
    #[serde(default)]
    scd_tracked_columns: Option<Vec<String>>,
    #[serde(default)]
    scd_active_from_column: Option<String>,
    #[serde(default)]
    scd_active_to_column: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnDocument {
    name: String,
    dtype: String,
    #[serde(default)]
    generator: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    depends_on: Option<Vec<String>>,
    #[serde(default = "default_nullable")]
    nullable: bool,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    constraints: ColumnConstraints,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    choices: Option<Vec<Value>>,
    #[serde(default)]
    pattern: Option<String>,
}

impl ProjectDocument {
    fn into_project(self) -> Result<Project> {
        let tables = self
            .tables
            .into_iter()
            .map(TableDocument::into_table)
            .collect::<Result<Vec<_>>>()?;

        Ok(Project {
            name: self.name,
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            tables,
            relationships: self.relationships,
        })
    }
}

impl TableDocument {
    fn into_table(self) -> Result<TableSpec> {
        let table = self.name;
        let scd_mode = parse_scd_mode(&table, self.scd_mode.as_deref())?;

        if let Some(business_key) = &self.business_key
            && business_key.is_empty()
        {
            return Err(Error::InvalidDocument(Diagnostic::table(
                &table,
                "business_key cannot be empty",
                "provide one or more existing column names or omit business_key",
            )));
        }

        let columns = self
            .columns
            .into_iter()
            .map(|column| column.into_column(&table))
            .collect::<Result<Vec<_>>>()?;

        Ok(TableSpec {
            name: table,
            row_count: self.row_count,
            business_key_unique_count: self.business_key_unique_count,
            columns,
            business_key: self.business_key.unwrap_or_default(),
            business_key_static_columns: self.business_key_static_columns.unwrap_or_default(),
            business_key_changing_columns: self.business_key_changing_columns.unwrap_or_default(),
            scd_mode,
            scd_tracked_columns: self.scd_tracked_columns.unwrap_or_default(),
            scd_active_from_column: non_empty(self.scd_active_from_column),
            scd_active_to_column: non_empty(self.scd_active_to_column),
        })
    }
}

impl ColumnDocument {
    fn into_column(self, table: &str) -> Result<ColumnSpec> {
        let dtype = parse_dtype(table, &self.name, &self.dtype)?;
        let params = match self.params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(Error::InvalidDocument(Diagnostic::column(
                    table,
                    &self.name,
                    "generator params must be a JSON object",
                    "set params to an object (for example {\"path\": \"...\"}) or null",
                )));
            }
        };

        let mut constraints = self.constraints;
        constraints.min = constraints.min.or(self.min_value);
        constraints.max = constraints.max.or(self.max_value);
        constraints.choices = constraints.choices.or(self.choices);
        constraints.pattern = constraints.pattern.or(non_empty(self.pattern));

        Ok(ColumnSpec {
            name: self.name,
            dtype,
            generator: non_empty(self.generator),
            params,
            depends_on: self.depends_on.unwrap_or_default(),
            nullable: self.nullable,
            primary_key: self.primary_key,
            constraints,
        })
    }
}

fn parse_dtype(table: &str, column: &str, raw: &str) -> Result<DataType> {
    if let Some(dtype) = DataType::parse(raw) {
        return Ok(dtype);
    }

    let allowed = DataType::ALL
        .iter()
        .map(|dtype| dtype.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let normalized = raw.trim().to_ascii_lowercase();
    let hint = if SEMANTIC_NUMERIC_DTYPES.contains(&normalized.as_str()) {
        format!(
            "use dtype='decimal' (or legacy 'float') with generator='{normalized}'; allowed dtypes: {allowed}"
        )
    } else {
        format!("use one of: {allowed}")
    };

    Err(Error::InvalidDocument(Diagnostic::column(
        table,
        column,
        format!("unsupported dtype '{raw}'"),
        hint,
    )))
}

fn parse_scd_mode(table: &str, raw: Option<&str>) -> Result<ScdMode> {
    let normalized = raw.map(|value| value.trim().to_ascii_lowercase());
    match normalized.as_deref() {
        None | Some("") | Some("none") => Ok(ScdMode::None),
        Some("scd1") => Ok(ScdMode::Scd1),
        Some("scd2") => Ok(ScdMode::Scd2),
        Some(_) => Err(Error::InvalidDocument(Diagnostic::table(
            table,
            format!("unsupported scd_mode '{}'", raw.unwrap_or_default()),
            "use scd_mode='scd1' or scd_mode='scd2', or omit scd_mode",
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn default_nullable() -> bool {
    true
}
