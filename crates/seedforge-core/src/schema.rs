use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::DEFAULT_SEED;

/// Top-level generation project: a seed plus the tables and foreign keys to fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub name: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub tables: Vec<TableSpec>,
    #[serde(default, alias = "foreign_keys")]
    pub relationships: Vec<Relationship>,
}

impl Project {
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|table| table.name == name)
    }

    /// Foreign keys where `table` is the child side, in schema order.
    pub fn relationships_in<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships
            .iter()
            .filter(move |rel| rel.child_table == table)
    }

    /// Foreign keys where `table` is the parent side, in schema order.
    pub fn relationships_out<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships
            .iter()
            .filter(move |rel| rel.parent_table == table)
    }
}

/// Table definition with optional business key and SCD configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSpec {
    #[serde(alias = "table_name")]
    pub name: String,
    /// Total rows; child tables may omit it and are sized from their FK allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Number of distinct business keys, independent of `row_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key_unique_count: Option<u64>,
    pub columns: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_key_static_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_key_changing_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "ScdMode::is_none")]
    pub scd_mode: ScdMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scd_tracked_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scd_active_from_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scd_active_to_column: Option<String>,
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.primary_key)
    }

    pub fn has_business_key(&self) -> bool {
        !self.business_key.is_empty()
    }

    /// Columns pinned per business entity: the key itself plus its static columns.
    pub fn is_identity_column(&self, name: &str) -> bool {
        self.business_key.iter().any(|column| column == name)
            || self
                .business_key_static_columns
                .iter()
                .any(|column| column == name)
    }

    /// Columns whose change opens a new SCD version (tracked plus changing columns).
    pub fn scd_change_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for name in self
            .scd_tracked_columns
            .iter()
            .chain(&self.business_key_changing_columns)
        {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
        columns
    }

    pub fn is_scd_period_column(&self, name: &str) -> bool {
        self.scd_active_from_column.as_deref() == Some(name)
            || self.scd_active_to_column.as_deref() == Some(name)
    }
}

/// Column definition. `generator` is a registry key; `params` is resolved by that generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "ColumnConstraints::is_empty")]
    pub constraints: ColumnConstraints,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            generator: None,
            params: Map::new(),
            depends_on: Vec::new(),
            nullable: true,
            primary_key: false,
            constraints: ColumnConstraints::default(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Value constraints; which fields apply depends on the column dtype.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Share of nulls for nullable columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_rate: Option<f64>,
}

impl ColumnConstraints {
    pub fn is_empty(&self) -> bool {
        self == &ColumnConstraints::default()
    }
}

/// Column data type. `float` is the legacy spelling of `decimal` and keeps its name on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Decimal,
    Text,
    Bool,
    Date,
    Datetime,
    Bytes,
    Float,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Int,
        DataType::Float,
        DataType::Decimal,
        DataType::Text,
        DataType::Bool,
        DataType::Date,
        DataType::Datetime,
        DataType::Bytes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Decimal => "decimal",
            DataType::Text => "text",
            DataType::Bool => "bool",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Bytes => "bytes",
            DataType::Float => "float",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        DataType::ALL
            .into_iter()
            .find(|dtype| dtype.as_str() == raw)
    }

    /// Decimal semantics, including the legacy `float` spelling.
    pub fn is_decimal(self) -> bool {
        matches!(self, DataType::Decimal | DataType::Float)
    }

    pub fn is_numeric(self) -> bool {
        self == DataType::Int || self.is_decimal()
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, DataType::Date | DataType::Datetime)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slowly-changing-dimension behavior for a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScdMode {
    #[default]
    None,
    Scd1,
    Scd2,
}

impl ScdMode {
    pub fn is_none(&self) -> bool {
        *self == ScdMode::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScdMode::None => "none",
            ScdMode::Scd1 => "scd1",
            ScdMode::Scd2 => "scd2",
        }
    }
}

/// Foreign key edge: `child_table.child_column` references `parent_table.parent_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
    #[serde(default = "default_min_children")]
    pub min_children: u64,
    #[serde(default = "default_max_children")]
    pub max_children: u64,
}

impl Relationship {
    pub fn label(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.child_table, self.child_column, self.parent_table, self.parent_column
        )
    }
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_nullable() -> bool {
    true
}

fn default_min_children() -> u64 {
    1
}

fn default_max_children() -> u64 {
    3
}
