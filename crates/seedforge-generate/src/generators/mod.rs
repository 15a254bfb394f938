use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, NaiveDateTime};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::assets::CsvCache;
use crate::engine::{hash_row_seed, hash_seed};
use crate::errors::GenerationError;
use crate::params::{ParamIssue, parse_date_value, parse_timestamp_value};

pub mod categorical;
pub mod derive;
pub mod distributions;
pub mod primitives;
pub mod sample;
pub mod semantic;

pub use categorical::{ChoiceConfig, HierarchyConfig, OrderedChoiceConfig};
pub use derive::{Comparison, IfThenConfig, OffsetDirection, SalaryConfig, TimeOffsetConfig};
pub use distributions::{LogNormalConfig, NormalConfig};
pub use primitives::{
    BytesConfig, DateRangeConfig, FloatRangeConfig, IntRangeConfig, PatternConfig, TextConfig,
    TimestampRangeConfig,
};
pub use sample::SampleCsvConfig;

/// Generated value for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl GeneratedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GeneratedValue::Null)
    }

    /// CSV text: bools as `1`/`0`, UTC timestamps with a `Z` suffix, bytes as base64.
    pub fn render(&self) -> String {
        match self {
            GeneratedValue::Null => String::new(),
            GeneratedValue::Bool(value) => (if *value { "1" } else { "0" }).to_string(),
            GeneratedValue::Int(value) => value.to_string(),
            GeneratedValue::Decimal(value) => format_decimal(*value),
            GeneratedValue::Text(value) => value.clone(),
            GeneratedValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            GeneratedValue::Timestamp(value) => value.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            GeneratedValue::Bytes(value) => STANDARD.encode(value),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeneratedValue::Int(value) => Some(*value as f64),
            GeneratedValue::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneratedValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            GeneratedValue::Date(value) => Some(*value),
            GeneratedValue::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            GeneratedValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Convert a JSON literal from params into a value of `dtype`.
    pub fn from_json(value: &Value, dtype: DataType) -> Option<Self> {
        if value.is_null() {
            return Some(GeneratedValue::Null);
        }
        match dtype {
            DataType::Int => value
                .as_i64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|number| number.fract() == 0.0)
                        .map(|number| number as i64)
                })
                .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
                .map(GeneratedValue::Int),
            DataType::Decimal | DataType::Float => value
                .as_f64()
                .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
                .map(GeneratedValue::Decimal),
            DataType::Text => match value {
                Value::String(raw) => Some(GeneratedValue::Text(raw.clone())),
                Value::Number(number) => Some(GeneratedValue::Text(number.to_string())),
                Value::Bool(flag) => Some(GeneratedValue::Text(flag.to_string())),
                _ => None,
            },
            DataType::Bool => match value {
                Value::Bool(flag) => Some(GeneratedValue::Bool(*flag)),
                Value::Number(number) => match number.as_i64() {
                    Some(0) => Some(GeneratedValue::Bool(false)),
                    Some(1) => Some(GeneratedValue::Bool(true)),
                    _ => None,
                },
                Value::String(raw) => parse_bool(raw).map(GeneratedValue::Bool),
                _ => None,
            },
            DataType::Date => value
                .as_str()
                .and_then(parse_date_value)
                .map(GeneratedValue::Date),
            DataType::Datetime => value
                .as_str()
                .and_then(parse_timestamp_value)
                .map(GeneratedValue::Timestamp),
            DataType::Bytes => None,
        }
    }

    /// Parse raw text (for example a CSV cell) into a value of `dtype`.
    pub fn parse_text(raw: &str, dtype: DataType) -> Option<Self> {
        let trimmed = raw.trim();
        match dtype {
            DataType::Int => trimmed.parse().ok().map(GeneratedValue::Int),
            DataType::Decimal | DataType::Float => {
                trimmed.parse().ok().map(GeneratedValue::Decimal)
            }
            DataType::Text => Some(GeneratedValue::Text(raw.to_string())),
            DataType::Bool => parse_bool(trimmed).map(GeneratedValue::Bool),
            DataType::Date => parse_date_value(trimmed).map(GeneratedValue::Date),
            DataType::Datetime => parse_timestamp_value(trimmed).map(GeneratedValue::Timestamp),
            DataType::Bytes => Some(GeneratedValue::Bytes(raw.as_bytes().to_vec())),
        }
    }

    /// Numeric sample shaped for the column: integers are rounded.
    pub fn from_number(dtype: DataType, value: f64) -> Self {
        if dtype == DataType::Int {
            GeneratedValue::Int(value.round() as i64)
        } else {
            GeneratedValue::Decimal(value)
        }
    }
}

impl fmt::Display for GeneratedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratedValue::Null => f.write_str("null"),
            other => f.write_str(&other.render()),
        }
    }
}

fn format_decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub(crate) fn clamp_optional(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let value = min.map_or(value, |min| value.max(min));
    max.map_or(value, |max| value.min(max))
}

/// Values generated so far for the row being built.
#[derive(Clone, Copy)]
pub struct PartialRow<'a> {
    columns: &'a [String],
    values: &'a [Option<GeneratedValue>],
}

impl<'a> PartialRow<'a> {
    pub fn new(columns: &'a [String], values: &'a [Option<GeneratedValue>]) -> Self {
        Self { columns, values }
    }

    /// The value of `column`, if it has been generated already.
    pub fn get(&self, column: &str) -> Option<&'a GeneratedValue> {
        let idx = self.columns.iter().position(|name| name == column)?;
        self.values.get(idx).and_then(Option::as_ref)
    }
}

/// Read-only inputs for one generator call.
pub struct GeneratorContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub dtype: DataType,
    pub row_number: u64,
    pub entity_index: u64,
    /// SCD version within the entity; 0 outside SCD2 history.
    pub version_index: u32,
    pub attempt: u32,
    pub row: PartialRow<'a>,
    pub samples: &'a CsvCache,
    /// Seed of this column's random streams.
    pub column_seed: u64,
}

impl GeneratorContext<'_> {
    /// A stream that depends only on the column, the entity, `salt` and `step`.
    pub fn entity_stream(&self, salt: &str, step: u64) -> ChaCha8Rng {
        keyed_stream(self.column_seed, salt, self.entity_index, step)
    }

    pub fn error(
        &self,
        generator: &str,
        issue: impl Into<String>,
        hint: impl Into<String>,
    ) -> GenerationError {
        GenerationError::param(self.table, self.column, generator, issue, hint)
    }

    pub(crate) fn mismatch(&self, generator: &str) -> GenerationError {
        self.error(
            generator,
            "received a configuration built for another generator",
            "configure the column through the registry that generates it",
        )
    }
}

pub(crate) fn keyed_stream(column_seed: u64, salt: &str, owner: u64, step: u64) -> ChaCha8Rng {
    let owner_seed = hash_row_seed(hash_seed(column_seed, salt), owner, 0);
    ChaCha8Rng::seed_from_u64(hash_row_seed(owner_seed, step, 0))
}

/// Typed generator configuration, resolved once from `params`.
#[derive(Debug, Clone)]
pub enum GeneratorConfig {
    IntRange(IntRangeConfig),
    FloatRange(FloatRangeConfig),
    Normal(NormalConfig),
    LogNormal(LogNormalConfig),
    Salary(SalaryConfig),
    DateRange(DateRangeConfig),
    TimestampRange(TimestampRangeConfig),
    Bool,
    Text(TextConfig),
    Pattern(PatternConfig),
    Bytes(BytesConfig),
    Choice(ChoiceConfig),
    Hierarchy(HierarchyConfig),
    OrderedChoice(OrderedChoiceConfig),
    IfThen(IfThenConfig),
    TimeOffset(TimeOffsetConfig),
    SampleCsv(SampleCsvConfig),
}

/// A named value algorithm.
///
/// `configure` runs once at validation; `generate` must be a pure function of the
/// context, the config and the random stream.
pub trait Generator: Send + Sync {
    fn id(&self) -> &'static str;

    fn supports(&self, dtype: DataType) -> bool;

    fn configure(&self, column: &ColumnSpec, table: &TableSpec)
    -> Result<GeneratorConfig, ParamIssue>;

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError>;
}

/// Registration of a name that is already taken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Generator registry: generator '{id}' is already registered. Fix: register each generator name once."
)]
pub struct DuplicateGeneratorError {
    pub id: String,
}

/// Name to generator mapping, built once and passed by reference.
pub struct GeneratorRegistry {
    generators: BTreeMap<&'static str, Box<dyn Generator>>,
}

impl GeneratorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in generator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        primitives::register(&mut registry);
        semantic::register(&mut registry);
        distributions::register(&mut registry);
        categorical::register(&mut registry);
        derive::register(&mut registry);
        sample::register(&mut registry);
        registry
    }

    pub fn register(&mut self, generator: Box<dyn Generator>) -> Result<(), DuplicateGeneratorError> {
        let id = generator.id();
        if self.generators.contains_key(id) {
            return Err(DuplicateGeneratorError { id: id.to_string() });
        }
        self.generators.insert(id, generator);
        Ok(())
    }

    /// Built-in families have distinct ids; a unit test guards that.
    pub(crate) fn register_builtin(&mut self, generator: Box<dyn Generator>) {
        self.generators.insert(generator.id(), generator);
    }

    pub fn get(&self, id: &str) -> Option<&dyn Generator> {
        self.generators.get(id).map(|generator| generator.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.generators.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.generators.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("generators", &self.generators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Generator used for a column without an explicit `generator`.
pub fn default_generator_id(column: &ColumnSpec) -> &'static str {
    if column.constraints.choices.is_some() && column.dtype != DataType::Bytes {
        return "choice_weighted";
    }
    match column.dtype {
        DataType::Int => "uniform_int",
        DataType::Decimal | DataType::Float => "uniform_float",
        DataType::Text if column.constraints.pattern.is_some() => "regex",
        DataType::Text => "text",
        DataType::Bool => "bool",
        DataType::Date => "date",
        DataType::Datetime => "timestamp_utc",
        DataType::Bytes => "bytes",
    }
}

/// Generator id for `column`: the explicit one, or the dtype default.
pub fn generator_id_for(column: &ColumnSpec) -> &str {
    column
        .generator
        .as_deref()
        .unwrap_or_else(|| default_generator_id(column))
}

/// Check that `name` is listed in the column's `depends_on`.
pub(crate) fn require_dependency(
    column: &ColumnSpec,
    key: &str,
    name: &str,
) -> Result<(), ParamIssue> {
    if column.depends_on.iter().any(|dep| dep == name) {
        Ok(())
    } else {
        Err(ParamIssue::new(
            format!("requires params.{key} '{name}' in depends_on"),
            format!("add '{name}' to depends_on"),
        ))
    }
}

/// Look up a sibling column referenced by a param.
pub(crate) fn sibling<'t>(
    table: &'t TableSpec,
    key: &str,
    name: &str,
) -> Result<&'t ColumnSpec, ParamIssue> {
    table.column(name).ok_or_else(|| {
        ParamIssue::new(
            format!("params.{key} references unknown column '{name}'"),
            format!("set params.{key} to an existing column of table '{}'", table.name),
        )
    })
}

/// Convert a list of JSON literals into values of `dtype`.
pub(crate) fn literal_list(
    values: &[Value],
    dtype: DataType,
    key: &str,
) -> Result<Vec<GeneratedValue>, ParamIssue> {
    values
        .iter()
        .map(|value| literal(value, dtype, key))
        .collect()
}

pub(crate) fn literal(value: &Value, dtype: DataType, key: &str) -> Result<GeneratedValue, ParamIssue> {
    GeneratedValue::from_json(value, dtype).ok_or_else(|| {
        ParamIssue::new(
            format!("params.{key} value {value} is not a valid {dtype}"),
            format!("use {dtype} literals in params.{key}"),
        )
    })
}
