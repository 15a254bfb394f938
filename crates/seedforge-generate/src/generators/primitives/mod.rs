use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::{Rng, RngCore};
use rand_regex::Regex as RandRegex;

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::errors::GenerationError;
use crate::generators::{
    GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry, round_to,
};
use crate::params::{ParamIssue, ParamKind, ParamSpec, validate_params};

const DEFAULT_INT_MIN: i64 = 0;
const DEFAULT_INT_MAX: i64 = 1000;
const DEFAULT_FLOAT_MIN: f64 = 0.0;
const DEFAULT_FLOAT_MAX: f64 = 1000.0;
const DEFAULT_FLOAT_DECIMALS: u32 = 2;
const DEFAULT_TEXT_MIN: u32 = 5;
const DEFAULT_TEXT_MAX: u32 = 14;
const DEFAULT_BYTES_MIN: u32 = 8;
const DEFAULT_BYTES_MAX: u32 = 16;
const DEFAULT_MAX_REPEAT: u32 = 16;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

const INT_RANGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min", ParamKind::Int, false),
    ParamSpec::new("max", ParamKind::Int, false),
];
const FLOAT_RANGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min", ParamKind::Float, false),
    ParamSpec::new("max", ParamKind::Float, false),
    ParamSpec::new("decimals", ParamKind::Int, false),
];
const DATE_RANGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("start", ParamKind::Date, false),
    ParamSpec::new("end", ParamKind::Date, false),
];
const TIMESTAMP_RANGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("start", ParamKind::Timestamp, false),
    ParamSpec::new("end", ParamKind::Timestamp, false),
];
const PATTERN_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("pattern", ParamKind::String, false),
    ParamSpec::new("max_repeat", ParamKind::Int, false),
];

pub(crate) fn register(registry: &mut GeneratorRegistry) {
    registry.register_builtin(Box::new(IntRangeGenerator));
    registry.register_builtin(Box::new(FloatRangeGenerator));
    registry.register_builtin(Box::new(DateRangeGenerator));
    registry.register_builtin(Box::new(TimestampRangeGenerator));
    registry.register_builtin(Box::new(BoolGenerator));
    registry.register_builtin(Box::new(TextGenerator));
    registry.register_builtin(Box::new(PatternGenerator));
    registry.register_builtin(Box::new(BytesGenerator));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRangeConfig {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatRangeConfig {
    pub min: f64,
    pub max: f64,
    pub decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangeConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRangeConfig {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextConfig {
    pub min_len: u32,
    pub max_len: u32,
}

#[derive(Debug, Clone)]
pub struct PatternConfig {
    pub pattern: String,
    pub regex: RandRegex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesConfig {
    pub min_len: u32,
    pub max_len: u32,
}

pub(crate) fn default_date_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

pub(crate) fn default_date_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 12, 31).unwrap_or_default()
}

fn default_timestamp_start() -> NaiveDateTime {
    default_date_start().and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn default_timestamp_end() -> NaiveDateTime {
    default_date_end().and_hms_opt(23, 59, 59).unwrap_or_default()
}

struct IntRangeGenerator;

impl Generator for IntRangeGenerator {
    fn id(&self) -> &'static str {
        "uniform_int"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Int
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, INT_RANGE_PARAMS)?;
        let min = params
            .get_i64("min")
            .or_else(|| column.constraints.min.map(|value| value.ceil() as i64))
            .unwrap_or(DEFAULT_INT_MIN);
        let max = params
            .get_i64("max")
            .or_else(|| column.constraints.max.map(|value| value.floor() as i64))
            .unwrap_or(DEFAULT_INT_MAX.max(min));
        if min > max {
            return Err(ParamIssue::new(
                format!("min ({min}) cannot exceed max ({max})"),
                "set min <= max",
            ));
        }
        Ok(GeneratorConfig::IntRange(IntRangeConfig { min, max }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::IntRange(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        Ok(GeneratedValue::Int(rng.random_range(config.min..=config.max)))
    }
}

/// Bounded float range shared by `uniform_float` and the semantic numerics.
pub(crate) fn configure_float_range(
    column: &ColumnSpec,
    default_min: f64,
    default_max: f64,
    default_decimals: u32,
) -> Result<GeneratorConfig, ParamIssue> {
    let params = validate_params(&column.params, FLOAT_RANGE_PARAMS)?;
    let min = params
        .get_f64("min")
        .or(column.constraints.min)
        .unwrap_or(default_min);
    let max = params
        .get_f64("max")
        .or(column.constraints.max)
        .unwrap_or(default_max.max(min));
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(ParamIssue::new(
            format!("min ({min}) cannot exceed max ({max})"),
            "set finite bounds with min <= max",
        ));
    }
    let decimals = params.decimals(default_decimals)?;
    Ok(GeneratorConfig::FloatRange(FloatRangeConfig {
        min,
        max,
        decimals,
    }))
}

pub(crate) fn sample_float_range(
    dtype: DataType,
    config: &FloatRangeConfig,
    rng: &mut dyn RngCore,
) -> GeneratedValue {
    let value = rng.random_range(config.min..=config.max);
    GeneratedValue::from_number(dtype, round_to(value, config.decimals))
}

struct FloatRangeGenerator;

impl Generator for FloatRangeGenerator {
    fn id(&self) -> &'static str {
        "uniform_float"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype.is_decimal()
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        configure_float_range(
            column,
            DEFAULT_FLOAT_MIN,
            DEFAULT_FLOAT_MAX,
            DEFAULT_FLOAT_DECIMALS,
        )
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::FloatRange(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        Ok(sample_float_range(ctx.dtype, config, rng))
    }
}

struct DateRangeGenerator;

impl Generator for DateRangeGenerator {
    fn id(&self) -> &'static str {
        "date"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Date
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, DATE_RANGE_PARAMS)?;
        let start = params.get_date("start").unwrap_or_else(default_date_start);
        let end = params.get_date("end").unwrap_or_else(default_date_end);
        if end < start {
            return Err(ParamIssue::new(
                format!("end ({end}) is before start ({start})"),
                "set params.end on or after params.start",
            ));
        }
        Ok(GeneratorConfig::DateRange(DateRangeConfig { start, end }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::DateRange(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let span = (config.end - config.start).num_days();
        let offset = rng.random_range(0..=span);
        Ok(GeneratedValue::Date(config.start + Duration::days(offset)))
    }
}

struct TimestampRangeGenerator;

impl Generator for TimestampRangeGenerator {
    fn id(&self) -> &'static str {
        "timestamp_utc"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Datetime
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, TIMESTAMP_RANGE_PARAMS)?;
        let start = params
            .get_timestamp("start")
            .unwrap_or_else(default_timestamp_start);
        let end = params
            .get_timestamp("end")
            .unwrap_or_else(default_timestamp_end);
        if end < start {
            return Err(ParamIssue::new(
                "end is before start",
                "set params.end on or after params.start",
            ));
        }
        Ok(GeneratorConfig::TimestampRange(TimestampRangeConfig {
            start,
            end,
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::TimestampRange(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let span = (config.end - config.start).num_seconds();
        let offset = rng.random_range(0..=span);
        Ok(GeneratedValue::Timestamp(
            config.start + Duration::seconds(offset),
        ))
    }
}

struct BoolGenerator;

impl Generator for BoolGenerator {
    fn id(&self) -> &'static str {
        "bool"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Bool
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        validate_params(&column.params, &[])?;
        Ok(GeneratorConfig::Bool)
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Bool = config else {
            return Err(ctx.mismatch(self.id()));
        };
        Ok(GeneratedValue::Bool(rng.random_bool(0.5)))
    }
}

/// Length bounds from constraints, widening the defaults around a single given bound.
fn length_bounds(
    column: &ColumnSpec,
    default_min: u32,
    default_max: u32,
) -> Result<(u32, u32), ParamIssue> {
    let min_length = column.constraints.min_length;
    let max_length = column.constraints.max_length;
    let (min, max) = match (min_length, max_length) {
        (Some(min), Some(max)) => (min, max),
        (Some(min), None) => (min, default_max.max(min)),
        (None, Some(max)) => (default_min.min(max), max),
        (None, None) => (default_min, default_max),
    };
    if min > max {
        return Err(ParamIssue::new(
            format!("min_length ({min}) cannot exceed max_length ({max})"),
            "set constraints.min_length <= constraints.max_length",
        ));
    }
    Ok((min, max))
}

struct TextGenerator;

impl Generator for TextGenerator {
    fn id(&self) -> &'static str {
        "text"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Text
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        validate_params(&column.params, &[])?;
        let (min_len, max_len) = length_bounds(column, DEFAULT_TEXT_MIN, DEFAULT_TEXT_MAX)?;
        Ok(GeneratorConfig::Text(TextConfig { min_len, max_len }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Text(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let len = rng.random_range(config.min_len..=config.max_len);
        let text: String = (0..len)
            .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
            .collect();
        Ok(GeneratedValue::Text(text))
    }
}

struct PatternGenerator;

impl Generator for PatternGenerator {
    fn id(&self) -> &'static str {
        "regex"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Text
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, PATTERN_PARAMS)?;
        let pattern = params
            .get_str("pattern")
            .or(column.constraints.pattern.as_deref())
            .ok_or_else(|| {
                ParamIssue::new(
                    "requires a pattern",
                    "set params.pattern or constraints.pattern",
                )
            })?;
        regex::Regex::new(pattern).map_err(|err| {
            ParamIssue::new(
                format!("pattern '{pattern}' does not compile: {err}"),
                "use a valid regular expression",
            )
        })?;
        let max_repeat = params.get_u32("max_repeat").unwrap_or(DEFAULT_MAX_REPEAT);
        let regex = RandRegex::compile(pattern, max_repeat).map_err(|err| {
            ParamIssue::new(
                format!("pattern '{pattern}' cannot be sampled: {err}"),
                "avoid anchors and look-around in generation patterns",
            )
        })?;
        Ok(GeneratorConfig::Pattern(PatternConfig {
            pattern: pattern.to_string(),
            regex,
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Pattern(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let value: String = rng.sample(&config.regex);
        Ok(GeneratedValue::Text(value))
    }
}

struct BytesGenerator;

impl Generator for BytesGenerator {
    fn id(&self) -> &'static str {
        "bytes"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype == DataType::Bytes
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        validate_params(&column.params, &[])?;
        let (min_len, max_len) = length_bounds(column, DEFAULT_BYTES_MIN, DEFAULT_BYTES_MAX)?;
        Ok(GeneratorConfig::Bytes(BytesConfig { min_len, max_len }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Bytes(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let len = rng.random_range(config.min_len..=config.max_len) as usize;
        let mut bytes = vec![0_u8; len];
        rng.fill_bytes(&mut bytes);
        Ok(GeneratedValue::Bytes(bytes))
    }
}
