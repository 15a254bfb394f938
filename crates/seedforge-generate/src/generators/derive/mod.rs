//! Generators computed from sibling values of the same row.

use chrono::TimeDelta;
use rand::{Rng, RngCore};

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::errors::GenerationError;
use crate::generators::distributions::gauss;
use crate::generators::{
    GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry,
    clamp_optional, literal, require_dependency, round_to, sibling,
};
use crate::params::{ParamIssue, ParamKind, ParamMap, ParamSpec, validate_params};

const IF_THEN_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("if_column", ParamKind::String, true),
    ParamSpec::new("operator", ParamKind::String, false),
    ParamSpec::new("value", ParamKind::Any, true),
    ParamSpec::new("then_value", ParamKind::Any, true),
    ParamSpec::new("else_value", ParamKind::Any, true),
];
const TIME_OFFSET_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("base_column", ParamKind::String, true),
    ParamSpec::new("direction", ParamKind::String, false),
    ParamSpec::new("min_days", ParamKind::Int, false),
    ParamSpec::new("max_days", ParamKind::Int, false),
    ParamSpec::new("min_seconds", ParamKind::Int, false),
    ParamSpec::new("max_seconds", ParamKind::Int, false),
];
const SALARY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("age_col", ParamKind::String, false),
    ParamSpec::new("min", ParamKind::Float, false),
    ParamSpec::new("max", ParamKind::Float, false),
];

const DEFAULT_AGE: f64 = 30.0;
const SALARY_BASE: f64 = 35_000.0;
const SALARY_PER_YEAR: f64 = 2_500.0;
const SALARY_PLATEAU: f64 = 140_000.0;
const SALARY_NOISE: f64 = 8_000.0;
const SALARY_FLOOR: f64 = 20_000.0;
const SALARY_CEILING: f64 = 250_000.0;

pub(crate) fn register(registry: &mut GeneratorRegistry) {
    registry.register_builtin(Box::new(IfThenGenerator));
    registry.register_builtin(Box::new(TimeOffsetGenerator));
    registry.register_builtin(Box::new(SalaryGenerator));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfThenConfig {
    pub if_column: String,
    pub comparison: Comparison,
    /// Compared against the source column, typed like it.
    pub value: GeneratedValue,
    pub then_value: GeneratedValue,
    pub else_value: GeneratedValue,
}

fn values_equal(left: &GeneratedValue, right: &GeneratedValue) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}

struct IfThenGenerator;

impl Generator for IfThenGenerator {
    fn id(&self) -> &'static str {
        "if_then"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype != DataType::Bytes
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, IF_THEN_PARAMS)?;
        let if_column = params.get_str("if_column").unwrap_or_default();
        let source = sibling(table, "if_column", if_column)?;
        require_dependency(column, "if_column", if_column)?;

        let comparison = match params.get_str("operator").unwrap_or("==") {
            "==" => Comparison::Equal,
            "!=" => Comparison::NotEqual,
            other => {
                return Err(ParamIssue::new(
                    format!("params.operator '{other}' is not supported"),
                    "use operator '==' or '!='",
                ));
            }
        };
        let value = params
            .get("value")
            .map(|raw| literal(raw, source.dtype, "value"))
            .transpose()?
            .unwrap_or(GeneratedValue::Null);
        let then_value = params
            .get("then_value")
            .map(|raw| literal(raw, column.dtype, "then_value"))
            .transpose()?
            .unwrap_or(GeneratedValue::Null);
        let else_value = params
            .get("else_value")
            .map(|raw| literal(raw, column.dtype, "else_value"))
            .transpose()?
            .unwrap_or(GeneratedValue::Null);
        Ok(GeneratorConfig::IfThen(IfThenConfig {
            if_column: if_column.to_string(),
            comparison,
            value,
            then_value,
            else_value,
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::IfThen(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let source = ctx.row.get(&config.if_column).unwrap_or(&GeneratedValue::Null);
        let equal = values_equal(source, &config.value);
        let matched = match config.comparison {
            Comparison::Equal => equal,
            Comparison::NotEqual => !equal,
        };
        Ok(if matched {
            config.then_value.clone()
        } else {
            config.else_value.clone()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetDirection {
    After,
    Before,
}

/// Offset bounds are in days for dates and seconds for timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOffsetConfig {
    pub base_column: String,
    pub direction: OffsetDirection,
    pub min: i64,
    pub max: i64,
}

/// Largest accepted offset, about ten thousand years.
const MAX_OFFSET_DAYS: i64 = 3_652_425;

fn offset_bounds(
    params: &ParamMap<'_>,
    unit: &str,
    default_max: i64,
    limit: i64,
) -> Result<(i64, i64), ParamIssue> {
    let min_key = format!("min_{unit}");
    let max_key = format!("max_{unit}");
    let min = params.get_i64(&min_key).unwrap_or(0);
    let max = params.get_i64(&max_key).unwrap_or(default_max.max(min));
    if min < 0 || max < min {
        return Err(ParamIssue::new(
            format!("params.{min_key} ({min}) and params.{max_key} ({max}) must satisfy 0 <= min <= max"),
            format!("set 0 <= params.{min_key} <= params.{max_key}"),
        ));
    }
    if max > limit {
        return Err(ParamIssue::new(
            format!("params.{max_key} ({max}) exceeds the supported span of {limit} {unit}"),
            format!("set params.{max_key} to at most {limit}"),
        ));
    }
    Ok((min, max))
}

struct TimeOffsetGenerator;

impl Generator for TimeOffsetGenerator {
    fn id(&self) -> &'static str {
        "time_offset"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype.is_temporal()
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, TIME_OFFSET_PARAMS)?;
        let base_column = params.get_str("base_column").unwrap_or_default();
        let base = sibling(table, "base_column", base_column)?;
        require_dependency(column, "base_column", base_column)?;
        if base.dtype != column.dtype {
            return Err(ParamIssue::new(
                format!(
                    "requires params.base_column '{base_column}' to be {}, found {}",
                    column.dtype, base.dtype
                ),
                format!("point params.base_column at a {} column", column.dtype),
            ));
        }

        let direction = match params.get_str("direction").unwrap_or("after") {
            "after" => OffsetDirection::After,
            "before" => OffsetDirection::Before,
            other => {
                return Err(ParamIssue::new(
                    format!("params.direction '{other}' is not supported"),
                    "use direction 'after' or 'before'",
                ));
            }
        };

        let (unit, other_unit, default_max, limit) = if column.dtype == DataType::Date {
            ("days", "seconds", 30, MAX_OFFSET_DAYS)
        } else {
            ("seconds", "days", 86_400, MAX_OFFSET_DAYS * 86_400)
        };
        if params.get(&format!("min_{other_unit}")).is_some()
            || params.get(&format!("max_{other_unit}")).is_some()
        {
            return Err(ParamIssue::new(
                format!("does not accept {other_unit} offsets for {} columns", column.dtype),
                format!("use params.min_{unit}/params.max_{unit}"),
            ));
        }
        let (min, max) = offset_bounds(&params, unit, default_max, limit)?;
        Ok(GeneratorConfig::TimeOffset(TimeOffsetConfig {
            base_column: base_column.to_string(),
            direction,
            min,
            max,
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::TimeOffset(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let magnitude = rng.random_range(config.min..=config.max);
        let offset = match config.direction {
            OffsetDirection::After => magnitude,
            OffsetDirection::Before => -magnitude,
        };
        let shifted = match ctx.row.get(&config.base_column) {
            None | Some(GeneratedValue::Null) => Some(GeneratedValue::Null),
            Some(GeneratedValue::Date(date)) => TimeDelta::try_days(offset)
                .and_then(|delta| date.checked_add_signed(delta))
                .map(GeneratedValue::Date),
            Some(GeneratedValue::Timestamp(ts)) => TimeDelta::try_seconds(offset)
                .and_then(|delta| ts.checked_add_signed(delta))
                .map(GeneratedValue::Timestamp),
            Some(other) => {
                return Err(ctx.error(
                    self.id(),
                    format!("cannot offset base value '{other}'"),
                    "generate the base column as a date or datetime",
                ));
            }
        };
        shifted.ok_or_else(|| {
            ctx.error(
                self.id(),
                format!(
                    "offset of {offset} from base column '{}' leaves the supported date range",
                    config.base_column
                ),
                "lower params.min/max offsets or the base column's range",
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalaryConfig {
    pub age_column: String,
    pub min: f64,
    pub max: f64,
}

struct SalaryGenerator;

impl Generator for SalaryGenerator {
    fn id(&self) -> &'static str {
        "salary_from_age"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype.is_numeric()
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, SALARY_PARAMS)?;
        let age_column = params.get_str("age_col").unwrap_or("age");
        let age = sibling(table, "age_col", age_column)?;
        if !age.dtype.is_numeric() {
            return Err(ParamIssue::new(
                format!("requires params.age_col '{age_column}' to be numeric"),
                "point params.age_col at an int or decimal column",
            ));
        }
        require_dependency(column, "age_col", age_column)?;
        let (min, max) = params.bounds()?;
        Ok(GeneratorConfig::Salary(SalaryConfig {
            age_column: age_column.to_string(),
            min: min.unwrap_or(SALARY_FLOOR),
            max: max.unwrap_or(SALARY_CEILING),
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Salary(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let age = ctx
            .row
            .get(&config.age_column)
            .and_then(GeneratedValue::as_f64)
            .unwrap_or(DEFAULT_AGE);
        // Early career growth up to a plateau.
        let base = (SALARY_BASE + (age - 18.0) * SALARY_PER_YEAR).min(SALARY_PLATEAU);
        let value = gauss(rng, base, SALARY_NOISE).max(SALARY_FLOOR);
        let value = clamp_optional(value, Some(config.min), Some(config.max));
        Ok(GeneratedValue::from_number(ctx.dtype, round_to(value, 2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn table(columns: Vec<ColumnSpec>) -> TableSpec {
        TableSpec {
            name: "customers".to_string(),
            row_count: Some(8),
            business_key_unique_count: None,
            columns,
            business_key: Vec::new(),
            business_key_static_columns: Vec::new(),
            business_key_changing_columns: Vec::new(),
            scd_mode: Default::default(),
            scd_tracked_columns: Vec::new(),
            scd_active_from_column: None,
            scd_active_to_column: None,
        }
    }

    fn derived(name: &str, dtype: DataType, params: Value, depends_on: &[&str]) -> ColumnSpec {
        let mut column = ColumnSpec::new(name, dtype);
        column.params = params.as_object().cloned().expect("object");
        column.depends_on = depends_on.iter().map(|dep| dep.to_string()).collect();
        column
    }

    #[test]
    fn if_then_literal_follows_source_dtype() {
        let source = ColumnSpec::new("is_vip", DataType::Bool);
        let column = derived(
            "tier",
            DataType::Text,
            json!({"if_column": "is_vip", "operator": "==", "value": 1, "then_value": "VIP", "else_value": "STANDARD"}),
            &["is_vip"],
        );
        let config = IfThenGenerator
            .configure(&column, &table(vec![source, column.clone()]))
            .expect("configure");
        let GeneratorConfig::IfThen(config) = config else {
            panic!("unexpected config");
        };
        assert_eq!(config.value, GeneratedValue::Bool(true));
        assert_eq!(config.then_value, GeneratedValue::Text("VIP".to_string()));
    }

    #[test]
    fn if_then_rejects_unsupported_operator() {
        let source = ColumnSpec::new("is_vip", DataType::Bool);
        let column = derived(
            "tier",
            DataType::Text,
            json!({"if_column": "is_vip", "operator": ">", "value": 1, "then_value": "VIP", "else_value": "STANDARD"}),
            &["is_vip"],
        );
        let issue = IfThenGenerator
            .configure(&column, &table(vec![source, column.clone()]))
            .expect_err("operator");
        assert_eq!(issue.issue, "params.operator '>' is not supported");
    }

    #[test]
    fn numeric_comparison_ignores_representation() {
        assert!(values_equal(&GeneratedValue::Int(2), &GeneratedValue::Decimal(2.0)));
        assert!(!values_equal(
            &GeneratedValue::Text("2".to_string()),
            &GeneratedValue::Int(2)
        ));
    }

    #[test]
    fn time_offset_requires_matching_base_dtype() {
        let base = ColumnSpec::new("ordered_on", DataType::Datetime);
        let column = derived(
            "shipped_on",
            DataType::Date,
            json!({"base_column": "ordered_on", "min_days": 1, "max_days": 2}),
            &["ordered_on"],
        );
        let issue = TimeOffsetGenerator
            .configure(&column, &table(vec![base, column.clone()]))
            .expect_err("dtype mismatch");
        assert_eq!(
            issue.issue,
            "requires params.base_column 'ordered_on' to be date, found datetime"
        );
    }

    #[test]
    fn time_offset_rejects_foreign_units() {
        let base = ColumnSpec::new("ordered_on", DataType::Date);
        let column = derived(
            "shipped_on",
            DataType::Date,
            json!({"base_column": "ordered_on", "max_seconds": 60}),
            &["ordered_on"],
        );
        assert!(
            TimeOffsetGenerator
                .configure(&column, &table(vec![base, column.clone()]))
                .is_err()
        );
    }

    #[test]
    fn time_offset_span_is_bounded() {
        let base = ColumnSpec::new("ordered_on", DataType::Date);
        let column = derived(
            "shipped_on",
            DataType::Date,
            json!({"base_column": "ordered_on", "min_days": 200_000_000, "max_days": 200_000_000}),
            &["ordered_on"],
        );
        let issue = TimeOffsetGenerator
            .configure(&column, &table(vec![base, column.clone()]))
            .expect_err("span too large");
        assert_eq!(
            issue.issue,
            "params.max_days (200000000) exceeds the supported span of 3652425 days"
        );
    }

    #[test]
    fn time_offset_out_of_range_is_a_param_error() {
        use crate::assets::CsvCache;
        use crate::generators::PartialRow;
        use chrono::NaiveDate;
        use rand::SeedableRng;

        let config = GeneratorConfig::TimeOffset(TimeOffsetConfig {
            base_column: "ordered_on".to_string(),
            direction: OffsetDirection::After,
            min: 1,
            max: 1,
        });
        let columns = vec!["ordered_on".to_string(), "shipped_on".to_string()];
        let values = vec![Some(GeneratedValue::Date(NaiveDate::MAX)), None];
        let samples = CsvCache::new(None);
        let ctx = GeneratorContext {
            table: "orders",
            column: "shipped_on",
            dtype: DataType::Date,
            row_number: 1,
            entity_index: 0,
            version_index: 0,
            attempt: 0,
            row: PartialRow::new(&columns, &values),
            samples: &samples,
            column_seed: 1,
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let err = TimeOffsetGenerator
            .generate(&ctx, &config, &mut rng)
            .expect_err("past the last date");
        assert!(matches!(err, GenerationError::GeneratorParam { .. }));
        assert!(err.to_string().starts_with(
            "Table 'orders', column 'shipped_on': generator 'time_offset' offset of 1 from base column 'ordered_on'"
        ));
    }

    #[test]
    fn salary_needs_age_dependency() {
        let age = ColumnSpec::new("age", DataType::Int);
        let column = derived("salary", DataType::Int, json!({}), &[]);
        let issue = SalaryGenerator
            .configure(&column, &table(vec![age, column.clone()]))
            .expect_err("dependency");
        assert_eq!(issue.issue, "requires params.age_col 'age' in depends_on");
    }
}
