use std::path::PathBuf;

use rand::{Rng, RngCore};

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::assets::PoolKey;
use crate::errors::GenerationError;
use crate::generators::{
    GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry,
    require_dependency, sibling,
};
use crate::params::{ParamIssue, ParamKind, ParamSpec, validate_params};

const SAMPLE_CSV_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("path", ParamKind::String, true),
    ParamSpec::new("column_index", ParamKind::Int, false),
    ParamSpec::new("match_column", ParamKind::String, false),
    ParamSpec::new("match_column_index", ParamKind::Int, false),
];

pub(crate) fn register(registry: &mut GeneratorRegistry) {
    registry.register_builtin(Box::new(SampleCsvGenerator));
}

/// Restricts candidates to CSV rows whose `match_column_index` cell equals the row's `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleMatch {
    pub column: String,
    pub match_column_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCsvConfig {
    /// As written in params; resolved against the asset root when loaded.
    pub path: PathBuf,
    pub column_index: usize,
    pub matching: Option<SampleMatch>,
}

impl SampleCsvConfig {
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            path: self.path.clone(),
            column_index: self.column_index,
            match_column_index: self
                .matching
                .as_ref()
                .map(|matching| matching.match_column_index),
        }
    }
}

fn parse_index(value: Option<i64>, key: &str) -> Result<usize, ParamIssue> {
    match value {
        None => Ok(0),
        Some(value) => usize::try_from(value).map_err(|_| {
            ParamIssue::new(
                format!("params.{key} cannot be negative"),
                format!("set params.{key} to 0 or greater"),
            )
        }),
    }
}

struct SampleCsvGenerator;

impl Generator for SampleCsvGenerator {
    fn id(&self) -> &'static str {
        "sample_csv"
    }

    fn supports(&self, dtype: DataType) -> bool {
        !matches!(dtype, DataType::Bool | DataType::Bytes)
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, SAMPLE_CSV_PARAMS)?;
        let path = params.get_str("path").unwrap_or_default().trim();
        if path.is_empty() {
            return Err(ParamIssue::new(
                "requires params.path",
                "set params.path to a CSV file",
            ));
        }
        let column_index = parse_index(params.get_i64("column_index"), "column_index")?;

        let matching = match (
            params.get_str("match_column"),
            params.get_i64("match_column_index"),
        ) {
            (None, None) => None,
            (Some(match_column), Some(index)) => {
                sibling(table, "match_column", match_column)?;
                require_dependency(column, "match_column", match_column)?;
                Some(SampleMatch {
                    column: match_column.to_string(),
                    match_column_index: parse_index(Some(index), "match_column_index")?,
                })
            }
            _ => {
                return Err(ParamIssue::new(
                    "requires params.match_column and params.match_column_index together",
                    "set both match params or remove both",
                ));
            }
        };

        Ok(GeneratorConfig::SampleCsv(SampleCsvConfig {
            path: PathBuf::from(path),
            column_index,
            matching,
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::SampleCsv(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let pool = ctx.samples.pool(&config.pool_key(), ctx)?;

        let candidates = match &config.matching {
            None => pool.values(),
            Some(matching) => {
                let needle = match ctx.row.get(&matching.column) {
                    None | Some(GeneratedValue::Null) => return Ok(GeneratedValue::Null),
                    Some(value) => value.render(),
                };
                pool.matching(needle.trim()).ok_or_else(|| {
                    ctx.error(
                        self.id(),
                        format!(
                            "found no rows in '{}' where column {} equals '{needle}'",
                            config.path.display(),
                            matching.match_column_index
                        ),
                        format!(
                            "add rows for '{needle}' to the CSV or restrict '{}' to values present in it",
                            matching.column
                        ),
                    )
                })?
            }
        };

        let raw = &candidates[rng.random_range(0..candidates.len())];
        GeneratedValue::parse_text(raw, ctx.dtype).ok_or_else(|| {
            ctx.error(
                self.id(),
                format!("read '{raw}' from '{}', which is not a valid {}", config.path.display(), ctx.dtype),
                format!("point params.column_index at a column of {} values", ctx.dtype),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(columns: Vec<ColumnSpec>) -> TableSpec {
        TableSpec {
            name: "people".to_string(),
            row_count: Some(4),
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

    fn city(params: serde_json::Value) -> ColumnSpec {
        let mut column = ColumnSpec::new("city", DataType::Text);
        column.params = params.as_object().cloned().expect("object");
        column
    }

    #[test]
    fn negative_column_index_is_rejected() {
        let column = city(json!({"path": "cities.csv", "column_index": -1}));
        let issue = SampleCsvGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect_err("negative index");
        assert_eq!(issue.issue, "params.column_index cannot be negative");
    }

    #[test]
    fn match_params_come_in_pairs() {
        let column = city(json!({"path": "cities.csv", "match_column": "country"}));
        let issue = SampleCsvGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect_err("half a match");
        assert!(issue.issue.contains("together"));
    }

    #[test]
    fn match_column_must_be_a_dependency() {
        let country = ColumnSpec::new("country", DataType::Text);
        let column = city(json!({
            "path": "cities.csv",
            "column_index": 1,
            "match_column": "country",
            "match_column_index": 0
        }));
        let issue = SampleCsvGenerator
            .configure(&column, &table(vec![country, column.clone()]))
            .expect_err("dependency");
        assert_eq!(issue.issue, "requires params.match_column 'country' in depends_on");
    }
}
