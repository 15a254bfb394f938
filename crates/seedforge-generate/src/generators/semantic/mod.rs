//! Bounded numerics with domain defaults (coordinates, money, percentages).

use rand::RngCore;

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::errors::GenerationError;
use crate::generators::primitives::{configure_float_range, sample_float_range};
use crate::generators::{
    GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry,
};
use crate::params::ParamIssue;

pub(crate) fn register(registry: &mut GeneratorRegistry) {
    for generator in SEMANTIC_NUMERICS {
        registry.register_builtin(Box::new(*generator));
    }
}

/// A uniform draw whose default range and precision come from the domain.
#[derive(Clone, Copy)]
struct BoundedNumeric {
    id: &'static str,
    min: f64,
    max: f64,
    decimals: u32,
}

const SEMANTIC_NUMERICS: &[BoundedNumeric] = &[
    BoundedNumeric {
        id: "latitude",
        min: -90.0,
        max: 90.0,
        decimals: 6,
    },
    BoundedNumeric {
        id: "longitude",
        min: -180.0,
        max: 180.0,
        decimals: 6,
    },
    BoundedNumeric {
        id: "money",
        min: 0.0,
        max: 10_000.0,
        decimals: 2,
    },
    BoundedNumeric {
        id: "percent",
        min: 0.0,
        max: 100.0,
        decimals: 2,
    },
];

impl Generator for BoundedNumeric {
    fn id(&self) -> &'static str {
        self.id
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype.is_decimal()
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        configure_float_range(column, self.min, self.max, self.decimals)
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::FloatRange(config) = config else {
            return Err(ctx.mismatch(self.id));
        };
        Ok(sample_float_range(ctx.dtype, config, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::FloatRangeConfig;

    fn table_with(column: ColumnSpec) -> TableSpec {
        TableSpec {
            name: "places".to_string(),
            row_count: Some(1),
            business_key_unique_count: None,
            columns: vec![column],
            business_key: Vec::new(),
            business_key_static_columns: Vec::new(),
            business_key_changing_columns: Vec::new(),
            scd_mode: Default::default(),
            scd_tracked_columns: Vec::new(),
            scd_active_from_column: None,
            scd_active_to_column: None,
        }
    }

    #[test]
    fn latitude_defaults_to_valid_coordinates() {
        let column = ColumnSpec::new("lat", DataType::Decimal);
        let table = table_with(column.clone());
        let config = SEMANTIC_NUMERICS[0]
            .configure(&column, &table)
            .expect("configure");
        let GeneratorConfig::FloatRange(FloatRangeConfig { min, max, decimals }) = config else {
            panic!("unexpected config {config:?}");
        };
        assert_eq!((min, max, decimals), (-90.0, 90.0, 6));
    }

    #[test]
    fn money_respects_param_bounds() {
        let mut column = ColumnSpec::new("price", DataType::Decimal);
        column.params.insert("min".to_string(), serde_json::json!(5));
        column.params.insert("max".to_string(), serde_json::json!(1));
        let table = table_with(column.clone());
        let issue = SEMANTIC_NUMERICS[2]
            .configure(&column, &table)
            .expect_err("inverted bounds");
        assert!(issue.issue.contains("cannot exceed"));
        assert!(!SEMANTIC_NUMERICS[2].supports(DataType::Text));
    }
}
