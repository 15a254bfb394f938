use std::f64::consts::TAU;

use rand::{Rng, RngCore};

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::errors::GenerationError;
use crate::generators::{
    GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry,
    clamp_optional, round_to,
};
use crate::params::{ParamIssue, ParamKind, ParamSpec, validate_params};

const DEFAULT_DECIMALS: u32 = 2;

const NORMAL_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("mean", ParamKind::Float, false),
    ParamSpec::new("stdev", ParamKind::Float, false),
    ParamSpec::new("stddev", ParamKind::Float, false),
    ParamSpec::new("decimals", ParamKind::Int, false),
    ParamSpec::new("min", ParamKind::Float, false),
    ParamSpec::new("max", ParamKind::Float, false),
];

const LOGNORMAL_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("median", ParamKind::Float, false),
    ParamSpec::new("mu", ParamKind::Float, false),
    ParamSpec::new("sigma", ParamKind::Float, false),
    ParamSpec::new("decimals", ParamKind::Int, false),
    ParamSpec::new("min", ParamKind::Float, false),
    ParamSpec::new("max", ParamKind::Float, false),
];

pub(crate) fn register(registry: &mut GeneratorRegistry) {
    registry.register_builtin(Box::new(NormalGenerator));
    registry.register_builtin(Box::new(LogNormalGenerator));
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalConfig {
    pub mean: f64,
    pub stdev: f64,
    pub decimals: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Log-normal over `exp(N(mu, sigma))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogNormalConfig {
    pub mu: f64,
    pub sigma: f64,
    pub decimals: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Box-Muller sample from N(mean, sd).
pub(crate) fn gauss(rng: &mut dyn RngCore, mean: f64, sd: f64) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos();
    mean + sd * z
}

struct NormalGenerator;

impl Generator for NormalGenerator {
    fn id(&self) -> &'static str {
        "normal"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype.is_numeric()
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, NORMAL_PARAMS)?;
        let mean = params.get_f64("mean").unwrap_or(0.0);
        let stdev = params
            .get_f64("stdev")
            .or_else(|| params.get_f64("stddev"))
            .unwrap_or(1.0);
        if stdev <= 0.0 || !stdev.is_finite() {
            return Err(ParamIssue::new(
                format!("params.stdev must be > 0, got {stdev}"),
                "set params.stdev to a positive number",
            ));
        }
        let (min, max) = params.bounds()?;
        let decimals = params.decimals(DEFAULT_DECIMALS)?;
        Ok(GeneratorConfig::Normal(NormalConfig {
            mean,
            stdev,
            decimals,
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
        let GeneratorConfig::Normal(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let value = gauss(rng, config.mean, config.stdev);
        let value = clamp_optional(value, config.min, config.max);
        Ok(GeneratedValue::from_number(
            ctx.dtype,
            round_to(value, config.decimals),
        ))
    }
}

struct LogNormalGenerator;

impl Generator for LogNormalGenerator {
    fn id(&self) -> &'static str {
        "lognormal"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype.is_numeric()
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, LOGNORMAL_PARAMS)?;
        let mu = match (params.get_f64("median"), params.get_f64("mu")) {
            (Some(_), Some(_)) => {
                return Err(ParamIssue::new(
                    "accepts params.median or params.mu, not both",
                    "remove one of params.median and params.mu",
                ));
            }
            (Some(median), None) if median > 0.0 => median.ln(),
            (Some(median), None) => {
                return Err(ParamIssue::new(
                    format!("params.median must be > 0, got {median}"),
                    "set params.median to a positive number",
                ));
            }
            (None, Some(mu)) => mu,
            (None, None) => 0.0,
        };
        let sigma = params.get_f64("sigma").unwrap_or(1.0);
        if sigma <= 0.0 || !sigma.is_finite() {
            return Err(ParamIssue::new(
                format!("params.sigma must be > 0, got {sigma}"),
                "set params.sigma to a positive number",
            ));
        }
        let (min, max) = params.bounds()?;
        let decimals = params.decimals(DEFAULT_DECIMALS)?;
        Ok(GeneratorConfig::LogNormal(LogNormalConfig {
            mu,
            sigma,
            decimals,
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
        let GeneratorConfig::LogNormal(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let value = gauss(rng, config.mu, config.sigma).exp();
        let value = clamp_optional(value, config.min, config.max);
        Ok(GeneratedValue::from_number(
            ctx.dtype,
            round_to(value, config.decimals),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn column(params: serde_json::Value) -> ColumnSpec {
        let mut column = ColumnSpec::new("score", DataType::Decimal);
        column.params = params.as_object().cloned().expect("object");
        column
    }

    fn table(column: &ColumnSpec) -> TableSpec {
        TableSpec {
            name: "scores".to_string(),
            row_count: Some(1),
            business_key_unique_count: None,
            columns: vec![column.clone()],
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
    fn non_positive_spread_is_rejected_at_configure() {
        let spec = column(json!({"mean": 10, "stddev": 0}));
        let issue = NormalGenerator
            .configure(&spec, &table(&spec))
            .expect_err("zero stdev");
        assert_eq!(issue.issue, "params.stdev must be > 0, got 0");

        let spec = column(json!({"median": 100, "sigma": -1}));
        assert!(LogNormalGenerator.configure(&spec, &table(&spec)).is_err());
    }

    #[test]
    fn gauss_centers_on_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let samples: Vec<f64> = (0..4000).map(|_| gauss(&mut rng, 50.0, 5.0)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - 50.0).abs() < 0.5, "mean drifted to {mean}");
    }

    #[test]
    fn lognormal_median_maps_to_mu() {
        let spec = column(json!({"median": 1.0, "sigma": 0.5, "min": 0.5, "max": 2}));
        let config = LogNormalGenerator
            .configure(&spec, &table(&spec))
            .expect("configure");
        let GeneratorConfig::LogNormal(config) = config else {
            panic!("unexpected config");
        };
        assert_eq!(config.mu, 0.0);
        assert_eq!((config.min, config.max), (Some(0.5), Some(2.0)));
    }
}
