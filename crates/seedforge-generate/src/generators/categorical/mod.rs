use std::collections::BTreeMap;

use rand::{Rng, RngCore};
use serde_json::Value;

use seedforge_core::{ColumnSpec, DataType, TableSpec};

use crate::errors::GenerationError;
use crate::generators::{
    GeneratedValue, Generator, GeneratorConfig, GeneratorContext, GeneratorRegistry,
    keyed_stream, literal_list, require_dependency, sibling,
};
use crate::params::{ParamIssue, ParamKind, ParamSpec, validate_params};

const CHOICE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("choices", ParamKind::Array, false),
    ParamSpec::new("weights", ParamKind::Array, false),
];
const HIERARCHY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("parent_column", ParamKind::String, true),
    ParamSpec::new("hierarchy", ParamKind::Object, true),
    ParamSpec::new("default_children", ParamKind::Array, false),
];
const ORDERED_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("orders", ParamKind::Object, true),
    ParamSpec::new("order_weights", ParamKind::Object, false),
    ParamSpec::new("move_weights", ParamKind::Array, false),
    ParamSpec::new("start_index", ParamKind::Int, false),
];

pub(crate) fn register(registry: &mut GeneratorRegistry) {
    registry.register_builtin(Box::new(ChoiceGenerator));
    registry.register_builtin(Box::new(HierarchyGenerator));
    registry.register_builtin(Box::new(OrderedChoiceGenerator));
}

/// Cumulative weights; `None` means uniform.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    cumulative: Option<Vec<f64>>,
    len: usize,
}

impl Weights {
    pub fn uniform(len: usize) -> Self {
        Self {
            cumulative: None,
            len,
        }
    }

    /// Lengths are checked by the caller; at least one weight must be positive.
    fn weighted(weights: &[f64], key: &str) -> Result<Self, ParamIssue> {
        if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(ParamIssue::new(
                format!("params.{key} must be non-negative numbers"),
                format!("remove negative values from params.{key}"),
            ));
        }
        if !weights.iter().any(|weight| *weight > 0.0) {
            return Err(ParamIssue::new(
                format!("params.{key} must contain at least one value > 0"),
                format!("set at least one positive weight in params.{key}"),
            ));
        }
        let mut total = 0.0;
        let cumulative = weights
            .iter()
            .map(|weight| {
                total += weight;
                total
            })
            .collect();
        Ok(Self {
            cumulative: Some(cumulative),
            len: weights.len(),
        })
    }

    pub fn pick(&self, rng: &mut dyn RngCore) -> usize {
        match &self.cumulative {
            None => rng.random_range(0..self.len),
            Some(cumulative) => {
                let total = cumulative.last().copied().unwrap_or(0.0);
                let draw = rng.random_range(0.0..total);
                cumulative
                    .iter()
                    .position(|bound| draw < *bound)
                    .unwrap_or(self.len - 1)
            }
        }
    }
}

fn parse_weights(values: &[Value], key: &str) -> Result<Vec<f64>, ParamIssue> {
    values
        .iter()
        .map(|value| {
            value.as_f64().ok_or_else(|| {
                ParamIssue::new(
                    format!("params.{key} must contain only numbers"),
                    format!("use numeric values in params.{key}"),
                )
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceConfig {
    pub values: Vec<GeneratedValue>,
    pub weights: Weights,
}

struct ChoiceGenerator;

impl Generator for ChoiceGenerator {
    fn id(&self) -> &'static str {
        "choice_weighted"
    }

    fn supports(&self, dtype: DataType) -> bool {
        dtype != DataType::Bytes
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        _table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, CHOICE_PARAMS)?;
        let choices = match params.get_array("choices") {
            Some(choices) => choices.as_slice(),
            None => column.constraints.choices.as_deref().ok_or_else(|| {
                ParamIssue::new(
                    "requires params.choices",
                    "set params.choices or constraints.choices to a non-empty list",
                )
            })?,
        };
        if choices.is_empty() {
            return Err(ParamIssue::new(
                "requires a non-empty choices list",
                "add at least one value to choices",
            ));
        }
        let values = literal_list(choices, column.dtype, "choices")?;

        let raw_weights = match params.get_array("weights") {
            Some(weights) => Some(parse_weights(weights, "weights")?),
            None => column.constraints.weights.clone(),
        };
        let weights = match raw_weights {
            None => Weights::uniform(values.len()),
            Some(weights) if weights.len() != values.len() => {
                return Err(ParamIssue::new(
                    format!(
                        "weights length ({}) must match choices length ({})",
                        weights.len(),
                        values.len()
                    ),
                    "provide one weight per choice",
                ));
            }
            Some(weights) => Weights::weighted(&weights, "weights")?,
        };
        Ok(GeneratorConfig::Choice(ChoiceConfig { values, weights }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Choice(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let idx = config.weights.pick(rng);
        Ok(config.values[idx].clone())
    }
}

/// Child lists keyed by the rendered parent value.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyConfig {
    pub parent_column: String,
    pub children: BTreeMap<String, Vec<GeneratedValue>>,
    pub default_children: Option<Vec<GeneratedValue>>,
}

struct HierarchyGenerator;

impl Generator for HierarchyGenerator {
    fn id(&self) -> &'static str {
        "hierarchical_category"
    }

    fn supports(&self, dtype: DataType) -> bool {
        matches!(dtype, DataType::Text | DataType::Int)
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, HIERARCHY_PARAMS)?;
        let parent_column = params.get_str("parent_column").unwrap_or_default();
        sibling(table, "parent_column", parent_column)?;
        require_dependency(column, "parent_column", parent_column)?;

        let mut children = BTreeMap::new();
        for (parent, list) in params.get_object("hierarchy").into_iter().flatten() {
            let list = list.as_array().filter(|list| !list.is_empty()).ok_or_else(|| {
                ParamIssue::new(
                    format!("params.hierarchy['{parent}'] must be a non-empty list"),
                    "map every parent value to a non-empty list of children",
                )
            })?;
            children.insert(
                parent.clone(),
                literal_list(list, column.dtype, "hierarchy")?,
            );
        }
        if children.is_empty() {
            return Err(ParamIssue::new(
                "params.hierarchy must map at least one parent value",
                "add a parent value with its children to params.hierarchy",
            ));
        }
        let default_children = match params.get_array("default_children") {
            None => None,
            Some(list) if list.is_empty() => {
                return Err(ParamIssue::new(
                    "params.default_children cannot be empty",
                    "remove params.default_children or list at least one child",
                ));
            }
            Some(list) => Some(literal_list(list, column.dtype, "default_children")?),
        };
        Ok(GeneratorConfig::Hierarchy(HierarchyConfig {
            parent_column: parent_column.to_string(),
            children,
            default_children,
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::Hierarchy(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let parent = match ctx.row.get(&config.parent_column) {
            None | Some(GeneratedValue::Null) => return Ok(GeneratedValue::Null),
            Some(value) => value.render(),
        };
        let children = config
            .children
            .get(&parent)
            .or(config.default_children.as_ref())
            .ok_or_else(|| {
                ctx.error(
                    self.id(),
                    format!("has no children for parent value '{parent}'"),
                    format!("add '{parent}' to params.hierarchy or set params.default_children"),
                )
            })?;
        Ok(children[rng.random_range(0..children.len())].clone())
    }
}

/// Named ordered sequences and the weighted cursor walk over them.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedChoiceConfig {
    pub sequences: Vec<(String, Vec<GeneratedValue>)>,
    pub order_weights: Weights,
    /// Share of `move_weights` on step size 0.
    pub stay_probability: f64,
    /// Step sizes 1.. of `move_weights`; `None` when the cursor never moves.
    pub advance: Option<Weights>,
    pub start_index: usize,
    /// Tables without a business key walk one cursor across successive rows.
    pub per_row: bool,
}

impl OrderedChoiceConfig {
    /// Cursor after `steps` moves, clamped at the sequence end.
    ///
    /// Only moves that advance the cursor are drawn, each after a geometric wait, so the
    /// cost is bounded by the sequence length rather than by `steps`.
    fn position(&self, column_seed: u64, owner: u64, steps: u64, last: usize) -> usize {
        let mut position = self.start_index.min(last);
        let Some(advance) = &self.advance else {
            return position;
        };
        let mut elapsed = 0_u64;
        let mut event = 0_u64;
        while position < last {
            event += 1;
            let mut rng = keyed_stream(column_seed, "move", owner, event);
            elapsed = elapsed.saturating_add(self.wait(&mut rng));
            if elapsed > steps {
                break;
            }
            position = (position + 1 + advance.pick(&mut rng)).min(last);
        }
        position
    }

    /// Moves until the cursor next advances, at least 1.
    fn wait(&self, rng: &mut dyn RngCore) -> u64 {
        if self.stay_probability <= 0.0 {
            return 1;
        }
        let uniform = 1.0 - rng.random::<f64>();
        1 + (uniform.ln() / self.stay_probability.ln()).floor() as u64
    }
}

struct OrderedChoiceGenerator;

impl Generator for OrderedChoiceGenerator {
    fn id(&self) -> &'static str {
        "ordered_choice"
    }

    fn supports(&self, dtype: DataType) -> bool {
        matches!(dtype, DataType::Text | DataType::Int)
    }

    fn configure(
        &self,
        column: &ColumnSpec,
        table: &TableSpec,
    ) -> Result<GeneratorConfig, ParamIssue> {
        let params = validate_params(&column.params, ORDERED_PARAMS)?;
        let mut sequences = Vec::new();
        for (name, list) in params.get_object("orders").into_iter().flatten() {
            let list = list.as_array().filter(|list| !list.is_empty()).ok_or_else(|| {
                ParamIssue::new(
                    format!("params.orders['{name}'] must be a non-empty list"),
                    "give every order a non-empty list of values",
                )
            })?;
            sequences.push((name.clone(), literal_list(list, column.dtype, "orders")?));
        }
        if sequences.is_empty() {
            return Err(ParamIssue::new(
                "params.orders must define at least one order",
                "add a named list of values to params.orders",
            ));
        }

        let order_weights = match params.get_object("order_weights") {
            None => Weights::uniform(sequences.len()),
            Some(weights) => {
                let same_keys = weights.len() == sequences.len()
                    && sequences.iter().all(|(name, _)| weights.contains_key(name));
                if !same_keys {
                    return Err(ParamIssue::new(
                        "params.order_weights keys must exactly match params.orders keys",
                        "give params.order_weights one entry per order name",
                    ));
                }
                let ordered: Vec<Value> = sequences
                    .iter()
                    .map(|(name, _)| weights[name].clone())
                    .collect();
                Weights::weighted(&parse_weights(&ordered, "order_weights")?, "order_weights")?
            }
        };

        let raw_moves = match params.get_array("move_weights") {
            Some(moves) if moves.is_empty() => {
                return Err(ParamIssue::new(
                    "params.move_weights cannot be empty",
                    "set params.move_weights such as [0.0, 1.0]",
                ));
            }
            Some(moves) => parse_weights(moves, "move_weights")?,
            None => vec![0.0, 1.0],
        };
        Weights::weighted(&raw_moves, "move_weights")?;
        let total: f64 = raw_moves.iter().sum();
        let stay_probability = raw_moves[0] / total;
        let advance = if raw_moves.iter().skip(1).any(|weight| *weight > 0.0) {
            Some(Weights::weighted(&raw_moves[1..], "move_weights")?)
        } else {
            None
        };

        let start_index = match params.get_i64("start_index") {
            None => 0,
            Some(value) => {
                let shortest = sequences.iter().map(|(_, list)| list.len()).min().unwrap_or(0);
                usize::try_from(value)
                    .ok()
                    .filter(|idx| *idx < shortest)
                    .ok_or_else(|| {
                        ParamIssue::new(
                            format!("params.start_index {value} is outside the shortest order"),
                            format!("set params.start_index between 0 and {}", shortest.saturating_sub(1)),
                        )
                    })?
            }
        };

        Ok(GeneratorConfig::OrderedChoice(OrderedChoiceConfig {
            sequences,
            order_weights,
            stay_probability,
            advance,
            start_index,
            per_row: !table.has_business_key(),
        }))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        config: &GeneratorConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, GenerationError> {
        let GeneratorConfig::OrderedChoice(config) = config else {
            return Err(ctx.mismatch(self.id()));
        };
        let (owner, steps, mut order_rng) = if config.per_row {
            (
                0,
                ctx.row_number.saturating_sub(1),
                keyed_stream(ctx.column_seed, "order", 0, 0),
            )
        } else {
            (
                ctx.entity_index,
                u64::from(ctx.version_index),
                ctx.entity_stream("order", 0),
            )
        };
        let (_, sequence) = &config.sequences[config.order_weights.pick(&mut order_rng)];
        let last = sequence.len() - 1;
        let position = config.position(ctx.column_seed, owner, steps, last);
        Ok(sequence[position].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn table(columns: Vec<ColumnSpec>) -> TableSpec {
        TableSpec {
            name: "events".to_string(),
            row_count: Some(6),
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

    fn with_params(name: &str, dtype: DataType, params: Value) -> ColumnSpec {
        let mut column = ColumnSpec::new(name, dtype);
        column.params = params.as_object().cloned().expect("object");
        column
    }

    #[test]
    fn weights_must_match_choices() {
        let column = with_params(
            "tier",
            DataType::Text,
            json!({"choices": ["a", "b"], "weights": [1.0]}),
        );
        let issue = ChoiceGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect_err("length mismatch");
        assert_eq!(issue.issue, "weights length (1) must match choices length (2)");

        let column = with_params(
            "tier",
            DataType::Text,
            json!({"choices": ["a", "b"], "weights": [0, 0]}),
        );
        let issue = ChoiceGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect_err("all zero");
        assert!(issue.issue.contains("at least one value > 0"));
    }

    #[test]
    fn zero_weight_choice_is_never_drawn() {
        let weights = Weights::weighted(&[0.0, 1.0, 0.0], "weights").expect("weights");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..200 {
            assert_eq!(weights.pick(&mut rng), 1);
        }
    }

    #[test]
    fn hierarchy_requires_parent_in_depends_on() {
        let parent = ColumnSpec::new("department", DataType::Text);
        let column = with_params(
            "subcategory",
            DataType::Text,
            json!({"parent_column": "department", "hierarchy": {"Home": ["Kitchen"]}}),
        );
        let spec = table(vec![parent, column.clone()]);
        let issue = HierarchyGenerator
            .configure(&column, &spec)
            .expect_err("missing dependency");
        assert_eq!(issue.issue, "requires params.parent_column 'department' in depends_on");
    }

    #[test]
    fn order_weight_keys_must_match() {
        let column = with_params(
            "stage",
            DataType::Text,
            json!({
                "orders": {"A": ["c1", "c2"], "B": ["c3", "c4"]},
                "order_weights": {"A": 1.0},
                "move_weights": [0.0, 1.0]
            }),
        );
        let issue = OrderedChoiceGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect_err("key mismatch");
        assert_eq!(
            issue.issue,
            "params.order_weights keys must exactly match params.orders keys"
        );
    }

    #[test]
    fn cursor_walks_forward_and_clamps() {
        let column = with_params(
            "stage",
            DataType::Text,
            json!({
                "orders": {"A": ["c1", "c2", "c3"], "B": ["c4", "c5", "c6"]},
                "order_weights": {"A": 1.0, "B": 0.0},
                "move_weights": [0.0, 1.0],
                "start_index": 0
            }),
        );
        let GeneratorConfig::OrderedChoice(config) = OrderedChoiceGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect("configure")
        else {
            panic!("unexpected config");
        };
        assert!(config.per_row);
        let positions: Vec<usize> = (0..6).map(|steps| config.position(9, 0, steps, 2)).collect();
        assert_eq!(positions, vec![0, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn distant_rows_resolve_without_replaying_every_step() {
        let column = with_params(
            "stage",
            DataType::Text,
            json!({
                "orders": {"A": ["s0", "s1", "s2", "s3", "s4"]},
                "move_weights": [0.999, 0.0005, 0.0005]
            }),
        );
        let GeneratorConfig::OrderedChoice(config) = OrderedChoiceGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect("configure")
        else {
            panic!("unexpected config");
        };
        let checkpoints = [0, 10, 1_000, 100_000, 10_000_000, u64::MAX];
        let positions: Vec<usize> = checkpoints
            .iter()
            .map(|steps| config.position(3, 0, *steps, 4))
            .collect();
        assert_eq!(positions[0], 0);
        assert!(positions.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(positions[5], 4);
        assert_eq!(config.position(3, 0, 100_000, 4), positions[3]);
    }

    #[test]
    fn stay_only_moves_keep_start() {
        let column = with_params(
            "status",
            DataType::Int,
            json!({
                "orders": {"A": [1, 2, 3], "B": [4, 5, 6]},
                "order_weights": {"A": 0.0, "B": 1.0},
                "move_weights": [1.0, 0.0]
            }),
        );
        let GeneratorConfig::OrderedChoice(config) = OrderedChoiceGenerator
            .configure(&column, &table(vec![column.clone()]))
            .expect("configure")
        else {
            panic!("unexpected config");
        };
        assert!(config.advance.is_none());
        assert_eq!(config.position(1, 0, 50, 2), 0);
        assert_eq!(config.sequences[1].1[0], GeneratedValue::Int(4));
    }
}
