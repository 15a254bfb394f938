use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use seedforge_core::{DataType, Project, ScdMode, TableSpec, order_tables};
use seedforge_plan::{MemoryLedger, PlanOptions, resolve_selection};

use crate::assets::CsvCache;
use crate::errors::GenerationError;
use crate::generators::{
    GeneratedValue, GeneratorContext, GeneratorRegistry, PartialRow, clamp_optional,
};
use crate::layout::{LayoutInputs, TableLayout, build_layout, render_key};
use crate::model::{GenerateOptions, GenerationReport, RuntimeOptions, TableReport};
use crate::output::RowSink;
use crate::planner::PartitionPlanner;
use crate::runtime::{CancellationToken, NoopListener, PartitionRuntime};
use crate::scd::{self, VersionState};
use crate::validate::{ColumnPlan, ColumnRole, TablePlan, ValidatedProject, analyze};

/// Row metadata next to the column values.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMeta {
    /// 1-based position in the table.
    pub row_number: u64,
    /// 0-based business entity; equals `row_number - 1` for tables without a business key.
    pub entity_index: u64,
    /// SCD2 version of the entity, or the number of in-place updates of an SCD1 row.
    pub version_index: u64,
    pub state: VersionState,
    /// `col=value` pairs of the business key.
    pub business_key: Option<String>,
    pub active_from: Option<GeneratedValue>,
    pub active_to: Option<GeneratedValue>,
}

impl RowMeta {
    pub fn is_current(&self) -> bool {
        self.state == VersionState::Current
    }
}

/// A generated row; values follow the table's schema column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<GeneratedValue>,
    pub meta: RowMeta,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[GeneratedValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&GeneratedValue> {
        let idx = self.columns.iter().position(|name| name == column)?;
        self.values.get(idx)
    }

    /// CSV cells in column order.
    pub fn render(&self) -> Vec<String> {
        self.values.iter().map(GeneratedValue::render).collect()
    }
}

/// Rows of one contiguous range plus the bookkeeping needed for the report.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub rows: Vec<Row>,
    pub retries: u64,
    pub generator_usage: BTreeMap<String, u64>,
}

/// Entry point: validates, lays out and generates projects.
#[derive(Debug, Clone)]
pub struct GenerationEngine<'r> {
    registry: &'r GeneratorRegistry,
    options: GenerateOptions,
}

impl<'r> GenerationEngine<'r> {
    pub fn new(registry: &'r GeneratorRegistry, options: GenerateOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Validate `project`, load CSV samples and lay out the selected tables and their parents.
    ///
    /// An empty selection prepares every table.
    pub fn prepare(
        &self,
        project: &Project,
        selected_tables: &[String],
    ) -> Result<PreparedRun<'r>, GenerationError> {
        let start = Instant::now();
        let validated = analyze(project, self.registry).map_err(GenerationError::Schema)?;
        let selection = resolve_selection(project, selected_tables)?;
        let order: Vec<String> = order_tables(project)?
            .into_iter()
            .filter(|table| selection.contains(&table.name))
            .map(|table| table.name.clone())
            .collect();

        let samples = CsvCache::new(self.options.asset_root.clone());
        let pools = samples.preload(&validated)?;

        let mut layouts = BTreeMap::new();
        {
            let inputs = LayoutInputs {
                project: validated.project(),
                registry: self.registry,
                samples: &samples,
                options: &self.options,
            };
            for name in &order {
                let (spec, plan) = table_parts(&validated, name)?;
                let layout = build_layout(&inputs, spec, plan, &layouts)?;
                layouts.insert(name.clone(), layout);
            }
        }

        info!(
            project = %project.name,
            seed = project.seed,
            tables = order.len(),
            sample_pools = pools,
            duration_ms = start.elapsed().as_millis() as u64,
            "generation prepared"
        );

        Ok(PreparedRun {
            registry: self.registry,
            options: self.options.clone(),
            validated,
            order,
            layouts,
            samples,
        })
    }

    /// Generate every table sequentially into `sink`.
    pub fn generate(
        &self,
        project: &Project,
        sink: &mut dyn RowSink,
    ) -> Result<GenerationReport, GenerationError> {
        let run = self.prepare(project, &[])?;
        let plan = PartitionPlanner::build_plan(&run, &PlanOptions::default())?;
        let outcome = PartitionRuntime::new(RuntimeOptions::default()).run(
            &run,
            &plan,
            sink,
            &mut MemoryLedger::new(),
            &NoopListener,
            &CancellationToken::new(),
        )?;
        Ok(outcome.into_report())
    }
}

fn table_parts<'v>(
    validated: &'v ValidatedProject,
    name: &str,
) -> Result<(&'v TableSpec, &'v TablePlan), GenerationError> {
    let spec = validated
        .project()
        .table(name)
        .ok_or_else(|| GenerationError::UnknownTable(name.to_string()))?;
    let plan = validated
        .table(name)
        .ok_or_else(|| GenerationError::UnknownTable(name.to_string()))?;
    Ok((spec, plan))
}

/// A validated project with every selected table laid out; shared read-only by workers.
#[derive(Debug)]
pub struct PreparedRun<'r> {
    registry: &'r GeneratorRegistry,
    options: GenerateOptions,
    validated: ValidatedProject,
    order: Vec<String>,
    layouts: BTreeMap<String, TableLayout>,
    samples: CsvCache,
}

impl PreparedRun<'_> {
    pub fn project(&self) -> &Project {
        self.validated.project()
    }

    pub fn validated(&self) -> &ValidatedProject {
        &self.validated
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Prepared tables in generation order.
    pub fn tables(&self) -> &[String] {
        &self.order
    }

    pub fn layout(&self, table: &str) -> Option<&TableLayout> {
        self.layouts.get(table)
    }

    pub fn samples(&self) -> &CsvCache {
        &self.samples
    }

    pub fn row_engine(&self, table: &str) -> Result<RowEngine<'_>, GenerationError> {
        let (spec, plan) = table_parts(&self.validated, table)?;
        let layout = self
            .layouts
            .get(table)
            .ok_or_else(|| GenerationError::UnknownTable(table.to_string()))?;
        Ok(RowEngine::new(
            self.registry,
            &self.samples,
            &self.options,
            spec,
            plan,
            layout,
        ))
    }

    /// Rows `start..=end` (1-based) of `table`; the result does not depend on any other range.
    pub fn generate_rows(
        &self,
        table: &str,
        start: u64,
        end: u64,
    ) -> Result<RowBatch, GenerationError> {
        self.row_engine(table)?.generate_rows(start, end)
    }

    /// Every row of `table`.
    pub fn generate_table(&self, table: &str) -> Result<Vec<Row>, GenerationError> {
        let engine = self.row_engine(table)?;
        Ok(engine.generate_rows(1, engine.layout.rows())?.rows)
    }

    /// An empty report listing every prepared table.
    pub fn new_report(&self, run_id: String) -> GenerationReport {
        let mut report = GenerationReport::new(run_id);
        for name in &self.order {
            let Some(layout) = self.layouts.get(name) else {
                continue;
            };
            report.tables.push(TableReport {
                table: name.clone(),
                rows_planned: layout.rows(),
                rows_generated: 0,
                entities: layout.entities(),
                retries: 0,
            });
            report.row_retries += layout.retries;
            for warning in &layout.warnings {
                report.record_warning(warning.clone());
            }
        }
        report
    }
}

/// Generates rows of one table from its layout.
pub struct RowEngine<'a> {
    registry: &'a GeneratorRegistry,
    samples: &'a CsvCache,
    options: &'a GenerateOptions,
    spec: &'a TableSpec,
    plan: &'a TablePlan,
    layout: &'a TableLayout,
    primary_key: Option<usize>,
    key_columns: Vec<usize>,
    change_columns: Vec<usize>,
    period: Option<(usize, usize)>,
}

/// Per-entity inputs shared by all of its versions.
struct EntityFrame {
    entity: u64,
    fixed: Vec<Option<GeneratedValue>>,
    business_key: Option<String>,
    starts: Vec<GeneratedValue>,
    updates: u32,
}

impl<'a> RowEngine<'a> {
    fn new(
        registry: &'a GeneratorRegistry,
        samples: &'a CsvCache,
        options: &'a GenerateOptions,
        spec: &'a TableSpec,
        plan: &'a TablePlan,
        layout: &'a TableLayout,
    ) -> Self {
        let index_of = |name: &String| spec.column_index(name);
        let period = match (
            spec.scd_mode,
            spec.scd_active_from_column.as_ref().and_then(index_of),
            spec.scd_active_to_column.as_ref().and_then(index_of),
        ) {
            (ScdMode::None, _, _) => None,
            (_, Some(from), Some(to)) => Some((from, to)),
            _ => None,
        };
        let change_columns = if spec.scd_mode == ScdMode::Scd2 {
            spec.scd_change_columns()
                .into_iter()
                .filter_map(|name| spec.column_index(name))
                .collect()
        } else {
            Vec::new()
        };
        Self {
            registry,
            samples,
            options,
            spec,
            plan,
            layout,
            primary_key: plan
                .columns
                .iter()
                .position(|column| column.role == ColumnRole::PrimaryKey),
            key_columns: spec
                .business_key
                .iter()
                .filter_map(|name| spec.column_index(name))
                .collect(),
            change_columns,
            period,
        }
    }

    pub fn layout(&self) -> &TableLayout {
        self.layout
    }

    /// Rows `start..=end`. Entities that straddle the range are generated whole and trimmed.
    pub fn generate_rows(&self, start: u64, end: u64) -> Result<RowBatch, GenerationError> {
        let mut batch = RowBatch::default();
        let end = end.min(self.layout.rows());
        let start = start.max(1);
        if start > end {
            return Ok(batch);
        }
        let first = self.layout.entity_of(start);
        let last = self.layout.entity_of(end);
        for entity in first..=last {
            self.generate_entity(entity, start, end, &mut batch)?;
        }
        debug!(
            table = %self.layout.table,
            start,
            end,
            rows = batch.rows.len(),
            retries = batch.retries,
            "rows generated"
        );
        Ok(batch)
    }

    fn generate_entity(
        &self,
        entity: u64,
        start: u64,
        end: u64,
        batch: &mut RowBatch,
    ) -> Result<(), GenerationError> {
        let (first_row, versions) = self.layout.entity_rows(entity);
        let frame = self.entity_frame(entity, first_row, versions, batch)?;
        let scd2 = self.spec.scd_mode == ScdMode::Scd2;
        let max_attempts = self.options.max_attempts_row.max(1);

        let mut carried: Option<Vec<Option<GeneratedValue>>> = None;
        let mut previous: Option<Vec<String>> = None;
        for version in 0..versions {
            let row_number = first_row + version;
            let mut attempt = 0;
            let values = loop {
                let values =
                    self.build_row(&frame, version, row_number, attempt, carried.as_deref(), batch)?;
                let changes = self.change_key(&values);
                let unchanged = scd2 && previous.as_ref().is_some_and(|prev| *prev == changes);
                if !unchanged {
                    previous = Some(changes);
                    break values;
                }
                batch.retries += 1;
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(GenerationError::Capacity {
                        table: self.spec.name.clone(),
                        business_key: frame.business_key.clone(),
                        attempted: max_attempts,
                        issue: format!(
                            "could not change the tracked columns ({}) for version {}",
                            self.change_names(),
                            version + 1
                        ),
                        hint: "widen the value range of the tracked columns or lower the number of versions"
                            .to_string(),
                    });
                }
            };
            if scd2 && carried.is_none() {
                carried = Some(values.clone());
            }

            if row_number < start || row_number > end {
                continue;
            }
            let (active_from, active_to) = match self.period {
                Some((from, to)) => (values[from].clone(), values[to].clone()),
                None => (None, None),
            };
            batch.rows.push(Row {
                columns: Arc::clone(&self.layout.columns),
                values: values
                    .into_iter()
                    .map(|value| value.unwrap_or(GeneratedValue::Null))
                    .collect(),
                meta: RowMeta {
                    row_number,
                    entity_index: entity,
                    version_index: if self.spec.scd_mode == ScdMode::Scd1 {
                        u64::from(frame.updates)
                    } else {
                        version
                    },
                    state: if scd2 {
                        VersionState::of(version, versions)
                    } else {
                        VersionState::Current
                    },
                    business_key: frame.business_key.clone(),
                    active_from,
                    active_to,
                },
            });
        }
        Ok(())
    }

    fn entity_frame(
        &self,
        entity: u64,
        first_row: u64,
        versions: u64,
        batch: &mut RowBatch,
    ) -> Result<EntityFrame, GenerationError> {
        let mut fixed: Vec<Option<GeneratedValue>> = vec![None; self.plan.columns.len()];
        for assignment in &self.layout.foreign {
            fixed[assignment.column] = Some(GeneratedValue::Int(pk_value(assignment.parent_pk(entity))));
        }
        let identity = self.layout.identity(entity);
        for (slot, idx) in self.layout.identity_columns().iter().enumerate() {
            fixed[*idx] = identity.get(slot).cloned();
        }
        let business_key = if self.key_columns.is_empty() {
            None
        } else {
            Some(render_key(&self.layout.columns, &self.key_columns, &fixed))
        };

        let mut starts = Vec::new();
        if let Some((from, _)) = self.period {
            let first = self.value(
                from,
                &fixed,
                Slot {
                    scope: Scope::Entity,
                    owner: entity,
                    attempt: 0,
                    row_number: first_row,
                    entity,
                    version: 0,
                },
                batch,
            )?;
            let mut rng = value_stream(self.layout.column_seeds[from], Scope::Period, entity, 0);
            starts = scd::version_starts(&first, versions, &mut rng).ok_or_else(|| {
                GenerationError::Capacity {
                    table: self.spec.name.clone(),
                    business_key: business_key.clone(),
                    attempted: 0,
                    issue: "active periods run past 9999-12-31".to_string(),
                    hint: "move the active-from range earlier or lower the number of versions"
                        .to_string(),
                }
            })?;
        }

        let updates = if self.spec.scd_mode == ScdMode::Scd1 {
            let mut rng = value_stream(self.layout.table_seed, Scope::Entity, entity, 0);
            scd::scd1_updates(&mut rng)
        } else {
            0
        };

        Ok(EntityFrame {
            entity,
            fixed,
            business_key,
            starts,
            updates,
        })
    }

    fn build_row(
        &self,
        frame: &EntityFrame,
        version: u64,
        row_number: u64,
        attempt: u32,
        carried: Option<&[Option<GeneratedValue>]>,
        batch: &mut RowBatch,
    ) -> Result<Vec<Option<GeneratedValue>>, GenerationError> {
        let mut values = frame.fixed.clone();
        if let Some(pk) = self.primary_key {
            values[pk] = Some(GeneratedValue::Int(pk_value(self.options.pk_offset + row_number)));
        }
        if let Some((from, to)) = self.period
            && let Some((start, stop)) = scd::period(&frame.starts, version as usize, self.plan.columns[to].dtype)
        {
            values[from] = Some(start);
            values[to] = Some(stop);
        }

        let scd_mode = self.spec.scd_mode;
        for &idx in &self.plan.order {
            if values[idx].is_some() {
                continue;
            }
            let role = self.plan.columns[idx].role;
            let row_slot = |attempt: u32, version: u64| Slot {
                scope: Scope::Row,
                owner: row_number,
                attempt,
                row_number,
                entity: frame.entity,
                version,
            };
            let slot = match (role, scd_mode) {
                (ColumnRole::Attribute, ScdMode::Scd2) => {
                    if let Some(previous) = carried.and_then(|carried| carried[idx].clone()) {
                        values[idx] = Some(previous);
                        continue;
                    }
                    Slot {
                        scope: Scope::Entity,
                        owner: frame.entity,
                        attempt: 0,
                        row_number,
                        entity: frame.entity,
                        version: 0,
                    }
                }
                (ColumnRole::Tracked, ScdMode::Scd1) => {
                    row_slot(frame.updates, u64::from(frame.updates))
                }
                (ColumnRole::Tracked, _) => row_slot(attempt, version),
                _ => row_slot(0, version),
            };
            let value = self.value(idx, &values, slot, batch)?;
            values[idx] = Some(value);
        }
        Ok(values)
    }

    fn value(
        &self,
        idx: usize,
        values: &[Option<GeneratedValue>],
        slot: Slot,
        batch: &mut RowBatch,
    ) -> Result<GeneratedValue, GenerationError> {
        let column = &self.plan.columns[idx];
        let column_seed = self.layout.column_seeds[idx];
        let mut rng = value_stream(column_seed, slot.scope, slot.owner, slot.attempt);
        let ctx = GeneratorContext {
            table: &self.layout.table,
            column: &column.name,
            dtype: column.dtype,
            row_number: slot.row_number,
            entity_index: slot.entity,
            version_index: u32::try_from(slot.version).unwrap_or(u32::MAX),
            attempt: slot.attempt,
            row: PartialRow::new(&self.layout.columns, values),
            samples: self.samples,
            column_seed,
        };
        let value = generate_column(
            self.registry,
            column,
            &ctx,
            &mut rng,
            self.options.default_null_rate,
        )?;
        if let Some(id) = &column.generator {
            *batch.generator_usage.entry(id.clone()).or_insert(0) += 1;
        }
        Ok(value)
    }

    fn change_key(&self, values: &[Option<GeneratedValue>]) -> Vec<String> {
        self.change_columns
            .iter()
            .map(|idx| {
                values[*idx]
                    .as_ref()
                    .map(GeneratedValue::render)
                    .unwrap_or_default()
            })
            .collect()
    }

    fn change_names(&self) -> String {
        self.change_columns
            .iter()
            .map(|idx| self.layout.columns[*idx].as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Keys were range-checked when the table was laid out.
fn pk_value(key: u64) -> i64 {
    i64::try_from(key).unwrap_or(i64::MAX)
}

/// Which random stream a value draws from, and the context it is generated in.
#[derive(Debug, Clone, Copy)]
struct Slot {
    scope: Scope,
    owner: u64,
    attempt: u32,
    row_number: u64,
    entity: u64,
    version: u64,
}

/// Namespace of a value stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Keyed by row number.
    Row,
    /// Keyed by entity; carried across versions.
    Entity,
    /// Business-key and static columns.
    Identity,
    /// Gaps between SCD2 version starts.
    Period,
}

impl Scope {
    fn salt(self) -> &'static str {
        match self {
            Scope::Row => "row",
            Scope::Entity => "entity",
            Scope::Identity => "identity",
            Scope::Period => "period",
        }
    }
}

/// Random stream for one value; depends only on the column, the scope key and the attempt.
pub(crate) fn value_stream(column_seed: u64, scope: Scope, owner: u64, attempt: u32) -> ChaCha8Rng {
    let scoped = hash_seed(column_seed, scope.salt());
    ChaCha8Rng::seed_from_u64(hash_row_seed(scoped, owner, attempt))
}

/// Null draw, generator call and constraint clamping for one column value.
pub(crate) fn generate_column(
    registry: &GeneratorRegistry,
    plan: &ColumnPlan,
    ctx: &GeneratorContext<'_>,
    rng: &mut dyn RngCore,
    default_null_rate: f64,
) -> Result<GeneratedValue, GenerationError> {
    if plan.may_be_null() {
        let rate = plan.null_rate.unwrap_or(default_null_rate);
        if rate > 0.0 && rng.random::<f64>() < rate {
            return Ok(GeneratedValue::Null);
        }
    }
    let generator_id = plan.generator.as_deref().unwrap_or("none");
    let (Some(generator), Some(config)) = (registry.get(generator_id), plan.config.as_ref()) else {
        return Err(ctx.error(
            generator_id,
            "has no resolved configuration",
            "validate the project with the same generator registry before generating",
        ));
    };
    let value = generator.generate(ctx, config, rng)?;
    Ok(apply_bounds(value, plan))
}

fn apply_bounds(value: GeneratedValue, plan: &ColumnPlan) -> GeneratedValue {
    if plan.min.is_none() && plan.max.is_none() {
        return value;
    }
    match value {
        GeneratedValue::Int(raw) if plan.dtype == DataType::Int => {
            let clamped = clamp_optional(raw as f64, plan.min, plan.max);
            if clamped == raw as f64 {
                GeneratedValue::Int(raw)
            } else {
                GeneratedValue::from_number(DataType::Int, clamped)
            }
        }
        GeneratedValue::Decimal(raw) => {
            GeneratedValue::Decimal(clamp_optional(raw, plan.min, plan.max))
        }
        other => other,
    }
}

/// FNV-1a over `key`, seeded by `seed`.
pub(crate) fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub(crate) fn hash_row_seed(table_seed: u64, row_index: u64, attempt: u32) -> u64 {
    let mut hash = table_seed ^ row_index.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= attempt as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(value: serde_json::Value) -> Project {
        serde_json::from_value(value).expect("project")
    }

    #[test]
    fn value_streams_are_namespaced() {
        let mut row = value_stream(5, Scope::Row, 1, 0);
        let mut entity = value_stream(5, Scope::Entity, 1, 0);
        assert_ne!(row.next_u64(), entity.next_u64());
        let mut again = value_stream(5, Scope::Row, 1, 0);
        let mut first = value_stream(5, Scope::Row, 1, 0);
        assert_eq!(first.next_u64(), again.next_u64());
    }

    #[test]
    fn any_row_range_matches_the_full_table() {
        let project = project(json!({
            "name": "p",
            "seed": 3,
            "tables": [{
                "name": "people",
                "row_count": 40,
                "columns": [
                    {"name": "id", "dtype": "int", "primary_key": true},
                    {"name": "age", "dtype": "int", "constraints": {"min": 18, "max": 70}},
                    {"name": "salary", "dtype": "decimal", "generator": "salary_from_age", "depends_on": ["age"]}
                ]
            }]
        }));
        let registry = GeneratorRegistry::with_builtins();
        let engine = GenerationEngine::new(&registry, GenerateOptions::default());
        let run = engine.prepare(&project, &[]).expect("prepared");
        let full = run.generate_table("people").expect("table");
        let middle = run.generate_rows("people", 11, 20).expect("range");
        assert_eq!(middle.rows.as_slice(), &full[10..20]);
        assert_eq!(full[0].get("id"), Some(&GeneratedValue::Int(1)));
        assert!(full.iter().all(|row| match row.get("age") {
            Some(GeneratedValue::Int(age)) => (18..=70).contains(age),
            Some(GeneratedValue::Null) => true,
            _ => false,
        }));
    }

    #[test]
    fn pk_offset_shifts_keys_and_parents() {
        let project = project(json!({
            "name": "p",
            "tables": [
                {"name": "a", "row_count": 2, "columns": [{"name": "id", "dtype": "int", "primary_key": true}]},
                {"name": "b", "row_count": 4, "columns": [
                    {"name": "id", "dtype": "int", "primary_key": true},
                    {"name": "a_id", "dtype": "int"}
                ]}
            ],
            "relationships": [{"child_table": "b", "child_column": "a_id", "parent_table": "a", "parent_column": "id", "min_children": 2, "max_children": 2}]
        }));
        let registry = GeneratorRegistry::with_builtins();
        let options = GenerateOptions {
            pk_offset: 100,
            ..GenerateOptions::default()
        };
        let run = GenerationEngine::new(&registry, options)
            .prepare(&project, &[])
            .expect("prepared");
        let rows = run.generate_table("b").expect("rows");
        let keys: Vec<String> = rows.iter().map(|row| row.render().join(",")).collect();
        assert_eq!(keys, vec!["101,101", "102,101", "103,102", "104,102"]);
    }

    #[test]
    fn pk_offset_past_the_int_range_is_rejected() {
        let project = project(json!({
            "name": "p",
            "tables": [{"name": "t", "row_count": 3, "columns": [{"name": "id", "dtype": "int", "primary_key": true}]}]
        }));
        let registry = GeneratorRegistry::with_builtins();
        let options = |pk_offset| GenerateOptions {
            pk_offset,
            ..GenerateOptions::default()
        };
        let err = GenerationEngine::new(&registry, options(i64::MAX as u64))
            .prepare(&project, &[])
            .expect_err("keys overflow");
        assert!(matches!(err, GenerationError::Capacity { .. }));
        assert!(err.to_string().starts_with("Table 't': pk_offset"));
        assert!(err.to_string().contains(&format!("at most {}", i64::MAX - 3)));

        let run = GenerationEngine::new(&registry, options(i64::MAX as u64 - 3))
            .prepare(&project, &[])
            .expect("largest offset fits");
        let keys: Vec<String> = run
            .generate_table("t")
            .expect("rows")
            .iter()
            .map(|row| row.render().join(","))
            .collect();
        assert_eq!(keys.last().map(String::as_str), Some("9223372036854775807"));
        assert_eq!(keys.iter().collect::<std::collections::BTreeSet<_>>().len(), 3);
    }

    #[test]
    fn invalid_projects_never_reach_generation() {
        let project = project(json!({
            "name": "p",
            "tables": [{"name": "t", "row_count": 1, "columns": [{"name": "x", "dtype": "int"}]}]
        }));
        let registry = GeneratorRegistry::with_builtins();
        let err = GenerationEngine::new(&registry, GenerateOptions::default())
            .prepare(&project, &[])
            .expect_err("no primary key");
        assert!(matches!(err, GenerationError::Schema(_)));
        assert_eq!(
            err.to_string(),
            "Table 't': must have a primary key column. Fix: mark one int column with primary_key=true."
        );
    }

    #[test]
    fn fnv_helpers_are_stable() {
        assert_eq!(hash_seed(0, ""), 0xcbf29ce484222325);
        assert_ne!(hash_row_seed(1, 1, 0), hash_row_seed(1, 1, 1));
    }
}
