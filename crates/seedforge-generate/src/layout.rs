use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use seedforge_core::{DEFAULT_ROW_COUNT, Diagnostic, Project, Relationship, ScdMode, TableSpec, derive_seed};

use crate::assets::CsvCache;
use crate::engine::{Scope, generate_column, hash_seed, value_stream};
use crate::errors::GenerationError;
use crate::foreign::{ForeignAssignment, ParentPool, allocate};
use crate::generators::{GeneratedValue, GeneratorContext, GeneratorRegistry, PartialRow};
use crate::model::{ChildCapacityPolicy, GenerateOptions, GenerationIssue};
use crate::validate::{ColumnRole, TablePlan};

/// How rows map onto business entities.
#[derive(Debug, Clone)]
enum Units {
    /// One entity per row.
    PerRow,
    /// `starts[e]` is the first row of entity `e`; the last element is `rows + 1`.
    Entities(Vec<u64>),
}

/// Deterministic shape of one table, fixed before any row is generated.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub table: String,
    pub table_seed: u64,
    pub columns: Arc<[String]>,
    pub column_seeds: Vec<u64>,
    rows: u64,
    units: Units,
    pub foreign: Vec<ForeignAssignment>,
    /// Identity columns in generation order.
    identity_columns: Vec<usize>,
    identities: Vec<Vec<GeneratedValue>>,
    /// Business-key collisions resolved while building identities.
    pub retries: u64,
    pub warnings: Vec<GenerationIssue>,
}

impl TableLayout {
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn entities(&self) -> u64 {
        match &self.units {
            Units::PerRow => self.rows,
            Units::Entities(starts) => starts.len().saturating_sub(1) as u64,
        }
    }

    /// 0-based entity of the 1-based `row`.
    pub fn entity_of(&self, row: u64) -> u64 {
        match &self.units {
            Units::PerRow => row - 1,
            Units::Entities(starts) => (starts.partition_point(|start| *start <= row) - 1) as u64,
        }
    }

    /// First row and number of rows of `entity`.
    pub fn entity_rows(&self, entity: u64) -> (u64, u64) {
        match &self.units {
            Units::PerRow => (entity + 1, 1),
            Units::Entities(starts) => {
                let idx = entity as usize;
                (starts[idx], starts[idx + 1] - starts[idx])
            }
        }
    }

    /// Last row of the entity that owns `row`.
    pub fn unit_end(&self, row: u64) -> u64 {
        if row == 0 || row > self.rows {
            return row;
        }
        let (first, count) = self.entity_rows(self.entity_of(row));
        first + count - 1
    }

    pub fn identity_columns(&self) -> &[usize] {
        &self.identity_columns
    }

    /// Identity values of `entity`, aligned with `identity_columns`.
    pub fn identity(&self, entity: u64) -> &[GeneratedValue] {
        self.identities
            .get(entity as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Shared inputs for building layouts.
pub(crate) struct LayoutInputs<'a> {
    pub project: &'a Project,
    pub registry: &'a GeneratorRegistry,
    pub samples: &'a CsvCache,
    pub options: &'a GenerateOptions,
}

/// Size the table, assign parents and build unique business keys.
///
/// `parents` must already hold the layouts of every parent table.
pub(crate) fn build_layout(
    inputs: &LayoutInputs<'_>,
    spec: &TableSpec,
    plan: &TablePlan,
    parents: &BTreeMap<String, TableLayout>,
) -> Result<TableLayout, GenerationError> {
    let name = spec.name.as_str();
    let options = inputs.options;
    let table_seed = derive_seed(inputs.project.seed, &format!("table:{name}"));
    let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(table_seed, "layout"));

    let incoming: Vec<(usize, &Relationship)> = inputs
        .project
        .relationships
        .iter()
        .enumerate()
        .filter(|(_, rel)| rel.child_table == name)
        .collect();

    let declared = match spec.row_count {
        Some(rows) => Some(rows),
        None if incoming.is_empty() => Some(DEFAULT_ROW_COUNT),
        None => None,
    };
    let entity_table = spec.has_business_key();
    let mut entity_count = if entity_table {
        spec.business_key_unique_count.or(declared)
    } else {
        declared
    };

    let mut foreign = Vec::with_capacity(incoming.len());
    for (idx, rel) in incoming {
        let parent = parents
            .get(&rel.parent_table)
            .ok_or_else(|| GenerationError::UnknownTable(rel.parent_table.clone()))?;
        let column = spec.column_index(&rel.child_column).ok_or_else(|| {
            GenerationError::Schema(vec![Diagnostic::relationship(
                rel,
                format!("child_column '{}' not found", rel.child_column),
                "validate the project before generating",
            )])
        })?;
        let pool = ParentPool {
            first_pk: options.pk_offset + 1,
            count: parent.rows(),
        };
        let mut fk_rng =
            ChaCha8Rng::seed_from_u64(hash_seed(table_seed, &format!("fk:{}", rel.child_column)));
        let counts = allocate(name, rel, entity_count, pool, &mut fk_rng)?;
        let assignment = ForeignAssignment::new(idx, column, pool, &counts);
        entity_count.get_or_insert(assignment.entities());
        foreign.push(assignment);
    }
    let entities = entity_count.unwrap_or(DEFAULT_ROW_COUNT);

    let columns: Arc<[String]> = plan.column_names().into();
    let column_seeds = columns
        .iter()
        .map(|column| hash_seed(table_seed, column))
        .collect();

    let mut layout = TableLayout {
        table: name.to_string(),
        table_seed,
        columns,
        column_seeds,
        rows: entities,
        units: Units::PerRow,
        foreign,
        identity_columns: Vec::new(),
        identities: Vec::new(),
        retries: 0,
        warnings: Vec::new(),
    };
    if !entity_table {
        check_key_range(name, options.pk_offset, layout.rows)?;
        debug!(table = %name, rows = layout.rows, "table laid out");
        return Ok(layout);
    }

    let mut versions = entity_versions(spec, declared, entities, options, &mut rng);
    for assignment in &layout.foreign {
        let rel = &inputs.project.relationships[assignment.relationship];
        let capped = fit_child_capacity(spec, rel, assignment, &mut versions, options)?;
        if capped > 0 {
            warn!(table = %name, fk = %rel.label(), capped, "versions capped to parent capacity");
            layout.warnings.push(GenerationIssue::table(
                "versions_capped",
                name,
                format!(
                    "dropped {capped} version(s) so each parent in {} keeps at most {} child rows",
                    rel.label(),
                    rel.max_children
                ),
            ));
        }
    }

    let mut starts = Vec::with_capacity(versions.len() + 1);
    let mut next = 1_u64;
    for count in &versions {
        starts.push(next);
        next += count;
    }
    starts.push(next);
    layout.rows = next - 1;
    layout.units = Units::Entities(starts);
    check_key_range(name, options.pk_offset, layout.rows)?;

    layout.identity_columns = plan
        .order
        .iter()
        .copied()
        .filter(|idx| plan.columns[*idx].role == ColumnRole::Identity)
        .collect();
    build_identities(inputs, spec, plan, &mut layout)?;

    debug!(
        table = %name,
        rows = layout.rows,
        entities = layout.entities(),
        retries = layout.retries,
        "table laid out"
    );
    Ok(layout)
}

/// Primary keys `pk_offset + 1 ..= pk_offset + rows` must fit an int column.
fn check_key_range(table: &str, pk_offset: u64, rows: u64) -> Result<(), GenerationError> {
    let fits = pk_offset
        .checked_add(rows)
        .is_some_and(|last| last <= i64::MAX as u64);
    if fits {
        return Ok(());
    }
    Err(GenerationError::Capacity {
        table: table.to_string(),
        business_key: None,
        attempted: 0,
        issue: format!("pk_offset {pk_offset} plus {rows} row(s) exceeds the int key range"),
        hint: format!(
            "lower pk_offset to at most {}",
            (i64::MAX as u64).saturating_sub(rows)
        ),
    })
}

/// Rows per entity.
fn entity_versions(
    spec: &TableSpec,
    declared: Option<u64>,
    entities: u64,
    options: &GenerateOptions,
    rng: &mut ChaCha8Rng,
) -> Vec<u64> {
    let spread = |rows: u64| -> Vec<u64> {
        let base = rows / entities;
        let extra = rows % entities;
        (0..entities)
            .map(|entity| base + u64::from(entity < extra))
            .collect()
    };
    let explicit_unique = spec.business_key_unique_count.is_some();
    match (spec.scd_mode, declared) {
        (ScdMode::Scd2, Some(rows)) if explicit_unique => spread(rows),
        (ScdMode::Scd2, _) => {
            let max = u64::from(options.scd2_default_max_versions.max(1));
            (0..entities).map(|_| rng.random_range(1..=max)).collect()
        }
        (_, Some(rows)) if explicit_unique => spread(rows),
        _ => vec![1; entities as usize],
    }
}

/// Keep every parent within `max_children` rows. Returns the number of dropped versions.
fn fit_child_capacity(
    spec: &TableSpec,
    rel: &Relationship,
    assignment: &ForeignAssignment,
    versions: &mut [u64],
    options: &GenerateOptions,
) -> Result<u64, GenerationError> {
    let mut dropped = 0;
    for (parent_pk, range) in assignment.groups() {
        let group = &mut versions[range.start as usize..range.end as usize];
        let mut used: u64 = group.iter().sum();
        if used <= rel.max_children {
            continue;
        }
        if options.child_capacity_policy == ChildCapacityPolicy::Fail {
            return Err(GenerationError::Capacity {
                table: spec.name.clone(),
                business_key: None,
                attempted: 0,
                issue: format!(
                    "versions under parent {}.{}={parent_pk} need {used} child rows but {} allows max_children={}",
                    rel.parent_table,
                    rel.parent_column,
                    rel.label(),
                    rel.max_children
                ),
                hint: "raise max_children, lower the number of versions, or set child_capacity_policy to cap"
                    .to_string(),
            });
        }
        for count in group.iter_mut().rev() {
            while used > rel.max_children && *count > 1 {
                *count -= 1;
                used -= 1;
                dropped += 1;
            }
        }
    }
    Ok(dropped)
}

/// Generate identity columns once per entity, retrying collisions on the business key.
fn build_identities(
    inputs: &LayoutInputs<'_>,
    spec: &TableSpec,
    plan: &TablePlan,
    layout: &mut TableLayout,
) -> Result<(), GenerationError> {
    let max_attempts = inputs.options.max_attempts_row.max(1);
    let key_columns: Vec<usize> = spec
        .business_key
        .iter()
        .filter_map(|column| spec.column_index(column))
        .collect();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut identities = Vec::with_capacity(layout.entities() as usize);
    let mut values: Vec<Option<GeneratedValue>> = vec![None; plan.columns.len()];

    for entity in 0..layout.entities() {
        let (first_row, _) = layout.entity_rows(entity);
        let mut last_key = String::new();
        let mut accepted = false;
        for attempt in 0..max_attempts {
            values.iter_mut().for_each(|value| *value = None);
            for &idx in &layout.identity_columns {
                let column = &plan.columns[idx];
                let mut rng = value_stream(layout.column_seeds[idx], Scope::Identity, entity, attempt);
                let value = {
                    let ctx = GeneratorContext {
                        table: &layout.table,
                        column: &column.name,
                        dtype: column.dtype,
                        row_number: first_row,
                        entity_index: entity,
                        version_index: 0,
                        attempt,
                        row: PartialRow::new(&layout.columns, &values),
                        samples: inputs.samples,
                        column_seed: layout.column_seeds[idx],
                    };
                    generate_column(inputs.registry, column, &ctx, &mut rng, 0.0)?
                };
                values[idx] = Some(value);
            }
            last_key = render_key(&layout.columns, &key_columns, &values);
            if seen.insert(last_key.clone()) {
                accepted = true;
                break;
            }
            layout.retries += 1;
        }
        if !accepted {
            return Err(GenerationError::Capacity {
                table: spec.name.clone(),
                business_key: Some(last_key),
                attempted: max_attempts,
                issue: "could not generate a unique business key".to_string(),
                hint: "widen the value range of the business key columns, lower business_key_unique_count or raise max_attempts_row"
                    .to_string(),
            });
        }
        identities.push(
            layout
                .identity_columns
                .iter()
                .map(|idx| values[*idx].clone().unwrap_or(GeneratedValue::Null))
                .collect(),
        );
    }
    layout.identities = identities;
    Ok(())
}

/// `col=value` pairs of the business key, comma separated.
pub(crate) fn render_key(
    columns: &[String],
    key_columns: &[usize],
    values: &[Option<GeneratedValue>],
) -> String {
    key_columns
        .iter()
        .map(|idx| {
            let value = values[*idx]
                .as_ref()
                .map(GeneratedValue::render)
                .unwrap_or_default();
            format!("{}={value}", columns[*idx])
        })
        .collect::<Vec<_>>()
        .join(", ")
}
