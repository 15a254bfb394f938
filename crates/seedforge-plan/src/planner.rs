use std::collections::{BTreeMap, BTreeSet, VecDeque};

use seedforge_core::{Project, ScdMode, table_stages};
use tracing::debug;

use crate::errors::{PlanError, Result};
use crate::model::{MAX_CHUNK_SIZE_ROWS, MAX_ROW_OVERRIDE, Partition, PartitionPlan, PlanOptions};

/// Row sizing consumed by the planner.
pub trait RowUnits {
    /// Total rows for `table`, if known.
    fn row_count(&self, table: &str) -> Option<u64>;

    /// Last row (1-based) of the deterministic unit that contains `row`.
    ///
    /// Chunk ends are moved forward to this row so a unit is never split.
    fn unit_end(&self, _table: &str, row: u64) -> u64 {
        row
    }
}

impl RowUnits for BTreeMap<String, u64> {
    fn row_count(&self, table: &str) -> Option<u64> {
        self.get(table).copied()
    }
}

/// Close the requested tables over their FK parents. An empty request selects all tables.
pub fn resolve_selection(project: &Project, requested: &[String]) -> Result<BTreeSet<String>> {
    if requested.is_empty() {
        return Ok(project
            .tables
            .iter()
            .map(|table| table.name.clone())
            .collect());
    }

    let mut selected = BTreeSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    for name in requested {
        if project.table(name).is_none() {
            return Err(PlanError::UnknownTable(name.clone()));
        }
        if selected.insert(name.clone()) {
            queue.push_back(name.clone());
        }
    }

    while let Some(table) = queue.pop_front() {
        for rel in project.relationships_in(&table) {
            if project.table(&rel.parent_table).is_none() {
                return Err(PlanError::UnknownTable(rel.parent_table.clone()));
            }
            if selected.insert(rel.parent_table.clone()) {
                queue.push_back(rel.parent_table.clone());
            }
        }
    }

    Ok(selected)
}

/// Copy of `project` with the overridden tables resized.
///
/// SCD1 tables keep one row per business key, so their unique count follows the override.
/// A child override may not drop below `parent rows * min_children` of any of its FKs.
pub fn apply_row_overrides(project: &Project, overrides: &BTreeMap<String, u64>) -> Result<Project> {
    for (table, rows) in overrides {
        if project.table(table).is_none() {
            return Err(PlanError::RowOverride {
                table: table.clone(),
                issue: "table not found in project".to_string(),
                hint: "use existing table names as row override keys".to_string(),
            });
        }
        if *rows == 0 || *rows > MAX_ROW_OVERRIDE {
            return Err(PlanError::RowOverride {
                table: table.clone(),
                issue: format!("row count {rows} is outside 1..={MAX_ROW_OVERRIDE}"),
                hint: format!("set a whole-number row count between 1 and {MAX_ROW_OVERRIDE}"),
            });
        }
    }

    let mut resized = project.clone();
    for table in &mut resized.tables {
        let Some(rows) = overrides.get(&table.name) else {
            continue;
        };
        table.row_count = Some(*rows);
        if table.scd_mode == ScdMode::Scd1 && table.business_key_unique_count.is_some() {
            table.business_key_unique_count = Some(*rows);
        }
    }

    for rel in &resized.relationships {
        let Some(child_rows) = overrides.get(&rel.child_table) else {
            continue;
        };
        let Some(parent_rows) = resized
            .table(&rel.parent_table)
            .and_then(|parent| parent.row_count)
        else {
            continue;
        };
        let required = parent_rows.saturating_mul(rel.min_children);
        if *child_rows < required {
            return Err(PlanError::RowOverride {
                table: rel.child_table.clone(),
                issue: format!(
                    "{child_rows} row(s) violate the FK minimum of {} (requires at least {required})",
                    rel.label()
                ),
                hint: format!(
                    "set the override for '{}' to at least {required}, or lower the parent row count",
                    rel.child_table
                ),
            });
        }
    }

    debug!(tables = overrides.len(), "row overrides applied");
    Ok(resized)
}

/// Overrides in `options` must already be applied to the project being planned.
fn check_overrides_applied(project: &Project, options: &PlanOptions) -> Result<()> {
    for (table, rows) in &options.row_overrides {
        let spec = project
            .table(table)
            .ok_or_else(|| PlanError::UnknownTable(table.clone()))?;
        if spec.row_count != Some(*rows) {
            return Err(PlanError::RowOverride {
                table: table.clone(),
                issue: format!(
                    "project has row_count {} but the plan requests {rows}",
                    spec.row_count.map_or_else(|| "unset".to_string(), |count| count.to_string())
                ),
                hint: "apply the overrides with apply_row_overrides before preparing the run".to_string(),
            });
        }
    }
    Ok(())
}

/// Split the selected tables into stage-ordered chunks.
pub fn plan_partitions(
    project: &Project,
    units: &dyn RowUnits,
    options: &PlanOptions,
) -> Result<PartitionPlan> {
    let chunk_size = options.chunk_size_rows;
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE_ROWS {
        return Err(PlanError::InvalidChunkSize {
            value: chunk_size,
            max: MAX_CHUNK_SIZE_ROWS,
        });
    }

    check_overrides_applied(project, options)?;
    let selection = resolve_selection(project, &options.selected_tables)?;
    let stages = table_stages(project, Some(&selection))?;

    let mut partitions = Vec::new();
    for entry in &stages {
        let rows = units
            .row_count(&entry.table)
            .ok_or_else(|| PlanError::MissingRowCount(entry.table.clone()))?;

        let mut start = 1_u64;
        let mut chunk_index = 0_u32;
        while start <= rows {
            let tentative = start.saturating_add(chunk_size - 1).min(rows);
            let end = units.unit_end(&entry.table, tentative).clamp(tentative, rows);
            partitions.push(Partition::new(
                &entry.table,
                entry.stage,
                chunk_index,
                start,
                end,
            ));
            start = end + 1;
            chunk_index += 1;
        }

        debug!(
            table = %entry.table,
            stage = entry.stage,
            rows,
            chunks = chunk_index,
            "table partitioned"
        );
    }

    partitions.sort_by_key(|partition| partition.stage);

    Ok(PartitionPlan {
        project_name: project.name.clone(),
        seed: project.seed,
        chunk_size_rows: chunk_size,
        selected_tables: stages.into_iter().map(|entry| entry.table).collect(),
        partitions,
    })
}
