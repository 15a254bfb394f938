use seedforge_plan::{PartitionPlan, PlanError, PlanOptions, RowUnits, plan_partitions};
use tracing::info;

use crate::engine::PreparedRun;
use crate::errors::GenerationError;

impl RowUnits for PreparedRun<'_> {
    fn row_count(&self, table: &str) -> Option<u64> {
        self.layout(table).map(|layout| layout.rows())
    }

    fn unit_end(&self, table: &str, row: u64) -> u64 {
        self.layout(table)
            .map(|layout| layout.unit_end(row))
            .unwrap_or(row)
    }
}

/// Builds partition plans from prepared runs, so chunk boundaries follow entity boundaries.
pub struct PartitionPlanner;

impl PartitionPlanner {
    /// Plan the prepared tables. An empty selection in `options` means the run's own selection.
    pub fn build_plan(
        run: &PreparedRun<'_>,
        options: &PlanOptions,
    ) -> Result<PartitionPlan, GenerationError> {
        let options = if options.selected_tables.is_empty() {
            PlanOptions {
                selected_tables: run.tables().to_vec(),
                ..options.clone()
            }
        } else {
            options.clone()
        };
        let plan = plan_partitions(run.project(), run, &options).map_err(|err| match err {
            PlanError::Cycle(cycle) => GenerationError::Cycle(cycle),
            other => GenerationError::Plan(other),
        })?;
        info!(
            project = %plan.project_name,
            partitions = plan.partitions.len(),
            stages = plan.stage_count(),
            chunk_size_rows = plan.chunk_size_rows,
            "partition plan built"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::GeneratorRegistry;
    use crate::model::GenerateOptions;
    use crate::engine::GenerationEngine;
    use seedforge_core::Project;
    use serde_json::json;

    fn scd_project() -> Project {
        serde_json::from_value(json!({
            "name": "dims",
            "seed": 9,
            "tables": [{
                "name": "customers",
                "row_count": 30,
                "business_key": ["customer_code"],
                "business_key_unique_count": 10,
                "scd_mode": "scd2",
                "scd_tracked_columns": ["tier"],
                "scd_active_from_column": "valid_from",
                "scd_active_to_column": "valid_to",
                "columns": [
                    {"name": "id", "dtype": "int", "primary_key": true},
                    {"name": "customer_code", "dtype": "text", "nullable": false, "generator": "regex", "params": {"pattern": "C-[0-9]{6}"}},
                    {"name": "tier", "dtype": "text", "nullable": false, "constraints": {"choices": ["bronze", "silver", "gold", "platinum"]}},
                    {"name": "valid_from", "dtype": "date"},
                    {"name": "valid_to", "dtype": "date"}
                ]
            }]
        }))
        .expect("project")
    }

    #[test]
    fn chunks_never_split_an_entity() {
        let registry = GeneratorRegistry::with_builtins();
        let run = GenerationEngine::new(&registry, GenerateOptions::default())
            .prepare(&scd_project(), &[])
            .expect("prepared");
        let plan = PartitionPlanner::build_plan(
            &run,
            &PlanOptions {
                chunk_size_rows: 4,
                ..PlanOptions::default()
            },
        )
        .expect("plan");
        let layout = run.layout("customers").expect("layout");
        assert!(plan.partitions.len() > 1);
        for partition in &plan.partitions {
            assert_eq!(layout.unit_end(partition.end_row), partition.end_row);
        }
        assert_eq!(plan.total_rows(), 30);
    }
}
