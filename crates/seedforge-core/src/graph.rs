use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::schema::{ColumnSpec, Project, TableSpec};

/// Graph in which a dependency cycle was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CycleScope {
    Columns { table: String },
    Tables,
}

/// A dependency cycle. `nodes` lists the nodes that sit on (or between) cycles, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleError {
    pub scope: CycleScope,
    pub nodes: Vec<String>,
}

impl CycleError {
    pub fn diagnostic(&self) -> Diagnostic {
        let nodes = self.nodes.join(", ");
        match &self.scope {
            CycleScope::Columns { table } => Diagnostic::table(
                table,
                format!("detected cyclic column dependencies ({nodes})"),
                "remove one depends_on reference so the columns can be generated in order",
            ),
            CycleScope::Tables => Diagnostic::project(
                format!("detected cyclic table dependencies ({nodes})"),
                "remove or redirect one of the foreign keys so every parent table can be generated before its children",
            ),
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.diagnostic().fmt(f)
    }
}

impl std::error::Error for CycleError {}

/// A table and its FK depth. Stage 0 tables have no parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStage {
    pub table: String,
    pub stage: u32,
}

/// Order a table's columns so every column follows the columns it depends on.
///
/// Ties keep the authored column order. References to unknown columns are ignored
/// here; the validator reports them.
pub fn order_columns(table: &TableSpec) -> Result<Vec<&ColumnSpec>, CycleError> {
    let index: BTreeMap<&str, usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name.as_str(), idx))
        .collect();

    let mut edges = Vec::new();
    for (idx, column) in table.columns.iter().enumerate() {
        for dependency in &column.depends_on {
            if let Some(&source) = index.get(dependency.as_str()) {
                edges.push((source, idx));
            }
        }
    }

    match toposort(table.columns.len(), &edges) {
        Ok(order) => Ok(order.into_iter().map(|idx| &table.columns[idx]).collect()),
        Err(nodes) => Err(CycleError {
            scope: CycleScope::Columns {
                table: table.name.clone(),
            },
            nodes: nodes
                .into_iter()
                .map(|idx| table.columns[idx].name.clone())
                .collect(),
        }),
    }
}

/// Order tables parent-first along foreign keys. Ties keep the authored table order.
pub fn order_tables(project: &Project) -> Result<Vec<&TableSpec>, CycleError> {
    let all: Vec<usize> = (0..project.tables.len()).collect();
    let order = order_subset(project, &all)?;
    Ok(order.into_iter().map(|idx| &project.tables[idx]).collect())
}

/// Compute FK stages for `selected` tables (all tables when `None`).
///
/// Only edges between tables of the selection count. Results are in generation order.
pub fn table_stages(
    project: &Project,
    selected: Option<&BTreeSet<String>>,
) -> Result<Vec<TableStage>, CycleError> {
    let members: Vec<usize> = project
        .tables
        .iter()
        .enumerate()
        .filter(|(_, table)| selected.is_none_or(|set| set.contains(&table.name)))
        .map(|(idx, _)| idx)
        .collect();

    let order = order_subset(project, &members)?;
    let mut stages: BTreeMap<&str, u32> = BTreeMap::new();
    let mut out = Vec::with_capacity(order.len());

    for idx in order {
        let table = &project.tables[idx];
        let stage = project
            .relationships_in(&table.name)
            .filter_map(|rel| stages.get(rel.parent_table.as_str()))
            .map(|parent_stage| parent_stage + 1)
            .max()
            .unwrap_or(0);
        stages.insert(table.name.as_str(), stage);
        out.push(TableStage {
            table: table.name.clone(),
            stage,
        });
    }

    Ok(out)
}

fn order_subset(project: &Project, members: &[usize]) -> Result<Vec<usize>, CycleError> {
    let local: BTreeMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(local, &idx)| (project.tables[idx].name.as_str(), local))
        .collect();

    let edges: Vec<(usize, usize)> = project
        .relationships
        .iter()
        .filter_map(|rel| {
            let parent = local.get(rel.parent_table.as_str())?;
            let child = local.get(rel.child_table.as_str())?;
            Some((*parent, *child))
        })
        .collect();

    match toposort(members.len(), &edges) {
        Ok(order) => Ok(order.into_iter().map(|local| members[local]).collect()),
        Err(nodes) => Err(CycleError {
            scope: CycleScope::Tables,
            nodes: nodes
                .into_iter()
                .map(|local| project.tables[members[local]].name.clone())
                .collect(),
        }),
    }
}

/// Kahn's algorithm over `0..nodes`; the ready set yields the lowest index first.
fn toposort(nodes: usize, edges: &[(usize, usize)]) -> Result<Vec<usize>, Vec<usize>> {
    let mut indegree = vec![0_usize; nodes];
    let mut targets: Vec<Vec<usize>> = vec![Vec::new(); nodes];

    for &(source, target) in edges {
        targets[source].push(target);
        indegree[target] += 1;
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter_map(|(idx, count)| if *count == 0 { Some(idx) } else { None })
        .collect();

    let mut order = Vec::with_capacity(nodes);
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &target in &targets[node] {
            indegree[target] = indegree[target].saturating_sub(1);
            if indegree[target] == 0 {
                ready.insert(target);
            }
        }
    }

    if order.len() == nodes {
        return Ok(order);
    }

    // Drop nodes that only hang off a cycle so the report names the cycle itself.
    let mut remaining: BTreeSet<usize> = (0..nodes).filter(|idx| indegree[*idx] > 0).collect();
    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|node| !targets[*node].iter().any(|t| remaining.contains(t)))
            .collect();
        if sinks.is_empty() {
            break;
        }
        for node in sinks {
            remaining.remove(&node);
        }
    }

    Err(remaining.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Relationship, ScdMode};

    fn table(name: &str, columns: Vec<ColumnSpec>) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            row_count: Some(10),
            business_key_unique_count: None,
            columns,
            business_key: Vec::new(),
            business_key_static_columns: Vec::new(),
            business_key_changing_columns: Vec::new(),
            scd_mode: ScdMode::None,
            scd_tracked_columns: Vec::new(),
            scd_active_from_column: None,
            scd_active_to_column: None,
        }
    }

    fn column(name: &str, depends_on: &[&str]) -> ColumnSpec {
        let mut column = ColumnSpec::new(name, DataType::Int);
        column.depends_on = depends_on.iter().map(|dep| dep.to_string()).collect();
        column
    }

    fn fk(child: &str, parent: &str) -> Relationship {
        Relationship {
            child_table: child.to_string(),
            child_column: format!("{parent}_id"),
            parent_table: parent.to_string(),
            parent_column: "id".to_string(),
            min_children: 1,
            max_children: 3,
        }
    }

    fn project(tables: &[&str], relationships: Vec<Relationship>) -> Project {
        Project {
            name: "graph".to_string(),
            seed: 1,
            tables: tables
                .iter()
                .map(|name| table(name, vec![column("id", &[])]))
                .collect(),
            relationships,
        }
    }

    fn names(columns: &[&ColumnSpec]) -> Vec<String> {
        columns.iter().map(|column| column.name.clone()).collect()
    }

    #[test]
    fn columns_follow_dependencies_and_keep_authored_order() {
        let spec = table(
            "people",
            vec![
                column("salary", &["age"]),
                column("id", &[]),
                column("age", &[]),
                column("band", &["salary"]),
            ],
        );
        let order = order_columns(&spec).expect("acyclic");
        assert_eq!(names(&order), vec!["id", "age", "salary", "band"]);
    }

    #[test]
    fn column_cycle_names_only_cycle_members() {
        let spec = table(
            "people",
            vec![
                column("a", &["b"]),
                column("b", &["a"]),
                column("c", &["a"]),
                column("d", &[]),
            ],
        );
        let err = order_columns(&spec).expect_err("cycle");
        assert_eq!(err.nodes, vec!["a".to_string(), "b".to_string()]);
        assert!(err.to_string().starts_with("Table 'people': detected cyclic column dependencies (a, b)."));
        assert!(err.to_string().contains("Fix:"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let spec = table("t", vec![column("a", &["a"])]);
        assert!(order_columns(&spec).is_err());
    }

    #[test]
    fn tables_are_ordered_parent_first() {
        let project = project(
            &["orders", "customers", "items"],
            vec![fk("orders", "customers"), fk("items", "orders")],
        );
        let order: Vec<&str> = order_tables(&project)
            .expect("acyclic")
            .into_iter()
            .map(|table| table.name.as_str())
            .collect();
        assert_eq!(order, vec!["customers", "orders", "items"]);
    }

    #[test]
    fn table_cycle_is_reported_with_hint() {
        let project = project(&["a", "b", "c"], vec![fk("a", "b"), fk("b", "a"), fk("c", "a")]);
        let err = order_tables(&project).expect_err("cycle");
        assert_eq!(err.scope, CycleScope::Tables);
        assert_eq!(err.nodes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            err.diagnostic().issue,
            "detected cyclic table dependencies (a, b)"
        );
    }

    #[test]
    fn stages_follow_longest_parent_path() {
        let project = project(
            &["customers", "products", "orders", "order_items"],
            vec![
                fk("orders", "customers"),
                fk("order_items", "orders"),
                fk("order_items", "products"),
            ],
        );
        let stages = table_stages(&project, None).expect("acyclic");
        let lookup: BTreeMap<&str, u32> = stages
            .iter()
            .map(|stage| (stage.table.as_str(), stage.stage))
            .collect();
        assert_eq!(lookup["customers"], 0);
        assert_eq!(lookup["products"], 0);
        assert_eq!(lookup["orders"], 1);
        assert_eq!(lookup["order_items"], 2);
    }

    #[test]
    fn stages_only_count_selected_tables() {
        let project = project(&["a", "b"], vec![fk("b", "a")]);
        let selected: BTreeSet<String> = ["b".to_string()].into_iter().collect();
        let stages = table_stages(&project, Some(&selected)).expect("acyclic");
        assert_eq!(
            stages,
            vec![TableStage {
                table: "b".to_string(),
                stage: 0
            }]
        );
    }
}
