use std::collections::{BTreeMap, BTreeSet};

use seedforge_core::{
    ColumnSpec, DataType, Diagnostic, Project, Relationship, ScdMode, TableSpec, order_columns,
    order_tables,
};

use crate::generators::{GeneratorConfig, GeneratorRegistry, generator_id_for};

/// How the engine fills a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// `pk_offset + row_number`.
    PrimaryKey,
    /// Parent key from the relationship at this index of `Project::relationships`.
    ForeignKey(usize),
    /// Business key or static column, fixed per entity.
    Identity,
    PeriodFrom,
    PeriodTo,
    /// Tracked or changing column, or a column derived from one; varies per version.
    Tracked,
    /// Any other column.
    Attribute,
}

#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub name: String,
    pub dtype: DataType,
    pub role: ColumnRole,
    /// Registry id; `None` for columns the engine assigns itself.
    pub generator: Option<String>,
    pub config: Option<GeneratorConfig>,
    pub nullable: bool,
    pub null_rate: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnPlan {
    /// Whether the null draw applies to this column.
    pub fn may_be_null(&self) -> bool {
        self.nullable && matches!(self.role, ColumnRole::Tracked | ColumnRole::Attribute)
    }
}

#[derive(Debug, Clone)]
pub struct TablePlan {
    pub name: String,
    /// Column indexes in generation order.
    pub order: Vec<usize>,
    /// Schema order.
    pub columns: Vec<ColumnPlan>,
}

impl TablePlan {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// A project that passed validation, with every generator configuration resolved.
#[derive(Debug, Clone)]
pub struct ValidatedProject {
    project: Project,
    tables: Vec<TablePlan>,
}

impl ValidatedProject {
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Table plans in schema order.
    pub fn tables(&self) -> &[TablePlan] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Every column plan with its table and column names.
    pub fn column_plans(&self) -> impl Iterator<Item = (&str, &str, &ColumnPlan)> + '_ {
        self.tables.iter().flat_map(|table| {
            table
                .columns
                .iter()
                .map(move |column| (table.name.as_str(), column.name.as_str(), column))
        })
    }
}

/// Check a project; an empty list means it can be generated.
pub fn validate(project: &Project, registry: &GeneratorRegistry) -> Vec<Diagnostic> {
    match analyze(project, registry) {
        Ok(_) => Vec::new(),
        Err(diagnostics) => diagnostics,
    }
}

/// Validate `project` and resolve its per-column plans.
pub fn analyze(
    project: &Project,
    registry: &GeneratorRegistry,
) -> Result<ValidatedProject, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();

    validate_project_shape(project, &mut diagnostics);
    let unique_tables = unique_table_names(project, &mut diagnostics);

    let mut tables = Vec::with_capacity(project.tables.len());
    for table in &project.tables {
        if let Some(plan) = validate_table(project, table, registry, &mut diagnostics) {
            tables.push(plan);
        }
    }

    validate_relationships(project, &mut diagnostics);
    if unique_tables
        && let Err(cycle) = order_tables(project)
    {
        diagnostics.push(cycle.diagnostic());
    }

    if diagnostics.is_empty() {
        Ok(ValidatedProject {
            project: project.clone(),
            tables,
        })
    } else {
        Err(diagnostics)
    }
}

fn validate_project_shape(project: &Project, diagnostics: &mut Vec<Diagnostic>) {
    if project.name.trim().is_empty() {
        diagnostics.push(Diagnostic::project(
            "project name cannot be empty",
            "set a non-empty project name",
        ));
    }
    if project.tables.is_empty() {
        diagnostics.push(Diagnostic::project(
            "project must include at least one table",
            "add a table with a primary key column",
        ));
    }
}

fn unique_table_names(project: &Project, diagnostics: &mut Vec<Diagnostic>) -> bool {
    let mut seen = BTreeSet::new();
    let mut ok = true;
    for table in &project.tables {
        let name = table.name.trim();
        if name.is_empty() {
            diagnostics.push(Diagnostic::project(
                "all tables must have a non-empty name",
                "name every table",
            ));
            ok = false;
        } else if !seen.insert(name) {
            diagnostics.push(Diagnostic::project(
                format!("table name '{name}' is used more than once"),
                "give every table a unique name",
            ));
            ok = false;
        }
    }
    ok
}

fn validate_table(
    project: &Project,
    table: &TableSpec,
    registry: &GeneratorRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<TablePlan> {
    let before = diagnostics.len();
    let name = table.name.as_str();

    if table.columns.is_empty() {
        diagnostics.push(Diagnostic::table(
            name,
            "must have at least one column",
            "add a primary key column",
        ));
        return None;
    }

    let mut seen = BTreeSet::new();
    for column in &table.columns {
        if column.name.trim().is_empty() {
            diagnostics.push(Diagnostic::table(
                name,
                "all column names must be non-empty",
                "name every column",
            ));
        } else if !seen.insert(column.name.as_str()) {
            diagnostics.push(Diagnostic::table(
                name,
                format!("column name '{}' is used more than once", column.name),
                "give every column a unique name",
            ));
        }
    }
    if diagnostics.len() > before {
        return None;
    }

    validate_primary_key(table, diagnostics);
    if table.row_count == Some(0) {
        diagnostics.push(Diagnostic::table(
            name,
            "row_count must be > 0",
            "set row_count to 1 or more, or omit it on child tables",
        ));
    }

    let fk_columns: BTreeMap<&str, usize> = project
        .relationships
        .iter()
        .enumerate()
        .filter(|(_, rel)| rel.child_table == name)
        .map(|(idx, rel)| (rel.child_column.as_str(), idx))
        .collect();

    validate_business_key(table, &fk_columns, diagnostics);
    validate_scd(table, diagnostics);
    validate_unique_count(table, diagnostics);

    for column in &table.columns {
        validate_dependencies(table, column, diagnostics);
        validate_constraints(table, column, diagnostics);
    }
    validate_identity_dependencies(table, diagnostics);

    let order = match order_columns(table) {
        Ok(order) => order
            .into_iter()
            .filter_map(|column| table.column_index(&column.name))
            .collect(),
        Err(cycle) => {
            diagnostics.push(cycle.diagnostic());
            Vec::new()
        }
    };

    let tracked = tracked_closure(table);
    let mut columns = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        let role = column_role(table, column, &fk_columns, &tracked);
        columns.push(plan_column(table, column, role, registry, diagnostics));
    }

    if diagnostics.len() > before {
        return None;
    }
    Some(TablePlan {
        name: table.name.clone(),
        order,
        columns,
    })
}

fn validate_primary_key(table: &TableSpec, diagnostics: &mut Vec<Diagnostic>) {
    let keys: Vec<&ColumnSpec> = table.columns.iter().filter(|c| c.primary_key).collect();
    match keys.as_slice() {
        [] => diagnostics.push(Diagnostic::table(
            &table.name,
            "must have a primary key column",
            "mark one int column with primary_key=true",
        )),
        [key] => {
            if key.dtype != DataType::Int {
                diagnostics.push(Diagnostic::column(
                    &table.name,
                    &key.name,
                    format!("primary key must be dtype int, found {}", key.dtype),
                    "use dtype='int' for the primary key",
                ));
            }
            if !key.depends_on.is_empty() {
                diagnostics.push(Diagnostic::column(
                    &table.name,
                    &key.name,
                    "primary key cannot use depends_on",
                    "remove depends_on from the primary key; its values are assigned sequentially",
                ));
            }
            if key.generator.is_some() {
                diagnostics.push(Diagnostic::column(
                    &table.name,
                    &key.name,
                    "primary key values are assigned by the engine",
                    "remove generator from the primary key column",
                ));
            }
        }
        _ => diagnostics.push(Diagnostic::table(
            &table.name,
            "only one primary key column is supported",
            "keep primary_key=true on a single column",
        )),
    }
}

fn validate_business_key(
    table: &TableSpec,
    fk_columns: &BTreeMap<&str, usize>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let name = table.name.as_str();
    for key in &table.business_key {
        let Some(column) = table.column(key) else {
            diagnostics.push(Diagnostic::table(
                name,
                format!("business_key column '{key}' not found"),
                "use existing column names in business_key",
            ));
            continue;
        };
        if column.nullable {
            diagnostics.push(Diagnostic::column(
                name,
                key,
                "business_key columns must be non-nullable",
                "set nullable=false for business_key columns",
            ));
        }
        if column.dtype == DataType::Bool || column.dtype == DataType::Bytes {
            diagnostics.push(Diagnostic::column(
                name,
                key,
                format!("dtype '{}' is not supported for business_key", column.dtype),
                "use a stable business identifier column with dtype int/text/decimal/date/datetime",
            ));
        }
        if fk_columns.contains_key(key.as_str()) {
            diagnostics.push(Diagnostic::column(
                name,
                key,
                "business_key cannot use incoming FK child column",
                "choose non-FK columns for business_key on child tables",
            ));
        }
        if column.primary_key {
            diagnostics.push(Diagnostic::column(
                name,
                key,
                "business_key cannot include the primary key",
                "use a natural identifier column for business_key",
            ));
        }
    }

    let lists = [
        ("business_key_static_columns", &table.business_key_static_columns),
        ("business_key_changing_columns", &table.business_key_changing_columns),
    ];
    for (field, list) in lists {
        if !list.is_empty() && !table.has_business_key() {
            diagnostics.push(Diagnostic::table(
                name,
                format!("{field} requires business_key"),
                format!("define business_key or remove {field}"),
            ));
        }
        for column in list {
            if table.column(column).is_none() {
                diagnostics.push(Diagnostic::table(
                    name,
                    format!("{field} includes unknown column '{column}'"),
                    format!("use existing column names in {field}"),
                ));
            } else if table.business_key.contains(column) {
                diagnostics.push(Diagnostic::column(
                    name,
                    column,
                    format!("business_key columns cannot be listed in {field}"),
                    format!("remove '{column}' from {field}"),
                ));
            } else if fk_columns.contains_key(column.as_str())
                || table.column(column).is_some_and(|spec| spec.primary_key)
            {
                diagnostics.push(Diagnostic::column(
                    name,
                    column,
                    format!("{field} cannot include key columns"),
                    format!("remove '{column}' from {field}"),
                ));
            }
        }
    }
    for column in &table.business_key_static_columns {
        if table.business_key_changing_columns.contains(column) {
            diagnostics.push(Diagnostic::column(
                name,
                column,
                "column is listed as both static and changing",
                "keep the column in only one of business_key_static_columns and business_key_changing_columns",
            ));
        }
    }
}

fn validate_scd(table: &TableSpec, diagnostics: &mut Vec<Diagnostic>) {
    let name = table.name.as_str();
    let has_scd_fields = !table.scd_tracked_columns.is_empty()
        || table.scd_active_from_column.is_some()
        || table.scd_active_to_column.is_some();

    let mode = table.scd_mode;
    if mode == ScdMode::None {
        if has_scd_fields {
            diagnostics.push(Diagnostic::table(
                name,
                "SCD fields provided without scd_mode",
                "set scd_mode='scd1' or scd_mode='scd2', or remove SCD fields",
            ));
        }
        return;
    }

    let label = mode.as_str();
    if !table.has_business_key() {
        diagnostics.push(Diagnostic::table(
            name,
            format!("scd_mode='{label}' requires business_key"),
            "define business_key columns before enabling SCD",
        ));
    }
    if table.scd_change_columns().is_empty() {
        diagnostics.push(Diagnostic::table(
            name,
            format!("scd_mode='{label}' requires non-empty scd_tracked_columns"),
            "provide one or more existing column names in scd_tracked_columns or business_key_changing_columns",
        ));
    }
    for tracked in &table.scd_tracked_columns {
        match table.column(tracked) {
            None => diagnostics.push(Diagnostic::table(
                name,
                format!("scd_tracked_columns includes unknown column '{tracked}'"),
                "use existing column names in scd_tracked_columns",
            )),
            Some(_) if table.is_identity_column(tracked) => {
                diagnostics.push(Diagnostic::column(
                    name,
                    tracked,
                    "business_key and static columns cannot be in scd_tracked_columns",
                    "track non-business-key columns for SCD changes",
                ));
            }
            Some(column) if column.primary_key || table.is_scd_period_column(tracked) => {
                diagnostics.push(Diagnostic::column(
                    name,
                    tracked,
                    "key and active period columns cannot be tracked",
                    "track attribute columns for SCD changes",
                ));
            }
            Some(_) => {}
        }
    }

    let from = table.scd_active_from_column.as_deref();
    let to = table.scd_active_to_column.as_deref();
    let upper = label.to_ascii_uppercase();
    match (from, to) {
        (None, None) if mode == ScdMode::Scd2 => diagnostics.push(Diagnostic::table(
            name,
            "scd_mode='scd2' requires scd_active_from_column and scd_active_to_column",
            "set both columns to existing date or datetime columns",
        )),
        (None, None) => {}
        (Some(from), Some(to)) => {
            let (Some(from_spec), Some(to_spec)) = (table.column(from), table.column(to)) else {
                diagnostics.push(Diagnostic::table(
                    name,
                    format!("{upper} active period columns not found"),
                    "set scd_active_from_column/scd_active_to_column to existing columns",
                ));
                return;
            };
            if from == to {
                diagnostics.push(Diagnostic::table(
                    name,
                    format!("{upper} active period columns must be different columns"),
                    "use separate columns for scd_active_from_column and scd_active_to_column",
                ));
            }
            if !from_spec.dtype.is_temporal() || !to_spec.dtype.is_temporal() {
                diagnostics.push(Diagnostic::table(
                    name,
                    format!("{upper} active period columns must be dtype date or datetime"),
                    "use date/datetime columns for scd_active_from_column and scd_active_to_column",
                ));
            } else if from_spec.dtype != to_spec.dtype {
                diagnostics.push(Diagnostic::table(
                    name,
                    format!("{upper} active period column dtypes must match"),
                    "use the same dtype for scd_active_from_column and scd_active_to_column",
                ));
            }
            if table.is_identity_column(from) || table.is_identity_column(to) {
                diagnostics.push(Diagnostic::table(
                    name,
                    format!("{upper} active period columns cannot be business key or static columns"),
                    "use dedicated columns for the active period",
                ));
            }
        }
        _ => diagnostics.push(Diagnostic::table(
            name,
            format!("{upper} active period columns must be configured together"),
            "set both scd_active_from_column and scd_active_to_column, or omit both",
        )),
    }
}

fn validate_unique_count(table: &TableSpec, diagnostics: &mut Vec<Diagnostic>) {
    let Some(unique) = table.business_key_unique_count else {
        return;
    };
    let name = table.name.as_str();
    if !table.has_business_key() {
        diagnostics.push(Diagnostic::table(
            name,
            "business_key_unique_count requires business_key",
            "define business_key or remove business_key_unique_count",
        ));
    }
    if unique == 0 {
        diagnostics.push(Diagnostic::table(
            name,
            "business_key_unique_count must be > 0",
            "set business_key_unique_count to 1 or more",
        ));
        return;
    }
    if let Some(rows) = table.row_count {
        if unique > rows {
            diagnostics.push(Diagnostic::table(
                name,
                format!("business_key_unique_count ({unique}) cannot exceed row_count ({rows})"),
                "lower business_key_unique_count or raise row_count",
            ));
        } else if table.scd_mode == ScdMode::Scd1 && unique != rows {
            diagnostics.push(Diagnostic::table(
                name,
                format!(
                    "scd_mode='scd1' keeps one row per business key, so business_key_unique_count ({unique}) must equal row_count ({rows})"
                ),
                "set business_key_unique_count equal to row_count or use scd_mode='scd2'",
            ));
        }
    }
}

fn validate_dependencies(table: &TableSpec, column: &ColumnSpec, diagnostics: &mut Vec<Diagnostic>) {
    for dependency in &column.depends_on {
        if dependency == &column.name {
            diagnostics.push(Diagnostic::column(
                &table.name,
                &column.name,
                "column cannot depend on itself",
                format!("remove '{dependency}' from depends_on"),
            ));
        } else if table.column(dependency).is_none() {
            diagnostics.push(Diagnostic::column(
                &table.name,
                &column.name,
                format!("depends_on references unknown column '{dependency}'"),
                "use existing column names of the same table in depends_on",
            ));
        }
    }
}

fn validate_constraints(table: &TableSpec, column: &ColumnSpec, diagnostics: &mut Vec<Diagnostic>) {
    let constraints = &column.constraints;
    let mut push = |issue: String, hint: &str| {
        diagnostics.push(Diagnostic::column(&table.name, &column.name, issue, hint));
    };

    if let (Some(min), Some(max)) = (constraints.min, constraints.max)
        && min > max
    {
        push(
            format!("constraints.min ({min}) cannot exceed constraints.max ({max})"),
            "set constraints.min <= constraints.max",
        );
    }
    if (constraints.min.is_some() || constraints.max.is_some()) && !column.dtype.is_numeric() {
        push(
            format!("constraints.min/max do not apply to dtype {}", column.dtype),
            "remove constraints.min/max or use a numeric dtype",
        );
    }
    if let (Some(min), Some(max)) = (constraints.min_length, constraints.max_length)
        && min > max
    {
        push(
            format!("constraints.min_length ({min}) cannot exceed constraints.max_length ({max})"),
            "set constraints.min_length <= constraints.max_length",
        );
    }
    if let Some(choices) = &constraints.choices {
        if choices.is_empty() {
            push("choices cannot be empty".to_string(), "list at least one choice or remove choices");
        }
        if column.dtype == DataType::Bytes {
            push(
                "bytes columns cannot use choices".to_string(),
                "remove choices from the bytes column",
            );
        }
    }
    if let Some(weights) = &constraints.weights {
        match &constraints.choices {
            None => push(
                "weights require choices".to_string(),
                "add choices or remove weights",
            ),
            Some(choices) if choices.len() != weights.len() => push(
                format!(
                    "weights length ({}) must match choices length ({})",
                    weights.len(),
                    choices.len()
                ),
                "provide one weight per choice",
            ),
            Some(_) => {}
        }
        if weights.iter().any(|weight| *weight < 0.0 || !weight.is_finite())
            || !weights.iter().any(|weight| *weight > 0.0)
        {
            push(
                "weights must be non-negative with at least one value > 0".to_string(),
                "set at least one positive weight",
            );
        }
    }
    if let Some(rate) = constraints.null_rate
        && !(0.0..=1.0).contains(&rate)
    {
        push(
            format!("constraints.null_rate ({rate}) must be between 0 and 1"),
            "set constraints.null_rate within 0..=1",
        );
    }
    if let Some(pattern) = &constraints.pattern
        && let Err(err) = regex::Regex::new(pattern)
    {
        push(
            format!("constraints.pattern does not compile: {err}"),
            "use a valid regular expression",
        );
    }
}

/// Identity columns are generated once per entity, before any per-row value exists.
fn validate_identity_dependencies(table: &TableSpec, diagnostics: &mut Vec<Diagnostic>) {
    let entity_scoped = table
        .columns
        .iter()
        .filter(|column| {
            table.is_identity_column(&column.name)
                || table.scd_active_from_column.as_deref() == Some(column.name.as_str())
        });
    for column in entity_scoped {
        for dependency in &column.depends_on {
            if table.column(dependency).is_some() && !table.is_identity_column(dependency) {
                diagnostics.push(Diagnostic::column(
                    &table.name,
                    &column.name,
                    format!(
                        "entity-level column cannot depend on per-row column '{dependency}'"
                    ),
                    "depend only on business_key or business_key_static_columns",
                ));
            }
        }
    }
}

fn validate_relationships(project: &Project, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen = BTreeSet::new();
    for rel in &project.relationships {
        validate_relationship(project, rel, diagnostics);
        if !seen.insert((rel.child_table.as_str(), rel.child_column.as_str())) {
            diagnostics.push(Diagnostic::relationship(
                rel,
                "child column already has a foreign key",
                "keep one foreign key per child column",
            ));
        }
    }
}

fn validate_relationship(project: &Project, rel: &Relationship, diagnostics: &mut Vec<Diagnostic>) {
    let Some(child) = project.table(&rel.child_table) else {
        diagnostics.push(Diagnostic::relationship(
            rel,
            format!("child_table '{}' not found", rel.child_table),
            "use an existing table name for child_table",
        ));
        return;
    };
    let Some(parent) = project.table(&rel.parent_table) else {
        diagnostics.push(Diagnostic::relationship(
            rel,
            format!("parent_table '{}' not found", rel.parent_table),
            "use an existing table name for parent_table",
        ));
        return;
    };

    match child.column(&rel.child_column) {
        None => diagnostics.push(Diagnostic::relationship(
            rel,
            format!("child_column '{}' not found", rel.child_column),
            "use an existing child column",
        )),
        Some(column) => {
            if column.dtype != DataType::Int {
                diagnostics.push(Diagnostic::relationship(
                    rel,
                    "child FK column must be dtype int",
                    "use dtype='int' for FK child columns",
                ));
            }
            if column.primary_key {
                diagnostics.push(Diagnostic::relationship(
                    rel,
                    "child FK column cannot be the child primary key",
                    "add a separate int column for the foreign key",
                ));
            }
            if column.generator.is_some() {
                diagnostics.push(Diagnostic::relationship(
                    rel,
                    "foreign key values are assigned from the parent table",
                    "remove generator from the FK child column",
                ));
            }
        }
    }
    match parent.column(&rel.parent_column) {
        None => diagnostics.push(Diagnostic::relationship(
            rel,
            format!("parent_column '{}' not found", rel.parent_column),
            "use an existing parent column",
        )),
        Some(column) if !column.primary_key => diagnostics.push(Diagnostic::relationship(
            rel,
            format!(
                "parent column '{}.{}' must be primary key",
                rel.parent_table, rel.parent_column
            ),
            "reference the parent table primary key column",
        )),
        Some(_) => {}
    }

    if rel.min_children == 0 || rel.max_children == 0 {
        diagnostics.push(Diagnostic::relationship(
            rel,
            "min_children and max_children must be > 0",
            "set positive integer bounds",
        ));
    } else if rel.min_children > rel.max_children {
        diagnostics.push(Diagnostic::relationship(
            rel,
            "min_children cannot exceed max_children",
            "set min_children <= max_children",
        ));
    }
}

/// Tracked and changing columns plus everything that depends on them, transitively.
fn tracked_closure(table: &TableSpec) -> BTreeSet<String> {
    let mut closure: BTreeSet<String> = if table.scd_mode == ScdMode::None {
        BTreeSet::new()
    } else {
        table
            .scd_change_columns()
            .into_iter()
            .map(str::to_string)
            .collect()
    };
    if closure.is_empty() {
        return closure;
    }
    loop {
        let before = closure.len();
        for column in &table.columns {
            if column.depends_on.iter().any(|dep| closure.contains(dep)) {
                closure.insert(column.name.clone());
            }
        }
        if closure.len() == before {
            return closure;
        }
    }
}

fn column_role(
    table: &TableSpec,
    column: &ColumnSpec,
    fk_columns: &BTreeMap<&str, usize>,
    tracked: &BTreeSet<String>,
) -> ColumnRole {
    let name = column.name.as_str();
    if column.primary_key {
        ColumnRole::PrimaryKey
    } else if let Some(idx) = fk_columns.get(name) {
        ColumnRole::ForeignKey(*idx)
    } else if table.is_identity_column(name) {
        ColumnRole::Identity
    } else if table.scd_mode != ScdMode::None
        && table.scd_active_from_column.as_deref() == Some(name)
    {
        ColumnRole::PeriodFrom
    } else if table.scd_mode != ScdMode::None && table.scd_active_to_column.as_deref() == Some(name)
    {
        ColumnRole::PeriodTo
    } else if tracked.contains(name) {
        ColumnRole::Tracked
    } else {
        ColumnRole::Attribute
    }
}

fn plan_column(
    table: &TableSpec,
    column: &ColumnSpec,
    role: ColumnRole,
    registry: &GeneratorRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) -> ColumnPlan {
    let mut plan = ColumnPlan {
        name: column.name.clone(),
        dtype: column.dtype,
        role,
        generator: None,
        config: None,
        nullable: column.nullable,
        null_rate: column.constraints.null_rate,
        min: column.constraints.min,
        max: column.constraints.max,
    };
    if matches!(
        role,
        ColumnRole::PrimaryKey | ColumnRole::ForeignKey(_) | ColumnRole::PeriodTo
    ) {
        return plan;
    }

    let id = generator_id_for(column);
    let Some(generator) = registry.get(id) else {
        let known: Vec<&str> = registry.ids().collect();
        diagnostics.push(Diagnostic::column(
            &table.name,
            &column.name,
            format!("unknown generator '{id}'"),
            format!("use one of: {}", known.join(", ")),
        ));
        return plan;
    };
    if !generator.supports(column.dtype) {
        let compatible: Vec<&str> = registry
            .ids()
            .filter(|candidate| {
                registry
                    .get(candidate)
                    .is_some_and(|generator| generator.supports(column.dtype))
            })
            .collect();
        diagnostics.push(Diagnostic::column(
            &table.name,
            &column.name,
            format!("generator '{id}' does not support dtype '{}'", column.dtype),
            format!(
                "use a generator for {} ({}) or change the dtype",
                column.dtype,
                compatible.join(", ")
            ),
        ));
        return plan;
    }
    match generator.configure(column, table) {
        Ok(config) => {
            plan.generator = Some(id.to_string());
            plan.config = Some(config);
        }
        Err(issue) => diagnostics.push(Diagnostic::column(
            &table.name,
            &column.name,
            format!("generator '{id}' {}", issue.issue),
            issue.hint,
        )),
    }
    plan
}
