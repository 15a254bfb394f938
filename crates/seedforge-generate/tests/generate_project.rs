use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use seedforge_core::Project;
use seedforge_generate::{
    GenerateOptions, GeneratedValue, GenerationEngine, GenerationError, GeneratorRegistry,
    MemorySink, Row, VersionState,
};
use serde_json::json;

fn project(value: serde_json::Value) -> Project {
    serde_json::from_value(value).expect("parse project")
}

fn generate(project: &Project, options: GenerateOptions) -> MemorySink {
    let registry = GeneratorRegistry::with_builtins();
    let engine = GenerationEngine::new(&registry, options);
    let mut sink = MemorySink::new();
    engine.generate(project, &mut sink).expect("generate");
    sink
}

fn text(row: &Row, column: &str) -> String {
    row.get(column)
        .map(GeneratedValue::render)
        .unwrap_or_else(|| panic!("missing column {column}"))
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seedforge_{name}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn shop() -> Project {
    project(json!({
        "name": "shop",
        "seed": 7,
        "tables": [
            {
                "name": "customers",
                "row_count": 10,
                "columns": [
                    {"name": "id", "dtype": "int", "primary_key": true},
                    {"name": "email", "dtype": "text", "nullable": false, "generator": "regex", "params": {"pattern": "[a-z]{8}@example\\.com"}}
                ]
            },
            {
                "name": "orders",
                "row_count": 25,
                "columns": [
                    {"name": "id", "dtype": "int", "primary_key": true},
                    {"name": "customer_id", "dtype": "int", "nullable": false},
                    {"name": "amount", "dtype": "decimal", "constraints": {"min": 1.0, "max": 500.0}}
                ]
            }
        ],
        "relationships": [{
            "child_table": "orders",
            "child_column": "customer_id",
            "parent_table": "customers",
            "parent_column": "id",
            "min_children": 1,
            "max_children": 3
        }]
    }))
}

#[test]
fn same_seed_produces_identical_rows() {
    let first = generate(&shop(), GenerateOptions::default());
    let second = generate(&shop(), GenerateOptions::default());
    assert_eq!(first.rendered("customers"), second.rendered("customers"));
    assert_eq!(first.rendered("orders"), second.rendered("orders"));

    let mut reseeded = shop();
    reseeded.seed = 8;
    let third = generate(&reseeded, GenerateOptions::default());
    assert_ne!(first.rendered("orders"), third.rendered("orders"));
}

#[test]
fn foreign_keys_respect_child_bounds() {
    let sink = generate(&shop(), GenerateOptions::default());
    let customers = sink.rows("customers");
    let orders = sink.rows("orders");
    assert_eq!(customers.len(), 10);
    assert_eq!(orders.len(), 25);

    let parent_ids: BTreeSet<String> = customers.iter().map(|row| text(row, "id")).collect();
    let mut children: BTreeMap<String, u64> = BTreeMap::new();
    for order in orders {
        let parent = text(order, "customer_id");
        assert!(parent_ids.contains(&parent), "dangling customer_id {parent}");
        *children.entry(parent).or_insert(0) += 1;
    }
    assert_eq!(children.len(), 10, "every customer needs at least one order");
    assert!(children.values().all(|count| (1..=3).contains(count)));
}

#[test]
fn primary_keys_are_sequential() {
    let sink = generate(&shop(), GenerateOptions::default());
    let ids: Vec<String> = sink.rows("orders").iter().map(|row| text(row, "id")).collect();
    let expected: Vec<String> = (1..=25).map(|id| id.to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(
        sink.table("orders").expect("orders").columns,
        vec!["id", "customer_id", "amount"]
    );
}

fn scd2_customers() -> Project {
    project(json!({
        "name": "crm",
        "seed": 42,
        "tables": [{
            "name": "customers",
            "row_count": 4,
            "business_key": ["customer_code"],
            "business_key_unique_count": 2,
            "business_key_static_columns": ["birth_date"],
            "scd_mode": "scd2",
            "scd_tracked_columns": ["segment"],
            "scd_active_from_column": "valid_from",
            "scd_active_to_column": "valid_to",
            "columns": [
                {"name": "id", "dtype": "int", "primary_key": true},
                {"name": "customer_code", "dtype": "text", "nullable": false, "generator": "regex", "params": {"pattern": "CUST-[0-9]{5}"}},
                {"name": "birth_date", "dtype": "date", "nullable": false},
                {"name": "segment", "dtype": "text", "nullable": false, "constraints": {"choices": ["retail", "smb", "enterprise"]}},
                {"name": "valid_from", "dtype": "date"},
                {"name": "valid_to", "dtype": "date"}
            ]
        }]
    }))
}

#[test]
fn scd2_versions_chain_per_business_key() {
    let sink = generate(&scd2_customers(), GenerateOptions::default());
    let rows = sink.rows("customers");
    assert_eq!(rows.len(), 4);

    let mut by_key: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        by_key.entry(text(row, "customer_code")).or_default().push(row);
    }
    assert_eq!(by_key.len(), 2);

    for versions in by_key.values() {
        assert_eq!(versions.len(), 2);
        let (old, new) = (versions[0], versions[1]);
        assert_eq!(old.meta.state, VersionState::Historical);
        assert_eq!(new.meta.state, VersionState::Current);
        assert_eq!(text(old, "birth_date"), text(new, "birth_date"));
        assert_ne!(text(old, "segment"), text(new, "segment"));
        assert!(text(old, "valid_from") < text(new, "valid_from"));
        assert_eq!(text(old, "valid_to"), text(new, "valid_from"));
        assert_eq!(text(new, "valid_to"), "9999-12-31");
    }
}

#[test]
fn scd1_keeps_one_row_per_key() {
    let project = project(json!({
        "name": "crm",
        "seed": 5,
        "tables": [{
            "name": "accounts",
            "row_count": 20,
            "business_key": ["account_no"],
            "business_key_unique_count": 20,
            "scd_mode": "scd1",
            "scd_tracked_columns": ["status"],
            "columns": [
                {"name": "id", "dtype": "int", "primary_key": true},
                {"name": "account_no", "dtype": "int", "nullable": false, "constraints": {"min": 1000, "max": 9999}},
                {"name": "status", "dtype": "text", "nullable": false, "constraints": {"choices": ["open", "frozen", "closed"]}}
            ]
        }]
    }));
    let sink = generate(&project, GenerateOptions::default());
    let rows = sink.rows("accounts");
    let keys: BTreeSet<String> = rows.iter().map(|row| text(row, "account_no")).collect();
    assert_eq!(rows.len(), 20);
    assert_eq!(keys.len(), 20);
    assert!(rows.iter().all(|row| row.meta.state == VersionState::Current));
}

fn cities_project(states: serde_json::Value) -> Project {
    project(json!({
        "name": "geo",
        "seed": 11,
        "tables": [{
            "name": "addresses",
            "row_count": 30,
            "columns": [
                {"name": "id", "dtype": "int", "primary_key": true},
                {"name": "state", "dtype": "text", "nullable": false, "constraints": {"choices": states}},
                {
                    "name": "city",
                    "dtype": "text",
                    "nullable": false,
                    "generator": "sample_csv",
                    "params": {"path": "cities.csv", "column_index": 0, "match_column": "state", "match_column_index": 1},
                    "depends_on": ["state"]
                }
            ]
        }]
    }))
}

fn cities_root() -> PathBuf {
    let dir = temp_dir("cities");
    fs::write(
        dir.join("cities.csv"),
        "city,state\nSeattle,WA\nSpokane,WA\nPortland,OR\n",
    )
    .expect("write cities");
    dir
}

#[test]
fn sample_csv_matches_the_sibling_column() {
    let options = GenerateOptions {
        asset_root: Some(cities_root()),
        ..GenerateOptions::default()
    };
    let sink = generate(&cities_project(json!(["WA", "OR"])), options);
    for row in sink.rows("addresses") {
        let city = text(row, "city");
        match text(row, "state").as_str() {
            "WA" => assert!(city == "Seattle" || city == "Spokane", "{city} is not in WA"),
            "OR" => assert_eq!(city, "Portland"),
            other => panic!("unexpected state {other}"),
        }
    }
}

#[test]
fn sample_csv_without_a_match_fails() {
    let registry = GeneratorRegistry::with_builtins();
    let options = GenerateOptions {
        asset_root: Some(cities_root()),
        ..GenerateOptions::default()
    };
    let engine = GenerationEngine::new(&registry, options);
    let err = engine
        .generate(&cities_project(json!(["TX"])), &mut MemorySink::new())
        .expect_err("no Texas rows");
    assert!(matches!(err, GenerationError::GeneratorParam { .. }));
    let message = err.to_string();
    assert!(message.starts_with("Table 'addresses', column 'city': generator 'sample_csv'"));
    assert!(message.contains("equals 'TX'"));
}

#[test]
fn derived_columns_follow_their_sources() {
    let project = project(json!({
        "name": "catalog",
        "seed": 3,
        "tables": [{
            "name": "items",
            "row_count": 40,
            "columns": [
                {"name": "id", "dtype": "int", "primary_key": true},
                {"name": "category", "dtype": "text", "nullable": false, "constraints": {"choices": ["fruit", "veg"]}},
                {
                    "name": "name",
                    "dtype": "text",
                    "nullable": false,
                    "generator": "hierarchical_category",
                    "params": {"parent_column": "category", "hierarchy": {"fruit": ["apple", "pear"], "veg": ["kale"]}},
                    "depends_on": ["category"]
                },
                {
                    "name": "is_fruit",
                    "dtype": "int",
                    "nullable": false,
                    "generator": "if_then",
                    "params": {"if_column": "category", "value": "fruit", "then_value": 1, "else_value": 0},
                    "depends_on": ["category"]
                },
                {
                    "name": "stage",
                    "dtype": "text",
                    "nullable": false,
                    "generator": "ordered_choice",
                    "params": {"orders": {"funnel": ["lead", "qualified", "won"]}}
                }
            ]
        }]
    }));
    let sink = generate(&project, GenerateOptions::default());
    let rows = sink.rows("items");
    for row in rows {
        let category = text(row, "category");
        let name = text(row, "name");
        if category == "fruit" {
            assert!(name == "apple" || name == "pear");
            assert_eq!(text(row, "is_fruit"), "1");
        } else {
            assert_eq!(name, "kale");
            assert_eq!(text(row, "is_fruit"), "0");
        }
    }
    let stages: Vec<String> = rows.iter().take(4).map(|row| text(row, "stage")).collect();
    assert_eq!(stages, vec!["lead", "qualified", "won", "won"]);
}

#[test]
fn invalid_projects_report_every_problem() {
    let project = project(json!({
        "name": "broken",
        "tables": [
            {"name": "a", "columns": [{"name": "x", "dtype": "int"}]},
            {"name": "b", "columns": [
                {"name": "id", "dtype": "int", "primary_key": true},
                {"name": "y", "dtype": "int", "generator": "no_such_generator"}
            ]}
        ]
    }));
    let registry = GeneratorRegistry::with_builtins();
    let diagnostics = seedforge_generate::validate(&project, &registry);
    assert!(diagnostics.len() >= 2);
    let rendered: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
    assert!(rendered.iter().any(|line| line.starts_with("Table 'a':")));
    assert!(rendered
        .iter()
        .any(|line| line.starts_with("Table 'b', column 'y':") && line.contains("no_such_generator")));
}

#[test]
fn generator_usage_is_reported() {
    let registry = GeneratorRegistry::with_builtins();
    let engine = GenerationEngine::new(&registry, GenerateOptions::default());
    let report = engine
        .generate(&shop(), &mut MemorySink::new())
        .expect("generate");
    assert_eq!(report.rows_generated(), 35);
    assert_eq!(report.generator_usage.get("regex"), Some(&10));
    assert!(report.generator_usage.contains_key("uniform_float"));
    assert_eq!(report.partitions_completed, report.partitions_total);
}

/// Dates chained ten thousand years apart until they leave the calendar.
fn runaway_dates(static_identity: bool) -> Project {
    let mut columns = vec![
        json!({"name": "id", "dtype": "int", "primary_key": true}),
        json!({"name": "code", "dtype": "text", "nullable": false, "generator": "regex", "params": {"pattern": "[A-Z]{6}"}}),
        json!({"name": "d0", "dtype": "date", "nullable": false}),
    ];
    let mut chained = vec!["d0".to_string()];
    for step in 1..30 {
        let base = format!("d{}", step - 1);
        let name = format!("d{step}");
        columns.push(json!({
            "name": name,
            "dtype": "date",
            "nullable": false,
            "generator": "time_offset",
            "params": {"base_column": base, "min_days": 3_652_425, "max_days": 3_652_425},
            "depends_on": [base]
        }));
        chained.push(name);
    }
    let mut table = json!({"name": "events", "row_count": 4, "columns": columns});
    if static_identity {
        table["business_key"] = json!(["code"]);
        table["business_key_static_columns"] = json!(chained);
    }
    project(json!({"name": "calendar", "seed": 11, "tables": [table]}))
}

#[test]
fn dates_past_the_calendar_fail_as_parameter_errors() {
    let registry = GeneratorRegistry::with_builtins();
    for static_identity in [false, true] {
        let project = runaway_dates(static_identity);
        assert!(seedforge_generate::validate(&project, &registry).is_empty());
        let engine = GenerationEngine::new(&registry, GenerateOptions::default());
        let err = engine
            .generate(&project, &mut MemorySink::new())
            .expect_err("dates overflow");
        assert!(
            matches!(err, GenerationError::GeneratorParam { ref generator, .. } if generator == "time_offset"),
            "unexpected error: {err}"
        );
        assert!(err.to_string().contains("leaves the supported date range"));
    }
}
