use std::fs;
use std::path::PathBuf;

use seedforge_core::{
    DataType, Error, Project, ScdMode, load_project, project_fingerprint, project_from_json,
    project_json_schema, save_project,
};

const LEGACY_PROJECT: &str = r#"{
  "name": "legacy_shop",
  "seed": 7,
  "tables": [
    {
      "table_name": "customers",
      "row_count": 5,
      "columns": [
        {"name": "customer_id", "dtype": "int", "nullable": false, "primary_key": true},
        {"name": "score", "dtype": "float", "nullable": false, "min_value": 1.5, "max_value": 9.5},
        {"name": "tier", "dtype": "text", "choices": ["gold", "silver"]},
        {"name": "code", "dtype": "text", "pattern": "[A-Z]{3}", "generator": ""}
      ],
      "business_key": ["code"],
      "scd_mode": "SCD1",
      "scd_tracked_columns": ["tier"]
    },
    {
      "table_name": "orders",
      "columns": [
        {"name": "order_id", "dtype": "int", "nullable": false, "primary_key": true},
        {"name": "customer_id", "dtype": "int", "nullable": false}
      ]
    }
  ],
  "foreign_keys": [
    {
      "child_table": "orders",
      "child_column": "customer_id",
      "parent_table": "customers",
      "parent_column": "customer_id",
      "min_children": 1,
      "max_children": 2
    }
  ]
}"#;

#[test]
fn legacy_document_is_folded_into_model() {
    let project = project_from_json(LEGACY_PROJECT).expect("parse legacy project");

    assert_eq!(project.seed, 7);
    assert_eq!(project.relationships.len(), 1);

    let customers = project.table("customers").expect("customers");
    assert_eq!(customers.scd_mode, ScdMode::Scd1);

    let score = customers.column("score").expect("score");
    assert_eq!(score.dtype, DataType::Float);
    assert!(score.dtype.is_decimal());
    assert_eq!(score.constraints.min, Some(1.5));
    assert_eq!(score.constraints.max, Some(9.5));

    let tier = customers.column("tier").expect("tier");
    assert!(tier.nullable, "nullable defaults to true");
    assert_eq!(
        tier.constraints.choices,
        Some(vec![serde_json::json!("gold"), serde_json::json!("silver")])
    );

    let code = customers.column("code").expect("code");
    assert_eq!(code.generator, None);
    assert_eq!(code.constraints.pattern.as_deref(), Some("[A-Z]{3}"));

    let orders = project.table("orders").expect("orders");
    assert_eq!(orders.row_count, None);
}

#[test]
fn save_then_load_is_lossless() {
    let project = project_from_json(LEGACY_PROJECT).expect("parse legacy project");
    let path = temp_path("roundtrip.json");

    save_project(&path, &project).expect("save project");
    let saved = fs::read_to_string(&path).expect("read saved project");
    assert!(saved.contains("\"dtype\": \"float\""), "legacy dtype keeps its name");
    assert!(!saved.contains("min_value"), "flat fields are saved in canonical form");

    let loaded = load_project(&path).expect("load saved project");
    assert_eq!(project, loaded);
    assert_eq!(
        project_fingerprint(&project).expect("fingerprint"),
        project_fingerprint(&loaded).expect("fingerprint")
    );
}

#[test]
fn semantic_dtype_points_to_generator() {
    let document = r#"{
      "name": "geo",
      "tables": [{"name": "places", "columns": [
        {"name": "id", "dtype": "int", "primary_key": true, "nullable": false},
        {"name": "lat", "dtype": "latitude"}
      ]}]
    }"#;

    let err = project_from_json(document).expect_err("semantic dtype");
    let message = err.to_string();
    assert!(message.starts_with("Table 'places', column 'lat': unsupported dtype 'latitude'."));
    assert!(message.contains("Fix: use dtype='decimal' (or legacy 'float') with generator='latitude'"));
}

#[test]
fn unknown_scd_mode_is_rejected() {
    let document = r#"{
      "name": "bad",
      "tables": [{"name": "dim", "scd_mode": "scd3", "columns": []}]
    }"#;

    match project_from_json(document) {
        Err(Error::InvalidDocument(diagnostic)) => {
            assert_eq!(diagnostic.issue, "unsupported scd_mode 'scd3'");
        }
        other => panic!("expected invalid document, got {other:?}"),
    }
}

#[test]
fn params_must_be_an_object() {
    let document = r#"{
      "name": "bad",
      "tables": [{"name": "t", "columns": [
        {"name": "c", "dtype": "text", "generator": "sample_csv", "params": [1, 2]}
      ]}]
    }"#;

    let err = project_from_json(document).expect_err("params array");
    assert!(err.to_string().contains("generator params must be a JSON object"));
}

#[test]
fn defaults_apply_to_missing_fields() {
    let document = r#"{"name": "minimal", "tables": []}"#;
    let project: Project = project_from_json(document).expect("minimal");
    assert_eq!(project.seed, seedforge_core::DEFAULT_SEED);
    assert!(project.relationships.is_empty());
}

#[test]
fn json_schema_describes_tables() {
    let schema = serde_json::to_value(project_json_schema()).expect("serialize schema");
    let properties = schema
        .get("properties")
        .and_then(|value| value.as_object())
        .expect("properties");
    assert!(properties.contains_key("tables"));
    assert!(properties.contains_key("relationships"));
}

fn temp_path(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("seedforge_core_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir.join(name)
}
