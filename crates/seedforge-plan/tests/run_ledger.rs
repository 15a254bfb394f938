use std::fs;
use std::path::PathBuf;

use seedforge_plan::{
    ExecutionMode, JsonFileLedger, LedgerHeader, MemoryLedger, Partition, PartitionState,
    PlanError, RunLedger,
};

fn temp_ledger(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seedforge_ledger_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir.join(name)
}

fn header(fingerprint: &str, seed: u64) -> LedgerHeader {
    LedgerHeader {
        project_name: "shop".to_string(),
        project_seed: seed,
        project_fingerprint: fingerprint.to_string(),
        mode: ExecutionMode::Parallel,
        worker_count: 4,
        selected_tables: vec!["customers".to_string(), "orders".to_string()],
    }
}

#[test]
fn completion_survives_reopen() {
    let path = temp_ledger("run.json");
    let first = Partition::new("customers", 0, 0, 1, 10);
    let second = Partition::new("orders", 1, 0, 1, 25);

    {
        let mut ledger = JsonFileLedger::open_or_create(&path, header("abc", 42)).expect("create");
        assert!(!ledger.is_partition_complete(&first.partition_id));
        ledger.mark_partition_complete(&first, 1).expect("mark");
        ledger
            .mark_partition_failed(&second, 2, "worker crashed")
            .expect("mark failed");
    }

    let reopened = JsonFileLedger::open_or_create(&path, header("abc", 42)).expect("reopen");
    assert!(reopened.is_partition_complete("customers|stage=0|chunk=0"));
    assert!(!reopened.is_partition_complete("orders|stage=1|chunk=0"));

    let entry = &reopened.document().partitions["orders|stage=1|chunk=0"];
    assert_eq!(entry.status, PartitionState::Failed);
    assert_eq!(entry.retry_count, 2);
    assert_eq!(entry.error_message.as_deref(), Some("worker crashed"));
    assert_eq!(reopened.document().completed_count(), 1);
    assert!(!path.with_file_name("run.json.tmp").exists());
}

#[test]
fn different_project_is_refused() {
    let path = temp_ledger("run.json");
    JsonFileLedger::open_or_create(&path, header("abc", 42)).expect("create");

    let err = JsonFileLedger::open_or_create(&path, header("def", 42)).expect_err("fingerprint");
    assert!(matches!(err, PlanError::Mismatch { .. }));
    assert!(err.to_string().contains("Fix: delete the ledger or use the original project."));

    let err = JsonFileLedger::open_or_create(&path, header("abc", 7)).expect_err("seed");
    assert!(err.to_string().contains("ledger seed 42 does not match project seed 7"));
}

#[test]
fn corrupted_ledger_is_rejected() {
    let path = temp_ledger("run.json");
    fs::write(&path, r#"{"project_name": "shop", "partitions": 3}"#).expect("write");

    let err = JsonFileLedger::load(&path).expect_err("schema violation");
    assert!(matches!(err, PlanError::Schema(_)));

    fs::write(&path, "{not json").expect("write");
    let err = JsonFileLedger::load(&path).expect_err("invalid json");
    assert!(matches!(err, PlanError::Json(_)));
}

#[test]
fn memory_ledger_tracks_completion() {
    let mut ledger = MemoryLedger::new();
    let partition = Partition::new("customers", 0, 3, 31, 40);
    ledger.mark_partition_complete(&partition, 1).expect("mark");
    assert!(ledger.is_partition_complete("customers|stage=0|chunk=3"));
    assert_eq!(ledger.completed().collect::<Vec<_>>(), vec!["customers|stage=0|chunk=3"]);
}
