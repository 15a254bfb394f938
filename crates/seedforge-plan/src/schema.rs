use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::ledger::LedgerDocument;
use crate::model::PartitionPlan;

/// JSON Schema for a serialized partition plan.
pub fn plan_json_schema() -> RootSchema {
    schema_for!(PartitionPlan)
}

/// JSON Schema for the run ledger file.
pub fn ledger_json_schema() -> RootSchema {
    schema_for!(LedgerDocument)
}
