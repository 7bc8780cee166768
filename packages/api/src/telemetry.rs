//! Commission counters
//!
//! Recorded through the `metrics` facade; the server installs the Prometheus
//! recorder. Without a recorder these calls are no-ops.

use matrix_commission::{CalculationOutcome, CalculationResult};

pub const RUNS_TOTAL: &str = "commission_runs_total";
pub const RECORDS_TOTAL: &str = "commission_records_total";

pub fn describe() {
    metrics::describe_counter!(RUNS_TOTAL, "Commission calculations by outcome");
    metrics::describe_counter!(RECORDS_TOTAL, "Commission records written by kind");
}

pub fn record_calculation(result: &CalculationResult) {
    let outcome = match result.outcome {
        CalculationOutcome::Created => "created",
        CalculationOutcome::AlreadyProcessed => "already_processed",
    };
    metrics::counter!(RUNS_TOTAL, "outcome" => outcome).increment(1);

    if result.outcome == CalculationOutcome::Created {
        for record in &result.records {
            metrics::counter!(RECORDS_TOTAL, "kind" => record.kind.as_str()).increment(1);
        }
    }
}

pub fn record_failure() {
    metrics::counter!(RUNS_TOTAL, "outcome" => "failed").increment(1);
}
