use serde::{Deserialize, Serialize};

use crate::strategy::ExecutionStrategy;

/// What a run did, for logs and CLI output. Every counter the error policy
/// promises is here: pairs considered/accepted, the two drop reasons, the
/// ceiling truncation, and per-batch commit outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub strategy: Option<ExecutionStrategy>,
    pub line_items_considered: i64,
    pub pairs_considered: u64,
    pub pairs_accepted: u64,
    pub pairs_dropped_by_cap: u64,
    pub pairs_dropped_missing_metadata: u64,
    pub pairs_truncated: u64,
    pub batches_committed: u32,
    pub batches_failed: u32,
    pub associations_written: u64,
    pub associations_pruned: u64,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self { run_id: run_id.into(), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use crate::strategy::ExecutionStrategy;

    use super::RunReport;

    #[test]
    fn report_serializes_strategy_under_its_cli_name() {
        let mut report = RunReport::new("run-1");
        report.strategy = Some(ExecutionStrategy::IncrementalBatched);
        report.pairs_accepted = 12;

        let json = serde_json::to_value(&report).expect("serializable report");

        assert_eq!(json["strategy"], ExecutionStrategy::IncrementalBatched.as_str());
        assert_eq!(json["pairs_accepted"], 12);
        assert_eq!(json["run_id"], "run-1");
    }
}
