use basketry_core::config::AppConfig;
use basketry_db::repositories::SqlInsightReporter;

use super::{open_database, with_runtime, CommandResult};

pub fn run(config: &AppConfig, top: i64) -> CommandResult {
    with_runtime("insights", || async {
        let pool = match open_database("insights", config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };

        let reporter = SqlInsightReporter::new(pool.clone());
        let outcome = reporter.report(top.max(1)).await;
        pool.close().await;

        match outcome {
            Ok(report) => match serde_json::to_value(&report) {
                Ok(data) => CommandResult::success_with_data(
                    "insights",
                    format!("top {} association insights", top.max(1)),
                    data,
                ),
                Err(error) => {
                    CommandResult::failure("insights", "serialization", error.to_string(), 6)
                }
            },
            Err(error) => {
                CommandResult::failure("insights", "store_unavailable", error.to_string(), 6)
            }
        }
    })
}
