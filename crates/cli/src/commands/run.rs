use basketry_core::chrono::Utc;
use basketry_core::config::AppConfig;
use basketry_db::{AssociationEngine, EngineError};

use super::{open_database, with_runtime, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    with_runtime("run", || async {
        let pool = match open_database("run", config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };

        let engine = AssociationEngine::with_pool(pool.clone(), config.engine.clone());
        let outcome = engine.run(Utc::now()).await;
        pool.close().await;

        match outcome {
            Ok(report) => match serde_json::to_value(&report) {
                Ok(data) => {
                    CommandResult::success_with_data("run", "association run completed", data)
                }
                Err(error) => CommandResult::failure("run", "serialization", error.to_string(), 6),
            },
            Err(EngineError::Configuration(error)) => CommandResult::failure(
                "run",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            ),
            Err(EngineError::Store { source, report }) => {
                let partial_progress =
                    serde_json::to_value(report.as_ref()).unwrap_or(serde_json::Value::Null);
                CommandResult::failure_with_data(
                    "run",
                    "store_unavailable",
                    source.to_string(),
                    partial_progress,
                    6,
                )
            }
        }
    })
}
