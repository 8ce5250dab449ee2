use basketry_core::config::AppConfig;
use basketry_db::{AssociationEngine, EngineError};

use super::{open_database, with_runtime, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    with_runtime("prune", || async {
        let pool = match open_database("prune", config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };

        let engine = AssociationEngine::with_pool(pool.clone(), config.engine.clone());
        let outcome = engine.prune().await;
        pool.close().await;

        match outcome {
            Ok(removed) => CommandResult::success_with_data(
                "prune",
                format!(
                    "removed {removed} associations below support {}",
                    config.engine.min_support
                ),
                serde_json::json!({ "removed": removed }),
            ),
            Err(EngineError::Configuration(error)) => CommandResult::failure(
                "prune",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            ),
            Err(EngineError::Store { source, .. }) => {
                CommandResult::failure("prune", "store_unavailable", source.to_string(), 6)
            }
        }
    })
}
