use basketry_core::chrono::Utc;
use basketry_core::config::AppConfig;
use basketry_db::{AssociationEngine, EngineError};

use super::{open_database, with_runtime, CommandResult};

pub fn run(config: &AppConfig, max_age_days: Option<u32>) -> CommandResult {
    with_runtime("cleanup-stale", || async {
        let pool = match open_database("cleanup-stale", config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };

        let mut engine_config = config.engine.clone();
        if let Some(max_age_days) = max_age_days {
            engine_config.stale_max_age_days = max_age_days;
        }
        let retention_days = engine_config.stale_max_age_days;

        let engine = AssociationEngine::with_pool(pool.clone(), engine_config);
        let outcome = engine.cleanup_stale(Utc::now()).await;
        pool.close().await;

        match outcome {
            Ok(removed) => CommandResult::success_with_data(
                "cleanup-stale",
                format!("removed {removed} associations older than {retention_days} days"),
                serde_json::json!({ "removed": removed, "max_age_days": retention_days }),
            ),
            Err(EngineError::Configuration(error)) => CommandResult::failure(
                "cleanup-stale",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            ),
            Err(EngineError::Store { source, .. }) => {
                CommandResult::failure("cleanup-stale", "store_unavailable", source.to_string(), 6)
            }
        }
    })
}
