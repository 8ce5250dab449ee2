use basketry_core::config::AppConfig;
use basketry_db::DemoDataset;

use super::{open_database, with_runtime, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    with_runtime("seed", || async {
        let pool = match open_database("seed", config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };

        let outcome = DemoDataset::load(&pool).await;
        pool.close().await;

        match outcome {
            Ok(summary) => match serde_json::to_value(&summary) {
                Ok(data) => CommandResult::success_with_data(
                    "seed",
                    "loaded demo catalog and order history",
                    data,
                ),
                Err(error) => {
                    CommandResult::failure("seed", "serialization", error.to_string(), 6)
                }
            },
            Err(error) => CommandResult::failure("seed", "fixture_load", error.to_string(), 6),
        }
    })
}
