use basketry_core::config::AppConfig;
use basketry_db::{connect, migrations};

use super::{with_runtime, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    with_runtime("migrate", || async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure("migrate", "db_connectivity", error.to_string(), 4)
            }
        };

        let outcome = migrations::run_pending(&pool).await;
        pool.close().await;

        match outcome {
            Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
            Err(error) => CommandResult::failure("migrate", "migration", error.to_string(), 5),
        }
    })
}
