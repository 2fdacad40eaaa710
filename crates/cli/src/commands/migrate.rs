use jisfast_core::config::ConfigOverrides;
use tracing::info;

use crate::commands::{block_on, load_config, open_pool, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config(ConfigOverrides::default()) {
        Ok(config) => config,
        Err(failure) => return failure.into_result("migrate"),
    };

    let result = block_on(async {
        let pool = open_pool(&config).await?;
        pool.close().await;
        Ok(())
    });

    match result {
        Ok(()) => {
            info!(event_name = "cli.migrate.completed", "applied pending migrations");
            CommandResult::success("migrate", "applied pending migrations")
        }
        Err(failure) => failure.into_result("migrate"),
    }
}
