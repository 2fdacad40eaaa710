use chrono::Utc;
use clap::Args;
use jisfast_core::config::{AppConfig, ConfigOverrides};
use jisfast_core::domain::catalog::Category;
use jisfast_core::pricing::{RepriceFilter, RepriceService};
use jisfast_db::repositories::SqlRepriceStore;

use crate::commands::{
    block_on, load_config, open_pool, CommandFailure, CommandResult, EXIT_INPUT,
};

#[derive(Debug, Clone, Default, Args)]
pub struct RepriceArgs {
    #[arg(long)]
    pub category: Option<Category>,
    #[arg(long)]
    pub size: Option<String>,
    /// Defaults to `pricing.reprice_limit`.
    #[arg(long)]
    pub limit: Option<u32>,
}

impl RepriceArgs {
    fn filter(&self, config: &AppConfig) -> RepriceFilter {
        RepriceFilter {
            category: self.category,
            size: self.size.clone(),
            limit: self.limit.unwrap_or(config.pricing.reprice_limit),
        }
    }
}

pub fn preview(args: &RepriceArgs) -> CommandResult {
    let result = load_config(ConfigOverrides::default()).and_then(|config| {
        let filter = args.filter(&config);
        block_on(async {
            let pool = open_pool(&config).await?;
            let service =
                RepriceService::new(SqlRepriceStore::new(pool.clone()), config.pricing.reprice_settings());
            let preview = service.preview(&filter, Utc::now()).await;
            pool.close().await;
            Ok(preview?)
        })
    });

    match result {
        Ok(preview) => {
            let message = format!(
                "previewed {} variant(s), {} skipped",
                preview.priced_count(),
                preview.skipped_count()
            );
            CommandResult::success_with_data("reprice.preview", message, &preview)
        }
        Err(failure) => failure.into_result("reprice.preview"),
    }
}

pub fn apply(args: &RepriceArgs, actor: &str) -> CommandResult {
    let actor = actor.trim();
    if actor.is_empty() {
        return CommandFailure::new("invalid_input", "an actor is required to apply prices", EXIT_INPUT)
            .into_result("reprice.apply");
    }

    let result = load_config(ConfigOverrides::default()).and_then(|config| {
        let filter = args.filter(&config);
        block_on(async {
            let pool = open_pool(&config).await?;
            let service =
                RepriceService::new(SqlRepriceStore::new(pool.clone()), config.pricing.reprice_settings());
            let report = service.apply(&filter, actor, Utc::now()).await;
            pool.close().await;
            Ok(report?)
        })
    });

    match result {
        Ok(report) => {
            let message = format!(
                "applied {} price change(s), {} unchanged, {} skipped",
                report.applied.len(),
                report.unchanged,
                report.skipped
            );
            CommandResult::success_with_data("reprice.apply", message, &report)
        }
        Err(failure) => failure.into_result("reprice.apply"),
    }
}
