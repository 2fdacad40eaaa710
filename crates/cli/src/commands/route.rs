use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use jisfast_core::config::ConfigOverrides;
use jisfast_core::errors::ApplicationError;
use jisfast_core::procurement::{route_order, OrderLine, RoutingOutcome, RoutingStrategy};
use jisfast_db::repositories::{
    SqlProcurementTaskRepository, SqlRoutingConfigRepository, SqlSupplierOfferRepository,
};
use jisfast_db::{ProcurementTaskRepository, RoutingConfigRepository, SupplierOfferRepository};
use serde::Serialize;
use tracing::info;

use crate::commands::{block_on, load_config, open_pool, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct RouteArgs {
    /// JSON array of order lines (`line_id`, `spec`, `qty_packs`).
    #[arg(long)]
    pub input: PathBuf,
    /// Overrides the stored routing strategy for this pass.
    #[arg(long)]
    pub strategy: Option<RoutingStrategy>,
    /// Persist procurement tasks and decisions under this order id.
    #[arg(long)]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RouteReport {
    order_id: Option<String>,
    #[serde(flatten)]
    outcome: RoutingOutcome,
    task_ids: Vec<String>,
}

pub fn run(args: &RouteArgs) -> CommandResult {
    match execute(args) {
        Ok(report) => {
            let message = format!(
                "routed {} line(s) to {} supplier(s); {} need manual assignment",
                report.outcome.decisions.len(),
                report.outcome.by_supplier.len(),
                report.outcome.needs_assignment.len()
            );
            CommandResult::success_with_data("route", message, &report)
        }
        Err(failure) => failure.into_result("route"),
    }
}

fn execute(args: &RouteArgs) -> Result<RouteReport, CommandFailure> {
    let lines = read_lines(args)?;
    let config = load_config(ConfigOverrides::default())?;

    block_on(async {
        let pool = open_pool(&config).await?;

        let mut routing = SqlRoutingConfigRepository::new(pool.clone())
            .load()
            .await?
            .unwrap_or_else(|| config.routing.clone());
        if let Some(strategy) = args.strategy {
            routing.strategy = strategy;
        }

        let offers = SqlSupplierOfferRepository::new(pool.clone()).list_offers().await?;
        let outcome =
            route_order(&lines, &offers, &routing).map_err(ApplicationError::from)?;

        let task_ids = match args.order_id.as_deref() {
            Some(order_id) => SqlProcurementTaskRepository::new(pool.clone())
                .record_outcome(order_id, &outcome, Utc::now())
                .await?
                .into_iter()
                .map(|task| task.id)
                .collect(),
            None => Vec::new(),
        };

        info!(
            event_name = "cli.route.completed",
            lines = lines.len(),
            offers = offers.len(),
            strategy = routing.strategy.as_str(),
            persisted = args.order_id.is_some(),
            "routing pass finished"
        );
        pool.close().await;

        Ok(RouteReport { order_id: args.order_id.clone(), outcome, task_ids })
    })
}

fn read_lines(args: &RouteArgs) -> Result<Vec<OrderLine>, CommandFailure> {
    let raw = fs::read_to_string(&args.input).map_err(|error| {
        CommandFailure::input(format!("could not read `{}`: {error}", args.input.display()))
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        CommandFailure::input(format!(
            "`{}` is not a JSON array of order lines: {error}",
            args.input.display()
        ))
    })
}
