pub mod commands;

use std::process::ExitCode;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use jisfast_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

use commands::reprice::RepriceArgs;
use commands::route::RouteArgs;
use commands::shipping::ShippingQuoteArgs;
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "jisfast",
    about = "JIS fastener store operator CLI",
    long_about = "Apply migrations, inspect configuration, route orders to suppliers, reprice variants, and quote shipping.",
    after_help = "Examples:\n  jisfast migrate\n  jisfast route --input order.json --order-id ORD-1001\n  jisfast reprice preview --category bolt --limit 20\n  jisfast shipping quote --country AU --pack 10 --pack 50 --subtotal-cents 12000"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Route order lines to suppliers using the stored offers")]
    Route(RouteArgs),
    #[command(about = "Preview or apply recommended retail prices")]
    Reprice {
        #[command(subcommand)]
        action: RepriceCommand,
    },
    #[command(about = "Quote carriers from the stored shipping tables")]
    Shipping {
        #[command(subcommand)]
        action: ShippingCommand,
    },
}

#[derive(Debug, Subcommand)]
enum RepriceCommand {
    #[command(about = "Compute recommended prices without writing anything")]
    Preview(RepriceArgs),
    #[command(about = "Apply every changed recommendation and record it in the audit log")]
    Apply {
        #[arg(long, help = "Admin recorded on each price change")]
        actor: String,
        #[command(flatten)]
        filter: RepriceArgs,
    },
}

#[derive(Debug, Subcommand)]
enum ShippingCommand {
    #[command(about = "Select a carrier for a cart")]
    Quote(ShippingQuoteArgs),
}

/// Installs the stderr subscriber so stdout carries only the command payload.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|error| anyhow!("failed to install log subscriber: {error}"))
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Config errors are reported by the command itself.
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    init_logging(&config)?;

    let result = match &cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Route(args) => commands::route::run(args),
        Command::Reprice { action: RepriceCommand::Preview(filter) } => {
            commands::reprice::preview(filter)
        }
        Command::Reprice { action: RepriceCommand::Apply { actor, filter } } => {
            commands::reprice::apply(filter, actor)
        }
        Command::Shipping { action: ShippingCommand::Quote(args) } => {
            commands::shipping::quote(args)
        }
    };

    println!("{}", result.output);
    Ok(ExitCode::from(result.exit_code))
}
