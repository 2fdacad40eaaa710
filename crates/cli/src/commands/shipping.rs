use clap::Args;
use jisfast_core::config::ConfigOverrides;
use jisfast_core::errors::ApplicationError;
use jisfast_core::shipping::{
    classify_pack, select_carrier, zone_for_country, CarrierQuoteRequest, CarrierSelection,
    ShippingBand,
};
use jisfast_db::repositories::SqlShippingRepository;
use jisfast_db::ShippingRepository;

use crate::commands::{
    block_on, load_config, open_pool, CommandFailure, CommandResult, EXIT_DOMAIN,
};

#[derive(Debug, Clone, Args)]
pub struct ShippingQuoteArgs {
    /// ISO country code of the destination.
    #[arg(long)]
    pub country: String,
    /// Pack quantity of one cart line; repeat per line.
    #[arg(long = "pack", required = true)]
    pub packs: Vec<u32>,
    #[arg(long)]
    pub subtotal_cents: i64,
    #[arg(long, default_value_t = 0)]
    pub weight_grams: u32,
}

pub fn quote(args: &ShippingQuoteArgs) -> CommandResult {
    match execute(args) {
        Ok(selection) => {
            let message = format!(
                "{} quoted {} cents for zone {}",
                selection.carrier.as_str(),
                selection.price_cents,
                selection.zone
            );
            CommandResult::success_with_data("shipping.quote", message, &selection)
        }
        Err(failure) => failure.into_result("shipping.quote"),
    }
}

fn execute(args: &ShippingQuoteArgs) -> Result<CarrierSelection, CommandFailure> {
    let bands = args
        .packs
        .iter()
        .map(|pack| classify_pack(*pack))
        .collect::<Result<Vec<ShippingBand>, _>>()
        .map_err(ApplicationError::from)?;
    let config = load_config(ConfigOverrides::default())?;

    block_on(async {
        let pool = open_pool(&config).await?;
        let repo = SqlShippingRepository::new(pool.clone());

        let zones = repo.list_zones().await?;
        let zone = zone_for_country(&zones, &args.country).ok_or_else(|| {
            CommandFailure::new(
                "shipping_zone",
                format!("no shipping zone lists country `{}`", args.country.trim()),
                EXIT_DOMAIN,
            )
        })?;
        let rules = repo.rules_for_zone(&zone.name).await?;
        let policy = repo.policy_for_zone(&zone.name).await?;
        pool.close().await;

        let selection = select_carrier(&CarrierQuoteRequest {
            zone: &zone.name,
            bands: &bands,
            subtotal_cents: args.subtotal_cents,
            weight_grams: args.weight_grams,
            policy: policy.as_ref(),
            rules: &rules,
            extra_band_surcharge_cents: config.shipping.extra_band_surcharge_cents,
        })
        .map_err(ApplicationError::from)?;
        Ok(selection)
    })
}
