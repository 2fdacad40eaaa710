use sqlx::{sqlite::SqliteRow, Row};

use jisfast_core::shipping::{CarrierPolicy, ShippingRule, ShippingZone};

use super::codec::{parse_bool, parse_enum, parse_optional_u32, parse_u32};
use super::{RepositoryError, ShippingRepository};
use crate::DbPool;

pub struct SqlShippingRepository {
    pool: DbPool,
}

impl SqlShippingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ShippingRepository for SqlShippingRepository {
    async fn save_zone(&self, zone: &ShippingZone) -> Result<(), RepositoryError> {
        let countries_json = serde_json::to_string(&zone.countries)
            .map_err(|error| RepositoryError::Encode(format!("zone `{}`: {error}", zone.name)))?;

        sqlx::query(
            "INSERT INTO shipping_zones (name, countries_json) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET countries_json = excluded.countries_json",
        )
        .bind(&zone.name)
        .bind(countries_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_zones(&self) -> Result<Vec<ShippingZone>, RepositoryError> {
        let rows = sqlx::query("SELECT name, countries_json FROM shipping_zones ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(zone_from_row).collect()
    }

    async fn add_rule(&self, zone: &str, rule: &ShippingRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shipping_rules (
                zone_name, band, carrier, price_cents, eta_min_days, eta_max_days,
                tracking_included, notes
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(zone)
        .bind(rule.band.code())
        .bind(rule.carrier.as_str())
        .bind(rule.price_cents)
        .bind(i64::from(rule.eta_min_days))
        .bind(i64::from(rule.eta_max_days))
        .bind(i64::from(rule.tracking_included))
        .bind(rule.notes.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rules_for_zone(&self, zone: &str) -> Result<Vec<ShippingRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT band, carrier, price_cents, eta_min_days, eta_max_days, tracking_included, notes
             FROM shipping_rules
             WHERE zone_name = ?
             ORDER BY id ASC",
        )
        .bind(zone)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn save_policy(&self, zone: &str, policy: &CarrierPolicy) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO carrier_policies (
                zone_name, policy_type, default_carrier, force_premium_over_weight_grams,
                force_premium_over_subtotal_cents
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(zone_name) DO UPDATE SET
                policy_type = excluded.policy_type,
                default_carrier = excluded.default_carrier,
                force_premium_over_weight_grams = excluded.force_premium_over_weight_grams,
                force_premium_over_subtotal_cents = excluded.force_premium_over_subtotal_cents",
        )
        .bind(zone)
        .bind(policy.policy_type.as_str())
        .bind(policy.default_carrier.as_str())
        .bind(policy.force_premium_over_weight_grams.map(i64::from))
        .bind(policy.force_premium_over_subtotal_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn policy_for_zone(&self, zone: &str) -> Result<Option<CarrierPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT policy_type, default_carrier, force_premium_over_weight_grams,
                    force_premium_over_subtotal_cents
             FROM carrier_policies
             WHERE zone_name = ?",
        )
        .bind(zone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(policy_from_row).transpose()
    }
}

fn zone_from_row(row: SqliteRow) -> Result<ShippingZone, RepositoryError> {
    let countries_raw = row.try_get::<String, _>("countries_json")?;
    let countries = serde_json::from_str(&countries_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid `countries_json`: {error}")))?;

    Ok(ShippingZone { name: row.try_get("name")?, countries })
}

fn rule_from_row(row: SqliteRow) -> Result<ShippingRule, RepositoryError> {
    Ok(ShippingRule {
        band: parse_enum("band", row.try_get("band")?)?,
        carrier: parse_enum("carrier", row.try_get("carrier")?)?,
        price_cents: row.try_get("price_cents")?,
        eta_min_days: parse_u32("eta_min_days", row.try_get("eta_min_days")?)?,
        eta_max_days: parse_u32("eta_max_days", row.try_get("eta_max_days")?)?,
        tracking_included: parse_bool("tracking_included", row.try_get("tracking_included")?)?,
        notes: row.try_get("notes")?,
    })
}

fn policy_from_row(row: SqliteRow) -> Result<CarrierPolicy, RepositoryError> {
    Ok(CarrierPolicy {
        policy_type: parse_enum("policy_type", row.try_get("policy_type")?)?,
        default_carrier: parse_enum("default_carrier", row.try_get("default_carrier")?)?,
        force_premium_over_weight_grams: parse_optional_u32(
            "force_premium_over_weight_grams",
            row.try_get("force_premium_over_weight_grams")?,
        )?,
        force_premium_over_subtotal_cents: row.try_get("force_premium_over_subtotal_cents")?,
    })
}
