use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, info};

use jisfast_core::domain::catalog::VariantId;
use jisfast_core::domain::supplier::SupplierId;
use jisfast_core::errors::ApplicationError;
use jisfast_core::pricing::{
    CostBasisRecord, FxRate, PriceChange, PricingRule, RepriceFilter, RepriceInputs, RepriceRow,
    RepriceStore, RuleScope,
};

use super::catalog::variant_from_row;
use super::codec::{parse_bool, parse_decimal, parse_enum, parse_timestamp};
use super::{PricingRepository, RepositoryError};
use crate::DbPool;

const RULE_COLUMNS: &str = "id, scope_kind, scope_value, target_margin, min_price_cents,
    max_price_cents, rounding, max_weekly_change, allow_override, active, updated_at";

const VARIANT_FILTER: &str = "active = 1
    AND (? IS NULL OR category = ?)
    AND (? IS NULL OR size = ? COLLATE NOCASE)";

/// One row of the append-only price audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChangeRecord {
    pub id: i64,
    pub variant_id: VariantId,
    pub old_price_cents: i64,
    pub new_price_cents: i64,
    pub reason: RepriceRow,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

pub struct SqlPricingRepository {
    pool: DbPool,
}

impl SqlPricingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PricingRepository for SqlPricingRepository {
    async fn save_rule(&self, rule: &PricingRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pricing_rules (
                id, scope_kind, scope_value, target_margin, min_price_cents, max_price_cents,
                rounding, max_weekly_change, allow_override, active, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                scope_kind = excluded.scope_kind,
                scope_value = excluded.scope_value,
                target_margin = excluded.target_margin,
                min_price_cents = excluded.min_price_cents,
                max_price_cents = excluded.max_price_cents,
                rounding = excluded.rounding,
                max_weekly_change = excluded.max_weekly_change,
                allow_override = excluded.allow_override,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&rule.id)
        .bind(rule.scope.kind())
        .bind(rule.scope.value())
        .bind(rule.target_margin.to_string())
        .bind(rule.min_price_cents)
        .bind(rule.max_price_cents)
        .bind(rule.rounding.as_str())
        .bind(rule.max_weekly_change.to_string())
        .bind(i64::from(rule.allow_override))
        .bind(i64::from(rule.active))
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<PricingRule>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM pricing_rules ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn record_fx_rate(&self, rate: &FxRate) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO fx_rates (jpy_per_usd, captured_at) VALUES (?, ?)")
            .bind(rate.jpy_per_usd.to_string())
            .bind(rate.captured_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn latest_fx_rate(&self) -> Result<Option<FxRate>, RepositoryError> {
        latest_fx_rate(&self.pool).await
    }

    async fn record_cost_basis(&self, record: &CostBasisRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO cost_basis (
                variant_id, supplier_id, cost_per_pack, availability, source, captured_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.variant_id.0)
        .bind(record.supplier_id.as_ref().map(|id| id.0.as_str()))
        .bind(record.cost_per_pack.to_string())
        .bind(record.availability.as_str())
        .bind(record.source.as_str())
        .bind(record.captured_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cost_basis_for_variant(
        &self,
        variant_id: &VariantId,
    ) -> Result<Vec<CostBasisRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT variant_id, supplier_id, cost_per_pack, availability, source, captured_at
             FROM cost_basis
             WHERE variant_id = ?
             ORDER BY captured_at DESC, id DESC",
        )
        .bind(&variant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(cost_basis_from_row).collect()
    }

    async fn list_price_changes(
        &self,
        variant_id: &VariantId,
    ) -> Result<Vec<PriceChangeRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, variant_id, old_price_cents, new_price_cents, reason_json, actor, created_at
             FROM price_change_log
             WHERE variant_id = ?
             ORDER BY id ASC",
        )
        .bind(&variant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(price_change_from_row).collect()
    }
}

/// Reprice store over the sqlite schema. Every applied change is one
/// transaction covering the audit row and the live price.
pub struct SqlRepriceStore {
    pool: DbPool,
}

impl SqlRepriceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, filter: &RepriceFilter) -> Result<RepriceInputs, RepositoryError> {
        let category = filter.category.map(|category| category.as_str());
        let size = filter.size.as_deref();

        let variant_rows = sqlx::query(&format!(
            "SELECT id, sku, category, size, pack_qty, price_cents, active
             FROM variants
             WHERE {VARIANT_FILTER}
             ORDER BY id ASC
             LIMIT ?"
        ))
        .bind(category)
        .bind(category)
        .bind(size)
        .bind(size)
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await?;
        let variants =
            variant_rows.into_iter().map(variant_from_row).collect::<Result<Vec<_>, _>>()?;

        let cost_rows = sqlx::query(&format!(
            "SELECT variant_id, supplier_id, cost_per_pack, availability, source, captured_at
             FROM cost_basis
             WHERE variant_id IN (
                SELECT id FROM variants WHERE {VARIANT_FILTER} ORDER BY id ASC LIMIT ?
             )
             ORDER BY variant_id ASC, captured_at DESC, id DESC"
        ))
        .bind(category)
        .bind(category)
        .bind(size)
        .bind(size)
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await?;
        let cost_basis =
            cost_rows.into_iter().map(cost_basis_from_row).collect::<Result<Vec<_>, _>>()?;

        let rule_rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM pricing_rules WHERE active = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let rules = rule_rows.into_iter().map(rule_from_row).collect::<Result<Vec<_>, _>>()?;

        let fx_rate = latest_fx_rate(&self.pool).await?;

        debug!(
            event_name = "db.reprice.inputs_loaded",
            variants = variants.len(),
            cost_records = cost_basis.len(),
            rules = rules.len(),
            has_fx_rate = fx_rate.is_some(),
            "reprice inputs loaded"
        );
        Ok(RepriceInputs { fx_rate, variants, cost_basis, rules })
    }

    async fn ensure_global_rule(&self, rule: PricingRule) -> Result<PricingRule, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS}
             FROM pricing_rules
             WHERE scope_kind = 'global' AND active = 1
             ORDER BY updated_at DESC, id ASC
             LIMIT 1"
        ))
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            tx.commit().await?;
            return rule_from_row(row);
        }

        sqlx::query(
            "INSERT INTO pricing_rules (
                id, scope_kind, scope_value, target_margin, min_price_cents, max_price_cents,
                rounding, max_weekly_change, allow_override, active, updated_at
             ) VALUES (?, 'global', NULL, ?, ?, ?, ?, ?, ?, 1, ?)
             ON CONFLICT(id) DO UPDATE SET active = 1",
        )
        .bind(&rule.id)
        .bind(rule.target_margin.to_string())
        .bind(rule.min_price_cents)
        .bind(rule.max_price_cents)
        .bind(rule.rounding.as_str())
        .bind(rule.max_weekly_change.to_string())
        .bind(i64::from(rule.allow_override))
        .bind(rule.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let stored = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM pricing_rules WHERE id = ?"))
            .bind(&rule.id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        let stored = rule_from_row(stored)?;
        info!(event_name = "db.reprice.default_rule_created", rule_id = %stored.id, "default pricing rule stored");
        Ok(stored)
    }

    async fn write_change(&self, change: &PriceChange) -> Result<(), RepositoryError> {
        let reason_json = serde_json::to_string(&change.reason).map_err(|error| {
            RepositoryError::Encode(format!("reprice row for `{}`: {error}", change.variant_id))
        })?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE variants
             SET price_cents = ?, updated_at = ?
             WHERE id = ? AND price_cents = ?",
        )
        .bind(change.new_price_cents)
        .bind(change.applied_at.to_rfc3339())
        .bind(&change.variant_id.0)
        .bind(change.old_price_cents)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "variant `{}` no longer has price {} cents",
                change.variant_id, change.old_price_cents
            )));
        }

        sqlx::query(
            "INSERT INTO price_change_log (
                variant_id, old_price_cents, new_price_cents, reason_json, actor, created_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&change.variant_id.0)
        .bind(change.old_price_cents)
        .bind(change.new_price_cents)
        .bind(reason_json)
        .bind(&change.actor)
        .bind(change.applied_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RepriceStore for SqlRepriceStore {
    async fn load_inputs(&self, filter: &RepriceFilter) -> Result<RepriceInputs, ApplicationError> {
        Ok(self.load(filter).await?)
    }

    async fn ensure_default_rule(&self, rule: PricingRule) -> Result<PricingRule, ApplicationError> {
        Ok(self.ensure_global_rule(rule).await?)
    }

    async fn apply_price_change(&self, change: &PriceChange) -> Result<(), ApplicationError> {
        Ok(self.write_change(change).await?)
    }
}

async fn latest_fx_rate(pool: &DbPool) -> Result<Option<FxRate>, RepositoryError> {
    let row = sqlx::query(
        "SELECT jpy_per_usd, captured_at
         FROM fx_rates
         ORDER BY captured_at DESC, id DESC
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(FxRate {
            jpy_per_usd: parse_decimal("jpy_per_usd", row.try_get("jpy_per_usd")?)?,
            captured_at: parse_timestamp("captured_at", row.try_get("captured_at")?)?,
        })
    })
    .transpose()
}

fn rule_from_row(row: SqliteRow) -> Result<PricingRule, RepositoryError> {
    let kind = row.try_get::<String, _>("scope_kind")?;
    let value = row.try_get::<Option<String>, _>("scope_value")?;
    let scope = RuleScope::from_parts(&kind, value.as_deref())
        .map_err(|error| RepositoryError::Decode(format!("`scope_kind`: {error}")))?;

    Ok(PricingRule {
        id: row.try_get("id")?,
        scope,
        target_margin: parse_decimal("target_margin", row.try_get("target_margin")?)?,
        min_price_cents: row.try_get("min_price_cents")?,
        max_price_cents: row.try_get("max_price_cents")?,
        rounding: parse_enum("rounding", row.try_get("rounding")?)?,
        max_weekly_change: parse_decimal("max_weekly_change", row.try_get("max_weekly_change")?)?,
        allow_override: parse_bool("allow_override", row.try_get("allow_override")?)?,
        active: parse_bool("active", row.try_get("active")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn cost_basis_from_row(row: SqliteRow) -> Result<CostBasisRecord, RepositoryError> {
    Ok(CostBasisRecord {
        variant_id: VariantId(row.try_get("variant_id")?),
        supplier_id: row.try_get::<Option<String>, _>("supplier_id")?.map(SupplierId),
        cost_per_pack: parse_decimal("cost_per_pack", row.try_get("cost_per_pack")?)?,
        availability: parse_enum("availability", row.try_get("availability")?)?,
        source: parse_enum("source", row.try_get("source")?)?,
        captured_at: parse_timestamp("captured_at", row.try_get("captured_at")?)?,
    })
}

fn price_change_from_row(row: SqliteRow) -> Result<PriceChangeRecord, RepositoryError> {
    let reason_raw = row.try_get::<String, _>("reason_json")?;
    let reason = serde_json::from_str(&reason_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid `reason_json`: {error}")))?;

    Ok(PriceChangeRecord {
        id: row.try_get("id")?,
        variant_id: VariantId(row.try_get("variant_id")?),
        old_price_cents: row.try_get("old_price_cents")?,
        new_price_cents: row.try_get("new_price_cents")?,
        reason,
        actor: row.try_get("actor")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
