use sqlx::{sqlite::SqliteRow, Row};

use jisfast_core::domain::catalog::VariantId;
use jisfast_core::domain::supplier::{OfferId, SpecField, SupplierId, SupplierOffer};

use super::codec::{parse_decimal, parse_enum, parse_optional_u32, parse_timestamp, parse_u32};
use super::{RepositoryError, SupplierOfferRepository};
use crate::DbPool;

pub struct SqlSupplierOfferRepository {
    pool: DbPool,
}

impl SqlSupplierOfferRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SupplierOfferRepository for SqlSupplierOfferRepository {
    async fn save_offer(&self, offer: SupplierOffer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO supplier_offers (
                id, supplier_id, variant_id, category, size, length_mm, strength_class,
                finish, pack_qty, unit_cost_jpy, min_order_packs, lead_time_days,
                availability, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                supplier_id = excluded.supplier_id,
                variant_id = excluded.variant_id,
                category = excluded.category,
                size = excluded.size,
                length_mm = excluded.length_mm,
                strength_class = excluded.strength_class,
                finish = excluded.finish,
                pack_qty = excluded.pack_qty,
                unit_cost_jpy = excluded.unit_cost_jpy,
                min_order_packs = excluded.min_order_packs,
                lead_time_days = excluded.lead_time_days,
                availability = excluded.availability,
                updated_at = excluded.updated_at",
        )
        .bind(&offer.id.0)
        .bind(&offer.supplier_id.0)
        .bind(offer.variant_id.as_ref().map(|id| id.0.as_str()))
        .bind(offer.category.specific().map(|category| category.as_str()))
        .bind(offer.size.specific().map(String::as_str))
        .bind(offer.length_mm.specific().map(|value| i64::from(*value)))
        .bind(offer.strength_class.specific().map(String::as_str))
        .bind(offer.finish.specific().map(String::as_str))
        .bind(offer.pack_qty.specific().map(|value| i64::from(*value)))
        .bind(offer.unit_cost_jpy.to_string())
        .bind(i64::from(offer.min_order_packs))
        .bind(i64::from(offer.lead_time_days))
        .bind(offer.availability.as_str())
        .bind(offer.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_offers(&self) -> Result<Vec<SupplierOffer>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id, supplier_id, variant_id, category, size, length_mm, strength_class,
                finish, pack_qty, unit_cost_jpy, min_order_packs, lead_time_days,
                availability, updated_at
             FROM supplier_offers
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(offer_from_row).collect()
    }
}

fn offer_from_row(row: SqliteRow) -> Result<SupplierOffer, RepositoryError> {
    let category = row
        .try_get::<Option<String>, _>("category")?
        .map(|raw| parse_enum("category", raw))
        .transpose()?;

    Ok(SupplierOffer {
        id: OfferId(row.try_get("id")?),
        supplier_id: SupplierId(row.try_get("supplier_id")?),
        variant_id: row.try_get::<Option<String>, _>("variant_id")?.map(VariantId),
        category: SpecField::from(category),
        size: SpecField::from(row.try_get::<Option<String>, _>("size")?),
        length_mm: SpecField::from(parse_optional_u32("length_mm", row.try_get("length_mm")?)?),
        strength_class: SpecField::from(row.try_get::<Option<String>, _>("strength_class")?),
        finish: SpecField::from(row.try_get::<Option<String>, _>("finish")?),
        pack_qty: SpecField::from(parse_optional_u32("pack_qty", row.try_get("pack_qty")?)?),
        unit_cost_jpy: parse_decimal("unit_cost_jpy", row.try_get("unit_cost_jpy")?)?,
        min_order_packs: parse_u32("min_order_packs", row.try_get("min_order_packs")?)?,
        lead_time_days: parse_u32("lead_time_days", row.try_get("lead_time_days")?)?,
        availability: parse_enum("availability", row.try_get("availability")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
