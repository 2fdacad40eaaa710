use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use jisfast_core::domain::catalog::{VariantId, VariantSnapshot};

use super::codec::{parse_bool, parse_enum, parse_u32};
use super::{RepositoryError, VariantRepository};
use crate::DbPool;

pub struct SqlVariantRepository {
    pool: DbPool,
}

impl SqlVariantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VariantRepository for SqlVariantRepository {
    async fn find_by_id(&self, id: &VariantId) -> Result<Option<VariantSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, sku, category, size, pack_qty, price_cents, active
             FROM variants
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(variant_from_row).transpose()
    }

    async fn save(&self, variant: VariantSnapshot) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO variants (
                id, sku, category, size, pack_qty, price_cents, active, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                sku = excluded.sku,
                category = excluded.category,
                size = excluded.size,
                pack_qty = excluded.pack_qty,
                price_cents = excluded.price_cents,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&variant.id.0)
        .bind(&variant.sku)
        .bind(variant.category.as_str())
        .bind(&variant.size)
        .bind(i64::from(variant.pack_qty))
        .bind(variant.current_price_cents)
        .bind(i64::from(variant.active))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub(crate) fn variant_from_row(row: SqliteRow) -> Result<VariantSnapshot, RepositoryError> {
    Ok(VariantSnapshot {
        id: VariantId(row.try_get("id")?),
        sku: row.try_get("sku")?,
        category: parse_enum("category", row.try_get("category")?)?,
        size: row.try_get("size")?,
        pack_qty: parse_u32("pack_qty", row.try_get("pack_qty")?)?,
        current_price_cents: row.try_get("price_cents")?,
        active: parse_bool("active", row.try_get("active")?)?,
    })
}

#[cfg(test)]
mod tests {
    use jisfast_core::domain::catalog::{Category, VariantId, VariantSnapshot};

    use super::SqlVariantRepository;
    use crate::repositories::VariantRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn variant_round_trip_and_upsert() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlVariantRepository::new(pool.clone());

        let mut variant = VariantSnapshot {
            id: VariantId("nut-m8-zn-20".to_string()),
            sku: "N-M8-ZN-20".to_string(),
            category: Category::Nut,
            size: "M8".to_string(),
            pack_qty: 20,
            current_price_cents: 649,
            active: true,
        };
        repo.save(variant.clone()).await.expect("save");
        assert_eq!(repo.find_by_id(&variant.id).await.expect("find"), Some(variant.clone()));

        variant.current_price_cents = 699;
        variant.active = false;
        repo.save(variant.clone()).await.expect("upsert");
        assert_eq!(repo.find_by_id(&variant.id).await.expect("find"), Some(variant));

        let missing = repo.find_by_id(&VariantId("missing".to_string())).await.expect("find");
        assert!(missing.is_none());

        pool.close().await;
    }
}
