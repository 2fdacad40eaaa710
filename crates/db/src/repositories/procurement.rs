use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;

use jisfast_core::domain::catalog::VariantId;
use jisfast_core::domain::supplier::{OfferId, SupplierId};
use jisfast_core::procurement::{
    CandidateScore, RoutingConfig, RoutingLineDecision, RoutingOutcome, RoutingWeights,
    SupplierTaskGroup, TaskLine,
};

use super::codec::{parse_bool, parse_decimal, parse_enum, parse_timestamp, parse_u32};
use super::{ProcurementTaskRepository, RepositoryError, RoutingConfigRepository};
use crate::DbPool;

const DEFAULT_CONFIG_ID: &str = "default";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcurementTaskStatus {
    Pending,
    Ordered,
    Cancelled,
}

impl ProcurementTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ordered => "ordered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "ordered" => Some(Self::Ordered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Persisted form of one supplier group of a routing pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcurementTask {
    pub id: String,
    pub order_id: String,
    pub supplier_id: SupplierId,
    pub status: ProcurementTaskStatus,
    pub total_packs: u32,
    pub estimated_cost_jpy: Decimal,
    pub lead_time_days: u32,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<TaskLine>,
}

impl ProcurementTask {
    fn pending(order_id: &str, group: &SupplierTaskGroup, created_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("PT-{}", uuid::Uuid::new_v4()),
            order_id: order_id.to_string(),
            supplier_id: group.supplier_id.clone(),
            status: ProcurementTaskStatus::Pending,
            total_packs: group.total_packs,
            estimated_cost_jpy: group.estimated_cost_jpy,
            lead_time_days: group.lead_time_days,
            created_at,
            lines: group.lines.clone(),
        }
    }
}

pub struct SqlRoutingConfigRepository {
    pool: DbPool,
}

impl SqlRoutingConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RoutingConfigRepository for SqlRoutingConfigRepository {
    async fn load(&self) -> Result<Option<RoutingConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT enabled, strategy, weight_cost, weight_lead, weight_availability, weight_match
             FROM routing_config
             WHERE id = ?",
        )
        .bind(DEFAULT_CONFIG_ID)
        .fetch_optional(&self.pool)
        .await?;

        row.map(routing_config_from_row).transpose()
    }

    async fn save(
        &self,
        config: &RoutingConfig,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO routing_config (
                id, enabled, strategy, weight_cost, weight_lead, weight_availability,
                weight_match, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                strategy = excluded.strategy,
                weight_cost = excluded.weight_cost,
                weight_lead = excluded.weight_lead,
                weight_availability = excluded.weight_availability,
                weight_match = excluded.weight_match,
                updated_at = excluded.updated_at",
        )
        .bind(DEFAULT_CONFIG_ID)
        .bind(i64::from(config.enabled))
        .bind(config.strategy.as_str())
        .bind(config.weights.cost)
        .bind(config.weights.lead)
        .bind(config.weights.availability)
        .bind(config.weights.matching)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlProcurementTaskRepository {
    pool: DbPool,
}

impl SqlProcurementTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProcurementTaskRepository for SqlProcurementTaskRepository {
    async fn record_outcome(
        &self,
        order_id: &str,
        outcome: &RoutingOutcome,
        created_at: DateTime<Utc>,
    ) -> Result<Vec<ProcurementTask>, RepositoryError> {
        let tasks: Vec<ProcurementTask> = outcome
            .by_supplier
            .iter()
            .map(|group| ProcurementTask::pending(order_id, group, created_at))
            .collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM procurement_tasks WHERE order_id = ?")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM routing_decisions WHERE order_id = ?")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        for task in &tasks {
            sqlx::query(
                "INSERT INTO procurement_tasks (
                    id, order_id, supplier_id, status, total_packs, estimated_cost_jpy,
                    lead_time_days, created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&task.id)
            .bind(&task.order_id)
            .bind(&task.supplier_id.0)
            .bind(task.status.as_str())
            .bind(i64::from(task.total_packs))
            .bind(task.estimated_cost_jpy.to_string())
            .bind(i64::from(task.lead_time_days))
            .bind(task.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            for line in &task.lines {
                sqlx::query(
                    "INSERT INTO procurement_task_lines (
                        task_id, line_id, variant_id, offer_id, qty_packs, effective_packs,
                        unit_cost_jpy, estimated_cost_jpy, lead_time_days
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&task.id)
                .bind(&line.line_id)
                .bind(&line.variant_id.0)
                .bind(&line.offer_id.0)
                .bind(i64::from(line.qty_packs))
                .bind(i64::from(line.effective_packs))
                .bind(line.unit_cost_jpy.to_string())
                .bind(line.estimated_cost_jpy.to_string())
                .bind(i64::from(line.lead_time_days))
                .execute(&mut *tx)
                .await?;
            }
        }

        for decision in &outcome.decisions {
            let scores_json = serde_json::to_string(&decision.scores).map_err(|error| {
                RepositoryError::Encode(format!(
                    "candidate scores for line `{}`: {error}",
                    decision.line_id
                ))
            })?;
            sqlx::query(
                "INSERT INTO routing_decisions (
                    order_id, line_id, variant_id, qty_packs, strategy, chosen_supplier_id,
                    chosen_offer_id, needs_manual_assignment, reason, scores_json, created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(&decision.line_id)
            .bind(&decision.variant_id.0)
            .bind(i64::from(decision.qty_packs))
            .bind(decision.strategy.as_str())
            .bind(decision.chosen_supplier_id.as_ref().map(|id| id.0.as_str()))
            .bind(decision.chosen_offer_id.as_ref().map(|id| id.0.as_str()))
            .bind(i64::from(decision.needs_manual_assignment))
            .bind(&decision.reason)
            .bind(scores_json)
            .bind(created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            event_name = "db.procurement.outcome_recorded",
            order_id,
            tasks = tasks.len(),
            manual_lines = outcome.needs_assignment.len(),
            "routing outcome persisted"
        );
        Ok(tasks)
    }

    async fn list_tasks_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProcurementTask>, RepositoryError> {
        let task_rows = sqlx::query(
            "SELECT
                id, order_id, supplier_id, status, total_packs, estimated_cost_jpy,
                lead_time_days, created_at
             FROM procurement_tasks
             WHERE order_id = ?
             ORDER BY supplier_id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let line_rows = sqlx::query(
            "SELECT
                l.task_id, l.line_id, l.variant_id, l.offer_id, l.qty_packs, l.effective_packs,
                l.unit_cost_jpy, l.estimated_cost_jpy, l.lead_time_days
             FROM procurement_task_lines l
             JOIN procurement_tasks t ON t.id = l.task_id
             WHERE t.order_id = ?
             ORDER BY l.id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut lines_by_task: BTreeMap<String, Vec<TaskLine>> = BTreeMap::new();
        for row in line_rows {
            let task_id: String = row.try_get("task_id")?;
            lines_by_task.entry(task_id).or_default().push(task_line_from_row(&row)?);
        }

        task_rows
            .into_iter()
            .map(|row| {
                let mut task = task_from_row(&row)?;
                task.lines = lines_by_task.remove(&task.id).unwrap_or_default();
                Ok(task)
            })
            .collect()
    }

    async fn list_decisions_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<RoutingLineDecision>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                line_id, variant_id, qty_packs, strategy, chosen_supplier_id, chosen_offer_id,
                needs_manual_assignment, reason, scores_json
             FROM routing_decisions
             WHERE order_id = ?
             ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decision_from_row).collect()
    }
}

fn routing_config_from_row(row: SqliteRow) -> Result<RoutingConfig, RepositoryError> {
    Ok(RoutingConfig {
        enabled: parse_bool("enabled", row.try_get("enabled")?)?,
        strategy: parse_enum("strategy", row.try_get("strategy")?)?,
        weights: RoutingWeights {
            cost: row.try_get("weight_cost")?,
            lead: row.try_get("weight_lead")?,
            availability: row.try_get("weight_availability")?,
            matching: row.try_get("weight_match")?,
        },
    })
}

fn task_from_row(row: &SqliteRow) -> Result<ProcurementTask, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ProcurementTaskStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown procurement task status `{status_raw}`"))
    })?;

    Ok(ProcurementTask {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        supplier_id: SupplierId(row.try_get("supplier_id")?),
        status,
        total_packs: parse_u32("total_packs", row.try_get("total_packs")?)?,
        estimated_cost_jpy: parse_decimal("estimated_cost_jpy", row.try_get("estimated_cost_jpy")?)?,
        lead_time_days: parse_u32("lead_time_days", row.try_get("lead_time_days")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        lines: Vec::new(),
    })
}

fn task_line_from_row(row: &SqliteRow) -> Result<TaskLine, RepositoryError> {
    Ok(TaskLine {
        line_id: row.try_get("line_id")?,
        variant_id: VariantId(row.try_get("variant_id")?),
        offer_id: OfferId(row.try_get("offer_id")?),
        qty_packs: parse_u32("qty_packs", row.try_get("qty_packs")?)?,
        effective_packs: parse_u32("effective_packs", row.try_get("effective_packs")?)?,
        unit_cost_jpy: parse_decimal("unit_cost_jpy", row.try_get("unit_cost_jpy")?)?,
        estimated_cost_jpy: parse_decimal("estimated_cost_jpy", row.try_get("estimated_cost_jpy")?)?,
        lead_time_days: parse_u32("lead_time_days", row.try_get("lead_time_days")?)?,
    })
}

fn decision_from_row(row: SqliteRow) -> Result<RoutingLineDecision, RepositoryError> {
    let scores_raw = row.try_get::<String, _>("scores_json")?;
    let scores: Vec<CandidateScore> = serde_json::from_str(&scores_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid `scores_json`: {error}")))?;

    Ok(RoutingLineDecision {
        line_id: row.try_get("line_id")?,
        variant_id: VariantId(row.try_get("variant_id")?),
        qty_packs: parse_u32("qty_packs", row.try_get("qty_packs")?)?,
        strategy: parse_enum("strategy", row.try_get("strategy")?)?,
        chosen_supplier_id: row.try_get::<Option<String>, _>("chosen_supplier_id")?.map(SupplierId),
        chosen_offer_id: row.try_get::<Option<String>, _>("chosen_offer_id")?.map(OfferId),
        scores,
        reason: row.try_get("reason")?,
        needs_manual_assignment: parse_bool(
            "needs_manual_assignment",
            row.try_get("needs_manual_assignment")?,
        )?,
    })
}
