use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    calculate_price, select_cost_basis, select_pricing_rule, CostBasisRecord, CostBasisSelection,
    FeeSchedule, FxRate, PriceBreakdown, PricingError, PricingInput, PricingRule, RoundingStrategy,
    RuleScope, DEFAULT_RULE_ID,
};
use crate::{
    domain::catalog::{Category, VariantId, VariantSnapshot},
    errors::ApplicationError,
    shipping::{classify_pack, ShippingBand},
};

pub const MAX_REPRICE_LIMIT: u32 = 500;
pub const DEFAULT_REPRICE_LIMIT: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceFilter {
    pub category: Option<Category>,
    pub size: Option<String>,
    pub limit: u32,
}

impl Default for RepriceFilter {
    fn default() -> Self {
        Self { category: None, size: None, limit: DEFAULT_REPRICE_LIMIT }
    }
}

impl RepriceFilter {
    pub fn validate(&self) -> Result<(), PricingError> {
        if self.limit == 0 || self.limit > MAX_REPRICE_LIMIT {
            return Err(PricingError::InvalidLimit { limit: self.limit, max: MAX_REPRICE_LIMIT });
        }
        Ok(())
    }

    pub fn matches(&self, variant: &VariantSnapshot) -> bool {
        variant.active
            && self.category.map_or(true, |category| category == variant.category)
            && self.size.as_deref().map_or(true, |size| size.eq_ignore_ascii_case(&variant.size))
    }

    /// Matching variants ordered by id, capped at `limit`.
    pub fn select<'a>(&self, variants: &'a [VariantSnapshot]) -> Vec<&'a VariantSnapshot> {
        let mut selected: Vec<&VariantSnapshot> =
            variants.iter().filter(|variant| self.matches(variant)).collect();
        selected.sort_by(|left, right| left.id.cmp(&right.id));
        selected.truncate(self.limit as usize);
        selected
    }
}

/// Everything one reprice batch reads, fetched up front by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceInputs {
    pub fx_rate: Option<FxRate>,
    pub variants: Vec<VariantSnapshot>,
    pub cost_basis: Vec<CostBasisRecord>,
    pub rules: Vec<PricingRule>,
}

/// Template for the global rule created when none exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRuleSettings {
    pub target_margin: Decimal,
    pub rounding: RoundingStrategy,
    pub max_weekly_change: Decimal,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
}

impl Default for DefaultRuleSettings {
    fn default() -> Self {
        Self {
            target_margin: Decimal::new(35, 2),
            rounding: RoundingStrategy::Usd099,
            max_weekly_change: Decimal::new(10, 2),
            min_price_cents: Some(100),
            max_price_cents: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceSettings {
    pub fees: FeeSchedule,
    pub handling_small_cents: i64,
    pub handling_standard_cents: i64,
    pub cost_basis_window_days: u32,
    pub default_rule: DefaultRuleSettings,
}

impl Default for RepriceSettings {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            handling_small_cents: 150,
            handling_standard_cents: 250,
            cost_basis_window_days: 30,
            default_rule: DefaultRuleSettings::default(),
        }
    }
}

impl RepriceSettings {
    pub fn handling_cents(&self, band: ShippingBand) -> i64 {
        match band {
            ShippingBand::Small => self.handling_small_cents,
            ShippingBand::Medium | ShippingBand::Bulk => self.handling_standard_cents,
        }
    }

    pub fn default_rule(&self, now: DateTime<Utc>) -> PricingRule {
        let template = &self.default_rule;
        PricingRule {
            id: DEFAULT_RULE_ID.to_string(),
            scope: RuleScope::Global,
            target_margin: template.target_margin,
            min_price_cents: template.min_price_cents,
            max_price_cents: template.max_price_cents,
            rounding: template.rounding,
            max_weekly_change: template.max_weekly_change,
            allow_override: false,
            active: true,
            updated_at: now,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepriceStatus {
    Priced,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceRow {
    pub variant_id: VariantId,
    pub sku: String,
    pub status: RepriceStatus,
    pub current_price_cents: i64,
    pub recommended_price_cents: Option<i64>,
    /// Percent, two decimal places. Absent when there is no current price.
    pub change_pct: Option<Decimal>,
    pub band: Option<ShippingBand>,
    pub rule_id: Option<String>,
    pub cost_basis: Option<CostBasisSelection>,
    pub breakdown: Option<PriceBreakdown>,
    pub skip_reason: Option<String>,
}

impl RepriceRow {
    fn skipped(variant: &VariantSnapshot, reason: String) -> Self {
        Self {
            variant_id: variant.id.clone(),
            sku: variant.sku.clone(),
            status: RepriceStatus::Skipped,
            current_price_cents: variant.current_price_cents,
            recommended_price_cents: None,
            change_pct: None,
            band: None,
            rule_id: None,
            cost_basis: None,
            breakdown: None,
            skip_reason: Some(reason),
        }
    }

    /// New price when it differs from the current one.
    pub fn changed_price(&self) -> Option<i64> {
        self.recommended_price_cents.filter(|price| *price != self.current_price_cents)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepricePreview {
    pub fx_rate: FxRate,
    pub filter: RepriceFilter,
    pub rows: Vec<RepriceRow>,
}

impl RepricePreview {
    pub fn priced_count(&self) -> usize {
        self.rows.iter().filter(|row| row.status == RepriceStatus::Priced).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.rows.iter().filter(|row| row.status == RepriceStatus::Skipped).count()
    }
}

/// One live price update plus the audit entry recorded with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub variant_id: VariantId,
    pub old_price_cents: i64,
    pub new_price_cents: i64,
    pub reason: RepriceRow,
    pub actor: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceApplyReport {
    pub actor: String,
    pub applied: Vec<PriceChange>,
    pub unchanged: usize,
    pub skipped: usize,
}

/// Prices every selected variant against one shared FX rate.
///
/// A missing FX rate or an invalid cost fails the whole batch. Variants without
/// cost data or with an unsupported pack size come back as skipped rows.
pub fn preview_batch(
    filter: &RepriceFilter,
    inputs: &RepriceInputs,
    settings: &RepriceSettings,
    now: DateTime<Utc>,
) -> Result<RepricePreview, PricingError> {
    filter.validate()?;
    let fx_rate = inputs.fx_rate.clone().ok_or(PricingError::MissingFxRate)?;
    if fx_rate.jpy_per_usd <= Decimal::ZERO {
        return Err(PricingError::InvalidFxRate { value: fx_rate.jpy_per_usd });
    }

    let fallback_rule = settings.default_rule(now);
    let mut rows = Vec::new();

    for variant in filter.select(&inputs.variants) {
        let band = match classify_pack(variant.pack_qty) {
            Ok(band) => band,
            Err(error) => {
                rows.push(skip(variant, error.to_string()));
                continue;
            }
        };

        let records: Vec<CostBasisRecord> = inputs
            .cost_basis
            .iter()
            .filter(|record| record.variant_id == variant.id)
            .cloned()
            .collect();
        let Some(cost_basis) = select_cost_basis(&records, now, settings.cost_basis_window_days)
        else {
            rows.push(skip(variant, "no cost basis recorded for variant".to_string()));
            continue;
        };

        let rule = select_pricing_rule(&inputs.rules, variant).unwrap_or(&fallback_rule);
        let breakdown = calculate_price(&PricingInput {
            current_price_cents: variant.current_price_cents,
            cost_per_pack: cost_basis.record.cost_per_pack,
            fx_rate: fx_rate.jpy_per_usd,
            target_margin: rule.target_margin,
            min_price_cents: rule.min_price_cents,
            max_price_cents: rule.max_price_cents,
            rounding: rule.rounding,
            max_weekly_change: rule.max_weekly_change,
            allow_override: rule.allow_override,
            fees: settings.fees,
            handling_cents: settings.handling_cents(band),
        })?;

        let recommended = breakdown.recommended_price_cents;
        debug!(
            event_name = "pricing.reprice.variant_priced",
            variant_id = %variant.id,
            rule_id = %rule.id,
            current_price_cents = variant.current_price_cents,
            recommended_price_cents = recommended,
            low_confidence = cost_basis.low_confidence,
            "variant priced"
        );

        rows.push(RepriceRow {
            variant_id: variant.id.clone(),
            sku: variant.sku.clone(),
            status: RepriceStatus::Priced,
            current_price_cents: variant.current_price_cents,
            recommended_price_cents: Some(recommended),
            change_pct: change_pct(variant.current_price_cents, recommended),
            band: Some(band),
            rule_id: Some(rule.id.clone()),
            cost_basis: Some(cost_basis),
            breakdown: Some(breakdown),
            skip_reason: None,
        });
    }

    Ok(RepricePreview { fx_rate, filter: filter.clone(), rows })
}

fn skip(variant: &VariantSnapshot, reason: String) -> RepriceRow {
    warn!(
        event_name = "pricing.reprice.variant_skipped",
        variant_id = %variant.id,
        reason = %reason,
        "variant skipped"
    );
    RepriceRow::skipped(variant, reason)
}

fn change_pct(current: i64, recommended: i64) -> Option<Decimal> {
    if current <= 0 {
        return None;
    }
    let delta = Decimal::from(recommended - current) * Decimal::ONE_HUNDRED;
    Some((delta / Decimal::from(current)).round_dp(2))
}

/// Price changes for every priced row whose price actually moves.
pub fn plan_apply(preview: &RepricePreview, actor: &str, now: DateTime<Utc>) -> Vec<PriceChange> {
    preview
        .rows
        .iter()
        .filter_map(|row| {
            row.changed_price().map(|new_price_cents| PriceChange {
                variant_id: row.variant_id.clone(),
                old_price_cents: row.current_price_cents,
                new_price_cents,
                reason: row.clone(),
                actor: actor.to_string(),
                applied_at: now,
            })
        })
        .collect()
}

#[async_trait]
pub trait RepriceStore: Send + Sync {
    async fn load_inputs(&self, filter: &RepriceFilter) -> Result<RepriceInputs, ApplicationError>;

    /// Persists `rule` unless a global rule already exists, returning the
    /// stored global rule.
    async fn ensure_default_rule(&self, rule: PricingRule) -> Result<PricingRule, ApplicationError>;

    /// Writes the audit entry and the live price atomically.
    async fn apply_price_change(&self, change: &PriceChange) -> Result<(), ApplicationError>;
}

pub struct RepriceService<S> {
    store: S,
    settings: RepriceSettings,
}

impl<S: RepriceStore> RepriceService<S> {
    pub fn new(store: S, settings: RepriceSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn preview(
        &self,
        filter: &RepriceFilter,
        now: DateTime<Utc>,
    ) -> Result<RepricePreview, ApplicationError> {
        filter.validate()?;
        let mut inputs = self.store.load_inputs(filter).await?;

        let uncovered = filter
            .select(&inputs.variants)
            .into_iter()
            .any(|variant| select_pricing_rule(&inputs.rules, variant).is_none());
        if uncovered {
            let rule = self.store.ensure_default_rule(self.settings.default_rule(now)).await?;
            inputs.rules.retain(|existing| existing.id != rule.id);
            inputs.rules.push(rule);
        }

        let preview = preview_batch(filter, &inputs, &self.settings, now)?;
        info!(
            event_name = "pricing.reprice.previewed",
            priced = preview.priced_count(),
            skipped = preview.skipped_count(),
            "reprice preview computed"
        );
        Ok(preview)
    }

    /// Recomputes the preview and applies every changed price. Unchanged and
    /// skipped variants are not written.
    pub async fn apply(
        &self,
        filter: &RepriceFilter,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<RepriceApplyReport, ApplicationError> {
        let preview = self.preview(filter, now).await?;
        let changes = plan_apply(&preview, actor, now);

        for change in &changes {
            self.store.apply_price_change(change).await?;
            info!(
                event_name = "pricing.reprice.change_applied",
                variant_id = %change.variant_id,
                old_price_cents = change.old_price_cents,
                new_price_cents = change.new_price_cents,
                actor = %change.actor,
                "price change applied"
            );
        }

        let skipped = preview.skipped_count();
        let unchanged = preview.priced_count() - changes.len();
        Ok(RepriceApplyReport { actor: actor.to_string(), applied: changes, unchanged, skipped })
    }
}
