use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::RoundingStrategy;
use crate::domain::{
    catalog::{Category, VariantId, VariantSnapshot},
    supplier::{Availability, SupplierId},
};

/// Id of the global rule created when no pricing rule exists at all.
pub const DEFAULT_RULE_ID: &str = "global-default";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    SupplierOffer,
    Manual,
    Import,
}

impl CostSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SupplierOffer => "supplier_offer",
            Self::Manual => "manual",
            Self::Import => "import",
        }
    }
}

impl std::str::FromStr for CostSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supplier_offer" => Ok(Self::SupplierOffer),
            "manual" => Ok(Self::Manual),
            "import" => Ok(Self::Import),
            other => {
                Err(format!("unsupported cost source `{other}` (expected supplier_offer|manual|import)"))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasisRecord {
    pub variant_id: VariantId,
    pub supplier_id: Option<SupplierId>,
    /// Source currency per pack.
    pub cost_per_pack: Decimal,
    pub availability: Availability,
    pub source: CostSource,
    pub captured_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasisSelection {
    pub record: CostBasisRecord,
    /// Set when no acceptable record fell inside the window and the newest
    /// record was used instead.
    pub low_confidence: bool,
}

/// Picks the cost basis for one variant.
///
/// Within the last `window_days`, records that are not on backorder compete on
/// cheapest cost, then supplier-offer provenance, then recency. Without any
/// such record the newest record wins with `low_confidence` set.
pub fn select_cost_basis(
    records: &[CostBasisRecord],
    now: DateTime<Utc>,
    window_days: u32,
) -> Option<CostBasisSelection> {
    let cutoff = now - Duration::days(i64::from(window_days));

    let preferred = records
        .iter()
        .filter(|record| record.captured_at >= cutoff && record.availability != Availability::Backorder)
        .min_by(|left, right| compare_recent(left, right));
    if let Some(record) = preferred {
        return Some(CostBasisSelection { record: record.clone(), low_confidence: false });
    }

    records
        .iter()
        .max_by_key(|record| record.captured_at)
        .map(|record| CostBasisSelection { record: record.clone(), low_confidence: true })
}

fn compare_recent(left: &CostBasisRecord, right: &CostBasisRecord) -> Ordering {
    let offer_first = |record: &CostBasisRecord| record.source != CostSource::SupplierOffer;
    left.cost_per_pack
        .cmp(&right.cost_per_pack)
        .then_with(|| offer_first(left).cmp(&offer_first(right)))
        .then_with(|| right.captured_at.cmp(&left.captured_at))
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Category(Category),
    Size(String),
    Variant(VariantId),
}

impl RuleScope {
    /// Higher is more specific.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Category(_) => 1,
            Self::Size(_) => 2,
            Self::Variant(_) => 3,
        }
    }

    pub fn applies_to(&self, variant: &VariantSnapshot) -> bool {
        match self {
            Self::Global => true,
            Self::Category(category) => *category == variant.category,
            Self::Size(size) => size.eq_ignore_ascii_case(&variant.size),
            Self::Variant(id) => *id == variant.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Category(_) => "category",
            Self::Size(_) => "size",
            Self::Variant(_) => "variant",
        }
    }

    /// Scope value as stored next to [`RuleScope::kind`].
    pub fn value(&self) -> Option<String> {
        match self {
            Self::Global => None,
            Self::Category(category) => Some(category.as_str().to_string()),
            Self::Size(size) => Some(size.clone()),
            Self::Variant(id) => Some(id.0.clone()),
        }
    }

    pub fn from_parts(kind: &str, value: Option<&str>) -> Result<Self, String> {
        match (kind, value) {
            ("global", _) => Ok(Self::Global),
            ("category", Some(value)) => value.parse().map(Self::Category),
            ("size", Some(value)) => Ok(Self::Size(value.to_string())),
            ("variant", Some(value)) => Ok(Self::Variant(VariantId(value.to_string()))),
            (kind, None) => Err(format!("rule scope `{kind}` requires a value")),
            (kind, Some(_)) => Err(format!("unsupported rule scope `{kind}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: String,
    pub scope: RuleScope,
    pub target_margin: Decimal,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub rounding: RoundingStrategy,
    pub max_weekly_change: Decimal,
    pub allow_override: bool,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Most specific active rule for `variant`: variant > size > category >
/// global. Same-scope rules resolve to the newest, then the smallest id.
pub fn select_pricing_rule<'a>(
    rules: &'a [PricingRule],
    variant: &VariantSnapshot,
) -> Option<&'a PricingRule> {
    rules.iter().filter(|rule| rule.active && rule.scope.applies_to(variant)).max_by(|left, right| {
        left.scope
            .precedence()
            .cmp(&right.scope.precedence())
            .then_with(|| left.updated_at.cmp(&right.updated_at))
            .then_with(|| right.id.cmp(&left.id))
    })
}

/// Latest captured rate in JPY per USD.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxRate {
    pub jpy_per_usd: Decimal,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        select_cost_basis, select_pricing_rule, CostBasisRecord, CostSource, PricingRule, RuleScope,
    };
    use crate::{
        domain::{
            catalog::{Category, VariantId, VariantSnapshot},
            supplier::{Availability, SupplierId},
        },
        pricing::RoundingStrategy,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 12, 0, 0).single().expect("timestamp")
    }

    fn record(cost: i64, days_ago: i64, availability: Availability, source: CostSource) -> CostBasisRecord {
        CostBasisRecord {
            variant_id: VariantId("v-1".to_string()),
            supplier_id: Some(SupplierId("supplier-a".to_string())),
            cost_per_pack: Decimal::from(cost),
            availability,
            source,
            captured_at: now() - Duration::days(days_ago),
        }
    }

    fn variant() -> VariantSnapshot {
        VariantSnapshot {
            id: VariantId("v-1".to_string()),
            sku: "BOLT-M6-20-10".to_string(),
            category: Category::Bolt,
            size: "M6".to_string(),
            pack_qty: 10,
            current_price_cents: 899,
            active: true,
        }
    }

    fn rule(id: &str, scope: RuleScope, days_ago: i64) -> PricingRule {
        PricingRule {
            id: id.to_string(),
            scope,
            target_margin: Decimal::new(35, 2),
            min_price_cents: None,
            max_price_cents: None,
            rounding: RoundingStrategy::Usd099,
            max_weekly_change: Decimal::new(10, 2),
            allow_override: false,
            active: true,
            updated_at: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn cheapest_recent_record_wins() {
        let records = vec![
            record(500, 1, Availability::InStock, CostSource::Manual),
            record(400, 5, Availability::Limited, CostSource::Import),
            record(300, 2, Availability::Backorder, CostSource::SupplierOffer),
            record(200, 45, Availability::InStock, CostSource::SupplierOffer),
        ];

        let selected = select_cost_basis(&records, now(), 30).expect("selection");
        assert_eq!(selected.record.cost_per_pack, Decimal::from(400));
        assert!(!selected.low_confidence);
    }

    #[test]
    fn equal_costs_prefer_supplier_offers_then_newest() {
        let records = vec![
            record(400, 1, Availability::InStock, CostSource::Manual),
            record(400, 9, Availability::InStock, CostSource::SupplierOffer),
            record(400, 3, Availability::InStock, CostSource::SupplierOffer),
        ];

        let selected = select_cost_basis(&records, now(), 30).expect("selection");
        assert_eq!(selected.record.source, CostSource::SupplierOffer);
        assert_eq!(selected.record.captured_at, now() - Duration::days(3));
    }

    #[test]
    fn falls_back_to_newest_record_with_low_confidence() {
        let records = vec![
            record(200, 60, Availability::InStock, CostSource::SupplierOffer),
            record(900, 2, Availability::Backorder, CostSource::SupplierOffer),
        ];

        let selected = select_cost_basis(&records, now(), 30).expect("selection");
        assert_eq!(selected.record.cost_per_pack, Decimal::from(900));
        assert!(selected.low_confidence);

        assert!(select_cost_basis(&[], now(), 30).is_none());
    }

    #[test]
    fn rule_precedence_prefers_most_specific_scope() {
        let mut rules = vec![
            rule("global", RuleScope::Global, 0),
            rule("bolts", RuleScope::Category(Category::Bolt), 0),
            rule("m6", RuleScope::Size("m6".to_string()), 5),
            rule("nuts", RuleScope::Category(Category::Nut), 0),
        ];
        assert_eq!(select_pricing_rule(&rules, &variant()).map(|r| r.id.as_str()), Some("m6"));

        rules.push(rule("exact", RuleScope::Variant(VariantId("v-1".to_string())), 30));
        assert_eq!(select_pricing_rule(&rules, &variant()).map(|r| r.id.as_str()), Some("exact"));

        rules.iter_mut().for_each(|rule| rule.active = rule.id == "nuts");
        assert!(select_pricing_rule(&rules, &variant()).is_none());
    }

    #[test]
    fn same_scope_rules_resolve_to_newest_then_id() {
        let rules = vec![
            rule("b-older", RuleScope::Global, 3),
            rule("c-newer", RuleScope::Global, 1),
            rule("a-newer", RuleScope::Global, 1),
        ];
        assert_eq!(select_pricing_rule(&rules, &variant()).map(|r| r.id.as_str()), Some("a-newer"));
    }

    #[test]
    fn scope_round_trips_through_storage_parts() {
        let scope = RuleScope::Category(Category::Washer);
        let parsed =
            RuleScope::from_parts(scope.kind(), scope.value().as_deref()).expect("parse scope");
        assert_eq!(parsed, scope);
        assert!(RuleScope::from_parts("size", None).is_err());
    }
}
