//! Offer matching: joins one order line against the whole offer pool.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{
    catalog::OrderLineSpec,
    supplier::{OfferId, SupplierOffer},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    None,
    Fallback,
    Partial,
    Exact,
}

/// Named matching pass. Passes run in declaration order and the first pass to
/// claim an offer keeps it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    ExactVariant,
    WildcardSpec,
    CategorySizePack,
    SupplierDefault,
}

impl MatchRule {
    pub const PASSES: [MatchRule; 4] = [
        MatchRule::ExactVariant,
        MatchRule::WildcardSpec,
        MatchRule::CategorySizePack,
        MatchRule::SupplierDefault,
    ];

    pub fn quality(&self) -> MatchQuality {
        match self {
            Self::ExactVariant => MatchQuality::Exact,
            Self::WildcardSpec | Self::CategorySizePack => MatchQuality::Partial,
            Self::SupplierDefault => MatchQuality::Fallback,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Self::ExactVariant => 1.0,
            Self::WildcardSpec | Self::CategorySizePack => 0.6,
            Self::SupplierDefault => 0.3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactVariant => "exact_variant",
            Self::WildcardSpec => "wildcard_spec",
            Self::CategorySizePack => "category_size_pack",
            Self::SupplierDefault => "supplier_default",
        }
    }

    fn matches(&self, line: &OrderLineSpec, offer: &SupplierOffer) -> bool {
        match self {
            Self::ExactVariant => {
                offer.variant_id.as_ref() == Some(&line.variant_id)
                    && offer.pack_compatible(line.pack_qty)
            }
            Self::WildcardSpec => {
                offer.variant_id.is_none()
                    && offer.category.accepts(&line.category)
                    && offer.size.accepts(&line.size)
                    && offer.length_mm.accepts_opt(line.length_mm.as_ref())
                    && offer.strength_class.accepts_opt(line.strength_class.as_ref())
                    && offer.finish.accepts(&line.finish)
                    && offer.pack_compatible(line.pack_qty)
            }
            Self::CategorySizePack => {
                offer.variant_id.is_none()
                    && offer.category.specific() == Some(&line.category)
                    && offer.size.specific().is_some_and(|size| size.eq_ignore_ascii_case(&line.size))
                    && offer.pack_compatible(line.pack_qty)
            }
            Self::SupplierDefault => {
                offer.variant_id.is_none()
                    && offer.category.accepts(&line.category)
                    && offer.size.is_any()
                    && offer.pack_compatible(line.pack_qty)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchedOffer {
    pub offer: SupplierOffer,
    pub quality: MatchQuality,
    pub score: f64,
    pub rule: MatchRule,
}

impl MatchedOffer {
    fn new(offer: &SupplierOffer, rule: MatchRule) -> Self {
        Self { offer: offer.clone(), quality: rule.quality(), score: rule.score(), rule }
    }
}

/// Returns every viable offer for `line`, ranked.
///
/// Ranking is match score descending, then availability score descending,
/// then most recently updated first. Remaining ties keep pass order and then
/// pool order, so the output is fully determined by the input.
pub fn match_offers(line: &OrderLineSpec, pool: &[SupplierOffer]) -> Vec<MatchedOffer> {
    let mut seen: HashSet<&OfferId> = HashSet::new();
    let mut matched = Vec::new();

    for rule in MatchRule::PASSES {
        for offer in pool {
            if seen.contains(&offer.id) || !rule.matches(line, offer) {
                continue;
            }
            seen.insert(&offer.id);
            matched.push(MatchedOffer::new(offer, rule));
        }
    }

    matched.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| right.offer.availability.score().total_cmp(&left.offer.availability.score()))
            .then_with(|| right.offer.updated_at.cmp(&left.offer.updated_at))
    });

    matched
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{match_offers, MatchQuality, MatchRule};
    use crate::domain::{
        catalog::{Category, OrderLineSpec, VariantId},
        supplier::{Availability, OfferId, SpecField, SupplierId, SupplierOffer},
    };

    fn line() -> OrderLineSpec {
        OrderLineSpec {
            variant_id: VariantId("hex-bolt-m6-20-8.8-zinc-10".to_string()),
            category: Category::Bolt,
            size: "M6".to_string(),
            length_mm: Some(20),
            strength_class: Some("8.8".to_string()),
            finish: "zinc".to_string(),
            pack_qty: 10,
        }
    }

    fn wildcard(id: &str, supplier: &str) -> SupplierOffer {
        SupplierOffer {
            id: OfferId(id.to_string()),
            supplier_id: SupplierId(supplier.to_string()),
            variant_id: None,
            category: SpecField::Any,
            size: SpecField::Any,
            length_mm: SpecField::Any,
            strength_class: SpecField::Any,
            finish: SpecField::Any,
            pack_qty: SpecField::Any,
            unit_cost_jpy: Decimal::new(100, 0),
            min_order_packs: 1,
            lead_time_days: 3,
            availability: Availability::InStock,
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("timestamp"),
        }
    }

    fn exact(id: &str, supplier: &str) -> SupplierOffer {
        SupplierOffer { variant_id: Some(line().variant_id), ..wildcard(id, supplier) }
    }

    #[test]
    fn exact_match_outranks_partial_regardless_of_order_and_freshness() {
        let mut exact_offer = exact("o-exact", "s-1");
        exact_offer.availability = Availability::Backorder;
        let mut partial = wildcard("o-partial", "s-2");
        partial.category = SpecField::Specific(Category::Bolt);
        partial.size = SpecField::Specific("M6".to_string());
        partial.updated_at = exact_offer.updated_at + Duration::days(30);

        for pool in [vec![partial.clone(), exact_offer.clone()], vec![exact_offer.clone(), partial.clone()]] {
            let matched = match_offers(&line(), &pool);
            assert_eq!(matched[0].offer.id, OfferId("o-exact".to_string()));
            assert_eq!(matched[0].quality, MatchQuality::Exact);
            assert_eq!(matched[1].quality, MatchQuality::Partial);
        }
    }

    #[test]
    fn each_offer_appears_once_under_its_highest_priority_pass() {
        let mut offer = wildcard("o-1", "s-1");
        offer.category = SpecField::Specific(Category::Bolt);
        offer.size = SpecField::Specific("M6".to_string());

        let matched = match_offers(&line(), &[offer]);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].rule, MatchRule::WildcardSpec);
        assert!((matched[0].score - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn category_size_pass_ignores_case_and_other_fields() {
        let mut offer = wildcard("o-1", "s-1");
        offer.category = SpecField::Specific(Category::Bolt);
        offer.size = SpecField::Specific("m6".to_string());
        offer.finish = SpecField::Specific("black oxide".to_string());

        let matched = match_offers(&line(), &[offer]);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].rule, MatchRule::CategorySizePack);
    }

    #[test]
    fn blanket_category_offer_is_a_fallback() {
        let mut offer = wildcard("o-1", "s-1");
        offer.category = SpecField::Specific(Category::Bolt);
        offer.finish = SpecField::Specific("stainless".to_string());

        let matched = match_offers(&line(), &[offer]);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].quality, MatchQuality::Fallback);
        assert!((matched[0].score - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn mismatched_offers_are_dropped() {
        let mut other_variant = wildcard("o-variant", "s-1");
        other_variant.variant_id = Some(VariantId("hex-nut-m6".to_string()));
        let mut other_pack = exact("o-pack", "s-1");
        other_pack.pack_qty = SpecField::Specific(50);
        let mut other_category = wildcard("o-category", "s-2");
        other_category.category = SpecField::Specific(Category::Washer);
        let mut pinned_length = wildcard("o-length", "s-3");
        pinned_length.size = SpecField::Specific("M6".to_string());
        pinned_length.length_mm = SpecField::Specific(40);

        let matched = match_offers(&line(), &[other_variant, other_pack, other_category, pinned_length]);

        assert!(matched.is_empty(), "unexpected matches: {matched:?}");
    }

    #[test]
    fn ties_on_score_rank_by_availability_then_recency() {
        let mut limited = wildcard("o-limited", "s-1");
        limited.availability = Availability::Limited;
        let mut stale = wildcard("o-stale", "s-2");
        stale.updated_at = stale.updated_at - Duration::days(10);
        let fresh = wildcard("o-fresh", "s-3");

        let matched = match_offers(&line(), &[limited, stale, fresh]);
        let order: Vec<&str> = matched.iter().map(|m| m.offer.id.0.as_str()).collect();

        assert_eq!(order, vec!["o-fresh", "o-stale", "o-limited"]);
    }

    #[test]
    fn matching_is_deterministic() {
        let pool = vec![wildcard("o-1", "s-1"), exact("o-2", "s-2"), wildcard("o-3", "s-3")];
        assert_eq!(match_offers(&line(), &pool), match_offers(&line(), &pool));
    }
}
