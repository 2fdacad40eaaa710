use std::collections::{BTreeMap, HashSet};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{match_offers, MatchedOffer, RoutingError};
use crate::domain::{
    catalog::{OrderLineSpec, VariantId},
    supplier::{Availability, OfferId, SupplierId, SupplierOffer},
};

/// Final scores closer than this are treated as tied.
const SCORE_TIE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingStrategy {
    Cheapest,
    Fastest,
    Balanced,
    AvailabilityFirst,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheapest => "CHEAPEST",
            Self::Fastest => "FASTEST",
            Self::Balanced => "BALANCED",
            Self::AvailabilityFirst => "AVAILABILITY_FIRST",
        }
    }
}

impl std::str::FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CHEAPEST" => Ok(Self::Cheapest),
            "FASTEST" => Ok(Self::Fastest),
            "BALANCED" => Ok(Self::Balanced),
            "AVAILABILITY_FIRST" => Ok(Self::AvailabilityFirst),
            other => Err(format!(
                "unsupported routing strategy `{other}` (expected CHEAPEST|FASTEST|BALANCED|AVAILABILITY_FIRST)"
            )),
        }
    }
}

/// Linear-combination coefficients for [`RoutingStrategy::Balanced`].
/// They are used as given and need not sum to 1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingWeights {
    pub cost: f64,
    pub lead: f64,
    pub availability: f64,
    #[serde(rename = "match")]
    pub matching: f64,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self { cost: 0.4, lead: 0.2, availability: 0.2, matching: 0.2 }
    }
}

impl RoutingWeights {
    pub fn validate(&self) -> Result<(), RoutingError> {
        let named =
            [("cost", self.cost), ("lead", self.lead), ("availability", self.availability), ("match", self.matching)];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(RoutingError::InvalidWeights(format!(
                    "weight `{name}` must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub strategy: RoutingStrategy,
    pub weights: RoutingWeights,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { enabled: true, strategy: RoutingStrategy::Balanced, weights: RoutingWeights::default() }
    }
}

/// Order line before matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_id: String,
    pub spec: OrderLineSpec,
    pub qty_packs: u32,
}

/// Order line together with its matched candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingLine {
    pub line_id: String,
    pub spec: OrderLineSpec,
    pub qty_packs: u32,
    pub candidates: Vec<MatchedOffer>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub supplier_id: SupplierId,
    pub offer_id: OfferId,
    pub effective_packs: u32,
    pub unit_cost_jpy: Decimal,
    pub estimated_cost_jpy: Decimal,
    pub lead_time_days: u32,
    pub availability: Availability,
    pub match_score: f64,
    pub cost_score: f64,
    pub lead_score: f64,
    pub availability_score: f64,
    pub match_score_normalized: f64,
    pub final_score: f64,
}

/// Outcome for one order line. `chosen_supplier_id` is `None` exactly when
/// `needs_manual_assignment` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingLineDecision {
    pub line_id: String,
    pub variant_id: VariantId,
    pub qty_packs: u32,
    pub strategy: RoutingStrategy,
    pub chosen_supplier_id: Option<SupplierId>,
    pub chosen_offer_id: Option<OfferId>,
    pub scores: Vec<CandidateScore>,
    pub reason: String,
    pub needs_manual_assignment: bool,
}

impl RoutingLineDecision {
    fn manual(line: &RoutingLine, strategy: RoutingStrategy, reason: impl Into<String>) -> Self {
        Self {
            line_id: line.line_id.clone(),
            variant_id: line.spec.variant_id.clone(),
            qty_packs: line.qty_packs,
            strategy,
            chosen_supplier_id: None,
            chosen_offer_id: None,
            scores: Vec::new(),
            reason: reason.into(),
            needs_manual_assignment: true,
        }
    }

    pub fn chosen_score(&self) -> Option<&CandidateScore> {
        let offer_id = self.chosen_offer_id.as_ref()?;
        self.scores.iter().find(|score| &score.offer_id == offer_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskLine {
    pub line_id: String,
    pub variant_id: VariantId,
    pub offer_id: OfferId,
    pub qty_packs: u32,
    pub effective_packs: u32,
    pub unit_cost_jpy: Decimal,
    pub estimated_cost_jpy: Decimal,
    pub lead_time_days: u32,
}

/// Everything routed to one supplier in a pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupplierTaskGroup {
    pub supplier_id: SupplierId,
    /// Sum of effective (minimum-order adjusted) packs.
    pub total_packs: u32,
    pub estimated_cost_jpy: Decimal,
    /// Slowest chosen offer in the group.
    pub lead_time_days: u32,
    pub lines: Vec<TaskLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualAssignment {
    pub line_id: String,
    pub variant_id: VariantId,
    pub qty_packs: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub strategy: RoutingStrategy,
    pub decisions: Vec<RoutingLineDecision>,
    pub by_supplier: Vec<SupplierTaskGroup>,
    pub needs_assignment: Vec<ManualAssignment>,
}

/// Matches every line against `offers` and routes the result with the
/// configured strategy. A disabled config sends every line to manual
/// assignment.
pub fn route_order(
    lines: &[OrderLine],
    offers: &[SupplierOffer],
    config: &RoutingConfig,
) -> Result<RoutingOutcome, RoutingError> {
    let routing_lines: Vec<RoutingLine> = lines
        .iter()
        .map(|line| RoutingLine {
            line_id: line.line_id.clone(),
            spec: line.spec.clone(),
            qty_packs: line.qty_packs,
            candidates: if config.enabled { match_offers(&line.spec, offers) } else { Vec::new() },
        })
        .collect();

    if !config.enabled {
        validate_lines(&routing_lines)?;
        info!(
            event_name = "procurement.route.disabled",
            line_count = routing_lines.len(),
            "automatic routing disabled; all lines need manual assignment"
        );
        let decisions: Vec<RoutingLineDecision> = routing_lines
            .iter()
            .map(|line| {
                RoutingLineDecision::manual(line, config.strategy, "automatic routing is disabled")
            })
            .collect();
        return assemble(config.strategy, decisions, &routing_lines);
    }

    route_lines(&routing_lines, config.strategy, &config.weights)
}

/// Chooses one supplier per line and groups the chosen lines per supplier.
///
/// Final-score ties are broken by the lexicographically smallest supplier id.
pub fn route_lines(
    lines: &[RoutingLine],
    strategy: RoutingStrategy,
    weights: &RoutingWeights,
) -> Result<RoutingOutcome, RoutingError> {
    validate_lines(lines)?;
    if strategy == RoutingStrategy::Balanced {
        weights.validate()?;
    }

    let decisions = lines
        .iter()
        .map(|line| decide_line(line, strategy, weights))
        .collect::<Result<Vec<RoutingLineDecision>, RoutingError>>()?;

    let outcome = assemble(strategy, decisions, lines)?;
    info!(
        event_name = "procurement.route.completed",
        strategy = strategy.as_str(),
        line_count = outcome.decisions.len(),
        supplier_groups = outcome.by_supplier.len(),
        manual_lines = outcome.needs_assignment.len(),
        "routing pass completed"
    );
    Ok(outcome)
}

fn validate_lines(lines: &[RoutingLine]) -> Result<(), RoutingError> {
    let mut seen = HashSet::new();
    for line in lines {
        if line.qty_packs == 0 {
            return Err(RoutingError::InvalidQuantity { line_id: line.line_id.clone() });
        }
        if !seen.insert(line.line_id.as_str()) {
            return Err(RoutingError::DuplicateLine { line_id: line.line_id.clone() });
        }
    }
    Ok(())
}

fn decide_line(
    line: &RoutingLine,
    strategy: RoutingStrategy,
    weights: &RoutingWeights,
) -> Result<RoutingLineDecision, RoutingError> {
    let best = best_per_supplier(&line.candidates);
    if best.is_empty() {
        warn!(
            event_name = "procurement.route.manual_assignment",
            line_id = %line.line_id,
            variant_id = %line.spec.variant_id,
            "no supplier offer matches line"
        );
        return Ok(RoutingLineDecision::manual(
            line,
            strategy,
            format!("no supplier offer matches variant {}; assign manually", line.spec.variant_id),
        ));
    }

    let scores = score_candidates(line, &best, strategy, weights)?;

    let top = scores.iter().map(|score| score.final_score).fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<&CandidateScore> =
        scores.iter().filter(|score| (top - score.final_score).abs() <= SCORE_TIE_EPSILON).collect();
    let winner = tied
        .iter()
        .min_by(|left, right| left.supplier_id.cmp(&right.supplier_id))
        .copied()
        .unwrap_or(&scores[0]);

    let mut reason = describe_choice(strategy, winner);
    if tied.len() > 1 {
        reason.push_str(&format!(" (tied with {} other supplier(s); lowest supplier id wins)", tied.len() - 1));
    }

    debug!(
        event_name = "procurement.route.line_resolved",
        line_id = %line.line_id,
        supplier_id = %winner.supplier_id,
        offer_id = %winner.offer_id,
        final_score = winner.final_score,
        candidates = scores.len(),
        "line routed"
    );

    let chosen_supplier_id = Some(winner.supplier_id.clone());
    let chosen_offer_id = Some(winner.offer_id.clone());

    Ok(RoutingLineDecision {
        line_id: line.line_id.clone(),
        variant_id: line.spec.variant_id.clone(),
        qty_packs: line.qty_packs,
        strategy,
        chosen_supplier_id,
        chosen_offer_id,
        scores,
        reason,
        needs_manual_assignment: false,
    })
}

/// Keeps the highest-scoring candidate per supplier, newest offer on ties.
/// Suppliers stay in order of first appearance.
fn best_per_supplier(candidates: &[MatchedOffer]) -> Vec<&MatchedOffer> {
    let mut best: Vec<&MatchedOffer> = Vec::new();
    for candidate in candidates {
        match best.iter_mut().find(|kept| kept.offer.supplier_id == candidate.offer.supplier_id) {
            Some(kept) => {
                let better = candidate.score > kept.score
                    || (candidate.score == kept.score && candidate.offer.updated_at > kept.offer.updated_at);
                if better {
                    *kept = candidate;
                }
            }
            None => best.push(candidate),
        }
    }
    best
}

fn score_candidates(
    line: &RoutingLine,
    candidates: &[&MatchedOffer],
    strategy: RoutingStrategy,
    weights: &RoutingWeights,
) -> Result<Vec<CandidateScore>, RoutingError> {
    let priced = candidates
        .iter()
        .map(|candidate| {
            let effective = line.qty_packs.max(candidate.offer.min_order_packs);
            candidate
                .offer
                .unit_cost_jpy
                .checked_mul(Decimal::from(effective))
                .map(|cost| (effective, cost))
                .ok_or_else(|| RoutingError::CostOverflow { line_id: line.line_id.clone() })
        })
        .collect::<Result<Vec<(u32, Decimal)>, RoutingError>>()?;

    let costs: Vec<f64> = priced.iter().map(|(_, cost)| cost.to_f64().unwrap_or_default()).collect();
    let leads: Vec<f64> = candidates.iter().map(|c| f64::from(c.offer.lead_time_days)).collect();
    let matches: Vec<f64> = candidates.iter().map(|c| c.score).collect();

    let cost_scores = inverse_normalize(&costs);
    let lead_scores = inverse_normalize(&leads);
    let match_scores = direct_normalize(&matches);

    let scores = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let offer = &candidate.offer;
            let availability_score = offer.availability.score();
            let final_score = match strategy {
                RoutingStrategy::Cheapest => cost_scores[index],
                RoutingStrategy::Fastest => lead_scores[index],
                RoutingStrategy::AvailabilityFirst => availability_score,
                RoutingStrategy::Balanced => {
                    weights.cost * cost_scores[index]
                        + weights.lead * lead_scores[index]
                        + weights.availability * availability_score
                        + weights.matching * match_scores[index]
                }
            };
            let (effective_packs, estimated_cost_jpy) = priced[index];

            CandidateScore {
                supplier_id: offer.supplier_id.clone(),
                offer_id: offer.id.clone(),
                effective_packs,
                unit_cost_jpy: offer.unit_cost_jpy,
                estimated_cost_jpy,
                lead_time_days: offer.lead_time_days,
                availability: offer.availability,
                match_score: candidate.score,
                cost_score: cost_scores[index],
                lead_score: lead_scores[index],
                availability_score,
                match_score_normalized: match_scores[index],
                final_score,
            }
        })
        .collect();
    Ok(scores)
}

fn describe_choice(strategy: RoutingStrategy, winner: &CandidateScore) -> String {
    match strategy {
        RoutingStrategy::Cheapest => format!(
            "CHEAPEST: supplier {} quoted JPY {} for {} pack(s)",
            winner.supplier_id, winner.estimated_cost_jpy, winner.effective_packs
        ),
        RoutingStrategy::Fastest => format!(
            "FASTEST: supplier {} ships in {} day(s)",
            winner.supplier_id, winner.lead_time_days
        ),
        RoutingStrategy::AvailabilityFirst => format!(
            "AVAILABILITY_FIRST: supplier {} reports {}",
            winner.supplier_id,
            winner.availability.as_str()
        ),
        RoutingStrategy::Balanced => format!(
            "BALANCED: supplier {} scored {:.3} (cost {:.2}, lead {:.2}, availability {:.2}, match {:.2})",
            winner.supplier_id,
            winner.final_score,
            winner.cost_score,
            winner.lead_score,
            winner.availability_score,
            winner.match_score_normalized
        ),
    }
}

/// Lowest value scores 1.0, highest 0.0. All-equal inputs score 1.0.
fn inverse_normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = bounds(values);
    if max - min <= f64::EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|value| (max - value) / (max - min)).collect()
}

/// Highest value scores 1.0, lowest 0.0. All-equal inputs score 1.0.
fn direct_normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = bounds(values);
    if max - min <= f64::EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|value| (value - min) / (max - min)).collect()
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
        (min.min(*value), max.max(*value))
    })
}

fn assemble(
    strategy: RoutingStrategy,
    decisions: Vec<RoutingLineDecision>,
    lines: &[RoutingLine],
) -> Result<RoutingOutcome, RoutingError> {
    let mut groups: BTreeMap<SupplierId, SupplierTaskGroup> = BTreeMap::new();
    let mut needs_assignment = Vec::new();

    for (decision, line) in decisions.iter().zip(lines) {
        let (Some(supplier_id), Some(score)) = (&decision.chosen_supplier_id, decision.chosen_score())
        else {
            needs_assignment.push(ManualAssignment {
                line_id: line.line_id.clone(),
                variant_id: line.spec.variant_id.clone(),
                qty_packs: line.qty_packs,
            });
            continue;
        };

        let group = groups.entry(supplier_id.clone()).or_insert_with(|| SupplierTaskGroup {
            supplier_id: supplier_id.clone(),
            total_packs: 0,
            estimated_cost_jpy: Decimal::ZERO,
            lead_time_days: 0,
            lines: Vec::new(),
        });
        group.total_packs = group.total_packs.saturating_add(score.effective_packs);
        group.estimated_cost_jpy = group
            .estimated_cost_jpy
            .checked_add(score.estimated_cost_jpy)
            .ok_or_else(|| RoutingError::CostOverflow { line_id: line.line_id.clone() })?;
        group.lead_time_days = group.lead_time_days.max(score.lead_time_days);
        group.lines.push(TaskLine {
            line_id: line.line_id.clone(),
            variant_id: line.spec.variant_id.clone(),
            offer_id: score.offer_id.clone(),
            qty_packs: line.qty_packs,
            effective_packs: score.effective_packs,
            unit_cost_jpy: score.unit_cost_jpy,
            estimated_cost_jpy: score.estimated_cost_jpy,
            lead_time_days: score.lead_time_days,
        });
    }

    Ok(RoutingOutcome {
        strategy,
        decisions,
        by_supplier: groups.into_values().collect(),
        needs_assignment,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        direct_normalize, inverse_normalize, route_lines, route_order, OrderLine, RoutingConfig,
        RoutingLine, RoutingStrategy, RoutingWeights,
    };
    use crate::{
        domain::{
            catalog::{Category, OrderLineSpec, VariantId},
            supplier::{Availability, OfferId, SpecField, SupplierId, SupplierOffer},
        },
        procurement::{matcher::MatchRule, MatchedOffer, RoutingError},
    };

    fn spec(variant: &str) -> OrderLineSpec {
        OrderLineSpec {
            variant_id: VariantId(variant.to_string()),
            category: Category::Nut,
            size: "M8".to_string(),
            length_mm: None,
            strength_class: None,
            finish: "plain".to_string(),
            pack_qty: 20,
        }
    }

    fn offer(id: &str, supplier: &str, unit_cost: i64, min_packs: u32, lead: u32) -> SupplierOffer {
        SupplierOffer {
            id: OfferId(id.to_string()),
            supplier_id: SupplierId(supplier.to_string()),
            variant_id: None,
            category: SpecField::Specific(Category::Nut),
            size: SpecField::Any,
            length_mm: SpecField::Any,
            strength_class: SpecField::Any,
            finish: SpecField::Any,
            pack_qty: SpecField::Any,
            unit_cost_jpy: Decimal::new(unit_cost, 0),
            min_order_packs: min_packs,
            lead_time_days: lead,
            availability: Availability::InStock,
            updated_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).single().expect("timestamp"),
        }
    }

    fn matched(offer: SupplierOffer, rule: MatchRule) -> MatchedOffer {
        MatchedOffer { quality: rule.quality(), score: rule.score(), rule, offer }
    }

    fn line(id: &str, qty: u32, candidates: Vec<MatchedOffer>) -> RoutingLine {
        RoutingLine { line_id: id.to_string(), spec: spec(&format!("v-{id}")), qty_packs: qty, candidates }
    }

    #[test]
    fn cheapest_accounts_for_minimum_order_packs() {
        let lines = vec![line(
            "L1",
            1,
            vec![
                matched(offer("o-a", "supplier-a", 100, 2, 5), MatchRule::WildcardSpec),
                matched(offer("o-b", "supplier-b", 300, 1, 5), MatchRule::WildcardSpec),
            ],
        )];

        let outcome =
            route_lines(&lines, RoutingStrategy::Cheapest, &RoutingWeights::default()).expect("route");

        assert_eq!(outcome.decisions[0].chosen_supplier_id, Some(SupplierId("supplier-a".to_string())));
        assert_eq!(outcome.by_supplier.len(), 1);
        assert_eq!(outcome.by_supplier[0].estimated_cost_jpy, Decimal::new(200, 0));
        assert_eq!(outcome.by_supplier[0].total_packs, 2);
        assert_eq!(outcome.decisions[0].scores.len(), 2);
        assert!(outcome.decisions[0].reason.contains("supplier-a"));
    }

    #[test]
    fn fastest_and_availability_strategies_use_their_single_criterion() {
        let mut slow_in_stock = offer("o-a", "supplier-a", 100, 1, 10);
        slow_in_stock.availability = Availability::InStock;
        let mut fast_limited = offer("o-b", "supplier-b", 200, 1, 2);
        fast_limited.availability = Availability::Limited;
        let candidates = vec![
            matched(slow_in_stock, MatchRule::WildcardSpec),
            matched(fast_limited, MatchRule::WildcardSpec),
        ];
        let lines = vec![line("L1", 3, candidates)];

        let fastest =
            route_lines(&lines, RoutingStrategy::Fastest, &RoutingWeights::default()).expect("route");
        assert_eq!(fastest.decisions[0].chosen_supplier_id, Some(SupplierId("supplier-b".to_string())));

        let available = route_lines(&lines, RoutingStrategy::AvailabilityFirst, &RoutingWeights::default())
            .expect("route");
        assert_eq!(available.decisions[0].chosen_supplier_id, Some(SupplierId("supplier-a".to_string())));
    }

    #[test]
    fn balanced_uses_weights_verbatim() {
        let cheap_fallback = matched(offer("o-a", "supplier-a", 100, 1, 5), MatchRule::SupplierDefault);
        let mut exact_offer = offer("o-b", "supplier-b", 500, 1, 5);
        exact_offer.variant_id = Some(VariantId("v-L1".to_string()));
        let exact_match = matched(exact_offer, MatchRule::ExactVariant);
        let lines = vec![line("L1", 1, vec![exact_match, cheap_fallback])];

        let match_heavy = RoutingWeights { cost: 0.1, lead: 0.0, availability: 0.0, matching: 2.0 };
        let outcome = route_lines(&lines, RoutingStrategy::Balanced, &match_heavy).expect("route");
        let decision = &outcome.decisions[0];
        assert_eq!(decision.chosen_supplier_id, Some(SupplierId("supplier-b".to_string())));
        let chosen = decision.chosen_score().expect("chosen score");
        assert!((chosen.final_score - 2.0).abs() < 1e-9, "weights are not re-normalized");

        let cost_heavy = RoutingWeights { cost: 1.0, lead: 0.0, availability: 0.0, matching: 0.1 };
        let outcome = route_lines(&lines, RoutingStrategy::Balanced, &cost_heavy).expect("route");
        assert_eq!(outcome.decisions[0].chosen_supplier_id, Some(SupplierId("supplier-a".to_string())));
    }

    #[test]
    fn one_candidate_per_supplier_prefers_best_match_then_newest() {
        let older = offer("o-old", "supplier-a", 100, 1, 5);
        let mut newer = offer("o-new", "supplier-a", 900, 1, 5);
        newer.updated_at = older.updated_at + Duration::days(1);
        let fallback = offer("o-fallback", "supplier-a", 10, 1, 5);
        let lines = vec![line(
            "L1",
            1,
            vec![
                matched(older, MatchRule::WildcardSpec),
                matched(newer, MatchRule::WildcardSpec),
                matched(fallback, MatchRule::SupplierDefault),
            ],
        )];

        let outcome =
            route_lines(&lines, RoutingStrategy::Cheapest, &RoutingWeights::default()).expect("route");

        assert_eq!(outcome.decisions[0].scores.len(), 1);
        assert_eq!(outcome.decisions[0].chosen_offer_id, Some(OfferId("o-new".to_string())));
    }

    #[test]
    fn ties_break_on_lowest_supplier_id() {
        let lines = vec![line(
            "L1",
            1,
            vec![
                matched(offer("o-z", "supplier-z", 100, 1, 5), MatchRule::WildcardSpec),
                matched(offer("o-m", "supplier-m", 100, 1, 5), MatchRule::WildcardSpec),
            ],
        )];

        let outcome =
            route_lines(&lines, RoutingStrategy::Cheapest, &RoutingWeights::default()).expect("route");

        assert_eq!(outcome.decisions[0].chosen_supplier_id, Some(SupplierId("supplier-m".to_string())));
        assert!(outcome.decisions[0].reason.contains("lowest supplier id"));
    }

    #[test]
    fn unmatched_lines_go_to_manual_assignment_only() {
        let lines = vec![
            line("L1", 2, vec![matched(offer("o-a", "supplier-a", 100, 1, 5), MatchRule::WildcardSpec)]),
            line("L2", 4, Vec::new()),
            line("L3", 1, vec![matched(offer("o-a2", "supplier-a", 50, 1, 9), MatchRule::WildcardSpec)]),
        ];

        let outcome =
            route_lines(&lines, RoutingStrategy::Cheapest, &RoutingWeights::default()).expect("route");

        assert_eq!(outcome.decisions.len(), 3);
        let manual = &outcome.decisions[1];
        assert!(manual.needs_manual_assignment);
        assert!(manual.chosen_supplier_id.is_none());
        assert!(manual.chosen_offer_id.is_none());
        assert_eq!(outcome.needs_assignment.len(), 1);
        assert_eq!(outcome.needs_assignment[0].line_id, "L2");
        assert_eq!(outcome.needs_assignment[0].qty_packs, 4);

        assert_eq!(outcome.by_supplier.len(), 1);
        let group = &outcome.by_supplier[0];
        assert_eq!(group.lines.len(), 2);
        assert_eq!(group.total_packs, 3);
        assert_eq!(group.estimated_cost_jpy, Decimal::new(250, 0));
        assert_eq!(group.lead_time_days, 9, "slowest line governs the group");
    }

    #[test]
    fn invalid_input_fails_loudly() {
        let zero = vec![line("L1", 0, Vec::new())];
        assert_eq!(
            route_lines(&zero, RoutingStrategy::Cheapest, &RoutingWeights::default()),
            Err(RoutingError::InvalidQuantity { line_id: "L1".to_string() })
        );

        let duplicate = vec![line("L1", 1, Vec::new()), line("L1", 2, Vec::new())];
        assert_eq!(
            route_lines(&duplicate, RoutingStrategy::Cheapest, &RoutingWeights::default()),
            Err(RoutingError::DuplicateLine { line_id: "L1".to_string() })
        );

        let negative = RoutingWeights { cost: -1.0, ..RoutingWeights::default() };
        assert!(matches!(
            route_lines(&[line("L1", 1, Vec::new())], RoutingStrategy::Balanced, &negative),
            Err(RoutingError::InvalidWeights(_))
        ));
    }

    #[test]
    fn oversized_costs_are_errors_not_panics() {
        let mut huge = offer("o-a", "supplier-a", 1, 1_000, 5);
        huge.unit_cost_jpy = Decimal::from_i128_with_scale(10_i128.pow(27), 0);
        let lines = vec![OrderLine { line_id: "L1".to_string(), spec: spec("v-1"), qty_packs: 1 }];
        let config = RoutingConfig { strategy: RoutingStrategy::Cheapest, ..RoutingConfig::default() };

        assert_eq!(
            route_order(&lines, &[huge], &config),
            Err(RoutingError::CostOverflow { line_id: "L1".to_string() })
        );

        let mut at_limit = offer("o-b", "supplier-b", 1, 1, 5);
        at_limit.unit_cost_jpy = Decimal::MAX;
        let lines = vec![
            line("L1", 1, vec![matched(at_limit.clone(), MatchRule::WildcardSpec)]),
            line("L2", 1, vec![matched(at_limit, MatchRule::WildcardSpec)]),
        ];
        assert_eq!(
            route_lines(&lines, RoutingStrategy::Cheapest, &RoutingWeights::default()),
            Err(RoutingError::CostOverflow { line_id: "L2".to_string() })
        );
    }

    #[test]
    fn disabled_routing_sends_everything_to_manual() {
        let lines = vec![OrderLine { line_id: "L1".to_string(), spec: spec("v-1"), qty_packs: 1 }];
        let offers = vec![offer("o-a", "supplier-a", 100, 1, 5)];
        let config = RoutingConfig { enabled: false, ..RoutingConfig::default() };

        let outcome = route_order(&lines, &offers, &config).expect("route");

        assert!(outcome.by_supplier.is_empty());
        assert_eq!(outcome.needs_assignment.len(), 1);
        assert_eq!(outcome.decisions[0].reason, "automatic routing is disabled");
    }

    #[test]
    fn normalization_handles_equal_values() {
        assert_eq!(inverse_normalize(&[3.0, 3.0]), vec![1.0, 1.0]);
        assert_eq!(direct_normalize(&[0.6, 0.6, 0.6]), vec![1.0, 1.0, 1.0]);
        assert_eq!(inverse_normalize(&[10.0, 20.0, 15.0]), vec![1.0, 0.0, 0.5]);
        assert_eq!(direct_normalize(&[0.3, 1.0]), vec![0.0, 1.0]);
    }
}
