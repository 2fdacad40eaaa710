use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ShippingBand, ShippingError};

pub const DEFAULT_EXTRA_BAND_SURCHARGE_CENTS: i64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Carrier {
    JapanPost,
    Dhl,
}

impl Carrier {
    /// Carrier that threshold forcing and the Oceania heuristic prefer.
    pub const PREMIUM: Carrier = Carrier::Dhl;
    pub const STANDARD: Carrier = Carrier::JapanPost;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JapanPost => "JAPAN_POST",
            Self::Dhl => "DHL",
        }
    }
}

impl std::str::FromStr for Carrier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "JAPAN_POST" | "JAPANPOST" | "JP" => Ok(Self::JapanPost),
            "DHL" => Ok(Self::Dhl),
            other => Err(format!("unsupported carrier `{other}` (expected JAPAN_POST|DHL)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    Cheapest,
    Fastest,
    Default,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheapest => "CHEAPEST",
            Self::Fastest => "FASTEST",
            Self::Default => "DEFAULT",
        }
    }
}

impl std::str::FromStr for PolicyType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CHEAPEST" => Ok(Self::Cheapest),
            "FASTEST" => Ok(Self::Fastest),
            "DEFAULT" => Ok(Self::Default),
            other => Err(format!("unsupported carrier policy `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZone {
    pub name: String,
    pub countries: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRule {
    pub band: ShippingBand,
    pub carrier: Carrier,
    pub price_cents: i64,
    pub eta_min_days: u32,
    pub eta_max_days: u32,
    pub tracking_included: bool,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierPolicy {
    pub policy_type: PolicyType,
    pub default_carrier: Carrier,
    pub force_premium_over_weight_grams: Option<u32>,
    pub force_premium_over_subtotal_cents: Option<i64>,
}

impl Default for CarrierPolicy {
    fn default() -> Self {
        Self {
            policy_type: PolicyType::Default,
            default_carrier: Carrier::STANDARD,
            force_premium_over_weight_grams: None,
            force_premium_over_subtotal_cents: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceReason {
    Weight,
    Subtotal,
}

#[derive(Clone, Debug)]
pub struct CarrierQuoteRequest<'a> {
    pub zone: &'a str,
    /// May contain duplicates.
    pub bands: &'a [ShippingBand],
    pub subtotal_cents: i64,
    pub weight_grams: u32,
    pub policy: Option<&'a CarrierPolicy>,
    pub rules: &'a [ShippingRule],
    pub extra_band_surcharge_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierCandidate {
    pub carrier: Carrier,
    pub base_band: ShippingBand,
    pub base_price_cents: i64,
    pub surcharge_cents: i64,
    pub price_cents: i64,
    pub eta_min_days: u32,
    pub eta_max_days: u32,
    pub tracking_included: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierSelection {
    pub zone: String,
    pub bands: Vec<ShippingBand>,
    pub carrier: Carrier,
    pub price_cents: i64,
    pub base_price_cents: i64,
    pub surcharge_cents: i64,
    pub eta_min_days: u32,
    pub eta_max_days: u32,
    pub tracking_included: bool,
    pub policy_type: PolicyType,
    pub forced_premium: bool,
    pub forced_reason: Option<ForceReason>,
    pub candidates: Vec<CarrierCandidate>,
}

pub fn zone_for_country<'a>(zones: &'a [ShippingZone], country: &str) -> Option<&'a ShippingZone> {
    let country = country.trim();
    zones.iter().find(|zone| zone.countries.iter().any(|code| code.eq_ignore_ascii_case(country)))
}

/// Picks one carrier for a cart.
///
/// Carriers lacking a rule for any required band are never quoted. Forcing
/// thresholds win over the policy type, but only when the premium carrier has
/// a candidate. Zero candidates is a configuration gap and is returned as
/// [`ShippingError::NoCarrierCoverage`].
pub fn select_carrier(request: &CarrierQuoteRequest<'_>) -> Result<CarrierSelection, ShippingError> {
    let bands: BTreeSet<ShippingBand> = request.bands.iter().copied().collect();
    if bands.is_empty() {
        return Err(ShippingError::NoRequiredBands { zone: request.zone.to_string() });
    }

    let candidates = build_candidates(&bands, request.rules, request.extra_band_surcharge_cents);
    if candidates.is_empty() {
        return Err(ShippingError::NoCarrierCoverage { zone: request.zone.to_string() });
    }

    let fallback_policy = CarrierPolicy::default();
    let policy = request.policy.unwrap_or(&fallback_policy);

    if let Some(reason) = force_reason(policy, request.subtotal_cents, request.weight_grams) {
        if let Some(premium) = candidates.iter().find(|c| c.carrier == Carrier::PREMIUM) {
            info!(
                event_name = "shipping.carrier.forced",
                zone = request.zone,
                carrier = premium.carrier.as_str(),
                reason = ?reason,
                "premium carrier forced by policy threshold"
            );
            return Ok(selection(request.zone, &bands, premium, policy, Some(reason), &candidates));
        }
        debug!(
            event_name = "shipping.carrier.force_unavailable",
            zone = request.zone,
            reason = ?reason,
            "forcing threshold exceeded but premium carrier has no candidate"
        );
    }

    let chosen = match policy.policy_type {
        PolicyType::Cheapest => candidates.iter().min_by_key(|c| c.price_cents),
        PolicyType::Fastest => candidates.iter().min_by_key(|c| (c.eta_min_days, c.price_cents)),
        PolicyType::Default => {
            let heuristic = if request.zone.to_ascii_lowercase().contains("oceania") {
                Carrier::PREMIUM
            } else {
                Carrier::STANDARD
            };
            candidates
                .iter()
                .find(|c| c.carrier == policy.default_carrier)
                .or_else(|| candidates.iter().find(|c| c.carrier == heuristic))
                .or_else(|| candidates.first())
        }
    };

    let chosen = chosen.ok_or_else(|| ShippingError::NoCarrierCoverage {
        zone: request.zone.to_string(),
    })?;

    Ok(selection(request.zone, &bands, chosen, policy, None, &candidates))
}

fn build_candidates(
    bands: &BTreeSet<ShippingBand>,
    rules: &[ShippingRule],
    extra_band_surcharge_cents: i64,
) -> Vec<CarrierCandidate> {
    // First rule per (carrier, band) wins.
    let mut by_carrier: BTreeMap<Carrier, BTreeMap<ShippingBand, &ShippingRule>> = BTreeMap::new();
    for rule in rules {
        by_carrier.entry(rule.carrier).or_default().entry(rule.band).or_insert(rule);
    }

    let extra_bands = i64::try_from(bands.len().saturating_sub(1)).unwrap_or(i64::MAX);

    by_carrier
        .into_iter()
        .filter_map(|(carrier, priced)| {
            let covering: Vec<&ShippingRule> =
                bands.iter().map(|band| priced.get(band).copied()).collect::<Option<_>>()?;

            let base = covering.iter().max_by_key(|rule| (rule.price_cents, rule.band))?;
            let surcharge_cents = extra_band_surcharge_cents.saturating_mul(extra_bands);

            Some(CarrierCandidate {
                carrier,
                base_band: base.band,
                base_price_cents: base.price_cents,
                surcharge_cents,
                price_cents: base.price_cents.saturating_add(surcharge_cents),
                eta_min_days: covering.iter().map(|rule| rule.eta_min_days).max().unwrap_or(0),
                eta_max_days: covering.iter().map(|rule| rule.eta_max_days).max().unwrap_or(0),
                tracking_included: covering.iter().all(|rule| rule.tracking_included),
            })
        })
        .collect()
}

fn force_reason(policy: &CarrierPolicy, subtotal_cents: i64, weight_grams: u32) -> Option<ForceReason> {
    if policy.force_premium_over_weight_grams.is_some_and(|limit| weight_grams > limit) {
        return Some(ForceReason::Weight);
    }
    if policy.force_premium_over_subtotal_cents.is_some_and(|limit| subtotal_cents > limit) {
        return Some(ForceReason::Subtotal);
    }
    None
}

fn selection(
    zone: &str,
    bands: &BTreeSet<ShippingBand>,
    chosen: &CarrierCandidate,
    policy: &CarrierPolicy,
    forced_reason: Option<ForceReason>,
    candidates: &[CarrierCandidate],
) -> CarrierSelection {
    CarrierSelection {
        zone: zone.to_string(),
        bands: bands.iter().copied().collect(),
        carrier: chosen.carrier,
        price_cents: chosen.price_cents,
        base_price_cents: chosen.base_price_cents,
        surcharge_cents: chosen.surcharge_cents,
        eta_min_days: chosen.eta_min_days,
        eta_max_days: chosen.eta_max_days,
        tracking_included: chosen.tracking_included,
        policy_type: policy.policy_type,
        forced_premium: forced_reason.is_some(),
        forced_reason,
        candidates: candidates.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        select_carrier, zone_for_country, Carrier, CarrierPolicy, CarrierQuoteRequest, ForceReason,
        PolicyType, ShippingRule, ShippingZone, DEFAULT_EXTRA_BAND_SURCHARGE_CENTS,
    };
    use crate::shipping::{ShippingBand, ShippingError};

    fn rule(band: ShippingBand, carrier: Carrier, price_cents: i64, eta: (u32, u32)) -> ShippingRule {
        ShippingRule {
            band,
            carrier,
            price_cents,
            eta_min_days: eta.0,
            eta_max_days: eta.1,
            tracking_included: carrier == Carrier::Dhl,
            notes: None,
        }
    }

    fn zone_rules() -> Vec<ShippingRule> {
        vec![
            rule(ShippingBand::Small, Carrier::JapanPost, 800, (7, 14)),
            rule(ShippingBand::Medium, Carrier::JapanPost, 1_200, (7, 14)),
            rule(ShippingBand::Bulk, Carrier::JapanPost, 2_000, (10, 20)),
            rule(ShippingBand::Small, Carrier::Dhl, 2_500, (2, 4)),
            rule(ShippingBand::Medium, Carrier::Dhl, 3_000, (3, 5)),
            rule(ShippingBand::Bulk, Carrier::Dhl, 4_500, (3, 6)),
        ]
    }

    fn request<'a>(
        zone: &'a str,
        bands: &'a [ShippingBand],
        subtotal_cents: i64,
        policy: Option<&'a CarrierPolicy>,
        rules: &'a [ShippingRule],
    ) -> CarrierQuoteRequest<'a> {
        CarrierQuoteRequest {
            zone,
            bands,
            subtotal_cents,
            weight_grams: 500,
            policy,
            rules,
            extra_band_surcharge_cents: DEFAULT_EXTRA_BAND_SURCHARGE_CENTS,
        }
    }

    #[test]
    fn subtotal_threshold_forces_premium_carrier() {
        let rules = zone_rules();
        let policy = CarrierPolicy {
            policy_type: PolicyType::Cheapest,
            default_carrier: Carrier::JapanPost,
            force_premium_over_weight_grams: None,
            force_premium_over_subtotal_cents: Some(20_000),
        };
        let bands = [ShippingBand::Small, ShippingBand::Medium];

        let selection = select_carrier(&request("North America", &bands, 25_000, Some(&policy), &rules))
            .expect("selection");

        assert_eq!(selection.carrier, Carrier::Dhl);
        assert!(selection.forced_premium);
        assert_eq!(selection.forced_reason, Some(ForceReason::Subtotal));
        assert_eq!(selection.price_cents, 3_000 + DEFAULT_EXTRA_BAND_SURCHARGE_CENTS);
        assert_eq!(selection.base_price_cents, 3_000);
    }

    #[test]
    fn weight_threshold_is_checked_before_subtotal() {
        let rules = zone_rules();
        let policy = CarrierPolicy {
            policy_type: PolicyType::Cheapest,
            default_carrier: Carrier::JapanPost,
            force_premium_over_weight_grams: Some(100),
            force_premium_over_subtotal_cents: Some(100),
        };
        let bands = [ShippingBand::Bulk];

        let selection =
            select_carrier(&request("Europe", &bands, 50_000, Some(&policy), &rules)).expect("selection");

        assert_eq!(selection.forced_reason, Some(ForceReason::Weight));
        assert_eq!(selection.carrier, Carrier::Dhl);
    }

    #[test]
    fn forcing_without_premium_candidate_falls_back_to_policy() {
        let rules: Vec<ShippingRule> =
            zone_rules().into_iter().filter(|rule| rule.carrier == Carrier::JapanPost).collect();
        let policy = CarrierPolicy {
            force_premium_over_subtotal_cents: Some(1),
            ..CarrierPolicy::default()
        };
        let bands = [ShippingBand::Small];

        let selection =
            select_carrier(&request("Asia", &bands, 10_000, Some(&policy), &rules)).expect("selection");

        assert_eq!(selection.carrier, Carrier::JapanPost);
        assert!(!selection.forced_premium);
        assert_eq!(selection.forced_reason, None);
    }

    #[test]
    fn duplicate_bands_are_deduplicated_before_surcharge() {
        let rules = zone_rules();
        let bands = [ShippingBand::Medium, ShippingBand::Medium, ShippingBand::Small, ShippingBand::Small];

        let selection = select_carrier(&request("Asia", &bands, 1_000, None, &rules)).expect("selection");

        assert_eq!(selection.bands, vec![ShippingBand::Small, ShippingBand::Medium]);
        assert_eq!(selection.surcharge_cents, DEFAULT_EXTRA_BAND_SURCHARGE_CENTS);
        assert_eq!(selection.price_cents, 1_200 + DEFAULT_EXTRA_BAND_SURCHARGE_CENTS);
    }

    #[test]
    fn slowest_band_governs_eta_and_tracking_requires_all_bands() {
        let mut rules = zone_rules();
        rules[4].tracking_included = false;
        let policy = CarrierPolicy { policy_type: PolicyType::Fastest, ..CarrierPolicy::default() };
        let bands = [ShippingBand::Small, ShippingBand::Medium];

        let selection =
            select_carrier(&request("Asia", &bands, 1_000, Some(&policy), &rules)).expect("selection");

        assert_eq!(selection.carrier, Carrier::Dhl);
        assert_eq!((selection.eta_min_days, selection.eta_max_days), (3, 5));
        assert!(!selection.tracking_included);
    }

    #[test]
    fn carriers_missing_a_band_are_excluded() {
        let rules: Vec<ShippingRule> = zone_rules()
            .into_iter()
            .filter(|rule| !(rule.carrier == Carrier::JapanPost && rule.band == ShippingBand::Bulk))
            .collect();
        let policy = CarrierPolicy { policy_type: PolicyType::Cheapest, ..CarrierPolicy::default() };
        let bands = [ShippingBand::Small, ShippingBand::Bulk];

        let selection =
            select_carrier(&request("Asia", &bands, 1_000, Some(&policy), &rules)).expect("selection");

        assert_eq!(selection.candidates.len(), 1);
        assert_eq!(selection.carrier, Carrier::Dhl);
    }

    #[test]
    fn zero_coverage_is_a_hard_failure() {
        let rules = vec![rule(ShippingBand::Small, Carrier::JapanPost, 800, (7, 14))];
        let bands = [ShippingBand::Bulk];

        let error = select_carrier(&request("Africa", &bands, 1_000, None, &rules))
            .expect_err("no rule covers bulk");

        assert_eq!(error, ShippingError::NoCarrierCoverage { zone: "Africa".to_string() });
    }

    #[test]
    fn default_policy_prefers_configured_carrier_then_any_covering_carrier() {
        let rules: Vec<ShippingRule> = zone_rules();
        let policy = CarrierPolicy {
            policy_type: PolicyType::Default,
            default_carrier: Carrier::Dhl,
            ..CarrierPolicy::default()
        };
        let bands = [ShippingBand::Small];

        let selection =
            select_carrier(&request("Asia", &bands, 1_000, Some(&policy), &rules)).expect("selection");
        assert_eq!(selection.carrier, Carrier::Dhl, "configured default carrier wins");

        let standard_only = vec![rules[0].clone(), rules[3].clone()];
        let no_policy =
            select_carrier(&request("Oceania", &bands, 1_000, None, &standard_only)).expect("selection");
        assert_eq!(no_policy.carrier, Carrier::JapanPost, "fallback policy default is standard");

        let dhl_default_missing = vec![rules[0].clone()];
        let fallback = select_carrier(&request(
            "Oceania",
            &bands,
            1_000,
            Some(&policy),
            &dhl_default_missing,
        ))
        .expect("selection");
        assert_eq!(fallback.carrier, Carrier::JapanPost, "last resort is any remaining candidate");
    }

    #[test]
    fn fastest_policy_breaks_eta_ties_on_price() {
        let rules = vec![
            rule(ShippingBand::Small, Carrier::JapanPost, 900, (3, 6)),
            rule(ShippingBand::Small, Carrier::Dhl, 2_400, (3, 5)),
        ];
        let policy = CarrierPolicy { policy_type: PolicyType::Fastest, ..CarrierPolicy::default() };
        let bands = [ShippingBand::Small];

        let selection =
            select_carrier(&request("Europe", &bands, 1_000, Some(&policy), &rules)).expect("selection");

        assert_eq!(selection.candidates.len(), 2);
        assert_eq!(selection.carrier, Carrier::JapanPost);
        assert_eq!(selection.price_cents, 900);
        assert_eq!(selection.policy_type, PolicyType::Fastest);
    }

    #[test]
    fn cheapest_policy_picks_lowest_total() {
        let rules = zone_rules();
        let policy = CarrierPolicy { policy_type: PolicyType::Cheapest, ..CarrierPolicy::default() };
        let bands = [ShippingBand::Bulk, ShippingBand::Small];

        let selection =
            select_carrier(&request("Europe", &bands, 1_000, Some(&policy), &rules)).expect("selection");

        assert_eq!(selection.carrier, Carrier::JapanPost);
        assert_eq!(selection.price_cents, 2_000 + DEFAULT_EXTRA_BAND_SURCHARGE_CENTS);
        assert_eq!(selection.policy_type, PolicyType::Cheapest);
    }

    #[test]
    fn zone_lookup_is_case_insensitive() {
        let zones = vec![
            ShippingZone { name: "Asia".to_string(), countries: vec!["KR".into(), "TW".into()] },
            ShippingZone { name: "Oceania".to_string(), countries: vec!["AU".into(), "NZ".into()] },
        ];

        assert_eq!(zone_for_country(&zones, "nz").map(|zone| zone.name.as_str()), Some("Oceania"));
        assert!(zone_for_country(&zones, "US").is_none());
    }
}
