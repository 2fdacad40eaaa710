use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use jisfast_core::domain::catalog::{VariantId, VariantSnapshot};
use jisfast_core::domain::supplier::SupplierOffer;
use jisfast_core::errors::ApplicationError;
use jisfast_core::pricing::{
    PriceChange, PricingRule, RepriceFilter, RepriceInputs, RepriceStore, RuleScope,
};
use jisfast_core::procurement::RoutingConfig;

use super::{
    RepositoryError, RoutingConfigRepository, SupplierOfferRepository, VariantRepository,
};

#[derive(Default)]
pub struct InMemoryVariantRepository {
    variants: RwLock<HashMap<String, VariantSnapshot>>,
}

#[async_trait::async_trait]
impl VariantRepository for InMemoryVariantRepository {
    async fn find_by_id(&self, id: &VariantId) -> Result<Option<VariantSnapshot>, RepositoryError> {
        let variants = self.variants.read().await;
        Ok(variants.get(&id.0).cloned())
    }

    async fn save(&self, variant: VariantSnapshot) -> Result<(), RepositoryError> {
        let mut variants = self.variants.write().await;
        variants.insert(variant.id.0.clone(), variant);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySupplierOfferRepository {
    offers: RwLock<BTreeMap<String, SupplierOffer>>,
}

#[async_trait::async_trait]
impl SupplierOfferRepository for InMemorySupplierOfferRepository {
    async fn save_offer(&self, offer: SupplierOffer) -> Result<(), RepositoryError> {
        let mut offers = self.offers.write().await;
        offers.insert(offer.id.0.clone(), offer);
        Ok(())
    }

    async fn list_offers(&self) -> Result<Vec<SupplierOffer>, RepositoryError> {
        let offers = self.offers.read().await;
        Ok(offers.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryRoutingConfigRepository {
    config: RwLock<Option<RoutingConfig>>,
}

#[async_trait::async_trait]
impl RoutingConfigRepository for InMemoryRoutingConfigRepository {
    async fn load(&self) -> Result<Option<RoutingConfig>, RepositoryError> {
        Ok(self.config.read().await.clone())
    }

    async fn save(
        &self,
        config: &RoutingConfig,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        *self.config.write().await = Some(config.clone());
        Ok(())
    }
}

/// Reprice store backed by a snapshot of inputs. Applied changes update the
/// snapshot and are kept in an audit list.
#[derive(Default)]
pub struct InMemoryRepriceStore {
    inputs: RwLock<RepriceInputs>,
    changes: RwLock<Vec<PriceChange>>,
}

impl InMemoryRepriceStore {
    pub fn new(inputs: RepriceInputs) -> Self {
        Self { inputs: RwLock::new(inputs), changes: RwLock::new(Vec::new()) }
    }

    pub async fn changes(&self) -> Vec<PriceChange> {
        self.changes.read().await.clone()
    }

    pub async fn rules(&self) -> Vec<PricingRule> {
        self.inputs.read().await.rules.clone()
    }

    pub async fn variant(&self, id: &VariantId) -> Option<VariantSnapshot> {
        self.inputs.read().await.variants.iter().find(|variant| &variant.id == id).cloned()
    }
}

#[async_trait::async_trait]
impl RepriceStore for InMemoryRepriceStore {
    async fn load_inputs(&self, filter: &RepriceFilter) -> Result<RepriceInputs, ApplicationError> {
        let inputs = self.inputs.read().await;
        let variants: Vec<VariantSnapshot> =
            filter.select(&inputs.variants).into_iter().cloned().collect();
        let cost_basis = inputs
            .cost_basis
            .iter()
            .filter(|record| variants.iter().any(|variant| variant.id == record.variant_id))
            .cloned()
            .collect();

        Ok(RepriceInputs {
            fx_rate: inputs.fx_rate.clone(),
            variants,
            cost_basis,
            rules: inputs.rules.iter().filter(|rule| rule.active).cloned().collect(),
        })
    }

    async fn ensure_default_rule(&self, rule: PricingRule) -> Result<PricingRule, ApplicationError> {
        let mut inputs = self.inputs.write().await;
        let existing = inputs
            .rules
            .iter()
            .filter(|existing| existing.active && existing.scope == RuleScope::Global)
            .max_by(|left, right| {
                left.updated_at.cmp(&right.updated_at).then_with(|| right.id.cmp(&left.id))
            });
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        inputs.rules.retain(|existing| existing.id != rule.id);
        inputs.rules.push(rule.clone());
        Ok(rule)
    }

    async fn apply_price_change(&self, change: &PriceChange) -> Result<(), ApplicationError> {
        let mut inputs = self.inputs.write().await;
        let variant = inputs
            .variants
            .iter_mut()
            .find(|variant| variant.id == change.variant_id)
            .filter(|variant| variant.current_price_cents == change.old_price_cents)
            .ok_or_else(|| {
                RepositoryError::Conflict(format!(
                    "variant `{}` no longer has price {} cents",
                    change.variant_id, change.old_price_cents
                ))
            })?;
        variant.current_price_cents = change.new_price_cents;

        self.changes.write().await.push(change.clone());
        Ok(())
    }
}
