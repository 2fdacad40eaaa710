use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use jisfast_core::domain::catalog::{VariantId, VariantSnapshot};
use jisfast_core::domain::supplier::SupplierOffer;
use jisfast_core::errors::ApplicationError;
use jisfast_core::pricing::{CostBasisRecord, FxRate, PricingRule};
use jisfast_core::procurement::{RoutingConfig, RoutingLineDecision, RoutingOutcome};
use jisfast_core::shipping::{CarrierPolicy, ShippingRule, ShippingZone};

mod codec;
pub mod catalog;
pub mod memory;
pub mod offers;
pub mod pricing;
pub mod procurement;
pub mod shipping;

pub use catalog::SqlVariantRepository;
pub use memory::{
    InMemoryRepriceStore, InMemoryRoutingConfigRepository, InMemorySupplierOfferRepository,
    InMemoryVariantRepository,
};
pub use offers::SqlSupplierOfferRepository;
pub use pricing::{PriceChangeRecord, SqlPricingRepository, SqlRepriceStore};
pub use procurement::{
    ProcurementTask, ProcurementTaskStatus, SqlProcurementTaskRepository,
    SqlRoutingConfigRepository,
};
pub use shipping::SqlShippingRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait VariantRepository: Send + Sync {
    async fn find_by_id(&self, id: &VariantId) -> Result<Option<VariantSnapshot>, RepositoryError>;
    async fn save(&self, variant: VariantSnapshot) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SupplierOfferRepository: Send + Sync {
    async fn save_offer(&self, offer: SupplierOffer) -> Result<(), RepositoryError>;

    /// Every stored offer, ordered by id.
    async fn list_offers(&self) -> Result<Vec<SupplierOffer>, RepositoryError>;
}

#[async_trait]
pub trait RoutingConfigRepository: Send + Sync {
    async fn load(&self) -> Result<Option<RoutingConfig>, RepositoryError>;
    async fn save(
        &self,
        config: &RoutingConfig,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProcurementTaskRepository: Send + Sync {
    /// Stores one pending task per supplier group plus every line decision.
    /// A previous outcome for the same order is replaced in the same
    /// transaction.
    async fn record_outcome(
        &self,
        order_id: &str,
        outcome: &RoutingOutcome,
        created_at: DateTime<Utc>,
    ) -> Result<Vec<ProcurementTask>, RepositoryError>;

    async fn list_tasks_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProcurementTask>, RepositoryError>;

    async fn list_decisions_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<RoutingLineDecision>, RepositoryError>;
}

#[async_trait]
pub trait PricingRepository: Send + Sync {
    async fn save_rule(&self, rule: &PricingRule) -> Result<(), RepositoryError>;
    async fn list_rules(&self) -> Result<Vec<PricingRule>, RepositoryError>;
    async fn record_fx_rate(&self, rate: &FxRate) -> Result<(), RepositoryError>;
    async fn latest_fx_rate(&self) -> Result<Option<FxRate>, RepositoryError>;
    async fn record_cost_basis(&self, record: &CostBasisRecord) -> Result<(), RepositoryError>;
    async fn cost_basis_for_variant(
        &self,
        variant_id: &VariantId,
    ) -> Result<Vec<CostBasisRecord>, RepositoryError>;
    async fn list_price_changes(
        &self,
        variant_id: &VariantId,
    ) -> Result<Vec<PriceChangeRecord>, RepositoryError>;
}

#[async_trait]
pub trait ShippingRepository: Send + Sync {
    async fn save_zone(&self, zone: &ShippingZone) -> Result<(), RepositoryError>;
    async fn list_zones(&self) -> Result<Vec<ShippingZone>, RepositoryError>;

    /// Appends a rule; rules come back in insertion order.
    async fn add_rule(&self, zone: &str, rule: &ShippingRule) -> Result<(), RepositoryError>;
    async fn rules_for_zone(&self, zone: &str) -> Result<Vec<ShippingRule>, RepositoryError>;
    async fn save_policy(&self, zone: &str, policy: &CarrierPolicy) -> Result<(), RepositoryError>;
    async fn policy_for_zone(&self, zone: &str) -> Result<Option<CarrierPolicy>, RepositoryError>;
}
