//! SQLite persistence for the fastener store: schema migrations plus the
//! repositories behind routing, repricing and shipping.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use repositories::{
    PricingRepository, ProcurementTaskRepository, RepositoryError, RoutingConfigRepository,
    ShippingRepository, SupplierOfferRepository, VariantRepository,
};
