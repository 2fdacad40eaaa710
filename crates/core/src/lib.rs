//! Domain core for the JIS fastener store: shipping band and carrier
//! selection, supplier offer matching, procurement routing and retail
//! pricing. Everything here is synchronous and free of I/O except the
//! reprice service, which drives an injected [`pricing::RepriceStore`].

pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod procurement;
pub mod shipping;

pub use domain::catalog::{Category, OrderLineSpec, VariantId, VariantSnapshot};
pub use domain::supplier::{Availability, OfferId, SpecField, SupplierId, SupplierOffer};
pub use errors::{ApplicationError, DomainError};
pub use pricing::{
    calculate_price, PriceBreakdown, PricingError, PricingInput, RepriceService, RoundingStrategy,
};
pub use procurement::{
    match_offers, route_lines, route_order, RoutingConfig, RoutingError, RoutingOutcome,
    RoutingStrategy,
};
pub use shipping::{classify_pack, select_carrier, ShippingBand, ShippingError};
