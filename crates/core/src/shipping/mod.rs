//! Shipping band classification and carrier selection.
//!
//! Both steps are pure: the caller loads the zone's rule table and policy and
//! passes them in.

pub mod bands;
pub mod carrier;

use thiserror::Error;

pub use bands::{classify_pack, ShippingBand};
pub use carrier::{
    select_carrier, zone_for_country, Carrier, CarrierCandidate, CarrierPolicy,
    CarrierQuoteRequest, CarrierSelection, ForceReason, PolicyType, ShippingRule, ShippingZone,
    DEFAULT_EXTRA_BAND_SURCHARGE_CENTS,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShippingError {
    #[error("pack quantity {0} is not a sellable pack size (expected 10, 20, 50 or 100)")]
    InvalidPackQuantity(u32),
    #[error("no shipping bands were requested for zone `{zone}`")]
    NoRequiredBands { zone: String },
    #[error("no carrier has rules covering every required band in zone `{zone}`")]
    NoCarrierCoverage { zone: String },
}
