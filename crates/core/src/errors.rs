use thiserror::Error;

use crate::{pricing::PricingError, procurement::RoutingError, shipping::ShippingError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Shipping(#[from] ShippingError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ShippingError> for ApplicationError {
    fn from(value: ShippingError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<RoutingError> for ApplicationError {
    fn from(value: RoutingError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<PricingError> for ApplicationError {
    fn from(value: PricingError) -> Self {
        Self::Domain(value.into())
    }
}

impl ApplicationError {
    /// Stable machine-readable class used in operator-facing payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Shipping(_)) => "shipping_configuration",
            Self::Domain(DomainError::Routing(_)) => "routing_input",
            Self::Domain(DomainError::Pricing(PricingError::MissingFxRate))
            | Self::Domain(DomainError::Pricing(PricingError::InvalidFxRate { .. })) => {
                "fx_configuration"
            }
            Self::Domain(DomainError::Pricing(_)) => "pricing_input",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}
