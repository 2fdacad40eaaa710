use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{Category, VariantId};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SupplierId(pub String);

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One spec field of a supplier offer: either pinned to a value or a wildcard.
///
/// Serialized as a nullable value, `null` meaning [`SpecField::Any`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<T>", into = "Option<T>")]
pub enum SpecField<T: Clone> {
    Any,
    Specific(T),
}

impl<T: Clone> Default for SpecField<T> {
    fn default() -> Self {
        Self::Any
    }
}

impl<T: Clone> SpecField<T> {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn specific(&self) -> Option<&T> {
        match self {
            Self::Any => None,
            Self::Specific(value) => Some(value),
        }
    }
}

impl<T: Clone + PartialEq> SpecField<T> {
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Self::Any => true,
            Self::Specific(expected) => expected == value,
        }
    }

    /// A pinned offer field never matches an absent line value.
    pub fn accepts_opt(&self, value: Option<&T>) -> bool {
        match self {
            Self::Any => true,
            Self::Specific(expected) => value == Some(expected),
        }
    }
}

impl<T: Clone> From<Option<T>> for SpecField<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Any, Self::Specific)
    }
}

impl<T: Clone> From<SpecField<T>> for Option<T> {
    fn from(value: SpecField<T>) -> Self {
        match value {
            SpecField::Any => None,
            SpecField::Specific(inner) => Some(inner),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    Limited,
    Backorder,
    Unknown,
}

impl Availability {
    /// Fixed availability scale shared by the matcher ranking and the router.
    pub fn score(&self) -> f64 {
        match self {
            Self::InStock => 1.0,
            Self::Limited => 0.7,
            Self::Unknown => 0.4,
            Self::Backorder => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::Limited => "limited",
            Self::Backorder => "backorder",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_stock" => Ok(Self::InStock),
            "limited" => Ok(Self::Limited),
            "backorder" => Ok(Self::Backorder),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unsupported availability `{other}`")),
        }
    }
}

/// A supplier's priced commitment. Scoped to one variant when `variant_id`
/// is set, otherwise the spec fields act as wildcards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupplierOffer {
    pub id: OfferId,
    pub supplier_id: SupplierId,
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub category: SpecField<Category>,
    #[serde(default)]
    pub size: SpecField<String>,
    #[serde(default)]
    pub length_mm: SpecField<u32>,
    #[serde(default)]
    pub strength_class: SpecField<String>,
    #[serde(default)]
    pub finish: SpecField<String>,
    #[serde(default)]
    pub pack_qty: SpecField<u32>,
    pub unit_cost_jpy: Decimal,
    pub min_order_packs: u32,
    pub lead_time_days: u32,
    pub availability: Availability,
    pub updated_at: DateTime<Utc>,
}

impl SupplierOffer {
    pub fn pack_compatible(&self, pack_qty: u32) -> bool {
        self.pack_qty.accepts(&pack_qty)
    }
}
