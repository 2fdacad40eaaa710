use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(pub String);

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bolt,
    Nut,
    Washer,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bolt => "bolt",
            Self::Nut => "nut",
            Self::Washer => "washer",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bolt" => Ok(Self::Bolt),
            "nut" => Ok(Self::Nut),
            "washer" => Ok(Self::Washer),
            other => Err(format!("unsupported category `{other}` (expected bolt|nut|washer)")),
        }
    }
}

/// Immutable snapshot of what one order line has to procure.
///
/// `length_mm` and `strength_class` are only populated for bolts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineSpec {
    pub variant_id: VariantId,
    pub category: Category,
    pub size: String,
    pub length_mm: Option<u32>,
    pub strength_class: Option<String>,
    pub finish: String,
    pub pack_qty: u32,
}

/// Sellable variant as seen by the repricing pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub id: VariantId,
    pub sku: String,
    pub category: Category,
    pub size: String,
    pub pack_qty: u32,
    pub current_price_cents: i64,
    pub active: bool,
}
