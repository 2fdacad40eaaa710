use serde::{Deserialize, Serialize};

use super::ShippingError;

/// Weight/price tier derived from the pack size of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShippingBand {
    /// 10 pcs packs.
    #[serde(rename = "A")]
    Small,
    /// 20 pcs packs.
    #[serde(rename = "B")]
    Medium,
    /// 50 and 100 pcs packs.
    #[serde(rename = "C")]
    Bulk,
}

impl ShippingBand {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Small => "A",
            Self::Medium => "B",
            Self::Bulk => "C",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Bulk => "bulk",
        }
    }
}

impl std::str::FromStr for ShippingBand {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" | "SMALL" => Ok(Self::Small),
            "B" | "MEDIUM" => Ok(Self::Medium),
            "C" | "BULK" => Ok(Self::Bulk),
            other => Err(format!("unsupported shipping band `{other}` (expected A|B|C)")),
        }
    }
}

pub fn classify_pack(pack_qty: u32) -> Result<ShippingBand, ShippingError> {
    match pack_qty {
        10 => Ok(ShippingBand::Small),
        20 => Ok(ShippingBand::Medium),
        50 | 100 => Ok(ShippingBand::Bulk),
        other => Err(ShippingError::InvalidPackQuantity(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_pack, ShippingBand};
    use crate::shipping::ShippingError;

    #[test]
    fn every_sellable_pack_size_maps_to_one_band() {
        assert_eq!(classify_pack(10), Ok(ShippingBand::Small));
        assert_eq!(classify_pack(20), Ok(ShippingBand::Medium));
        assert_eq!(classify_pack(50), Ok(ShippingBand::Bulk));
        assert_eq!(classify_pack(100), Ok(ShippingBand::Bulk));
    }

    #[test]
    fn other_pack_sizes_are_rejected() {
        for pack in [0, 1, 15, 25, 99, 200] {
            assert_eq!(classify_pack(pack), Err(ShippingError::InvalidPackQuantity(pack)));
        }
    }

    #[test]
    fn band_codes_round_trip_through_from_str() {
        for band in [ShippingBand::Small, ShippingBand::Medium, ShippingBand::Bulk] {
            assert_eq!(band.code().parse::<ShippingBand>(), Ok(band));
        }
        assert_eq!("bulk".parse::<ShippingBand>(), Ok(ShippingBand::Bulk));
    }
}
