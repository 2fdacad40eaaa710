//! Retail pricing for fastener variants: cost basis and rule resolution,
//! the price calculator, and batch reprice orchestration.

pub mod calc;
pub mod inputs;
pub mod reprice;

use rust_decimal::Decimal;
use thiserror::Error;

pub use calc::{calculate_price, FeeSchedule, PriceBreakdown, PricingInput, RoundingStrategy};
pub use inputs::{
    select_cost_basis, select_pricing_rule, CostBasisRecord, CostBasisSelection, CostSource,
    FxRate, PricingRule, RuleScope, DEFAULT_RULE_ID,
};
pub use reprice::{
    plan_apply, preview_batch, DefaultRuleSettings, PriceChange, RepriceApplyReport, RepriceFilter,
    RepriceInputs, RepricePreview, RepriceRow, RepriceService, RepriceSettings, RepriceStatus,
    RepriceStore, DEFAULT_REPRICE_LIMIT, MAX_REPRICE_LIMIT,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("no FX rate has been captured; reprice cannot proceed")]
    MissingFxRate,
    #[error("FX rate must be positive, got {value}")]
    InvalidFxRate { value: Decimal },
    #[error("cost per pack must be positive, got {value}")]
    InvalidCost { value: Decimal },
    #[error("payment fee rate must be within [0, 1), got {value}")]
    InvalidFeeRate { value: Decimal },
    #[error("price calculation overflowed while computing {stage}")]
    Overflow { stage: &'static str },
    #[error("reprice limit must be within 1..={max}, got {limit}")]
    InvalidLimit { limit: u32, max: u32 },
}
