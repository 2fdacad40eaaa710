use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy as DecimalRounding};
use serde::{Deserialize, Serialize};

use super::PricingError;

const CENTS_PER_DOLLAR: Decimal = Decimal::ONE_HUNDRED;

fn max_margin() -> Decimal {
    Decimal::new(95, 2)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingStrategy {
    #[serde(rename = "USD_0_00")]
    Usd000,
    #[serde(rename = "USD_0_49")]
    Usd049,
    #[serde(rename = "USD_0_99")]
    Usd099,
}

impl RoundingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd000 => "USD_0_00",
            Self::Usd049 => "USD_0_49",
            Self::Usd099 => "USD_0_99",
        }
    }

    fn ending_cents(&self) -> Option<Decimal> {
        match self {
            Self::Usd000 => None,
            Self::Usd049 => Some(Decimal::from(49)),
            Self::Usd099 => Some(Decimal::from(99)),
        }
    }

    /// Rounds a whole-cent amount to the strategy's price point. `USD_0_00`
    /// goes to the nearest dollar; the others never go below `cents`.
    pub fn apply(&self, cents: Decimal) -> Decimal {
        match self.ending_cents() {
            None => {
                (cents / CENTS_PER_DOLLAR)
                    .round_dp_with_strategy(0, DecimalRounding::MidpointAwayFromZero)
                    * CENTS_PER_DOLLAR
            }
            Some(_) => self.round_up(cents),
        }
    }

    /// Smallest price point at or above `cents`.
    pub fn round_up(&self, cents: Decimal) -> Decimal {
        match self.ending_cents() {
            None => (cents / CENTS_PER_DOLLAR).ceil() * CENTS_PER_DOLLAR,
            Some(ending) => {
                let candidate = (cents / CENTS_PER_DOLLAR).floor() * CENTS_PER_DOLLAR + ending;
                if candidate < cents {
                    candidate + CENTS_PER_DOLLAR
                } else {
                    candidate
                }
            }
        }
    }

    /// Largest price point at or below `cents`.
    pub fn round_down(&self, cents: Decimal) -> Decimal {
        match self.ending_cents() {
            None => (cents / CENTS_PER_DOLLAR).floor() * CENTS_PER_DOLLAR,
            Some(ending) => {
                let candidate = (cents / CENTS_PER_DOLLAR).floor() * CENTS_PER_DOLLAR + ending;
                if candidate > cents {
                    candidate - CENTS_PER_DOLLAR
                } else {
                    candidate
                }
            }
        }
    }
}

impl std::str::FromStr for RoundingStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USD_0_00" => Ok(Self::Usd000),
            "USD_0_49" => Ok(Self::Usd049),
            "USD_0_99" => Ok(Self::Usd099),
            other => Err(format!(
                "unsupported rounding strategy `{other}` (expected USD_0_00|USD_0_49|USD_0_99)"
            )),
        }
    }
}

/// Payment processing charges applied on top of the margin gross-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub fee_rate: Decimal,
    pub fixed_fee_cents: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self { fee_rate: Decimal::new(35, 3), fixed_fee_cents: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingInput {
    pub current_price_cents: i64,
    /// Source currency per pack.
    pub cost_per_pack: Decimal,
    /// Source-currency units per USD.
    pub fx_rate: Decimal,
    pub target_margin: Decimal,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub rounding: RoundingStrategy,
    pub max_weekly_change: Decimal,
    pub allow_override: bool,
    pub fees: FeeSchedule,
    pub handling_cents: i64,
}

/// Every intermediate value of one price calculation. Dollar fields are
/// unrounded; `*_cents` fields are whole cents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub cost_per_pack: Decimal,
    pub fx_rate: Decimal,
    pub cost_usd: Decimal,
    pub handling_usd: Decimal,
    pub base_usd: Decimal,
    pub target_margin: Decimal,
    pub applied_margin: Decimal,
    pub price_before_fees_usd: Decimal,
    pub fee_rate: Decimal,
    pub fixed_fee_usd: Decimal,
    pub price_with_fees_usd: Decimal,
    pub ceiled_cents: i64,
    pub rounding: RoundingStrategy,
    pub rounded_cents: i64,
    pub safe_floor_cents: i64,
    pub min_safe_floor_applied: bool,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub bounds_clamped: bool,
    pub current_price_cents: i64,
    pub max_weekly_change: Decimal,
    pub allow_override: bool,
    pub weekly_change_clamped: bool,
    pub recommended_price_cents: i64,
}

/// Computes a recommended retail price in US cents.
///
/// The result is never below `cost_usd + handling + fixed_fee`, whatever the
/// rounding strategy, rule bounds or weekly change limit ask for.
pub fn calculate_price(input: &PricingInput) -> Result<PriceBreakdown, PricingError> {
    if input.fx_rate <= Decimal::ZERO {
        return Err(PricingError::InvalidFxRate { value: input.fx_rate });
    }
    if input.cost_per_pack <= Decimal::ZERO {
        return Err(PricingError::InvalidCost { value: input.cost_per_pack });
    }
    let fee_rate = input.fees.fee_rate;
    if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
        return Err(PricingError::InvalidFeeRate { value: fee_rate });
    }

    let cost_usd = checked(input.cost_per_pack.checked_div(input.fx_rate), "cost_usd")?;
    let handling_usd = Decimal::from(input.handling_cents) / CENTS_PER_DOLLAR;
    let fixed_fee_usd = Decimal::from(input.fees.fixed_fee_cents) / CENTS_PER_DOLLAR;
    let base_usd = checked(cost_usd.checked_add(handling_usd), "base_usd")?;

    let applied_margin = input.target_margin.clamp(Decimal::ZERO, max_margin());
    let price_before_fees_usd =
        checked(base_usd.checked_div(Decimal::ONE - applied_margin), "price_before_fees_usd")?;
    let price_with_fees_usd = checked(
        price_before_fees_usd
            .checked_add(fixed_fee_usd)
            .and_then(|price| price.checked_div(Decimal::ONE - fee_rate)),
        "price_with_fees_usd",
    )?;

    // Every amount below fits in i64 cents.
    let ceiled = whole_cents(price_with_fees_usd.checked_mul(CENTS_PER_DOLLAR), "ceiled_cents")?;
    let safe_floor = whole_cents(
        base_usd.checked_add(fixed_fee_usd).and_then(|floor| floor.checked_mul(CENTS_PER_DOLLAR)),
        "safe_floor_cents",
    )?;
    let rounded = input.rounding.apply(ceiled);

    let mut price = rounded;
    let mut min_safe_floor_applied = false;
    if price < safe_floor {
        price = input.rounding.round_up(safe_floor);
        min_safe_floor_applied = true;
    }

    let mut bounds_clamped = false;
    if let Some(min) = input.min_price_cents.map(Decimal::from) {
        if price < min {
            price = min;
            bounds_clamped = true;
        }
    }
    if let Some(max) = input.max_price_cents.map(Decimal::from) {
        if price > max {
            price = max;
            bounds_clamped = true;
        }
    }

    let mut weekly_change_clamped = false;
    if !input.allow_override && input.current_price_cents > 0 {
        let current = Decimal::from(input.current_price_cents);
        let max_change = input.max_weekly_change.clamp(Decimal::ZERO, Decimal::ONE);
        let lower = (current * (Decimal::ONE - max_change)).ceil();
        let upper = (current * (Decimal::ONE + max_change)).floor();

        if price < lower {
            let snapped = input.rounding.round_up(lower);
            price = if snapped <= upper { snapped } else { lower };
            weekly_change_clamped = true;
        } else if price > upper {
            let snapped = input.rounding.round_down(upper);
            price = if snapped >= lower { snapped } else { upper };
            weekly_change_clamped = true;
        }
    }

    // Clamping may have pulled the price back under the floor.
    if price < safe_floor {
        price = input.rounding.round_up(safe_floor);
        min_safe_floor_applied = true;
    }

    Ok(PriceBreakdown {
        cost_per_pack: input.cost_per_pack,
        fx_rate: input.fx_rate,
        cost_usd,
        handling_usd,
        base_usd,
        target_margin: input.target_margin,
        applied_margin,
        price_before_fees_usd,
        fee_rate,
        fixed_fee_usd,
        price_with_fees_usd,
        ceiled_cents: to_cents(ceiled, input)?,
        rounding: input.rounding,
        rounded_cents: to_cents(rounded, input)?,
        safe_floor_cents: to_cents(safe_floor, input)?,
        min_safe_floor_applied,
        min_price_cents: input.min_price_cents,
        max_price_cents: input.max_price_cents,
        bounds_clamped,
        current_price_cents: input.current_price_cents,
        max_weekly_change: input.max_weekly_change,
        allow_override: input.allow_override,
        weekly_change_clamped,
        recommended_price_cents: to_cents(price, input)?,
    })
}

fn checked(value: Option<Decimal>, stage: &'static str) -> Result<Decimal, PricingError> {
    value.ok_or(PricingError::Overflow { stage })
}

fn whole_cents(value: Option<Decimal>, stage: &'static str) -> Result<Decimal, PricingError> {
    checked(value, stage)
        .map(|cents| cents.ceil())
        .and_then(|cents| match cents.to_i64() {
            Some(_) => Ok(cents),
            None => Err(PricingError::Overflow { stage }),
        })
}

fn to_cents(value: Decimal, input: &PricingInput) -> Result<i64, PricingError> {
    value.to_i64().ok_or(PricingError::InvalidCost { value: input.cost_per_pack })
}
