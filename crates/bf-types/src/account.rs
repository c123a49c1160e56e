use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::orders::{Action, OrderType, Side};
use crate::symbols::{Currency, SecurityType, Venue};

/// Half-up rounding to 4 decimals, used for prices, fees, and cost bases.
pub fn round4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Half-up rounding to 2 decimals, used for equity and cash values.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// An open position as tracked by the broker.
///
/// `quantity` is signed and matches the direction in `action`; a position
/// only exists while the quantity is nonzero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub action: Side,
    pub quantity: Decimal,
    /// Running cost basis in dollars per signed unit-multiplier.
    pub avg_cost: Decimal,
    pub quantity_multiplier: u32,
    pub price_multiplier: Decimal,
    pub initial_margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_cost: Decimal,
    pub market_value: Decimal,
}

impl Position {
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |message: &str| DomainError::InvalidPosition {
            message: message.to_string(),
        };
        if self.quantity == Decimal::ZERO {
            return Err(invalid("quantity must be nonzero"));
        }
        if self.quantity_multiplier == 0 {
            return Err(invalid("quantity_multiplier must be greater than zero"));
        }
        if self.price_multiplier <= Decimal::ZERO {
            return Err(invalid("price_multiplier must be greater than zero"));
        }
        if self.initial_margin < Decimal::ZERO {
            return Err(invalid("initial_margin must be non-negative"));
        }
        Ok(())
    }
}

/// Account state mirrored from the (simulated or live) broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub timestamp: u64,
    pub full_available_funds: Decimal,
    pub full_init_margin_req: Decimal,
    pub net_liquidation: Decimal,
    pub unrealized_pnl: Decimal,
    // Populated by the live gateway only.
    pub full_maint_margin_req: Option<Decimal>,
    pub excess_liquidity: Option<Decimal>,
    pub currency: Option<Currency>,
    pub buying_power: Option<Decimal>,
    pub futures_pnl: Option<Decimal>,
    pub total_cash_balance: Option<Decimal>,
}

impl AccountSnapshot {
    /// Fresh account holding only starting capital.
    pub fn with_capital(capital: Decimal) -> Self {
        Self {
            timestamp: 0,
            full_available_funds: capital,
            full_init_margin_req: Decimal::ZERO,
            net_liquidation: capital,
            unrealized_pnl: Decimal::ZERO,
            full_maint_margin_req: None,
            excess_liquidity: None,
            currency: None,
            buying_power: None,
            futures_pnl: None,
            total_cash_balance: None,
        }
    }
}

/// Lifecycle states reported for a working order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingSubmit,
    PendingCancel,
    PreSubmitted,
    Submitted,
    Cancelled,
    Filled,
    Inactive,
}

/// A working order tracked by the portfolio server, keyed by `perm_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOrder {
    pub perm_id: i64,
    pub client_id: i64,
    pub order_id: i64,
    pub parent_id: i64,
    pub account: String,
    pub symbol: String,
    pub sec_type: SecurityType,
    pub exchange: Venue,
    pub action: Side,
    pub order_type: OrderType,
    pub total_qty: Decimal,
    pub cash_qty: Decimal,
    pub limit_price: Decimal,
    pub aux_price: Decimal,
    pub status: OrderStatus,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub avg_fill_price: Decimal,
    pub last_fill_price: Decimal,
    pub why_held: String,
    pub mkt_cap_price: Decimal,
}

/// Execution record produced on each fill.
///
/// Identity is the `(trade_id, leg_id)` pair; all other fields are
/// descriptive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u32,
    pub leg_id: u32,
    pub timestamp: u64,
    pub ticker: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    /// Notional value of the fill: price x price multiplier x signed
    /// quantity x quantity multiplier, rounded to cents.
    pub trade_value: Decimal,
    /// Notional plus commission fees.
    pub trade_cost: Decimal,
    pub action: Action,
    pub fees: Decimal,
}

impl Trade {
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |message: &str| DomainError::InvalidTrade {
            message: message.to_string(),
        };
        if self.trade_id < 1 {
            return Err(invalid("trade_id must be at least 1"));
        }
        if self.leg_id < 1 {
            return Err(invalid("leg_id must be at least 1"));
        }
        if self.avg_price <= Decimal::ZERO {
            return Err(invalid("avg_price must be greater than zero"));
        }
        Ok(())
    }
}

impl PartialEq for Trade {
    fn eq(&self, other: &Self) -> bool {
        self.trade_id == other.trade_id && self.leg_id == other.leg_id
    }
}

impl Eq for Trade {}

/// A point on the equity curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: u64,
    pub equity_value: Decimal,
}
