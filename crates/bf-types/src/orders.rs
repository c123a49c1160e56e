use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::OrderError;

/// Broker-side direction of an order or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        write!(f, "{}", s)
    }
}

/// Strategy-level trade action. Long and Short open positions; Sell and
/// Cover close them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Long,
    Cover,
    Short,
    Sell,
}

impl Action {
    /// Long and Cover map to broker-side BUY; Short and Sell map to SELL.
    pub fn side(&self) -> Side {
        match self {
            Action::Long | Action::Cover => Side::Buy,
            Action::Short | Action::Sell => Side::Sell,
        }
    }

    /// True for the position-opening actions.
    pub fn is_entry(&self) -> bool {
        matches!(self, Action::Long | Action::Short)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Long => "LONG",
            Action::Cover => "COVER",
            Action::Short => "SHORT",
            Action::Sell => "SELL",
        };
        write!(f, "{}", s)
    }
}

/// Order flavors supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
}

/// Fields shared by every order variant. Quantity is stored unsigned;
/// direction is carried by the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBase {
    pub action: Action,
    pub total_quantity: Decimal,
}

impl OrderBase {
    fn new(action: Action, quantity: Decimal) -> Result<Self, OrderError> {
        if quantity == Decimal::ZERO {
            return Err(OrderError::ZeroQuantity);
        }
        Ok(Self {
            action,
            total_quantity: quantity.abs(),
        })
    }

    /// Quantity signed by broker direction: positive for BUY, negative for SELL.
    pub fn signed_quantity(&self) -> Decimal {
        match self.action.side() {
            Side::Buy => self.total_quantity,
            Side::Sell => -self.total_quantity,
        }
    }
}

/// An order to be routed to the (simulated or live) broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Order {
    Market {
        base: OrderBase,
    },
    Limit {
        base: OrderBase,
        limit_price: Decimal,
    },
    StopLoss {
        base: OrderBase,
        aux_price: Decimal,
    },
}

impl Order {
    pub fn market(action: Action, quantity: Decimal) -> Result<Self, OrderError> {
        Ok(Order::Market {
            base: OrderBase::new(action, quantity)?,
        })
    }

    pub fn limit(action: Action, quantity: Decimal, limit_price: Decimal) -> Result<Self, OrderError> {
        if limit_price <= Decimal::ZERO {
            return Err(OrderError::InvalidPrice {
                field: "limit_price",
                value: limit_price,
            });
        }
        Ok(Order::Limit {
            base: OrderBase::new(action, quantity)?,
            limit_price,
        })
    }

    pub fn stop_loss(action: Action, quantity: Decimal, aux_price: Decimal) -> Result<Self, OrderError> {
        if aux_price <= Decimal::ZERO {
            return Err(OrderError::InvalidPrice {
                field: "aux_price",
                value: aux_price,
            });
        }
        Ok(Order::StopLoss {
            base: OrderBase::new(action, quantity)?,
            aux_price,
        })
    }

    pub fn base(&self) -> &OrderBase {
        match self {
            Order::Market { base } => base,
            Order::Limit { base, .. } => base,
            Order::StopLoss { base, .. } => base,
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self {
            Order::Market { .. } => OrderType::Market,
            Order::Limit { .. } => OrderType::Limit,
            Order::StopLoss { .. } => OrderType::StopLoss,
        }
    }

    pub fn action(&self) -> Action {
        self.base().action
    }

    pub fn signed_quantity(&self) -> Decimal {
        self.base().signed_quantity()
    }
}
