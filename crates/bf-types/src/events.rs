use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::account::Trade;
use crate::errors::DomainError;
use crate::market::MarketRecord;
use crate::orders::{Action, Order};
use crate::signal::TradeInstruction;
use crate::symbols::Contract;

/// New market observations for one timestamp, one record per ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub timestamp: u64,
    pub records: HashMap<String, MarketRecord>,
}

impl MarketEvent {
    pub fn new(timestamp: u64, records: HashMap<String, MarketRecord>) -> Result<Self, DomainError> {
        if records.is_empty() {
            return Err(DomainError::InvalidEvent {
                message: "market event requires at least one record".to_string(),
            });
        }
        Ok(Self { timestamp, records })
    }
}

/// Trade intent emitted by a strategy: capital to deploy plus one
/// instruction per leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub timestamp: u64,
    pub trade_capital: Decimal,
    pub instructions: Vec<TradeInstruction>,
}

impl SignalEvent {
    pub fn new(
        timestamp: u64,
        trade_capital: Decimal,
        instructions: Vec<TradeInstruction>,
    ) -> Result<Self, DomainError> {
        if trade_capital <= Decimal::ZERO {
            return Err(DomainError::InvalidEvent {
                message: "trade_capital must be greater than zero".to_string(),
            });
        }
        if instructions.is_empty() {
            return Err(DomainError::InvalidEvent {
                message: "signal requires at least one trade instruction".to_string(),
            });
        }
        Ok(Self {
            timestamp,
            trade_capital,
            instructions,
        })
    }
}

/// One leg of a signal translated into a routable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub timestamp: u64,
    pub trade_id: u32,
    pub leg_id: u32,
    pub action: Action,
    pub contract: Contract,
    pub order: Order,
}

impl OrderEvent {
    pub fn new(
        timestamp: u64,
        trade_id: u32,
        leg_id: u32,
        action: Action,
        contract: Contract,
        order: Order,
    ) -> Result<Self, DomainError> {
        if trade_id < 1 || leg_id < 1 {
            return Err(DomainError::InvalidEvent {
                message: "trade_id and leg_id must be at least 1".to_string(),
            });
        }
        Ok(Self {
            timestamp,
            trade_id,
            leg_id,
            action,
            contract,
            order,
        })
    }
}

/// A completed fill reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub timestamp: u64,
    pub trade: Trade,
    pub action: Action,
    pub contract: Contract,
}

/// Calendar-day boundary marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EodEvent {
    pub date: NaiveDate,
}

/// The event stream routed through the kernel's FIFO queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Market(MarketEvent),
    Signal(SignalEvent),
    Order(OrderEvent),
    Execution(ExecutionEvent),
    Eod(EodEvent),
}
