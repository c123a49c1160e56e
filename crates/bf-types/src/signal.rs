use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::orders::{Action, OrderType};

/// One leg of a strategy signal, identified by `(trade_id, leg_id)`.
///
/// `weight` is a signed fraction of the allocated trade capital; its
/// magnitude sizes the order, its sign is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub ticker: String,
    pub order_type: OrderType,
    pub action: Action,
    pub trade_id: u32,
    pub leg_id: u32,
    pub weight: Decimal,
}

impl TradeInstruction {
    pub fn new(
        ticker: &str,
        order_type: OrderType,
        action: Action,
        trade_id: u32,
        leg_id: u32,
        weight: Decimal,
    ) -> Result<Self, DomainError> {
        let invalid = |message: &str| DomainError::InvalidInstruction {
            message: message.to_string(),
        };

        if ticker.is_empty() {
            return Err(invalid("ticker must be a non-empty string"));
        }
        if trade_id < 1 {
            return Err(invalid("trade_id must be at least 1"));
        }
        if leg_id < 1 {
            return Err(invalid("leg_id must be at least 1"));
        }

        Ok(Self {
            ticker: ticker.to_string(),
            order_type,
            action,
            trade_id,
            leg_id,
            weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_instruction_validation() {
        assert!(TradeInstruction::new("", OrderType::Market, Action::Long, 1, 1, dec!(0.5)).is_err());
        assert!(TradeInstruction::new("HEJ4", OrderType::Market, Action::Long, 0, 1, dec!(0.5)).is_err());
        assert!(TradeInstruction::new("HEJ4", OrderType::Market, Action::Long, 1, 0, dec!(0.5)).is_err());

        let instruction =
            TradeInstruction::new("HEJ4", OrderType::Market, Action::Short, 2, 5, dec!(-0.5)).unwrap();
        assert_eq!(instruction.ticker, "HEJ4");
        assert_eq!(instruction.weight, dec!(-0.5));
    }
}
