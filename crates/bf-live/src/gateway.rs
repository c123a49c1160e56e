//! Broker gateway contract for live trading.
//!
//! An adapter owns the socket to the real brokerage; the kernel only sees
//! these calls and the callback events the adapter pushes onto the queue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bf_types::{ActiveOrder, Contract, EngineResult, Order, Position, Trade};

/// Synchronous command surface of a live brokerage connection.
///
/// `connect` and `disconnect` block until the gateway acknowledges.
pub trait BrokerGateway: Send {
    fn connect(&mut self) -> EngineResult<()>;
    fn disconnect(&mut self) -> EngineResult<()>;
    fn next_valid_order_id(&mut self) -> EngineResult<i64>;
    fn place_order(&mut self, order_id: i64, contract: &Contract, order: &Order)
        -> EngineResult<()>;
    /// Best-effort cancellation of everything still working, used on
    /// shutdown.
    fn cancel_open_orders(&mut self) -> EngineResult<()>;
}

/// Asynchronous callbacks delivered by a gateway adapter thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayEvent {
    OrderStatus(ActiveOrder),
    OpenOrder(ActiveOrder),
    ExecutionReport {
        contract: Contract,
        trade: Trade,
    },
    CommissionReport {
        ticker: String,
        commission: Decimal,
    },
    /// A position snapshot; `None` means the instrument went flat.
    PortfolioUpdate {
        contract: Contract,
        position: Option<Position>,
    },
    /// One key/value pair of the rapid-fire account stream; coalesced by
    /// the live broker client before it reaches the portfolio server.
    AccountValue {
        key: String,
        value: String,
        currency: Option<String>,
    },
    AccountSummaryEnd,
}
