use rust_decimal::Decimal;

use bf_types::{EngineResult, MarketEvent, TradeInstruction};

use crate::order_book::OrderBook;
use crate::portfolio::PortfolioServer;

/// A strategy's answer to new market data: capital to deploy and one
/// instruction per leg. The controller wraps directives into signal events.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDirective {
    pub trade_capital: Decimal,
    pub instructions: Vec<TradeInstruction>,
}

/// The strategy abstraction the kernel consumes.
///
/// Implementations read the order book and portfolio snapshot handed to
/// them and emit zero or more directives per market event; they never touch
/// the queue directly.
pub trait Strategy: Send {
    /// One-time setup before the first market event.
    fn prepare(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn handle_market_data(
        &mut self,
        event: &MarketEvent,
        order_book: &OrderBook,
        portfolio: &PortfolioServer,
    ) -> Vec<SignalDirective>;
}

/// Monotonic trade-id source shared by strategy implementations.
#[derive(Debug, Default)]
pub struct TradeIdAllocator {
    next: u32,
}

impl TradeIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_id(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}
