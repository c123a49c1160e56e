//! Live market data contract.

use bf_engine::{OrderBook, Shared};
use bf_types::EngineResult;

/// A live data adapter. Implementations run on their own thread and push
/// per-instrument records into the shared order book, which publishes the
/// corresponding market events onto the kernel queue.
pub trait DataFeed: Send {
    /// Start streaming the given tickers into the order book.
    fn subscribe(&mut self, tickers: &[String], order_book: Shared<OrderBook>) -> EngineResult<()>;

    /// Stop streaming and release vendor-side subscriptions.
    fn unsubscribe(&mut self) -> EngineResult<()>;
}
