use crossbeam_channel::Sender;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use bf_types::{BookError, EngineError, EngineResult, Event, MarketEvent, MarketRecord};

use crate::observer::{Observer, UpdateKind};

/// Single source of truth for the most recent market observation per ticker.
///
/// One writer (the data driver), many readers. Every update publishes a
/// [`MarketEvent`] onto the kernel queue before observers are told.
pub struct OrderBook {
    book: HashMap<String, MarketRecord>,
    last_updated: u64,
    event_tx: Sender<Event>,
    observers: Vec<Box<dyn Observer>>,
}

impl OrderBook {
    pub fn new(event_tx: Sender<Event>) -> Self {
        Self {
            book: HashMap::new(),
            last_updated: 0,
            event_tx,
            observers: Vec::new(),
        }
    }

    pub fn attach(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Replace the per-ticker entries, then emit a market event and notify
    /// observers. The book is fully updated before anyone hears about it.
    pub fn update(
        &mut self,
        records: HashMap<String, MarketRecord>,
        timestamp: u64,
    ) -> EngineResult<()> {
        if records.is_empty() {
            return Err(BookError::EmptyUpdate.into());
        }

        for (ticker, record) in &records {
            self.book.insert(ticker.clone(), record.clone());
        }
        self.last_updated = timestamp;
        debug!(timestamp, tickers = records.len(), "order book updated");

        let event = MarketEvent::new(timestamp, records)?;
        self.event_tx
            .send(Event::Market(event))
            .map_err(|_| EngineError::QueueDisconnected)?;

        for observer in &mut self.observers {
            observer.notify(UpdateKind::MarketData);
        }
        Ok(())
    }

    /// Reference price for one ticker: bar close or quote midpoint.
    pub fn current_price(&self, ticker: &str) -> Result<Decimal, BookError> {
        self.book
            .get(ticker)
            .map(MarketRecord::reference_price)
            .ok_or_else(|| BookError::UnknownTicker {
                ticker: ticker.to_string(),
            })
    }

    pub fn current_prices(&self) -> HashMap<String, Decimal> {
        self.book
            .iter()
            .map(|(ticker, record)| (ticker.clone(), record.reference_price()))
            .collect()
    }

    pub fn record(&self, ticker: &str) -> Option<&MarketRecord> {
        self.book.get(ticker)
    }

    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }
}
