use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// OHLCV bar for one instrument at one timestamp (UNIX nanoseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub ticker: String,
    pub timestamp: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl BarRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: &str,
        timestamp: u64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Result<Self, DomainError> {
        let invalid = |message: &str| DomainError::InvalidRecord {
            ticker: ticker.to_string(),
            message: message.to_string(),
        };

        if ticker.is_empty() {
            return Err(invalid("ticker must be non-empty"));
        }
        for (field, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if value <= Decimal::ZERO {
                return Err(invalid(&format!("{field} must be greater than zero")));
            }
        }

        Ok(Self {
            ticker: ticker.to_string(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Top-of-book quote for one instrument at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub ticker: String,
    pub timestamp: u64,
    pub ask: Decimal,
    pub ask_size: Decimal,
    pub bid: Decimal,
    pub bid_size: Decimal,
}

impl QuoteRecord {
    pub fn new(
        ticker: &str,
        timestamp: u64,
        ask: Decimal,
        ask_size: Decimal,
        bid: Decimal,
        bid_size: Decimal,
    ) -> Result<Self, DomainError> {
        let invalid = |message: &str| DomainError::InvalidRecord {
            ticker: ticker.to_string(),
            message: message.to_string(),
        };

        if ticker.is_empty() {
            return Err(invalid("ticker must be non-empty"));
        }
        for (field, value) in [
            ("ask", ask),
            ("ask_size", ask_size),
            ("bid", bid),
            ("bid_size", bid_size),
        ] {
            if value <= Decimal::ZERO {
                return Err(invalid(&format!("{field} must be greater than zero")));
            }
        }

        Ok(Self {
            ticker: ticker.to_string(),
            timestamp,
            ask,
            ask_size,
            bid,
            bid_size,
        })
    }

    pub fn mid(&self) -> Decimal {
        (self.ask + self.bid) / Decimal::TWO
    }
}

/// Latest market observation kept per ticker in the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketRecord {
    Bar(BarRecord),
    Quote(QuoteRecord),
}

impl MarketRecord {
    pub fn ticker(&self) -> &str {
        match self {
            MarketRecord::Bar(bar) => &bar.ticker,
            MarketRecord::Quote(quote) => &quote.ticker,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            MarketRecord::Bar(bar) => bar.timestamp,
            MarketRecord::Quote(quote) => quote.timestamp,
        }
    }

    /// Reference price: bar close, or the bid/ask midpoint for quotes.
    pub fn reference_price(&self) -> Decimal {
        match self {
            MarketRecord::Bar(bar) => bar.close,
            MarketRecord::Quote(quote) => quote.mid(),
        }
    }
}

/// Policy for timestamps where some tickers have no observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingValuePolicy {
    /// Discard any timestamp that is not fully populated.
    Drop,
    /// Carry the previous observation forward; fails if the first timestamp
    /// is incomplete.
    FillForward,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bar_validation() {
        assert!(BarRecord::new("AAPL", 1, dec!(0), dec!(2), dec!(1), dec!(2), 10).is_err());
        assert!(BarRecord::new("", 1, dec!(1), dec!(2), dec!(1), dec!(2), 10).is_err());
        assert!(BarRecord::new("AAPL", 1, dec!(1), dec!(2), dec!(1), dec!(2), 10).is_ok());
    }

    #[test]
    fn test_quote_validation() {
        assert!(QuoteRecord::new("AAPL", 1, dec!(10), dec!(5), dec!(0), dec!(5)).is_err());
        assert!(QuoteRecord::new("AAPL", 1, dec!(10), dec!(5), dec!(9), dec!(5)).is_ok());
    }

    #[test]
    fn test_reference_price() {
        let bar = BarRecord::new("AAPL", 1, dec!(100), dec!(110), dec!(95), dec!(105), 10).unwrap();
        assert_eq!(MarketRecord::Bar(bar).reference_price(), dec!(105));

        let quote = QuoteRecord::new("AAPL", 1, dec!(101), dec!(5), dec!(99), dec!(5)).unwrap();
        assert_eq!(MarketRecord::Quote(quote).reference_price(), dec!(100));
    }
}
