use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use bf_types::{round4, BarRecord, DomainError, EngineResult};

/// Wire shape of one historical bar. Monetary fields travel as strings
/// rounded to four decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRow {
    pub symbol: String,
    pub timestamp: u64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: u64,
}

impl From<&BarRecord> for BarRow {
    fn from(bar: &BarRecord) -> Self {
        Self {
            symbol: bar.ticker.clone(),
            timestamp: bar.timestamp,
            open: round4(bar.open).to_string(),
            high: round4(bar.high).to_string(),
            low: round4(bar.low).to_string(),
            close: round4(bar.close).to_string(),
            volume: bar.volume,
        }
    }
}

impl BarRow {
    pub fn into_record(self) -> EngineResult<BarRecord> {
        let parse = |field: &str, value: &str| -> EngineResult<Decimal> {
            Decimal::from_str(value).map_err(|_| {
                DomainError::InvalidRecord {
                    ticker: self.symbol.clone(),
                    message: format!("{field} is not a decimal: {value}"),
                }
                .into()
            })
        };

        let open = parse("open", &self.open)?;
        let high = parse("high", &self.high)?;
        let low = parse("low", &self.low)?;
        let close = parse("close", &self.close)?;
        Ok(BarRecord::new(
            &self.symbol,
            self.timestamp,
            open,
            high,
            low,
            close,
            self.volume,
        )?)
    }
}

/// Symbol listing row returned by the persistence service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRow {
    pub ticker: String,
    pub security_type: String,
}
