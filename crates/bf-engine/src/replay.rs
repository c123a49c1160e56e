use chrono::{DateTime, NaiveDate};
use crossbeam_channel::Sender;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use bf_types::{
    BarRecord, EngineError, EngineResult, EodEvent, Event, ExternalError, MarketRecord,
    MissingValuePolicy,
};

use crate::order_book::OrderBook;
use crate::Shared;

fn calendar_day(timestamp: u64) -> NaiveDate {
    DateTime::from_timestamp_nanos(timestamp as i64).date_naive()
}

/// Historical data driver for backtests.
///
/// Holds bars grouped by timestamp in ascending order and pushes one
/// timestamp per `data_stream` call into the order book, emitting an
/// [`EodEvent`] whenever the calendar day rolls over.
pub struct HistoricalReplay {
    table: BTreeMap<u64, HashMap<String, BarRecord>>,
    timestamps: Vec<u64>,
    cursor: Option<usize>,
    current_day: Option<NaiveDate>,
    event_tx: Sender<Event>,
}

impl HistoricalReplay {
    pub fn new(
        bars: Vec<BarRecord>,
        policy: MissingValuePolicy,
        event_tx: Sender<Event>,
    ) -> EngineResult<Self> {
        let mut table: BTreeMap<u64, HashMap<String, BarRecord>> = BTreeMap::new();
        let mut universe: HashSet<String> = HashSet::new();
        for bar in bars {
            universe.insert(bar.ticker.clone());
            table
                .entry(bar.timestamp)
                .or_default()
                .insert(bar.ticker.clone(), bar);
        }

        let table = apply_missing_value_policy(table, &universe, policy)?;
        let timestamps: Vec<u64> = table.keys().copied().collect();
        debug!(
            timestamps = timestamps.len(),
            tickers = universe.len(),
            "replay table built"
        );

        Ok(Self {
            table,
            timestamps,
            cursor: None,
            current_day: None,
            event_tx,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Advance one timestamp: emit an EOD marker on day rollover, then push
    /// the timestamp's records through the order book. Returns `false` once
    /// the data is exhausted.
    pub fn data_stream(&mut self, order_book: &Shared<OrderBook>) -> EngineResult<bool> {
        let next_index = self.cursor.map_or(0, |index| index + 1);
        let timestamp = match self.timestamps.get(next_index) {
            Some(timestamp) => *timestamp,
            None => return Ok(false),
        };
        self.cursor = Some(next_index);

        let next_day = calendar_day(timestamp);
        if let Some(current_day) = self.current_day {
            if next_day != current_day {
                self.event_tx
                    .send(Event::Eod(EodEvent { date: current_day }))
                    .map_err(|_| EngineError::QueueDisconnected)?;
            }
        }
        self.current_day = Some(next_day);

        let records: HashMap<String, MarketRecord> = self
            .table
            .get(&timestamp)
            .into_iter()
            .flatten()
            .map(|(ticker, bar)| (ticker.clone(), MarketRecord::Bar(bar.clone())))
            .collect();
        order_book.write().update(records, timestamp)?;
        Ok(true)
    }
}

fn apply_missing_value_policy(
    table: BTreeMap<u64, HashMap<String, BarRecord>>,
    universe: &HashSet<String>,
    policy: MissingValuePolicy,
) -> EngineResult<BTreeMap<u64, HashMap<String, BarRecord>>> {
    match policy {
        MissingValuePolicy::Drop => Ok(table
            .into_iter()
            .filter(|(_, rows)| rows.len() == universe.len())
            .collect()),
        MissingValuePolicy::FillForward => {
            let mut filled = BTreeMap::new();
            let mut last_seen: HashMap<String, BarRecord> = HashMap::new();

            for (timestamp, mut rows) in table {
                for ticker in universe {
                    if let Some(bar) = rows.get(ticker) {
                        last_seen.insert(ticker.clone(), bar.clone());
                    } else if let Some(previous) = last_seen.get(ticker) {
                        let mut carried = previous.clone();
                        carried.timestamp = timestamp;
                        rows.insert(ticker.clone(), carried);
                    } else {
                        return Err(ExternalError::MissingLeadingData {
                            ticker: ticker.clone(),
                        }
                        .into());
                    }
                }
                filled.insert(timestamp, rows);
            }
            Ok(filled)
        }
    }
}
