use serde::{Deserialize, Serialize};
use tracing::debug;

use bf_types::{AccountSnapshot, EquityPoint, SignalEvent, Trade};

use crate::stats::{compute_summary, SummaryStats};

/// Append-only record of everything a run produced: fills, signals, the
/// equity curve, and account snapshots.
///
/// Fills and equity points are deduplicated; the same fill delivered twice
/// (execution dispatch plus wrap-up sweep) lands once. A liquidation close
/// shares its `(trade_id, leg_id)` with the entry it unwinds, so fill
/// identity here also includes action and timestamp.
#[derive(Default)]
pub struct PerformanceLedger {
    pub trades: Vec<Trade>,
    pub signals: Vec<SignalEvent>,
    pub equity_curve: Vec<EquityPoint>,
    pub account_log: Vec<AccountSnapshot>,
}

impl PerformanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_trades(&mut self, trade: Trade) {
        let seen = self.trades.iter().any(|existing| {
            existing.trade_id == trade.trade_id
                && existing.leg_id == trade.leg_id
                && existing.action == trade.action
                && existing.timestamp == trade.timestamp
        });
        if !seen {
            debug!(trade_id = trade.trade_id, leg_id = trade.leg_id, "trade recorded");
            self.trades.push(trade);
        }
    }

    /// Signals are appended verbatim on emission.
    pub fn update_signals(&mut self, signal: SignalEvent) {
        self.signals.push(signal);
    }

    pub fn update_equity(&mut self, point: EquityPoint) {
        if !self.equity_curve.contains(&point) {
            debug!(timestamp = point.timestamp, equity = %point.equity_value, "equity recorded");
            self.equity_curve.push(point);
        }
    }

    pub fn update_account_log(&mut self, account: AccountSnapshot) {
        self.account_log.push(account);
    }

    /// Freeze the ledger into the summary artifact handed to persistence.
    pub fn finalize(&self, parameters: serde_json::Value) -> RunSummary {
        RunSummary {
            parameters,
            static_stats: compute_summary(&self.trades, &self.equity_curve),
            trades: self.trades.clone(),
            signals: self.signals.clone(),
            equity_curve: self.equity_curve.clone(),
        }
    }
}

/// Final artifact of a backtest or live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub parameters: serde_json::Value,
    pub static_stats: SummaryStats,
    pub trades: Vec<Trade>,
    pub signals: Vec<SignalEvent>,
    pub equity_curve: Vec<EquityPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_types::{Action, OrderType, TradeInstruction};
    use rust_decimal_macros::dec;

    fn trade(trade_id: u32, leg_id: u32, action: Action, timestamp: u64) -> Trade {
        Trade {
            trade_id,
            leg_id,
            timestamp,
            ticker: "HEJ4".to_string(),
            quantity: dec!(1),
            avg_price: dec!(90),
            trade_value: dec!(36000),
            trade_cost: dec!(36000.85),
            action,
            fees: dec!(0.85),
        }
    }

    #[test]
    fn test_same_fill_delivered_twice_lands_once() {
        let mut ledger = PerformanceLedger::new();
        ledger.update_trades(trade(1, 1, Action::Long, 10));
        ledger.update_trades(trade(1, 1, Action::Long, 10));
        assert_eq!(ledger.trades.len(), 1);
    }

    #[test]
    fn test_liquidation_close_with_reused_ids_is_kept() {
        let mut ledger = PerformanceLedger::new();
        ledger.update_trades(trade(1, 1, Action::Long, 10));
        // liquidation reuses the entry's ids but closes with the opposite action
        ledger.update_trades(trade(1, 1, Action::Sell, 20));
        assert_eq!(ledger.trades.len(), 2);
    }

    #[test]
    fn test_equity_point_dedup_by_timestamp_and_value() {
        let mut ledger = PerformanceLedger::new();
        let point = EquityPoint {
            timestamp: 10,
            equity_value: dec!(100000),
        };
        ledger.update_equity(point.clone());
        ledger.update_equity(point.clone());
        assert_eq!(ledger.equity_curve.len(), 1);

        ledger.update_equity(EquityPoint {
            timestamp: 10,
            equity_value: dec!(100001),
        });
        assert_eq!(ledger.equity_curve.len(), 2);
    }

    #[test]
    fn test_signals_appended_verbatim() {
        let mut ledger = PerformanceLedger::new();
        let instruction =
            TradeInstruction::new("HEJ4", OrderType::Market, Action::Long, 1, 1, dec!(1)).unwrap();
        let signal = SignalEvent::new(1, dec!(10000), vec![instruction]).unwrap();
        ledger.update_signals(signal.clone());
        ledger.update_signals(signal);
        assert_eq!(ledger.signals.len(), 2);
    }

    #[test]
    fn test_finalize_snapshot() {
        let mut ledger = PerformanceLedger::new();
        ledger.update_trades(trade(1, 1, Action::Long, 10));
        ledger.update_equity(EquityPoint {
            timestamp: 10,
            equity_value: dec!(100000),
        });

        let summary = ledger.finalize(serde_json::json!({"strategy": "test"}));
        assert_eq!(summary.trades.len(), 1);
        assert_eq!(summary.equity_curve.len(), 1);
        assert_eq!(summary.parameters["strategy"], "test");
    }
}
