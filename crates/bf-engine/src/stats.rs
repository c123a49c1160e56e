//! Summary statistics computed from the frozen ledger at run finalization.
//!
//! Pure functions over the recorded trades and equity curve; regression and
//! benchmark analytics are computed post-hoc by external tooling.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use bf_types::{round4, EquityPoint, Trade};

/// All executions of one `trade_id` rolled into a single round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeGroup {
    pub trade_id: u32,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    /// Summed notional of the entry legs (Long/Short).
    pub entry_value: Decimal,
    /// Summed notional of the exit legs (Sell/Cover).
    pub exit_value: Decimal,
    pub fees: Decimal,
    pub pnl: Decimal,
    pub gain_loss: Decimal,
}

/// Headline figures for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub net_profit: Decimal,
    pub total_fees: Decimal,
    pub ending_equity: Decimal,
    pub total_return: Decimal,
    pub max_drawdown: Decimal,
    pub total_trades: u64,
    pub num_winning_trades: u64,
    pub num_losing_trades: u64,
    pub percent_profitable: Decimal,
    pub avg_win_percent: Decimal,
    pub avg_loss_percent: Decimal,
    pub profit_and_loss_ratio: Decimal,
    pub profit_factor: Decimal,
    pub avg_trade_profit: Decimal,
}

/// Group fills by `trade_id` and net each group into entry/exit legs.
///
/// A buy is a cash outflow and a sell an inflow, so the round-trip PnL is
/// the negated sum of signed notionals less fees.
pub fn aggregate_trades(trades: &[Trade]) -> Vec<TradeGroup> {
    let mut groups: BTreeMap<u32, TradeGroup> = BTreeMap::new();

    for trade in trades {
        let group = groups.entry(trade.trade_id).or_insert_with(|| TradeGroup {
            trade_id: trade.trade_id,
            start_timestamp: trade.timestamp,
            end_timestamp: trade.timestamp,
            entry_value: Decimal::ZERO,
            exit_value: Decimal::ZERO,
            fees: Decimal::ZERO,
            pnl: Decimal::ZERO,
            gain_loss: Decimal::ZERO,
        });

        group.start_timestamp = group.start_timestamp.min(trade.timestamp);
        group.end_timestamp = group.end_timestamp.max(trade.timestamp);
        group.fees += trade.fees;
        if trade.action.is_entry() {
            group.entry_value += trade.trade_value;
        } else {
            group.exit_value += trade.trade_value;
        }
    }

    let mut aggregated: Vec<TradeGroup> = groups.into_values().collect();
    for group in &mut aggregated {
        group.pnl = -(group.entry_value + group.exit_value) - group.fees;
        group.gain_loss = if group.entry_value.is_zero() {
            Decimal::ZERO
        } else {
            round4(group.pnl / group.entry_value.abs())
        };
    }
    aggregated
}

pub fn net_profit(groups: &[TradeGroup]) -> Decimal {
    groups.iter().map(|group| group.pnl).sum()
}

pub fn ending_equity(equity_curve: &[EquityPoint]) -> Decimal {
    equity_curve
        .last()
        .map(|point| point.equity_value)
        .unwrap_or(Decimal::ZERO)
}

/// Simple total return over the recorded curve.
pub fn total_return(equity_curve: &[EquityPoint]) -> Decimal {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) if !first.equity_value.is_zero() => {
            round4((last.equity_value - first.equity_value) / first.equity_value)
        }
        _ => Decimal::ZERO,
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> Decimal {
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;
    for point in equity_curve {
        if point.equity_value > peak {
            peak = point.equity_value;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - point.equity_value) / peak;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }
    round4(worst)
}

pub fn compute_summary(trades: &[Trade], equity_curve: &[EquityPoint]) -> SummaryStats {
    let groups = aggregate_trades(trades);

    let winners: Vec<&TradeGroup> = groups.iter().filter(|g| g.pnl > Decimal::ZERO).collect();
    let losers: Vec<&TradeGroup> = groups.iter().filter(|g| g.pnl < Decimal::ZERO).collect();

    let total = Decimal::from(groups.len() as u64);
    let gross_profit: Decimal = winners.iter().map(|g| g.pnl).sum();
    let gross_loss: Decimal = losers.iter().map(|g| g.pnl.abs()).sum();

    let avg_win_percent = if winners.is_empty() {
        Decimal::ZERO
    } else {
        round4(winners.iter().map(|g| g.gain_loss).sum::<Decimal>() / Decimal::from(winners.len() as u64))
    };
    let avg_loss_percent = if losers.is_empty() {
        Decimal::ZERO
    } else {
        round4(losers.iter().map(|g| g.gain_loss).sum::<Decimal>() / Decimal::from(losers.len() as u64))
    };

    let avg_win = if winners.is_empty() {
        Decimal::ZERO
    } else {
        gross_profit / Decimal::from(winners.len() as u64)
    };
    let avg_loss = if losers.is_empty() {
        Decimal::ZERO
    } else {
        gross_loss / Decimal::from(losers.len() as u64)
    };

    SummaryStats {
        net_profit: net_profit(&groups),
        total_fees: groups.iter().map(|g| g.fees).sum(),
        ending_equity: ending_equity(equity_curve),
        total_return: total_return(equity_curve),
        max_drawdown: max_drawdown(equity_curve),
        total_trades: groups.len() as u64,
        num_winning_trades: winners.len() as u64,
        num_losing_trades: losers.len() as u64,
        percent_profitable: if total.is_zero() {
            Decimal::ZERO
        } else {
            round4(Decimal::from(winners.len() as u64) / total)
        },
        avg_win_percent,
        avg_loss_percent,
        profit_and_loss_ratio: if avg_loss.is_zero() {
            Decimal::ZERO
        } else {
            round4(avg_win / avg_loss)
        },
        profit_factor: if gross_loss.is_zero() {
            Decimal::ZERO
        } else {
            round4(gross_profit / gross_loss)
        },
        avg_trade_profit: if total.is_zero() {
            Decimal::ZERO
        } else {
            net_profit(&groups) / total
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_types::Action;
    use rust_decimal_macros::dec;

    fn trade(
        trade_id: u32,
        leg_id: u32,
        timestamp: u64,
        action: Action,
        trade_value: Decimal,
        fees: Decimal,
    ) -> Trade {
        Trade {
            trade_id,
            leg_id,
            timestamp,
            ticker: "HEJ4".to_string(),
            quantity: dec!(1),
            avg_price: dec!(90),
            trade_value,
            trade_cost: trade_value + fees,
            action,
            fees,
        }
    }

    fn curve(values: &[(u64, Decimal)]) -> Vec<EquityPoint> {
        values
            .iter()
            .map(|(timestamp, equity_value)| EquityPoint {
                timestamp: *timestamp,
                equity_value: *equity_value,
            })
            .collect()
    }

    #[test]
    fn test_long_round_trip_pnl() {
        // buy 36000.20 out, sell 37999.80 back in, 1.70 total fees
        let trades = vec![
            trade(1, 1, 10, Action::Long, dec!(36000.20), dec!(0.85)),
            trade(1, 2, 20, Action::Sell, dec!(-37999.80), dec!(0.85)),
        ];

        let groups = aggregate_trades(&trades);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entry_value, dec!(36000.20));
        assert_eq!(groups[0].exit_value, dec!(-37999.80));
        assert_eq!(groups[0].pnl, dec!(1997.90));
        assert_eq!(groups[0].start_timestamp, 10);
        assert_eq!(groups[0].end_timestamp, 20);
    }

    #[test]
    fn test_short_round_trip_pnl() {
        // short entry receives 36000, cover pays 34000: 2000 gross profit
        let trades = vec![
            trade(2, 1, 10, Action::Short, dec!(-36000), dec!(1)),
            trade(2, 2, 20, Action::Cover, dec!(34000), dec!(1)),
        ];

        let groups = aggregate_trades(&trades);
        assert_eq!(groups[0].pnl, dec!(1998));
        assert!(groups[0].gain_loss > Decimal::ZERO);
    }

    #[test]
    fn test_summary_counts_and_ratios() {
        let trades = vec![
            trade(1, 1, 10, Action::Long, dec!(1000), dec!(0)),
            trade(1, 2, 20, Action::Sell, dec!(-1500), dec!(0)),
            trade(2, 1, 30, Action::Long, dec!(1000), dec!(0)),
            trade(2, 2, 40, Action::Sell, dec!(-750), dec!(0)),
        ];
        let equity = curve(&[(10, dec!(10000)), (40, dec!(10250))]);

        let summary = compute_summary(&trades, &equity);
        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.num_winning_trades, 1);
        assert_eq!(summary.num_losing_trades, 1);
        assert_eq!(summary.net_profit, dec!(250));
        assert_eq!(summary.percent_profitable, dec!(0.5));
        assert_eq!(summary.profit_factor, dec!(2));
        assert_eq!(summary.ending_equity, dec!(10250));
        assert_eq!(summary.total_return, dec!(0.025));
    }

    #[test]
    fn test_max_drawdown() {
        let equity = curve(&[
            (1, dec!(100)),
            (2, dec!(120)),
            (3, dec!(90)),
            (4, dec!(110)),
        ]);
        assert_eq!(max_drawdown(&equity), dec!(0.25));
    }

    #[test]
    fn test_empty_inputs() {
        let summary = compute_summary(&[], &[]);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.net_profit, Decimal::ZERO);
        assert_eq!(summary.max_drawdown, Decimal::ZERO);
    }
}
