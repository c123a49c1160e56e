//! Minimal end-to-end run: generate sample bars, trade a buy-and-flatten
//! strategy through the simulated broker, and print the summary.

use anyhow::{Context, Result};
use bf_data::SampleBars;
use bf_engine::{
    BacktestConfig, EventController, OrderBook, PortfolioServer, SignalDirective, Strategy,
};
use bf_types::{
    Action, Currency, Industry, MarketEvent, MissingValuePolicy, OrderType, SecurityType, Symbol,
    SymbolCore, SymbolMap, TradeInstruction, Venue,
};
use rust_decimal::Decimal;

const DAY_NS: u64 = 86_400_000_000_000;

struct BuyAndFlatten {
    entry: TradeInstruction,
    exit: TradeInstruction,
    entered: bool,
    bars_held: u32,
}

impl Strategy for BuyAndFlatten {
    fn handle_market_data(
        &mut self,
        _event: &MarketEvent,
        _order_book: &OrderBook,
        portfolio: &PortfolioServer,
    ) -> Vec<SignalDirective> {
        if !self.entered {
            self.entered = true;
            return vec![SignalDirective {
                trade_capital: Decimal::from(5000),
                instructions: vec![self.entry.clone()],
            }];
        }

        self.bars_held += 1;
        if self.bars_held == 20 && portfolio.positions.contains_key("ACME") {
            return vec![SignalDirective {
                trade_capital: Decimal::from(5000),
                instructions: vec![self.exit.clone()],
            }];
        }
        Vec::new()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let core = SymbolCore::new(
        "ACME",
        SecurityType::Stock,
        Currency::Usd,
        Venue::Nasdaq,
        Decimal::new(1, 2),
        Decimal::ZERO,
        1,
        Decimal::ONE,
        None,
    )?;
    let symbol = Symbol::equity(
        core,
        "Acme Corp.",
        Industry::Industrials,
        Decimal::from(1_000_000),
        100_000,
    )
    .context("building the demo symbol")?;

    let strategy = BuyAndFlatten {
        entry: TradeInstruction::new("ACME", OrderType::Market, Action::Long, 1, 1, Decimal::ONE)?,
        exit: TradeInstruction::new("ACME", OrderType::Market, Action::Sell, 1, 2, Decimal::ONE)?,
        entered: false,
        bars_held: 0,
    };

    let bars = SampleBars::with_seed(7).generate("ACME", 0, DAY_NS, 60, Decimal::from(100));

    let config = BacktestConfig {
        symbols: SymbolMap::new(vec![symbol]),
        starting_capital: Decimal::from(10_000),
        slippage_factor: 0,
        bars,
        missing_value_policy: MissingValuePolicy::FillForward,
        parameters: serde_json::json!({ "strategy": "buy_and_flatten" }),
    };

    let mut controller = EventController::backtest(config, Box::new(strategy), None)?;
    let ledger = controller.ledger();
    controller.run()?;

    let summary = ledger.read().finalize(serde_json::Value::Null);
    println!("trades: {}", summary.trades.len());
    println!("net profit: {}", summary.static_stats.net_profit);
    println!("ending equity: {}", summary.static_stats.ending_equity);
    Ok(())
}
