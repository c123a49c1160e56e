use crossbeam_channel::Sender;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{error, info, warn};

use bf_types::{
    round2, round4, AccountSnapshot, Action, BookError, BrokerError, Contract, EngineError,
    EngineResult, EquityPoint, Event, ExecutionEvent, Order, OrderEvent, Position, SecurityType,
    Side, Symbol, SymbolMap, Trade,
};

use crate::ledger::PerformanceLedger;
use crate::order_book::OrderBook;
use crate::portfolio::PortfolioServer;
use crate::Shared;

/// The execution seam the event loop dispatches into. Implemented by the
/// simulated [`BrokerClient`] for backtests and by the live adapter.
pub trait ExecutionHandler: Send {
    fn on_order(&mut self, event: &OrderEvent) -> EngineResult<()>;
    fn on_execution(&mut self, event: &ExecutionEvent) -> EngineResult<()>;
    /// Mark to market and check margin; returns whether a margin call triggered.
    fn eod_update(&mut self) -> EngineResult<bool>;
    fn update_equity_value(&mut self) -> EngineResult<()>;
    fn liquidate_positions(&mut self) -> EngineResult<()>;
    /// Called between dispatches when the queue is idle (live mode).
    fn on_idle(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

/// Mark-to-market broker simulation: positions, margin accounting,
/// slippage-adjusted fills, commissions, and liquidation.
pub struct SimulatedBroker {
    symbols: SymbolMap,
    event_tx: Sender<Event>,
    order_book: Shared<OrderBook>,
    pub positions: HashMap<String, Position>,
    pub account: AccountSnapshot,
    last_trade: HashMap<String, Trade>,
    /// Ticks of adverse price movement applied to every simulated fill.
    slippage_factor: u32,
}

impl SimulatedBroker {
    pub fn new(
        symbols: SymbolMap,
        event_tx: Sender<Event>,
        order_book: Shared<OrderBook>,
        starting_capital: Decimal,
        slippage_factor: u32,
    ) -> Self {
        Self {
            symbols,
            event_tx,
            order_book,
            positions: HashMap::new(),
            account: AccountSnapshot::with_capital(starting_capital),
            last_trade: HashMap::new(),
            slippage_factor,
        }
    }

    pub fn symbols(&self) -> &SymbolMap {
        &self.symbols
    }

    pub fn last_trades(&self) -> &HashMap<String, Trade> {
        &self.last_trade
    }

    pub fn equity_point(&self) -> EquityPoint {
        EquityPoint {
            timestamp: self.account.timestamp,
            equity_value: self.account.net_liquidation,
        }
    }

    /// Simulate a fill for the order, mutate account and positions, record
    /// the trade, and emit an execution event.
    #[allow(clippy::too_many_arguments)]
    pub fn place_order(
        &mut self,
        timestamp: u64,
        trade_id: u32,
        leg_id: u32,
        action: Action,
        contract: &Contract,
        order: &Order,
    ) -> EngineResult<()> {
        let quantity = order.signed_quantity();
        let fill_price = self.fill_price(contract, action)?;
        let fees = self.commission_fees(&contract.symbol, quantity);

        self.apply_fill(contract, action, quantity, fill_price, fees)?;

        let trade = self.record_trade(
            timestamp,
            trade_id,
            leg_id,
            &contract.symbol,
            quantity,
            action,
            fill_price,
            fees,
        )?;

        self.event_tx
            .send(Event::Execution(ExecutionEvent {
                timestamp,
                trade,
                action,
                contract: contract.clone(),
            }))
            .map_err(|_| EngineError::QueueDisconnected)?;
        Ok(())
    }

    /// Current reference price moved `slippage_factor` ticks against the
    /// actor: up for Long/Cover, down for Short/Sell.
    pub fn fill_price(&self, contract: &Contract, action: Action) -> EngineResult<Decimal> {
        let tick_size = match contract.sec_type {
            SecurityType::Stock => Decimal::ONE,
            SecurityType::Future => self
                .symbols
                .get(&contract.symbol)
                .map(Symbol::tick_size)
                .ok_or_else(|| BrokerError::UnsupportedInstrument {
                    ticker: contract.symbol.clone(),
                })?,
            _ => {
                return Err(BrokerError::UnsupportedInstrument {
                    ticker: contract.symbol.clone(),
                }
                .into())
            }
        };

        let current_price = self.order_book.read().current_price(&contract.symbol)?;
        let slippage = tick_size * Decimal::from(self.slippage_factor);
        Ok(match action.side() {
            Side::Buy => current_price + slippage,
            Side::Sell => current_price - slippage,
        })
    }

    /// Per-unit commission; unknown tickers are charged nothing.
    pub fn commission_fees(&self, ticker: &str, quantity: Decimal) -> Decimal {
        match self.symbols.get(ticker) {
            Some(symbol) => quantity.abs() * symbol.core().fees_per_unit,
            None => {
                error!(ticker, "symbol not found in symbol map; defaulting to 0 commission");
                Decimal::ZERO
            }
        }
    }

    fn apply_fill(
        &mut self,
        contract: &Contract,
        action: Action,
        quantity: Decimal,
        fill_price: Decimal,
        fees: Decimal,
    ) -> EngineResult<()> {
        let symbol = self
            .symbols
            .get(&contract.symbol)
            .cloned()
            .ok_or_else(|| BrokerError::UnsupportedInstrument {
                ticker: contract.symbol.clone(),
            })?;

        match &symbol {
            Symbol::Future(future) => self.update_account_futures(
                &future.core.ticker,
                future.core.initial_margin,
                action,
                quantity,
                fill_price,
                fees,
            ),
            Symbol::Equity(_) => self.update_account_equity(action, quantity, fill_price, fees),
            _ => {
                return Err(BrokerError::UnsupportedInstrument {
                    ticker: contract.symbol.clone(),
                }
                .into())
            }
        }

        self.apply_fill_to_position(&symbol, action, quantity, fill_price);
        self.update_equity_value()
    }

    /// PnL realized by exiting `quantity` at `current_price`. The exiting
    /// quantity is treated as the negative of the entry quantity.
    fn trade_pnl(position: &Position, current_price: Decimal, quantity: Decimal) -> Decimal {
        let exit_quantity = -quantity;
        let entry_value = position.avg_cost * exit_quantity;
        let current_value = current_price
            * position.price_multiplier
            * Decimal::from(position.quantity_multiplier)
            * exit_quantity;
        current_value - entry_value
    }

    fn pnl_per_contract(position: &Position) -> Decimal {
        position.unrealized_pnl / position.quantity.abs()
    }

    fn update_account_futures(
        &mut self,
        ticker: &str,
        initial_margin: Decimal,
        action: Action,
        quantity: Decimal,
        fill_price: Decimal,
        fees: Decimal,
    ) {
        self.account.full_available_funds -= fees;
        let side = action.side();

        if let Some(position) = self.positions.get_mut(ticker) {
            if position.action == side {
                // Adding to the same side only locks more margin.
                self.account.full_init_margin_req += initial_margin * quantity.abs();
            } else if position.quantity.abs() > quantity.abs() {
                // Partial exit: realize the marked PnL for the exited slice.
                let pnl = Self::trade_pnl(position, fill_price, quantity);
                let pnl_segment = Self::pnl_per_contract(position) * quantity;
                position.unrealized_pnl -= pnl_segment;
                self.account.full_available_funds += pnl - pnl_segment;
                self.account.full_init_margin_req -= initial_margin * quantity.abs();
            } else if position.quantity.abs() == quantity.abs() {
                // Full exit.
                let pnl = Self::trade_pnl(position, fill_price, quantity);
                self.account.full_available_funds += pnl - position.unrealized_pnl;
                self.account.full_init_margin_req -= initial_margin * quantity.abs();
            } else {
                // Flip: close the old side, open the remainder on the new one.
                let pnl = Self::trade_pnl(position, fill_price, quantity);
                self.account.full_available_funds += pnl - position.unrealized_pnl;
                self.account.full_init_margin_req -= initial_margin * position.quantity.abs();
                self.account.full_init_margin_req +=
                    initial_margin * (quantity.abs() - position.quantity.abs());
                position.unrealized_pnl = Decimal::ZERO;
            }
        } else {
            self.account.full_init_margin_req += initial_margin * quantity.abs();
        }
    }

    fn update_account_equity(
        &mut self,
        action: Action,
        quantity: Decimal,
        fill_price: Decimal,
        fees: Decimal,
    ) {
        self.account.full_available_funds -= fees;
        let capital_impact = fill_price * quantity.abs();
        match action.side() {
            Side::Buy => self.account.full_available_funds -= capital_impact,
            Side::Sell => self.account.full_available_funds += capital_impact,
        }
    }

    fn apply_fill_to_position(
        &mut self,
        symbol: &Symbol,
        action: Action,
        quantity: Decimal,
        fill_price: Decimal,
    ) {
        let core = symbol.core();
        let price_multiplier = core.price_multiplier;
        let quantity_multiplier = Decimal::from(core.quantity_multiplier);
        let side = action.side();
        let ticker = core.ticker.clone();

        let mut closed = false;
        if let Some(position) = self.positions.get_mut(&ticker) {
            let existing_value = position.avg_cost * position.quantity;
            let added_value = fill_price * price_multiplier * quantity_multiplier * quantity;
            let net_quantity = position.quantity + quantity;

            if net_quantity.is_zero() {
                closed = true;
            } else if side == position.action {
                position.quantity = net_quantity;
                position.avg_cost = (existing_value + added_value) / net_quantity;
                position.total_cost = existing_value + added_value;
            } else if quantity.abs() < position.quantity.abs() {
                // Reduced without flipping: cost basis is preserved.
                position.quantity = net_quantity;
                position.total_cost = net_quantity * position.avg_cost;
            } else {
                // Flipped through zero: the position restarts at the fill.
                position.action = if net_quantity > Decimal::ZERO {
                    Side::Buy
                } else {
                    Side::Sell
                };
                position.quantity = net_quantity;
                position.avg_cost = fill_price;
                position.total_cost = net_quantity * fill_price;
            }
        } else {
            let avg_cost = round4(fill_price * price_multiplier * quantity_multiplier);
            self.positions.insert(
                ticker.clone(),
                Position {
                    action: side,
                    quantity,
                    avg_cost,
                    quantity_multiplier: core.quantity_multiplier,
                    price_multiplier,
                    initial_margin: core.initial_margin,
                    unrealized_pnl: Decimal::ZERO,
                    total_cost: avg_cost * quantity,
                    market_value: Decimal::ZERO,
                },
            );
        }

        if closed {
            self.positions.remove(&ticker);
        }
    }

    /// Recompute net liquidation from available funds plus per-position
    /// values (mark-to-market PnL for futures, market value for equities).
    pub fn update_equity_value(&mut self) -> EngineResult<()> {
        let (prices, last_updated) = {
            let book = self.order_book.read();
            (book.current_prices(), book.last_updated())
        };

        let mut portfolio_value = Decimal::ZERO;
        for (ticker, position) in &mut self.positions {
            let current_price = prices.get(ticker).ok_or_else(|| BookError::UnknownTicker {
                ticker: ticker.clone(),
            })?;
            let value = match self.symbols.get(ticker) {
                Some(Symbol::Future(_)) => future_position_value(position, *current_price),
                Some(Symbol::Equity(_)) => equity_position_value(position, *current_price),
                _ => {
                    return Err(BrokerError::UnsupportedInstrument {
                        ticker: ticker.clone(),
                    }
                    .into())
                }
            };
            position.market_value = value;
            portfolio_value += value;
        }

        self.account.net_liquidation = round2(self.account.full_available_funds + portfolio_value);
        self.account.timestamp = last_updated;
        Ok(())
    }

    /// End-of-day revaluation: flow the day's PnL change on every futures
    /// position into available funds.
    pub fn mark_to_market(&mut self) -> EngineResult<()> {
        let prices = self.order_book.read().current_prices();
        let mut total_new_pnl = Decimal::ZERO;
        self.account.unrealized_pnl = Decimal::ZERO;

        for (ticker, position) in &mut self.positions {
            let is_future = matches!(self.symbols.get(ticker), Some(Symbol::Future(_)));
            if !is_future {
                continue;
            }
            let current_price = prices.get(ticker).ok_or_else(|| BookError::UnknownTicker {
                ticker: ticker.clone(),
            })?;
            let pnl = future_position_value(position, *current_price);
            self.account.unrealized_pnl += pnl;
            total_new_pnl += pnl - position.unrealized_pnl;
            position.unrealized_pnl = pnl;
        }

        self.account.full_available_funds += total_new_pnl;
        info!("account marked to market");
        Ok(())
    }

    /// A margin call is detected and logged; the response policy is left to
    /// surrounding orchestration.
    pub fn check_margin_call(&self) -> bool {
        if self.account.full_available_funds < self.account.full_init_margin_req {
            warn!(
                funds = %self.account.full_available_funds,
                margin_req = %self.account.full_init_margin_req,
                "margin call triggered"
            );
            return true;
        }
        false
    }

    /// Synthesize a closing trade per open position at the last known price,
    /// fee-free, so the ledger reflects a flat final state. The positions map
    /// itself is left untouched.
    pub fn liquidate_positions(&mut self) -> EngineResult<()> {
        let tickers: Vec<String> = self.positions.keys().cloned().collect();
        for ticker in tickers {
            let (action, quantity) = match self.positions.get(&ticker) {
                Some(position) => (
                    match position.action {
                        Side::Buy => Action::Sell,
                        Side::Sell => Action::Cover,
                    },
                    -position.quantity,
                ),
                None => continue,
            };

            let (trade_id, leg_id) = match self.last_trade.get(&ticker) {
                Some(trade) => (trade.trade_id, trade.leg_id),
                None => {
                    warn!(%ticker, "no prior trade for open position; skipping liquidation record");
                    continue;
                }
            };

            let symbol = self.symbols.get(&ticker).cloned().ok_or_else(|| {
                BrokerError::UnsupportedInstrument {
                    ticker: ticker.clone(),
                }
            })?;
            let contract = symbol.to_contract();
            let fill_price = self.fill_price(&contract, action)?;
            let timestamp = self
                .order_book
                .read()
                .record(&ticker)
                .map(|record| record.timestamp())
                .unwrap_or(self.account.timestamp);

            self.record_trade(
                timestamp,
                trade_id,
                leg_id,
                &ticker,
                quantity,
                action,
                fill_price,
                Decimal::ZERO,
            )?;
        }

        info!(count = self.last_trade.len(), "positions liquidated");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn record_trade(
        &mut self,
        timestamp: u64,
        trade_id: u32,
        leg_id: u32,
        ticker: &str,
        quantity: Decimal,
        action: Action,
        fill_price: Decimal,
        fees: Decimal,
    ) -> EngineResult<Trade> {
        let symbol = self
            .symbols
            .get(ticker)
            .ok_or_else(|| BrokerError::UnsupportedInstrument {
                ticker: ticker.to_string(),
            })?;
        let core = symbol.core();
        let trade_value = round2(
            fill_price * core.price_multiplier * quantity * Decimal::from(core.quantity_multiplier),
        );

        let trade = Trade {
            trade_id,
            leg_id,
            timestamp,
            ticker: ticker.to_string(),
            quantity: round4(quantity),
            avg_price: round4(fill_price),
            trade_value,
            trade_cost: round2(trade_value + fees),
            action,
            fees: round4(fees),
        };
        trade.validate()?;

        self.last_trade.insert(ticker.to_string(), trade.clone());
        Ok(trade)
    }
}

/// Mark-to-market PnL of a futures position at `current_price`.
pub fn future_position_value(position: &Position, current_price: Decimal) -> Decimal {
    let entry_cost = position.avg_cost * position.quantity;
    let current_cost = current_price
        * position.price_multiplier
        * Decimal::from(position.quantity_multiplier)
        * position.quantity;
    current_cost - entry_cost
}

/// Market value of an equity position at `current_price`.
pub fn equity_position_value(position: &Position, current_price: Decimal) -> Decimal {
    current_price
        * position.price_multiplier
        * Decimal::from(position.quantity_multiplier)
        * position.quantity
}

/// Simulated-broker front end for the event loop: routes orders into the
/// broker and mirrors its state into the portfolio server and ledger.
pub struct BrokerClient {
    broker: SimulatedBroker,
    portfolio: Shared<PortfolioServer>,
    ledger: Shared<PerformanceLedger>,
}

impl BrokerClient {
    pub fn new(
        broker: SimulatedBroker,
        portfolio: Shared<PortfolioServer>,
        ledger: Shared<PerformanceLedger>,
    ) -> Self {
        let mut client = Self {
            broker,
            portfolio,
            ledger,
        };
        client.push_account();
        client
    }

    pub fn broker(&self) -> &SimulatedBroker {
        &self.broker
    }

    fn push_positions(&mut self) {
        let updates: Vec<(Contract, Position)> = self
            .broker
            .positions
            .iter()
            .filter_map(|(ticker, position)| {
                self.broker
                    .symbols()
                    .get(ticker)
                    .map(|symbol| (symbol.to_contract(), position.clone()))
            })
            .collect();

        let mut portfolio = self.portfolio.write();
        for (contract, position) in updates {
            portfolio.update_position(&contract, position);
        }
    }

    fn push_account(&mut self) {
        self.portfolio
            .write()
            .update_account_details(self.broker.account.clone());
    }

    fn push_trades(&mut self, contract: Option<&Contract>) {
        let mut ledger = self.ledger.write();
        match contract {
            Some(contract) => {
                if let Some(trade) = self.broker.last_trades().get(&contract.symbol) {
                    ledger.update_trades(trade.clone());
                }
            }
            None => {
                for trade in self.broker.last_trades().values() {
                    ledger.update_trades(trade.clone());
                }
            }
        }
    }
}

impl ExecutionHandler for BrokerClient {
    fn on_order(&mut self, event: &OrderEvent) -> EngineResult<()> {
        self.broker.place_order(
            event.timestamp,
            event.trade_id,
            event.leg_id,
            event.action,
            &event.contract,
            &event.order,
        )
    }

    fn on_execution(&mut self, event: &ExecutionEvent) -> EngineResult<()> {
        self.push_positions();
        self.push_account();
        self.update_equity_value()?;
        self.push_trades(Some(&event.contract));
        Ok(())
    }

    fn eod_update(&mut self) -> EngineResult<bool> {
        self.broker.mark_to_market()?;
        let margin_call = self.broker.check_margin_call();
        self.push_account();
        self.update_equity_value()?;
        Ok(margin_call)
    }

    fn update_equity_value(&mut self) -> EngineResult<()> {
        self.broker.update_equity_value()?;
        self.ledger.write().update_equity(self.broker.equity_point());
        Ok(())
    }

    fn liquidate_positions(&mut self) -> EngineResult<()> {
        self.push_positions();
        self.push_account();
        self.update_equity_value()?;
        self.broker.liquidate_positions()?;
        self.push_trades(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{shared, Shared};
    use bf_types::{
        BarRecord, ContractUnits, Currency, Industry, MarketRecord, SymbolCore, Venue,
    };
    use crossbeam_channel::{unbounded, Receiver};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn hogs() -> Symbol {
        let core = SymbolCore::new(
            "HEJ4",
            SecurityType::Future,
            Currency::Usd,
            Venue::Cme,
            dec!(0.85),
            dec!(4000),
            40000,
            dec!(0.01),
            None,
        )
        .unwrap();
        Symbol::future(
            core,
            "HE",
            "Lean Hogs",
            Industry::Agriculture,
            dec!(40000),
            ContractUnits::Pounds,
            dec!(0.00025),
            dec!(10),
            false,
            "202404",
        )
        .unwrap()
    }

    fn apple() -> Symbol {
        let core = SymbolCore::new(
            "AAPL",
            SecurityType::Stock,
            Currency::Usd,
            Venue::Nasdaq,
            dec!(0.1),
            dec!(0),
            1,
            dec!(1),
            None,
        )
        .unwrap();
        Symbol::equity(core, "Apple Inc.", Industry::Technology, dec!(1000000), 1000).unwrap()
    }

    struct Fixture {
        broker: SimulatedBroker,
        book: Shared<OrderBook>,
        rx: Receiver<Event>,
        _market_rx: Receiver<Event>,
    }

    fn fixture(capital: Decimal, slippage: u32) -> Fixture {
        let symbols = SymbolMap::new(vec![hogs(), apple()]);
        let (tx, rx) = unbounded();
        let (market_tx, market_rx) = unbounded();
        let book = shared(OrderBook::new(market_tx));
        let broker = SimulatedBroker::new(symbols, tx, book.clone(), capital, slippage);
        Fixture {
            broker,
            book,
            rx,
            _market_rx: market_rx,
        }
    }

    fn set_price(book: &Shared<OrderBook>, ticker: &str, price: Decimal, timestamp: u64) {
        let bar = BarRecord::new(ticker, timestamp, price, price, price, price, 1000).unwrap();
        let mut records = HashMap::new();
        records.insert(ticker.to_string(), MarketRecord::Bar(bar));
        book.write().update(records, timestamp).unwrap();
    }

    fn market(action: Action, quantity: Decimal) -> Order {
        Order::market(action, quantity).unwrap()
    }

    fn hogs_contract() -> Contract {
        hogs().to_contract()
    }

    fn apple_contract() -> Contract {
        apple().to_contract()
    }

    #[test]
    fn test_fill_price_slippage_per_action() {
        let f = fixture(dec!(100000), 2);
        set_price(&f.book, "HEJ4", dec!(90), 1);

        // 2 ticks of 0.00025 = 0.0005 against the actor
        let contract = hogs_contract();
        assert_eq!(f.broker.fill_price(&contract, Action::Long).unwrap(), dec!(90.0005));
        assert_eq!(f.broker.fill_price(&contract, Action::Cover).unwrap(), dec!(90.0005));
        assert_eq!(f.broker.fill_price(&contract, Action::Short).unwrap(), dec!(89.9995));
        assert_eq!(f.broker.fill_price(&contract, Action::Sell).unwrap(), dec!(89.9995));
    }

    #[test]
    fn test_equity_tick_size_is_one() {
        let f = fixture(dec!(100000), 1);
        set_price(&f.book, "AAPL", dec!(50), 1);
        assert_eq!(f.broker.fill_price(&apple_contract(), Action::Long).unwrap(), dec!(51));
    }

    #[test]
    fn test_commission_unknown_ticker_is_zero() {
        let f = fixture(dec!(100000), 0);
        assert_eq!(f.broker.commission_fees("ZC", dec!(10)), Decimal::ZERO);
        assert_eq!(f.broker.commission_fees("HEJ4", dec!(-10)), dec!(8.5));
    }

    #[test]
    fn test_futures_entry_then_full_exit() {
        let mut f = fixture(dec!(100000), 2);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(1)))
            .unwrap();

        assert_eq!(f.broker.account.full_available_funds, dec!(99999.15));
        assert_eq!(f.broker.account.full_init_margin_req, dec!(4000));
        let position = &f.broker.positions["HEJ4"];
        assert_eq!(position.quantity, dec!(1));
        // avg cost carries both multipliers: 90.0005 * 0.01 * 40000
        assert_eq!(position.avg_cost, dec!(36000.2));

        set_price(&f.book, "HEJ4", dec!(95), 2);
        f.broker
            .place_order(2, 1, 2, Action::Sell, &hogs_contract(), &market(Action::Sell, dec!(1)))
            .unwrap();

        // exit fill 94.9995, realized pnl (94.9995 - 90.0005) * 0.01 * 40000 = 1999.6
        assert_eq!(f.broker.account.full_available_funds, dec!(101997.90));
        assert_eq!(f.broker.account.full_init_margin_req, Decimal::ZERO);
        assert!(f.broker.positions.is_empty());

        // two executions were emitted, strictly after their orders
        assert_eq!(f.rx.try_iter().count(), 2);
    }

    #[test]
    fn test_round_trip_at_same_price_restores_funds() {
        let mut f = fixture(dec!(100000), 0);
        set_price(&f.book, "HEJ4", dec!(90), 1);

        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(3)))
            .unwrap();
        f.broker
            .place_order(2, 1, 2, Action::Sell, &hogs_contract(), &market(Action::Sell, dec!(3)))
            .unwrap();

        // only the two commissions moved the cash balance
        assert_eq!(
            f.broker.account.full_available_funds,
            dec!(100000) - dec!(0.85) * dec!(6)
        );
        assert_eq!(f.broker.account.full_init_margin_req, Decimal::ZERO);
    }

    #[test]
    fn test_equity_long_updates_cash_and_net_liquidation() {
        let mut f = fixture(dec!(10000), 0);
        set_price(&f.book, "AAPL", dec!(50), 1);

        f.broker
            .place_order(1, 1, 1, Action::Long, &apple_contract(), &market(Action::Long, dec!(100)))
            .unwrap();

        // 10000 - 10 fees - 5000 notional
        assert_eq!(f.broker.account.full_available_funds, dec!(4990));
        assert_eq!(f.broker.account.net_liquidation, dec!(9990));
        assert_eq!(f.broker.positions["AAPL"].quantity, dec!(100));
    }

    #[test]
    fn test_add_to_position_averages_cost() {
        let mut f = fixture(dec!(100000), 0);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(1)))
            .unwrap();
        set_price(&f.book, "HEJ4", dec!(92), 2);
        f.broker
            .place_order(2, 1, 2, Action::Long, &hogs_contract(), &market(Action::Long, dec!(1)))
            .unwrap();

        let position = &f.broker.positions["HEJ4"];
        assert_eq!(position.quantity, dec!(2));
        // (36000 + 36800) / 2
        assert_eq!(position.avg_cost, dec!(36400));
        assert_eq!(f.broker.account.full_init_margin_req, dec!(8000));
    }

    #[test]
    fn test_partial_reduce_keeps_cost_and_realizes_marked_pnl() {
        let mut f = fixture(dec!(100000), 0);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        f.broker
            .place_order(1, 1, 1, Action::Short, &hogs_contract(), &market(Action::Short, dec!(10)))
            .unwrap();
        let funds_after_entry = f.broker.account.full_available_funds;

        // Mark the short profitable: price falls to 85,
        // pnl = (85 - 90) * 0.01 * 40000 * -10 = 20000.
        set_price(&f.book, "HEJ4", dec!(85), 2);
        f.broker.mark_to_market().unwrap();
        assert_eq!(f.broker.positions["HEJ4"].unrealized_pnl, dec!(20000));
        let funds_after_mtm = f.broker.account.full_available_funds;
        assert_eq!(funds_after_mtm, funds_after_entry + dec!(20000));

        // Buy back 4 of 10 through an entry-side action.
        f.broker
            .place_order(3, 1, 2, Action::Long, &hogs_contract(), &market(Action::Long, dec!(4)))
            .unwrap();

        let position = &f.broker.positions["HEJ4"];
        assert_eq!(position.quantity, dec!(-6));
        assert_eq!(position.avg_cost, dec!(36000)); // basis preserved
        // the exited slice's marked pnl leaves the position...
        assert_eq!(position.unrealized_pnl, dec!(12000));
        // ...and the realized-vs-marked difference nets to the fees only
        let fees = dec!(0.85) * dec!(4);
        assert_eq!(f.broker.account.full_available_funds, funds_after_mtm - fees);
        assert_eq!(f.broker.account.full_init_margin_req, dec!(4000) * dec!(6));
    }

    #[test]
    fn test_flip_resets_position_and_margin() {
        let mut f = fixture(dec!(1000000), 0);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(5)))
            .unwrap();
        let margin_before = f.broker.account.full_init_margin_req;
        assert_eq!(margin_before, dec!(20000));

        // +5 long flipped by a 10-lot short at the same price
        f.broker
            .place_order(2, 2, 1, Action::Short, &hogs_contract(), &market(Action::Short, dec!(10)))
            .unwrap();

        let position = &f.broker.positions["HEJ4"];
        assert_eq!(position.action, Side::Sell);
        assert_eq!(position.quantity, dec!(-5));
        // avg cost restarts at the raw fill price
        assert_eq!(position.avg_cost, dec!(90));
        assert_eq!(position.unrealized_pnl, Decimal::ZERO);
        assert_eq!(f.broker.account.full_init_margin_req, margin_before);
    }

    #[test]
    fn test_eod_mark_to_market_short_position() {
        let mut f = fixture(dec!(100000), 0);
        set_price(&f.book, "HEJ4", dec!(50), 1);
        f.broker
            .place_order(1, 1, 1, Action::Short, &hogs_contract(), &market(Action::Short, dec!(10)))
            .unwrap();
        let position = &f.broker.positions["HEJ4"];
        assert_eq!(position.avg_cost, dec!(20000)); // 50 * 0.01 * 40000
        let funds_before = f.broker.account.full_available_funds;

        set_price(&f.book, "HEJ4", dec!(45), 2);
        f.broker.mark_to_market().unwrap();

        // 45*0.01*(-10)*40000 - 20000*(-10) = 20000
        assert_eq!(f.broker.positions["HEJ4"].unrealized_pnl, dec!(20000));
        assert_eq!(f.broker.account.unrealized_pnl, dec!(20000));
        assert_eq!(f.broker.account.full_available_funds, funds_before + dec!(20000));
    }

    #[test]
    fn test_margin_call_detection() {
        let mut f = fixture(dec!(100), 0);
        f.broker.account.full_init_margin_req = dec!(4000);
        assert!(f.broker.check_margin_call());

        f.broker.account.full_init_margin_req = dec!(50);
        assert!(!f.broker.check_margin_call());
    }

    #[test]
    fn test_net_liquidation_identity_after_fills() {
        let mut f = fixture(dec!(100000), 1);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        set_price(&f.book, "AAPL", dec!(50), 1);

        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(2)))
            .unwrap();
        f.broker
            .place_order(1, 1, 2, Action::Long, &apple_contract(), &market(Action::Long, dec!(10)))
            .unwrap();

        let prices = f.book.read().current_prices();
        let expected: Decimal = f
            .broker
            .positions
            .iter()
            .map(|(ticker, position)| match ticker.as_str() {
                "HEJ4" => future_position_value(position, prices["HEJ4"]),
                _ => equity_position_value(position, prices["AAPL"]),
            })
            .sum();
        assert_eq!(
            f.broker.account.net_liquidation,
            round2(f.broker.account.full_available_funds + expected)
        );

        // margin identity over futures positions
        assert_eq!(
            f.broker.account.full_init_margin_req,
            dec!(4000) * f.broker.positions["HEJ4"].quantity.abs()
        );
    }

    #[test]
    fn test_liquidation_records_fee_free_closing_trades() {
        let mut f = fixture(dec!(100000), 0);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        set_price(&f.book, "AAPL", dec!(50), 1);
        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(1)))
            .unwrap();
        f.broker
            .place_order(1, 2, 1, Action::Short, &apple_contract(), &market(Action::Short, dec!(10)))
            .unwrap();

        f.broker.liquidate_positions().unwrap();

        let hogs_close = &f.broker.last_trades()["HEJ4"];
        assert_eq!(hogs_close.action, Action::Sell);
        assert_eq!(hogs_close.quantity, dec!(-1));
        assert_eq!(hogs_close.fees, Decimal::ZERO);
        assert_eq!(hogs_close.trade_id, 1);

        let apple_close = &f.broker.last_trades()["AAPL"];
        assert_eq!(apple_close.action, Action::Cover);
        assert_eq!(apple_close.quantity, dec!(10));
        assert_eq!(apple_close.fees, Decimal::ZERO);

        // broker-side positions survive; only the ledger goes flat
        assert_eq!(f.broker.positions.len(), 2);
    }

    #[test]
    fn test_position_state_machine_long_paths() {
        let mut f = fixture(dec!(1000000), 0);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        let contract = hogs_contract();

        // Absent -> Long
        f.broker
            .place_order(1, 1, 1, Action::Long, &contract, &market(Action::Long, dec!(4)))
            .unwrap();
        assert_eq!(f.broker.positions["HEJ4"].action, Side::Buy);

        // Long -> Long (reduced, via Sell below current size)
        f.broker
            .place_order(2, 1, 2, Action::Sell, &contract, &market(Action::Sell, dec!(1)))
            .unwrap();
        assert_eq!(f.broker.positions["HEJ4"].quantity, dec!(3));

        // Long -> Absent (exact exit)
        f.broker
            .place_order(3, 1, 3, Action::Sell, &contract, &market(Action::Sell, dec!(3)))
            .unwrap();
        assert!(!f.broker.positions.contains_key("HEJ4"));

        // Absent -> Short -> Long (flip through zero)
        f.broker
            .place_order(4, 2, 1, Action::Short, &contract, &market(Action::Short, dec!(2)))
            .unwrap();
        f.broker
            .place_order(5, 2, 2, Action::Cover, &contract, &market(Action::Cover, dec!(5)))
            .unwrap();
        let position = &f.broker.positions["HEJ4"];
        assert_eq!(position.action, Side::Buy);
        assert_eq!(position.quantity, dec!(3));
    }

    fn assert_account_invariants(f: &Fixture) {
        let prices = f.book.read().current_prices();
        let mut portfolio_value = Decimal::ZERO;
        let mut margin = Decimal::ZERO;

        for (ticker, position) in &f.broker.positions {
            assert!(!position.quantity.is_zero());
            let price = prices[ticker];
            if ticker.as_str() == "HEJ4" {
                portfolio_value += future_position_value(position, price);
                margin += dec!(4000) * position.quantity.abs();
            } else {
                portfolio_value += equity_position_value(position, price);
            }
        }

        assert_eq!(
            f.broker.account.net_liquidation,
            round2(f.broker.account.full_available_funds + portfolio_value)
        );
        assert_eq!(f.broker.account.full_init_margin_req, margin);

        for trade in f.broker.last_trades().values() {
            assert!(trade.trade_id >= 1);
            assert!(trade.leg_id >= 1);
            assert!(trade.avg_price > Decimal::ZERO);
        }
    }

    #[test]
    fn test_invariants_hold_across_fill_sequence() {
        let mut f = fixture(dec!(500000), 1);
        set_price(&f.book, "HEJ4", dec!(90), 1);
        set_price(&f.book, "AAPL", dec!(50), 1);

        f.broker
            .place_order(1, 1, 1, Action::Long, &hogs_contract(), &market(Action::Long, dec!(2)))
            .unwrap();
        assert_account_invariants(&f);

        f.broker
            .place_order(1, 1, 2, Action::Long, &apple_contract(), &market(Action::Long, dec!(100)))
            .unwrap();
        assert_account_invariants(&f);

        set_price(&f.book, "HEJ4", dec!(92), 2);
        set_price(&f.book, "AAPL", dec!(52), 2);

        // flip the futures leg through zero
        f.broker
            .place_order(2, 2, 1, Action::Short, &hogs_contract(), &market(Action::Short, dec!(5)))
            .unwrap();
        assert_account_invariants(&f);

        // trim the equity leg
        f.broker
            .place_order(3, 2, 2, Action::Sell, &apple_contract(), &market(Action::Sell, dec!(40)))
            .unwrap();
        assert_account_invariants(&f);

        f.broker.mark_to_market().unwrap();
        f.broker.update_equity_value().unwrap();
        assert_account_invariants(&f);

        // flatten the short side completely
        f.broker
            .place_order(4, 3, 1, Action::Cover, &hogs_contract(), &market(Action::Cover, dec!(3)))
            .unwrap();
        assert_account_invariants(&f);
        assert!(!f.broker.positions.contains_key("HEJ4"));
    }

    #[test]
    fn test_execution_event_carries_recorded_trade() {
        let mut f = fixture(dec!(100000), 2);
        set_price(&f.book, "HEJ4", dec!(90), 7);
        f.broker
            .place_order(7, 4, 2, Action::Long, &hogs_contract(), &market(Action::Long, dec!(1)))
            .unwrap();

        match f.rx.try_recv().unwrap() {
            Event::Execution(execution) => {
                assert_eq!(execution.timestamp, 7);
                assert_eq!(execution.trade.trade_id, 4);
                assert_eq!(execution.trade.leg_id, 2);
                assert_eq!(execution.trade.avg_price, dec!(90.0005));
                // 90.0005 * 0.01 * 1 * 40000
                assert_eq!(execution.trade.trade_value, dec!(36000.20));
                assert_eq!(execution.trade.fees, dec!(0.85));
                assert_eq!(execution.action, Action::Long);
            }
            other => panic!("expected execution event, got {other:?}"),
        }
    }
}
