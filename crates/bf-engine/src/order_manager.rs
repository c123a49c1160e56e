use crossbeam_channel::Sender;
use rust_decimal::Decimal;
use tracing::{info, warn};

use bf_types::{
    Action, EngineError, EngineResult, Event, Order, OrderError, OrderEvent, OrderType, SignalEvent,
    Symbol, SymbolMap, TradeInstruction,
};

use crate::order_book::OrderBook;
use crate::portfolio::PortfolioServer;
use crate::Shared;

/// Translates signal events into order events with capital budgeting and
/// active-order deduplication. A signal either becomes one order per leg or
/// nothing at all.
pub struct OrderManager {
    symbols: SymbolMap,
    event_tx: Sender<Event>,
    order_book: Shared<OrderBook>,
    portfolio: Shared<PortfolioServer>,
}

impl OrderManager {
    pub fn new(
        symbols: SymbolMap,
        event_tx: Sender<Event>,
        order_book: Shared<OrderBook>,
        portfolio: Shared<PortfolioServer>,
    ) -> Self {
        Self {
            symbols,
            event_tx,
            order_book,
            portfolio,
        }
    }

    /// Signal listener. Drops the whole signal when any leg's ticker already
    /// has a working order or an unresolved fill; otherwise sizes every leg,
    /// applies the all-or-nothing capital gate, and emits the basket.
    pub fn on_signal(&self, event: &SignalEvent) -> EngineResult<()> {
        let active = self.portfolio.read().get_active_order_tickers();
        if let Some(instruction) = event
            .instructions
            .iter()
            .find(|instruction| active.contains(&instruction.ticker))
        {
            info!(
                ticker = %instruction.ticker,
                "ticker in signal has an active order; ignoring signal"
            );
            return Ok(());
        }

        match self.build_basket(event) {
            Ok(orders) => {
                for order in orders {
                    self.event_tx
                        .send(Event::Order(order))
                        .map_err(|_| EngineError::QueueDisconnected)?;
                }
                Ok(())
            }
            Err(EngineError::Order(OrderError::InsufficientCapital { required, available })) => {
                info!(%required, %available, "not enough capital to execute all orders");
                Ok(())
            }
            Err(EngineError::QueueDisconnected) => Err(EngineError::QueueDisconnected),
            Err(err) => {
                warn!(error = %err, "order construction failed; dropping basket");
                Ok(())
            }
        }
    }

    fn build_basket(&self, event: &SignalEvent) -> EngineResult<Vec<OrderEvent>> {
        let portfolio = self.portfolio.read();
        let book = self.order_book.read();

        let mut orders = Vec::with_capacity(event.instructions.len());
        let mut total_capital_required = Decimal::ZERO;

        for instruction in &event.instructions {
            let symbol = self.symbols.get(&instruction.ticker).ok_or_else(|| {
                OrderError::UnsupportedInstrument {
                    ticker: instruction.ticker.clone(),
                }
            })?;
            let current_price = book.current_price(&instruction.ticker)?;

            let order = self.build_order(instruction, event.trade_capital, current_price, symbol, &portfolio)?;
            total_capital_required +=
                Self::order_value(symbol, order.base().total_quantity, current_price)?;

            orders.push(OrderEvent::new(
                event.timestamp,
                instruction.trade_id,
                instruction.leg_id,
                instruction.action,
                symbol.to_contract(),
                order,
            )?);
        }

        let account = &portfolio.account;
        let required = total_capital_required + account.full_init_margin_req;
        if required <= account.full_available_funds {
            Ok(orders)
        } else {
            Err(OrderError::InsufficientCapital {
                required,
                available: account.full_available_funds,
            }
            .into())
        }
    }

    fn build_order(
        &self,
        instruction: &TradeInstruction,
        trade_capital: Decimal,
        current_price: Decimal,
        symbol: &Symbol,
        portfolio: &PortfolioServer,
    ) -> EngineResult<Order> {
        let core = symbol.core();
        let order_allocation = trade_capital * instruction.weight.abs();

        let quantity = match instruction.action {
            // Entry legs are sized from the capital slice.
            Action::Long | Action::Short => {
                order_allocation
                    / (current_price * core.price_multiplier * Decimal::from(core.quantity_multiplier))
            }
            // Exit legs always flatten the whole position.
            Action::Sell | Action::Cover => {
                portfolio
                    .positions
                    .get(&instruction.ticker)
                    .ok_or_else(|| OrderError::NoPositionToExit {
                        ticker: instruction.ticker.clone(),
                    })?
                    .quantity
            }
        };

        let built = match instruction.order_type {
            OrderType::Market => Order::market(instruction.action, quantity),
            OrderType::Limit => Order::limit(instruction.action, quantity, current_price),
            OrderType::StopLoss => Order::stop_loss(instruction.action, quantity, current_price),
        };
        built.map_err(|err| {
            OrderError::ConstructionFailed {
                ticker: instruction.ticker.clone(),
                source: Box::new(err.into()),
            }
            .into()
        })
    }

    /// Capital a leg consumes: margin for futures, notional for equities.
    fn order_value(symbol: &Symbol, quantity: Decimal, current_price: Decimal) -> EngineResult<Decimal> {
        match symbol {
            Symbol::Future(future) => Ok(quantity.abs() * future.core.initial_margin),
            Symbol::Equity(_) => Ok(quantity.abs() * current_price),
            _ => Err(OrderError::UnsupportedInstrument {
                ticker: symbol.ticker().to_string(),
            }
            .into()),
        }
    }
}
