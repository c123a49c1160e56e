use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use bf_types::{
    BarRecord, EngineError, EngineResult, Event, MissingValuePolicy, SignalEvent, SymbolMap,
};

use crate::broker::{BrokerClient, ExecutionHandler, SimulatedBroker};
use crate::ledger::{PerformanceLedger, RunSummary};
use crate::order_book::OrderBook;
use crate::order_manager::OrderManager;
use crate::portfolio::PortfolioServer;
use crate::replay::HistoricalReplay;
use crate::strategy::Strategy;
use crate::{shared, Shared};

/// Selects the driver for the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Backtest,
    Live,
}

/// Monotone stop flag observed by the live loop between dispatches.
/// Typically set from a signal handler on the embedder's side.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives the frozen run artifact at finalization.
pub trait SummarySink: Send {
    fn save_backtest(&self, summary: &RunSummary) -> EngineResult<()>;
    fn save_live_session(&self, summary: &RunSummary) -> EngineResult<()>;
}

/// Configuration for a backtest run.
pub struct BacktestConfig {
    pub symbols: SymbolMap,
    pub starting_capital: Decimal,
    pub slippage_factor: u32,
    pub bars: Vec<BarRecord>,
    pub missing_value_policy: MissingValuePolicy,
    pub parameters: serde_json::Value,
}

/// Channel-and-state bundle live adapters share with the controller.
pub struct LiveWiring {
    pub event_tx: Sender<Event>,
    pub event_rx: Receiver<Event>,
    pub order_book: Shared<OrderBook>,
    pub portfolio: Shared<PortfolioServer>,
    pub ledger: Shared<PerformanceLedger>,
}

impl LiveWiring {
    pub fn new(symbols: SymbolMap) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            order_book: shared(OrderBook::new(event_tx.clone())),
            portfolio: shared(PortfolioServer::new(symbols)),
            ledger: shared(PerformanceLedger::new()),
            event_tx,
            event_rx,
        }
    }
}

/// Single-threaded cooperative event loop over the kernel queue.
pub struct EventController {
    mode: Mode,
    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    order_book: Shared<OrderBook>,
    portfolio: Shared<PortfolioServer>,
    ledger: Shared<PerformanceLedger>,
    order_manager: OrderManager,
    handler: Box<dyn ExecutionHandler>,
    strategy: Box<dyn Strategy>,
    replay: Option<HistoricalReplay>,
    shutdown: ShutdownFlag,
    sink: Option<Box<dyn SummarySink>>,
    parameters: serde_json::Value,
}

impl EventController {
    /// Assemble a controller from pre-built parts. Prefer [`Self::backtest`]
    /// or [`Self::live`] unless a test needs to swap a component.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: Mode,
        event_tx: Sender<Event>,
        event_rx: Receiver<Event>,
        order_book: Shared<OrderBook>,
        portfolio: Shared<PortfolioServer>,
        ledger: Shared<PerformanceLedger>,
        order_manager: OrderManager,
        handler: Box<dyn ExecutionHandler>,
        strategy: Box<dyn Strategy>,
        replay: Option<HistoricalReplay>,
        shutdown: ShutdownFlag,
        sink: Option<Box<dyn SummarySink>>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            mode,
            event_tx,
            event_rx,
            order_book,
            portfolio,
            ledger,
            order_manager,
            handler,
            strategy,
            replay,
            shutdown,
            sink,
            parameters,
        }
    }

    /// Wire up the full simulated stack for a backtest.
    pub fn backtest(
        config: BacktestConfig,
        strategy: Box<dyn Strategy>,
        sink: Option<Box<dyn SummarySink>>,
    ) -> EngineResult<Self> {
        let (event_tx, event_rx) = unbounded();
        let order_book = shared(OrderBook::new(event_tx.clone()));
        let portfolio = shared(PortfolioServer::new(config.symbols.clone()));
        let ledger = shared(PerformanceLedger::new());

        let broker = SimulatedBroker::new(
            config.symbols.clone(),
            event_tx.clone(),
            order_book.clone(),
            config.starting_capital,
            config.slippage_factor,
        );
        let handler = Box::new(BrokerClient::new(broker, portfolio.clone(), ledger.clone()));
        let order_manager = OrderManager::new(
            config.symbols,
            event_tx.clone(),
            order_book.clone(),
            portfolio.clone(),
        );
        let replay =
            HistoricalReplay::new(config.bars, config.missing_value_policy, event_tx.clone())?;

        Ok(Self::new(
            Mode::Backtest,
            event_tx,
            event_rx,
            order_book,
            portfolio,
            ledger,
            order_manager,
            handler,
            strategy,
            Some(replay),
            ShutdownFlag::new(),
            sink,
            config.parameters,
        ))
    }

    /// Wire up a live run around adapter-provided wiring and handler.
    pub fn live(
        symbols: SymbolMap,
        wiring: LiveWiring,
        handler: Box<dyn ExecutionHandler>,
        strategy: Box<dyn Strategy>,
        shutdown: ShutdownFlag,
        sink: Option<Box<dyn SummarySink>>,
        parameters: serde_json::Value,
    ) -> Self {
        let order_manager = OrderManager::new(
            symbols,
            wiring.event_tx.clone(),
            wiring.order_book.clone(),
            wiring.portfolio.clone(),
        );
        Self::new(
            Mode::Live,
            wiring.event_tx,
            wiring.event_rx,
            wiring.order_book,
            wiring.portfolio,
            wiring.ledger,
            order_manager,
            handler,
            strategy,
            None,
            shutdown,
            sink,
            parameters,
        )
    }

    pub fn ledger(&self) -> Shared<PerformanceLedger> {
        self.ledger.clone()
    }

    pub fn portfolio(&self) -> Shared<PortfolioServer> {
        self.portfolio.clone()
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn run(&mut self) -> EngineResult<()> {
        self.strategy.prepare()?;
        match self.mode {
            Mode::Backtest => self.run_backtest(),
            Mode::Live => self.run_live(),
        }
    }

    fn run_backtest(&mut self) -> EngineResult<()> {
        loop {
            let more = match self.replay.as_mut() {
                Some(replay) => replay.data_stream(&self.order_book)?,
                None => false,
            };
            if !more {
                break;
            }
            self.drain_queue()?;
        }

        // Final day boundary, then a flat ledger, then the artifact.
        self.handler.eod_update()?;
        self.handler.liquidate_positions()?;
        let summary = self.ledger.read().finalize(self.parameters.clone());
        if let Some(sink) = &self.sink {
            sink.save_backtest(&summary)?;
        }
        info!("backtest complete");
        Ok(())
    }

    fn run_live(&mut self) -> EngineResult<()> {
        info!("live event loop started");
        while !self.shutdown.is_requested() {
            match self.event_rx.recv_timeout(Duration::from_millis(250)) {
                Ok(event) => self.dispatch(event)?,
                Err(RecvTimeoutError::Timeout) => self.handler.on_idle()?,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // No in-flight event is interrupted; drain what arrived.
        self.drain_queue()?;
        self.handler.liquidate_positions()?;
        let summary = self.ledger.read().finalize(self.parameters.clone());
        if let Some(sink) = &self.sink {
            sink.save_live_session(&summary)?;
        }
        info!("live session complete");
        Ok(())
    }

    fn drain_queue(&mut self) -> EngineResult<()> {
        while let Ok(event) = self.event_rx.try_recv() {
            self.dispatch(event)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> EngineResult<()> {
        match event {
            Event::Market(market) => {
                let directives = {
                    let order_book = self.order_book.read();
                    let portfolio = self.portfolio.read();
                    self.strategy
                        .handle_market_data(&market, &order_book, &portfolio)
                };
                for directive in directives {
                    let signal = SignalEvent::new(
                        market.timestamp,
                        directive.trade_capital,
                        directive.instructions,
                    )?;
                    self.event_tx
                        .send(Event::Signal(signal))
                        .map_err(|_| EngineError::QueueDisconnected)?;
                }
                if self.mode == Mode::Backtest {
                    self.handler.update_equity_value()?;
                }
            }
            Event::Signal(signal) => {
                self.ledger.write().update_signals(signal.clone());
                self.order_manager.on_signal(&signal)?;
            }
            Event::Order(order) => self.handler.on_order(&order)?,
            Event::Execution(execution) => self.handler.on_execution(&execution)?,
            Event::Eod(_) => {
                self.handler.eod_update()?;
            }
        }
        Ok(())
    }
}
