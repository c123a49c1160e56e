use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use bf_engine::{ExecutionHandler, PerformanceLedger, PortfolioServer, Shared};
use bf_types::{
    AccountSnapshot, Currency, EngineResult, EquityPoint, ExecutionEvent, OrderEvent, Trade,
};

use crate::gateway::{BrokerGateway, GatewayEvent};

/// How long rapid account-value callbacks are buffered before one coalesced
/// snapshot reaches the portfolio server.
pub const ACCOUNT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Pending coalesced account snapshot. The mutex guards the in-progress
/// snapshot and the flush deadline against the gateway thread.
struct AccountBuffer {
    pending: AccountSnapshot,
    dirty: bool,
    flush_due: Option<Instant>,
}

/// Live-side execution handler: routes kernel orders to the gateway and
/// funnels gateway callbacks into the portfolio server and ledger.
pub struct LiveBrokerClient<G: BrokerGateway> {
    gateway: G,
    portfolio: Shared<PortfolioServer>,
    ledger: Shared<PerformanceLedger>,
    /// Callbacks pushed by the gateway adapter thread, drained on idle.
    gateway_rx: Option<Receiver<GatewayEvent>>,
    account_buffer: Mutex<AccountBuffer>,
    debounce: Duration,
}

impl<G: BrokerGateway> LiveBrokerClient<G> {
    pub fn new(
        gateway: G,
        portfolio: Shared<PortfolioServer>,
        ledger: Shared<PerformanceLedger>,
    ) -> Self {
        Self::with_debounce(gateway, portfolio, ledger, ACCOUNT_DEBOUNCE)
    }

    pub fn with_debounce(
        gateway: G,
        portfolio: Shared<PortfolioServer>,
        ledger: Shared<PerformanceLedger>,
        debounce: Duration,
    ) -> Self {
        Self {
            gateway,
            portfolio,
            ledger,
            gateway_rx: None,
            account_buffer: Mutex::new(AccountBuffer {
                pending: AccountSnapshot::with_capital(Decimal::ZERO),
                dirty: false,
                flush_due: None,
            }),
            debounce,
        }
    }

    /// Attach the channel a gateway adapter pushes its callbacks onto.
    pub fn with_gateway_events(mut self, gateway_rx: Receiver<GatewayEvent>) -> Self {
        self.gateway_rx = Some(gateway_rx);
        self
    }

    /// Apply every callback the adapter thread has queued so far.
    pub fn drain_gateway_events(&mut self) {
        let Some(gateway_rx) = self.gateway_rx.clone() else {
            return;
        };
        while let Ok(event) = gateway_rx.try_recv() {
            self.on_gateway_event(event);
        }
    }

    pub fn connect(&mut self) -> EngineResult<()> {
        self.gateway.connect()
    }

    /// Apply one gateway callback. Called from the consumer thread after the
    /// adapter relays its events.
    pub fn on_gateway_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::OrderStatus(order) | GatewayEvent::OpenOrder(order) => {
                self.portfolio.write().update_orders(order);
            }
            GatewayEvent::ExecutionReport { trade, .. } => {
                self.record_trade(trade);
            }
            GatewayEvent::CommissionReport { ticker, commission } => {
                debug!(%ticker, %commission, "commission report received");
            }
            GatewayEvent::PortfolioUpdate { contract, position } => match position {
                Some(position) => self.portfolio.write().update_position(&contract, position),
                None => self.portfolio.write().remove_position(&contract),
            },
            GatewayEvent::AccountValue {
                key,
                value,
                currency,
            } => self.buffer_account_value(&key, &value, currency.as_deref()),
            GatewayEvent::AccountSummaryEnd => self.flush_account(Instant::now(), true),
        }
    }

    fn record_trade(&mut self, trade: Trade) {
        self.ledger.write().update_trades(trade);
    }

    fn buffer_account_value(&self, key: &str, value: &str, currency: Option<&str>) {
        let mut buffer = self.account_buffer.lock();
        let parsed = Decimal::from_str(value);

        match (key, parsed) {
            ("FullAvailableFunds", Ok(v)) => buffer.pending.full_available_funds = v,
            ("FullInitMarginReq", Ok(v)) => buffer.pending.full_init_margin_req = v,
            ("NetLiquidation", Ok(v)) => buffer.pending.net_liquidation = v,
            ("UnrealizedPnL", Ok(v)) => buffer.pending.unrealized_pnl = v,
            ("FullMaintMarginReq", Ok(v)) => buffer.pending.full_maint_margin_req = Some(v),
            ("ExcessLiquidity", Ok(v)) => buffer.pending.excess_liquidity = Some(v),
            ("BuyingPower", Ok(v)) => buffer.pending.buying_power = Some(v),
            ("FuturesPNL", Ok(v)) => buffer.pending.futures_pnl = Some(v),
            ("TotalCashBalance", Ok(v)) => buffer.pending.total_cash_balance = Some(v),
            ("Currency", _) => {
                buffer.pending.currency = currency.or(Some(value)).and_then(parse_currency)
            }
            (_, Err(_)) => {
                warn!(key, value, "unparseable account value ignored");
                return;
            }
            _ => return,
        }
        buffer.dirty = true;

        // The PnL key closes out one burst of updates; (re)arm the timer.
        if key == "UnrealizedPnL" {
            buffer.flush_due = Some(Instant::now() + self.debounce);
        }
    }

    fn flush_account(&self, now: Instant, force: bool) {
        let snapshot = {
            let mut buffer = self.account_buffer.lock();
            if !buffer.dirty {
                return;
            }
            let due = buffer.flush_due.map_or(force, |due| force || now >= due);
            if !due {
                return;
            }
            buffer.dirty = false;
            buffer.flush_due = None;
            buffer.pending.clone()
        };

        // Portfolio and ledger writes happen outside the buffer lock.
        self.portfolio.write().update_account_details(snapshot.clone());
        self.ledger.write().update_account_log(snapshot);
        debug!("processed buffered account updates");
    }
}

fn parse_currency(code: &str) -> Option<Currency> {
    match code {
        "USD" => Some(Currency::Usd),
        "CAD" => Some(Currency::Cad),
        "EUR" => Some(Currency::Eur),
        "GBP" => Some(Currency::Gbp),
        "AUD" => Some(Currency::Aud),
        "JPY" => Some(Currency::Jpy),
        _ => None,
    }
}

impl<G: BrokerGateway> ExecutionHandler for LiveBrokerClient<G> {
    fn on_order(&mut self, event: &OrderEvent) -> EngineResult<()> {
        let order_id = self.gateway.next_valid_order_id()?;
        info!(order_id, ticker = %event.contract.symbol, "routing order to gateway");
        self.gateway
            .place_order(order_id, &event.contract, &event.order)
    }

    fn on_execution(&mut self, event: &ExecutionEvent) -> EngineResult<()> {
        self.record_trade(event.trade.clone());
        Ok(())
    }

    fn eod_update(&mut self) -> EngineResult<bool> {
        // The live broker marks to market on its side; we only snapshot the
        // mirrored equity.
        self.update_equity_value()?;
        Ok(false)
    }

    fn update_equity_value(&mut self) -> EngineResult<()> {
        let account = self.portfolio.read().account.clone();
        self.ledger.write().update_equity(EquityPoint {
            timestamp: account.timestamp,
            equity_value: account.net_liquidation,
        });
        Ok(())
    }

    fn liquidate_positions(&mut self) -> EngineResult<()> {
        // Best-effort cancellation before the connection goes away.
        if let Err(error) = self.gateway.cancel_open_orders() {
            warn!(%error, "failed to cancel open orders on shutdown");
        }
        self.gateway.disconnect()
    }

    fn on_idle(&mut self) -> EngineResult<()> {
        self.drain_gateway_events();
        self.flush_account(Instant::now(), false);
        Ok(())
    }
}
