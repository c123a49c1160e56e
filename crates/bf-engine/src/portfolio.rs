use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use bf_types::{AccountSnapshot, ActiveOrder, Contract, OrderStatus, Position, SymbolMap};

use crate::observer::{Observer, UpdateKind};

/// Authoritative mirror of account, positions, and active orders.
///
/// Written only from the consumer thread; the order manager and ledger read
/// through it. Fills are gated: when an order reaches `Filled` its ticker
/// enters `pending_positions_update` and stays there until the broker's
/// position update lands, so a new signal on that ticker is refused in the
/// interim.
pub struct PortfolioServer {
    symbols: SymbolMap,
    pub positions: HashMap<String, Position>,
    pub account: AccountSnapshot,
    pub active_orders: HashMap<i64, ActiveOrder>,
    pending_positions_update: HashSet<String>,
    capital: Decimal,
    observers: Vec<Box<dyn Observer>>,
}

impl PortfolioServer {
    pub fn new(symbols: SymbolMap) -> Self {
        Self {
            symbols,
            positions: HashMap::new(),
            account: AccountSnapshot::with_capital(Decimal::ZERO),
            active_orders: HashMap::new(),
            pending_positions_update: HashSet::new(),
            capital: Decimal::ZERO,
            observers: Vec::new(),
        }
    }

    pub fn attach(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn symbols(&self) -> &SymbolMap {
        &self.symbols
    }

    pub fn capital(&self) -> Decimal {
        self.capital
    }

    /// Replace the position for the contract's ticker and clear any pending
    /// gate on it.
    pub fn update_position(&mut self, contract: &Contract, position: Position) {
        self.pending_positions_update.remove(&contract.symbol);
        self.positions.insert(contract.symbol.clone(), position);
        debug!(ticker = %contract.symbol, "position updated");
        self.notify(UpdateKind::PositionUpdate);
    }

    /// Drop the position for a ticker that netted to zero.
    pub fn remove_position(&mut self, contract: &Contract) {
        self.pending_positions_update.remove(&contract.symbol);
        if self.positions.remove(&contract.symbol).is_some() {
            debug!(ticker = %contract.symbol, "position closed");
            self.notify(UpdateKind::PositionUpdate);
        }
    }

    pub fn update_account_details(&mut self, account: AccountSnapshot) {
        self.capital = account.full_available_funds;
        self.account = account;
        self.notify(UpdateKind::AccountUpdate);
    }

    /// Upsert a working order by `perm_id`. Filled orders are evicted and
    /// gate their ticker until the next position update; cancelled orders
    /// are simply evicted.
    pub fn update_orders(&mut self, order: ActiveOrder) {
        match order.status {
            OrderStatus::Filled => {
                self.pending_positions_update.insert(order.symbol.clone());
                self.active_orders.remove(&order.perm_id);
                info!(perm_id = order.perm_id, ticker = %order.symbol, "order filled");
            }
            OrderStatus::Cancelled => {
                self.active_orders.remove(&order.perm_id);
                info!(perm_id = order.perm_id, ticker = %order.symbol, "order cancelled");
            }
            _ => {
                self.active_orders.insert(order.perm_id, order);
            }
        }
        self.notify(UpdateKind::OrderUpdate);
    }

    /// Tickers that must not receive a new signal: anything with a working
    /// order, plus anything whose fill has not yet produced a position
    /// update.
    pub fn get_active_order_tickers(&self) -> HashSet<String> {
        let mut tickers: HashSet<String> = self
            .active_orders
            .values()
            .map(|order| order.symbol.clone())
            .collect();
        tickers.extend(self.pending_positions_update.iter().cloned());
        tickers
    }

    pub fn pending_positions(&self) -> &HashSet<String> {
        &self.pending_positions_update
    }

    /// Test/bootstrap hook for seeding the fill gate.
    pub fn mark_pending_position(&mut self, ticker: &str) {
        self.pending_positions_update.insert(ticker.to_string());
    }

    fn notify(&mut self, kind: UpdateKind) {
        for observer in &mut self.observers {
            observer.notify(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::testing::{CountingObserver, Counts};
    use bf_types::{Currency, OrderType, SecurityType, Side, Venue};
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn aapl_contract() -> Contract {
        Contract {
            symbol: "AAPL".to_string(),
            sec_type: SecurityType::Stock,
            currency: Currency::Usd,
            exchange: Venue::Nasdaq,
            multiplier: 1,
            last_trade_date: None,
            right: None,
            strike: None,
        }
    }

    fn aapl_position() -> Position {
        Position {
            action: Side::Buy,
            quantity: dec!(100),
            avg_cost: dec!(10.9),
            quantity_multiplier: 1,
            price_multiplier: dec!(1),
            initial_margin: dec!(0),
            unrealized_pnl: dec!(0),
            total_cost: dec!(1090),
            market_value: dec!(0),
        }
    }

    fn active_order(perm_id: i64, symbol: &str, status: OrderStatus) -> ActiveOrder {
        ActiveOrder {
            perm_id,
            client_id: 1,
            order_id: 10,
            parent_id: 0,
            account: "DU1234".to_string(),
            symbol: symbol.to_string(),
            sec_type: SecurityType::Stock,
            exchange: Venue::Nasdaq,
            action: Side::Buy,
            order_type: OrderType::Market,
            total_qty: dec!(100),
            cash_qty: dec!(0),
            limit_price: dec!(0),
            aux_price: dec!(0),
            status,
            filled: dec!(0),
            remaining: dec!(100),
            avg_fill_price: dec!(0),
            last_fill_price: dec!(0),
            why_held: String::new(),
            mkt_cap_price: dec!(0),
        }
    }

    fn server() -> PortfolioServer {
        PortfolioServer::new(SymbolMap::default())
    }

    #[test]
    fn test_update_position_clears_pending_gate() {
        let mut server = server();
        server.mark_pending_position("AAPL");

        server.update_position(&aapl_contract(), aapl_position());

        assert_eq!(server.positions["AAPL"], aapl_position());
        assert!(server.pending_positions().is_empty());
    }

    #[test]
    fn test_update_position_identical_value_is_observably_idempotent() {
        let mut server = server();
        server.update_position(&aapl_contract(), aapl_position());
        let before = server.positions.clone();

        server.update_position(&aapl_contract(), aapl_position());
        assert_eq!(server.positions, before);
    }

    #[test]
    fn test_update_account_details_sets_capital() {
        let mut server = server();
        let account = AccountSnapshot::with_capital(dec!(99999.15));
        server.update_account_details(account.clone());

        assert_eq!(server.capital(), dec!(99999.15));
        assert_eq!(server.account, account);
    }

    #[test]
    fn test_update_orders_upserts_working_order() {
        let mut server = server();
        server.update_orders(active_order(10, "AAPL", OrderStatus::PreSubmitted));
        assert_eq!(server.active_orders.len(), 1);

        server.update_orders(active_order(10, "AAPL", OrderStatus::Submitted));
        assert_eq!(server.active_orders.len(), 1);
        assert_eq!(server.active_orders[&10].status, OrderStatus::Submitted);
    }

    #[test]
    fn test_filled_order_evicted_and_gates_ticker() {
        let mut server = server();
        server.update_orders(active_order(10, "AAPL", OrderStatus::Submitted));

        server.update_orders(active_order(10, "AAPL", OrderStatus::Filled));

        assert!(server.active_orders.is_empty());
        assert!(server.pending_positions().contains("AAPL"));
        assert!(server.get_active_order_tickers().contains("AAPL"));
    }

    #[test]
    fn test_cancelled_order_evicted_without_gate() {
        let mut server = server();
        server.update_orders(active_order(10, "AAPL", OrderStatus::Submitted));

        server.update_orders(active_order(10, "AAPL", OrderStatus::Cancelled));

        assert!(server.active_orders.is_empty());
        assert!(server.pending_positions().is_empty());
    }

    #[test]
    fn test_active_order_tickers_is_union() {
        let mut server = server();
        server.mark_pending_position("TSLA");
        server.update_orders(active_order(10, "AAPL", OrderStatus::Submitted));

        let tickers = server.get_active_order_tickers();
        assert!(tickers.contains("AAPL"));
        assert!(tickers.contains("TSLA"));
        assert_eq!(tickers.len(), 2);
    }

    #[test]
    fn test_observer_notification_kinds() {
        let mut server = server();
        let counts = Arc::new(Counts::default());
        server.attach(Box::new(CountingObserver(counts.clone())));

        server.update_position(&aapl_contract(), aapl_position());
        server.update_account_details(AccountSnapshot::with_capital(dec!(1000)));
        server.update_orders(active_order(10, "AAPL", OrderStatus::Submitted));

        assert_eq!(counts.position.load(Ordering::SeqCst), 1);
        assert_eq!(counts.account.load(Ordering::SeqCst), 1);
        assert_eq!(counts.order.load(Ordering::SeqCst), 1);
    }
}
