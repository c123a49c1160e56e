use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::DomainError;

/// Security classes supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    Stock,
    Future,
    Option,
    Index,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityType::Stock => "STK",
            SecurityType::Future => "FUT",
            SecurityType::Option => "OPT",
            SecurityType::Index => "IND",
        };
        write!(f, "{}", s)
    }
}

/// Settlement currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Usd,
    Cad,
    Eur,
    Gbp,
    Aud,
    Jpy,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Currency::Usd => "USD",
            Currency::Cad => "CAD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Aud => "AUD",
            Currency::Jpy => "JPY",
        };
        write!(f, "{}", s)
    }
}

/// Listing venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    Nasdaq,
    Nyse,
    Cme,
    Cbot,
    Cboe,
    Comex,
    Globex,
    Nymex,
    Index,
    Smart,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Venue::Nasdaq => "NASDAQ",
            Venue::Nyse => "NYSE",
            Venue::Cme => "CME",
            Venue::Cbot => "CBOT",
            Venue::Cboe => "CBOE",
            Venue::Comex => "COMEX",
            Venue::Globex => "GLOBEX",
            Venue::Nymex => "NYMEX",
            Venue::Index => "INDEX",
            Venue::Smart => "SMART",
        };
        write!(f, "{}", s)
    }
}

/// Industry classification used on equities and futures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Industry {
    Energy,
    Materials,
    Industrials,
    Utilities,
    Healthcare,
    Financials,
    Consumer,
    Technology,
    Communication,
    RealEstate,
    Metals,
    Agriculture,
}

/// Physical units underlying a futures contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractUnits {
    Barrels,
    Bushels,
    Pounds,
    TroyOunce,
    MetricTon,
    ShortTon,
}

/// Option right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

/// Asset classes for index instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Commodity,
    FixedIncome,
    Forex,
    Cryptocurrency,
}

/// Fields shared by every instrument variant.
///
/// Symbols are constructed once at startup and are immutable afterwards; all
/// invariants are checked at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolCore {
    pub ticker: String,
    pub security_type: SecurityType,
    pub currency: Currency,
    pub venue: Venue,
    /// Commission charged per contract/share.
    pub fees_per_unit: Decimal,
    /// Per-contract margin requirement (zero for cash equities).
    pub initial_margin: Decimal,
    pub quantity_multiplier: u32,
    pub price_multiplier: Decimal,
    /// Ticker used by the data vendor; defaults to `ticker`.
    pub data_ticker: String,
}

impl SymbolCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: &str,
        security_type: SecurityType,
        currency: Currency,
        venue: Venue,
        fees_per_unit: Decimal,
        initial_margin: Decimal,
        quantity_multiplier: u32,
        price_multiplier: Decimal,
        data_ticker: Option<&str>,
    ) -> Result<Self, DomainError> {
        let invalid = |message: &str| DomainError::InvalidSymbol {
            ticker: ticker.to_string(),
            message: message.to_string(),
        };

        if ticker.is_empty() {
            return Err(invalid("ticker must be non-empty"));
        }
        if fees_per_unit < Decimal::ZERO {
            return Err(invalid("fees_per_unit cannot be negative"));
        }
        if initial_margin < Decimal::ZERO {
            return Err(invalid("initial_margin must be non-negative"));
        }
        if quantity_multiplier < 1 {
            return Err(invalid("quantity_multiplier must be at least 1"));
        }
        if price_multiplier <= Decimal::ZERO {
            return Err(invalid("price_multiplier must be greater than 0"));
        }

        Ok(Self {
            ticker: ticker.to_string(),
            security_type,
            currency,
            venue,
            fees_per_unit,
            initial_margin,
            quantity_multiplier,
            price_multiplier,
            data_ticker: data_ticker.unwrap_or(ticker).to_string(),
        })
    }
}

/// Cash equity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySymbol {
    pub core: SymbolCore,
    pub company_name: String,
    pub industry: Industry,
    pub market_cap: Decimal,
    pub shares_outstanding: u64,
}

/// Futures contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureSymbol {
    pub core: SymbolCore,
    pub product_code: String,
    pub product_name: String,
    pub industry: Industry,
    pub contract_size: Decimal,
    pub contract_units: ContractUnits,
    pub tick_size: Decimal,
    pub min_price_fluctuation: Decimal,
    pub continuous: bool,
    /// Contract month, e.g. "202404".
    pub last_trade_date: String,
}

/// Option contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSymbol {
    pub core: SymbolCore,
    pub strike: Decimal,
    pub expiration: String,
    pub right: OptionRight,
    pub contract_size: Decimal,
    pub underlying: String,
}

/// Index (non-tradable reference instrument)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSymbol {
    pub core: SymbolCore,
    pub name: String,
    pub asset_class: AssetClass,
}

/// A financial instrument, tagged by security class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbol {
    Equity(EquitySymbol),
    Future(FutureSymbol),
    Option(OptionSymbol),
    Index(IndexSymbol),
}

impl Symbol {
    pub fn equity(
        core: SymbolCore,
        company_name: &str,
        industry: Industry,
        market_cap: Decimal,
        shares_outstanding: u64,
    ) -> Result<Self, DomainError> {
        if core.security_type != SecurityType::Stock {
            return Err(DomainError::InvalidSymbol {
                ticker: core.ticker.clone(),
                message: "equity symbols require SecurityType::Stock".to_string(),
            });
        }
        Ok(Symbol::Equity(EquitySymbol {
            core,
            company_name: company_name.to_string(),
            industry,
            market_cap,
            shares_outstanding,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn future(
        core: SymbolCore,
        product_code: &str,
        product_name: &str,
        industry: Industry,
        contract_size: Decimal,
        contract_units: ContractUnits,
        tick_size: Decimal,
        min_price_fluctuation: Decimal,
        continuous: bool,
        last_trade_date: &str,
    ) -> Result<Self, DomainError> {
        if core.security_type != SecurityType::Future {
            return Err(DomainError::InvalidSymbol {
                ticker: core.ticker.clone(),
                message: "futures symbols require SecurityType::Future".to_string(),
            });
        }
        if tick_size <= Decimal::ZERO {
            return Err(DomainError::InvalidSymbol {
                ticker: core.ticker.clone(),
                message: "tick_size must be greater than 0".to_string(),
            });
        }
        Ok(Symbol::Future(FutureSymbol {
            core,
            product_code: product_code.to_string(),
            product_name: product_name.to_string(),
            industry,
            contract_size,
            contract_units,
            tick_size,
            min_price_fluctuation,
            continuous,
            last_trade_date: last_trade_date.to_string(),
        }))
    }

    pub fn option(
        core: SymbolCore,
        strike: Decimal,
        expiration: &str,
        right: OptionRight,
        contract_size: Decimal,
        underlying: &str,
    ) -> Result<Self, DomainError> {
        if core.security_type != SecurityType::Option {
            return Err(DomainError::InvalidSymbol {
                ticker: core.ticker.clone(),
                message: "option symbols require SecurityType::Option".to_string(),
            });
        }
        if strike <= Decimal::ZERO {
            return Err(DomainError::InvalidSymbol {
                ticker: core.ticker.clone(),
                message: "strike must be greater than 0".to_string(),
            });
        }
        Ok(Symbol::Option(OptionSymbol {
            core,
            strike,
            expiration: expiration.to_string(),
            right,
            contract_size,
            underlying: underlying.to_string(),
        }))
    }

    /// Indexes carry no fees, margin, or multipliers; the core is synthesized.
    pub fn index(
        ticker: &str,
        currency: Currency,
        name: &str,
        asset_class: AssetClass,
    ) -> Result<Self, DomainError> {
        let core = SymbolCore::new(
            ticker,
            SecurityType::Index,
            currency,
            Venue::Index,
            Decimal::ZERO,
            Decimal::ZERO,
            1,
            Decimal::ONE,
            None,
        )?;
        Ok(Symbol::Index(IndexSymbol {
            core,
            name: name.to_string(),
            asset_class,
        }))
    }

    pub fn core(&self) -> &SymbolCore {
        match self {
            Symbol::Equity(s) => &s.core,
            Symbol::Future(s) => &s.core,
            Symbol::Option(s) => &s.core,
            Symbol::Index(s) => &s.core,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.core().ticker
    }

    pub fn security_type(&self) -> SecurityType {
        self.core().security_type
    }

    pub fn is_future(&self) -> bool {
        matches!(self, Symbol::Future(_))
    }

    pub fn is_equity(&self) -> bool {
        matches!(self, Symbol::Equity(_))
    }

    /// Minimum price increment: the contract's tick size for futures, one
    /// price unit for everything else.
    pub fn tick_size(&self) -> Decimal {
        match self {
            Symbol::Future(f) => f.tick_size,
            _ => Decimal::ONE,
        }
    }

    /// Lower the symbol into the broker-side contract record.
    pub fn to_contract(&self) -> Contract {
        let core = self.core();
        let mut contract = Contract {
            symbol: core.ticker.clone(),
            sec_type: core.security_type,
            currency: core.currency,
            exchange: core.venue,
            multiplier: core.quantity_multiplier,
            last_trade_date: None,
            right: None,
            strike: None,
        };
        match self {
            Symbol::Future(f) => {
                contract.last_trade_date = Some(f.last_trade_date.clone());
            }
            Symbol::Option(o) => {
                contract.last_trade_date = Some(o.expiration.clone());
                contract.right = Some(o.right);
                contract.strike = Some(o.strike);
            }
            _ => {}
        }
        contract
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.core().venue, self.ticker())
    }
}

/// Broker-side contract record carried on order and execution events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub sec_type: SecurityType,
    pub currency: Currency,
    pub exchange: Venue,
    pub multiplier: u32,
    pub last_trade_date: Option<String>,
    pub right: Option<OptionRight>,
    pub strike: Option<Decimal>,
}

/// Immutable ticker → symbol mapping built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolMap {
    symbols: HashMap<String, Symbol>,
}

impl SymbolMap {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        let symbols = symbols
            .into_iter()
            .map(|s| (s.ticker().to_string(), s))
            .collect();
        Self { symbols }
    }

    pub fn get(&self, ticker: &str) -> Option<&Symbol> {
        self.symbols.get(ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.symbols.contains_key(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
