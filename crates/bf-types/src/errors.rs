use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the BarForge system
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("order book error: {0}")]
    Book(#[from] BookError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("external error: {0}")]
    External(#[from] ExternalError),

    #[error("event queue disconnected")]
    QueueDisconnected,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Constructor-invariant violations on symbols, orders, and events.
///
/// These are programmer errors and fatal at run start.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid symbol {ticker}: {message}")]
    InvalidSymbol { ticker: String, message: String },

    #[error("invalid market record for {ticker}: {message}")]
    InvalidRecord { ticker: String, message: String },

    #[error("invalid trade instruction: {message}")]
    InvalidInstruction { message: String },

    #[error("invalid event: {message}")]
    InvalidEvent { message: String },

    #[error("invalid position: {message}")]
    InvalidPosition { message: String },

    #[error("invalid trade: {message}")]
    InvalidTrade { message: String },
}

/// Order book lookup failures
#[derive(Error, Debug)]
pub enum BookError {
    #[error("no market data for ticker: {ticker}")]
    UnknownTicker { ticker: String },

    #[error("market update must contain at least one record")]
    EmptyUpdate,
}

/// Order construction and capital-budgeting failures
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("order quantity must be nonzero")]
    ZeroQuantity,

    #[error("{field} must be greater than zero, got {value}")]
    InvalidPrice { field: &'static str, value: Decimal },

    #[error("order construction failed for {ticker}: {source}")]
    ConstructionFailed {
        ticker: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("instrument {ticker} cannot be sized for ordering")]
    UnsupportedInstrument { ticker: String },

    #[error("insufficient capital: required {required}, available {available}")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },

    #[error("no open position for exit instruction on {ticker}")]
    NoPositionToExit { ticker: String },
}

/// Simulated-broker state violations
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("instrument {ticker} is not tradable through the broker")]
    UnsupportedInstrument { ticker: String },

    #[error("position state machine violation: {message}")]
    StateMachineViolation { message: String },
}

/// Failures at the system boundary (persistence service, broker gateway)
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("persistence service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("cannot fill forward: first observation missing for {ticker}")]
    MissingLeadingData { ticker: String },

    #[error("broker gateway failure: {message}")]
    Gateway { message: String },
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
