//! Error taxonomy for the decision engine and position ledger.
//!
//! Rejections are not errors: a `Decision` with `approve == false` is an
//! expected outcome. The types here cover malformed input, evaluation faults,
//! ledger invariant violations and persistence failures.

use thiserror::Error;

/// A signal failed the pre-evaluation checks and must be dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing signal id")]
    MissingId,

    #[error("Missing instrument address")]
    MissingAddress,

    #[error("Missing instrument symbol")]
    MissingSymbol,

    #[error("Invalid win rate: {0}")]
    WinRateOutOfRange(f64),

    #[error("Invalid trade amount: {0}")]
    InvalidTradeAmount(f64),

    #[error("Invalid market cap: {0}")]
    InvalidMarketCap(f64),

    #[error("Invalid direction: {0}")]
    UnknownDirection(String),

    #[error("Invalid trade size: {0}")]
    UnknownSizeBucket(String),

    #[error("Invalid risk classification: {0}")]
    UnknownRiskClass(String),

    #[error("Invalid timestamp format: {0}")]
    BadTimestamp(String),
}

/// Internal fault while scoring or evaluating a signal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("Buy evaluation failed: {0}")]
    Entry(String),

    #[error("Quality score is not finite for signal {0}")]
    NonFiniteScore(String),
}

/// Persistence failure. Never retried by the core.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Stored position {id} is corrupt: {detail}")]
    Corrupt { id: String, detail: String },

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Ledger invariant violation or a mutation whose durability is unknown.
#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Position already open for {0}")]
    AlreadyOpen(String),

    #[error("No open position for {0}")]
    NotOpen(String),

    #[error("Execution for {address} was not successful: {message}")]
    UnsuccessfulExecution { address: String, message: String },

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Bad configuration override.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Whale feed request failure.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Feed authentication failed")]
    Unauthorized,

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Failed to parse feed response: {0}")]
    Parse(String),
}
