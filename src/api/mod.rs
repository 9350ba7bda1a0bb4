//! Collaborators around the decision engine: whale feed, executor, price oracle.
//!
//! The live feed is [`WhaleFeedClient`]. Order execution is simulated by
//! [`PaperExecutor`]; signing and submitting swaps is not done here.

mod feed_client;
mod paper;
mod types;

pub use feed_client::{WhaleFeedClient, DEFAULT_FEED_URL};
pub use paper::{DemoSignalSource, PaperExecutor, RandomWalkOracle, DEMO_TOKENS};
pub use types::{FeedResponse, FeedSwapToken, FeedTransaction};

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{ExecutionResult, RawSignal};

/// Source of whale activity.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Most recent signals, at most `limit`.
    async fn fetch_signals(&self, limit: u32) -> Result<Vec<RawSignal>>;
}

/// Swaps between native currency and tokens.
///
/// An `Ok` result with `success == false` is a trade that did not happen;
/// `Err` means the executor itself could not be reached.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn buy(&self, address: &str, native_amount: Decimal) -> Result<ExecutionResult>;

    async fn sell(&self, address: &str, token_amount: Decimal) -> Result<ExecutionResult>;

    /// Tokens currently held, `None` when the balance is unknown.
    async fn balance_of(&self, address: &str) -> Result<Option<Decimal>>;

    async fn native_balance(&self) -> Result<Decimal>;
}

/// Token prices in USD.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// `None` when no price is available.
    async fn current_price(&self, address: &str) -> Result<Option<Decimal>>;

    /// USD per unit of native currency.
    async fn quote_rate(&self) -> Result<Decimal>;
}
