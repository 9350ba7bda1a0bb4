//! Paper trading collaborators: a demo whale feed, a random-walk price
//! oracle and a simulated executor. Nothing here touches the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Executor, PriceOracle, SignalSource};
use crate::models::{ExecutionResult, Position, RawSignal};

/// Demo tokens as (symbol, name, address).
pub const DEMO_TOKENS: [(&str, &str, &str); 6] = [
    ("BONK", "Bonk", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
    ("WIF", "dogwifhat", "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm"),
    ("POPCAT", "Popcat", "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr"),
    ("MEW", "cat in a dogs world", "MEW1gQWJ3nEXg2qgNMZT4PoG9JzfMWuEYqKV3tFH1dJv"),
    ("PEPE", "Pepe", "6GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr"),
    ("JUP", "Jupiter", "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN"),
];

/// USD per SOL used by paper trading.
const PAPER_QUOTE_RATE: Decimal = dec!(100);

// ==================== Demo Feed ====================

/// Generates plausible whale activity: 30% high, 30% medium, 40% low quality.
#[derive(Debug)]
pub struct DemoSignalSource {
    rng: Mutex<StdRng>,
    batch: AtomicU64,
}

impl DemoSignalSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic source for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            batch: AtomicU64::new(0),
        }
    }

    fn generate(rng: &mut StdRng, batch: u64, limit: u32) -> Vec<RawSignal> {
        let count = rng.gen_range(2..=6).min(limit as usize);
        let now = Utc::now();

        (0..count)
            .filter_map(|i| {
                let (symbol, name, address) = *DEMO_TOKENS.choose(rng)?;
                let quality: f64 = rng.gen();

                let (win_rate, trade_amount, market_cap, risk, size) = if quality > 0.7 {
                    (
                        rng.gen_range(70..=95),
                        rng.gen_range(2_000..=10_000),
                        rng.gen_range(5_000_000..=80_000_000),
                        *["good", "good", "warning"].choose(rng)?,
                        *["medium", "large", "large"].choose(rng)?,
                    )
                } else if quality > 0.4 {
                    (
                        rng.gen_range(50..=75),
                        rng.gen_range(800..=3_000),
                        rng.gen_range(10_000_000..=150_000_000),
                        *["good", "warning", "warning"].choose(rng)?,
                        *["small", "medium", "medium"].choose(rng)?,
                    )
                } else {
                    (
                        rng.gen_range(20..=60),
                        rng.gen_range(100..=1_200),
                        rng.gen_range(1_000_000..=200_000_000),
                        *["warning", "danger", "unknown"].choose(rng)?,
                        *["small", "small", "medium"].choose(rng)?,
                    )
                };

                let direction = if rng.gen_bool(0.8) { "buy" } else { "sell" };
                let timestamp = now - Duration::minutes(rng.gen_range(1..=360));

                Some(RawSignal {
                    id: format!("demo_{}_{}_{}", batch, i, now.timestamp()),
                    timestamp: timestamp.to_rfc3339(),
                    direction: direction.to_string(),
                    instrument_id: format!("token_{}_{}", symbol.to_lowercase(), i),
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                    address: address.to_string(),
                    size_bucket: size.to_string(),
                    trade_amount: trade_amount as f64,
                    win_rate: win_rate as f64,
                    market_cap: market_cap as f64,
                    risk_classification: risk.to_string(),
                    first_seen: rng.gen_bool(0.5),
                    logo_url: format!("https://example.com/logos/{}.png", symbol.to_lowercase()),
                })
            })
            .collect()
    }
}

impl Default for DemoSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalSource for DemoSignalSource {
    async fn fetch_signals(&self, limit: u32) -> Result<Vec<RawSignal>> {
        let batch = self.batch.fetch_add(1, Ordering::Relaxed) + 1;
        let mut rng = self.rng.lock().await;
        let signals = Self::generate(&mut rng, batch, limit);
        info!(count = signals.len(), "Generated demo whale transactions");
        Ok(signals)
    }
}

// ==================== Price Oracle ====================

#[derive(Debug)]
struct WalkState {
    rng: StdRng,
    /// address -> (initial price, current price)
    prices: HashMap<String, (Decimal, Decimal)>,
}

/// Per-instrument random walk with a slight upward drift.
///
/// Unknown instruments are seeded with a random starting price on first use.
/// Prices never fall below 10% of their starting value.
#[derive(Debug)]
pub struct RandomWalkOracle {
    state: Mutex<WalkState>,
    /// Maximum relative move per step (0.05 = 5%)
    volatility: f64,
}

impl RandomWalkOracle {
    pub fn new(volatility: f64) -> Self {
        Self::with_rng(StdRng::from_entropy(), volatility)
    }

    pub fn with_seed(seed: u64, volatility: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), volatility)
    }

    fn with_rng(rng: StdRng, volatility: f64) -> Self {
        Self {
            state: Mutex::new(WalkState { rng, prices: HashMap::new() }),
            volatility: volatility.abs(),
        }
    }

    /// Pin an instrument's price, resetting its floor.
    pub async fn set_price(&self, address: &str, price: Decimal) {
        self.state
            .lock()
            .await
            .prices
            .insert(address.to_string(), (price, price));
    }

    /// Start an instrument's walk at `price` unless it is already tracked.
    pub async fn seed_price(&self, address: &str, price: Decimal) {
        self.state
            .lock()
            .await
            .prices
            .entry(address.to_string())
            .or_insert((price, price));
    }

    /// Current price without stepping the walk.
    pub async fn peek(&self, address: &str) -> Decimal {
        let mut state = self.state.lock().await;
        Self::seeded_price(&mut state, address)
    }

    fn seeded_price(state: &mut WalkState, address: &str) -> Decimal {
        if let Some((_, current)) = state.prices.get(address) {
            return *current;
        }
        let initial = Decimal::from_f64(state.rng.gen_range(0.00001..0.01))
            .unwrap_or(dec!(0.001))
            .round_dp(8);
        state.prices.insert(address.to_string(), (initial, initial));
        initial
    }

    async fn step(&self, address: &str) -> Decimal {
        let mut state = self.state.lock().await;
        let current = Self::seeded_price(&mut state, address);
        let change = state.rng.gen_range(-self.volatility..=self.volatility) + self.volatility * 0.05;

        let factor = Decimal::from_f64(1.0 + change).unwrap_or(Decimal::ONE);
        let Some(entry) = state.prices.get_mut(address) else {
            return current;
        };
        let floor = entry.0 * dec!(0.1);
        entry.1 = (current * factor).round_dp(12).max(floor);
        entry.1
    }
}

#[async_trait]
impl PriceOracle for RandomWalkOracle {
    async fn current_price(&self, address: &str) -> Result<Option<Decimal>> {
        Ok(Some(self.step(address).await))
    }

    async fn quote_rate(&self) -> Result<Decimal> {
        Ok(PAPER_QUOTE_RATE)
    }
}

// ==================== Executor ====================

#[derive(Debug)]
struct PaperBook {
    native_balance: Decimal,
    holdings: HashMap<String, Decimal>,
    fees_paid: Decimal,
}

/// Simulated swaps filled at the oracle's current price.
///
/// Every fill pays half the slippage budget and the priority fee.
#[derive(Debug)]
pub struct PaperExecutor {
    oracle: Arc<RandomWalkOracle>,
    book: Mutex<PaperBook>,
    slippage_bps: u32,
    priority_fee: Decimal,
}

impl PaperExecutor {
    pub fn new(
        oracle: Arc<RandomWalkOracle>,
        starting_balance: Decimal,
        slippage_bps: u32,
        priority_fee: Decimal,
    ) -> Self {
        Self {
            oracle,
            book: Mutex::new(PaperBook {
                native_balance: starting_balance,
                holdings: HashMap::new(),
                fees_paid: Decimal::ZERO,
            }),
            slippage_bps,
            priority_fee,
        }
    }

    /// Fractional price impact applied to each fill.
    fn slippage(&self) -> Decimal {
        Decimal::from(self.slippage_bps) / dec!(20000)
    }

    /// Rebuild holdings for positions restored from storage.
    ///
    /// Prices for restored instruments resume from their last valuation.
    pub async fn restore_holdings(&self, positions: &[Position]) {
        for position in positions.iter().filter(|p| p.is_open()) {
            if position.current_price_usd > Decimal::ZERO {
                self.oracle
                    .seed_price(&position.instrument_address, position.current_price_usd)
                    .await;
            }
            self.book
                .lock()
                .await
                .holdings
                .insert(position.instrument_address.clone(), position.token_amount);
        }
        info!(count = positions.len(), "Paper holdings restored");
    }

    pub async fn fees_paid(&self) -> Decimal {
        self.book.lock().await.fees_paid
    }

    fn tx_id() -> String {
        format!("paper_{}", uuid::Uuid::new_v4().simple())
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn buy(&self, address: &str, native_amount: Decimal) -> Result<ExecutionResult> {
        let price_usd = self.oracle.peek(address).await;
        let mut book = self.book.lock().await;

        let required = native_amount + self.priority_fee;
        if book.native_balance < required {
            return Ok(ExecutionResult::failed(
                address,
                native_amount,
                format!("Insufficient SOL balance: {:.4} < {:.4}", book.native_balance, required),
            ));
        }
        if price_usd <= Decimal::ZERO {
            return Ok(ExecutionResult::failed(address, native_amount, "No price for token"));
        }

        let slippage = self.slippage();
        let tokens = (native_amount * PAPER_QUOTE_RATE / price_usd * (Decimal::ONE - slippage)).round_dp(6);

        book.native_balance -= required;
        book.fees_paid += self.priority_fee;
        *book.holdings.entry(address.to_string()).or_insert(Decimal::ZERO) += tokens;

        debug!(address = %address, tokens = %tokens, "Paper buy filled");
        Ok(ExecutionResult {
            success: true,
            tx_id: Self::tx_id(),
            instrument_address: address.to_string(),
            input_amount: native_amount,
            output_amount: tokens,
            price: if tokens > Decimal::ZERO { native_amount / tokens } else { Decimal::ZERO },
            slippage: slippage * dec!(100),
            fee: self.priority_fee,
            error_message: String::new(),
        })
    }

    async fn sell(&self, address: &str, token_amount: Decimal) -> Result<ExecutionResult> {
        let price_usd = self.oracle.peek(address).await;
        let mut book = self.book.lock().await;

        let held = book.holdings.get(address).copied().unwrap_or(Decimal::ZERO);
        if token_amount <= Decimal::ZERO || held < token_amount {
            return Ok(ExecutionResult::failed(
                address,
                token_amount,
                format!("Insufficient token balance: {} < {}", held, token_amount),
            ));
        }

        let slippage = self.slippage();
        let native = (token_amount * price_usd / PAPER_QUOTE_RATE * (Decimal::ONE - slippage)).round_dp(9);
        if native <= self.priority_fee {
            return Ok(ExecutionResult::failed(
                address,
                token_amount,
                format!("Sale proceeds {} do not cover priority fee {}", native, self.priority_fee),
            ));
        }

        book.native_balance += native - self.priority_fee;
        book.fees_paid += self.priority_fee;
        let remaining = held - token_amount;
        if remaining.is_zero() {
            book.holdings.remove(address);
        } else {
            book.holdings.insert(address.to_string(), remaining);
        }

        debug!(address = %address, native = %native, "Paper sell filled");
        Ok(ExecutionResult {
            success: true,
            tx_id: Self::tx_id(),
            instrument_address: address.to_string(),
            input_amount: token_amount,
            output_amount: native,
            price: native / token_amount,
            slippage: slippage * dec!(100),
            fee: self.priority_fee,
            error_message: String::new(),
        })
    }

    async fn balance_of(&self, address: &str) -> Result<Option<Decimal>> {
        let book = self.book.lock().await;
        Ok(Some(book.holdings.get(address).copied().unwrap_or(Decimal::ZERO)))
    }

    async fn native_balance(&self) -> Result<Decimal> {
        Ok(self.book.lock().await.native_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;

    #[tokio::test]
    async fn test_demo_signals_validate() {
        let source = DemoSignalSource::with_seed(7);
        for _ in 0..20 {
            let batch = source.fetch_signals(10).await.unwrap();
            assert!((2..=6).contains(&batch.len()));
            for raw in &batch {
                assert!(Signal::try_from(raw).is_ok(), "invalid demo signal {:?}", raw);
                assert!(DEMO_TOKENS.iter().any(|(_, _, a)| *a == raw.address));
            }
        }
    }

    #[tokio::test]
    async fn test_demo_signals_respect_limit() {
        let source = DemoSignalSource::with_seed(1);
        let batch = source.fetch_signals(1).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_random_walk_stays_above_floor() {
        let oracle = RandomWalkOracle::with_seed(3, 0.5);
        oracle.set_price("addr", dec!(1)).await;

        for _ in 0..200 {
            let price = oracle.current_price("addr").await.unwrap().unwrap();
            assert!(price >= dec!(0.1));
        }
        assert_eq!(oracle.quote_rate().await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_paper_round_trip() {
        let oracle = Arc::new(RandomWalkOracle::with_seed(3, 0.0));
        oracle.set_price("addr", dec!(0.01)).await;
        let executor = PaperExecutor::new(oracle, dec!(1), 300, dec!(0.001));

        let buy = executor.buy("addr", dec!(0.1)).await.unwrap();
        assert!(buy.success);
        // $10 at $0.01 less 1.5% slippage
        assert_eq!(buy.output_amount, dec!(985));
        assert_eq!(executor.native_balance().await.unwrap(), dec!(0.899));
        assert_eq!(executor.balance_of("addr").await.unwrap(), Some(dec!(985)));

        let sell = executor.sell("addr", dec!(985)).await.unwrap();
        assert!(sell.success);
        assert_eq!(sell.output_amount, dec!(0.09702250));
        assert_eq!(executor.balance_of("addr").await.unwrap(), Some(Decimal::ZERO));
        assert_eq!(executor.fees_paid().await, dec!(0.002));
    }

    #[tokio::test]
    async fn test_sell_below_fee_fails_without_fill() {
        let oracle = Arc::new(RandomWalkOracle::with_seed(3, 0.0));
        oracle.set_price("addr", dec!(0.01)).await;
        let executor = PaperExecutor::new(oracle.clone(), dec!(1), 300, dec!(0.001));
        executor.buy("addr", dec!(0.1)).await.unwrap();

        oracle.set_price("addr", dec!(0.0000001)).await;
        let sell = executor.sell("addr", dec!(985)).await.unwrap();

        assert!(!sell.success);
        assert!(sell.error_message.contains("priority fee"));
        assert_eq!(executor.native_balance().await.unwrap(), dec!(0.899));
        assert_eq!(executor.balance_of("addr").await.unwrap(), Some(dec!(985)));
    }

    #[tokio::test]
    async fn test_restore_holdings_from_positions() {
        let oracle = Arc::new(RandomWalkOracle::with_seed(3, 0.0));
        let executor = PaperExecutor::new(oracle.clone(), dec!(1), 300, dec!(0.001));
        let restored = crate::models::fixtures::open_position("addr", dec!(10), 2);

        executor.restore_holdings(&[restored]).await;

        assert_eq!(executor.balance_of("addr").await.unwrap(), Some(dec!(1000)));
        assert_eq!(oracle.peek("addr").await, dec!(0.01));

        let sell = executor.sell("addr", dec!(1000)).await.unwrap();
        assert!(sell.success);
    }

    #[tokio::test]
    async fn test_paper_rejects_unfunded_trades() {
        let oracle = Arc::new(RandomWalkOracle::with_seed(3, 0.0));
        let executor = PaperExecutor::new(oracle, dec!(0.1), 300, dec!(0.001));

        let buy = executor.buy("addr", dec!(0.1)).await.unwrap();
        assert!(!buy.success);
        assert!(buy.error_message.contains("Insufficient SOL"));

        let sell = executor.sell("addr", dec!(5)).await.unwrap();
        assert!(!sell.success);
    }
}
