//! Bot runner: the single control loop around the strategy and the ledger.
//!
//! Each tick:
//! - Sweeps open positions (holding reconciliation, revaluation, exit rules)
//! - Pulls new whale signals and evaluates them for entry
//! - Records every decision and execution for audit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::{Executor, PriceOracle, SignalSource, DEFAULT_FEED_URL};
use crate::db::{DecisionKind, DecisionRecord, ExecutionRecord, Repository};
use crate::error::PositionError;
use crate::models::{ExecutionResult, ExecutionSide, LedgerStats, PortfolioSummary, Position, Signal};
use crate::trading::{ForceCloseCause, PositionLedger, Reconciliation, Strategy, TradingConfig};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Polling interval (seconds)
    pub poll_interval_secs: u64,

    /// Signals requested from the source per tick
    pub signal_batch_size: u32,

    /// Log decisions without calling the executor
    pub dry_run: bool,

    pub feed_url: String,

    pub feed_token: Option<String>,

    /// Native balance the paper executor starts with
    pub starting_balance: Decimal,

    pub trading_config: TradingConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            signal_batch_size: 10,
            dry_run: false,
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_token: None,
            starting_balance: dec!(1),
            trading_config: TradingConfig::default(),
        }
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    strategy: Strategy,
    ledger: PositionLedger,
    source: Arc<dyn SignalSource>,
    executor: Arc<dyn Executor>,
    oracle: Arc<dyn PriceOracle>,

    // Runtime counters
    ticks: u64,
    signals_seen: u64,
    signals_dropped: u64,
    failed_executions: u64,
    last_fault: Option<String>,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        repo: Arc<dyn Repository>,
        source: Arc<dyn SignalSource>,
        executor: Arc<dyn Executor>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            strategy: Strategy::new(config.trading_config.clone()),
            ledger: PositionLedger::new(repo),
            config,
            source,
            executor,
            oracle,
            ticks: 0,
            signals_seen: 0,
            signals_dropped: 0,
            failed_executions: 0,
            last_fault: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Most recent ledger fault, if any.
    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    /// Restore open positions and statistics from the repository.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing bot...");

        let restored = match self.ledger.initialize().await {
            Ok(count) => count,
            Err(e) => return Err(self.fault(e).context("Failed to restore positions")),
        };

        let native_balance = self
            .executor
            .native_balance()
            .await
            .context("Failed to read native balance")?;

        info!(
            positions = restored,
            native_balance = %native_balance,
            dry_run = self.config.dry_run,
            "Bot initialized"
        );
        Ok(())
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            "Starting bot run loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in bot tick");
            }
        }

        info!("Bot shutdown complete");
        Ok(())
    }

    /// Single iteration of the main loop.
    pub async fn tick(&mut self) -> Result<()> {
        self.ticks += 1;
        debug!(tick = self.ticks, "Bot tick");

        // 1. Monitor open positions against a snapshot taken now
        self.monitor_positions().await?;

        // 2. Evaluate new whale activity
        self.process_signals().await?;

        Ok(())
    }

    // ==================== Monitoring ====================

    async fn monitor_positions(&mut self) -> Result<()> {
        let positions = self.ledger.snapshot();
        if positions.is_empty() {
            return Ok(());
        }

        info!(count = positions.len(), "Monitoring open positions");
        let quote_rate = self.oracle.quote_rate().await.context("Failed to get quote rate")?;

        for position in positions {
            let symbol = position.symbol.clone();
            if let Err(e) = self.monitor_position(position, quote_rate).await {
                error!(symbol = %symbol, error = %e, "Error monitoring position");
            }
        }
        Ok(())
    }

    async fn monitor_position(&mut self, position: Position, quote_rate: Decimal) -> Result<()> {
        let address = position.instrument_address.clone();

        if let Some(balance) = self.executor.balance_of(&address).await? {
            match self.ledger.reconcile_holding(&address, balance).await {
                Ok(Reconciliation::ForceClosed) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(self.fault(e)),
            }
        }

        let Some(price) = self.oracle.current_price(&address).await? else {
            debug!(symbol = %position.symbol, "No price available, skipping revaluation");
            return Ok(());
        };
        let position = match self.ledger.update_valuation(&address, price).await {
            Ok(updated) => updated,
            Err(e) => return Err(self.fault(e)),
        };

        info!(
            symbol = %position.symbol,
            pnl_pct = %position.pnl_percentage.round_dp(1),
            pnl_usd = %position.pnl_usd.round_dp(2),
            "Position checked"
        );

        let decision = self.strategy.evaluate_exit(&position);
        if !decision.approve {
            return Ok(());
        }

        self.record_decision(DecisionRecord {
            kind: DecisionKind::Exit,
            subject_id: position.id.clone(),
            instrument_address: address.clone(),
            symbol: position.symbol.clone(),
            approve: true,
            reason: decision.reason.clone(),
            quality_score: None,
            created_at: Utc::now(),
        })
        .await;

        if self.config.dry_run {
            info!(
                symbol = %position.symbol,
                reason = decision.exit_reason.as_str(),
                tokens = %position.token_amount,
                "[DRY RUN] Would sell position"
            );
            return Ok(());
        }

        let result = self
            .executor
            .sell(&address, position.token_amount)
            .await
            .context("Sell request failed")?;
        self.record_execution(Some(position.id.clone()), ExecutionSide::Sell, &result)
            .await;

        let outcome = if result.success {
            self.ledger
                .close(&address, &result, quote_rate, decision.exit_reason.as_str())
                .await
        } else {
            self.failed_executions += 1;
            error!(
                symbol = %position.symbol,
                error = %result.error_message,
                "Sell failed, marking position failed"
            );
            self.ledger.force_close(&address, ForceCloseCause::SellFailed).await
        };

        match outcome {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fault(e)),
        }
    }

    // ==================== Entries ====================

    async fn process_signals(&mut self) -> Result<()> {
        let raw_signals = self
            .source
            .fetch_signals(self.config.signal_batch_size)
            .await
            .context("Failed to fetch signals")?;

        for raw in raw_signals {
            self.signals_seen += 1;

            let signal = match self.strategy.validate(&raw) {
                Ok(signal) => signal,
                Err(e) => {
                    self.signals_dropped += 1;
                    info!(id = %raw.id, error = %e, "Dropping malformed signal");
                    continue;
                }
            };

            if let Err(e) = self.process_signal(signal).await {
                warn!(error = %e, "Failed to process signal");
            }
        }
        Ok(())
    }

    async fn process_signal(&mut self, signal: Signal) -> Result<()> {
        let open = self.ledger.snapshot();
        let native_balance = self
            .executor
            .native_balance()
            .await
            .context("Failed to read native balance")?;

        let decision = self.strategy.evaluate_entry(&signal, &open, native_balance)?;

        self.record_decision(DecisionRecord {
            kind: DecisionKind::Entry,
            subject_id: signal.id.clone(),
            instrument_address: signal.instrument_address.clone(),
            symbol: signal.symbol.clone(),
            approve: decision.approve,
            reason: decision.reason.clone(),
            quality_score: decision.quality_score,
            created_at: Utc::now(),
        })
        .await;

        if !decision.approve {
            return Ok(());
        }

        let amount = self.strategy.config().per_trade_size;
        if self.config.dry_run {
            info!(
                symbol = %signal.symbol,
                amount = %amount,
                "[DRY RUN] Would buy token"
            );
            return Ok(());
        }

        let result = self
            .executor
            .buy(&signal.instrument_address, amount)
            .await
            .context("Buy request failed")?;

        if !result.success {
            self.failed_executions += 1;
            warn!(symbol = %signal.symbol, error = %result.error_message, "Buy failed");
            self.record_execution(None, ExecutionSide::Buy, &result).await;
            return Ok(());
        }

        let quote_rate = self.oracle.quote_rate().await.context("Failed to get quote rate")?;
        match self.ledger.open(&signal, &result, quote_rate).await {
            Ok(position) => {
                self.record_execution(Some(position.id), ExecutionSide::Buy, &result)
                    .await;
                Ok(())
            }
            Err(e) => {
                self.record_execution(None, ExecutionSide::Buy, &result).await;
                Err(self.fault(e))
            }
        }
    }

    // ==================== Audit ====================

    async fn record_decision(&self, record: DecisionRecord) {
        if let Err(e) = self.ledger.repository().record_decision(&record).await {
            warn!(subject = %record.subject_id, error = %e, "Failed to record decision");
        }
    }

    async fn record_execution(&self, position_id: Option<String>, side: ExecutionSide, result: &ExecutionResult) {
        let record = ExecutionRecord {
            position_id,
            side,
            result: result.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.ledger.repository().record_execution(&record).await {
            warn!(tx = %result.tx_id, error = %e, "Failed to record execution");
        }
    }

    fn fault(&mut self, e: PositionError) -> anyhow::Error {
        error!(error = %e, "Ledger fault");
        self.last_fault = Some(e.to_string());
        anyhow::Error::new(e)
    }

    // ==================== Reporting ====================

    pub async fn portfolio_summary(&self) -> Result<PortfolioSummary> {
        let native_balance = self.executor.native_balance().await?;
        let quote_rate = self.oracle.quote_rate().await?;
        Ok(self.ledger.portfolio_summary(native_balance, quote_rate))
    }

    /// Get current stats.
    pub async fn get_stats(&self) -> BotStats {
        let native_balance = match self.executor.native_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Failed to read native balance");
                Decimal::ZERO
            }
        };
        let strategy = self.strategy.stats();

        BotStats {
            ticks: self.ticks,
            signals_seen: self.signals_seen,
            signals_dropped: self.signals_dropped,
            buy_signal_rate: strategy.buy_signal_rate,
            failed_executions: self.failed_executions,
            native_balance,
            ledger: self.ledger.stats(),
            last_fault: self.last_fault.clone(),
            is_running: !self.shutdown.load(Ordering::SeqCst),
            dry_run: self.config.dry_run,
        }
    }
}

/// Bot statistics.
#[derive(Debug, Clone)]
pub struct BotStats {
    pub ticks: u64,
    pub signals_seen: u64,
    pub signals_dropped: u64,
    pub buy_signal_rate: f64,
    pub failed_executions: u64,
    pub native_balance: Decimal,
    pub ledger: LedgerStats,
    pub last_fault: Option<String>,
    pub is_running: bool,
    pub dry_run: bool,
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Ticks:             {}", self.ticks)?;
        writeln!(f, "Signals Seen:      {} (Dropped: {})", self.signals_seen, self.signals_dropped)?;
        writeln!(f, "Buy Signal Rate:   {:.1}%", self.buy_signal_rate)?;
        writeln!(f, "Native Balance:    {:.4}", self.native_balance)?;
        writeln!(f, "Open Positions:    {}", self.ledger.open_positions)?;
        writeln!(f, "Trades Executed:   {} (Failed: {})",
            self.ledger.total_trades_executed, self.failed_executions)?;
        writeln!(f, "Win Rate:          {:.1}%", self.ledger.win_rate())?;
        writeln!(f, "Net P&L:           ${:.2}", self.ledger.net_pnl())?;
        if let Some(fault) = &self.last_fault {
            writeln!(f, "Last Ledger Fault: {}", fault)?;
        }
        writeln!(f, "Status:            {} {}",
            if self.is_running { "Running" } else { "Stopped" },
            if self.dry_run { "(Dry Run)" } else { "" })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PaperExecutor, RandomWalkOracle};
    use crate::db::MemoryRepository;
    use crate::models::{fixtures, PositionStatus, RawSignal};
    use async_trait::async_trait;

    const ADDRESS: &str = "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm";

    struct StaticSource(Vec<RawSignal>);

    #[async_trait]
    impl SignalSource for StaticSource {
        async fn fetch_signals(&self, _limit: u32) -> Result<Vec<RawSignal>> {
            Ok(self.0.clone())
        }
    }

    fn whale_buy(id: &str) -> RawSignal {
        RawSignal {
            id: id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            direction: "buy".to_string(),
            instrument_id: "token_wif".to_string(),
            name: "dogwifhat".to_string(),
            symbol: "WIF".to_string(),
            address: ADDRESS.to_string(),
            size_bucket: "large".to_string(),
            trade_amount: 5000.0,
            win_rate: 80.0,
            market_cap: 20_000_000.0,
            risk_classification: "good".to_string(),
            first_seen: false,
            logo_url: String::new(),
        }
    }

    async fn bot_with(
        signals: Vec<RawSignal>,
        repo: Arc<MemoryRepository>,
    ) -> (Bot, Arc<RandomWalkOracle>) {
        let oracle = Arc::new(RandomWalkOracle::with_seed(11, 0.0));
        oracle.set_price(ADDRESS, dec!(0.01)).await;
        let executor = Arc::new(PaperExecutor::new(oracle.clone(), dec!(1), 300, dec!(0.001)));

        let bot = Bot::new(
            BotConfig::default(),
            repo,
            Arc::new(StaticSource(signals)),
            executor,
            oracle.clone(),
        );
        (bot, oracle)
    }

    #[tokio::test]
    async fn test_tick_opens_position_and_records_audit() {
        let repo = Arc::new(MemoryRepository::new());
        let (mut bot, _) = bot_with(vec![whale_buy("tx-1")], repo.clone()).await;
        bot.initialize().await.unwrap();

        bot.tick().await.unwrap();

        let position = bot.ledger().get(ADDRESS).unwrap();
        assert_eq!(position.source_signal_id, "tx-1");
        assert_eq!(position.entry_value_usd, dec!(10));

        let decisions = repo.decisions().await;
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].approve);
        assert_eq!(decisions[0].kind, DecisionKind::Entry);

        let executions = repo.executions().await;
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].position_id.as_deref(), Some(position.id.as_str()));
    }

    #[tokio::test]
    async fn test_repeated_signal_opens_once() {
        let repo = Arc::new(MemoryRepository::new());
        let (mut bot, _) = bot_with(vec![whale_buy("tx-1"), whale_buy("tx-2")], repo.clone()).await;

        bot.tick().await.unwrap();
        bot.tick().await.unwrap();

        assert_eq!(bot.ledger().len(), 1);
        assert_eq!(bot.ledger().stats().total_trades_executed, 1);
        assert_eq!(repo.decisions().await.iter().filter(|d| d.approve).count(), 1);
    }

    #[tokio::test]
    async fn test_take_profit_closes_on_sweep() {
        let repo = Arc::new(MemoryRepository::new());
        let (mut bot, oracle) = bot_with(vec![whale_buy("tx-1")], repo.clone()).await;

        bot.tick().await.unwrap();
        let id = bot.ledger().get(ADDRESS).unwrap().id.clone();

        oracle.set_price(ADDRESS, dec!(0.02)).await;
        bot.tick().await.unwrap();

        assert!(bot.ledger().is_empty());
        let stored = repo.position(&id).await.unwrap();
        assert_eq!(stored.status, PositionStatus::Closed);
        assert_eq!(stored.close_reason.as_deref(), Some("take_profit"));
        assert!(stored.pnl_usd > Decimal::ZERO);

        let stats = bot.get_stats().await;
        assert_eq!(stats.ledger.winning_trades, 1);
        assert!(stats.last_fault.is_none());
    }

    #[tokio::test]
    async fn test_restored_position_survives_first_sweep() {
        let restored = fixtures::open_position("addr-restored", dec!(10), 1);
        let repo = Arc::new(MemoryRepository::with_positions(vec![restored.clone()]));

        let oracle = Arc::new(RandomWalkOracle::with_seed(11, 0.0));
        let executor = Arc::new(PaperExecutor::new(oracle.clone(), dec!(1), 300, dec!(0.001)));
        let mut bot = Bot::new(
            BotConfig::default(),
            repo.clone(),
            Arc::new(StaticSource(Vec::new())),
            executor.clone(),
            oracle,
        );

        bot.initialize().await.unwrap();
        executor.restore_holdings(&bot.ledger().snapshot()).await;
        bot.tick().await.unwrap();

        let position = bot.ledger().get("addr-restored").unwrap();
        assert_eq!(position.token_amount, dec!(1000));
        assert_eq!(position.pnl_usd, Decimal::ZERO);
        let stored = repo.position(&restored.id).await.unwrap();
        assert_eq!(stored.status, PositionStatus::Open);
        assert_eq!(bot.get_stats().await.ledger.closed_trades(), 0);
    }

    #[tokio::test]
    async fn test_malformed_signal_dropped() {
        let mut bad = whale_buy("tx-bad");
        bad.size_bucket = "huge".to_string();

        let repo = Arc::new(MemoryRepository::new());
        let (mut bot, _) = bot_with(vec![bad], repo.clone()).await;
        bot.tick().await.unwrap();

        let stats = bot.get_stats().await;
        assert_eq!(stats.signals_seen, 1);
        assert_eq!(stats.signals_dropped, 1);
        assert!(repo.decisions().await.is_empty());
        assert!(bot.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_kept_as_fault() {
        let repo = Arc::new(MemoryRepository::new());
        repo.set_fail_persist(true);
        let (mut bot, _) = bot_with(vec![whale_buy("tx-1")], repo.clone()).await;

        bot.tick().await.unwrap();

        assert!(bot.ledger().is_empty());
        assert!(bot.last_fault().unwrap().contains("Persistence failed"));
        let executions = repo.executions().await;
        assert_eq!(executions.len(), 1);
        assert!(executions[0].position_id.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_never_executes() {
        let repo = Arc::new(MemoryRepository::new());
        let (mut bot, _) = bot_with(vec![whale_buy("tx-1")], repo.clone()).await;
        bot.config.dry_run = true;

        bot.tick().await.unwrap();

        assert!(bot.ledger().is_empty());
        assert_eq!(repo.decisions().await.len(), 1);
        assert!(repo.executions().await.is_empty());
    }
}
