//! Position ledger: the authoritative set of open positions.
//!
//! At most one open position exists per instrument address. Every mutation
//! is persisted before it is applied in memory, so a failed write leaves the
//! ledger exactly as it was.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use crate::db::Repository;
use crate::error::PositionError;
use crate::metrics::PerformanceCalculator;
use crate::models::{
    pnl_percentage, ExecutionResult, LedgerStats, PerformanceMetrics, PortfolioSummary, Position,
    PositionBreakdown, PositionStatus, Signal, VALUE_DP,
};

/// Balances closer than this to the tracked amount are treated as equal.
const BALANCE_TOLERANCE: Decimal = dec!(0.000001);

/// Why a position is closed without a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceCloseCause {
    /// The tokens are no longer held
    HoldingGone,
    /// The sell could not be executed
    SellFailed,
    /// Operator request
    Manual,
}

impl ForceCloseCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForceCloseCause::HoldingGone => "holding_gone",
            ForceCloseCause::SellFailed => "sell_failed",
            ForceCloseCause::Manual => "manual",
        }
    }

    fn terminal_status(&self) -> PositionStatus {
        match self {
            ForceCloseCause::SellFailed => PositionStatus::Failed,
            ForceCloseCause::HoldingGone | ForceCloseCause::Manual => PositionStatus::Closed,
        }
    }
}

/// Result of reconciling a position with its on-chain balance.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Unchanged,
    Adjusted { from: Decimal, to: Decimal },
    ForceClosed,
}

/// Open positions keyed by instrument address, plus running statistics.
#[derive(Debug)]
pub struct PositionLedger {
    repo: Arc<dyn Repository>,
    open: HashMap<String, Position>,
    stats: LedgerStats,
}

impl PositionLedger {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            open: HashMap::new(),
            stats: LedgerStats::default(),
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Load open positions and rebuild statistics from the closed history.
    pub async fn initialize(&mut self) -> Result<usize, PositionError> {
        let stored = self.repo.load_open_positions().await?;

        let mut open = HashMap::with_capacity(stored.len());
        for position in stored {
            if !position.is_open() {
                return Err(PositionError::InvariantViolation(format!(
                    "position {} loaded as open has status {}",
                    position.id, position.status
                )));
            }
            if open.contains_key(&position.instrument_address) {
                return Err(PositionError::InvariantViolation(format!(
                    "two open positions for {}",
                    position.instrument_address
                )));
            }
            open.insert(position.instrument_address.clone(), position);
        }

        let closed: Vec<Position> = self
            .repo
            .load_closed_positions()
            .await?
            .into_iter()
            .filter(|p| p.status == PositionStatus::Closed)
            .collect();

        let mut stats = LedgerStats::default();
        let mut holding_hours = Vec::new();
        for position in &closed {
            stats.record_close(position.pnl_usd);
            if let Some(hours) = position.trade_duration_hours() {
                holding_hours.push(hours);
            }
        }
        if !holding_hours.is_empty() {
            stats.avg_holding_hours = holding_hours.iter().sum::<f64>() / holding_hours.len() as f64;
        }
        stats.total_trades_executed = (closed.len() + open.len()) as u64;
        stats.max_concurrent_positions = open.len();

        self.open = open;
        self.stats = stats;

        info!(open = self.open.len(), closed = closed.len(), "Position ledger initialized");
        Ok(self.open.len())
    }

    // ==================== Lifecycle ====================

    /// Record a new position from a successful buy.
    pub async fn open(
        &mut self,
        signal: &Signal,
        execution: &ExecutionResult,
        quote_rate: Decimal,
    ) -> Result<Position, PositionError> {
        let address = &signal.instrument_address;
        if !execution.success {
            return Err(PositionError::UnsuccessfulExecution {
                address: address.clone(),
                message: execution.error_message.clone(),
            });
        }
        if self.open.contains_key(address) {
            error!(address = %address, "Refusing to open a second position");
            return Err(PositionError::AlreadyOpen(address.clone()));
        }

        let entry_value_usd = (execution.input_amount * quote_rate).round_dp(VALUE_DP);
        let entry_price_usd = if execution.output_amount > Decimal::ZERO {
            entry_value_usd / execution.output_amount
        } else {
            warn!(symbol = %signal.symbol, "Buy returned no tokens, entry price set to zero");
            Decimal::ZERO
        };

        let now = Utc::now();
        let position = Position {
            id: format!("pos_{}_{}", now.timestamp(), uuid::Uuid::new_v4().simple()),
            instrument_address: address.clone(),
            symbol: signal.symbol.clone(),
            name: signal.name.clone(),
            source_signal_id: signal.id.clone(),
            entry_amount_native: execution.input_amount,
            entry_value_usd,
            token_amount: execution.output_amount,
            entry_price_usd,
            entry_tx_id: execution.tx_id.clone(),
            entry_timestamp: now,
            current_price_usd: entry_price_usd,
            current_value_usd: entry_value_usd,
            pnl_usd: Decimal::ZERO,
            pnl_percentage: Decimal::ZERO,
            exit_tx_id: None,
            exit_timestamp: None,
            close_reason: None,
            status: PositionStatus::Open,
        };

        self.repo.persist(&position).await?;
        self.open.insert(address.clone(), position.clone());

        self.stats.total_trades_executed += 1;
        self.stats.max_concurrent_positions = self.stats.max_concurrent_positions.max(self.open.len());

        info!(
            id = %position.id,
            symbol = %position.symbol,
            tokens = %position.token_amount,
            value_usd = %position.entry_value_usd,
            "Position opened"
        );

        self.check_invariants()?;
        Ok(position)
    }

    /// Revalue an open position at `current_price` (USD per token).
    pub async fn update_valuation(
        &mut self,
        address: &str,
        current_price: Decimal,
    ) -> Result<Position, PositionError> {
        let mut updated = self
            .open
            .get(address)
            .cloned()
            .ok_or_else(|| PositionError::NotOpen(address.to_string()))?;

        updated.revalue(current_price);
        self.repo.persist(&updated).await?;
        self.open.insert(address.to_string(), updated.clone());

        debug!(
            symbol = %updated.symbol,
            pnl_pct = %updated.pnl_percentage.round_dp(2),
            pnl_usd = %updated.pnl_usd.round_dp(2),
            "Position revalued"
        );

        self.check_invariants()?;
        Ok(updated)
    }

    /// Align the tracked token amount with the on-chain balance.
    ///
    /// A zero balance force-closes the position as [`ForceCloseCause::HoldingGone`].
    pub async fn reconcile_holding(
        &mut self,
        address: &str,
        on_chain_balance: Decimal,
    ) -> Result<Reconciliation, PositionError> {
        let current = self
            .open
            .get(address)
            .ok_or_else(|| PositionError::NotOpen(address.to_string()))?;

        if on_chain_balance.is_zero() {
            warn!(symbol = %current.symbol, "No tokens held, closing position");
            self.force_close(address, ForceCloseCause::HoldingGone).await?;
            return Ok(Reconciliation::ForceClosed);
        }

        let from = current.token_amount;
        if (on_chain_balance - from).abs() <= BALANCE_TOLERANCE {
            return Ok(Reconciliation::Unchanged);
        }

        let mut updated = current.clone();
        updated.token_amount = on_chain_balance;
        self.repo.persist(&updated).await?;

        info!(symbol = %updated.symbol, from = %from, to = %on_chain_balance, "Token amount updated");
        self.open.insert(address.to_string(), updated);

        self.check_invariants()?;
        Ok(Reconciliation::Adjusted { from, to: on_chain_balance })
    }

    /// Close a position with a successful sell. Returns `false` if nothing is open.
    pub async fn close(
        &mut self,
        address: &str,
        execution: &ExecutionResult,
        quote_rate: Decimal,
        reason: &str,
    ) -> Result<bool, PositionError> {
        let Some(current) = self.open.get(address) else {
            debug!(address = %address, "Close requested for unknown position");
            return Ok(false);
        };
        if !execution.success {
            return Err(PositionError::UnsuccessfulExecution {
                address: address.to_string(),
                message: execution.error_message.clone(),
            });
        }

        let now = Utc::now();
        let exit_value = (execution.output_amount * quote_rate).round_dp(VALUE_DP);

        let mut closed = current.clone();
        closed.current_value_usd = exit_value;
        closed.current_price_usd = if closed.token_amount > Decimal::ZERO {
            exit_value / closed.token_amount
        } else {
            Decimal::ZERO
        };
        closed.pnl_usd = exit_value - closed.entry_value_usd;
        closed.pnl_percentage = pnl_percentage(closed.pnl_usd, closed.entry_value_usd);
        closed.exit_tx_id = Some(execution.tx_id.clone());
        closed.exit_timestamp = Some(now);
        closed.close_reason = Some(reason.to_string());
        closed.status = PositionStatus::Closed;

        self.repo.persist(&closed).await?;
        self.open.remove(address);

        let held = closed.holding_hours(now);
        self.stats.record_close(closed.pnl_usd);
        self.stats.record_holding_time(held);

        info!(
            id = %closed.id,
            symbol = %closed.symbol,
            reason = reason,
            pnl_usd = %closed.pnl_usd.round_dp(2),
            pnl_pct = %closed.pnl_percentage.round_dp(1),
            held_hours = %format!("{:.1}", held),
            native_received = %execution.output_amount,
            "Position closed"
        );

        self.check_invariants()?;
        Ok(true)
    }

    /// Close without a sell, keeping the last valuation as final.
    pub async fn force_close(
        &mut self,
        address: &str,
        cause: ForceCloseCause,
    ) -> Result<bool, PositionError> {
        let Some(current) = self.open.get(address) else {
            warn!(address = %address, "Position not found for force close");
            return Ok(false);
        };

        let now = Utc::now();
        let mut closed = current.clone();
        closed.status = cause.terminal_status();
        closed.exit_timestamp = Some(now);
        closed.close_reason = Some(cause.as_str().to_string());

        self.repo.persist(&closed).await?;
        self.open.remove(address);

        if closed.status == PositionStatus::Closed {
            self.stats.record_close(closed.pnl_usd);
            self.stats.record_holding_time(closed.holding_hours(now));
        }

        warn!(
            symbol = %closed.symbol,
            cause = cause.as_str(),
            status = %closed.status,
            "Position force closed"
        );

        self.check_invariants()?;
        Ok(true)
    }

    // ==================== Reporting ====================

    pub fn portfolio_summary(&self, native_balance: Decimal, quote_rate: Decimal) -> PortfolioSummary {
        let now = Utc::now();
        let positions = self.snapshot();

        let total_open_value: Decimal = positions.iter().map(|p| p.current_value_usd).sum();
        let total_unrealized_pnl: Decimal = positions.iter().map(|p| p.pnl_usd).sum();
        let native_value_usd = (native_balance * quote_rate).round_dp(VALUE_DP);

        PortfolioSummary {
            timestamp: now,
            native_balance,
            native_value_usd,
            open_count: positions.len(),
            total_open_value,
            total_unrealized_pnl,
            total_portfolio_value: native_value_usd + total_open_value,
            positions: positions
                .iter()
                .map(|p| PositionBreakdown {
                    id: p.id.clone(),
                    instrument_address: p.instrument_address.clone(),
                    symbol: p.symbol.clone(),
                    token_amount: p.token_amount,
                    current_value_usd: p.current_value_usd,
                    pnl_usd: p.pnl_usd,
                    pnl_percentage: p.pnl_percentage,
                    holding_time_hours: p.holding_hours(now),
                })
                .collect(),
        }
    }

    /// Performance over a closed history.
    pub fn performance_metrics(closed: &[Position]) -> PerformanceMetrics {
        PerformanceCalculator::calculate(closed)
    }

    /// Performance over the repository's closed history.
    pub async fn load_performance_metrics(&self) -> Result<PerformanceMetrics, PositionError> {
        let closed = self.repo.load_closed_positions().await?;
        Ok(Self::performance_metrics(&closed))
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            open_positions: self.open.len(),
            ..self.stats.clone()
        }
    }

    // ==================== Lookups ====================

    pub fn get(&self, address: &str) -> Option<&Position> {
        self.open.get(address)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Position> {
        self.open.values().find(|p| p.id == id)
    }

    /// Cloned open positions ordered by entry time.
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.open.values().cloned().collect();
        positions.sort_by(|a, b| {
            a.entry_timestamp
                .cmp(&b.entry_timestamp)
                .then_with(|| a.instrument_address.cmp(&b.instrument_address))
        });
        positions
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Every key must match its position's address and the position must be open.
    pub fn check_invariants(&self) -> Result<(), PositionError> {
        for (address, position) in &self.open {
            if address != &position.instrument_address {
                return Err(PositionError::InvariantViolation(format!(
                    "key {} holds position for {}",
                    address, position.instrument_address
                )));
            }
            if !position.is_open() {
                return Err(PositionError::InvariantViolation(format!(
                    "position {} in open map has status {}",
                    position.id, position.status
                )));
            }
        }
        Ok(())
    }
}

impl LedgerStats {
    fn record_close(&mut self, pnl: Decimal) {
        if pnl > Decimal::ZERO {
            self.total_profits += pnl;
            self.winning_trades += 1;
        } else if pnl < Decimal::ZERO {
            self.total_losses += pnl.abs();
            self.losing_trades += 1;
        } else {
            self.break_even_trades += 1;
        }
    }

    /// Incremental mean over closed trades; call after `record_close`.
    fn record_holding_time(&mut self, hours: f64) {
        let n = self.closed_trades().max(1) as f64;
        self.avg_holding_hours = (self.avg_holding_hours * (n - 1.0) + hours) / n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::error::DatabaseError;
    use crate::models::fixtures::open_position;
    use crate::models::{Direction, RiskClass, SizeBucket};
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    const QUOTE: Decimal = dec!(100);

    fn make_signal(id: &str, address: &str) -> Signal {
        Signal {
            id: id.to_string(),
            timestamp: Utc::now(),
            direction: Direction::Buy,
            instrument_id: String::new(),
            symbol: "TEST".to_string(),
            name: "Test".to_string(),
            instrument_address: address.to_string(),
            size_bucket: SizeBucket::Large,
            trade_amount: dec!(5000),
            win_rate: 80.0,
            market_cap: dec!(1000000),
            risk_classification: RiskClass::Good,
            first_seen: false,
            logo_url: String::new(),
        }
    }

    fn fill(address: &str, input: Decimal, output: Decimal) -> ExecutionResult {
        ExecutionResult {
            success: true,
            tx_id: format!("tx-{}", address),
            instrument_address: address.to_string(),
            input_amount: input,
            output_amount: output,
            price: Decimal::ZERO,
            slippage: Decimal::ZERO,
            fee: Decimal::ZERO,
            error_message: String::new(),
        }
    }

    fn ledger() -> (Arc<MemoryRepository>, PositionLedger) {
        let repo = Arc::new(MemoryRepository::new());
        let ledger = PositionLedger::new(repo.clone());
        (repo, ledger)
    }

    #[tokio::test]
    async fn test_open_computes_entry_values() {
        let (repo, mut ledger) = ledger();
        let position = assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), dec!(1000)), QUOTE)
                .await
        );

        assert_eq!(position.entry_value_usd, dec!(10));
        assert_eq!(position.entry_price_usd, dec!(0.01));
        assert_eq!(position.entry_amount_native, dec!(0.1));
        assert_eq!(position.source_signal_id, "sig-1");
        assert!(position.is_open());
        assert_eq!(ledger.len(), 1);
        assert_eq!(repo.position(&position.id).await, Some(position));
        assert_eq!(ledger.stats().total_trades_executed, 1);
        assert_eq!(ledger.stats().max_concurrent_positions, 1);
    }

    #[tokio::test]
    async fn test_open_at_entry_price_is_flat() {
        let (_, mut ledger) = ledger();
        let position = assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), dec!(3)), QUOTE)
                .await
        );

        let revalued = assert_ok!(ledger.update_valuation("addr-1", position.entry_price_usd).await);
        assert_eq!(revalued.pnl_usd, Decimal::ZERO);
        assert_eq!(revalued.pnl_percentage, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_second_open_for_address_rejected() {
        let (_, mut ledger) = ledger();
        let execution = fill("addr-1", dec!(0.1), dec!(1000));
        assert_ok!(ledger.open(&make_signal("sig-1", "addr-1"), &execution, QUOTE).await);

        let err = assert_err!(ledger.open(&make_signal("sig-2", "addr-1"), &execution, QUOTE).await);
        assert!(matches!(err, PositionError::AlreadyOpen(a) if a == "addr-1"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.stats().total_trades_executed, 1);
    }

    #[tokio::test]
    async fn test_unsuccessful_execution_rejected() {
        let (_, mut ledger) = ledger();
        let execution = ExecutionResult::failed("addr-1", dec!(0.1), "no route");

        let err = assert_err!(ledger.open(&make_signal("sig-1", "addr-1"), &execution, QUOTE).await);
        assert!(matches!(err, PositionError::UnsuccessfulExecution { .. }));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_zero_output_gives_zero_entry_price() {
        let (_, mut ledger) = ledger();
        let position = assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), Decimal::ZERO), QUOTE)
                .await
        );
        assert_eq!(position.entry_price_usd, Decimal::ZERO);
        assert_eq!(position.entry_value_usd, dec!(10));
    }

    #[tokio::test]
    async fn test_close_realizes_pnl_and_updates_stats() {
        let (repo, mut ledger) = ledger();
        let opened = assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), dec!(1000)), QUOTE)
                .await
        );

        let sell = fill("addr-1", dec!(1000), dec!(0.15));
        assert!(assert_ok!(ledger.close("addr-1", &sell, QUOTE, "take_profit").await));
        assert!(ledger.get("addr-1").is_none());

        let stored = repo.position(&opened.id).await.unwrap();
        assert_eq!(stored.status, PositionStatus::Closed);
        assert_eq!(stored.pnl_usd, dec!(5));
        assert_eq!(stored.pnl_percentage, dec!(50));
        assert_eq!(stored.current_price_usd, dec!(0.015));
        assert_eq!(stored.close_reason.as_deref(), Some("take_profit"));
        assert!(stored.exit_timestamp.is_some());

        let stats = ledger.stats();
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.total_profits, dec!(5));
        assert_eq!(stats.open_positions, 0);
    }

    #[tokio::test]
    async fn test_close_and_force_close_absent_are_noops() {
        let (repo, mut ledger) = ledger();
        let sell = fill("addr-x", dec!(1), dec!(1));

        assert!(!assert_ok!(ledger.close("addr-x", &sell, QUOTE, "manual").await));
        assert!(!assert_ok!(ledger.force_close("addr-x", ForceCloseCause::Manual).await));
        assert_eq!(ledger.stats(), LedgerStats::default());
        assert!(repo.load_closed_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_sell_does_not_close() {
        let (_, mut ledger) = ledger();
        assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), dec!(1000)), QUOTE)
                .await
        );

        let failed = ExecutionResult::failed("addr-1", dec!(1000), "slippage");
        assert_err!(ledger.close("addr-1", &failed, QUOTE, "stop_loss").await);
        assert!(ledger.get("addr-1").is_some());
    }

    #[tokio::test]
    async fn test_force_close_causes() {
        let (repo, mut ledger) = ledger();
        for (sig, addr) in [("s1", "addr-1"), ("s2", "addr-2")] {
            assert_ok!(ledger.open(&make_signal(sig, addr), &fill(addr, dec!(0.1), dec!(1000)), QUOTE).await);
        }
        assert_ok!(ledger.update_valuation("addr-1", dec!(0.012)).await);

        assert!(assert_ok!(ledger.force_close("addr-1", ForceCloseCause::HoldingGone).await));
        assert!(assert_ok!(ledger.force_close("addr-2", ForceCloseCause::SellFailed).await));
        assert!(ledger.is_empty());

        let history = repo.load_closed_positions().await.unwrap();
        let gone = history.iter().find(|p| p.instrument_address == "addr-1").unwrap();
        let failed = history.iter().find(|p| p.instrument_address == "addr-2").unwrap();
        assert_eq!(gone.status, PositionStatus::Closed);
        assert_eq!(gone.pnl_usd, dec!(2));
        assert_eq!(failed.status, PositionStatus::Failed);
        assert_eq!(failed.close_reason.as_deref(), Some("sell_failed"));

        let stats = ledger.stats();
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.closed_trades(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_holding() {
        let (_, mut ledger) = ledger();
        assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), dec!(1000)), QUOTE)
                .await
        );

        let result = assert_ok!(ledger.reconcile_holding("addr-1", dec!(1000.0000001)).await);
        assert_eq!(result, Reconciliation::Unchanged);

        let result = assert_ok!(ledger.reconcile_holding("addr-1", dec!(600)).await);
        assert_eq!(result, Reconciliation::Adjusted { from: dec!(1000), to: dec!(600) });
        assert_eq!(ledger.get("addr-1").unwrap().token_amount, dec!(600));

        let result = assert_ok!(ledger.reconcile_holding("addr-1", Decimal::ZERO).await);
        assert_eq!(result, Reconciliation::ForceClosed);
        assert!(ledger.is_empty());

        let err = assert_err!(ledger.reconcile_holding("addr-1", dec!(5)).await);
        assert!(matches!(err, PositionError::NotOpen(_)));
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_ledger_untouched() {
        let (repo, mut ledger) = ledger();
        assert_ok!(
            ledger
                .open(&make_signal("sig-1", "addr-1"), &fill("addr-1", dec!(0.1), dec!(1000)), QUOTE)
                .await
        );
        let before = ledger.snapshot();
        repo.set_fail_persist(true);

        let err = assert_err!(
            ledger
                .open(&make_signal("sig-2", "addr-2"), &fill("addr-2", dec!(0.1), dec!(1000)), QUOTE)
                .await
        );
        assert!(matches!(err, PositionError::Persistence(DatabaseError::Unavailable(_))));
        assert_err!(ledger.update_valuation("addr-1", dec!(0.5)).await);
        assert_err!(ledger.close("addr-1", &fill("addr-1", dec!(1000), dec!(1)), QUOTE, "x").await);
        assert_err!(ledger.force_close("addr-1", ForceCloseCause::Manual).await);

        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.stats().total_trades_executed, 1);
        assert_eq!(ledger.stats().closed_trades(), 0);
    }

    #[tokio::test]
    async fn test_initialize_rebuilds_state() {
        let mut won = open_position("addr-1", dec!(10), 10);
        won.status = PositionStatus::Closed;
        won.pnl_usd = dec!(4);
        won.exit_timestamp = Some(won.entry_timestamp + Duration::hours(2));

        let mut lost = open_position("addr-2", dec!(10), 10);
        lost.status = PositionStatus::Closed;
        lost.pnl_usd = dec!(-3);
        lost.exit_timestamp = Some(lost.entry_timestamp + Duration::hours(4));

        let mut failed = open_position("addr-3", dec!(10), 10);
        failed.status = PositionStatus::Failed;
        failed.exit_timestamp = Some(Utc::now());

        let still_open = open_position("addr-4", dec!(10), 1);

        let repo = Arc::new(MemoryRepository::with_positions(vec![won, lost, failed, still_open]));
        let mut ledger = PositionLedger::new(repo);

        assert_eq!(assert_ok!(ledger.initialize().await), 1);
        assert!(ledger.get("addr-4").is_some());

        let stats = ledger.stats();
        assert_eq!(stats.total_trades_executed, 3);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.total_profits, dec!(4));
        assert_eq!(stats.total_losses, dec!(3));
        assert_eq!(stats.net_pnl(), dec!(1));
        assert!((stats.avg_holding_hours - 3.0).abs() < 1e-9);

        let metrics = assert_ok!(ledger.load_performance_metrics().await);
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.net_pnl, dec!(1));
    }

    #[tokio::test]
    async fn test_initialize_rejects_duplicate_addresses() {
        let mut second = open_position("addr-1", dec!(10), 1);
        second.id = "pos_other".to_string();
        let repo = Arc::new(MemoryRepository::with_positions(vec![
            open_position("addr-1", dec!(10), 2),
            second,
        ]));
        let mut ledger = PositionLedger::new(repo);

        let err = assert_err!(ledger.initialize().await);
        assert!(matches!(err, PositionError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_portfolio_summary() {
        let (_, mut ledger) = ledger();
        for (sig, addr) in [("s1", "addr-1"), ("s2", "addr-2")] {
            assert_ok!(ledger.open(&make_signal(sig, addr), &fill(addr, dec!(0.1), dec!(1000)), QUOTE).await);
        }
        assert_ok!(ledger.update_valuation("addr-1", dec!(0.012)).await);

        let summary = ledger.portfolio_summary(dec!(2), QUOTE);
        assert_eq!(summary.open_count, 2);
        assert_eq!(summary.native_value_usd, dec!(200));
        assert_eq!(summary.total_open_value, dec!(22));
        assert_eq!(summary.total_unrealized_pnl, dec!(2));
        assert_eq!(summary.total_portfolio_value, dec!(222));
        assert_eq!(summary.positions.len(), 2);
        assert!(ledger.find_by_id(&summary.positions[0].id).is_some());
    }
}
