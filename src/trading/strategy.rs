//! Whale signal evaluation: entry admission, quality scoring and exit rules.
//!
//! Entry rules run in a fixed order and the first failure decides the
//! rejection. Exit rules are evaluated against a position's latest valuation
//! and holding time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StrategyError, ValidationError};
use crate::models::{Direction, Position, RawSignal, Signal};

use super::TradingConfig;

/// Minimum quality score for admission.
pub const MIN_QUALITY_SCORE: f64 = 0.5;

/// Positions are sold after this many hours regardless of P&L.
pub const MAX_HOLDING_HOURS: f64 = 24.0;

/// Losing positions held longer than this are cut early.
pub const EARLY_EXIT_HOURS: f64 = 4.0;

/// P&L percentage below which the early exit applies.
const EARLY_EXIT_LOSS_PCT: Decimal = dec!(-10);

/// Trailing stop only considered above this profit percentage.
const TRAILING_ACTIVATION_PCT: Decimal = dec!(10);

/// Fraction of profit the trailing stop protects.
const TRAILING_RETAIN_RATIO: Decimal = dec!(0.7);

/// Market cap above which the quality score is penalised.
const HIGH_CAP_PENALTY_THRESHOLD: Decimal = dec!(50000000);

// ==================== Decisions ====================

/// Why an entry was refused. Also the rejection histogram key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    AlreadyProcessed,
    DuplicatePosition,
    MaxPositions,
    InsufficientBalance,
    NotBuy,
    LowWinRate,
    LowTradeAmount,
    HighMarketCap,
    BadRiskClass,
    LowQuality,
}

impl Rejection {
    pub fn key(&self) -> &'static str {
        match self {
            Rejection::AlreadyProcessed => "already_processed",
            Rejection::DuplicatePosition => "duplicate_position",
            Rejection::MaxPositions => "max_positions",
            Rejection::InsufficientBalance => "insufficient_balance",
            Rejection::NotBuy => "not_buy",
            Rejection::LowWinRate => "low_win_rate",
            Rejection::LowTradeAmount => "low_trade_amount",
            Rejection::HighMarketCap => "high_market_cap",
            Rejection::BadRiskClass => "bad_rugcheck",
            Rejection::LowQuality => "low_quality",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Outcome of evaluating a signal for entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDecision {
    pub approve: bool,
    pub reason: String,
    pub rejection: Option<Rejection>,
    /// Set once the quality rule was reached
    pub quality_score: Option<f64>,
}

impl EntryDecision {
    pub fn approve(reason: impl Into<String>, quality_score: f64) -> Self {
        Self {
            approve: true,
            reason: reason.into(),
            rejection: None,
            quality_score: Some(quality_score),
        }
    }

    pub fn reject(rejection: Rejection, reason: impl Into<String>) -> Self {
        Self {
            approve: false,
            reason: reason.into(),
            rejection: Some(rejection),
            quality_score: None,
        }
    }
}

/// Reason for exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    MaxHoldingPeriod,
    EarlyLossCutoff,
    TrailingStop,
    None,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::MaxHoldingPeriod => "max_holding_period",
            ExitReason::EarlyLossCutoff => "early_loss_cutoff",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::None => "none",
        }
    }
}

/// How urgently to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitUrgency {
    /// Sell now, losses are growing
    Immediate,
    /// Sell on this sweep
    Normal,
    /// No exit needed
    None,
}

/// Outcome of evaluating an open position for exit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitDecision {
    pub approve: bool,
    pub reason: String,
    pub exit_reason: ExitReason,
    pub urgency: ExitUrgency,
}

impl ExitDecision {
    fn exit(exit_reason: ExitReason, urgency: ExitUrgency, reason: String) -> Self {
        Self { approve: true, reason, exit_reason, urgency }
    }

    fn hold() -> Self {
        Self {
            approve: false,
            reason: String::new(),
            exit_reason: ExitReason::None,
            urgency: ExitUrgency::None,
        }
    }
}

/// Snapshot of evaluator counters.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStats {
    pub total_evaluations: u64,
    pub buy_signals_generated: u64,
    pub sell_signals_generated: u64,
    pub total_signals: u64,
    /// Approved entries as a percentage of evaluations
    pub buy_signal_rate: f64,
    pub rejection_reasons: BTreeMap<String, u64>,
    pub processed_signals: usize,
    pub config: TradingConfig,
}

// ==================== Strategy ====================

/// Signal evaluator. Owns its counters and the set of approved signal ids.
#[derive(Debug)]
pub struct Strategy {
    config: TradingConfig,
    processed: HashSet<String>,
    rejections: HashMap<Rejection, u64>,
    total_evaluations: u64,
    buy_signals_generated: u64,
    sell_signals_generated: u64,
}

impl Strategy {
    pub fn new(config: TradingConfig) -> Self {
        info!(
            min_win_rate = config.min_win_rate,
            min_trade_amount = %config.min_trade_amount,
            max_positions = config.max_positions,
            "Strategy initialized"
        );
        Self {
            config,
            processed: HashSet::new(),
            rejections: HashMap::new(),
            total_evaluations: 0,
            buy_signals_generated: 0,
            sell_signals_generated: 0,
        }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    /// Check a raw signal before it is evaluated.
    pub fn validate(&self, raw: &RawSignal) -> Result<Signal, ValidationError> {
        Signal::try_from(raw)
    }

    // ==================== Entry ====================

    /// Decide whether to copy a whale signal.
    ///
    /// `open_positions` is the current open book and `available_capital` the
    /// native balance that could fund the trade.
    pub fn evaluate_entry(
        &mut self,
        signal: &Signal,
        open_positions: &[Position],
        available_capital: Decimal,
    ) -> Result<EntryDecision, StrategyError> {
        self.total_evaluations += 1;

        info!(
            symbol = %signal.symbol,
            trade_amount = %signal.trade_amount,
            win_rate = signal.win_rate,
            market_cap = %signal.market_cap,
            risk = %signal.risk_classification,
            direction = %signal.direction,
            "Evaluating signal"
        );

        if let Some(decision) = self.check_admission(signal, open_positions, available_capital) {
            return Ok(self.reject(signal, decision));
        }
        if let Some(decision) = self.check_signal_filters(signal) {
            return Ok(self.reject(signal, decision));
        }

        let (score, breakdown) = self.quality_score(signal)?;
        if score < MIN_QUALITY_SCORE {
            let mut decision = EntryDecision::reject(
                Rejection::LowQuality,
                format!("Quality score too low: {:.2} ({})", score, breakdown),
            );
            decision.quality_score = Some(score);
            return Ok(self.reject(signal, decision));
        }

        self.processed.insert(signal.id.clone());
        self.buy_signals_generated += 1;

        let reason = [
            format!("High win rate: {:.1}%", signal.win_rate),
            format!("Significant trade: ${}", signal.trade_amount.round()),
            format!("Reasonable market cap: ${}", signal.market_cap.round()),
            format!("Safe rugcheck: {}", signal.risk_classification),
            format!("Quality score: {:.2}", score),
            "Whale is buying".to_string(),
        ]
        .join(" | ");

        info!(symbol = %signal.symbol, quality = score, "Signal approved");
        Ok(EntryDecision::approve(reason, score))
    }

    /// Rules about our own state: dedup, duplicates, capacity, capital.
    fn check_admission(
        &self,
        signal: &Signal,
        open_positions: &[Position],
        available_capital: Decimal,
    ) -> Option<EntryDecision> {
        if self.processed.contains(&signal.id) {
            return Some(EntryDecision::reject(
                Rejection::AlreadyProcessed,
                "Already processed this signal",
            ));
        }

        if open_positions
            .iter()
            .any(|p| p.instrument_address == signal.instrument_address)
        {
            return Some(EntryDecision::reject(
                Rejection::DuplicatePosition,
                "Already have position in this token",
            ));
        }

        if open_positions.len() >= self.config.max_positions {
            return Some(EntryDecision::reject(
                Rejection::MaxPositions,
                format!("Max positions reached ({})", self.config.max_positions),
            ));
        }

        let required = self.config.required_capital();
        if available_capital < required {
            return Some(EntryDecision::reject(
                Rejection::InsufficientBalance,
                format!("Insufficient balance ({:.4} < {:.4})", available_capital, required),
            ));
        }

        None
    }

    /// Rules about the signal itself.
    fn check_signal_filters(&self, signal: &Signal) -> Option<EntryDecision> {
        if signal.direction != Direction::Buy {
            return Some(EntryDecision::reject(
                Rejection::NotBuy,
                format!("Not a buy transaction: {}", signal.direction),
            ));
        }

        if signal.win_rate < self.config.min_win_rate {
            return Some(EntryDecision::reject(
                Rejection::LowWinRate,
                format!(
                    "Win rate too low: {:.1}% < {:.1}%",
                    signal.win_rate, self.config.min_win_rate
                ),
            ));
        }

        if signal.trade_amount < self.config.min_trade_amount {
            return Some(EntryDecision::reject(
                Rejection::LowTradeAmount,
                format!(
                    "Trade amount too low: ${} < ${}",
                    signal.trade_amount.round(),
                    self.config.min_trade_amount.round()
                ),
            ));
        }

        if signal.market_cap > self.config.max_market_cap {
            return Some(EntryDecision::reject(
                Rejection::HighMarketCap,
                format!(
                    "Market cap too high: ${} > ${}",
                    signal.market_cap.round(),
                    self.config.max_market_cap.round()
                ),
            ));
        }

        if !self.config.allows_risk(signal.risk_classification) {
            return Some(EntryDecision::reject(
                Rejection::BadRiskClass,
                format!("Poor rugcheck status: {}", signal.risk_classification),
            ));
        }

        None
    }

    fn reject(&mut self, signal: &Signal, decision: EntryDecision) -> EntryDecision {
        if let Some(rejection) = decision.rejection {
            *self.rejections.entry(rejection).or_insert(0) += 1;
        }
        info!(symbol = %signal.symbol, reason = %decision.reason, "Signal rejected");
        decision
    }

    /// Weighted quality heuristic with a readable breakdown.
    pub fn quality_score(&self, signal: &Signal) -> Result<(f64, String), StrategyError> {
        let trade_amount = signal.trade_amount.to_f64().ok_or_else(|| {
            StrategyError::Entry(format!("trade amount {} is not representable", signal.trade_amount))
        })?;

        let win_rate_score = (signal.win_rate / 100.0).min(1.0);
        let size_score = signal.size_bucket.score();
        let amount_score = (trade_amount / 10_000.0).min(1.0);
        let risk_score = signal.risk_classification.score();

        let mut score =
            win_rate_score * 0.4 + size_score * 0.3 + amount_score * 0.2 + risk_score * 0.1;
        let mut parts = vec![
            format!("Win rate: {:.2}", win_rate_score),
            format!("Size: {:.2}", size_score),
            format!("Amount: {:.2}", amount_score),
            format!("Rugcheck: {:.2}", risk_score),
        ];

        if signal.first_seen {
            score += 0.05;
            parts.push("First seen bonus".to_string());
        }
        if signal.market_cap > HIGH_CAP_PENALTY_THRESHOLD {
            score -= 0.1;
            parts.push("High cap penalty".to_string());
        }

        if !score.is_finite() {
            return Err(StrategyError::NonFiniteScore(signal.id.clone()));
        }
        Ok((score, parts.join(" | ")))
    }

    // ==================== Exit ====================

    /// Decide whether an open position should be sold now.
    pub fn evaluate_exit(&mut self, position: &Position) -> ExitDecision {
        self.evaluate_exit_at(position, Utc::now())
    }

    /// Same as [`Strategy::evaluate_exit`] with an explicit clock.
    pub fn evaluate_exit_at(&mut self, position: &Position, now: DateTime<Utc>) -> ExitDecision {
        let decision = self.check_exit(position, now);
        if decision.approve {
            self.sell_signals_generated += 1;
            match decision.urgency {
                ExitUrgency::Immediate => warn!(
                    symbol = %position.symbol,
                    reason = %decision.reason,
                    "Sell signal"
                ),
                _ => info!(symbol = %position.symbol, reason = %decision.reason, "Sell signal"),
            }
        }
        decision
    }

    fn check_exit(&self, position: &Position, now: DateTime<Utc>) -> ExitDecision {
        let pnl_pct = position.pnl_percentage;
        debug!(symbol = %position.symbol, pnl_pct = %pnl_pct, "Evaluating exit");

        if pnl_pct >= self.config.take_profit_pct {
            return ExitDecision::exit(
                ExitReason::TakeProfit,
                ExitUrgency::Normal,
                format!("Take profit target hit ({:.1}%)", pnl_pct),
            );
        }

        if pnl_pct <= -self.config.stop_loss_pct {
            return ExitDecision::exit(
                ExitReason::StopLoss,
                ExitUrgency::Immediate,
                format!("Stop loss triggered ({:.1}%)", pnl_pct),
            );
        }

        let hours_held = position.holding_hours(now);
        if hours_held > MAX_HOLDING_HOURS {
            return ExitDecision::exit(
                ExitReason::MaxHoldingPeriod,
                ExitUrgency::Normal,
                format!("Time-based exit (held {:.1} hours)", hours_held),
            );
        }

        if hours_held > EARLY_EXIT_HOURS && pnl_pct < EARLY_EXIT_LOSS_PCT {
            return ExitDecision::exit(
                ExitReason::EarlyLossCutoff,
                ExitUrgency::Immediate,
                format!(
                    "Early exit for losing position ({:.1}% after {:.1}h)",
                    pnl_pct, hours_held
                ),
            );
        }

        // TODO: compare against a stored high-water mark per position; against
        // the live percentage this threshold can never be crossed.
        if pnl_pct > TRAILING_ACTIVATION_PCT {
            let threshold = pnl_pct * TRAILING_RETAIN_RATIO;
            if pnl_pct < threshold {
                return ExitDecision::exit(
                    ExitReason::TrailingStop,
                    ExitUrgency::Normal,
                    format!("Trailing stop triggered (profit dropped to {:.1}%)", pnl_pct),
                );
            }
        }

        ExitDecision::hold()
    }

    // ==================== Statistics ====================

    pub fn is_processed(&self, signal_id: &str) -> bool {
        self.processed.contains(signal_id)
    }

    pub fn stats(&self) -> StrategyStats {
        StrategyStats {
            total_evaluations: self.total_evaluations,
            buy_signals_generated: self.buy_signals_generated,
            sell_signals_generated: self.sell_signals_generated,
            total_signals: self.buy_signals_generated + self.sell_signals_generated,
            buy_signal_rate: self.buy_signals_generated as f64
                / self.total_evaluations.max(1) as f64
                * 100.0,
            rejection_reasons: self
                .rejections
                .iter()
                .map(|(r, count)| (r.key().to_string(), *count))
                .collect(),
            processed_signals: self.processed.len(),
            config: self.config.clone(),
        }
    }

    /// Rejections per reason as a percentage of all rejections.
    pub fn rejection_summary(&self) -> BTreeMap<String, f64> {
        let total: u64 = self.rejections.values().sum();
        if total == 0 {
            return BTreeMap::new();
        }
        self.rejections
            .iter()
            .map(|(r, count)| (r.key().to_string(), *count as f64 / total as f64 * 100.0))
            .collect()
    }

    pub fn update_config(&mut self, config: TradingConfig) {
        info!(
            min_win_rate = %format!("{} -> {}", self.config.min_win_rate, config.min_win_rate),
            per_trade_size = %format!("{} -> {}", self.config.per_trade_size, config.per_trade_size),
            take_profit = %format!("{} -> {}", self.config.take_profit_pct, config.take_profit_pct),
            stop_loss = %format!("{} -> {}", self.config.stop_loss_pct, config.stop_loss_pct),
            "Strategy config updated"
        );
        self.config = config;
    }

    /// Clear counters and the processed set.
    pub fn reset(&mut self) {
        self.total_evaluations = 0;
        self.buy_signals_generated = 0;
        self.sell_signals_generated = 0;
        self.processed.clear();
        self.rejections.clear();
        info!("Strategy statistics reset");
    }
}
