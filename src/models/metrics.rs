//! Portfolio and performance reports produced for the reporting layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Performance over the closed-position history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // === Counts ===
    pub total_trades: u32,

    pub winning_trades: u32,

    pub losing_trades: u32,

    pub break_even_trades: u32,

    /// Win rate in percent (0-100)
    pub win_rate: f64,

    // === P&L ===
    /// Sum of positive P&L in USD
    pub total_profit: Decimal,

    /// Sum of negative P&L in USD (a negative number)
    pub total_loss: Decimal,

    pub net_pnl: Decimal,

    // === Risk ===
    /// Running-peak drawdown ratio of cumulative P&L
    pub max_drawdown: f64,

    /// Mean P&L over population standard deviation of P&L
    pub sharpe_ratio: f64,

    // === Time ===
    pub avg_trade_duration_hours: f64,
}

/// One open position as seen by the reporting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBreakdown {
    pub id: String,
    pub instrument_address: String,
    pub symbol: String,
    pub token_amount: Decimal,
    pub current_value_usd: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_percentage: Decimal,
    pub holding_time_hours: f64,
}

/// Snapshot of the open book plus native balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub timestamp: DateTime<Utc>,

    /// Native currency balance (SOL)
    pub native_balance: Decimal,

    /// Native balance expressed in USD
    pub native_value_usd: Decimal,

    pub open_count: usize,

    pub total_open_value: Decimal,

    pub total_unrealized_pnl: Decimal,

    /// Native value plus open position value
    pub total_portfolio_value: Decimal,

    pub positions: Vec<PositionBreakdown>,
}

/// Running counters kept by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_trades_executed: u64,
    pub open_positions: usize,
    pub max_concurrent_positions: usize,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub break_even_trades: u64,
    /// Sum of winning P&L
    pub total_profits: Decimal,
    /// Sum of absolute losing P&L
    pub total_losses: Decimal,
    pub avg_holding_hours: f64,
}

impl LedgerStats {
    pub fn closed_trades(&self) -> u64 {
        self.winning_trades + self.losing_trades + self.break_even_trades
    }

    /// Win rate in percent over closed trades.
    pub fn win_rate(&self) -> f64 {
        self.winning_trades as f64 / self.closed_trades().max(1) as f64 * 100.0
    }

    pub fn net_pnl(&self) -> Decimal {
        self.total_profits - self.total_losses
    }
}

impl std::fmt::Display for PerformanceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Performance ===")?;
        writeln!(f, "Total Trades:    {} (W: {}, L: {}, BE: {})",
            self.total_trades, self.winning_trades, self.losing_trades, self.break_even_trades)?;
        writeln!(f, "Win Rate:        {:.1}%", self.win_rate)?;
        writeln!(f, "Total Profit:    ${:.2}", self.total_profit)?;
        writeln!(f, "Total Loss:      ${:.2}", self.total_loss)?;
        writeln!(f, "Net P&L:         ${:.2}", self.net_pnl)?;
        writeln!(f, "Max Drawdown:    {:.2}", self.max_drawdown)?;
        writeln!(f, "Sharpe Ratio:    {:.2}", self.sharpe_ratio)?;
        writeln!(f, "Avg Duration:    {:.1}h", self.avg_trade_duration_hours)?;
        Ok(())
    }
}
