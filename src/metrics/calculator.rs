//! Performance metrics over closed positions: win rate, drawdown, Sharpe ratio.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{PerformanceMetrics, Position, PositionStatus};

/// Calculator for realized trading performance.
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Metrics over the closed history. Failed and open positions are ignored.
    pub fn calculate(history: &[Position]) -> PerformanceMetrics {
        let mut closed: Vec<&Position> = history
            .iter()
            .filter(|p| p.status == PositionStatus::Closed)
            .collect();

        if closed.is_empty() {
            return PerformanceMetrics::default();
        }

        // Positions missing an exit time sort first
        closed.sort_by_key(|p| p.exit_timestamp);

        let pnls: Vec<Decimal> = closed.iter().map(|p| p.pnl_usd).collect();
        let mut metrics = PerformanceMetrics::default();

        Self::calculate_pnl_metrics(&mut metrics, &pnls);
        metrics.max_drawdown = Self::max_drawdown(&pnls);
        metrics.sharpe_ratio = Self::sharpe_ratio(&pnls);

        let durations: Vec<f64> = closed.iter().filter_map(|p| p.trade_duration_hours()).collect();
        if !durations.is_empty() {
            metrics.avg_trade_duration_hours = durations.iter().mean();
        }

        metrics
    }

    fn calculate_pnl_metrics(metrics: &mut PerformanceMetrics, pnls: &[Decimal]) {
        let (wins, rest): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().partition(|&&p| p > Decimal::ZERO);
        let losses: Vec<Decimal> = rest.into_iter().filter(|p| *p < Decimal::ZERO).collect();

        metrics.total_trades = pnls.len() as u32;
        metrics.winning_trades = wins.len() as u32;
        metrics.losing_trades = losses.len() as u32;
        metrics.break_even_trades = metrics.total_trades - metrics.winning_trades - metrics.losing_trades;
        metrics.win_rate = metrics.winning_trades as f64 / metrics.total_trades as f64 * 100.0;

        metrics.total_profit = wins.iter().copied().sum();
        metrics.total_loss = losses.iter().copied().sum();
        metrics.net_pnl = metrics.total_profit + metrics.total_loss;
    }

    /// Largest `(peak - running) / max(|peak|, 1)` over cumulative P&L.
    ///
    /// The peak starts at zero, so losses before any gain count as no drawdown.
    pub fn max_drawdown(pnls: &[Decimal]) -> f64 {
        let mut running = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_dd = 0.0f64;

        for pnl in pnls {
            running += pnl;
            if running > peak {
                peak = running;
            }

            if !peak.is_zero() {
                let dd = (peak - running) / peak.abs().max(Decimal::ONE);
                max_dd = max_dd.max(dd.to_f64().unwrap_or(0.0));
            }
        }

        max_dd
    }

    /// Mean P&L over its population standard deviation.
    pub fn sharpe_ratio(pnls: &[Decimal]) -> f64 {
        if pnls.len() < 2 {
            return 0.0;
        }

        let returns: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
        let mean = returns.iter().mean();
        let std_dev = returns.iter().population_std_dev();

        if std_dev > 0.0 && std_dev.is_finite() {
            mean / std_dev
        } else {
            0.0
        }
    }
}
