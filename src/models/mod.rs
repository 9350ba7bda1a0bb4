//! Data models for signals, positions, executions, and reports.

mod execution;
mod metrics;
mod position;
mod signal;

pub use execution::{ExecutionResult, ExecutionSide};
pub use metrics::{LedgerStats, PerformanceMetrics, PortfolioSummary, PositionBreakdown};
pub use position::{pnl_percentage, Position, PositionStatus, VALUE_DP};
pub use signal::{parse_timestamp, Direction, RawSignal, RiskClass, Signal, SizeBucket};

#[cfg(test)]
pub(crate) use position::fixtures;
