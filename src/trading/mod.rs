//! Trading logic: signal evaluation and the position ledger.

mod config;
mod ledger;
mod strategy;

pub use config::TradingConfig;
pub use ledger::{ForceCloseCause, PositionLedger, Reconciliation};
pub use strategy::{
    EntryDecision, ExitDecision, ExitReason, ExitUrgency, Rejection, Strategy, StrategyStats,
    EARLY_EXIT_HOURS, MAX_HOLDING_HOURS, MIN_QUALITY_SCORE,
};
