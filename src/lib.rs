//! Whale copy-trading engine.
//!
//! Scores large-trader signals, opens at most one position per token and
//! manages exits with take-profit, stop-loss and holding-time rules.

pub mod api;
pub mod bot;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod trading;
