//! Position model for a holding opened from an approved whale signal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Decimal places kept for USD values.
pub const VALUE_DP: u32 = 8;

/// Lifecycle state. Transitions are one-way: Open -> Closed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
    Failed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
            PositionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Open)
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PositionStatus::Open),
            "closed" => Ok(PositionStatus::Closed),
            "failed" => Ok(PositionStatus::Failed),
            other => Err(format!("unknown position status '{}'", other)),
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked speculative holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier
    pub id: String,

    /// Token address (ledger key)
    pub instrument_address: String,

    pub symbol: String,

    pub name: String,

    /// Signal that triggered the entry
    pub source_signal_id: String,

    /// Native currency spent on entry
    pub entry_amount_native: Decimal,

    /// USD value of the entry
    pub entry_value_usd: Decimal,

    /// Tokens held
    pub token_amount: Decimal,

    /// USD price per token at entry
    pub entry_price_usd: Decimal,

    pub entry_tx_id: String,

    pub entry_timestamp: DateTime<Utc>,

    pub current_price_usd: Decimal,

    pub current_value_usd: Decimal,

    /// Unrealized while open, realized once closed
    pub pnl_usd: Decimal,

    /// P&L as a percentage of entry value (50 = +50%)
    pub pnl_percentage: Decimal,

    pub exit_tx_id: Option<String>,

    pub exit_timestamp: Option<DateTime<Utc>>,

    pub close_reason: Option<String>,

    pub status: PositionStatus,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Revalue at a new token price. Leaves lifecycle state untouched.
    pub fn revalue(&mut self, price_usd: Decimal) {
        self.current_price_usd = price_usd;
        self.current_value_usd = (price_usd * self.token_amount).round_dp(VALUE_DP);
        self.pnl_usd = self.current_value_usd - self.entry_value_usd;
        self.pnl_percentage = pnl_percentage(self.pnl_usd, self.entry_value_usd);
    }

    /// Hours between entry and `now`.
    pub fn holding_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_timestamp).num_seconds() as f64 / 3600.0
    }

    /// Hours between entry and exit, if the position has an exit time.
    pub fn trade_duration_hours(&self) -> Option<f64> {
        self.exit_timestamp.map(|exit| self.holding_hours(exit))
    }

    /// Short address for display.
    pub fn short_address(&self) -> String {
        let chars: Vec<char> = self.instrument_address.chars().collect();
        if chars.len() > 12 {
            let head: String = chars[..6].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            self.instrument_address.clone()
        }
    }
}

/// `pnl / basis * 100`, or zero when there is no basis.
pub fn pnl_percentage(pnl: Decimal, basis: Decimal) -> Decimal {
    if basis > Decimal::ZERO {
        pnl / basis * dec!(100)
    } else {
        Decimal::ZERO
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::open_position;
    use super::*;

    #[test]
    fn test_short_address() {
        let position = open_position("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", dec!(10), 1);
        assert_eq!(position.short_address(), "DezXAZ...B263");

        let position = open_position("ädrëss-wïth-ümlauts", dec!(10), 1);
        assert_eq!(position.short_address(), "ädrëss...auts");

        let position = open_position("short", dec!(10), 1);
        assert_eq!(position.short_address(), "short");
    }

    #[test]
    fn test_revalue_profit_and_loss() {
        let mut position = open_position("addr", dec!(10), 1);

        position.revalue(dec!(0.015));
        assert_eq!(position.current_value_usd, dec!(15));
        assert_eq!(position.pnl_usd, dec!(5));
        assert_eq!(position.pnl_percentage, dec!(50));

        position.revalue(dec!(0.008));
        assert_eq!(position.pnl_usd, dec!(-2));
        assert_eq!(position.pnl_percentage, dec!(-20));
        assert!(position.is_open());
    }

    #[test]
    fn test_revalue_at_entry_price_is_flat_with_inexact_price() {
        let mut position = open_position("addr", dec!(10), 1);
        position.token_amount = dec!(3);
        position.entry_price_usd = dec!(10) / dec!(3);

        position.revalue(position.entry_price_usd);
        assert_eq!(position.pnl_usd, Decimal::ZERO);
        assert_eq!(position.pnl_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_zero_basis_percentage() {
        assert_eq!(pnl_percentage(dec!(5), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_status_round_trip_and_terminal() {
        assert_eq!("failed".parse::<PositionStatus>(), Ok(PositionStatus::Failed));
        assert!(PositionStatus::Closed.is_terminal());
        assert!(!PositionStatus::Open.is_terminal());
        assert!("pending".parse::<PositionStatus>().is_err());
    }
}
