//! Trading configuration.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::RiskClass;

/// Entry filters, exit thresholds and sizing for copy trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    // === Entry Filters ===
    /// Minimum whale win rate (0-100)
    pub min_win_rate: f64,

    /// Minimum whale trade value in USD
    pub min_trade_amount: Decimal,

    /// Maximum token market cap in USD
    pub max_market_cap: Decimal,

    /// Risk classifications we are willing to buy
    pub allowed_risk_classifications: Vec<RiskClass>,

    // === Sizing ===
    /// Native currency spent per copy trade
    pub per_trade_size: Decimal,

    /// Maximum number of concurrently open positions
    pub max_positions: usize,

    // === Exit Rules ===
    /// Take profit in percent (50 = +50%)
    pub take_profit_pct: Decimal,

    /// Stop loss in percent (20 = -20%)
    pub stop_loss_pct: Decimal,

    // === Execution ===
    /// Slippage tolerance in basis points
    pub slippage_budget_bps: u32,

    /// Native currency reserved for priority fees per trade
    pub priority_fee_budget: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_win_rate: 60.0,
            min_trade_amount: dec!(1000),
            max_market_cap: dec!(100000000), // $100M
            allowed_risk_classifications: vec![RiskClass::Good, RiskClass::Warning],
            per_trade_size: dec!(0.1),       // 0.1 SOL
            max_positions: 5,
            take_profit_pct: dec!(50),
            stop_loss_pct: dec!(20),
            slippage_budget_bps: 300,        // 3%
            priority_fee_budget: dec!(0.001),
        }
    }
}

impl TradingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    /// Defaults with any variable present in `env_map` applied on top.
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let allowed_risk_classifications = match env_map.get("ALLOWED_RISK_CLASSIFICATIONS") {
            Some(raw) => parse_risk_classes(raw)?,
            None => defaults.allowed_risk_classifications,
        };

        Ok(Self {
            min_win_rate: parse_or(&env_map, "MIN_WIN_RATE", defaults.min_win_rate)?,
            min_trade_amount: parse_or(&env_map, "MIN_TRADE_AMOUNT", defaults.min_trade_amount)?,
            max_market_cap: parse_or(&env_map, "MAX_MARKET_CAP", defaults.max_market_cap)?,
            allowed_risk_classifications,
            per_trade_size: parse_or(&env_map, "PER_TRADE_SIZE", defaults.per_trade_size)?,
            max_positions: parse_or(&env_map, "MAX_POSITIONS", defaults.max_positions)?,
            take_profit_pct: parse_or(&env_map, "TAKE_PROFIT_PERCENTAGE", defaults.take_profit_pct)?,
            stop_loss_pct: parse_or(&env_map, "STOP_LOSS_PERCENTAGE", defaults.stop_loss_pct)?,
            slippage_budget_bps: parse_or(&env_map, "SLIPPAGE_BPS", defaults.slippage_budget_bps)?,
            priority_fee_budget: parse_or(&env_map, "PRIORITY_FEE", defaults.priority_fee_budget)?,
        })
    }

    /// Capital needed to open one position.
    pub fn required_capital(&self) -> Decimal {
        self.per_trade_size + self.priority_fee_budget
    }

    pub fn allows_risk(&self, risk: RiskClass) -> bool {
        self.allowed_risk_classifications.contains(&risk)
    }

    pub fn allowed_risk_labels(&self) -> Vec<&'static str> {
        self.allowed_risk_classifications.iter().map(|r| r.as_str()).collect()
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("cannot parse '{}'", raw))
        }),
        None => Ok(default),
    }
}

fn parse_risk_classes(raw: &str) -> Result<Vec<RiskClass>, ConfigError> {
    let mut classes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let class = part.parse::<RiskClass>().map_err(|e| {
            ConfigError::InvalidValue("ALLOWED_RISK_CLASSIFICATIONS".to_string(), e.to_string())
        })?;
        if !classes.contains(&class) {
            classes.push(class);
        }
    }
    Ok(classes)
}

impl std::fmt::Display for TradingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Trading Config ===")?;
        writeln!(f, "Min Win Rate:      {}%", self.min_win_rate)?;
        writeln!(f, "Min Trade Amount:  ${}", self.min_trade_amount)?;
        writeln!(f, "Max Market Cap:    ${}", self.max_market_cap)?;
        writeln!(f, "Allowed Risk:      {}", self.allowed_risk_labels().join(", "))?;
        writeln!(f, "Per Trade Size:    {} SOL", self.per_trade_size)?;
        writeln!(f, "Max Positions:     {}", self.max_positions)?;
        writeln!(f, "Take Profit:       {}%", self.take_profit_pct)?;
        writeln!(f, "Stop Loss:         {}%", self.stop_loss_pct)?;
        writeln!(f, "Slippage:          {} bps", self.slippage_budget_bps)?;
        writeln!(f, "Priority Fee:      {} SOL", self.priority_fee_budget)?;
        Ok(())
    }
}
