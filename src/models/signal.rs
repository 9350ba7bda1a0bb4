//! Whale activity signals: the raw wire record and its validated form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Direction of the whale's trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            _ => Err(ValidationError::UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative size of the whale trade as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
        }
    }

    /// Contribution to the quality score before weighting.
    pub fn score(&self) -> f64 {
        match self {
            SizeBucket::Large => 1.0,
            SizeBucket::Medium => 0.7,
            SizeBucket::Small => 0.3,
        }
    }
}

impl FromStr for SizeBucket {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(SizeBucket::Small),
            "medium" => Ok(SizeBucket::Medium),
            "large" => Ok(SizeBucket::Large),
            _ => Err(ValidationError::UnknownSizeBucket(s.to_string())),
        }
    }
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token safety classification attached to the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    Good,
    Warning,
    Danger,
    Unknown,
}

impl RiskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskClass::Good => "good",
            RiskClass::Warning => "warning",
            RiskClass::Danger => "danger",
            RiskClass::Unknown => "unknown",
        }
    }

    /// Contribution to the quality score before weighting.
    pub fn score(&self) -> f64 {
        match self {
            RiskClass::Good => 1.0,
            RiskClass::Warning => 0.6,
            RiskClass::Danger | RiskClass::Unknown => 0.0,
        }
    }
}

impl FromStr for RiskClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "good" => Ok(RiskClass::Good),
            "warning" => Ok(RiskClass::Warning),
            "danger" => Ok(RiskClass::Danger),
            "unknown" => Ok(RiskClass::Unknown),
            _ => Err(ValidationError::UnknownRiskClass(s.to_string())),
        }
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal as delivered by a signal source, before any validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSignal {
    pub id: String,
    pub timestamp: String,
    pub direction: String,
    #[serde(default)]
    pub instrument_id: String,
    #[serde(default)]
    pub name: String,
    pub symbol: String,
    pub address: String,
    pub size_bucket: String,
    pub trade_amount: f64,
    pub win_rate: f64,
    pub market_cap: f64,
    pub risk_classification: String,
    #[serde(default)]
    pub first_seen: bool,
    #[serde(default)]
    pub logo_url: String,
}

/// Validated, immutable whale signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier from the feed
    pub id: String,

    /// When the whale trade happened
    pub timestamp: DateTime<Utc>,

    pub direction: Direction,

    /// Feed-specific instrument identifier
    pub instrument_id: String,

    pub symbol: String,

    pub name: String,

    /// On-chain token address; the ledger key
    pub instrument_address: String,

    pub size_bucket: SizeBucket,

    /// Whale trade value in USD
    pub trade_amount: Decimal,

    /// Whale historical win rate (0-100)
    pub win_rate: f64,

    /// Token market cap in USD
    pub market_cap: Decimal,

    pub risk_classification: RiskClass,

    /// First time the feed has seen this token
    pub first_seen: bool,

    #[serde(default)]
    pub logo_url: String,
}

impl TryFrom<&RawSignal> for Signal {
    type Error = ValidationError;

    fn try_from(raw: &RawSignal) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err(ValidationError::MissingId);
        }
        if raw.address.trim().is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        if raw.symbol.trim().is_empty() {
            return Err(ValidationError::MissingSymbol);
        }

        // NaN fails the range check as well
        if !(0.0..=100.0).contains(&raw.win_rate) {
            return Err(ValidationError::WinRateOutOfRange(raw.win_rate));
        }
        let trade_amount = non_negative_decimal(raw.trade_amount)
            .ok_or(ValidationError::InvalidTradeAmount(raw.trade_amount))?;
        let market_cap = non_negative_decimal(raw.market_cap)
            .ok_or(ValidationError::InvalidMarketCap(raw.market_cap))?;

        let direction = raw.direction.parse()?;
        let size_bucket = raw.size_bucket.parse()?;
        let risk_classification = raw.risk_classification.parse()?;
        let timestamp = parse_timestamp(&raw.timestamp)?;

        Ok(Self {
            id: raw.id.clone(),
            timestamp,
            direction,
            instrument_id: raw.instrument_id.clone(),
            symbol: raw.symbol.clone(),
            name: raw.name.clone(),
            instrument_address: raw.address.clone(),
            size_bucket,
            trade_amount,
            win_rate: raw.win_rate,
            market_cap,
            risk_classification,
            first_seen: raw.first_seen,
            logo_url: raw.logo_url.clone(),
        })
    }
}

fn non_negative_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Decimal::try_from(value).ok()
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::BadTimestamp(value.to_string()))
}
