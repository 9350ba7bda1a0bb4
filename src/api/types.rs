//! Wire types for the whale-watch transaction feed.

use serde::{Deserialize, Serialize};

use crate::models::RawSignal;

/// Response from `/whalewatch/transactions/list`.
///
/// Entries stay as raw JSON so one malformed transaction does not fail the page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

/// One whale transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedTransaction {
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub trade_size: String,
    #[serde(default)]
    pub trade_amount_rounded: f64,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub token_market_cap: f64,
    #[serde(default)]
    pub is_token_first_seen: bool,
    #[serde(default)]
    pub swap_token: FeedSwapToken,
}

/// Token traded in a whale transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSwapToken {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub token_address: String,
    #[serde(default = "unknown_risk")]
    pub rugcheck_status: String,
    #[serde(default)]
    pub logo_url: String,
}

impl Default for FeedSwapToken {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            symbol: String::new(),
            token_address: String::new(),
            rugcheck_status: unknown_risk(),
            logo_url: String::new(),
        }
    }
}

fn unknown_risk() -> String {
    "unknown".to_string()
}

impl From<FeedTransaction> for RawSignal {
    fn from(tx: FeedTransaction) -> Self {
        let token = tx.swap_token;
        RawSignal {
            id: tx.id,
            timestamp: tx.timestamp,
            direction: tx.transaction_type,
            instrument_id: token.id,
            name: token.name,
            symbol: token.symbol,
            address: token.token_address,
            size_bucket: tx.trade_size,
            trade_amount: tx.trade_amount_rounded,
            win_rate: tx.win_rate,
            market_cap: tx.token_market_cap,
            risk_classification: token.rugcheck_status,
            first_seen: tx.is_token_first_seen,
            logo_url: token.logo_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_transaction_maps_to_raw_signal() {
        let json = r#"{
            "id": "tx-1",
            "timestamp": "2024-05-01T10:00:00Z",
            "transaction_type": "buy",
            "trade_size": "large",
            "trade_amount_rounded": 2500,
            "win_rate": 72.5,
            "token_market_cap": 45000000,
            "is_token_first_seen": true,
            "swap_token": {
                "id": "token_wif",
                "name": "dogwifhat",
                "symbol": "WIF",
                "token_address": "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm",
                "rugcheck_status": "good"
            }
        }"#;

        let tx: FeedTransaction = serde_json::from_str(json).unwrap();
        let raw = RawSignal::from(tx);

        assert_eq!(raw.id, "tx-1");
        assert_eq!(raw.direction, "buy");
        assert_eq!(raw.symbol, "WIF");
        assert_eq!(raw.address, "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm");
        assert_eq!(raw.trade_amount, 2500.0);
        assert_eq!(raw.risk_classification, "good");
        assert!(raw.first_seen);
        assert!(raw.logo_url.is_empty());
    }

    #[test]
    fn test_missing_swap_token_defaults_to_unknown_risk() {
        let tx: FeedTransaction = serde_json::from_str(r#"{"id": "tx-2"}"#).unwrap();
        let raw = RawSignal::from(tx);
        assert_eq!(raw.risk_classification, "unknown");
        assert!(raw.address.is_empty());
    }
}
