//! HTTP client for the whale-watch transaction feed.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::types::{FeedResponse, FeedTransaction};
use super::SignalSource;
use crate::error::FeedError;
use crate::models::RawSignal;

pub const DEFAULT_FEED_URL: &str = "https://swap-api.assetdash.com/api/api_v5";
const TRANSACTIONS_PATH: &str = "/whalewatch/transactions/list";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the whale transaction feed (read-only).
#[derive(Debug, Clone)]
pub struct WhaleFeedClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    max_retry_elapsed: Duration,
}

impl WhaleFeedClient {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.trim().is_empty()),
            max_retry_elapsed: Duration::from_secs(30),
        })
    }

    /// Cap on the total time spent retrying one request.
    pub fn with_max_retry_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_retry_elapsed = elapsed;
        self
    }

    /// Fetch one page of transactions.
    pub async fn fetch_page(&self, page: u32, limit: u32) -> Result<Vec<RawSignal>, FeedError> {
        let url = format!("{}{}", self.base_url, TRANSACTIONS_PATH);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        };

        debug!(url = %url, page, limit, "Fetching whale transactions");

        let body = retry(backoff, || async {
            let mut request = self
                .client
                .get(&url)
                .query(&[("page", page), ("limit", limit)]);
            if let Some(token) = &self.api_token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| backoff::Error::transient(FeedError::Network(e.to_string())))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Whale feed rate limited, backing off");
                return Err(backoff::Error::transient(FeedError::RateLimited));
            }
            if status == StatusCode::UNAUTHORIZED {
                return Err(backoff::Error::permanent(FeedError::Unauthorized));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(FeedError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(FeedError::Http {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<FeedResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(FeedError::Parse(e.to_string())))
        })
        .await?;

        let signals = parse_transactions(body);
        info!(count = signals.len(), "Fetched whale transactions");
        Ok(signals)
    }
}

/// Map feed entries to raw signals, skipping ones that do not deserialize.
fn parse_transactions(body: FeedResponse) -> Vec<RawSignal> {
    body.transactions
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<FeedTransaction>(value) {
            Ok(tx) => Some(RawSignal::from(tx)),
            Err(e) => {
                warn!(error = %e, "Failed to parse transaction");
                None
            }
        })
        .collect()
}

#[async_trait]
impl SignalSource for WhaleFeedClient {
    async fn fetch_signals(&self, limit: u32) -> Result<Vec<RawSignal>> {
        self.fetch_page(1, limit)
            .await
            .context("Failed to fetch whale transactions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_entries_are_skipped() {
        let body: FeedResponse = serde_json::from_str(
            r#"{"transactions": [
                {"id": "tx-1", "transaction_type": "buy", "win_rate": 80},
                {"id": 42},
                "not an object",
                {"id": "tx-2", "transaction_type": "sell"}
            ]}"#,
        )
        .unwrap();

        let signals = parse_transactions(body);
        let ids: Vec<&str> = signals.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["tx-1", "tx-2"]);
        assert_eq!(signals[0].win_rate, 80.0);
    }

    #[test]
    fn test_missing_transactions_key() {
        let body: FeedResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_transactions(body).is_empty());
    }

    #[test]
    fn test_base_url_and_token_normalized() {
        let client = WhaleFeedClient::new("https://example.com/api/", Some("  ".to_string())).unwrap();
        assert_eq!(client.base_url, "https://example.com/api");
        assert!(client.api_token.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_feed_errors() {
        let client = WhaleFeedClient::new("http://127.0.0.1:9", None)
            .unwrap()
            .with_max_retry_elapsed(Duration::from_millis(10));

        let result = client.fetch_page(1, 5).await;
        assert!(matches!(result, Err(FeedError::Network(_))));
    }
}
