//! Periodic market data polling.
//!
//! The feed refreshes crypto prices and trending tokens on every tick and
//! publishes the latest [`MarketSnapshot`] through a `watch` channel. A failed
//! refresh keeps the previous values. The task stops when its
//! [`CancellationToken`] is cancelled.

use std::time::Duration;

use memescan::timestamp::UnixTimestamp;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::BackendClient;
use crate::error::BackendClientError;
use crate::types::{CryptoPrices, TrendingToken};

/// Latest known market data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    /// Spot prices keyed by asset id.
    pub prices: CryptoPrices,
    /// Trending tokens.
    pub trending: Vec<TrendingToken>,
    /// When any part of the snapshot last changed.
    pub updated_at: Option<UnixTimestamp>,
}

/// A background task polling the backend's market endpoints.
#[derive(Debug, Clone)]
pub struct MarketFeed {
    client: BackendClient,
    period: Duration,
}

impl MarketFeed {
    /// Default refresh period.
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);

    /// Creates a feed using [`Self::DEFAULT_PERIOD`].
    #[must_use]
    pub const fn new(client: BackendClient) -> Self {
        Self {
            client,
            period: Self::DEFAULT_PERIOD,
        }
    }

    /// Overrides the refresh period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Starts polling immediately, then once per period, until `cancel` fires.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (watch::Receiver<MarketSnapshot>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(MarketSnapshot::default());
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => self.refresh(&tx).await,
                }
            }
            #[cfg(feature = "telemetry")]
            tracing::debug!("Market feed stopped");
        });
        (rx, handle)
    }

    async fn refresh(&self, tx: &watch::Sender<MarketSnapshot>) {
        let (prices, trending) = tokio::join!(self.client.crypto_prices(), self.client.trending());
        let prices = prices
            .inspect_err(|err| log_failure("crypto prices", err))
            .ok();
        let trending = trending
            .inspect_err(|err| log_failure("trending tokens", err))
            .ok();
        if prices.is_none() && trending.is_none() {
            return;
        }
        tx.send_modify(|snapshot| {
            if let Some(prices) = prices {
                snapshot.prices = prices;
            }
            if let Some(trending) = trending {
                snapshot.trending = trending;
            }
            snapshot.updated_at = Some(UnixTimestamp::now());
        });
    }
}

#[cfg(feature = "telemetry")]
fn log_failure(what: &str, err: &BackendClientError) {
    tracing::warn!(error = %err, "Failed to refresh {what}");
}

#[cfg(not(feature = "telemetry"))]
fn log_failure(_what: &str, _err: &BackendClientError) {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn first_tick_publishes_snapshot_and_cancel_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/crypto-prices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bitcoin": { "usd": 64000.0, "usd_24h_change": 1.0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/trending"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = BackendClient::try_from(server.uri()).unwrap();
        let cancel = CancellationToken::new();
        let (mut rx, handle) = MarketFeed::new(client).spawn(cancel.clone());

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.prices["bitcoin"].usd, 64000.0);
        assert!(snapshot.trending.is_empty());
        assert!(snapshot.updated_at.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failed_refresh_publishes_nothing() {
        let server = MockServer::start().await;
        let client = BackendClient::try_from(server.uri()).unwrap();
        let cancel = CancellationToken::new();
        let (rx, handle) = MarketFeed::new(client)
            .with_period(Duration::from_millis(10))
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!rx.has_changed().unwrap());

        cancel.cancel();
        handle.await.unwrap();
    }
}
