//! A [`memescan::analysis::AnalysisClient`] that talks to the analysis backend over HTTP.
//!
//! [`BackendClient`] handles the `/api/analyze`, `/api/stats`,
//! `/api/crypto-prices` and `/api/trending` endpoints.
//!
//! ## Error Handling
//!
//! A 4xx answer to `/api/analyze` means the backend looked at the request and
//! refused it (for example because the transaction hash was already used);
//! it surfaces as [`BackendClientError::Rejected`] with the message from the
//! backend's `{"error": "..."}` document. Timeouts, transport failures, 5xx
//! answers and undecodable bodies are reported as the other variants, all of
//! which are transient from the caller's point of view.

use std::fmt::Display;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use memescan::analysis::{AnalysisClient, AnalysisError, AnalysisRequest};
use memescan::proto::ScanReport;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

use crate::constants::{
    ANALYZE_PATH, API_KEY_HEADER, CRYPTO_PRICES_PATH, DEFAULT_BACKEND_URL, STATS_PATH,
    TRENDING_PATH,
};
use crate::error::BackendClientError;
use crate::types::{CryptoPrices, Envelope, PlatformStats, TrendingToken};

/// Error document returned by the backend.
#[derive(Debug, Deserialize)]
struct ErrorDocument {
    error: String,
}

/// A client for the memescan analysis backend.
#[derive(Clone)]
pub struct BackendClient {
    base_url: Url,
    analyze_url: Url,
    stats_url: Url,
    crypto_prices_url: Url,
    trending_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./api/analyze` URL.
    #[must_use]
    pub const fn analyze_url(&self) -> &Url {
        &self.analyze_url
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a new [`BackendClient`] from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`BackendClientError::UrlParse`] if an endpoint URL cannot be built.
    pub fn try_new(base_url: Url) -> Result<Self, BackendClientError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|source| BackendClientError::UrlParse { context, source })
        };
        let analyze_url = join(ANALYZE_PATH, "Failed to construct ./api/analyze URL")?;
        let stats_url = join(STATS_PATH, "Failed to construct ./api/stats URL")?;
        let crypto_prices_url =
            join(CRYPTO_PRICES_PATH, "Failed to construct ./api/crypto-prices URL")?;
        let trending_url = join(TRENDING_PATH, "Failed to construct ./api/trending URL")?;
        Ok(Self {
            base_url,
            analyze_url,
            stats_url,
            crypto_prices_url,
            trending_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// A client for [`DEFAULT_BACKEND_URL`].
    ///
    /// # Errors
    ///
    /// Never fails in practice; the default URL is valid.
    pub fn try_default() -> Result<Self, BackendClientError> {
        Self::try_from(DEFAULT_BACKEND_URL)
    }

    /// Sends `key` in the `X-API-Key` header of every request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendClientError::InvalidHeader`] if the key is not a valid header value.
    pub fn with_api_key(mut self, key: &str) -> Result<Self, BackendClientError> {
        let mut value =
            HeaderValue::from_str(key).map_err(|_| BackendClientError::InvalidHeader {
                context: API_KEY_HEADER,
            })?;
        value.set_sensitive(true);
        self.headers
            .insert(HeaderName::from_static("x-api-key"), value);
        Ok(self)
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a `POST /api/analyze` request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendClientError::Rejected`] when the backend refuses the
    /// request, and another variant when it cannot be reached or answered badly.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "memescan.backend.analyze",
            skip_all,
            fields(
                tx = %request.tx_hash,
                scan_type = %request.scan_type,
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty
            ),
            err
        )
    )]
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<ScanReport, BackendClientError> {
        let context = "POST /api/analyze";
        let req = self.client.post(self.analyze_url.clone()).json(request);
        self.send_json(req, context).await
    }

    /// Sends a `GET /api/stats` request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendClientError`] if the request fails.
    pub async fn stats(&self) -> Result<PlatformStats, BackendClientError> {
        self.get_json(&self.stats_url, "GET /api/stats").await
    }

    /// Sends a `GET /api/crypto-prices` request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendClientError`] if the request fails.
    pub async fn crypto_prices(&self) -> Result<CryptoPrices, BackendClientError> {
        let envelope: Envelope<CryptoPrices> = self
            .get_json(&self.crypto_prices_url, "GET /api/crypto-prices")
            .await?;
        Ok(envelope.into_inner())
    }

    /// Sends a `GET /api/trending` request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendClientError`] if the request fails.
    pub async fn trending(&self) -> Result<Vec<TrendingToken>, BackendClientError> {
        let envelope: Envelope<Vec<TrendingToken>> = self
            .get_json(&self.trending_url, "GET /api/trending")
            .await?;
        Ok(envelope.into_inner())
    }

    async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, BackendClientError>
    where
        R: DeserializeOwned,
    {
        let req = self.client.get(url.clone());
        self.send_json(req, context).await
    }

    /// Applies headers and timeout, sends, and decodes the response.
    ///
    /// `context` is a human-readable identifier used in tracing and error messages (e.g. `"GET /api/stats"`).
    async fn send_json<R>(
        &self,
        mut req: RequestBuilder,
        context: &'static str,
    ) -> Result<R, BackendClientError>
    where
        R: DeserializeOwned,
    {
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let result = match req.send().await {
            Ok(response) => read_response(response, context).await,
            Err(source) => Err(BackendClientError::Http { context, source }),
        };
        record_result_on_span(&result);
        result
    }
}

async fn read_response<R>(response: Response, context: &'static str) -> Result<R, BackendClientError>
where
    R: DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        return response
            .json::<R>()
            .await
            .map_err(|source| BackendClientError::JsonDeserialization { context, source });
    }
    let body = response
        .text()
        .await
        .map_err(|source| BackendClientError::ResponseBodyRead { context, source })?;
    if is_rejection(status) {
        if let Ok(doc) = serde_json::from_str::<ErrorDocument>(&body) {
            return Err(BackendClientError::Rejected {
                context,
                status,
                message: doc.error,
            });
        }
    }
    Err(BackendClientError::HttpStatus {
        context,
        status,
        body,
    })
}

/// Client errors other than throttling and timeouts.
///
/// Only counts as a rejection when the body is the backend's error document.
fn is_rejection(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::TOO_MANY_REQUESTS
        && status != StatusCode::REQUEST_TIMEOUT
}

impl AnalysisClient for BackendClient {
    async fn request_analysis(&self, request: &AnalysisRequest) -> Result<ScanReport, AnalysisError> {
        self.analyze(request).await.map_err(AnalysisError::from)
    }
}

impl TryFrom<&str> for BackendClient {
    type Error = BackendClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Endpoints are joined relative to the base, which needs a trailing slash.
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| BackendClientError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for BackendClient {
    type Error = BackendClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Records the outcome of a request on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::WARN, error = %err, "Request to backend failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, TxHash};
    use memescan::proto::{RiskLevel, ScanTier};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            address: Address::repeat_byte(0xaa),
            chain_id: 1,
            scan_type: ScanTier::Full,
            tx_hash: TxHash::repeat_byte(0x01),
            buyer_address: Address::repeat_byte(0xbb),
        }
    }

    fn report_json() -> serde_json::Value {
        json!({
            "risk_score": 72,
            "risk_level": "HIGH",
            "verdict": "Likely honeypot",
            "warnings": ["Sell tax above 20%"],
            "security": {
                "is_honeypot": true,
                "buy_tax": 1.0,
                "sell_tax": 25.0,
                "ownership_renounced": false
            },
            "recommendations": ["Avoid"],
            "holders": { "top10_percent": 81.2 }
        })
    }

    async fn client(server: &MockServer) -> BackendClient {
        BackendClient::try_from(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn analyze_posts_request_and_decodes_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .and(header("X-API-Key", "secret"))
            .and(body_json(serde_json::to_value(request()).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(report_json()))
            .expect(1)
            .mount(&server)
            .await;

        let report = client(&server)
            .await
            .with_api_key("secret")
            .unwrap()
            .request_analysis(&request())
            .await
            .unwrap();
        assert_eq!(report.risk_score, 72);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert!(report.extra.contains_key("holders"));
    }

    #[tokio::test]
    async fn client_error_is_a_rejection_with_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "Transaction already used" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).await.request_analysis(&request()).await.unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Rejected {
                status: Some(400),
                message: "Transaction already used".into(),
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server).await.request_analysis(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn throttling_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server).await.request_analysis(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transient(_)));
    }

    #[tokio::test]
    async fn undecodable_report_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).await.request_analysis(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transient(_)));
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(report_json())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .with_timeout(Duration::from_millis(50))
            .request_analysis(&request())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_backend_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = BackendClient::try_from(format!("http://{addr}"))
            .unwrap()
            .request_analysis(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Transient(_)));
    }

    #[tokio::test]
    async fn client_error_without_error_document_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stats"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = client.request_analysis(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transient(_)));
        assert!(err.is_retryable());
        let err = client.stats().await.unwrap_err();
        assert!(matches!(err, BackendClientError::HttpStatus { .. }));
    }

    #[tokio::test]
    async fn informational_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_scans": 1200,
                "risk_distribution": { "LOW": 700, "MEDIUM": 300, "HIGH": 200 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/crypto-prices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "ethereum": { "usd": 3100.0, "usd_24h_change": 2.5 } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/trending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "Dogwifhat", "symbol": "WIF" }
            ])))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let stats = client.stats().await.unwrap();
        assert_eq!(stats.total_scans, 1200);
        assert_eq!(stats.risk_distribution["HIGH"], 200);

        let prices = client.crypto_prices().await.unwrap();
        assert_eq!(prices["ethereum"].usd_24h_change, Some(2.5));

        let trending = client.trending().await.unwrap();
        assert_eq!(trending[0].symbol, "WIF");
    }

    #[test]
    fn base_url_is_normalized() {
        let client = BackendClient::try_from("https://api.memescan.example/v1//").unwrap();
        assert_eq!(
            client.analyze_url().as_str(),
            "https://api.memescan.example/v1/api/analyze"
        );
    }
}
