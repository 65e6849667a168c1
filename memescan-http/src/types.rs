//! Response documents of the informational endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /api/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformStats {
    /// Scans performed across all users.
    pub total_scans: u64,
    /// Scan count per risk level.
    #[serde(default)]
    pub risk_distribution: BTreeMap<String, u64>,
}

/// Spot price of one asset, keyed by asset id in [`CryptoPrices`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CryptoPrice {
    /// Price in US dollars.
    pub usd: f64,
    /// Change over the last 24 hours, in percent.
    #[serde(default)]
    pub usd_24h_change: Option<f64>,
}

/// `GET /api/crypto-prices`.
pub type CryptoPrices = BTreeMap<String, CryptoPrice>;

/// One entry of `GET /api/trending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingToken {
    /// Token name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Contract address, when the backend knows it.
    #[serde(default)]
    pub address: Option<String>,
    /// Risk classification as reported by the backend.
    #[serde(default)]
    pub risk_level: Option<String>,
    /// Signed 24h price change, e.g. `+12.5%`.
    #[serde(default)]
    pub price_change_24h: Option<String>,
    /// Formatted 24h volume.
    #[serde(default)]
    pub volume_24h: Option<String>,
}

/// The backend wraps some payloads in `{"data": ..}` or `{"trending": ..}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Data { data: T },
    Trending { trending: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Data { data } => data,
            Self::Trending { trending } => trending,
            Self::Bare(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prices_accept_envelope_and_bare() {
        let wrapped: Envelope<CryptoPrices> = serde_json::from_value(json!({
            "data": { "bitcoin": { "usd": 64000.5, "usd_24h_change": -1.25 } }
        }))
        .unwrap();
        let bare: Envelope<CryptoPrices> = serde_json::from_value(json!({
            "bitcoin": { "usd": 64000.5, "usd_24h_change": -1.25 }
        }))
        .unwrap();
        assert_eq!(wrapped.into_inner(), bare.into_inner());
    }

    #[test]
    fn trending_accepts_named_list() {
        let parsed: Envelope<Vec<TrendingToken>> = serde_json::from_value(json!({
            "trending": [{ "name": "Pepe", "symbol": "PEPE", "risk_level": "HIGH" }]
        }))
        .unwrap();
        let tokens = parsed.into_inner();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].risk_level.as_deref(), Some("HIGH"));
        assert!(tokens[0].address.is_none());
    }
}
