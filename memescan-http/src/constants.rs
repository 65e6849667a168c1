//! Backend endpoint paths and headers.

/// Header carrying the optional backend API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Backend used when none is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5001";

/// `POST` a paid analysis request.
pub const ANALYZE_PATH: &str = "./api/analyze";

/// `GET` platform-wide scan statistics.
pub const STATS_PATH: &str = "./api/stats";

/// `GET` spot prices of major assets.
pub const CRYPTO_PRICES_PATH: &str = "./api/crypto-prices";

/// `GET` currently trending tokens.
pub const TRENDING_PATH: &str = "./api/trending";
