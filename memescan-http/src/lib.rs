#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP access to the memescan analysis backend.
//!
//! - [`client::BackendClient`] - JSON client for `/api/analyze`, `/api/stats`,
//!   `/api/crypto-prices` and `/api/trending`; implements
//!   [`memescan::analysis::AnalysisClient`]
//! - [`feed::MarketFeed`] - periodic, cancellable polling of prices and trending tokens
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod client;
pub mod constants;
pub mod error;
pub mod feed;
pub mod types;
