#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for memescan, a pay-per-scan token risk analysis client.
//!
//! A scan is bought on-chain with a stablecoin and then exchanged, using the
//! purchase transaction hash as a receipt, for a risk report produced by an
//! off-chain analysis backend. This crate holds everything that does not depend
//! on a concrete chain client or HTTP stack:
//!
//! - [`chain`] - Chain metadata and the registry of supported networks
//! - [`proto`] - Scan tiers, prices, receipts, reports and history records
//! - [`amount`] - Conversion between USD prices and token base units
//! - [`wallet`] - The injected wallet boundary and the session built on it
//! - [`gateway`] - Payment token and purchase contract boundaries
//! - [`analysis`] - The analysis backend boundary
//! - [`history`] - Durable, capped scan history
//! - [`orchestrator`] - The scan purchase state machine
//!
//! Chain-specific implementations live in `memescan-evm`, the HTTP backend
//! client in `memescan-http`.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod analysis;
pub mod chain;
pub mod error;
pub mod gateway;
pub mod history;
pub mod orchestrator;
pub mod proto;
pub mod timestamp;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;
