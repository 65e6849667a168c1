#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM support for memescan.
//!
//! Implements the chain-facing boundaries of the `memescan` crate on top of
//! alloy:
//!
//! - [`wallet::LocalWallet`] - a [`memescan::wallet::WalletProvider`] backed by a
//!   local private key, with a pluggable [`wallet::SigningPrompt`] standing in
//!   for the wallet's confirmation dialogs
//! - [`gateway::Erc20PaymentToken`] - the stablecoin used to pay
//! - [`gateway::ScanPurchaseContract`] - the contract that sells scans
//! - [`networks`] - chains, tokens and contract deployments known out of the box
//! - [`error`] - mapping of JSON-RPC failures onto gateway errors
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod contract;
pub mod error;
pub mod gateway;
pub mod networks;
pub mod wallet;
