//! Command-line client for paid token risk scans.
//!
//! # Modules
//!
//! - [`config`] - JSON configuration with environment variable expansion
//! - [`app`] - assembly of wallet, gateways, backend client and history
//! - [`prompt`] - terminal confirmation dialogs for the local wallet
//! - [`render`] - plain-text output
//! - [`util`] - signal handling

pub mod app;
pub mod config;
pub mod prompt;
pub mod render;
pub mod util;
