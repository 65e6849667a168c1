//! Client configuration.
//!
//! Loads configuration from a JSON file. String values may reference
//! environment variables with `$VAR` or `${VAR}`; unresolved references are
//! left as-is.
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "backend_url": "https://api.memescan.example",
//!   "api_key": "$MEMESCAN_API_KEY",
//!   "private_key": "${WALLET_KEY}",
//!   "settlement_chain": 137,
//!   "payment_token": "usdc",
//!   "approval": { "capped": 10 },
//!   "chains": {
//!     "137": { "rpc_url": "https://polygon.example/rpc/$RPC_TOKEN" }
//!   }
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `memescan.json`)
//! - `MEMESCAN_BACKEND_URL` - Overrides `backend_url`
//! - `MEMESCAN_API_KEY` - Overrides `api_key`
//! - `MEMESCAN_PRIVATE_KEY` - Overrides `private_key`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use memescan::chain::{ChainId, ChainNotConfigured, ChainRegistry};
use memescan::orchestrator::{ApprovalPolicy, OrchestratorConfig};
use memescan_evm::networks::{DEFAULT_PAYMENT_TOKEN, SETTLEMENT_CHAIN, known_registry};
use memescan_http::constants::DEFAULT_BACKEND_URL;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "memescan.json";

/// Errors loading or applying the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The configuration file.
        path: PathBuf,
        /// The read failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// No private key was configured.
    #[error("no private key configured (set private_key or MEMESCAN_PRIVATE_KEY)")]
    MissingPrivateKey,
    /// The private key references an unset variable or is malformed.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    /// A chain override names a chain without enough data to add it.
    #[error("chain {0} is unknown; an override for it needs name and rpc_url")]
    IncompleteChain(ChainId),
    /// The settlement chain is not in the registry.
    #[error("settlement chain {0} is not supported")]
    UnknownSettlementChain(ChainId),
    /// The settlement chain lacks a purchase contract or the payment token.
    #[error("settlement chain cannot be used: {0}")]
    SettlementNotConfigured(#[from] ChainNotConfigured),
}

/// How much allowance to grant the purchase contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalConfig {
    /// Approve the maximum amount once.
    #[default]
    Unlimited,
    /// Approve this many purchases at the current price.
    Capped(u32),
}

impl From<ApprovalConfig> for ApprovalPolicy {
    fn from(config: ApprovalConfig) -> Self {
        match config {
            ApprovalConfig::Unlimited => Self::Unlimited,
            ApprovalConfig::Capped(multiple) => Self::Capped { multiple },
        }
    }
}

/// Per-chain overrides of the built-in network table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOverride {
    /// Display name; required for chains not built in.
    pub name: Option<String>,
    /// Native currency symbol.
    pub native_symbol: Option<String>,
    /// JSON-RPC endpoint.
    pub rpc_url: Option<String>,
    /// Block explorer base URL.
    pub explorer_base_url: Option<String>,
    /// Purchase contract deployment.
    pub purchase_contract: Option<Address>,
    /// Additional or replacement payment tokens by key.
    pub payment_tokens: BTreeMap<String, Address>,
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemescanConfig {
    /// Analysis backend base URL.
    pub backend_url: String,
    /// Optional backend API key.
    pub api_key: Option<String>,
    /// Hex private key of the paying account.
    pub private_key: Option<String>,
    /// Chain purchases are paid on.
    pub settlement_chain: ChainId,
    /// Payment token key on the settlement chain.
    pub payment_token: String,
    /// Directory holding the scan history.
    pub history_dir: PathBuf,
    /// Referral address passed to the purchase contract.
    pub referrer: Option<Address>,
    /// Allowance sizing.
    pub approval: ApprovalConfig,
    /// Timeout for backend requests, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Overrides keyed by chain id.
    pub chains: BTreeMap<ChainId, ChainOverride>,
}

impl Default for MemescanConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            api_key: None,
            private_key: None,
            settlement_chain: SETTLEMENT_CHAIN,
            payment_token: DEFAULT_PAYMENT_TOKEN.to_owned(),
            history_dir: PathBuf::from(".memescan"),
            referrer: None,
            approval: ApprovalConfig::default(),
            request_timeout_secs: None,
            chains: BTreeMap::new(),
        }
    }
}

impl MemescanConfig {
    /// Loads configuration from `path`, falling back to defaults when the file
    /// does not exist, then applies `MEMESCAN_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        let mut config = match content {
            Some(content) => Self::parse(&content, |name| std::env::var(name).ok())?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parses a JSON document, expanding variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is invalid.
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut raw: Value = serde_json::from_str(content)?;
        expand_strings(&mut raw, &lookup);
        Ok(serde_json::from_value(raw)?)
    }

    /// Applies `MEMESCAN_BACKEND_URL`, `MEMESCAN_API_KEY` and `MEMESCAN_PRIVATE_KEY`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MEMESCAN_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(key) = lookup("MEMESCAN_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(key) = lookup("MEMESCAN_PRIVATE_KEY") {
            self.private_key = Some(key);
        }
    }

    /// The built-in networks with this configuration's overrides applied.
    ///
    /// # Errors
    ///
    /// Fails if an override adds an incomplete chain, or if the settlement
    /// chain lacks a purchase contract or the configured payment token.
    pub fn registry(&self) -> Result<ChainRegistry, ConfigError> {
        let mut registry = known_registry();
        for (chain_id, patch) in &self.chains {
            match registry.by_chain_id_mut(*chain_id) {
                Some(info) => {
                    if let Some(name) = &patch.name {
                        info.name.clone_from(name);
                    }
                    if let Some(symbol) = &patch.native_symbol {
                        info.native_symbol.clone_from(symbol);
                    }
                    if let Some(rpc_url) = &patch.rpc_url {
                        info.rpc_url.clone_from(rpc_url);
                    }
                    if patch.explorer_base_url.is_some() {
                        info.explorer_base_url.clone_from(&patch.explorer_base_url);
                    }
                    if patch.purchase_contract.is_some() {
                        info.purchase_contract = patch.purchase_contract;
                    }
                    for (key, token) in &patch.payment_tokens {
                        info.payment_tokens.insert(key.to_ascii_lowercase(), *token);
                    }
                }
                None => {
                    let (Some(name), Some(rpc_url)) = (&patch.name, &patch.rpc_url) else {
                        return Err(ConfigError::IncompleteChain(*chain_id));
                    };
                    registry.insert(memescan::chain::ChainInfo {
                        chain_id: *chain_id,
                        name: name.clone(),
                        native_symbol: patch.native_symbol.clone().unwrap_or_else(|| "ETH".to_owned()),
                        rpc_url: rpc_url.clone(),
                        explorer_base_url: patch.explorer_base_url.clone(),
                        payment_tokens: patch
                            .payment_tokens
                            .iter()
                            .map(|(k, v)| (k.to_ascii_lowercase(), *v))
                            .collect(),
                        purchase_contract: patch.purchase_contract,
                    });
                }
            }
        }
        let settlement = registry
            .by_chain_id(self.settlement_chain)
            .ok_or(ConfigError::UnknownSettlementChain(self.settlement_chain))?;
        settlement.require_purchase_contract()?;
        settlement.require_payment_token(&self.payment_token)?;
        Ok(registry)
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            settlement_chain: self.settlement_chain,
            referrer: self.referrer.unwrap_or(Address::ZERO),
            approval: self.approval.into(),
        }
    }

    /// Backend request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// The paying account's signer.
    ///
    /// # Errors
    ///
    /// Fails if no key is configured, the key still references an unset
    /// variable, or it is not a valid secp256k1 key.
    pub fn signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        let key = self
            .private_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingPrivateKey)?;
        if key.starts_with('$') {
            return Err(ConfigError::InvalidPrivateKey(format!(
                "{key} is not set in the environment"
            )));
        }
        key.parse()
            .map_err(|e: alloy_signer_local::LocalSignerError| {
                ConfigError::InvalidPrivateKey(e.to_string())
            })
    }
}

/// Expands `$VAR` and `${VAR}` in every string of a JSON document.
fn expand_strings(value: &mut Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = expand_env_vars(s, lookup);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| expand_strings(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_strings(v, lookup)),
        _ => {}
    }
}

/// Expands `$VAR` and `${VAR}` patterns; unresolved variables are left as-is.
fn expand_env_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    static VAR: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("valid regex")
    });
    VAR.replace_all(input, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        lookup(name).unwrap_or_else(|| caps[0].to_owned())
    })
    .into_owned()
}
