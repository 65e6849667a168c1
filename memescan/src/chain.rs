//! Chain metadata and the registry of supported networks.
//!
//! Every chain memescan can talk to is described by a [`ChainInfo`]: display
//! metadata, the RPC endpoint used when the wallet has to register the chain,
//! the explorer used for transaction links, and the addresses of the accepted
//! payment tokens and of the scan purchase contract.
//!
//! The [`ChainRegistry`] is an immutable lookup table keyed by [`ChainId`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};

use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};

/// A numeric EIP-155 chain identifier (e.g., `137` for Polygon).
pub type ChainId = u64;

/// Static metadata for one supported chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    /// Numeric chain identifier.
    pub chain_id: ChainId,
    /// Human-readable network name.
    pub name: String,
    /// Symbol of the native gas currency.
    pub native_symbol: String,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Block explorer base URL, absent for chains without an explorer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_base_url: Option<String>,
    /// Accepted payment tokens keyed by lowercase token key (`usdc`, `usdt`).
    #[serde(default)]
    pub payment_tokens: BTreeMap<String, Address>,
    /// Address of the scan purchase contract, if deployed on this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_contract: Option<Address>,
}

impl ChainInfo {
    /// Looks up a payment token address by key, ignoring ASCII case.
    #[must_use]
    pub fn payment_token(&self, key: &str) -> Option<Address> {
        self.payment_tokens
            .get(&key.to_ascii_lowercase())
            .copied()
    }

    /// Returns the explorer link for a transaction, if the chain has an explorer.
    #[must_use]
    pub fn tx_url(&self, hash: &TxHash) -> Option<String> {
        self.explorer_base_url
            .as_deref()
            .map(|base| format!("{}/tx/{hash}", base.trim_end_matches('/')))
    }

    /// Returns the explorer link for an address, if the chain has an explorer.
    #[must_use]
    pub fn address_url(&self, address: &Address) -> Option<String> {
        self.explorer_base_url
            .as_deref()
            .map(|base| format!("{}/address/{address}", base.trim_end_matches('/')))
    }

    /// Returns the chain id as a `0x`-prefixed hex quantity, as wallets expect it.
    #[must_use]
    pub fn hex_chain_id(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Returns the purchase contract address, or an error naming the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ChainNotConfigured`] if no purchase contract is deployed.
    pub fn require_purchase_contract(&self) -> Result<Address, ChainNotConfigured> {
        self.purchase_contract
            .ok_or_else(|| ChainNotConfigured::new(self.chain_id, "purchase contract"))
    }

    /// Returns the payment token address for `key`, or an error naming the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ChainNotConfigured`] if the token is not accepted on this chain.
    pub fn require_payment_token(&self, key: &str) -> Result<Address, ChainNotConfigured> {
        self.payment_token(key)
            .ok_or_else(|| ChainNotConfigured::new(self.chain_id, "payment token"))
    }
}

impl Display for ChainInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}

/// A chain lacks a deployment that settlement requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chain {chain_id} has no {what} configured")]
pub struct ChainNotConfigured {
    /// The chain that was inspected.
    pub chain_id: ChainId,
    /// What is missing.
    pub what: &'static str,
}

impl ChainNotConfigured {
    const fn new(chain_id: ChainId, what: &'static str) -> Self {
        Self { chain_id, what }
    }
}

/// Registry of supported chains indexed by chain id.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry(HashMap<ChainId, ChainInfo>);

impl ChainRegistry {
    /// Creates a registry from a list of chains. Later entries replace earlier
    /// ones with the same chain id.
    #[must_use]
    pub fn new(chains: impl IntoIterator<Item = ChainInfo>) -> Self {
        Self(
            chains
                .into_iter()
                .map(|info| (info.chain_id, info))
                .collect(),
        )
    }

    /// Looks up a chain by id.
    #[must_use]
    pub fn by_chain_id(&self, chain_id: ChainId) -> Option<&ChainInfo> {
        self.0.get(&chain_id)
    }

    /// Returns whether the chain is known.
    #[must_use]
    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.0.contains_key(&chain_id)
    }

    /// Mutable access for applying configuration overrides before the registry is shared.
    pub fn by_chain_id_mut(&mut self, chain_id: ChainId) -> Option<&mut ChainInfo> {
        self.0.get_mut(&chain_id)
    }

    /// Inserts or replaces a chain.
    pub fn insert(&mut self, info: ChainInfo) {
        self.0.insert(info.chain_id, info);
    }

    /// All chains ordered by chain id.
    #[must_use]
    pub fn chains(&self) -> Vec<&ChainInfo> {
        let mut chains: Vec<_> = self.0.values().collect();
        chains.sort_by_key(|c| c.chain_id);
        chains
    }
}
