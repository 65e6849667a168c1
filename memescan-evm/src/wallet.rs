//! A wallet backed by a local private key.
//!
//! [`LocalWallet`] behaves like an injected browser wallet: it only knows the
//! chains it has been told about, switching to an unknown chain fails with
//! [`WalletError::UnrecognizedChain`], and every connection, chain
//! registration and transaction is confirmed through a [`SigningPrompt`]
//! before anything is signed.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use dashmap::DashMap;
use memescan::chain::{ChainId, ChainInfo};
use memescan::gateway::{GatewayError, MinedTransaction};
use memescan::wallet::{AddChainParams, WalletError, WalletEvent, WalletProvider};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use url::Url;

use crate::error::{classify_pending_error, classify_transport_error};

const EVENT_CAPACITY: usize = 16;

/// What the user is asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPrompt {
    /// Chain the transaction is sent on.
    pub chain_id: ChainId,
    /// Signing account.
    pub from: Address,
    /// Contract being called.
    pub to: Address,
    /// Human-readable summary of the call.
    pub summary: String,
    /// Raw calldata.
    pub calldata: Bytes,
}

/// Confirmation dialogs of the wallet.
///
/// Implementations may block; they are always invoked off the async runtime.
pub trait SigningPrompt: Send + Sync {
    /// Whether `account` may be exposed to the application.
    fn confirm_connection(&self, account: Address) -> bool;

    /// Whether the chain may be registered with the wallet.
    fn confirm_add_chain(&self, params: &AddChainParams) -> bool;

    /// Whether the transaction may be signed and sent.
    fn confirm_transaction(&self, prompt: &TransactionPrompt) -> bool;
}

/// A [`SigningPrompt`] that confirms everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl SigningPrompt for AutoApprove {
    fn confirm_connection(&self, _account: Address) -> bool {
        true
    }

    fn confirm_add_chain(&self, _params: &AddChainParams) -> bool {
        true
    }

    fn confirm_transaction(&self, _prompt: &TransactionPrompt) -> bool {
        true
    }
}

/// Errors building the wallet's RPC connections.
#[derive(Debug, thiserror::Error)]
pub enum LocalWalletError {
    /// None of the endpoints use HTTP(S).
    #[error("chain {0} has no usable HTTP RPC endpoint")]
    NoTransport(ChainId),
    /// An endpoint is not a valid URL.
    #[error("invalid RPC URL {url}: {source}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// A private-key wallet with one provider per registered chain.
pub struct LocalWallet {
    signer: PrivateKeySigner,
    providers: DashMap<ChainId, DynProvider>,
    active_chain: AtomicU64,
    authorized: AtomicBool,
    prompt: Arc<dyn SigningPrompt>,
    events: broadcast::Sender<WalletEvent>,
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.signer.address())
            .field("active_chain", &self.active_chain())
            .field("authorized", &self.authorized.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl LocalWallet {
    /// Creates a wallet that knows no chains yet.
    #[must_use]
    pub fn new(signer: PrivateKeySigner, prompt: Arc<dyn SigningPrompt>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            signer,
            providers: DashMap::new(),
            active_chain: AtomicU64::new(0),
            authorized: AtomicBool::new(false),
            prompt,
            events,
        }
    }

    /// Creates an RPC client from HTTP endpoint URLs with optional per-endpoint rate limits.
    ///
    /// Non-HTTP(S) URLs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LocalWalletError::NoTransport`] if no HTTP endpoint remains.
    pub fn rpc_client(
        chain_id: ChainId,
        endpoints: &[(Url, Option<u32>)],
    ) -> Result<RpcClient, LocalWalletError> {
        let transports = endpoints
            .iter()
            .filter_map(|(url, rate_limit)| {
                let scheme = url.scheme();
                if scheme != "http" && scheme != "https" {
                    return None;
                }
                #[cfg(feature = "telemetry")]
                tracing::info!(chain = chain_id, rpc_url = %url, rate_limit = ?rate_limit, "Using HTTP transport");
                let limit = rate_limit.unwrap_or(u32::MAX);
                let service = ServiceBuilder::new()
                    .layer(ThrottleLayer::new(limit))
                    .service(Http::new(url.clone()));
                Some(service)
            })
            .collect::<Vec<_>>();
        let count =
            NonZeroUsize::new(transports.len()).ok_or(LocalWalletError::NoTransport(chain_id))?;
        let fallback = ServiceBuilder::new()
            .layer(FallbackLayer::default().with_active_transport_count(count))
            .service(transports);
        Ok(RpcClient::new(fallback, false))
    }

    /// Registers a chain reachable through `endpoints`.
    ///
    /// The first registered chain becomes the active one.
    ///
    /// # Errors
    ///
    /// Returns [`LocalWalletError::NoTransport`] if no HTTP endpoint is given.
    pub fn register_rpc(
        &self,
        chain_id: ChainId,
        endpoints: &[(Url, Option<u32>)],
    ) -> Result<(), LocalWalletError> {
        let client = Self::rpc_client(chain_id, endpoints)?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_client(client)
            .erased();
        self.providers.insert(chain_id, provider);
        let _ = self
            .active_chain
            .compare_exchange(0, chain_id, Ordering::AcqRel, Ordering::Acquire);
        Ok(())
    }

    /// Registers a chain from its registry entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain's RPC URL is not a valid HTTP(S) URL.
    pub fn register_chain(&self, info: &ChainInfo) -> Result<(), LocalWalletError> {
        let url = parse_url(&info.rpc_url)?;
        self.register_rpc(info.chain_id, &[(url, None)])
    }

    /// The signing account.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The chain transactions are currently sent on, if any is registered.
    #[must_use]
    pub fn active_chain(&self) -> Option<ChainId> {
        match self.active_chain.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Whether the chain has been registered.
    #[must_use]
    pub fn knows_chain(&self, chain_id: ChainId) -> bool {
        self.providers.contains_key(&chain_id)
    }

    /// Provider for a registered chain.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Rpc`] if the chain is not registered.
    pub fn provider(&self, chain_id: ChainId) -> Result<DynProvider, GatewayError> {
        self.providers
            .get(&chain_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| GatewayError::Rpc(format!("no RPC endpoint for chain {chain_id}")))
    }

    /// Fails unless the wallet is on `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ChainMismatch`] when the wallet is elsewhere.
    pub fn ensure_active(&self, chain_id: ChainId) -> Result<(), GatewayError> {
        match self.active_chain() {
            Some(actual) if actual == chain_id => Ok(()),
            actual => Err(GatewayError::ChainMismatch {
                expected: chain_id,
                actual: actual.unwrap_or_default(),
            }),
        }
    }

    /// Asks for confirmation, then signs and sends a contract call.
    ///
    /// Returns as soon as the node accepted the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserRejected`] if the prompt is declined, or the
    /// classified RPC error if sending fails.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "memescan.wallet.send_call", skip_all, fields(chain = chain_id, to = %to), err)
    )]
    pub async fn send_call(
        &self,
        chain_id: ChainId,
        to: Address,
        calldata: Bytes,
        summary: String,
    ) -> Result<TxHash, GatewayError> {
        self.ensure_active(chain_id)?;
        let provider = self.provider(chain_id)?;
        let prompt = TransactionPrompt {
            chain_id,
            from: self.address(),
            to,
            summary,
            calldata: calldata.clone(),
        };
        if !self.ask(move |p| p.confirm_transaction(&prompt)).await {
            return Err(GatewayError::UserRejected);
        }
        let tx = TransactionRequest::default()
            .with_from(self.address())
            .with_to(to)
            .with_input(calldata);
        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let hash = *pending.tx_hash();
        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %hash, "Transaction sent");
        Ok(hash)
    }

    /// Waits, without a deadline, for one confirmation of `transaction`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Reverted`] if the transaction was mined but failed.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "memescan.wallet.wait_mined", skip(self), err)
    )]
    pub async fn wait_mined(
        &self,
        chain_id: ChainId,
        transaction: TxHash,
    ) -> Result<MinedTransaction, GatewayError> {
        let provider = self.provider(chain_id)?;
        let receipt = PendingTransactionBuilder::new(provider.root().clone(), transaction)
            .with_required_confirmations(1)
            .with_timeout(None)
            .get_receipt()
            .await
            .map_err(|e| classify_pending_error(&e))?;
        if !ReceiptResponse::status(&receipt) {
            return Err(GatewayError::Reverted {
                reason: None,
                transaction: Some(transaction),
            });
        }
        Ok(MinedTransaction {
            transaction_hash: transaction,
            block_number: ReceiptResponse::block_number(&receipt),
        })
    }

    /// Stops exposing the account until the next connection request.
    pub fn disconnect(&self) {
        if self.authorized.swap(false, Ordering::AcqRel) {
            let _ = self.events.send(WalletEvent::AccountsChanged(Vec::new()));
        }
    }

    async fn ask<F>(&self, question: F) -> bool
    where
        F: FnOnce(&dyn SigningPrompt) -> bool + Send + 'static,
    {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || question(prompt.as_ref()))
            .await
            .unwrap_or(false)
    }
}

impl WalletProvider for LocalWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let account = self.address();
        if !self.authorized.load(Ordering::Acquire) {
            if !self.ask(move |p| p.confirm_connection(account)).await {
                return Err(WalletError::UserRejected);
            }
            self.authorized.store(true, Ordering::Release);
            let _ = self.events.send(WalletEvent::AccountsChanged(vec![account]));
        }
        Ok(vec![account])
    }

    async fn chain_id(&self) -> Result<ChainId, WalletError> {
        self.active_chain()
            .ok_or_else(|| WalletError::Provider("no chain registered".to_owned()))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        if !self.knows_chain(chain_id) {
            return Err(WalletError::UnrecognizedChain(chain_id));
        }
        let previous = self.active_chain.swap(chain_id, Ordering::AcqRel);
        if previous != chain_id {
            #[cfg(feature = "telemetry")]
            tracing::info!(from = previous, to = chain_id, "Switched chain");
            let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
        }
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError> {
        let question = params.clone();
        if !self.ask(move |p| p.confirm_add_chain(&question)).await {
            return Err(WalletError::UserRejected);
        }
        let endpoints = params
            .rpc_urls
            .iter()
            .map(|raw| parse_url(raw).map(|url| (url, None)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| WalletError::Provider(e.to_string()))?;
        self.register_rpc(params.chain_id, &endpoints)
            .map_err(|e| WalletError::Provider(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

fn parse_url(raw: &str) -> Result<Url, LocalWalletError> {
    Url::parse(raw).map_err(|source| LocalWalletError::InvalidUrl {
        url: raw.to_owned(),
        source,
    })
}
