//! The injected wallet boundary and the session that tracks it.
//!
//! A [`WalletProvider`] is whatever holds the user's keys: a browser-style
//! injected provider, a hardware signer, or a local key with a terminal prompt.
//! It answers for the current account and chain, can be asked to switch or
//! register chains, and publishes [`WalletEvent`]s when the account or chain
//! changes behind our back.
//!
//! [`WalletSession`] owns the process-wide view of that wallet. It is cheap to
//! clone; all clones share one [`WalletState`].

use std::future::Future;
use std::sync::{Arc, RwLock};

use alloy_primitives::Address;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::chain::{ChainId, ChainInfo, ChainRegistry};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 16;

/// Decimals of every native currency registered through `add_chain`.
pub const NATIVE_CURRENCY_DECIMALS: u8 = 18;

/// A change reported by the wallet itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The exposed accounts changed. Empty means the wallet disconnected.
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain.
    ChainChanged(ChainId),
}

/// Errors surfaced by a wallet provider or the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// No wallet provider is available.
    #[error("no wallet available")]
    NoWallet,
    /// The wallet is available but no account is connected.
    #[error("wallet is not connected")]
    NotConnected,
    /// The user declined a wallet prompt.
    #[error("request rejected by user")]
    UserRejected,
    /// The wallet does not know the chain; it must be added first.
    #[error("chain {0} is not registered with the wallet")]
    UnrecognizedChain(ChainId),
    /// The chain is not in the chain registry.
    #[error("chain {0} is not supported")]
    UnsupportedChain(ChainId),
    /// Any other provider failure.
    #[error("wallet request failed: {0}")]
    Provider(String),
}

/// Parameters for registering a chain with a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddChainParams {
    /// Chain to register.
    pub chain_id: ChainId,
    /// Display name.
    pub chain_name: String,
    /// Native currency name and symbol.
    pub native_symbol: String,
    /// Native currency decimals.
    pub native_decimals: u8,
    /// RPC endpoints.
    pub rpc_urls: Vec<String>,
    /// Block explorer URLs.
    pub block_explorer_urls: Vec<String>,
}

impl From<&ChainInfo> for AddChainParams {
    fn from(info: &ChainInfo) -> Self {
        Self {
            chain_id: info.chain_id,
            chain_name: info.name.clone(),
            native_symbol: info.native_symbol.clone(),
            native_decimals: NATIVE_CURRENCY_DECIMALS,
            rpc_urls: vec![info.rpc_url.clone()],
            block_explorer_urls: info.explorer_base_url.iter().cloned().collect(),
        }
    }
}

/// An injected wallet capability.
pub trait WalletProvider: Send + Sync {
    /// Asks for account access. May prompt the user.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    /// The chain the wallet is currently on.
    fn chain_id(&self) -> impl Future<Output = Result<ChainId, WalletError>> + Send;

    /// Asks the wallet to switch chains.
    ///
    /// Fails with [`WalletError::UnrecognizedChain`] if the wallet does not know the chain.
    fn switch_chain(&self, chain_id: ChainId)
    -> impl Future<Output = Result<(), WalletError>> + Send;

    /// Registers a chain with the wallet.
    fn add_chain(
        &self,
        params: &AddChainParams,
    ) -> impl Future<Output = Result<(), WalletError>> + Send;

    /// Subscribes to account and chain changes.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

impl<T: WalletProvider> WalletProvider for Arc<T> {
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send {
        (**self).request_accounts()
    }

    fn chain_id(&self) -> impl Future<Output = Result<ChainId, WalletError>> + Send {
        (**self).chain_id()
    }

    fn switch_chain(
        &self,
        chain_id: ChainId,
    ) -> impl Future<Output = Result<(), WalletError>> + Send {
        (**self).switch_chain(chain_id)
    }

    fn add_chain(
        &self,
        params: &AddChainParams,
    ) -> impl Future<Output = Result<(), WalletError>> + Send {
        (**self).add_chain(params)
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        (**self).subscribe()
    }
}

/// Snapshot of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletState {
    /// Connected account.
    pub address: Option<Address>,
    /// Chain last reported by the wallet.
    pub chain_id: Option<ChainId>,
    /// Whether an account is connected.
    pub connected: bool,
    /// Set when the chain changed since the last connect; preconditions must be re-checked.
    pub stale: bool,
}

/// A connected account and the chain it is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// The account.
    pub address: Address,
    /// The chain.
    pub chain_id: ChainId,
}

/// Published by the session after it applied a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// An account was connected or replaced.
    Connected(Connection),
    /// The wallet has no connected account anymore.
    Disconnected,
    /// The wallet moved to another chain; the session is stale.
    ChainChanged(ChainId),
}

struct Inner<W> {
    provider: Option<W>,
    registry: Arc<ChainRegistry>,
    state: RwLock<WalletState>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

/// Process-wide handle on the user's wallet.
pub struct WalletSession<W> {
    inner: Arc<Inner<W>>,
}

impl<W> Clone for WalletSession<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> std::fmt::Debug for WalletSession<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("has_provider", &self.inner.provider.is_some())
            .field("state", &self.inner.state.read().map(|s| *s).ok())
            .finish_non_exhaustive()
    }
}

impl<W: WalletProvider + 'static> WalletSession<W> {
    /// Creates a session. `provider` is `None` when no wallet is installed.
    #[must_use]
    pub fn new(provider: Option<W>, registry: Arc<ChainRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                provider,
                registry,
                state: RwLock::new(WalletState::default()),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn provider(&self) -> Result<&W, WalletError> {
        self.inner.provider.as_ref().ok_or(WalletError::NoWallet)
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> WalletState {
        self.inner
            .state
            .read()
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// The chain registry the session switches against.
    #[must_use]
    pub fn registry(&self) -> &ChainRegistry {
        &self.inner.registry
    }

    /// Listens for session changes. Any number of listeners may subscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut WalletState)) {
        if let Ok(mut state) = self.inner.state.write() {
            f(&mut state);
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No listeners is fine.
        let _ = self.inner.events.send(event);
    }

    /// Requests account access and records the connected account and chain.
    ///
    /// # Errors
    ///
    /// [`WalletError::NoWallet`] without a provider, [`WalletError::UserRejected`]
    /// if the prompt is declined, [`WalletError::NotConnected`] if the wallet
    /// exposes no account.
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "memescan.wallet.connect", skip_all, err))]
    pub async fn connect(&self) -> Result<Connection, WalletError> {
        let provider = self.provider()?;
        let accounts = provider.request_accounts().await?;
        let Some(address) = accounts.first().copied() else {
            self.disconnect();
            return Err(WalletError::NotConnected);
        };
        let chain_id = provider.chain_id().await?;
        self.update(|s| {
            *s = WalletState {
                address: Some(address),
                chain_id: Some(chain_id),
                connected: true,
                stale: false,
            };
        });
        let connection = Connection { address, chain_id };
        #[cfg(feature = "telemetry")]
        tracing::info!(address = %address, chain_id, "Wallet connected");
        self.publish(SessionEvent::Connected(connection));
        Ok(connection)
    }

    /// Forgets the connected account.
    pub fn disconnect(&self) {
        self.update(|s| *s = WalletState::default());
        self.publish(SessionEvent::Disconnected);
    }

    /// The connected account, if any.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        let state = self.state();
        state.connected.then_some(state.address).flatten()
    }

    /// Whether a wallet provider is installed.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.inner.provider.is_some()
    }

    /// Asks the wallet which chain it is on now and records the answer.
    ///
    /// A fresh read clears the stale flag.
    ///
    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn current_chain(&self) -> Result<ChainId, WalletError> {
        let chain_id = self.provider()?.chain_id().await?;
        self.update(|s| {
            s.chain_id = Some(chain_id);
            s.stale = false;
        });
        Ok(chain_id)
    }

    /// Moves the wallet to `target`, registering the chain first if the wallet
    /// does not know it.
    ///
    /// # Errors
    ///
    /// [`WalletError::UnsupportedChain`] if `target` is not in the registry;
    /// otherwise whatever the provider reports, including
    /// [`WalletError::UserRejected`].
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "memescan.wallet.switch_chain", skip(self), err))]
    pub async fn switch_chain(&self, target: ChainId) -> Result<(), WalletError> {
        let info = self
            .inner
            .registry
            .by_chain_id(target)
            .ok_or(WalletError::UnsupportedChain(target))?;
        let provider = self.provider()?;
        match provider.switch_chain(target).await {
            Ok(()) => {}
            Err(WalletError::UnrecognizedChain(_)) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(chain_id = target, "Chain unknown to wallet, adding it");
                provider.add_chain(&AddChainParams::from(info)).await?;
                provider.switch_chain(target).await?;
            }
            Err(e) => return Err(e),
        }
        self.update(|s| s.chain_id = Some(target));
        Ok(())
    }

    /// Applies a wallet event to the session.
    ///
    /// A non-empty account list re-runs [`Self::connect`]; an empty one
    /// disconnects. A chain change marks the session stale.
    ///
    /// # Errors
    ///
    /// Propagates failures of the implied reconnect.
    pub async fn handle_event(&self, event: WalletEvent) -> Result<(), WalletError> {
        match event {
            WalletEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                #[cfg(feature = "telemetry")]
                tracing::info!("Wallet disconnected");
                self.disconnect();
            }
            WalletEvent::AccountsChanged(_) => {
                self.connect().await?;
            }
            WalletEvent::ChainChanged(chain_id) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(chain_id, "Wallet chain changed");
                self.update(|s| {
                    s.chain_id = Some(chain_id);
                    s.stale = true;
                });
                self.publish(SessionEvent::ChainChanged(chain_id));
            }
        }
        Ok(())
    }

    /// Starts following wallet events for the lifetime of the session.
    ///
    /// Must be called inside a tokio runtime. The task runs until
    /// [`Self::close`] is called or the provider drops its event channel.
    ///
    /// # Errors
    ///
    /// [`WalletError::NoWallet`] without a provider.
    pub fn watch(&self) -> Result<tokio::task::JoinHandle<()>, WalletError> {
        let mut events = self.provider()?.subscribe();
        let session = self.clone();
        let shutdown = self.inner.shutdown.clone();
        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        let _ = session
                            .handle_event(event)
                            .await
                            .inspect_err(log_event_failure);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log_lag(skipped);
                        session.resync().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Marks the session stale after events were missed and re-reads the chain.
    async fn resync(&self) {
        self.update(|s| s.stale = true);
        let Ok(provider) = self.provider() else {
            return;
        };
        match provider.chain_id().await {
            Ok(chain_id) => {
                self.update(|s| s.chain_id = Some(chain_id));
                self.publish(SessionEvent::ChainChanged(chain_id));
            }
            Err(e) => log_event_failure(&e),
        }
    }

    /// Stops the task started by [`Self::watch`].
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }
}

#[cfg(feature = "telemetry")]
fn log_event_failure(err: &WalletError) {
    tracing::warn!(error = %err, "Failed to apply wallet event");
}

#[cfg(not(feature = "telemetry"))]
fn log_event_failure(_err: &WalletError) {}

#[cfg(feature = "telemetry")]
fn log_lag(skipped: u64) {
    tracing::warn!(skipped, "Missed wallet events, re-reading chain");
}

#[cfg(not(feature = "telemetry"))]
const fn log_lag(_skipped: u64) {}
