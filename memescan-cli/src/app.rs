//! Wiring of wallet, gateways, backend and history from configuration.

use std::sync::Arc;

use memescan::chain::{ChainInfo, ChainRegistry};
use memescan::history::{FileStorage, ScanHistoryStore};
use memescan::orchestrator::ScanPurchaseOrchestrator;
use memescan::wallet::{WalletError, WalletSession};
use memescan_evm::gateway::{Erc20PaymentToken, GatewaySetupError, ScanPurchaseContract};
use memescan_evm::wallet::{LocalWallet, LocalWalletError, SigningPrompt};
use memescan_http::client::BackendClient;
use memescan_http::error::BackendClientError;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, MemescanConfig};
use crate::render::ProgressPrinter;

/// The orchestrator as assembled by the client.
pub type Orchestrator = ScanPurchaseOrchestrator<
    Arc<LocalWallet>,
    Erc20PaymentToken,
    ScanPurchaseContract,
    BackendClient,
    FileStorage,
>;

/// Errors assembling the client.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The wallet could not reach a chain.
    #[error(transparent)]
    Wallet(#[from] LocalWalletError),
    /// A contract gateway could not be resolved.
    #[error(transparent)]
    Gateway(#[from] GatewaySetupError),
    /// The backend client could not be built.
    #[error(transparent)]
    Backend(#[from] BackendClientError),
    /// The wallet session could not follow wallet events.
    #[error(transparent)]
    Session(#[from] WalletError),
}

/// Builds the backend client described by `config`.
///
/// # Errors
///
/// Fails if the URL or API key is invalid.
pub fn backend_client(config: &MemescanConfig) -> Result<BackendClient, AppError> {
    let mut client = BackendClient::try_from(config.backend_url.as_str())?;
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        client = client.with_api_key(key)?;
    }
    if let Some(timeout) = config.request_timeout() {
        client = client.with_timeout(timeout);
    }
    Ok(client)
}

/// The history store in the configured directory.
#[must_use]
pub fn history_store(config: &MemescanConfig) -> ScanHistoryStore<FileStorage> {
    ScanHistoryStore::new(FileStorage::new(&config.history_dir))
}

/// A fully wired client.
///
/// The session follows wallet events until the app is closed or dropped.
#[derive(Debug)]
pub struct App {
    config: MemescanConfig,
    registry: Arc<ChainRegistry>,
    wallet: Arc<LocalWallet>,
    session: WalletSession<Arc<LocalWallet>>,
    backend: BackendClient,
    watcher: JoinHandle<()>,
}

impl App {
    /// Assembles the client. The wallet starts on the settlement chain.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, key, RPC URL or backend URL.
    pub fn build(
        config: MemescanConfig,
        prompt: Arc<dyn SigningPrompt>,
    ) -> Result<Self, AppError> {
        let registry = Arc::new(config.registry()?);
        let wallet = Arc::new(LocalWallet::new(config.signer()?, prompt));
        let settlement = registry
            .by_chain_id(config.settlement_chain)
            .ok_or(ConfigError::UnknownSettlementChain(config.settlement_chain))?;
        wallet.register_chain(settlement)?;
        let backend = backend_client(&config)?;
        let session = WalletSession::new(Some(Arc::clone(&wallet)), Arc::clone(&registry));
        let watcher = session.watch()?;
        #[cfg(feature = "telemetry")]
        tracing::info!(
            account = %wallet.address(),
            settlement = %settlement,
            backend = %backend.base_url(),
            "Client ready"
        );
        Ok(Self {
            config,
            registry,
            wallet,
            session,
            backend,
            watcher,
        })
    }

    /// Stops following wallet events and waits for the watcher to finish.
    pub async fn close(mut self) {
        self.session.close();
        let _ = (&mut self.watcher).await;
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &MemescanConfig {
        &self.config
    }

    /// The chain registry.
    #[must_use]
    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// The settlement chain's registry entry.
    #[must_use]
    pub fn settlement(&self) -> Option<&ChainInfo> {
        self.registry.by_chain_id(self.config.settlement_chain)
    }

    /// The local wallet.
    #[must_use]
    pub const fn wallet(&self) -> &Arc<LocalWallet> {
        &self.wallet
    }

    /// The wallet session.
    #[must_use]
    pub const fn session(&self) -> &WalletSession<Arc<LocalWallet>> {
        &self.session
    }

    /// The backend client.
    #[must_use]
    pub const fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// The configured payment token on the settlement chain.
    ///
    /// # Errors
    ///
    /// Fails if the token is not accepted on the settlement chain.
    pub fn payment_token(&self) -> Result<Erc20PaymentToken, AppError> {
        Ok(Erc20PaymentToken::from_registry(
            Arc::clone(&self.wallet),
            &self.registry,
            self.config.settlement_chain,
            &self.config.payment_token,
        )?)
    }

    /// An orchestrator that prints its progress on stderr.
    ///
    /// # Errors
    ///
    /// Fails if the settlement chain lacks the token or the purchase contract.
    pub fn orchestrator(&self) -> Result<Orchestrator, AppError> {
        let purchase = ScanPurchaseContract::from_registry(
            Arc::clone(&self.wallet),
            &self.registry,
            self.config.settlement_chain,
        )?;
        Ok(ScanPurchaseOrchestrator::new(
            self.session.clone(),
            self.payment_token()?,
            purchase,
            self.backend.clone(),
            history_store(&self.config),
        )
        .with_config(self.config.orchestrator_config())
        .with_observer(Arc::new(ProgressPrinter)))
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.session.close();
    }
}
