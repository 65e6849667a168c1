//! The scan purchase state machine.
//!
//! [`ScanPurchaseOrchestrator::purchase_and_analyze`] turns one user request
//! into, at most, one approval, one purchase, one analysis request and one
//! history entry:
//!
//! ```text
//! Idle -> PreconditionCheck -> [Approving] -> Purchasing -> Confirming -> Analyzing -> Completed
//!                  \________________\______________\____________\____________\-> Failed(reason)
//! ```
//!
//! Preconditions are checked in order (address syntax, wallet connected,
//! wallet on the settlement chain, balance) and nothing is signed until all
//! of them pass. Approval is skipped when the existing allowance already
//! covers the price. Nothing is retried automatically and no confirmation has
//! a deadline. A failure after the purchase is mined carries the
//! [`PurchaseReceipt`]; [`ScanPurchaseOrchestrator::retry_analysis`] resubmits
//! it without paying again.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, U256};

use crate::amount::{UsdPrice, required_amount};
use crate::analysis::{AnalysisClient, AnalysisError, AnalysisRequest};
use crate::chain::ChainId;
use crate::error::{FailureReason, ScanError};
use crate::gateway::{GatewayError, PaymentTokenGateway, PurchaseGateway, PurchaseRequest};
use crate::history::{ScanHistoryStore, Storage, StorageError};
use crate::proto::{HistoryEntry, PurchaseReceipt, ScanReport, ScanTier, parse_token_address};
use crate::wallet::{WalletError, WalletProvider, WalletSession};

/// Chain on which scans are paid for unless configured otherwise (Polygon).
pub const DEFAULT_SETTLEMENT_CHAIN: ChainId = 137;

/// Where an attempt currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    /// Nothing running.
    Idle,
    /// Validating inputs, wallet, chain and balance.
    PreconditionCheck,
    /// Waiting for the approval to be signed and mined.
    Approving,
    /// Waiting for the purchase to be signed.
    Purchasing,
    /// Waiting for the purchase to be mined.
    Confirming,
    /// Waiting for the backend report.
    Analyzing,
    /// Report obtained and recorded.
    Completed,
    /// Stopped.
    Failed(FailureReason),
}

impl ScanState {
    /// Whether the attempt has ended.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl Display for ScanState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::PreconditionCheck => f.write_str("precondition_check"),
            Self::Approving => f.write_str("approving"),
            Self::Purchasing => f.write_str("purchasing"),
            Self::Confirming => f.write_str("confirming"),
            Self::Analyzing => f.write_str("analyzing"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Observes state transitions, e.g. to drive a progress display.
///
/// Called synchronously on every transition; keep it cheap.
pub trait ScanObserver: Send + Sync {
    /// The state moved from `from` to `to`.
    fn on_transition(&self, _from: &ScanState, _to: &ScanState) {}
}

/// How much allowance to request when the current one is too small.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Approve `U256::MAX` once so later purchases skip approval.
    #[default]
    Unlimited,
    /// Approve a multiple of the current price.
    Capped {
        /// Number of purchases the approval covers.
        multiple: u32,
    },
}

impl ApprovalPolicy {
    /// Allowance to request when `required` is owed.
    #[must_use]
    pub fn allowance_for(&self, required: U256) -> U256 {
        match self {
            Self::Unlimited => U256::MAX,
            Self::Capped { multiple } => {
                required.saturating_mul(U256::from((*multiple).max(1)))
            }
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Chain purchases are paid on.
    pub settlement_chain: ChainId,
    /// Referral address passed to the purchase contract.
    pub referrer: Address,
    /// Allowance sizing.
    pub approval: ApprovalPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settlement_chain: DEFAULT_SETTLEMENT_CHAIN,
            referrer: Address::ZERO,
            approval: ApprovalPolicy::default(),
        }
    }
}

/// A user's request to buy a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Token address as entered; validated before anything else.
    pub token_address: String,
    /// Chain the token lives on.
    pub chain_id: ChainId,
    /// Tier to buy.
    pub tier: ScanTier,
}

/// Result of a completed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Proof of the mined purchase.
    pub receipt: PurchaseReceipt,
    /// The report.
    pub report: ScanReport,
    /// The history record written for this scan.
    pub entry: HistoryEntry,
    /// Whether `entry` reached storage. The report is valid either way.
    pub persisted: bool,
}

/// Resets the in-flight flag when an attempt ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequences wallet, token, purchase contract, backend and history into one
/// paid scan.
pub struct ScanPurchaseOrchestrator<W, T, P, A, S> {
    session: WalletSession<W>,
    token: T,
    purchase: P,
    analysis: A,
    history: ScanHistoryStore<S>,
    config: OrchestratorConfig,
    observers: Vec<Arc<dyn ScanObserver>>,
    state: Mutex<ScanState>,
    in_flight: AtomicBool,
}

impl<W, T, P, A, S> Debug for ScanPurchaseOrchestrator<W, T, P, A, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanPurchaseOrchestrator")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<W, T, P, A, S> ScanPurchaseOrchestrator<W, T, P, A, S>
where
    W: WalletProvider + 'static,
    T: PaymentTokenGateway,
    P: PurchaseGateway,
    A: AnalysisClient,
    S: Storage,
{
    /// Creates an orchestrator with the default configuration.
    pub fn new(
        session: WalletSession<W>,
        token: T,
        purchase: P,
        analysis: A,
        history: ScanHistoryStore<S>,
    ) -> Self {
        Self {
            session,
            token,
            purchase,
            analysis,
            history,
            config: OrchestratorConfig::default(),
            observers: Vec::new(),
            state: Mutex::new(ScanState::Idle),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a transition observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The wallet session.
    pub const fn session(&self) -> &WalletSession<W> {
        &self.session
    }

    /// The history store.
    pub const fn history(&self) -> &ScanHistoryStore<S> {
        &self.history
    }

    /// The configuration.
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(ScanState::Idle)
    }

    /// Authoritative price of `tier`, read from the purchase contract.
    ///
    /// # Errors
    ///
    /// Returns the gateway error if the contract cannot be read.
    pub async fn tier_price(&self, tier: ScanTier) -> Result<UsdPrice, GatewayError> {
        self.purchase.tier_price(tier).await
    }

    fn transition(&self, to: ScanState) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let from = std::mem::replace(&mut *state, to.clone());
        drop(state);
        #[cfg(feature = "telemetry")]
        tracing::debug!(from = %from, to = %to, "Scan state transition");
        for observer in &self.observers {
            observer.on_transition(&from, &to);
        }
    }

    fn fail(&self, err: ScanError) -> ScanError {
        #[cfg(feature = "telemetry")]
        tracing::warn!(
            error = %err,
            category = ?err.category(),
            payment_succeeded = err.payment_succeeded(),
            "Scan purchase failed"
        );
        self.transition(ScanState::Failed(err.reason().clone()));
        err
    }

    fn begin(&self) -> Result<InFlight<'_>, ScanError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(&self.in_flight))
            .map_err(|_| ScanError::new(FailureReason::ScanInProgress))
    }

    /// Pays for and retrieves a scan of `request.token_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] classified by [`crate::error::ErrorCategory`].
    /// Errors after payment carry the receipt.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "memescan.scan.purchase_and_analyze",
            skip_all,
            fields(token = %request.token_address, chain_id = request.chain_id, tier = %request.tier),
            err
        )
    )]
    pub async fn purchase_and_analyze(
        &self,
        request: &ScanRequest,
    ) -> Result<ScanOutcome, ScanError> {
        let _in_flight = self.begin()?;
        match self.run(request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Resubmits a paid receipt to the backend. Never pays again.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] with [`FailureReason::AnalysisRejected`] or
    /// [`FailureReason::AnalysisUnreachable`].
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "memescan.scan.retry_analysis",
            skip_all,
            fields(tx = %receipt.transaction_hash),
            err
        )
    )]
    pub async fn retry_analysis(
        &self,
        receipt: &PurchaseReceipt,
    ) -> Result<ScanOutcome, ScanError> {
        let _in_flight = self.begin()?;
        match self.analyze(receipt.clone()).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn run(&self, request: &ScanRequest) -> Result<ScanOutcome, ScanError> {
        self.transition(ScanState::PreconditionCheck);

        let token_address = parse_token_address(&request.token_address)
            .map_err(|e| FailureReason::InvalidAddress(e.0))?;
        let buyer = self.connected_account()?;
        self.ensure_settlement_chain().await?;

        let price = self
            .purchase
            .tier_price(request.tier)
            .await
            .map_err(execution_failure)?;
        let balance = self.token.balance(buyer).await.map_err(execution_failure)?;
        let required = required_amount(price, balance.decimals);
        if balance.amount < required {
            return Err(FailureReason::InsufficientBalance {
                required,
                available: balance.amount,
            }
            .into());
        }

        let spender = self.purchase.contract_address();
        let allowance = self
            .token
            .allowance(buyer, spender)
            .await
            .map_err(execution_failure)?;
        if allowance < required {
            self.transition(ScanState::Approving);
            self.approve(spender, required).await?;
        }

        self.transition(ScanState::Purchasing);
        let purchase = PurchaseRequest {
            token_address,
            token_chain_id: request.chain_id,
            payment_token: self.token.token_address(),
            tier: request.tier,
            referrer: self.config.referrer,
        };
        let hash = self
            .purchase
            .submit_purchase(&purchase)
            .await
            .map_err(execution_failure)?;
        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %hash, price = %price, "Purchase submitted");

        self.transition(ScanState::Confirming);
        let receipt = PurchaseReceipt {
            transaction_hash: hash,
            buyer,
            token_address,
            chain_id: request.chain_id,
            tier: request.tier,
        };
        match self.purchase.wait_mined(hash).await {
            Ok(_) => self.analyze(receipt).await,
            // Mined and reverted: nothing was paid.
            Err(e @ GatewayError::Reverted { .. }) => {
                Err(ScanError::new(execution_failure(e)).with_transaction(Some(hash)))
            }
            // Broadcast, but whether it was mined is unknown.
            Err(e) => Err(ScanError::payment_unconfirmed(
                FailureReason::PurchaseUnconfirmed(e.to_string()),
                receipt,
            )),
        }
    }

    fn connected_account(&self) -> Result<Address, FailureReason> {
        if !self.session.has_provider() {
            return Err(FailureReason::NoWallet);
        }
        self.session
            .address()
            .ok_or(FailureReason::WalletNotConnected)
    }

    async fn ensure_settlement_chain(&self) -> Result<(), FailureReason> {
        let expected = self.config.settlement_chain;
        let actual = self
            .session
            .current_chain()
            .await
            .map_err(wallet_failure)?;
        if actual == expected {
            return Ok(());
        }
        // Prompt the switch, but never continue in the same attempt.
        let _ = self
            .session
            .switch_chain(expected)
            .await
            .inspect_err(|e| log_switch_failure(e, expected));
        Err(FailureReason::WrongChain { expected, actual })
    }

    async fn approve(&self, spender: Address, required: U256) -> Result<(), ScanError> {
        let amount = self.config.approval.allowance_for(required);
        let hash = self
            .token
            .approve(spender, amount)
            .await
            .map_err(approval_failure)?;
        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %hash, spender = %spender, "Approval submitted");
        self.token
            .wait_mined(hash)
            .await
            .map_err(|e| ScanError::new(approval_failure(e)).with_transaction(Some(hash)))?;
        Ok(())
    }

    async fn analyze(&self, receipt: PurchaseReceipt) -> Result<ScanOutcome, ScanError> {
        self.transition(ScanState::Analyzing);
        let report = match self
            .analysis
            .request_analysis(&AnalysisRequest::from(&receipt))
            .await
        {
            Ok(report) => report,
            Err(AnalysisError::Rejected { message, .. }) => {
                return Err(ScanError::after_payment(
                    FailureReason::AnalysisRejected(message),
                    receipt,
                ));
            }
            Err(AnalysisError::Transient(message)) => {
                return Err(ScanError::after_payment(
                    FailureReason::AnalysisUnreachable(message),
                    receipt,
                ));
            }
        };
        if let Err(e) = report.validate() {
            return Err(ScanError::after_payment(
                FailureReason::AnalysisRejected(e.to_string()),
                receipt,
            ));
        }

        let entry = HistoryEntry::new(&receipt, report.clone());
        let persisted = match self.history.append(entry.clone()) {
            Ok(()) => true,
            Err(e) => {
                log_persist_failure(&e, &receipt);
                false
            }
        };
        self.transition(ScanState::Completed);
        Ok(ScanOutcome {
            receipt,
            report,
            entry,
            persisted,
        })
    }
}

#[cfg(feature = "telemetry")]
fn log_switch_failure(err: &WalletError, chain_id: ChainId) {
    tracing::warn!(error = %err, chain_id, "Chain switch request failed");
}

#[cfg(not(feature = "telemetry"))]
fn log_switch_failure(_err: &WalletError, _chain_id: ChainId) {}

#[cfg(feature = "telemetry")]
fn log_persist_failure(err: &StorageError, receipt: &PurchaseReceipt) {
    tracing::error!(error = %err, tx = %receipt.transaction_hash, "Failed to persist scan history");
}

#[cfg(not(feature = "telemetry"))]
fn log_persist_failure(_err: &StorageError, _receipt: &PurchaseReceipt) {}

fn execution_failure(err: GatewayError) -> FailureReason {
    match err {
        GatewayError::ChainMismatch { expected, actual } => {
            FailureReason::WrongChain { expected, actual }
        }
        GatewayError::UserRejected => FailureReason::UserRejected,
        GatewayError::InsufficientFunds(message) => FailureReason::InsufficientFunds(message),
        GatewayError::Reverted { reason, .. } => FailureReason::ChainExecutionFailed(
            reason.unwrap_or_else(|| "execution reverted".to_owned()),
        ),
        GatewayError::Rpc(message) => FailureReason::ChainExecutionFailed(message),
    }
}

fn approval_failure(err: GatewayError) -> FailureReason {
    match err {
        GatewayError::UserRejected => FailureReason::UserRejected,
        GatewayError::ChainMismatch { expected, actual } => {
            FailureReason::WrongChain { expected, actual }
        }
        other => FailureReason::ApprovalFailed(other.to_string()),
    }
}

fn wallet_failure(err: WalletError) -> FailureReason {
    match err {
        WalletError::NoWallet => FailureReason::NoWallet,
        WalletError::NotConnected => FailureReason::WalletNotConnected,
        WalletError::UserRejected => FailureReason::UserRejected,
        other => FailureReason::ChainExecutionFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::history::MemoryStorage;
    use crate::testing::{
        BUYER, MockAnalysis, MockPurchase, MockToken, MockWallet, PAYMENT_TOKEN,
        PURCHASE_CONTRACT, ReadOnlyStorage, RecordingObserver, TokenCall, sample_report,
        test_registry,
    };

    const TOKEN: &str = "0x6982508145454ce325ddbe47a25d4ec3d2311933";

    type TestOrchestrator = ScanPurchaseOrchestrator<
        Arc<MockWallet>,
        Arc<MockToken>,
        Arc<MockPurchase>,
        Arc<MockAnalysis>,
        Arc<MemoryStorage>,
    >;

    struct Harness {
        wallet: Arc<MockWallet>,
        token: Arc<MockToken>,
        purchase: Arc<MockPurchase>,
        analysis: Arc<MockAnalysis>,
        storage: Arc<MemoryStorage>,
        observer: Arc<RecordingObserver>,
        orchestrator: TestOrchestrator,
    }

    /// Wallet on Polygon holding `balance` USDC (6 decimals) with `allowance` granted.
    async fn harness(chain: ChainId, balance: u64, allowance: u64) -> Harness {
        let wallet = Arc::new(MockWallet::new(BUYER, chain));
        let session = WalletSession::new(Some(Arc::clone(&wallet)), Arc::new(test_registry()));
        session.connect().await.unwrap();
        let token = Arc::new(MockToken::new(U256::from(balance), 6, U256::from(allowance)));
        let purchase = Arc::new(MockPurchase::new(UsdPrice::from_cents(100)));
        let analysis = Arc::new(MockAnalysis::new());
        let storage = Arc::new(MemoryStorage::new());
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = ScanPurchaseOrchestrator::new(
            session,
            Arc::clone(&token),
            Arc::clone(&purchase),
            Arc::clone(&analysis),
            ScanHistoryStore::new(Arc::clone(&storage)),
        )
        .with_observer(Arc::clone(&observer) as Arc<dyn ScanObserver>);
        Harness {
            wallet,
            token,
            purchase,
            analysis,
            storage,
            observer,
            orchestrator,
        }
    }

    fn request(tier: ScanTier) -> ScanRequest {
        ScanRequest {
            token_address: TOKEN.to_owned(),
            chain_id: 1,
            tier,
        }
    }

    #[tokio::test]
    async fn approval_path_approves_max_then_purchases() {
        let h = harness(137, 5_000_000, 0).await;
        let outcome = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap();

        assert_eq!(
            h.observer.states(),
            vec![
                ScanState::PreconditionCheck,
                ScanState::Approving,
                ScanState::Purchasing,
                ScanState::Confirming,
                ScanState::Analyzing,
                ScanState::Completed,
            ]
        );
        assert!(h.token.calls().contains(&TokenCall::Approve {
            spender: PURCHASE_CONTRACT,
            amount: U256::MAX,
        }));
        let purchases = h.purchase.purchases();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].payment_token, PAYMENT_TOKEN);
        assert_eq!(purchases[0].token_chain_id, 1);
        assert_eq!(purchases[0].referrer, Address::ZERO);

        let history = ScanHistoryStore::new(Arc::clone(&h.storage)).load_all();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].transaction_hash,
            outcome.receipt.transaction_hash
        );
        assert_eq!(Some(outcome.receipt.transaction_hash), h.purchase.last_hash());
        assert!(outcome.persisted);
        assert_eq!(h.orchestrator.state(), ScanState::Completed);
    }

    #[tokio::test]
    async fn sufficient_allowance_skips_approving() {
        let h = harness(137, 5_000_000, 1_000_000).await;
        h.orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap();
        assert!(!h.observer.states().contains(&ScanState::Approving));
        assert!(
            !h.token
                .calls()
                .iter()
                .any(|c| matches!(c, TokenCall::Approve { .. }))
        );
    }

    #[tokio::test]
    async fn insufficient_balance_never_approves_or_purchases() {
        let h = harness(137, 999_999, 0).await;
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert_eq!(
            err.reason(),
            &FailureReason::InsufficientBalance {
                required: U256::from(1_000_000u64),
                available: U256::from(999_999u64),
            }
        );
        assert_eq!(err.category(), ErrorCategory::Precondition);
        assert!(
            !h.token
                .calls()
                .iter()
                .any(|c| matches!(c, TokenCall::Approve { .. }))
        );
        assert!(h.purchase.purchases().is_empty());
    }

    #[tokio::test]
    async fn wrong_chain_requests_switch_and_touches_no_contract() {
        let h = harness(1, 5_000_000, 0).await;
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert_eq!(
            err.reason(),
            &FailureReason::WrongChain {
                expected: 137,
                actual: 1
            }
        );
        assert_eq!(h.wallet.switch_requests(), vec![137]);
        assert!(h.token.calls().is_empty());
        assert!(h.purchase.purchases().is_empty());
        assert_eq!(h.purchase.price_reads(), 0);
        assert!(matches!(
            h.orchestrator.state(),
            ScanState::Failed(FailureReason::WrongChain { .. })
        ));
    }

    #[tokio::test]
    async fn analysis_rejection_writes_no_history() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        h.analysis.push(Err(AnalysisError::Rejected {
            status: Some(400),
            message: "Transaction already used".into(),
        }));
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Full))
            .await
            .unwrap_err();
        assert_eq!(
            err.reason(),
            &FailureReason::AnalysisRejected("Transaction already used".into())
        );
        assert!(err.payment_succeeded());
        assert!(!err.is_retryable());
        assert_eq!(
            err.receipt().map(|r| r.transaction_hash),
            h.purchase.last_hash()
        );
        assert!(
            ScanHistoryStore::new(Arc::clone(&h.storage))
                .load_all()
                .is_empty()
        );
        assert!(matches!(
            h.orchestrator.state(),
            ScanState::Failed(FailureReason::AnalysisRejected(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_retryable_with_same_receipt() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        h.analysis
            .push(Err(AnalysisError::Transient("connection refused".into())));
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        let receipt = err.receipt().unwrap().clone();

        let outcome = h.orchestrator.retry_analysis(&receipt).await.unwrap();
        assert_eq!(outcome.receipt, receipt);
        assert_eq!(h.purchase.purchases().len(), 1);
        let requests = h.analysis.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tx_hash, requests[1].tx_hash);
        assert_eq!(
            ScanHistoryStore::new(Arc::clone(&h.storage))
                .load_all()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_address_fails_before_wallet_checks() {
        let h = harness(1, 0, 0).await;
        let err = h
            .orchestrator
            .purchase_and_analyze(&ScanRequest {
                token_address: "0xnot-an-address".into(),
                chain_id: 1,
                tier: ScanTier::Basic,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.reason(), FailureReason::InvalidAddress(_)));
        assert!(h.wallet.switch_requests().is_empty());
    }

    #[tokio::test]
    async fn disconnected_wallet_fails_precondition() {
        let h = harness(137, 5_000_000, 0).await;
        h.orchestrator.session().disconnect();
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), &FailureReason::WalletNotConnected);
    }

    #[tokio::test]
    async fn declined_purchase_is_user_rejected() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        h.purchase.fail_submit(GatewayError::UserRejected);
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), &FailureReason::UserRejected);
        assert_eq!(err.category(), ErrorCategory::UserDeclined);
        assert!(!err.payment_succeeded());
    }

    #[tokio::test]
    async fn reverted_purchase_carries_reason() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        h.purchase.fail_mining(GatewayError::Reverted {
            reason: Some("Token not supported".into()),
            transaction: None,
        });
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert_eq!(
            err.reason(),
            &FailureReason::ChainExecutionFailed("Token not supported".into())
        );
        assert_eq!(err.transaction().copied(), h.purchase.last_hash());
        assert!(!h.observer.states().contains(&ScanState::Analyzing));
    }

    #[tokio::test]
    async fn lost_confirmation_keeps_the_receipt_for_retry() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        h.purchase.fail_mining(GatewayError::Rpc(
            "connection reset while polling receipt".into(),
        ));
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err.reason(), FailureReason::PurchaseUnconfirmed(_)));
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(!err.payment_succeeded());
        assert!(err.payment_unknown());
        assert!(err.is_retryable());
        let pending = err.unconfirmed_receipt().unwrap();
        assert_eq!(Some(pending.transaction_hash), h.purchase.last_hash());
        assert_eq!(pending.buyer, BUYER);
        assert!(h.analysis.requests().is_empty());
        assert!(h.orchestrator.history().load_all().is_empty());

        // Once the transaction turns out mined, the receipt fetches the report.
        let outcome = h.orchestrator.retry_analysis(pending).await.unwrap();
        assert_eq!(outcome.receipt, *pending);
        assert_eq!(h.purchase.purchases().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_report_is_rejected_without_history() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        let mut report = sample_report();
        report.risk_score = 101;
        h.analysis.push(Ok(report));
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err.reason(), FailureReason::AnalysisRejected(_)));
        assert!(err.payment_succeeded());
        assert!(!err.is_retryable());
        assert!(h.orchestrator.history().load_all().is_empty());
        assert!(!h.observer.states().contains(&ScanState::Completed));
    }

    #[tokio::test]
    async fn history_write_failure_still_returns_report() {
        let wallet = Arc::new(MockWallet::new(BUYER, 137));
        let session = WalletSession::new(Some(Arc::clone(&wallet)), Arc::new(test_registry()));
        session.connect().await.unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = ScanPurchaseOrchestrator::new(
            session,
            Arc::new(MockToken::new(U256::from(5_000_000u64), 6, U256::MAX)),
            Arc::new(MockPurchase::new(UsdPrice::from_cents(100))),
            Arc::new(MockAnalysis::new()),
            ScanHistoryStore::new(ReadOnlyStorage),
        )
        .with_observer(Arc::clone(&observer) as Arc<dyn ScanObserver>);

        let outcome = orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap();
        assert!(!outcome.persisted);
        assert_eq!(outcome.report, sample_report());
        assert_eq!(orchestrator.state(), ScanState::Completed);
        assert_eq!(observer.states().last(), Some(&ScanState::Completed));
    }

    #[tokio::test]
    async fn failed_approval_stops_before_purchase() {
        let h = harness(137, 5_000_000, 0).await;
        h.token.fail_approve(GatewayError::Rpc("nonce too low".into()));
        let err = h
            .orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err.reason(), FailureReason::ApprovalFailed(_)));
        assert!(h.purchase.purchases().is_empty());
    }

    #[tokio::test]
    async fn capped_policy_approves_multiple_of_price() {
        let h = harness(137, 5_000_000, 0).await;
        let orchestrator = h.orchestrator.with_config(OrchestratorConfig {
            approval: ApprovalPolicy::Capped { multiple: 3 },
            ..OrchestratorConfig::default()
        });
        orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap();
        assert!(h.token.calls().contains(&TokenCall::Approve {
            spender: PURCHASE_CONTRACT,
            amount: U256::from(3_000_000u64),
        }));
    }

    #[tokio::test]
    async fn price_is_read_fresh_for_every_attempt() {
        let h = harness(137, 10_000_000, u64::MAX).await;
        h.orchestrator
            .purchase_and_analyze(&request(ScanTier::Basic))
            .await
            .unwrap();
        h.purchase.set_price(UsdPrice::from_cents(250));
        h.orchestrator
            .purchase_and_analyze(&request(ScanTier::Full))
            .await
            .unwrap();
        assert_eq!(h.purchase.price_reads(), 2);
        let history = h.orchestrator.history().load_all();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tier, ScanTier::Full);
    }

    #[tokio::test]
    async fn concurrent_attempt_is_refused() {
        let h = harness(137, 5_000_000, u64::MAX).await;
        let gate = h.purchase.hold_mining();
        let request = request(ScanTier::Basic);
        let first = h.orchestrator.purchase_and_analyze(&request);
        let second = async {
            // Let the first attempt reach Confirming.
            while h.orchestrator.state() != ScanState::Confirming {
                tokio::task::yield_now().await;
            }
            let err = h
                .orchestrator
                .purchase_and_analyze(&request)
                .await
                .unwrap_err();
            gate.notify_one();
            err
        };
        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert_eq!(second.reason(), &FailureReason::ScanInProgress);
        assert_eq!(h.purchase.purchases().len(), 1);
    }
}
