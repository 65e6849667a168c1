//! In-memory doubles for the wallet, contracts and backend.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, TxHash, U256, address};
use tokio::sync::{Notify, broadcast};

use crate::amount::UsdPrice;
use crate::analysis::{AnalysisClient, AnalysisError, AnalysisRequest};
use crate::chain::{ChainId, ChainInfo, ChainRegistry};
use crate::history::{Storage, StorageError};
use crate::gateway::{
    GatewayError, MinedTransaction, PaymentTokenGateway, PurchaseGateway, PurchaseRequest,
    TokenBalance,
};
use crate::orchestrator::{ScanObserver, ScanState};
use crate::proto::{RiskLevel, ScanReport, ScanTier, SecurityInfo};
use crate::wallet::{AddChainParams, WalletError, WalletEvent, WalletProvider};

pub const BUYER: Address = address!("00000000000000000000000000000000000000b0");
pub const PAYMENT_TOKEN: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
pub const PURCHASE_CONTRACT: Address = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");

fn chain(chain_id: ChainId, name: &str, symbol: &str) -> ChainInfo {
    ChainInfo {
        chain_id,
        name: name.to_owned(),
        native_symbol: symbol.to_owned(),
        rpc_url: format!("https://rpc.invalid/{chain_id}"),
        explorer_base_url: Some(format!("https://explorer.invalid/{chain_id}")),
        payment_tokens: BTreeMap::new(),
        purchase_contract: None,
    }
}

pub fn test_registry() -> ChainRegistry {
    let mut polygon = chain(137, "Polygon", "MATIC");
    polygon
        .payment_tokens
        .insert("usdc".to_owned(), PAYMENT_TOKEN);
    polygon.purchase_contract = Some(PURCHASE_CONTRACT);
    ChainRegistry::new([
        chain(1, "Ethereum", "ETH"),
        chain(56, "BNB Chain", "BNB"),
        chain(42161, "Arbitrum", "ETH"),
        polygon,
    ])
}

pub fn sample_report() -> ScanReport {
    ScanReport {
        risk_score: 12,
        risk_level: RiskLevel::Low,
        verdict: "No major issues found".to_owned(),
        warnings: vec![],
        security: SecurityInfo {
            is_honeypot: false,
            buy_tax: 0.0,
            sell_tax: 0.0,
            ownership_renounced: true,
        },
        recommendations: vec!["Verify liquidity before buying".to_owned()],
        token: None,
        liquidity: None,
        extra: BTreeMap::new(),
    }
}

pub struct MockWallet {
    account: Address,
    chain: AtomicU64,
    known: Mutex<HashSet<ChainId>>,
    reject_connect: Mutex<bool>,
    added: Mutex<Vec<ChainId>>,
    switches: Mutex<Vec<ChainId>>,
    events: broadcast::Sender<WalletEvent>,
}

impl MockWallet {
    pub fn new(account: Address, chain: ChainId) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            account,
            chain: AtomicU64::new(chain),
            known: Mutex::new(HashSet::from([1, 56, 137, 42161])),
            reject_connect: Mutex::new(false),
            added: Mutex::new(Vec::new()),
            switches: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn reject_connect(&self) {
        *self.reject_connect.lock().unwrap() = true;
    }

    pub fn forget_chain(&self, chain_id: ChainId) {
        self.known.lock().unwrap().remove(&chain_id);
    }

    pub fn added_chains(&self) -> Vec<ChainId> {
        self.added.lock().unwrap().clone()
    }

    pub fn switch_requests(&self) -> Vec<ChainId> {
        self.switches.lock().unwrap().clone()
    }

    pub fn emit(&self, event: WalletEvent) {
        self.events.send(event).unwrap();
    }
}

impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        if *self.reject_connect.lock().unwrap() {
            return Err(WalletError::UserRejected);
        }
        Ok(vec![self.account])
    }

    async fn chain_id(&self) -> Result<ChainId, WalletError> {
        Ok(self.chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        self.switches.lock().unwrap().push(chain_id);
        if !self.known.lock().unwrap().contains(&chain_id) {
            return Err(WalletError::UnrecognizedChain(chain_id));
        }
        self.chain.store(chain_id, Ordering::SeqCst);
        let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError> {
        self.added.lock().unwrap().push(params.chain_id);
        self.known.lock().unwrap().insert(params.chain_id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCall {
    Balance(Address),
    Allowance { owner: Address, spender: Address },
    Approve { spender: Address, amount: U256 },
}

pub struct MockToken {
    balance: U256,
    decimals: u8,
    allowance: Mutex<U256>,
    approve_error: Mutex<Option<GatewayError>>,
    calls: Mutex<Vec<TokenCall>>,
    pending: Mutex<Option<U256>>,
}

impl MockToken {
    pub fn new(balance: U256, decimals: u8, allowance: U256) -> Self {
        Self {
            balance,
            decimals,
            allowance: Mutex::new(allowance),
            approve_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
        }
    }

    pub fn fail_approve(&self, err: GatewayError) {
        *self.approve_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<TokenCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl PaymentTokenGateway for MockToken {
    fn chain_id(&self) -> ChainId {
        137
    }

    fn token_address(&self) -> Address {
        PAYMENT_TOKEN
    }

    async fn balance(&self, owner: Address) -> Result<TokenBalance, GatewayError> {
        self.calls.lock().unwrap().push(TokenCall::Balance(owner));
        Ok(TokenBalance {
            amount: self.balance,
            decimals: self.decimals,
        })
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(TokenCall::Allowance { owner, spender });
        Ok(*self.allowance.lock().unwrap())
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<TxHash, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(TokenCall::Approve { spender, amount });
        if let Some(err) = self.approve_error.lock().unwrap().clone() {
            return Err(err);
        }
        *self.pending.lock().unwrap() = Some(amount);
        Ok(TxHash::repeat_byte(0xaa))
    }

    async fn wait_mined(&self, transaction: TxHash) -> Result<MinedTransaction, GatewayError> {
        if let Some(amount) = self.pending.lock().unwrap().take() {
            *self.allowance.lock().unwrap() = amount;
        }
        Ok(MinedTransaction {
            transaction_hash: transaction,
            block_number: Some(1),
        })
    }
}

pub struct MockPurchase {
    price: Mutex<UsdPrice>,
    price_reads: AtomicUsize,
    purchases: Mutex<Vec<PurchaseRequest>>,
    submit_error: Mutex<Option<GatewayError>>,
    mining_error: Mutex<Option<GatewayError>>,
    nonce: AtomicU8,
    last_hash: Mutex<Option<TxHash>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockPurchase {
    pub fn new(price: UsdPrice) -> Self {
        Self {
            price: Mutex::new(price),
            price_reads: AtomicUsize::new(0),
            purchases: Mutex::new(Vec::new()),
            submit_error: Mutex::new(None),
            mining_error: Mutex::new(None),
            nonce: AtomicU8::new(1),
            last_hash: Mutex::new(None),
            hold: Mutex::new(None),
        }
    }

    pub fn set_price(&self, price: UsdPrice) {
        *self.price.lock().unwrap() = price;
    }

    pub fn price_reads(&self) -> usize {
        self.price_reads.load(Ordering::SeqCst)
    }

    pub fn purchases(&self) -> Vec<PurchaseRequest> {
        self.purchases.lock().unwrap().clone()
    }

    pub fn last_hash(&self) -> Option<TxHash> {
        *self.last_hash.lock().unwrap()
    }

    pub fn fail_submit(&self, err: GatewayError) {
        *self.submit_error.lock().unwrap() = Some(err);
    }

    pub fn fail_mining(&self, err: GatewayError) {
        *self.mining_error.lock().unwrap() = Some(err);
    }

    /// Makes `wait_mined` block until the returned notify fires.
    pub fn hold_mining(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }
}

impl PurchaseGateway for MockPurchase {
    fn contract_address(&self) -> Address {
        PURCHASE_CONTRACT
    }

    async fn tier_price(&self, _tier: ScanTier) -> Result<UsdPrice, GatewayError> {
        self.price_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.price.lock().unwrap())
    }

    async fn submit_purchase(&self, request: &PurchaseRequest) -> Result<TxHash, GatewayError> {
        if let Some(err) = self.submit_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.purchases.lock().unwrap().push(*request);
        let hash = TxHash::repeat_byte(self.nonce.fetch_add(1, Ordering::SeqCst));
        *self.last_hash.lock().unwrap() = Some(hash);
        Ok(hash)
    }

    async fn wait_mined(&self, transaction: TxHash) -> Result<MinedTransaction, GatewayError> {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        if let Some(err) = self.mining_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(MinedTransaction {
            transaction_hash: transaction,
            block_number: Some(2),
        })
    }
}

pub struct MockAnalysis {
    responses: Mutex<VecDeque<Result<ScanReport, AnalysisError>>>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl MockAnalysis {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response; once the queue is empty every request succeeds.
    pub fn push(&self, response: Result<ScanReport, AnalysisError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl AnalysisClient for MockAnalysis {
    async fn request_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> Result<ScanReport, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_report()))
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<ScanState>>,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<ScanState> {
        self.states.lock().unwrap().clone()
    }
}

impl ScanObserver for RecordingObserver {
    fn on_transition(&self, _from: &ScanState, to: &ScanState) {
        self.states.lock().unwrap().push(to.clone());
    }
}

/// Storage that reads as empty and refuses every write.
pub struct ReadOnlyStorage;

impl Storage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("read-only file system")))
    }
}
