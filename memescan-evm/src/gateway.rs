//! Contract gateways signed through a [`LocalWallet`].

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use memescan::amount::UsdPrice;
use memescan::chain::{ChainId, ChainNotConfigured, ChainRegistry};
use memescan::gateway::{
    GatewayError, MinedTransaction, PaymentTokenGateway, PurchaseGateway, PurchaseRequest,
    TokenBalance,
};
use memescan::proto::ScanTier;
use tokio::sync::OnceCell;

use crate::contract::{IERC20, IScanPurchase};
use crate::error::classify_contract_error;
use crate::wallet::LocalWallet;

/// A gateway could not be built from the chain registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewaySetupError {
    /// The chain is not in the registry.
    #[error("chain {0} is not supported")]
    UnknownChain(ChainId),
    /// The chain lacks the required deployment.
    #[error(transparent)]
    NotConfigured(#[from] ChainNotConfigured),
}

/// An ERC-20 stablecoin used to pay for scans.
#[derive(Debug)]
pub struct Erc20PaymentToken {
    wallet: Arc<LocalWallet>,
    chain_id: ChainId,
    token: Address,
    decimals: OnceCell<u8>,
}

impl Erc20PaymentToken {
    /// Wraps `token` on `chain_id`.
    #[must_use]
    pub fn new(wallet: Arc<LocalWallet>, chain_id: ChainId, token: Address) -> Self {
        Self {
            wallet,
            chain_id,
            token,
            decimals: OnceCell::new(),
        }
    }

    /// Looks up the payment token `key` (e.g. `usdc`) on `chain_id`.
    ///
    /// # Errors
    ///
    /// Fails if the chain is unknown or does not accept that token.
    pub fn from_registry(
        wallet: Arc<LocalWallet>,
        registry: &ChainRegistry,
        chain_id: ChainId,
        key: &str,
    ) -> Result<Self, GatewaySetupError> {
        let chain = registry
            .by_chain_id(chain_id)
            .ok_or(GatewaySetupError::UnknownChain(chain_id))?;
        let token = chain.require_payment_token(key)?;
        Ok(Self::new(wallet, chain_id, token))
    }

    /// The token's ticker symbol.
    ///
    /// # Errors
    ///
    /// Returns the classified RPC error if the call fails.
    pub async fn symbol(&self) -> Result<String, GatewayError> {
        let provider = self.wallet.provider(self.chain_id)?;
        IERC20::new(self.token, provider)
            .symbol()
            .call()
            .await
            .map_err(|e| classify_contract_error(&e))
    }

    async fn decimals(&self) -> Result<u8, GatewayError> {
        self.decimals
            .get_or_try_init(|| async {
                let provider = self.wallet.provider(self.chain_id)?;
                IERC20::new(self.token, provider)
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| classify_contract_error(&e))
            })
            .await
            .copied()
    }
}

impl PaymentTokenGateway for Erc20PaymentToken {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn token_address(&self) -> Address {
        self.token
    }

    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "memescan.token.balance", skip(self), err)
    )]
    async fn balance(&self, owner: Address) -> Result<TokenBalance, GatewayError> {
        self.wallet.ensure_active(self.chain_id)?;
        let provider = self.wallet.provider(self.chain_id)?;
        let amount = IERC20::new(self.token, provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| classify_contract_error(&e))?;
        let decimals = self.decimals().await?;
        Ok(TokenBalance { amount, decimals })
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, GatewayError> {
        self.wallet.ensure_active(self.chain_id)?;
        let provider = self.wallet.provider(self.chain_id)?;
        IERC20::new(self.token, provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| classify_contract_error(&e))
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<TxHash, GatewayError> {
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        let summary = if amount == U256::MAX {
            format!("Approve unlimited spending of {} by {spender}", self.token)
        } else {
            format!("Approve {amount} base units of {} for {spender}", self.token)
        };
        self.wallet
            .send_call(self.chain_id, self.token, calldata.into(), summary)
            .await
    }

    async fn wait_mined(&self, transaction: TxHash) -> Result<MinedTransaction, GatewayError> {
        self.wallet.wait_mined(self.chain_id, transaction).await
    }
}

/// The deployed scan purchase contract.
#[derive(Debug)]
pub struct ScanPurchaseContract {
    wallet: Arc<LocalWallet>,
    chain_id: ChainId,
    contract: Address,
}

impl ScanPurchaseContract {
    /// Wraps the contract at `contract` on `chain_id`.
    #[must_use]
    pub const fn new(wallet: Arc<LocalWallet>, chain_id: ChainId, contract: Address) -> Self {
        Self {
            wallet,
            chain_id,
            contract,
        }
    }

    /// Looks up the purchase contract deployed on `chain_id`.
    ///
    /// # Errors
    ///
    /// Fails if the chain is unknown or has no purchase contract.
    pub fn from_registry(
        wallet: Arc<LocalWallet>,
        registry: &ChainRegistry,
        chain_id: ChainId,
    ) -> Result<Self, GatewaySetupError> {
        let chain = registry
            .by_chain_id(chain_id)
            .ok_or(GatewaySetupError::UnknownChain(chain_id))?;
        let contract = chain.require_purchase_contract()?;
        Ok(Self::new(wallet, chain_id, contract))
    }
}

/// Encodes the purchase call for `request.tier`.
#[must_use]
pub fn purchase_calldata(request: &PurchaseRequest) -> Bytes {
    let token_chain_id = U256::from(request.token_chain_id);
    let encoded = match request.tier {
        ScanTier::Basic => IScanPurchase::purchaseBasicScanCall {
            tokenAddress: request.token_address,
            tokenChainId: token_chain_id,
            paymentToken: request.payment_token,
            referrer: request.referrer,
        }
        .abi_encode(),
        ScanTier::Full => IScanPurchase::purchaseFullScanCall {
            tokenAddress: request.token_address,
            tokenChainId: token_chain_id,
            paymentToken: request.payment_token,
            referrer: request.referrer,
        }
        .abi_encode(),
    };
    encoded.into()
}

impl PurchaseGateway for ScanPurchaseContract {
    fn contract_address(&self) -> Address {
        self.contract
    }

    async fn tier_price(&self, tier: ScanTier) -> Result<UsdPrice, GatewayError> {
        let provider = self.wallet.provider(self.chain_id)?;
        let contract = IScanPurchase::new(self.contract, provider);
        let cents = match tier {
            ScanTier::Basic => contract.BASIC_SCAN_PRICE_USD().call().await,
            ScanTier::Full => contract.FULL_SCAN_PRICE_USD().call().await,
        }
        .map_err(|e| classify_contract_error(&e))?;
        let cents = u64::try_from(cents)
            .map_err(|_| GatewayError::Rpc(format!("{tier} price {cents} out of range")))?;
        Ok(UsdPrice::from_cents(cents))
    }

    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "memescan.purchase.submit", skip_all, fields(tier = %request.tier, token = %request.token_address), err)
    )]
    async fn submit_purchase(&self, request: &PurchaseRequest) -> Result<TxHash, GatewayError> {
        let summary = format!(
            "Purchase {} scan of {} (chain {})",
            request.tier, request.token_address, request.token_chain_id
        );
        self.wallet
            .send_call(self.chain_id, self.contract, purchase_calldata(request), summary)
            .await
    }

    async fn wait_mined(&self, transaction: TxHash) -> Result<MinedTransaction, GatewayError> {
        self.wallet.wait_mined(self.chain_id, transaction).await
    }
}
