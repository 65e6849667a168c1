//! Boundaries to the two contracts a purchase touches.
//!
//! - [`PaymentTokenGateway`] wraps one ERC-20 payment token on one chain.
//! - [`PurchaseGateway`] wraps the scan purchase contract.
//!
//! Both split "send" from "wait until mined" so callers can observe the
//! difference between a transaction that was signed and one that landed.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};

use crate::amount::UsdPrice;
use crate::chain::ChainId;
use crate::proto::ScanTier;

/// Errors reported by the chain-facing gateways.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The wallet is on a different chain than the gateway serves.
    #[error("wallet is on chain {actual}, expected {expected}")]
    ChainMismatch {
        /// Chain the gateway serves.
        expected: ChainId,
        /// Chain the wallet is on.
        actual: ChainId,
    },
    /// The user declined to sign.
    #[error("transaction rejected by user")]
    UserRejected,
    /// The account cannot pay for gas.
    #[error("insufficient funds for gas: {0}")]
    InsufficientFunds(String),
    /// The call reverted, either during estimation or after mining.
    #[error("execution reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        /// Decoded revert reason, if any.
        reason: Option<String>,
        /// The mined transaction, if the revert happened on-chain.
        transaction: Option<TxHash>,
    },
    /// Any other RPC or transport failure.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// A token balance with the decimals needed to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
    /// Amount in base units.
    pub amount: U256,
    /// Token decimals.
    pub decimals: u8,
}

/// A transaction that has been mined successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinedTransaction {
    /// The transaction hash.
    pub transaction_hash: TxHash,
    /// Block it was included in, when the node reports it.
    pub block_number: Option<u64>,
}

/// One ERC-20 payment token on one chain.
pub trait PaymentTokenGateway: Send + Sync {
    /// Chain the token lives on.
    fn chain_id(&self) -> ChainId;

    /// The token contract.
    fn token_address(&self) -> Address;

    /// Balance of `owner`, with the token's decimals.
    ///
    /// Fails with [`GatewayError::ChainMismatch`] if the wallet is on another chain.
    fn balance(
        &self,
        owner: Address,
    ) -> impl Future<Output = Result<TokenBalance, GatewayError>> + Send;

    /// Amount `spender` may pull from `owner`.
    fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, GatewayError>> + Send;

    /// Submits an approval. Returns once the transaction is accepted for sending.
    fn approve(
        &self,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, GatewayError>> + Send;

    /// Waits, without a deadline, until `transaction` is mined.
    ///
    /// Fails with [`GatewayError::Reverted`] if it was mined but reverted.
    fn wait_mined(
        &self,
        transaction: TxHash,
    ) -> impl Future<Output = Result<MinedTransaction, GatewayError>> + Send;
}

/// Arguments of a purchase call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Token to be analysed.
    pub token_address: Address,
    /// Chain that token lives on; may differ from the settlement chain.
    pub token_chain_id: ChainId,
    /// Stablecoin used to pay.
    pub payment_token: Address,
    /// Tier being bought.
    pub tier: ScanTier,
    /// Referral address; zero when there is none.
    pub referrer: Address,
}

/// The scan purchase contract.
pub trait PurchaseGateway: Send + Sync {
    /// The contract that pulls the payment, and therefore the approval spender.
    fn contract_address(&self) -> Address;

    /// Current USD price of `tier`, read from the contract.
    fn tier_price(
        &self,
        tier: ScanTier,
    ) -> impl Future<Output = Result<UsdPrice, GatewayError>> + Send;

    /// Signs and sends the purchase. Returns once the transaction is accepted for sending.
    fn submit_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> impl Future<Output = Result<TxHash, GatewayError>> + Send;

    /// Waits, without a deadline, until `transaction` is mined.
    fn wait_mined(
        &self,
        transaction: TxHash,
    ) -> impl Future<Output = Result<MinedTransaction, GatewayError>> + Send;

    /// Submits a purchase and waits until it is mined.
    fn purchase(
        &self,
        request: &PurchaseRequest,
    ) -> impl Future<Output = Result<MinedTransaction, GatewayError>> + Send {
        async move {
            let hash = self.submit_purchase(request).await?;
            self.wait_mined(hash).await
        }
    }
}

impl<T: PaymentTokenGateway> PaymentTokenGateway for Arc<T> {
    fn chain_id(&self) -> ChainId {
        (**self).chain_id()
    }

    fn token_address(&self) -> Address {
        (**self).token_address()
    }

    fn balance(
        &self,
        owner: Address,
    ) -> impl Future<Output = Result<TokenBalance, GatewayError>> + Send {
        (**self).balance(owner)
    }

    fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, GatewayError>> + Send {
        (**self).allowance(owner, spender)
    }

    fn approve(
        &self,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, GatewayError>> + Send {
        (**self).approve(spender, amount)
    }

    fn wait_mined(
        &self,
        transaction: TxHash,
    ) -> impl Future<Output = Result<MinedTransaction, GatewayError>> + Send {
        (**self).wait_mined(transaction)
    }
}

impl<T: PurchaseGateway> PurchaseGateway for Arc<T> {
    fn contract_address(&self) -> Address {
        (**self).contract_address()
    }

    fn tier_price(
        &self,
        tier: ScanTier,
    ) -> impl Future<Output = Result<UsdPrice, GatewayError>> + Send {
        (**self).tier_price(tier)
    }

    fn submit_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> impl Future<Output = Result<TxHash, GatewayError>> + Send {
        (**self).submit_purchase(request)
    }

    fn wait_mined(
        &self,
        transaction: TxHash,
    ) -> impl Future<Output = Result<MinedTransaction, GatewayError>> + Send {
        (**self).wait_mined(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPurchase;

    #[tokio::test]
    async fn purchase_submits_then_waits() {
        let gateway = MockPurchase::new(UsdPrice::from_cents(100));
        let request = PurchaseRequest {
            token_address: Address::repeat_byte(0xa0),
            token_chain_id: 1,
            payment_token: Address::repeat_byte(0xc0),
            tier: ScanTier::Basic,
            referrer: Address::ZERO,
        };
        let mined = gateway.purchase(&request).await.unwrap();
        assert_eq!(gateway.purchases(), vec![request]);
        assert_eq!(Some(mined.transaction_hash), gateway.last_hash());
    }

    #[test]
    fn revert_display_without_reason() {
        let err = GatewayError::Reverted {
            reason: None,
            transaction: None,
        };
        assert_eq!(err.to_string(), "execution reverted: no reason given");
    }
}
