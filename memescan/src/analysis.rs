//! Boundary to the off-chain analysis backend.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::proto::{PurchaseReceipt, ScanReport, ScanTier};

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Token to analyse.
    pub address: Address,
    /// Chain the token lives on.
    pub chain_id: ChainId,
    /// Tier that was paid for.
    pub scan_type: ScanTier,
    /// Hash of the mined purchase; the backend consumes each hash once.
    pub tx_hash: TxHash,
    /// The paying account.
    pub buyer_address: Address,
}

impl From<&PurchaseReceipt> for AnalysisRequest {
    fn from(receipt: &PurchaseReceipt) -> Self {
        Self {
            address: receipt.token_address,
            chain_id: receipt.chain_id,
            scan_type: receipt.tier,
            tx_hash: receipt.transaction_hash,
            buyer_address: receipt.buyer,
        }
    }
}

/// Why an analysis request did not produce a report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// The backend received the request and declined it.
    #[error("analysis rejected: {message}")]
    Rejected {
        /// HTTP status, when the rejection came from one.
        status: Option<u16>,
        /// Backend-supplied explanation.
        message: String,
    },
    /// The backend could not be reached or did not answer usefully.
    #[error("analysis backend unavailable: {0}")]
    Transient(String),
}

impl AnalysisError {
    /// Whether resubmitting the same receipt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The off-chain analysis engine.
///
/// Implementations must not retry on their own; retry policy belongs to the caller.
pub trait AnalysisClient: Send + Sync {
    /// Exchanges a purchase receipt for a report.
    fn request_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> impl Future<Output = Result<ScanReport, AnalysisError>> + Send;
}

impl<T: AnalysisClient> AnalysisClient for Arc<T> {
    fn request_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> impl Future<Output = Result<ScanReport, AnalysisError>> + Send {
        (**self).request_analysis(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;
    use serde_json::json;

    #[test]
    fn request_body_matches_backend_contract() {
        let receipt = PurchaseReceipt {
            transaction_hash: b256!(
                "2222222222222222222222222222222222222222222222222222222222222222"
            ),
            buyer: Address::repeat_byte(0xb0),
            token_address: Address::repeat_byte(0xa0),
            chain_id: 42161,
            tier: ScanTier::Full,
        };
        let body = serde_json::to_value(AnalysisRequest::from(&receipt)).unwrap();
        assert_eq!(body["chain_id"], json!(42161));
        assert_eq!(body["scan_type"], json!("full"));
        assert_eq!(
            body["tx_hash"],
            json!(format!("{}", receipt.transaction_hash))
        );
        assert!(body.get("buyer_address").is_some());
        assert!(body.get("address").is_some());
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(AnalysisError::Transient("timeout".into()).is_retryable());
        assert!(
            !AnalysisError::Rejected {
                status: Some(400),
                message: "used".into()
            }
            .is_retryable()
        );
    }
}
