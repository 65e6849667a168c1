//! Failure taxonomy of a scan purchase.
//!
//! Every failed attempt surfaces exactly one [`FailureReason`], which falls in
//! exactly one [`ErrorCategory`]. The category tells the caller what happened to
//! the user's money:
//!
//! | Category         | Chain touched | Payment made |
//! |------------------|---------------|--------------|
//! | `Precondition`   | no            | no           |
//! | `UserDeclined`   | no            | no           |
//! | `ChainExecution` | maybe         | no           |
//! | `PostPayment`    | yes           | yes          |
//! | `Transient`      | yes           | yes, or unknown |
//!
//! Post-payment and transient failures carry the [`PurchaseReceipt`] so the analysis can be
//! retried with the same transaction hash. When the purchase was broadcast but its
//! confirmation could not be read, the receipt is carried as unconfirmed: the user
//! may or may not have paid.

use std::fmt::{self, Display, Formatter};

use alloy_primitives::{TxHash, U256};

use crate::chain::ChainId;
use crate::proto::PurchaseReceipt;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A check failed before anything was signed.
    Precondition,
    /// The user declined a wallet prompt.
    UserDeclined,
    /// A transaction failed or reverted; no payment was taken.
    ChainExecution,
    /// Payment succeeded but the backend declined to produce a report.
    PostPayment,
    /// The backend could not be reached after payment, or the purchase was sent
    /// but its confirmation could not be read; retryable.
    Transient,
}

/// Why a scan purchase attempt stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// The token address is malformed.
    #[error("invalid token address: {0}")]
    InvalidAddress(String),
    /// No wallet is available.
    #[error("no wallet available")]
    NoWallet,
    /// A wallet exists but no account is connected.
    #[error("wallet is not connected")]
    WalletNotConnected,
    /// The wallet is on the wrong chain. A switch was requested; retry afterwards.
    #[error("wallet is on chain {actual}, switch to chain {expected} and retry")]
    WrongChain {
        /// The settlement chain.
        expected: ChainId,
        /// The wallet's chain.
        actual: ChainId,
    },
    /// The payment token balance does not cover the price.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        /// Base units needed.
        required: U256,
        /// Base units held.
        available: U256,
    },
    /// Another attempt is running.
    #[error("a scan purchase is already in progress")]
    ScanInProgress,
    /// The user declined to sign.
    #[error("request rejected by user")]
    UserRejected,
    /// The approval transaction failed.
    #[error("approval failed: {0}")]
    ApprovalFailed(String),
    /// The account cannot pay for gas.
    #[error("insufficient funds for gas: {0}")]
    InsufficientFunds(String),
    /// The purchase failed on-chain or could not be read.
    #[error("transaction failed: {0}")]
    ChainExecutionFailed(String),
    /// The purchase was broadcast but waiting for it to be mined failed.
    #[error("purchase sent but its confirmation could not be read: {0}")]
    PurchaseUnconfirmed(String),
    /// The backend declined the analysis after payment.
    #[error("analysis rejected: {0}")]
    AnalysisRejected(String),
    /// The backend could not be reached after payment.
    #[error("analysis backend unreachable: {0}")]
    AnalysisUnreachable(String),
}

impl FailureReason {
    /// The category this reason belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAddress(_)
            | Self::NoWallet
            | Self::WalletNotConnected
            | Self::WrongChain { .. }
            | Self::InsufficientBalance { .. }
            | Self::ScanInProgress => ErrorCategory::Precondition,
            Self::UserRejected => ErrorCategory::UserDeclined,
            Self::ApprovalFailed(_) | Self::InsufficientFunds(_) | Self::ChainExecutionFailed(_) => {
                ErrorCategory::ChainExecution
            }
            Self::AnalysisRejected(_) => ErrorCategory::PostPayment,
            Self::AnalysisUnreachable(_) | Self::PurchaseUnconfirmed(_) => {
                ErrorCategory::Transient
            }
        }
    }

    /// Whether resubmitting the same receipt to the backend may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AnalysisUnreachable(_) | Self::PurchaseUnconfirmed(_)
        )
    }
}

/// A failed scan purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    reason: FailureReason,
    receipt: Option<PurchaseReceipt>,
    unconfirmed: Option<PurchaseReceipt>,
    transaction: Option<TxHash>,
}

impl ScanError {
    /// A failure before or without payment.
    #[must_use]
    pub const fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            receipt: None,
            unconfirmed: None,
            transaction: None,
        }
    }

    /// A failure after payment, carrying the receipt.
    #[must_use]
    pub fn after_payment(reason: FailureReason, receipt: PurchaseReceipt) -> Self {
        Self {
            transaction: Some(receipt.transaction_hash),
            reason,
            receipt: Some(receipt),
            unconfirmed: None,
        }
    }

    /// A failure after the purchase was broadcast, when it is unknown whether it was mined.
    ///
    /// `receipt` is what the purchase yields if it was mined.
    #[must_use]
    pub fn payment_unconfirmed(reason: FailureReason, receipt: PurchaseReceipt) -> Self {
        Self {
            transaction: Some(receipt.transaction_hash),
            reason,
            receipt: None,
            unconfirmed: Some(receipt),
        }
    }

    /// Attaches the hash of a transaction that was sent but failed.
    #[must_use]
    pub const fn with_transaction(mut self, transaction: Option<TxHash>) -> Self {
        self.transaction = transaction;
        self
    }

    /// The reason.
    #[must_use]
    pub const fn reason(&self) -> &FailureReason {
        &self.reason
    }

    /// The category of the reason.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.reason.category()
    }

    /// The purchase receipt, present for post-payment failures.
    #[must_use]
    pub const fn receipt(&self) -> Option<&PurchaseReceipt> {
        self.receipt.as_ref()
    }

    /// The receipt of a purchase that was sent but not seen mined.
    #[must_use]
    pub const fn unconfirmed_receipt(&self) -> Option<&PurchaseReceipt> {
        self.unconfirmed.as_ref()
    }

    /// The receipt to hand to a retry, confirmed or not.
    #[must_use]
    pub const fn retry_receipt(&self) -> Option<&PurchaseReceipt> {
        match &self.receipt {
            Some(receipt) => Some(receipt),
            None => self.unconfirmed.as_ref(),
        }
    }

    /// Hash of the transaction involved, if one was sent.
    #[must_use]
    pub const fn transaction(&self) -> Option<&TxHash> {
        self.transaction.as_ref()
    }

    /// Whether the user has paid.
    #[must_use]
    pub const fn payment_succeeded(&self) -> bool {
        self.receipt.is_some()
    }

    /// Whether the user may have paid: the purchase was sent but not seen mined.
    #[must_use]
    pub const fn payment_unknown(&self) -> bool {
        self.unconfirmed.is_some()
    }

    /// Whether [`crate::orchestrator::ScanPurchaseOrchestrator::retry_analysis`] may help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.reason.is_retryable() && self.retry_receipt().is_some()
    }
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.receipt {
            Some(receipt) => write!(
                f,
                "payment succeeded (transaction {}) but {}",
                receipt.transaction_hash, self.reason
            ),
            None => match &self.unconfirmed {
                Some(receipt) => write!(
                    f,
                    "payment status unknown (transaction {}): {}",
                    receipt.transaction_hash, self.reason
                ),
                None => Display::fmt(&self.reason, f),
            },
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

impl From<FailureReason> for ScanError {
    fn from(reason: FailureReason) -> Self {
        Self::new(reason)
    }
}
