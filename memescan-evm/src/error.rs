//! Classification of JSON-RPC failures.
//!
//! Nodes and wallets report the interesting failures (a declined signature,
//! missing gas funds, a revert) as JSON-RPC error responses. These are mapped
//! onto [`GatewayError`] so that the orchestrator can tell them apart without
//! knowing anything about alloy.

use alloy_json_rpc::ErrorPayload;
use alloy_provider::PendingTransactionError;
use alloy_sol_types::{GenericContractError, GenericRevertReason};
use alloy_transport::TransportError;
use memescan::gateway::GatewayError;

/// EIP-1193 code for a request the user rejected.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Code geth and most nodes use for `execution reverted` with data.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Maps a JSON-RPC error response onto a gateway error.
#[must_use]
pub fn classify_error_payload(payload: &ErrorPayload) -> GatewayError {
    let message = payload.message.to_ascii_lowercase();
    if payload.code == USER_REJECTED_CODE
        || message.contains("user rejected")
        || message.contains("user denied")
    {
        return GatewayError::UserRejected;
    }
    if message.contains("insufficient funds") {
        return GatewayError::InsufficientFunds(payload.message.to_string());
    }
    if let Some(data) = payload.as_revert_data() {
        return GatewayError::Reverted {
            reason: decode_revert_data(&data),
            transaction: None,
        };
    }
    if payload.code == EXECUTION_REVERTED_CODE || message.contains("execution reverted") {
        return GatewayError::Reverted {
            reason: revert_reason_from_message(&payload.message),
            transaction: None,
        };
    }
    GatewayError::Rpc(payload.to_string())
}

/// Maps a transport failure onto a gateway error.
#[must_use]
pub fn classify_transport_error(error: &TransportError) -> GatewayError {
    match error.as_error_resp() {
        Some(payload) => classify_error_payload(payload),
        None => GatewayError::Rpc(error.to_string()),
    }
}

/// Maps a contract call failure onto a gateway error.
#[must_use]
pub fn classify_contract_error(error: &alloy_contract::Error) -> GatewayError {
    match error {
        alloy_contract::Error::TransportError(e) => classify_transport_error(e),
        alloy_contract::Error::PendingTransactionError(e) => classify_pending_error(e),
        other => GatewayError::Rpc(other.to_string()),
    }
}

/// Maps a failure while watching a pending transaction onto a gateway error.
#[must_use]
pub fn classify_pending_error(error: &PendingTransactionError) -> GatewayError {
    match error {
        PendingTransactionError::TransportError(e) => classify_transport_error(e),
        other => GatewayError::Rpc(other.to_string()),
    }
}

/// The reason string of an `Error(string)` revert, or a description of other payloads.
fn decode_revert_data(data: &[u8]) -> Option<String> {
    match GenericRevertReason::decode(data)? {
        GenericRevertReason::ContractError(GenericContractError::Revert(revert)) => {
            Some(revert.reason)
        }
        GenericRevertReason::RawString(reason) => Some(reason),
        other => Some(other.to_string()),
    }
}

/// Pulls the human reason out of `execution reverted: <reason>`.
fn revert_reason_from_message(message: &str) -> Option<String> {
    message
        .split_once(':')
        .map(|(_, reason)| reason.trim())
        .filter(|reason| !reason.is_empty())
        .map(str::to_owned)
}
