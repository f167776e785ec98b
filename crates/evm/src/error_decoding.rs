//! Classification of JSON-RPC failures.
//!
//! Wallets signal "the account holder said no" with EIP-1193 code 4001.
//! Nodes signal a failed `eth_call` with revert data attached to the error
//! payload. Everything else is passed through as a transport error.

use alloy::rpc::json_rpc::ErrorPayload;
use alloy::sol_types::decode_revert_reason;
use alloy::transports::{RpcError, TransportErrorKind};
use tracing::debug;

use crate::EvmError;

/// EIP-1193 `userRejectedRequest`.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Maps a raw RPC error onto the [`EvmError`] variant callers branch on.
pub fn classify_rpc_error(error: RpcError<TransportErrorKind>) -> EvmError {
    let Some(payload) = error.as_error_resp() else {
        return EvmError::Transport(error);
    };

    if is_user_rejection(payload) {
        debug!(code = payload.code, message = %payload.message, "Request rejected by user");
        return EvmError::UserRejected;
    }

    if let Some(reason) = revert_reason(payload) {
        return EvmError::Revert { reason };
    }

    EvmError::Transport(error)
}

fn is_user_rejection(payload: &ErrorPayload) -> bool {
    payload.code == USER_REJECTED_CODE
        || payload
            .message
            .to_ascii_lowercase()
            .starts_with("user rejected")
}

fn revert_reason(payload: &ErrorPayload) -> Option<String> {
    let data = payload.as_revert_data()?;

    match decode_revert_reason(&data) {
        Some(reason) => Some(reason),
        None => {
            debug!(%data, "Failed to decode revert data");
            Some(payload.message.to_string())
        }
    }
}
