//! EVM chain interaction seams for the vault console.
//!
//! Two traits separate what the console needs from a node and a wallet:
//!
//! - [`Evm`]: read-only `eth_call` access, plus [`Evm::read`] which
//!   encodes a `sol!` call and decodes its return value.
//!
//! - [`Wallet`]: extends `Evm` with the signing account and splits a
//!   write into its two observable halves: [`Wallet::broadcast`] resolves
//!   once the wallet has accepted (or refused) the transaction, and
//!   [`Wallet::confirm`] resolves once the transaction is mined.
//!
//! A caller shows "pending" between the two. A refusal by the account
//! holder surfaces as [`EvmError::UserRejected`], apart from real failures.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::Provider;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

pub mod error_decoding;
pub mod rpc;

pub use error_decoding::{USER_REJECTED_CODE, classify_rpc_error};
pub use rpc::RpcWallet;

/// Errors that can occur during EVM operations.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("user rejected the request")]
    UserRejected,
    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
    #[error("execution reverted: {reason}")]
    Revert { reason: String },
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: TxHash },
    #[error("failed to decode return data: {0}")]
    Decode(#[from] alloy::sol_types::Error),
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(#[from] alloy::signers::k256::ecdsa::Error),
}

impl EvmError {
    pub const fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected)
    }
}

/// Inclusion of a transaction in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// Blocks on top of (and including) the inclusion block.
    pub confirmations: u64,
}

/// Read-only EVM chain access.
#[async_trait]
pub trait Evm: Send + Sync + 'static {
    /// Execute a view call against `contract`.
    async fn call(&self, contract: Address, calldata: Bytes) -> Result<Bytes, EvmError>;

    /// Encode `call`, execute it and decode the return value.
    async fn read<C>(&self, contract: Address, call: C) -> Result<C::Return, EvmError>
    where
        C: SolCall + Send + 'static,
    {
        let output = self.call(contract, Bytes::from(call.abi_encode())).await?;
        Ok(C::abi_decode_returns(&output)?)
    }
}

/// Signing account on an EVM chain.
#[async_trait]
pub trait Wallet: Evm {
    /// Returns the address this wallet signs transactions from.
    fn address(&self) -> Address;

    /// Hand a contract call to the wallet for signing and broadcast.
    ///
    /// - `contract`: target contract address
    /// - `calldata`: ABI-encoded function call
    /// - `note`: human-readable operation description for logs
    ///
    /// Returns the transaction hash as soon as the network accepted it.
    async fn broadcast(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError>;

    /// Wait until `tx_hash` is mined with at least one confirmation.
    ///
    /// A mined but failed transaction is [`EvmError::Reverted`].
    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation, EvmError>;
}

#[async_trait]
impl<T: Evm> Evm for Arc<T> {
    async fn call(&self, contract: Address, calldata: Bytes) -> Result<Bytes, EvmError> {
        (**self).call(contract, calldata).await
    }
}

#[async_trait]
impl<T: Wallet> Wallet for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn broadcast(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError> {
        (**self).broadcast(contract, calldata, note).await
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation, EvmError> {
        (**self).confirm(tx_hash).await
    }
}

/// Read-only access through any alloy provider.
pub struct RpcEvm<P> {
    provider: P,
}

impl<P> RpcEvm<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> Evm for RpcEvm<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn call(&self, contract: Address, calldata: Bytes) -> Result<Bytes, EvmError> {
        rpc::view_call(&self.provider, contract, calldata).await
    }
}
