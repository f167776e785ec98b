//! JSON-RPC backed wallet.
//!
//! `RpcWallet` wraps an alloy provider with an embedded `EthereumWallet`
//! and signs locally. Confirmation is observed by polling for the receipt
//! so that broadcast and inclusion stay two separate steps.

use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder, WalletProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::{Confirmation, Evm, EvmError, Wallet, classify_rpc_error};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) async fn view_call<P: Provider>(
    provider: &P,
    contract: Address,
    calldata: Bytes,
) -> Result<Bytes, EvmError> {
    let tx = TransactionRequest::default()
        .to(contract)
        .input(calldata.into());

    provider.call(tx).await.map_err(classify_rpc_error)
}

/// Number of blocks a transaction mined in `block` has at chain head `head`.
fn confirmations_at(head: u64, block: u64) -> u64 {
    head.saturating_sub(block) + 1
}

/// Wallet that signs with a local key and talks to a node over JSON-RPC.
///
/// Wraps a provider that includes a wallet filler (e.g. built with
/// `ProviderBuilder::new().wallet(wallet).connect_http(...)`). The signing
/// address is the provider's default signer.
pub struct RpcWallet<P> {
    provider: P,
    required_confirmations: u64,
    poll_interval: Duration,
}

impl<P> RpcWallet<P> {
    pub fn new(provider: P, required_confirmations: u64) -> Self {
        Self {
            provider,
            required_confirmations: required_confirmations.max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Builds an HTTP wallet signing with `private_key`.
pub fn connect_http(
    rpc_url: Url,
    private_key: &B256,
    required_confirmations: u64,
) -> Result<RpcWallet<impl Provider + WalletProvider + Clone + 'static>, EvmError> {
    let signer = PrivateKeySigner::from_bytes(private_key)?;
    info!(address = %signer.address(), %rpc_url, "Connecting wallet");

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url);

    Ok(RpcWallet::new(provider, required_confirmations))
}

#[async_trait]
impl<P> Evm for RpcWallet<P>
where
    P: Provider + WalletProvider + Clone + Send + Sync + 'static,
{
    async fn call(&self, contract: Address, calldata: Bytes) -> Result<Bytes, EvmError> {
        view_call(&self.provider, contract, calldata).await
    }
}

#[async_trait]
impl<P> Wallet for RpcWallet<P>
where
    P: Provider + WalletProvider + Clone + Send + Sync + 'static,
{
    fn address(&self) -> Address {
        self.provider.default_signer_address()
    }

    async fn broadcast(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError> {
        info!(%contract, note, "Submitting contract call");

        let tx = TransactionRequest::default()
            .to(contract)
            .input(calldata.into());

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(classify_rpc_error)?;

        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, note, "Transaction submitted");

        Ok(tx_hash)
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation, EvmError> {
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;

            let Some(receipt) = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(classify_rpc_error)?
            else {
                debug!(%tx_hash, "Receipt not available yet");
                continue;
            };

            if !receipt.status() {
                warn!(%tx_hash, "Transaction reverted");
                return Err(EvmError::Reverted { tx_hash });
            }

            let Some(block_number) = receipt.block_number else {
                continue;
            };

            let head = self
                .provider
                .get_block_number()
                .await
                .map_err(classify_rpc_error)?;
            let confirmations = confirmations_at(head, block_number);

            if confirmations >= self.required_confirmations {
                info!(%tx_hash, block_number, confirmations, "Transaction confirmed");
                return Ok(Confirmation {
                    tx_hash,
                    block_number: Some(block_number),
                    confirmations,
                });
            }

            debug!(
                %tx_hash,
                confirmations,
                required = self.required_confirmations,
                "Waiting for confirmations"
            );
        }
    }
}
