//! Shared test fixtures: an in-memory chain holding one ERC-20 asset and
//! one vault, with a wallet whose outcomes can be scripted per broadcast.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes, TxHash, U256, address, hex, keccak256};
use alloy::sol_types::{SolCall, SolInterface};
use alloy::transports::TransportErrorKind;
use async_trait::async_trait;
use tracing::debug;

use coinflakes_evm::{Confirmation, Evm, EvmError, Wallet};

use crate::bindings::ICoinflakesVault::{self, ICoinflakesVaultCalls};
use crate::bindings::IERC20::{self, IERC20Calls};

pub(crate) const ASSET: Address = address!("0xa55e700000000000000000000000000000000001");
pub(crate) const VAULT: Address = address!("0xc0f1a00000000000000000000000000000000002");
pub(crate) const SHAREHOLDER: Address = address!("0x5ba2e00000000000000000000000000000000003");
pub(crate) const MANAGER: Address = address!("0x3a7a600000000000000000000000000000000004");
pub(crate) const OUTSIDER: Address = address!("0x0075d00000000000000000000000000000000005");
const SEED_HOLDER: Address = address!("0x5eed000000000000000000000000000000000006");

/// `value` whole tokens at 18 decimals.
pub(crate) fn units(value: u64) -> U256 {
    U256::from(value) * U256::from(10u64).pow(U256::from(18u64))
}

/// What the scripted wallet does with the next broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Confirm,
    Reject,
    FailBroadcast,
    Revert,
}

struct Ledger {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    supplies: HashMap<Address, U256>,
    assets_in_use: U256,
    manager: Address,
    shareholders: HashSet<Address>,
}

impl Ledger {
    fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn supply(&self, token: Address) -> U256 {
        self.supplies.get(&token).copied().unwrap_or_default()
    }

    fn set_balance(&mut self, token: Address, holder: Address, amount: U256) {
        let previous = self.balance(token, holder);
        let supply = self.supply(token) - previous + amount;
        self.supplies.insert(token, supply);
        self.balances.insert((token, holder), amount);
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), String> {
        let from_balance = self.balance(token, from);
        if from_balance < amount {
            return Err(format!("transfer amount exceeds balance of {from}"));
        }

        self.balances.insert((token, from), from_balance - amount);
        let to_balance = self.balance(token, to);
        self.balances.insert((token, to), to_balance + amount);
        Ok(())
    }

    fn spend_allowance(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), String> {
        let allowance = self.allowance(token, owner, spender);
        if allowance < amount {
            return Err("insufficient allowance".to_owned());
        }

        self.allowances
            .insert((token, owner, spender), allowance - amount);
        Ok(())
    }

    fn mint(&mut self, token: Address, to: Address, amount: U256) {
        let balance = self.balance(token, to);
        self.set_balance(token, to, balance + amount);
    }

    fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<(), String> {
        let balance = self.balance(token, from);
        if balance < amount {
            return Err("burn amount exceeds balance".to_owned());
        }

        self.set_balance(token, from, balance - amount);
        Ok(())
    }

    fn liquid_assets(&self) -> U256 {
        self.balance(ASSET, VAULT)
    }

    fn total_assets(&self) -> U256 {
        self.liquid_assets() + self.assets_in_use
    }

    fn convert_to_assets(&self, shares: U256, round_up: bool) -> U256 {
        let supply = self.supply(VAULT);
        if supply.is_zero() {
            return shares;
        }

        let product = shares * self.total_assets();
        if round_up {
            product.div_ceil(supply)
        } else {
            product / supply
        }
    }

    fn convert_to_shares(&self, assets: U256, round_up: bool) -> U256 {
        let supply = self.supply(VAULT);
        let total = self.total_assets();
        if supply.is_zero() || total.is_zero() {
            return assets;
        }

        let product = assets * supply;
        if round_up {
            product.div_ceil(total)
        } else {
            product / total
        }
    }

    fn require_manager(&self, caller: Address) -> Result<(), String> {
        if caller == self.manager {
            Ok(())
        } else {
            Err("caller is not the manager".to_owned())
        }
    }

    fn require_shareholder(&self, caller: Address) -> Result<(), String> {
        if self.shareholders.contains(&caller) {
            Ok(())
        } else {
            Err("caller is not a shareholder".to_owned())
        }
    }

    fn view_vault(&self, call: ICoinflakesVaultCalls) -> Result<Vec<u8>, String> {
        use ICoinflakesVault::*;

        Ok(match call {
            ICoinflakesVaultCalls::asset(_) => assetCall::abi_encode_returns(&ASSET),
            ICoinflakesVaultCalls::totalAssets(_) => {
                totalAssetsCall::abi_encode_returns(&self.total_assets())
            }
            ICoinflakesVaultCalls::assetsInUse(_) => {
                assetsInUseCall::abi_encode_returns(&self.assets_in_use)
            }
            ICoinflakesVaultCalls::convertToAssets(call) => convertToAssetsCall::abi_encode_returns(
                &self.convert_to_assets(call.shares, false),
            ),
            ICoinflakesVaultCalls::maxRedeem(call) => {
                maxRedeemCall::abi_encode_returns(&self.balance(VAULT, call.owner))
            }
            ICoinflakesVaultCalls::maxWithdraw(call) => {
                let owned = self.convert_to_assets(self.balance(VAULT, call.owner), false);
                maxWithdrawCall::abi_encode_returns(&owned.min(self.liquid_assets()))
            }
            ICoinflakesVaultCalls::manager(_) => managerCall::abi_encode_returns(&self.manager),
            ICoinflakesVaultCalls::isShareholder(call) => {
                isShareholderCall::abi_encode_returns(&self.shareholders.contains(&call.account))
            }
            other => return Err(format!("not a view: 0x{}", hex::encode(other.selector()))),
        })
    }

    fn view_erc20(&self, token: Address, call: IERC20Calls) -> Result<Vec<u8>, String> {
        use IERC20::*;

        let (name, symbol) = if token == ASSET {
            ("Test Asset", "TST")
        } else if token == VAULT {
            ("Coinflakes Vault", "CFV")
        } else {
            return Err(format!("no contract at {token}"));
        };

        Ok(match call {
            IERC20Calls::name(_) => nameCall::abi_encode_returns(&name.to_owned()),
            IERC20Calls::symbol(_) => symbolCall::abi_encode_returns(&symbol.to_owned()),
            IERC20Calls::decimals(_) => decimalsCall::abi_encode_returns(&18u8),
            IERC20Calls::totalSupply(_) => totalSupplyCall::abi_encode_returns(&self.supply(token)),
            IERC20Calls::balanceOf(call) => {
                balanceOfCall::abi_encode_returns(&self.balance(token, call.account))
            }
            IERC20Calls::allowance(call) => allowanceCall::abi_encode_returns(&self.allowance(
                token,
                call.owner,
                call.spender,
            )),
            IERC20Calls::approve(_) => return Err("not a view: approve".to_owned()),
        })
    }

    fn execute(&mut self, caller: Address, target: Address, calldata: &Bytes) -> Result<(), String> {
        if target == VAULT
            && let Ok(call) = ICoinflakesVaultCalls::abi_decode(calldata)
        {
            return self.execute_vault(caller, call);
        }

        match IERC20Calls::abi_decode(calldata).map_err(|error| error.to_string())? {
            IERC20Calls::approve(call) => {
                self.allowances
                    .insert((target, caller, call.spender), call.amount);
                Ok(())
            }
            other => Err(format!("unsupported write: 0x{}", hex::encode(other.selector()))),
        }
    }

    fn execute_vault(&mut self, caller: Address, call: ICoinflakesVaultCalls) -> Result<(), String> {
        match call {
            ICoinflakesVaultCalls::deposit(call) => {
                self.require_shareholder(caller)?;
                let shares = self.convert_to_shares(call.assets, false);
                self.spend_allowance(ASSET, caller, VAULT, call.assets)?;
                self.transfer(ASSET, caller, VAULT, call.assets)?;
                self.mint(VAULT, call.receiver, shares);
            }
            ICoinflakesVaultCalls::mint(call) => {
                self.require_shareholder(caller)?;
                let assets = self.convert_to_assets(call.shares, true);
                self.spend_allowance(ASSET, caller, VAULT, assets)?;
                self.transfer(ASSET, caller, VAULT, assets)?;
                self.mint(VAULT, call.receiver, call.shares);
            }
            ICoinflakesVaultCalls::redeem(call) => {
                if caller != call.owner {
                    self.spend_allowance(VAULT, call.owner, caller, call.shares)?;
                }
                let assets = self.convert_to_assets(call.shares, false);
                self.burn(VAULT, call.owner, call.shares)?;
                self.transfer(ASSET, VAULT, call.receiver, assets)?;
            }
            ICoinflakesVaultCalls::withdraw(call) => {
                let shares = self.convert_to_shares(call.assets, true);
                if caller != call.owner {
                    self.spend_allowance(VAULT, call.owner, caller, shares)?;
                }
                self.burn(VAULT, call.owner, shares)?;
                self.transfer(ASSET, VAULT, call.receiver, call.assets)?;
            }
            ICoinflakesVaultCalls::returnAssets(call) => {
                self.require_manager(caller)?;
                self.spend_allowance(ASSET, call.from, VAULT, call.assets)?;
                self.transfer(ASSET, call.from, VAULT, call.assets)?;
                self.assets_in_use = self.assets_in_use.saturating_sub(call.assets);
            }
            ICoinflakesVaultCalls::useAssets(call) => {
                self.require_manager(caller)?;
                self.transfer(ASSET, VAULT, call.receiver, call.assets)?;
                self.assets_in_use += call.assets;
            }
            ICoinflakesVaultCalls::setAssetsInUse(call) => {
                self.require_manager(caller)?;
                self.assets_in_use = call.assets;
            }
            ICoinflakesVaultCalls::whitelistShareholder(call) => {
                self.require_manager(caller)?;
                self.shareholders.insert(call.account);
            }
            ICoinflakesVaultCalls::revokeShareholder(call) => {
                self.require_manager(caller)?;
                self.shareholders.remove(&call.account);
            }
            other => {
                return Err(format!(
                    "not a transaction: 0x{}",
                    hex::encode(other.selector())
                ));
            }
        }

        Ok(())
    }
}

struct PendingTx {
    caller: Address,
    target: Address,
    calldata: Bytes,
    outcome: Outcome,
}

/// In-memory vault deployment plus a scripted wallet.
///
/// The default deployment prices one share at two assets (100 shares
/// backed by 200 assets, all liquid). [`SHAREHOLDER`] is the acting account
/// with 100 assets in its wallet; [`MANAGER`] manages the vault.
pub(crate) struct MockChain {
    account: Mutex<Address>,
    ledger: Mutex<Ledger>,
    script: Mutex<VecDeque<Outcome>>,
    pending: Mutex<HashMap<TxHash, PendingTx>>,
    broadcasts: Mutex<Vec<String>>,
    block: Mutex<u64>,
}

impl MockChain {
    pub(crate) fn new() -> Self {
        let mut ledger = Ledger {
            balances: HashMap::new(),
            allowances: HashMap::new(),
            supplies: HashMap::new(),
            assets_in_use: U256::ZERO,
            manager: MANAGER,
            shareholders: HashSet::from([SHAREHOLDER]),
        };
        ledger.set_balance(VAULT, SEED_HOLDER, units(100));
        ledger.set_balance(ASSET, VAULT, units(200));
        ledger.set_balance(ASSET, SHAREHOLDER, units(100));

        Self {
            account: Mutex::new(SHAREHOLDER),
            ledger: Mutex::new(ledger),
            script: Mutex::new(VecDeque::new()),
            pending: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(Vec::new()),
            block: Mutex::new(1),
        }
    }

    /// Same deployment, acting as the manager.
    pub(crate) fn as_manager() -> Self {
        let chain = Self::new();
        chain.act_as(MANAGER);
        chain
    }

    pub(crate) fn act_as(&self, account: Address) {
        *self.account.lock().unwrap() = account;
    }

    /// Queue the outcome of the next broadcast. Unscripted broadcasts
    /// confirm.
    pub(crate) fn script(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn fund(&self, holder: Address, assets: U256) {
        self.ledger.lock().unwrap().set_balance(ASSET, holder, assets);
    }

    pub(crate) fn set_shares(&self, holder: Address, shares: U256) {
        self.ledger.lock().unwrap().set_balance(VAULT, holder, shares);
    }

    pub(crate) fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.ledger
            .lock()
            .unwrap()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub(crate) fn set_assets_in_use(&self, assets: U256) {
        self.ledger.lock().unwrap().assets_in_use = assets;
    }

    pub(crate) fn asset_balance(&self, holder: Address) -> U256 {
        self.ledger.lock().unwrap().balance(ASSET, holder)
    }

    pub(crate) fn share_balance(&self, holder: Address) -> U256 {
        self.ledger.lock().unwrap().balance(VAULT, holder)
    }

    pub(crate) fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.ledger.lock().unwrap().allowance(token, owner, spender)
    }

    pub(crate) fn is_shareholder(&self, account: Address) -> bool {
        self.ledger.lock().unwrap().shareholders.contains(&account)
    }

    pub(crate) fn assets_in_use(&self) -> U256 {
        self.ledger.lock().unwrap().assets_in_use
    }

    pub(crate) fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }

    /// Function signatures of every broadcast, in order.
    pub(crate) fn broadcast_notes(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Evm for MockChain {
    async fn call(&self, contract: Address, calldata: Bytes) -> Result<Bytes, EvmError> {
        let ledger = self.ledger.lock().unwrap();

        let output = if contract == VAULT
            && let Ok(call) = ICoinflakesVaultCalls::abi_decode(&calldata)
        {
            ledger.view_vault(call)
        } else {
            IERC20Calls::abi_decode(&calldata)
                .map_err(|error| error.to_string())
                .and_then(|call| ledger.view_erc20(contract, call))
        };

        output
            .map(Bytes::from)
            .map_err(|reason| EvmError::Revert { reason })
    }
}

#[async_trait]
impl Wallet for MockChain {
    fn address(&self) -> Address {
        *self.account.lock().unwrap()
    }

    async fn broadcast(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError> {
        let nonce = {
            let mut broadcasts = self.broadcasts.lock().unwrap();
            broadcasts.push(note.to_owned());
            broadcasts.len() as u64
        };

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Confirm);

        match outcome {
            Outcome::Reject => return Err(EvmError::UserRejected),
            Outcome::FailBroadcast => {
                return Err(EvmError::Transport(TransportErrorKind::custom_str(
                    "replacement transaction underpriced",
                )));
            }
            Outcome::Confirm | Outcome::Revert => {}
        }

        let tx_hash = keccak256(nonce.to_be_bytes());
        self.pending.lock().unwrap().insert(
            tx_hash,
            PendingTx {
                caller: self.address(),
                target: contract,
                calldata,
                outcome,
            },
        );

        Ok(tx_hash)
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation, EvmError> {
        let Some(pending) = self.pending.lock().unwrap().remove(&tx_hash) else {
            return Err(EvmError::Transport(TransportErrorKind::custom_str(
                "unknown transaction",
            )));
        };

        if pending.outcome == Outcome::Revert {
            return Err(EvmError::Reverted { tx_hash });
        }

        if let Err(reason) =
            self.ledger
                .lock()
                .unwrap()
                .execute(pending.caller, pending.target, &pending.calldata)
        {
            debug!(%tx_hash, reason, "Mock transaction reverted");
            return Err(EvmError::Reverted { tx_hash });
        }

        let mut block = self.block.lock().unwrap();
        *block += 1;

        Ok(Confirmation {
            tx_hash,
            block_number: Some(*block),
            confirmations: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_deployment_prices_share_at_two() {
        let chain = MockChain::new();

        let price = chain
            .read(VAULT, ICoinflakesVault::convertToAssetsCall { shares: units(1) })
            .await
            .unwrap();

        assert_eq!(price, units(2));
    }

    #[tokio::test]
    async fn deposit_without_allowance_reverts_on_confirm() {
        let chain = MockChain::new();
        let calldata = ICoinflakesVault::depositCall {
            assets: units(10),
            receiver: SHAREHOLDER,
        }
        .abi_encode();

        let tx_hash = chain
            .broadcast(VAULT, Bytes::from(calldata), "deposit")
            .await
            .unwrap();

        assert!(matches!(
            chain.confirm(tx_hash).await,
            Err(EvmError::Reverted { .. })
        ));
        assert_eq!(chain.share_balance(SHAREHOLDER), U256::ZERO);
    }

    #[tokio::test]
    async fn unknown_token_read_reverts() {
        let chain = MockChain::new();

        let error = chain
            .read(OUTSIDER, IERC20::decimalsCall {})
            .await
            .unwrap_err();

        assert!(matches!(error, EvmError::Revert { .. }));
    }
}
