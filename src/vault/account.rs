//! Per-account reads against a loaded [`Vault`].

use alloy::primitives::{Address, U256};
use coinflakes_amount::Quantity;
use coinflakes_evm::{Evm, EvmError};
use serde::Serialize;

use super::{Vault, VaultError};
use crate::bindings::{ICoinflakesVault, IERC20};

/// Which sections of the console an account may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Roles {
    pub manager: bool,
    pub shareholder: bool,
}

impl Roles {
    pub const fn is_empty(self) -> bool {
        !self.manager && !self.shareholder
    }
}

impl Vault {
    pub async fn roles<E: Evm>(&self, evm: &E, account: Address) -> Result<Roles, EvmError> {
        Ok(Roles {
            manager: account == self.manager,
            shareholder: self.is_shareholder(evm, account).await?,
        })
    }

    pub async fn is_shareholder<E: Evm>(&self, evm: &E, account: Address) -> Result<bool, EvmError> {
        evm.read(self.address, ICoinflakesVault::isShareholderCall { account })
            .await
    }

    pub async fn asset_balance<E: Evm>(&self, evm: &E, account: Address) -> Result<U256, EvmError> {
        evm.read(self.asset.address, IERC20::balanceOfCall { account })
            .await
    }

    pub async fn share_balance<E: Evm>(&self, evm: &E, account: Address) -> Result<U256, EvmError> {
        evm.read(self.address, IERC20::balanceOfCall { account })
            .await
    }

    pub async fn max_redeem<E: Evm>(&self, evm: &E, owner: Address) -> Result<U256, EvmError> {
        evm.read(self.address, ICoinflakesVault::maxRedeemCall { owner })
            .await
    }

    pub async fn max_withdraw<E: Evm>(&self, evm: &E, owner: Address) -> Result<U256, EvmError> {
        evm.read(self.address, ICoinflakesVault::maxWithdrawCall { owner })
            .await
    }

    /// The vault contract's own balance of the underlying asset.
    pub async fn liquid_asset_balance<E: Evm>(&self, evm: &E) -> Result<U256, EvmError> {
        self.asset_balance(evm, self.address).await
    }
}

/// Everything the shareholder section shows about one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountPosition {
    pub account: Address,
    pub roles: Roles,
    pub asset_balance: Quantity,
    pub share_balance: Quantity,
    /// Current value of `share_balance` in assets.
    pub share_value: Quantity,
    pub max_redeem: Quantity,
    pub max_withdraw: Quantity,
}

impl AccountPosition {
    pub async fn load<E: Evm>(evm: &E, vault: &Vault, account: Address) -> Result<Self, VaultError> {
        let (roles, asset_balance, share_balance, max_redeem, max_withdraw) = tokio::try_join!(
            vault.roles(evm, account),
            vault.asset_balance(evm, account),
            vault.share_balance(evm, account),
            vault.max_redeem(evm, account),
            vault.max_withdraw(evm, account),
        )?;

        Ok(Self {
            account,
            roles,
            asset_balance: vault.assets(asset_balance),
            share_balance: vault.shares(share_balance),
            share_value: vault.assets(vault.to_assets(share_balance)?),
            max_redeem: vault.shares(max_redeem),
            max_withdraw: vault.assets(max_withdraw),
        })
    }
}
