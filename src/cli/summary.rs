//! Read-only overview of the vault and, optionally, one account.

use std::io::Write;

use alloy::primitives::Address;
use coinflakes_amount::{DEFAULT_PRECISION, Quantity};
use coinflakes_evm::Evm;
use serde::Serialize;

use crate::vault::{AccountPosition, Roles, Vault, VaultError};

#[derive(Debug, Serialize)]
pub(super) struct VaultSummary {
    pub(super) address: Address,
    pub(super) name: String,
    pub(super) symbol: String,
    pub(super) asset: Address,
    pub(super) asset_symbol: String,
    pub(super) manager: Address,
    pub(super) share_price: Quantity,
    pub(super) total_supply: Quantity,
    pub(super) total_assets: Quantity,
    pub(super) assets_in_use: Quantity,
    pub(super) liquid_assets: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) account: Option<AccountPosition>,
}

impl VaultSummary {
    pub(super) async fn load<E: Evm>(
        evm: &E,
        vault: &Vault,
        account: Option<Address>,
    ) -> Result<Self, VaultError> {
        let account = match account {
            Some(account) => Some(AccountPosition::load(evm, vault, account).await?),
            None => None,
        };

        Ok(Self {
            address: vault.address,
            name: vault.name.clone(),
            symbol: vault.symbol.clone(),
            asset: vault.asset.address,
            asset_symbol: vault.asset.symbol.clone(),
            manager: vault.manager,
            share_price: vault.share_price_quantity(),
            total_supply: vault.shares(vault.total_supply),
            total_assets: vault.assets(vault.total_assets),
            assets_in_use: vault.assets(vault.assets_in_use),
            liquid_assets: vault.assets(vault.liquid_assets()),
            account,
        })
    }

    pub(super) fn write_text<W: Write>(&self, stdout: &mut W) -> std::io::Result<()> {
        let assets = |quantity: Quantity| quantity.display(DEFAULT_PRECISION, &self.asset_symbol);
        let shares = |quantity: Quantity| quantity.display(DEFAULT_PRECISION, &self.symbol);

        writeln!(stdout, "Vault {} ({})", self.name, self.symbol)?;
        writeln!(stdout, "   Address: {}", self.address)?;
        writeln!(stdout, "   Asset: {} ({})", self.asset_symbol, self.asset)?;
        writeln!(stdout, "   Manager: {}", self.manager)?;
        writeln!(stdout, "   Share price: {}", assets(self.share_price))?;
        writeln!(stdout, "   Total supply: {}", shares(self.total_supply))?;
        writeln!(stdout, "   Total assets: {}", assets(self.total_assets))?;
        writeln!(stdout, "   Assets in use: {}", assets(self.assets_in_use))?;
        writeln!(stdout, "   Liquid assets: {}", assets(self.liquid_assets))?;

        let Some(position) = &self.account else {
            return Ok(());
        };

        writeln!(stdout, "Account {}", position.account)?;
        writeln!(stdout, "   Roles: {}", describe_roles(position.roles))?;
        writeln!(stdout, "   Asset balance: {}", assets(position.asset_balance))?;
        writeln!(
            stdout,
            "   Shares: {} (worth {})",
            shares(position.share_balance),
            assets(position.share_value)
        )?;
        writeln!(stdout, "   Max redeem: {}", shares(position.max_redeem))?;
        writeln!(stdout, "   Max withdraw: {}", assets(position.max_withdraw))?;

        Ok(())
    }
}

fn describe_roles(roles: Roles) -> &'static str {
    match (roles.manager, roles.shareholder) {
        (true, true) => "manager, shareholder",
        (true, false) => "manager",
        (false, true) => "shareholder",
        (false, false) => "none",
    }
}
