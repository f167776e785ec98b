//! Read model for one Coinflakes vault and its underlying asset.
//!
//! [`Vault`] is an immutable snapshot of the on-chain accounting fields.
//! It is never updated optimistically: after a transaction settles the
//! owner of a [`VaultContext`] calls [`VaultContext::refresh`], which
//! reloads the snapshot and notifies subscribers only if something moved.

mod account;

use alloy::primitives::{Address, U256};
use coinflakes_amount::Quantity;
use coinflakes_evm::{Evm, EvmError};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::bindings::{ICoinflakesVault, IERC20};
use crate::conversion::{ConversionError, SharePrice, projected_share_price, unit};

pub use self::account::{AccountPosition, Roles};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// ERC-20 metadata of the vault's underlying asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

impl Asset {
    pub async fn load<E: Evm>(evm: &E, address: Address) -> Result<Self, EvmError> {
        let (name, symbol, decimals, total_supply) = tokio::try_join!(
            evm.read(address, IERC20::nameCall {}),
            evm.read(address, IERC20::symbolCall {}),
            evm.read(address, IERC20::decimalsCall {}),
            evm.read(address, IERC20::totalSupplyCall {}),
        )?;

        Ok(Self {
            address,
            name,
            symbol,
            decimals,
            total_supply,
        })
    }

    pub const fn quantity(&self, amount: U256) -> Quantity {
        Quantity::new(amount, self.decimals)
    }
}

/// Snapshot of the vault share token and its accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    pub asset: Asset,
    /// Assets per whole share, `convertToAssets(10^decimals)`.
    pub share_price: SharePrice,
    pub total_assets: U256,
    pub assets_in_use: U256,
    pub manager: Address,
}

impl Vault {
    pub async fn load<E: Evm>(evm: &E, address: Address) -> Result<Self, VaultError> {
        let (name, symbol, decimals, total_supply, asset_address) = tokio::try_join!(
            evm.read(address, IERC20::nameCall {}),
            evm.read(address, IERC20::symbolCall {}),
            evm.read(address, IERC20::decimalsCall {}),
            evm.read(address, IERC20::totalSupplyCall {}),
            evm.read(address, ICoinflakesVault::assetCall {}),
        )?;

        let one_share = unit(decimals)?;
        let (asset, share_price, total_assets, assets_in_use, manager) = tokio::try_join!(
            Asset::load(evm, asset_address),
            evm.read(
                address,
                ICoinflakesVault::convertToAssetsCall { shares: one_share }
            ),
            evm.read(address, ICoinflakesVault::totalAssetsCall {}),
            evm.read(address, ICoinflakesVault::assetsInUseCall {}),
            evm.read(address, ICoinflakesVault::managerCall {}),
        )?;

        debug!(
            vault = %address,
            asset = %asset.address,
            share_price = %share_price,
            "Loaded vault"
        );

        Ok(Self {
            address,
            name,
            symbol,
            decimals,
            total_supply,
            asset,
            share_price: SharePrice::new(share_price),
            total_assets,
            assets_in_use,
            manager,
        })
    }

    pub fn to_shares(&self, assets: U256) -> Result<U256, ConversionError> {
        self.share_price.to_shares(assets, self.asset.decimals)
    }

    pub fn to_assets(&self, shares: U256) -> Result<U256, ConversionError> {
        self.share_price.to_assets(shares, self.decimals)
    }

    /// Value of every outstanding share at the current price.
    pub fn assets_under_management(&self) -> Result<U256, ConversionError> {
        self.to_assets(self.total_supply)
    }

    /// Assets held by the vault contract itself, as far as the accounting
    /// fields tell. The authoritative figure is
    /// [`Vault::liquid_asset_balance`].
    pub fn liquid_assets(&self) -> U256 {
        self.total_assets.saturating_sub(self.assets_in_use)
    }

    /// Share price if the manager reported `new_in_use` assets in use.
    pub fn projected_share_price(&self, new_in_use: U256) -> Result<SharePrice, ConversionError> {
        projected_share_price(
            self.total_assets,
            self.assets_in_use,
            new_in_use,
            self.total_supply,
            self.asset.decimals,
        )
    }

    pub const fn shares(&self, amount: U256) -> Quantity {
        Quantity::new(amount, self.decimals)
    }

    pub const fn assets(&self, amount: U256) -> Quantity {
        self.asset.quantity(amount)
    }

    pub const fn share_price_quantity(&self) -> Quantity {
        self.asset.quantity(self.share_price.value())
    }
}

/// Shared, read-only handle on the current [`Vault`] snapshot.
///
/// Components hold a reference (or an `Arc`) and read snapshots; the only
/// way to change it is [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct VaultContext {
    snapshot: watch::Sender<Vault>,
}

impl VaultContext {
    pub fn new(vault: Vault) -> Self {
        Self {
            snapshot: watch::Sender::new(vault),
        }
    }

    pub async fn load<E: Evm>(evm: &E, address: Address) -> Result<Self, VaultError> {
        let vault = Vault::load(evm, address).await?;
        info!(
            vault = %vault.address,
            name = %vault.name,
            asset = %vault.asset.symbol,
            "Vault context ready"
        );
        Ok(Self::new(vault))
    }

    pub fn address(&self) -> Address {
        self.snapshot.borrow().address
    }

    pub fn vault(&self) -> Vault {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vault> {
        self.snapshot.subscribe()
    }

    /// Reloads the snapshot. Returns whether any field changed.
    pub async fn refresh<E: Evm>(&self, evm: &E) -> Result<bool, VaultError> {
        let fetched = Vault::load(evm, self.address()).await?;

        let changed = self.snapshot.send_if_modified(|current| {
            if *current == fetched {
                false
            } else {
                *current = fetched;
                true
            }
        });

        if changed {
            let vault = self.snapshot.borrow();
            info!(
                vault = %vault.address,
                share_price = %vault.share_price.value(),
                total_assets = %vault.total_assets,
                assets_in_use = %vault.assets_in_use,
                "Vault snapshot updated"
            );
        }

        Ok(changed)
    }
}
