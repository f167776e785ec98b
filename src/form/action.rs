//! The vault actions a form can drive and what distinguishes them.
//!
//! | Action         | Input  | Derived         | Approval            | Maximum               |
//! |----------------|--------|-----------------|---------------------|-----------------------|
//! | Deposit        | assets | shares          | asset, input        | wallet assets         |
//! | Mint           | shares | assets          | asset, derived + 1  | shares for wallet     |
//! | Redeem         | shares | assets          | share, input        | `maxRedeem`           |
//! | Withdraw       | assets | shares          | share, derived + 1  | `maxWithdraw`         |
//! | ReturnFunds    | assets |                 | asset, input        | wallet assets         |
//! | UseAssets      | assets |                 |                     | vault liquid assets   |
//! | SetAssetsInUse | assets | new share price |                     | none, zero allowed    |
//!
//! The `+ 1` on mint and withdraw covers the contract rounding the pulled
//! amount up where the preview rounds down.

use alloy::primitives::{Address, U256};
use coinflakes_amount::Quantity;
use coinflakes_evm::Evm;

use crate::bindings::ICoinflakesVault;
use crate::conversion::ConversionError;
use crate::lifecycle::PreparedCall;
use crate::vault::{Vault, VaultError};

/// Where the upper bound of an input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxSource {
    WalletAssets,
    SharesForWalletAssets,
    MaxRedeem,
    MaxWithdraw,
    LiquidAssets,
    Unbounded,
}

impl MaxSource {
    pub const fn is_bounded(self) -> bool {
        !matches!(self, Self::Unbounded)
    }

    pub async fn load<E: Evm>(
        self,
        evm: &E,
        vault: &Vault,
        account: Address,
    ) -> Result<Option<U256>, VaultError> {
        let max = match self {
            Self::WalletAssets => vault.asset_balance(evm, account).await?,
            Self::SharesForWalletAssets => {
                let balance = vault.asset_balance(evm, account).await?;
                vault.to_shares(balance)?
            }
            Self::MaxRedeem => vault.max_redeem(evm, account).await?,
            Self::MaxWithdraw => vault.max_withdraw(evm, account).await?,
            Self::LiquidAssets => vault.liquid_asset_balance(evm).await?,
            Self::Unbounded => return Ok(None),
        };

        Ok(Some(max))
    }
}

/// What an amount is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Assets,
    Shares,
}

impl Unit {
    pub const fn decimals(self, vault: &Vault) -> u8 {
        match self {
            Self::Assets => vault.asset.decimals,
            Self::Shares => vault.decimals,
        }
    }

    pub fn symbol(self, vault: &Vault) -> &str {
        match self {
            Self::Assets => &vault.asset.symbol,
            Self::Shares => &vault.symbol,
        }
    }
}

/// Static description of one vault write.
pub trait VaultAction: Send + Sync + 'static {
    const LABEL: &'static str;
    const INPUT: Unit;

    fn max_source() -> MaxSource;

    /// Value shown next to the input.
    fn derived(_vault: &Vault, _amount: U256) -> Result<Option<Quantity>, ConversionError> {
        Ok(None)
    }

    /// Token the vault pulls from the account, if any.
    fn approval_token(_vault: &Vault) -> Option<Address> {
        None
    }

    /// Allowance the action consumes for a non-zero `amount`.
    fn approval_amount(_vault: &Vault, amount: U256) -> Result<U256, ConversionError> {
        Ok(amount)
    }

    fn accepts_zero() -> bool {
        false
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall;
}

/// Buy shares by paying in assets.
#[derive(Debug)]
pub struct Deposit;

impl VaultAction for Deposit {
    const LABEL: &'static str = "deposit";

    const INPUT: Unit = Unit::Assets;

    fn max_source() -> MaxSource {
        MaxSource::WalletAssets
    }

    fn derived(vault: &Vault, amount: U256) -> Result<Option<Quantity>, ConversionError> {
        Ok(Some(vault.shares(vault.to_shares(amount)?)))
    }

    fn approval_token(vault: &Vault) -> Option<Address> {
        Some(vault.asset.address)
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::depositCall {
                assets: amount,
                receiver: account,
            },
            valid,
        )
    }
}

/// Buy an exact number of shares.
#[derive(Debug)]
pub struct Mint;

impl VaultAction for Mint {
    const LABEL: &'static str = "mint";

    const INPUT: Unit = Unit::Shares;

    fn max_source() -> MaxSource {
        MaxSource::SharesForWalletAssets
    }

    fn derived(vault: &Vault, amount: U256) -> Result<Option<Quantity>, ConversionError> {
        Ok(Some(vault.assets(vault.to_assets(amount)?)))
    }

    fn approval_token(vault: &Vault) -> Option<Address> {
        Some(vault.asset.address)
    }

    fn approval_amount(vault: &Vault, amount: U256) -> Result<U256, ConversionError> {
        vault
            .to_assets(amount)?
            .checked_add(U256::from(1u64))
            .ok_or(ConversionError::Overflow)
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::mintCall {
                shares: amount,
                receiver: account,
            },
            valid,
        )
    }
}

/// Sell an exact number of shares.
#[derive(Debug)]
pub struct Redeem;

impl VaultAction for Redeem {
    const LABEL: &'static str = "redeem";

    const INPUT: Unit = Unit::Shares;

    fn max_source() -> MaxSource {
        MaxSource::MaxRedeem
    }

    fn derived(vault: &Vault, amount: U256) -> Result<Option<Quantity>, ConversionError> {
        Ok(Some(vault.assets(vault.to_assets(amount)?)))
    }

    fn approval_token(vault: &Vault) -> Option<Address> {
        Some(vault.address)
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::redeemCall {
                shares: amount,
                receiver: account,
                owner: account,
            },
            valid,
        )
    }
}

/// Sell shares for an exact amount of assets.
#[derive(Debug)]
pub struct Withdraw;

impl VaultAction for Withdraw {
    const LABEL: &'static str = "withdraw";

    const INPUT: Unit = Unit::Assets;

    fn max_source() -> MaxSource {
        MaxSource::MaxWithdraw
    }

    fn derived(vault: &Vault, amount: U256) -> Result<Option<Quantity>, ConversionError> {
        Ok(Some(vault.shares(vault.to_shares(amount)?)))
    }

    fn approval_token(vault: &Vault) -> Option<Address> {
        Some(vault.address)
    }

    fn approval_amount(vault: &Vault, amount: U256) -> Result<U256, ConversionError> {
        vault
            .to_shares(amount)?
            .checked_add(U256::from(1u64))
            .ok_or(ConversionError::Overflow)
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::withdrawCall {
                assets: amount,
                receiver: account,
                owner: account,
            },
            valid,
        )
    }
}

/// Manager pays back assets previously taken out of the vault.
#[derive(Debug)]
pub struct ReturnFunds;

impl VaultAction for ReturnFunds {
    const LABEL: &'static str = "return funds";

    const INPUT: Unit = Unit::Assets;

    fn max_source() -> MaxSource {
        MaxSource::WalletAssets
    }

    fn approval_token(vault: &Vault) -> Option<Address> {
        Some(vault.asset.address)
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::returnAssetsCall {
                from: account,
                assets: amount,
            },
            valid,
        )
    }
}

/// Manager takes liquid assets out of the vault to put them to use.
#[derive(Debug)]
pub struct UseAssets;

impl VaultAction for UseAssets {
    const LABEL: &'static str = "withdraw funds";

    const INPUT: Unit = Unit::Assets;

    fn max_source() -> MaxSource {
        MaxSource::LiquidAssets
    }

    fn request(vault: &Vault, account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::useAssetsCall {
                receiver: account,
                assets: amount,
            },
            valid,
        )
    }
}

/// Manager reports the current value of the assets in use.
#[derive(Debug)]
pub struct SetAssetsInUse;

impl VaultAction for SetAssetsInUse {
    const LABEL: &'static str = "set assets in use";

    const INPUT: Unit = Unit::Assets;

    fn max_source() -> MaxSource {
        MaxSource::Unbounded
    }

    fn derived(vault: &Vault, amount: U256) -> Result<Option<Quantity>, ConversionError> {
        let price = vault.projected_share_price(amount)?;
        Ok(Some(vault.assets(price.value())))
    }

    fn accepts_zero() -> bool {
        true
    }

    fn request(vault: &Vault, _account: Address, amount: U256, valid: bool) -> PreparedCall {
        PreparedCall::new(
            vault.address,
            &ICoinflakesVault::setAssetsInUseCall { assets: amount },
            valid,
        )
    }
}
