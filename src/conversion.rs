//! Conversions between vault shares and underlying assets.
//!
//! The vault reports its share price as `convertToAssets(10^decimals)`: the
//! amount of underlying (in asset units) one whole share is worth. Every
//! derived amount shown next to a form input is computed from that price
//! with integer arithmetic, flooring like the contract does.

use alloy::primitives::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Arithmetic overflow during conversion")]
    Overflow,
    #[error("10^{0} does not fit in 256 bits")]
    DecimalsOutOfRange(u8),
}

/// `10^decimals` as a `U256`.
pub fn unit(decimals: u8) -> Result<U256, ConversionError> {
    U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or(ConversionError::DecimalsOutOfRange(decimals))
}

/// Underlying asset units per whole vault share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SharePrice(U256);

impl SharePrice {
    pub const fn new(assets_per_share: U256) -> Self {
        Self(assets_per_share)
    }

    pub const fn value(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Shares received for `assets`.
    ///
    /// Formula: shares = assets * 10^asset_decimals / price
    pub fn to_shares(self, assets: U256, asset_decimals: u8) -> Result<U256, ConversionError> {
        if assets.is_zero() || self.is_zero() {
            return Ok(U256::ZERO);
        }

        let numerator = assets
            .checked_mul(unit(asset_decimals)?)
            .ok_or(ConversionError::Overflow)?;

        Ok(numerator / self.0)
    }

    /// Assets received for `shares`.
    ///
    /// Formula: assets = shares * price / 10^vault_decimals
    pub fn to_assets(self, shares: U256, vault_decimals: u8) -> Result<U256, ConversionError> {
        if shares.is_zero() || self.is_zero() {
            return Ok(U256::ZERO);
        }

        let numerator = shares
            .checked_mul(self.0)
            .ok_or(ConversionError::Overflow)?;

        Ok(numerator / unit(vault_decimals)?)
    }
}

/// Share price after the manager reports `new_in_use` assets in use.
///
/// The vault's total assets are its liquid balance plus assets in use, so
/// replacing the reported figure moves the total by the difference. An
/// empty vault (no supply or no assets) prices one share at one asset.
pub fn projected_share_price(
    total_assets: U256,
    current_in_use: U256,
    new_in_use: U256,
    total_supply: U256,
    asset_decimals: u8,
) -> Result<SharePrice, ConversionError> {
    let new_total = total_assets
        .saturating_sub(current_in_use)
        .checked_add(new_in_use)
        .ok_or(ConversionError::Overflow)?;

    if total_supply.is_zero() || new_total.is_zero() {
        return Ok(SharePrice::new(unit(asset_decimals)?));
    }

    let numerator = new_total
        .checked_mul(unit(asset_decimals)?)
        .ok_or(ConversionError::Overflow)?;

    Ok(SharePrice::new(numerator / total_supply))
}

/// Direction and size of a share-price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceChange {
    Unchanged,
    Gain(U256),
    Loss(U256),
}

impl PriceChange {
    pub fn between(current: SharePrice, projected: SharePrice) -> Self {
        match projected.cmp(&current) {
            std::cmp::Ordering::Equal => Self::Unchanged,
            std::cmp::Ordering::Greater => Self::Gain(projected.value() - current.value()),
            std::cmp::Ordering::Less => Self::Loss(current.value() - projected.value()),
        }
    }
}
