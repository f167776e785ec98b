use alloy::primitives::Address;
use coinflakes_evm::{Evm, EvmError, Wallet};
use tracing::debug;

use super::{ButtonProps, InputProps};
use crate::bindings::ICoinflakesVault;
use crate::lifecycle::{PreparedCall, TxCommand, TxLifecycle, TxState};
use crate::vault::Vault;

/// Manager form for adding and removing shareholders.
///
/// The typed address only counts once it parses; mixed-case input must
/// carry a valid checksum. The manager's own address never counts.
/// Whitelisting is enabled for a parsed address that is not yet a
/// shareholder, revoking only for a known shareholder. Membership is
/// re-read whenever either transaction settles.
#[derive(Debug)]
pub struct ShareholderForm {
    vault: Address,
    manager: Address,
    text: String,
    address: Option<Address>,
    is_shareholder: Option<bool>,
    whitelist: TxLifecycle,
    revoke: TxLifecycle,
}

impl ShareholderForm {
    pub fn new(vault: &Vault) -> Self {
        let mut form = Self {
            vault: vault.address,
            manager: vault.manager,
            text: String::new(),
            address: None,
            is_shareholder: None,
            whitelist: TxLifecycle::new("whitelist shareholder"),
            revoke: TxLifecycle::new("revoke shareholder"),
        };
        form.sync();
        form
    }

    pub const fn address(&self) -> Option<Address> {
        self.address
    }

    /// Membership of [`address`](Self::address), once read.
    pub const fn is_shareholder(&self) -> Option<bool> {
        self.is_shareholder
    }

    pub fn whitelist_state(&self) -> TxState {
        self.whitelist.state()
    }

    pub fn revoke_state(&self) -> TxState {
        self.revoke.state()
    }

    pub fn can_whitelist(&self) -> bool {
        self.address.is_some() && self.is_shareholder == Some(false)
    }

    pub fn can_revoke(&self) -> bool {
        self.address.is_some() && self.is_shareholder == Some(true)
    }

    pub fn on_input(&mut self, text: &str) {
        if self.is_in_flight() {
            debug!("Shareholder input ignored while in flight");
            return;
        }

        self.text = text.to_owned();
        let address = parse_address(text).filter(|address| *address != self.manager);
        if address == self.address {
            return;
        }

        self.address = address;
        self.is_shareholder = None;
        for lifecycle in [&mut self.whitelist, &mut self.revoke] {
            if lifecycle.state().is_settled() {
                lifecycle.dispatch(TxCommand::Reset);
            }
        }
        self.sync();
    }

    /// Reads whether the current address is a shareholder.
    pub async fn refresh<E: Evm>(&mut self, evm: &E) -> Result<Option<bool>, EvmError> {
        self.is_shareholder = match self.address {
            Some(account) => Some(
                evm.read(self.vault, ICoinflakesVault::isShareholderCall { account })
                    .await?,
            ),
            None => None,
        };

        self.sync();
        Ok(self.is_shareholder)
    }

    pub async fn whitelist<W: Wallet>(&mut self, wallet: &W) -> Result<TxState, EvmError> {
        self.sync();
        let state = self.whitelist.execute(wallet).await;
        if state.is_settled() {
            self.refresh(wallet).await?;
        }
        Ok(state)
    }

    pub async fn revoke<W: Wallet>(&mut self, wallet: &W) -> Result<TxState, EvmError> {
        self.sync();
        let state = self.revoke.execute(wallet).await;
        if state.is_settled() {
            self.refresh(wallet).await?;
        }
        Ok(state)
    }

    pub fn reset(&mut self) {
        self.whitelist.dispatch(TxCommand::Reset);
        self.revoke.dispatch(TxCommand::Reset);
        self.sync();
    }

    pub fn input_props(&self) -> InputProps {
        InputProps {
            value: self.text.clone(),
            disabled: self.is_in_flight(),
            max_value: None,
        }
    }

    pub fn whitelist_props(&self) -> ButtonProps {
        ButtonProps {
            request: self.whitelist.request().cloned(),
            disabled: !self.whitelist.can_trigger(),
            state: self.whitelist.state(),
        }
    }

    pub fn revoke_props(&self) -> ButtonProps {
        ButtonProps {
            request: self.revoke.request().cloned(),
            disabled: !self.revoke.can_trigger(),
            state: self.revoke.state(),
        }
    }

    fn is_in_flight(&self) -> bool {
        self.whitelist.state().is_in_flight() || self.revoke.state().is_in_flight()
    }

    fn sync(&mut self) {
        let account = self.address.unwrap_or_default();

        self.whitelist.prepare(PreparedCall::new(
            self.vault,
            &ICoinflakesVault::whitelistShareholderCall { account },
            self.can_whitelist(),
        ));
        self.revoke.prepare(PreparedCall::new(
            self.vault,
            &ICoinflakesVault::revokeShareholderCall { account },
            self.can_revoke(),
        ));
    }
}

/// Parses a hex address. All-lowercase and all-uppercase input is taken
/// as is; mixed case must match the EIP-55 checksum.
fn parse_address(text: &str) -> Option<Address> {
    let text = text.trim();
    let digits = text.strip_prefix("0x").unwrap_or(text);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper {
        Address::parse_checksummed(text, None).ok()
    } else {
        text.parse().ok()
    }
}
