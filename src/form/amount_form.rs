use std::marker::PhantomData;

use alloy::primitives::{Address, U256};
use coinflakes_amount::{Quantity, to_input_text};
use coinflakes_evm::{Evm, Wallet};
use tokio::sync::watch;
use tracing::{debug, info};

use super::action::VaultAction;
use super::{AmountInput, ButtonProps, InputProps};
use crate::approval::{ApprovalOrchestrator, ApprovalOutcome, ApprovalState};
use crate::lifecycle::{TxCommand, TxLifecycle, TxState};
use crate::vault::{Vault, VaultContext, VaultError};

/// Controller behind one amount-driven vault action.
///
/// Composes the input, an [`ApprovalOrchestrator`] when the action pulls
/// tokens from the account, and the [`TxLifecycle`] of the action itself.
/// The action is valid when the amount parsed, is positive (or zero where
/// the action accepts it), does not exceed the loaded maximum and any
/// required approval is satisfied.
///
/// Everything is disabled while the action is in flight. Editing the
/// amount after the action settled starts over from `Idle`.
#[derive(Debug)]
pub struct AmountForm<A: VaultAction> {
    vault: Vault,
    updates: watch::Receiver<Vault>,
    account: Address,
    input: AmountInput,
    max_value: Option<U256>,
    approval: Option<ApprovalOrchestrator>,
    action: TxLifecycle,
    _action: PhantomData<A>,
}

impl<A: VaultAction> AmountForm<A> {
    pub fn new(context: &VaultContext, account: Address) -> Self {
        let vault = context.vault();
        let approval = A::approval_token(&vault)
            .map(|token| ApprovalOrchestrator::new(token, account, vault.address));

        let mut form = Self {
            input: AmountInput::new(A::INPUT.decimals(&vault)),
            vault,
            updates: context.subscribe(),
            account,
            max_value: None,
            approval,
            action: TxLifecycle::new(A::LABEL),
            _action: PhantomData,
        };
        form.sync();
        form
    }

    pub const fn account(&self) -> Address {
        self.account
    }

    pub const fn vault(&self) -> &Vault {
        &self.vault
    }

    pub const fn input(&self) -> &AmountInput {
        &self.input
    }

    pub const fn max_value(&self) -> Option<U256> {
        self.max_value
    }

    pub const fn approval(&self) -> Option<&ApprovalOrchestrator> {
        self.approval.as_ref()
    }

    pub fn approval_state(&self) -> Option<ApprovalState> {
        self.approval.as_ref().map(ApprovalOrchestrator::state)
    }

    pub fn state(&self) -> TxState {
        self.action.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<TxState> {
        self.action.subscribe()
    }

    /// Amount mirrored next to the input, if the input has one.
    pub fn derived(&self) -> Option<Quantity> {
        let amount = self.input.amount()?;

        match A::derived(&self.vault, amount) {
            Ok(derived) => derived,
            Err(error) => {
                debug!(action = A::LABEL, %error, "No derived amount");
                None
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        let Some(amount) = self.input.amount() else {
            return false;
        };

        self.is_in_range()
            && A::derived(&self.vault, amount).is_ok()
            && self
                .approval
                .as_ref()
                .is_none_or(ApprovalOrchestrator::is_satisfied)
    }

    pub fn on_input(&mut self, text: &str) {
        if self.action.state().is_in_flight() {
            debug!(action = A::LABEL, "Input ignored while in flight");
            return;
        }

        if !self.input.set_text(text) {
            return;
        }

        if self.action.state().is_settled() {
            self.action.dispatch(TxCommand::Reset);
        }
        self.sync();
    }

    /// Fills the input with the exact maximum. Returns the text used.
    pub fn apply_max(&mut self) -> Option<String> {
        let max = self.max_value?;
        let text = to_input_text(max, self.input.decimals());
        self.on_input(&text);
        Some(text)
    }

    /// Overrides the maximum until the next [`refresh`](Self::refresh).
    pub fn set_max(&mut self, max_value: Option<U256>) {
        self.max_value = max_value;
        self.sync();
    }

    /// Picks up the latest vault snapshot and reloads the maximum and the
    /// allowance.
    pub async fn refresh<E: Evm>(&mut self, evm: &E) -> Result<(), VaultError> {
        if self.updates.has_changed().unwrap_or(false) {
            self.vault = self.updates.borrow_and_update().clone();
        }

        self.max_value = A::max_source()
            .load(evm, &self.vault, self.account)
            .await?;

        if let Some(approval) = self.approval.as_mut() {
            approval.refresh(evm).await?;
        }

        self.sync();
        Ok(())
    }

    pub async fn approve<W: Wallet>(&mut self, wallet: &W) -> Result<ApprovalOutcome, VaultError> {
        if !self.action.state().is_idle() || !self.is_in_range() {
            return Ok(ApprovalOutcome::NotReady);
        }

        let Some(approval) = self.approval.as_mut() else {
            return Ok(ApprovalOutcome::NotReady);
        };

        let outcome = approval.approve(wallet).await?;
        self.sync();
        Ok(outcome)
    }

    /// Runs the action once. Does nothing unless the form is valid and
    /// idle; once the action settles the shared vault snapshot and this
    /// form are refreshed.
    pub async fn submit<W: Wallet>(
        &mut self,
        wallet: &W,
        context: &VaultContext,
    ) -> Result<TxState, VaultError> {
        self.sync();

        if !self.action.can_trigger() {
            debug!(action = A::LABEL, state = %self.action.state(), "Submit ignored");
            return Ok(self.action.state());
        }

        let state = self.action.execute(wallet).await;

        if state.is_settled() {
            info!(action = A::LABEL, %state, "Action settled, refreshing vault");
            context.refresh(wallet).await?;
            self.refresh(wallet).await?;
        }

        Ok(state)
    }

    /// Returns the action and its approval to `Idle`. The amount is kept;
    /// the allowance is re-read on the next refresh or approval.
    pub fn reset(&mut self) {
        self.action.dispatch(TxCommand::Reset);
        if let Some(approval) = self.approval.as_mut() {
            approval.reset();
        }
        self.sync();
    }

    pub fn input_props(&self) -> InputProps {
        InputProps {
            value: self.input.text().to_owned(),
            disabled: !self.action.state().is_idle(),
            max_value: self.max_value,
        }
    }

    pub fn approve_props(&self) -> Option<ButtonProps> {
        let approval = self.approval.as_ref()?;

        Some(ButtonProps {
            request: approval.lifecycle().request().cloned(),
            disabled: !self.action.state().is_idle()
                || !self.is_in_range()
                || !approval.lifecycle().can_trigger(),
            state: approval.tx_state(),
        })
    }

    pub fn submit_props(&self) -> ButtonProps {
        ButtonProps {
            request: self.action.request().cloned(),
            disabled: !self.action.can_trigger(),
            state: self.action.state(),
        }
    }

    pub fn show_reset(&self) -> bool {
        self.action.state().is_settled()
    }

    fn is_in_range(&self) -> bool {
        let Some(amount) = self.input.amount() else {
            return false;
        };

        if amount.is_zero() && !A::accepts_zero() {
            return false;
        }

        if !A::max_source().is_bounded() {
            return true;
        }

        self.max_value.is_some_and(|max| amount <= max)
    }

    /// Rebuilds the approval target and the action request from the
    /// current inputs.
    fn sync(&mut self) {
        let amount = self.input.amount().unwrap_or_default();

        if let Some(approval) = self.approval.as_mut() {
            let needed = if amount.is_zero() {
                U256::ZERO
            } else {
                A::approval_amount(&self.vault, amount).unwrap_or_default()
            };
            approval.set_amount_needed(needed);
        }

        let valid = self.is_valid();
        self.action
            .prepare(A::request(&self.vault, self.account, amount, valid));
    }
}
