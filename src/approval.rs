//! Approval orchestration for a spend the vault will pull.
//!
//! Pairs an [`AllowanceTracker`] with a nested [`TxLifecycle`] for
//! `approve(spender, amount)`. Approving is idempotent: when the tracked
//! allowance already covers the amount needed nothing is broadcast.

use alloy::primitives::{Address, TxHash, U256};
use coinflakes_evm::{Evm, EvmError, Wallet};
use tracing::info;

use crate::allowance::AllowanceTracker;
use crate::bindings::IERC20;
use crate::lifecycle::{PreparedCall, TxFailure, TxLifecycle, TxPhase, TxState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    AlreadyApproved { allowance: U256 },
    Approved { tx_hash: TxHash, allowance: U256 },
    /// Nothing to approve, or a previous approval still needs a reset.
    NotReady,
    Rejected,
    Failed(TxFailure),
}

/// What an approve button shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Disabled,
    Satisfied,
    Idle,
    Loading,
    Error,
}

#[derive(Debug)]
pub struct ApprovalOrchestrator {
    tracker: AllowanceTracker,
    lifecycle: TxLifecycle,
    amount_needed: U256,
}

impl ApprovalOrchestrator {
    pub fn new(token: Address, owner: Address, spender: Address) -> Self {
        let mut orchestrator = Self {
            tracker: AllowanceTracker::new(token, owner, spender),
            lifecycle: TxLifecycle::new("approve"),
            amount_needed: U256::ZERO,
        };
        orchestrator.prepare();
        orchestrator
    }

    pub const fn amount_needed(&self) -> U256 {
        self.amount_needed
    }

    pub fn allowance(&self) -> U256 {
        self.tracker.current()
    }

    pub const fn tracker(&self) -> &AllowanceTracker {
        &self.tracker
    }

    pub const fn lifecycle(&self) -> &TxLifecycle {
        &self.lifecycle
    }

    pub fn tx_state(&self) -> TxState {
        self.lifecycle.state()
    }

    pub fn is_satisfied(&self) -> bool {
        !self.amount_needed.is_zero() && self.tracker.current() >= self.amount_needed
    }

    pub fn state(&self) -> ApprovalState {
        if self.is_satisfied() {
            return ApprovalState::Satisfied;
        }

        match self.lifecycle.state().phase() {
            TxPhase::Loading => ApprovalState::Loading,
            TxPhase::Error => ApprovalState::Error,
            TxPhase::Success | TxPhase::Idle if self.amount_needed.is_zero() => {
                ApprovalState::Disabled
            }
            TxPhase::Success | TxPhase::Idle => ApprovalState::Idle,
        }
    }

    /// Updates the spend this approval must cover. A settled approval for
    /// a different amount is stale and returns to `Idle`.
    pub fn set_amount_needed(&mut self, amount: U256) {
        if amount == self.amount_needed {
            return;
        }

        self.amount_needed = amount;
        if self.lifecycle.state().is_settled() {
            self.lifecycle.reset();
        }
        self.prepare();
    }

    /// Re-reads the allowance. Returns whether it changed.
    ///
    /// A successful approval whose allowance no longer covers the amount
    /// (spent or lowered elsewhere) returns to `Idle`.
    pub async fn refresh<E: Evm>(&mut self, evm: &E) -> Result<bool, EvmError> {
        let changed = self.tracker.refresh(evm).await?;
        if self.lifecycle.state().is_success() && !self.is_satisfied() {
            info!(
                token = %self.tracker.token(),
                allowance = %self.allowance(),
                needed = %self.amount_needed,
                "Approved allowance no longer covers amount"
            );
            self.lifecycle.reset();
        }
        self.prepare();
        Ok(changed)
    }

    /// Approves the amount needed unless the on-chain allowance, read
    /// fresh, already covers it.
    pub async fn approve<W: Wallet>(&mut self, wallet: &W) -> Result<ApprovalOutcome, EvmError> {
        self.refresh(wallet).await?;

        if self.is_satisfied() {
            info!(
                token = %self.tracker.token(),
                allowance = %self.allowance(),
                needed = %self.amount_needed,
                "Allowance already covers amount"
            );
            return Ok(ApprovalOutcome::AlreadyApproved {
                allowance: self.allowance(),
            });
        }

        if !self.lifecycle.can_trigger() {
            return Ok(ApprovalOutcome::NotReady);
        }

        match self.lifecycle.execute(wallet).await {
            TxState::Success { tx_hash, .. } => {
                self.refresh(wallet).await?;
                Ok(ApprovalOutcome::Approved {
                    tx_hash,
                    allowance: self.allowance(),
                })
            }
            TxState::Error(failure) => Ok(ApprovalOutcome::Failed(failure)),
            TxState::Idle => Ok(ApprovalOutcome::Rejected),
            TxState::Submitting | TxState::Pending { .. } => Ok(ApprovalOutcome::NotReady),
        }
    }

    /// Clears the nested transaction and forgets the cached allowance.
    pub fn reset(&mut self) {
        self.lifecycle.reset();
        self.tracker.invalidate();
        self.prepare();
    }

    fn prepare(&mut self) {
        let valid = !self.amount_needed.is_zero() && !self.is_satisfied();
        self.lifecycle.prepare(PreparedCall::new(
            self.tracker.token(),
            &IERC20::approveCall {
                spender: self.tracker.spender(),
                amount: self.amount_needed,
            },
            valid,
        ));
    }
}
