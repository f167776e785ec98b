//! Transaction lifecycle for a single state-changing contract call.
//!
//! Every write the console performs (approve, deposit, whitelist, ...)
//! goes through a [`TxLifecycle`]. The owner prepares a call whenever its
//! inputs change, triggers it once, and observes the outcome:
//!
//! ```text
//! Idle --trigger (valid request)--> Submitting
//! Submitting --wallet rejected--> Idle
//! Submitting --broadcast(hash)--> Pending
//! Submitting --failed---------> Error
//! Pending --included, 0 confirmations--> Pending
//! Pending --included, >=1 confirmation--> Success
//! Pending --reverted / failed--> Error
//! any --reset--> Idle
//! ```
//!
//! Triggering outside `Idle` is silently ignored, which is what guarantees
//! a single broadcast per trigger. Outcomes are tagged with the [`Ticket`]
//! of the trigger that produced them; a reset issues a new ticket, so late
//! outcomes of an abandoned transaction never touch the fresh state.

use std::fmt::Display;

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::sol_types::SolCall;
use coinflakes_evm::{EvmError, Wallet};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A fully encoded contract call, rebuilt whenever its inputs change.
///
/// `valid` is false when the inputs that produced it are missing or
/// unacceptable; such a request is never broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub target: Address,
    pub function: &'static str,
    pub calldata: Bytes,
    pub valid: bool,
}

impl PreparedCall {
    pub fn new<C: SolCall>(target: Address, call: &C, valid: bool) -> Self {
        Self {
            target,
            function: C::SIGNATURE,
            calldata: Bytes::from(call.abi_encode()),
            valid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFailure {
    pub tx_hash: Option<TxHash>,
    pub reason: String,
}

impl Display for TxFailure {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tx_hash {
            Some(tx_hash) => write!(dest, "{} ({tx_hash})", self.reason),
            None => write!(dest, "{}", self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TxState {
    #[default]
    Idle,
    /// Waiting for the wallet to sign and broadcast.
    Submitting,
    Pending {
        tx_hash: TxHash,
        confirmations: u64,
    },
    Success {
        tx_hash: TxHash,
        block_number: Option<u64>,
    },
    Error(TxFailure),
}

/// Coarse view of [`TxState`] for display: `Submitting` and `Pending`
/// both read as loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Idle,
    Loading,
    Success,
    Error,
}

impl TxState {
    pub const fn phase(&self) -> TxPhase {
        match self {
            Self::Idle => TxPhase::Idle,
            Self::Submitting | Self::Pending { .. } => TxPhase::Loading,
            Self::Success { .. } => TxPhase::Success,
            Self::Error(_) => TxPhase::Error,
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Pending { .. })
    }

    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error(_))
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Pending { tx_hash, .. } | Self::Success { tx_hash, .. } => Some(*tx_hash),
            Self::Error(failure) => failure.tx_hash,
            Self::Idle | Self::Submitting => None,
        }
    }
}

impl Display for TxState {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(dest, "idle"),
            Self::Submitting => write!(dest, "waiting for wallet"),
            Self::Pending {
                tx_hash,
                confirmations,
            } => write!(dest, "pending {tx_hash} ({confirmations} confirmations)"),
            Self::Success { tx_hash, .. } => write!(dest, "confirmed {tx_hash}"),
            Self::Error(failure) => write!(dest, "failed: {failure}"),
        }
    }
}

/// Identifies one trigger of a lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ticket(u64);

impl Ticket {
    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Outcome reported for an in-flight submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    WalletRejected,
    Broadcast(TxHash),
    Included {
        block_number: Option<u64>,
        confirmations: u64,
    },
    Reverted,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCommand {
    Trigger,
    Reset,
}

/// Work handed out by a successful trigger.
///
/// Dropping it without driving leaves the lifecycle in `Submitting` until
/// it is reset.
#[derive(Debug)]
#[must_use = "a submission does nothing until driven"]
pub struct Submission {
    ticket: Ticket,
    call: PreparedCall,
}

impl Submission {
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub const fn call(&self) -> &PreparedCall {
        &self.call
    }

    /// Broadcast through `wallet`, wait for inclusion, and report each
    /// step to `on_event`. Never retries.
    pub async fn drive<W: Wallet>(self, wallet: &W, mut on_event: impl FnMut(Ticket, TxEvent)) {
        let Self { ticket, call } = self;

        let tx_hash = match wallet
            .broadcast(call.target, call.calldata, call.function)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(EvmError::UserRejected) => {
                on_event(ticket, TxEvent::WalletRejected);
                return;
            }
            Err(error) => {
                on_event(ticket, TxEvent::Failed(error.to_string()));
                return;
            }
        };

        on_event(ticket, TxEvent::Broadcast(tx_hash));

        let event = match wallet.confirm(tx_hash).await {
            Ok(confirmation) => TxEvent::Included {
                block_number: confirmation.block_number,
                confirmations: confirmation.confirmations,
            },
            Err(EvmError::Reverted { .. }) => TxEvent::Reverted,
            Err(error) => TxEvent::Failed(error.to_string()),
        };

        on_event(ticket, event);
    }
}

/// State machine around one contract call. See the module docs.
#[derive(Debug)]
pub struct TxLifecycle {
    label: &'static str,
    request: Option<PreparedCall>,
    ticket: Ticket,
    state: watch::Sender<TxState>,
}

impl TxLifecycle {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            request: None,
            ticket: Ticket::default(),
            state: watch::Sender::new(TxState::Idle),
        }
    }

    pub const fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> TxState {
        self.state.borrow().clone()
    }

    pub fn request(&self) -> Option<&PreparedCall> {
        self.request.as_ref()
    }

    /// Receives every transition.
    pub fn subscribe(&self) -> watch::Receiver<TxState> {
        self.state.subscribe()
    }

    /// Supersedes the current request. Does not change state.
    pub fn prepare(&mut self, request: PreparedCall) {
        self.request = Some(request);
    }

    /// Whether [`trigger`](Self::trigger) would start a submission.
    pub fn can_trigger(&self) -> bool {
        self.state.borrow().is_idle() && self.request.as_ref().is_some_and(|request| request.valid)
    }

    pub fn trigger(&mut self) -> Option<Submission> {
        if !self.state.borrow().is_idle() {
            debug!(label = self.label, "Trigger ignored while not idle");
            return None;
        }

        let Some(request) = self.request.clone().filter(|request| request.valid) else {
            debug!(label = self.label, "Trigger ignored without a valid request");
            return None;
        };

        self.ticket = self.ticket.next();
        self.transition(TxState::Submitting);

        Some(Submission {
            ticket: self.ticket,
            call: request,
        })
    }

    pub fn dispatch(&mut self, command: TxCommand) -> Option<Submission> {
        match command {
            TxCommand::Trigger => self.trigger(),
            TxCommand::Reset => {
                self.reset();
                None
            }
        }
    }

    /// Applies an outcome. Returns false when the event was ignored, either
    /// because its ticket is stale or because it does not apply to the
    /// current state.
    pub fn handle(&mut self, ticket: Ticket, event: TxEvent) -> bool {
        if ticket != self.ticket {
            debug!(label = self.label, ?event, "Ignoring outcome of a reset submission");
            return false;
        }

        let current = self.state();
        let next = match (current, event) {
            (TxState::Submitting, TxEvent::WalletRejected) => {
                info!(label = self.label, "Wallet rejected the request");
                TxState::Idle
            }
            (TxState::Submitting, TxEvent::Broadcast(tx_hash)) => TxState::Pending {
                tx_hash,
                confirmations: 0,
            },
            (TxState::Submitting, TxEvent::Failed(reason)) => TxState::Error(TxFailure {
                tx_hash: None,
                reason,
            }),
            (TxState::Pending { tx_hash, .. }, TxEvent::Included { confirmations: 0, .. }) => {
                TxState::Pending {
                    tx_hash,
                    confirmations: 0,
                }
            }
            (TxState::Pending { tx_hash, .. }, TxEvent::Included { block_number, .. }) => {
                TxState::Success {
                    tx_hash,
                    block_number,
                }
            }
            (TxState::Pending { tx_hash, .. }, TxEvent::Reverted) => TxState::Error(TxFailure {
                tx_hash: Some(tx_hash),
                reason: "transaction reverted".to_owned(),
            }),
            (TxState::Pending { tx_hash, .. }, TxEvent::Failed(reason)) => {
                TxState::Error(TxFailure {
                    tx_hash: Some(tx_hash),
                    reason,
                })
            }
            (state, event) => {
                debug!(label = self.label, %state, ?event, "Ignoring outcome");
                return false;
            }
        };

        self.transition(next);
        true
    }

    /// Back to `Idle`. Outcomes of the previous trigger are ignored from
    /// now on; the transaction itself is not cancelled.
    pub fn reset(&mut self) {
        self.ticket = self.ticket.next();
        self.transition(TxState::Idle);
    }

    /// Triggers and drives one submission to completion.
    pub async fn execute<W: Wallet>(&mut self, wallet: &W) -> TxState {
        if let Some(submission) = self.trigger() {
            submission
                .drive(wallet, |ticket, event| {
                    self.handle(ticket, event);
                })
                .await;
        }

        self.state()
    }

    fn transition(&mut self, next: TxState) {
        let label = self.label;
        let previous = self.state.send_replace(next);

        let current = self.state.borrow();
        match &*current {
            TxState::Error(failure) => warn!(label, %failure, "Transaction failed"),
            TxState::Success { tx_hash, .. } => info!(label, %tx_hash, "Transaction succeeded"),
            state => debug!(label, from = %previous, to = %state, "Transaction state changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{U256, address};

    use super::*;
    use crate::bindings::IERC20;
    use crate::test_utils::{MockChain, Outcome};

    const TOKEN: Address = address!("0x1111111111111111111111111111111111111111");
    const SPENDER: Address = address!("0x2222222222222222222222222222222222222222");

    fn approve_request(valid: bool) -> PreparedCall {
        PreparedCall::new(
            TOKEN,
            &IERC20::approveCall {
                spender: SPENDER,
                amount: U256::from(100u64),
            },
            valid,
        )
    }

    fn prepared() -> TxLifecycle {
        let mut lifecycle = TxLifecycle::new("approve");
        lifecycle.prepare(approve_request(true));
        lifecycle
    }

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    #[test]
    fn prepared_call_records_signature() {
        let request = approve_request(true);

        assert_eq!(request.function, "approve(address,uint256)");
        assert_eq!(request.calldata.len(), 4 + 64);
    }

    #[test]
    fn trigger_without_request_is_ignored() {
        let mut lifecycle = TxLifecycle::new("deposit");

        assert!(lifecycle.trigger().is_none());
        assert_eq!(lifecycle.state(), TxState::Idle);
    }

    #[test]
    fn trigger_with_invalid_request_is_ignored() {
        let mut lifecycle = TxLifecycle::new("deposit");
        lifecycle.prepare(approve_request(false));

        assert!(!lifecycle.can_trigger());
        assert!(lifecycle.trigger().is_none());
        assert_eq!(lifecycle.state(), TxState::Idle);
    }

    #[test]
    fn second_trigger_while_in_flight_is_ignored() {
        let mut lifecycle = prepared();

        let submission = lifecycle.trigger().unwrap();
        assert_eq!(lifecycle.state(), TxState::Submitting);
        assert!(lifecycle.trigger().is_none());

        lifecycle.handle(submission.ticket(), TxEvent::Broadcast(hash(1)));
        assert!(lifecycle.trigger().is_none());
        assert_eq!(lifecycle.state().phase(), TxPhase::Loading);
    }

    #[test]
    fn rejection_returns_to_idle_not_error() {
        let mut lifecycle = prepared();
        let submission = lifecycle.trigger().unwrap();

        assert!(lifecycle.handle(submission.ticket(), TxEvent::WalletRejected));
        assert_eq!(lifecycle.state(), TxState::Idle);
        assert!(lifecycle.can_trigger());
    }

    #[test]
    fn broadcast_failure_is_error_without_hash() {
        let mut lifecycle = prepared();
        let submission = lifecycle.trigger().unwrap();

        lifecycle.handle(
            submission.ticket(),
            TxEvent::Failed("insufficient funds for gas".to_owned()),
        );

        assert_eq!(
            lifecycle.state(),
            TxState::Error(TxFailure {
                tx_hash: None,
                reason: "insufficient funds for gas".to_owned(),
            })
        );
    }

    #[test]
    fn zero_confirmations_stay_pending() {
        let mut lifecycle = prepared();
        let ticket = lifecycle.trigger().unwrap().ticket();
        lifecycle.handle(ticket, TxEvent::Broadcast(hash(2)));

        lifecycle.handle(
            ticket,
            TxEvent::Included {
                block_number: None,
                confirmations: 0,
            },
        );

        assert_eq!(
            lifecycle.state(),
            TxState::Pending {
                tx_hash: hash(2),
                confirmations: 0,
            }
        );
    }

    #[test]
    fn inclusion_with_confirmation_is_success() {
        let mut lifecycle = prepared();
        let ticket = lifecycle.trigger().unwrap().ticket();
        lifecycle.handle(ticket, TxEvent::Broadcast(hash(3)));
        lifecycle.handle(
            ticket,
            TxEvent::Included {
                block_number: Some(12),
                confirmations: 1,
            },
        );

        let state = lifecycle.state();
        assert!(state.is_success());
        assert!(state.is_settled());
        assert_eq!(state.tx_hash(), Some(hash(3)));
        assert!(lifecycle.trigger().is_none());
    }

    #[test]
    fn revert_is_error_with_hash() {
        let mut lifecycle = prepared();
        let ticket = lifecycle.trigger().unwrap().ticket();
        lifecycle.handle(ticket, TxEvent::Broadcast(hash(4)));
        lifecycle.handle(ticket, TxEvent::Reverted);

        assert_eq!(lifecycle.state().phase(), TxPhase::Error);
        assert_eq!(lifecycle.state().tx_hash(), Some(hash(4)));
    }

    #[test]
    fn outcome_after_reset_is_ignored() {
        let mut lifecycle = prepared();
        let ticket = lifecycle.trigger().unwrap().ticket();
        lifecycle.handle(ticket, TxEvent::Broadcast(hash(5)));

        lifecycle.dispatch(TxCommand::Reset);
        let applied = lifecycle.handle(
            ticket,
            TxEvent::Included {
                block_number: Some(1),
                confirmations: 1,
            },
        );

        assert!(!applied);
        assert_eq!(lifecycle.state(), TxState::Idle);
    }

    #[test]
    fn events_not_matching_state_are_ignored() {
        let mut lifecycle = prepared();
        let ticket = lifecycle.trigger().unwrap().ticket();

        assert!(!lifecycle.handle(ticket, TxEvent::Reverted));
        assert_eq!(lifecycle.state(), TxState::Submitting);
    }

    #[test]
    fn subscribers_observe_transitions() {
        let mut lifecycle = prepared();
        let mut receiver = lifecycle.subscribe();

        let submission = lifecycle.dispatch(TxCommand::Trigger).unwrap();
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), TxState::Submitting);

        lifecycle.handle(submission.ticket(), TxEvent::WalletRejected);
        assert_eq!(*receiver.borrow_and_update(), TxState::Idle);
    }

    #[tokio::test]
    async fn execute_broadcasts_once_and_succeeds() {
        let chain = MockChain::new();
        let mut lifecycle = prepared();

        let state = lifecycle.execute(&chain).await;
        assert!(state.is_success(), "got {state:?}");

        let again = lifecycle.execute(&chain).await;
        assert_eq!(again, state);
        assert_eq!(chain.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn execute_with_rejection_stays_retriggerable() {
        let chain = MockChain::new();
        chain.script(Outcome::Reject);
        let mut lifecycle = prepared();

        assert_eq!(lifecycle.execute(&chain).await, TxState::Idle);
        assert!(lifecycle.execute(&chain).await.is_success());
        assert_eq!(chain.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn execute_with_revert_is_error() {
        let chain = MockChain::new();
        chain.script(Outcome::Revert);
        let mut lifecycle = prepared();

        let state = lifecycle.execute(&chain).await;

        assert_eq!(state.phase(), TxPhase::Error);
        assert!(state.tx_hash().is_some());
    }

    #[tokio::test]
    async fn execute_with_broadcast_failure_is_error() {
        let chain = MockChain::new();
        chain.script(Outcome::FailBroadcast);
        let mut lifecycle = prepared();

        let state = lifecycle.execute(&chain).await;

        assert_eq!(state.phase(), TxPhase::Error);
        assert_eq!(state.tx_hash(), None);
    }
}
