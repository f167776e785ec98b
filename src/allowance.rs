//! Cached ERC-20 allowance for one `(token, owner, spender)` triple.

use alloy::primitives::{Address, U256};
use coinflakes_evm::{Evm, EvmError};
use tokio::sync::watch;
use tracing::debug;

use crate::bindings::IERC20;

/// Read-only view of how much `spender` may move of `owner`'s `token`.
///
/// The value is fetched lazily and then served from cache until
/// [`refresh`](Self::refresh) is called. Subscribers are notified only
/// when a refresh observes a different value.
#[derive(Debug)]
pub struct AllowanceTracker {
    token: Address,
    owner: Address,
    spender: Address,
    loaded: bool,
    allowance: watch::Sender<U256>,
}

impl AllowanceTracker {
    pub fn new(token: Address, owner: Address, spender: Address) -> Self {
        Self {
            token,
            owner,
            spender,
            loaded: false,
            allowance: watch::Sender::new(U256::ZERO),
        }
    }

    pub const fn token(&self) -> Address {
        self.token
    }

    pub const fn owner(&self) -> Address {
        self.owner
    }

    pub const fn spender(&self) -> Address {
        self.spender
    }

    /// Cached allowance; zero until first loaded.
    pub fn current(&self) -> U256 {
        *self.allowance.borrow()
    }

    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn subscribe(&self) -> watch::Receiver<U256> {
        self.allowance.subscribe()
    }

    /// Cached allowance, fetching it first if it was never read.
    pub async fn current_allowance<E: Evm>(&mut self, evm: &E) -> Result<U256, EvmError> {
        if !self.loaded {
            self.refresh(evm).await?;
        }

        Ok(self.current())
    }

    /// Re-reads the allowance. Returns whether the value changed.
    pub async fn refresh<E: Evm>(&mut self, evm: &E) -> Result<bool, EvmError> {
        let fetched = evm
            .read(
                self.token,
                IERC20::allowanceCall {
                    owner: self.owner,
                    spender: self.spender,
                },
            )
            .await?;

        self.loaded = true;
        let changed = self.allowance.send_if_modified(|cached| {
            if *cached == fetched {
                false
            } else {
                *cached = fetched;
                true
            }
        });

        if changed {
            debug!(
                token = %self.token,
                owner = %self.owner,
                spender = %self.spender,
                allowance = %fetched,
                "Allowance changed"
            );
        }

        Ok(changed)
    }

    /// Forgets the cached value; the next read goes to the chain.
    pub fn invalidate(&mut self) {
        self.loaded = false;
        self.allowance.send_if_modified(|cached| {
            let changed = !cached.is_zero();
            *cached = U256::ZERO;
            changed
        });
    }
}
