//! Form controllers: one per vault action.
//!
//! A form owns everything a single action needs between keystrokes and
//! confirmation: the parsed input, the amount derived from it, the
//! approval that must precede it and the lifecycle of the action itself.
//! The display layer only sees [`InputProps`] and [`ButtonProps`]; every
//! derived value is recomputed from the current inputs on read.

mod action;
mod amount_form;
mod shareholder;

use alloy::primitives::U256;
use coinflakes_amount::parse_units;
use tracing::debug;

use crate::lifecycle::{PreparedCall, TxState};

pub use self::action::{
    Deposit, MaxSource, Mint, Redeem, ReturnFunds, SetAssetsInUse, Unit, UseAssets,
    VaultAction, Withdraw,
};
pub use self::amount_form::AmountForm;
pub use self::shareholder::ShareholderForm;

/// What an input field renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputProps {
    pub value: String,
    pub disabled: bool,
    pub max_value: Option<U256>,
}

/// What a transaction button renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonProps {
    pub request: Option<PreparedCall>,
    pub disabled: bool,
    pub state: TxState,
}

/// Text typed into an amount field and the amount it parses to.
///
/// Unparseable text is not an error for the form: it simply has no amount,
/// which keeps dependent actions disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountInput {
    text: String,
    decimals: u8,
    amount: Option<U256>,
}

impl AmountInput {
    pub const fn new(decimals: u8) -> Self {
        Self {
            text: String::new(),
            decimals,
            amount: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    pub const fn amount(&self) -> Option<U256> {
        self.amount
    }

    /// Replaces the text. Returns whether the parsed amount changed.
    pub fn set_text(&mut self, text: &str) -> bool {
        self.text = text.to_owned();

        let parsed = match parse_units(text, self.decimals) {
            Ok(amount) => Some(amount),
            Err(error) => {
                debug!(%error, "Input has no amount");
                None
            }
        };

        let changed = parsed != self.amount;
        self.amount = parsed;
        changed
    }
}
