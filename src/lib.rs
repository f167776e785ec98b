//! Wallet-facing controllers for a Coinflakes investment vault.
//!
//! The vault is an ERC-4626-like contract whose manager takes part of the
//! deposited assets out to put them to use and reports their value back.
//! This crate loads the vault, converts between shares and assets, tracks
//! allowances and drives every write through a [`lifecycle::TxLifecycle`]
//! so a display layer only has to render [`form`] state.

mod bindings;

pub mod allowance;
pub mod approval;
pub mod cli;
pub mod config;
pub mod conversion;
pub mod form;
pub mod lifecycle;
pub mod route;
pub mod vault;

pub use config::setup_tracing;

#[cfg(test)]
pub(crate) mod test_utils;
