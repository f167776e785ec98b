//! Exact fixed-point token quantities.
//!
//! ERC-20 amounts are unsigned integers scaled by `10^decimals`. This crate
//! moves between that representation and decimal text without touching
//! floating point:
//!
//! - [`parse_units`] turns user text into the scaled integer, rejecting
//!   anything that is not a plain non-negative decimal.
//! - [`format_units`] renders a fixed number of fractional digits,
//!   truncating (never rounding) the rest.
//! - [`to_input_text`] renders the exact value with trailing zeros trimmed,
//!   so that `parse_units(to_input_text(a, d), d) == a`.
//! - [`display`] adds thousands grouping and a symbol for summaries.

use std::fmt::{Debug, Display};

use alloy::primitives::U256;
use serde::Serialize;

/// Fractional digits shown when a caller has no preference.
pub const DEFAULT_PRECISION: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("not a decimal number: {0}")]
    Malformed(String),
    #[error("{input} has more than {decimals} fractional digits")]
    TooManyDecimals { input: String, decimals: u8 },
    #[error("{input} does not fit in 256 bits at {decimals} decimals")]
    Overflow { input: String, decimals: u8 },
}

/// Parses decimal text into a fixed-point integer with `decimals` fractional
/// digits.
///
/// Accepts `"12"`, `"12.5"`, `"12."` and `".5"`. Surrounding whitespace is
/// ignored; signs, exponents, separators and excess fractional digits are
/// rejected.
pub fn parse_units(text: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(trimmed.to_owned()));
    }

    let (integer, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());

    if (integer.is_empty() && fraction.is_empty()) || !all_digits(integer) || !all_digits(fraction)
    {
        return Err(AmountError::Malformed(trimmed.to_owned()));
    }

    if fraction.len() > usize::from(decimals) {
        return Err(AmountError::TooManyDecimals {
            input: trimmed.to_owned(),
            decimals,
        });
    }

    let width = usize::from(decimals);
    let scaled = format!("{integer}{fraction:0<width$}");

    U256::from_str_radix(&scaled, 10).map_err(|_| AmountError::Overflow {
        input: trimmed.to_owned(),
        decimals,
    })
}

/// Splits `amount` into its integer digits and its `decimals`-wide,
/// zero-padded fractional digits.
fn split_digits(amount: U256, decimals: u8) -> (String, String) {
    let width = usize::from(decimals);
    let digits = amount.to_string();
    let padded = format!("{digits:0>min$}", min = width + 1);
    let (integer, fraction) = padded.split_at(padded.len() - width);

    (integer.to_owned(), fraction.to_owned())
}

/// Formats `amount` with exactly `precision` fractional digits.
///
/// Digits past `precision` are truncated. When the token has fewer decimals
/// than `precision` the fraction is padded with zeros.
pub fn format_units(amount: U256, decimals: u8, precision: usize) -> String {
    let (integer, fraction) = split_digits(amount, decimals);

    if precision == 0 {
        return integer;
    }

    let shown = fraction.get(..precision).unwrap_or(&fraction);
    format!("{integer}.{shown:0<precision$}")
}

/// Exact decimal text for an input field, trailing zeros trimmed.
pub fn to_input_text(amount: U256, decimals: u8) -> String {
    let (integer, fraction) = split_digits(amount, decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        integer
    } else {
        format!("{integer}.{fraction}")
    }
}

/// Summary rendering: truncated to `precision`, grouped by thousands and
/// followed by the token symbol, e.g. `"1,234.50 USDC"`.
pub fn display(amount: U256, decimals: u8, precision: usize, symbol: &str) -> String {
    let formatted = format_units(amount, decimals, precision);
    let (integer, fraction) = formatted
        .split_once('.')
        .map_or((formatted.as_str(), None), |(int, frac)| (int, Some(frac)));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match (fraction, symbol.is_empty()) {
        (Some(fraction), false) => format!("{grouped}.{fraction} {symbol}"),
        (Some(fraction), true) => format!("{grouped}.{fraction}"),
        (None, false) => format!("{grouped} {symbol}"),
        (None, true) => grouped,
    }
}

/// A scaled amount paired with the decimals needed to read it.
///
/// Serializes as exact decimal text (`"37.5"`), which keeps JSON output
/// human-readable without losing precision.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Quantity {
    amount: U256,
    decimals: u8,
}

impl Quantity {
    pub const fn new(amount: U256, decimals: u8) -> Self {
        Self { amount, decimals }
    }

    pub fn parse(text: &str, decimals: u8) -> Result<Self, AmountError> {
        parse_units(text, decimals).map(|amount| Self::new(amount, decimals))
    }

    pub const fn amount(self) -> U256 {
        self.amount
    }

    pub const fn decimals(self) -> u8 {
        self.decimals
    }

    pub fn display(self, precision: usize, symbol: &str) -> String {
        display(self.amount, self.decimals, precision, symbol)
    }
}

impl Debug for Quantity {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            dest,
            "Quantity({}, decimals = {})",
            to_input_text(self.amount, self.decimals),
            self.decimals
        )
    }
}

impl Display for Quantity {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(dest, "{}", to_input_text(self.amount, self.decimals))
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
