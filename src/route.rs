//! The console's only route, `/vault/:address`.

use std::fmt::Display;
use std::str::FromStr;

use alloy::primitives::Address;

const PREFIX: &str = "/vault/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route matches {0}")]
    NoMatch(String),
    #[error("invalid vault address in route: {0}")]
    InvalidAddress(String),
}

/// Selects which vault the console loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultRoute {
    pub address: Address,
}

impl VaultRoute {
    /// The route wins over the configured default.
    pub fn resolve(route: Option<Self>, default: Option<Address>) -> Option<Address> {
        route.map(|route| route.address).or(default)
    }
}

impl FromStr for VaultRoute {
    type Err = RouteError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let segment = path
            .strip_prefix(PREFIX)
            .map(|rest| rest.strip_suffix('/').unwrap_or(rest))
            .filter(|segment| !segment.is_empty() && !segment.contains('/'))
            .ok_or_else(|| RouteError::NoMatch(path.to_owned()))?;

        let address = segment
            .parse()
            .map_err(|_| RouteError::InvalidAddress(segment.to_owned()))?;

        Ok(Self { address })
    }
}

impl Display for VaultRoute {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(dest, "{PREFIX}{}", self.address)
    }
}
