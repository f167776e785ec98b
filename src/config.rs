//! Runtime configuration.
//!
//! Values come from command-line flags, their environment variable
//! fallbacks and an optional plaintext TOML file, in that order of
//! precedence. The private key is only ever read from the flag or the
//! environment, never from the file.

use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};

use alloy::primitives::{Address, B256};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::Level;
use url::Url;

use crate::route::VaultRoute;

/// Node the development build talks to.
pub const LOCAL_RPC_URL: &str = "http://localhost:8545";

const DEFAULT_CONFIRMATIONS: u64 = 1;

#[derive(Parser, Debug, Clone, Default)]
pub struct Env {
    /// Path to an optional plaintext TOML configuration file
    #[clap(long, env = "VAULT_CONFIG")]
    pub config: Option<PathBuf>,
    /// Vault loaded when no route is given
    #[clap(long, env = "VAULT_ADDRESS")]
    pub vault_address: Option<Address>,
    /// Route selecting the vault, e.g. /vault/0x...
    #[clap(long)]
    pub route: Option<VaultRoute>,
    /// Hosted JSON-RPC endpoint, required outside development builds
    #[clap(long, env = "RPC_URL")]
    pub rpc_url: Option<Url>,
    #[clap(long, env = "BUILD_MODE", value_enum)]
    pub build_mode: Option<BuildMode>,
    /// Key signing transactions; read-only commands work without it
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<B256>,
    #[clap(long, env = "LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
    /// Blocks a transaction needs before it counts as confirmed
    #[clap(long, env = "REQUIRED_CONFIRMATIONS")]
    pub required_confirmations: Option<u64>,
}

/// Settings deserialized from the plaintext config TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    vault_address: Option<Address>,
    rpc_url: Option<Url>,
    build_mode: Option<BuildMode>,
    log_level: Option<LogLevel>,
    required_confirmations: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    #[default]
    Production,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        (&log_level).into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("no vault selected: pass --route or set VAULT_ADDRESS")]
    MissingVault,
    #[error("RPC_URL is required unless BUILD_MODE=development")]
    MissingRpcUrl,
    #[error("PRIVATE_KEY is required to send transactions")]
    MissingPrivateKey,
    #[error("invalid local RPC URL")]
    LocalUrl(#[from] url::ParseError),
}

/// Everything a command needs, assembled from [`Env`] and the config file.
#[derive(Clone)]
pub struct Ctx {
    pub log_level: LogLevel,
    pub build_mode: BuildMode,
    pub rpc_url: Url,
    pub vault: Address,
    pub required_confirmations: u64,
    private_key: Option<B256>,
}

impl Debug for Ctx {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        dest.debug_struct("Ctx")
            .field("log_level", &self.log_level)
            .field("build_mode", &self.build_mode)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("vault", &self.vault)
            .field("required_confirmations", &self.required_confirmations)
            .field("private_key", &self.private_key.map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Ctx {
    pub fn load(env: Env) -> Result<Self, ConfigError> {
        let config = match &env.config {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };

        Self::assemble(env, config)
    }

    pub fn from_toml(env: Env, config_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        Self::assemble(env, config)
    }

    fn assemble(env: Env, config: Config) -> Result<Self, ConfigError> {
        let build_mode = env
            .build_mode
            .or(config.build_mode)
            .unwrap_or_default();

        let rpc_url = match build_mode {
            BuildMode::Development => Url::parse(LOCAL_RPC_URL)?,
            BuildMode::Production => env
                .rpc_url
                .or(config.rpc_url)
                .ok_or(ConfigError::MissingRpcUrl)?,
        };

        let vault = VaultRoute::resolve(env.route, env.vault_address.or(config.vault_address))
            .ok_or(ConfigError::MissingVault)?;

        Ok(Self {
            log_level: env.log_level.or(config.log_level).unwrap_or(LogLevel::Info),
            build_mode,
            rpc_url,
            vault,
            required_confirmations: env
                .required_confirmations
                .or(config.required_confirmations)
                .unwrap_or(DEFAULT_CONFIRMATIONS),
            private_key: env.private_key,
        })
    }

    pub fn private_key(&self) -> Result<&B256, ConfigError> {
        self.private_key
            .as_ref()
            .ok_or(ConfigError::MissingPrivateKey)
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

impl Display for BuildMode {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(dest, "development"),
            Self::Production => write!(dest, "production"),
        }
    }
}

pub fn setup_tracing(log_level: &LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("coinflakes_vault={level},coinflakes_evm={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
