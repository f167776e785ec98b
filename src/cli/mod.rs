//! Command-line console for a Coinflakes vault.
//!
//! Every write command drives the same form controller a front-end would:
//! the amount goes through the input, the maximum and the allowance are
//! loaded, an approval is sent only when the allowance falls short, and
//! the action itself runs through its lifecycle.

use std::io::Write;

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use clap::{Args, Parser, Subcommand};
use coinflakes_amount::{DEFAULT_PRECISION, Quantity, to_input_text};
use coinflakes_evm::{Evm, RpcEvm, Wallet};
use thiserror::Error;
use tracing::info;

use crate::approval::ApprovalOutcome;
use crate::config::{Ctx, Env};
use crate::conversion::{PriceChange, SharePrice};
use crate::form::{
    AmountForm, Deposit, Mint, Redeem, ReturnFunds, SetAssetsInUse, ShareholderForm, Unit,
    UseAssets, VaultAction, Withdraw,
};
use crate::lifecycle::{TxFailure, TxState};
use crate::vault::{Roles, Vault, VaultContext};

mod summary;

use summary::VaultSummary;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{account} is not the vault manager")]
    NotManager { account: Address },
    #[error("{account} is not a whitelisted shareholder")]
    NotShareholder { account: Address },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("amount exceeds the maximum of {max}")]
    AboveMaximum { max: String },
    #[error("no maximum available for {action}")]
    NoMaximum { action: &'static str },
    #[error("not a shareholder address: {0}")]
    InvalidAddress(String),
    #[error("{account} is already a shareholder")]
    AlreadyShareholder { account: Address },
    #[error("{account} is not a shareholder")]
    NotWhitelisted { account: Address },
    #[error("{action} cannot be sent with the current inputs")]
    NotReady { action: &'static str },
    #[error("{action} was rejected by the wallet")]
    Rejected { action: &'static str },
    #[error("{action} failed: {failure}")]
    Failed {
        action: &'static str,
        failure: TxFailure,
    },
    #[error("{action} did not settle: {state}")]
    Unsettled {
        action: &'static str,
        state: TxState,
    },
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the vault figures and the position of one account
    Summary {
        /// Account to show; defaults to the signing account when a key is set
        #[arg(long)]
        account: Option<Address>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Buy shares by paying in assets
    Deposit(AmountArgs),
    /// Buy an exact number of shares
    Mint(AmountArgs),
    /// Sell an exact number of shares
    Redeem(AmountArgs),
    /// Sell shares for an exact amount of assets
    Withdraw(AmountArgs),
    /// Pay assets back into the vault (manager)
    ReturnFunds(AmountArgs),
    /// Take liquid assets out of the vault (manager)
    WithdrawFunds(AmountArgs),
    /// Report the current value of the assets in use (manager)
    SetAssetsInUse {
        /// New value in whole assets; zero is allowed
        #[arg(short = 'a', long = "amount")]
        amount: String,
    },
    /// Add an address to the shareholder whitelist (manager)
    Whitelist {
        /// Hex address; mixed case must be checksummed
        address: String,
    },
    /// Remove an address from the shareholder whitelist (manager)
    Revoke {
        /// Hex address; mixed case must be checksummed
        address: String,
    },
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct AmountArgs {
    /// Amount in whole tokens, e.g. 12.5
    #[arg(short = 'a', long = "amount")]
    pub amount: Option<String>,
    /// Use the largest amount the account can
    #[arg(long)]
    pub max: bool,
}

impl AmountArgs {
    fn entry(&self) -> Entry<'_> {
        match &self.amount {
            Some(text) if !self.max => Entry::Text(text),
            _ => Entry::Max,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry<'a> {
    Text(&'a str),
    Max,
}

#[derive(Debug, Parser)]
#[command(name = "vault-cli")]
#[command(about = "Console for a Coinflakes investment vault")]
#[command(version)]
pub struct CliEnv {
    #[clap(flatten)]
    env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

impl CliEnv {
    /// Parse CLI arguments and assemble the runtime context
    pub fn parse_and_convert() -> anyhow::Result<(Ctx, Commands)> {
        let cli_env = Self::parse();
        let ctx = Ctx::load(cli_env.env)?;
        Ok((ctx, cli_env.command))
    }
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();

    match ctx.private_key() {
        Ok(private_key) => {
            let wallet = coinflakes_evm::rpc::connect_http(
                ctx.rpc_url.clone(),
                private_key,
                ctx.required_confirmations,
            )?;
            execute(command, &wallet, ctx.vault, &mut stdout).await
        }
        Err(error) => {
            let Commands::Summary { account, json } = command else {
                return Err(error.into());
            };

            info!(rpc_url = %ctx.rpc_url, "No private key, reading only");
            let evm = RpcEvm::new(ProviderBuilder::new().connect_http(ctx.rpc_url.clone()));
            summary_command(&evm, ctx.vault, account, json, &mut stdout).await
        }
    }
}

/// Runs `command` against the vault at `vault`, signing with `wallet`.
pub async fn execute<W: Wallet, O: Write>(
    command: Commands,
    wallet: &W,
    vault: Address,
    stdout: &mut O,
) -> anyhow::Result<()> {
    match command {
        Commands::Summary { account, json } => {
            let account = account.unwrap_or_else(|| wallet.address());
            summary_command(wallet, vault, Some(account), json, stdout).await
        }
        Commands::Deposit(args) => {
            amount_command::<Deposit, _, _>(wallet, vault, Role::Shareholder, args.entry(), stdout)
                .await
        }
        Commands::Mint(args) => {
            amount_command::<Mint, _, _>(wallet, vault, Role::Shareholder, args.entry(), stdout)
                .await
        }
        Commands::Redeem(args) => {
            amount_command::<Redeem, _, _>(wallet, vault, Role::Shareholder, args.entry(), stdout)
                .await
        }
        Commands::Withdraw(args) => {
            amount_command::<Withdraw, _, _>(wallet, vault, Role::Shareholder, args.entry(), stdout)
                .await
        }
        Commands::ReturnFunds(args) => {
            amount_command::<ReturnFunds, _, _>(wallet, vault, Role::Manager, args.entry(), stdout)
                .await
        }
        Commands::WithdrawFunds(args) => {
            amount_command::<UseAssets, _, _>(wallet, vault, Role::Manager, args.entry(), stdout)
                .await
        }
        Commands::SetAssetsInUse { amount } => {
            amount_command::<SetAssetsInUse, _, _>(
                wallet,
                vault,
                Role::Manager,
                Entry::Text(&amount),
                stdout,
            )
            .await
        }
        Commands::Whitelist { address } => {
            membership_command(wallet, vault, &address, Membership::Whitelist, stdout).await
        }
        Commands::Revoke { address } => {
            membership_command(wallet, vault, &address, Membership::Revoke, stdout).await
        }
    }
}

/// Role an account needs for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Shareholder,
    Manager,
}

impl Role {
    fn check(self, roles: Roles, account: Address) -> Result<(), CliError> {
        match self {
            Self::Shareholder if !roles.shareholder => Err(CliError::NotShareholder { account }),
            Self::Manager if !roles.manager => Err(CliError::NotManager { account }),
            Self::Shareholder | Self::Manager => Ok(()),
        }
    }
}

async fn load_for_role<W: Wallet>(
    wallet: &W,
    vault: Address,
    role: Role,
) -> anyhow::Result<VaultContext> {
    let account = wallet.address();
    let context = VaultContext::load(wallet, vault).await?;
    let roles = context.vault().roles(wallet, account).await?;
    role.check(roles, account)?;
    Ok(context)
}

async fn summary_command<E: Evm, O: Write>(
    evm: &E,
    vault: Address,
    account: Option<Address>,
    json: bool,
    stdout: &mut O,
) -> anyhow::Result<()> {
    let vault = Vault::load(evm, vault).await?;
    let summary = VaultSummary::load(evm, &vault, account).await?;

    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        summary.write_text(stdout)?;
    }

    Ok(())
}

async fn amount_command<A: VaultAction, W: Wallet, O: Write>(
    wallet: &W,
    vault: Address,
    role: Role,
    entry: Entry<'_>,
    stdout: &mut O,
) -> anyhow::Result<()> {
    let context = load_for_role(wallet, vault, role).await?;
    let mut form = AmountForm::<A>::new(&context, wallet.address());
    form.refresh(wallet).await?;

    let text = match entry {
        Entry::Text(text) => {
            form.on_input(text);
            text.to_owned()
        }
        Entry::Max => form
            .apply_max()
            .ok_or(CliError::NoMaximum { action: A::LABEL })?,
    };
    check_amount(&form, &text)?;

    let snapshot = form.vault().clone();
    writeln!(
        stdout,
        "Preparing {} of {text} {}",
        A::LABEL,
        A::INPUT.symbol(&snapshot)
    )?;
    writeln!(stdout, "   Vault: {}", snapshot.address)?;
    writeln!(stdout, "   Account: {}", form.account())?;
    if let Some(max) = form.max_value() {
        writeln!(
            stdout,
            "   Maximum: {}",
            to_input_text(max, A::INPUT.decimals(&snapshot))
        )?;
    }
    if let Some(derived) = form.derived() {
        writeln!(stdout, "   {}", describe_derived::<A>(&snapshot, derived))?;
    }

    approve_if_needed(&mut form, wallet, stdout).await?;

    if !form.is_valid() {
        return Err(CliError::NotReady { action: A::LABEL }.into());
    }

    writeln!(stdout, "   Sending {}...", A::LABEL)?;
    let state = form.submit(wallet, &context).await?;
    report_settled(A::LABEL, state, stdout)?;

    let updated = context.vault();
    writeln!(
        stdout,
        "   Share price: {}",
        updated
            .share_price_quantity()
            .display(DEFAULT_PRECISION, &updated.asset.symbol)
    )?;
    writeln!(stdout, "{} completed successfully!", capitalize(A::LABEL))?;

    Ok(())
}

fn check_amount<A: VaultAction>(form: &AmountForm<A>, text: &str) -> Result<(), CliError> {
    let amount = form
        .input()
        .amount()
        .ok_or_else(|| CliError::InvalidAmount(text.to_owned()))?;

    if amount.is_zero() && !A::accepts_zero() {
        return Err(CliError::ZeroAmount);
    }

    if !A::max_source().is_bounded() {
        return Ok(());
    }

    let max = form
        .max_value()
        .ok_or(CliError::NoMaximum { action: A::LABEL })?;
    if amount > max {
        return Err(CliError::AboveMaximum {
            max: to_input_text(max, form.input().decimals()),
        });
    }

    Ok(())
}

fn describe_derived<A: VaultAction>(vault: &Vault, derived: Quantity) -> String {
    // The only unbounded action previews a share price, not a conversion.
    if A::max_source().is_bounded() {
        let (verb, unit) = match A::INPUT {
            Unit::Assets => ("for", Unit::Shares),
            Unit::Shares => ("worth", Unit::Assets),
        };
        return format!("Equivalent: {verb} {derived} {}", unit.symbol(vault));
    }

    let change = match PriceChange::between(vault.share_price, SharePrice::new(derived.amount())) {
        PriceChange::Unchanged => "unchanged".to_owned(),
        PriceChange::Gain(delta) => format!("+{}", vault.assets(delta)),
        PriceChange::Loss(delta) => format!("-{}", vault.assets(delta)),
    };
    format!(
        "Share price: {} -> {derived} {} ({change})",
        vault.share_price_quantity(),
        vault.asset.symbol
    )
}

async fn approve_if_needed<A: VaultAction, W: Wallet, O: Write>(
    form: &mut AmountForm<A>,
    wallet: &W,
    stdout: &mut O,
) -> anyhow::Result<()> {
    let Some(approval) = form.approval() else {
        return Ok(());
    };
    if approval.is_satisfied() {
        writeln!(stdout, "   Allowance already covers the amount")?;
        return Ok(());
    }

    let snapshot = form.vault();
    let unit = if approval.tracker().token() == snapshot.address {
        Unit::Shares
    } else {
        Unit::Assets
    };
    writeln!(
        stdout,
        "   Approving {} {}...",
        to_input_text(approval.amount_needed(), unit.decimals(snapshot)),
        unit.symbol(snapshot)
    )?;

    match form.approve(wallet).await? {
        ApprovalOutcome::AlreadyApproved { .. } => {
            writeln!(stdout, "   Allowance already covers the amount")?;
        }
        ApprovalOutcome::Approved { tx_hash, .. } => {
            writeln!(stdout, "   Approval tx: {tx_hash}")?;
        }
        ApprovalOutcome::NotReady => {
            return Err(CliError::NotReady { action: "approve" }.into());
        }
        ApprovalOutcome::Rejected => return Err(CliError::Rejected { action: "approve" }.into()),
        ApprovalOutcome::Failed(failure) => {
            return Err(CliError::Failed {
                action: "approve",
                failure,
            }
            .into());
        }
    }

    Ok(())
}

fn report_settled<O: Write>(
    action: &'static str,
    state: TxState,
    stdout: &mut O,
) -> anyhow::Result<()> {
    match state {
        TxState::Success {
            tx_hash,
            block_number,
        } => {
            writeln!(stdout, "   Tx: {tx_hash}")?;
            if let Some(block_number) = block_number {
                writeln!(stdout, "   Block: {block_number}")?;
            }
            Ok(())
        }
        TxState::Idle => Err(CliError::Rejected { action }.into()),
        TxState::Error(failure) => Err(CliError::Failed { action, failure }.into()),
        state @ (TxState::Submitting | TxState::Pending { .. }) => {
            Err(CliError::Unsettled { action, state }.into())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Whitelist,
    Revoke,
}

impl Membership {
    const fn label(self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist shareholder",
            Self::Revoke => "revoke shareholder",
        }
    }
}

async fn membership_command<W: Wallet, O: Write>(
    wallet: &W,
    vault: Address,
    address: &str,
    membership: Membership,
    stdout: &mut O,
) -> anyhow::Result<()> {
    let context = load_for_role(wallet, vault, Role::Manager).await?;
    let mut form = ShareholderForm::new(&context.vault());

    form.on_input(address);
    let account = form
        .address()
        .ok_or_else(|| CliError::InvalidAddress(address.to_owned()))?;
    form.refresh(wallet).await?;

    let state = match membership {
        Membership::Whitelist => {
            if !form.can_whitelist() {
                return Err(CliError::AlreadyShareholder { account }.into());
            }
            writeln!(stdout, "Whitelisting {account}")?;
            form.whitelist(wallet).await?
        }
        Membership::Revoke => {
            if !form.can_revoke() {
                return Err(CliError::NotWhitelisted { account }.into());
            }
            writeln!(stdout, "Revoking {account}")?;
            form.revoke(wallet).await?
        }
    };

    report_settled(membership.label(), state, stdout)?;
    writeln!(
        stdout,
        "   Shareholder: {}",
        form.is_shareholder().unwrap_or_default()
    )?;
    writeln!(stdout, "{} completed successfully!", capitalize(membership.label()))?;

    Ok(())
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
