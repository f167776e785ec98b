//! Command-line console for reading and operating a Coinflakes vault.

use coinflakes_vault::cli;
use coinflakes_vault::setup_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (ctx, command) = cli::CliEnv::parse_and_convert()?;
    setup_tracing(&ctx.log_level);

    cli::run_command(ctx, command).await?;
    Ok(())
}
