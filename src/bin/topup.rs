use anyhow::Result;
use clap::{Parser, Subcommand};
use paymaster_topup::chains::SAPPHIRE_CHAIN_ID;
use paymaster_topup::cli::commands::{
    cmd_clear_history, cmd_dismiss, cmd_estimate, cmd_history, cmd_limits, cmd_pending,
    cmd_quote, cmd_resume, cmd_run,
};
use paymaster_topup::cli::formatters::OutputFormat;
use paymaster_topup::clock::SystemClock;
use paymaster_topup::config::Config;
use paymaster_topup::repository::Database;
use paymaster_topup::rpc::RpcWallet;
use paymaster_topup::saga::TopUpSaga;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "topup")]
#[command(about = "Top up native gas on Sapphire by depositing stablecoins on Base", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit needed for an amount of ROSE
    Quote { amount: String },
    /// ROSE expected for a stablecoin deposit
    Estimate { amount: String },
    /// Quote and run a top-up for an amount of ROSE
    Run { amount: String },
    /// Resume the pending deposit at settlement polling
    Resume,
    Pending,
    Dismiss,
    History,
    ClearHistory,
    /// Vault deposit limits for the configured token
    Limits,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let user = config.signer.address();
    info!("Configuration loaded for {:?}", user);

    let db = Arc::new(Database::new(&config.database_url)?);
    let wallet = Arc::new(RpcWallet::new(
        config.signer.clone(),
        &config.endpoints(),
        SAPPHIRE_CHAIN_ID,
    )?);
    let saga = TopUpSaga::new(wallet, config.topup_config()?, db, Arc::new(SystemClock));

    match cli.command {
        Commands::Quote { amount } => cmd_quote(&saga, &amount, &format).await?,
        Commands::Estimate { amount } => cmd_estimate(&saga, &amount, &format).await?,
        Commands::Run { amount } => cmd_run(&saga, &amount, &format).await?,
        Commands::Resume => cmd_resume(&saga, &format).await?,
        Commands::Pending => cmd_pending(&saga, &format)?,
        Commands::Dismiss => cmd_dismiss(&saga)?,
        Commands::History => cmd_history(&saga, user, &format)?,
        Commands::ClearHistory => cmd_clear_history(&saga, user)?,
        Commands::Limits => cmd_limits(&saga, &format).await?,
    }

    Ok(())
}
