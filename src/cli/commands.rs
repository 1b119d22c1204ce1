use crate::chains::DESTINATION_NATIVE_DECIMALS;
use crate::cli::formatters::{
    OutputFormat, format_estimate, format_history, format_limits, format_outcome,
    format_pending, format_quote, format_steps,
};
use crate::error::TopUpResult;
use crate::saga::{TopUpOutcome, TopUpSaga};
use crate::wallet::WalletClient;
use alloy_primitives::{Address, U256};
use alloy_primitives::utils::parse_units;
use anyhow::{Context, Result};
use tracing::info;

/// Parses a human amount such as `12.5` into base units.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256> {
    let parsed = parse_units(amount.trim(), decimals)
        .with_context(|| format!("Invalid amount: {amount}"))?;
    let value = parsed.get_absolute();
    if parsed.is_negative() || value.is_zero() {
        return Err(anyhow::anyhow!("Amount must be positive: {}", amount));
    }
    Ok(value)
}

async fn ensure_feeds<W: WalletClient>(saga: &TopUpSaga<W>) -> Result<()> {
    if saga.is_quote_ready() {
        return Ok(());
    }
    saga.load_price_feeds()
        .await
        .context("Failed to load price feeds")?;
    Ok(())
}

pub async fn cmd_quote<W: WalletClient>(
    saga: &TopUpSaga<W>,
    amount: &str,
    format: &OutputFormat,
) -> Result<()> {
    let requested = parse_amount(amount, DESTINATION_NATIVE_DECIMALS)?;
    ensure_feeds(saga).await?;

    let quote = saga
        .get_quote(requested)
        .await?
        .context("Price feeds are not loaded")?;
    println!("{}", format_quote(&quote, &saga.config().token, format));
    Ok(())
}

pub async fn cmd_estimate<W: WalletClient>(
    saga: &TopUpSaga<W>,
    amount: &str,
    format: &OutputFormat,
) -> Result<()> {
    let token = &saga.config().token;
    let deposit = parse_amount(amount, token.decimals)?;
    ensure_feeds(saga).await?;

    let estimate = saga
        .get_estimate(deposit)
        .await?
        .context("Price feeds are not loaded")?;
    println!("{}", format_estimate(deposit, estimate, token, format));
    Ok(())
}

/// Quotes `amount` of the destination token, then runs the top-up for the quoted
/// deposit.
pub async fn cmd_run<W: WalletClient>(
    saga: &TopUpSaga<W>,
    amount: &str,
    format: &OutputFormat,
) -> Result<()> {
    let requested = parse_amount(amount, DESTINATION_NATIVE_DECIMALS)?;
    ensure_feeds(saga).await?;
    let quote = saga
        .get_quote(requested)
        .await?
        .context("Price feeds are not loaded")?;
    info!(
        "Depositing {} {} base units",
        quote.source_amount,
        saga.config().token.symbol
    );

    let result = saga.start_topup(quote.source_amount).await;
    report_run(saga, result, format)
}

pub async fn cmd_resume<W: WalletClient>(saga: &TopUpSaga<W>, format: &OutputFormat) -> Result<()> {
    let result = saga.resume_from_pending().await;
    report_run(saga, result, format)
}

fn report_run<W: WalletClient>(
    saga: &TopUpSaga<W>,
    result: TopUpResult<TopUpOutcome>,
    format: &OutputFormat,
) -> Result<()> {
    let state = saga.state();
    println!("{}", format_steps(&state, format));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = state
                .error()
                .map_or_else(|| e.display_message(), str::to_string);
            return Err(anyhow::anyhow!(message));
        }
    };
    println!("{}", format_outcome(&outcome, format));
    Ok(())
}

pub fn cmd_pending<W: WalletClient>(saga: &TopUpSaga<W>, format: &OutputFormat) -> Result<()> {
    let pending = saga.pending_transaction();
    let decimals = saga.config().token.decimals;
    println!("{}", format_pending(pending.as_ref(), decimals, format));
    Ok(())
}

pub fn cmd_dismiss<W: WalletClient>(saga: &TopUpSaga<W>) -> Result<()> {
    saga.dismiss_pending();
    println!("Pending transaction dismissed.");
    Ok(())
}

pub fn cmd_history<W: WalletClient>(
    saga: &TopUpSaga<W>,
    user: Address,
    format: &OutputFormat,
) -> Result<()> {
    let records = saga.history().get_transactions(user);
    println!("{}", format_history(&records, format));
    Ok(())
}

pub fn cmd_clear_history<W: WalletClient>(
    saga: &TopUpSaga<W>,
    user: Address,
) -> Result<()> {
    saga.history().clear_history(user);
    println!("Transaction history cleared for {user:?}.");
    Ok(())
}

pub async fn cmd_limits<W: WalletClient>(saga: &TopUpSaga<W>, format: &OutputFormat) -> Result<()> {
    let limits = saga.deposit_limits().await?;
    println!("{}", format_limits(&limits, &saga.config().token, format));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_amounts() {
        assert_eq!(parse_amount("10.2", 6).unwrap(), U256::from(10_200_000u64));
        assert_eq!(
            parse_amount("1", 18).unwrap(),
            U256::from(10u64).pow(U256::from(18u64))
        );
        assert!(parse_amount("0", 6).is_err());
        assert!(parse_amount("-1", 6).is_err());
        assert!(parse_amount("abc", 6).is_err());
    }
}
