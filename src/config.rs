use crate::chains::{
    BASE_CHAIN_ID, DEFAULT_SLIPPAGE_PERCENT, SAPPHIRE_CHAIN_ID, TokenConfig, find_source_chain,
    find_token,
};
use crate::saga::TopUpConfig;
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::ChainId;
use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub source_rpc_urls: Vec<String>,
    pub destination_rpc_urls: Vec<String>,
    pub signer: PrivateKeySigner,
    pub source_chain_id: ChainId,
    pub token: TokenConfig,
    pub slippage_percent: u64,
    pub database_url: String,
    /// Wait for the destination balance to move after settlement.
    pub confirm_balance: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let source_rpc_urls = parse_url_list(
            &std::env::var("SOURCE_RPC_URLS").context("SOURCE_RPC_URLS must be set in .env")?,
        );
        let destination_rpc_urls = parse_url_list(
            &std::env::var("DESTINATION_RPC_URLS")
                .context("DESTINATION_RPC_URLS must be set in .env")?,
        );
        if source_rpc_urls.is_empty() || destination_rpc_urls.is_empty() {
            return Err(anyhow::anyhow!(
                "SOURCE_RPC_URLS and DESTINATION_RPC_URLS need at least one URL each"
            ));
        }

        let private_key =
            std::env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set in .env")?;
        let signer =
            PrivateKeySigner::from_str(private_key.trim()).context("Invalid PRIVATE_KEY format")?;

        let source_chain_id = BASE_CHAIN_ID;
        let symbol = std::env::var("TOKEN_SYMBOL").unwrap_or_else(|_| "USDC".to_string());
        let token = find_token(source_chain_id, &symbol).with_context(|| {
            format!("Unsupported TOKEN_SYMBOL {symbol} on chain {source_chain_id}")
        })?;

        let slippage_percent = match std::env::var("SLIPPAGE_PERCENT") {
            Ok(value) => value
                .parse::<u64>()
                .context("Invalid SLIPPAGE_PERCENT format")?,
            Err(_) => DEFAULT_SLIPPAGE_PERCENT,
        };
        if slippage_percent >= 100 {
            return Err(anyhow::anyhow!("SLIPPAGE_PERCENT must be below 100"));
        }

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./topup.db".to_string());

        let confirm_balance = std::env::var("CONFIRM_BALANCE")
            .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Config {
            source_rpc_urls,
            destination_rpc_urls,
            signer,
            source_chain_id,
            token,
            slippage_percent,
            database_url,
            confirm_balance,
        })
    }

    /// RPC endpoints keyed by chain, in the shape [`crate::rpc::RpcWallet`] takes.
    pub fn endpoints(&self) -> Vec<(ChainId, Vec<String>)> {
        vec![
            (self.source_chain_id, self.source_rpc_urls.clone()),
            (SAPPHIRE_CHAIN_ID, self.destination_rpc_urls.clone()),
        ]
    }

    pub fn topup_config(&self) -> Result<TopUpConfig> {
        let source = find_source_chain(self.source_chain_id)
            .with_context(|| format!("Unsupported source chain {}", self.source_chain_id))?;
        let mut config = TopUpConfig::new(&source, self.token.clone());
        config.slippage_percent = self.slippage_percent;
        if !self.confirm_balance {
            config.balance_watch = None;
        }
        Ok(config)
    }
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_skips_blanks() {
        assert_eq!(
            parse_url_list(" https://a.example , ,https://b.example,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_url_list("  ").is_empty());
    }
}
