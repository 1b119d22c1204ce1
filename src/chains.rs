use alloy_primitives::{Address, ChainId, address};
use std::time::Duration;

pub const BASE_CHAIN_ID: ChainId = 8453;
pub const SAPPHIRE_CHAIN_ID: ChainId = 23294;

/// Chain assumed for persisted records written before `sourceChainId` existed.
pub const LEGACY_SOURCE_CHAIN_ID: ChainId = BASE_CHAIN_ID;

/// Sentinel standing in for the chain's native currency; it has no allowance.
pub const NATIVE_TOKEN_ADDRESS: Address = address!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

pub const BASE_VAULT_ADDRESS: Address = address!("0x7D3B4dd07bd523E519e0A91afD8e3B325586fb5b");
pub const SAPPHIRE_SETTLEMENT_ADDRESS: Address =
    address!("0x6997953a4458F019506370110e84eefF52d375ad");

/// Pre-set so deposits through the vault proxy skip gas estimation.
pub const DEPOSIT_GAS_LIMIT: u64 = 500_000;

pub const DEFAULT_SLIPPAGE_PERCENT: u64 = 2;

/// Rough settlement time, shown next to the confirmation step.
pub const EXPECTED_SETTLEMENT_TIME: Duration = Duration::from_secs(60);

/// Decimals of the destination chain's native token (ROSE).
pub const DESTINATION_NATIVE_DECIMALS: u8 = 18;
pub const DESTINATION_NATIVE_SYMBOL: &str = "ROSE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub contract_address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub chain_id: ChainId,
}

#[derive(Debug, Clone)]
pub struct SourceChain {
    pub chain_id: ChainId,
    pub name: &'static str,
    pub vault_address: Address,
    pub tokens: Vec<TokenConfig>,
}

pub fn source_chains() -> Vec<SourceChain> {
    vec![SourceChain {
        chain_id: BASE_CHAIN_ID,
        name: "Base",
        vault_address: BASE_VAULT_ADDRESS,
        tokens: vec![
            TokenConfig {
                contract_address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                symbol: "USDC".to_string(),
                decimals: 6,
                chain_id: BASE_CHAIN_ID,
            },
            TokenConfig {
                contract_address: address!("0xfde4C96c8593536E31F229EA8f37b2ADa2699bb2"),
                symbol: "USDT".to_string(),
                decimals: 6,
                chain_id: BASE_CHAIN_ID,
            },
        ],
    }]
}

pub fn supported_source_chain_ids() -> Vec<ChainId> {
    source_chains().iter().map(|c| c.chain_id).collect()
}

pub fn find_source_chain(chain_id: ChainId) -> Option<SourceChain> {
    source_chains().into_iter().find(|c| c.chain_id == chain_id)
}

pub fn find_token(chain_id: ChainId, symbol: &str) -> Option<TokenConfig> {
    find_source_chain(chain_id)?
        .tokens
        .into_iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}
