//! The wallet / RPC surface the top-up flow talks to.
use crate::error::TopUpResult;
use alloy_primitives::{Address, B256, ChainId, I256, Log, U256};
use async_trait::async_trait;

/// The parts of a mined transaction receipt the top-up flow reads.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// Position of the transaction in its block, when the node reports it.
    pub transaction_index: Option<u64>,
    pub logs: Vec<Log>,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositLimits {
    pub min_deposit: U256,
    pub max_deposit: U256,
    pub enabled: bool,
}

/// Wallet and chain access. Reads name the chain they target; writes go to the
/// chain the wallet is currently on.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Connected account, if any.
    fn address(&self) -> Option<Address>;

    async fn active_chain(&self) -> TopUpResult<ChainId>;

    async fn switch_chain(&self, chain_id: ChainId) -> TopUpResult<()>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        chain_id: ChainId,
    ) -> TopUpResult<U256>;

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        chain_id: ChainId,
    ) -> TopUpResult<B256>;

    async fn deposit(
        &self,
        vault: Address,
        token: Address,
        amount: U256,
        recipient: Address,
        gas_limit: u64,
        chain_id: ChainId,
    ) -> TopUpResult<B256>;

    async fn wait_for_receipt(&self, tx_hash: B256, chain_id: ChainId) -> TopUpResult<TxReceipt>;

    async fn is_payment_processed(
        &self,
        settlement: Address,
        payment_id: B256,
        chain_id: ChainId,
    ) -> TopUpResult<bool>;

    async fn rose_usd_feed(&self, settlement: Address, chain_id: ChainId) -> TopUpResult<Address>;

    async fn token_price_feed(
        &self,
        settlement: Address,
        token: Address,
        chain_id: ChainId,
    ) -> TopUpResult<Address>;

    async fn feed_decimals(&self, feed: Address, chain_id: ChainId) -> TopUpResult<u8>;

    /// The `answer` field of the feed's latest round.
    async fn latest_answer(&self, feed: Address, chain_id: ChainId) -> TopUpResult<I256>;

    /// Balance of `token` held by `owner`; the native sentinel reads the native balance.
    async fn token_balance(
        &self,
        owner: Address,
        token: Address,
        chain_id: ChainId,
    ) -> TopUpResult<U256>;

    async fn deposit_limits(
        &self,
        vault: Address,
        token: Address,
        chain_id: ChainId,
    ) -> TopUpResult<DepositLimits>;
}
