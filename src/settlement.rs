use crate::cancel::CancelToken;
use crate::error::{TopUpError, TopUpResult};
use crate::wallet::WalletClient;
use alloy_primitives::{Address, B256, ChainId, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(4);
pub const POLL_MAX_ATTEMPTS: u32 = 60;

pub const BALANCE_CHECK_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// 0.001 ROSE; smaller increases are treated as dust or staking rewards.
pub const MIN_BALANCE_INCREASE: u64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStrategy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollStrategy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: POLL_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    /// The polling window closed first. Settlement may still happen later.
    Unconfirmed,
}

pub struct SettlementPoller<W> {
    wallet: Arc<W>,
    settlement: Address,
    strategy: PollStrategy,
}

impl<W: WalletClient> SettlementPoller<W> {
    pub fn new(wallet: Arc<W>, settlement: Address, strategy: PollStrategy) -> Self {
        Self {
            wallet,
            settlement,
            strategy,
        }
    }

    /// Polls `isPaymentProcessed` until it reports true or attempts run out. Read
    /// errors count as an attempt and are retried after the usual interval.
    pub async fn poll_until_settled(
        &self,
        payment_id: B256,
        chain_id: ChainId,
        cancel: &CancelToken,
    ) -> TopUpResult<Settlement> {
        for attempt in 1..=self.strategy.max_attempts {
            cancel.check()?;

            match self
                .wallet
                .is_payment_processed(self.settlement, payment_id, chain_id)
                .await
            {
                Ok(true) => {
                    info!("Payment {:?} processed after {} attempt(s)", payment_id, attempt);
                    return Ok(Settlement::Confirmed);
                }
                Ok(false) => debug!(
                    "Payment {:?} not processed yet ({}/{})",
                    payment_id, attempt, self.strategy.max_attempts
                ),
                Err(e) => warn!("Error checking payment processed: {}", e),
            }

            cancel.sleep(self.strategy.interval).await?;
        }

        warn!(
            "Payment {:?} not confirmed within {} attempts, funds may still arrive",
            payment_id, self.strategy.max_attempts
        );
        Ok(Settlement::Unconfirmed)
    }
}

/// How to confirm the payout landed on the recipient's native balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceWatch {
    pub min_increase: U256,
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for BalanceWatch {
    fn default() -> Self {
        Self {
            min_increase: U256::from(MIN_BALANCE_INCREASE),
            timeout: BALANCE_CHECK_TIMEOUT,
            interval: POLL_INTERVAL,
        }
    }
}

/// Waits until `owner`'s balance of `token` reaches `baseline + min_increase`.
pub async fn wait_for_balance_increase<W: WalletClient + ?Sized>(
    wallet: &W,
    owner: Address,
    token: Address,
    chain_id: ChainId,
    baseline: U256,
    watch: &BalanceWatch,
    cancel: &CancelToken,
) -> TopUpResult<U256> {
    let target = baseline.saturating_add(watch.min_increase);
    let started_at = Instant::now();

    while started_at.elapsed() < watch.timeout {
        cancel.check()?;

        match wallet.token_balance(owner, token, chain_id).await {
            Ok(current) if current >= target => {
                info!("Destination balance increased from {} to {}", baseline, current);
                return Ok(current);
            }
            Ok(current) => debug!("Destination balance {} below {}", current, target),
            Err(e) => warn!("Error reading destination balance: {}", e),
        }

        cancel.sleep(watch.interval).await?;
    }

    Err(TopUpError::BalanceNotIncreased)
}
