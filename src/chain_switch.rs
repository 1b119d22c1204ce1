use crate::error::{TopUpError, TopUpResult};
use crate::wallet::WalletClient;
use alloy_primitives::{Address, ChainId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

pub const SWITCH_TIMEOUT: Duration = Duration::from_secs(3);
/// Wallet-side state needs a moment to follow a switch before reads and writes rely on it.
pub const SETTLE_DELAY: Duration = Duration::from_secs(7);

/// Provider error text that usually accompanies a switch that did go through.
pub const UNSUPPORTED_CHAIN_MARKER: &str = "Unsupported Chain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchTiming {
    pub switch_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for SwitchTiming {
    fn default() -> Self {
        Self {
            switch_timeout: SWITCH_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSwitchOutcome {
    /// The wallet was already on the target chain; nothing was requested.
    AlreadyActive,
    Switched,
    /// The provider raised "Unsupported Chain". The switch has most likely happened
    /// anyway, but this is reported as a failure.
    PossiblySwitched,
    Failed(String),
}

impl ChainSwitchOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::AlreadyActive | Self::Switched)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

pub struct ChainSwitchCoordinator<W> {
    wallet: Arc<W>,
    timing: SwitchTiming,
}

impl<W: WalletClient> ChainSwitchCoordinator<W> {
    pub fn new(wallet: Arc<W>, timing: SwitchTiming) -> Self {
        Self { wallet, timing }
    }

    /// Makes `target_chain_id` the wallet's active chain. Only a missing wallet address
    /// is an error; every switch problem is reported through the outcome.
    pub async fn ensure_chain(
        &self,
        target_chain_id: ChainId,
        wallet_address: Option<Address>,
    ) -> TopUpResult<ChainSwitchOutcome> {
        let address = wallet_address.ok_or(TopUpError::WalletNotConnected)?;

        let current = match self.wallet.active_chain().await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                warn!("Failed to read active chain for {:?}: {}", address, e);
                return Ok(failed(target_chain_id));
            }
        };
        if current == target_chain_id {
            debug!("Wallet already on chain {}", target_chain_id);
            return Ok(ChainSwitchOutcome::AlreadyActive);
        }

        info!("Switching wallet from chain {} to {}", current, target_chain_id);
        match timeout(
            self.timing.switch_timeout,
            self.wallet.switch_chain(target_chain_id),
        )
        .await
        {
            Ok(Ok(())) => {
                sleep(self.timing.settle_delay).await;
                info!("Wallet switched to chain {}", target_chain_id);
                Ok(ChainSwitchOutcome::Switched)
            }
            Ok(Err(e)) if e.to_string().contains(UNSUPPORTED_CHAIN_MARKER) => {
                warn!(
                    "Got '{}' error switching to chain {}, the switch likely succeeded",
                    UNSUPPORTED_CHAIN_MARKER, target_chain_id
                );
                Ok(ChainSwitchOutcome::PossiblySwitched)
            }
            Ok(Err(e)) => {
                warn!("Chain switch to {} failed: {}", target_chain_id, e);
                Ok(failed(target_chain_id))
            }
            Err(_) => {
                warn!(
                    "Chain switch to {} timed out after {:?}",
                    target_chain_id, self.timing.switch_timeout
                );
                Ok(failed(target_chain_id))
            }
        }
    }
}

fn failed(target_chain_id: ChainId) -> ChainSwitchOutcome {
    ChainSwitchOutcome::Failed(format!(
        "Failed to switch to chain (Chain ID: {target_chain_id})."
    ))
}
