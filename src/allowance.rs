use crate::chains::NATIVE_TOKEN_ADDRESS;
use crate::error::{TopUpError, TopUpResult};
use crate::wallet::WalletClient;
use alloy_primitives::{Address, B256, ChainId, U256};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceAction {
    /// Native token, nothing to approve.
    NotRequired,
    Sufficient,
    Approved(B256),
}

pub struct AllowanceManager<W> {
    wallet: Arc<W>,
}

impl<W: WalletClient> AllowanceManager<W> {
    pub fn new(wallet: Arc<W>) -> Self {
        Self { wallet }
    }

    /// Approves `spender` for `approval_amount` (defaults to `amount`) when the current
    /// allowance is below `amount`, then waits for the approval to be mined.
    pub async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        owner: Address,
        approval_amount: Option<U256>,
        chain_id: ChainId,
    ) -> TopUpResult<AllowanceAction> {
        if token == NATIVE_TOKEN_ADDRESS {
            return Ok(AllowanceAction::NotRequired);
        }

        let allowance = self
            .wallet
            .allowance(token, owner, spender, chain_id)
            .await?;
        if allowance >= amount {
            info!("Existing allowance {} covers {}", allowance, amount);
            return Ok(AllowanceAction::Sufficient);
        }

        let approval_amount = approval_amount.unwrap_or(amount);
        let hash = self
            .wallet
            .approve(token, spender, approval_amount, chain_id)
            .await
            .map_err(|e| {
                error!("Approval failed: {}", e);
                into_contract_error(e)
            })?;

        let receipt = self
            .wallet
            .wait_for_receipt(hash, chain_id)
            .await
            .map_err(into_contract_error)?;
        if !receipt.success {
            error!("Approval transaction {:?} reverted", hash);
            return Err(TopUpError::Contract(format!(
                "approval transaction {hash:?} reverted"
            )));
        }

        info!("Approval mined successfully: {:?}", hash);
        Ok(AllowanceAction::Approved(hash))
    }
}

pub(crate) fn into_contract_error(e: TopUpError) -> TopUpError {
    match e {
        TopUpError::Contract(_) => e,
        other => TopUpError::Contract(other.to_string()),
    }
}
