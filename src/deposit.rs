use crate::allowance::into_contract_error;
use crate::contracts::decode_payment_initiated;
use crate::error::{TopUpError, TopUpResult};
use crate::wallet::{TxReceipt, WalletClient};
use alloy::sol_types::SolValue;
use alloy_primitives::{Address, B256, ChainId, Log, U256, keccak256};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositOutcome {
    /// `None` when the receipt did not allow deriving the id. The deposit itself landed.
    pub payment_id: Option<B256>,
    pub transaction_hash: B256,
}

/// Payment identifier shared with the settlement contract:
/// `keccak256(abi.encode(chainId, vault, blockNumber, txIndex, logIndex))`.
pub fn derive_payment_id(
    chain_id: ChainId,
    vault: Address,
    block_number: u64,
    transaction_index: u64,
    log_index: u64,
) -> B256 {
    let encoded = (
        U256::from(chain_id),
        vault,
        U256::from(block_number),
        U256::from(transaction_index),
        U256::from(log_index),
    )
        .abi_encode_params();
    keccak256(encoded)
}

/// Position within `logs` of the single `PaymentInitiated` emitted by `vault`.
pub fn find_payment_log_index(vault: Address, logs: &[Log]) -> Option<u64> {
    let mut matches = Vec::new();

    for (index, log) in logs.iter().enumerate() {
        // Address equality is on raw bytes, so checksum casing never matters.
        if log.address != vault || log.data.topics().is_empty() {
            continue;
        }
        match decode_payment_initiated(log) {
            Ok(event) => {
                debug!(
                    "PaymentInitiated at log {}: {} from {:?}",
                    index, event.amount, event.payer
                );
                matches.push(index as u64);
            }
            // Other vault events land here.
            Err(_) => continue,
        }
    }

    match matches.as_slice() {
        [index] => Some(*index),
        [] => None,
        many => {
            warn!(
                "Found {} PaymentInitiated logs in one receipt, cannot pick a payment id",
                many.len()
            );
            None
        }
    }
}

pub fn payment_id_from_receipt(
    chain_id: ChainId,
    vault: Address,
    receipt: &TxReceipt,
) -> Option<B256> {
    let log_index = find_payment_log_index(vault, &receipt.logs)?;
    let Some(transaction_index) = receipt.transaction_index else {
        warn!(
            "Receipt for {:?} has no transaction index",
            receipt.transaction_hash
        );
        return None;
    };
    Some(derive_payment_id(
        chain_id,
        vault,
        receipt.block_number,
        transaction_index,
        log_index,
    ))
}

pub struct DepositSubmitter<W> {
    wallet: Arc<W>,
    vault: Address,
    gas_limit: u64,
}

impl<W: WalletClient> DepositSubmitter<W> {
    pub fn new(wallet: Arc<W>, vault: Address, gas_limit: u64) -> Self {
        Self {
            wallet,
            vault,
            gas_limit,
        }
    }

    /// Sends `deposit(token, amount, recipient)` to the vault and derives the payment id
    /// from the mined receipt. The wallet must already be on `chain_id` with enough
    /// allowance.
    pub async fn submit_deposit(
        &self,
        token: Address,
        amount: U256,
        recipient: Address,
        chain_id: ChainId,
    ) -> TopUpResult<DepositOutcome> {
        let hash = self
            .wallet
            .deposit(self.vault, token, amount, recipient, self.gas_limit, chain_id)
            .await
            .map_err(into_contract_error)?;
        info!("Deposit submitted: {:?}", hash);

        let receipt = self
            .wallet
            .wait_for_receipt(hash, chain_id)
            .await
            .map_err(into_contract_error)?;
        if !receipt.success {
            return Err(TopUpError::Contract(format!(
                "deposit transaction {hash:?} reverted"
            )));
        }

        let payment_id = payment_id_from_receipt(chain_id, self.vault, &receipt);
        match payment_id {
            Some(id) => info!("Deposit mined in block {}, payment id {:?}", receipt.block_number, id),
            None => warn!("Deposit {:?} mined but no payment id could be derived", hash),
        }

        Ok(DepositOutcome {
            payment_id,
            transaction_hash: hash,
        })
    }
}
