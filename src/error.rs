//! Top-up error types.
use alloy_primitives::{B256, ChainId};
use thiserror::Error;

/// Messages longer than this are cut before being attached to a step.
pub const MAX_ERROR_MESSAGE_LEN: usize = 280;

/// Errors raised while computing a quote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// An oracle answered with a zero or negative price.
    #[error("invalid {asset} price")]
    InvalidPrice { asset: &'static str },
    /// The conversion denominator evaluated to zero.
    #[error("division by zero")]
    DivisionByZero,
    /// An intermediate product does not fit in 256 bits.
    #[error("quote arithmetic overflow")]
    Overflow,
}

pub type TopUpResult<T> = Result<T, TopUpError>;

/// The error type surfaced by the top-up saga and its components.
#[derive(Debug, Error)]
pub enum TopUpError {
    #[error("wallet not connected")]
    WalletNotConnected,
    /// A saga run is already live on this orchestrator.
    #[error("operation already in progress")]
    AlreadyInProgress,
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Quote(#[from] QuoteError),
    /// The wallet could not be moved to `chain_id`. When `possibly_switched` is set the
    /// provider reported a failure that usually accompanies a successful switch.
    #[error("{message}")]
    ChainSwitch {
        chain_id: ChainId,
        message: String,
        possibly_switched: bool,
    },
    /// A contract write reverted or was rejected.
    #[error("contract error: {0}")]
    Contract(String),
    /// The deposit landed but no payment id could be derived from its receipt.
    #[error(
        "deposit succeeded but no payment id could be derived, contact support with tx {tx_hash}"
    )]
    PaymentIdUnavailable { tx_hash: B256 },
    #[error("payment likely processed, but the destination balance did not increase in time")]
    BalanceNotIncreased,
    /// A caller-supplied step after the switch back failed.
    #[error("Step \"{label}\" failed: {message}")]
    AdditionalStep { label: String, message: String },
    #[error("no pending transaction to resume")]
    NoPendingTransaction,
    /// A read against a chain failed after retries.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl TopUpError {
    /// The message attached to a failed step, cut to a displayable length.
    pub fn display_message(&self) -> String {
        truncate_message(&self.to_string(), MAX_ERROR_MESSAGE_LEN)
    }
}

pub fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(max_len.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(1000);
        let cut = truncate_message(&long, 20);
        assert_eq!(cut.chars().count(), 20);
        assert!(cut.ends_with("..."));

        assert_eq!(truncate_message("short", 20), "short");
    }

    #[test]
    fn display_message_respects_limit() {
        let err = TopUpError::Contract("revert: ".repeat(200));
        assert_eq!(err.display_message().chars().count(), MAX_ERROR_MESSAGE_LEN);
    }
}
