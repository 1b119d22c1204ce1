use crate::chains::LEGACY_SOURCE_CHAIN_ID;
use alloy_primitives::{Address, B256, ChainId, U256};
use serde::{Deserialize, Serialize};

fn legacy_source_chain_id() -> ChainId {
    LEGACY_SOURCE_CHAIN_ID
}

/// A deposit whose settlement has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub payment_id: B256,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    #[serde(with = "decimal_u256")]
    pub amount: U256,
    pub token_symbol: String,
    pub token_address: Address,
    pub user_address: Address,
    #[serde(with = "decimal_u256")]
    pub rose_amount: U256,
    #[serde(default = "legacy_source_chain_id")]
    pub source_chain_id: ChainId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub payment_id: B256,
    pub timestamp: u64,
    #[serde(with = "decimal_u256")]
    pub amount: U256,
    pub decimals: u8,
    pub token_symbol: String,
    pub token_address: Address,
    pub user_address: Address,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default = "legacy_source_chain_id")]
    pub source_chain_id: ChainId,
}

/// Integers stored as base-10 strings.
mod decimal_u256 {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amounts_are_decimal_strings() {
        let record = TransactionRecord {
            payment_id: B256::repeat_byte(0xab),
            timestamp: 1_700_000_000_000,
            amount: U256::from(10_200_000u64),
            decimals: 6,
            token_symbol: "USDC".to_string(),
            token_address: Address::repeat_byte(1),
            user_address: Address::repeat_byte(2),
            status: TransactionStatus::Processing,
            tx_hash: None,
            source_chain_id: 8453,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["amount"], json!("10200000"));
        assert_eq!(value["status"], json!("processing"));
        assert_eq!(value["sourceChainId"], json!(8453));
        assert!(value.get("txHash").is_none());
    }

    #[test]
    fn numeric_amount_is_rejected() {
        let value = json!({
            "paymentId": format!("{:?}", B256::ZERO),
            "timestamp": 1,
            "amount": 5,
            "tokenSymbol": "USDC",
            "tokenAddress": format!("{:?}", Address::ZERO),
            "userAddress": format!("{:?}", Address::ZERO),
            "roseAmount": "0",
        });
        assert!(serde_json::from_value::<PendingTransaction>(value).is_err());
    }
}
