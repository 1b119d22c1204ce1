use super::kv::KeyValueStore;
use super::models::PendingTransaction;
use crate::clock::Clock;
use alloy_primitives::ChainId;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const PENDING_TX_KEY: &str = "oasis-bridge-pending-tx";
pub const PENDING_TX_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// The single pending-deposit slot, shared by every account using this store.
pub struct PendingTransactionStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    supported_chains: Vec<ChainId>,
}

impl PendingTransactionStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        supported_chains: Vec<ChainId>,
    ) -> Self {
        Self {
            store,
            clock,
            supported_chains,
        }
    }

    pub fn save(&self, record: &PendingTransaction) {
        let result = serde_json::to_string(record)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(PENDING_TX_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to save pending transaction: {}", e);
        }
    }

    /// The stored record, or `None` when absent, unreadable or on an unsupported chain.
    /// Invalid records are removed.
    pub fn load(&self) -> Option<PendingTransaction> {
        let stored = match self.store.get(PENDING_TX_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read pending transaction: {}", e);
                return None;
            }
        };

        let record: PendingTransaction = match serde_json::from_str(&stored) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding invalid pending transaction: {}", e);
                self.clear();
                return None;
            }
        };

        if !self.supported_chains.contains(&record.source_chain_id) {
            warn!(
                "Discarding pending transaction on unsupported chain {}",
                record.source_chain_id
            );
            self.clear();
            return None;
        }

        Some(record)
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(PENDING_TX_KEY) {
            warn!("Failed to clear pending transaction: {}", e);
        }
    }

    /// True once more than `max_age` has passed since the record was written.
    pub fn is_expired(&self, record: &PendingTransaction, max_age: Duration) -> bool {
        let age = self.clock.now_ms().saturating_sub(record.timestamp);
        u128::from(age) > max_age.as_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{BASE_CHAIN_ID, LEGACY_SOURCE_CHAIN_ID};
    use crate::repository::kv::MemoryStore;
    use alloy_primitives::{Address, B256, U256};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedClock(AtomicU64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn store_with_clock(now: u64) -> (Arc<MemoryStore>, Arc<FixedClock>, PendingTransactionStore) {
        let kv = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock(AtomicU64::new(now)));
        let store = PendingTransactionStore::new(kv.clone(), clock.clone(), vec![BASE_CHAIN_ID]);
        (kv, clock, store)
    }

    fn record(timestamp: u64) -> PendingTransaction {
        PendingTransaction {
            payment_id: B256::repeat_byte(0x42),
            timestamp,
            amount: U256::from(10_200_000u64),
            token_symbol: "USDC".to_string(),
            token_address: Address::repeat_byte(1),
            user_address: Address::repeat_byte(2),
            rose_amount: U256::ZERO,
            source_chain_id: BASE_CHAIN_ID,
        }
    }

    #[test]
    fn save_load_clear() {
        let (_, _, store) = store_with_clock(0);
        assert!(store.load().is_none());

        store.save(&record(5));
        assert_eq!(store.load(), Some(record(5)));

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn legacy_record_defaults_source_chain() {
        let (kv, _, store) = store_with_clock(0);
        let legacy = json!({
            "paymentId": format!("{:?}", B256::repeat_byte(0x42)),
            "timestamp": 5,
            "amount": "10200000",
            "tokenSymbol": "USDC",
            "tokenAddress": format!("{:?}", Address::repeat_byte(1)),
            "userAddress": format!("{:?}", Address::repeat_byte(2)),
            "roseAmount": "0",
        });
        kv.set(PENDING_TX_KEY, &legacy.to_string()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source_chain_id, LEGACY_SOURCE_CHAIN_ID);
        assert_eq!(loaded, record(5));
    }

    #[test]
    fn corrupt_record_is_discarded() {
        let (kv, _, store) = store_with_clock(0);
        kv.set(PENDING_TX_KEY, r#"{"paymentId": 7}"#).unwrap();
        assert!(store.load().is_none());
        assert_eq!(kv.get(PENDING_TX_KEY).unwrap(), None);

        kv.set(PENDING_TX_KEY, "not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn unsupported_chain_is_discarded() {
        let (kv, _, store) = store_with_clock(0);
        let mut other = record(5);
        other.source_chain_id = 1;
        store.save(&other);
        assert!(store.load().is_none());
        assert_eq!(kv.get(PENDING_TX_KEY).unwrap(), None);
    }

    #[test]
    fn expiry_boundary() {
        let max_age = Duration::from_millis(600_000);
        let (_, clock, store) = store_with_clock(0);
        let saved = record(1_000_000);

        clock.0.store(1_000_000 + 600_000 - 1, Ordering::SeqCst);
        assert!(!store.is_expired(&saved, max_age));

        clock.0.store(1_000_000 + 600_000, Ordering::SeqCst);
        assert!(!store.is_expired(&saved, max_age));

        clock.0.store(1_000_000 + 600_000 + 1, Ordering::SeqCst);
        assert!(store.is_expired(&saved, max_age));
    }
}
