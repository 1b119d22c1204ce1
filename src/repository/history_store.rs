use super::kv::KeyValueStore;
use super::models::{TransactionRecord, TransactionStatus};
use alloy_primitives::{Address, B256, ChainId};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub const TX_HISTORY_KEY: &str = "oasis-bridge-tx-history";

/// Per-user deposit history, stored as one JSON list for all users.
pub struct TransactionHistoryStore {
    store: Arc<dyn KeyValueStore>,
    supported_chains: Vec<ChainId>,
}

impl TransactionHistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, supported_chains: Vec<ChainId>) -> Self {
        Self {
            store,
            supported_chains,
        }
    }

    /// The stored list as raw JSON entries, including ones this version cannot parse.
    fn read_raw(&self) -> Vec<Value> {
        let stored = match self.store.get(TX_HISTORY_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read transaction history: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&stored) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Discarding unreadable transaction history: {}", e);
                Vec::new()
            }
        }
    }

    fn write_raw(&self, entries: &[Value]) {
        let result = serde_json::to_string(entries)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(TX_HISTORY_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to write transaction history: {}", e);
        }
    }

    /// Records of `user` on supported chains, newest first. Entries that fail to
    /// parse are skipped but stay stored.
    pub fn get_transactions(&self, user: Address) -> Vec<TransactionRecord> {
        let mut records: Vec<TransactionRecord> = self
            .read_raw()
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping invalid history record: {}", e);
                    None
                }
            })
            .filter(|r: &TransactionRecord| r.user_address == user)
            .filter(|r| self.supported_chains.contains(&r.source_chain_id))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }

    /// Inserts `record`, replacing any entry with the same payment id.
    pub fn save_transaction(&self, record: TransactionRecord) {
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode history record: {}", e);
                return;
            }
        };
        let mut entries = self.read_raw();
        entries.retain(|entry| entry_payment_id(entry) != Some(record.payment_id));
        entries.push(value);
        self.write_raw(&entries);
    }

    /// Returns false when no entry has `payment_id`.
    pub fn update_transaction_status(&self, payment_id: B256, status: TransactionStatus) -> bool {
        let mut entries = self.read_raw();
        let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry_payment_id(entry) == Some(payment_id))
        else {
            return false;
        };
        let Ok(status) = serde_json::to_value(status) else {
            return false;
        };
        entry["status"] = status;
        self.write_raw(&entries);
        true
    }

    /// Removes `user`'s entries and leaves everyone else's.
    pub fn clear_history(&self, user: Address) {
        let mut entries = self.read_raw();
        let before = entries.len();
        entries.retain(|entry| entry_user(entry) != Some(user));
        if entries.len() != before {
            self.write_raw(&entries);
        }
    }
}

fn entry_field<T: FromStr>(entry: &Value, field: &str) -> Option<T> {
    entry.get(field)?.as_str()?.parse().ok()
}

fn entry_payment_id(entry: &Value) -> Option<B256> {
    entry_field(entry, "paymentId")
}

fn entry_user(entry: &Value) -> Option<Address> {
    entry_field(entry, "userAddress")
}
