pub mod database;
pub mod history_store;
pub mod kv;
pub mod models;
pub mod pending_store;

pub use database::Database;
pub use history_store::{TX_HISTORY_KEY, TransactionHistoryStore};
pub use kv::{KeyValueStore, MemoryStore};
pub use models::{PendingTransaction, TransactionRecord, TransactionStatus};
pub use pending_store::{PENDING_TX_KEY, PENDING_TX_MAX_AGE, PendingTransactionStore};
