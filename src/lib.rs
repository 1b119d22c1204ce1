pub mod allowance;
pub mod cancel;
pub mod chain_switch;
pub mod chains;
pub mod cli;
pub mod clock;
pub mod config;
pub mod contracts;
pub mod deposit;
pub mod error;
pub mod quote;
pub mod repository;
pub mod rpc;
pub mod saga;
pub mod settlement;
pub mod wallet;

pub use error::{QuoteError, TopUpError, TopUpResult};
pub use saga::{TopUpConfig, TopUpOutcome, TopUpSaga};
pub use wallet::WalletClient;
