#![allow(dead_code)]

use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, ChainId, I256, Log, LogData, U256, address, b256};
use async_trait::async_trait;
use paymaster_topup::chains::{
    BASE_CHAIN_ID, NATIVE_TOKEN_ADDRESS, SAPPHIRE_CHAIN_ID, find_source_chain, find_token,
};
use paymaster_topup::chain_switch::SwitchTiming;
use paymaster_topup::clock::Clock;
use paymaster_topup::contracts::PaymasterVault;
use paymaster_topup::repository::MemoryStore;
use paymaster_topup::saga::{TopUpConfig, TopUpSaga};
use paymaster_topup::settlement::{BalanceWatch, PollStrategy};
use paymaster_topup::wallet::{DepositLimits, TxReceipt, WalletClient};
use paymaster_topup::{TopUpError, TopUpResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER: Address = address!("0x1111111111111111111111111111111111111111");
pub const ROSE_FEED: Address = address!("0x2222222222222222222222222222222222222222");
pub const TOKEN_FEED: Address = address!("0x3333333333333333333333333333333333333333");

pub const APPROVE_HASH: B256 =
    b256!("0xa0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0");
pub const DEPOSIT_HASH: B256 =
    b256!("0xd0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0");
pub const DEPOSIT_BLOCK: u64 = 100;
pub const DEPOSIT_TX_INDEX: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    Approve { amount: U256 },
    Deposit { amount: U256 },
}

#[derive(Debug, Clone)]
pub enum SwitchBehavior {
    Succeed,
    Fail(String),
    /// Never answers; the coordinator's timeout has to fire.
    Hang,
    /// Raises "Unsupported Chain"; `switches` says whether the chain moved anyway.
    UnsupportedChain { switches: bool },
}

/// Scripted in-memory wallet. Every knob is a public field guarded by a mutex so
/// tests can change behaviour between runs.
pub struct MockWallet {
    pub address: Mutex<Option<Address>>,
    pub active_chain: Mutex<ChainId>,
    pub switch_behavior: Mutex<SwitchBehavior>,
    pub switch_calls: Mutex<Vec<ChainId>>,
    pub allowances: Mutex<HashMap<(Address, Address), U256>>,
    pub writes: Mutex<Vec<Write>>,
    pub deposit_error: Mutex<Option<String>>,
    pub vault: Mutex<Address>,
    /// `isPaymentProcessed` answers true from this poll on (1-based). `None` never settles.
    pub processed_from_poll: Mutex<Option<u32>>,
    pub poll_errors: Mutex<u32>,
    pub poll_calls: Mutex<u32>,
    pub native_balance: Mutex<U256>,
    /// Credited once when the payment is first reported processed.
    pub payout: Mutex<U256>,
    pub rose_price: Mutex<I256>,
    pub token_price: Mutex<I256>,
    pub limits: Mutex<DepositLimits>,
}

impl Default for MockWallet {
    fn default() -> Self {
        Self {
            address: Mutex::new(Some(USER)),
            active_chain: Mutex::new(SAPPHIRE_CHAIN_ID),
            switch_behavior: Mutex::new(SwitchBehavior::Succeed),
            switch_calls: Mutex::new(Vec::new()),
            allowances: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            deposit_error: Mutex::new(None),
            vault: Mutex::new(Address::ZERO),
            processed_from_poll: Mutex::new(Some(1)),
            poll_errors: Mutex::new(0),
            poll_calls: Mutex::new(0),
            native_balance: Mutex::new(U256::from(5u64) * ether()),
            payout: Mutex::new(ether()),
            // $0.05 and $1.00 with 8 feed decimals.
            rose_price: Mutex::new(I256::try_from(5_000_000i64).unwrap()),
            token_price: Mutex::new(I256::try_from(100_000_000i64).unwrap()),
            limits: Mutex::new(DepositLimits {
                min_deposit: U256::from(1_000_000u64),
                max_deposit: U256::from(1_000_000_000u64),
                enabled: true,
            }),
        }
    }
}

pub fn ether() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

impl MockWallet {
    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn active(&self) -> ChainId {
        *self.active_chain.lock().unwrap()
    }

    pub fn set_switch(&self, behavior: SwitchBehavior) {
        *self.switch_behavior.lock().unwrap() = behavior;
    }

    fn deposit_receipt(&self) -> TxReceipt {
        let vault = *self.vault.lock().unwrap();
        let token = find_token(BASE_CHAIN_ID, "USDC").unwrap().contract_address;
        let amount = self
            .writes()
            .iter()
            .rev()
            .find_map(|w| match w {
                Write::Deposit { amount } => Some(*amount),
                _ => None,
            })
            .unwrap_or_default();

        // A token Transfer precedes the vault event, so the payment log sits at index 1.
        let transfer = Log {
            address: token,
            data: LogData::new_unchecked(vec![B256::repeat_byte(0xdd)], Default::default()),
        };
        let event = PaymasterVault::PaymentInitiated {
            payer: USER,
            recipient: USER,
            token,
            amount,
            paymentId: B256::repeat_byte(0x99),
        };
        TxReceipt {
            transaction_hash: DEPOSIT_HASH,
            block_number: DEPOSIT_BLOCK,
            transaction_index: Some(DEPOSIT_TX_INDEX),
            logs: vec![
                transfer,
                Log {
                    address: vault,
                    data: event.encode_log_data(),
                },
            ],
            success: true,
        }
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    fn address(&self) -> Option<Address> {
        *self.address.lock().unwrap()
    }

    async fn active_chain(&self) -> TopUpResult<ChainId> {
        Ok(self.active())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> TopUpResult<()> {
        self.switch_calls.lock().unwrap().push(chain_id);
        let behavior = self.switch_behavior.lock().unwrap().clone();
        match behavior {
            SwitchBehavior::Succeed => {
                *self.active_chain.lock().unwrap() = chain_id;
                Ok(())
            }
            SwitchBehavior::Fail(message) => Err(TopUpError::Rpc(message)),
            SwitchBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            SwitchBehavior::UnsupportedChain { switches } => {
                if switches {
                    *self.active_chain.lock().unwrap() = chain_id;
                }
                Err(TopUpError::Rpc("Unsupported Chain".to_string()))
            }
        }
    }

    async fn allowance(
        &self,
        _token: Address,
        owner: Address,
        spender: Address,
        _chain_id: ChainId,
    ) -> TopUpResult<U256> {
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(
        &self,
        _token: Address,
        spender: Address,
        amount: U256,
        _chain_id: ChainId,
    ) -> TopUpResult<B256> {
        self.writes.lock().unwrap().push(Write::Approve { amount });
        let owner = USER;
        self.allowances
            .lock()
            .unwrap()
            .insert((owner, spender), amount);
        Ok(APPROVE_HASH)
    }

    async fn deposit(
        &self,
        vault: Address,
        _token: Address,
        amount: U256,
        _recipient: Address,
        _gas_limit: u64,
        chain_id: ChainId,
    ) -> TopUpResult<B256> {
        if let Some(message) = self.deposit_error.lock().unwrap().clone() {
            return Err(TopUpError::Contract(message));
        }
        assert_eq!(self.active(), chain_id, "deposit sent on the wrong chain");
        *self.vault.lock().unwrap() = vault;
        self.writes.lock().unwrap().push(Write::Deposit { amount });
        Ok(DEPOSIT_HASH)
    }

    async fn wait_for_receipt(&self, tx_hash: B256, _chain_id: ChainId) -> TopUpResult<TxReceipt> {
        if tx_hash == DEPOSIT_HASH {
            return Ok(self.deposit_receipt());
        }
        Ok(TxReceipt {
            transaction_hash: tx_hash,
            block_number: DEPOSIT_BLOCK - 1,
            transaction_index: Some(0),
            logs: Vec::new(),
            success: true,
        })
    }

    async fn is_payment_processed(
        &self,
        _settlement: Address,
        _payment_id: B256,
        _chain_id: ChainId,
    ) -> TopUpResult<bool> {
        {
            let mut errors = self.poll_errors.lock().unwrap();
            if *errors > 0 {
                *errors -= 1;
                return Err(TopUpError::Rpc("connection reset".to_string()));
            }
        }
        let poll = {
            let mut calls = self.poll_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        let processed = self
            .processed_from_poll
            .lock()
            .unwrap()
            .is_some_and(|from| poll >= from);
        if processed {
            let payout = std::mem::take(&mut *self.payout.lock().unwrap());
            *self.native_balance.lock().unwrap() += payout;
        }
        Ok(processed)
    }

    async fn rose_usd_feed(&self, _settlement: Address, _chain_id: ChainId) -> TopUpResult<Address> {
        Ok(ROSE_FEED)
    }

    async fn token_price_feed(
        &self,
        _settlement: Address,
        _token: Address,
        _chain_id: ChainId,
    ) -> TopUpResult<Address> {
        Ok(TOKEN_FEED)
    }

    async fn feed_decimals(&self, _feed: Address, _chain_id: ChainId) -> TopUpResult<u8> {
        Ok(8)
    }

    async fn latest_answer(&self, feed: Address, _chain_id: ChainId) -> TopUpResult<I256> {
        if feed == ROSE_FEED {
            Ok(*self.rose_price.lock().unwrap())
        } else {
            Ok(*self.token_price.lock().unwrap())
        }
    }

    async fn token_balance(
        &self,
        _owner: Address,
        token: Address,
        _chain_id: ChainId,
    ) -> TopUpResult<U256> {
        assert_eq!(token, NATIVE_TOKEN_ADDRESS);
        Ok(*self.native_balance.lock().unwrap())
    }

    async fn deposit_limits(
        &self,
        _vault: Address,
        _token: Address,
        _chain_id: ChainId,
    ) -> TopUpResult<DepositLimits> {
        Ok(*self.limits.lock().unwrap())
    }
}

pub struct TestClock(pub AtomicU64);

impl TestClock {
    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn test_config() -> TopUpConfig {
    let source = find_source_chain(BASE_CHAIN_ID).unwrap();
    let token = find_token(BASE_CHAIN_ID, "USDC").unwrap();
    let mut config = TopUpConfig::new(&source, token);
    config.poll = PollStrategy {
        interval: Duration::from_secs(4),
        max_attempts: 5,
    };
    config.switch_timing = SwitchTiming {
        switch_timeout: Duration::from_secs(3),
        settle_delay: Duration::from_secs(7),
    };
    config.balance_watch = Some(BalanceWatch {
        min_increase: U256::from(1_000_000_000_000_000u64),
        timeout: Duration::from_secs(180),
        interval: Duration::from_secs(4),
    });
    config
}

pub struct Harness {
    pub wallet: Arc<MockWallet>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<TestClock>,
    pub saga: TopUpSaga<MockWallet>,
}

pub fn harness() -> Harness {
    harness_with(MockWallet::default(), test_config())
}

pub fn harness_with(wallet: MockWallet, config: TopUpConfig) -> Harness {
    let wallet = Arc::new(wallet);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(TestClock(AtomicU64::new(1_700_000_000_000)));
    let saga = TopUpSaga::new(wallet.clone(), config, store.clone(), clock.clone());
    Harness {
        wallet,
        store,
        clock,
        saga,
    }
}
