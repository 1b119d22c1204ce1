//! The top-up saga: switch to the source chain, approve, deposit, wait for the
//! destination payout, switch back. Steps run strictly in order and a run can
//! resume from settlement polling after a restart through the pending-transaction
//! slot. Caller-supplied [`AdditionalStep`]s run after the switch back.
mod additional;
mod state;

pub use additional::AdditionalStep;
pub use state::{SagaEvent, SagaState, Step, StepStatus};

use crate::allowance::AllowanceManager;
use crate::cancel::CancelToken;
use crate::chain_switch::{ChainSwitchCoordinator, ChainSwitchOutcome, SwitchTiming};
use crate::chains::{
    DEFAULT_SLIPPAGE_PERCENT, DEPOSIT_GAS_LIMIT, DESTINATION_NATIVE_DECIMALS,
    EXPECTED_SETTLEMENT_TIME, NATIVE_TOKEN_ADDRESS, SAPPHIRE_CHAIN_ID,
    SAPPHIRE_SETTLEMENT_ADDRESS, SourceChain, TokenConfig, supported_source_chain_ids,
};
use crate::clock::Clock;
use crate::deposit::DepositSubmitter;
use crate::error::{MAX_ERROR_MESSAGE_LEN, TopUpError, TopUpResult, truncate_message};
use crate::quote::{FeedSet, PriceQuoteEngine, Quote};
use crate::repository::{
    KeyValueStore, PENDING_TX_MAX_AGE, PendingTransaction, PendingTransactionStore,
    TransactionHistoryStore, TransactionRecord, TransactionStatus,
};
use crate::settlement::{
    BalanceWatch, PollStrategy, Settlement, SettlementPoller, wait_for_balance_increase,
};
use crate::wallet::{DepositLimits, WalletClient};
use alloy_primitives::{Address, B256, ChainId, U256};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct TopUpConfig {
    pub source_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub vault_address: Address,
    pub settlement_address: Address,
    /// Stablecoin deposited on the source chain.
    pub token: TokenConfig,
    pub destination_decimals: u8,
    pub slippage_percent: u64,
    pub deposit_gas_limit: u64,
    pub poll: PollStrategy,
    pub switch_timing: SwitchTiming,
    /// When set, a confirmed settlement must also show up on the destination balance.
    pub balance_watch: Option<BalanceWatch>,
    pub pending_max_age: Duration,
    /// Chains whose persisted records are still honoured.
    pub supported_chains: Vec<ChainId>,
}

impl TopUpConfig {
    pub fn new(source: &SourceChain, token: TokenConfig) -> Self {
        Self {
            source_chain_id: source.chain_id,
            destination_chain_id: SAPPHIRE_CHAIN_ID,
            vault_address: source.vault_address,
            settlement_address: SAPPHIRE_SETTLEMENT_ADDRESS,
            token,
            destination_decimals: DESTINATION_NATIVE_DECIMALS,
            slippage_percent: DEFAULT_SLIPPAGE_PERCENT,
            deposit_gas_limit: DEPOSIT_GAS_LIMIT,
            poll: PollStrategy::default(),
            switch_timing: SwitchTiming::default(),
            balance_watch: Some(BalanceWatch::default()),
            pending_max_age: PENDING_TX_MAX_AGE,
            supported_chains: supported_source_chain_ids(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopUpOutcome {
    pub payment_id: B256,
    /// Deposit transaction; unknown when resuming from the pending slot.
    pub transaction_hash: Option<B256>,
    pub settlement: Settlement,
}

/// What a run has committed so far, for failure reporting.
#[derive(Debug, Default)]
struct RunProgress {
    payment_id: Option<B256>,
    settled: bool,
}

pub struct TopUpSaga<W: WalletClient> {
    wallet: Arc<W>,
    config: TopUpConfig,
    quotes: PriceQuoteEngine<W>,
    switcher: ChainSwitchCoordinator<W>,
    allowances: AllowanceManager<W>,
    deposits: DepositSubmitter<W>,
    poller: SettlementPoller<W>,
    pending: PendingTransactionStore,
    history: TransactionHistoryStore,
    clock: Arc<dyn Clock>,
    state: Mutex<SagaState>,
    run_lock: tokio::sync::Mutex<()>,
    cancel: Mutex<CancelToken>,
    additional_steps: Vec<Box<dyn AdditionalStep>>,
}

impl<W: WalletClient> TopUpSaga<W> {
    pub fn new(
        wallet: Arc<W>,
        config: TopUpConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quotes = PriceQuoteEngine::new(
            wallet.clone(),
            config.settlement_address,
            config.destination_chain_id,
            config.token.clone(),
            config.destination_decimals,
            config.slippage_percent,
        );
        let switcher = ChainSwitchCoordinator::new(wallet.clone(), config.switch_timing);
        let allowances = AllowanceManager::new(wallet.clone());
        let deposits =
            DepositSubmitter::new(wallet.clone(), config.vault_address, config.deposit_gas_limit);
        let poller =
            SettlementPoller::new(wallet.clone(), config.settlement_address, config.poll);
        let pending = PendingTransactionStore::new(
            store.clone(),
            clock.clone(),
            config.supported_chains.clone(),
        );
        let history = TransactionHistoryStore::new(store, config.supported_chains.clone());

        Self {
            wallet,
            config,
            quotes,
            switcher,
            allowances,
            deposits,
            poller,
            pending,
            history,
            clock,
            state: Mutex::new(SagaState::default()),
            run_lock: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancelToken::new()),
            additional_steps: Vec::new(),
        }
    }

    /// Registers steps to run, in order, once the wallet is back on the destination
    /// chain. They are numbered from 6.
    pub fn with_additional_steps(mut self, steps: Vec<Box<dyn AdditionalStep>>) -> Self {
        self.additional_steps = steps;
        self
    }

    pub fn config(&self) -> &TopUpConfig {
        &self.config
    }

    pub fn state(&self) -> SagaState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn history(&self) -> &TransactionHistoryStore {
        &self.history
    }

    fn apply(&self, event: SagaEvent) {
        if let Ok(mut state) = self.state.lock() {
            state.transition(event);
        }
    }

    /// Applies `event` only while `run` is the live run. A run dropped by
    /// [`TopUpSaga::reset`] no longer touches the state.
    fn apply_for(&self, run: &CancelToken, event: SagaEvent) {
        let Ok(current) = self.cancel.lock() else {
            return;
        };
        if current.same_run(run) {
            self.apply(event);
        }
    }

    pub fn is_quote_ready(&self) -> bool {
        self.quotes.is_ready()
    }

    pub async fn load_price_feeds(&self) -> TopUpResult<FeedSet> {
        self.quotes.load_feeds().await
    }

    /// Source-token amount to deposit for `amount` destination base units. `None`
    /// while the price feeds are not loaded.
    pub async fn get_quote(&self, amount: U256) -> TopUpResult<Option<Quote>> {
        self.quotes.quote(amount).await
    }

    /// Destination amount expected for depositing `amount` source base units.
    pub async fn get_estimate(&self, amount: U256) -> TopUpResult<Option<U256>> {
        self.quotes.estimate(amount).await
    }

    /// Minimum and maximum deposit the vault accepts for the configured token.
    pub async fn deposit_limits(&self) -> TopUpResult<DepositLimits> {
        self.wallet
            .deposit_limits(
                self.config.vault_address,
                self.config.token.contract_address,
                self.config.source_chain_id,
            )
            .await
    }

    /// Stops the live run at its next step boundary or sleep.
    pub fn cancel(&self) {
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }

    /// Cancels any live run and clears step statuses and the error. The cancelled
    /// run stops reporting, so the cleared state stays clear.
    pub fn reset(&self) {
        if let Ok(mut current) = self.cancel.lock() {
            current.cancel();
            *current = CancelToken::new();
            self.apply(SagaEvent::Reset);
        }
    }

    fn begin_run(&self) -> CancelToken {
        let token = CancelToken::new();
        let labels = self
            .additional_steps
            .iter()
            .map(|s| s.label().to_string())
            .collect();
        if let Ok(mut current) = self.cancel.lock() {
            *current = token.clone();
            self.apply(SagaEvent::Started(labels));
        }
        token
    }

    async fn step<T>(
        &self,
        run: &CancelToken,
        step: Step,
        work: impl Future<Output = TopUpResult<T>>,
    ) -> TopUpResult<T> {
        self.apply_for(run, SagaEvent::StepStarted(step));
        info!("Step {}", step);
        let value = work.await?;
        self.apply_for(run, SagaEvent::StepCompleted(step));
        Ok(value)
    }

    /// Deposits `amount` source-token base units and follows the payment through to
    /// the destination chain.
    pub async fn start_topup(&self, amount: U256) -> TopUpResult<TopUpOutcome> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| TopUpError::AlreadyInProgress)?;
        let owner = self.wallet.address().ok_or(TopUpError::WalletNotConnected)?;
        let cancel = self.begin_run();
        info!(
            "Starting top-up of {} {} base units for {:?}",
            amount, self.config.token.symbol, owner
        );

        let mut progress = RunProgress::default();
        let result = self.run_topup(owner, amount, &cancel, &mut progress).await;
        self.finish(&cancel, &result, &progress);

        // Leave the wallet on the destination chain whatever happened.
        self.switch_back(owner).await;
        result
    }

    async fn run_topup(
        &self,
        owner: Address,
        amount: U256,
        cancel: &CancelToken,
        progress: &mut RunProgress,
    ) -> TopUpResult<TopUpOutcome> {
        let source = self.config.source_chain_id;
        let token = self.config.token.contract_address;

        let baseline = self
            .step(cancel, Step::SwitchToSource, async {
                let baseline = self.snapshot_destination_balance(owner).await?;
                self.require_chain(source, owner).await?;
                Ok::<_, TopUpError>(baseline)
            })
            .await?;
        cancel.check()?;

        self.step(
            cancel,
            Step::Approve,
            self.allowances.ensure_allowance(
                token,
                self.config.vault_address,
                amount,
                owner,
                None,
                source,
            ),
        )
        .await?;
        cancel.check()?;

        let (payment_id, transaction_hash) = self
            .step(cancel, Step::Deposit, async {
                let deposit = self
                    .deposits
                    .submit_deposit(token, amount, owner, source)
                    .await?;
                let payment_id = deposit.payment_id.ok_or(TopUpError::PaymentIdUnavailable {
                    tx_hash: deposit.transaction_hash,
                })?;
                self.record_deposit(owner, amount, payment_id, deposit.transaction_hash);
                Ok::<_, TopUpError>((payment_id, deposit.transaction_hash))
            })
            .await?;
        progress.payment_id = Some(payment_id);

        let settlement = self
            .step(
                cancel,
                Step::ConfirmSettlement,
                self.confirm_settlement(owner, payment_id, baseline, cancel),
            )
            .await?;
        progress.settled = settlement == Settlement::Confirmed;
        cancel.check()?;

        self.step(
            cancel,
            Step::SwitchToDestination,
            self.require_chain(self.config.destination_chain_id, owner),
        )
        .await?;
        self.run_additional_steps(payment_id, settlement, cancel).await?;

        Ok(TopUpOutcome {
            payment_id,
            transaction_hash: Some(transaction_hash),
            settlement,
        })
    }

    /// The pending deposit the connected account can resume. Records of another
    /// account or past their age are cleared; records for another token are kept but
    /// not offered.
    pub fn pending_transaction(&self) -> Option<PendingTransaction> {
        let owner = self.wallet.address()?;
        let pending = self.pending.load()?;

        if pending.user_address != owner
            || self.pending.is_expired(&pending, self.config.pending_max_age)
        {
            info!("Clearing stale pending transaction {:?}", pending.payment_id);
            self.pending.clear();
            return None;
        }
        if pending.token_address != self.config.token.contract_address {
            return None;
        }
        Some(pending)
    }

    pub fn dismiss_pending(&self) {
        self.pending.clear();
    }

    /// Picks a pending deposit back up at settlement polling.
    pub async fn resume_from_pending(&self) -> TopUpResult<TopUpOutcome> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| TopUpError::AlreadyInProgress)?;
        let owner = self.wallet.address().ok_or(TopUpError::WalletNotConnected)?;
        let pending = self
            .pending_transaction()
            .ok_or(TopUpError::NoPendingTransaction)?;
        let cancel = self.begin_run();
        info!("Resuming pending payment {:?}", pending.payment_id);

        let mut progress = RunProgress {
            payment_id: Some(pending.payment_id),
            settled: false,
        };
        let result = self
            .run_resume(owner, pending.payment_id, &cancel, &mut progress)
            .await;
        self.finish(&cancel, &result, &progress);
        result
    }

    async fn run_resume(
        &self,
        owner: Address,
        payment_id: B256,
        cancel: &CancelToken,
        progress: &mut RunProgress,
    ) -> TopUpResult<TopUpOutcome> {
        let baseline = self.snapshot_destination_balance(owner).await?;
        self.history
            .update_transaction_status(payment_id, TransactionStatus::Processing);

        let settlement = self
            .step(
                cancel,
                Step::ConfirmSettlement,
                self.confirm_settlement(owner, payment_id, baseline, cancel),
            )
            .await?;
        progress.settled = settlement == Settlement::Confirmed;
        cancel.check()?;

        self.step(
            cancel,
            Step::SwitchToDestination,
            self.require_chain(self.config.destination_chain_id, owner),
        )
        .await?;
        self.run_additional_steps(payment_id, settlement, cancel).await?;

        Ok(TopUpOutcome {
            payment_id,
            transaction_hash: None,
            settlement,
        })
    }

    /// Runs the caller-supplied steps once the payout is confirmed, then drops the
    /// pending record. An unconfirmed payment keeps its record so a resume runs them.
    async fn run_additional_steps(
        &self,
        payment_id: B256,
        settlement: Settlement,
        cancel: &CancelToken,
    ) -> TopUpResult<()> {
        if settlement != Settlement::Confirmed {
            if !self.additional_steps.is_empty() {
                info!(
                    "Deferring {} additional steps until payment {:?} settles",
                    self.additional_steps.len(),
                    payment_id
                );
            }
            return Ok(());
        }

        for (index, extra) in self.additional_steps.iter().enumerate() {
            cancel.check()?;
            self.step(cancel, Step::additional(index), async {
                match extra.run(cancel).await {
                    Ok(()) => Ok(()),
                    Err(TopUpError::Cancelled) => Err(TopUpError::Cancelled),
                    Err(e) => Err(TopUpError::AdditionalStep {
                        label: extra.label().to_string(),
                        message: e.to_string(),
                    }),
                }
            })
            .await?;
        }
        self.pending.clear();
        Ok(())
    }

    fn finish(
        &self,
        run: &CancelToken,
        result: &TopUpResult<TopUpOutcome>,
        progress: &RunProgress,
    ) {
        let e = match result {
            Ok(outcome) => {
                info!(
                    "Top-up finished for payment {:?} ({:?})",
                    outcome.payment_id, outcome.settlement
                );
                self.apply_for(run, SagaEvent::Finished);
                return;
            }
            Err(e) => e,
        };

        let mut message = e.display_message();
        if let (Some(payment_id), false) = (progress.payment_id, progress.settled) {
            self.history
                .update_transaction_status(payment_id, TransactionStatus::Failed);
            message = format!(
                "{}. Your deposit (ID: {:?}) was submitted - funds may still arrive.",
                truncate_message(&message, MAX_ERROR_MESSAGE_LEN),
                payment_id
            );
        }
        error!("Top-up failed: {}", message);
        self.apply_for(run, SagaEvent::Failed(message));
    }

    async fn snapshot_destination_balance(&self, owner: Address) -> TopUpResult<Option<U256>> {
        if self.config.balance_watch.is_none() {
            return Ok(None);
        }
        let balance = self
            .wallet
            .token_balance(owner, NATIVE_TOKEN_ADDRESS, self.config.destination_chain_id)
            .await?;
        Ok(Some(balance))
    }

    fn record_deposit(&self, owner: Address, amount: U256, payment_id: B256, tx_hash: B256) {
        let token = &self.config.token;
        let now = self.clock.now_ms();

        self.history.save_transaction(TransactionRecord {
            payment_id,
            timestamp: now,
            amount,
            decimals: token.decimals,
            token_symbol: token.symbol.clone(),
            token_address: token.contract_address,
            user_address: owner,
            status: TransactionStatus::Processing,
            tx_hash: Some(tx_hash),
            source_chain_id: self.config.source_chain_id,
        });
        // The payout amount is only known once the relayer has processed the payment.
        self.pending.save(&PendingTransaction {
            payment_id,
            timestamp: now,
            amount,
            token_symbol: token.symbol.clone(),
            token_address: token.contract_address,
            user_address: owner,
            rose_amount: U256::ZERO,
            source_chain_id: self.config.source_chain_id,
        });
    }

    async fn confirm_settlement(
        &self,
        owner: Address,
        payment_id: B256,
        baseline: Option<U256>,
        cancel: &CancelToken,
    ) -> TopUpResult<Settlement> {
        let destination = self.config.destination_chain_id;
        info!(
            "Waiting for payment {:?} to settle, usually about {}s",
            payment_id,
            EXPECTED_SETTLEMENT_TIME.as_secs()
        );
        let settlement = self
            .poller
            .poll_until_settled(payment_id, destination, cancel)
            .await?;

        match settlement {
            Settlement::Confirmed => {
                if let (Some(watch), Some(baseline)) = (&self.config.balance_watch, baseline) {
                    wait_for_balance_increase(
                        self.wallet.as_ref(),
                        owner,
                        NATIVE_TOKEN_ADDRESS,
                        destination,
                        baseline,
                        watch,
                        cancel,
                    )
                    .await?;
                }
                self.history
                    .update_transaction_status(payment_id, TransactionStatus::Completed);
            }
            Settlement::Unconfirmed => warn!(
                "Payment {:?} still unconfirmed, keeping it pending for a later resume",
                payment_id
            ),
        }
        Ok(settlement)
    }

    /// Switches to `target`; an ambiguous "Unsupported Chain" result is accepted only
    /// if the wallet then reports the target chain.
    async fn require_chain(&self, target: ChainId, owner: Address) -> TopUpResult<()> {
        match self.switcher.ensure_chain(target, Some(owner)).await? {
            ChainSwitchOutcome::AlreadyActive | ChainSwitchOutcome::Switched => Ok(()),
            ChainSwitchOutcome::PossiblySwitched => match self.wallet.active_chain().await {
                Ok(active) if active == target => {
                    info!("Wallet is on chain {} despite the switch error", target);
                    Ok(())
                }
                _ => Err(TopUpError::ChainSwitch {
                    chain_id: target,
                    message: format!(
                        "Wallet reported an unsupported chain while switching to {target}; it may still have switched."
                    ),
                    possibly_switched: true,
                }),
            },
            ChainSwitchOutcome::Failed(message) => Err(TopUpError::ChainSwitch {
                chain_id: target,
                message,
                possibly_switched: false,
            }),
        }
    }

    async fn switch_back(&self, owner: Address) {
        match self
            .switcher
            .ensure_chain(self.config.destination_chain_id, Some(owner))
            .await
        {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => warn!(
                "Failed to switch back to destination chain: {}",
                outcome.error().unwrap_or("wallet reported an unsupported chain")
            ),
            Err(e) => warn!("Failed to switch back to destination chain: {}", e),
        }
    }
}
