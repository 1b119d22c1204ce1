use crate::chains::NATIVE_TOKEN_ADDRESS;
use crate::contracts::{AggregatorV3, CrossChainPaymaster, IERC20, PaymasterVault};
use crate::error::{TopUpError, TopUpResult};
use crate::wallet::{DepositLimits, TxReceipt, WalletClient};
use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, B256, ChainId, I256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// Read access to one chain over a rotating set of endpoints.
#[derive(Clone)]
pub struct RpcClient {
    chain_id: ChainId,
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(chain_id: ChainId, rpc_urls: &[String], wallet: EthereumWallet) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one RPC URL must be provided for chain {}",
                chain_id
            ));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider = ProviderBuilder::new()
                .wallet(wallet.clone())
                .connect_http(parsed_url)
                .erased();
            providers.push(provider);
        }

        Ok(RpcClient {
            chain_id,
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn get_provider(&self) -> &DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{} on chain {}", next, self.chain_id);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, op: &str, error_str: &str) {
        warn!(
            "RPC error during {} on {}: {}, rotating provider",
            op,
            self.get_current_url(),
            error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self, op: &str) -> String {
        warn!(
            "{} timed out after {} seconds on {}, rotating provider",
            op,
            REQUEST_TIMEOUT.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        format!(
            "{} timed out after {} seconds",
            op,
            REQUEST_TIMEOUT.as_secs()
        )
    }

    /// Runs a read with retries, a per-attempt timeout and endpoint rotation.
    pub async fn read<T, E, F, Fut>(&self, op: &'static str, call: F) -> TopUpResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        Retry::spawn(self.get_retry_strategy(), || {
            let attempt = call(self.get_provider().clone());
            async move {
                match timeout(REQUEST_TIMEOUT, attempt).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        self.handle_error(op, &error_str);
                        Err(error_str)
                    }
                    Err(_) => Err(self.handle_timeout(op)),
                }
            }
        })
        .await
        .map_err(TopUpError::Rpc)
    }

    /// Provider for a write. Writes are sent once; a failed send is not replayed.
    fn writer(&self) -> DynProvider {
        self.get_provider().clone()
    }
}

/// [`WalletClient`] backed by a local signer and one [`RpcClient`] per chain.
pub struct RpcWallet {
    address: Address,
    clients: HashMap<ChainId, RpcClient>,
    active_chain: AtomicU64,
}

impl RpcWallet {
    /// `endpoints` maps each chain to its RPC URLs. The wallet starts on `initial_chain`.
    pub fn new(
        signer: PrivateKeySigner,
        endpoints: &[(ChainId, Vec<String>)],
        initial_chain: ChainId,
    ) -> Result<Self> {
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let mut clients = HashMap::new();
        for (chain_id, urls) in endpoints {
            clients.insert(*chain_id, RpcClient::new(*chain_id, urls, wallet.clone())?);
        }
        if !clients.contains_key(&initial_chain) {
            return Err(anyhow::anyhow!(
                "No RPC endpoint configured for initial chain {}",
                initial_chain
            ));
        }

        info!("Wallet {:?} ready on {} chains", address, clients.len());
        Ok(Self {
            address,
            clients,
            active_chain: AtomicU64::new(initial_chain),
        })
    }

    fn client(&self, chain_id: ChainId) -> TopUpResult<&RpcClient> {
        self.clients
            .get(&chain_id)
            .ok_or_else(|| TopUpError::Rpc(format!("no RPC endpoint configured for chain {chain_id}")))
    }

    /// Writes are only sent on the chain the wallet is on.
    fn write_client(&self, chain_id: ChainId) -> TopUpResult<&RpcClient> {
        let active = self.active_chain.load(Ordering::SeqCst);
        if active != chain_id {
            return Err(TopUpError::Contract(format!(
                "wallet is on chain {active}, expected chain {chain_id}"
            )));
        }
        self.client(chain_id)
    }
}

#[async_trait]
impl WalletClient for RpcWallet {
    fn address(&self) -> Option<Address> {
        Some(self.address)
    }

    async fn active_chain(&self) -> TopUpResult<ChainId> {
        Ok(self.active_chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> TopUpResult<()> {
        let client = self.client(chain_id)?;
        let reported = client
            .read("eth_chainId", |p| async move { p.get_chain_id().await })
            .await?;
        if reported != chain_id {
            return Err(TopUpError::Rpc(format!(
                "endpoint {} serves chain {reported}, expected {chain_id}",
                client.get_current_url()
            )));
        }
        self.active_chain.store(chain_id, Ordering::SeqCst);
        debug!("Switched wallet to chain {}", chain_id);
        Ok(())
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        chain_id: ChainId,
    ) -> TopUpResult<U256> {
        self.client(chain_id)?
            .read("allowance", |p| async move {
                IERC20::new(token, p).allowance(owner, spender).call().await
            })
            .await
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        chain_id: ChainId,
    ) -> TopUpResult<B256> {
        let provider = self.write_client(chain_id)?.writer();
        let pending = IERC20::new(token, provider)
            .approve(spender, amount)
            .send()
            .await
            .map_err(|e| TopUpError::Contract(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn deposit(
        &self,
        vault: Address,
        token: Address,
        amount: U256,
        recipient: Address,
        gas_limit: u64,
        chain_id: ChainId,
    ) -> TopUpResult<B256> {
        let provider = self.write_client(chain_id)?.writer();
        let value = if token == NATIVE_TOKEN_ADDRESS {
            amount
        } else {
            U256::ZERO
        };
        let pending = PaymasterVault::new(vault, provider)
            .deposit(token, amount, recipient)
            .gas(gas_limit)
            .value(value)
            .send()
            .await
            .map_err(|e| TopUpError::Contract(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: B256, chain_id: ChainId) -> TopUpResult<TxReceipt> {
        let provider = self.client(chain_id)?.writer();
        let receipt = PendingTransactionBuilder::new(provider.root().clone(), tx_hash)
            .with_timeout(Some(RECEIPT_TIMEOUT))
            .get_receipt()
            .await
            .map_err(|e| TopUpError::Rpc(e.to_string()))?;

        Ok(TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            transaction_index: receipt.transaction_index,
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
            success: receipt.status(),
        })
    }

    async fn is_payment_processed(
        &self,
        settlement: Address,
        payment_id: B256,
        chain_id: ChainId,
    ) -> TopUpResult<bool> {
        self.client(chain_id)?
            .read("isPaymentProcessed", |p| async move {
                CrossChainPaymaster::new(settlement, p)
                    .isPaymentProcessed(payment_id)
                    .call()
                    .await
            })
            .await
    }

    async fn rose_usd_feed(&self, settlement: Address, chain_id: ChainId) -> TopUpResult<Address> {
        self.client(chain_id)?
            .read("roseUsdFeed", |p| async move {
                CrossChainPaymaster::new(settlement, p).roseUsdFeed().call().await
            })
            .await
    }

    async fn token_price_feed(
        &self,
        settlement: Address,
        token: Address,
        chain_id: ChainId,
    ) -> TopUpResult<Address> {
        self.client(chain_id)?
            .read("priceFeeds", |p| async move {
                CrossChainPaymaster::new(settlement, p)
                    .priceFeeds(token)
                    .call()
                    .await
            })
            .await
    }

    async fn feed_decimals(&self, feed: Address, chain_id: ChainId) -> TopUpResult<u8> {
        self.client(chain_id)?
            .read("decimals", |p| async move {
                AggregatorV3::new(feed, p).decimals().call().await
            })
            .await
    }

    async fn latest_answer(&self, feed: Address, chain_id: ChainId) -> TopUpResult<I256> {
        let round = self
            .client(chain_id)?
            .read("latestRoundData", |p| async move {
                AggregatorV3::new(feed, p).latestRoundData().call().await
            })
            .await?;
        Ok(round.answer)
    }

    async fn token_balance(
        &self,
        owner: Address,
        token: Address,
        chain_id: ChainId,
    ) -> TopUpResult<U256> {
        let client = self.client(chain_id)?;
        if token == NATIVE_TOKEN_ADDRESS {
            return client
                .read("eth_getBalance", |p| async move { p.get_balance(owner).await })
                .await;
        }
        client
            .read("balanceOf", |p| async move {
                IERC20::new(token, p).balanceOf(owner).call().await
            })
            .await
    }

    async fn deposit_limits(
        &self,
        vault: Address,
        token: Address,
        chain_id: ChainId,
    ) -> TopUpResult<DepositLimits> {
        let config = self
            .client(chain_id)?
            .read("getTokenConfig", |p| async move {
                PaymasterVault::new(vault, p).getTokenConfig(token).call().await
            })
            .await?;
        Ok(DepositLimits {
            min_deposit: config.minAmount,
            max_deposit: config.maxAmount,
            enabled: config.enabled,
        })
    }
}
