//! Price conversion between the destination native token and a source stablecoin.
//!
//! Both assets are priced in USD by independent oracle feeds. All arithmetic is
//! integer-only; conversions that decide how much the payer sends round up so the
//! destination amount is never under-funded.
use crate::chains::TokenConfig;
use crate::error::{QuoteError, TopUpResult};
use crate::wallet::WalletClient;
use alloy_primitives::{Address, ChainId, I256, U256};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Oracle answers and the precision of each feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub rose_usd_price: I256,
    pub rose_feed_decimals: u8,
    pub token_usd_price: I256,
    pub token_feed_decimals: u8,
}

/// Everything a conversion needs besides the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteParams {
    pub prices: PriceSnapshot,
    pub token_decimals: u8,
    pub destination_decimals: u8,
    pub slippage_percent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Destination-token base units the user asked for.
    pub requested_amount: U256,
    /// Source-token base units to deposit, slippage included.
    pub source_amount: U256,
}

fn positive_price(price: I256, asset: &'static str) -> Result<U256, QuoteError> {
    if price <= I256::ZERO {
        return Err(QuoteError::InvalidPrice { asset });
    }
    Ok(price.into_raw())
}

fn pow10(exponent: u32) -> Result<U256, QuoteError> {
    U256::from(10u8)
        .checked_pow(U256::from(exponent))
        .ok_or(QuoteError::Overflow)
}

fn mul(a: U256, b: U256) -> Result<U256, QuoteError> {
    a.checked_mul(b).ok_or(QuoteError::Overflow)
}

pub fn ceil_div(numerator: U256, denominator: U256) -> Result<U256, QuoteError> {
    if denominator.is_zero() {
        return Err(QuoteError::DivisionByZero);
    }
    let (quotient, remainder) = numerator.div_rem(denominator);
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u8))
    }
}

/// Source-token amount required to deliver `destination_amount`, including slippage.
pub fn compute_source_amount(
    destination_amount: U256,
    params: &QuoteParams,
) -> Result<U256, QuoteError> {
    let prices = &params.prices;
    let rose_usd_price = positive_price(prices.rose_usd_price, "ROSE")?;
    let token_usd_price = positive_price(prices.token_usd_price, "token")?;

    let numerator = mul(
        mul(destination_amount, rose_usd_price)?,
        pow10(params.token_decimals as u32 + prices.token_feed_decimals as u32)?,
    )?;
    let denominator = mul(
        token_usd_price,
        pow10(params.destination_decimals as u32 + prices.rose_feed_decimals as u32)?,
    )?;

    let raw = ceil_div(numerator, denominator)?;
    let slippage = 100u64
        .checked_add(params.slippage_percent)
        .ok_or(QuoteError::Overflow)?;
    let with_slippage = mul(raw, U256::from(slippage))?;
    ceil_div(with_slippage, U256::from(100u8))
}

/// Inverse of [`compute_source_amount`]: destination amount expected for a deposit of
/// `source_amount`. Rounds down and subtracts slippage since the user receives less.
pub fn estimate_destination_amount(
    source_amount: U256,
    params: &QuoteParams,
) -> Result<U256, QuoteError> {
    let prices = &params.prices;
    let rose_usd_price = positive_price(prices.rose_usd_price, "ROSE")?;
    let token_usd_price = positive_price(prices.token_usd_price, "token")?;

    let numerator = mul(
        mul(source_amount, token_usd_price)?,
        pow10(params.destination_decimals as u32 + prices.rose_feed_decimals as u32)?,
    )?;
    let denominator = mul(
        rose_usd_price,
        pow10(params.token_decimals as u32 + prices.token_feed_decimals as u32)?,
    )?;
    if denominator.is_zero() {
        return Err(QuoteError::DivisionByZero);
    }

    let raw = numerator / denominator;
    let keep = U256::from(100u64.saturating_sub(params.slippage_percent));
    Ok(mul(raw, keep)? / U256::from(100u8))
}

/// Feed addresses and precisions resolved from the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSet {
    pub rose_feed: Address,
    pub rose_feed_decimals: u8,
    pub token_feed: Address,
    pub token_feed_decimals: u8,
}

/// Reads oracle prices on the destination chain and turns them into quotes.
pub struct PriceQuoteEngine<W> {
    wallet: Arc<W>,
    settlement: Address,
    chain_id: ChainId,
    token: TokenConfig,
    destination_decimals: u8,
    slippage_percent: u64,
    feeds: RwLock<Option<FeedSet>>,
}

impl<W: WalletClient> PriceQuoteEngine<W> {
    pub fn new(
        wallet: Arc<W>,
        settlement: Address,
        chain_id: ChainId,
        token: TokenConfig,
        destination_decimals: u8,
        slippage_percent: u64,
    ) -> Self {
        Self {
            wallet,
            settlement,
            chain_id,
            token,
            destination_decimals,
            slippage_percent,
            feeds: RwLock::new(None),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.feed_set().is_some()
    }

    fn feed_set(&self) -> Option<FeedSet> {
        self.feeds.read().ok().and_then(|guard| *guard)
    }

    /// Resolves the feed addresses and their decimals. Quotes return `None` until
    /// this has succeeded once.
    pub async fn load_feeds(&self) -> TopUpResult<FeedSet> {
        let (rose_feed, token_feed) = futures::try_join!(
            self.wallet.rose_usd_feed(self.settlement, self.chain_id),
            self.wallet
                .token_price_feed(self.settlement, self.token.contract_address, self.chain_id),
        )?;
        let (rose_feed_decimals, token_feed_decimals) = futures::try_join!(
            self.wallet.feed_decimals(rose_feed, self.chain_id),
            self.wallet.feed_decimals(token_feed, self.chain_id),
        )?;

        let set = FeedSet {
            rose_feed,
            rose_feed_decimals,
            token_feed,
            token_feed_decimals,
        };
        info!(
            "Price feeds loaded: ROSE/USD {:?} ({} decimals), {}/USD {:?} ({} decimals)",
            rose_feed, rose_feed_decimals, self.token.symbol, token_feed, token_feed_decimals
        );
        if let Ok(mut guard) = self.feeds.write() {
            *guard = Some(set);
        }
        Ok(set)
    }

    async fn params(&self) -> TopUpResult<Option<QuoteParams>> {
        let Some(feeds) = self.feed_set() else {
            return Ok(None);
        };

        let (rose_usd_price, token_usd_price) = futures::try_join!(
            self.wallet.latest_answer(feeds.rose_feed, self.chain_id),
            self.wallet.latest_answer(feeds.token_feed, self.chain_id),
        )?;
        debug!(
            "Oracle answers: ROSE/USD {}, {}/USD {}",
            rose_usd_price, self.token.symbol, token_usd_price
        );

        Ok(Some(QuoteParams {
            prices: PriceSnapshot {
                rose_usd_price,
                rose_feed_decimals: feeds.rose_feed_decimals,
                token_usd_price,
                token_feed_decimals: feeds.token_feed_decimals,
            },
            token_decimals: self.token.decimals,
            destination_decimals: self.destination_decimals,
            slippage_percent: self.slippage_percent,
        }))
    }

    /// Quote for `requested_amount` destination base units, or `None` while feeds
    /// are not loaded.
    pub async fn quote(&self, requested_amount: U256) -> TopUpResult<Option<Quote>> {
        let Some(params) = self.params().await? else {
            return Ok(None);
        };
        let source_amount = compute_source_amount(requested_amount, &params)?;
        Ok(Some(Quote {
            requested_amount,
            source_amount,
        }))
    }

    /// Destination amount expected for a deposit of `source_amount`, or `None` while
    /// feeds are not loaded.
    pub async fn estimate(&self, source_amount: U256) -> TopUpResult<Option<U256>> {
        let Some(params) = self.params().await? else {
            return Ok(None);
        };
        Ok(Some(estimate_destination_amount(source_amount, &params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    fn equal_prices() -> QuoteParams {
        QuoteParams {
            prices: PriceSnapshot {
                rose_usd_price: I256::try_from(100_000_000i64).unwrap(),
                rose_feed_decimals: 8,
                token_usd_price: I256::try_from(100_000_000i64).unwrap(),
                token_feed_decimals: 8,
            },
            token_decimals: 6,
            destination_decimals: 18,
            slippage_percent: 2,
        }
    }

    #[test]
    fn equal_prices_add_two_percent() {
        let amount = compute_source_amount(ether(10), &equal_prices()).unwrap();
        assert_eq!(amount, U256::from(10_200_000u64));
    }

    #[test]
    fn realistic_rose_price() {
        // ROSE at $0.05, USDC at $1.00: 100 ROSE costs 5 USDC before slippage.
        let mut params = equal_prices();
        params.prices.rose_usd_price = I256::try_from(5_000_000i64).unwrap();
        params.prices.token_usd_price = I256::try_from(99_990_000i64).unwrap();
        params.slippage_percent = 0;
        let amount = compute_source_amount(ether(100), &params).unwrap();
        // 5 / 0.9999 = 5.00050005..., rounded up at 6 decimals
        assert_eq!(amount, U256::from(5_000_501u64));
    }

    #[test]
    fn is_deterministic() {
        let params = equal_prices();
        let a = compute_source_amount(ether(3), &params).unwrap();
        let b = compute_source_amount(ether(3), &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn is_monotonic_in_amount() {
        let mut params = equal_prices();
        params.prices.rose_usd_price = I256::try_from(4_321_987i64).unwrap();
        let mut previous = U256::ZERO;
        for step in 0..200u64 {
            let amount = U256::from(step) * U256::from(7_919_000_000_000_000u64);
            let quoted = compute_source_amount(amount, &params).unwrap();
            assert!(quoted >= previous, "quote decreased at step {step}");
            previous = quoted;
        }
    }

    #[test]
    fn rounds_up_dust() {
        // One wei of ROSE still costs a base unit, and the slippage rounds up again.
        let amount = compute_source_amount(U256::from(1u8), &equal_prices()).unwrap();
        assert_eq!(amount, U256::from(2u8));
        assert_eq!(
            compute_source_amount(U256::ZERO, &equal_prices()).unwrap(),
            U256::ZERO
        );
    }

    #[test]
    fn rejects_non_positive_prices() {
        let mut params = equal_prices();
        params.prices.rose_usd_price = I256::ZERO;
        assert_eq!(
            compute_source_amount(ether(10), &params),
            Err(QuoteError::InvalidPrice { asset: "ROSE" })
        );

        let mut params = equal_prices();
        params.prices.token_usd_price = I256::MINUS_ONE;
        assert_eq!(
            compute_source_amount(ether(10), &params),
            Err(QuoteError::InvalidPrice { asset: "token" })
        );
    }

    #[test]
    fn ceil_div_guards_zero_denominator() {
        assert_eq!(
            ceil_div(U256::from(5u8), U256::ZERO),
            Err(QuoteError::DivisionByZero)
        );
        assert_eq!(ceil_div(U256::from(5u8), U256::from(2u8)), Ok(U256::from(3u8)));
        assert_eq!(ceil_div(U256::from(4u8), U256::from(2u8)), Ok(U256::from(2u8)));
    }

    #[test]
    fn overflow_is_reported() {
        let mut params = equal_prices();
        params.token_decimals = 80;
        assert_eq!(
            compute_source_amount(ether(10), &params),
            Err(QuoteError::Overflow)
        );
    }

    #[test]
    fn huge_slippage_is_an_overflow() {
        let mut params = equal_prices();
        params.slippage_percent = u64::MAX;
        assert_eq!(
            compute_source_amount(ether(10), &params),
            Err(QuoteError::Overflow)
        );
    }

    #[test]
    fn estimate_subtracts_slippage() {
        let estimate =
            estimate_destination_amount(U256::from(10_000_000u64), &equal_prices()).unwrap();
        assert_eq!(estimate, ether(98) / U256::from(10u8));
    }
}
