//! The quoting entry point: gas price, RFQ policy, open-orderbook pruning,
//! liquidity and the final quote.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use futures::future::join_all;
use log::{debug, info};
use serde::Serialize;

use super::info::{calculate_quote_info, QuoteInfo, SourceBreakdown, SwapQuoteInfo};
use crate::error::AggregationError;
use crate::gas::GasPricePoller;
use crate::market::assembler::{GetMarketOrdersOpts, MarketOperations, OptimizerResult};
use crate::market::order::SignedNativeOrder;
use crate::market::path::Path;
use crate::market::side::Side;
use crate::market::source::{Source, SourceFilters};
use crate::rfq::policy::ensure_rfq_available;
use crate::rfq::RfqPolicy;
use crate::utils::constants::LIMIT_ORDER_EXPIRY_BUFFER_SECS;

/// Options of one quote request.
#[derive(Clone, Default)]
pub struct SwapQuoteRequestOpts {
    /// Gas price in wei; the poller's price when `None`
    pub gas_price: Option<U256>,
    /// Liquidity and optimizer knobs; the gas price in here is ignored
    pub market: GetMarketOrdersOpts,
}

/// Everything a caller needs to settle a swap.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    /// Sell or buy
    #[serde(rename = "type")]
    pub side: Side,
    /// Token the taker receives
    pub maker_token: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Requested amount, of the taker token for sells and the maker token for buys
    pub asset_fill_amount: U256,
    /// Gas price the quote was priced at
    pub gas_price: U256,
    /// The chosen path
    pub path: Path,
    /// Amounts if every order fills exactly as sampled
    pub best_case_quote_info: SwapQuoteInfo,
    /// Amounts with the bridge slippage applied
    pub worst_case_quote_info: SwapQuoteInfo,
    /// Share of the fill amount per source
    pub source_breakdown: SourceBreakdown,
    /// Decimals of the maker token
    pub maker_token_decimals: u8,
    /// Decimals of the taker token
    pub taker_token_decimals: u8,
    /// Taker token base units per wei
    pub taker_amount_per_eth: f64,
    /// Maker token base units per wei
    pub maker_amount_per_eth: f64,
    /// `true` when the whole path is one two-hop fill
    pub is_two_hop: bool,
    /// Block the liquidity was sampled at
    pub block_number: u64,
}

/// Quotes swaps on one chain.
pub struct SwapQuoter {
    /// Liquidity gathering and optimization
    market_operations: MarketOperations,
    /// Gas price when the request has none
    gas_prices: Arc<GasPricePoller>,
    /// RFQ allow and deny lists
    rfq_policy: RfqPolicy,
    /// Limit orders expiring sooner than this many seconds are dropped
    expiry_buffer_secs: u64,
}

impl SwapQuoter {
    /// Creates a quoter.
    #[must_use]
    pub const fn new(market_operations: MarketOperations, gas_prices: Arc<GasPricePoller>, rfq_policy: RfqPolicy) -> Self {
        Self {
            market_operations,
            gas_prices,
            rfq_policy,
            expiry_buffer_secs: LIMIT_ORDER_EXPIRY_BUFFER_SECS,
        }
    }

    /// Quotes selling `taker_amount` of `taker_token` for `maker_token`.
    ///
    /// # Errors
    ///
    /// See [`SwapQuoter::get_swap_quote`].
    pub async fn get_market_sell_swap_quote(
        &self,
        maker_token: Address,
        taker_token: Address,
        taker_amount: U256,
        limit_orders: Vec<SignedNativeOrder>,
        opts: &SwapQuoteRequestOpts,
    ) -> Result<SwapQuote, AggregationError> {
        self.get_swap_quote(maker_token, taker_token, taker_amount, Side::Sell, limit_orders, opts)
            .await
    }

    /// Quotes buying `maker_amount` of `maker_token` with `taker_token`.
    ///
    /// # Errors
    ///
    /// See [`SwapQuoter::get_swap_quote`].
    pub async fn get_market_buy_swap_quote(
        &self,
        maker_token: Address,
        taker_token: Address,
        maker_amount: U256,
        limit_orders: Vec<SignedNativeOrder>,
        opts: &SwapQuoteRequestOpts,
    ) -> Result<SwapQuote, AggregationError> {
        self.get_swap_quote(maker_token, taker_token, maker_amount, Side::Buy, limit_orders, opts)
            .await
    }

    /// Quotes one swap.
    ///
    /// `limit_orders` are the open-orderbook orders for the pair; those that a
    /// taker cannot fill right now are dropped.
    ///
    /// # Errors
    ///
    /// * `InvalidSlippage` if the bridge slippage is outside `[0, 1]`
    /// * `GasPrice` if no gas price is given and none could be fetched
    /// * RFQ policy violations, before any network call
    /// * `NoOptimalPath` if the liquidity cannot cover `asset_fill_amount`
    /// * `Sampler` if sampling fails
    pub async fn get_swap_quote(
        &self,
        maker_token: Address,
        taker_token: Address,
        asset_fill_amount: U256,
        side: Side,
        limit_orders: Vec<SignedNativeOrder>,
        opts: &SwapQuoteRequestOpts,
    ) -> Result<SwapQuote, AggregationError> {
        let slippage = opts.market.bridge_slippage;
        if !(0.0..=1.0).contains(&slippage) {
            return Err(AggregationError::InvalidSlippage(slippage));
        }
        let source_filters = SourceFilters::new(&[], &opts.market.excluded_sources, &opts.market.included_sources);
        let rfqt = self.rfq_policy.validate(&source_filters, opts.market.rfqt.clone())?;
        ensure_rfq_available(
            opts.market.rfqt.is_some(),
            &opts.market.included_sources,
            self.is_rfq_enabled(),
        )?;
        let gas_price = self.resolve_gas_price(opts).await?;

        let skip_open_orderbook =
            !source_filters.is_allowed(Source::Native) || rfqt.as_ref().is_some_and(|r| r.native_exclusively_rfq);
        let limit_orders = if skip_open_orderbook {
            Vec::new()
        } else {
            prune_limit_orders(limit_orders, unix_now(), self.expiry_buffer_secs)
        };
        let limit_orders = with_dummy_order(limit_orders, maker_token, taker_token);

        let market_opts = GetMarketOrdersOpts {
            gas_price,
            rfqt,
            ..opts.market.clone()
        };
        let result = self
            .market_operations
            .get_optimizer_result(maker_token, taker_token, &limit_orders, asset_fill_amount, side, &market_opts)
            .await?;
        info!(
            "quote: {side} {asset_fill_amount} of {} through {} fills",
            if side == Side::Sell { taker_token } else { maker_token },
            result.path.fills().len()
        );
        create_swap_quote(result, maker_token, taker_token, asset_fill_amount, gas_price, &market_opts)
    }

    /// Quotes buying each of `maker_tokens` with `taker_token`, without RFQ.
    /// Tokens that cannot be quoted are left out.
    ///
    /// # Arguments
    ///
    /// * `maker_tokens` - Tokens to buy
    /// * `taker_token` - Token paid with
    /// * `maker_amounts` - Amount of each maker token to buy
    /// * `limit_orders` - Open-orderbook orders of each pair
    /// * `opts` - Request options; its RFQ options are ignored
    ///
    /// # Errors
    ///
    /// Returns `GasPrice` if no gas price is given and none could be fetched.
    pub async fn get_batch_market_buy_swap_quotes(
        &self,
        maker_tokens: &[Address],
        taker_token: Address,
        maker_amounts: &[U256],
        limit_orders: Vec<Vec<SignedNativeOrder>>,
        opts: &SwapQuoteRequestOpts,
    ) -> Result<Vec<SwapQuote>, AggregationError> {
        let gas_price = self.resolve_gas_price(opts).await?;
        let market_opts = GetMarketOrdersOpts {
            gas_price,
            rfqt: None,
            ..opts.market.clone()
        };
        let now = unix_now();
        let mut limit_orders = limit_orders.into_iter();
        let quotes = maker_tokens.iter().zip(maker_amounts).map(|(maker_token, amount)| {
            let orders = prune_limit_orders(limit_orders.next().unwrap_or_default(), now, self.expiry_buffer_secs);
            let orders = with_dummy_order(orders, *maker_token, taker_token);
            let market_opts = &market_opts;
            async move {
                let result = self
                    .market_operations
                    .get_optimizer_result(*maker_token, taker_token, &orders, *amount, Side::Buy, market_opts)
                    .await?;
                create_swap_quote(result, *maker_token, taker_token, *amount, gas_price, market_opts)
            }
        });
        Ok(join_all(quotes)
            .await
            .into_iter()
            .zip(maker_tokens)
            .filter_map(|(quote, maker_token)| {
                quote
                    .inspect_err(|e| debug!("quote: no batch quote for {maker_token}: {e}"))
                    .ok()
            })
            .collect())
    }

    /// The request's gas price, else the poller's.
    async fn resolve_gas_price(&self, opts: &SwapQuoteRequestOpts) -> Result<U256, AggregationError> {
        match opts.gas_price {
            Some(gas_price) => Ok(gas_price),
            None => self.gas_prices.gas_price().await.map_err(AggregationError::GasPrice),
        }
    }

    fn is_rfq_enabled(&self) -> bool {
        self.market_operations
            .rfq_transport
            .as_ref()
            .is_some_and(|t| t.is_rfqt_enabled())
    }
}

/// Keeps the orders any taker can fill now: no restricted taker, no taker fee
/// and not expiring within `expiry_buffer_secs`.
fn prune_limit_orders(orders: Vec<SignedNativeOrder>, now: u64, expiry_buffer_secs: u64) -> Vec<SignedNativeOrder> {
    orders
        .into_iter()
        .filter(|o| {
            o.order.taker == Address::ZERO
                && o.order.taker_token_fee_amount.is_zero()
                && o.order.expiry > now.saturating_add(expiry_buffer_secs)
        })
        .collect()
}

/// Sampling needs at least one order to know the pair.
fn with_dummy_order(
    mut orders: Vec<SignedNativeOrder>,
    maker_token: Address,
    taker_token: Address,
) -> Vec<SignedNativeOrder> {
    if orders.is_empty() {
        orders.push(SignedNativeOrder::dummy(maker_token, taker_token));
    }
    orders
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Builds the quote from the optimizer's result.
///
/// The exchange-proxy overhead is raw gas, added to both cases once.
fn create_swap_quote(
    result: OptimizerResult,
    maker_token: Address,
    taker_token: Address,
    asset_fill_amount: U256,
    gas_price: U256,
    opts: &GetMarketOrdersOpts,
) -> Result<SwapQuote, AggregationError> {
    let OptimizerResult {
        path,
        market_side_liquidity,
        taker_amount_per_eth,
        maker_amount_per_eth,
    } = result;
    let side = market_side_liquidity.side;
    let QuoteInfo {
        mut best_case_quote_info,
        mut worst_case_quote_info,
        source_breakdown,
    } = calculate_quote_info(
        &path.orders_by_type(),
        side,
        asset_fill_amount,
        gas_price,
        &opts.gas_schedule,
        opts.bridge_slippage,
    )
    .map_err(AggregationError::Internal)?;

    let overhead = opts.exchange_proxy_overhead.gas(path.source_flags());
    best_case_quote_info.gas += overhead;
    worst_case_quote_info.gas += overhead;

    Ok(SwapQuote {
        side,
        maker_token,
        taker_token,
        asset_fill_amount,
        gas_price,
        is_two_hop: path.source_flags() == Source::MultiHop.flag(),
        path,
        best_case_quote_info,
        worst_case_quote_info,
        source_breakdown,
        maker_token_decimals: market_side_liquidity.maker_token_decimals,
        taker_token_decimals: market_side_liquidity.taker_token_decimals,
        taker_amount_per_eth,
        maker_amount_per_eth,
        block_number: market_side_liquidity.block_number,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::gas::GasPriceSource;
    use crate::market::assembler::tests::{handler, market_operations};
    use crate::market::order::NativeOrderKind;
    use crate::market::test_helpers::{address_from_str, native_order};
    use crate::optimizer::fees::ExchangeProxyOverhead;
    use crate::rfq::RfqRequestOpts;
    use crate::sampler::MockSamplerContract;
    use crate::utils::constants::VIP_SOURCES;

    struct FixedGasPrice(u64);

    #[async_trait]
    impl GasPriceSource for FixedGasPrice {
        async fn fetch_gas_price(&self) -> eyre::Result<U256> {
            Ok(U256::from(self.0))
        }
    }

    fn quoter(contract: Arc<MockSamplerContract>) -> SwapQuoter {
        let poller = GasPricePoller::spawn(Arc::new(FixedGasPrice(3)), Duration::from_secs(60), 1);
        let policy = RfqPolicy::new(["integrator".to_string()], [address_from_str("blacklisted")]);
        SwapQuoter::new(market_operations(contract), Arc::new(poller), policy)
    }

    fn v2_only(gas_price: Option<u64>) -> SwapQuoteRequestOpts {
        SwapQuoteRequestOpts {
            gas_price: gas_price.map(U256::from),
            market: GetMarketOrdersOpts {
                excluded_sources: vec![Source::SushiSwap],
                exchange_proxy_overhead: ExchangeProxyOverhead::with_vip_sources(&VIP_SOURCES),
                ..GetMarketOrdersOpts::default()
            },
        }
    }

    async fn sell(quoter: &SwapQuoter, opts: &SwapQuoteRequestOpts) -> Result<SwapQuote, AggregationError> {
        quoter
            .get_market_sell_swap_quote(
                address_from_str("B"),
                address_from_str("A"),
                U256::from(1_000),
                Vec::new(),
                opts,
            )
            .await
    }

    #[tokio::test]
    async fn test_sell_quote() {
        let opts = v2_only(Some(0));
        let quote = sell(&quoter(Arc::new(MockSamplerContract::new(handler))), &opts).await.unwrap();

        assert_eq!(quote.side, Side::Sell);
        assert_eq!(quote.gas_price, U256::ZERO);
        assert_eq!(quote.best_case_quote_info.maker_amount, U256::from(2_000));
        assert_eq!(quote.best_case_quote_info.taker_amount, U256::from(1_000));
        assert_eq!(quote.worst_case_quote_info.maker_amount, U256::from(1_990));
        assert_eq!(quote.worst_case_quote_info.slippage, 0.005);
        assert_eq!(quote.source_breakdown.single_source[&Source::UniswapV2], 1.0);
        assert_eq!((quote.maker_token_decimals, quote.taker_token_decimals), (6, 18));
        assert_eq!(quote.block_number, 42);
        assert!(!quote.is_two_hop);

        let fill = &quote.path.fills()[0];
        let source_gas = opts.market.gas_schedule.gas(fill.source, &fill.fill_data);
        let overhead = opts.market.exchange_proxy_overhead.gas(quote.path.source_flags());
        assert_eq!(overhead, 21_000);
        assert_eq!(quote.best_case_quote_info.gas, source_gas + overhead);
        assert_eq!(quote.worst_case_quote_info.gas, source_gas + overhead);
    }

    #[tokio::test]
    async fn test_gas_price_from_poller() {
        let quote = sell(&quoter(Arc::new(MockSamplerContract::new(handler))), &v2_only(None))
            .await
            .unwrap();
        assert_eq!(quote.gas_price, U256::from(3));
    }

    #[tokio::test]
    async fn test_policy_errors_before_sampling() {
        let firm_without_origin = RfqRequestOpts {
            integrator_id: Some("integrator".to_string()),
            intent_on_filling: true,
            ..RfqRequestOpts::default()
        };
        let rfq_only = RfqRequestOpts {
            integrator_id: Some("integrator".to_string()),
            is_indicative: true,
            ..RfqRequestOpts::default()
        };
        for (rfqt, included, slippage, expected) in &[
            (Some(firm_without_origin), vec![], 0.005, "RFQ-T firm quote requests must specify a tx origin"),
            (Some(rfq_only), vec![Source::Native], 0.005, "RFQ-T service is not available"),
            (None, vec![], 1.5, "invalid slippage: 1.5"),
        ] {
            let contract = Arc::new(MockSamplerContract::new(handler));
            let opts = SwapQuoteRequestOpts {
                gas_price: Some(U256::ZERO),
                market: GetMarketOrdersOpts {
                    rfqt: rfqt.clone(),
                    included_sources: included.clone(),
                    bridge_slippage: *slippage,
                    ..GetMarketOrdersOpts::default()
                },
            };
            let err = sell(&quoter(contract.clone()), &opts).await.unwrap_err();
            assert_eq!(err.to_string(), *expected);
            assert_eq!(contract.round_trips(), 0);
        }
    }

    #[tokio::test]
    async fn test_blacklisted_origin_still_quotes() {
        let mut opts = v2_only(Some(0));
        opts.market.rfqt = Some(RfqRequestOpts {
            integrator_id: Some("integrator".to_string()),
            tx_origin: Some(address_from_str("blacklisted")),
            intent_on_filling: true,
            ..RfqRequestOpts::default()
        });
        let quote = sell(&quoter(Arc::new(MockSamplerContract::new(handler))), &opts).await.unwrap();
        assert_eq!(quote.best_case_quote_info.maker_amount, U256::from(2_000));
    }

    #[tokio::test]
    async fn test_limit_orders_join_the_path() {
        let quoter = quoter(Arc::new(MockSamplerContract::new(handler)));
        // half fillable by the mock: 600 taker for 2_400 maker at 4x
        let order = native_order(NativeOrderKind::Limit, 4_800, 1_200);
        let quote = quoter
            .get_market_sell_swap_quote(
                address_from_str("B"),
                address_from_str("A"),
                U256::from(1_000),
                vec![order],
                &SwapQuoteRequestOpts {
                    gas_price: Some(U256::ZERO),
                    ..SwapQuoteRequestOpts::default()
                },
            )
            .await
            .unwrap();
        assert!(quote.source_breakdown.single_source.contains_key(&Source::Native));
        assert!(quote.best_case_quote_info.maker_amount > U256::from(2_000));
        assert!((quote.source_breakdown.total_proportion() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_limit_orders() {
        let now = 1_000;
        let order = |f: fn(&mut SignedNativeOrder)| {
            let mut o = native_order(NativeOrderKind::Limit, 2, 1);
            f(&mut o);
            o
        };
        for (order, kept) in &[
            (order(|_| {}), true),
            (order(|o| o.order.taker = address_from_str("taker")), false),
            (order(|o| o.order.taker_token_fee_amount = U256::from(1)), false),
            (order(|o| o.order.expiry = 1_030), false),
            (order(|o| o.order.expiry = 1_031), true),
        ] {
            let pruned = prune_limit_orders(vec![order.clone()], now, LIMIT_ORDER_EXPIRY_BUFFER_SECS);
            assert_eq!(pruned.len() == 1, *kept, "{order:?}");
        }
    }

    #[tokio::test]
    async fn test_batch_buy_skips_failures() {
        let quoter = quoter(Arc::new(MockSamplerContract::new(handler)));
        let quotes = quoter
            .get_batch_market_buy_swap_quotes(
                &[address_from_str("B"), address_from_str("C")],
                address_from_str("A"),
                &[U256::from(1_000), U256::from(1)],
                Vec::new(),
                &v2_only(Some(0)),
            )
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].side, Side::Buy);
        assert_eq!(quotes[0].maker_token, address_from_str("B"));
        assert_eq!(quotes[0].best_case_quote_info.taker_amount, U256::from(500));
    }
}
