//! Gathers the liquidity of one side of a swap into a [`MarketSideLiquidity`]
//! snapshot and optimizes it.
//!
//! Everything on-chain is read in a single sampler round trip: block number,
//! token decimals, fillable amounts of the open orders, ETH prices of both
//! tokens, the sampled curves of every allowed source, two-hop samples and
//! whether the transaction origin is a contract.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use eyre::{bail, eyre, Result};
use log::info;

use super::fill::EthRates;
use super::liquidity::{MarketSideLiquidity, RawQuotes};
use super::order::SignedNativeOrder;
use super::path::Path;
use super::side::Side;
use super::source::{Source, SourceFilters};
use crate::error::AggregationError;
use crate::optimizer::fees::{ExchangeProxyOverhead, FeeSchedule, FillAdjustor, GasSchedule, IdentityFillAdjustor};
use crate::optimizer::{find_optimal_path, OptimizerOpts};
use crate::rfq::{RfqFirmQuoteValidator, RfqRequestOpts, RfqTransport};
use crate::sampler::{get_sample_amounts, DexOrderSampler, SamplerOutput};
use crate::utils::constants::{
    ContractAddresses, BUY_SOURCES, DEFAULT_BRIDGE_SLIPPAGE, DEFAULT_NUM_SAMPLES, DEFAULT_ROUTER_NUM_SAMPLES,
    DEFAULT_SAMPLE_DISTRIBUTION_BASE, FEE_QUOTE_SOURCES, NATIVE_FEE_TOKEN_AMOUNT, SELL_SOURCES,
};

/// Request-level knobs of liquidity gathering and optimization.
#[derive(Clone)]
pub struct GetMarketOrdersOpts {
    /// Points sampled per source curve
    pub num_samples: usize,
    /// Growth of the step between sample amounts
    pub sample_distribution_base: f64,
    /// Chunks the router splits the amount into
    pub router_num_samples: usize,
    /// Slippage applied to bridge fills in the worst case
    pub bridge_slippage: f64,
    /// Sources the request refuses
    pub excluded_sources: Vec<Source>,
    /// Sources the request is restricted to, empty for all
    pub included_sources: Vec<Source>,
    /// RFQ options, `None` when the request wants no RFQ liquidity
    pub rfqt: Option<RfqRequestOpts>,
    /// Route-composition overhead
    pub exchange_proxy_overhead: ExchangeProxyOverhead,
    /// Gas per source
    pub gas_schedule: GasSchedule,
    /// Gas price in wei
    pub gas_price: U256,
    /// Rescales fills in the RFQ re-pass
    pub fill_adjustor: Arc<dyn FillAdjustor>,
}

impl Default for GetMarketOrdersOpts {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            sample_distribution_base: DEFAULT_SAMPLE_DISTRIBUTION_BASE,
            router_num_samples: DEFAULT_ROUTER_NUM_SAMPLES,
            bridge_slippage: DEFAULT_BRIDGE_SLIPPAGE,
            excluded_sources: Vec::new(),
            included_sources: Vec::new(),
            rfqt: None,
            exchange_proxy_overhead: ExchangeProxyOverhead::zero(),
            gas_schedule: GasSchedule::default(),
            gas_price: U256::ZERO,
            fill_adjustor: Arc::new(IdentityFillAdjustor),
        }
    }
}

impl GetMarketOrdersOpts {
    /// Fee schedule at the request's gas price.
    #[must_use]
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.gas_price, self.gas_schedule.clone())
    }
}

/// An optimized path and the snapshot it was optimized over.
#[derive(Clone, Debug)]
pub struct OptimizerResult {
    /// The chosen path
    pub path: Path,
    /// Liquidity the path was chosen from
    pub market_side_liquidity: MarketSideLiquidity,
    /// Taker token base units per wei
    pub taker_amount_per_eth: f64,
    /// Maker token base units per wei
    pub maker_amount_per_eth: f64,
}

/// Liquidity gathering and optimization for one chain.
pub struct MarketOperations {
    /// Batched sampler
    pub(crate) sampler: DexOrderSampler,
    /// Chain the sampler runs on
    pub(crate) chain_id: u64,
    /// Wrapped native token and exchange proxy
    pub(crate) addresses: ContractAddresses,
    /// Sources valid for sells
    sell_sources: SourceFilters,
    /// Sources valid for buys
    buy_sources: SourceFilters,
    /// RFQ service, `None` when RFQ is not configured
    pub(crate) rfq_transport: Option<Arc<dyn RfqTransport>>,
    /// Fillability check of firm quotes
    pub(crate) firm_quote_validator: Option<Arc<dyn RfqFirmQuoteValidator>>,
}

impl MarketOperations {
    /// Creates the market operations of `chain_id` over `sampler`.
    #[must_use]
    pub fn new(sampler: DexOrderSampler, chain_id: u64, addresses: ContractAddresses) -> Self {
        Self {
            sampler,
            chain_id,
            addresses,
            sell_sources: SourceFilters::new(&SELL_SOURCES, &[], &[]),
            buy_sources: SourceFilters::new(&BUY_SOURCES, &[], &[]),
            rfq_transport: None,
            firm_quote_validator: None,
        }
    }

    /// Adds an RFQ service.
    #[must_use]
    pub fn with_rfq_transport(mut self, transport: Arc<dyn RfqTransport>) -> Self {
        self.rfq_transport = Some(transport);
        self
    }

    /// Adds a firm-quote fillability check.
    #[must_use]
    pub fn with_firm_quote_validator(mut self, validator: Arc<dyn RfqFirmQuoteValidator>) -> Self {
        self.firm_quote_validator = Some(validator);
        self
    }

    /// Liquidity for selling `taker_amount` of `taker_token` for `maker_token`.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::Sampler` if the sampler round trip fails.
    pub async fn get_market_sell_liquidity(
        &self,
        maker_token: Address,
        taker_token: Address,
        limit_orders: &[SignedNativeOrder],
        taker_amount: U256,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity, AggregationError> {
        self.get_market_liquidity(Side::Sell, maker_token, taker_token, limit_orders, taker_amount, opts)
            .await
    }

    /// Liquidity for buying `maker_amount` of `maker_token` with `taker_token`.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::Sampler` if the sampler round trip fails.
    pub async fn get_market_buy_liquidity(
        &self,
        maker_token: Address,
        taker_token: Address,
        limit_orders: &[SignedNativeOrder],
        maker_amount: U256,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity, AggregationError> {
        self.get_market_liquidity(Side::Buy, maker_token, taker_token, limit_orders, maker_amount, opts)
            .await
    }

    /// Liquidity for either side.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::Sampler` if the sampler round trip fails.
    pub async fn get_market_liquidity(
        &self,
        side: Side,
        maker_token: Address,
        taker_token: Address,
        limit_orders: &[SignedNativeOrder],
        amount: U256,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity, AggregationError> {
        self.sample_liquidity(side, maker_token, taker_token, limit_orders, amount, opts)
            .await
            .map_err(AggregationError::Sampler)
    }

    /// Base units of `token` per wei of the native token, zero when no fee-quote
    /// source prices it.
    ///
    /// # Errors
    ///
    /// Returns an error if the sampler round trip fails.
    pub async fn get_token_amount_per_wei(&self, token: Address, fees: &FeeSchedule) -> Result<f64> {
        let op = self.sampler.ops().best_native_token_sell_rate(
            &FEE_QUOTE_SOURCES,
            token,
            self.addresses.ether_token,
            U256::from(NATIVE_FEE_TOKEN_AMOUNT),
            fees,
        );
        let rate = self
            .sampler
            .execute_batch(&[op])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("sampler returned no rate"))?
            .into_rate()?;
        if rate == 0.0 {
            info!("sampler: no conversion to the native token found for {token}");
        }
        Ok(rate)
    }

    /// Optimizes one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::NoOptimalPath` if no path covers the amount.
    pub fn generate_optimized_orders(
        &self,
        liquidity: &MarketSideLiquidity,
        opts: &OptimizerOpts<'_>,
    ) -> Result<OptimizerResult, AggregationError> {
        let path = find_optimal_path(liquidity, opts).ok_or(AggregationError::NoOptimalPath)?;
        let EthRates {
            output_amount_per_eth,
            input_amount_per_eth,
        } = liquidity.eth_rates;
        let (taker_amount_per_eth, maker_amount_per_eth) = match liquidity.side {
            Side::Sell => (input_amount_per_eth, output_amount_per_eth),
            Side::Buy => (output_amount_per_eth, input_amount_per_eth),
        };
        Ok(OptimizerResult {
            path,
            market_side_liquidity: liquidity.clone(),
            taker_amount_per_eth,
            maker_amount_per_eth,
        })
    }

    /// Sources of `side` narrowed by the request's lists.
    fn quote_source_filters(&self, side: Side, opts: &GetMarketOrdersOpts) -> SourceFilters {
        let request_filters = SourceFilters::new(&[], &[], &[])
            .exclude(&opts.excluded_sources)
            .include(&opts.included_sources);
        match side {
            Side::Sell => self.sell_sources.merge(&request_filters),
            Side::Buy => self.buy_sources.merge(&request_filters),
        }
    }

    async fn sample_liquidity(
        &self,
        side: Side,
        maker_token: Address,
        taker_token: Address,
        limit_orders: &[SignedNativeOrder],
        amount: U256,
        opts: &GetMarketOrdersOpts,
    ) -> Result<MarketSideLiquidity> {
        let sample_amounts = get_sample_amounts(amount, opts.num_samples, opts.sample_distribution_base);
        let quote_source_filters = self.quote_source_filters(side, opts);
        let sources = quote_source_filters.sources();
        let two_hop_sources = if quote_source_filters.is_allowed(Source::MultiHop) {
            sources.clone()
        } else {
            Vec::new()
        };
        let tx_origin = opts.rfqt.as_ref().and_then(|r| r.tx_origin).unwrap_or(Address::ZERO);
        let fees = opts.fee_schedule();
        let native_token = self.addresses.ether_token;
        let native_amount = U256::from(NATIVE_FEE_TOKEN_AMOUNT);

        let ops = self.sampler.ops();
        let (dex_op, two_hop_op) = match side {
            Side::Sell => (
                ops.sell_quotes(&sources, maker_token, taker_token, &sample_amounts),
                ops.two_hop_sell_quotes(&two_hop_sources, maker_token, taker_token, amount),
            ),
            Side::Buy => (
                ops.buy_quotes(&sources, maker_token, taker_token, &sample_amounts),
                ops.two_hop_buy_quotes(&two_hop_sources, maker_token, taker_token, amount),
            ),
        };
        let batch = vec![
            ops.block_number(),
            ops.token_decimals(&[maker_token, taker_token]),
            ops.limit_order_fillable_taker_amounts(limit_orders),
            ops.best_native_token_sell_rate(&FEE_QUOTE_SOURCES, maker_token, native_token, native_amount, &fees),
            ops.best_native_token_sell_rate(&FEE_QUOTE_SOURCES, taker_token, native_token, native_amount, &fees),
            dex_op,
            two_hop_op,
            ops.is_address_contract(tx_origin),
        ];

        let mut results = self.sampler.execute_batch(&batch).await?.into_iter();
        let mut next = || results.next().ok_or_else(|| eyre!("sampler batch ended early"));
        let block_number = next()?.into_block_number()?;
        let decimals = next()?.into_decimals()?;
        let fillable_taker_amounts = next()?.into_amounts()?;
        let maker_amount_per_eth = next()?.into_rate()?;
        let taker_amount_per_eth = next()?.into_rate()?;
        let dex_quotes = next()?.into_dex_quotes()?;
        let two_hop_quotes = next()?.into_two_hop_quotes()?;
        let is_tx_origin_contract = next().and_then(SamplerOutput::into_bool)?;

        let [maker_token_decimals, taker_token_decimals] = decimals[..] else {
            bail!("expected decimals of 2 tokens, got {}", decimals.len());
        };
        for (token, rate) in [(maker_token, maker_amount_per_eth), (taker_token, taker_amount_per_eth)] {
            if rate == 0.0 {
                info!("sampler: no conversion to the native token found for {token}");
            }
        }
        let eth_rates = match side {
            Side::Sell => EthRates {
                output_amount_per_eth: maker_amount_per_eth,
                input_amount_per_eth: taker_amount_per_eth,
            },
            Side::Buy => EthRates {
                output_amount_per_eth: taker_amount_per_eth,
                input_amount_per_eth: maker_amount_per_eth,
            },
        };

        let native_orders = limit_orders
            .iter()
            .enumerate()
            .map(|(i, order)| {
                let fillable = fillable_taker_amounts.get(i).copied().unwrap_or_default();
                order.clone().with_fillable_taker_amount(fillable)
            })
            .collect();
        let (input_token, output_token) = match side {
            Side::Sell => (taker_token, maker_token),
            Side::Buy => (maker_token, taker_token),
        };

        Ok(MarketSideLiquidity {
            side,
            input_amount: amount,
            input_token,
            output_token,
            eth_rates,
            quote_source_filters,
            maker_token_decimals,
            taker_token_decimals,
            quotes: RawQuotes {
                native_orders,
                rfqt_indicative_quotes: Vec::new(),
                dex_quotes: dex_quotes.into_iter().filter(|q| !q.is_empty()).collect(),
                two_hop_quotes,
            },
            is_rfq_supported: opts.rfqt.is_some() && !is_tx_origin_contract,
            block_number,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use alloy::primitives::Bytes;
    use alloy::sol_types::SolCall;
    use async_trait::async_trait;

    use super::*;
    use crate::market::order::NativeOrderKind;
    use crate::market::test_helpers::*;
    use crate::sampler::contract::bindings::IERC20BridgeSampler;
    use crate::sampler::{CallResult, MockSamplerContract, SamplerContract, SamplerOperations};
    use crate::token_graph::TokenAdjacencyGraph;
    use crate::utils::constants::{contract_addresses, MAINNET_CHAIN_ID};

    /// Answers V2-style sells at 2x and buys at half, token B has 6 decimals,
    /// the address "contract" holds code and every open order is half filled.
    pub(crate) fn handler(data: &[u8]) -> Option<Bytes> {
        if let Ok(call) = IERC20BridgeSampler::sampleSellsFromUniswapV2Call::abi_decode(data, true) {
            let out: Vec<U256> = call.takerTokenAmounts.iter().map(|a| *a * U256::from(2)).collect();
            return Some(IERC20BridgeSampler::sampleSellsFromUniswapV2Call::abi_encode_returns(&(out,)).into());
        }
        if let Ok(call) = IERC20BridgeSampler::sampleBuysFromUniswapV2Call::abi_decode(data, true) {
            let out: Vec<U256> = call.makerTokenAmounts.iter().map(|a| *a / U256::from(2)).collect();
            return Some(IERC20BridgeSampler::sampleBuysFromUniswapV2Call::abi_encode_returns(&(out,)).into());
        }
        if IERC20BridgeSampler::getBlockNumberCall::abi_decode(data, true).is_ok() {
            return Some(IERC20BridgeSampler::getBlockNumberCall::abi_encode_returns(&(U256::from(42),)).into());
        }
        if let Ok(call) = IERC20BridgeSampler::getTokenDecimalsCall::abi_decode(data, true) {
            let decimals: Vec<U256> = call
                .tokens
                .iter()
                .map(|t| U256::from(if *t == address_from_str("B") { 6 } else { 18 }))
                .collect();
            return Some(IERC20BridgeSampler::getTokenDecimalsCall::abi_encode_returns(&(decimals,)).into());
        }
        if let Ok(call) = IERC20BridgeSampler::isContractCall::abi_decode(data, true) {
            let has_code = call.account == address_from_str("contract");
            return Some(IERC20BridgeSampler::isContractCall::abi_encode_returns(&(has_code,)).into());
        }
        if let Ok(call) = IERC20BridgeSampler::getLimitOrderFillableTakerAssetAmountsCall::abi_decode(data, true) {
            let amounts: Vec<U256> = call
                .orders
                .iter()
                .map(|o| U256::from(o.takerAmount) / U256::from(2))
                .collect();
            return Some(
                IERC20BridgeSampler::getLimitOrderFillableTakerAssetAmountsCall::abi_encode_returns(&(amounts,)).into(),
            );
        }
        None
    }

    pub(crate) fn market_operations(contract: Arc<dyn SamplerContract>) -> MarketOperations {
        let addresses = contract_addresses(MAINNET_CHAIN_ID).unwrap().clone();
        let ops = SamplerOperations::new(
            addresses.clone(),
            Arc::new(TokenAdjacencyGraph::default()),
            Vec::new(),
            Vec::new(),
        );
        MarketOperations::new(DexOrderSampler::new(contract, ops), MAINNET_CHAIN_ID, addresses)
    }

    /// Fails every round trip.
    struct Unreachable;

    #[async_trait]
    impl SamplerContract for Unreachable {
        async fn batch_call(&self, _call_datas: Vec<Bytes>) -> Result<Vec<CallResult>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_sell_liquidity_in_one_round_trip() {
        let contract = Arc::new(MockSamplerContract::new(handler));
        let operations = market_operations(contract.clone());
        let orders = vec![native_order(NativeOrderKind::Limit, 2_000, 1_000)];
        let liquidity = operations
            .get_market_sell_liquidity(
                address_from_str("B"),
                address_from_str("A"),
                &orders,
                U256::from(1_000),
                &GetMarketOrdersOpts::default(),
            )
            .await
            .unwrap();

        assert_eq!(contract.round_trips(), 1);
        assert_eq!(liquidity.block_number, 42);
        assert_eq!(liquidity.maker_token_decimals, 6);
        assert_eq!(liquidity.taker_token_decimals, 18);
        assert_eq!(liquidity.input_token, address_from_str("A"));
        assert!((liquidity.eth_rates.output_amount_per_eth - 2.0).abs() < f64::EPSILON);
        assert!(!liquidity.is_rfq_supported);

        // the open order is half filled
        let native = &liquidity.quotes.native_orders[0];
        assert_eq!(native.fillable_taker_amount, U256::from(500));
        assert_eq!(native.fillable_maker_amount, U256::from(1_000));

        // V3 reverts and its empty curve is dropped
        let sources: Vec<Source> = liquidity.quotes.dex_quotes.iter().map(|q| q[0].source).collect();
        assert_eq!(sources, vec![Source::UniswapV2, Source::SushiSwap]);
        for curve in &liquidity.quotes.dex_quotes {
            assert_eq!(curve.len(), DEFAULT_NUM_SAMPLES);
            assert_eq!(curve.last().unwrap().input, U256::from(1_000));
            assert_eq!(curve.last().unwrap().output, U256::from(2_000));
        }
    }

    #[tokio::test]
    async fn test_buy_liquidity() {
        let operations = market_operations(Arc::new(MockSamplerContract::new(handler)));
        let opts = GetMarketOrdersOpts {
            excluded_sources: vec![Source::SushiSwap],
            ..GetMarketOrdersOpts::default()
        };
        let liquidity = operations
            .get_market_buy_liquidity(
                address_from_str("B"),
                address_from_str("A"),
                &[SignedNativeOrder::dummy(address_from_str("B"), address_from_str("A"))],
                U256::from(1_000),
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(liquidity.side, Side::Buy);
        assert_eq!(liquidity.input_token, address_from_str("B"));
        assert_eq!(liquidity.quotes.dex_quotes.len(), 1);
        assert_eq!(liquidity.quotes.dex_quotes[0].last().unwrap().output, U256::from(500));
        assert!(liquidity.quotes.native_orders[0].fillable_taker_amount.is_zero());
        assert!(!liquidity.quote_source_filters.is_allowed(Source::SushiSwap));
    }

    #[tokio::test]
    async fn test_rfq_unsupported_for_contract_origin() {
        let operations = market_operations(Arc::new(MockSamplerContract::new(handler)));
        for (origin, supported) in &[("eoa", true), ("contract", false)] {
            let opts = GetMarketOrdersOpts {
                rfqt: Some(RfqRequestOpts {
                    tx_origin: Some(address_from_str(origin)),
                    ..RfqRequestOpts::default()
                }),
                ..GetMarketOrdersOpts::default()
            };
            let liquidity = operations
                .get_market_sell_liquidity(address_from_str("B"), address_from_str("A"), &[], U256::from(100), &opts)
                .await
                .unwrap();
            assert_eq!(liquidity.is_rfq_supported, *supported, "origin {origin}");
        }
    }

    #[tokio::test]
    async fn test_sampler_failure_is_reported() {
        let operations = market_operations(Arc::new(Unreachable));
        let err = operations
            .get_market_sell_liquidity(
                address_from_str("B"),
                address_from_str("A"),
                &[],
                U256::from(100),
                &GetMarketOrdersOpts::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::Sampler(_)));
        assert!(!err.is_insufficient_liquidity());
    }

    #[tokio::test]
    async fn test_token_amount_per_wei() {
        let operations = market_operations(Arc::new(MockSamplerContract::new(handler)));
        let fees = FeeSchedule::new(U256::ZERO, GasSchedule::default());
        let rate = operations.get_token_amount_per_wei(address_from_str("B"), &fees).await.unwrap();
        assert!((rate - 2.0).abs() < f64::EPSILON);
        let native = operations.get_token_amount_per_wei(operations.addresses.ether_token, &fees).await.unwrap();
        assert!((native - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_generate_optimized_orders() {
        let operations = market_operations(Arc::new(MockSamplerContract::new(handler)));
        let fees = zero_fees();
        let opts = OptimizerOpts {
            fee_schedule: &fees,
            exchange_proxy_overhead: ExchangeProxyOverhead::zero(),
            router_num_samples: DEFAULT_ROUTER_NUM_SAMPLES,
            fill_adjustor: &IdentityFillAdjustor,
        };
        let mut liquidity = market_side_liquidity(
            Side::Buy,
            300,
            vec![dex_curve(Source::Curve, &[(100, 200), (200, 400), (300, 600)])],
        );
        liquidity.eth_rates = EthRates {
            output_amount_per_eth: 3.0,
            input_amount_per_eth: 5.0,
        };
        let result = operations.generate_optimized_orders(&liquidity, &opts).unwrap();
        assert!((result.taker_amount_per_eth - 3.0).abs() < f64::EPSILON);
        assert!((result.maker_amount_per_eth - 5.0).abs() < f64::EPSILON);

        liquidity.input_amount = U256::from(301);
        let err = operations.generate_optimized_orders(&liquidity, &opts).unwrap_err();
        assert!(matches!(err, AggregationError::NoOptimalPath));
    }
}
