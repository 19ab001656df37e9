//! Per-source quote operations and the registries they are built from.

use std::sync::Arc;

use alloy::primitives::{fixed_bytes, Address, Bytes, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

use super::contract::bindings::IERC20BridgeSampler;
use super::operation::{
    BatchOperation, BatchedOperation, ConstantOperation, ContractCallOperation, SamplerOutput,
    SourceQuoteOperation, TwoHopOperation,
};
use crate::market::fill_data::{CurvePool, FillData};
use crate::market::liquidity::DexSample;
use crate::market::order::SignedNativeOrder;
use crate::market::source::{Source, SourceFilters};
use crate::optimizer::fees::FeeSchedule;
use crate::token_graph::TokenAdjacencyGraph;
use crate::utils::math::u256_to_f64;
use crate::utils::constants::{ContractAddresses, CURVE_3POOL, DAI, SELL_SOURCES, USDC, USDT};

/// A registered liquidity provider and the tokens it serves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityProviderInfo {
    /// Provider contract
    pub provider_address: Address,
    /// Tokens any pair of which the provider quotes
    pub tokens: Vec<Address>,
    /// Gas a fill costs
    pub gas_cost: u64,
}

/// Curve pools known on mainnet.
#[must_use]
pub fn mainnet_curve_pools() -> Vec<CurvePool> {
    vec![CurvePool {
        pool_address: CURVE_3POOL,
        // get_dy(int128,int128,uint256)
        sell_quote_function_selector: fixed_bytes!("5e0d443f"),
        // get_dx(int128,int128,uint256)
        buy_quote_function_selector: fixed_bytes!("67df02ca"),
        tokens: vec![DAI, USDC, USDT],
        gas_schedule: 150_000,
    }]
}

/// Sources that may serve as either hop of a two-hop route.
fn two_hop_source_filter() -> SourceFilters {
    SourceFilters::new(&SELL_SOURCES, &[Source::Native, Source::MultiHop], &[])
}

/// Builds the batched sampler operations for every supported source family.
#[derive(Clone, Debug)]
pub struct SamplerOperations {
    /// Router and quoter addresses
    addresses: ContractAddresses,
    /// Intermediate-token hints
    token_graph: Arc<TokenAdjacencyGraph>,
    /// Known Curve pools
    curve_pools: Vec<CurvePool>,
    /// Registered liquidity providers
    liquidity_providers: Vec<LiquidityProviderInfo>,
}

impl SamplerOperations {
    /// Creates the operation factory for one chain.
    #[must_use]
    pub const fn new(
        addresses: ContractAddresses,
        token_graph: Arc<TokenAdjacencyGraph>,
        curve_pools: Vec<CurvePool>,
        liquidity_providers: Vec<LiquidityProviderInfo>,
    ) -> Self {
        Self {
            addresses,
            token_graph,
            curve_pools,
            liquidity_providers,
        }
    }

    /// Intermediate-token hints.
    #[must_use]
    pub fn token_graph(&self) -> &TokenAdjacencyGraph {
        &self.token_graph
    }

    /// Token decimals, one per token.
    #[must_use]
    pub fn token_decimals(&self, tokens: &[Address]) -> Box<dyn BatchedOperation> {
        let call = IERC20BridgeSampler::getTokenDecimalsCall {
            tokens: tokens.to_vec(),
        };
        Box::new(ContractCallOperation::new("getTokenDecimals", &call, |data| {
            let decimals = IERC20BridgeSampler::getTokenDecimalsCall::abi_decode_returns(data, true)?.decimals;
            Ok(SamplerOutput::Decimals(
                decimals.into_iter().map(|d| d.saturating_to::<u8>()).collect(),
            ))
        }))
    }

    /// The block the batch executes at.
    #[must_use]
    pub fn block_number(&self) -> Box<dyn BatchedOperation> {
        let call = IERC20BridgeSampler::getBlockNumberCall {};
        Box::new(ContractCallOperation::new("getBlockNumber", &call, |data| {
            let block = IERC20BridgeSampler::getBlockNumberCall::abi_decode_returns(data, true)?.blockNumber;
            Ok(SamplerOutput::BlockNumber(block.saturating_to::<u64>()))
        }))
    }

    /// Whether `address` holds code.
    #[must_use]
    pub fn is_address_contract(&self, address: Address) -> Box<dyn BatchedOperation> {
        let call = IERC20BridgeSampler::isContractCall { account: address };
        Box::new(ContractCallOperation::new("isContract", &call, |data| {
            let has_code = IERC20BridgeSampler::isContractCall::abi_decode_returns(data, true)?.hasCode;
            Ok(SamplerOutput::Bool(has_code))
        }))
    }

    /// Fillable taker amounts of `orders`, in order. Orders that cannot be
    /// checked on-chain (none at all, or a lone dummy order) are answered locally.
    #[must_use]
    pub fn limit_order_fillable_taker_amounts(&self, orders: &[SignedNativeOrder]) -> Box<dyn BatchedOperation> {
        if orders.is_empty() {
            return Box::new(ConstantOperation(SamplerOutput::Amounts(Vec::new())));
        }
        if orders.len() == 1 && orders[0].order.maker == Address::ZERO {
            return Box::new(ConstantOperation(SamplerOutput::Amounts(vec![U256::ZERO])));
        }
        let call = IERC20BridgeSampler::getLimitOrderFillableTakerAssetAmountsCall {
            orders: orders
                .iter()
                .map(|o| IERC20BridgeSampler::LimitOrder {
                    makerToken: o.order.maker_token,
                    takerToken: o.order.taker_token,
                    makerAmount: o.order.maker_amount.saturating_to::<u128>(),
                    takerAmount: o.order.taker_amount.saturating_to::<u128>(),
                    takerTokenFeeAmount: o.order.taker_token_fee_amount.saturating_to::<u128>(),
                    maker: o.order.maker,
                    taker: o.order.taker,
                    sender: Address::ZERO,
                    feeRecipient: Address::ZERO,
                    pool: o.order.pool,
                    expiry: o.order.expiry,
                    salt: o.order.salt,
                })
                .collect(),
            orderSignatures: orders
                .iter()
                .map(|o| IERC20BridgeSampler::Signature {
                    signatureType: o.signature.signature_type,
                    v: o.signature.v,
                    r: o.signature.r,
                    s: o.signature.s,
                })
                .collect(),
            exchange: self.addresses.exchange_proxy,
        };
        let count = orders.len();
        Box::new(
            ContractCallOperation::new("getLimitOrderFillableTakerAssetAmounts", &call, |data| {
                let amounts = IERC20BridgeSampler::getLimitOrderFillableTakerAssetAmountsCall::abi_decode_returns(
                    data, true,
                )?
                .orderFillableTakerAssetAmounts;
                Ok(SamplerOutput::Amounts(amounts))
            })
            .with_fallback(SamplerOutput::Amounts(vec![U256::ZERO; count])),
        )
    }

    /// Sell quotes of every allowed source, one curve per route.
    #[must_use]
    pub fn sell_quotes(
        &self,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        taker_fill_amounts: &[U256],
    ) -> Box<dyn BatchedOperation> {
        let ops = self.sell_quote_operations(sources, maker_token, taker_token, taker_fill_amounts, &self.token_graph);
        Self::dex_quotes_batch(ops)
    }

    /// Buy quotes of every allowed source, one curve per route.
    #[must_use]
    pub fn buy_quotes(
        &self,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        maker_fill_amounts: &[U256],
    ) -> Box<dyn BatchedOperation> {
        let ops = self.buy_quote_operations(sources, maker_token, taker_token, maker_fill_amounts, &self.token_graph);
        Self::dex_quotes_batch(ops)
    }

    /// Batches source operations into one operation yielding their curves.
    fn dex_quotes_batch(ops: Vec<SourceQuoteOperation>) -> Box<dyn BatchedOperation> {
        let sub_ops = ops
            .into_iter()
            .map(|op| Box::new(op) as Box<dyn BatchedOperation>)
            .collect();
        Box::new(BatchOperation::new(
            sub_ops,
            |outputs| {
                let quotes = outputs
                    .into_iter()
                    .filter_map(|output| match output {
                        SamplerOutput::DexSamples(samples) => Some(samples),
                        _ => None,
                    })
                    .collect();
                Ok(SamplerOutput::DexQuotes(quotes))
            },
            SamplerOutput::DexQuotes(Vec::new()),
        ))
    }

    /// Best two-hop sells through each intermediate token, at the full amount.
    #[must_use]
    pub fn two_hop_sell_quotes(
        &self,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        sell_amount: U256,
    ) -> Box<dyn BatchedOperation> {
        self.two_hop_quotes(true, sources, maker_token, taker_token, sell_amount)
    }

    /// Best two-hop buys through each intermediate token, at the full amount.
    #[must_use]
    pub fn two_hop_buy_quotes(
        &self,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        buy_amount: U256,
    ) -> Box<dyn BatchedOperation> {
        self.two_hop_quotes(false, sources, maker_token, taker_token, buy_amount)
    }

    /// Two-hop quotes for either side. Hop candidates are encoded with a zero
    /// amount; the sampler contract re-runs them with the real hop amounts.
    fn two_hop_quotes(
        &self,
        is_sell: bool,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        amount: U256,
    ) -> Box<dyn BatchedOperation> {
        let filter = two_hop_source_filter();
        let hop_sources: Vec<Source> = sources.iter().copied().filter(|s| filter.is_allowed(*s)).collect();
        if hop_sources.is_empty() {
            return Box::new(ConstantOperation(SamplerOutput::TwoHopQuotes(Vec::new())));
        }
        let zero = [U256::ZERO];
        let sub_ops: Vec<Box<dyn BatchedOperation>> = self
            .token_graph
            .intermediate_tokens(&maker_token, &taker_token)
            .into_iter()
            .map(|intermediate| {
                let (first, second) = if is_sell {
                    (
                        self.sell_quote_operations(&hop_sources, intermediate, taker_token, &zero, &self.token_graph),
                        self.sell_quote_operations(&hop_sources, maker_token, intermediate, &zero, &self.token_graph),
                    )
                } else {
                    (
                        self.buy_quote_operations(&hop_sources, intermediate, taker_token, &zero, &self.token_graph),
                        self.buy_quote_operations(&hop_sources, maker_token, intermediate, &zero, &self.token_graph),
                    )
                };
                Box::new(TwoHopOperation::new(is_sell, intermediate, first, second, amount)) as Box<dyn BatchedOperation>
            })
            .collect();
        Box::new(BatchOperation::new(
            sub_ops,
            |outputs| {
                let samples = outputs
                    .into_iter()
                    .filter_map(|output| match output {
                        SamplerOutput::TwoHopSample(sample) => sample,
                        _ => None,
                    })
                    .collect();
                Ok(SamplerOutput::TwoHopQuotes(samples))
            },
            SamplerOutput::TwoHopQuotes(Vec::new()),
        ))
    }

    /// Output units of `maker_token` per wei of the native token, taken from the
    /// fee-quote source with the best gas-adjusted price. One when the token is
    /// the native token itself, zero when nothing quotes it.
    #[must_use]
    pub fn best_native_token_sell_rate(
        &self,
        sources: &[Source],
        maker_token: Address,
        native_token: Address,
        native_fill_amount: U256,
        fees: &FeeSchedule,
    ) -> Box<dyn BatchedOperation> {
        if maker_token == native_token {
            return Box::new(ConstantOperation(SamplerOutput::Rate(1.0)));
        }
        let no_hints = TokenAdjacencyGraph::default();
        let ops = self.sell_quote_operations(sources, maker_token, native_token, &[native_fill_amount], &no_hints);
        let fees_per_op: Vec<f64> = ops.iter().map(|op| fees.estimate(op.source(), op.fill_data()).fee).collect();
        let sub_ops = ops
            .into_iter()
            .map(|op| Box::new(op) as Box<dyn BatchedOperation>)
            .collect();
        let native_amount = u256_to_f64(native_fill_amount);
        Box::new(BatchOperation::new(
            sub_ops,
            move |outputs| {
                let best = outputs
                    .into_iter()
                    .zip(&fees_per_op)
                    .filter_map(|(output, fee)| match output {
                        SamplerOutput::DexSamples(samples) => samples
                            .first()
                            .filter(|s| !s.output.is_zero())
                            .map(|s| (u256_to_f64(s.output), *fee)),
                        _ => None,
                    })
                    .map(|(output, fee)| (output / (native_amount + fee), output / native_amount))
                    .max_by(|a, b| a.0.total_cmp(&b.0));
                Ok(SamplerOutput::Rate(best.map_or(0.0, |(_, price)| price)))
            },
            SamplerOutput::Rate(0.0),
        ))
    }

    /// One sell operation per route of every allowed single-hop source.
    #[must_use]
    pub fn sell_quote_operations(
        &self,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        amounts: &[U256],
        token_graph: &TokenAdjacencyGraph,
    ) -> Vec<SourceQuoteOperation> {
        self.quote_operations(true, sources, maker_token, taker_token, amounts, token_graph)
    }

    /// One buy operation per route of every allowed single-hop source.
    #[must_use]
    pub fn buy_quote_operations(
        &self,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        amounts: &[U256],
        token_graph: &TokenAdjacencyGraph,
    ) -> Vec<SourceQuoteOperation> {
        self.quote_operations(false, sources, maker_token, taker_token, amounts, token_graph)
    }

    /// Routes of V2-style and V3 sources: the direct pair plus one route through
    /// each intermediate token.
    fn token_paths(maker_token: Address, taker_token: Address, token_graph: &TokenAdjacencyGraph) -> Vec<Vec<Address>> {
        std::iter::once(vec![taker_token, maker_token])
            .chain(
                token_graph
                    .intermediate_tokens(&maker_token, &taker_token)
                    .into_iter()
                    .map(|t| vec![taker_token, t, maker_token]),
            )
            .collect()
    }

    /// Builds the operations of every allowed source for one side.
    fn quote_operations(
        &self,
        is_sell: bool,
        sources: &[Source],
        maker_token: Address,
        taker_token: Address,
        amounts: &[U256],
        token_graph: &TokenAdjacencyGraph,
    ) -> Vec<SourceQuoteOperation> {
        let mut ops = Vec::new();
        for source in sources {
            match source {
                Source::UniswapV2 | Source::SushiSwap => {
                    let router = if *source == Source::UniswapV2 {
                        self.addresses.uniswap_v2_router
                    } else {
                        self.addresses.sushiswap_router
                    };
                    if router == Address::ZERO {
                        continue;
                    }
                    for path in Self::token_paths(maker_token, taker_token, token_graph) {
                        ops.push(uniswap_v2_operation(is_sell, *source, router, path, amounts.to_vec()));
                    }
                }
                Source::UniswapV3 => {
                    let (quoter, router) = (self.addresses.uniswap_v3_quoter, self.addresses.uniswap_v3_router);
                    if quoter == Address::ZERO || router == Address::ZERO {
                        continue;
                    }
                    for path in Self::token_paths(maker_token, taker_token, token_graph) {
                        ops.push(uniswap_v3_operation(is_sell, quoter, router, path, amounts.to_vec()));
                    }
                }
                Source::Curve => {
                    for pool in &self.curve_pools {
                        let taker_idx = pool.tokens.iter().position(|t| *t == taker_token);
                        let maker_idx = pool.tokens.iter().position(|t| *t == maker_token);
                        if let (Some(from), Some(to)) = (taker_idx, maker_idx) {
                            ops.push(curve_operation(is_sell, pool.clone(), from, to, amounts.to_vec()));
                        }
                    }
                }
                Source::LiquidityProvider => {
                    for provider in &self.liquidity_providers {
                        if provider.tokens.contains(&taker_token) && provider.tokens.contains(&maker_token) {
                            ops.push(liquidity_provider_operation(
                                is_sell,
                                provider,
                                maker_token,
                                taker_token,
                                amounts.to_vec(),
                            ));
                        }
                    }
                }
                Source::Native | Source::MultiHop => {}
            }
        }
        ops
    }
}

/// Samples a V2-style router along `path`.
fn uniswap_v2_operation(
    is_sell: bool,
    source: Source,
    router: Address,
    path: Vec<Address>,
    amounts: Vec<U256>,
) -> SourceQuoteOperation {
    let fill_data = FillData::UniswapV2 {
        router,
        token_address_path: path.clone(),
    };
    if is_sell {
        let call = IERC20BridgeSampler::sampleSellsFromUniswapV2Call {
            router,
            path,
            takerTokenAmounts: amounts.clone(),
        };
        SourceQuoteOperation::new(source, fill_data, &call, amounts, |data| {
            Ok(IERC20BridgeSampler::sampleSellsFromUniswapV2Call::abi_decode_returns(data, true)?.makerTokenAmounts)
        })
    } else {
        let call = IERC20BridgeSampler::sampleBuysFromUniswapV2Call {
            router,
            path,
            makerTokenAmounts: amounts.clone(),
        };
        SourceQuoteOperation::new(source, fill_data, &call, amounts, |data| {
            Ok(IERC20BridgeSampler::sampleBuysFromUniswapV2Call::abi_decode_returns(data, true)?.takerTokenAmounts)
        })
    }
}

/// Samples the Uniswap V3 quoter along `path`. Each sample carries the pool
/// path and gas the quoter chose for its amount.
fn uniswap_v3_operation(
    is_sell: bool,
    quoter: Address,
    router: Address,
    path: Vec<Address>,
    amounts: Vec<U256>,
) -> SourceQuoteOperation {
    let fill_data = FillData::UniswapV3 {
        router,
        token_address_path: path.clone(),
        uniswap_path: Bytes::new(),
        gas_used: 0,
    };
    let inputs = amounts.clone();
    let token_path = path.clone();
    let to_samples = move |paths: Vec<Bytes>, gas_used: Vec<U256>, outputs: Vec<U256>| -> Vec<DexSample> {
        inputs
            .iter()
            .zip(paths)
            .zip(gas_used)
            .zip(outputs)
            .map(|(((input, uniswap_path), gas), output)| DexSample {
                source: Source::UniswapV3,
                fill_data: FillData::UniswapV3 {
                    router,
                    token_address_path: token_path.clone(),
                    uniswap_path,
                    gas_used: gas.saturating_to::<u64>(),
                },
                input: *input,
                output,
            })
            .collect()
    };
    if is_sell {
        let call = IERC20BridgeSampler::sampleSellsFromUniswapV3Call {
            quoter,
            path,
            takerTokenAmounts: amounts,
        };
        SourceQuoteOperation::with_decoder(Source::UniswapV3, fill_data, &call, move |data| {
            let r = IERC20BridgeSampler::sampleSellsFromUniswapV3Call::abi_decode_returns(data, true)?;
            Ok(to_samples(r.uniswapPaths, r.uniswapGasUsed, r.makerTokenAmounts))
        })
    } else {
        let call = IERC20BridgeSampler::sampleBuysFromUniswapV3Call {
            quoter,
            path,
            makerTokenAmounts: amounts,
        };
        SourceQuoteOperation::with_decoder(Source::UniswapV3, fill_data, &call, move |data| {
            let r = IERC20BridgeSampler::sampleBuysFromUniswapV3Call::abi_decode_returns(data, true)?;
            Ok(to_samples(r.uniswapPaths, r.uniswapGasUsed, r.takerTokenAmounts))
        })
    }
}

/// Samples a Curve pool between the coins at `from` and `to`.
fn curve_operation(is_sell: bool, pool: CurvePool, from: usize, to: usize, amounts: Vec<U256>) -> SourceQuoteOperation {
    let curve_info = IERC20BridgeSampler::CurveInfo {
        poolAddress: pool.pool_address,
        sellQuoteFunctionSelector: pool.sell_quote_function_selector,
        buyQuoteFunctionSelector: pool.buy_quote_function_selector,
    };
    let (from_idx, to_idx) = (i128::try_from(from).unwrap_or_default(), i128::try_from(to).unwrap_or_default());
    let fill_data = FillData::Curve {
        pool,
        from_token_idx: from_idx,
        to_token_idx: to_idx,
    };
    if is_sell {
        let call = IERC20BridgeSampler::sampleSellsFromCurveCall {
            curveInfo: curve_info,
            fromTokenIdx: from_idx,
            toTokenIdx: to_idx,
            takerTokenAmounts: amounts.clone(),
        };
        SourceQuoteOperation::new(Source::Curve, fill_data, &call, amounts, |data| {
            Ok(IERC20BridgeSampler::sampleSellsFromCurveCall::abi_decode_returns(data, true)?.makerTokenAmounts)
        })
    } else {
        let call = IERC20BridgeSampler::sampleBuysFromCurveCall {
            curveInfo: curve_info,
            fromTokenIdx: from_idx,
            toTokenIdx: to_idx,
            makerTokenAmounts: amounts.clone(),
        };
        SourceQuoteOperation::new(Source::Curve, fill_data, &call, amounts, |data| {
            Ok(IERC20BridgeSampler::sampleBuysFromCurveCall::abi_decode_returns(data, true)?.takerTokenAmounts)
        })
    }
}

/// Samples a registered liquidity provider.
fn liquidity_provider_operation(
    is_sell: bool,
    provider: &LiquidityProviderInfo,
    maker_token: Address,
    taker_token: Address,
    amounts: Vec<U256>,
) -> SourceQuoteOperation {
    let fill_data = FillData::LiquidityProvider {
        pool_address: provider.provider_address,
        gas_cost: provider.gas_cost,
    };
    if is_sell {
        let call = IERC20BridgeSampler::sampleSellsFromLiquidityProviderCall {
            providerAddress: provider.provider_address,
            takerToken: taker_token,
            makerToken: maker_token,
            takerTokenAmounts: amounts.clone(),
        };
        SourceQuoteOperation::new(Source::LiquidityProvider, fill_data, &call, amounts, |data| {
            Ok(IERC20BridgeSampler::sampleSellsFromLiquidityProviderCall::abi_decode_returns(data, true)?
                .makerTokenAmounts)
        })
    } else {
        let call = IERC20BridgeSampler::sampleBuysFromLiquidityProviderCall {
            providerAddress: provider.provider_address,
            takerToken: taker_token,
            makerToken: maker_token,
            makerTokenAmounts: amounts.clone(),
        };
        SourceQuoteOperation::new(Source::LiquidityProvider, fill_data, &call, amounts, |data| {
            Ok(IERC20BridgeSampler::sampleBuysFromLiquidityProviderCall::abi_decode_returns(data, true)?
                .takerTokenAmounts)
        })
    }
}
