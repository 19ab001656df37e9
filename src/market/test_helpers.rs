use alloy::primitives::{keccak256, Address, Bytes, FixedBytes, U256};

use super::fill::{dex_sample_to_fill, native_order_to_fill, two_hop_sample_to_fill, EthRates, Fill};
use super::fill_data::{CurvePool, FillData, HopSource, MultiHopFillData};
use super::liquidity::{DexSample, MarketSideLiquidity, RawQuotes};
use super::order::{NativeOrder, NativeOrderKind, Signature, SignedNativeOrder};
use super::path::{PathContext, PathPenaltyOpts};
use super::side::Side;
use super::source::{Source, SourceFilters};
use crate::optimizer::fees::{ExchangeProxyOverhead, FeeSchedule, GasSchedule};

#[allow(dead_code)]
pub fn address_from_str(name: &str) -> Address {
    Address::from_word(keccak256(name.as_bytes()))
}

#[allow(dead_code)]
pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10).pow(U256::from(18))
}

#[allow(dead_code)]
pub fn uniswap_v2_fill_data(path: &[&str]) -> FillData {
    FillData::UniswapV2 {
        router: address_from_str("uniswap-v2-router"),
        token_address_path: path.iter().map(|t| address_from_str(t)).collect(),
    }
}

#[allow(dead_code)]
pub fn uniswap_v3_fill_data(gas_used: u64) -> FillData {
    FillData::UniswapV3 {
        router: address_from_str("uniswap-v3-router"),
        token_address_path: vec![address_from_str("A"), address_from_str("B")],
        uniswap_path: Bytes::new(),
        gas_used,
    }
}

#[allow(dead_code)]
pub fn curve_fill_data(gas_schedule: u64) -> FillData {
    FillData::Curve {
        pool: CurvePool {
            pool_address: address_from_str("curve-pool"),
            sell_quote_function_selector: FixedBytes([0x5e, 0x0d, 0x44, 0x3f]),
            buy_quote_function_selector: FixedBytes([0x67, 0xdf, 0x02, 0xca]),
            tokens: vec![address_from_str("A"), address_from_str("B")],
            gas_schedule,
        },
        from_token_idx: 0,
        to_token_idx: 1,
    }
}

#[allow(dead_code)]
pub fn liquidity_provider_fill_data(gas_cost: u64) -> FillData {
    FillData::LiquidityProvider {
        pool_address: address_from_str("liquidity-provider"),
        gas_cost,
    }
}

#[allow(dead_code)]
pub fn fill_data_for(source: Source) -> FillData {
    match source {
        Source::UniswapV3 => uniswap_v3_fill_data(100_000),
        Source::Curve => curve_fill_data(0),
        Source::LiquidityProvider => liquidity_provider_fill_data(0),
        _ => uniswap_v2_fill_data(&["A", "B"]),
    }
}

/// A gas schedule with round numbers: 100k per bridge, 50k per native order,
/// 242k per two-hop route.
#[allow(dead_code)]
pub fn fake_gas_schedule() -> GasSchedule {
    GasSchedule::flat(100_000)
        .with_override(Source::Native, 50_000)
        .with_override(Source::MultiHop, 242_000)
}

#[allow(dead_code)]
pub fn native_order(kind: NativeOrderKind, maker_amount: u64, taker_amount: u64) -> SignedNativeOrder {
    SignedNativeOrder {
        kind,
        order: NativeOrder {
            maker_token: address_from_str("B"),
            taker_token: address_from_str("A"),
            maker_amount: U256::from(maker_amount),
            taker_amount: U256::from(taker_amount),
            maker: address_from_str("maker"),
            salt: U256::from(maker_amount ^ taker_amount),
            expiry: u64::MAX,
            ..NativeOrder::default()
        },
        signature: Signature::invalid(),
    }
}

#[allow(dead_code)]
pub fn dex_sample(source: Source, input: u64, output: u64) -> DexSample {
    DexSample {
        source,
        fill_data: fill_data_for(source),
        input: U256::from(input),
        output: U256::from(output),
    }
}

#[allow(dead_code)]
pub fn dex_curve(source: Source, points: &[(u64, u64)]) -> Vec<DexSample> {
    points
        .iter()
        .map(|(input, output)| dex_sample(source, *input, *output))
        .collect()
}

#[allow(dead_code)]
pub fn two_hop_sample(first: Source, second: Source, input: u64, output: u64) -> DexSample {
    DexSample {
        source: Source::MultiHop,
        fill_data: FillData::MultiHop(Box::new(MultiHopFillData {
            first_hop_source: HopSource {
                source: first,
                fill_data: fill_data_for(first),
            },
            second_hop_source: HopSource {
                source: second,
                fill_data: fill_data_for(second),
            },
            intermediate_token: address_from_str("C"),
        })),
        input: U256::from(input),
        output: U256::from(output),
    }
}

#[allow(dead_code)]
pub fn zero_fees() -> FeeSchedule {
    FeeSchedule::new(U256::ZERO, GasSchedule::default())
}

#[allow(dead_code)]
pub fn bridge_fill(source: Source, input: u64, output: u64) -> Fill {
    dex_sample_to_fill(
        Side::Sell,
        &dex_sample(source, input, output),
        &format!("{source}-0"),
        EthRates::default(),
        &zero_fees(),
    )
}

#[allow(dead_code)]
pub fn two_hop_fill(first: Source, second: Source, input: u64, output: u64) -> Fill {
    two_hop_sample_to_fill(
        Side::Sell,
        &two_hop_sample(first, second, input, output),
        EthRates::default(),
        &zero_fees(),
    )
}

/// A sell fill of a native order taking `input` of A for `output` of B.
#[allow(dead_code)]
pub fn native_fill(kind: NativeOrderKind, input: u64, output: u64) -> Fill {
    let order = native_order(kind, output, input).with_fillable_taker_amount(U256::from(input));
    native_order_to_fill(Side::Sell, &order, None, EthRates::default(), &zero_fees(), false)
        .unwrap_or_else(|| unreachable!("native fill of an empty order"))
}

#[allow(dead_code)]
pub fn sell_context() -> PathContext {
    PathContext {
        side: Side::Sell,
        input_token: address_from_str("A"),
        output_token: address_from_str("B"),
    }
}

#[allow(dead_code)]
pub fn buy_context() -> PathContext {
    PathContext {
        side: Side::Buy,
        input_token: address_from_str("A"),
        output_token: address_from_str("B"),
    }
}

#[allow(dead_code)]
pub fn zero_penalty_opts() -> PathPenaltyOpts {
    PathPenaltyOpts {
        eth_rates: EthRates::default(),
        gas_price: U256::ZERO,
        exchange_proxy_overhead: ExchangeProxyOverhead::zero(),
    }
}

/// Liquidity for trading token A against token B: sells sell A for B, buys buy
/// A with B.
#[allow(dead_code)]
pub fn market_side_liquidity(side: Side, amount: u64, dex_quotes: Vec<Vec<DexSample>>) -> MarketSideLiquidity {
    MarketSideLiquidity {
        side,
        input_amount: U256::from(amount),
        input_token: address_from_str("A"),
        output_token: address_from_str("B"),
        eth_rates: EthRates::default(),
        quote_source_filters: SourceFilters::new(&[], &[], &[]),
        maker_token_decimals: 18,
        taker_token_decimals: 18,
        quotes: RawQuotes {
            dex_quotes,
            ..RawQuotes::default()
        },
        is_rfq_supported: true,
        block_number: 1,
    }
}
