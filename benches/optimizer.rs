use alloy::primitives::{Address, U256};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use swap_quoter::market::fill::EthRates;
use swap_quoter::market::fill_data::FillData;
use swap_quoter::market::{DexSample, MarketSideLiquidity, RawQuotes, Side, Source, SourceFilters};
use swap_quoter::optimizer::fees::{ExchangeProxyOverhead, FeeSchedule, GasSchedule, IdentityFillAdjustor};
use swap_quoter::optimizer::{find_optimal_path, OptimizerOpts};
use swap_quoter::sampler::get_sample_amounts;
use swap_quoter::utils::constants::{
    DEFAULT_NUM_SAMPLES, DEFAULT_ROUTER_NUM_SAMPLES, DEFAULT_SAMPLE_DISTRIBUTION_BASE, VIP_SOURCES,
};

const BRIDGE_SOURCES: [Source; 2] = [Source::UniswapV2, Source::SushiSwap];

fn token(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Constant-product curves with random reserves, sampled like the sampler does.
fn generate_liquidity(curve_count: usize, amount: U256) -> MarketSideLiquidity {
    let mut rng = rand::rng();
    let amounts = get_sample_amounts(amount, DEFAULT_NUM_SAMPLES, DEFAULT_SAMPLE_DISTRIBUTION_BASE);
    let dex_quotes = (0..curve_count)
        .map(|i| {
            let source = BRIDGE_SOURCES[i % BRIDGE_SOURCES.len()];
            let reserve_in = U256::from(rng.random_range(1_000_000_u64..10_000_000));
            let reserve_out = U256::from(rng.random_range(1_000_000_u64..10_000_000));
            amounts
                .iter()
                .map(|input| DexSample {
                    source,
                    fill_data: FillData::UniswapV2 {
                        router: token(0xee),
                        token_address_path: vec![token(1), token(2)],
                    },
                    input: *input,
                    output: reserve_out * *input / (reserve_in + *input),
                })
                .collect()
        })
        .collect();

    MarketSideLiquidity {
        side: Side::Sell,
        input_amount: amount,
        input_token: token(1),
        output_token: token(2),
        eth_rates: EthRates {
            output_amount_per_eth: 1.0,
            input_amount_per_eth: 1.0,
        },
        quote_source_filters: SourceFilters::new(&[], &[], &[]),
        maker_token_decimals: 18,
        taker_token_decimals: 18,
        quotes: RawQuotes {
            dex_quotes,
            ..RawQuotes::default()
        },
        is_rfq_supported: false,
        block_number: 1,
    }
}

fn bench_find_optimal_path(c: &mut Criterion) {
    let fees = FeeSchedule::new(U256::from(1), GasSchedule::default());
    let opts = OptimizerOpts {
        fee_schedule: &fees,
        exchange_proxy_overhead: ExchangeProxyOverhead::with_vip_sources(&VIP_SOURCES),
        router_num_samples: DEFAULT_ROUTER_NUM_SAMPLES,
        fill_adjustor: &IdentityFillAdjustor,
    };
    let amount = U256::from(2_000_000);

    let mut group = c.benchmark_group("find_optimal_path");
    for curve_count in [2, 8, 32] {
        let liquidity = generate_liquidity(curve_count, amount);
        group.bench_with_input(BenchmarkId::from_parameter(curve_count), &liquidity, |b, liquidity| {
            b.iter(|| find_optimal_path(black_box(liquidity), black_box(&opts)));
        });
    }
    group.finish();
}

fn bench_sample_amounts(c: &mut Criterion) {
    c.bench_function("get_sample_amounts", |b| {
        b.iter(|| {
            get_sample_amounts(
                black_box(U256::from(10).pow(U256::from(24))),
                DEFAULT_NUM_SAMPLES,
                DEFAULT_SAMPLE_DISTRIBUTION_BASE,
            )
        });
    });
}

criterion_group!(benches, bench_find_optimal_path, bench_sample_amounts);
criterion_main!(benches);
