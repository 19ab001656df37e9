//! # Optimizer Module
//!
//! Picks the path filling a requested amount best, net of gas and the
//! exchange-proxy overhead, from one liquidity snapshot.
//!
//! Every sampled curve, two-hop sample and native order is turned into a
//! curve of fills on one value axis (adjusted output), the router splits the
//! amount over those curves, and the resulting path competes against the best
//! path restricted to VIP sources, which settle with far less overhead.

/// Gas schedule, fees and the fill adjustment hook
pub mod fees;
/// Chunked allocation over curves
pub mod router;

use alloy::primitives::U256;

use crate::market::fill::{dex_sample_to_fill, native_order_to_fill, two_hop_sample_to_fill, Fill};
use crate::market::liquidity::MarketSideLiquidity;
use crate::market::order::NativeOrderKind;
use crate::market::path::{Path, PathContext, PathPenaltyOpts};
use crate::market::source::Source;
use crate::utils::constants::{NATIVE_ORDER_CURVE_POINTS, VIP_SOURCES};
use fees::{ExchangeProxyOverhead, FeeSchedule, FillAdjustor};
use router::{linear_curve, prepare_dex_curve, route};

/// Cost model and tuning of one optimization pass.
#[derive(Clone, Copy)]
pub struct OptimizerOpts<'a> {
    /// Gas price and per-source gas
    pub fee_schedule: &'a FeeSchedule,
    /// Route-composition overhead
    pub exchange_proxy_overhead: ExchangeProxyOverhead,
    /// Chunks the requested amount is split into
    pub router_num_samples: usize,
    /// Rescales fills before routing
    pub fill_adjustor: &'a dyn FillAdjustor,
}

/// Candidate curves, with the subset settling through a VIP entry point.
#[derive(Default)]
struct Curves {
    all: Vec<Vec<Fill>>,
    vip: Vec<Vec<Fill>>,
}

impl Curves {
    fn push(&mut self, curve: Vec<Fill>, is_vip: bool) {
        if curve.is_empty() {
            return;
        }
        if is_vip {
            self.vip.push(curve.clone());
        }
        self.all.push(curve);
    }
}

/// Finds the best path for `liquidity`.
///
/// Returns `None` when the requested amount is at most one base unit or no
/// combination of the allowed sources covers it.
#[must_use]
pub fn find_optimal_path(liquidity: &MarketSideLiquidity, opts: &OptimizerOpts<'_>) -> Option<Path> {
    let side = liquidity.side;
    let amount = liquidity.input_amount;
    if amount <= U256::from(1) {
        return None;
    }
    let curves = candidate_curves(liquidity, opts);
    log::debug!(
        "optimizer: routing {amount} over {} curves ({} vip)",
        curves.all.len(),
        curves.vip.len()
    );

    let context = PathContext {
        side,
        input_token: liquidity.input_token,
        output_token: liquidity.output_token,
    };
    let penalty_opts = PathPenaltyOpts {
        eth_rates: liquidity.eth_rates,
        gas_price: opts.fee_schedule.gas_price(),
        exchange_proxy_overhead: opts.exchange_proxy_overhead,
    };
    let create_path = |candidates: &[Vec<Fill>]| {
        route(side, candidates, amount, opts.router_num_samples)
            .map(|fills| Path::create(context, fills, amount, penalty_opts))
    };

    let optimal = create_path(&curves.all);
    // identical candidate sets give identical routes
    let vip = if curves.vip.is_empty() || curves.vip.len() == curves.all.len() {
        None
    } else {
        create_path(&curves.vip)
    };

    match (optimal, vip) {
        (Some(optimal), Some(vip)) => Some(if vip.is_adjusted_better_than(&optimal) { vip } else { optimal }),
        (optimal, vip) => optimal.or(vip),
    }
}

/// Turns the snapshot into routable curves, dropping sources the request may
/// not use.
fn candidate_curves(liquidity: &MarketSideLiquidity, opts: &OptimizerOpts<'_>) -> Curves {
    let side = liquidity.side;
    let amount = liquidity.input_amount;
    let rates = liquidity.eth_rates;
    let filters = &liquidity.quote_source_filters;
    let fees = opts.fee_schedule;
    let mut curves = Curves::default();

    for (i, samples) in liquidity.quotes.dex_quotes.iter().enumerate() {
        let Some(source) = samples.first().map(|s| s.source) else {
            continue;
        };
        if !filters.is_allowed(source) {
            continue;
        }
        let source_path_id = format!("{source}-{i}");
        let fills = samples
            .iter()
            .map(|s| dex_sample_to_fill(side, s, &source_path_id, rates, fees))
            .collect();
        let fills = opts.fill_adjustor.adjust_fills(side, fills, amount);
        if let Some(curve) = prepare_dex_curve(fills) {
            curves.push(curve, VIP_SOURCES.contains(&source));
        }
    }

    if filters.is_allowed(Source::MultiHop) {
        for sample in liquidity.quotes.two_hop_quotes.iter().filter(|s| !s.output.is_zero()) {
            let fill = two_hop_sample_to_fill(side, sample, rates, fees);
            for fill in opts.fill_adjustor.adjust_fills(side, vec![fill], amount) {
                curves.push(linear_curve(side, &fill, NATIVE_ORDER_CURVE_POINTS), false);
            }
        }
    }

    if filters.is_allowed(Source::Native) {
        let indicative = liquidity.quotes.rfqt_indicative_quotes.iter().map(|q| q.to_native_order());
        let native_orders = liquidity.quotes.native_orders.iter().cloned().chain(indicative);
        for order in native_orders {
            let Some(fill) = native_order_to_fill(side, &order, Some(amount), rates, fees, true) else {
                continue;
            };
            let is_vip = order.kind != NativeOrderKind::Limit;
            for fill in opts.fill_adjustor.adjust_fills(side, vec![fill], amount) {
                curves.push(linear_curve(side, &fill, NATIVE_ORDER_CURVE_POINTS), is_vip);
            }
        }
    }
    curves
}
