//! Best and worst case amounts of a path, and where its liquidity comes from.
//!
//! Native and bridge orders are simulated together as one group; every two-hop
//! order is its own group. Group results are summed into one quote info.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use eyre::{bail, Result};
use serde::Serialize;

use super::simulation::{simulate_best_case_fill, simulate_worst_case_fill, QuoteFillInfo, QuoteFillResult};
use crate::market::fill_data::{FillData, HopSource, MultiHopFillData};
use crate::market::order::{OptimizedOrder, OptimizedOrdersByType, TwoHopOrder};
use crate::market::side::Side;
use crate::market::source::Source;
use crate::optimizer::fees::GasSchedule;
use crate::utils::math::{ratio, scale_amount, Rounding};

/// Amounts the taker can expect from a quote.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuoteInfo {
    /// Maker token received, fees included
    pub maker_amount: U256,
    /// Taker token sold, fees excluded
    pub taker_amount: U256,
    /// Taker token sold, fees included
    pub total_taker_amount: U256,
    /// Taker fees paid in the taker token
    pub fee_taker_token_amount: U256,
    /// Protocol fee in wei
    pub protocol_fee_in_wei_amount: U256,
    /// Estimated gas
    pub gas: u64,
    /// Slippage this info was computed with
    pub slippage: f64,
}

impl SwapQuoteInfo {
    /// An empty info computed with `slippage`.
    #[must_use]
    pub fn zero(slippage: f64) -> Self {
        Self {
            slippage,
            ..Self::default()
        }
    }

    /// Sums two infos.
    ///
    /// # Errors
    ///
    /// Returns an error if the two infos were computed with different slippage.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        if (self.slippage - other.slippage).abs() > f64::EPSILON {
            bail!("slippage mismatch while merging quote info groups");
        }
        Ok(Self {
            maker_amount: self.maker_amount.saturating_add(other.maker_amount),
            taker_amount: self.taker_amount.saturating_add(other.taker_amount),
            total_taker_amount: self.total_taker_amount.saturating_add(other.total_taker_amount),
            fee_taker_token_amount: self.fee_taker_token_amount.saturating_add(other.fee_taker_token_amount),
            protocol_fee_in_wei_amount: self
                .protocol_fee_in_wei_amount
                .saturating_add(other.protocol_fee_in_wei_amount),
            gas: self.gas + other.gas,
            slippage: self.slippage,
        })
    }

    fn from_fill_result(result: &QuoteFillResult, slippage: f64) -> Self {
        Self {
            maker_amount: result.total_maker_amount,
            taker_amount: result.taker_amount,
            total_taker_amount: result.total_taker_amount,
            fee_taker_token_amount: result.taker_fee_taker_amount,
            protocol_fee_in_wei_amount: result.protocol_fee_amount,
            gas: result.gas,
            slippage,
        }
    }
}

/// Share of a two-hop route in a quote.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiHopBreakdown {
    /// Fraction of the filled amount routed this way
    pub proportion: f64,
    /// Token the route passes through
    pub intermediate_token: Address,
    /// First and second hop sources
    pub hops: [Source; 2],
}

/// Where the liquidity of a quote comes from. Proportions sum to one.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakdown {
    /// Fraction of the filled amount per single-hop source
    pub single_source: BTreeMap<Source, f64>,
    /// Two-hop routes
    pub multihop: Vec<MultiHopBreakdown>,
}

impl SourceBreakdown {
    /// Sum of all proportions; one for a non-empty quote.
    #[must_use]
    pub fn total_proportion(&self) -> f64 {
        self.single_source.values().sum::<f64>() + self.multihop.iter().map(|m| m.proportion).sum::<f64>()
    }
}

/// Result of [`calculate_quote_info`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteInfo {
    /// Amounts without slippage
    pub best_case_quote_info: SwapQuoteInfo,
    /// Amounts after slippage
    pub worst_case_quote_info: SwapQuoteInfo,
    /// Where the liquidity comes from
    pub source_breakdown: SourceBreakdown,
}

/// Best and worst case of one independently simulated group of orders.
struct GroupQuoteInfo {
    best: SwapQuoteInfo,
    worst: SwapQuoteInfo,
}

/// Computes best and worst case amounts of a path's orders and its source breakdown.
///
/// # Arguments
///
/// * `orders` - The path's orders, grouped by type
/// * `side` - Sell or buy
/// * `asset_fill_amount` - The requested amount
/// * `gas_price` - Gas price in wei
/// * `gas_schedule` - Gas consumed per source
/// * `slippage` - Slippage applied to the worst case
///
/// # Errors
///
/// Returns an error if the groups cannot be merged.
pub fn calculate_quote_info(
    orders: &OptimizedOrdersByType,
    side: Side,
    asset_fill_amount: U256,
    gas_price: U256,
    gas_schedule: &GasSchedule,
    slippage: f64,
) -> Result<QuoteInfo> {
    let single_hop_orders: Vec<OptimizedOrder> = orders
        .native_orders
        .iter()
        .chain(&orders.bridge_orders)
        .cloned()
        .collect();

    let mut groups = Vec::with_capacity(1 + orders.two_hop_orders.len());
    let mut fill_amount_by_source = BTreeMap::new();
    if !single_hop_orders.is_empty() {
        let fill_amount = single_hop_orders
            .iter()
            .fold(U256::ZERO, |acc, o| acc.saturating_add(order_fill_amount(o, side)))
            .min(asset_fill_amount);
        let info = QuoteFillInfo {
            orders: &single_hop_orders,
            fill_amount,
            gas_price,
            side,
            gas_schedule,
            slippage,
        };
        let best = simulate_best_case_fill(&info);
        let worst = simulate_worst_case_fill(&info);
        fill_amount_by_source.clone_from(&best.fill_amount_by_source);
        groups.push(GroupQuoteInfo {
            best: SwapQuoteInfo::from_fill_result(&best, 0.0),
            worst: SwapQuoteInfo::from_fill_result(&worst, slippage),
        });
    }
    groups.extend(
        orders
            .two_hop_orders
            .iter()
            .map(|o| two_hop_quote_info(o, side, gas_schedule, slippage)),
    );

    let mut best_case_quote_info = SwapQuoteInfo::zero(0.0);
    let mut worst_case_quote_info = SwapQuoteInfo::zero(slippage);
    for group in &groups {
        best_case_quote_info = best_case_quote_info.merge(&group.best)?;
        worst_case_quote_info = worst_case_quote_info.merge(&group.worst)?;
    }

    Ok(QuoteInfo {
        best_case_quote_info,
        worst_case_quote_info,
        source_breakdown: source_breakdown(&fill_amount_by_source, &orders.two_hop_orders, side),
    })
}

/// The part of an order the requested amount is denominated in.
const fn order_fill_amount(order: &OptimizedOrder, side: Side) -> U256 {
    match side {
        Side::Sell => order.taker_amount,
        Side::Buy => order.maker_amount,
    }
}

/// The hop sources of a two-hop order.
fn multi_hop_fill_data(order: &TwoHopOrder) -> MultiHopFillData {
    let first = &order.first_hop_order;
    let second = &order.second_hop_order;
    MultiHopFillData {
        first_hop_source: HopSource {
            source: first.source,
            fill_data: first.fill_data.clone(),
        },
        second_hop_source: HopSource {
            source: second.source,
            fill_data: second.fill_data.clone(),
        },
        intermediate_token: second.taker_token,
    }
}

/// The best case takes the amounts the route was sampled at. The worst case
/// only slips the amount decided at execution time: the maker amount for
/// sells, the taker amount for buys.
fn two_hop_quote_info(order: &TwoHopOrder, side: Side, gas_schedule: &GasSchedule, slippage: f64) -> GroupQuoteInfo {
    let first = &order.first_hop_order;
    let second = &order.second_hop_order;
    let gas = gas_schedule.gas(Source::MultiHop, &FillData::MultiHop(Box::new(multi_hop_fill_data(order))));
    let (maker_amount, taker_amount) = (second.maker_amount, first.taker_amount);
    let (worst_maker_amount, worst_taker_amount) = match side {
        Side::Sell => (scale_amount(maker_amount, 1.0 - slippage, Rounding::Down), taker_amount),
        Side::Buy => (maker_amount, scale_amount(taker_amount, 1.0 + slippage, Rounding::Up)),
    };
    GroupQuoteInfo {
        best: SwapQuoteInfo {
            maker_amount,
            taker_amount,
            total_taker_amount: taker_amount,
            gas,
            ..SwapQuoteInfo::zero(0.0)
        },
        worst: SwapQuoteInfo {
            maker_amount: worst_maker_amount,
            taker_amount: worst_taker_amount,
            total_taker_amount: worst_taker_amount,
            gas,
            ..SwapQuoteInfo::zero(slippage)
        },
    }
}

fn source_breakdown(
    fill_amount_by_source: &BTreeMap<Source, U256>,
    two_hop_orders: &[TwoHopOrder],
    side: Side,
) -> SourceBreakdown {
    let two_hop_amounts: Vec<U256> = two_hop_orders
        .iter()
        .map(|o| match side {
            Side::Sell => o.first_hop_order.taker_amount,
            Side::Buy => o.second_hop_order.maker_amount,
        })
        .collect();
    let total = fill_amount_by_source
        .values()
        .chain(&two_hop_amounts)
        .fold(U256::ZERO, |acc, a| acc.saturating_add(*a));
    if total.is_zero() {
        return SourceBreakdown::default();
    }

    SourceBreakdown {
        single_source: fill_amount_by_source
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(source, amount)| (*source, ratio(*amount, total)))
            .collect(),
        multihop: two_hop_orders
            .iter()
            .zip(&two_hop_amounts)
            .map(|(order, amount)| MultiHopBreakdown {
                proportion: ratio(*amount, total),
                intermediate_token: order.second_hop_order.taker_token,
                hops: [order.first_hop_order.source, order.second_hop_order.source],
            })
            .collect(),
    }
}
