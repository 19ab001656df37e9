//! The optimizer's result: an ordered set of fills and the orders settling them.

use alloy::primitives::{Address, U256};
use eyre::{bail, Result};
use serde::Serialize;

use super::fill::{EthRates, Fill};
use super::fill_data::FillData;
use super::order::{OptimizedOrder, OptimizedOrdersByType, OrderType, TwoHopOrder};
use super::side::Side;
use super::source::{Source, SourceFlags};
use crate::optimizer::fees::ExchangeProxyOverhead;
use crate::utils::constants::MAX_UINT256;
use crate::utils::math::{scale_amount, u256_to_f64, Rounding};

/// Side and tokens a path is built for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathContext {
    /// Sell or buy
    pub side: Side,
    /// Token the requested amount is denominated in
    pub input_token: Address,
    /// Token the path produces
    pub output_token: Address,
}

impl PathContext {
    /// Returns `(maker_token, taker_token)`.
    #[must_use]
    pub const fn maker_taker_tokens(&self) -> (Address, Address) {
        self.side.maker_taker(self.input_token, self.output_token)
    }
}

/// What it costs to settle a path on top of its fills.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPenaltyOpts {
    /// ETH prices of the input and output tokens
    pub eth_rates: EthRates,
    /// Gas price in wei
    pub gas_price: U256,
    /// Route-composition overhead
    pub exchange_proxy_overhead: ExchangeProxyOverhead,
}

/// Input and (adjusted) output of a path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PathSize {
    /// Input amount
    pub input: f64,
    /// Output amount net of fill penalties
    pub output: f64,
}

/// An ordered combination of fills for one requested amount.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    /// Side and tokens
    context: PathContext,
    /// Fills in execution order
    fills: Vec<Fill>,
    /// Orders created from the fills
    orders: Vec<OptimizedOrder>,
    /// Requested amount
    target_input: U256,
    /// Settlement cost model
    #[serde(skip)]
    penalty_opts: PathPenaltyOpts,
    /// Union of all fill flags
    #[serde(skip)]
    source_flags: SourceFlags,
    /// Size of the path clipped to the target
    #[serde(skip)]
    adjusted_size: PathSize,
}

impl Path {
    /// Creates a path from fills, deriving its orders and adjusted size.
    #[must_use]
    pub fn create(context: PathContext, fills: Vec<Fill>, target_input: U256, penalty_opts: PathPenaltyOpts) -> Self {
        let source_flags = SourceFlags::merge(fills.iter().map(|f| f.flags));
        let orders = create_orders(&fills, &context);
        let adjusted_size = create_adjusted_size(target_input, &fills);
        Self {
            context,
            fills,
            orders,
            target_input,
            penalty_opts,
            source_flags,
            adjusted_size,
        }
    }

    /// Side and tokens.
    #[must_use]
    pub const fn context(&self) -> &PathContext {
        &self.context
    }

    /// Fills in execution order.
    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Orders in execution order; a two-hop fill contributes two orders.
    #[must_use]
    pub fn orders(&self) -> &[OptimizedOrder] {
        &self.orders
    }

    /// Requested amount.
    #[must_use]
    pub const fn target_input(&self) -> U256 {
        self.target_input
    }

    /// Union of the flags of every fill.
    #[must_use]
    pub const fn source_flags(&self) -> SourceFlags {
        self.source_flags
    }

    /// Total input of all fills.
    #[must_use]
    pub fn total_input(&self) -> U256 {
        self.fills.iter().fold(U256::ZERO, |acc, f| acc.saturating_add(f.input))
    }

    /// Returns `true` if any fill routes through an intermediate token.
    #[must_use]
    pub const fn has_two_hop(&self) -> bool {
        self.source_flags.contains(Source::MultiHop.flag())
    }

    /// Orders grouped by how they settle.
    #[must_use]
    pub fn orders_by_type(&self) -> OptimizedOrdersByType {
        group_orders(self.orders.iter().cloned())
    }

    /// Orders with `max_slippage` applied to bridge amounts; native orders are
    /// unchanged, as are `MAX_UINT256` placeholders.
    ///
    /// Sells scale the maker amount down by `1 - s` (rounded down), buys scale the
    /// taker amount up by `1 + s` (rounded up).
    ///
    /// # Errors
    ///
    /// Returns an error if `max_slippage` is outside `[0, 1]`.
    pub fn slipped_orders(&self, max_slippage: f64) -> Result<Vec<OptimizedOrder>> {
        if !(0.0..=1.0).contains(&max_slippage) {
            bail!("slippage must be [0, 1]. Given: {max_slippage}");
        }
        Ok(self
            .orders
            .iter()
            .map(|order| {
                if order.source == Source::Native || max_slippage <= 0.0 {
                    return order.clone();
                }
                let mut slipped = order.clone();
                match self.context.side {
                    Side::Sell if order.maker_amount != MAX_UINT256 => {
                        slipped.maker_amount = scale_amount(order.maker_amount, 1.0 - max_slippage, Rounding::Down);
                    }
                    Side::Buy if order.taker_amount != MAX_UINT256 => {
                        slipped.taker_amount = scale_amount(order.taker_amount, 1.0 + max_slippage, Rounding::Up);
                    }
                    _ => {}
                }
                slipped
            })
            .collect())
    }

    /// Slipped orders grouped by how they settle.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_slippage` is outside `[0, 1]`.
    pub fn slipped_orders_by_type(&self, max_slippage: f64) -> Result<OptimizedOrdersByType> {
        Ok(group_orders(self.slipped_orders(max_slippage)?))
    }

    /// Rate of this path after fill penalties and the exchange-proxy overhead.
    /// Output per input for sells, input per output for buys.
    #[must_use]
    pub fn adjusted_rate(&self) -> f64 {
        let size = self.overhead_applied_size();
        rate(self.context.side, size.input, size.output)
    }

    /// Returns `true` if this path is better than `other` for the same target.
    ///
    /// A path that cannot cover the target loses to one that covers more;
    /// otherwise the higher complete adjusted rate wins.
    #[must_use]
    pub fn is_adjusted_better_than(&self, other: &Self) -> bool {
        debug_assert_eq!(self.target_input, other.target_input, "target input mismatch");
        let target = u256_to_f64(self.target_input);
        let input = self.adjusted_size.input;
        let other_input = other.adjusted_size.input;
        if input < target || other_input < target {
            input > other_input
        } else {
            self.adjusted_complete_rate() > other.adjusted_complete_rate()
        }
    }

    /// Adjusted size with the route-composition overhead charged once.
    fn overhead_applied_size(&self) -> PathSize {
        let PathSize { input, output } = self.adjusted_size;
        let PathPenaltyOpts {
            eth_rates,
            gas_price,
            exchange_proxy_overhead,
        } = self.penalty_opts;
        let overhead_fee = u256_to_f64(gas_price) * exchange_proxy_overhead.gas(self.source_flags) as f64;
        let penalty = if eth_rates.output_amount_per_eth > 0.0 {
            (eth_rates.output_amount_per_eth * overhead_fee).floor()
        } else if input > 0.0 {
            eth_rates.input_amount_per_eth * overhead_fee * (output / input)
        } else {
            0.0
        };
        PathSize {
            input,
            output: match self.context.side {
                Side::Sell => output - penalty,
                Side::Buy => output + penalty,
            },
        }
    }

    /// Rate that also penalizes paths falling short of the target.
    fn adjusted_complete_rate(&self) -> f64 {
        let size = self.overhead_applied_size();
        complete_rate(self.context.side, size.input, size.output, u256_to_f64(self.target_input))
    }
}

/// Output per input for sells, input per output for buys.
#[must_use]
pub fn rate(side: Side, input: f64, output: f64) -> f64 {
    if input == 0.0 || output == 0.0 {
        return 0.0;
    }
    match side {
        Side::Sell => output / input,
        Side::Buy => input / output,
    }
}

/// Rate scaled by the fraction of `target` the path covers.
#[must_use]
pub fn complete_rate(side: Side, input: f64, output: f64, target: f64) -> f64 {
    if input == 0.0 || output == 0.0 || target == 0.0 {
        return 0.0;
    }
    match side {
        Side::Sell => output / target,
        Side::Buy => (input / output) * (input / target),
    }
}

/// Sums fills up to `target_input`. The last fill crossing the target is
/// interpolated, but its penalty is charged in full.
fn create_adjusted_size(target_input: U256, fills: &[Fill]) -> PathSize {
    let target = u256_to_f64(target_input);
    fills.iter().fold(PathSize::default(), |size, fill| {
        let fill_input = u256_to_f64(fill.input);
        if size.input + fill_input > target {
            let remaining = target - size.input;
            let scaled_output = u256_to_f64(fill.output) * (remaining / fill_input);
            PathSize {
                input: target,
                output: size.output + scaled_output + fill.penalty(),
            }
        } else {
            PathSize {
                input: size.input + fill_input,
                output: size.output + fill.adjusted_output,
            }
        }
    })
}

/// `(maker_amount, taker_amount)` of a fill.
const fn fill_token_amounts(fill: &Fill, side: Side) -> (U256, U256) {
    match side {
        Side::Sell => (fill.output, fill.input),
        Side::Buy => (fill.input, fill.output),
    }
}

/// Wraps a fill into a bridge order between `maker_token` and `taker_token`.
fn create_bridge_order(fill: Fill, maker_token: Address, taker_token: Address, side: Side) -> OptimizedOrder {
    let (maker_amount, taker_amount) = fill_token_amounts(&fill, side);
    OptimizedOrder {
        source: fill.source,
        order_type: OrderType::Bridge,
        fill_data: fill.fill_data.clone(),
        maker_token,
        taker_token,
        maker_amount,
        taker_amount,
        fill,
    }
}

/// Splits a two-hop fill into its hop orders. The amount the first hop produces
/// is only known at execution time: it is zero on the first hop and
/// `MAX_UINT256` on the second.
fn create_two_hop_orders(fill: &Fill, context: &PathContext) -> Option<(OptimizedOrder, OptimizedOrder)> {
    let data = fill.fill_data.multi_hop()?;
    let (maker_token, taker_token) = context.maker_taker_tokens();
    let sell = context.side.is_sell();
    let hop_fill = |hop_source: Source, fill_data: &FillData, input: U256, output: U256| Fill {
        source_path_id: fill.source_path_id.clone(),
        source: hop_source,
        order_type: OrderType::Bridge,
        fill_data: fill_data.clone(),
        input,
        output,
        adjusted_output: u256_to_f64(output),
        gas: 0,
        flags: fill.flags,
    };
    let first = hop_fill(
        data.first_hop_source.source,
        &data.first_hop_source.fill_data,
        if sell { fill.input } else { U256::ZERO },
        if sell { U256::ZERO } else { fill.output },
    );
    let second = hop_fill(
        data.second_hop_source.source,
        &data.second_hop_source.fill_data,
        if sell { MAX_UINT256 } else { fill.input },
        if sell { fill.output } else { MAX_UINT256 },
    );
    Some((
        create_bridge_order(first, data.intermediate_token, taker_token, context.side),
        create_bridge_order(second, maker_token, data.intermediate_token, context.side),
    ))
}

/// Creates the settlement orders for `fills`.
fn create_orders(fills: &[Fill], context: &PathContext) -> Vec<OptimizedOrder> {
    let (maker_token, taker_token) = context.maker_taker_tokens();
    let mut orders = Vec::with_capacity(fills.len());
    for fill in fills {
        match (&fill.fill_data, fill.source) {
            (FillData::Native(native), Source::Native) => {
                let (maker_amount, taker_amount) = fill_token_amounts(fill, context.side);
                orders.push(OptimizedOrder {
                    source: Source::Native,
                    order_type: native.kind.into(),
                    fill_data: fill.fill_data.clone(),
                    maker_token: native.order.maker_token,
                    taker_token: native.order.taker_token,
                    maker_amount,
                    taker_amount,
                    fill: fill.clone(),
                });
            }
            (_, Source::MultiHop) => {
                if let Some((first, second)) = create_two_hop_orders(fill, context) {
                    orders.push(first);
                    orders.push(second);
                } else {
                    log::warn!("path: multi-hop fill without multi-hop fill data, skipping");
                }
            }
            _ => orders.push(create_bridge_order(fill.clone(), maker_token, taker_token, context.side)),
        }
    }
    orders
}

/// Groups orders into native, single-hop bridge and two-hop pairs. Hop orders
/// carry the multi-hop flag of their parent fill and always come in pairs.
fn group_orders<I: IntoIterator<Item = OptimizedOrder>>(orders: I) -> OptimizedOrdersByType {
    let mut grouped = OptimizedOrdersByType::default();
    let mut pending_first_hop: Option<OptimizedOrder> = None;
    for order in orders {
        if order.source == Source::Native {
            grouped.native_orders.push(order);
        } else if let Some(first_hop_order) = pending_first_hop.take() {
            grouped.two_hop_orders.push(TwoHopOrder {
                first_hop_order,
                second_hop_order: order,
            });
        } else if order.fill.flags.contains(Source::MultiHop.flag()) {
            pending_first_hop = Some(order);
        } else {
            grouped.bridge_orders.push(order);
        }
    }
    grouped
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::market::order::NativeOrderKind;
    use crate::market::test_helpers::*;

    #[test]
    fn test_create_orders_by_type() {
        let fills = vec![
            native_fill(NativeOrderKind::Rfq, 100, 200),
            bridge_fill(Source::UniswapV2, 100, 190),
            two_hop_fill(Source::Curve, Source::UniswapV2, 100, 180),
        ];
        let path = Path::create(sell_context(), fills, U256::from(300), zero_penalty_opts());
        assert_eq!(path.orders().len(), 4);
        assert!(path.has_two_hop());

        let by_type = path.orders_by_type();
        assert_eq!(by_type.native_orders.len(), 1);
        assert_eq!(by_type.bridge_orders.len(), 1);
        assert_eq!(by_type.two_hop_orders.len(), 1);

        let two_hop = &by_type.two_hop_orders[0];
        assert_eq!(two_hop.first_hop_order.taker_amount, U256::from(100));
        assert_eq!(two_hop.first_hop_order.maker_amount, U256::ZERO);
        assert_eq!(two_hop.first_hop_order.maker_token, address_from_str("C"));
        assert_eq!(two_hop.second_hop_order.taker_amount, MAX_UINT256);
        assert_eq!(two_hop.second_hop_order.maker_amount, U256::from(180));
        assert_eq!(two_hop.second_hop_order.taker_token, address_from_str("C"));

        let bridge = &by_type.bridge_orders[0];
        assert_eq!(bridge.maker_token, address_from_str("B"));
        assert_eq!(bridge.taker_token, address_from_str("A"));
    }

    #[test]
    fn test_slipped_orders() {
        let fills = vec![
            native_fill(NativeOrderKind::Rfq, 100, 200),
            bridge_fill(Source::UniswapV2, 100, 1_000),
            two_hop_fill(Source::Curve, Source::UniswapV2, 100, 180),
        ];
        let path = Path::create(sell_context(), fills, U256::from(300), zero_penalty_opts());
        let slipped = path.slipped_orders(0.01).unwrap();
        assert_eq!(slipped[0].maker_amount, U256::from(200));
        assert_eq!(slipped[1].maker_amount, U256::from(990));
        assert_eq!(slipped[2].maker_amount, U256::ZERO);
        assert_eq!(slipped[3].maker_amount, U256::from(178));
        assert_eq!(slipped[3].taker_amount, MAX_UINT256);

        for no_slippage in [0.0, -0.0] {
            assert_eq!(path.slipped_orders(no_slippage).unwrap(), path.orders().to_vec());
        }
        for (slippage, message) in &[
            (1.5, "slippage must be [0, 1]. Given: 1.5"),
            (-0.01, "slippage must be [0, 1]. Given: -0.01"),
        ] {
            assert_eq!(path.slipped_orders(*slippage).err().unwrap().to_string(), *message);
        }
    }

    #[test]
    fn test_slipped_buy_orders_round_up() {
        let fills = vec![bridge_fill(Source::UniswapV2, 100, 101)];
        let path = Path::create(buy_context(), fills, U256::from(100), zero_penalty_opts());
        let slipped = path.slipped_orders(0.01).unwrap();
        assert_eq!(slipped[0].taker_amount, U256::from(103));
        assert_eq!(slipped[0].maker_amount, U256::from(100));
    }

    #[test]
    fn test_adjusted_size_interpolates_last_fill() {
        let mut last = bridge_fill(Source::Curve, 200, 400);
        last.adjusted_output = 390.0;
        let fills = vec![bridge_fill(Source::UniswapV2, 100, 200), last];
        let path = Path::create(sell_context(), fills, U256::from(200), zero_penalty_opts());
        // 200 from the first fill, half of the second's 400, minus its full penalty of 10
        assert!((path.adjusted_size.output - 390.0).abs() < 1e-9);
        assert!((path.adjusted_size.input - 200.0).abs() < 1e-9);
        assert!((path.adjusted_rate() - 1.95).abs() < 1e-9);
    }

    #[test]
    fn test_is_adjusted_better_than() {
        let target = U256::from(100);
        let full = Path::create(sell_context(), vec![bridge_fill(Source::Curve, 100, 150)], target, zero_penalty_opts());
        let better = Path::create(
            sell_context(),
            vec![bridge_fill(Source::UniswapV2, 100, 160)],
            target,
            zero_penalty_opts(),
        );
        let partial = Path::create(
            sell_context(),
            vec![bridge_fill(Source::UniswapV2, 50, 500)],
            target,
            zero_penalty_opts(),
        );
        assert!(better.is_adjusted_better_than(&full));
        assert!(!full.is_adjusted_better_than(&better));
        // covering the target beats a better rate on half of it
        assert!(full.is_adjusted_better_than(&partial));
        assert!(!partial.is_adjusted_better_than(&full));
    }

    #[test]
    fn test_exchange_proxy_overhead_penalizes_mixed_routes() {
        let opts = PathPenaltyOpts {
            eth_rates: EthRates {
                output_amount_per_eth: 1.0,
                input_amount_per_eth: 0.0,
            },
            gas_price: U256::from(1),
            exchange_proxy_overhead: ExchangeProxyOverhead::with_vip_sources(&[Source::UniswapV2]),
        };
        let target = U256::from(1_000_000);
        let vip = Path::create(
            sell_context(),
            vec![bridge_fill(Source::UniswapV2, 1_000_000, 1_000_000)],
            target,
            opts,
        );
        let mixed = Path::create(
            sell_context(),
            vec![
                bridge_fill(Source::UniswapV2, 500_000, 550_000),
                bridge_fill(Source::Curve, 500_000, 550_000),
            ],
            target,
            opts,
        );
        // 1_000_000 - 21_000 vs 1_100_000 - 171_000
        assert!((vip.adjusted_rate() - 0.979).abs() < 1e-9);
        assert!((mixed.adjusted_rate() - 0.929).abs() < 1e-9);
        assert!(vip.is_adjusted_better_than(&mixed));
    }

    #[test]
    fn test_rates() {
        assert!((rate(Side::Sell, 100.0, 200.0) - 2.0).abs() < f64::EPSILON);
        assert!((rate(Side::Buy, 100.0, 200.0) - 0.5).abs() < f64::EPSILON);
        assert!(rate(Side::Sell, 0.0, 200.0).abs() < f64::EPSILON);
        assert!((complete_rate(Side::Sell, 50.0, 100.0, 100.0) - 1.0).abs() < f64::EPSILON);
        assert!((complete_rate(Side::Buy, 50.0, 100.0, 100.0) - 0.25).abs() < f64::EPSILON);
    }
}
