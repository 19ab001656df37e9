//! Simulated execution of a path's orders, in the best and in the worst case.

use std::collections::BTreeMap;

use alloy::primitives::U256;

use crate::market::order::{native_adjusted_taker_fee_amount, OptimizedOrder};
use crate::market::side::Side;
use crate::market::source::Source;
use crate::optimizer::fees::GasSchedule;
use crate::utils::constants::PROTOCOL_FEE_MULTIPLIER;
use crate::utils::math::{mul_div, mul_div_floor, scale_amount, Rounding};

/// Amounts moved by filling a set of orders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteFillResult {
    /// Maker token bought
    pub maker_amount: U256,
    /// Taker token sold
    pub taker_amount: U256,
    /// Taker fees paid in the maker token
    pub taker_fee_maker_amount: U256,
    /// Taker fees paid in the taker token
    pub taker_fee_taker_amount: U256,
    /// Maker token bought, fees included
    pub total_maker_amount: U256,
    /// Taker token sold, fees included
    pub total_taker_amount: U256,
    /// Protocol fee in wei
    pub protocol_fee_amount: U256,
    /// Estimated gas
    pub gas: u64,
    /// Input filled per source: taker token for sells, maker token for buys
    pub fill_amount_by_source: BTreeMap<Source, U256>,
}

/// What to simulate.
#[derive(Clone, Copy, Debug)]
pub struct QuoteFillInfo<'a> {
    /// Orders, in fill order
    pub orders: &'a [OptimizedOrder],
    /// Input to fill: taker token for sells, maker token for buys
    pub fill_amount: U256,
    /// Gas price in wei
    pub gas_price: U256,
    /// Sell or buy
    pub side: Side,
    /// Gas consumed per source
    pub gas_schedule: &'a GasSchedule,
    /// Slippage applied to the worst case output
    pub slippage: f64,
}

/// One order seen from the input side.
struct FillOrderCall<'a> {
    /// The order
    order: &'a OptimizedOrder,
    /// Input amount of the whole order
    total_input: U256,
    /// Output amount of the whole order
    total_output: U256,
    /// Fee payable in the input token for the whole order
    total_input_fee: U256,
    /// Fee payable in the output token for the whole order
    total_output_fee: U256,
}

/// Running totals before they are mapped to maker and taker amounts.
#[derive(Default)]
struct IntermediateFillResult {
    input: U256,
    output: U256,
    input_fee: U256,
    output_fee: U256,
    protocol_fee: U256,
    gas: u64,
    input_by_source: BTreeMap<Source, U256>,
}

/// Fills orders in sequence until `fill_amount` is used up.
#[must_use]
pub fn simulate_best_case_fill(info: &QuoteFillInfo<'_>) -> QuoteFillResult {
    let protocol_fee_per_order = protocol_fee_per_order(info.gas_price);
    let result = fill_quote_orders(info, &fill_order_calls(info), protocol_fee_per_order);
    to_quote_fill_result(result, info.side)
}

/// Like the best case, except every order's gas and protocol fee is charged
/// and the output is moved against the taker by the slippage: down (rounded
/// down) for sells, up (rounded up) for buys.
#[must_use]
pub fn simulate_worst_case_fill(info: &QuoteFillInfo<'_>) -> QuoteFillResult {
    let protocol_fee_per_order = protocol_fee_per_order(info.gas_price);
    let mut result = fill_quote_orders(info, &fill_order_calls(info), protocol_fee_per_order);
    result.gas = info
        .orders
        .iter()
        .map(|o| info.gas_schedule.gas(o.source, &o.fill_data))
        .sum();
    let limit_orders = info.orders.iter().filter(|o| o.order_type.has_protocol_fee()).count();
    result.protocol_fee = protocol_fee_per_order.saturating_mul(U256::from(limit_orders));
    result.output = match info.side {
        Side::Sell => scale_amount(result.output, 1.0 - info.slippage, Rounding::Down),
        Side::Buy => scale_amount(result.output, 1.0 + info.slippage, Rounding::Up),
    };
    to_quote_fill_result(result, info.side)
}

fn protocol_fee_per_order(gas_price: U256) -> U256 {
    gas_price.saturating_mul(U256::from(PROTOCOL_FEE_MULTIPLIER))
}

/// Views each order from the input side. Limit orders charge their taker fee
/// in the input token for sells and in the output token for buys.
fn fill_order_calls<'a>(info: &QuoteFillInfo<'a>) -> Vec<FillOrderCall<'a>> {
    info.orders
        .iter()
        .map(|order| {
            let taker_fee = match (order.fill_data.native_order(), order.order_type.has_protocol_fee()) {
                (Some(native), true) => native_adjusted_taker_fee_amount(&native.order, order.taker_amount),
                _ => U256::ZERO,
            };
            match info.side {
                Side::Sell => FillOrderCall {
                    order,
                    total_input: order.taker_amount,
                    total_output: order.maker_amount,
                    total_input_fee: taker_fee,
                    total_output_fee: U256::ZERO,
                },
                Side::Buy => FillOrderCall {
                    order,
                    total_input: order.maker_amount,
                    total_output: order.taker_amount,
                    total_input_fee: U256::ZERO,
                    total_output_fee: taker_fee,
                },
            }
        })
        .collect()
}

/// The input that, with its proportional input fee, spends at most
/// `remaining_input`: `i = i' * o / (o + f)`.
fn solve_for_input_fill_amount(remaining_input: U256, total_input: U256, total_input_fee: U256) -> U256 {
    let denominator = total_input.saturating_add(total_input_fee);
    if denominator.is_zero() {
        return total_input;
    }
    total_input.min(mul_div_floor(remaining_input, total_input, denominator))
}

fn fill_quote_orders(
    info: &QuoteFillInfo<'_>,
    calls: &[FillOrderCall<'_>],
    protocol_fee_per_order: U256,
) -> IntermediateFillResult {
    let (input_rounding, output_rounding) = match info.side {
        Side::Sell => (Rounding::Up, Rounding::Down),
        Side::Buy => (Rounding::Down, Rounding::Up),
    };
    let mut result = IntermediateFillResult::default();
    let mut remaining = info.fill_amount;
    for call in calls {
        if remaining.is_zero() {
            break;
        }
        let order = call.order;
        result.gas += info.gas_schedule.gas(order.source, &order.fill_data);

        let filled_input = solve_for_input_fill_amount(remaining, call.total_input, call.total_input_fee);
        let filled_output = mul_div(call.total_output, filled_input, call.total_input, output_rounding);
        let filled_input_fee = mul_div(call.total_input_fee, filled_input, call.total_input, input_rounding);
        let filled_output_fee = mul_div(call.total_output_fee, filled_output, call.total_output, output_rounding);

        *result.input_by_source.entry(order.source).or_default() += filled_input;
        result.input += filled_input;
        result.output += filled_output;
        result.input_fee += filled_input_fee;
        result.output_fee += filled_output_fee;
        remaining = remaining.saturating_sub(filled_input + filled_input_fee);

        if order.order_type.has_protocol_fee() {
            result.protocol_fee += protocol_fee_per_order;
        }
    }
    result
}

fn to_quote_fill_result(result: IntermediateFillResult, side: Side) -> QuoteFillResult {
    let IntermediateFillResult {
        input,
        output,
        input_fee,
        output_fee,
        protocol_fee,
        gas,
        input_by_source,
    } = result;
    match side {
        Side::Sell => QuoteFillResult {
            maker_amount: output,
            taker_amount: input,
            taker_fee_maker_amount: output_fee,
            taker_fee_taker_amount: input_fee,
            total_maker_amount: output + output_fee,
            total_taker_amount: input + input_fee,
            protocol_fee_amount: protocol_fee,
            gas,
            fill_amount_by_source: input_by_source,
        },
        Side::Buy => QuoteFillResult {
            maker_amount: input,
            taker_amount: output,
            taker_fee_maker_amount: input_fee,
            taker_fee_taker_amount: output_fee,
            total_maker_amount: input + input_fee,
            total_taker_amount: output + output_fee,
            protocol_fee_amount: protocol_fee,
            gas,
            fill_amount_by_source: input_by_source,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::market::order::NativeOrderKind;
    use crate::market::path::Path;
    use crate::market::test_helpers::*;

    fn info<'a>(orders: &'a [OptimizedOrder], side: Side, fill_amount: u64, schedule: &'a GasSchedule) -> QuoteFillInfo<'a> {
        QuoteFillInfo {
            orders,
            fill_amount: U256::from(fill_amount),
            gas_price: U256::from(1),
            side,
            gas_schedule: schedule,
            slippage: 0.1,
        }
    }

    #[test]
    fn test_best_case_stops_at_fill_amount() {
        let fills = vec![
            bridge_fill(Source::UniswapV2, 100, 200),
            bridge_fill(Source::Curve, 100, 150),
        ];
        let path = Path::create(sell_context(), fills, U256::from(200), zero_penalty_opts());
        let schedule = fake_gas_schedule();

        let partial = simulate_best_case_fill(&info(path.orders(), Side::Sell, 150, &schedule));
        assert_eq!(partial.taker_amount, U256::from(150));
        assert_eq!(partial.maker_amount, U256::from(200 + 75));
        assert_eq!(partial.gas, 200_000);
        assert_eq!(partial.fill_amount_by_source[&Source::Curve], U256::from(50));

        let first_only = simulate_best_case_fill(&info(path.orders(), Side::Sell, 100, &schedule));
        assert_eq!(first_only.maker_amount, U256::from(200));
        assert_eq!(first_only.gas, 100_000);
        assert!(!first_only.fill_amount_by_source.contains_key(&Source::Curve));
    }

    #[test]
    fn test_worst_case_charges_every_order_and_slippage() {
        let fills = vec![
            bridge_fill(Source::UniswapV2, 100, 200),
            bridge_fill(Source::Curve, 100, 150),
        ];
        let path = Path::create(sell_context(), fills, U256::from(200), zero_penalty_opts());
        let schedule = fake_gas_schedule();
        let worst = simulate_worst_case_fill(&info(path.orders(), Side::Sell, 100, &schedule));
        assert_eq!(worst.maker_amount, U256::from(180));
        assert_eq!(worst.gas, 200_000);
    }

    #[test]
    fn test_worst_case_buy_rounds_up() {
        let mut fill = bridge_fill(Source::UniswapV2, 100, 105);
        fill.adjusted_output = 105.0;
        let path = Path::create(buy_context(), vec![fill], U256::from(100), zero_penalty_opts());
        let schedule = fake_gas_schedule();
        let best = simulate_best_case_fill(&info(path.orders(), Side::Buy, 100, &schedule));
        assert_eq!(best.maker_amount, U256::from(100));
        assert_eq!(best.taker_amount, U256::from(105));
        let worst = simulate_worst_case_fill(&info(path.orders(), Side::Buy, 100, &schedule));
        // 105 * 1.1 = 115.5
        assert_eq!(worst.taker_amount, U256::from(116));
    }

    #[test]
    fn test_limit_order_taker_fee_is_solved_for() {
        let mut order = native_order(NativeOrderKind::Limit, 1_000, 100);
        order.order.taker_token_fee_amount = U256::from(10);
        let order = order.with_fillable_taker_amount(U256::from(100));
        let fill = crate::market::fill::native_order_to_fill(
            Side::Sell,
            &order,
            None,
            Default::default(),
            &zero_fees(),
            false,
        )
        .unwrap();
        let path = Path::create(sell_context(), vec![fill], U256::from(110), zero_penalty_opts());
        let schedule = fake_gas_schedule();
        let result = simulate_best_case_fill(&info(path.orders(), Side::Sell, 55, &schedule));
        // 55 spent as 50 input plus 5 fee
        assert_eq!(result.taker_amount, U256::from(50));
        assert_eq!(result.taker_fee_taker_amount, U256::from(5));
        assert_eq!(result.total_taker_amount, U256::from(55));
        assert_eq!(result.gas, 50_000);
    }
}
