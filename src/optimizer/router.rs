//! Discretised allocation of the requested amount across candidate curves.
//!
//! The requested amount is cut into equal chunks and a knapsack-style dynamic
//! program distributes whole chunks over the curves, each curve valued by
//! linear interpolation between its samples. Every curve receives at most one
//! (possibly partial) fill.

use alloy::primitives::U256;

use crate::market::fill::Fill;
use crate::market::path::rate;
use crate::market::side::Side;
use crate::utils::constants::MIN_ROUTER_CURVE_SAMPLES;
use crate::utils::math::{mul_div, mul_div_floor, u256_to_f64, Rounding};

/// Prepares a sampled DEX curve for routing.
///
/// Trailing zero-output samples are removed. Curves left with fewer than
/// `MIN_ROUTER_CURVE_SAMPLES` points are dropped.
#[must_use]
pub fn prepare_dex_curve(mut fills: Vec<Fill>) -> Option<Vec<Fill>> {
    while fills.last().is_some_and(|f| f.output.is_zero()) {
        fills.pop();
    }
    (fills.len() >= MIN_ROUTER_CURVE_SAMPLES).then_some(fills)
}

/// Expands a single fill into an evenly spaced linear curve of `points` samples.
/// Every point carries the full penalty of the fill.
#[must_use]
pub fn linear_curve(side: Side, fill: &Fill, points: usize) -> Vec<Fill> {
    if fill.input.is_zero() || points == 0 {
        return Vec::new();
    }
    let rounding = output_rounding(side);
    let penalty = fill.penalty();
    let n = U256::from(points);
    (1..=points)
        .map(|i| {
            let input = mul_div_floor(fill.input, U256::from(i), n);
            let output = mul_div(fill.output, input, fill.input, rounding);
            Fill {
                input,
                output,
                adjusted_output: u256_to_f64(output) + penalty,
                ..fill.clone()
            }
        })
        .filter(|f| !f.input.is_zero())
        .collect()
}

/// Outputs received by the taker round down; outputs paid by the taker round up.
const fn output_rounding(side: Side) -> Rounding {
    match side {
        Side::Sell => Rounding::Down,
        Side::Buy => Rounding::Up,
    }
}

/// The fill obtained by using `amount` of a curve, interpolating linearly
/// between the samples around it and from `(0, 0)` below the first sample.
///
/// Zero-output samples inside the curve are reverts and are skipped. The
/// penalty is taken from the sample at or above `amount`. Returns `None` if
/// `amount` exceeds the largest sampled input.
#[must_use]
pub fn fill_at(side: Side, curve: &[Fill], amount: U256) -> Option<Fill> {
    let upper_index = curve.iter().position(|f| f.input >= amount && !f.output.is_zero())?;
    let upper = &curve[upper_index];
    let (lower_input, lower_output) = curve[..upper_index]
        .iter()
        .rev()
        .find(|f| !f.output.is_zero())
        .map_or((U256::ZERO, U256::ZERO), |f| (f.input, f.output));

    let output = if amount == upper.input {
        upper.output
    } else {
        let span = upper.input.saturating_sub(lower_input);
        let offset = amount.saturating_sub(lower_input);
        let rounding = output_rounding(side);
        if upper.output >= lower_output {
            lower_output + mul_div(offset, upper.output - lower_output, span, rounding)
        } else {
            // a falling segment; round the drop the other way
            let other = match rounding {
                Rounding::Down => Rounding::Up,
                Rounding::Up => Rounding::Down,
            };
            lower_output.saturating_sub(mul_div(offset, lower_output - upper.output, span, other))
        }
    };

    Some(Fill {
        input: amount,
        output,
        adjusted_output: u256_to_f64(output) + upper.penalty(),
        ..upper.clone()
    })
}

/// How good a fill is: adjusted output received for sells, negated adjusted
/// output paid for buys. Higher is better on both sides.
fn score(side: Side, fill: &Fill) -> f64 {
    match side {
        Side::Sell => fill.adjusted_output,
        Side::Buy => -fill.adjusted_output,
    }
}

/// Splits `target` over `curves` in `num_chunks` equal chunks and returns the
/// best complete allocation as fills, best rate first.
///
/// Returns `None` when no allocation covers the whole target.
///
/// # Arguments
///
/// * `side` - Sell maximises adjusted output, buy minimises it
/// * `curves` - Candidate curves, each sorted by ascending input
/// * `target` - The amount to allocate
/// * `num_chunks` - Granularity of the allocation
#[must_use]
pub fn route(side: Side, curves: &[Vec<Fill>], target: U256, num_chunks: usize) -> Option<Vec<Fill>> {
    if curves.is_empty() || target.is_zero() || num_chunks == 0 {
        return None;
    }
    let chunks = U256::from(num_chunks);
    let chunk_amounts: Vec<U256> = (0..=num_chunks)
        .map(|k| mul_div_floor(target, U256::from(k), chunks))
        .collect();

    // values[c][k]: fill and score of giving k chunks to curve c
    let values: Vec<Vec<Option<(Fill, f64)>>> = curves
        .iter()
        .map(|curve| {
            chunk_amounts
                .iter()
                .map(|amount| {
                    if amount.is_zero() {
                        return None;
                    }
                    fill_at(side, curve, *amount).map(|f| {
                        let s = score(side, &f);
                        (f, s)
                    })
                })
                .collect()
        })
        .collect();

    // best[k]: best score allocating exactly k chunks over the curves seen so far
    let mut best: Vec<Option<f64>> = vec![None; num_chunks + 1];
    best[0] = Some(0.0);
    let mut choices: Vec<Vec<usize>> = Vec::with_capacity(curves.len());
    for curve_values in &values {
        let mut next = best.clone();
        let mut choice = vec![0; num_chunks + 1];
        for total in 1..=num_chunks {
            for taken in 1..=total {
                let (Some(prev), Some((_, value))) = (best[total - taken], &curve_values[taken]) else {
                    continue;
                };
                let candidate = prev + value;
                if next[total].map_or(true, |current| candidate > current) {
                    next[total] = Some(candidate);
                    choice[total] = taken;
                }
            }
        }
        best = next;
        choices.push(choice);
    }
    if best[num_chunks].is_none() {
        return None;
    }

    let mut allocation = vec![0; curves.len()];
    let mut remaining = num_chunks;
    for (c, choice) in choices.iter().enumerate().rev() {
        allocation[c] = choice[remaining];
        remaining -= choice[remaining];
    }

    let mut fills: Vec<(usize, Fill)> = allocation
        .iter()
        .enumerate()
        .filter(|(_, taken)| **taken > 0)
        .filter_map(|(c, taken)| values[c][*taken].as_ref().map(|(f, _)| (c, f.clone())))
        .collect();
    settle_rounding_shortfall(side, curves, target, &mut fills);

    fills.sort_by(|(_, a), (_, b)| {
        let rate_a = rate(side, u256_to_f64(a.input), a.adjusted_output);
        let rate_b = rate(side, u256_to_f64(b.input), b.adjusted_output);
        rate_b.total_cmp(&rate_a)
    });
    Some(fills.into_iter().map(|(_, f)| f).collect())
}

/// Chunk boundaries are floored, so a complete allocation can fall a few base
/// units short of `target`. The remainder goes to the largest fill whose curve
/// can absorb it.
fn settle_rounding_shortfall(side: Side, curves: &[Vec<Fill>], target: U256, fills: &mut [(usize, Fill)]) {
    let allocated = fills.iter().fold(U256::ZERO, |acc, (_, f)| acc + f.input);
    let shortfall = target.saturating_sub(allocated);
    if shortfall.is_zero() {
        return;
    }
    let mut order: Vec<usize> = (0..fills.len()).collect();
    order.sort_by(|a, b| fills[*b].1.input.cmp(&fills[*a].1.input));
    for i in order {
        let (curve, fill) = &fills[i];
        if let Some(topped_up) = fill_at(side, &curves[*curve], fill.input + shortfall) {
            fills[i].1 = topped_up;
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::market::fill::{dex_sample_to_fill, EthRates};
    use crate::market::order::NativeOrderKind;
    use crate::market::source::Source;
    use crate::market::test_helpers::*;
    use crate::optimizer::fees::FeeSchedule;

    fn curve(side: Side, source: Source, points: &[(u64, u64)]) -> Vec<Fill> {
        dex_curve(source, points)
            .iter()
            .map(|s| dex_sample_to_fill(side, s, &format!("{source}-0"), EthRates::default(), &zero_fees()))
            .collect()
    }

    #[test]
    fn test_prepare_dex_curve_trims_trailing_zeros() {
        for (points, expected) in &[
            (vec![(10, 10), (20, 20), (30, 30), (40, 0)], Some(3)),
            (vec![(10, 10), (20, 0), (30, 30), (40, 40)], Some(4)),
            (vec![(10, 10), (20, 20), (30, 0), (40, 0)], None),
            (vec![(10, 0), (20, 0), (30, 0)], None),
        ] {
            let fills = curve(Side::Sell, Source::Curve, points);
            assert_eq!(prepare_dex_curve(fills).as_ref().map(Vec::len), *expected, "{points:?}");
        }
    }

    #[test]
    fn test_fill_at_interpolates() {
        let fills = curve(Side::Sell, Source::UniswapV2, &[(10, 100), (20, 150), (40, 200)]);
        for (amount, expected) in &[(5_u64, 50_u64), (10, 100), (15, 125), (30, 175), (40, 200)] {
            let fill = fill_at(Side::Sell, &fills, U256::from(*amount)).unwrap();
            assert_eq!(fill.input, U256::from(*amount));
            assert_eq!(fill.output, U256::from(*expected), "at {amount}");
        }
        assert!(fill_at(Side::Sell, &fills, U256::from(41)).is_none());
    }

    #[test]
    fn test_fill_at_skips_interior_reverts() {
        for side in [Side::Sell, Side::Buy] {
            let fills = curve(side, Source::Curve, &[(10, 10), (20, 0), (30, 30), (40, 40)]);
            let fills = prepare_dex_curve(fills).unwrap();
            for (amount, expected) in &[(15_u64, 15_u64), (20, 20), (30, 30)] {
                let fill = fill_at(side, &fills, U256::from(*amount)).unwrap();
                assert_eq!(fill.output, U256::from(*expected), "{side:?} at {amount}");
            }
        }
    }

    #[test]
    fn test_fill_at_rounds_against_the_taker() {
        let sell = curve(Side::Sell, Source::UniswapV2, &[(3, 10), (6, 20), (9, 30)]);
        assert_eq!(fill_at(Side::Sell, &sell, U256::from(1)).unwrap().output, U256::from(3));
        let buy = curve(Side::Buy, Source::UniswapV2, &[(3, 10), (6, 20), (9, 30)]);
        assert_eq!(fill_at(Side::Buy, &buy, U256::from(1)).unwrap().output, U256::from(4));
    }

    #[test]
    fn test_linear_curve_keeps_full_penalty() {
        let fees = FeeSchedule::new(U256::from(1), fake_gas_schedule());
        let rates = EthRates {
            output_amount_per_eth: 1e-3,
            input_amount_per_eth: 0.0,
        };
        let order = native_order(NativeOrderKind::Rfq, 1_300, 1_300).with_fillable_taker_amount(U256::from(1_300));
        let fill =
            crate::market::fill::native_order_to_fill(Side::Sell, &order, None, rates, &fees, false).unwrap();
        let points = linear_curve(Side::Sell, &fill, 13);
        assert_eq!(points.len(), 13);
        assert_eq!(points[0].input, U256::from(100));
        assert_eq!(points[12].input, U256::from(1_300));
        for point in &points {
            assert!((point.penalty() - fill.penalty()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_route_single_curve() {
        let fills = curve(Side::Sell, Source::UniswapV2, &[(25, 25), (50, 50), (75, 75), (100, 100)]);
        let path = route(Side::Sell, &[fills], U256::from(100), 4).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].input, U256::from(100));
        assert_eq!(path[0].output, U256::from(100));
    }

    #[test]
    fn test_route_splits_across_concave_curves() {
        // each curve is great for the first half and poor afterwards
        let points = [(25, 50), (50, 100), (75, 110), (100, 120)];
        let a = curve(Side::Sell, Source::UniswapV2, &points);
        let b = curve(Side::Sell, Source::Curve, &points);
        let path = route(Side::Sell, &[a, b], U256::from(100), 4).unwrap();
        assert_eq!(path.len(), 2);
        for fill in &path {
            assert_eq!(fill.input, U256::from(50));
            assert_eq!(fill.output, U256::from(100));
        }
    }

    #[test]
    fn test_route_buy_minimises_input_paid() {
        let cheap = curve(Side::Buy, Source::UniswapV2, &[(50, 50), (100, 100)]);
        let expensive = curve(Side::Buy, Source::Curve, &[(50, 60), (100, 120)]);
        let path = route(Side::Buy, &[expensive, cheap], U256::from(100), 2).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].source, Source::UniswapV2);
    }

    #[test]
    fn test_route_requires_full_coverage() {
        let fills = curve(Side::Sell, Source::UniswapV2, &[(10, 10), (20, 20), (30, 30)]);
        assert!(route(Side::Sell, &[fills], U256::from(100), 10).is_none());
        assert!(route(Side::Sell, &[], U256::from(100), 10).is_none());
    }

    #[test]
    fn test_route_settles_rounding_shortfall() {
        // concave curves split 3 + 6 = 9 over two fills, one short of the target
        let a = curve(Side::Sell, Source::UniswapV2, &[(4, 8), (7, 10), (10, 12)]);
        let b = curve(Side::Sell, Source::Curve, &[(4, 8), (7, 10), (10, 12)]);
        let path = route(Side::Sell, &[a, b], U256::from(10), 3).unwrap();
        assert_eq!(path.len(), 2);
        let total = path.iter().fold(U256::ZERO, |acc, f| acc + f.input);
        assert_eq!(total, U256::from(10));
    }
}
