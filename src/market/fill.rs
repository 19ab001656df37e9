//! Conversion of samples and native orders into comparable candidate fills.
//!
//! Every candidate ends up on the same value axis: its output minus (for sells)
//! or plus (for buys) the gas it costs, converted from ETH into output tokens.

use alloy::primitives::U256;
use serde::Serialize;

use super::fill_data::FillData;
use super::liquidity::DexSample;
use super::order::{NativeOrderKind, NativeOrderWithFillableAmounts, OrderType};
use super::side::Side;
use super::source::{Source, SourceFlags};
use crate::optimizer::fees::FeeSchedule;
use crate::utils::math::{mul_div, ratio, u256_to_f64, Rounding};

/// A candidate (possibly partial) execution against one source.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    /// Identifies the curve this fill was taken from
    pub source_path_id: String,
    /// Source executing the fill
    pub source: Source,
    /// Settlement type
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Source-specific settlement data
    pub fill_data: FillData,
    /// Input amount (taker token for sells, maker token for buys)
    pub input: U256,
    /// Output amount (maker token for sells, taker token for buys)
    pub output: U256,
    /// Output net of gas, in output base units; may be negative for sells
    pub adjusted_output: f64,
    /// Estimated gas
    pub gas: u64,
    /// Bits of the sources composing this fill
    #[serde(skip)]
    pub flags: SourceFlags,
}

impl Fill {
    /// `adjusted_output - output`: the (signed) gas penalty folded into this fill.
    #[must_use]
    pub fn penalty(&self) -> f64 {
        self.adjusted_output - u256_to_f64(self.output)
    }
}

/// Token prices used to convert ETH-denominated fees into output tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EthRates {
    /// Output base units per wei, zero when unknown
    pub output_amount_per_eth: f64,
    /// Input base units per wei, zero when unknown
    pub input_amount_per_eth: f64,
}

/// Converts `eth_amount` (wei) into output tokens.
///
/// Prefers the output token's own ETH price; otherwise prices the input token in
/// ETH and converts through this fill's rate. Zero when neither price is known.
#[must_use]
pub fn eth_to_output_amount(input: U256, output: U256, eth_amount: f64, rates: EthRates) -> f64 {
    if rates.output_amount_per_eth > 0.0 {
        (rates.output_amount_per_eth * eth_amount).floor()
    } else {
        rates.input_amount_per_eth * eth_amount * ratio(output, input)
    }
}

/// Applies a penalty in the side's unfavourable direction.
#[must_use]
pub fn adjust_output(side: Side, output: f64, penalty: f64) -> f64 {
    match side {
        Side::Sell => output - penalty,
        Side::Buy => output + penalty,
    }
}

/// Flags of a native order kind.
#[must_use]
pub fn native_order_flags(kind: NativeOrderKind) -> SourceFlags {
    match kind {
        NativeOrderKind::Limit => Source::Native.flag() | SourceFlags::LIMIT_ORDER,
        NativeOrderKind::Rfq | NativeOrderKind::Otc => Source::Native.flag() | SourceFlags::RFQ_ORDER,
    }
}

/// Builds the fill for one point of a sampled curve.
#[must_use]
pub fn dex_sample_to_fill(
    side: Side,
    sample: &DexSample,
    source_path_id: &str,
    rates: EthRates,
    fees: &FeeSchedule,
) -> Fill {
    let estimate = fees.estimate(sample.source, &sample.fill_data);
    let penalty = eth_to_output_amount(sample.input, sample.output, estimate.fee, rates);
    Fill {
        source_path_id: source_path_id.to_string(),
        source: sample.source,
        order_type: OrderType::Bridge,
        fill_data: sample.fill_data.clone(),
        input: sample.input,
        output: sample.output,
        adjusted_output: adjust_output(side, u256_to_f64(sample.output), penalty),
        gas: estimate.gas,
        flags: sample.source.flag(),
    }
}

/// Builds the fill for a two-hop sample. The flags carry both hop sources.
#[must_use]
pub fn two_hop_sample_to_fill(side: Side, sample: &DexSample, rates: EthRates, fees: &FeeSchedule) -> Fill {
    let mut flags = Source::MultiHop.flag();
    let mut source_path_id = Source::MultiHop.to_string();
    if let Some(data) = sample.fill_data.multi_hop() {
        flags |= data.first_hop_source.source.flag() | data.second_hop_source.source.flag();
        source_path_id = format!(
            "{}-{}-{}",
            Source::MultiHop,
            data.first_hop_source.source,
            data.second_hop_source.source
        );
    }
    let estimate = fees.estimate(Source::MultiHop, &sample.fill_data);
    let penalty = eth_to_output_amount(sample.input, sample.output, estimate.fee, rates);
    Fill {
        source_path_id,
        source: Source::MultiHop,
        order_type: OrderType::Bridge,
        fill_data: sample.fill_data.clone(),
        input: sample.input,
        output: sample.output,
        adjusted_output: adjust_output(side, u256_to_f64(sample.output), penalty),
        gas: estimate.gas,
        flags,
    }
}

/// Builds the fill for a native order, clipped to `target_input` when given.
///
/// The penalty is charged in full however much of the order is used: a large
/// order and an order of exactly the target size cost the same gas. Returns
/// `None` for orders with nothing fillable, and, when `filter_unprofitable` is
/// set, for orders whose adjusted rate is not positive.
#[must_use]
pub fn native_order_to_fill(
    side: Side,
    order: &NativeOrderWithFillableAmounts,
    target_input: Option<U256>,
    rates: EthRates,
    fees: &FeeSchedule,
    filter_unprofitable: bool,
) -> Option<Fill> {
    let maker_amount = order.fillable_maker_amount;
    let taker_amount = order.fillable_taker_amount.saturating_add(order.fillable_taker_fee_amount);
    let (input, output) = match side {
        Side::Sell => (taker_amount, maker_amount),
        Side::Buy => (maker_amount, taker_amount),
    };
    if input.is_zero() || output.is_zero() {
        return None;
    }
    let fill_data = FillData::Native(Box::new(order.clone()));
    let estimate = fees.estimate(Source::Native, &fill_data);
    let penalty = eth_to_output_amount(input, output, estimate.fee, rates);

    let clipped_input = target_input.map_or(input, |target| target.min(input));
    let rounding = if side.is_sell() { Rounding::Down } else { Rounding::Up };
    let clipped_output = mul_div(clipped_input, output, input, rounding);
    let adjusted_output = adjust_output(side, u256_to_f64(clipped_output), penalty);
    let adjusted_rate = match side {
        Side::Sell => adjusted_output / u256_to_f64(clipped_input),
        Side::Buy => u256_to_f64(clipped_input) / adjusted_output,
    };
    if filter_unprofitable && adjusted_rate <= 0.0 {
        return None;
    }

    Some(Fill {
        source_path_id: format!("{}-{}", Source::Native, order.order.salt),
        source: Source::Native,
        order_type: order.kind.into(),
        fill_data,
        input: clipped_input,
        output: clipped_output,
        adjusted_output,
        gas: estimate.gas,
        flags: native_order_flags(order.kind),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::market::test_helpers::*;
    use crate::optimizer::fees::GasSchedule;

    #[test]
    fn test_eth_to_output_amount() {
        let (input, output) = (U256::from(100), U256::from(200));
        for (output_per_eth, input_per_eth, expected) in &[
            (3.0, 7.0, 30.0),  // output price wins
            (0.0, 2.0, 40.0),  // input price converted through the 2x rate
            (0.0, 0.0, 0.0),   // nothing known
        ] {
            let rates = EthRates {
                output_amount_per_eth: *output_per_eth,
                input_amount_per_eth: *input_per_eth,
            };
            let amount = eth_to_output_amount(input, output, 10.0, rates);
            assert!((amount - expected).abs() < 1e-9, "{amount} != {expected}");
        }
    }

    #[test]
    fn test_dex_sample_fill_penalty_direction() {
        let fees = FeeSchedule::new(U256::from(1), GasSchedule::flat(100));
        let rates = EthRates {
            output_amount_per_eth: 1.0,
            input_amount_per_eth: 0.0,
        };
        let sample = dex_sample(Source::UniswapV2, 1_000, 2_000);
        let sell = dex_sample_to_fill(Side::Sell, &sample, "UniswapV2-0", rates, &fees);
        assert!((sell.adjusted_output - 1_900.0).abs() < 1e-9);
        assert!((sell.penalty() + 100.0).abs() < 1e-9);
        assert_eq!(sell.flags, Source::UniswapV2.flag());
        assert_eq!(sell.gas, 100);

        let buy = dex_sample_to_fill(Side::Buy, &sample, "UniswapV2-0", rates, &fees);
        assert!((buy.adjusted_output - 2_100.0).abs() < 1e-9);
    }

    #[test]
    fn test_native_order_fill_is_clipped() {
        let fees = FeeSchedule::new(U256::ZERO, GasSchedule::default());
        let order = native_order(NativeOrderKind::Rfq, 2_000, 1_000).with_fillable_taker_amount(U256::from(1_000));
        let fill = native_order_to_fill(
            Side::Sell,
            &order,
            Some(U256::from(250)),
            EthRates::default(),
            &fees,
            true,
        )
        .unwrap();
        assert_eq!(fill.input, U256::from(250));
        assert_eq!(fill.output, U256::from(500));
        assert_eq!(fill.order_type, OrderType::Rfq);
        assert_eq!(fill.flags, Source::Native.flag() | SourceFlags::RFQ_ORDER);

        let buy = native_order_to_fill(Side::Buy, &order, None, EthRates::default(), &fees, true).unwrap();
        assert_eq!(buy.input, U256::from(2_000));
        assert_eq!(buy.output, U256::from(1_000));
    }

    #[test]
    fn test_unprofitable_native_order_is_filtered() {
        let fees = FeeSchedule::new(U256::from(1), GasSchedule::flat(1_000));
        let rates = EthRates {
            output_amount_per_eth: 1.0,
            input_amount_per_eth: 0.0,
        };
        let order = native_order(NativeOrderKind::Limit, 500, 1_000).with_fillable_taker_amount(U256::from(1_000));
        assert!(native_order_to_fill(Side::Sell, &order, None, rates, &fees, true).is_none());
        let kept = native_order_to_fill(Side::Sell, &order, None, rates, &fees, false).unwrap();
        assert!(kept.adjusted_output < 0.0);

        let empty = native_order(NativeOrderKind::Limit, 0, 0).with_fillable_taker_amount(U256::ZERO);
        assert!(native_order_to_fill(Side::Sell, &empty, None, rates, &fees, false).is_none());
    }
}
