//! Cost model: per-source gas, gas-price scaled fees and the exchange-proxy overhead.

use std::collections::HashMap;

use alloy::primitives::U256;

use crate::market::fill::Fill;
use crate::market::fill_data::FillData;
use crate::market::order::NativeOrderKind;
use crate::market::side::Side;
use crate::market::source::{Source, SourceFlags};
use crate::utils::constants::{
    CURVE_DEFAULT_GAS, FILL_QUOTE_TRANSFORMER_GAS_OVERHEAD, LIQUIDITY_PROVIDER_DEFAULT_GAS,
    MULTI_HOP_GAS_OVERHEAD, NATIVE_ORDER_GAS, PROTOCOL_FEE_MULTIPLIER, TX_BASE_GAS,
    UNISWAP_V2_EXTRA_HOP_GAS, UNISWAP_V2_GAS, UNISWAP_V3_BASE_GAS,
};
use crate::utils::math::u256_to_f64;

/// Gas and ETH-denominated fee of executing one fill.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeeEstimate {
    /// Gas units
    pub gas: u64,
    /// `gas_price * gas`, in wei
    pub fee: f64,
}

/// Gas consumed per source, optionally overridden per source.
///
/// Without overrides the gas comes from the fill data: router path length for
/// V2-style sources, the measured gas for Uniswap V3, the pool schedule for
/// Curve and so on. A two-hop fill costs both hops plus a fixed overhead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GasSchedule {
    /// Flat gas per source, replacing the fill-data derived value
    overrides: HashMap<Source, u64>,
}

impl GasSchedule {
    /// Returns a copy where `source` always costs `gas`.
    #[must_use]
    pub fn with_override(mut self, source: Source, gas: u64) -> Self {
        self.overrides.insert(source, gas);
        self
    }

    /// Returns a schedule where every source costs `gas`.
    #[must_use]
    pub fn flat(gas: u64) -> Self {
        Self {
            overrides: Source::ALL.into_iter().map(|s| (s, gas)).collect(),
        }
    }

    /// Gas used by a fill of `source` described by `fill_data`.
    #[must_use]
    pub fn gas(&self, source: Source, fill_data: &FillData) -> u64 {
        if let Some(gas) = self.overrides.get(&source) {
            return *gas;
        }
        match (source, fill_data) {
            (Source::Native, FillData::Native(order)) if order.kind == NativeOrderKind::Limit => {
                NATIVE_ORDER_GAS + PROTOCOL_FEE_MULTIPLIER
            }
            (Source::UniswapV2 | Source::SushiSwap, data) => {
                UNISWAP_V2_GAS + UNISWAP_V2_EXTRA_HOP_GAS * (data.path_hops() as u64 - 1)
            }
            (Source::UniswapV3, FillData::UniswapV3 { gas_used, .. }) => UNISWAP_V3_BASE_GAS + gas_used,
            (Source::Curve, FillData::Curve { pool, .. }) if pool.gas_schedule > 0 => pool.gas_schedule,
            (Source::Curve, _) => CURVE_DEFAULT_GAS,
            (Source::LiquidityProvider, FillData::LiquidityProvider { gas_cost, .. }) if *gas_cost > 0 => {
                *gas_cost
            }
            (Source::LiquidityProvider, _) => LIQUIDITY_PROVIDER_DEFAULT_GAS,
            (Source::MultiHop, FillData::MultiHop(data)) => {
                self.gas(data.first_hop_source.source, &data.first_hop_source.fill_data)
                    + self.gas(data.second_hop_source.source, &data.second_hop_source.fill_data)
                    + MULTI_HOP_GAS_OVERHEAD
            }
            _ => NATIVE_ORDER_GAS,
        }
    }
}

/// A gas schedule priced at a fixed gas price.
#[derive(Clone, Debug, PartialEq)]
pub struct FeeSchedule {
    /// Gas price in wei
    gas_price: U256,
    /// Gas consumed per source
    gas_schedule: GasSchedule,
}

impl FeeSchedule {
    /// Prices `gas_schedule` at `gas_price`.
    #[must_use]
    pub const fn new(gas_price: U256, gas_schedule: GasSchedule) -> Self {
        Self {
            gas_price,
            gas_schedule,
        }
    }

    /// Gas price in wei.
    #[must_use]
    pub const fn gas_price(&self) -> U256 {
        self.gas_price
    }

    /// The unpriced gas schedule.
    #[must_use]
    pub const fn gas_schedule(&self) -> &GasSchedule {
        &self.gas_schedule
    }

    /// Gas and fee of a fill of `source` described by `fill_data`.
    #[must_use]
    pub fn estimate(&self, source: Source, fill_data: &FillData) -> FeeEstimate {
        let gas = self.gas_schedule.gas(source, fill_data);
        FeeEstimate {
            gas,
            fee: u256_to_f64(self.gas_price) * gas as f64,
        }
    }
}

/// Fixed gas the exchange proxy adds on top of the fills, keyed by route composition.
///
/// A route of exactly one VIP source (or only RFQ/OTC orders) settles through a
/// dedicated entry point and pays only the transaction base cost; every other
/// composition goes through the generic transformer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeProxyOverhead {
    /// Gas charged for every route
    base_gas: u64,
    /// Gas added for routes that need the generic transformer
    transformer_gas: u64,
    /// Sources with a dedicated entry point
    vip_flags: SourceFlags,
}

impl ExchangeProxyOverhead {
    /// No overhead at all.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            base_gas: 0,
            transformer_gas: 0,
            vip_flags: SourceFlags::EMPTY,
        }
    }

    /// Transaction base gas plus the transformer overhead for non-VIP routes.
    #[must_use]
    pub fn with_vip_sources(vip_sources: &[Source]) -> Self {
        Self {
            base_gas: TX_BASE_GAS,
            transformer_gas: FILL_QUOTE_TRANSFORMER_GAS_OVERHEAD,
            vip_flags: SourceFlags::merge(vip_sources.iter().map(|s| s.flag())),
        }
    }

    /// Overhead gas for a route composed of `flags`.
    #[must_use]
    pub const fn gas(&self, flags: SourceFlags) -> u64 {
        let rfq_only = flags.bits() == (Source::Native.flag().bits() | SourceFlags::RFQ_ORDER.bits());
        let single_vip = flags.count() == 1 && self.vip_flags.contains(flags);
        if rfq_only || single_vip {
            self.base_gas
        } else {
            self.base_gas + self.transformer_gas
        }
    }
}

impl Default for ExchangeProxyOverhead {
    fn default() -> Self {
        Self::zero()
    }
}

/// Hook rescaling `adjusted_output` of candidate fills before optimization,
/// e.g. to price in a slippage model.
pub trait FillAdjustor: Send + Sync {
    /// Returns the adjusted fills for `side`; the amount is the requested input.
    fn adjust_fills(&self, side: Side, fills: Vec<Fill>, amount: U256) -> Vec<Fill>;
}

/// The default adjustor: fills pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityFillAdjustor;

impl FillAdjustor for IdentityFillAdjustor {
    fn adjust_fills(&self, _side: Side, fills: Vec<Fill>, _amount: U256) -> Vec<Fill> {
        fills
    }
}
