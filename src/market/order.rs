use alloy::primitives::{Address, B256, U256};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::fill::Fill;
use super::fill_data::FillData;
use super::source::Source;
use crate::utils::math::mul_div_floor;

/// The settlement type of an optimized order.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// On-chain liquidity settled through a bridge adapter
    Bridge,
    /// Resting limit order; pays the protocol fee
    Limit,
    /// Request-for-quote order bound to a transaction origin
    Rfq,
    /// OTC order bound to a transaction origin, nonce-based expiry
    Otc,
}

impl OrderType {
    /// Returns `true` for `Limit`, the only type that pays a protocol fee.
    #[must_use]
    pub const fn has_protocol_fee(self) -> bool {
        matches!(self, Self::Limit)
    }
}

/// The kind of a native (off-chain signed) order.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NativeOrderKind {
    /// Limit order from the open orderbook
    Limit,
    /// RFQ order from a market maker
    Rfq,
    /// OTC order from a market maker
    Otc,
}

impl From<NativeOrderKind> for OrderType {
    fn from(kind: NativeOrderKind) -> Self {
        match kind {
            NativeOrderKind::Limit => Self::Limit,
            NativeOrderKind::Rfq => Self::Rfq,
            NativeOrderKind::Otc => Self::Otc,
        }
    }
}

/// The fields of a native order shared by the limit, RFQ and OTC variants.
///
/// Fields that do not apply to a variant are zero (e.g. `taker_token_fee_amount`
/// on RFQ orders, `tx_origin` on limit orders).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeOrder {
    /// Token the maker gives
    pub maker_token: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Total maker amount of the order
    pub maker_amount: U256,
    /// Total taker amount of the order
    pub taker_amount: U256,
    /// Taker-token fee charged on a full fill (limit orders)
    pub taker_token_fee_amount: U256,
    /// Order maker
    pub maker: Address,
    /// Restricted taker, zero for anyone
    pub taker: Address,
    /// Restricted transaction origin (RFQ and OTC orders)
    pub tx_origin: Address,
    /// Liquidity pool id (limit and RFQ orders)
    pub pool: B256,
    /// Expiry as a unix timestamp in seconds
    pub expiry: u64,
    /// Salt or nonce
    pub salt: U256,
    /// Chain the order is valid on
    pub chain_id: u64,
    /// Exchange proxy the order is signed for
    pub verifying_contract: Address,
}

/// An EIP-712 or eth-sign signature over a native order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// 0 = illegal, 1 = invalid, 2 = EIP-712, 3 = eth-sign
    pub signature_type: u8,
    /// Recovery id
    pub v: u8,
    /// R component
    pub r: B256,
    /// S component
    pub s: B256,
}

impl Signature {
    /// The placeholder signature carried by dummy orders.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            signature_type: 1,
            v: 1,
            r: B256::ZERO,
            s: B256::ZERO,
        }
    }
}

/// A signed native order as received from the orderbook or a market maker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedNativeOrder {
    /// Order variant
    pub kind: NativeOrderKind,
    /// Order fields
    pub order: NativeOrder,
    /// Maker signature
    pub signature: Signature,
}

impl SignedNativeOrder {
    /// Creates a zero-amount limit order for the pair. Sampling needs at least one
    /// native order to know the token pair; this one never produces a fill.
    #[must_use]
    pub fn dummy(maker_token: Address, taker_token: Address) -> Self {
        Self {
            kind: NativeOrderKind::Limit,
            order: NativeOrder {
                maker_token,
                taker_token,
                ..NativeOrder::default()
            },
            signature: Signature::invalid(),
        }
    }

    /// Pairs the order with fillable amounts derived from a fillable taker amount.
    /// The maker amount and taker fee are scaled down proportionally.
    #[must_use]
    pub fn with_fillable_taker_amount(self, fillable_taker_amount: U256) -> NativeOrderWithFillableAmounts {
        let fillable_maker_amount = native_adjusted_maker_fill_amount(&self.order, fillable_taker_amount);
        let fillable_taker_fee_amount = native_adjusted_taker_fee_amount(&self.order, fillable_taker_amount);
        NativeOrderWithFillableAmounts {
            kind: self.kind,
            order: self.order,
            signature: self.signature,
            fillable_maker_amount,
            fillable_taker_amount,
            fillable_taker_fee_amount,
        }
    }
}

/// A native order together with the amounts that are currently fillable on-chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeOrderWithFillableAmounts {
    /// Order variant
    pub kind: NativeOrderKind,
    /// Order fields
    pub order: NativeOrder,
    /// Maker signature
    pub signature: Signature,
    /// Maker amount still fillable
    pub fillable_maker_amount: U256,
    /// Taker amount still fillable
    pub fillable_taker_amount: U256,
    /// Taker fee payable on the fillable taker amount
    pub fillable_taker_fee_amount: U256,
}

/// Maker amount corresponding to `fillable_taker_amount`, rounded down.
#[must_use]
pub fn native_adjusted_maker_fill_amount(order: &NativeOrder, fillable_taker_amount: U256) -> U256 {
    if order.taker_amount.is_zero() {
        return U256::ZERO;
    }
    mul_div_floor(fillable_taker_amount, order.maker_amount, order.taker_amount)
}

/// Taker fee corresponding to `fillable_taker_amount`, rounded down.
#[must_use]
pub fn native_adjusted_taker_fee_amount(order: &NativeOrder, fillable_taker_amount: U256) -> U256 {
    if order.taker_amount.is_zero() {
        return U256::ZERO;
    }
    mul_div_floor(fillable_taker_amount, order.taker_token_fee_amount, order.taker_amount)
}

/// One element of an optimized path, annotated with the fill that produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedOrder {
    /// Source settling this order
    pub source: Source,
    /// Settlement type
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Source-specific settlement data
    pub fill_data: FillData,
    /// Token received by the taker
    pub maker_token: Address,
    /// Token spent by the taker
    pub taker_token: Address,
    /// Maker amount of this order
    pub maker_amount: U256,
    /// Taker amount of this order
    pub taker_amount: U256,
    /// The fill this order was created from
    pub fill: Fill,
}

/// A two-hop route split into its two settlement orders.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoHopOrder {
    /// Taker token to intermediate token
    pub first_hop_order: OptimizedOrder,
    /// Intermediate token to maker token
    pub second_hop_order: OptimizedOrder,
}

/// The orders of a path grouped the way they settle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedOrdersByType {
    /// Limit, RFQ and OTC orders
    pub native_orders: Vec<OptimizedOrder>,
    /// Single-hop bridge orders
    pub bridge_orders: Vec<OptimizedOrder>,
    /// Two-hop orders
    pub two_hop_orders: Vec<TwoHopOrder>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::market::test_helpers::*;

    #[test]
    fn test_fillable_amounts_scale_with_taker() {
        for (taker_amount, maker_amount, fee, fillable_taker, expected_maker, expected_fee) in &[
            (100_u64, 200_u64, 10_u64, 100_u64, 200_u64, 10_u64),
            (100, 200, 10, 50, 100, 5),
            (3, 10, 0, 1, 3, 0),
            (0, 10, 0, 0, 0, 0),
        ] {
            let mut order = native_order(NativeOrderKind::Limit, *maker_amount, *taker_amount);
            order.order.taker_token_fee_amount = U256::from(*fee);
            let with_amounts = order.with_fillable_taker_amount(U256::from(*fillable_taker));
            assert_eq!(with_amounts.fillable_maker_amount, U256::from(*expected_maker));
            assert_eq!(with_amounts.fillable_taker_fee_amount, U256::from(*expected_fee));
        }
    }

    #[test]
    fn test_dummy_order_is_empty() {
        let dummy = SignedNativeOrder::dummy(address_from_str("B"), address_from_str("A"));
        assert_eq!(dummy.kind, NativeOrderKind::Limit);
        assert!(dummy.order.maker_amount.is_zero());
        assert_eq!(dummy.order.maker_token, address_from_str("B"));
        assert_eq!(dummy.signature, Signature::invalid());
    }

    #[test]
    fn test_protocol_fee_only_for_limit() {
        assert!(OrderType::Limit.has_protocol_fee());
        assert!(!OrderType::Rfq.has_protocol_fee());
        assert!(!OrderType::Otc.has_protocol_fee());
        assert!(!OrderType::Bridge.has_protocol_fee());
    }
}
