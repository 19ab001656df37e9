//! Wire types of the RFQ service and their conversion into native orders.
//!
//! Amounts travel as decimal strings.

use std::collections::BTreeMap;

use alloy::primitives::{Address, B256, U256};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::market::order::{NativeOrder, NativeOrderKind, NativeOrderWithFillableAmounts, Signature, SignedNativeOrder};
use crate::market::side::Side;

/// Serde for `U256` as a decimal string; `0x`-prefixed hex is accepted on input.
pub mod decimal_u256 {
    use std::str::FromStr;

    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes `value` as a decimal string.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Parses a decimal or hex string, or a JSON number.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid unsigned amount.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Amount {
            Text(String),
            Number(u64),
        }
        match Amount::deserialize(deserializer)? {
            Amount::Text(text) => U256::from_str(text.trim()).map_err(de::Error::custom),
            Amount::Number(n) => Ok(U256::from(n)),
        }
    }
}

/// A pair an alternative market maker trades.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltOffering {
    /// Market id on the maker's side
    pub id: String,
    /// Base token
    pub base_asset: Address,
    /// Quote token
    pub quote_asset: Address,
    /// Base token decimals
    pub base_asset_decimals: u8,
    /// Quote token decimals
    pub quote_asset_decimals: u8,
}

impl AltOffering {
    /// Returns `true` if this offering trades `a` against `b`, in either direction.
    #[must_use]
    pub fn is_pair(&self, a: Address, b: Address) -> bool {
        (self.base_asset == a && self.quote_asset == b) || (self.base_asset == b && self.quote_asset == a)
    }
}

/// Offerings of alternative market makers, keyed by maker endpoint.
pub type AltRfqMakerAssetOfferings = BTreeMap<String, Vec<AltOffering>>;

/// Keeps, per endpoint, the first offering trading `maker_token` against `taker_token`.
#[must_use]
pub fn filter_offerings_to_pair(
    offerings: &AltRfqMakerAssetOfferings,
    maker_token: Address,
    taker_token: Address,
) -> AltRfqMakerAssetOfferings {
    offerings
        .iter()
        .filter_map(|(endpoint, offerings)| {
            offerings
                .iter()
                .find(|o| o.is_pair(maker_token, taker_token))
                .map(|o| (endpoint.clone(), vec![o.clone()]))
        })
        .collect()
}

/// Request of the v1 price and quote endpoints.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqtV1Request {
    /// Alternative market makers offering the pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_rfq_asset_offerings: Option<AltRfqMakerAssetOfferings>,
    /// Requested amount
    #[serde(with = "decimal_u256")]
    pub asset_fill_amount: U256,
    /// Chain id
    pub chain_id: u64,
    /// Rate of the best route without RFQ, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_price: Option<f64>,
    /// Integrator asking
    pub integrator_id: String,
    /// `true` for firm quotes
    pub intent_on_filling: bool,
    /// Token the taker receives
    pub maker_token: Address,
    /// Sell or buy
    pub market_operation: Side,
    /// Taker of the order
    pub taker_address: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Transaction origin the order is bound to
    pub tx_origin: Address,
}

/// Request of the v2 price and quote endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqtV2Request {
    /// Requested amount
    #[serde(with = "decimal_u256")]
    pub asset_fill_amount: U256,
    /// Chain id
    pub chain_id: u64,
    /// Integrator asking
    pub integrator_id: String,
    /// `true` for firm quotes
    pub intent_on_filling: bool,
    /// Token the taker receives
    pub maker_token: Address,
    /// Sell or buy
    pub market_operation: Side,
    /// Taker of the order
    pub taker_address: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Transaction origin the order is bound to
    pub tx_origin: Address,
}

impl From<&RfqtV1Request> for RfqtV2Request {
    fn from(request: &RfqtV1Request) -> Self {
        Self {
            asset_fill_amount: request.asset_fill_amount,
            chain_id: request.chain_id,
            integrator_id: request.integrator_id.clone(),
            intent_on_filling: request.intent_on_filling,
            maker_token: request.maker_token,
            market_operation: request.market_operation,
            taker_address: request.taker_address,
            taker_token: request.taker_token,
            tx_origin: request.tx_origin,
        }
    }
}

/// Kind of liquidity behind a v1 price.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceKind {
    /// Settles as an RFQ order
    Rfq,
    /// Settles as an OTC order
    Otc,
}

/// Indicative v1 price.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqtV1Price {
    /// Expiry as a unix timestamp in seconds
    #[serde(with = "decimal_u256")]
    pub expiry: U256,
    /// Kind of order a firm quote would be
    pub kind: PriceKind,
    /// Maker amount
    #[serde(with = "decimal_u256")]
    pub maker_amount: U256,
    /// Token the taker receives
    pub maker_token: Address,
    /// Maker endpoint
    pub maker_uri: String,
    /// Taker amount
    #[serde(with = "decimal_u256")]
    pub taker_amount: U256,
    /// Token the taker gives
    pub taker_token: Address,
}

/// Response of `/rfqt/v1/prices`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RfqtV1PricesResponse {
    /// Prices returned
    #[serde(default)]
    pub prices: Vec<RfqtV1Price>,
}

/// A signed RFQ order as sent by the service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqOrderPayload {
    /// Token the maker gives
    pub maker_token: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Maker amount
    #[serde(with = "decimal_u256")]
    pub maker_amount: U256,
    /// Taker amount
    #[serde(with = "decimal_u256")]
    pub taker_amount: U256,
    /// Maker
    pub maker: Address,
    /// Restricted taker
    pub taker: Address,
    /// Chain id
    pub chain_id: u64,
    /// Exchange proxy
    pub verifying_contract: Address,
    /// Restricted transaction origin
    pub tx_origin: Address,
    /// Liquidity pool id
    pub pool: B256,
    /// Salt
    #[serde(with = "decimal_u256")]
    pub salt: U256,
    /// Expiry as a unix timestamp in seconds
    #[serde(with = "decimal_u256")]
    pub expiry: U256,
}

impl From<RfqOrderPayload> for NativeOrder {
    fn from(order: RfqOrderPayload) -> Self {
        Self {
            maker_token: order.maker_token,
            taker_token: order.taker_token,
            maker_amount: order.maker_amount,
            taker_amount: order.taker_amount,
            taker_token_fee_amount: U256::ZERO,
            maker: order.maker,
            taker: order.taker,
            tx_origin: order.tx_origin,
            pool: order.pool,
            expiry: order.expiry.saturating_to(),
            salt: order.salt,
            chain_id: order.chain_id,
            verifying_contract: order.verifying_contract,
        }
    }
}

/// Firm v1 quote.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqtV1Quote {
    /// Maker endpoint
    pub maker_uri: String,
    /// The signed order
    pub order: RfqOrderPayload,
    /// Maker signature
    pub signature: Signature,
}

impl From<RfqtV1Quote> for SignedNativeOrder {
    fn from(quote: RfqtV1Quote) -> Self {
        Self {
            kind: NativeOrderKind::Rfq,
            order: quote.order.into(),
            signature: quote.signature,
        }
    }
}

/// Response of `/rfqt/v1/quotes`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RfqtV1QuotesResponse {
    /// Quotes returned
    #[serde(default)]
    pub quotes: Vec<RfqtV1Quote>,
}

/// Indicative v2 price.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqtV2Price {
    /// Expiry as a unix timestamp in seconds
    #[serde(with = "decimal_u256")]
    pub expiry: U256,
    /// Maker signing the order
    pub maker_address: Address,
    /// Maker amount
    #[serde(with = "decimal_u256")]
    pub maker_amount: U256,
    /// Maker id on the service
    pub maker_id: String,
    /// Token the taker receives
    pub maker_token: Address,
    /// Maker endpoint
    pub maker_uri: String,
    /// Taker amount
    #[serde(with = "decimal_u256")]
    pub taker_amount: U256,
    /// Token the taker gives
    pub taker_token: Address,
}

/// Response of `/internal/rfqt/v2/prices`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RfqtV2PricesResponse {
    /// Prices returned
    #[serde(default)]
    pub prices: Vec<RfqtV2Price>,
}

/// A signed OTC order as sent by the service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtcOrderPayload {
    /// Token the maker gives
    pub maker_token: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Maker amount
    #[serde(with = "decimal_u256")]
    pub maker_amount: U256,
    /// Taker amount
    #[serde(with = "decimal_u256")]
    pub taker_amount: U256,
    /// Maker
    pub maker: Address,
    /// Restricted taker
    pub taker: Address,
    /// Chain id
    pub chain_id: u64,
    /// Exchange proxy
    pub verifying_contract: Address,
    /// Restricted transaction origin
    pub tx_origin: Address,
    /// Expiry in the top 64 bits, nonce bucket and nonce below
    #[serde(with = "decimal_u256")]
    pub expiry_and_nonce: U256,
}

impl OtcOrderPayload {
    /// Expiry in unix seconds, the top 64 bits of `expiry_and_nonce`.
    #[must_use]
    pub fn expiry(&self) -> u64 {
        (self.expiry_and_nonce >> 192_usize).saturating_to()
    }
}

impl From<OtcOrderPayload> for NativeOrder {
    fn from(order: OtcOrderPayload) -> Self {
        Self {
            maker_token: order.maker_token,
            taker_token: order.taker_token,
            maker_amount: order.maker_amount,
            taker_amount: order.taker_amount,
            taker_token_fee_amount: U256::ZERO,
            maker: order.maker,
            taker: order.taker,
            tx_origin: order.tx_origin,
            pool: B256::ZERO,
            expiry: order.expiry(),
            salt: order.expiry_and_nonce,
            chain_id: order.chain_id,
            verifying_contract: order.verifying_contract,
        }
    }
}

/// Firm v2 quote; the service reports fillable amounts itself.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqtV2Quote {
    /// Maker amount that can be filled
    #[serde(with = "decimal_u256")]
    pub fillable_maker_amount: U256,
    /// Taker amount that can be filled
    #[serde(with = "decimal_u256")]
    pub fillable_taker_amount: U256,
    /// Taker fee on the fillable amount
    #[serde(with = "decimal_u256")]
    pub fillable_taker_fee_amount: U256,
    /// Maker id on the service
    pub maker_id: String,
    /// Maker endpoint
    pub maker_uri: String,
    /// The signed order
    pub order: OtcOrderPayload,
    /// Maker signature
    pub signature: Signature,
}

impl From<RfqtV2Quote> for NativeOrderWithFillableAmounts {
    fn from(quote: RfqtV2Quote) -> Self {
        Self {
            kind: NativeOrderKind::Otc,
            order: quote.order.into(),
            signature: quote.signature,
            fillable_maker_amount: quote.fillable_maker_amount,
            fillable_taker_amount: quote.fillable_taker_amount,
            fillable_taker_fee_amount: quote.fillable_taker_fee_amount,
        }
    }
}

/// Response of `/internal/rfqt/v2/quotes`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RfqtV2QuotesResponse {
    /// Quotes returned
    #[serde(default)]
    pub quotes: Vec<RfqtV2Quote>,
}

/// A non-binding price from a market maker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicativeQuote {
    /// Token the taker receives
    pub maker_token: Address,
    /// Token the taker gives
    pub taker_token: Address,
    /// Maker amount
    pub maker_amount: U256,
    /// Taker amount
    pub taker_amount: U256,
    /// Expiry as a unix timestamp in seconds
    pub expiry: u64,
    /// Maker endpoint
    pub maker_uri: String,
}

impl IndicativeQuote {
    /// The quote as an unsigned RFQ order, fully fillable, for the optimizer
    /// to price like any other native order.
    #[must_use]
    pub fn to_native_order(&self) -> NativeOrderWithFillableAmounts {
        NativeOrderWithFillableAmounts {
            kind: NativeOrderKind::Rfq,
            order: NativeOrder {
                maker_token: self.maker_token,
                taker_token: self.taker_token,
                maker_amount: self.maker_amount,
                taker_amount: self.taker_amount,
                expiry: self.expiry,
                ..NativeOrder::default()
            },
            signature: Signature::invalid(),
            fillable_maker_amount: self.maker_amount,
            fillable_taker_amount: self.taker_amount,
            fillable_taker_fee_amount: U256::ZERO,
        }
    }
}

impl From<RfqtV1Price> for IndicativeQuote {
    fn from(price: RfqtV1Price) -> Self {
        Self {
            maker_token: price.maker_token,
            taker_token: price.taker_token,
            maker_amount: price.maker_amount,
            taker_amount: price.taker_amount,
            expiry: price.expiry.saturating_to(),
            maker_uri: price.maker_uri,
        }
    }
}

impl From<RfqtV2Price> for IndicativeQuote {
    fn from(price: RfqtV2Price) -> Self {
        Self {
            maker_token: price.maker_token,
            taker_token: price.taker_token,
            maker_amount: price.maker_amount,
            taker_amount: price.taker_amount,
            expiry: price.expiry.saturating_to(),
            maker_uri: price.maker_uri,
        }
    }
}
