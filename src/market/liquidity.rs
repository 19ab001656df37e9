use alloy::primitives::{Address, U256};
use serde::Serialize;

use super::fill::EthRates;
use super::fill_data::FillData;
use super::order::NativeOrderWithFillableAmounts;
use super::side::Side;
use super::source::{Source, SourceFilters};
use crate::rfq::types::IndicativeQuote;

/// One observed point of a source's price curve.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DexSample {
    /// Source sampled
    pub source: Source,
    /// Settlement data valid for this sample's size
    pub fill_data: FillData,
    /// Input amount probed
    pub input: U256,
    /// Output amount returned, zero when the source could not fill
    pub output: U256,
}

/// All liquidity gathered for one side of one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuotes {
    /// Native orders with fillable amounts
    pub native_orders: Vec<NativeOrderWithFillableAmounts>,
    /// Indicative RFQ quotes, empty until RFQ answers
    pub rfqt_indicative_quotes: Vec<IndicativeQuote>,
    /// One sampled curve per source route
    pub dex_quotes: Vec<Vec<DexSample>>,
    /// Two-hop samples at the full amount
    pub two_hop_quotes: Vec<DexSample>,
}

/// Immutable snapshot of the liquidity available for one side of a request.
/// The optimizer's sole input.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSideLiquidity {
    /// Sell or buy
    pub side: Side,
    /// Requested amount
    pub input_amount: U256,
    /// Token the requested amount is denominated in
    pub input_token: Address,
    /// Token the optimizer produces
    pub output_token: Address,
    /// ETH prices of the input and output tokens
    #[serde(skip)]
    pub eth_rates: EthRates,
    /// Sources this request may use
    #[serde(skip)]
    pub quote_source_filters: SourceFilters,
    /// Decimals of the maker token
    pub maker_token_decimals: u8,
    /// Decimals of the taker token
    pub taker_token_decimals: u8,
    /// The liquidity itself
    pub quotes: RawQuotes,
    /// `false` when the transaction origin is a contract
    pub is_rfq_supported: bool,
    /// Block the samples were taken at
    pub block_number: u64,
}

impl MarketSideLiquidity {
    /// Returns `(maker_token, taker_token)`.
    #[must_use]
    pub const fn maker_taker_tokens(&self) -> (Address, Address) {
        self.side.maker_taker(self.input_token, self.output_token)
    }

    /// A new snapshot with `quotes` replaced; the original is left untouched.
    #[must_use]
    pub fn with_quotes(&self, quotes: RawQuotes) -> Self {
        Self {
            quotes,
            ..self.clone()
        }
    }
}
