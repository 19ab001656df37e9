use alloy::primitives::{Address, Bytes, FixedBytes};
use serde::{Deserialize, Serialize};

use super::order::NativeOrderWithFillableAmounts;
use super::source::Source;

/// Identity of a Curve pool and the selectors used to quote it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePool {
    /// Pool contract
    pub pool_address: Address,
    /// Selector of the pool's `get_dy`-style function
    pub sell_quote_function_selector: FixedBytes<4>,
    /// Selector of the pool's `get_dx`-style function, zero when unsupported
    pub buy_quote_function_selector: FixedBytes<4>,
    /// Coins in pool index order
    pub tokens: Vec<Address>,
    /// Gas the pool's exchange function costs
    pub gas_schedule: u64,
}

/// One hop of a two-hop route.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HopSource {
    /// Source executing the hop
    pub source: Source,
    /// Settlement data for the hop
    pub fill_data: FillData,
}

/// Settlement data of a two-hop route.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiHopFillData {
    /// Taker token to intermediate token
    pub first_hop_source: HopSource,
    /// Intermediate token to maker token
    pub second_hop_source: HopSource,
    /// Token the route passes through
    pub intermediate_token: Address,
}

/// Source-specific settlement data, one variant per source family.
///
/// `SushiSwap` shares the `UniswapV2` shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FillData {
    /// Router plus token path for V2-style routers
    #[serde(rename_all = "camelCase")]
    UniswapV2 {
        /// Router contract
        router: Address,
        /// Tokens traversed, taker token first
        token_address_path: Vec<Address>,
    },
    /// Curve pool with coin indices
    #[serde(rename_all = "camelCase")]
    Curve {
        /// Pool identity
        pool: CurvePool,
        /// Index of the token sold
        from_token_idx: i128,
        /// Index of the token bought
        to_token_idx: i128,
    },
    /// Uniswap V3 quoter route for one sampled size
    #[serde(rename_all = "camelCase")]
    UniswapV3 {
        /// Swap router
        router: Address,
        /// Tokens traversed, taker token first
        token_address_path: Vec<Address>,
        /// Encoded pool path chosen by the quoter, empty when unknown
        uniswap_path: Bytes,
        /// Gas the quoter measured for this path
        gas_used: u64,
    },
    /// Registered liquidity provider
    #[serde(rename_all = "camelCase")]
    LiquidityProvider {
        /// Provider contract
        pool_address: Address,
        /// Gas cost declared by the provider registry
        gas_cost: u64,
    },
    /// Native limit, RFQ or OTC order
    Native(Box<NativeOrderWithFillableAmounts>),
    /// Two chained fills
    MultiHop(Box<MultiHopFillData>),
}

impl FillData {
    /// Returns the native order behind this fill, if any.
    #[must_use]
    pub fn native_order(&self) -> Option<&NativeOrderWithFillableAmounts> {
        match self {
            Self::Native(order) => Some(order),
            _ => None,
        }
    }

    /// Returns the two-hop data behind this fill, if any.
    #[must_use]
    pub fn multi_hop(&self) -> Option<&MultiHopFillData> {
        match self {
            Self::MultiHop(data) => Some(data),
            _ => None,
        }
    }

    /// Number of hops a V2-style token path takes, one for everything else.
    #[must_use]
    pub fn path_hops(&self) -> usize {
        match self {
            Self::UniswapV2 { token_address_path, .. }
            | Self::UniswapV3 { token_address_path, .. } => token_address_path.len().saturating_sub(1).max(1),
            _ => 1,
        }
    }
}
