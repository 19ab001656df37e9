use std::collections::HashMap;
use std::sync::OnceLock;

use alloy::primitives::{address, Address, U256};

use crate::market::source::Source;

/// Mainnet chain id
pub const MAINNET_CHAIN_ID: u64 = 1;

/// Wrapped ether on mainnet
pub const WETH: Address = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
/// USDC on mainnet
pub const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
/// USDT on mainnet
pub const USDT: Address = address!("0xdAC17F958D2ee523a2206206994597C13D831ec7");
/// DAI on mainnet
pub const DAI: Address = address!("0x6B175474E89094C44Da98b954EedeAC495271d0F");
/// WBTC on mainnet
pub const WBTC: Address = address!("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599");

/// Sampler contract on mainnet
pub const SAMPLER_ADDRESS: Address = address!("0xd8c38704c9937ea3312de29f824b4ad3450a5e61");
/// 0x exchange proxy on mainnet
pub const EXCHANGE_PROXY: Address = address!("0xDef1C0ded9bec7F1a1670819833240f027b25EfF");
/// Uniswap V2 router on mainnet
pub const UNISWAP_V2_ROUTER: Address = address!("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D");
/// SushiSwap router on mainnet
pub const SUSHISWAP_ROUTER: Address = address!("0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F");
/// Uniswap V3 quoter on mainnet
pub const UNISWAP_V3_QUOTER: Address = address!("0x61fFE014bA17989E743c5F6cB21bF9697530B21e");
/// Uniswap V3 swap router on mainnet
pub const UNISWAP_V3_ROUTER: Address = address!("0xE592427A0AEce92De3Edee1F18E0157C05861564");
/// Curve 3pool (DAI/USDC/USDT)
pub const CURVE_3POOL: Address = address!("0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7");

/// Samples per source curve
pub const DEFAULT_NUM_SAMPLES: usize = 13;
/// Geometric base of the sample distribution
pub const DEFAULT_SAMPLE_DISTRIBUTION_BASE: f64 = 1.05;
/// Chunks the router splits the requested amount into, per sample
pub const DEFAULT_ROUTER_NUM_SAMPLES: usize = 14;
/// Slippage applied to bridge outputs in the worst case
pub const DEFAULT_BRIDGE_SLIPPAGE: f64 = 0.005;
/// Linear points a native order is expanded into for the router
pub const NATIVE_ORDER_CURVE_POINTS: usize = 13;
/// Curves with fewer samples than this are ignored by the router
pub const MIN_ROUTER_CURVE_SAMPLES: usize = 3;
/// Limit orders expiring within this many seconds are pruned
pub const LIMIT_ORDER_EXPIRY_BUFFER_SECS: u64 = 30;
/// Amount of the native token used to price the input and output tokens in ETH
pub const NATIVE_FEE_TOKEN_AMOUNT: u128 = 1_000_000_000_000_000_000;

/// Gas of settling any native order
pub const NATIVE_ORDER_GAS: u64 = 100_000;
/// Gas multiplier of the protocol fee charged on limit orders
pub const PROTOCOL_FEE_MULTIPLIER: u64 = 0;
/// Gas of a single Uniswap V2 style hop
pub const UNISWAP_V2_GAS: u64 = 90_000;
/// Gas of every extra hop in a Uniswap V2 style path
pub const UNISWAP_V2_EXTRA_HOP_GAS: u64 = 60_000;
/// Gas of a Uniswap V3 swap before the pools' measured gas
pub const UNISWAP_V3_BASE_GAS: u64 = 34_000;
/// Gas of a Curve pool without a pool-specific schedule
pub const CURVE_DEFAULT_GAS: u64 = 600_000;
/// Gas of a liquidity provider without a registered cost
pub const LIQUIDITY_PROVIDER_DEFAULT_GAS: u64 = 100_000;
/// Gas added on top of both hops of a two-hop fill
pub const MULTI_HOP_GAS_OVERHEAD: u64 = 30_000;
/// Base gas of every transaction
pub const TX_BASE_GAS: u64 = 21_000;
/// Gas of routing through the generic fill-quote transformer
pub const FILL_QUOTE_TRANSFORMER_GAS_OVERHEAD: u64 = 150_000;

/// Placeholder amount for second-hop inputs that are determined at execution time
pub const MAX_UINT256: U256 = U256::MAX;

/// Sources valid for sells on mainnet
pub const SELL_SOURCES: [Source; 7] = [
    Source::Native,
    Source::UniswapV2,
    Source::SushiSwap,
    Source::UniswapV3,
    Source::Curve,
    Source::LiquidityProvider,
    Source::MultiHop,
];

/// Sources valid for buys on mainnet
pub const BUY_SOURCES: [Source; 7] = SELL_SOURCES;

/// Sources with a dedicated exchange-proxy entry point
pub const VIP_SOURCES: [Source; 6] = [
    Source::UniswapV2,
    Source::SushiSwap,
    Source::UniswapV3,
    Source::Curve,
    Source::LiquidityProvider,
    Source::Native,
];

/// Sources used to price tokens in ETH for gas penalties
pub const FEE_QUOTE_SOURCES: [Source; 3] = [Source::UniswapV2, Source::SushiSwap, Source::UniswapV3];

/// Tokens every token is assumed to be adjacent to
pub const DEFAULT_INTERMEDIATE_TOKENS: [Address; 4] = [WETH, USDC, USDT, DAI];

/// Addresses of the contracts the quoter talks to on one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractAddresses {
    /// Wrapped native token
    pub ether_token: Address,
    /// Exchange proxy native orders are signed for
    pub exchange_proxy: Address,
    /// Batched sampler
    pub sampler: Address,
    /// Uniswap V2 router
    pub uniswap_v2_router: Address,
    /// SushiSwap router
    pub sushiswap_router: Address,
    /// Uniswap V3 quoter
    pub uniswap_v3_quoter: Address,
    /// Uniswap V3 router
    pub uniswap_v3_router: Address,
}

/// Process-wide cache of resolved contract addresses; written once per chain.
static CONTRACT_ADDRESSES: OnceLock<HashMap<u64, ContractAddresses>> = OnceLock::new();

/// Returns the contract addresses for `chain_id`, if the chain is known.
#[must_use]
pub fn contract_addresses(chain_id: u64) -> Option<&'static ContractAddresses> {
    CONTRACT_ADDRESSES
        .get_or_init(|| {
            HashMap::from([(
                MAINNET_CHAIN_ID,
                ContractAddresses {
                    ether_token: WETH,
                    exchange_proxy: EXCHANGE_PROXY,
                    sampler: SAMPLER_ADDRESS,
                    uniswap_v2_router: UNISWAP_V2_ROUTER,
                    sushiswap_router: SUSHISWAP_ROUTER,
                    uniswap_v3_quoter: UNISWAP_V3_QUOTER,
                    uniswap_v3_router: UNISWAP_V3_ROUTER,
                },
            )])
        })
        .get(&chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_addresses() {
        let mainnet = contract_addresses(MAINNET_CHAIN_ID);
        assert_eq!(mainnet.map(|c| c.ether_token), Some(WETH));
        assert!(contract_addresses(424_242).is_none());
    }
}
