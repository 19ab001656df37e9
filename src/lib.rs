/*!
 * # Swap Quoter - DEX Aggregation Quote Engine
 *
 * Quotes the best price for swapping one ERC-20 token for another by sampling
 * on-chain liquidity sources, resting limit orders and RFQ market makers, and
 * choosing the combination of fills that gives the most output (or costs the
 * least input) net of gas.
 *
 * ## Core Features
 *
 * - **Batched Sampling**: Every source curve is sampled in one `eth_call` round trip
 * - **Path Optimization**: Splits the amount across sources, two-hop routes and native orders
 * - **RFQ Re-pass**: Market-maker quotes, priced against the first pass, can improve the path
 * - **Quote Info**: Best and worst case amounts with a per-source breakdown
 *
 * ## Module Structure
 *
 * - `config`: Configuration from the environment
 * - `error`: Errors surfaced to callers
 * - `gas`: Background gas price poller
 * - `market`: Liquidity model, from sources to paths
 * - `optimizer`: Router, fee schedule and path selection
 * - `quote`: Quote info and the quoting entry point
 * - `rfq`: RFQ policy, transport and the two-pass protocol
 * - `sampler`: Batched sampler operations and the sampler contract
 * - `token_graph`: Intermediate tokens for two-hop routes
 * - `utils`: Utility functions and helpers
 */

/// Configuration management
pub mod config;
/// Errors surfaced to callers
pub mod error;
/// Gas price poller
pub mod gas;
/// Liquidity model
pub mod market;
/// Path optimization
pub mod optimizer;
/// Quote info and the quoter
pub mod quote;
/// Request-for-quote liquidity
pub mod rfq;
/// Batched on-chain sampling
pub mod sampler;
/// Token adjacency graph
pub mod token_graph;
/// Utility functions and helpers
pub mod utils;

pub use error::AggregationError;
pub use quote::{SwapQuote, SwapQuoteRequestOpts, SwapQuoter};
