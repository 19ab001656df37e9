//! # Market Module
//!
//! Liquidity model of the quoter: the sources and orders a swap can be routed
//! through, the candidate fills built from them, and the paths the optimizer
//! selects. `assembler` ties sampling, RFQ and optimization together.

/// Sampling, RFQ and optimization for one side of a swap
pub mod assembler;
/// Candidate fills and their gas penalty
pub mod fill;
/// Source-specific settlement data
pub mod fill_data;
/// Liquidity snapshots
pub mod liquidity;
/// Native and optimized orders
pub mod order;
/// Optimized paths and their orders
pub mod path;
/// Sell or buy
pub mod side;
/// Liquidity sources and filters
pub mod source;
/// Test helpers and utilities
#[cfg(test)]
pub(crate) mod test_helpers;

pub use liquidity::{DexSample, MarketSideLiquidity, RawQuotes};
pub use path::Path;
pub use side::Side;
pub use source::{Source, SourceFilters, SourceFlags};
