//! # Quote Module
//!
//! Turns an optimized path into the quote handed to callers: best and worst
//! case amounts, the source breakdown and the quoter that ties gas price,
//! RFQ policy and liquidity together.

/// Best and worst case aggregates and the source breakdown
pub mod info;
/// Order-by-order fill simulation
pub mod simulation;
/// The quoting entry point
pub mod swap_quoter;

pub use info::{calculate_quote_info, QuoteInfo, SourceBreakdown, SwapQuoteInfo};
pub use swap_quoter::{SwapQuote, SwapQuoteRequestOpts, SwapQuoter};
