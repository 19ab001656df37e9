//! # RFQ Module
//!
//! Request-for-quote liquidity from market makers: the request policy, the HTTP
//! transport, firm-quote validation, the alternative market-maker offerings
//! and the two-pass protocol that folds RFQ quotes into the optimizer.

/// HTTP transport to the RFQ service
pub mod client;
/// Alternative market-maker offerings cache
pub mod offerings;
/// Pre-pass and RFQ re-pass
pub mod orchestrator;
/// Whitelist and blacklist policy
pub mod policy;
/// Wire types
pub mod types;
/// Firm-quote fillability
pub mod validator;

pub use client::{RfqClient, RfqTransport};
pub use policy::{RfqPolicy, RfqRequestOpts};
pub use types::IndicativeQuote;
pub use validator::RfqFirmQuoteValidator;
