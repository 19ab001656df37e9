use thiserror::Error;

/// Failures surfaced to callers of the quoter.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// No combination of the available liquidity covers the requested amount
    #[error("no optimal path")]
    NoOptimalPath,
    /// No orders were given to quote against
    #[error("empty orders")]
    EmptyOrders,
    /// Native liquidity cannot be excluded when RFQ is the only native source
    #[error("native liquidity cannot be excluded if \"rfqt.nativeExclusivelyRFQ\" is set")]
    NativeExcludedWithRfqOnly,
    /// Firm quotes are bound to a transaction origin
    #[error("RFQ-T firm quote requests must specify a tx origin")]
    FirmQuoteWithoutTxOrigin,
    /// An RFQ-only request while the RFQ service is not configured
    #[error("RFQ-T service is not available")]
    RfqServiceUnavailable,
    /// Slippage outside `[0, 1]`
    #[error("invalid slippage: {0}")]
    InvalidSlippage(f64),
    /// The sampler round trip failed
    #[error("sampler error: {0}")]
    Sampler(eyre::Report),
    /// No gas price could be obtained
    #[error("gas price unavailable: {0}")]
    GasPrice(eyre::Report),
    /// An internal invariant broke while assembling the quote
    #[error("internal error: {0}")]
    Internal(eyre::Report),
}

impl AggregationError {
    /// Returns `true` for failures the caller reports as insufficient liquidity.
    #[must_use]
    pub const fn is_insufficient_liquidity(&self) -> bool {
        matches!(self, Self::NoOptimalPath)
    }
}
