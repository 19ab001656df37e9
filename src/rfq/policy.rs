//! Per-request RFQ policy: who may ask market makers for quotes, and when.

use std::collections::HashSet;

use alloy::primitives::Address;

use super::types::AltRfqMakerAssetOfferings;
use crate::error::AggregationError;
use crate::market::source::{Source, SourceFilters};

/// RFQ options of one quote request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RfqRequestOpts {
    /// Integrator asking, checked against the whitelist
    pub integrator_id: Option<String>,
    /// Transaction origin firm quotes are bound to
    pub tx_origin: Option<Address>,
    /// Taker of the orders, zero when the exchange proxy fills them
    pub taker_address: Address,
    /// `true` for firm quotes
    pub intent_on_filling: bool,
    /// `true` for indicative quotes
    pub is_indicative: bool,
    /// Native liquidity comes from RFQ only, the open orderbook is skipped
    pub native_exclusively_rfq: bool,
    /// Time makers have to answer
    pub maker_endpoint_max_response_time_ms: u64,
    /// Offerings of alternative market makers
    pub alt_rfq_asset_offerings: AltRfqMakerAssetOfferings,
}

/// Process-wide RFQ allow and deny lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RfqPolicy {
    /// Integrators allowed to request RFQ liquidity
    integrator_whitelist: HashSet<String>,
    /// Transaction origins never allowed to request RFQ liquidity
    tx_origin_blacklist: HashSet<Address>,
}

impl RfqPolicy {
    /// Creates a policy from the whitelist and the blacklist.
    #[must_use]
    pub fn new<I, A>(integrator_whitelist: I, tx_origin_blacklist: A) -> Self
    where
        I: IntoIterator<Item = String>,
        A: IntoIterator<Item = Address>,
    {
        Self {
            integrator_whitelist: integrator_whitelist.into_iter().collect(),
            tx_origin_blacklist: tx_origin_blacklist.into_iter().collect(),
        }
    }

    /// Returns `true` if `integrator_id` is given and whitelisted.
    #[must_use]
    pub fn is_integrator_whitelisted(&self, integrator_id: Option<&str>) -> bool {
        integrator_id.is_some_and(|id| self.integrator_whitelist.contains(id))
    }

    /// Returns `true` if `tx_origin` is given and blacklisted.
    #[must_use]
    pub fn is_tx_origin_blacklisted(&self, tx_origin: Option<Address>) -> bool {
        tx_origin.is_some_and(|origin| self.tx_origin_blacklist.contains(&origin))
    }

    /// Checks the RFQ options of a request before any network call is made.
    ///
    /// RFQ is disabled for the request (`Ok(None)`) when the integrator is not
    /// whitelisted or the transaction origin is blacklisted.
    ///
    /// # Errors
    ///
    /// * `NativeExcludedWithRfqOnly` if native liquidity is excluded while RFQ is
    ///   the only native source
    /// * `FirmQuoteWithoutTxOrigin` if firm quotes are asked for without a
    ///   transaction origin
    pub fn validate(
        &self,
        source_filters: &SourceFilters,
        rfqt: Option<RfqRequestOpts>,
    ) -> Result<Option<RfqRequestOpts>, AggregationError> {
        let Some(rfqt) = rfqt else {
            return Ok(None);
        };
        let native_allowed = source_filters.is_allowed(Source::Native);
        if rfqt.native_exclusively_rfq && !native_allowed {
            return Err(AggregationError::NativeExcludedWithRfqOnly);
        }

        if !self.is_integrator_whitelisted(rfqt.integrator_id.as_deref()) {
            log::warn!(
                "rfq: integrator {:?} is not whitelisted, disabling RFQ for the request",
                rfqt.integrator_id
            );
            return Ok(None);
        }

        if self.is_tx_origin_blacklisted(rfqt.tx_origin) {
            log::warn!(
                "rfq: tx origin {:?} is blacklisted, disabling RFQ for the request",
                rfqt.tx_origin
            );
            return Ok(None);
        }

        if rfqt.intent_on_filling && native_allowed && rfqt.tx_origin.map_or(true, |o| o.is_zero()) {
            return Err(AggregationError::FirmQuoteWithoutTxOrigin);
        }

        Ok(Some(rfqt))
    }
}

/// Whether a request asks for RFQ at all: an integrator is required, plus an
/// ETH sell through the forwarder, a taker address, or an indicative request.
#[must_use]
pub const fn should_enable_rfqt(
    has_integrator: bool,
    is_eth_sell: bool,
    has_taker_address: bool,
    is_indicative: bool,
) -> bool {
    has_integrator && (is_eth_sell || has_taker_address || is_indicative)
}

/// Fails fast when a request wants RFQ liquidity only while the RFQ service is off.
///
/// # Errors
///
/// Returns `RfqServiceUnavailable` in that case.
pub fn ensure_rfq_available(
    rfq_requested: bool,
    included_sources: &[Source],
    rfq_enabled: bool,
) -> Result<(), AggregationError> {
    if rfq_requested && included_sources == [Source::Native] && !rfq_enabled {
        return Err(AggregationError::RfqServiceUnavailable);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::market::test_helpers::address_from_str;

    fn policy() -> RfqPolicy {
        RfqPolicy::new(["integrator".to_string()], [address_from_str("blacklisted")])
    }

    fn opts() -> RfqRequestOpts {
        RfqRequestOpts {
            integrator_id: Some("integrator".to_string()),
            tx_origin: Some(address_from_str("origin")),
            intent_on_filling: true,
            maker_endpoint_max_response_time_ms: 600,
            ..RfqRequestOpts::default()
        }
    }

    fn all_sources() -> SourceFilters {
        SourceFilters::new(&[], &[], &[])
    }

    #[test]
    fn test_valid_firm_request_passes() {
        let validated = policy().validate(&all_sources(), Some(opts())).unwrap();
        assert_eq!(validated, Some(opts()));
        assert_eq!(policy().validate(&all_sources(), None).unwrap(), None);
    }

    #[test]
    fn test_firm_request_without_tx_origin_fails() {
        for tx_origin in &[None, Some(Address::ZERO)] {
            let request = RfqRequestOpts {
                tx_origin: *tx_origin,
                ..opts()
            };
            let err = policy().validate(&all_sources(), Some(request)).unwrap_err();
            assert!(matches!(err, AggregationError::FirmQuoteWithoutTxOrigin));
        }
        // indicative requests need no origin
        let indicative = RfqRequestOpts {
            tx_origin: None,
            intent_on_filling: false,
            is_indicative: true,
            ..opts()
        };
        assert!(policy().validate(&all_sources(), Some(indicative)).unwrap().is_some());
    }

    #[test]
    fn test_policy_disables_rfq() {
        for request in [
            RfqRequestOpts {
                integrator_id: Some("stranger".to_string()),
                ..opts()
            },
            RfqRequestOpts {
                integrator_id: None,
                ..opts()
            },
            RfqRequestOpts {
                tx_origin: Some(address_from_str("blacklisted")),
                ..opts()
            },
        ] {
            assert_eq!(policy().validate(&all_sources(), Some(request)).unwrap(), None);
        }
    }

    #[test]
    fn test_native_excluded_with_rfq_only_fails() {
        let filters = SourceFilters::new(&[], &[Source::Native], &[]);
        let request = RfqRequestOpts {
            native_exclusively_rfq: true,
            ..opts()
        };
        let err = policy().validate(&filters, Some(request)).unwrap_err();
        assert!(matches!(err, AggregationError::NativeExcludedWithRfqOnly));
        // without native, a firm request needs no origin either
        let request = RfqRequestOpts {
            tx_origin: None,
            ..opts()
        };
        assert!(policy().validate(&filters, Some(request)).unwrap().is_some());
    }

    #[test]
    fn test_should_enable_rfqt() {
        for (integrator, eth_sell, taker, indicative, expected) in &[
            (true, false, false, false, false),
            (true, true, false, false, true),
            (true, false, true, false, true),
            (true, false, false, true, true),
            (false, true, true, true, false),
        ] {
            assert_eq!(should_enable_rfqt(*integrator, *eth_sell, *taker, *indicative), *expected);
        }
    }

    #[test]
    fn test_ensure_rfq_available() {
        assert!(matches!(
            ensure_rfq_available(true, &[Source::Native], false),
            Err(AggregationError::RfqServiceUnavailable)
        ));
        assert!(ensure_rfq_available(true, &[Source::Native], true).is_ok());
        assert!(ensure_rfq_available(true, &[], false).is_ok());
        assert!(ensure_rfq_available(false, &[Source::Native], false).is_ok());
    }
}
