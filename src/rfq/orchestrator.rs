//! The two-pass RFQ protocol.
//!
//! The pre-pass optimizes DEX and open-orderbook liquidity. When the request
//! may use RFQ, market makers are then asked for quotes, priced against the
//! pre-pass result. Any quote coming back produces a new snapshot that is
//! optimized once more; the second pass is final and its failure is reported.

use std::collections::BTreeSet;
use std::time::Instant;

use alloy::primitives::{Address, U256};
use log::info;

use super::policy::RfqRequestOpts;
use super::types::{filter_offerings_to_pair, IndicativeQuote, RfqtV1Request, RfqtV2Request};
use super::validator::firm_quotes_with_fillable_amounts;
use super::RfqTransport;
use crate::error::AggregationError;
use crate::market::assembler::{GetMarketOrdersOpts, MarketOperations, OptimizerResult};
use crate::market::liquidity::MarketSideLiquidity;
use crate::market::order::{NativeOrderWithFillableAmounts, SignedNativeOrder};
use crate::market::side::Side;
use crate::market::source::Source;
use crate::optimizer::fees::IdentityFillAdjustor;
use crate::optimizer::OptimizerOpts;

/// Where the protocol stands for one request.
enum Phase {
    /// Optimizing DEX and open-orderbook liquidity only
    PrePass,
    /// Optimizing again with RFQ liquidity added
    RfqRepass(MarketSideLiquidity),
}

impl MarketOperations {
    /// Gathers liquidity for `amount` on `side` and returns the best path,
    /// asking market makers for quotes when the request allows it.
    ///
    /// `limit_orders` must hold at least one order, a dummy one for the pair
    /// when there is no real order.
    ///
    /// # Errors
    ///
    /// * `EmptyOrders` if `limit_orders` is empty
    /// * `Sampler` if liquidity cannot be sampled
    /// * `NoOptimalPath` if neither pass finds a path, or if the RFQ re-pass
    ///   runs and finds none
    pub async fn get_optimizer_result(
        &self,
        maker_token: Address,
        taker_token: Address,
        limit_orders: &[SignedNativeOrder],
        amount: U256,
        side: Side,
        opts: &GetMarketOrdersOpts,
    ) -> Result<OptimizerResult, AggregationError> {
        if limit_orders.is_empty() {
            return Err(AggregationError::EmptyOrders);
        }
        let liquidity = self
            .get_market_liquidity(side, maker_token, taker_token, limit_orders, amount, opts)
            .await?;
        let fee_schedule = opts.fee_schedule();
        let pre_pass_opts = OptimizerOpts {
            fee_schedule: &fee_schedule,
            exchange_proxy_overhead: opts.exchange_proxy_overhead,
            router_num_samples: opts.router_num_samples,
            fill_adjustor: &IdentityFillAdjustor,
        };
        let repass_opts = OptimizerOpts {
            fill_adjustor: opts.fill_adjustor.as_ref(),
            ..pre_pass_opts
        };

        let mut phase = Phase::PrePass;
        loop {
            phase = match phase {
                Phase::PrePass => {
                    let pre_pass = match self.generate_optimized_orders(&liquidity, &pre_pass_opts) {
                        Ok(result) => Some(result),
                        Err(AggregationError::NoOptimalPath) => {
                            info!("optimizer: no optimal path in the pre-pass");
                            None
                        }
                        Err(e) => return Err(e),
                    };
                    let repass = match &opts.rfqt {
                        Some(rfqt) => self.request_rfq_liquidity(&liquidity, pre_pass.as_ref(), rfqt).await,
                        None => None,
                    };
                    match repass {
                        Some(extended) => Phase::RfqRepass(extended),
                        None => return pre_pass.ok_or(AggregationError::NoOptimalPath),
                    }
                }
                Phase::RfqRepass(extended) => {
                    return self.generate_optimized_orders(&extended, &repass_opts).inspect_err(|_| {
                        info!("optimizer: no optimal path in the RFQ re-pass");
                    });
                }
            };
        }
    }

    /// Asks market makers for quotes and returns the extended snapshot, or
    /// `None` when RFQ does not apply or nothing came back.
    async fn request_rfq_liquidity(
        &self,
        liquidity: &MarketSideLiquidity,
        pre_pass: Option<&OptimizerResult>,
        rfqt: &RfqRequestOpts,
    ) -> Option<MarketSideLiquidity> {
        let transport = self.rfq_transport.as_deref()?;
        if !liquidity.is_rfq_supported || !liquidity.quote_source_filters.is_allowed(Source::Native) {
            return None;
        }
        let started = Instant::now();
        let request = self.rfq_request(liquidity, pre_pass, rfqt);
        let v2_request = RfqtV2Request::from(&request);

        let mut quotes = liquidity.quotes.clone();
        if rfqt.is_indicative {
            let indicative = indicative_quotes(transport, &request, &v2_request).await;
            info!(
                "rfq: {} indicative quotes in {}ms",
                indicative.len(),
                started.elapsed().as_millis()
            );
            if indicative.is_empty() {
                return None;
            }
            quotes.rfqt_indicative_quotes = indicative;
        } else {
            let firm = self.firm_quotes(transport, &request, &v2_request).await;
            info!("rfq: {} firm quotes in {}ms", firm.len(), started.elapsed().as_millis());
            if firm.is_empty() {
                return None;
            }
            quotes.native_orders = firm.into_iter().chain(quotes.native_orders).collect();
        }

        // RFQ liquidity does not change which DEX sources are worth routing through
        let pre_pass_sources: BTreeSet<Source> = pre_pass
            .map(|r| r.path.orders().iter().map(|o| o.source).collect())
            .unwrap_or_default();
        quotes
            .dex_quotes
            .retain(|q| q.first().is_some_and(|s| pre_pass_sources.contains(&s.source)));
        Some(liquidity.with_quotes(quotes))
    }

    /// The v1 request, priced against the pre-pass path when there is one.
    fn rfq_request(
        &self,
        liquidity: &MarketSideLiquidity,
        pre_pass: Option<&OptimizerResult>,
        rfqt: &RfqRequestOpts,
    ) -> RfqtV1Request {
        let (maker_token, taker_token) = liquidity.maker_taker_tokens();
        let offerings = filter_offerings_to_pair(&rfqt.alt_rfq_asset_offerings, maker_token, taker_token);
        RfqtV1Request {
            alt_rfq_asset_offerings: (!offerings.is_empty()).then_some(offerings),
            asset_fill_amount: liquidity.input_amount,
            chain_id: self.chain_id,
            comparison_price: pre_pass.map(|r| r.path.adjusted_rate()),
            integrator_id: rfqt.integrator_id.clone().unwrap_or_default(),
            intent_on_filling: rfqt.intent_on_filling,
            maker_token,
            market_operation: liquidity.side,
            taker_address: rfqt.taker_address,
            taker_token,
            tx_origin: rfqt.tx_origin.unwrap_or(Address::ZERO),
        }
    }

    /// Firm v1 and v2 quotes with their fillable amounts, v1 first.
    async fn firm_quotes(
        &self,
        transport: &dyn RfqTransport,
        request: &RfqtV1Request,
        v2_request: &RfqtV2Request,
    ) -> Vec<NativeOrderWithFillableAmounts> {
        let (v1, v2) = tokio::join!(transport.get_v1_quotes(request), transport.get_v2_quotes(v2_request));
        let v1: Vec<SignedNativeOrder> = v1.into_iter().map(SignedNativeOrder::from).collect();
        let mut firm = if v1.is_empty() {
            Vec::new()
        } else {
            firm_quotes_with_fillable_amounts(v1, self.firm_quote_validator.as_deref()).await
        };
        firm.extend(v2.into_iter().map(NativeOrderWithFillableAmounts::from));
        firm
    }
}

/// Indicative v1 and v2 prices, v1 first.
async fn indicative_quotes(
    transport: &dyn RfqTransport,
    request: &RfqtV1Request,
    v2_request: &RfqtV2Request,
) -> Vec<IndicativeQuote> {
    let (v1, v2) = tokio::join!(transport.get_v1_prices(request), transport.get_v2_prices(v2_request));
    v1.into_iter()
        .map(IndicativeQuote::from)
        .chain(v2.into_iter().map(IndicativeQuote::from))
        .collect()
}
