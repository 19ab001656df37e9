use alloy::primitives::U256;
use async_trait::async_trait;

use crate::market::order::{NativeOrder, NativeOrderWithFillableAmounts, SignedNativeOrder};

/// Estimates how much of each firm quote can actually be filled, e.g. from
/// maker balances.
#[async_trait]
pub trait RfqFirmQuoteValidator: Send + Sync {
    /// Fillable taker amount of each order, in order.
    async fn get_rfqt_taker_fillable_amounts(&self, orders: &[NativeOrder]) -> Vec<U256>;
}

/// Pairs firm quotes with their fillable amounts.
///
/// Without a validator every quote is trusted for its full taker amount.
/// Otherwise the maker amount is derated to `maker * fillable_taker / taker`,
/// rounded down; a quote the validator gave no estimate for is not fillable.
pub async fn firm_quotes_with_fillable_amounts(
    quotes: Vec<SignedNativeOrder>,
    validator: Option<&dyn RfqFirmQuoteValidator>,
) -> Vec<NativeOrderWithFillableAmounts> {
    let fillable_taker_amounts: Vec<U256> = match validator {
        None => quotes.iter().map(|q| q.order.taker_amount).collect(),
        Some(validator) => {
            let orders: Vec<NativeOrder> = quotes.iter().map(|q| q.order.clone()).collect();
            let amounts = validator.get_rfqt_taker_fillable_amounts(&orders).await;
            if amounts.len() != quotes.len() {
                log::warn!(
                    "rfq: validator returned {} amounts for {} quotes",
                    amounts.len(),
                    quotes.len()
                );
            }
            amounts
        }
    };
    quotes
        .into_iter()
        .enumerate()
        .map(|(i, quote)| {
            let fillable = fillable_taker_amounts.get(i).copied().unwrap_or_default();
            let mut with_amounts = quote.with_fillable_taker_amount(fillable);
            with_amounts.fillable_taker_fee_amount = U256::ZERO;
            with_amounts
        })
        .collect()
}
