//! # Sampler Module
//!
//! Samples every liquidity source's price curve through one batched call to the
//! on-chain sampler contract. A source that reverts degrades to an empty curve
//! and never fails the batch.

use std::sync::Arc;

use alloy::primitives::{Bytes, U256};
use eyre::{bail, Result};
use log::debug;

use crate::utils::math::{scale_amount, Rounding};

/// Sampler contract bindings and test double
pub mod contract;
/// Batchable operations
pub mod operation;
/// Per-source operations
pub mod sources;

pub use contract::{AlloySamplerContract, CallResult, MockSamplerContract, SamplerContract};
pub use operation::{BatchedOperation, SamplerOutput};
pub use sources::{LiquidityProviderInfo, SamplerOperations};

/// Ascending amounts at which to probe a source, geometrically spaced.
///
/// Step `i` weighs `base^i`; the weights are normalized to sum to one and each
/// amount is the rounded-up running total. The last amount is always exactly
/// `max_fill_amount`.
///
/// # Arguments
///
/// * `max_fill_amount` - the full requested amount
/// * `num_samples` - how many amounts to return
/// * `base` - growth of the step size, `1.0` for even spacing
#[must_use]
pub fn get_sample_amounts(max_fill_amount: U256, num_samples: usize, base: f64) -> Vec<U256> {
    if num_samples == 0 {
        return Vec::new();
    }
    let distribution: Vec<f64> = (0..num_samples)
        .map(|i| base.powi(i32::try_from(i).unwrap_or(i32::MAX)))
        .collect();
    let total: f64 = distribution.iter().sum();
    let mut cumulative = 0.0;
    distribution
        .iter()
        .enumerate()
        .map(|(i, weight)| {
            if i == num_samples - 1 {
                return max_fill_amount;
            }
            cumulative += weight / total;
            scale_amount(max_fill_amount, cumulative, Rounding::Up).min(max_fill_amount)
        })
        .collect()
}

/// Runs batches of sampler operations against one sampler contract.
#[derive(Clone)]
pub struct DexOrderSampler {
    /// The contract executing the batches
    contract: Arc<dyn SamplerContract>,
    /// Operation factory for the chain
    ops: SamplerOperations,
}

impl DexOrderSampler {
    /// Creates a sampler over `contract`.
    #[must_use]
    pub fn new(contract: Arc<dyn SamplerContract>, ops: SamplerOperations) -> Self {
        Self { contract, ops }
    }

    /// Operation factory for the chain.
    #[must_use]
    pub const fn ops(&self) -> &SamplerOperations {
        &self.ops
    }

    /// Executes `ops` in a single round trip and decodes their results in order.
    ///
    /// No-op operations are answered locally; when every operation is a no-op the
    /// contract is not called at all. A reverted operation is decoded by its own
    /// revert handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails, if the contract returns the
    /// wrong number of results, or if an operation that cannot tolerate a revert
    /// reverts.
    pub async fn execute_batch(&self, ops: &[Box<dyn BatchedOperation>]) -> Result<Vec<SamplerOutput>> {
        let call_datas: Vec<Bytes> = ops.iter().map(|op| op.encode_call()).collect();
        let calls: Vec<Bytes> = call_datas.iter().filter(|c| !c.is_empty()).cloned().collect();
        if calls.is_empty() {
            return ops.iter().map(|op| op.handle_call_results(&[])).collect();
        }

        debug!("sampler: executing batch of {} calls", calls.len());
        let expected = calls.len();
        let results = self.contract.batch_call(calls).await?;
        if results.len() != expected {
            bail!("sampler returned {} results for {expected} calls", results.len());
        }

        let mut results = results.into_iter();
        ops.iter()
            .zip(&call_datas)
            .map(|(op, call_data)| {
                if call_data.is_empty() {
                    return op.handle_call_results(&[]);
                }
                match results.next() {
                    Some(CallResult { success: true, data }) => op.handle_call_results(&data),
                    Some(CallResult { success: false, data }) => op.handle_revert(&data),
                    None => bail!("sampler results exhausted"),
                }
            })
            .collect()
    }
}
