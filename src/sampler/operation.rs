//! Batchable sampler operations.
//!
//! Every operation knows how to encode its call against the sampler contract and
//! how to decode both a successful result and a revert. An operation with an
//! empty call is a no-op and never reaches the network.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use eyre::{bail, eyre, Result};
use log::debug;

use super::contract::bindings::IERC20BridgeSampler;
use crate::market::fill_data::{FillData, HopSource, MultiHopFillData};
use crate::market::liquidity::DexSample;
use crate::market::source::Source;

/// Decoded result of one batched operation.
#[derive(Clone, Debug, PartialEq)]
pub enum SamplerOutput {
    /// Raw amounts, e.g. fillable taker amounts of native orders
    Amounts(Vec<U256>),
    /// Decimals per token
    Decimals(Vec<u8>),
    /// Current block
    BlockNumber(u64),
    /// A yes/no answer, e.g. whether an address holds code
    Bool(bool),
    /// One source route sampled at every amount
    DexSamples(Vec<DexSample>),
    /// One curve per source route
    DexQuotes(Vec<Vec<DexSample>>),
    /// A two-hop sample, if the route could fill
    TwoHopSample(Option<DexSample>),
    /// Two-hop samples at the full amount
    TwoHopQuotes(Vec<DexSample>),
    /// Output base units per wei of the native token
    Rate(f64),
}

impl SamplerOutput {
    /// Unwraps [`SamplerOutput::Amounts`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_amounts(self) -> Result<Vec<U256>> {
        match self {
            Self::Amounts(amounts) => Ok(amounts),
            other => bail!("expected amounts, got {other:?}"),
        }
    }

    /// Unwraps [`SamplerOutput::Decimals`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_decimals(self) -> Result<Vec<u8>> {
        match self {
            Self::Decimals(decimals) => Ok(decimals),
            other => bail!("expected decimals, got {other:?}"),
        }
    }

    /// Unwraps [`SamplerOutput::BlockNumber`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_block_number(self) -> Result<u64> {
        match self {
            Self::BlockNumber(block) => Ok(block),
            other => bail!("expected a block number, got {other:?}"),
        }
    }

    /// Unwraps [`SamplerOutput::Bool`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_bool(self) -> Result<bool> {
        match self {
            Self::Bool(value) => Ok(value),
            other => bail!("expected a bool, got {other:?}"),
        }
    }

    /// Unwraps [`SamplerOutput::DexQuotes`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_dex_quotes(self) -> Result<Vec<Vec<DexSample>>> {
        match self {
            Self::DexQuotes(quotes) => Ok(quotes),
            other => bail!("expected dex quotes, got {other:?}"),
        }
    }

    /// Unwraps [`SamplerOutput::TwoHopQuotes`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_two_hop_quotes(self) -> Result<Vec<DexSample>> {
        match self {
            Self::TwoHopQuotes(quotes) => Ok(quotes),
            other => bail!("expected two-hop quotes, got {other:?}"),
        }
    }

    /// Unwraps [`SamplerOutput::Rate`].
    ///
    /// # Errors
    ///
    /// Returns an error for any other variant.
    pub fn into_rate(self) -> Result<f64> {
        match self {
            Self::Rate(rate) => Ok(rate),
            other => bail!("expected a rate, got {other:?}"),
        }
    }
}

/// A call that can be batched into one sampler round trip.
pub trait BatchedOperation: Send + Sync {
    /// ABI-encoded call; empty for operations that need no call.
    fn encode_call(&self) -> Bytes;

    /// Decodes the data returned by a successful call.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be decoded.
    fn handle_call_results(&self, data: &[u8]) -> Result<SamplerOutput>;

    /// Result of a reverted call.
    ///
    /// # Errors
    ///
    /// Returns an error for operations that cannot tolerate a revert.
    fn handle_revert(&self, data: &[u8]) -> Result<SamplerOutput>;
}

/// A no-op returning a fixed result.
#[derive(Clone, Debug)]
pub struct ConstantOperation(pub SamplerOutput);

impl BatchedOperation for ConstantOperation {
    fn encode_call(&self) -> Bytes {
        Bytes::new()
    }

    fn handle_call_results(&self, _data: &[u8]) -> Result<SamplerOutput> {
        Ok(self.0.clone())
    }

    fn handle_revert(&self, _data: &[u8]) -> Result<SamplerOutput> {
        Ok(self.0.clone())
    }
}

/// Decoder of a sampler call's return data.
type Decoder = Box<dyn Fn(&[u8]) -> Result<SamplerOutput> + Send + Sync>;

/// One sampler contract call decoded by a closure. A revert is an error unless a
/// fallback is given.
pub struct ContractCallOperation {
    /// Name used in logs
    name: &'static str,
    /// Encoded call
    call_data: Bytes,
    /// Return-data decoder
    decoder: Decoder,
    /// Result on revert
    fallback: Option<SamplerOutput>,
}

impl ContractCallOperation {
    /// Creates an operation for `call`, decoding its return data with `decoder`.
    pub fn new<C, F>(name: &'static str, call: &C, decoder: F) -> Self
    where
        C: SolCall,
        F: Fn(&[u8]) -> Result<SamplerOutput> + Send + Sync + 'static,
    {
        Self {
            name,
            call_data: call.abi_encode().into(),
            decoder: Box::new(decoder),
            fallback: None,
        }
    }

    /// Returns `fallback` instead of failing when the call reverts.
    #[must_use]
    pub fn with_fallback(mut self, fallback: SamplerOutput) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl BatchedOperation for ContractCallOperation {
    fn encode_call(&self) -> Bytes {
        self.call_data.clone()
    }

    fn handle_call_results(&self, data: &[u8]) -> Result<SamplerOutput> {
        (self.decoder)(data)
    }

    fn handle_revert(&self, _data: &[u8]) -> Result<SamplerOutput> {
        match &self.fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => bail!("sampler call {} reverted", self.name),
        }
    }
}

/// Decoder of a source's samples: maps return data to one sample per amount.
type SampleDecoder = Box<dyn Fn(&[u8]) -> Result<Vec<DexSample>> + Send + Sync>;

/// Samples one source route at a fixed vector of amounts.
pub struct SourceQuoteOperation {
    /// Source sampled
    source: Source,
    /// Fill data shared by every sample
    fill_data: FillData,
    /// Encoded call
    call_data: Bytes,
    /// Turns return data into samples
    decoder: SampleDecoder,
}

impl SourceQuoteOperation {
    /// Creates an operation whose samples all carry `fill_data`; `decode_amounts`
    /// extracts the output amounts from the return data.
    pub fn new<C, F>(source: Source, fill_data: FillData, call: &C, amounts: Vec<U256>, decode_amounts: F) -> Self
    where
        C: SolCall,
        F: Fn(&[u8]) -> Result<Vec<U256>> + Send + Sync + 'static,
    {
        let sample_fill_data = fill_data.clone();
        Self::with_decoder(source, fill_data, call, move |data| {
            let outputs = decode_amounts(data)?;
            Ok(amounts
                .iter()
                .zip(outputs)
                .map(|(input, output)| DexSample {
                    source,
                    fill_data: sample_fill_data.clone(),
                    input: *input,
                    output,
                })
                .collect())
        })
    }

    /// Creates an operation with a custom sample decoder, for sources whose fill
    /// data depends on the sampled amount.
    pub fn with_decoder<C, F>(source: Source, fill_data: FillData, call: &C, decoder: F) -> Self
    where
        C: SolCall,
        F: Fn(&[u8]) -> Result<Vec<DexSample>> + Send + Sync + 'static,
    {
        Self {
            source,
            fill_data,
            call_data: call.abi_encode().into(),
            decoder: Box::new(decoder),
        }
    }

    /// Source sampled.
    #[must_use]
    pub const fn source(&self) -> Source {
        self.source
    }

    /// Fill data shared by every sample.
    #[must_use]
    pub const fn fill_data(&self) -> &FillData {
        &self.fill_data
    }

    /// Decodes the samples from return data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be decoded.
    pub fn samples(&self, data: &[u8]) -> Result<Vec<DexSample>> {
        (self.decoder)(data)
    }
}

impl BatchedOperation for SourceQuoteOperation {
    fn encode_call(&self) -> Bytes {
        self.call_data.clone()
    }

    fn handle_call_results(&self, data: &[u8]) -> Result<SamplerOutput> {
        Ok(SamplerOutput::DexSamples(self.samples(data)?))
    }

    fn handle_revert(&self, _data: &[u8]) -> Result<SamplerOutput> {
        debug!("sampler: {} quote reverted", self.source);
        Ok(SamplerOutput::DexSamples(Vec::new()))
    }
}

/// Combines the results of a batch's sub-operations.
type ResultHandler = Box<dyn Fn(Vec<SamplerOutput>) -> Result<SamplerOutput> + Send + Sync>;

/// Sub-operations executed through one nested `batchCall`. A failing
/// sub-operation is decoded by its own revert handler; the others are unaffected.
pub struct BatchOperation {
    /// Operations batched together
    sub_ops: Vec<Box<dyn BatchedOperation>>,
    /// Combines the decoded sub-results
    result_handler: ResultHandler,
    /// Result when the whole batch reverts
    revert_output: SamplerOutput,
}

impl BatchOperation {
    /// Batches `sub_ops`, combining their results with `result_handler`.
    pub fn new<F>(sub_ops: Vec<Box<dyn BatchedOperation>>, result_handler: F, revert_output: SamplerOutput) -> Self
    where
        F: Fn(Vec<SamplerOutput>) -> Result<SamplerOutput> + Send + Sync + 'static,
    {
        Self {
            sub_ops,
            result_handler: Box::new(result_handler),
            revert_output,
        }
    }
}

impl BatchedOperation for BatchOperation {
    fn encode_call(&self) -> Bytes {
        if self.sub_ops.is_empty() {
            return Bytes::new();
        }
        IERC20BridgeSampler::batchCallCall {
            callDatas: self.sub_ops.iter().map(|op| op.encode_call()).collect(),
        }
        .abi_encode()
        .into()
    }

    fn handle_call_results(&self, data: &[u8]) -> Result<SamplerOutput> {
        if self.sub_ops.is_empty() {
            return (self.result_handler)(Vec::new());
        }
        let results = IERC20BridgeSampler::batchCallCall::abi_decode_returns(data, true)?.callResults;
        if results.len() != self.sub_ops.len() {
            bail!(
                "batch returned {} results for {} calls",
                results.len(),
                self.sub_ops.len()
            );
        }
        let outputs = self
            .sub_ops
            .iter()
            .zip(results)
            .map(|(op, result)| {
                if result.success {
                    op.handle_call_results(&result.data)
                } else {
                    op.handle_revert(&result.data)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        (self.result_handler)(outputs)
    }

    fn handle_revert(&self, _data: &[u8]) -> Result<SamplerOutput> {
        debug!("sampler: batch of {} operations reverted", self.sub_ops.len());
        Ok(self.revert_output.clone())
    }
}

/// One two-hop route through `intermediate_token`. The sampler contract tries
/// every pairing of first and second hop calls and reports the best.
pub struct TwoHopOperation {
    /// `true` for sells
    is_sell: bool,
    /// Token the route passes through
    intermediate_token: Address,
    /// Candidate first hops, sampled at zero and re-run by the contract
    first_hop_ops: Vec<SourceQuoteOperation>,
    /// Candidate second hops
    second_hop_ops: Vec<SourceQuoteOperation>,
    /// Requested amount
    amount: U256,
}

impl TwoHopOperation {
    /// Creates a two-hop operation over the given hop candidates.
    #[must_use]
    pub const fn new(
        is_sell: bool,
        intermediate_token: Address,
        first_hop_ops: Vec<SourceQuoteOperation>,
        second_hop_ops: Vec<SourceQuoteOperation>,
        amount: U256,
    ) -> Self {
        Self {
            is_sell,
            intermediate_token,
            first_hop_ops,
            second_hop_ops,
            amount,
        }
    }

    /// The hop candidate at `index`, with fill data resolved from its return data.
    fn hop_source(
        ops: &[SourceQuoteOperation],
        index: U256,
        return_data: &[u8],
    ) -> Result<HopSource> {
        let op = usize::try_from(index)
            .ok()
            .and_then(|i| ops.get(i))
            .ok_or_else(|| eyre!("two-hop source index {index} out of range"))?;
        let fill_data = op
            .samples(return_data)
            .ok()
            .and_then(|samples| samples.into_iter().next())
            .map_or_else(|| op.fill_data().clone(), |sample| sample.fill_data);
        Ok(HopSource {
            source: op.source(),
            fill_data,
        })
    }

    /// Builds the sample from the chosen hops and the route's output.
    fn sample(
        &self,
        first_hop: &IERC20BridgeSampler::HopInfo,
        second_hop: &IERC20BridgeSampler::HopInfo,
        output: U256,
    ) -> Result<DexSample> {
        let first_hop_source = Self::hop_source(&self.first_hop_ops, first_hop.sourceIndex, &first_hop.returnData)?;
        let second_hop_source =
            Self::hop_source(&self.second_hop_ops, second_hop.sourceIndex, &second_hop.returnData)?;
        Ok(DexSample {
            source: Source::MultiHop,
            fill_data: FillData::MultiHop(Box::new(MultiHopFillData {
                first_hop_source,
                second_hop_source,
                intermediate_token: self.intermediate_token,
            })),
            input: self.amount,
            output,
        })
    }
}

impl BatchedOperation for TwoHopOperation {
    fn encode_call(&self) -> Bytes {
        let first_hop_calls = self.first_hop_ops.iter().map(BatchedOperation::encode_call).collect();
        let second_hop_calls = self.second_hop_ops.iter().map(BatchedOperation::encode_call).collect();
        if self.is_sell {
            IERC20BridgeSampler::sampleTwoHopSellCall {
                firstHopCalls: first_hop_calls,
                secondHopCalls: second_hop_calls,
                sellAmount: self.amount,
            }
            .abi_encode()
            .into()
        } else {
            IERC20BridgeSampler::sampleTwoHopBuyCall {
                firstHopCalls: first_hop_calls,
                secondHopCalls: second_hop_calls,
                buyAmount: self.amount,
            }
            .abi_encode()
            .into()
        }
    }

    fn handle_call_results(&self, data: &[u8]) -> Result<SamplerOutput> {
        if self.is_sell {
            let decoded = IERC20BridgeSampler::sampleTwoHopSellCall::abi_decode_returns(data, true)?;
            if decoded.buyAmount.is_zero() {
                return Ok(SamplerOutput::TwoHopSample(None));
            }
            let sample = self.sample(&decoded.firstHop, &decoded.secondHop, decoded.buyAmount)?;
            Ok(SamplerOutput::TwoHopSample(Some(sample)))
        } else {
            let decoded = IERC20BridgeSampler::sampleTwoHopBuyCall::abi_decode_returns(data, true)?;
            if decoded.sellAmount.is_zero() || decoded.sellAmount == U256::MAX {
                return Ok(SamplerOutput::TwoHopSample(None));
            }
            let sample = self.sample(&decoded.firstHop, &decoded.secondHop, decoded.sellAmount)?;
            Ok(SamplerOutput::TwoHopSample(Some(sample)))
        }
    }

    fn handle_revert(&self, _data: &[u8]) -> Result<SamplerOutput> {
        debug!("sampler: two-hop route via {} reverted", self.intermediate_token);
        Ok(SamplerOutput::TwoHopSample(None))
    }
}
