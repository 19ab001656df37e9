//! The on-chain sampler contract and its test double.

use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes};
use alloy::providers::RootProvider;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use eyre::Result;

use self::bindings::IERC20BridgeSampler;

/// Solidity bindings of the batched sampler.
#[allow(missing_docs, clippy::missing_docs_in_private_items, clippy::pedantic)]
pub mod bindings {
    use alloy::sol;

    sol! {
        #[sol(rpc)]
        interface IERC20BridgeSampler {
            struct CallResults {
                bytes data;
                bool success;
            }

            struct CurveInfo {
                address poolAddress;
                bytes4 sellQuoteFunctionSelector;
                bytes4 buyQuoteFunctionSelector;
            }

            struct HopInfo {
                uint256 sourceIndex;
                bytes returnData;
            }

            struct LimitOrder {
                address makerToken;
                address takerToken;
                uint128 makerAmount;
                uint128 takerAmount;
                uint128 takerTokenFeeAmount;
                address maker;
                address taker;
                address sender;
                address feeRecipient;
                bytes32 pool;
                uint64 expiry;
                uint256 salt;
            }

            struct Signature {
                uint8 signatureType;
                uint8 v;
                bytes32 r;
                bytes32 s;
            }

            function batchCall(bytes[] callDatas) external returns (CallResults[] callResults);

            function getTokenDecimals(address[] tokens) external view returns (uint256[] decimals);

            function getBlockNumber() external view returns (uint256 blockNumber);

            function isContract(address account) external view returns (bool hasCode);

            function getLimitOrderFillableTakerAssetAmounts(
                LimitOrder[] orders,
                Signature[] orderSignatures,
                address exchange
            ) external returns (uint256[] orderFillableTakerAssetAmounts);

            function sampleSellsFromUniswapV2(address router, address[] path, uint256[] takerTokenAmounts)
                external view returns (uint256[] makerTokenAmounts);

            function sampleBuysFromUniswapV2(address router, address[] path, uint256[] makerTokenAmounts)
                external view returns (uint256[] takerTokenAmounts);

            function sampleSellsFromUniswapV3(address quoter, address[] path, uint256[] takerTokenAmounts)
                external returns (bytes[] uniswapPaths, uint256[] uniswapGasUsed, uint256[] makerTokenAmounts);

            function sampleBuysFromUniswapV3(address quoter, address[] path, uint256[] makerTokenAmounts)
                external returns (bytes[] uniswapPaths, uint256[] uniswapGasUsed, uint256[] takerTokenAmounts);

            function sampleSellsFromCurve(
                CurveInfo curveInfo,
                int128 fromTokenIdx,
                int128 toTokenIdx,
                uint256[] takerTokenAmounts
            ) external view returns (uint256[] makerTokenAmounts);

            function sampleBuysFromCurve(
                CurveInfo curveInfo,
                int128 fromTokenIdx,
                int128 toTokenIdx,
                uint256[] makerTokenAmounts
            ) external view returns (uint256[] takerTokenAmounts);

            function sampleSellsFromLiquidityProvider(
                address providerAddress,
                address takerToken,
                address makerToken,
                uint256[] takerTokenAmounts
            ) external view returns (uint256[] makerTokenAmounts);

            function sampleBuysFromLiquidityProvider(
                address providerAddress,
                address takerToken,
                address makerToken,
                uint256[] makerTokenAmounts
            ) external view returns (uint256[] takerTokenAmounts);

            function sampleTwoHopSell(bytes[] firstHopCalls, bytes[] secondHopCalls, uint256 sellAmount)
                external returns (HopInfo firstHop, HopInfo secondHop, uint256 buyAmount);

            function sampleTwoHopBuy(bytes[] firstHopCalls, bytes[] secondHopCalls, uint256 buyAmount)
                external returns (HopInfo firstHop, HopInfo secondHop, uint256 sellAmount);
        }
    }
}

/// Outcome of one call inside a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallResult {
    /// `false` when the call reverted
    pub success: bool,
    /// Return data, or revert data
    pub data: Bytes,
}

/// Executes batches of opaque calls against the sampler contract.
#[async_trait]
pub trait SamplerContract: Send + Sync {
    /// Runs every call in one round trip and returns one result per call.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip itself fails.
    async fn batch_call(&self, call_datas: Vec<Bytes>) -> Result<Vec<CallResult>>;
}

/// The sampler deployed on-chain, called through an RPC provider.
#[derive(Clone, Debug)]
pub struct AlloySamplerContract {
    /// Sampler address
    address: Address,
    /// RPC provider
    provider: RootProvider<Ethereum>,
}

impl AlloySamplerContract {
    /// Binds the sampler at `address`.
    #[must_use]
    pub const fn new(address: Address, provider: RootProvider<Ethereum>) -> Self {
        Self { address, provider }
    }
}

#[async_trait]
impl SamplerContract for AlloySamplerContract {
    async fn batch_call(&self, call_datas: Vec<Bytes>) -> Result<Vec<CallResult>> {
        let sampler = IERC20BridgeSampler::new(self.address, &self.provider);
        let results = sampler.batchCall(call_datas).call().await?.callResults;
        Ok(results
            .into_iter()
            .map(|r| CallResult {
                success: r.success,
                data: r.data,
            })
            .collect())
    }
}

/// Answers one leaf call; `None` means the call reverts.
type CallHandler = Box<dyn Fn(&[u8]) -> Option<Bytes> + Send + Sync>;

/// In-memory sampler for tests. Nested `batchCall`s are unrolled and every leaf
/// call is answered by the handler.
pub struct MockSamplerContract {
    /// Answers leaf calls
    handler: CallHandler,
    /// Round trips made so far
    round_trips: AtomicUsize,
}

impl MockSamplerContract {
    /// Creates a mock answering leaf calls with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Bytes> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            round_trips: AtomicUsize::new(0),
        }
    }

    /// Number of `batch_call` round trips made so far.
    #[must_use]
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Answers one call, recursing into nested batches.
    fn answer(&self, call_data: &[u8]) -> CallResult {
        if let Ok(batch) = IERC20BridgeSampler::batchCallCall::abi_decode(call_data, true) {
            let results: Vec<_> = batch
                .callDatas
                .iter()
                .map(|c| {
                    let result = self.answer(c);
                    IERC20BridgeSampler::CallResults {
                        data: result.data,
                        success: result.success,
                    }
                })
                .collect();
            return CallResult {
                success: true,
                data: IERC20BridgeSampler::batchCallCall::abi_encode_returns(&(results,)).into(),
            };
        }
        match (self.handler)(call_data) {
            Some(data) => CallResult { success: true, data },
            None => CallResult::default(),
        }
    }
}

#[async_trait]
impl SamplerContract for MockSamplerContract {
    async fn batch_call(&self, call_datas: Vec<Bytes>) -> Result<Vec<CallResult>> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        Ok(call_datas.iter().map(|c| self.answer(c)).collect())
    }
}
