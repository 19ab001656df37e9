//! HTTP transport to the RFQ service.
//!
//! Every call degrades to an empty result: a non-200 answer is logged as a
//! warning, a transport or decoding failure as an error, and neither is ever
//! returned to the caller.

use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{
    RfqtV1Price, RfqtV1PricesResponse, RfqtV1Quote, RfqtV1QuotesResponse, RfqtV1Request, RfqtV2Price,
    RfqtV2PricesResponse, RfqtV2Quote, RfqtV2QuotesResponse, RfqtV2Request,
};

/// Header carrying the chain id of a request
const CHAIN_ID_HEADER: &str = "0x-chain-id";

/// Grace added to the v1 deadline for the round trip itself
const V1_TIMEOUT_GRACE_MS: u64 = 150;

/// v2 requests fan out to more makers and get a longer deadline
const V2_TIMEOUT_MULTIPLIER: u32 = 3;

/// Source of indicative and firm RFQ quotes.
#[async_trait]
pub trait RfqTransport: Send + Sync {
    /// Indicative v1 prices; empty on any failure.
    async fn get_v1_prices(&self, request: &RfqtV1Request) -> Vec<RfqtV1Price>;

    /// Firm v1 quotes; empty on any failure.
    async fn get_v1_quotes(&self, request: &RfqtV1Request) -> Vec<RfqtV1Quote>;

    /// Indicative v2 prices; empty on any failure.
    async fn get_v2_prices(&self, request: &RfqtV2Request) -> Vec<RfqtV2Price>;

    /// Firm v2 quotes; empty on any failure.
    async fn get_v2_quotes(&self, request: &RfqtV2Request) -> Vec<RfqtV2Quote>;

    /// Returns `false` when no RFQ service is configured.
    fn is_rfqt_enabled(&self) -> bool;
}

/// Client of the RFQ service API.
#[derive(Clone, Debug)]
pub struct RfqClient {
    /// Base URL, empty when RFQ is disabled
    api_url: String,
    /// Time makers have to answer
    max_response_time: Duration,
    /// The HTTP client
    client: Client,
}

impl RfqClient {
    /// Creates a client for the service at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, max_response_time_ms: u64) -> Result<Self> {
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            max_response_time: Duration::from_millis(max_response_time_ms),
            client: Client::builder().build()?,
        })
    }

    fn v1_timeout(&self) -> Duration {
        self.max_response_time + Duration::from_millis(V1_TIMEOUT_GRACE_MS)
    }

    fn v2_timeout(&self) -> Duration {
        self.max_response_time * V2_TIMEOUT_MULTIPLIER
    }

    /// Posts `request` to `path`; `None` on any failure.
    async fn post<Req, Res>(&self, path: &str, request: &Req, chain_id: u64, timeout: Duration) -> Option<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned + Send,
    {
        let url = format!("{}{path}", self.api_url);
        let response = match self
            .client
            .post(&url)
            .timeout(timeout)
            .header(CHAIN_ID_HEADER, chain_id.to_string())
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::error!("rfq: error requesting {path}: {e}");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            log::warn!("rfq: {path} answered {}", response.status());
            return None;
        }

        match response.json::<Res>().await {
            Ok(body) => Some(body),
            Err(e) => {
                log::error!("rfq: malformed response from {path}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl RfqTransport for RfqClient {
    async fn get_v1_prices(&self, request: &RfqtV1Request) -> Vec<RfqtV1Price> {
        self.post::<_, RfqtV1PricesResponse>("/rfqt/v1/prices", request, request.chain_id, self.v1_timeout())
            .await
            .map(|r| r.prices)
            .unwrap_or_default()
    }

    async fn get_v1_quotes(&self, request: &RfqtV1Request) -> Vec<RfqtV1Quote> {
        self.post::<_, RfqtV1QuotesResponse>("/rfqt/v1/quotes", request, request.chain_id, self.v1_timeout())
            .await
            .map(|r| r.quotes)
            .unwrap_or_default()
    }

    async fn get_v2_prices(&self, request: &RfqtV2Request) -> Vec<RfqtV2Price> {
        self.post::<_, RfqtV2PricesResponse>(
            "/internal/rfqt/v2/prices",
            request,
            request.chain_id,
            self.v2_timeout(),
        )
        .await
        .map(|r| r.prices)
        .unwrap_or_default()
    }

    async fn get_v2_quotes(&self, request: &RfqtV2Request) -> Vec<RfqtV2Quote> {
        self.post::<_, RfqtV2QuotesResponse>(
            "/internal/rfqt/v2/quotes",
            request,
            request.chain_id,
            self.v2_timeout(),
        )
        .await
        .map(|r| r.quotes)
        .unwrap_or_default()
    }

    fn is_rfqt_enabled(&self) -> bool {
        !self.api_url.is_empty()
    }
}
