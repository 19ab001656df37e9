//! Offerings of alternative market makers, shared by all requests and
//! refreshed on a fixed interval.

use std::time::Duration;

use async_trait::async_trait;
use eyre::{bail, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::types::{AltOffering, AltRfqMakerAssetOfferings};

/// Where offerings come from.
#[async_trait]
pub trait OfferingsSource: Send + Sync {
    /// Fetches the current offerings.
    ///
    /// # Errors
    ///
    /// Returns an error if the offerings cannot be fetched.
    async fn fetch_offerings(&self) -> Result<AltRfqMakerAssetOfferings>;
}

/// Body of the `/markets` endpoint.
#[derive(Debug, Deserialize)]
struct MarketsResponse {
    /// Markets offered
    #[serde(default)]
    items: Vec<AltOffering>,
}

/// Client of an alternative market maker's `/markets` endpoint.
#[derive(Clone, Debug)]
pub struct AltMarketsClient {
    /// Maker endpoint; offerings are keyed by it
    endpoint: String,
    /// Bearer token
    api_key: String,
    /// The HTTP client
    client: Client,
}

impl AltMarketsClient {
    /// Creates a client for the maker at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl OfferingsSource for AltMarketsClient {
    async fn fetch_offerings(&self) -> Result<AltRfqMakerAssetOfferings> {
        let response = self
            .client
            .get(format!("{}/markets", self.endpoint))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("alt markets answered {}", response.status());
        }
        let markets = response.json::<MarketsResponse>().await?;
        Ok(AltRfqMakerAssetOfferings::from([(self.endpoint.clone(), markets.items)]))
    }
}

/// A fetched value and when it was fetched.
struct CachedOfferings {
    fetched_at: Instant,
    offerings: AltRfqMakerAssetOfferings,
}

/// Time-boxed cache in front of an [`OfferingsSource`].
///
/// A failed refresh keeps the previous offerings (empty if there never were
/// any) until the next interval.
pub struct OfferingsCache<S> {
    /// Where offerings come from
    source: S,
    /// How long fetched offerings stay valid
    refresh_interval: Duration,
    /// Last fetch, `None` before the first
    cached: Mutex<Option<CachedOfferings>>,
}

impl<S: OfferingsSource> OfferingsCache<S> {
    /// Creates an empty cache.
    pub fn new(source: S, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            cached: Mutex::new(None),
        }
    }

    /// Current offerings, refreshed first if the interval has passed.
    pub async fn get(&self) -> AltRfqMakerAssetOfferings {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.refresh_interval {
                return entry.offerings.clone();
            }
        }
        let offerings = match self.source.fetch_offerings().await {
            Ok(offerings) => offerings,
            Err(e) => {
                log::warn!("rfq: error fetching alt RFQ markets: {e}");
                cached.take().map(|c| c.offerings).unwrap_or_default()
            }
        };
        *cached = Some(CachedOfferings {
            fetched_at: Instant::now(),
            offerings: offerings.clone(),
        });
        offerings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::market::test_helpers::address_from_str;

    /// Counts fetches; fails every fetch after the first when `flaky`.
    struct CountingSource {
        fetches: AtomicUsize,
        flaky: bool,
    }

    #[async_trait]
    impl OfferingsSource for CountingSource {
        async fn fetch_offerings(&self) -> Result<AltRfqMakerAssetOfferings> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.flaky && n > 0 {
                bail!("down");
            }
            Ok(AltRfqMakerAssetOfferings::from([(format!("https://maker-{n}"), vec![])]))
        }
    }

    fn source(flaky: bool) -> CountingSource {
        CountingSource {
            fetches: AtomicUsize::new(0),
            flaky,
        }
    }

    #[tokio::test]
    async fn test_cached_within_interval() {
        let cache = OfferingsCache::new(source(false), Duration::from_secs(300));
        let first = cache.get().await;
        let second = cache.get().await;
        assert_eq!(first, second);
        assert_eq!(cache.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshed_after_interval_and_kept_on_failure() {
        let cache = OfferingsCache::new(source(false), Duration::ZERO);
        cache.get().await;
        let refreshed = cache.get().await;
        assert!(refreshed.contains_key("https://maker-1"));

        let flaky = OfferingsCache::new(source(true), Duration::ZERO);
        let first = flaky.get().await;
        let after_failure = flaky.get().await;
        assert_eq!(first, after_failure);
    }

    #[tokio::test]
    async fn test_alt_markets_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "WETH-USDC",
                    "baseAsset": address_from_str("A"),
                    "quoteAsset": address_from_str("B"),
                    "baseAssetDecimals": 18,
                    "quoteAssetDecimals": 6,
                }]
            })))
            .mount(&server)
            .await;

        let client = AltMarketsClient::new(&server.uri(), "secret", Duration::from_secs(1)).unwrap();
        let offerings = client.fetch_offerings().await.unwrap();
        let items = &offerings[&server.uri()];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "WETH-USDC");
        assert!(items[0].is_pair(address_from_str("B"), address_from_str("A")));
    }
}
