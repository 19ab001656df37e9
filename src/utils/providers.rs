use alloy::network::Ethereum;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use url::Url;

use crate::config::Config;

/// Creates an HTTP provider for the configured RPC endpoint.
#[must_use]
pub fn create_http_provider(config: &Config) -> RootProvider<Ethereum> {
    http_provider(config.rpc_url.clone())
}

/// Creates an HTTP provider for `url`.
#[must_use]
pub fn http_provider(url: Url) -> RootProvider<Ethereum> {
    let provider = ProviderBuilder::new().on_http(url);
    (*provider.root()).clone()
}
