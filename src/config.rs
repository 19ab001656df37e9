//! Process configuration from the environment (and `.env`).

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use url::Url;

use crate::utils::constants::contract_addresses;

/// Quoter settings read once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// JSON-RPC endpoint
    pub rpc_url: Url,
    /// Chain quoted on
    pub chain_id: u64,
    /// Sampler contract
    pub sampler_address: Address,
    /// RFQ service, `None` disables RFQ
    pub rfq_api_url: Option<String>,
    /// Time market makers have to answer
    pub rfq_max_response_time_ms: u64,
    /// Interval of the gas price poller
    pub gas_price_poll_interval: Duration,
    /// Failed gas price fetches tolerated before a missing price is an error
    pub gas_price_max_retries: u32,
    /// Integrators allowed to request RFQ liquidity
    pub rfq_integrator_whitelist: Vec<String>,
    /// Transaction origins never allowed RFQ liquidity
    pub tx_origin_blacklist: Vec<Address>,
    /// Alternative market maker, `None` when there is none
    pub alt_rfq_offerings_url: Option<String>,
    /// Bearer token of the alternative market maker
    pub alt_rfq_api_key: String,
    /// How long alternative offerings stay valid
    pub alt_rfq_refresh_interval: Duration,
}

impl Config {
    /// Loads `.env` if present, then reads the `QUOTER_*` variables.
    ///
    /// # Errors
    ///
    /// * If `QUOTER_RPC_URL` is missing or not a URL
    /// * If a numeric or address variable does not parse
    /// * If no sampler address is known for the chain
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; empty values count as unset.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = var("QUOTER_RPC_URL").ok_or_else(|| eyre!("QUOTER_RPC_URL must be set"))?;
        let rpc_url = Url::parse(&rpc_url).wrap_err("QUOTER_RPC_URL is not a valid URL")?;
        let chain_id = parse_or(var("QUOTER_CHAIN_ID"), "QUOTER_CHAIN_ID", 1)?;
        let sampler_address = match var("QUOTER_SAMPLER_ADDRESS") {
            Some(address) => Address::from_str(&address).wrap_err("QUOTER_SAMPLER_ADDRESS is not an address")?,
            None => contract_addresses(chain_id)
                .map(|a| a.sampler)
                .ok_or_else(|| eyre!("QUOTER_SAMPLER_ADDRESS must be set for chain {chain_id}"))?,
        };
        let tx_origin_blacklist = split_list(var("QUOTER_TX_ORIGIN_BLACKLIST"))
            .iter()
            .map(|a| Address::from_str(a).wrap_err_with(|| format!("blacklisted tx origin {a} is not an address")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rpc_url,
            chain_id,
            sampler_address,
            rfq_api_url: var("QUOTER_RFQ_API_URL"),
            rfq_max_response_time_ms: parse_or(var("QUOTER_RFQ_MAX_RESPONSE_MS"), "QUOTER_RFQ_MAX_RESPONSE_MS", 600)?,
            gas_price_poll_interval: Duration::from_millis(parse_or(
                var("QUOTER_GAS_PRICE_POLL_MS"),
                "QUOTER_GAS_PRICE_POLL_MS",
                6_000,
            )?),
            gas_price_max_retries: parse_or(var("QUOTER_GAS_PRICE_MAX_RETRIES"), "QUOTER_GAS_PRICE_MAX_RETRIES", 3)?,
            rfq_integrator_whitelist: split_list(var("QUOTER_RFQ_INTEGRATOR_WHITELIST")),
            tx_origin_blacklist,
            alt_rfq_offerings_url: var("QUOTER_ALT_RFQ_OFFERINGS_URL"),
            alt_rfq_api_key: var("QUOTER_ALT_RFQ_API_KEY").unwrap_or_default(),
            alt_rfq_refresh_interval: Duration::from_secs(parse_or(
                var("QUOTER_ALT_RFQ_REFRESH_SECS"),
                "QUOTER_ALT_RFQ_REFRESH_SECS",
                300,
            )?),
        })
    }
}

/// Parses `value`, or returns `default` when it is unset.
fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map_or(Ok(default), |v| v.parse().wrap_err_with(|| format!("{key} is invalid: {v}")))
}

/// Comma-separated values, blanks dropped.
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::utils::constants::SAMPLER_ADDRESS;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("QUOTER_RPC_URL", "http://localhost:8545")]).unwrap();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.sampler_address, SAMPLER_ADDRESS);
        assert_eq!(config.rfq_api_url, None);
        assert_eq!(config.rfq_max_response_time_ms, 600);
        assert_eq!(config.gas_price_poll_interval, Duration::from_secs(6));
        assert_eq!(config.gas_price_max_retries, 3);
        assert!(config.rfq_integrator_whitelist.is_empty());
        assert_eq!(config.alt_rfq_refresh_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_lists_and_overrides() {
        let config = config(&[
            ("QUOTER_RPC_URL", "http://localhost:8545"),
            ("QUOTER_RFQ_API_URL", "https://rfq.example"),
            ("QUOTER_RFQ_INTEGRATOR_WHITELIST", " a, b ,,c"),
            (
                "QUOTER_TX_ORIGIN_BLACKLIST",
                "0x0000000000000000000000000000000000000001,0x0000000000000000000000000000000000000002",
            ),
            ("QUOTER_GAS_PRICE_POLL_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.rfq_api_url.as_deref(), Some("https://rfq.example"));
        assert_eq!(config.rfq_integrator_whitelist, vec!["a", "b", "c"]);
        assert_eq!(config.tx_origin_blacklist.len(), 2);
        assert_eq!(config.gas_price_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        for (vars, message) in &[
            (vec![], "QUOTER_RPC_URL must be set"),
            (vec![("QUOTER_RPC_URL", "not a url")], "QUOTER_RPC_URL is not a valid URL"),
            (
                vec![("QUOTER_RPC_URL", "http://localhost:8545"), ("QUOTER_CHAIN_ID", "one")],
                "QUOTER_CHAIN_ID is invalid: one",
            ),
            (
                vec![("QUOTER_RPC_URL", "http://localhost:8545"), ("QUOTER_CHAIN_ID", "999")],
                "QUOTER_SAMPLER_ADDRESS must be set for chain 999",
            ),
        ] {
            let err = config(vars).unwrap_err();
            assert_eq!(err.to_string(), *message);
        }
    }
}
