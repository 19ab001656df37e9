//! Background gas price polling.
//!
//! One task fetches the price on an interval and publishes it through a
//! `watch` cell; readers never block it.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::U256;
use alloy::providers::{Provider, RootProvider};
use async_trait::async_trait;
use eyre::{bail, eyre, Result};
use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where gas prices come from.
#[async_trait]
pub trait GasPriceSource: Send + Sync {
    /// Fetches the current fast gas price in wei.
    ///
    /// # Errors
    ///
    /// Returns an error if the price cannot be fetched.
    async fn fetch_gas_price(&self) -> Result<U256>;
}

/// Gas price of an RPC node, `eth_gasPrice`.
#[derive(Clone, Debug)]
pub struct ProviderGasPriceSource {
    /// RPC provider
    provider: RootProvider<Ethereum>,
}

impl ProviderGasPriceSource {
    /// Wraps `provider`.
    #[must_use]
    pub const fn new(provider: RootProvider<Ethereum>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl GasPriceSource for ProviderGasPriceSource {
    async fn fetch_gas_price(&self) -> Result<U256> {
        let price = self.provider.get_gas_price().await?;
        Ok(U256::from(price))
    }
}

/// What readers see: the last good price and the failures since.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct GasPriceState {
    /// Last successfully fetched price, `None` before the first success
    price: Option<U256>,
    /// Consecutive failed fetches
    consecutive_failures: u32,
}

/// Keeps the gas price fresh from a background task that is the only writer.
///
/// A failed refresh keeps the previous price. Readers only get an error when
/// `max_retries` fetches in a row failed and no price was ever obtained.
pub struct GasPricePoller {
    /// Read side of the cell the task writes
    state: watch::Receiver<GasPriceState>,
    /// Consecutive failures after which a missing price is an error
    max_retries: u32,
    /// The polling task, aborted on drop
    task: JoinHandle<()>,
}

impl GasPricePoller {
    /// Starts polling `source` every `interval`. The first fetch happens right away.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(source: Arc<dyn GasPriceSource>, interval: Duration, max_retries: u32) -> Self {
        let (tx, state) = watch::channel(GasPriceState::default());
        let task = tokio::spawn(poll(source, tx, interval));
        Self {
            state,
            max_retries: max_retries.max(1),
            task,
        }
    }

    /// The last fetched price, without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if no price has been fetched yet.
    pub fn current(&self) -> Result<U256> {
        let state = *self.state.borrow();
        state.price.ok_or_else(|| eyre!("gas price not available yet"))
    }

    /// The last fetched price, waiting for the first fetch if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_retries` fetches in a row failed before any
    /// price was obtained, or if the polling task is gone.
    pub async fn gas_price(&self) -> Result<U256> {
        let max_retries = self.max_retries;
        let mut state = self.state.clone();
        let state = *state
            .wait_for(|s| s.price.is_some() || s.consecutive_failures >= max_retries)
            .await
            .map_err(|_| eyre!("gas price poller stopped"))?;
        match state.price {
            Some(price) => Ok(price),
            None => bail!("unable to fetch gas price after {} attempts", state.consecutive_failures),
        }
    }
}

impl Drop for GasPricePoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The polling loop; ends when every reader is gone.
async fn poll(source: Arc<dyn GasPriceSource>, tx: watch::Sender<GasPriceState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    while !tx.is_closed() {
        ticker.tick().await;
        match source.fetch_gas_price().await {
            Ok(price) => {
                debug!("gas: price is {price} wei");
                tx.send_modify(|s| {
                    s.price = Some(price);
                    s.consecutive_failures = 0;
                });
            }
            Err(e) => {
                warn!("gas: error fetching gas price: {e}");
                tx.send_modify(|s| s.consecutive_failures = s.consecutive_failures.saturating_add(1));
            }
        }
    }
}
