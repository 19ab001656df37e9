//! # Gas Module
//!
//! The current fast gas price, kept fresh by a background task.

/// Watch-cell poller and its price sources
pub mod poller;

pub use poller::{GasPricePoller, GasPriceSource, ProviderGasPriceSource};
