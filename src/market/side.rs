use std::fmt::{self, Debug};

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The side of a market operation.
///
/// For a `Sell` the requested amount is denominated in the taker token and the
/// optimizer maximises the maker tokens received. For a `Buy` the requested
/// amount is denominated in the maker token and the optimizer minimises the
/// taker tokens spent.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
pub enum Side {
    /// Sell an exact amount of the taker token
    Sell,
    /// Buy an exact amount of the maker token
    Buy,
}

impl Side {
    /// Returns `true` for a sell.
    #[must_use]
    pub const fn is_sell(self) -> bool {
        matches!(self, Self::Sell)
    }

    /// Returns `(maker_token, taker_token)` given the input and output tokens of this side.
    ///
    /// # Arguments
    ///
    /// * `input_token` - The token the requested amount is denominated in
    /// * `output_token` - The token the optimizer produces
    #[must_use]
    pub const fn maker_taker<T: Copy>(self, input_token: T, output_token: T) -> (T, T) {
        match self {
            Self::Sell => (output_token, input_token),
            Self::Buy => (input_token, output_token),
        }
    }
}

impl Debug for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sell => write!(f, "sell"),
            Self::Buy => write!(f, "buy"),
        }
    }
}
