//! Liquidity sources and the filters that select among them.

use std::collections::BTreeSet;
use std::ops::{BitOr, BitOrAssign};

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// One liquidity venue the quoter can route through.
#[derive(
    Clone, Copy, Debug, Display, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum Source {
    /// Off-chain signed orders settled on-chain (limit, RFQ and OTC orders)
    Native,
    /// Uniswap V2 router
    UniswapV2,
    /// SushiSwap router (Uniswap V2 fork)
    SushiSwap,
    /// Uniswap V3 quoter
    UniswapV3,
    /// Curve stable pools
    Curve,
    /// A registered on-chain liquidity provider contract
    LiquidityProvider,
    /// Two chained fills through an intermediate token
    MultiHop,
}

impl Source {
    /// Every source, in flag order.
    pub const ALL: [Self; 7] = [
        Self::Native,
        Self::UniswapV2,
        Self::SushiSwap,
        Self::UniswapV3,
        Self::Curve,
        Self::LiquidityProvider,
        Self::MultiHop,
    ];

    /// The single-bit flag identifying this source in a route composition.
    #[must_use]
    pub const fn flag(self) -> SourceFlags {
        SourceFlags(1 << (self as u32))
    }
}

/// A bitmask of the sources composing a route.
///
/// Native orders carry two extra bits on top of `Source::Native` so that the
/// exchange-proxy overhead function can tell RFQ and limit orders apart.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SourceFlags(u64);

impl SourceFlags {
    /// No sources
    pub const EMPTY: Self = Self(0);
    /// Native RFQ or OTC order
    pub const RFQ_ORDER: Self = Self(1 << 16);
    /// Native limit order
    pub const LIMIT_ORDER: Self = Self(1 << 17);

    /// Raw bits of the mask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if every bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if `self` and `other` share any bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Number of distinct flags set.
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Folds a sequence of flags into one mask.
    pub fn merge<I: IntoIterator<Item = Self>>(flags: I) -> Self {
        flags.into_iter().fold(Self::EMPTY, |acc, f| acc | f)
    }
}

impl BitOr for SourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SourceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Include/exclude lists narrowing the set of sources a request may use.
///
/// An empty include list means "everything the valid set allows".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceFilters {
    /// Sources that are valid at all for this context
    valid: BTreeSet<Source>,
    /// Explicitly excluded sources
    excluded: BTreeSet<Source>,
    /// Explicitly included sources, empty for no restriction
    included: BTreeSet<Source>,
}

impl SourceFilters {
    /// Creates a filter over `valid` sources with the given exclusions and inclusions.
    ///
    /// An empty `valid` list means every `Source` is valid.
    #[must_use]
    pub fn new(valid: &[Source], excluded: &[Source], included: &[Source]) -> Self {
        let valid = if valid.is_empty() {
            Source::ALL.into_iter().collect()
        } else {
            valid.iter().copied().collect()
        };
        Self {
            valid,
            excluded: excluded.iter().copied().collect(),
            included: included.iter().copied().collect(),
        }
    }

    /// Returns `true` if `source` passes every list.
    #[must_use]
    pub fn is_allowed(&self, source: Source) -> bool {
        if !self.valid.contains(&source) || self.excluded.contains(&source) {
            return false;
        }
        self.included.is_empty() || self.included.contains(&source)
    }

    /// All allowed sources in flag order.
    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.is_allowed(*s))
            .collect()
    }

    /// Returns a copy with `sources` additionally excluded.
    #[must_use]
    pub fn exclude(&self, sources: &[Source]) -> Self {
        let mut next = self.clone();
        next.excluded.extend(sources.iter().copied());
        next
    }

    /// Returns a copy with the include list narrowed to `sources`.
    #[must_use]
    pub fn include(&self, sources: &[Source]) -> Self {
        let mut next = self.clone();
        next.included.extend(sources.iter().copied());
        next
    }

    /// Intersects two filters: valid sets intersect, exclusions and inclusions union.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            valid: self.valid.intersection(&other.valid).copied().collect(),
            excluded: self.excluded.union(&other.excluded).copied().collect(),
            included: self.included.union(&other.included).copied().collect(),
        }
    }
}
