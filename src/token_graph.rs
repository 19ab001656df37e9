//! Token adjacency hints used to propose intermediate tokens for two-hop routes.

use std::collections::HashMap;

use alloy::primitives::Address;
use eyre::{bail, Result};

/// Directed graph `token -> candidate intermediate tokens`.
///
/// A token without an explicit entry is adjacent to the default tokens only; a
/// token with an entry is adjacent to the defaults followed by its own edges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenAdjacencyGraph {
    /// Explicit adjacency, defaults first
    graph: HashMap<Address, Vec<Address>>,
    /// Adjacency of every token without an entry
    default_tokens: Vec<Address>,
}

impl TokenAdjacencyGraph {
    /// Tokens adjacent to `token`.
    #[must_use]
    pub fn adjacent_tokens(&self, token: &Address) -> &[Address] {
        self.graph.get(token).unwrap_or(&self.default_tokens)
    }

    /// Candidate intermediate tokens between `taker_token` and `maker_token`:
    /// the union of both adjacency lists in order, without duplicates and
    /// without either endpoint.
    #[must_use]
    pub fn intermediate_tokens(&self, taker_token: &Address, maker_token: &Address) -> Vec<Address> {
        let mut tokens = Vec::new();
        for token in self
            .adjacent_tokens(taker_token)
            .iter()
            .chain(self.adjacent_tokens(maker_token))
        {
            if token != taker_token && token != maker_token && !tokens.contains(token) {
                tokens.push(*token);
            }
        }
        tokens
    }
}

/// Builder for [`TokenAdjacencyGraph`].
#[derive(Clone, Debug, Default)]
pub struct TokenAdjacencyGraphBuilder {
    /// Graph under construction
    graph: TokenAdjacencyGraph,
}

impl TokenAdjacencyGraphBuilder {
    /// Starts a graph whose tokens are all adjacent to `default_tokens`.
    #[must_use]
    pub fn new(default_tokens: &[Address]) -> Self {
        Self {
            graph: TokenAdjacencyGraph {
                graph: HashMap::new(),
                default_tokens: default_tokens.to_vec(),
            },
        }
    }

    /// Adds the edge `from -> to`. Adding an existing edge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if `from == to`.
    pub fn add(mut self, from: Address, to: Address) -> Result<Self> {
        self.add_edge(from, to)?;
        Ok(self)
    }

    /// Adds `a -> b` and `b -> a`.
    ///
    /// # Errors
    ///
    /// Returns an error if `a == b`.
    pub fn add_bidirectional(self, a: Address, b: Address) -> Result<Self> {
        self.add(a, b)?.add(b, a)
    }

    /// Connects every pair of `tokens` in both directions.
    ///
    /// # Errors
    ///
    /// Returns an error if `tokens` contains a duplicate.
    pub fn add_complete_subgraph(mut self, tokens: &[Address]) -> Result<Self> {
        for (i, from) in tokens.iter().enumerate() {
            for (j, to) in tokens.iter().enumerate() {
                if i != j {
                    self.add_edge(*from, *to)?;
                }
            }
        }
        Ok(self)
    }

    /// Hands the builder to `f` for bulk edits.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn tap<F>(mut self, f: F) -> Result<Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        f(&mut self)?;
        Ok(self)
    }

    /// Adds the edge `from -> to` in place.
    ///
    /// # Errors
    ///
    /// Returns an error if `from == to`.
    pub fn add_edge(&mut self, from: Address, to: Address) -> Result<()> {
        if from == to {
            bail!("token adjacency graph cannot contain a self-loop on {from}");
        }
        let defaults = &self.graph.default_tokens;
        let adjacent = self.graph.graph.entry(from).or_insert_with(|| defaults.clone());
        if !adjacent.contains(&to) {
            adjacent.push(to);
        }
        Ok(())
    }

    /// Finishes the graph.
    #[must_use]
    pub fn build(self) -> TokenAdjacencyGraph {
        self.graph
    }
}

/// Adjacency hints for a chain: the default intermediate tokens, with the
/// stablecoins connected to each other.
///
/// # Errors
///
/// Returns an error if the token lists contain duplicates.
pub fn default_token_adjacency_graph(default_tokens: &[Address], stable_tokens: &[Address]) -> Result<TokenAdjacencyGraph> {
    Ok(TokenAdjacencyGraphBuilder::new(default_tokens)
        .add_complete_subgraph(stable_tokens)?
        .build())
}
