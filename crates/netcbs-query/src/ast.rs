//! Syntax tree types for network path queries.

use std::collections::BTreeSet;
use std::fmt;

use crate::codebook::{Context, RelationCode};

/// Keyword marking the sample boundary.
pub const ANCHOR: &str = "sample";

/// Surface direction of a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// `[VARS] -> ... -> sample`
    VariablesFirst,
    /// `sample -> ... -> [VARS]`
    SampleFirst,
}

/// Relationship codes selected by a hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodeSet {
    /// Every code of the hop's context: `[all]`
    All,
    /// An explicit list: `[301, 302]`
    Codes(BTreeSet<RelationCode>),
}

impl CodeSet {
    /// Expands `All` into the context's full code set.
    pub fn resolve(&self, context: Context) -> BTreeSet<RelationCode> {
        match self {
            CodeSet::All => context.codes().clone(),
            CodeSet::Codes(codes) => codes.clone(),
        }
    }

    /// Returns true for `[all]`.
    pub fn is_all(&self) -> bool {
        matches!(self, CodeSet::All)
    }
}

impl fmt::Display for CodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeSet::All => write!(f, "all"),
            CodeSet::Codes(codes) => {
                let joined = codes
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "{}", joined)
            }
        }
    }
}

/// A hop as written, before its context name is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HopSpec {
    /// Context name as written.
    pub context: String,
    /// Selected codes.
    pub codes: CodeSet,
    /// Byte offset of the hop in the query string.
    pub position: usize,
}

impl fmt::Display for HopSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.context, self.codes)
    }
}

/// One `->`-separated segment of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Segment {
    /// `[VAR1, VAR2]`
    Variables(Vec<String>),
    /// `Context[codes]`
    Hop(HopSpec),
    /// `sample`
    Anchor,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Variables(vars) => write!(f, "[{}]", vars.join(",")),
            Segment::Hop(hop) => write!(f, "{}", hop),
            Segment::Anchor => write!(f, "{}", ANCHOR),
        }
    }
}

/// A syntactically valid query with its hops in ego→alter order.
///
/// Produced by [`parse`](crate::parse). Context names and codes are not yet
/// checked against the codebook.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathExpr {
    /// Direction the query was written in.
    pub direction: Direction,
    /// Hops, first hop adjacent to the sample.
    pub hops: Vec<HopSpec>,
    /// Aggregation variables in written order.
    pub variables: Vec<String>,
}

/// A validated traversal step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hop {
    /// Relationship context.
    pub context: Context,
    /// Selected codes, all of which belong to `context`.
    pub codes: CodeSet,
}

impl Hop {
    /// Creates a hop over every code of a context.
    pub fn all(context: Context) -> Self {
        Self {
            context,
            codes: CodeSet::All,
        }
    }

    /// The concrete codes this hop filters on.
    pub fn resolved_codes(&self) -> BTreeSet<RelationCode> {
        self.codes.resolve(self.context)
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.context, self.codes)
    }
}

/// A validated query in canonical ego→alter order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Query {
    /// Direction the query was written in. Informational only.
    pub direction: Direction,
    /// Hops, first hop adjacent to the sample.
    pub hops: Vec<Hop>,
    /// Distinct aggregation variables in written order.
    pub variables: Vec<String>,
}

impl Query {
    /// Number of hops.
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Normalized token sequence: `sample`, each hop outward, then the variables.
    ///
    /// The result depends only on the query's meaning, not on the surface
    /// direction, spacing or code order it was written with.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.hops.len() + 2);
        tokens.push(ANCHOR.to_string());
        tokens.extend(self.hops.iter().map(|h| h.to_string()));
        tokens.push(format!("[{}]", self.variables.join(",")));
        tokens
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens().join(" -> "))
    }
}
