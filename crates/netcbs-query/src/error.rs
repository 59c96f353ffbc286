//! Error types for network query parsing and validation.

use thiserror::Error;

use crate::codebook::{Context, RelationCode};

/// Errors that can occur while parsing or validating a network query.
///
/// Every variant carries the offending token, context or code so that the
/// caller can point at the exact part of the query that needs fixing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query string was empty or only whitespace.
    #[error("query must be a non-empty string")]
    EmptyQuery,

    /// The query is not well-formed.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Byte offset in the input where the error was detected.
        position: usize,
        /// Description of the error.
        message: String,
    },

    /// The aggregation variable list is empty (`[]`).
    #[error("no aggregation variables found; expected something like '[VAR]' in the query")]
    EmptyAggregationList,

    /// A hop names a context outside the fixed vocabulary.
    #[error("unknown context '{name}'; known contexts: {}", Context::known_names())]
    UnknownContext {
        /// The unrecognised context name.
        name: String,
    },

    /// An explicit relationship code does not belong to its hop's context.
    #[error("relationship code {code} is not valid for context {context}")]
    InvalidRelationshipCode {
        /// Context of the hop.
        context: Context,
        /// The rejected code.
        code: RelationCode,
    },
}

impl QueryError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        QueryError::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// Result type for query operations.
pub type QueryResult<T> = std::result::Result<T, QueryError>;
