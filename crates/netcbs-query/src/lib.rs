//! # netcbs-query
//!
//! Parser and codebook for netCBS network path queries.
//!
//! A query describes a walk through the POPNET relationship tables, starting
//! at a sample of persons and ending at the persons whose characteristics are
//! aggregated:
//!
//! ```text
//! [Income] -> Family[301] -> Schoolmates[all] -> sample
//! ```
//!
//! reads as "the income of the parents of the schoolmates of the sample".
//! The same query may be written sample-first:
//!
//! ```text
//! sample -> Schoolmates[all] -> Family[301] -> [Income]
//! ```
//!
//! Both forms compile to the same [`Query`], whose hops are ordered from the
//! sample outward.
//!
//! ## Usage
//!
//! ```rust
//! use netcbs_query::{compile, Context};
//!
//! let query = compile("[Income] -> Family[301] -> Schoolmates[all] -> sample").unwrap();
//! assert_eq!(query.hops[0].context, Context::Schoolmates);
//! assert_eq!(query.hops[1].context, Context::Family);
//! ```
//!
//! ## Contexts
//!
//! | Context | Codes |
//! |---------|-------|
//! | `Neighbors` | 101–102 |
//! | `Colleagues` | 201 |
//! | `Family` | 301–322 |
//! | `Housemates` | 401–402 |
//! | `Schoolmates` | 501–506 |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
mod codebook;
mod error;
mod lexer;
mod parser;
mod validate;

pub use ast::{CodeSet, Direction, Hop, HopSpec, PathExpr, Query, Segment, ANCHOR};
pub use codebook::{
    describe_code, Codebook, Context, RelationCode, CODE_DESCRIPTIONS, CONTEXT_CODES,
};
pub use error::{QueryError, QueryResult};
pub use parser::parse;
pub use validate::{compile, parse_hop, validate};
