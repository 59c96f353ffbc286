//! Codebook validation of parsed queries.

use crate::ast::{CodeSet, Hop, HopSpec, PathExpr, Query};
use crate::codebook::{Codebook, Context};
use crate::error::{QueryError, QueryResult};
use crate::parser::{parse, parse_hop_spec};

/// Checks a parsed path against the codebook.
///
/// Checks run in a fixed order: the variable list is non-empty, every context
/// name is known, every explicit code belongs to its context. Duplicate
/// variables are dropped, keeping the first occurrence.
pub fn validate(path: PathExpr) -> QueryResult<Query> {
    if path.variables.is_empty() {
        return Err(QueryError::EmptyAggregationList);
    }

    let contexts = path
        .hops
        .iter()
        .map(|spec| spec.context.parse::<Context>())
        .collect::<QueryResult<Vec<_>>>()?;

    let hops = path
        .hops
        .into_iter()
        .zip(contexts)
        .map(|(spec, context)| check_codes(spec, context))
        .collect::<QueryResult<Vec<_>>>()?;

    let mut variables: Vec<String> = Vec::with_capacity(path.variables.len());
    for var in path.variables {
        if !variables.contains(&var) {
            variables.push(var);
        }
    }

    Ok(Query {
        direction: path.direction,
        hops,
        variables,
    })
}

/// Parses and validates a query string.
///
/// # Examples
///
/// ```rust
/// use netcbs_query::{compile, Context};
///
/// let query = compile("[Income] -> Family[301] -> sample").unwrap();
/// assert_eq!(query.hops[0].context, Context::Family);
/// assert_eq!(query.tokens(), vec!["sample", "Family[301]", "[Income]"]);
/// ```
pub fn compile(input: &str) -> QueryResult<Query> {
    validate(parse(input)?)
}

/// Parses and validates a single hop such as `Neighbors[101]` or `Family`.
pub fn parse_hop(input: &str) -> QueryResult<Hop> {
    let spec = parse_hop_spec(input)?;
    let context = spec.context.parse::<Context>()?;
    check_codes(spec, context)
}

fn check_codes(spec: HopSpec, context: Context) -> QueryResult<Hop> {
    if let CodeSet::Codes(ref codes) = spec.codes {
        let book = Codebook::global();
        if let Some(code) = codes.iter().find(|c| !book.contains(context, **c)) {
            return Err(QueryError::InvalidRelationshipCode {
                context,
                code: *code,
            });
        }
    }
    Ok(Hop {
        context,
        codes: spec.codes,
    })
}
