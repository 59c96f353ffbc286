//! Recursive-descent parser over the token stream.
//!
//! Grammar:
//!
//! ```text
//! Query   := AggList '->' Hop ('->' Hop)* '->' Anchor
//!          | Anchor '->' Hop ('->' Hop)* '->' AggList
//! AggList := '[' Ident (',' Ident)* ']'
//! Hop     := ContextName '[' ('all' | Int (',' Int)*) ']'
//! Anchor  := 'sample'
//! ```
//!
//! `[]` is accepted here and rejected during validation so that an empty
//! variable list gets its own error.

use std::collections::BTreeSet;

use crate::ast::{CodeSet, Direction, HopSpec, PathExpr, Segment, ANCHOR};
use crate::codebook::RelationCode;
use crate::error::{QueryError, QueryResult};
use crate::lexer::{tokenize, Spanned, Token};

/// Parses a query string into a [`PathExpr`] in ego→alter order.
///
/// Only syntax is checked; see [`validate`](crate::validate) for codebook
/// checks.
///
/// # Examples
///
/// ```rust
/// use netcbs_query::{parse, Direction};
///
/// let path = parse("[Income] -> Family[301] -> Schoolmates[all] -> sample").unwrap();
/// assert_eq!(path.direction, Direction::VariablesFirst);
/// // The hop adjacent to the sample comes first.
/// assert_eq!(path.hops[0].context, "Schoolmates");
/// ```
pub fn parse(input: &str) -> QueryResult<PathExpr> {
    if input.trim().is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser::new(&tokens, input.len());
    let segments = parser.segments()?;
    assemble(segments, input.len())
}

/// Parses a single hop such as `Family[301,302]`. A bare context name means
/// `[all]`.
pub(crate) fn parse_hop_spec(input: &str) -> QueryResult<HopSpec> {
    if input.trim().is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser::new(&tokens, input.len());
    let hop = parser.hop(true)?;
    if let Some(extra) = parser.peek() {
        return Err(QueryError::syntax(
            parser.offset(),
            format!("unexpected {} after hop", extra),
        ));
    }
    Ok(hop)
}

struct Parser<'t, 'a> {
    tokens: &'t [Spanned<'a>],
    pos: usize,
    end: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn new(tokens: &'t [Spanned<'a>], end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn eat(&mut self, expected: Token<'a>) -> bool {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token<'a>, what: &str) -> QueryResult<()> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(self.unexpected(what))
    }

    fn unexpected(&self, what: &str) -> QueryError {
        match self.peek() {
            Some(found) => {
                QueryError::syntax(self.offset(), format!("expected {}, found {}", what, found))
            }
            None => QueryError::syntax(
                self.offset(),
                format!("expected {}, found end of query", what),
            ),
        }
    }

    fn segments(&mut self) -> QueryResult<Vec<(usize, Segment)>> {
        let mut segments = vec![self.segment()?];
        while self.peek().is_some() {
            self.expect(Token::Arrow, "'->' between segments")?;
            segments.push(self.segment()?);
        }
        Ok(segments)
    }

    fn segment(&mut self) -> QueryResult<(usize, Segment)> {
        let offset = self.offset();
        match self.peek() {
            Some(Token::Open) => Ok((offset, Segment::Variables(self.variables()?))),
            Some(Token::Word(w))
                if w.eq_ignore_ascii_case(ANCHOR) && self.peek_at(1) != Some(&Token::Open) =>
            {
                self.pos += 1;
                Ok((offset, Segment::Anchor))
            }
            Some(Token::Word(_)) => Ok((offset, Segment::Hop(self.hop(false)?))),
            Some(Token::Arrow) => Err(QueryError::syntax(
                offset,
                "empty segment; use ' -> ' between segments",
            )),
            _ => Err(self.unexpected("a variable list, hop or 'sample'")),
        }
    }

    fn variables(&mut self) -> QueryResult<Vec<String>> {
        self.expect(Token::Open, "'['")?;
        let mut variables = Vec::new();
        if self.eat(Token::Close) {
            return Ok(variables);
        }

        loop {
            match self.peek() {
                Some(Token::Word(name)) => {
                    self.pos += 1;
                    variables.push((*name).to_string());
                }
                _ => return Err(self.unexpected("a variable name")),
            }
            if self.eat(Token::Comma) {
                continue;
            }
            self.expect(Token::Close, "',' or ']'")?;
            return Ok(variables);
        }
    }

    fn hop(&mut self, bare_allowed: bool) -> QueryResult<HopSpec> {
        let position = self.offset();
        let context = match self.peek() {
            Some(Token::Word(name)) => {
                self.pos += 1;
                (*name).to_string()
            }
            _ => return Err(self.unexpected("a context name")),
        };

        if bare_allowed && self.peek().is_none() {
            return Ok(HopSpec {
                context,
                codes: CodeSet::All,
                position,
            });
        }

        self.expect(Token::Open, "'[' after context name")?;
        let codes = match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("all") => {
                self.pos += 1;
                CodeSet::All
            }
            Some(Token::Number(_)) => CodeSet::Codes(self.codes()?),
            _ => return Err(self.unexpected("'all' or relationship codes")),
        };
        self.expect(Token::Close, "']' after relationship codes")?;

        Ok(HopSpec {
            context,
            codes,
            position,
        })
    }

    fn codes(&mut self) -> QueryResult<BTreeSet<RelationCode>> {
        let mut codes = BTreeSet::new();
        loop {
            let offset = self.offset();
            let Some(Token::Number(digits)) = self.peek() else {
                return Err(self.unexpected("a relationship code"));
            };
            self.pos += 1;
            let code = digits.parse::<RelationCode>().map_err(|_| {
                QueryError::syntax(offset, format!("relationship code '{}' is out of range", digits))
            })?;
            codes.insert(code);
            if !self.eat(Token::Comma) {
                return Ok(codes);
            }
        }
    }
}

/// Orders parsed segments into a [`PathExpr`].
fn assemble(segments: Vec<(usize, Segment)>, end: usize) -> QueryResult<PathExpr> {
    let count = segments.len();
    let direction = match (segments.first(), segments.last()) {
        (Some((_, Segment::Variables(_))), Some((_, Segment::Anchor))) if count > 1 => {
            Direction::VariablesFirst
        }
        (Some((_, Segment::Anchor)), Some((_, Segment::Variables(_)))) if count > 1 => {
            Direction::SampleFirst
        }
        _ => {
            return Err(QueryError::syntax(
                0,
                "query must start with '[VARS]' and end with 'sample' (or the reverse)",
            ))
        }
    };

    if count < 3 {
        return Err(QueryError::syntax(
            end,
            "query must contain at least one hop, e.g. '[VAR] -> Family[all] -> sample'",
        ));
    }

    let mut variables = Vec::new();
    let mut hops = Vec::with_capacity(count - 2);
    for (index, (offset, segment)) in segments.into_iter().enumerate() {
        let is_boundary = index == 0 || index == count - 1;
        match segment {
            Segment::Variables(vars) if is_boundary => variables = vars,
            Segment::Anchor if is_boundary => {}
            Segment::Hop(hop) if !is_boundary => hops.push(hop),
            other => {
                return Err(QueryError::syntax(
                    offset,
                    format!("unexpected segment '{}' between the variable list and 'sample'", other),
                ))
            }
        }
    }

    if direction == Direction::VariablesFirst {
        hops.reverse();
    }

    Ok(PathExpr {
        direction,
        hops,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax_position(result: QueryResult<PathExpr>) -> usize {
        match result {
            Err(QueryError::Syntax { position, .. }) => position,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    mod well_formed {
        use super::*;

        /// Test: one hop, variables first
        #[test]
        fn test_single_hop() {
            let path = parse("[Income] -> Family[301] -> sample").unwrap();
            assert_eq!(path.direction, Direction::VariablesFirst);
            assert_eq!(path.variables, vec!["Income"]);
            assert_eq!(path.hops.len(), 1);
            assert_eq!(path.hops[0].context, "Family");
            assert_eq!(
                path.hops[0].codes,
                CodeSet::Codes([301].into_iter().collect())
            );
        }

        /// Test: hops are reordered so the sample-adjacent hop comes first
        #[test]
        fn test_variables_first_is_reversed() {
            let path = parse("[Income] -> Family[301] -> Schoolmates[all] -> sample").unwrap();
            let contexts: Vec<_> = path.hops.iter().map(|h| h.context.as_str()).collect();
            assert_eq!(contexts, vec!["Schoolmates", "Family"]);
        }

        /// Test: sample-first keeps written order
        #[test]
        fn test_sample_first() {
            let path = parse("sample -> Schoolmates[all] -> Family[301] -> [Income]").unwrap();
            assert_eq!(path.direction, Direction::SampleFirst);
            let contexts: Vec<_> = path.hops.iter().map(|h| h.context.as_str()).collect();
            assert_eq!(contexts, vec!["Schoolmates", "Family"]);
        }

        /// Test: anchor and 'all' are case-insensitive
        #[test]
        fn test_case_insensitive_keywords() {
            let path = parse("[Income] -> Family[ALL] -> SAMPLE").unwrap();
            assert!(path.hops[0].codes.is_all());
        }

        /// Test: multiple variables and codes
        #[test]
        fn test_lists() {
            let path = parse("[Income, Age] -> Family[302, 301, 301] -> sample").unwrap();
            assert_eq!(path.variables, vec!["Income", "Age"]);
            assert_eq!(
                path.hops[0].codes,
                CodeSet::Codes([301, 302].into_iter().collect())
            );
        }

        /// Test: empty variable list parses (rejected during validation)
        #[test]
        fn test_empty_variable_list_parses() {
            let path = parse("[] -> Family[all] -> sample").unwrap();
            assert!(path.variables.is_empty());
        }

        /// Test: a context named like the anchor is still a hop when bracketed
        #[test]
        fn test_sample_with_brackets_is_hop() {
            let path = parse("[x] -> sample[all] -> sample").unwrap();
            assert_eq!(path.hops[0].context, "sample");
        }
    }

    mod malformed {
        use super::*;

        #[test]
        fn test_empty_query() {
            assert_eq!(parse("   "), Err(QueryError::EmptyQuery));
        }

        #[test]
        fn test_no_hop() {
            let input = "[Income] -> sample";
            assert_eq!(syntax_position(parse(input)), input.len());
        }

        #[test]
        fn test_missing_anchor() {
            assert_eq!(syntax_position(parse("[Income] -> Family[301]")), 0);
        }

        #[test]
        fn test_both_ends_variables() {
            assert_eq!(syntax_position(parse("[A] -> Family[301] -> [B]")), 0);
        }

        #[test]
        fn test_empty_segment() {
            assert_eq!(syntax_position(parse("[Income] -> -> sample")), 12);
        }

        #[test]
        fn test_missing_arrow() {
            assert_eq!(syntax_position(parse("[Income] Family[301] -> sample")), 9);
        }

        #[test]
        fn test_unclosed_codes() {
            assert!(parse("[Income] -> Family[301 -> sample").is_err());
        }

        #[test]
        fn test_empty_codes() {
            assert_eq!(syntax_position(parse("[Income] -> Family[] -> sample")), 19);
        }

        #[test]
        fn test_trailing_comma_in_codes() {
            assert!(parse("[Income] -> Family[301,] -> sample").is_err());
        }

        #[test]
        fn test_anchor_in_middle() {
            assert_eq!(
                syntax_position(parse("[Income] -> sample -> Family[301] -> sample")),
                12
            );
        }

        #[test]
        fn test_code_out_of_range() {
            assert!(parse("[Income] -> Family[99999999999] -> sample").is_err());
        }

        #[test]
        fn test_bare_context_in_query() {
            assert!(parse("[Income] -> Family -> sample").is_err());
        }
    }

    mod single_hop {
        use super::*;

        #[test]
        fn test_bracketed() {
            let hop = parse_hop_spec("Neighbors[101]").unwrap();
            assert_eq!(hop.context, "Neighbors");
            assert_eq!(hop.codes, CodeSet::Codes([101].into_iter().collect()));
        }

        #[test]
        fn test_bare_name_means_all() {
            let hop = parse_hop_spec("Colleagues").unwrap();
            assert!(hop.codes.is_all());
        }

        #[test]
        fn test_trailing_tokens() {
            assert!(parse_hop_spec("Family[all] -> sample").is_err());
        }
    }
}
