//! Tokenizer for network path queries, built from nom combinators.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, recognize, value},
    sequence::pair,
    IResult,
};

use crate::error::{QueryError, QueryResult};

/// A lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Arrow,
    Open,
    Close,
    Comma,
    Word(&'a str),
    Number(&'a str),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Arrow => write!(f, "'->'"),
            Token::Open => write!(f, "'['"),
            Token::Close => write!(f, "']'"),
            Token::Comma => write!(f, "','"),
            Token::Word(w) => write!(f, "'{}'", w),
            Token::Number(n) => write!(f, "'{}'", n),
        }
    }
}

/// A token with its byte offset in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Spanned<'a> {
    pub token: Token<'a>,
    pub offset: usize,
}

/// Splits `input` into tokens, skipping whitespace.
pub(crate) fn tokenize(input: &str) -> QueryResult<Vec<Spanned<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        if let Ok((after, _)) = ws(rest) {
            rest = after;
        }
        if rest.is_empty() {
            break;
        }

        let offset = input.len() - rest.len();
        match token(rest) {
            Ok((after, token)) => {
                tokens.push(Spanned { token, offset });
                rest = after;
            }
            Err(_) => {
                let found = rest.chars().next().unwrap_or_default();
                return Err(QueryError::syntax(
                    offset,
                    format!("unexpected character '{}'", found),
                ));
            }
        }
    }

    Ok(tokens)
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        value(Token::Arrow, tag("->")),
        value(Token::Open, char('[')),
        value(Token::Close, char(']')),
        value(Token::Comma, char(',')),
        map(digit1, Token::Number),
        map(word, Token::Word),
    ))(input)
}

/// Identifier: a letter or underscore followed by letters, digits, `_` or `.`
fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    ))(input)
}

fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}
