//! Pattern lexer
//!
//! Tokenizes pointcut and scope pattern text with logos. Keywords are not
//! separate tokens: `get` or `public` are only modifiers in modifier
//! position, so the parser decides from context.

use super::PatternError;
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub(crate) enum Token<'s> {
    #[token("::")]
    PathSep,

    #[token("..")]
    Ellipsis,

    #[token(".")]
    Dot,

    #[token("*")]
    Star,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    // Hyphenated words cover `indexer-get` and friends
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(-[A-Za-z0-9_]+)*", |lex| lex.slice())]
    Ident(&'s str),
}

impl Token<'_> {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::PathSep => "`::`".to_string(),
            Token::Ellipsis => "`..`".to_string(),
            Token::Dot => "`.`".to_string(),
            Token::Star => "`*`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Ident(name) => format!("`{}`", name),
        }
    }
}

/// Tokenize `source`, failing on the first unrecognized character
pub(crate) fn tokenize(source: &str) -> Result<Vec<(Token<'_>, Range<usize>)>, PatternError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(PatternError::new(
                    format!("unexpected character `{}`", &source[span.clone()]),
                    span.start,
                ))
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_lex_full_pattern() {
        assert_eq!(
            kinds("public get Acme.* :: Invoice.Total(int, *)"),
            vec![
                Token::Ident("public"),
                Token::Ident("get"),
                Token::Ident("Acme"),
                Token::Dot,
                Token::Star,
                Token::PathSep,
                Token::Ident("Invoice"),
                Token::Dot,
                Token::Ident("Total"),
                Token::LParen,
                Token::Ident("int"),
                Token::Comma,
                Token::Star,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_lex_hyphenated_and_ellipsis() {
        assert_eq!(
            kinds("indexer-get Item(..)"),
            vec![
                Token::Ident("indexer-get"),
                Token::Ident("Item"),
                Token::LParen,
                Token::Ellipsis,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_lex_error_offset() {
        let err = tokenize("Open#").unwrap_err();
        assert_eq!(err.offset, 4);
    }
}
