//! Pattern syntax tree and parser
//!
//! ```text
//! pointcut  := modifier* [namespace '::'] path [ '(' params ')' ] [ 'implements' IDENT (',' IDENT)* ]
//! modifier  := visibility | kind | 'point'
//! namespace := IDENT ('.' IDENT)* ['.' '*']
//! path      := seg ('.' seg)*
//! params    := ε | '..' | seg (',' seg)*
//! ```

use super::lexer::{tokenize, Token};
use super::PatternError;
use crate::registry::{MemberKind, Visibility};
use std::fmt;
use std::ops::Range;

/// One name position in a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `*`
    Any,
    /// Literal name
    Name(String),
}

impl Segment {
    /// Check a name against this segment
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Any => true,
            Segment::Name(expected) => expected == name,
        }
    }

    /// Literal name, if not a wildcard
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Segment::Any => None,
            Segment::Name(name) => Some(name),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Any => f.write_str("*"),
            Segment::Name(name) => f.write_str(name),
        }
    }
}

/// Namespace filter
///
/// `A.B` accepts `A.B` and everything nested in it; `A.B.*` accepts only
/// types declared directly in `A.B`. A lone `*` accepts every namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePattern {
    /// Literal segments
    pub segments: Vec<String>,
    /// Only direct children of `segments`
    pub direct_only: bool,
}

impl NamespacePattern {
    /// Parse a standalone namespace pattern (aspect scopes)
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(source, &tokens);
        let segments = parser.dotted()?;
        let namespace = parser.namespace_from(segments)?;
        parser.finish()?;
        Ok(namespace)
    }

    /// Check a type's namespace
    pub fn matches(&self, namespace: &[String]) -> bool {
        if self.direct_only {
            namespace == self.segments.as_slice()
        } else {
            namespace.starts_with(&self.segments)
        }
    }
}

impl fmt::Display for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.segments.is_empty(), self.direct_only) {
            (true, false) => f.write_str("*"),
            (true, true) => f.write_str("<global>.*"),
            (false, direct) => {
                f.write_str(&self.segments.join("."))?;
                if direct {
                    f.write_str(".*")?;
                }
                Ok(())
            }
        }
    }
}

/// Parameter list filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamPattern {
    /// No list, or `(..)`
    Any,
    /// Exact arity with per-position type filters
    Exact(Vec<Segment>),
}

impl ParamPattern {
    /// Check a parameter type list
    pub fn matches<S: AsRef<str>>(&self, params: &[S]) -> bool {
        match self {
            ParamPattern::Any => true,
            ParamPattern::Exact(expected) => {
                expected.len() == params.len()
                    && expected.iter().zip(params).all(|(seg, ty)| seg.matches(ty.as_ref()))
            }
        }
    }
}

/// A compiled pointcut pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Visibility filter; empty accepts any
    pub visibilities: Vec<Visibility>,
    /// Kind filter; empty accepts any
    pub kinds: Vec<MemberKind>,
    /// Matches explicit join points instead of member entry and exit
    pub explicit: bool,
    /// Namespace filter
    pub namespace: Option<NamespacePattern>,
    /// Type name filter; `None` defers to the pointcut's owner
    pub type_name: Option<Segment>,
    /// Member name filter
    pub member: Segment,
    /// Join point name for explicit patterns
    pub point: Option<String>,
    /// Parameter filter
    pub params: ParamPattern,
    /// Required capabilities of the declaring type
    pub implements: Vec<String>,
}

impl Pattern {
    /// Parse pattern text
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let tokens = tokenize(source)?;
        Parser::new(source, &tokens).pattern()
    }
}

struct Parser<'a, 's> {
    source: &'a str,
    tokens: &'a [(Token<'s>, Range<usize>)],
    pos: usize,
}

impl<'a, 's> Parser<'a, 's> {
    fn new(source: &'a str, tokens: &'a [(Token<'s>, Range<usize>)]) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<Token<'s>> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn peek_at(&self, offset: usize) -> Option<Token<'s>> {
        self.tokens.get(self.pos + offset).map(|(t, _)| *t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len())
    }

    fn error(&self, message: impl Into<String>) -> PatternError {
        PatternError::new(message, self.offset())
    }

    fn unexpected(&self, expected: &str) -> PatternError {
        match self.peek() {
            Some(token) => self.error(format!("expected {}, found {}", expected, token.describe())),
            None => self.error(format!("expected {}, found end of pattern", expected)),
        }
    }

    fn eat(&mut self, token: Token<'s>) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token<'s>) -> Result<(), PatternError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    fn finish(&self) -> Result<(), PatternError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected {} after pattern", token.describe()))),
        }
    }

    fn segment(&mut self) -> Result<Segment, PatternError> {
        match self.peek() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(Segment::Any)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Segment::Name(name.to_string()))
            }
            _ => Err(self.unexpected("a name or `*`")),
        }
    }

    fn dotted(&mut self) -> Result<Vec<(Segment, usize)>, PatternError> {
        let mut segments = vec![(self.segment()?, self.offset_of_prev())];
        while self.eat(Token::Dot) {
            segments.push((self.segment()?, self.offset_of_prev()));
        }
        Ok(segments)
    }

    fn offset_of_prev(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| span.start)
            .unwrap_or(0)
    }

    fn namespace_from(&self, segments: Vec<(Segment, usize)>) -> Result<NamespacePattern, PatternError> {
        let count = segments.len();
        let mut names = Vec::with_capacity(count);
        let mut direct_only = false;
        for (index, (segment, offset)) in segments.into_iter().enumerate() {
            match segment {
                Segment::Name(name) => names.push(name),
                Segment::Any if index + 1 == count => direct_only = count > 1,
                Segment::Any => {
                    return Err(PatternError::new("`*` may only end a namespace", offset));
                }
            }
        }
        Ok(NamespacePattern {
            segments: names,
            direct_only,
        })
    }

    fn modifiers(&mut self, pattern: &mut Pattern) {
        // A keyword is a modifier only when a name follows it
        while let Some(Token::Ident(word)) = self.peek() {
            if !matches!(self.peek_at(1), Some(Token::Ident(_)) | Some(Token::Star)) {
                break;
            }
            if word == "point" {
                pattern.explicit = true;
            } else if let Some(visibility) = Visibility::from_keyword(word) {
                pattern.visibilities.push(visibility);
            } else if let Some(kind) = MemberKind::from_keyword(word) {
                pattern.kinds.push(kind);
            } else {
                break;
            }
            self.pos += 1;
        }
    }

    fn params(&mut self) -> Result<ParamPattern, PatternError> {
        if !self.eat(Token::LParen) {
            return Ok(ParamPattern::Any);
        }
        if self.eat(Token::RParen) {
            return Ok(ParamPattern::Exact(Vec::new()));
        }
        if self.eat(Token::Ellipsis) {
            self.expect(Token::RParen)?;
            return Ok(ParamPattern::Any);
        }
        let mut params = vec![self.segment()?];
        while self.eat(Token::Comma) {
            params.push(self.segment()?);
        }
        self.expect(Token::RParen)?;
        Ok(ParamPattern::Exact(params))
    }

    fn implements(&mut self) -> Result<Vec<String>, PatternError> {
        if self.peek() != Some(Token::Ident("implements")) {
            return Ok(Vec::new());
        }
        self.pos += 1;
        let mut names = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(name)) => {
                    self.pos += 1;
                    names.push(name.to_string());
                }
                _ => return Err(self.unexpected("an interface name")),
            }
            if !self.eat(Token::Comma) {
                return Ok(names);
            }
        }
    }

    fn pattern(&mut self) -> Result<Pattern, PatternError> {
        let mut pattern = Pattern {
            visibilities: Vec::new(),
            kinds: Vec::new(),
            explicit: false,
            namespace: None,
            type_name: None,
            member: Segment::Any,
            point: None,
            params: ParamPattern::Any,
            implements: Vec::new(),
        };
        self.modifiers(&mut pattern);

        let path_start = self.offset();
        let mut path = self.dotted()?;
        if self.eat(Token::PathSep) {
            pattern.namespace = Some(self.namespace_from(path)?);
            path = self.dotted()?;
        }

        let mut path: Vec<Segment> = path.into_iter().map(|(s, _)| s).collect();
        if pattern.explicit {
            if !(2..=3).contains(&path.len()) {
                return Err(PatternError::new(
                    "explicit pattern must be `[Type.]Member.Name`",
                    path_start,
                ));
            }
            let (Some(Segment::Name(point)), Some(Segment::Name(member))) = (path.pop(), path.pop()) else {
                return Err(PatternError::new(
                    "explicit pattern must name its member and join point literally",
                    path_start,
                ));
            };
            pattern.point = Some(point);
            pattern.member = Segment::Name(member);
        } else {
            if path.len() > 2 {
                return Err(PatternError::new(
                    "member path must be `[Type.]Member`; qualify namespaces with `::`",
                    path_start,
                ));
            }
            pattern.member = path.pop().unwrap_or(Segment::Any);
        }
        pattern.type_name = path.pop();

        pattern.params = self.params()?;
        pattern.implements = self.implements()?;
        self.finish()?;
        Ok(pattern)
    }
}
