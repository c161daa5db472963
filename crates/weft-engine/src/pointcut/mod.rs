//! Pointcut patterns
//!
//! A pointcut pairs a pattern with before or after advice. Patterns are
//! lexed with logos, parsed into a [`Pattern`], and matched against every
//! join point once, when the registry is frozen. The results are kept as
//! [`AdvicePlan`]s so the weaving executor never matches at call time.

mod lexer;
mod matcher;
mod pattern;

pub use matcher::{AdvicePlans, PointcutMatcher};
pub use pattern::{NamespacePattern, ParamPattern, Pattern, Segment};

use crate::registry::{MemberId, PointcutId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pattern parse error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (at offset {offset})")]
pub struct PatternError {
    /// What went wrong
    pub message: String,
    /// Byte offset into the pattern text
    pub offset: usize,
}

impl PatternError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// When advice runs relative to its join point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdviceKind {
    /// Before the join point
    Before,
    /// After the join point completes normally
    After,
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdviceKind::Before => f.pad("before"),
            AdviceKind::After => f.pad("after"),
        }
    }
}

/// A place advice can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPointSite {
    /// Member entry (before-chain)
    Entry(MemberId),
    /// Member exit (after-chain)
    Exit(MemberId),
    /// Explicit join point declared inside a member
    Explicit {
        /// Enclosing member
        member: MemberId,
        /// Index into the member's join points
        index: usize,
    },
}

impl JoinPointSite {
    /// Member the site belongs to
    pub fn member(&self) -> MemberId {
        match *self {
            JoinPointSite::Entry(member) | JoinPointSite::Exit(member) => member,
            JoinPointSite::Explicit { member, .. } => member,
        }
    }
}

/// Advice matched at one join point, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvicePlan {
    /// Before advice, descending declaration id
    pub before: Vec<PointcutId>,
    /// After advice, ascending declaration id
    pub after: Vec<PointcutId>,
}

impl AdvicePlan {
    /// Check whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}
