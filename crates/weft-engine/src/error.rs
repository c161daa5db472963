//! Registration-time and invocation-time errors

use crate::pointcut::PatternError;
use crate::relation::{RelationClass, RelationSet};
use serde::Serialize;
use thiserror::Error;

/// Errors that reject a program model when the registry is built
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// Two variants of one member serve the same relation
    #[error("variants of {member} overlap on {relation}")]
    AmbiguousVariant {
        /// Qualified member name
        member: String,
        /// First relation served twice
        relation: RelationClass,
    },

    /// Variants of a member leave relations unserved
    #[error("variants of {member} do not cover {missing}")]
    UnpartitionedRelationSet {
        /// Qualified member name
        member: String,
        /// Relations no variant serves
        missing: RelationSet,
    },

    /// An explicit pointcut names a join point no member declares
    #[error("pointcut `{pattern}` names a join point that no member declares")]
    ExplicitJoinPointNotFound {
        /// Pattern source text
        pattern: String,
    },

    /// Advice return type incompatible with a join point it matches
    #[error("pointcut `{pattern}` returns {declared} but matches {member}, which returns {expected}")]
    AdviceReturnTypeMismatch {
        /// Pattern source text
        pattern: String,
        /// Qualified member name of the join point
        member: String,
        /// Type declared on the pointcut
        declared: String,
        /// Return type of the member
        expected: String,
    },

    /// A parameter can be masked but has nothing to fall back to
    #[error("parameter `{param}` of {member} is hidden from some callers but has no default")]
    MaskedArgumentDefaultMissing {
        /// Qualified member name
        member: String,
        /// Parameter name
        param: String,
    },

    /// Pointcut or scope pattern failed to parse
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// Pattern source text
        pattern: String,
        /// Parse error
        source: PatternError,
    },

    /// Reference to an undeclared module
    #[error("unknown module `{name}` referenced by {referenced_by}")]
    UnknownModule {
        /// Module name
        name: String,
        /// Referencing declaration
        referenced_by: String,
    },

    /// Reference to an undeclared type
    #[error("unknown type `{name}` referenced by {referenced_by}")]
    UnknownType {
        /// Type name
        name: String,
        /// Referencing declaration
        referenced_by: String,
    },

    /// Reference to an undeclared aspect
    #[error("unknown aspect `{name}` referenced by pointcut `{referenced_by}`")]
    UnknownAspect {
        /// Aspect name
        name: String,
        /// Referencing pointcut pattern
        referenced_by: String,
    },

    /// Reference to a body that was never bound
    #[error("unknown body `{name}` referenced by {referenced_by}")]
    UnknownBody {
        /// Body name
        name: String,
        /// Referencing declaration
        referenced_by: String,
    },

    /// Member with neither a body nor variants
    #[error("{member} has no body and no variants")]
    MissingBody {
        /// Qualified member name
        member: String,
    },

    /// Module declared twice
    #[error("module `{name}` declared twice")]
    DuplicateModule {
        /// Module name
        name: String,
    },

    /// Type declared twice
    #[error("type `{name}` declared twice")]
    DuplicateType {
        /// Qualified type name
        name: String,
    },

    /// Aspect declared twice
    #[error("aspect `{name}` declared twice")]
    DuplicateAspect {
        /// Aspect name
        name: String,
    },

    /// Member with the same name, kind and arity declared twice on one type
    #[error("{member} declared twice")]
    DuplicateMember {
        /// Qualified member name
        member: String,
    },

    /// Join point name declared twice in one member
    #[error("join point `{name}` declared twice in {member}")]
    DuplicateJoinPoint {
        /// Qualified member name
        member: String,
        /// Join point name
        name: String,
    },

    /// Base type chain loops back on itself
    #[error("inheritance cycle through `{ty}`")]
    InheritanceCycle {
        /// Qualified type name
        ty: String,
    },
}

/// All errors found while building a registry
///
/// Errors are collected rather than reported one at a time so that a
/// front-end can surface everything in a single pass.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("registry rejected with {} error(s){}", .errors.len(), bullet_list(.errors))]
pub struct BuildError {
    /// Every error found, in discovery order
    pub errors: Vec<RegistryError>,
}

impl BuildError {
    /// Check whether any error matches `pred`
    pub fn any(&self, pred: impl Fn(&RegistryError) -> bool) -> bool {
        self.errors.iter().any(pred)
    }
}

fn bullet_list(errors: &[RegistryError]) -> String {
    errors.iter().map(|e| format!("\n  - {}", e)).collect()
}

/// Invocation-time failure
///
/// Faults unwind through the body and after-chain, popping every security
/// frame on the way; the engine never recovers from them itself.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum Fault {
    /// Raised by body or advice code
    #[error("{message}")]
    Raised {
        /// Fault message
        message: String,
    },

    /// Chain was cancelled
    #[error("invocation cancelled")]
    Cancelled,

    /// Too many nested invocations
    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Wrong number of arguments for the target
    #[error("{member} takes {expected} argument(s), got {actual}")]
    ArgumentCount {
        /// Qualified member name
        member: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Advice returned a value without declaring a return type
    #[error("advice `{pattern}` returned a value but declares no return type")]
    IllegalAdviceReturn {
        /// Pattern source text
        pattern: String,
    },

    /// Target could not be resolved
    #[error("no such member: {member}")]
    NoSuchMember {
        /// Member id or name as requested
        member: String,
    },

    /// Instance member invoked without a receiver
    #[error("{member} is an instance member and needs a receiver")]
    NotAnInstance {
        /// Qualified member name
        member: String,
    },

    /// Code hit a join point its member does not declare
    #[error("join point `{name}` is not declared by {member}")]
    UndeclaredJoinPoint {
        /// Qualified member name, or the advice pattern
        member: String,
        /// Join point name
        name: String,
    },
}

impl Fault {
    /// Fault raised by user code
    pub fn raised(message: impl Into<String>) -> Self {
        Fault::Raised {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_lists_every_error() {
        let err = BuildError {
            errors: vec![
                RegistryError::DuplicateModule {
                    name: "core".to_string(),
                },
                RegistryError::MissingBody {
                    member: "A.B.run".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("registry rejected with 2 error(s)"));
        assert!(text.contains("module `core` declared twice"));
        assert!(text.contains("A.B.run has no body and no variants"));
        assert!(err.any(|e| matches!(e, RegistryError::MissingBody { .. })));
    }

    #[test]
    fn test_fault_serializes_tagged() {
        let json = serde_json::to_string(&Fault::raised("boom")).unwrap();
        assert_eq!(json, r#"{"fault":"raised","message":"boom"}"#);
    }
}
