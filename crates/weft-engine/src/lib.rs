//! Weft Engine
//!
//! Caller-relation dispatch and aspect weaving for an object-oriented
//! language runtime. The front-end hands this crate a fully resolved
//! program model; the engine decides, for every invocation, which body
//! variant runs, which arguments the callee may see, and which advice runs
//! around it, in a deterministic order.
//!
//! - **Relation classifier** (`relation`): call site + target → [`RelationClass`]
//! - **Security frames** (`security`): the effective relation in force on a call chain
//! - **Variant resolver** (`variant`): body selection and argument masking
//! - **Pointcuts** (`pointcut`): pattern lexer, parser and precompiled matcher
//! - **Weaving** (`weave`): the before → body → after state machine
//! - **Registry** (`registry`): validated, frozen program model
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_engine::{Flow, MemberDecl, ModuleDecl, RegistryBuilder, TypeDecl, Value, Weaver};
//!
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .module(ModuleDecl::new("billing"))
//!     .ty(TypeDecl::new("Invoice", "Acme.Billing", "billing"))
//!     .member(MemberDecl::function("Acme.Billing.Invoice", "Total").returns("int").body("total"))
//!     .body_fn("total", |_cx| Ok(Flow::Return(Value::Int(42))));
//!
//! let weaver = Weaver::new(builder.build()?.into());
//! let total = weaver.registry().find_member("Acme.Billing.Invoice.Total").unwrap();
//! let outcome = weaver.call_external(total, None, vec![]);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]

// ============================================================================
// Core Modules
// ============================================================================

/// Runtime values and object references
pub mod value;

/// Relation classes, relation sets and the relation classifier
pub mod relation;

/// Per-chain security frame stack
pub mod security;

/// Variant selection and argument masking
pub mod variant;

/// Pointcut patterns and the join point matcher
pub mod pointcut;

/// Frozen program registry and its builder
pub mod registry;

/// Declarations consumed from the front-end
pub mod model;

/// Executable body seam
pub mod body;

/// Call chains: frame stack, trace, cancellation
pub mod chain;

/// Weaving executor
pub mod weave;

/// Declarative scripted bodies
pub mod script;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

// ============================================================================
// Re-exports
// ============================================================================

pub use body::{Body, BodyResult, Flow, Interrupt};
pub use chain::{CallChain, CancelHandle};
pub use config::{ConfigError, WeaveConfig};
pub use error::{BuildError, Fault, RegistryError};
pub use model::{
    AspectDecl, DefaultDecl, JoinPointDecl, MemberDecl, ModelError, ModuleDecl, OwnerDecl,
    ParamDecl, PointcutDecl, ProgramModel, TypeDecl, VariantDecl,
};
pub use pointcut::{AdviceKind, AdvicePlan, JoinPointSite, Pattern, PatternError, PointcutMatcher};
pub use registry::{
    AspectId, MemberId, MemberInfo, MemberKind, ModuleId, PointcutId, Registry, RegistryBuilder,
    TypeId, TypeInfo, Visibility,
};
pub use relation::{classify, CallSite, Caller, RelationClass, RelationSet};
pub use script::{Output, Script, Step};
pub use security::{SecurityFrame, SecurityStack};
pub use value::{ObjectRef, Value};
pub use variant::{resolve, Binding, Resolution};
pub use weave::{BodyContext, Invocation, TraceEvent, Weaver};
