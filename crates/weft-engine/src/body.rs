//! Executable bodies
//!
//! Member bodies, advice bodies and computed parameter defaults are all
//! [`Body`] implementations bound to names when the registry is built. The
//! engine never looks inside a body; it only interprets the [`Flow`] or
//! [`Interrupt`] a body hands back.

use crate::error::Fault;
use crate::value::Value;
use crate::weave::BodyContext;
use std::fmt;

/// Normal completion of a body
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Fell off the end, or `break` out of advice: continue with the next step
    Next,
    /// Explicit `return value`
    Return(Value),
}

impl Flow {
    /// Value produced, `null` when the body fell through
    pub fn into_value(self) -> Value {
        match self {
            Flow::Next => Value::Null,
            Flow::Return(value) => value,
        }
    }
}

/// Abnormal completion of a body
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// Advice at an explicit join point returned on behalf of the enclosing member
    Return(Value),
    /// Fault propagating outward
    Fault(Fault),
}

impl From<Fault> for Interrupt {
    fn from(fault: Fault) -> Self {
        Interrupt::Fault(fault)
    }
}

/// Result of running a body
pub type BodyResult = Result<Flow, Interrupt>;

/// Code the engine can run
pub trait Body: Send + Sync {
    /// Run the body inside `cx`
    fn run(&self, cx: &mut BodyContext<'_>) -> BodyResult;

    /// Short description for traces and logs
    fn describe(&self) -> &str {
        "<native>"
    }
}

/// Body backed by a Rust closure
pub struct FnBody<F> {
    f: F,
}

impl<F> FnBody<F>
where
    F: Fn(&mut BodyContext<'_>) -> BodyResult + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Body for FnBody<F>
where
    F: Fn(&mut BodyContext<'_>) -> BodyResult + Send + Sync,
{
    fn run(&self, cx: &mut BodyContext<'_>) -> BodyResult {
        (self.f)(cx)
    }
}

impl<F> fmt::Debug for FnBody<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBody")
    }
}
