//! Variant selection and argument masking
//!
//! Given the classified relation of an invocation, [`resolve`] picks the one
//! variant whose relation set contains it and decides, parameter by
//! parameter, whether the callee sees the caller's argument or the
//! parameter's default. The caller's value for a masked parameter is
//! dropped here and never reaches the body.

use crate::error::Fault;
use crate::registry::{DefaultValue, MemberInfo, Registry, Variant};
use crate::relation::RelationClass;
use crate::value::Value;

/// How one parameter is bound
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Caller's argument, visible to this relation
    Supplied(Value),
    /// Caller supplied a value this relation may not pass; default used
    Masked(DefaultValue),
    /// Caller omitted the argument; default used
    Omitted(DefaultValue),
}

impl Binding {
    /// Check whether the caller's argument was replaced
    pub fn is_masked(&self) -> bool {
        matches!(self, Binding::Masked(_))
    }
}

/// Outcome of variant resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Index of the selected variant
    pub index: usize,
    /// Selected variant
    pub variant: Variant,
    /// One binding per declared parameter
    pub bindings: Vec<Binding>,
}

/// Select the variant and bind arguments for `relation`
pub fn resolve(
    registry: &Registry,
    member: &MemberInfo,
    relation: RelationClass,
    args: Vec<Value>,
) -> Result<Resolution, Fault> {
    let arity_fault = |actual: usize| Fault::ArgumentCount {
        member: registry.member_path(member.id),
        expected: member.params.len(),
        actual,
    };

    if args.len() > member.params.len() {
        return Err(arity_fault(args.len()));
    }

    let (index, variant) = member
        .variants
        .iter()
        .enumerate()
        .find(|(_, v)| v.relations.contains(relation))
        .ok_or_else(|| {
            Fault::raised(format!(
                "no variant of {} serves {}",
                registry.member_path(member.id),
                relation
            ))
        })?;

    let supplied = args.len();
    let mut args = args.into_iter();
    let mut bindings = Vec::with_capacity(member.params.len());
    for param in &member.params {
        let binding = match (args.next(), &param.default) {
            (Some(value), _) if param.relations.contains(relation) => Binding::Supplied(value),
            (Some(_), Some(default)) => Binding::Masked(default.clone()),
            (None, Some(default)) => Binding::Omitted(default.clone()),
            // Unreachable for a validated registry: masked parameters always have defaults
            (Some(_), None) | (None, None) => return Err(arity_fault(supplied)),
        };
        bindings.push(binding);
    }

    Ok(Resolution {
        index,
        variant: *variant,
        bindings,
    })
}
