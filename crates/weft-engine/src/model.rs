//! Front-end declarations
//!
//! The resolved program model the engine consumes: modules, types, members,
//! aspects and pointcuts, referring to each other by name. Every declaration
//! is `serde`-deserializable so a whole model (bodies included, as scripts)
//! can be loaded from TOML or JSON.
//!
//! ```toml
//! [[modules]]
//! name = "billing"
//!
//! [[types]]
//! name = "Invoice"
//! namespace = "Acme.Billing"
//! module = "billing"
//!
//! [[members]]
//! owner = "Acme.Billing.Invoice"
//! name = "Charge"
//! returns = "bool"
//! body = "charge"
//!
//! [bodies]
//! charge = [{ op = "emit", text = "charging" }, { op = "return", value = true }]
//! ```

use crate::pointcut::AdviceKind;
use crate::registry::{MemberKind, RegistryBuilder, Visibility};
use crate::relation::RelationSet;
use crate::script::{Output, Script, Step};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors loading a program model file
#[derive(Debug, Error)]
pub enum ModelError {
    /// Failed to read the file
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse model: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failed to parse JSON
    #[error("Failed to parse model: {0}")]
    Json(#[from] serde_json::Error),
}

/// A deployable compilation unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleDecl {
    /// Module name
    pub name: String,
}

impl ModuleDecl {
    /// Declare a module
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A type declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeDecl {
    /// Simple name
    pub name: String,
    /// Dotted namespace path (may be empty)
    #[serde(default)]
    pub namespace: String,
    /// Owning module
    pub module: String,
    /// Base type (qualified or unique simple name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Implemented interfaces
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Declared visibility
    #[serde(default)]
    pub visibility: Visibility,
}

impl TypeDecl {
    /// Declare a public type
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            module: module.into(),
            base: None,
            capabilities: Vec::new(),
            visibility: Visibility::Public,
        }
    }

    /// Set the base type
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Add an implemented interface
    pub fn capability(mut self, name: impl Into<String>) -> Self {
        self.capabilities.push(name.into());
        self
    }

    /// Set the visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Namespace-qualified name
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Default for a parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DefaultDecl {
    /// Evaluated by a body in the callee's frame
    Computed {
        /// Body name
        computed: String,
    },
    /// Constant value
    Const(Value),
}

/// A formal parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamDecl {
    /// Parameter name
    pub name: String,
    /// Parameter type
    #[serde(rename = "type")]
    pub ty: String,
    /// Default expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultDecl>,
    /// Relations allowed to supply this argument (all when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<RelationSet>,
}

impl ParamDecl {
    /// Declare a parameter visible to every caller
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            relations: None,
        }
    }

    /// Constant default
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultDecl::Const(value.into()));
        self
    }

    /// Default computed by a named body
    pub fn default_computed(mut self, body: impl Into<String>) -> Self {
        self.default = Some(DefaultDecl::Computed {
            computed: body.into(),
        });
        self
    }

    /// Restrict which relations may supply this argument
    pub fn relations(mut self, relations: RelationSet) -> Self {
        self.relations = Some(relations);
        self
    }
}

/// A body alternative serving a subset of relations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantDecl {
    /// Relations this variant serves
    pub relations: RelationSet,
    /// Body name
    pub body: String,
}

/// An explicit join point declared inside a member body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinPointDecl {
    /// Join point name (qualified as `Member.Name`)
    pub name: String,
    /// Argument types
    #[serde(default)]
    pub params: Vec<String>,
}

fn default_returns() -> String {
    "void".to_string()
}

/// A member declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberDecl {
    /// Owner type (qualified or unique simple name)
    pub owner: String,
    /// Member kind
    #[serde(default)]
    pub kind: MemberKind,
    /// Member name
    pub name: String,
    /// Ordered parameters
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    /// Return type
    #[serde(default = "default_returns")]
    pub returns: String,
    /// Declared visibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Static member
    #[serde(default, rename = "static")]
    pub is_static: bool,
    /// Forward the caller's relation instead of introducing a new one
    #[serde(default)]
    pub passthru: bool,
    /// Body when there are no explicit variants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Explicit variants
    #[serde(default)]
    pub variants: Vec<VariantDecl>,
    /// Explicit join points declared in the body
    #[serde(default)]
    pub join_points: Vec<JoinPointDecl>,
}

impl MemberDecl {
    /// Declare a member of the given kind
    pub fn new(owner: impl Into<String>, kind: MemberKind, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            kind,
            name: name.into(),
            params: Vec::new(),
            returns: default_returns(),
            visibility: Visibility::Public,
            is_static: false,
            passthru: false,
            body: None,
            variants: Vec::new(),
            join_points: Vec::new(),
        }
    }

    /// Declare a public function
    pub fn function(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(owner, MemberKind::Function, name)
    }

    /// Append a parameter
    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.returns = ty.into();
        self
    }

    /// Set the visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Make the member static
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Make the member pass-through
    pub fn passthru(mut self) -> Self {
        self.passthru = true;
        self
    }

    /// Set the single body
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a variant
    pub fn variant(mut self, relations: RelationSet, body: impl Into<String>) -> Self {
        self.variants.push(VariantDecl {
            relations,
            body: body.into(),
        });
        self
    }

    /// Declare an explicit join point
    pub fn join_point(mut self, name: impl Into<String>, params: &[&str]) -> Self {
        self.join_points.push(JoinPointDecl {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Qualified name for diagnostics
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }
}

/// An aspect: a namespace-scoped container of pointcuts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AspectDecl {
    /// Aspect name
    pub name: String,
    /// Owning module
    pub module: String,
    /// Namespace scope (`Ns` recursive, `Ns.*` direct children); all when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AspectDecl {
    /// Declare an unscoped aspect
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            scope: None,
        }
    }

    /// Restrict to a namespace scope
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Who owns a pointcut
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OwnerDecl {
    /// Declared inside an aspect
    Aspect(String),
    /// Declared inside a type
    Type(String),
}

/// A pointcut declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointcutDecl {
    /// Before or after
    pub advice: AdviceKind,
    /// Pattern text
    pub pattern: String,
    /// Declared return type, required for advice that returns a value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Body name
    pub body: String,
    /// Owner
    pub owner: OwnerDecl,
}

impl PointcutDecl {
    /// Declare an aspect-owned pointcut
    pub fn new(advice: AdviceKind, pattern: impl Into<String>, body: impl Into<String>, aspect: impl Into<String>) -> Self {
        Self {
            advice,
            pattern: pattern.into(),
            returns: None,
            body: body.into(),
            owner: OwnerDecl::Aspect(aspect.into()),
        }
    }

    /// Aspect-owned before advice
    pub fn before(pattern: impl Into<String>, body: impl Into<String>, aspect: impl Into<String>) -> Self {
        Self::new(AdviceKind::Before, pattern, body, aspect)
    }

    /// Aspect-owned after advice
    pub fn after(pattern: impl Into<String>, body: impl Into<String>, aspect: impl Into<String>) -> Self {
        Self::new(AdviceKind::After, pattern, body, aspect)
    }

    /// Move the pointcut into a type
    pub fn owned_by_type(mut self, ty: impl Into<String>) -> Self {
        self.owner = OwnerDecl::Type(ty.into());
        self
    }

    /// Declare a return type
    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.returns = Some(ty.into());
        self
    }
}

/// A complete program model, as loaded from a file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgramModel {
    /// Modules
    #[serde(default)]
    pub modules: Vec<ModuleDecl>,
    /// Types
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    /// Members
    #[serde(default)]
    pub members: Vec<MemberDecl>,
    /// Aspects
    #[serde(default)]
    pub aspects: Vec<AspectDecl>,
    /// Pointcuts, in declaration order
    #[serde(default)]
    pub pointcuts: Vec<PointcutDecl>,
    /// Scripted bodies by name
    #[serde(default)]
    pub bodies: BTreeMap<String, Vec<Step>>,
}

impl ProgramModel {
    /// Parse a TOML model
    pub fn from_toml_str(source: &str) -> Result<Self, ModelError> {
        Ok(toml::from_str(source)?)
    }

    /// Parse a JSON model
    pub fn from_json_str(source: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a model file; `.json` files are JSON, everything else TOML
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_toml_str(&source),
        }
    }

    /// Feed every declaration into a builder, binding scripted bodies
    /// that write to `output`
    pub fn into_builder(self, output: &Output) -> RegistryBuilder {
        let mut builder = RegistryBuilder::new();
        for module in self.modules {
            builder.module(module);
        }
        for ty in self.types {
            builder.ty(ty);
        }
        for member in self.members {
            builder.member(member);
        }
        for aspect in self.aspects {
            builder.aspect(aspect);
        }
        for pointcut in self.pointcuts {
            builder.pointcut(pointcut);
        }
        for (name, steps) in self.bodies {
            let script = Script::new(name.clone(), steps, output.clone());
            builder.body(name, script);
        }
        builder
    }
}
