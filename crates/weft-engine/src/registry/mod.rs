//! Program registry
//!
//! The registry holds every module, type, member, variant and pointcut of a
//! program. It is built once through [`RegistryBuilder`], validated, and
//! then frozen: nothing in it changes afterwards, so a `Registry` behind an
//! `Arc` can be read from any number of call chains without locking.

mod builder;

pub use builder::RegistryBuilder;

use crate::body::Body;
use crate::pointcut::{AdviceKind, AdvicePlan, AdvicePlans, JoinPointSite, NamespacePattern, Pattern};
use crate::relation::RelationSet;
use crate::value::Value;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw index
            pub const fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            /// Raw index
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

define_id!(
    /// Module identifier
    ModuleId
);
define_id!(
    /// Type identifier
    TypeId
);
define_id!(
    /// Member identifier
    MemberId
);
define_id!(
    /// Aspect identifier
    AspectId
);
define_id!(
    /// Pointcut identifier, doubling as its declaration-order id
    ///
    /// Assigned in registration order, never reused or reordered.
    PointcutId
);
define_id!(
    /// Bound body identifier
    BodyId
);

/// Member kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberKind {
    /// Ordinary method
    #[default]
    Function,
    /// Property getter
    PropertyGet,
    /// Property setter
    PropertySet,
    /// Indexer getter
    IndexerGet,
    /// Indexer setter
    IndexerSet,
    /// Constructor
    Constructor,
    /// Destructor
    Destructor,
}

impl MemberKind {
    /// Pattern keyword for this kind
    pub const fn keyword(self) -> &'static str {
        match self {
            MemberKind::Function => "function",
            MemberKind::PropertyGet => "get",
            MemberKind::PropertySet => "set",
            MemberKind::IndexerGet => "indexer-get",
            MemberKind::IndexerSet => "indexer-set",
            MemberKind::Constructor => "constructor",
            MemberKind::Destructor => "destructor",
        }
    }

    /// Parse a pattern keyword
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "function" => MemberKind::Function,
            "get" | "property-get" => MemberKind::PropertyGet,
            "set" | "property-set" => MemberKind::PropertySet,
            "indexer-get" => MemberKind::IndexerGet,
            "indexer-set" => MemberKind::IndexerSet,
            "constructor" => MemberKind::Constructor,
            "destructor" => MemberKind::Destructor,
            _ => return None,
        })
    }
}

/// Declared visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible everywhere
    #[default]
    Public,
    /// Visible to derived types
    Protected,
    /// Visible inside the module
    Internal,
    /// Visible inside the type
    Private,
}

impl Visibility {
    /// Parse a pattern keyword
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "public" => Visibility::Public,
            "protected" => Visibility::Protected,
            "internal" => Visibility::Internal,
            "private" => Visibility::Private,
            _ => return None,
        })
    }
}

/// Registered module
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Module id
    pub id: ModuleId,
    /// Module name
    pub name: String,
}

/// Registered type
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Type id
    pub id: TypeId,
    /// Simple name
    pub name: String,
    /// Namespace segments
    pub namespace: Vec<String>,
    /// Owning module
    pub module: ModuleId,
    /// Base type
    pub base: Option<TypeId>,
    /// Declared interfaces (not including inherited ones)
    pub capabilities: Vec<String>,
    /// Declared visibility
    pub visibility: Visibility,
    /// Members declared on this type, in declaration order
    pub members: Vec<MemberId>,
}

impl TypeInfo {
    /// Namespace-qualified name
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace.join("."), self.name)
        }
    }
}

/// Default bound to a masked or omitted parameter
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Constant
    Const(Value),
    /// Computed by a body in the callee's frame
    Computed(BodyId),
}

/// Registered parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Name
    pub name: String,
    /// Type
    pub ty: String,
    /// Default
    pub default: Option<DefaultValue>,
    /// Relations allowed to supply the argument
    pub relations: RelationSet,
}

/// Registered variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    /// Relations served
    pub relations: RelationSet,
    /// Body
    pub body: BodyId,
}

/// Registered explicit join point
#[derive(Debug, Clone)]
pub struct JoinPointInfo {
    /// Name
    pub name: String,
    /// Argument types
    pub params: Vec<String>,
}

/// Registered member
#[derive(Debug, Clone)]
pub struct MemberInfo {
    /// Member id
    pub id: MemberId,
    /// Declaring type
    pub owner: TypeId,
    /// Kind
    pub kind: MemberKind,
    /// Name
    pub name: String,
    /// Ordered parameters
    pub params: Vec<Parameter>,
    /// Return type
    pub returns: String,
    /// Visibility
    pub visibility: Visibility,
    /// Static member
    pub is_static: bool,
    /// Pass-through member
    pub passthru: bool,
    /// Variant partition (a single all-relations variant when none declared)
    pub variants: Vec<Variant>,
    /// Explicit join points
    pub join_points: Vec<JoinPointInfo>,
}

impl MemberInfo {
    /// Index of the explicit join point named `name`
    pub fn join_point_index(&self, name: &str) -> Option<usize> {
        self.join_points.iter().position(|jp| jp.name == name)
    }
}

/// Registered aspect
#[derive(Debug, Clone)]
pub struct AspectInfo {
    /// Aspect id
    pub id: AspectId,
    /// Name
    pub name: String,
    /// Owning module
    pub module: ModuleId,
    /// Namespace scope
    pub scope: Option<NamespacePattern>,
}

/// Owner of a pointcut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceOwner {
    /// Declared in an aspect
    Aspect(AspectId),
    /// Declared in a type
    Type(TypeId),
}

/// Registered pointcut
#[derive(Debug, Clone)]
pub struct Pointcut {
    /// Declaration-order id
    pub id: PointcutId,
    /// Before or after
    pub advice: AdviceKind,
    /// Compiled pattern
    pub pattern: Pattern,
    /// Pattern source text
    pub source: String,
    /// Declared return type
    pub returns: Option<String>,
    /// Body
    pub body: BodyId,
    /// Owner
    pub owner: AdviceOwner,
}

/// Frozen program registry
pub struct Registry {
    modules: Vec<ModuleInfo>,
    types: Vec<TypeInfo>,
    members: Vec<MemberInfo>,
    aspects: Vec<AspectInfo>,
    pointcuts: Vec<Pointcut>,
    bodies: Vec<Arc<dyn Body>>,
    body_names: Vec<String>,
    type_index: FxHashMap<String, TypeId>,
    simple_type_index: FxHashMap<String, Vec<TypeId>>,
    plans: AdvicePlans,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("modules", &self.modules.len())
            .field("types", &self.types.len())
            .field("members", &self.members.len())
            .field("pointcuts", &self.pointcuts.len())
            .finish()
    }
}

impl Registry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    // ========================================================================
    // Lookup by id
    // ========================================================================

    /// Get module by id
    pub fn module(&self, id: ModuleId) -> Option<&ModuleInfo> {
        self.modules.get(id.index())
    }

    /// Get type by id
    pub fn ty(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.index())
    }

    /// Get member by id
    pub fn member(&self, id: MemberId) -> Option<&MemberInfo> {
        self.members.get(id.index())
    }

    /// Get aspect by id
    pub fn aspect(&self, id: AspectId) -> Option<&AspectInfo> {
        self.aspects.get(id.index())
    }

    /// Get pointcut by id
    pub fn pointcut(&self, id: PointcutId) -> Option<&Pointcut> {
        self.pointcuts.get(id.index())
    }

    /// All modules
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// All types
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// All members
    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    /// All pointcuts, in declaration order
    pub fn pointcuts(&self) -> &[Pointcut] {
        &self.pointcuts
    }

    pub(crate) fn body(&self, id: BodyId) -> &Arc<dyn Body> {
        &self.bodies[id.index()]
    }

    /// Name a body was bound under
    pub fn body_name(&self, id: BodyId) -> &str {
        self.body_names.get(id.index()).map(String::as_str).unwrap_or("?")
    }

    // ========================================================================
    // Lookup by name
    // ========================================================================

    /// Find a module by name
    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().find(|m| m.name == name).map(|m| m.id)
    }

    /// Find a type by qualified name, or by simple name when unambiguous
    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        if let Some(id) = self.type_index.get(name) {
            return Some(*id);
        }
        match self.simple_type_index.get(name).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    /// Find a member by `Type.Member` path (type qualified or simple)
    ///
    /// When several members share the name, the first declared wins.
    pub fn find_member(&self, path: &str) -> Option<MemberId> {
        let (ty, name) = path.rsplit_once('.')?;
        let ty = self.find_type(ty)?;
        self.find_member_in(ty, name)
    }

    /// Find a member declared directly on `ty`
    pub fn find_member_in(&self, ty: TypeId, name: &str) -> Option<MemberId> {
        self.ty(ty)?
            .members
            .iter()
            .copied()
            .find(|id| self.members[id.index()].name == name)
    }

    /// Virtual dispatch: the most derived member named `name`, starting at `ty`
    pub fn dispatch(&self, ty: TypeId, name: &str) -> Option<MemberId> {
        self.base_chain(ty).find_map(|t| self.find_member_in(t, name))
    }

    // ========================================================================
    // Type relations
    // ========================================================================

    /// `ty` followed by its base types, most derived first
    pub fn base_chain(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        // Bounded by the type count; the builder rejects cycles anyway
        std::iter::successors(Some(ty), move |t| self.ty(*t).and_then(|info| info.base))
            .take(self.types.len())
    }

    /// `sub` is `sup` or derives from it
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        self.base_chain(sub).any(|t| t == sup)
    }

    /// `sub` derives from `sup` and is not `sup`
    pub fn is_proper_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        sub != sup && self.is_subtype(sub, sup)
    }

    /// Check whether `ty` or one of its bases declares `capability`
    pub fn has_capability(&self, ty: TypeId, capability: &str) -> bool {
        self.base_chain(ty).any(|t| {
            self.types[t.index()]
                .capabilities
                .iter()
                .any(|c| c == capability)
        })
    }

    /// Check whether a value of type `from` may stand where `to` is expected
    ///
    /// Same name, `to` being `object`, subtyping between registered types,
    /// and capability implementation all qualify.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == "object" {
            return true;
        }
        match (self.find_type(from), self.find_type(to)) {
            (Some(sub), Some(sup)) => self.is_subtype(sub, sup),
            (Some(sub), None) => self.has_capability(sub, to),
            _ => false,
        }
    }

    // ========================================================================
    // Advice plans
    // ========================================================================

    /// Advice matching a join point, ordered for execution
    pub fn plan(&self, site: JoinPointSite) -> &AdvicePlan {
        self.plans.get(site)
    }

    // ========================================================================
    // Naming
    // ========================================================================

    /// `Ns.Type.Member` for diagnostics
    pub fn member_path(&self, id: MemberId) -> String {
        match self.member(id) {
            Some(member) => format!(
                "{}.{}",
                self.types[member.owner.index()].qualified_name(),
                member.name
            ),
            None => format!("member{}", id),
        }
    }

    /// Human readable join point description
    pub fn describe_site(&self, site: JoinPointSite) -> String {
        match site {
            JoinPointSite::Entry(member) => format!("entry of {}", self.member_path(member)),
            JoinPointSite::Exit(member) => format!("exit of {}", self.member_path(member)),
            JoinPointSite::Explicit { member, index } => {
                let name = self
                    .member(member)
                    .and_then(|m| m.join_points.get(index))
                    .map(|jp| jp.name.as_str())
                    .unwrap_or("?");
                format!("{}.{}", self.member_path(member), name)
            }
        }
    }
}
