//! Caller relation classification
//!
//! Every call is placed into exactly one of six [`RelationClass`]es, from
//! most to least specific. Member variants, parameter visibility and code
//! security blocks are all expressed as [`RelationSet`]s over these classes.

use crate::registry::{MemberId, MemberInfo, ModuleId, Registry, TypeId};
use crate::value::ObjectRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relationship between a call site and the member it targets
///
/// Variants are declared in decreasing specificity; classification picks
/// the first one that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationClass {
    /// Instance member of the target's type, operating on the same object
    SameInstance,
    /// Same type, different instance, or either side static
    SameTypeDifferentInstance,
    /// Caller's type derives from the target's declaring type
    DerivedType,
    /// Base-declared code reaching a more derived override
    BaseType,
    /// Same module, none of the above
    SameModule,
    /// Everything else
    External,
}

impl RelationClass {
    /// All classes, most specific first
    pub const ALL: [RelationClass; 6] = [
        RelationClass::SameInstance,
        RelationClass::SameTypeDifferentInstance,
        RelationClass::DerivedType,
        RelationClass::BaseType,
        RelationClass::SameModule,
        RelationClass::External,
    ];

    /// Bit used by [`RelationSet`]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Canonical name
    pub const fn name(self) -> &'static str {
        match self {
            RelationClass::SameInstance => "SameInstance",
            RelationClass::SameTypeDifferentInstance => "SameTypeDifferentInstance",
            RelationClass::DerivedType => "DerivedType",
            RelationClass::BaseType => "BaseType",
            RelationClass::SameModule => "SameModule",
            RelationClass::External => "External",
        }
    }

    /// Parse a canonical name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for RelationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A subset of the six relation classes (bitflags)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<RelationClass>", into = "Vec<RelationClass>")]
pub struct RelationSet(u8);

impl RelationSet {
    /// No classes
    pub const EMPTY: Self = Self(0x00);
    /// All six classes
    pub const ALL: Self = Self(0x3F);

    /// Build a set from a list of classes
    pub fn of(classes: &[RelationClass]) -> Self {
        classes
            .iter()
            .fold(Self::EMPTY, |set, class| set.with(*class))
    }

    /// Set containing exactly one class
    pub const fn only(class: RelationClass) -> Self {
        Self(class.bit())
    }

    /// Get raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Add a class
    pub const fn with(self, class: RelationClass) -> Self {
        Self(self.0 | class.bit())
    }

    /// Check membership
    pub const fn contains(&self, class: RelationClass) -> bool {
        self.0 & class.bit() != 0
    }

    /// Union of sets
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of sets
    pub const fn intersection(&self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Classes in `ALL` missing from this set
    pub const fn complement(&self) -> Self {
        Self(!self.0 & Self::ALL.0)
    }

    /// Check for the empty set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check whether this set covers every class
    pub const fn is_full(&self) -> bool {
        self.0 & Self::ALL.0 == Self::ALL.0
    }

    /// Iterate over member classes, most specific first
    pub fn iter(&self) -> impl Iterator<Item = RelationClass> + '_ {
        RelationClass::ALL
            .into_iter()
            .filter(move |class| self.contains(*class))
    }

    /// Parse pipe-separated names, e.g. `"SameModule|External"`, or `ALL`
    pub fn from_combined_str(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Some(Self::ALL);
        }
        let mut set = Self::EMPTY;
        for part in s.split('|') {
            set = set.with(RelationClass::from_name(part)?);
        }
        Some(set)
    }
}

impl From<Vec<RelationClass>> for RelationSet {
    fn from(classes: Vec<RelationClass>) -> Self {
        Self::of(&classes)
    }
}

impl From<RelationSet> for Vec<RelationClass> {
    fn from(set: RelationSet) -> Self {
        set.iter().collect()
    }
}

impl From<RelationClass> for RelationSet {
    fn from(class: RelationClass) -> Self {
        Self::only(class)
    }
}

impl fmt::Debug for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_full() {
            return f.write_str("ALL");
        }
        let names: Vec<&str> = self.iter().map(RelationClass::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Identity of the code making a call
///
/// Host entry points have no member and usually no module; advice bodies
/// carry the module (and, for type-owned advice, the type) of their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Caller {
    /// Invoking member
    pub member: Option<MemberId>,
    /// Type declaring the invoking code
    pub ty: Option<TypeId>,
    /// Module of the invoking code
    pub module: Option<ModuleId>,
    /// The caller's own `this`
    pub this: Option<ObjectRef>,
}

impl Caller {
    /// Caller outside every module (host entry)
    pub fn external() -> Self {
        Self::default()
    }

    /// Module-level code with no declaring type
    pub fn in_module(module: ModuleId) -> Self {
        Self {
            module: Some(module),
            ..Self::default()
        }
    }

    /// Code executing inside `member`, optionally bound to `this`
    pub fn from_member(registry: &Registry, member: MemberId, this: Option<ObjectRef>) -> Self {
        let ty = registry.member(member).map(|m| m.owner);
        Self {
            member: Some(member),
            ty,
            module: ty.and_then(|t| registry.ty(t)).map(|t| t.module),
            this,
        }
    }
}

/// A concrete call: who calls, and whether the receiver is the caller's `this`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Calling code
    pub caller: Caller,
    /// Receiver is the same object as the caller's `this`
    pub same_instance: bool,
}

impl CallSite {
    /// Build a call site for a call from `caller` on `receiver`
    pub fn new(caller: Caller, receiver: Option<ObjectRef>) -> Self {
        let same_instance = match (caller.this, receiver) {
            (Some(this), Some(receiver)) => this.id == receiver.id,
            _ => false,
        };
        Self {
            caller,
            same_instance,
        }
    }
}

/// Classify the relationship of `site` to `target`
///
/// Total and deterministic: every input yields exactly one class.
pub fn classify(registry: &Registry, site: &CallSite, target: &MemberInfo) -> RelationClass {
    let target_ty = target.owner;

    if let Some(caller_ty) = site.caller.ty {
        if caller_ty == target_ty {
            let caller_is_instance = site
                .caller
                .member
                .and_then(|m| registry.member(m))
                .is_some_and(|m| !m.is_static);
            return if caller_is_instance && !target.is_static && site.same_instance {
                RelationClass::SameInstance
            } else {
                RelationClass::SameTypeDifferentInstance
            };
        }
        if registry.is_proper_subtype(caller_ty, target_ty) {
            return RelationClass::DerivedType;
        }
        if registry.is_proper_subtype(target_ty, caller_ty) {
            return RelationClass::BaseType;
        }
    }

    let target_module = registry.ty(target_ty).map(|t| t.module);
    match (site.caller.module, target_module) {
        (Some(caller), Some(target)) if caller == target => RelationClass::SameModule,
        _ => RelationClass::External,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemberDecl, ModuleDecl, TypeDecl};
    use crate::registry::RegistryBuilder;
    use crate::{Flow, Registry};

    fn fixture() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .module(ModuleDecl::new("core"))
            .module(ModuleDecl::new("plugins"))
            .ty(TypeDecl::new("Shape", "Geo", "core"))
            .ty(TypeDecl::new("Circle", "Geo", "core").base("Geo.Shape"))
            .ty(TypeDecl::new("Canvas", "Geo", "core"))
            .ty(TypeDecl::new("Brush", "Ext", "plugins"))
            .member(MemberDecl::function("Geo.Shape", "Area").body("noop"))
            .member(MemberDecl::function("Geo.Shape", "Describe").body("noop"))
            .member(MemberDecl::function("Geo.Shape", "Count").as_static().body("noop"))
            .member(MemberDecl::function("Geo.Circle", "Area").body("noop"))
            .member(MemberDecl::function("Geo.Canvas", "Draw").body("noop"))
            .member(MemberDecl::function("Ext.Brush", "Paint").body("noop"))
            .body_fn("noop", |_| Ok(Flow::Next));
        builder.build().unwrap()
    }

    fn member<'r>(registry: &'r Registry, path: &str) -> &'r MemberInfo {
        registry.member(registry.find_member(path).unwrap()).unwrap()
    }

    fn obj(registry: &Registry, id: u64, ty: &str) -> ObjectRef {
        ObjectRef::new(id, registry.find_type(ty).unwrap())
    }

    #[test]
    fn test_same_instance_vs_other_instance() {
        let registry = fixture();
        let describe = registry.find_member("Geo.Shape.Describe").unwrap();
        let area = member(&registry, "Geo.Shape.Area");
        let a = obj(&registry, 1, "Geo.Shape");
        let b = obj(&registry, 2, "Geo.Shape");
        let caller = Caller::from_member(&registry, describe, Some(a));

        let same = CallSite::new(caller, Some(a));
        assert_eq!(classify(&registry, &same, area), RelationClass::SameInstance);

        let other = CallSite::new(caller, Some(b));
        assert_eq!(classify(&registry, &other, area), RelationClass::SameTypeDifferentInstance);
    }

    #[test]
    fn test_static_side_is_same_type() {
        let registry = fixture();
        let count = registry.find_member("Geo.Shape.Count").unwrap();
        let area = member(&registry, "Geo.Shape.Area");
        let a = obj(&registry, 1, "Geo.Shape");
        let site = CallSite::new(Caller::from_member(&registry, count, None), Some(a));
        assert_eq!(classify(&registry, &site, area), RelationClass::SameTypeDifferentInstance);
    }

    #[test]
    fn test_derived_and_base() {
        let registry = fixture();
        let circle_area = registry.find_member("Geo.Circle.Area").unwrap();
        let shape_describe = registry.find_member("Geo.Shape.Describe").unwrap();
        let c = obj(&registry, 3, "Geo.Circle");

        // Circle code calling a Shape member
        let site = CallSite::new(Caller::from_member(&registry, circle_area, Some(c)), Some(c));
        assert_eq!(
            classify(&registry, &site, member(&registry, "Geo.Shape.Describe")),
            RelationClass::DerivedType
        );

        // Shape code reaching Circle's override
        let site = CallSite::new(Caller::from_member(&registry, shape_describe, Some(c)), Some(c));
        assert_eq!(
            classify(&registry, &site, member(&registry, "Geo.Circle.Area")),
            RelationClass::BaseType
        );
    }

    #[test]
    fn test_module_and_external() {
        let registry = fixture();
        let draw = registry.find_member("Geo.Canvas.Draw").unwrap();
        let paint = registry.find_member("Ext.Brush.Paint").unwrap();
        let area = member(&registry, "Geo.Shape.Area");
        let s = obj(&registry, 4, "Geo.Shape");

        let site = CallSite::new(Caller::from_member(&registry, draw, None), Some(s));
        assert_eq!(classify(&registry, &site, area), RelationClass::SameModule);

        let site = CallSite::new(Caller::from_member(&registry, paint, None), Some(s));
        assert_eq!(classify(&registry, &site, area), RelationClass::External);

        let site = CallSite::new(Caller::external(), Some(s));
        assert_eq!(classify(&registry, &site, area), RelationClass::External);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let registry = fixture();
        let draw = registry.find_member("Geo.Canvas.Draw").unwrap();
        let area = member(&registry, "Geo.Shape.Area");
        let site = CallSite::new(Caller::from_member(&registry, draw, None), None);
        let first = classify(&registry, &site, area);
        for _ in 0..100 {
            assert_eq!(classify(&registry, &site, area), first);
        }
    }

    #[test]
    fn test_relation_set_ops() {
        let set = RelationSet::of(&[RelationClass::SameModule, RelationClass::External]);
        assert!(set.contains(RelationClass::External));
        assert!(!set.contains(RelationClass::SameInstance));
        assert_eq!(set.complement().union(set), RelationSet::ALL);
        assert!(set.complement().intersection(set).is_empty());
        assert_eq!(set.to_string(), "{SameModule, External}");
        assert_eq!(RelationSet::from_combined_str("SameModule|external"), Some(set));
        assert_eq!(RelationSet::from_combined_str("ALL"), Some(RelationSet::ALL));
        assert_eq!(RelationSet::from_combined_str("Nope"), None);
    }

    #[test]
    fn test_relation_set_serde() {
        let set: RelationSet = serde_json::from_str(r#"["External", "SameModule"]"#).unwrap();
        assert_eq!(set, RelationSet::of(&[RelationClass::SameModule, RelationClass::External]));
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["SameModule","External"]"#);
    }
}
