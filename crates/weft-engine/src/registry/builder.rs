//! Registry builder
//!
//! Declarations are appended in any order and only resolved in
//! [`RegistryBuilder::build`], which checks the whole model and reports every
//! problem it finds instead of stopping at the first one.

use super::{
    AdviceOwner, AspectId, AspectInfo, BodyId, DefaultValue, JoinPointInfo, MemberId, MemberInfo,
    ModuleId, ModuleInfo, Parameter, Pointcut, PointcutId, Registry, TypeId, TypeInfo, Variant,
};
use crate::body::{Body, BodyResult, FnBody};
use crate::error::{BuildError, RegistryError};
use crate::model::{
    AspectDecl, DefaultDecl, MemberDecl, ModuleDecl, OwnerDecl, PointcutDecl, TypeDecl,
};
use crate::pointcut::{AdvicePlans, JoinPointSite, NamespacePattern, Pattern};
use crate::relation::RelationSet;
use crate::weave::BodyContext;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// Append-only collector of declarations and bodies
#[derive(Default)]
pub struct RegistryBuilder {
    modules: Vec<ModuleDecl>,
    types: Vec<TypeDecl>,
    members: Vec<MemberDecl>,
    aspects: Vec<AspectDecl>,
    pointcuts: Vec<PointcutDecl>,
    bodies: Vec<(String, Arc<dyn Body>)>,
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a module
    pub fn module(&mut self, decl: ModuleDecl) -> &mut Self {
        self.modules.push(decl);
        self
    }

    /// Declare a type
    pub fn ty(&mut self, decl: TypeDecl) -> &mut Self {
        self.types.push(decl);
        self
    }

    /// Declare a member
    pub fn member(&mut self, decl: MemberDecl) -> &mut Self {
        self.members.push(decl);
        self
    }

    /// Declare an aspect
    pub fn aspect(&mut self, decl: AspectDecl) -> &mut Self {
        self.aspects.push(decl);
        self
    }

    /// Declare a pointcut; its id is its position among all pointcuts
    pub fn pointcut(&mut self, decl: PointcutDecl) -> &mut Self {
        self.pointcuts.push(decl);
        self
    }

    /// Bind a body under `name`, replacing an earlier binding of the same name
    pub fn body(&mut self, name: impl Into<String>, body: impl Body + 'static) -> &mut Self {
        let name = name.into();
        let body: Arc<dyn Body> = Arc::new(body);
        match self.bodies.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = body,
            None => self.bodies.push((name, body)),
        }
        self
    }

    /// Bind a closure as a body
    pub fn body_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut BodyContext<'_>) -> BodyResult + Send + Sync + 'static,
    {
        self.body(name, FnBody::new(f))
    }

    /// Validate everything and freeze the registry
    pub fn build(self) -> Result<Registry, BuildError> {
        let mut cx = BuildContext::default();

        let modules = cx.resolve_modules(self.modules);
        let (bodies, body_names) = cx.resolve_bodies(self.bodies);
        let mut types = cx.resolve_types(self.types, &modules);
        let members = cx.resolve_members(self.members, &mut types);
        let aspects = cx.resolve_aspects(self.aspects, &modules);
        let pointcuts = cx.resolve_pointcuts(self.pointcuts);

        if !cx.errors.is_empty() {
            return Err(BuildError { errors: cx.errors });
        }

        let mut registry = Registry {
            modules,
            types,
            members,
            aspects,
            pointcuts,
            bodies,
            body_names,
            type_index: cx.type_index,
            simple_type_index: cx.simple_type_index,
            plans: AdvicePlans::default(),
        };
        registry.plans = AdvicePlans::compute(&registry);

        let errors = validate_advice(&registry);
        if !errors.is_empty() {
            return Err(BuildError { errors });
        }

        debug!(
            modules = registry.modules.len(),
            types = registry.types.len(),
            members = registry.members.len(),
            pointcuts = registry.pointcuts.len(),
            advised_sites = registry.plans.len(),
            "registry frozen"
        );
        Ok(registry)
    }
}

/// Name indexes and collected errors while building
#[derive(Default)]
struct BuildContext {
    errors: Vec<RegistryError>,
    module_index: FxHashMap<String, ModuleId>,
    body_index: FxHashMap<String, BodyId>,
    type_index: FxHashMap<String, TypeId>,
    simple_type_index: FxHashMap<String, Vec<TypeId>>,
    aspect_index: FxHashMap<String, AspectId>,
}

impl BuildContext {
    fn module(&mut self, name: &str, referenced_by: impl FnOnce() -> String) -> Option<ModuleId> {
        let found = self.module_index.get(name).copied();
        if found.is_none() {
            self.errors.push(RegistryError::UnknownModule {
                name: name.to_string(),
                referenced_by: referenced_by(),
            });
        }
        found
    }

    fn body(&mut self, name: &str, referenced_by: impl FnOnce() -> String) -> Option<BodyId> {
        let found = self.body_index.get(name).copied();
        if found.is_none() {
            self.errors.push(RegistryError::UnknownBody {
                name: name.to_string(),
                referenced_by: referenced_by(),
            });
        }
        found
    }

    fn lookup_type(&self, name: &str) -> Option<TypeId> {
        if let Some(id) = self.type_index.get(name) {
            return Some(*id);
        }
        match self.simple_type_index.get(name).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    fn ty(&mut self, name: &str, referenced_by: impl FnOnce() -> String) -> Option<TypeId> {
        let found = self.lookup_type(name);
        if found.is_none() {
            self.errors.push(RegistryError::UnknownType {
                name: name.to_string(),
                referenced_by: referenced_by(),
            });
        }
        found
    }

    // ========================================================================
    // Phases
    // ========================================================================

    fn resolve_modules(&mut self, decls: Vec<ModuleDecl>) -> Vec<ModuleInfo> {
        let mut modules = Vec::with_capacity(decls.len());
        for decl in decls {
            if self.module_index.contains_key(&decl.name) {
                self.errors.push(RegistryError::DuplicateModule { name: decl.name });
                continue;
            }
            let id = ModuleId::from_index(modules.len());
            self.module_index.insert(decl.name.clone(), id);
            modules.push(ModuleInfo { id, name: decl.name });
        }
        modules
    }

    fn resolve_bodies(&mut self, bodies: Vec<(String, Arc<dyn Body>)>) -> (Vec<Arc<dyn Body>>, Vec<String>) {
        let mut names = Vec::with_capacity(bodies.len());
        let mut resolved = Vec::with_capacity(bodies.len());
        for (name, body) in bodies {
            self.body_index.insert(name.clone(), BodyId::from_index(resolved.len()));
            names.push(name);
            resolved.push(body);
        }
        (resolved, names)
    }

    fn resolve_types(&mut self, decls: Vec<TypeDecl>, modules: &[ModuleInfo]) -> Vec<TypeInfo> {
        let mut types = Vec::with_capacity(decls.len());
        let mut bases = Vec::with_capacity(decls.len());

        for decl in decls {
            let qualified = decl.qualified_name();
            if self.type_index.contains_key(&qualified) {
                self.errors.push(RegistryError::DuplicateType { name: qualified });
                continue;
            }
            let module = self
                .module(&decl.module, || format!("type {}", qualified))
                .unwrap_or(ModuleId::from_index(modules.len()));

            let id = TypeId::from_index(types.len());
            self.type_index.insert(qualified.clone(), id);
            self.simple_type_index.entry(decl.name.clone()).or_default().push(id);
            bases.push((decl.base, qualified));
            types.push(TypeInfo {
                id,
                name: decl.name,
                namespace: split_namespace(&decl.namespace),
                module,
                base: None,
                capabilities: decl.capabilities,
                visibility: decl.visibility,
                members: Vec::new(),
            });
        }

        // Bases resolve after every type is known so declaration order does not matter
        for (index, (base, qualified)) in bases.into_iter().enumerate() {
            if let Some(base) = base {
                types[index].base = self.ty(&base, || format!("type {}", qualified));
            }
        }

        for ty in &types {
            if let Some(cycle) = cycle_through(&types, ty.id) {
                // Report each cycle once, from its lowest type id
                if cycle.iter().min() == Some(&ty.id) {
                    self.errors.push(RegistryError::InheritanceCycle {
                        ty: ty.qualified_name(),
                    });
                }
            }
        }
        types
    }

    fn resolve_members(&mut self, decls: Vec<MemberDecl>, types: &mut [TypeInfo]) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = Vec::with_capacity(decls.len());

        for decl in decls {
            let path = decl.qualified_name();
            let Some(owner) = self.ty(&decl.owner, || format!("member {}", path)) else {
                continue;
            };
            let path = format!("{}.{}", types[owner.index()].qualified_name(), decl.name);

            let duplicate = types[owner.index()].members.iter().any(|id| {
                let other = &members[id.index()];
                other.name == decl.name && other.kind == decl.kind && other.params.len() == decl.params.len()
            });
            if duplicate {
                self.errors.push(RegistryError::DuplicateMember { member: path });
                continue;
            }

            let params = self.resolve_params(&decl, &path);
            let variants = self.resolve_variants(&decl, &path);

            let mut join_points: Vec<JoinPointInfo> = Vec::with_capacity(decl.join_points.len());
            for jp in decl.join_points {
                if join_points.iter().any(|existing| existing.name == jp.name) {
                    self.errors.push(RegistryError::DuplicateJoinPoint {
                        member: path.clone(),
                        name: jp.name,
                    });
                    continue;
                }
                join_points.push(JoinPointInfo {
                    name: jp.name,
                    params: jp.params,
                });
            }

            let id = MemberId::from_index(members.len());
            types[owner.index()].members.push(id);
            members.push(MemberInfo {
                id,
                owner,
                kind: decl.kind,
                name: decl.name,
                params,
                returns: decl.returns,
                visibility: decl.visibility,
                is_static: decl.is_static,
                passthru: decl.passthru,
                variants,
                join_points,
            });
        }
        members
    }

    fn resolve_params(&mut self, decl: &MemberDecl, path: &str) -> Vec<Parameter> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let relations = param.relations.unwrap_or(RelationSet::ALL);
            let default = match &param.default {
                None => None,
                Some(DefaultDecl::Const(value)) => Some(DefaultValue::Const(value.clone())),
                Some(DefaultDecl::Computed { computed }) => self
                    .body(computed, || format!("default of `{}` in {}", param.name, path))
                    .map(DefaultValue::Computed),
            };
            if !relations.is_full() && param.default.is_none() {
                self.errors.push(RegistryError::MaskedArgumentDefaultMissing {
                    member: path.to_string(),
                    param: param.name.clone(),
                });
            }
            params.push(Parameter {
                name: param.name.clone(),
                ty: param.ty.clone(),
                default,
                relations,
            });
        }
        params
    }

    fn resolve_variants(&mut self, decl: &MemberDecl, path: &str) -> Vec<Variant> {
        let mut variants = Vec::with_capacity(decl.variants.len() + 1);
        let mut covered = RelationSet::EMPTY;

        for variant in &decl.variants {
            let overlap = covered.intersection(variant.relations);
            if let Some(relation) = overlap.iter().next() {
                self.errors.push(RegistryError::AmbiguousVariant {
                    member: path.to_string(),
                    relation,
                });
            }
            covered = covered.union(variant.relations);
            if let Some(body) = self.body(&variant.body, || format!("variant of {}", path)) {
                variants.push(Variant {
                    relations: variant.relations,
                    body,
                });
            }
        }

        let rest = covered.complement();
        match &decl.body {
            Some(body) if !rest.is_empty() => {
                if let Some(body) = self.body(body, || format!("member {}", path)) {
                    variants.push(Variant {
                        relations: rest,
                        body,
                    });
                }
            }
            Some(_) => {}
            None if decl.variants.is_empty() => {
                self.errors.push(RegistryError::MissingBody {
                    member: path.to_string(),
                });
            }
            None if !rest.is_empty() => {
                self.errors.push(RegistryError::UnpartitionedRelationSet {
                    member: path.to_string(),
                    missing: rest,
                });
            }
            None => {}
        }
        variants
    }

    fn resolve_aspects(&mut self, decls: Vec<AspectDecl>, modules: &[ModuleInfo]) -> Vec<AspectInfo> {
        let mut aspects = Vec::with_capacity(decls.len());
        for decl in decls {
            if self.aspect_index.contains_key(&decl.name) {
                self.errors.push(RegistryError::DuplicateAspect { name: decl.name });
                continue;
            }
            let module = self
                .module(&decl.module, || format!("aspect {}", decl.name))
                .unwrap_or(ModuleId::from_index(modules.len()));
            let scope = match decl.scope.as_deref().map(NamespacePattern::parse) {
                None => None,
                Some(Ok(scope)) => Some(scope),
                Some(Err(source)) => {
                    self.errors.push(RegistryError::InvalidPattern {
                        pattern: decl.scope.clone().unwrap_or_default(),
                        source,
                    });
                    None
                }
            };
            let id = AspectId::from_index(aspects.len());
            self.aspect_index.insert(decl.name.clone(), id);
            aspects.push(AspectInfo {
                id,
                name: decl.name,
                module,
                scope,
            });
        }
        aspects
    }

    fn resolve_pointcuts(&mut self, decls: Vec<PointcutDecl>) -> Vec<Pointcut> {
        let mut pointcuts = Vec::with_capacity(decls.len());
        for (index, decl) in decls.into_iter().enumerate() {
            let owner = match &decl.owner {
                OwnerDecl::Aspect(name) => match self.aspect_index.get(name) {
                    Some(id) => Some(AdviceOwner::Aspect(*id)),
                    None => {
                        self.errors.push(RegistryError::UnknownAspect {
                            name: name.clone(),
                            referenced_by: decl.pattern.clone(),
                        });
                        None
                    }
                },
                OwnerDecl::Type(name) => self
                    .ty(name, || format!("pointcut `{}`", decl.pattern))
                    .map(AdviceOwner::Type),
            };
            let pattern = match Pattern::parse(&decl.pattern) {
                Ok(pattern) => Some(pattern),
                Err(source) => {
                    self.errors.push(RegistryError::InvalidPattern {
                        pattern: decl.pattern.clone(),
                        source,
                    });
                    None
                }
            };
            let body = self.body(&decl.body, || format!("pointcut `{}`", decl.pattern));

            if let (Some(owner), Some(pattern), Some(body)) = (owner, pattern, body) {
                pointcuts.push(Pointcut {
                    id: PointcutId::from_index(index),
                    advice: decl.advice,
                    pattern,
                    source: decl.pattern,
                    returns: decl.returns,
                    body,
                    owner,
                });
            }
        }
        pointcuts
    }
}

fn split_namespace(namespace: &str) -> Vec<String> {
    namespace
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Types on the base-chain loop through `start`, if `start` lies on one
fn cycle_through(types: &[TypeInfo], start: TypeId) -> Option<Vec<TypeId>> {
    let mut seen = vec![start];
    let mut current = types[start.index()].base;
    while let Some(ty) = current {
        if ty == start {
            return Some(seen);
        }
        if seen.contains(&ty) {
            // Loop that does not pass through `start`
            return None;
        }
        seen.push(ty);
        current = types[ty.index()].base;
    }
    None
}

/// Checks that need the matcher: explicit pointcuts that match nothing, and
/// advice return types that do not fit the join points they match
fn validate_advice(registry: &Registry) -> Vec<RegistryError> {
    let mut errors = Vec::new();
    let mut matched_explicit: FxHashSet<PointcutId> = FxHashSet::default();
    let mut reported: FxHashSet<(PointcutId, MemberId)> = FxHashSet::default();

    for member in registry.members() {
        let mut sites = vec![JoinPointSite::Entry(member.id), JoinPointSite::Exit(member.id)];
        sites.extend((0..member.join_points.len()).map(|index| JoinPointSite::Explicit {
            member: member.id,
            index,
        }));

        for site in sites {
            let plan = registry.plan(site);
            for id in plan.before.iter().chain(plan.after.iter()) {
                let Some(pointcut) = registry.pointcut(*id) else {
                    continue;
                };
                if matches!(site, JoinPointSite::Explicit { .. }) {
                    matched_explicit.insert(*id);
                }
                let Some(declared) = &pointcut.returns else {
                    continue;
                };
                // Explicit join points return on behalf of the enclosing member
                if !registry.is_assignable(declared, &member.returns) && reported.insert((*id, member.id)) {
                    errors.push(RegistryError::AdviceReturnTypeMismatch {
                        pattern: pointcut.source.clone(),
                        member: registry.member_path(member.id),
                        declared: declared.clone(),
                        expected: member.returns.clone(),
                    });
                }
            }
        }
    }

    for pointcut in registry.pointcuts() {
        if pointcut.pattern.explicit && !matched_explicit.contains(&pointcut.id) {
            errors.push(RegistryError::ExplicitJoinPointNotFound {
                pattern: pointcut.source.clone(),
            });
        }
    }
    errors
}
