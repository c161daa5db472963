//! Join point matching
//!
//! Matching is split in two. Type filters (aspect scope, namespace, type
//! name and `implements`) depend only on the declaring type, so they are
//! evaluated once per (type, pointcut) pair and cached as a candidate list
//! per type. Member filters then run against the candidates only.

use super::{AdviceKind, AdvicePlan, JoinPointSite, Pattern};
use crate::registry::{AdviceOwner, MemberInfo, PointcutId, Registry, TypeId, TypeInfo};
use rustc_hash::FxHashMap;
use tracing::trace;

/// Precompiled matcher over a registry
pub struct PointcutMatcher<'r> {
    registry: &'r Registry,
    candidates: Vec<Vec<PointcutId>>,
}

impl<'r> PointcutMatcher<'r> {
    /// Evaluate every type filter and cache the survivors per type
    pub fn new(registry: &'r Registry) -> Self {
        let candidates = registry
            .types()
            .iter()
            .map(|ty| {
                registry
                    .pointcuts()
                    .iter()
                    .filter(|p| type_filter(registry, p.owner, &p.pattern, ty))
                    .map(|p| p.id)
                    .collect()
            })
            .collect();
        Self {
            registry,
            candidates,
        }
    }

    /// Pointcuts whose type filters accept `ty`, ascending
    pub fn candidates(&self, ty: TypeId) -> &[PointcutId] {
        self.candidates
            .get(ty.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pointcuts matching the implicit join points of `member`, ascending
    pub fn match_member(&self, member: &MemberInfo) -> Vec<PointcutId> {
        self.candidates(member.owner)
            .iter()
            .copied()
            .filter(|id| {
                let pattern = &self.registry.pointcuts()[id.index()].pattern;
                !pattern.explicit
                    && member_filter(pattern, member)
                    && pattern.params.matches(&param_types(member))
            })
            .collect()
    }

    /// Pointcuts matching explicit join point `index` of `member`, ascending
    pub fn match_point(&self, member: &MemberInfo, index: usize) -> Vec<PointcutId> {
        let Some(jp) = member.join_points.get(index) else {
            return Vec::new();
        };
        self.candidates(member.owner)
            .iter()
            .copied()
            .filter(|id| {
                let pattern = &self.registry.pointcuts()[id.index()].pattern;
                pattern.explicit
                    && pattern.point.as_deref() == Some(jp.name.as_str())
                    && member_filter(pattern, member)
                    && pattern.params.matches(&jp.params)
            })
            .collect()
    }

    /// Split matches into an execution-ordered plan
    ///
    /// `ids` must be ascending; before advice runs newest first, after
    /// advice oldest first.
    pub fn order(&self, ids: &[PointcutId]) -> AdvicePlan {
        let mut plan = AdvicePlan::default();
        for id in ids {
            match self.registry.pointcuts()[id.index()].advice {
                AdviceKind::Before => plan.before.push(*id),
                AdviceKind::After => plan.after.push(*id),
            }
        }
        plan.before.reverse();
        plan
    }
}

fn param_types(member: &MemberInfo) -> Vec<&str> {
    member.params.iter().map(|p| p.ty.as_str()).collect()
}

fn type_filter(registry: &Registry, owner: AdviceOwner, pattern: &Pattern, ty: &TypeInfo) -> bool {
    match owner {
        AdviceOwner::Aspect(aspect) => {
            let in_scope = registry
                .aspect(aspect)
                .and_then(|a| a.scope.as_ref())
                .map_or(true, |scope| scope.matches(&ty.namespace));
            if !in_scope {
                return false;
            }
        }
        AdviceOwner::Type(owner) => {
            if pattern.type_name.is_none() && owner != ty.id {
                return false;
            }
        }
    }
    if let Some(namespace) = &pattern.namespace {
        if !namespace.matches(&ty.namespace) {
            return false;
        }
    }
    if let Some(name) = &pattern.type_name {
        if !name.matches(&ty.name) {
            return false;
        }
    }
    pattern
        .implements
        .iter()
        .all(|capability| registry.has_capability(ty.id, capability))
}

fn member_filter(pattern: &Pattern, member: &MemberInfo) -> bool {
    (pattern.kinds.is_empty() || pattern.kinds.contains(&member.kind))
        && (pattern.visibilities.is_empty() || pattern.visibilities.contains(&member.visibility))
        && pattern.member.matches(&member.name)
}

/// Precomputed plans for every advised join point
#[derive(Debug, Default)]
pub struct AdvicePlans {
    plans: FxHashMap<JoinPointSite, AdvicePlan>,
}

static EMPTY_PLAN: AdvicePlan = AdvicePlan {
    before: Vec::new(),
    after: Vec::new(),
};

impl AdvicePlans {
    /// Match every join point of `registry`
    ///
    /// Entry sites carry the before-chain of a member and exit sites its
    /// after-chain; explicit sites carry both.
    pub fn compute(registry: &Registry) -> Self {
        let matcher = PointcutMatcher::new(registry);
        let mut plans = FxHashMap::default();

        for member in registry.members() {
            let plan = matcher.order(&matcher.match_member(member));
            if !plan.before.is_empty() {
                plans.insert(
                    JoinPointSite::Entry(member.id),
                    AdvicePlan {
                        before: plan.before,
                        after: Vec::new(),
                    },
                );
            }
            if !plan.after.is_empty() {
                plans.insert(
                    JoinPointSite::Exit(member.id),
                    AdvicePlan {
                        before: Vec::new(),
                        after: plan.after,
                    },
                );
            }
            for index in 0..member.join_points.len() {
                let plan = matcher.order(&matcher.match_point(member, index));
                if !plan.is_empty() {
                    plans.insert(
                        JoinPointSite::Explicit {
                            member: member.id,
                            index,
                        },
                        plan,
                    );
                }
            }
        }
        trace!(sites = plans.len(), "advice plans computed");
        Self { plans }
    }

    /// Plan for `site`, empty when nothing matches
    pub fn get(&self, site: JoinPointSite) -> &AdvicePlan {
        self.plans.get(&site).unwrap_or(&EMPTY_PLAN)
    }

    /// Number of advised sites
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Check whether no site is advised
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
