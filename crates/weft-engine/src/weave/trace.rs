//! Trace events recorded on a call chain

use crate::pointcut::{AdviceKind, JoinPointSite};
use crate::registry::{MemberId, PointcutId, Registry};
use crate::relation::RelationClass;
use serde::Serialize;

/// One step of an invocation, in execution order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A member was entered and its variant selected
    Enter {
        /// Target member
        member: MemberId,
        /// Relation of the call site itself
        classified: RelationClass,
        /// Effective relation after pass-through
        relation: RelationClass,
        /// Index of the selected variant
        variant: usize,
    },
    /// A supplied argument was replaced by its default
    Masked {
        /// Target member
        member: MemberId,
        /// Parameter name
        param: String,
    },
    /// Advice body ran
    Advice {
        /// Pointcut whose advice ran
        pointcut: PointcutId,
        /// Before or after
        advice: AdviceKind,
        /// Join point
        site: JoinPointSite,
    },
    /// Advice returned a value in place of the join point
    ShortCircuit {
        /// Pointcut whose advice returned
        pointcut: PointcutId,
        /// Join point
        site: JoinPointSite,
    },
    /// A member completed normally
    Exit {
        /// Member
        member: MemberId,
    },
    /// A member completed with a fault
    Fault {
        /// Member
        member: MemberId,
        /// Fault message
        message: String,
    },
}

impl TraceEvent {
    /// Render against `registry` for human output
    pub fn describe(&self, registry: &Registry) -> String {
        let pattern = |id: &PointcutId| {
            registry
                .pointcut(*id)
                .map(|p| p.source.as_str())
                .unwrap_or("?")
                .to_string()
        };
        match self {
            TraceEvent::Enter {
                member,
                classified,
                relation,
                variant,
            } => {
                if classified == relation {
                    format!("enter {} as {} (variant {})", registry.member_path(*member), relation, variant)
                } else {
                    format!(
                        "enter {} as {} via {} (variant {})",
                        registry.member_path(*member),
                        relation,
                        classified,
                        variant
                    )
                }
            }
            TraceEvent::Masked { member, param } => {
                format!("mask `{}` of {}", param, registry.member_path(*member))
            }
            TraceEvent::Advice {
                pointcut,
                advice,
                site,
            } => format!(
                "{} #{} `{}` at {}",
                advice,
                pointcut.index(),
                pattern(pointcut),
                registry.describe_site(*site)
            ),
            TraceEvent::ShortCircuit { pointcut, site } => format!(
                "short-circuit by #{} `{}` at {}",
                pointcut.index(),
                pattern(pointcut),
                registry.describe_site(*site)
            ),
            TraceEvent::Exit { member } => format!("exit {}", registry.member_path(*member)),
            TraceEvent::Fault { member, message } => {
                format!("fault in {}: {}", registry.member_path(*member), message)
            }
        }
    }
}
