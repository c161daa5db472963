//! `weft plan`: show the precomputed advice plan of every join point.

use crate::load_registry;
use crate::output::StyledOutput;
use anyhow::anyhow;
use std::path::Path;
use weft_engine::{JoinPointSite, MemberInfo, Output, Registry};

/// Print plans for `member`, or for every advised member
pub fn execute(file: &Path, member: Option<&str>, out: &mut StyledOutput) -> anyhow::Result<bool> {
    let registry = load_registry(file, &Output::new())??;
    let lines = render(&registry, member)?;
    if lines.is_empty() {
        out.dim("no advice matches any join point");
    }
    for line in lines {
        if line.starts_with(' ') {
            out.plain(&line);
        } else {
            out.info(&line);
        }
    }
    Ok(true)
}

/// Render plans as lines: a header per member, one indented line per advice
///
/// With `member` set only that member is shown, even when unadvised.
pub fn render(registry: &Registry, member: Option<&str>) -> anyhow::Result<Vec<String>> {
    let members: Vec<&MemberInfo> = match member {
        Some(path) => {
            let id = registry
                .find_member(path)
                .ok_or_else(|| anyhow!("no such member: {}", path))?;
            registry.member(id).into_iter().collect()
        }
        None => registry.members().iter().collect(),
    };

    let mut lines = Vec::new();
    for info in members {
        let mut advice = Vec::new();
        for (label, site) in sites(info) {
            let plan = registry.plan(site);
            for id in plan.before.iter().chain(&plan.after) {
                if let Some(pointcut) = registry.pointcut(*id) {
                    advice.push(format!(
                        "  {:<12} {:<6} #{} `{}`",
                        label,
                        pointcut.advice,
                        id.index(),
                        pointcut.source
                    ));
                }
            }
        }
        if advice.is_empty() && member.is_none() {
            continue;
        }
        lines.push(registry.member_path(info.id));
        if advice.is_empty() {
            lines.push("  (no advice)".to_string());
        }
        lines.extend(advice);
    }
    Ok(lines)
}

/// Join points of a member in execution order: entry, explicit points, exit
fn sites(info: &MemberInfo) -> Vec<(String, JoinPointSite)> {
    let mut sites = vec![("entry".to_string(), JoinPointSite::Entry(info.id))];
    for (index, jp) in info.join_points.iter().enumerate() {
        sites.push((
            format!("point {}", jp.name),
            JoinPointSite::Explicit {
                member: info.id,
                index,
            },
        ));
    }
    sites.push(("exit".to_string(), JoinPointSite::Exit(info.id)));
    sites
}
