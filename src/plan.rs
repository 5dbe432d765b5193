//! Publish Planner: filters the workspace graph down to a candidate set and
//! orders it for publication, either by an explicit `publish.order` or by a
//! deterministic topological sort over non-dev internal dependencies.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::LadingError;
use crate::graph::WorkspaceGraph;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishPlan {
    pub publishable: Vec<String>,
    pub skipped_by_manifest: Vec<String>,
    pub skipped_by_config: Vec<String>,
    pub unknown_exclusions: Vec<String>,
}

/// Build the publish plan for `graph`, honoring `exclude` and an optional
/// `explicit_order`.
pub fn plan(
    graph: &WorkspaceGraph,
    exclude: &[String],
    explicit_order: Option<&[String]>,
) -> Result<PublishPlan, LadingError> {
    let exclude_set: BTreeSet<&str> = exclude.iter().map(String::as_str).collect();
    let member_names: BTreeSet<&str> = graph.crates.iter().map(|c| c.name.as_str()).collect();

    let mut skipped_by_manifest = Vec::new();
    let mut skipped_by_config = Vec::new();
    let mut candidates: Vec<&str> = Vec::new();

    for krate in &graph.crates {
        if !krate.publishable {
            skipped_by_manifest.push(krate.name.clone());
            continue;
        }
        if exclude_set.contains(krate.name.as_str()) {
            skipped_by_config.push(krate.name.clone());
            continue;
        }
        candidates.push(krate.name.as_str());
    }

    let unknown_exclusions: Vec<String> = exclude
        .iter()
        .filter(|name| !member_names.contains(name.as_str()))
        .cloned()
        .collect();

    let candidate_set: BTreeSet<&str> = candidates.iter().copied().collect();

    let publishable = if let Some(order) = explicit_order {
        validate_explicit_order(order, &candidate_set)?
    } else {
        topological_order(graph, &candidate_set)?
    };

    Ok(PublishPlan {
        publishable,
        skipped_by_manifest,
        skipped_by_config,
        unknown_exclusions,
    })
}

fn validate_explicit_order(
    order: &[String],
    candidate_set: &BTreeSet<&str>,
) -> Result<Vec<String>, LadingError> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for name in order {
        if !seen.insert(name.as_str()) {
            duplicates.insert(name.as_str());
        }
    }
    if !duplicates.is_empty() {
        return Err(LadingError::PublishPlan(format!(
            "Duplicate publish.order entries: {}",
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    let order_set: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    let unknown: Vec<&str> = order_set
        .iter()
        .filter(|name| !candidate_set.contains(*name))
        .copied()
        .collect();
    if !unknown.is_empty() {
        return Err(LadingError::PublishPlan(format!(
            "publish.order contains entries not in the candidate set: {}",
            unknown.join(", ")
        )));
    }

    let missing: Vec<&str> = candidate_set
        .iter()
        .filter(|name| !order_set.contains(*name))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(LadingError::PublishPlan(format!(
            "publish.order is missing candidate entries: {}",
            missing.join(", ")
        )));
    }

    Ok(order.to_vec())
}

/// Kahn's algorithm over non-dev internal-dependency edges restricted to
/// the candidate set, with the ready queue kept as a `BTreeSet` so the node
/// popped at each step is always the lexicographically smallest — this
/// makes the output identical across runs and platforms, unlike a
/// DFS-postorder sort whose result depends on edge-visitation order.
fn topological_order(
    graph: &WorkspaceGraph,
    candidate_set: &BTreeSet<&str>,
) -> Result<Vec<String>, LadingError> {
    let mut indegree: BTreeMap<&str, usize> =
        candidate_set.iter().map(|name| (*name, 0)).collect();
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = candidate_set
        .iter()
        .map(|name| (*name, BTreeSet::new()))
        .collect();

    for krate in &graph.crates {
        if !candidate_set.contains(krate.name.as_str()) {
            continue;
        }
        for dep in &krate.internal_dependencies {
            if dep.kind_is_dev_only {
                continue;
            }
            if !candidate_set.contains(dep.target_name.as_str()) {
                continue;
            }
            if dependents
                .get_mut(dep.target_name.as_str())
                .expect("target is in candidate set")
                .insert(krate.name.as_str())
            {
                *indegree.get_mut(krate.name.as_str()).expect("candidate") += 1;
            }
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(candidate_set.len());
    while let Some(name) = ready.iter().next().copied() {
        ready.remove(name);
        order.push(name.to_string());
        for &dependent in &dependents[name] {
            let deg = indegree.get_mut(dependent).expect("dependent is tracked");
            *deg -= 1;
            if *deg == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != candidate_set.len() {
        let remaining: BTreeSet<&str> = candidate_set
            .iter()
            .filter(|name| !order.contains(&name.to_string()))
            .copied()
            .collect();
        return Err(LadingError::PublishPlan(format!(
            "cycle detected among: {}",
            remaining.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(order)
}
