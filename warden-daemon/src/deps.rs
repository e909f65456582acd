use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::descriptor::Registry;
use crate::errors::{DaemonError, Result};

/// Why a service was left out of a start plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SkipReason {
    /// A required tag has no registered provider at all.
    UnresolvedRequirement { tag: String },
    /// Every provider of a required tag was itself excluded from the plan.
    ProviderUnavailable { tag: String, provider: String },
    /// A provider of a required tag failed (or was skipped) at runtime.
    ProviderFailed { tag: String, provider: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnresolvedRequirement { tag } => {
                write!(f, "requires `{}`, which no registered service provides", tag)
            }
            SkipReason::ProviderUnavailable { tag, provider } => {
                write!(f, "requires `{}`, but its provider {} cannot start", tag, provider)
            }
            SkipReason::ProviderFailed { tag, provider } => {
                write!(f, "requires `{}`, but its provider {} is not running", tag, provider)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedService {
    pub service: String,
    pub reason: SkipReason,
}

/// The computed start sequence for one registry.
///
/// `order` holds the runnable services, topologically sorted, dependencies
/// first. `skipped` holds the services excluded because a requirement can
/// never be satisfied; independent branches of the graph still appear in
/// `order` and may proceed.
#[derive(Debug, Clone)]
pub struct StartPlan {
    pub order: Vec<String>,
    pub skipped: Vec<SkippedService>,
}

/// Compute the start plan for a registry.
///
/// An unsatisfiable requirement excludes the requesting service and its
/// transitive requirers, recorded in `skipped`. A dependency cycle is a
/// structural defect of the whole descriptor set and fails the plan.
pub fn plan(registry: &Registry) -> Result<StartPlan> {
    let mut skipped: Vec<SkippedService> = Vec::new();
    let mut excluded: HashSet<String> = HashSet::new();

    // First pass: services requiring a tag nothing provides.
    for descriptor in registry.descriptors() {
        for tag in &descriptor.requirement {
            if registry.is_bootstrap(tag) {
                continue;
            }
            let has_provider = registry
                .providers_of(tag)
                .iter()
                .any(|p| *p != descriptor.name);
            if !has_provider {
                excluded.insert(descriptor.name.clone());
                skipped.push(SkippedService {
                    service: descriptor.name.clone(),
                    reason: SkipReason::UnresolvedRequirement { tag: tag.clone() },
                });
                break;
            }
        }
    }

    // Propagate: a service is also out when every provider of one of its
    // tags is out. Iterate to a fixpoint; each round excludes at least one
    // service, so this terminates.
    loop {
        let mut changed = false;
        for descriptor in registry.descriptors() {
            if excluded.contains(&descriptor.name) {
                continue;
            }
            for tag in &descriptor.requirement {
                if registry.is_bootstrap(tag) {
                    continue;
                }
                let providers: Vec<&str> = registry
                    .providers_of(tag)
                    .into_iter()
                    .filter(|p| *p != descriptor.name)
                    .collect();
                if !providers.is_empty() && providers.iter().all(|p| excluded.contains(*p)) {
                    excluded.insert(descriptor.name.clone());
                    skipped.push(SkippedService {
                        service: descriptor.name.clone(),
                        reason: SkipReason::ProviderUnavailable {
                            tag: tag.clone(),
                            provider: providers[0].to_string(),
                        },
                    });
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let order = topological_sort(registry, &excluded)?;
    Ok(StartPlan { order, skipped })
}

/// Strict ordering: any structural defect (cycle or unsatisfiable
/// requirement) is an error and nothing may start.
pub fn order(registry: &Registry) -> Result<Vec<String>> {
    let plan = plan(registry)?;
    if let Some(first) = plan.skipped.first() {
        let tag = match &first.reason {
            SkipReason::UnresolvedRequirement { tag } => tag.clone(),
            SkipReason::ProviderUnavailable { tag, .. } => tag.clone(),
            SkipReason::ProviderFailed { tag, .. } => tag.clone(),
        };
        return Err(DaemonError::UnresolvedDependency {
            service: first.service.clone(),
            tag,
        });
    }
    Ok(plan.order)
}

/// The order in which services should be stopped: exact reverse of the
/// start order. Callers apply it only to services that actually reached
/// running.
pub fn stop_order(registry: &Registry) -> Result<Vec<String>> {
    let mut order = plan(registry)?.order;
    order.reverse();
    Ok(order)
}

/// Kahn's algorithm over the provision/requirement graph, restricted to
/// services not in `excluded`. Edge A -> B when B requires a tag A
/// provides. Ready services are taken in declaration order, so mutually
/// independent services start in the order they were registered.
fn topological_sort(registry: &Registry, excluded: &HashSet<String>) -> Result<Vec<String>> {
    let nodes: Vec<&str> = registry
        .descriptors()
        .iter()
        .map(|d| d.name.as_str())
        .filter(|n| !excluded.contains(*n))
        .collect();

    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = nodes.iter().map(|n| (*n, Vec::new())).collect();

    for descriptor in registry.descriptors() {
        let name = descriptor.name.as_str();
        if excluded.contains(name) {
            continue;
        }
        let mut seen_providers: HashSet<&str> = HashSet::new();
        for tag in &descriptor.requirement {
            if registry.is_bootstrap(tag) {
                continue;
            }
            for provider in registry.providers_of(tag) {
                if provider == name || excluded.contains(provider) {
                    continue;
                }
                // A provider satisfying several of the tags still
                // contributes a single edge.
                if seen_providers.insert(provider) {
                    *in_degree.get_mut(name).ok_or_else(|| {
                        DaemonError::Internal(format!("unknown service '{}' in dependency graph", name))
                    })? += 1;
                    dependents
                        .get_mut(provider)
                        .ok_or_else(|| {
                            DaemonError::Internal(format!(
                                "unknown provider '{}' for service '{}'",
                                provider, name
                            ))
                        })?
                        .push(name);
                }
            }
        }
    }

    // Ready queue kept sorted by declaration index, descending, so pop()
    // always yields the earliest-declared ready service.
    let decl = |name: &str| registry.position(name).unwrap_or(usize::MAX);
    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(name, _)| *name)
        .collect();
    queue.sort_by_key(|n| std::cmp::Reverse(decl(n)));

    let mut result: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(node) = queue.pop() {
        result.push(node.to_string());

        let deps = dependents.get(node).cloned().unwrap_or_default();
        for dep in deps {
            let deg = in_degree.get_mut(dep).ok_or_else(|| {
                DaemonError::Internal(format!("unknown dependent '{}' of service '{}'", dep, node))
            })?;
            *deg -= 1;
            if *deg == 0 {
                let pos = queue.partition_point(|x| decl(x) > decl(dep));
                queue.insert(pos, dep);
            }
        }
    }

    if result.len() != nodes.len() {
        let mut services: Vec<String> = nodes
            .iter()
            .filter(|n| !result.contains(&n.to_string()))
            .map(|n| n.to_string())
            .collect();
        services.sort_by_key(|n| decl(n));
        return Err(DaemonError::DependencyCycle { services });
    }

    Ok(result)
}
