// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Leafref resolution

use config::{LeafRefScope, ResourceInstance, ResourceKey, reason};
use graph::ResourceGraph;
use std::fmt::Display;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unresolved {
    NotFound,
    Deleting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafrefFailure {
    pub path: String,
    pub target: ResourceKey,
    pub cause: Unresolved,
}
impl Display for LeafrefFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cause = match self.cause {
            Unresolved::NotFound => "not found",
            Unresolved::Deleting => "being deleted",
        };
        write!(f, "{} -> {} ({cause})", self.path, self.target)
    }
}

/// Outcome of the resolution of the leafrefs of one scope
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeVerdict {
    pub checked: usize,
    pub failures: Vec<LeafrefFailure>,
}
impl ScopeVerdict {
    /// True if every leafref of the scope resolves. Vacuously true without leafrefs.
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.failures.is_empty()
    }
    #[must_use]
    pub fn reason(&self) -> &'static str {
        if self.checked == 0 {
            reason::NO_REFERENCES
        } else if self.resolved() {
            reason::SUCCESS
        } else if self.failures.iter().any(|f| f.cause == Unresolved::NotFound) {
            reason::LEAFREF_TARGET_NOT_FOUND
        } else {
            reason::LEAFREF_TARGET_DELETING
        }
    }
    #[must_use]
    pub fn message(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafrefReport {
    pub internal: ScopeVerdict,
    pub external: ScopeVerdict,
}
impl LeafrefReport {
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.internal.resolved() && self.external.resolved()
    }
    pub fn failures(&self) -> impl Iterator<Item = &LeafrefFailure> {
        self.internal.failures.iter().chain(self.external.failures.iter())
    }
}

/// Resolve every leafref of `resource` against the graph. A leafref resolves if its
/// target exists and is not being deleted.
#[must_use]
pub fn resolve_leafrefs(resource: &ResourceInstance, graph: &ResourceGraph) -> LeafrefReport {
    let mut report = LeafrefReport::default();
    for leafref in resource.leafrefs.iter() {
        let verdict = match leafref.scope {
            LeafRefScope::Internal => &mut report.internal,
            LeafRefScope::External => &mut report.external,
        };
        verdict.checked += 1;
        let cause = match graph.inspect(&leafref.target, ResourceInstance::is_deleting) {
            None => Some(Unresolved::NotFound),
            Some(true) => Some(Unresolved::Deleting),
            Some(false) => None,
        };
        if let Some(cause) = cause {
            trace!("{}: leafref {leafref} unresolved", resource.key);
            verdict.failures.push(LeafrefFailure {
                path: leafref.path.clone(),
                target: leafref.target.clone(),
                cause,
            });
        }
    }
    report
}
