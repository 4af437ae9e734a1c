// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Leafrefs: references from a field of a resource to another resource

use crate::model::key::ResourceKey;
use crate::{ModelError, ModelResult};
use std::fmt::Display;

/// Whether a leafref points inside the subtree of the referring resource or to
/// a resource in another top-level subtree
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeafRefScope {
    Internal,
    External,
}
impl Display for LeafRefScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeafRefScope::Internal => write!(f, "internal"),
            LeafRefScope::External => write!(f, "external"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafRef {
    pub path: String,        /* referring field */
    pub target: ResourceKey, /* referred resource */
    pub scope: LeafRefScope,
}
impl LeafRef {
    #[must_use]
    pub fn new(path: &str, target: ResourceKey, scope: LeafRefScope) -> Self {
        Self {
            path: path.to_owned(),
            target,
            scope,
        }
    }
    #[must_use]
    pub fn internal(path: &str, target: ResourceKey) -> Self {
        Self::new(path, target, LeafRefScope::Internal)
    }
    #[must_use]
    pub fn external(path: &str, target: ResourceKey) -> Self {
        Self::new(path, target, LeafRefScope::External)
    }
}
impl Display for LeafRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({})", self.path, self.target, self.scope)
    }
}

/// Ordered set of leafrefs. A (path, target) pair may appear only once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafRefs(Vec<LeafRef>);
impl LeafRefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, leafref: LeafRef) -> ModelResult {
        if self
            .0
            .iter()
            .any(|l| l.path == leafref.path && l.target == leafref.target)
        {
            return Err(ModelError::DuplicateLeafRef(leafref.path, leafref.target));
        }
        self.0.push(leafref);
        Ok(())
    }
    pub fn iter(&self) -> impl Iterator<Item = &LeafRef> {
        self.0.iter()
    }
    /// Iterate over the leafrefs of the given scope
    pub fn scoped(&self, scope: LeafRefScope) -> impl Iterator<Item = &LeafRef> {
        self.0.iter().filter(move |l| l.scope == scope)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl TryFrom<Vec<LeafRef>> for LeafRefs {
    type Error = ModelError;
    fn try_from(leafrefs: Vec<LeafRef>) -> Result<Self, Self::Error> {
        let mut set = LeafRefs::new();
        for leafref in leafrefs {
            set.push(leafref)?;
        }
        Ok(set)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_leafrefs_dedup_and_scope() {
        let grp = ResourceKey::new("BgpGroup", "grp-A").unwrap();
        let pol = ResourceKey::new("RoutingPolicy", "export-all").unwrap();
        let mut refs = LeafRefs::new();
        refs.push(LeafRef::internal("/peer-group", grp.clone())).unwrap();
        refs.push(LeafRef::external("/export-policy", pol.clone())).unwrap();
        // same target through another field is fine
        refs.push(LeafRef::external("/import-policy", pol.clone())).unwrap();

        let r = refs.push(LeafRef::external("/peer-group", grp));
        assert!(r.is_err_and(|e| matches!(e, ModelError::DuplicateLeafRef(..))));

        assert_eq!(refs.len(), 3);
        assert_eq!(refs.scoped(LeafRefScope::Internal).count(), 1);
        assert_eq!(refs.scoped(LeafRefScope::External).count(), 2);
        let order: Vec<_> = refs.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(order, ["/peer-group", "/export-policy", "/import-policy"]);
    }
}
