// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reverse dependency index: for every referenced resource, the resources
//! referring to it and the number of edges each holds.

use crate::errors::GraphError;
use config::ResourceKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// The referrers of one target. Edge counts are always positive.
#[derive(Debug, Default)]
pub(crate) struct DependentEntry {
    referrers: BTreeMap<ResourceKey, usize>,
}
impl DependentEntry {
    pub(crate) fn is_empty(&self) -> bool {
        self.referrers.is_empty()
    }
    pub(crate) fn keys(&self) -> BTreeSet<ResourceKey> {
        self.referrers.keys().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub(crate) struct DependencyIndex {
    entries: DashMap<ResourceKey, DependentEntry>,
}

impl DependencyIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the edges from `referrer` to every target. Each target entry is
    /// locked on its own; no two entries are ever held at once.
    pub(crate) fn add_edges(&self, referrer: &ResourceKey, targets: &BTreeMap<ResourceKey, usize>) {
        for (target, count) in targets {
            let mut entry = self.entries.entry(target.clone()).or_default();
            *entry.referrers.entry(referrer.clone()).or_insert(0) += count;
            trace!("Edge {referrer} -> {target} (+{count})");
        }
    }

    /// Drop the edges from `referrer` to every target. Returns the targets that
    /// `referrer` no longer refers to at all.
    pub(crate) fn remove_edges(
        &self,
        referrer: &ResourceKey,
        targets: &BTreeMap<ResourceKey, usize>,
    ) -> Result<Vec<ResourceKey>, GraphError> {
        let mut released = vec![];
        for (target, count) in targets {
            let Entry::Occupied(mut entry) = self.entries.entry(target.clone()) else {
                return Err(GraphError::Corruption(format!(
                    "no index entry for {target} when removing edges from {referrer}"
                )));
            };
            let referrers = &mut entry.get_mut().referrers;
            let Some(current) = referrers.get_mut(referrer) else {
                return Err(GraphError::Corruption(format!(
                    "no edge {referrer} -> {target} in index"
                )));
            };
            if *current < *count {
                return Err(GraphError::Corruption(format!(
                    "edge count underflow for {referrer} -> {target}: {current} < {count}"
                )));
            }
            *current -= count;
            if *current == 0 {
                referrers.remove(referrer);
                released.push(target.clone());
            }
            if entry.get().is_empty() {
                entry.remove();
            }
            trace!("Edge {referrer} -> {target} (-{count})");
        }
        Ok(released)
    }

    pub(crate) fn dependents(&self, target: &ResourceKey) -> BTreeSet<ResourceKey> {
        self.entries
            .get(target)
            .map(|entry| entry.keys())
            .unwrap_or_default()
    }

    /// Run `f` over the dependents of `target` while holding its entry. No edge to
    /// `target` can be added until `f` returns.
    pub(crate) fn with_dependents_locked<R>(
        &self,
        target: &ResourceKey,
        f: impl FnOnce(BTreeSet<ResourceKey>) -> R,
    ) -> R {
        match self.entries.entry(target.clone()) {
            Entry::Occupied(entry) => f(entry.get().keys()),
            Entry::Vacant(_vacant) => f(BTreeSet::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> BTreeMap<ResourceKey, BTreeMap<ResourceKey, usize>> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().referrers.clone()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("Interface", name).unwrap()
    }

    #[test]
    fn test_index_add_remove() {
        let index = DependencyIndex::new();
        let (a, b, t) = (key("a"), key("b"), key("t"));
        index.add_edges(&a, &BTreeMap::from([(t.clone(), 2)]));
        index.add_edges(&b, &BTreeMap::from([(t.clone(), 1)]));
        assert_eq!(index.dependents(&t), BTreeSet::from([a.clone(), b.clone()]));

        let released = index.remove_edges(&a, &BTreeMap::from([(t.clone(), 1)])).unwrap();
        assert!(released.is_empty());
        let released = index.remove_edges(&a, &BTreeMap::from([(t.clone(), 1)])).unwrap();
        assert_eq!(released, vec![t.clone()]);
        assert_eq!(index.dependents(&t), BTreeSet::from([b.clone()]));

        index.remove_edges(&b, &BTreeMap::from([(t.clone(), 1)])).unwrap();
        assert!(index.snapshot().is_empty());
    }

    #[test]
    fn test_index_corruption() {
        let index = DependencyIndex::new();
        let (a, b, t) = (key("a"), key("b"), key("t"));
        assert!(matches!(
            index.remove_edges(&a, &BTreeMap::from([(t.clone(), 1)])),
            Err(GraphError::Corruption(_))
        ));
        index.add_edges(&a, &BTreeMap::from([(t.clone(), 1)]));
        assert!(matches!(
            index.remove_edges(&a, &BTreeMap::from([(t.clone(), 2)])),
            Err(GraphError::Corruption(_))
        ));
        assert!(matches!(
            index.remove_edges(&b, &BTreeMap::from([(t.clone(), 1)])),
            Err(GraphError::Corruption(_))
        ));
    }
}
