// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The resource graph: resources keyed by identity plus the reverse index.
//!
//! Lock order: a resource entry may be held while an index entry is taken, never the
//! other way around. Parent changes are admitted one at a time.

use crate::errors::GraphError;
use crate::events::GraphEvent;
use crate::index::DependencyIndex;
use chrono::Utc;
use config::{ConditionKind, ConditionSet, NodeRef, ResourceInstance, ResourceKey};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Result of a successful upsert
#[derive(Clone, Debug, PartialEq)]
pub struct UpsertOutcome {
    pub generation: i64,
    pub spec_changed: bool,
    pub created: bool,
    pub deletion_requested: bool,
    pub released: Vec<ResourceKey>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCommit {
    Committed { ready_changed: bool },
    /// the resource changed or went away since the status was computed
    Discarded,
}

#[derive(Debug)]
pub enum PurgeOutcome {
    Purged(Box<ResourceInstance>),
    Blocked(BTreeSet<ResourceKey>),
    NotFound,
}

pub struct ResourceGraph {
    resources: DashMap<ResourceKey, ResourceInstance>,
    index: DependencyIndex,
    admission: Mutex<()>,
    events: broadcast::Sender<GraphEvent>,
}

impl ResourceGraph {
    #[must_use]
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            resources: DashMap::new(),
            index: DependencyIndex::new(),
            admission: Mutex::new(()),
            events,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: GraphEvent) {
        trace!("Graph event: {event:?}");
        if self.events.send(event).is_err() {
            trace!("No subscribers for graph events");
        }
    }

    /// Walk up the parent chain starting at `parent`. Fails if it leads back to `key`.
    fn check_cycle(&self, key: &ResourceKey, parent: &ResourceKey) -> Result<(), GraphError> {
        let mut path = vec![key.clone()];
        let mut visited = BTreeSet::new();
        let mut current = Some(parent.clone());
        while let Some(cur) = current {
            path.push(cur.clone());
            if &cur == key {
                warn!("Rejecting {key}: cyclic parent chain");
                return Err(GraphError::Cycle(path));
            }
            if !visited.insert(cur.clone()) {
                break;
            }
            current = self.resources.get(&cur).and_then(|r| r.parent.clone());
        }
        Ok(())
    }

    /// Insert or update a resource. The stored engine-owned state is kept, a deletion
    /// timestamp can't be cleared and a finalizer can only be added.
    pub fn upsert(&self, mut resource: ResourceInstance) -> Result<UpsertOutcome, GraphError> {
        resource.validate_references()?;
        let key = resource.key.clone();

        let stored_parent = self.resources.get(&key).map(|r| r.parent.clone());
        let parent_changes = match &stored_parent {
            Some(stored) => *stored != resource.parent,
            None => resource.parent.is_some(),
        };
        let _admission = if parent_changes {
            let guard = self.admission.lock();
            if let Some(parent) = &resource.parent {
                self.check_cycle(&key, parent)?;
            }
            Some(guard)
        } else {
            None
        };

        let new_targets = resource.reference_targets();
        let outcome = match self.resources.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                let spec_changed = !stored.same_spec(&resource);
                let deletion_requested =
                    stored.deletion_timestamp.is_none() && resource.deletion_timestamp.is_some();
                let old_targets = stored.reference_targets();

                stored.node = resource.node;
                stored.parent = resource.parent;
                stored.leafrefs = resource.leafrefs;
                stored.desired = resource.desired;
                if stored.deletion_timestamp.is_none() {
                    stored.deletion_timestamp = resource.deletion_timestamp;
                } else if resource.deletion_timestamp.is_none() {
                    debug!("Ignoring attempt to clear the deletion timestamp of {key}");
                }
                if stored.finalizer.is_none() {
                    stored.finalizer = resource.finalizer;
                }
                if spec_changed {
                    stored.generation += 1;
                }
                stored.resource_version += 1;

                // new edges first, so targets kept across the update never hit zero
                self.index.add_edges(&key, &new_targets);
                let released = self.index.remove_edges(&key, &old_targets)?;
                UpsertOutcome {
                    generation: stored.generation,
                    spec_changed,
                    created: false,
                    deletion_requested,
                    released,
                }
            }
            Entry::Vacant(entry) => {
                resource.generation = 1;
                resource.resource_version = 1;
                resource.conditions.init_pending(Utc::now());
                let deletion_requested = resource.deletion_timestamp.is_some();
                self.index.add_edges(&key, &new_targets);
                entry.insert(resource);
                UpsertOutcome {
                    generation: 1,
                    spec_changed: true,
                    created: true,
                    deletion_requested,
                    released: vec![],
                }
            }
        };

        debug!(
            "Upserted {key}: generation {} created={} spec-changed={}",
            outcome.generation, outcome.created, outcome.spec_changed
        );
        self.publish(GraphEvent::Upserted {
            key: key.clone(),
            created: outcome.created,
            spec_changed: outcome.spec_changed,
            released: outcome.released.clone(),
        });
        if outcome.deletion_requested {
            self.publish(GraphEvent::DeletionRequested { key });
        }
        Ok(outcome)
    }

    /// Remove a resource unconditionally, without going through deletion
    pub fn remove(&self, key: &ResourceKey) -> Result<Option<ResourceInstance>, GraphError> {
        let Some((_, removed)) = self.resources.remove(key) else {
            return Ok(None);
        };
        let released = self.index.remove_edges(key, &removed.reference_targets())?;
        info!("Removed {key}");
        self.publish(GraphEvent::Removed {
            key: key.clone(),
            released,
            purged: false,
        });
        Ok(Some(removed))
    }

    /// Mark a resource for deletion. Returns false if it already was.
    pub fn request_deletion(
        &self,
        key: &ResourceKey,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        {
            let mut resource = self
                .resources
                .get_mut(key)
                .ok_or_else(|| GraphError::NotFound(key.clone()))?;
            if resource.deletion_timestamp.is_some() {
                return Ok(false);
            }
            resource.deletion_timestamp = Some(now);
            resource.resource_version += 1;
        }
        info!("Deletion of {key} requested");
        self.publish(GraphEvent::DeletionRequested { key: key.clone() });
        Ok(true)
    }

    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<ResourceInstance> {
        self.resources.get(key).map(|r| r.value().clone())
    }

    /// Look at a resource without cloning it
    #[must_use]
    pub fn inspect<R>(&self, key: &ResourceKey, f: impl FnOnce(&ResourceInstance) -> R) -> Option<R> {
        self.resources.get(key).map(|r| f(r.value()))
    }

    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    #[must_use]
    pub fn parent_of(&self, key: &ResourceKey) -> Option<ResourceKey> {
        self.resources.get(key).and_then(|r| r.parent.clone())
    }

    /// The resources whose parent or leafrefs point at `key`. `key` need not exist.
    #[must_use]
    pub fn dependents(&self, key: &ResourceKey) -> BTreeSet<ResourceKey> {
        self.index.dependents(key)
    }

    /// The resources `key` points at
    #[must_use]
    pub fn referenced_by(&self, key: &ResourceKey) -> BTreeSet<ResourceKey> {
        self.resources
            .get(key)
            .map(|r| r.reference_targets().into_keys().collect())
            .unwrap_or_default()
    }

    /// Store the output of an evaluation, if the resource is still at `resource_version`.
    /// `observed` replaces the observed state when present.
    pub fn commit_status(
        &self,
        key: &ResourceKey,
        resource_version: u64,
        observed: Option<Value>,
        conditions: ConditionSet,
    ) -> StatusCommit {
        let (changed, ready_changed) = {
            let Some(mut resource) = self.resources.get_mut(key) else {
                trace!("Discarding status of {key}: gone");
                return StatusCommit::Discarded;
            };
            if resource.resource_version != resource_version {
                trace!(
                    "Discarding status of {key}: version {resource_version} superseded by {}",
                    resource.resource_version
                );
                return StatusCommit::Discarded;
            }
            let ready_changed = resource.conditions.status(ConditionKind::Ready)
                != conditions.status(ConditionKind::Ready);
            let mut changed = resource.conditions != conditions;
            resource.conditions = conditions;
            if let Some(observed) = observed {
                changed |= resource.observed.as_ref() != Some(&observed);
                resource.observed = Some(observed);
            }
            (changed, ready_changed)
        };
        if changed {
            self.publish(GraphEvent::StatusChanged {
                key: key.clone(),
                ready_changed,
            });
        }
        StatusCommit::Committed { ready_changed }
    }

    /// Purge a resource marked for deletion if nothing refers to it. The check and the
    /// removal happen while the index entry of `key` is held, so no reference to
    /// it can be added in between.
    pub fn purge_if_unreferenced(&self, key: &ResourceKey) -> Result<PurgeOutcome, GraphError> {
        let Entry::Occupied(entry) = self.resources.entry(key.clone()) else {
            return Ok(PurgeOutcome::NotFound);
        };
        if !entry.get().is_deleting() {
            return Err(GraphError::NotDeleting(key.clone()));
        }
        let outcome = self.index.with_dependents_locked(key, |dependents| {
            if dependents.is_empty() {
                let (_, mut purged) = entry.remove_entry();
                purged.finalizer = None;
                PurgeOutcome::Purged(Box::new(purged))
            } else {
                PurgeOutcome::Blocked(dependents)
            }
        });
        if let PurgeOutcome::Purged(purged) = &outcome {
            let released = self.index.remove_edges(key, &purged.reference_targets())?;
            info!("Purged {key}");
            self.publish(GraphEvent::Removed {
                key: key.clone(),
                released,
                purged: true,
            });
        }
        Ok(outcome)
    }

    /// All keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.resources.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of existing ancestors of `key`
    #[must_use]
    pub fn parent_depth(&self, key: &ResourceKey) -> usize {
        let mut depth = 0;
        let mut visited = BTreeSet::from([key.clone()]);
        let mut current = self.parent_of(key);
        while let Some(parent) = current {
            if !visited.insert(parent.clone()) || !self.contains(&parent) {
                break;
            }
            depth += 1;
            current = self.parent_of(&parent);
        }
        depth
    }

    /// Order keys so that parents come before their children
    #[must_use]
    pub fn topological(&self, keys: impl IntoIterator<Item = ResourceKey>) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = keys
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|k| (self.parent_depth(&k), k))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// The resources configured on `node`, sorted
    #[must_use]
    pub fn nodes_of(&self, node: &NodeRef) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self
            .resources
            .iter()
            .filter(|r| &r.node == node)
            .map(|r| r.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Edge counts per target as recomputed from the stored resources
    #[cfg(test)]
    fn expected_index(&self) -> BTreeMap<ResourceKey, BTreeMap<ResourceKey, usize>> {
        let mut expected: BTreeMap<ResourceKey, BTreeMap<ResourceKey, usize>> = BTreeMap::new();
        for r in &self.resources {
            for (target, count) in r.reference_targets() {
                expected
                    .entry(target)
                    .or_default()
                    .insert(r.key().clone(), count);
            }
        }
        expected
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use config::{ConditionStatus, LeafRef, reason};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;

    fn key(kind: &str, name: &str) -> ResourceKey {
        ResourceKey::new(kind, name).unwrap()
    }

    fn resource(kind: &str, name: &str) -> ResourceInstance {
        ResourceInstance::new(key(kind, name), NodeRef::new("leaf1").unwrap(), json!({}))
    }

    fn subif(name: &str, parent: &str) -> ResourceInstance {
        resource("Subinterface", name).with_parent(key("Interface", parent))
    }

    #[test]
    fn test_upsert_generation_and_merge() {
        let graph = ResourceGraph::new(16);
        let outcome = graph.upsert(resource("Interface", "eth-1")).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.generation, 1);

        let eth1 = key("Interface", "eth-1");
        let stored = graph.get(&eth1).unwrap();
        assert_eq!(stored.conditions.len(), 6);
        assert_eq!(stored.resource_version, 1);

        // engine-owned state survives upserts
        let mut conditions = stored.conditions.clone();
        conditions.set(ConditionKind::Ready, ConditionStatus::True, reason::SUCCESS, "", Utc::now());
        graph.commit_status(&eth1, 1, Some(json!({"oper": "up"})), conditions.clone());

        let outcome = graph.upsert(resource("Interface", "eth-1")).unwrap();
        assert!(!outcome.spec_changed);
        assert_eq!(outcome.generation, 1);
        let stored = graph.get(&eth1).unwrap();
        assert_eq!(stored.conditions, conditions);
        assert_eq!(stored.observed, Some(json!({"oper": "up"})));
        assert_eq!(stored.resource_version, 2);

        let mut changed = resource("Interface", "eth-1");
        changed.desired = json!({"mtu": 9000});
        let outcome = graph.upsert(changed).unwrap();
        assert!(outcome.spec_changed);
        assert_eq!(outcome.generation, 2);
        assert_eq!(graph.inspect(&eth1, |r| r.generation), Some(2));
        assert_eq!(graph.inspect(&key("Interface", "eth-2"), |r| r.generation), None);
    }

    #[test]
    fn test_deletion_cannot_be_undone() {
        let graph = ResourceGraph::new(16);
        let eth1 = key("Interface", "eth-1");
        graph.upsert(resource("Interface", "eth-1").with_finalizer("f")).unwrap();
        assert!(graph.request_deletion(&eth1, Utc::now()).unwrap());
        assert!(!graph.request_deletion(&eth1, Utc::now()).unwrap());

        // a plain upsert neither clears the timestamp nor drops the finalizer
        graph.upsert(resource("Interface", "eth-1")).unwrap();
        let stored = graph.get(&eth1).unwrap();
        assert!(stored.is_deleting());
        assert_eq!(stored.finalizer.as_deref(), Some("f"));

        assert!(matches!(
            graph.request_deletion(&key("Interface", "nope"), Utc::now()),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn test_dependents_and_release() {
        let graph = ResourceGraph::new(16);
        let eth1 = key("Interface", "eth-1");
        let eth2 = key("Interface", "eth-2");
        // the target need not exist
        graph.upsert(subif("eth-1.0", "eth-1")).unwrap();
        assert_eq!(graph.dependents(&eth1), BTreeSet::from([key("Subinterface", "eth-1.0")]));

        let outcome = graph.upsert(subif("eth-1.0", "eth-2")).unwrap();
        assert_eq!(outcome.released, vec![eth1.clone()]);
        assert!(graph.dependents(&eth1).is_empty());
        assert_eq!(graph.dependents(&eth2).len(), 1);
        assert_eq!(graph.referenced_by(&key("Subinterface", "eth-1.0")), BTreeSet::from([eth2.clone()]));

        let removed = graph.remove(&key("Subinterface", "eth-1.0")).unwrap();
        assert!(removed.is_some());
        assert!(graph.dependents(&eth2).is_empty());
        assert_eq!(graph.expected_index(), graph.index.snapshot());
    }

    #[test]
    #[traced_test]
    fn test_cycles_rejected() {
        let graph = ResourceGraph::new(16);
        graph.upsert(resource("Interface", "a").with_parent(key("Interface", "b"))).unwrap();
        graph.upsert(resource("Interface", "b").with_parent(key("Interface", "c"))).unwrap();
        let r = graph.upsert(resource("Interface", "c").with_parent(key("Interface", "a")));
        let Err(GraphError::Cycle(path)) = r else {
            panic!("cycle not detected");
        };
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
        assert!(!graph.contains(&key("Interface", "c")));
        assert!(logs_contain("cyclic parent chain"));

        let r = graph.upsert(resource("Interface", "d").with_parent(key("Interface", "d")));
        assert!(matches!(r, Err(GraphError::Model(_))));
    }

    #[test]
    fn test_stale_status_is_discarded() {
        let graph = ResourceGraph::new(16);
        let eth1 = key("Interface", "eth-1");
        graph.upsert(resource("Interface", "eth-1")).unwrap();
        let version = graph.get(&eth1).unwrap().resource_version;
        graph.request_deletion(&eth1, Utc::now()).unwrap();

        let mut conditions = ConditionSet::pending(Utc::now());
        conditions.set(ConditionKind::Ready, ConditionStatus::True, reason::SUCCESS, "", Utc::now());
        assert_eq!(graph.commit_status(&eth1, version, None, conditions), StatusCommit::Discarded);
        assert_eq!(graph.commit_status(&key("Interface", "x"), 1, None, ConditionSet::new()), StatusCommit::Discarded);
    }

    #[test]
    fn test_purge_gate() {
        let graph = ResourceGraph::new(16);
        let eth1 = key("Interface", "eth-1");
        let sub = key("Subinterface", "eth-1.0");
        graph.upsert(resource("Interface", "eth-1").with_finalizer("f")).unwrap();
        graph.upsert(subif("eth-1.0", "eth-1")).unwrap();

        assert!(matches!(graph.purge_if_unreferenced(&eth1), Err(GraphError::NotDeleting(_))));
        graph.request_deletion(&eth1, Utc::now()).unwrap();
        let PurgeOutcome::Blocked(blockers) = graph.purge_if_unreferenced(&eth1).unwrap() else {
            panic!("purge should be blocked");
        };
        assert_eq!(blockers, BTreeSet::from([sub.clone()]));
        assert!(graph.contains(&eth1));

        graph.remove(&sub).unwrap();
        let PurgeOutcome::Purged(purged) = graph.purge_if_unreferenced(&eth1).unwrap() else {
            panic!("purge should succeed");
        };
        assert_eq!(purged.finalizer, None);
        assert!(!graph.contains(&eth1));
        assert!(matches!(graph.purge_if_unreferenced(&eth1).unwrap(), PurgeOutcome::NotFound));
    }

    #[test]
    fn test_topological_order() {
        let graph = ResourceGraph::new(16);
        let mut neighbor = resource("BgpNeighbor", "n1").with_parent(key("NetworkInstance", "default"));
        neighbor
            .add_leafref(LeafRef::internal("/peer-group", key("BgpGroup", "grp-A")))
            .unwrap();
        graph.upsert(neighbor).unwrap();
        graph.upsert(resource("BgpGroup", "grp-A").with_parent(key("NetworkInstance", "default"))).unwrap();
        graph.upsert(resource("NetworkInstance", "default")).unwrap();
        graph.upsert(subif("eth-1.0", "eth-1")).unwrap();

        let order = graph.topological(graph.keys());
        assert_eq!(order[0], key("NetworkInstance", "default"));
        // missing parents don't count
        assert_eq!(graph.parent_depth(&key("Subinterface", "eth-1.0")), 0);
        assert_eq!(graph.parent_depth(&key("BgpNeighbor", "n1")), 1);
        assert_eq!(graph.nodes_of(&NodeRef::new("leaf1").unwrap()).len(), 4);
    }

    #[tokio::test]
    async fn test_events() {
        let graph = ResourceGraph::new(16);
        let mut rx = graph.subscribe();
        let eth1 = key("Interface", "eth-1");
        graph.upsert(resource("Interface", "eth-1")).unwrap();
        graph.request_deletion(&eth1, Utc::now()).unwrap();
        graph.purge_if_unreferenced(&eth1).unwrap();

        assert!(matches!(rx.recv().await.unwrap(), GraphEvent::Upserted { created: true, .. }));
        assert_eq!(rx.recv().await.unwrap(), GraphEvent::DeletionRequested { key: eth1.clone() });
        assert_eq!(
            rx.recv().await.unwrap(),
            GraphEvent::Removed { key: eth1, released: vec![], purged: true }
        );
    }

    #[test]
    fn test_index_consistency_fuzz() {
        bolero::check!()
            .with_type::<Vec<(bool, u8, Option<u8>, Vec<u8>)>>()
            .for_each(|ops| {
                let graph = ResourceGraph::new(1);
                let name = |n: u8| format!("r{}", n % 6);
                for (remove, n, parent, refs) in ops {
                    if *remove {
                        graph.remove(&key("Interface", &name(*n))).unwrap();
                        continue;
                    }
                    let mut r = resource("Interface", &name(*n));
                    if let Some(p) = parent {
                        r.parent = Some(key("Interface", &name(*p)));
                    }
                    for (i, target) in refs.iter().take(4).enumerate() {
                        let leafref = LeafRef::internal(&format!("/f{i}"), key("Interface", &name(*target)));
                        r.add_leafref(leafref).unwrap();
                    }
                    // self references and cycles are rejected, the index must stay consistent
                    let _ = graph.upsert(r);
                }
                assert_eq!(graph.expected_index(), graph.index.snapshot());
            });
    }
}
