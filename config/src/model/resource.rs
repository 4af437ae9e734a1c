// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A configuration resource instance

use crate::model::condition::ConditionSet;
use crate::model::key::{NodeRef, ResourceKey};
use crate::model::leafref::{LeafRef, LeafRefs};
use crate::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;

/// One configuration subtree of a device. The caller owns the desired state, the
/// references, the deletion timestamp and the finalizer. The engine owns the
/// observed state, the conditions and the generation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceInstance {
    pub key: ResourceKey,
    pub node: NodeRef,
    pub parent: Option<ResourceKey>,
    pub leafrefs: LeafRefs,
    pub desired: Value,
    pub observed: Option<Value>,
    pub conditions: ConditionSet,
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub finalizer: Option<String>,
    pub generation: i64,
    /// bumped by the graph on every caller-side mutation
    pub resource_version: u64,
}

impl ResourceInstance {
    #[must_use]
    pub fn new(key: ResourceKey, node: NodeRef, desired: Value) -> Self {
        Self {
            key,
            node,
            parent: None,
            leafrefs: LeafRefs::new(),
            desired,
            observed: None,
            conditions: ConditionSet::new(),
            deletion_timestamp: None,
            finalizer: None,
            generation: 0,
            resource_version: 0,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: ResourceKey) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_finalizer(mut self, finalizer: &str) -> Self {
        self.finalizer = Some(finalizer.to_owned());
        self
    }

    pub fn add_leafref(&mut self, leafref: LeafRef) -> ModelResult {
        self.leafrefs.push(leafref)
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// The resources this one points at, with the number of edges to each.
    /// The parent counts as one edge and so does every leafref.
    #[must_use]
    pub fn reference_targets(&self) -> BTreeMap<ResourceKey, usize> {
        let mut targets = BTreeMap::new();
        for target in self
            .parent
            .iter()
            .chain(self.leafrefs.iter().map(|l| &l.target))
        {
            *targets.entry(target.clone()).or_insert(0) += 1;
        }
        targets
    }

    /// Reject references a resource can never hold
    pub fn validate_references(&self) -> ModelResult {
        if self.parent.as_ref() == Some(&self.key)
            || self.leafrefs.iter().any(|l| l.target == self.key)
        {
            return Err(ModelError::SelfReference(self.key.clone()));
        }
        Ok(())
    }

    /// Tell if the caller-owned specification that drives the generation differs
    #[must_use]
    pub fn same_spec(&self, other: &ResourceInstance) -> bool {
        self.desired == other.desired
            && self.node == other.node
            && self.parent == other.parent
            && self.leafrefs == other.leafrefs
    }
}

impl Display for ResourceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} on {} (generation {}){}",
            self.key,
            self.node,
            self.generation,
            if self.is_deleting() { " [deleting]" } else { "" }
        )?;
        if let Some(parent) = &self.parent {
            writeln!(f, "   parent: {parent}")?;
        }
        for leafref in self.leafrefs.iter() {
            writeln!(f, "   leafref: {leafref}")?;
        }
        write!(f, "{}", self.conditions)
    }
}
