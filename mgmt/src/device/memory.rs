// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-memory device driver. Keeps the configuration of every node in memory and
//! lets callers inject unreachable and stalled nodes, apply rejections, drift and
//! retraction failures.

use crate::device::{ApplyOutcome, DeviceDriver, DeviceError};
use async_trait::async_trait;
use config::{NodeRef, ResourceInstance, ResourceKey};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct NodeState {
    unreachable: bool,
    stalled: bool,
    config: BTreeMap<ResourceKey, Value>,
}

#[derive(Debug, Default)]
struct DeviceState {
    nodes: BTreeMap<NodeRef, NodeState>,
    rejections: BTreeMap<ResourceKey, String>,
    drift: BTreeSet<ResourceKey>,
    retract_failures: BTreeMap<ResourceKey, usize>,
    applies: BTreeMap<ResourceKey, usize>,
    retractions: BTreeMap<ResourceKey, usize>,
}

enum Access {
    Ready,
    Stalled,
    Unreachable,
}

#[derive(Debug, Default)]
pub struct MemoryDevice {
    state: Mutex<DeviceState>,
}

impl MemoryDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_nodes(nodes: &[&str]) -> Self {
        let device = Self::new();
        for node in nodes {
            if let Ok(node) = NodeRef::new(node) {
                device.add_node(&node);
            }
        }
        device
    }

    pub fn add_node(&self, node: &NodeRef) {
        self.state.lock().nodes.entry(node.clone()).or_default();
    }

    pub fn remove_node(&self, node: &NodeRef) {
        self.state.lock().nodes.remove(node);
    }

    pub fn set_unreachable(&self, node: &NodeRef, unreachable: bool) {
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.unreachable = unreachable;
        }
    }

    /// A stalled node never answers
    pub fn stall(&self, node: &NodeRef, stalled: bool) {
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.stalled = stalled;
        }
    }

    /// Make the device reject every apply of `key`
    pub fn reject(&self, key: &ResourceKey, reason: &str) {
        self.state
            .lock()
            .rejections
            .insert(key.clone(), reason.to_owned());
    }

    pub fn accept(&self, key: &ResourceKey) {
        self.state.lock().rejections.remove(key);
    }

    /// Make the device report `key` as not in sync after applying it
    pub fn set_drift(&self, key: &ResourceKey, drift: bool) {
        let mut state = self.state.lock();
        if drift {
            state.drift.insert(key.clone());
        } else {
            state.drift.remove(key);
        }
    }

    /// Fail the next `count` retractions of `key`
    pub fn fail_retractions(&self, key: &ResourceKey, count: usize) {
        self.state
            .lock()
            .retract_failures
            .insert(key.clone(), count);
    }

    /// The configuration applied for `key` on `node`, if any
    #[must_use]
    pub fn applied(&self, node: &NodeRef, key: &ResourceKey) -> Option<Value> {
        self.state
            .lock()
            .nodes
            .get(node)
            .and_then(|n| n.config.get(key).cloned())
    }

    #[must_use]
    pub fn apply_count(&self, key: &ResourceKey) -> usize {
        self.state.lock().applies.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn retract_count(&self, key: &ResourceKey) -> usize {
        self.state.lock().retractions.get(key).copied().unwrap_or(0)
    }

    fn access(&self, node: &NodeRef) -> Access {
        match self.state.lock().nodes.get(node) {
            Some(n) if n.stalled => Access::Stalled,
            Some(n) if !n.unreachable => Access::Ready,
            _ => Access::Unreachable,
        }
    }
}

#[async_trait]
impl DeviceDriver for MemoryDevice {
    async fn exists(&self, node: &NodeRef) -> bool {
        match self.access(node) {
            Access::Ready => true,
            Access::Unreachable => false,
            Access::Stalled => std::future::pending().await,
        }
    }

    async fn apply(&self, resource: &ResourceInstance) -> Result<ApplyOutcome, DeviceError> {
        match self.access(&resource.node) {
            Access::Ready => {}
            Access::Unreachable => return Err(DeviceError::Unreachable(resource.node.clone())),
            Access::Stalled => std::future::pending().await,
        }
        let mut state = self.state.lock();
        *state.applies.entry(resource.key.clone()).or_insert(0) += 1;
        if let Some(reason) = state.rejections.get(&resource.key) {
            debug!("Rejecting {}: {reason}", resource.key);
            return Err(DeviceError::Rejected(reason.clone()));
        }
        let in_sync = !state.drift.contains(&resource.key);
        let node = state
            .nodes
            .get_mut(&resource.node)
            .ok_or_else(|| DeviceError::Unreachable(resource.node.clone()))?;
        node.config
            .insert(resource.key.clone(), resource.desired.clone());
        trace!("Applied {} on {}", resource.key, resource.node);
        Ok(ApplyOutcome {
            observed: resource.desired.clone(),
            in_sync,
        })
    }

    async fn retract(&self, key: &ResourceKey, node: &NodeRef) -> Result<(), DeviceError> {
        match self.access(node) {
            Access::Ready => {}
            Access::Unreachable => return Err(DeviceError::Unreachable(node.clone())),
            Access::Stalled => std::future::pending().await,
        }
        let mut state = self.state.lock();
        *state.retractions.entry(key.clone()).or_insert(0) += 1;
        if let Some(left) = state.retract_failures.get_mut(key)
            && *left > 0
        {
            *left -= 1;
            return Err(DeviceError::Failed(format!("injected failure retracting {key}")));
        }
        if let Some(n) = state.nodes.get_mut(node) {
            n.config.remove(key);
        }
        trace!("Retracted {key} from {node}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_device() {
        let device = MemoryDevice::with_nodes(&["leaf1"]);
        let leaf1 = NodeRef::new("leaf1").unwrap();
        let leaf2 = NodeRef::new("leaf2").unwrap();
        assert!(device.exists(&leaf1).await);
        assert!(!device.exists(&leaf2).await);

        let key = ResourceKey::new("Interface", "eth-1").unwrap();
        let eth1 = ResourceInstance::new(key.clone(), leaf1.clone(), json!({"mtu": 1500}));
        let outcome = device.apply(&eth1).await.unwrap();
        assert!(outcome.in_sync);
        assert_eq!(device.applied(&leaf1, &key), Some(json!({"mtu": 1500})));

        device.reject(&key, "mtu out of range");
        assert_eq!(
            device.apply(&eth1).await,
            Err(DeviceError::Rejected("mtu out of range".to_string()))
        );
        assert_eq!(device.apply_count(&key), 2);

        device.fail_retractions(&key, 1);
        assert!(device.retract(&key, &leaf1).await.is_err());
        device.retract(&key, &leaf1).await.unwrap();
        // retraction is idempotent
        device.retract(&key, &leaf1).await.unwrap();
        assert_eq!(device.applied(&leaf1, &key), None);
        assert_eq!(device.retract_count(&key), 3);

        device.set_unreachable(&leaf1, true);
        assert!(!device.exists(&leaf1).await);
        assert!(matches!(
            device.retract(&key, &leaf1).await,
            Err(DeviceError::Unreachable(_))
        ));
    }
}
