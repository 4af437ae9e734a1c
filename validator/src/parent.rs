// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Parent validation

use config::{ConditionKind, ResourceInstance, ResourceKey, reason};
use graph::ResourceGraph;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParentVerdict {
    NoParent,
    Valid,
    Missing(ResourceKey),
    Deleting(ResourceKey),
    NotReady(ResourceKey),
}

impl ParentVerdict {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ParentVerdict::NoParent | ParentVerdict::Valid)
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ParentVerdict::NoParent => reason::NO_PARENT,
            ParentVerdict::Valid => reason::SUCCESS,
            ParentVerdict::Missing(_) => reason::PARENT_NOT_FOUND,
            ParentVerdict::Deleting(_) => reason::PARENT_DELETING,
            ParentVerdict::NotReady(_) => reason::PARENT_NOT_READY,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            ParentVerdict::NoParent | ParentVerdict::Valid => String::new(),
            ParentVerdict::Missing(p) => format!("parent {p} not found"),
            ParentVerdict::Deleting(p) => format!("parent {p} is being deleted"),
            ParentVerdict::NotReady(p) => format!("parent {p} is not ready"),
        }
    }
}

/// The parent must exist, must not be deleting and must be ready
#[must_use]
pub fn validate_parent(resource: &ResourceInstance, graph: &ResourceGraph) -> ParentVerdict {
    let Some(parent) = &resource.parent else {
        return ParentVerdict::NoParent;
    };
    match graph.inspect(parent, |p| {
        (p.is_deleting(), p.conditions.is_true(ConditionKind::Ready))
    }) {
        None => ParentVerdict::Missing(parent.clone()),
        Some((true, _)) => ParentVerdict::Deleting(parent.clone()),
        Some((false, false)) => ParentVerdict::NotReady(parent.clone()),
        Some((false, true)) => ParentVerdict::Valid,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use config::{ConditionStatus, NodeRef};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key(kind: &str, name: &str) -> ResourceKey {
        ResourceKey::new(kind, name).unwrap()
    }

    #[test]
    fn test_parent_verdicts() {
        let graph = ResourceGraph::new(4);
        let node = NodeRef::new("leaf1").unwrap();
        let eth1 = key("Interface", "eth-1");
        let sub = ResourceInstance::new(key("Subinterface", "eth-1.0"), node.clone(), json!({}))
            .with_parent(eth1.clone());

        assert_eq!(validate_parent(&sub, &graph), ParentVerdict::Missing(eth1.clone()));
        assert_eq!(validate_parent(&sub, &graph).reason(), reason::PARENT_NOT_FOUND);

        graph
            .upsert(ResourceInstance::new(eth1.clone(), node.clone(), json!({})))
            .unwrap();
        assert_eq!(validate_parent(&sub, &graph), ParentVerdict::NotReady(eth1.clone()));

        let mut conditions = graph.get(&eth1).unwrap().conditions;
        conditions.set(ConditionKind::Ready, ConditionStatus::True, reason::SUCCESS, "", Utc::now());
        graph.commit_status(&eth1, 1, None, conditions);
        assert_eq!(validate_parent(&sub, &graph), ParentVerdict::Valid);
        assert!(validate_parent(&sub, &graph).is_valid());

        graph.request_deletion(&eth1, Utc::now()).unwrap();
        assert_eq!(validate_parent(&sub, &graph), ParentVerdict::Deleting(eth1));

        let standalone = ResourceInstance::new(key("Interface", "eth-2"), node, json!({}));
        assert_eq!(validate_parent(&standalone, &graph), ParentVerdict::NoParent);
        assert!(ParentVerdict::NoParent.is_valid());
    }
}
