// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversion of a `ConfigResource` record into a [`ResourceInstance`]

use chrono::{DateTime, Utc};
use std::str::FromStr;
use tracing::warn;

use k8s_intf::{
    ConfigResource, ConfigResourceCondition, ConfigResourceLeafRef, ConfigResourceRef,
    ConfigResourceScope, FINALIZER,
};

use crate::converters::k8s::FromK8sConversionError;
use crate::{
    Condition, ConditionKind, ConditionSet, ConditionStatus, Kind, KindRegistry, LeafRef,
    LeafRefScope, NodeRef, ResourceInstance, ResourceKey,
};

fn parse_time(value: &str) -> Result<DateTime<Utc>, FromK8sConversionError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FromK8sConversionError::ParseError(format!("timestamp '{value}': {e}")))
}

fn key_from_ref(reference: &ConfigResourceRef) -> Result<ResourceKey, FromK8sConversionError> {
    Ok(ResourceKey::new(&reference.kind, &reference.name)?)
}

fn leafref_from_k8s(
    referrer: &Kind,
    leafref: &ConfigResourceLeafRef,
    registry: &KindRegistry,
) -> Result<LeafRef, FromK8sConversionError> {
    let target = ResourceKey::new(&leafref.kind, &leafref.name)?;
    let scope = match leafref.scope {
        Some(ConfigResourceScope::Internal) => LeafRefScope::Internal,
        Some(ConfigResourceScope::External) => LeafRefScope::External,
        None => registry.classify(referrer, &target.kind),
    };
    Ok(LeafRef::new(&leafref.path, target, scope))
}

fn condition_from_k8s(
    condition: &ConfigResourceCondition,
) -> Result<Option<Condition>, FromK8sConversionError> {
    let Ok(kind) = ConditionKind::from_str(&condition.type_) else {
        warn!("Ignoring unknown condition type '{}'", condition.type_);
        return Ok(None);
    };
    let status = ConditionStatus::from_str(&condition.status).map_err(|_| {
        FromK8sConversionError::ParseError(format!(
            "status '{}' of condition {kind}",
            condition.status
        ))
    })?;
    Ok(Some(Condition {
        kind,
        status,
        reason: condition.reason.clone(),
        message: condition.message.clone(),
        last_transition_time: parse_time(&condition.last_transition_time)?,
    }))
}

/// Build a [`ResourceInstance`] from its persisted record. Leafrefs without an
/// explicit scope get classified with the registry.
///
/// # Errors
/// Fails if the record is incomplete or holds invalid identities or references.
pub fn resource_from_k8s(
    record: &ConfigResource,
    registry: &KindRegistry,
) -> Result<ResourceInstance, FromK8sConversionError> {
    let name = record
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| FromK8sConversionError::MissingData("metadata.name".to_string()))?;
    let key = ResourceKey::new(&record.spec.resource_kind, name)?;
    let node = NodeRef::new(&record.spec.node)?;

    let mut resource = ResourceInstance::new(key, node, record.spec.parameters.clone());
    if let Some(parent) = &record.spec.parent_ref {
        resource.parent = Some(key_from_ref(parent)?);
    }
    for leafref in &record.spec.leaf_refs {
        let leafref = leafref_from_k8s(&resource.key.kind, leafref, registry)?;
        resource.add_leafref(leafref)?;
    }

    if let Some(timestamp) = &record.metadata.deletion_timestamp {
        let value = serde_json::to_value(timestamp)
            .map_err(|e| FromK8sConversionError::ParseError(e.to_string()))?;
        let text = value.as_str().ok_or_else(|| {
            FromK8sConversionError::Invalid(format!("deletion timestamp {value}"))
        })?;
        resource.deletion_timestamp = Some(parse_time(text)?);
    }
    if record
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
    {
        resource.finalizer = Some(FINALIZER.to_string());
    }

    if let Some(status) = &record.status {
        let mut conditions = ConditionSet::new();
        for condition in &status.conditions {
            if let Some(condition) = condition_from_k8s(condition)? {
                conditions.restore(condition);
            }
        }
        resource.conditions = conditions;
        resource.observed.clone_from(&status.observation);
        resource.generation = status.generation.unwrap_or_default();
    }
    Ok(resource)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ModelError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(yaml: &str) -> ConfigResource {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    const NEIGHBOR: &str = "
apiVersion: config.devcfg.io/v1alpha1
kind: ConfigResource
metadata:
  name: n1
  finalizers:
    - config.devcfg.io/finalizer
  deletionTimestamp: 2026-03-01T10:00:00Z
spec:
  resourceKind: BgpNeighbor
  node: leaf1
  parentRef:
    kind: NetworkInstance
    name: default
  leafRefs:
    - path: /peer-group
      kind: BgpGroup
      name: grp-A
    - path: /export-policy
      kind: RoutingPolicy
      name: export-all
    - path: /import-policy
      kind: RoutingPolicy
      name: import-all
      scope: internal
  parameters:
    peer-address: 10.0.0.1
status:
  generation: 3
  conditions:
    - type: Ready
      status: 'False'
      reason: NotSynced
      lastTransitionTime: 2026-03-01T09:00:00Z
    - type: Healthy
      status: 'True'
      reason: Success
      lastTransitionTime: 2026-03-01T09:00:00Z
";

    #[test]
    fn test_neighbor_from_k8s() {
        let registry = KindRegistry::builtin();
        let resource = resource_from_k8s(&record(NEIGHBOR), &registry).unwrap();

        assert_eq!(resource.key.to_string(), "BgpNeighbor/n1");
        assert_eq!(resource.node.as_str(), "leaf1");
        assert_eq!(
            resource.parent,
            Some(ResourceKey::new("NetworkInstance", "default").unwrap())
        );
        let scopes: Vec<_> = resource.leafrefs.iter().map(|l| l.scope).collect();
        assert_eq!(
            scopes,
            [LeafRefScope::Internal, LeafRefScope::External, LeafRefScope::Internal]
        );
        assert_eq!(resource.desired, json!({"peer-address": "10.0.0.1"}));
        assert_eq!(resource.finalizer.as_deref(), Some(FINALIZER));
        assert_eq!(
            resource.deletion_timestamp,
            Some(parse_time("2026-03-01T10:00:00Z").unwrap())
        );
        assert_eq!(resource.generation, 3);

        // unknown condition types are dropped
        assert_eq!(resource.conditions.len(), 1);
        assert_eq!(
            resource.conditions.status(ConditionKind::Ready),
            ConditionStatus::False
        );
    }

    #[test]
    fn test_invalid_records() {
        let registry = KindRegistry::builtin();
        let missing_name = "
apiVersion: config.devcfg.io/v1alpha1
kind: ConfigResource
metadata: {}
spec:
  resourceKind: Interface
  node: leaf1
";
        assert!(matches!(
            resource_from_k8s(&record(missing_name), &registry),
            Err(FromK8sConversionError::MissingData(_))
        ));

        let bad_kind = "
apiVersion: config.devcfg.io/v1alpha1
kind: ConfigResource
metadata:
  name: eth-1
spec:
  resourceKind: interface
  node: leaf1
";
        assert!(matches!(
            resource_from_k8s(&record(bad_kind), &registry),
            Err(FromK8sConversionError::Model(ModelError::InvalidKind(_)))
        ));

        let bad_status = "
apiVersion: config.devcfg.io/v1alpha1
kind: ConfigResource
metadata:
  name: eth-1
spec:
  resourceKind: Interface
  node: leaf1
status:
  conditions:
    - type: Ready
      status: Maybe
      reason: Pending
      lastTransitionTime: 2026-03-01T09:00:00Z
";
        assert!(matches!(
            resource_from_k8s(&record(bad_status), &registry),
            Err(FromK8sConversionError::ParseError(_))
        ));
    }
}
