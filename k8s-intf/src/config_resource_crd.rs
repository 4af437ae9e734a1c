// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The `ConfigResource` custom resource. One object per configuration resource instance,
//! keyed by `(resourceKind, metadata.name)`. Deletion timestamp and finalizers live in
//! the object metadata.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CONFIG_API_GROUP: &str = "config.devcfg.io";
pub const CONFIG_API_VERSION: &str = "v1alpha1";

/// Finalizer token owned by the engine
pub const FINALIZER: &str = "config.devcfg.io/finalizer";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "config.devcfg.io",
    version = "v1alpha1",
    kind = "ConfigResource",
    plural = "configresources",
    status = "ConfigResourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResourceSpec {
    /// Kind of the configuration subtree this object represents (e.g. `Interface`)
    pub resource_kind: String,
    /// Name of the device this configuration applies to
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<ConfigResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaf_refs: Vec<ConfigResourceLeafRef>,
    /// Desired state, opaque to the engine
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ConfigResourceRef {
    pub kind: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfigResourceScope {
    Internal,
    External,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ConfigResourceLeafRef {
    /// Path of the referring field within the parameters
    pub path: String,
    pub kind: String,
    pub name: String,
    /// Classified from the kinds involved when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ConfigResourceScope>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResourceStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConfigResourceCondition>,
    /// Observed state, as last reported by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResourceCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// RFC 3339
    pub last_transition_time: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use kube::CustomResourceExt;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crd_definition() {
        let crd = ConfigResource::crd();
        assert_eq!(crd.spec.group, CONFIG_API_GROUP);
        assert_eq!(crd.spec.names.kind, "ConfigResource");
        assert_eq!(crd.spec.names.plural, "configresources");
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.versions[0].name, CONFIG_API_VERSION);
    }

    #[test]
    fn test_spec_serialization() {
        let spec = ConfigResourceSpec {
            resource_kind: "BgpNeighbor".to_string(),
            node: "leaf1".to_string(),
            parent_ref: Some(ConfigResourceRef {
                kind: "NetworkInstance".to_string(),
                name: "default".to_string(),
            }),
            leaf_refs: vec![ConfigResourceLeafRef {
                path: "/peer-group".to_string(),
                kind: "BgpGroup".to_string(),
                name: "grp-A".to_string(),
                scope: Some(ConfigResourceScope::External),
            }],
            parameters: serde_json::json!({"peer-address": "10.0.0.1"}),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["resourceKind"], "BgpNeighbor");
        assert_eq!(json["parentRef"]["kind"], "NetworkInstance");
        assert_eq!(json["leafRefs"][0]["scope"], "external");
        let back: ConfigResourceSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_status_condition_type_field() {
        let cond = ConfigResourceCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            reason: "Success".to_string(),
            message: String::new(),
            last_transition_time: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Ready");
        assert_eq!(json["lastTransitionTime"], "2026-01-01T00:00:00Z");
        assert!(json.get("message").is_none());
    }
}
