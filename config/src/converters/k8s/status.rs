// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversion of the engine-owned state of a resource into a `ConfigResource` status

use chrono::SecondsFormat;

use k8s_intf::{ConfigResourceCondition, ConfigResourceStatus};

use crate::{Condition, ResourceInstance};

impl From<&Condition> for ConfigResourceCondition {
    fn from(condition: &Condition) -> Self {
        ConfigResourceCondition {
            type_: condition.kind.to_string(),
            status: condition.status.to_string(),
            reason: condition.reason.clone(),
            message: condition.message.clone(),
            last_transition_time: condition
                .last_transition_time
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
    }
}

impl From<&ResourceInstance> for ConfigResourceStatus {
    fn from(resource: &ResourceInstance) -> Self {
        ConfigResourceStatus {
            conditions: resource.conditions.iter().map(ConfigResourceCondition::from).collect(),
            observation: resource.observed.clone(),
            generation: (resource.generation > 0).then_some(resource.generation),
        }
    }
}
