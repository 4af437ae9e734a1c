// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Change notifications published by the graph

use config::ResourceKey;

#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    /// A resource was created or its caller-owned state changed.
    /// `released` lists the targets it no longer refers to.
    Upserted {
        key: ResourceKey,
        created: bool,
        spec_changed: bool,
        released: Vec<ResourceKey>,
    },
    DeletionRequested {
        key: ResourceKey,
    },
    /// A resource left the graph, either removed out of band or purged once its
    /// deletion completed
    Removed {
        key: ResourceKey,
        released: Vec<ResourceKey>,
        purged: bool,
    },
    /// The engine-owned state of a resource changed
    StatusChanged {
        key: ResourceKey,
        ready_changed: bool,
    },
}

impl GraphEvent {
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        match self {
            GraphEvent::Upserted { key, .. }
            | GraphEvent::DeletionRequested { key }
            | GraphEvent::Removed { key, .. }
            | GraphEvent::StatusChanged { key, .. } => key,
        }
    }
}
