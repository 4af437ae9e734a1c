// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use config::{ModelError, ResourceKey};

fn fmt_path(path: &[ResourceKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Resource {0} not found")]
    NotFound(ResourceKey),
    #[error("Parent chain would form a cycle: {}", fmt_path(.0))]
    Cycle(Vec<ResourceKey>),
    #[error("Resource {0} is not marked for deletion")]
    NotDeleting(ResourceKey),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Dependency index corrupted: {0}")]
    Corruption(String),
}
