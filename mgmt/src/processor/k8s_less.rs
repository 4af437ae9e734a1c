// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Feeding the engine from resource files, without a cluster

use crate::processor::client::{EngineClient, EngineError};
use config::converters::k8s::{FromK8sConversionError, resource_from_k8s};
use config::{KindRegistry, ResourceKey};
use k8s_intf::ConfigResourceStatus;
use k8s_intf::utils::{LoadError, load_resources_from_file};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum K8sLessError {
    #[error("Failed to load resources: {0}")]
    Load(#[from] LoadError),
    #[error("Failed to convert resource: {0}")]
    Conversion(#[from] FromK8sConversionError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Upsert every resource in the file at `path`, in file order. A record carrying a
/// deletion timestamp starts its deletion. Returns the number of resources admitted.
///
/// # Errors
/// Fails on the first record that cannot be loaded, converted or admitted.
pub async fn apply_file(
    client: &EngineClient,
    path: &str,
    registry: &KindRegistry,
) -> Result<usize, K8sLessError> {
    info!("Applying resources from {path}");
    let records = load_resources_from_file(path)?;
    let mut admitted = 0;
    for record in &records {
        let resource = resource_from_k8s(record, registry).inspect_err(|e| {
            error!("Failed to convert {:?}: {e}", record.metadata.name);
        })?;
        let key = resource.key.clone();
        let outcome = client.upsert(resource).await?;
        debug!(
            "Upserted {key} at generation {} (deletion requested: {})",
            outcome.generation, outcome.deletion_requested
        );
        admitted += 1;
    }
    info!("Admitted {admitted} resources from {path}");
    Ok(admitted)
}

/// The status of a resource, as it would be written back to its record
///
/// # Errors
/// Fails if the engine is gone or the resource is not known.
pub async fn record_status(
    client: &EngineClient,
    key: &ResourceKey,
) -> Result<ConfigResourceStatus, EngineError> {
    let resource = client.get(key).await?;
    Ok(ConfigResourceStatus::from(&resource))
}
