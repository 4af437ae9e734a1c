// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The device-facing side of the engine

pub mod memory;

use async_trait::async_trait;
use config::{NodeRef, ResourceInstance, ResourceKey};
use serde_json::Value;

/// What a device reports after applying a resource
#[derive(Clone, Debug, PartialEq)]
pub struct ApplyOutcome {
    pub observed: Value,
    /// whether the observed state matches the desired state
    pub in_sync: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device {0} is unreachable")]
    Unreachable(NodeRef),
    #[error("Configuration rejected by the device: {0}")]
    Rejected(String),
    #[error("Device operation timed out")]
    Timeout,
    #[error("Device operation failed: {0}")]
    Failed(String),
}

/// The operations the engine needs from the devices it configures. Retraction
/// must be idempotent.
#[async_trait]
pub trait DeviceDriver: Send + Sync + 'static {
    async fn exists(&self, node: &NodeRef) -> bool;
    async fn apply(&self, resource: &ResourceInstance) -> Result<ApplyOutcome, DeviceError>;
    async fn retract(&self, key: &ResourceKey, node: &NodeRef) -> Result<(), DeviceError>;
}
