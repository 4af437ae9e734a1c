// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kubernetes-facing representation of device configuration resources

#![deny(clippy::all, clippy::pedantic)]

pub mod config_resource_crd;
pub mod utils;

pub use config_resource_crd::{
    CONFIG_API_GROUP, CONFIG_API_VERSION, ConfigResource, ConfigResourceCondition,
    ConfigResourceLeafRef, ConfigResourceRef, ConfigResourceScope, ConfigResourceSpec,
    ConfigResourceStatus, FINALIZER,
};
