// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Converters for `ConfigResource` k8s objects to and from the configuration model

#![deny(clippy::all, clippy::pedantic)]

pub mod resource;
pub mod status;

pub use resource::resource_from_k8s;

use thiserror::Error;

use crate::ModelError;

#[derive(Debug, Error)]
pub enum FromK8sConversionError {
    #[error("Invalid ConfigResource object: {0}")]
    Invalid(String),
    #[error("Missing required data: {0}")]
    MissingData(String),
    #[error("Could not parse value: {0}")]
    ParseError(String),
    #[error("Resource rejected by the model: {0}")]
    Model(#[from] ModelError),
}
