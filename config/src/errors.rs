// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the configuration resource model

use crate::model::key::{Kind, ResourceKey};

/// The reasons why a resource may be refused admission
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid resource kind '{0}'")]
    InvalidKind(String),
    #[error("Invalid resource name '{0}'")]
    InvalidName(String),
    #[error("Invalid node reference '{0}'")]
    InvalidNode(String),
    #[error("Unknown resource kind {0}")]
    UnknownKind(Kind),
    #[error("Resource kind {0} is already registered")]
    DuplicateKind(Kind),
    #[error("Subtree root {1} of kind {0} is not registered")]
    UnknownSubtreeRoot(Kind, Kind),
    #[error("Duplicate leafref '{0}' to {1}")]
    DuplicateLeafRef(String, ResourceKey),
    #[error("Resource {0} refers to itself")]
    SelfReference(ResourceKey),
    #[error("Invalid parameters for {0}: {1}")]
    InvalidParameters(ResourceKey, String),
    #[error("Missing parameter '{1}' for {0}")]
    MissingParameter(ResourceKey, String),
}

/// Result-like type for model operations
pub type ModelResult<T = ()> = Result<T, ModelError>;
