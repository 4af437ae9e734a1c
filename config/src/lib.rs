// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Data model for device configuration resources: identities, references, status
//! conditions and the registry of resource kinds.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod converters;
pub mod errors;
pub mod model;
pub mod registry;

pub use errors::{ModelError, ModelResult};
pub use model::condition::{Condition, ConditionKind, ConditionSet, ConditionStatus, reason};
pub use model::key::{Kind, NodeRef, ResourceKey};
pub use model::leafref::{LeafRef, LeafRefScope, LeafRefs};
pub use model::resource::ResourceInstance;
pub use registry::{AcceptAll, KindEntry, KindRegistry, PayloadValidator, RequiredFields};
