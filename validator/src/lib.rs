// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Validation of the references of a configuration resource and synthesis of its
//! status conditions. Everything here is a pure function of a resource and a
//! consistent view of the resource graph.

#![deny(clippy::all, clippy::pedantic)]

pub mod leafref;
pub mod parent;
pub mod synth;

pub use leafref::{LeafrefFailure, LeafrefReport, ScopeVerdict, Unresolved, resolve_leafrefs};
pub use parent::{ParentVerdict, validate_parent};
pub use synth::{ApplyVerdict, Evaluation, TargetVerdict};
