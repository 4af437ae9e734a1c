// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The resource graph: the store of configuration resources, the reverse index of
//! the references among them and the stream of changes to both.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod errors;
mod events;
mod graph;
mod index;

pub use errors::GraphError;
pub use events::GraphEvent;
pub use graph::{PurgeOutcome, ResourceGraph, StatusCommit, UpsertOutcome};
