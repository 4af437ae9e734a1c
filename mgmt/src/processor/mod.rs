// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device configuration engine.
//! This module implements the scheduling of resource evaluations and deletions.

pub(crate) mod client;
mod deletion;
mod eval;
pub(crate) mod k8s_less;
pub(crate) mod launch;
pub(crate) mod params;
pub(crate) mod proc;
mod sched;
mod target;
