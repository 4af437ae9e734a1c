// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration resource model

pub mod condition;
pub mod key;
pub mod leafref;
pub mod resource;
