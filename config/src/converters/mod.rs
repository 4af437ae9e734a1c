// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conversions between persisted records and the configuration model

pub mod k8s;
