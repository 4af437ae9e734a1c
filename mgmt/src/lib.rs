// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device configuration management: the engine that validates configuration
//! resources, pushes them to their devices and orders their deletion.

pub mod device;
mod processor;

pub use device::memory::MemoryDevice;
pub use device::{ApplyOutcome, DeviceDriver, DeviceError};
pub use processor::client::{
    DeletionState, EngineChannelRequest, EngineClient, EngineError, EngineRequest, EngineResponse,
};
pub use processor::k8s_less::{K8sLessError, apply_file, record_status};
pub use processor::launch::{LaunchError, MgmtParams, start_engine};
pub use processor::params::{Backoff, EngineParams, EngineParamsBuilder};
pub use processor::proc::Engine;
