// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Target existence checks

use crate::device::DeviceDriver;
use config::NodeRef;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use validator::TargetVerdict;

pub(crate) struct TargetChecker {
    device: Arc<dyn DeviceDriver>,
    timeout: Duration,
}

impl TargetChecker {
    pub(crate) fn new(device: Arc<dyn DeviceDriver>, timeout: Duration) -> Self {
        Self { device, timeout }
    }

    /// Tell if `node` exists. A check that does not complete in time counts as unreachable.
    pub(crate) async fn check(&self, node: &NodeRef) -> TargetVerdict {
        match tokio::time::timeout(self.timeout, self.device.exists(node)).await {
            Ok(true) => TargetVerdict::Found,
            Ok(false) => {
                debug!("Target {node} not found");
                TargetVerdict::NotFound
            }
            Err(_) => {
                warn!("Target check of {node} timed out after {:?}", self.timeout);
                TargetVerdict::Unreachable
            }
        }
    }
}
