// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Launch of the configuration engine on its own thread

use crate::device::DeviceDriver;
use crate::processor::client::{EngineClient, EngineError};
use crate::processor::params::EngineParams;
use crate::processor::proc::Engine;
use config::KindRegistry;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Configuration engine failed: {0}")]
    Engine(#[from] EngineError),
}

pub struct MgmtParams {
    pub engine: EngineParams,
    pub registry: KindRegistry,
    pub device: Arc<dyn DeviceDriver>,
}

/// Start the configuration engine in a thread of its own. The engine runs until
/// every clone of the returned client is dropped.
///
/// # Errors
/// Fails if the thread cannot be spawned.
pub fn start_engine(
    params: MgmtParams,
) -> Result<(std::thread::JoinHandle<Result<(), LaunchError>>, EngineClient), std::io::Error> {
    let (engine, client) = Engine::new(params.engine, params.registry, params.device);
    let handle = std::thread::Builder::new()
        .name("mgmt".to_string())
        .spawn(move || {
            debug!("Starting configuration engine thread");

            /* create tokio runtime */
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| {
                    error!("Tokio runtime creation failed: {e}");
                    LaunchError::IoError(e)
                })?;

            rt.block_on(engine.run()).inspect_err(|e| {
                error!("Configuration engine stopped: {e}");
            })?;
            info!("Configuration engine thread exiting");
            Ok(())
        })?;
    Ok((handle, client))
}
