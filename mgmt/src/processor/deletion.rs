// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ordered deletion of resources.
//!
//! A resource marked for deletion stays `Deleting` while anything refers to it. Once
//! nothing does, it is retracted from every node it was pushed to (`Finalizing`) and
//! purged from the graph (`Removed`). The purge re-checks the dependents atomically;
//! if one showed up in the meantime the resource goes back to `Deleting`.

use crate::processor::client::DeletionState;
use crate::processor::eval::{ApplyTrack, WorkerCtx, WorkerResult, assess, retract_from};
use chrono::Utc;
use config::ResourceKey;
use graph::{GraphError, PurgeOutcome};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[instrument(level = "debug", skip_all, fields(key = %key, state = %state))]
pub(crate) async fn advance(
    ctx: Arc<WorkerCtx>,
    key: ResourceKey,
    state: DeletionState,
    mut track: ApplyTrack,
) -> Result<WorkerResult, GraphError> {
    let Some(resource) = ctx.graph.get(&key) else {
        return Ok(WorkerResult::Gone);
    };
    if !resource.is_deleting() {
        return Ok(WorkerResult::Deletion {
            state: DeletionState::Active,
            track,
            retry: None,
        });
    }

    // references keep being reported while the deletion waits
    let eval = assess(&ctx, &resource, track.verdict_for(resource.generation)).await;
    let mut conditions = resource.conditions.clone();
    eval.apply_to(&mut conditions, Utc::now());
    ctx.graph
        .commit_status(&key, resource.resource_version, None, conditions);

    let dependents = ctx.graph.dependents(&key);
    if !dependents.is_empty() {
        debug!("Waiting for {} dependents to go away", dependents.len());
        return Ok(WorkerResult::Deletion {
            state: DeletionState::Deleting,
            track,
            retry: None,
        });
    }

    let mut nodes = track.placed.clone();
    nodes.insert(resource.node.clone());
    debug!("No dependents left: retracting from {} nodes", nodes.len());
    if let Err(e) = retract_from(&ctx, &key, nodes, &mut track).await {
        let delay = ctx.params.retract_backoff.delay(track.retract_attempts);
        track.retract_attempts = track.retract_attempts.saturating_add(1);
        warn!("Failed to retract {key}: {e}. Will retry in {delay:?}");
        return Ok(WorkerResult::Deletion {
            state: DeletionState::Finalizing,
            track,
            retry: Some(delay),
        });
    }
    track.retract_attempts = 0;

    match ctx.graph.purge_if_unreferenced(&key)? {
        PurgeOutcome::Purged(_) => {
            info!("Deletion of {key} completed");
            Ok(WorkerResult::Deletion {
                state: DeletionState::Removed,
                track,
                retry: None,
            })
        }
        PurgeOutcome::Blocked(dependents) => {
            info!(
                "Deletion of {key} blocked by {} new dependents",
                dependents.len()
            );
            Ok(WorkerResult::Deletion {
                state: DeletionState::Deleting,
                track,
                retry: None,
            })
        }
        PurgeOutcome::NotFound => Ok(WorkerResult::Gone),
    }
}
