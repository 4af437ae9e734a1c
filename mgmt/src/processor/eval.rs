// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Evaluation of one resource: validate its references, check its target, push it
//! to the device when everything is in place and commit the resulting conditions.

use crate::device::{DeviceDriver, DeviceError};
use crate::processor::client::DeletionState;
use crate::processor::params::EngineParams;
use crate::processor::target::TargetChecker;
use chrono::Utc;
use config::{NodeRef, ResourceInstance, ResourceKey};
use graph::{GraphError, ResourceGraph, StatusCommit};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use validator::{ApplyVerdict, Evaluation, TargetVerdict, resolve_leafrefs, validate_parent};

/// Shared by all workers
pub(crate) struct WorkerCtx {
    pub(crate) graph: Arc<ResourceGraph>,
    pub(crate) device: Arc<dyn DeviceDriver>,
    pub(crate) target: TargetChecker,
    pub(crate) params: EngineParams,
}

/// Per-resource memory of device interactions, kept across evaluations
#[derive(Clone, Debug)]
pub(crate) struct ApplyTrack {
    /// generation `verdict` refers to
    pub(crate) generation: i64,
    pub(crate) verdict: ApplyVerdict,
    pub(crate) target_attempts: u32,
    pub(crate) apply_attempts: u32,
    pub(crate) retract_attempts: u32,
    /// nodes that may hold some configuration of the resource
    pub(crate) placed: BTreeSet<NodeRef>,
}
impl Default for ApplyTrack {
    fn default() -> Self {
        Self {
            generation: 0,
            verdict: ApplyVerdict::NotAttempted,
            target_attempts: 0,
            apply_attempts: 0,
            retract_attempts: 0,
            placed: BTreeSet::new(),
        }
    }
}
impl ApplyTrack {
    pub(crate) fn verdict_for(&self, generation: i64) -> ApplyVerdict {
        if self.generation == generation {
            self.verdict.clone()
        } else {
            ApplyVerdict::NotAttempted
        }
    }

    /// A generation the device accepted, or refused, is not pushed again
    pub(crate) fn needs_apply(&self, generation: i64) -> bool {
        match self.verdict_for(generation) {
            ApplyVerdict::InSync | ApplyVerdict::Conflict(_) => false,
            ApplyVerdict::NotAttempted | ApplyVerdict::Pending(_) | ApplyVerdict::NotInSync => true,
        }
    }

    fn record(&mut self, generation: i64, verdict: ApplyVerdict) {
        self.generation = generation;
        self.verdict = verdict;
    }

    /// The nodes the resource was pushed to but no longer belongs on
    pub(crate) fn stale_nodes(&self, current: &NodeRef) -> Vec<NodeRef> {
        self.placed.iter().filter(|n| *n != current).cloned().collect()
    }
}

#[derive(Debug)]
pub(crate) enum WorkerResult {
    Evaluated {
        track: ApplyTrack,
        retry: Option<Duration>,
    },
    Deletion {
        state: DeletionState,
        track: ApplyTrack,
        retry: Option<Duration>,
    },
    /// the resource went away before it could be looked at
    Gone,
}

#[derive(Debug)]
pub(crate) struct WorkerOutcome {
    pub(crate) key: ResourceKey,
    pub(crate) ticket: u64,
    pub(crate) result: Result<WorkerResult, GraphError>,
}

fn earliest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn apply(
    ctx: &WorkerCtx,
    resource: &ResourceInstance,
    track: &mut ApplyTrack,
) -> (ApplyVerdict, Option<Value>) {
    let result = tokio::time::timeout(ctx.params.device_timeout, ctx.device.apply(resource))
        .await
        .unwrap_or(Err(DeviceError::Timeout));
    // a refusing or unreachable device holds nothing of it
    if !matches!(
        result,
        Err(DeviceError::Rejected(_) | DeviceError::Unreachable(_))
    ) {
        track.placed.insert(resource.node.clone());
    }
    match result {
        Ok(outcome) if outcome.in_sync => (ApplyVerdict::InSync, Some(outcome.observed)),
        Ok(outcome) => (ApplyVerdict::NotInSync, Some(outcome.observed)),
        Err(DeviceError::Rejected(reason)) => {
            warn!("Device refused {}: {reason}", resource.key);
            (ApplyVerdict::Conflict(reason), None)
        }
        Err(e) => {
            debug!("Applying {} failed: {e}", resource.key);
            (ApplyVerdict::Pending(e.to_string()), None)
        }
    }
}

/// Retract `key` from every node in `nodes`. The nodes it is gone from are no longer
/// tracked. Fails with the last error if any retraction failed.
pub(crate) async fn retract_from(
    ctx: &WorkerCtx,
    key: &ResourceKey,
    nodes: impl IntoIterator<Item = NodeRef>,
    track: &mut ApplyTrack,
) -> Result<(), DeviceError> {
    let mut failure = None;
    for node in nodes {
        let result = tokio::time::timeout(ctx.params.device_timeout, ctx.device.retract(key, &node))
            .await
            .unwrap_or(Err(DeviceError::Timeout));
        match result {
            Ok(()) => {
                track.placed.remove(&node);
            }
            Err(e) => {
                warn!("Failed to retract {key} from {node}: {e}");
                failure = Some(e);
            }
        }
    }
    failure.map_or(Ok(()), Err)
}

/// Check the references and the target of a resource
pub(crate) async fn assess(
    ctx: &WorkerCtx,
    resource: &ResourceInstance,
    apply: ApplyVerdict,
) -> Evaluation {
    // the target check runs while the graph-side checks are done
    let (target, (leafrefs, parent)) = tokio::join!(ctx.target.check(&resource.node), async {
        (
            resolve_leafrefs(resource, &ctx.graph),
            validate_parent(resource, &ctx.graph),
        )
    });
    Evaluation {
        target,
        leafrefs,
        parent,
        apply,
        deleting: resource.is_deleting(),
    }
}

/// Evaluate a resource that is not being deleted
#[instrument(level = "debug", skip_all, fields(key = %key))]
pub(crate) async fn evaluate(
    ctx: Arc<WorkerCtx>,
    key: ResourceKey,
    mut track: ApplyTrack,
) -> Result<WorkerResult, GraphError> {
    let Some(resource) = ctx.graph.get(&key) else {
        return Ok(WorkerResult::Gone);
    };
    let generation = resource.generation;

    let stale = track.stale_nodes(&resource.node);
    let stale_retry = if stale.is_empty() {
        None
    } else {
        debug!("Moved to {}: retracting from {} other nodes", resource.node, stale.len());
        if retract_from(&ctx, &key, stale, &mut track).await.is_ok() {
            track.retract_attempts = 0;
            None
        } else {
            let delay = ctx.params.retract_backoff.delay(track.retract_attempts);
            track.retract_attempts = track.retract_attempts.saturating_add(1);
            Some(delay)
        }
    };

    let mut eval = assess(&ctx, &resource, track.verdict_for(generation)).await;
    let target = eval.target;

    let mut observed = None;
    if eval.prerequisites_met() && track.needs_apply(generation) {
        let (verdict, applied) = apply(&ctx, &resource, &mut track).await;
        observed = applied;
        track.record(generation, verdict);
        eval.apply = track.verdict_for(generation);
    }

    let mut conditions = resource.conditions.clone();
    let transitions = eval.apply_to(&mut conditions, Utc::now());
    match ctx
        .graph
        .commit_status(&key, resource.resource_version, observed, conditions)
    {
        StatusCommit::Committed { ready_changed } => {
            debug!("Committed: {transitions} transitions, ready changed: {ready_changed}");
        }
        StatusCommit::Discarded => debug!("Evaluation superseded"),
    }

    let target_retry = if target == TargetVerdict::Found {
        track.target_attempts = 0;
        None
    } else {
        let delay = ctx.params.target_backoff.delay(track.target_attempts);
        track.target_attempts = track.target_attempts.saturating_add(1);
        Some(delay)
    };
    let apply_retry = match eval.apply {
        ApplyVerdict::Pending(_) | ApplyVerdict::NotInSync if eval.prerequisites_met() => {
            let delay = ctx.params.apply_backoff.delay(track.apply_attempts);
            track.apply_attempts = track.apply_attempts.saturating_add(1);
            Some(delay)
        }
        ApplyVerdict::InSync => {
            track.apply_attempts = 0;
            None
        }
        _ => None,
    };

    Ok(WorkerResult::Evaluated {
        retry: earliest(earliest(target_retry, apply_retry), stale_retry),
        track,
    })
}
