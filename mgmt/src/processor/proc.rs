// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The configuration engine: admits resources into the graph and schedules their
//! evaluation and deletion as the graph changes.

use crate::device::DeviceDriver;
use crate::processor::client::{
    DeletionState, EngineChannelRequest, EngineClient, EngineError, EngineRequest, EngineResponse,
    EngineResponseChannel,
};
use crate::processor::deletion;
use crate::processor::eval::{self, ApplyTrack, WorkerCtx, WorkerOutcome, WorkerResult};
use crate::processor::params::EngineParams;
use crate::processor::sched::Scheduler;
use crate::processor::target::TargetChecker;
use chrono::Utc;
use config::{KindRegistry, ResourceInstance, ResourceKey};
use graph::{GraphError, GraphEvent, ResourceGraph};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// A graph corruption found while serving a request stops the engine
fn corruption(error: Option<&EngineError>) -> Option<EngineError> {
    error.filter(|e| matches!(e, EngineError::GraphCorruption(_))).cloned()
}

/// The most recently purged keys, oldest first
struct Tombstones {
    capacity: usize,
    order: VecDeque<ResourceKey>,
    keys: BTreeSet<ResourceKey>,
}
impl Tombstones {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            keys: BTreeSet::new(),
        }
    }
    fn insert(&mut self, key: ResourceKey) {
        if self.capacity == 0 || !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }
    fn remove(&mut self, key: &ResourceKey) {
        if self.keys.remove(key) {
            self.order.retain(|k| k != key);
        }
    }
    fn contains(&self, key: &ResourceKey) -> bool {
        self.keys.contains(key)
    }
}

/// The configuration engine
pub struct Engine {
    params: EngineParams,
    registry: KindRegistry,
    graph: Arc<ResourceGraph>,
    ctx: Arc<WorkerCtx>,
    rx: mpsc::Receiver<EngineChannelRequest>,
    events: broadcast::Receiver<GraphEvent>,
    sched: Scheduler,
    workers: JoinSet<WorkerOutcome>,
    tracks: BTreeMap<ResourceKey, ApplyTrack>,
    deletions: BTreeMap<ResourceKey, DeletionState>,
    removed: Tombstones,
    settle_waiters: Vec<EngineResponseChannel>,
}

impl Engine {
    /// Create an engine and a client to talk to it
    #[must_use]
    pub fn new(
        params: EngineParams,
        registry: KindRegistry,
        device: Arc<dyn DeviceDriver>,
    ) -> (Self, EngineClient) {
        debug!("Creating configuration engine\n{params}");
        let graph = Arc::new(ResourceGraph::new(params.event_queue));
        let events = graph.subscribe();
        let (tx, rx) = mpsc::channel(params.request_queue.max(1));
        let ctx = Arc::new(WorkerCtx {
            graph: graph.clone(),
            target: TargetChecker::new(device.clone(), params.target_timeout),
            device,
            params: params.clone(),
        });
        let removed = Tombstones::new(params.removed_retention);
        let engine = Self {
            params,
            registry,
            graph,
            ctx,
            rx,
            events,
            sched: Scheduler::new(),
            workers: JoinSet::new(),
            tracks: BTreeMap::new(),
            deletions: BTreeMap::new(),
            removed,
            settle_waiters: vec![],
        };
        (engine, EngineClient::new(tx))
    }

    /// The graph this engine works on
    #[must_use]
    pub fn graph(&self) -> Arc<ResourceGraph> {
        self.graph.clone()
    }

    fn parent_lookup(graph: &ResourceGraph) -> impl Fn(&ResourceKey) -> Option<ResourceKey> + '_ {
        move |key| graph.parent_of(key)
    }

    fn is_deleting(&self, key: &ResourceKey) -> bool {
        self.graph
            .inspect(key, ResourceInstance::is_deleting)
            .unwrap_or(false)
    }

    /// Schedule the targets a resource stopped referring to, if they wait for it
    fn enqueue_released(&mut self, released: Vec<ResourceKey>) {
        for target in released {
            if self.is_deleting(&target) {
                self.sched.enqueue(target);
            }
        }
    }

    fn enqueue_dependents(&mut self, key: &ResourceKey) {
        let dependents = self.graph.topological(self.graph.dependents(key));
        self.sched.enqueue_all(dependents);
    }

    /// Evaluate everything again, e.g. after missing graph events
    fn resync(&mut self) {
        let keys = self.graph.topological(self.graph.keys());
        info!("Resynchronizing {} resources", keys.len());
        self.sched.enqueue_all(keys);
    }

    fn on_event(&mut self, event: GraphEvent) {
        trace!("Handling event {event:?}");
        match event {
            GraphEvent::Upserted {
                key,
                created,
                released,
                ..
            } => {
                if created {
                    self.removed.remove(&key);
                }
                self.sched.enqueue(key.clone());
                self.enqueue_dependents(&key);
                self.enqueue_released(released);
            }
            GraphEvent::DeletionRequested { key } => {
                self.deletions.entry(key.clone()).or_insert(DeletionState::Deleting);
                self.sched.enqueue(key.clone());
                self.enqueue_dependents(&key);
            }
            GraphEvent::Removed {
                key,
                released,
                purged,
            } => {
                if purged {
                    // the worker that purged it reports the completion
                    self.removed.insert(key.clone());
                } else {
                    info!("{key} was removed: dropping its pending work");
                    self.sched.forget(&key);
                    self.tracks.remove(&key);
                    self.deletions.remove(&key);
                }
                self.enqueue_dependents(&key);
                self.enqueue_released(released);
                self.sched.release_parked(Self::parent_lookup(&self.graph));
            }
            GraphEvent::StatusChanged { key, ready_changed } => {
                if ready_changed {
                    self.enqueue_dependents(&key);
                }
            }
        }
    }

    /// Handle the graph events published so far
    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.on_event(event),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Missed {missed} graph events");
                    self.resync();
                }
            }
        }
    }

    fn spawn(&mut self, key: ResourceKey) {
        let Some(deleting) = self.graph.inspect(&key, ResourceInstance::is_deleting) else {
            trace!("{key} is gone: not evaluating");
            return;
        };
        let ticket = self.sched.take_ticket();
        let ctx = self.ctx.clone();
        let track = self.tracks.get(&key).cloned().unwrap_or_default();
        let task_key = key.clone();
        let abort = if deleting {
            // with no dependents left the worker goes on to retract it
            let state = if self.graph.dependents(&key).is_empty() {
                DeletionState::Finalizing
            } else {
                DeletionState::Deleting
            };
            self.deletions.insert(key.clone(), state);
            self.workers.spawn(async move {
                let result = deletion::advance(ctx, task_key.clone(), state, track).await;
                WorkerOutcome {
                    key: task_key,
                    ticket,
                    result,
                }
            })
        } else {
            self.workers.spawn(async move {
                let result = eval::evaluate(ctx, task_key.clone(), track).await;
                WorkerOutcome {
                    key: task_key,
                    ticket,
                    result,
                }
            })
        };
        trace!("Started worker {ticket} for {key}");
        self.sched.start(key, ticket, abort);
    }

    /// Start as many ready evaluations as the worker limit allows
    fn start_ready(&mut self) {
        loop {
            let next = self
                .sched
                .next_startable(self.params.max_workers, Self::parent_lookup(&self.graph));
            let Some(key) = next else {
                break;
            };
            self.spawn(key);
        }
        self.sched.release_parked(Self::parent_lookup(&self.graph));
    }

    fn on_worker_outcome(&mut self, outcome: WorkerOutcome) -> Result<(), EngineError> {
        let WorkerOutcome {
            key,
            ticket,
            result,
        } = outcome;
        let Some(dirty) = self.sched.finish(&key, ticket) else {
            trace!("Ignoring stale outcome {ticket} of {key}");
            return Ok(());
        };
        match result {
            Ok(WorkerResult::Evaluated { track, retry }) => {
                self.tracks.insert(key.clone(), track);
                if let Some(delay) = retry {
                    self.sched.schedule_retry(&key, delay);
                }
            }
            Ok(WorkerResult::Deletion {
                state: DeletionState::Removed,
                ..
            }) => {
                self.tracks.remove(&key);
                self.deletions.remove(&key);
                self.removed.insert(key.clone());
            }
            Ok(WorkerResult::Deletion {
                state,
                track,
                retry,
            }) => {
                self.tracks.insert(key.clone(), track);
                self.deletions.insert(key.clone(), state);
                if let Some(delay) = retry {
                    self.sched.schedule_retry(&key, delay);
                }
            }
            Ok(WorkerResult::Gone) => {}
            Err(GraphError::Corruption(msg)) => {
                error!("Resource graph corrupted while processing {key}: {msg}");
                return Err(EngineError::GraphCorruption(msg));
            }
            Err(e) => warn!("Processing of {key} failed: {e}"),
        }
        if dirty && self.graph.contains(&key) {
            self.sched.enqueue(key);
        }
        self.sched.release_parked(Self::parent_lookup(&self.graph));
        Ok(())
    }

    fn on_worker_failure(e: &JoinError) -> Result<(), EngineError> {
        if e.is_cancelled() {
            return Ok(());
        }
        error!("Evaluation worker failed: {e}");
        Err(EngineError::WorkerPanic(e.to_string()))
    }

    fn deletion_state(&self, key: &ResourceKey) -> Option<DeletionState> {
        match self.graph.inspect(key, ResourceInstance::is_deleting) {
            Some(false) => Some(DeletionState::Active),
            Some(true) => Some(
                self.deletions
                    .get(key)
                    .copied()
                    .unwrap_or(DeletionState::Deleting),
            ),
            None if self.removed.contains(key) => Some(DeletionState::Removed),
            None => None,
        }
    }

    fn upsert(&mut self, mut resource: ResourceInstance) -> Result<graph::UpsertOutcome, EngineError> {
        self.registry.admit(&mut resource).inspect_err(|e| {
            warn!("Refusing {}: {e}", resource.key);
        })?;
        if resource.finalizer.is_none() {
            resource.finalizer = Some(self.params.finalizer.clone());
        }
        Ok(self.graph.upsert(resource)?)
    }

    fn on_request(&mut self, request: EngineRequest, reply_tx: EngineResponseChannel) -> Result<(), EngineError> {
        let response = match request {
            EngineRequest::Upsert(resource) => {
                let result = self.upsert(*resource);
                let fatal = corruption(result.as_ref().err());
                let _ = reply_tx.send(EngineResponse::Upsert(result));
                return fatal.map_or(Ok(()), Err);
            }
            EngineRequest::Remove(key) => {
                let result = self
                    .graph
                    .remove(&key)
                    .map(|removed| removed.map(Box::new))
                    .map_err(EngineError::from);
                let fatal = corruption(result.as_ref().err());
                let _ = reply_tx.send(EngineResponse::Remove(result));
                return fatal.map_or(Ok(()), Err);
            }
            EngineRequest::RequestDeletion(key) => EngineResponse::RequestDeletion(
                self.graph
                    .request_deletion(&key, Utc::now())
                    .map_err(EngineError::from),
            ),
            EngineRequest::Get(key) => EngineResponse::Get(self.graph.get(&key).map(Box::new)),
            EngineRequest::Dependents(key) => EngineResponse::Dependents(self.graph.dependents(&key)),
            EngineRequest::Conditions(key) => {
                EngineResponse::Conditions(self.graph.inspect(&key, |r| r.conditions.clone()))
            }
            EngineRequest::DeletionState(key) => EngineResponse::DeletionState(self.deletion_state(&key)),
            EngineRequest::NotifyNode(node) => {
                let keys = self.graph.topological(self.graph.nodes_of(&node));
                info!("Node {node} changed: re-checking {} resources", keys.len());
                for key in &keys {
                    self.sched.cancel_retry(key);
                    if let Some(track) = self.tracks.get_mut(key) {
                        track.target_attempts = 0;
                    }
                }
                let count = keys.len();
                self.sched.enqueue_all(keys);
                EngineResponse::NotifyNode(count)
            }
            EngineRequest::Settle => {
                self.settle_waiters.push(reply_tx);
                return Ok(());
            }
        };
        if reply_tx.send(response).is_err() {
            debug!("Requester went away before the response was sent");
        }
        Ok(())
    }

    fn check_settled(&mut self) {
        if !self.settle_waiters.is_empty() && self.sched.is_settled() {
            trace!("Settled: notifying {} waiters", self.settle_waiters.len());
            for waiter in self.settle_waiters.drain(..) {
                let _ = waiter.send(EngineResponse::Settled);
            }
        }
    }

    /// Run the engine until every client is gone. Stops with an error if the graph
    /// gets corrupted or a worker panics.
    ///
    /// # Errors
    /// Returns the fatal error that stopped the engine.
    pub async fn run(mut self) -> Result<(), EngineError> {
        info!("Starting configuration engine");
        loop {
            self.drain_events();
            self.start_ready();
            self.check_settled();

            tokio::select! {
                request = self.rx.recv() => {
                    let Some(EngineChannelRequest { request, reply_tx }) = request else {
                        info!("All engine clients are gone. Stopping");
                        return Ok(());
                    };
                    self.on_request(request, reply_tx)?;
                }
                event = self.events.recv() => {
                    match event {
                        Ok(event) => self.on_event(event),
                        Err(RecvError::Lagged(missed)) => {
                            warn!("Missed {missed} graph events");
                            self.resync();
                        }
                        Err(RecvError::Closed) => {
                            error!("Graph event channel closed");
                            return Err(EngineError::Terminated);
                        }
                    }
                }
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    match joined {
                        Ok(outcome) => self.on_worker_outcome(outcome)?,
                        Err(e) => Self::on_worker_failure(&e)?,
                    }
                }
                Some(key) = std::future::poll_fn(|cx| self.sched.poll_retry(cx)), if self.sched.has_retries() => {
                    trace!("Retry of {key} is due");
                    self.sched.enqueue(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::memory::MemoryDevice;
    use config::NodeRef;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("Interface", name).unwrap()
    }

    #[test]
    fn test_tombstones_are_bounded() {
        let mut tombstones = Tombstones::new(2);
        tombstones.insert(key("eth-1"));
        tombstones.insert(key("eth-2"));
        tombstones.insert(key("eth-1"));
        assert!(tombstones.contains(&key("eth-1")));
        tombstones.insert(key("eth-3"));
        assert!(!tombstones.contains(&key("eth-1")));
        assert!(tombstones.contains(&key("eth-2")));
        assert!(tombstones.contains(&key("eth-3")));
        tombstones.remove(&key("eth-2"));
        assert_eq!(tombstones.order, VecDeque::from([key("eth-3")]));

        let mut none = Tombstones::new(0);
        none.insert(key("eth-1"));
        assert!(!none.contains(&key("eth-1")));
    }

    #[tokio::test]
    async fn test_graph_corruption_stops_engine() {
        let device = Arc::new(MemoryDevice::with_nodes(&["leaf1"]));
        let (mut engine, client) =
            Engine::new(EngineParams::default(), KindRegistry::builtin(), device);
        let eth1 = key("eth-1");
        engine
            .graph
            .upsert(ResourceInstance::new(
                eth1.clone(),
                NodeRef::new("leaf1").unwrap(),
                json!({}),
            ))
            .unwrap();

        // a worker that found the index out of step with the resources
        let ticket = engine.sched.take_ticket();
        let task_key = eth1.clone();
        let abort = engine.workers.spawn(async move {
            WorkerOutcome {
                key: task_key,
                ticket,
                result: Err(GraphError::Corruption("dangling edge".to_string())),
            }
        });
        engine.sched.start(eth1.clone(), ticket, abort);

        let result = engine.run().await;
        assert!(matches!(result, Err(EngineError::GraphCorruption(msg)) if msg == "dangling edge"));
        assert!(matches!(client.get(&eth1).await, Err(EngineError::Terminated)));
        assert!(matches!(client.settle().await, Err(EngineError::Terminated)));
    }
}
