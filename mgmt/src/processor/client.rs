// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface to the configuration engine

use config::{ConditionSet, ModelError, NodeRef, ResourceInstance, ResourceKey};
use graph::{GraphError, UpsertOutcome};
use std::collections::BTreeSet;
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tokio::sync::oneshot::Receiver;

/// Where a resource is in its deletion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum DeletionState {
    Active,
    /// marked for deletion, waiting for its dependents to go away
    Deleting,
    /// no dependents left, being retracted from the device
    Finalizing,
    Removed,
}

/// A request type to the `Engine`
#[derive(Debug)]
pub enum EngineRequest {
    Upsert(Box<ResourceInstance>),
    Remove(ResourceKey),
    RequestDeletion(ResourceKey),
    Get(ResourceKey),
    Dependents(ResourceKey),
    Conditions(ResourceKey),
    DeletionState(ResourceKey),
    NotifyNode(NodeRef),
    Settle,
}

/// A response from the `Engine`
#[derive(Debug)]
pub enum EngineResponse {
    Upsert(Result<UpsertOutcome, EngineError>),
    Remove(Result<Option<Box<ResourceInstance>>, EngineError>),
    RequestDeletion(Result<bool, EngineError>),
    Get(Option<Box<ResourceInstance>>),
    Dependents(BTreeSet<ResourceKey>),
    Conditions(Option<ConditionSet>),
    DeletionState(Option<DeletionState>),
    NotifyNode(usize),
    Settled,
}
pub(crate) type EngineResponseChannel = oneshot::Sender<EngineResponse>;

/// A request to the `Engine` and the channel to send the response back
pub struct EngineChannelRequest {
    pub(crate) request: EngineRequest,
    pub(crate) reply_tx: EngineResponseChannel,
}
impl EngineChannelRequest {
    #[must_use]
    pub fn new(request: EngineRequest) -> (Self, Receiver<EngineResponse>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Self { request, reply_tx };
        (request, reply_rx)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("The engine is not running")]
    Terminated,
    #[error("Resource rejected: {0}")]
    Admission(GraphError),
    #[error("Resource {0} not found")]
    NotFound(ResourceKey),
    #[error("Resource graph corrupted: {0}")]
    GraphCorruption(String),
    #[error("Evaluation worker panicked: {0}")]
    WorkerPanic(String),
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::Admission(GraphError::Model(e))
    }
}
impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Corruption(msg) => EngineError::GraphCorruption(msg),
            GraphError::NotFound(key) => EngineError::NotFound(key),
            other => EngineError::Admission(other),
        }
    }
}

/// A cloneable object that allows sending requests to an `Engine`
#[derive(Clone)]
pub struct EngineClient {
    tx: Sender<EngineChannelRequest>,
}

impl EngineClient {
    #[must_use]
    pub fn new(channel_tx: Sender<EngineChannelRequest>) -> Self {
        Self { tx: channel_tx }
    }

    async fn request(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let (req, rx) = EngineChannelRequest::new(request);
        self.tx.send(req).await.map_err(|_| EngineError::Terminated)?;
        rx.await.map_err(|_| EngineError::Terminated)
    }

    /// Create or update a resource
    ///
    /// # Errors
    /// Fails if the engine is gone or if the resource is not admitted.
    pub async fn upsert(&self, resource: ResourceInstance) -> Result<UpsertOutcome, EngineError> {
        match self.request(EngineRequest::Upsert(Box::new(resource))).await? {
            EngineResponse::Upsert(result) => result,
            _ => unreachable!(),
        }
    }

    /// Drop a resource right away, bypassing its deletion
    ///
    /// # Errors
    /// Fails if the engine is gone.
    pub async fn remove(&self, key: &ResourceKey) -> Result<Option<ResourceInstance>, EngineError> {
        match self.request(EngineRequest::Remove(key.clone())).await? {
            EngineResponse::Remove(result) => result.map(|r| r.map(|r| *r)),
            _ => unreachable!(),
        }
    }

    /// Mark a resource for deletion. Returns false if it already was.
    ///
    /// # Errors
    /// Fails if the engine is gone or the resource does not exist.
    pub async fn request_deletion(&self, key: &ResourceKey) -> Result<bool, EngineError> {
        match self.request(EngineRequest::RequestDeletion(key.clone())).await? {
            EngineResponse::RequestDeletion(result) => result,
            _ => unreachable!(),
        }
    }

    /// Get a resource
    ///
    /// # Errors
    /// Fails if the engine is gone or the resource does not exist.
    pub async fn get(&self, key: &ResourceKey) -> Result<ResourceInstance, EngineError> {
        match self.request(EngineRequest::Get(key.clone())).await? {
            EngineResponse::Get(resource) => resource
                .map(|r| *r)
                .ok_or_else(|| EngineError::NotFound(key.clone())),
            _ => unreachable!(),
        }
    }

    /// The resources referring to a key
    ///
    /// # Errors
    /// Fails if the engine is gone.
    pub async fn dependents(&self, key: &ResourceKey) -> Result<BTreeSet<ResourceKey>, EngineError> {
        match self.request(EngineRequest::Dependents(key.clone())).await? {
            EngineResponse::Dependents(dependents) => Ok(dependents),
            _ => unreachable!(),
        }
    }

    /// The current conditions of a resource
    ///
    /// # Errors
    /// Fails if the engine is gone or the resource does not exist.
    pub async fn conditions(&self, key: &ResourceKey) -> Result<ConditionSet, EngineError> {
        match self.request(EngineRequest::Conditions(key.clone())).await? {
            EngineResponse::Conditions(conditions) => {
                conditions.ok_or_else(|| EngineError::NotFound(key.clone()))
            }
            _ => unreachable!(),
        }
    }

    /// Where a resource is in its deletion. A resource the engine does not know
    /// about, and never removed, is not found.
    ///
    /// # Errors
    /// Fails if the engine is gone or the resource is unknown.
    pub async fn deletion_state(&self, key: &ResourceKey) -> Result<DeletionState, EngineError> {
        match self.request(EngineRequest::DeletionState(key.clone())).await? {
            EngineResponse::DeletionState(state) => {
                state.ok_or_else(|| EngineError::NotFound(key.clone()))
            }
            _ => unreachable!(),
        }
    }

    /// Re-check the target of every resource on a node. Returns the number of
    /// resources scheduled.
    ///
    /// # Errors
    /// Fails if the engine is gone.
    pub async fn notify_node(&self, node: &NodeRef) -> Result<usize, EngineError> {
        match self.request(EngineRequest::NotifyNode(node.clone())).await? {
            EngineResponse::NotifyNode(count) => Ok(count),
            _ => unreachable!(),
        }
    }

    /// Wait until nothing is queued or being evaluated. Pending retries don't count.
    ///
    /// # Errors
    /// Fails if the engine is gone.
    pub async fn settle(&self) -> Result<(), EngineError> {
        match self.request(EngineRequest::Settle).await? {
            EngineResponse::Settled => Ok(()),
            _ => unreachable!(),
        }
    }
}
