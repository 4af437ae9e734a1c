// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bookkeeping of which resources need evaluation and when.
//!
//! A key is in at most one of `queue`, `parked` and `in_flight`. `dirty` keys are
//! in flight and get queued again once their evaluation completes.

use config::ResourceKey;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::trace;

struct InFlight {
    ticket: u64,
    abort: AbortHandle,
}

#[derive(Default)]
pub(crate) struct Scheduler {
    queue: VecDeque<ResourceKey>,
    queued: BTreeSet<ResourceKey>,
    in_flight: BTreeMap<ResourceKey, InFlight>,
    dirty: BTreeSet<ResourceKey>,
    parked: BTreeSet<ResourceKey>,
    delayed: DelayQueue<ResourceKey>,
    delay_keys: BTreeMap<ResourceKey, delay_queue::Key>,
    next_ticket: u64,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Ask for an evaluation of `key`
    pub(crate) fn enqueue(&mut self, key: ResourceKey) {
        if self.in_flight.contains_key(&key) {
            trace!("{key} is in flight: marking dirty");
            self.dirty.insert(key);
        } else if !self.queued.contains(&key) && !self.parked.contains(&key) {
            self.queued.insert(key.clone());
            self.queue.push_back(key);
        }
    }

    pub(crate) fn enqueue_all(&mut self, keys: impl IntoIterator<Item = ResourceKey>) {
        for key in keys {
            self.enqueue(key);
        }
    }

    /// A key waiting or running. Children of a busy key must wait for it.
    fn is_busy(&self, key: &ResourceKey) -> bool {
        self.queued.contains(key) || self.in_flight.contains_key(key) || self.parked.contains(key)
    }

    /// Pop the next key that can be evaluated now. Keys whose parent is busy are
    /// parked until the parent completes.
    pub(crate) fn next_startable(
        &mut self,
        max_workers: usize,
        parent_of: impl Fn(&ResourceKey) -> Option<ResourceKey>,
    ) -> Option<ResourceKey> {
        if self.in_flight.len() >= max_workers {
            return None;
        }
        while let Some(key) = self.queue.pop_front() {
            self.queued.remove(&key);
            if let Some(parent) = parent_of(&key)
                && self.is_busy(&parent)
            {
                trace!("Parking {key} until {parent} completes");
                self.parked.insert(key);
                continue;
            }
            return Some(key);
        }
        None
    }

    pub(crate) fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    pub(crate) fn start(&mut self, key: ResourceKey, ticket: u64, abort: AbortHandle) {
        self.cancel_retry(&key);
        self.in_flight.insert(key, InFlight { ticket, abort });
    }

    /// Complete the evaluation of a key. Returns `None` if `ticket` is stale, or
    /// whether the key got dirty while in flight.
    pub(crate) fn finish(&mut self, key: &ResourceKey, ticket: u64) -> Option<bool> {
        match self.in_flight.get(key) {
            Some(current) if current.ticket == ticket => {
                self.in_flight.remove(key);
                Some(self.dirty.remove(key))
            }
            _ => None,
        }
    }

    /// Forget a key altogether, aborting its evaluation if any
    pub(crate) fn forget(&mut self, key: &ResourceKey) {
        if let Some(current) = self.in_flight.remove(key) {
            trace!("Aborting evaluation of {key}");
            current.abort.abort();
        }
        self.dirty.remove(key);
        self.parked.remove(key);
        if self.queued.remove(key) {
            self.queue.retain(|k| k != key);
        }
        self.cancel_retry(key);
    }

    /// Requeue the parked keys whose parent is no longer busy
    pub(crate) fn release_parked(&mut self, parent_of: impl Fn(&ResourceKey) -> Option<ResourceKey>) {
        let releasable: Vec<_> = self
            .parked
            .iter()
            .filter(|key| {
                parent_of(key).is_none_or(|parent| {
                    !self.queued.contains(&parent)
                        && !self.in_flight.contains_key(&parent)
                        && !self.parked.contains(&parent)
                })
            })
            .cloned()
            .collect();
        for key in releasable {
            self.parked.remove(&key);
            self.enqueue(key);
        }
    }

    /// Evaluate `key` again after `delay`. An earlier retry of the same key is replaced.
    pub(crate) fn schedule_retry(&mut self, key: &ResourceKey, delay: Duration) {
        trace!("Retrying {key} in {delay:?}");
        if let Some(timer) = self.delay_keys.get(key) {
            self.delayed.reset(timer, delay);
        } else {
            let timer = self.delayed.insert(key.clone(), delay);
            self.delay_keys.insert(key.clone(), timer);
        }
    }

    pub(crate) fn cancel_retry(&mut self, key: &ResourceKey) {
        if let Some(timer) = self.delay_keys.remove(key) {
            self.delayed.remove(&timer);
        }
    }

    pub(crate) fn has_retries(&self) -> bool {
        !self.delayed.is_empty()
    }

    pub(crate) fn poll_retry(&mut self, cx: &mut Context<'_>) -> Poll<Option<ResourceKey>> {
        match self.delayed.poll_expired(cx) {
            Poll::Ready(Some(expired)) => {
                let key = expired.into_inner();
                self.delay_keys.remove(&key);
                Poll::Ready(Some(key))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Nothing queued, parked or in flight
    pub(crate) fn is_settled(&self) -> bool {
        self.queue.is_empty() && self.parked.is_empty() && self.in_flight.is_empty()
    }
}
