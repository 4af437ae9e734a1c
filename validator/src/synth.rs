// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Synthesis of the status conditions of a resource from the outcome of one
//! evaluation pass. A pass sets every condition exactly once.

use crate::leafref::{LeafrefReport, ScopeVerdict};
use crate::parent::ParentVerdict;
use chrono::{DateTime, Utc};
use config::{ConditionKind, ConditionSet, ConditionStatus, reason};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetVerdict {
    Found,
    NotFound,
    /// the check did not complete in time
    Unreachable,
}

/// What the device reported for the current generation of a resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyVerdict {
    NotAttempted,
    /// transient failure, will be retried
    Pending(String),
    InSync,
    NotInSync,
    /// the device refused the configuration
    Conflict(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub target: TargetVerdict,
    pub leafrefs: LeafrefReport,
    pub parent: ParentVerdict,
    pub apply: ApplyVerdict,
    pub deleting: bool,
}

fn scope_condition(verdict: &ScopeVerdict) -> (ConditionStatus, &'static str, String) {
    (
        verdict.resolved().into(),
        verdict.reason(),
        verdict.message(),
    )
}

impl Evaluation {
    #[must_use]
    pub fn synced(&self) -> bool {
        self.leafrefs.resolved() && self.target == TargetVerdict::Found
    }

    /// Tell if the resource may be pushed to the device
    #[must_use]
    pub fn prerequisites_met(&self) -> bool {
        !self.deleting && self.synced() && self.parent.is_valid()
    }

    fn target_condition(&self) -> (ConditionStatus, &'static str, String) {
        match self.target {
            TargetVerdict::Found => (ConditionStatus::True, reason::SUCCESS, String::new()),
            TargetVerdict::NotFound => (ConditionStatus::False, reason::TARGET_NOT_FOUND, String::new()),
            TargetVerdict::Unreachable => (
                ConditionStatus::False,
                reason::TARGET_UNREACHABLE,
                "target check timed out".to_string(),
            ),
        }
    }

    fn synced_condition(&self) -> (ConditionStatus, &'static str, String) {
        if !self.leafrefs.resolved() {
            let message = self
                .leafrefs
                .failures()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            (ConditionStatus::False, reason::LEAFREF_UNRESOLVED, message)
        } else if self.target != TargetVerdict::Found {
            (ConditionStatus::False, reason::TARGET_NOT_FOUND, String::new())
        } else {
            (ConditionStatus::True, reason::SUCCESS, String::new())
        }
    }

    fn ready_condition(&self) -> (ConditionStatus, &'static str, String) {
        let not_ready = |reason: &'static str, message: String| (ConditionStatus::False, reason, message);
        if self.deleting {
            return not_ready(reason::DELETING, String::new());
        }
        if !self.synced() {
            return not_ready(reason::NOT_SYNCED, String::new());
        }
        if !self.parent.is_valid() {
            return not_ready(reason::PARENT_NOT_READY, self.parent.message());
        }
        match &self.apply {
            ApplyVerdict::NotAttempted => not_ready(reason::APPLY_PENDING, String::new()),
            ApplyVerdict::Pending(msg) => not_ready(reason::APPLY_PENDING, msg.clone()),
            ApplyVerdict::Conflict(msg) => not_ready(reason::APPLY_CONFLICT, msg.clone()),
            ApplyVerdict::NotInSync => not_ready(reason::NOT_IN_SYNC, String::new()),
            ApplyVerdict::InSync => (ConditionStatus::True, reason::SUCCESS, String::new()),
        }
    }

    /// Write the conditions of this evaluation. Returns the number of transitions.
    pub fn apply_to(&self, conditions: &mut ConditionSet, now: DateTime<Utc>) -> usize {
        let values = [
            (ConditionKind::TargetFound, self.target_condition()),
            (
                ConditionKind::InternalLeafrefValidationSuccess,
                scope_condition(&self.leafrefs.internal),
            ),
            (
                ConditionKind::ExternalLeafrefValidationSuccess,
                scope_condition(&self.leafrefs.external),
            ),
            (
                ConditionKind::ParentValidationSuccess,
                (self.parent.is_valid().into(), self.parent.reason(), self.parent.message()),
            ),
            (ConditionKind::Synced, self.synced_condition()),
            (ConditionKind::Ready, self.ready_condition()),
        ];
        let mut transitions = 0;
        for (kind, (status, reason, message)) in values {
            if conditions.set(kind, status, reason, &message, now) {
                debug!("{kind} -> {status} ({reason})");
                transitions += 1;
            }
        }
        transitions
    }
}
