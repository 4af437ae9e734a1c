// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Status conditions of configuration resources

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Display;
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/// The kinds of condition a resource reports
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString, IntoStaticStr,
    StrumDisplay,
)]
pub enum ConditionKind {
    TargetFound,
    InternalLeafrefValidationSuccess,
    ExternalLeafrefValidationSuccess,
    ParentValidationSuccess,
    Synced,
    Ready,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, IntoStaticStr, StrumDisplay)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Reasons attached to conditions
pub mod reason {
    pub const PENDING: &str = "Pending";
    pub const SUCCESS: &str = "Success";
    pub const NO_REFERENCES: &str = "NoReferences";
    pub const NO_PARENT: &str = "NoParent";
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";
    pub const TARGET_UNREACHABLE: &str = "TargetUnreachable";
    pub const LEAFREF_TARGET_NOT_FOUND: &str = "LeafrefTargetNotFound";
    pub const LEAFREF_TARGET_DELETING: &str = "LeafrefTargetDeleting";
    pub const LEAFREF_UNRESOLVED: &str = "LeafrefUnresolved";
    pub const PARENT_NOT_FOUND: &str = "ParentNotFound";
    pub const PARENT_DELETING: &str = "ParentDeleting";
    pub const PARENT_NOT_READY: &str = "ParentNotReady";
    pub const NOT_SYNCED: &str = "NotSynced";
    pub const APPLY_PENDING: &str = "ApplyPending";
    pub const APPLY_CONFLICT: &str = "ApplyConflict";
    pub const NOT_IN_SYNC: &str = "NotInSync";
    pub const DELETING: &str = "Deleting";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// The set of conditions of a resource, at most one per [`ConditionKind`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConditionSet(BTreeMap<ConditionKind, Condition>);
impl ConditionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set where every kind of condition is `Unknown`
    #[must_use]
    pub fn pending(now: DateTime<Utc>) -> Self {
        let mut set = Self::new();
        set.init_pending(now);
        set
    }

    /// Add an `Unknown` condition for every kind that is missing
    pub fn init_pending(&mut self, now: DateTime<Utc>) {
        for kind in ConditionKind::iter() {
            self.0.entry(kind).or_insert_with(|| Condition {
                kind,
                status: ConditionStatus::Unknown,
                reason: reason::PENDING.to_owned(),
                message: String::new(),
                last_transition_time: now,
            });
        }
    }

    /// Set a condition. Returns true if the condition transitioned, which happens if
    /// its status or its reason changed. Re-setting identical values leaves the
    /// transition time untouched, and the transition time never goes backwards.
    pub fn set(
        &mut self,
        kind: ConditionKind,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.0.get_mut(&kind) {
            Some(current) if current.status == status && current.reason == reason => {
                if current.message != message {
                    current.message = message.to_owned();
                }
                false
            }
            Some(current) => {
                current.last_transition_time = now.max(current.last_transition_time);
                current.status = status;
                current.reason = reason.to_owned();
                current.message = message.to_owned();
                true
            }
            None => {
                self.0.insert(
                    kind,
                    Condition {
                        kind,
                        status,
                        reason: reason.to_owned(),
                        message: message.to_owned(),
                        last_transition_time: now,
                    },
                );
                true
            }
        }
    }

    /// Insert a condition as-is, e.g. when restored from a persisted record
    pub fn restore(&mut self, condition: Condition) {
        self.0.insert(condition.kind, condition);
    }

    #[must_use]
    pub fn get(&self, kind: ConditionKind) -> Option<&Condition> {
        self.0.get(&kind)
    }

    #[must_use]
    pub fn status(&self, kind: ConditionKind) -> ConditionStatus {
        self.0
            .get(&kind)
            .map_or(ConditionStatus::Unknown, |c| c.status)
    }

    #[must_use]
    pub fn is_true(&self, kind: ConditionKind) -> bool {
        self.status(kind) == ConditionStatus::True
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

macro_rules! CONDITION_FMT {
    ($kind:expr, $status:expr, $reason:expr, $time:expr) => {
        format_args!(
            "   {:<34} {:<8} {:<22} {:<30}",
            $kind, $status, $reason, $time
        )
    };
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            CONDITION_FMT!(
                self.kind.to_string(),
                self.status.to_string(),
                self.reason,
                self.last_transition_time.to_rfc3339()
            )
        )?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}
impl Display for ConditionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " ━━━━━━━━━━ Conditions ━━━━━━━━━━")?;
        writeln!(
            f,
            "{}",
            CONDITION_FMT!("type", "status", "reason", "last-transition")
        )?;
        for condition in self.iter() {
            writeln!(f, "{condition}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_pending_set() {
        let set = ConditionSet::pending(t(0));
        assert_eq!(set.len(), 6);
        for condition in set.iter() {
            assert_eq!(condition.status, ConditionStatus::Unknown);
            assert_eq!(condition.reason, reason::PENDING);
        }
        println!("{set}");
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let mut set = ConditionSet::pending(t(0));
        assert!(set.set(ConditionKind::Synced, ConditionStatus::True, reason::SUCCESS, "", t(10)));
        let before = set.clone();

        // same values, later time: no transition
        assert!(!set.set(ConditionKind::Synced, ConditionStatus::True, reason::SUCCESS, "", t(20)));
        assert_eq!(set, before);

        // message only: no transition, message updated
        assert!(!set.set(ConditionKind::Synced, ConditionStatus::True, reason::SUCCESS, "all good", t(30)));
        let synced = set.get(ConditionKind::Synced).unwrap();
        assert_eq!(synced.last_transition_time, t(10));
        assert_eq!(synced.message, "all good");

        // reason change is a transition
        assert!(set.set(ConditionKind::Synced, ConditionStatus::False, reason::TARGET_NOT_FOUND, "", t(40)));
        assert_eq!(set.get(ConditionKind::Synced).unwrap().last_transition_time, t(40));
    }

    #[test]
    fn test_transition_time_is_monotonic() {
        let mut set = ConditionSet::pending(t(100));
        // clock went backwards
        assert!(set.set(ConditionKind::Ready, ConditionStatus::False, reason::NOT_SYNCED, "", t(50)));
        assert_eq!(set.get(ConditionKind::Ready).unwrap().last_transition_time, t(100));
    }

    #[test]
    fn test_transition_time_monotonic_fuzz() {
        bolero::check!()
            .with_type::<Vec<(u8, bool, i16)>>()
            .for_each(|steps| {
                let mut set = ConditionSet::pending(t(0));
                let mut last = t(0);
                for (reason_pick, status, skew) in steps {
                    let reason = if reason_pick % 2 == 0 { reason::SUCCESS } else { reason::PENDING };
                    let now = t(0) + Duration::seconds(i64::from(*skew));
                    set.set(ConditionKind::Ready, (*status).into(), reason, "", now);
                    let current = set.get(ConditionKind::Ready).unwrap().last_transition_time;
                    assert!(current >= last);
                    last = current;
                }
            });
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ConditionKind::InternalLeafrefValidationSuccess.to_string(), "InternalLeafrefValidationSuccess");
        assert_eq!(ConditionKind::from_str("ParentValidationSuccess").unwrap(), ConditionKind::ParentValidationSuccess);
        assert!(ConditionKind::from_str("Healthy").is_err());
        assert_eq!(ConditionStatus::from_str("False").unwrap(), ConditionStatus::False);
        assert_eq!(ConditionKind::iter().count(), 6);
    }
}
