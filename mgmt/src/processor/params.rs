// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tunables of the configuration engine

use derive_builder::Builder;
use std::fmt::Display;
use std::time::Duration;

/// Exponential backoff: `initial * multiplier^attempt`, capped at `max`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}
impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}
impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// The delay before retry number `attempt` (starting at 0)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }
}
impl Display for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}..{:?} (x{})",
            self.initial, self.max, self.multiplier
        )
    }
}

/// Parameters of the configuration engine. Every field has a default.
#[derive(Builder, Clone, Debug)]
pub struct EngineParams {
    /// Max number of resources evaluated in parallel
    #[builder(default = 16)]
    pub max_workers: usize,

    /// Bound on a target existence check
    #[builder(default = Duration::from_secs(2))]
    pub target_timeout: Duration,

    /// Bound on a device apply or retract call
    #[builder(default = Duration::from_secs(10))]
    pub device_timeout: Duration,

    #[builder(default)]
    pub target_backoff: Backoff,

    #[builder(default)]
    pub apply_backoff: Backoff,

    #[builder(default)]
    pub retract_backoff: Backoff,

    /// Capacity of the request channel
    #[builder(default = 1024)]
    pub request_queue: usize,

    /// Capacity of the graph event channel
    #[builder(default = 4096)]
    pub event_queue: usize,

    /// Number of purged keys still reported as `Removed`
    #[builder(default = 1024)]
    pub removed_retention: usize,

    /// Finalizer token the engine adds to the resources it admits
    #[builder(setter(into), default = k8s_intf::FINALIZER.to_string())]
    pub finalizer: String,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            max_workers: 16,
            target_timeout: Duration::from_secs(2),
            device_timeout: Duration::from_secs(10),
            target_backoff: Backoff::default(),
            apply_backoff: Backoff::default(),
            retract_backoff: Backoff::default(),
            request_queue: 1024,
            event_queue: 4096,
            removed_retention: 1024,
            finalizer: k8s_intf::FINALIZER.to_string(),
        }
    }
}

impl Display for EngineParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Engine parameters")?;
        writeln!(f, "  workers         : {}", self.max_workers)?;
        writeln!(f, "  target timeout  : {:?}", self.target_timeout)?;
        writeln!(f, "  device timeout  : {:?}", self.device_timeout)?;
        writeln!(f, "  target backoff  : {}", self.target_backoff)?;
        writeln!(f, "  apply backoff   : {}", self.apply_backoff)?;
        writeln!(f, "  retract backoff : {}", self.retract_backoff)?;
        writeln!(f, "  request queue   : {}", self.request_queue)?;
        writeln!(f, "  event queue     : {}", self.event_queue)?;
        writeln!(f, "  removed kept    : {}", self.removed_retention)?;
        writeln!(f, "  finalizer       : {}", self.finalizer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backoff() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(20), Duration::from_secs(30));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_builder_defaults() {
        let params = EngineParamsBuilder::default()
            .max_workers(4_usize)
            .build()
            .unwrap();
        assert_eq!(params.max_workers, 4);
        assert_eq!(params.target_timeout, Duration::from_secs(2));
        assert_eq!(params.event_queue, 4096);
        assert_eq!(params.removed_retention, 1024);
        assert_eq!(params.finalizer, "config.devcfg.io/finalizer");
        assert_eq!(params.retract_backoff, Backoff::default());
        println!("{params}");
    }
}
