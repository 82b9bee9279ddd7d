//! Component observers.
//!
//! Every mounted component owns two observers:
//!
//! - a `ComponentObserver`, subscribed to the values its last render pass
//!   read, which turns settled batches into rebuild requests;
//! - a `HoldObserver`, subscribed to the component's own local state, which
//!   never reacts. Its only job is to keep that state observed (and so
//!   active) for as long as the component is mounted, whether or not the
//!   current pass reads it.

use std::cell::Cell as StdCell;
use std::rc::Weak;

use tracing::trace;

use super::InstanceId;
use crate::reactive::{Observer, ObserverId, SourceId};

/// Something that can be rebuilt by the scheduler.
pub(crate) trait RebuildTarget {
    /// The component instance behind this target.
    fn instance_id(&self) -> InstanceId;

    /// Mark dirty and queue a rebuild. No-op once unmounted.
    fn request_rebuild(&self);

    /// Run a queued rebuild. Returns `None` if there was nothing to do
    /// because the target was unmounted or is no longer dirty.
    fn run_scheduled(&self) -> Option<Result<(), Box<dyn std::error::Error>>>;
}

/// Where a component observer is in the two-phase protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    /// No batch in flight.
    Idle,

    /// At least one dependency announced a batch; the outcome is pending.
    Updating,

    /// A batch settled without a change, but another dependency of the same
    /// batch may still report one. The next `update` decides.
    AwaitingChange,
}

/// Turns batches on a component's dependencies into at most one rebuild.
pub(crate) struct ComponentObserver {
    id: ObserverId,
    owner: InstanceId,
    phase: StdCell<ObserverPhase>,
    requests: StdCell<u64>,
    target: Weak<dyn RebuildTarget>,
}

impl ComponentObserver {
    pub(crate) fn new(owner: InstanceId, target: Weak<dyn RebuildTarget>) -> Self {
        Self {
            id: ObserverId::new(),
            owner,
            phase: StdCell::new(ObserverPhase::Idle),
            requests: StdCell::new(0),
            target,
        }
    }

    pub(crate) fn phase(&self) -> ObserverPhase {
        self.phase.get()
    }

    /// Number of rebuilds this observer has requested.
    pub(crate) fn requests(&self) -> u64 {
        self.requests.get()
    }
}

impl Observer for ComponentObserver {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn will_update(&self, source: SourceId) {
        if self.phase.get() != ObserverPhase::Updating {
            trace!(instance = %self.owner, %source, "dependency batch started");
            self.phase.set(ObserverPhase::Updating);
        }
    }

    fn update(&self, source: SourceId, changed: bool) {
        if self.phase.get() == ObserverPhase::Idle {
            return;
        }

        if !changed {
            self.phase.set(ObserverPhase::AwaitingChange);
            return;
        }

        self.phase.set(ObserverPhase::Idle);
        self.requests.set(self.requests.get() + 1);
        trace!(instance = %self.owner, %source, "dependency changed, requesting rebuild");

        if let Some(target) = self.target.upgrade() {
            target.request_rebuild();
        }
    }
}

/// Keeps local state observed without ever reacting to it.
pub(crate) struct HoldObserver {
    id: ObserverId,
}

impl HoldObserver {
    pub(crate) fn new() -> Self {
        Self {
            id: ObserverId::new(),
        }
    }
}

impl Observer for HoldObserver {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn will_update(&self, _source: SourceId) {}

    fn update(&self, _source: SourceId, _changed: bool) {}
}
