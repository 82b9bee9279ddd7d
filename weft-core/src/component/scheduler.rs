//! Rebuild Scheduler
//!
//! The scheduler collects components whose dependencies changed and rebuilds
//! them when the host asks for the next frame.
//!
//! # Algorithm
//!
//! 1. A component observer that sees a settled change marks its component
//!    dirty. The first time a component becomes dirty it is queued; further
//!    requests while it is dirty are absorbed.
//! 2. `flush` drains the queue into a round and re-runs the render pass of
//!    each queued component that is still mounted and still dirty, checked
//!    immediately before the pass.
//!    If a pass panics, the rest of the round is put back in the queue.
//! 3. A pass may dirty other components (or its own). Those are queued for
//!    the next round. Flushing stops when a round leaves the queue empty, or
//!    fails with `EngineError::RebuildLoop` once `max_flush_rounds` rounds
//!    have run.
//!
//! Targets are held weakly, so a queued component that is dropped before
//! the flush is skipped.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::observer::RebuildTarget;
use super::InstanceId;
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError};

/// A render failure that happened during a flush.
///
/// `error` is the component's own error, boxed. Downcast it to recover the
/// concrete type.
pub struct RenderFailure {
    pub instance: InstanceId,
    pub error: Box<dyn std::error::Error>,
}

impl fmt::Debug for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderFailure")
            .field("instance", &self.instance)
            .field("error", &self.error.to_string())
            .finish()
    }
}

/// Outcome of one flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Rounds run.
    pub rounds: usize,
    /// Render passes that completed.
    pub rebuilt: usize,
    /// Render passes whose body returned an error.
    pub failures: Vec<RenderFailure>,
}

/// The frame queue shared by every component mounted on it.
///
/// Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

struct SchedulerInner {
    config: EngineConfig,
    queue: RefCell<VecDeque<Weak<dyn RebuildTarget>>>,
    flushes: StdCell<u64>,
}

impl Scheduler {
    /// Create a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(EngineConfig::default())
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: EngineConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                config,
                queue: RefCell::new(VecDeque::new()),
                flushes: StdCell::new(0),
            }),
        }
    }

    /// The configuration shared by components on this scheduler.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Number of queued rebuilds.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Number of completed `flush` calls.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    pub(crate) fn enqueue(&self, target: Weak<dyn RebuildTarget>) {
        self.inner.queue.borrow_mut().push_back(target);
    }

    /// Rebuild every queued component, round after round, until no
    /// component is dirty.
    pub fn flush(&self) -> Result<FlushReport, EngineError> {
        let max_rounds = self.inner.config.max_flush_rounds;
        let mut report = FlushReport::default();

        loop {
            let pending = mem::take(&mut *self.inner.queue.borrow_mut());
            if pending.is_empty() {
                break;
            }

            if report.rounds == max_rounds {
                // Keep the work queued so a later flush can continue.
                *self.inner.queue.borrow_mut() = pending;
                warn!(rounds = report.rounds, "rebuilds did not settle");
                return Err(EngineError::RebuildLoop {
                    rounds: report.rounds,
                });
            }
            report.rounds += 1;

            let mut round = Round {
                queue: &self.inner.queue,
                rest: pending,
            };
            while let Some(target) = round.rest.pop_front() {
                let Some(target) = target.upgrade() else {
                    continue;
                };

                match target.run_scheduled() {
                    None => {}
                    Some(Ok(())) => report.rebuilt += 1,
                    Some(Err(error)) => {
                        let instance = target.instance_id();
                        warn!(%instance, %error, "scheduled rebuild failed");
                        report.failures.push(RenderFailure { instance, error });
                    }
                }
            }
        }

        self.inner.flushes.set(self.inner.flushes.get() + 1);
        debug!(
            rounds = report.rounds,
            rebuilt = report.rebuilt,
            failures = report.failures.len(),
            "flush complete"
        );
        Ok(report)
    }
}

/// The targets of one flush round that have not run yet.
///
/// If a pass panics, the rest of the round goes back to the front of the
/// queue. Those targets are still dirty and would otherwise never be queued
/// again.
struct Round<'a> {
    queue: &'a RefCell<VecDeque<Weak<dyn RebuildTarget>>>,
    rest: VecDeque<Weak<dyn RebuildTarget>>,
}

impl Drop for Round<'_> {
    fn drop(&mut self) {
        if self.rest.is_empty() {
            return;
        }
        let Ok(mut queue) = self.queue.try_borrow_mut() else {
            return;
        };
        for target in self.rest.drain(..).rev() {
            queue.push_front(target);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}
