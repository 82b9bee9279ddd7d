//! Watcher Implementation
//!
//! A Watcher is a side-effecting computation that re-runs whenever one of
//! the values it read last time changes.
//!
//! # How Watchers Work
//!
//! 1. When created, the watcher runs its body immediately to discover its
//!    dependencies, then subscribes to them.
//!
//! 2. Like a computed value it follows the two-phase protocol: it waits until
//!    every upstream that announced a batch has settled, and re-runs once if
//!    any of them changed.
//!
//! 3. Each run re-tracks dependencies, so a watcher that stops reading a
//!    value is unsubscribed from it.
//!
//! # Lifetime
//!
//! A watcher lives until `stop()` is called. Dropping the last handle does
//! not stop it, because the sources it observes keep it alive. Writes the
//! body makes to its own dependencies do not re-trigger it.

use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::observer::{Observer, ObserverId, SourceId};
use super::scope::{DepScope, Dependencies};

/// A side effect that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{Cell, Track, Watcher};
///
/// let count = Cell::new(0);
/// let watcher = Watcher::new({
///     let count = count.clone();
///     move |scope| {
///         let _ = scope.get(&count);
///     }
/// });
///
/// count.set(5);
/// assert_eq!(watcher.run_count(), 2);
/// watcher.stop();
/// ```
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

struct WatcherInner {
    observer_id: ObserverId,
    run: RefCell<Box<dyn FnMut(&mut DepScope)>>,
    dependencies: Dependencies,
    stopped: StdCell<bool>,
    running: StdCell<bool>,
    runs: StdCell<usize>,
    pending: StdCell<usize>,
    saw_change: StdCell<bool>,
    this: Weak<WatcherInner>,
}

impl Watcher {
    /// Create a watcher and run it once to establish its dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut(&mut DepScope) + 'static,
    {
        let watcher = Self::new_lazy(run);
        watcher.inner.execute();
        watcher
    }

    /// Create a watcher without running it.
    ///
    /// It has no dependencies until `execute` is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut(&mut DepScope) + 'static,
    {
        let inner = Rc::new_cyclic(|this| WatcherInner {
            observer_id: ObserverId::new(),
            run: RefCell::new(Box::new(run)),
            dependencies: Dependencies::default(),
            stopped: StdCell::new(false),
            running: StdCell::new(false),
            runs: StdCell::new(0),
            pending: StdCell::new(0),
            saw_change: StdCell::new(false),
            this: this.clone(),
        });
        Self { inner }
    }

    /// The watcher's observer identity.
    pub fn id(&self) -> ObserverId {
        self.inner.observer_id
    }

    /// Run the body now and re-track its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Stop the watcher: unsubscribe from everything and never run again.
    ///
    /// Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    /// Whether the watcher has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Number of sources the watcher is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.len()
    }
}

impl WatcherInner {
    fn execute(&self) {
        if self.stopped.get() || self.running.get() {
            return;
        }

        let mut scope = DepScope::new();
        self.running.set(true);
        {
            let mut run = self.run.borrow_mut();
            (*run)(&mut scope);
        }
        self.running.set(false);
        self.runs.set(self.runs.get() + 1);

        // Stopped from inside its own body.
        if self.stopped.get() {
            return;
        }

        if let Some(this) = self.this.upgrade() {
            self.dependencies.replace(scope, this);
        }
    }

    fn stop(&self) -> bool {
        if self.stopped.replace(true) {
            return false;
        }
        self.dependencies.clear(self.observer_id);
        self.pending.set(0);
        trace!(observer = %self.observer_id, runs = self.runs.get(), "watcher stopped");
        true
    }
}

impl Observer for WatcherInner {
    fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    fn will_update(&self, _source: SourceId) {
        if self.stopped.get() || self.running.get() {
            return;
        }

        let pending = self.pending.get() + 1;
        self.pending.set(pending);
        if pending == 1 {
            self.saw_change.set(false);
        }
    }

    fn update(&self, _source: SourceId, changed: bool) {
        let pending = self.pending.get();
        if pending == 0 {
            return;
        }

        self.pending.set(pending - 1);
        if changed {
            self.saw_change.set(true);
        }
        if pending == 1 && self.saw_change.get() {
            self.execute();
        }
    }
}

impl Clone for Watcher {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.observer_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
