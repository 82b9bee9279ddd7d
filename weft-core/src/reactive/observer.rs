//! Observer and source types for the reactive graph.
//!
//! A Source is any reactive value that can be read and observed (cells and
//! computed values). An Observer is anything that wants to hear about changes
//! to a source: computed values, watchers, and component render passes.
//!
//! Notification is two-phase. When a batch touches a source, the source first
//! calls `will_update` on each observer, and only once the batch settles does
//! it call `update` with whether its externally visible value changed. This
//! lets an observer that depends on several sources wait for all of them
//! before doing any work.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Unique identifier for a reactive source.
///
/// Sources are compared by identity, never by value. Two handles to the same
/// cell share one `SourceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Unique identifier for an observer.
///
/// Uses an atomic counter so IDs stay unique even if several threads each
/// run their own single-threaded graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// A listener attached to one or more sources.
pub trait Observer {
    /// The observer's identity. Subscriptions are keyed by it.
    fn observer_id(&self) -> ObserverId;

    /// A batch touching `source` has started.
    fn will_update(&self, source: SourceId);

    /// `source` has settled. `changed` is false when the batch left its
    /// visible value unchanged.
    fn update(&self, source: SourceId, changed: bool);
}

/// A reactive value that observers can subscribe to.
pub trait Source {
    /// The source's identity.
    fn source_id(&self) -> SourceId;

    /// Subscribe an observer. Adding an already subscribed observer is a no-op.
    fn add_observer(&self, observer: Rc<dyn Observer>);

    /// Unsubscribe an observer. Removing an unknown observer is a no-op.
    fn remove_observer(&self, observer: ObserverId);

    /// Number of observers currently subscribed.
    fn observer_count(&self) -> usize;
}

/// A typed handle that can be read and that exposes its underlying source.
pub trait Readable {
    /// The type returned by a read.
    type Value;

    /// The type-erased source behind this handle.
    fn source(&self) -> Rc<dyn Source>;

    /// Read the current value without recording a dependency.
    fn read_untracked(&self) -> Self::Value;
}

/// A tracking scope: anything that records which sources were read.
pub trait Track {
    /// Record that `source` was read in this scope.
    fn track(&mut self, source: Rc<dyn Source>);

    /// Read `value`, recording it as a dependency first.
    ///
    /// Tracking never changes the value returned.
    fn get<R>(&mut self, value: &R) -> R::Value
    where
        R: Readable + ?Sized,
        Self: Sized,
    {
        self.track(value.source());
        value.read_untracked()
    }
}

/// Snapshot of observers taken before delivering a notification.
pub(crate) type ObserverSnapshot = SmallVec<[Rc<dyn Observer>; 4]>;

/// The observer list embedded in every source.
///
/// Notifications are delivered to a snapshot, so observers may subscribe or
/// unsubscribe while a notification is in flight.
#[derive(Default)]
pub(crate) struct ObserverList {
    observers: RefCell<Vec<Rc<dyn Observer>>>,
}

impl ObserverList {
    /// Add an observer. Returns true if it was not already present.
    pub(crate) fn insert(&self, observer: Rc<dyn Observer>) -> bool {
        let id = observer.observer_id();
        let mut observers = self.observers.borrow_mut();
        if observers.iter().any(|o| o.observer_id() == id) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Remove an observer. Returns true if it was present.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|o| o.observer_id() != id);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    pub(crate) fn snapshot(&self) -> ObserverSnapshot {
        self.observers.borrow().iter().cloned().collect()
    }

    pub(crate) fn will_update(&self, source: SourceId) {
        for observer in self.snapshot() {
            observer.will_update(source);
        }
    }

    pub(crate) fn update(&self, source: SourceId, changed: bool) {
        for observer in self.snapshot() {
            observer.update(source, changed);
        }
    }
}
