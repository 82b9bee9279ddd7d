//! Computed Implementation
//!
//! A Computed is a cached derived value whose dependencies are discovered
//! while it runs.
//!
//! # How Computed Values Work
//!
//! 1. While nobody observes it, a computed value is inactive: every read runs
//!    the computation and nothing is cached or subscribed upstream.
//!
//! 2. The first observer activates it. The computation runs once, the result
//!    is cached, and the computed value subscribes itself to every source
//!    the computation read.
//!
//! 3. As an observer, it counts the `will_update` signals it receives and
//!    forwards a single `will_update` downstream. When every pending upstream
//!    has settled it recomputes, but only if some upstream actually changed,
//!    and forwards `update` with whether its own value changed.
//!
//! 4. Removing the last observer deactivates it again: upstream
//!    subscriptions and the cached value are dropped.
//!
//! Step 3 is what lets a component that reads `a + b` rebuild once when a
//! batch sets both `a` and `b`, and never see `a` updated without `b`.

use std::cell::{Cell as StdCell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::trace;

use super::observer::{Observer, ObserverId, ObserverList, Readable, Source, SourceId};
use super::scope::{DepScope, Dependencies};

/// Cache state of a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up to date.
    Clean,

    /// An upstream batch is in flight. The cached value is the last settled one.
    MaybeDirty,

    /// No valid cached value. Inactive computed values stay here.
    Dirty,
}

/// A cached derived value that recomputes only when a dependency changed.
///
/// The PartialEq bound is needed to tell observers whether a recompute
/// actually produced a different value.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{Cell, Computed, Track};
///
/// let a = Cell::new(2);
/// let doubled = Computed::new({
///     let a = a.clone();
///     move |scope| scope.get(&a) * 2
/// });
/// assert_eq!(doubled.get_untracked(), 4);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: SourceId,
    observer_id: ObserverId,
    compute: Box<dyn Fn(&mut DepScope) -> T>,
    value: RefCell<Option<T>>,
    state: StdCell<ComputedState>,
    dependencies: Dependencies,
    observers: ObserverList,
    /// Upstream sources that sent `will_update` but not yet `update`.
    pending: StdCell<usize>,
    /// Whether any settled upstream reported a change in this batch.
    saw_change: StdCell<bool>,
    computations: StdCell<usize>,
    this: Weak<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new computed value.
    ///
    /// The computation is not run until the value is read or observed.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&mut DepScope) -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this| ComputedInner {
            id: SourceId::new(),
            observer_id: ObserverId::new(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            state: StdCell::new(ComputedState::Dirty),
            dependencies: Dependencies::default(),
            observers: ObserverList::default(),
            pending: StdCell::new(0),
            saw_change: StdCell::new(false),
            computations: StdCell::new(0),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Get the computed value's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value without tracking a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.read()
    }

    /// Get the current cache state.
    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    /// Whether at least one observer keeps this value active.
    pub fn is_active(&self) -> bool {
        !self.inner.observers.is_empty()
    }

    /// Number of observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Number of upstream sources this value is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.len()
    }

    /// How many times the computation has run.
    pub fn computation_count(&self) -> usize {
        self.inner.computations.get()
    }

    /// Whether two handles refer to the same computed value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn evaluate(&self) -> (T, DepScope) {
        let mut scope = DepScope::new();
        let value = (self.compute)(&mut scope);
        self.computations.set(self.computations.get() + 1);
        (value, scope)
    }

    fn read(&self) -> T {
        if self.observers.is_empty() {
            return self.evaluate().0;
        }

        if self.state.get() != ComputedState::Dirty {
            if let Some(value) = self.value.borrow().as_ref() {
                return value.clone();
            }
        }

        self.refresh().0
    }

    /// Recompute, resubscribe to the new dependency set, and cache the
    /// result. Returns the new value and whether it differs from the old one.
    fn refresh(&self) -> (T, bool) {
        let (value, scope) = self.evaluate();

        if let Some(this) = self.this.upgrade() {
            self.dependencies.replace(scope, this);
        }

        let changed = self.value.borrow().as_ref() != Some(&value);
        *self.value.borrow_mut() = Some(value.clone());
        self.state.set(if self.pending.get() > 0 {
            ComputedState::MaybeDirty
        } else {
            ComputedState::Clean
        });
        (value, changed)
    }

    fn deactivate(&self) {
        self.dependencies.clear(self.observer_id);
        self.value.borrow_mut().take();
        self.state.set(ComputedState::Dirty);
        self.pending.set(0);
        trace!(source = %self.id, "computed deactivated");
    }
}

impl<T> Observer for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    fn will_update(&self, _source: SourceId) {
        let pending = self.pending.get() + 1;
        self.pending.set(pending);

        if pending == 1 {
            self.saw_change.set(false);
            self.state.set(ComputedState::MaybeDirty);
            self.observers.will_update(self.id);
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
        if pending > 1 {
            return;
        }

        let changed = if self.saw_change.get() {
            self.refresh().1
        } else {
            self.state.set(ComputedState::Clean);
            false
        };
        self.observers.update(self.id, changed);
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        let was_inactive = self.observers.is_empty();
        if !self.observers.insert(observer.clone()) {
            return;
        }

        if was_inactive {
            // Upstream cells still inside a batch announce it while we
            // subscribe, and that reaches the new observer through us.
            trace!(source = %self.id, "computed activated");
            self.refresh();
        } else if self.pending.get() > 0 {
            observer.will_update(self.id);
        }
    }

    fn remove_observer(&self, observer: ObserverId) {
        if self.observers.remove(observer) && self.observers.is_empty() {
            self.deactivate();
        }
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T> Readable for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    type Value = T;

    fn source(&self) -> Rc<dyn Source> {
        self.inner.clone()
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
