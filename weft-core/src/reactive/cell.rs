//! Cell Implementation
//!
//! A Cell is the mutable reactive primitive. It holds a value and the list of
//! observers interested in it.
//!
//! # How Cells Work
//!
//! 1. Reading a cell through a tracking scope records the cell as a
//!    dependency of that scope. Reading it untracked does not.
//!
//! 2. Setting a cell inside a batch remembers the value the cell had when the
//!    batch started and sends `will_update` to its observers (once per batch).
//!
//! 3. When the batch settles, observers receive `update` with `changed` set
//!    only if the final value differs from the batch-start value. Setting a
//!    cell and then setting it back within one batch is not a change.
//!
//! A `set` outside any batch is a batch of one.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::batch::{self, Settle};
use super::observer::{Observer, ObserverId, ObserverList, Readable, Source, SourceId};

/// A reactive cell holding a value of type T.
///
/// Handles are cheap to clone and all clones share the same value and
/// observers.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::Cell;
///
/// let count = Cell::new(0);
/// count.set(5);
/// count.update(|v| v + 1);
/// assert_eq!(count.get_untracked(), 6);
/// ```
pub struct Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<CellInner<T>>,
}

struct CellInner<T> {
    id: SourceId,
    value: RefCell<T>,
    /// Value at the start of the open batch, if this cell was set in it.
    origin: RefCell<Option<T>>,
    observers: ObserverList,
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(CellInner {
                id: SourceId::new(),
                value: RefCell::new(value),
                origin: RefCell::new(None),
                observers: ObserverList::default(),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value without tracking a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value.
    ///
    /// Observers are told about the change when the enclosing batch settles,
    /// or immediately if no batch is open.
    pub fn set(&self, value: T) {
        batch::batch(|| {
            let first_in_batch = self.inner.origin.borrow().is_none();
            let previous = self.inner.value.replace(value);

            if first_in_batch {
                *self.inner.origin.borrow_mut() = Some(previous);
                batch::enqueue(self.inner.clone());
                self.inner.observers.will_update(self.inner.id);
            }
        });
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.set(new_value);
    }

    /// Get the number of observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Settle for CellInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn settle(&self) {
        let Some(origin) = self.origin.borrow_mut().take() else {
            return;
        };
        let changed = origin != *self.value.borrow();
        self.observers.update(self.id, changed);
    }
}

impl<T> Source for CellInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        let mid_batch = self.origin.borrow().is_some();
        if self.observers.insert(observer.clone()) && mid_batch {
            // Joined mid-batch: announce the batch so the coming `update`
            // is honored.
            observer.will_update(self.id);
        }
    }

    fn remove_observer(&self, observer: ObserverId) {
        self.observers.remove(observer);
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T> Readable for Cell<T>
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

impl<T> Clone for Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}
