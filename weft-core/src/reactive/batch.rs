//! Batching
//!
//! A batch is a transaction in which several cells change together. Inside a
//! batch, the first `set` of each cell sends `will_update` to its observers
//! right away, but the matching `update` is held back until the outermost
//! batch exits. Observers therefore see every `will_update` of the batch
//! before any `update`, and never observe a half-applied transaction.
//!
//! # Implementation
//!
//! We keep a thread-local depth counter and a queue of cells waiting to
//! settle. The graph is single-threaded, so one queue per thread is all the
//! coordination needed. A drop guard restores the depth (and settles the
//! queue) even if the batch body panics.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use tracing::trace;

/// A cell waiting for the end of the current batch.
pub(crate) trait Settle {
    /// Deliver the deferred `update` notification.
    fn settle(&self);
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<Rc<dyn Settle>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Run `f` as a single batch.
///
/// Batches nest; only the outermost one delivers the deferred updates.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{batch, Cell};
///
/// let a = Cell::new(0);
/// let b = Cell::new(1);
/// batch(|| {
///     a.set(5);
///     b.set(8);
/// });
/// assert_eq!(a.get_untracked() + b.get_untracked(), 13);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

/// Whether a batch is currently open on this thread.
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Queue a cell to settle when the outermost batch exits.
pub(crate) fn enqueue(cell: Rc<dyn Settle>) {
    BATCH.with(|state| state.borrow_mut().pending.push(cell));
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let outermost = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            state.depth == 0
        });

        if outermost {
            settle_pending();
        }
    }
}

/// Lowers the depth raised for one settle round without flushing again.
struct RoundGuard;

impl Drop for RoundGuard {
    fn drop(&mut self) {
        BATCH.with(|state| state.borrow_mut().depth -= 1);
    }
}

/// Deliver deferred updates until no cell is left waiting.
///
/// Observers may set cells while they react. Those sets are collected into
/// the next round instead of recursing.
fn settle_pending() {
    let mut round = 0usize;
    loop {
        let pending = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            if state.pending.is_empty() {
                return None;
            }
            state.depth += 1;
            Some(mem::take(&mut state.pending))
        });

        let Some(pending) = pending else {
            break;
        };

        let _round = RoundGuard;
        round += 1;
        trace!(round, cells = pending.len(), "settling batch");
        for cell in pending {
            cell.settle();
        }
    }
}
