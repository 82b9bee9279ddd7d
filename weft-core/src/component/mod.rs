//! Reactive Components
//!
//! This module turns a render body into a component that rebuilds itself
//! exactly when something it read has changed.
//!
//! # Overview
//!
//! ```text
//! mount ──▶ render pass ──▶ subscribe to read set ──▶ idle
//!              ▲                                       │
//!              │                        a read value changes (batch settles)
//!              │                                       ▼
//!        scheduler flush ◀── mark dirty ◀── component observer
//! ```
//!
//! - The **tracker** records every value read during a pass and attaches the
//!   component observer to newly seen values as they are read.
//! - The **component observer** follows the two-phase protocol so a batch
//!   touching several dependencies causes one rebuild, and a batch that
//!   changes nothing causes none.
//! - The **slot allocator** gives `use_state`, `use_computed` and `use_watch`
//!   declarations a stable identity across passes.
//! - The **scheduler** re-runs dirty components when the host flushes a
//!   frame, checking that they are still mounted first.
//! - **Unmounting** unsubscribes everything, releases local state, and stops
//!   local watchers, exactly once.
//!
//! Everything here is single-threaded. A render pass never overlaps another
//! pass of the same component; calling `unmount` or `rebuild` on a component
//! from inside its own render body is not supported.

mod context;
mod lifecycle;
mod observer;
mod scheduler;
mod slots;
mod tracker;

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

pub use context::RenderContext;
pub use lifecycle::{Lifecycle, Mounted};
pub use observer::ObserverPhase;
pub use scheduler::{FlushReport, RenderFailure, Scheduler};
pub use slots::{SlotAllocator, SlotCounts, SlotKey, SlotKind};
pub use tracker::{ReadSet, Tracker};

/// Unique identifier for a mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Generate a new unique instance ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// A reactive component: a render body plus optional lifecycle hooks.
///
/// The render body reads reactive values through the context. Errors it
/// returns propagate out of the pass untouched.
pub trait Component: 'static {
    /// What a render pass produces.
    type Output: 'static;

    /// What a render pass can fail with.
    type Error: std::error::Error + 'static;

    /// Called once, before the first render pass.
    fn on_mount(&mut self) {}

    /// Produce output. Runs once on mount and again each time a value read
    /// by the previous successful pass changes.
    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<Self::Output, Self::Error>;

    /// Called once, after subscriptions and local state are released.
    fn on_unmount(&mut self) {}
}

/// A component whose render body is a closure.
pub struct FnComponent<F, O, E> {
    render: F,
    _marker: PhantomData<fn() -> (O, E)>,
}

/// Wrap a closure as a component.
pub fn component<F, O, E>(render: F) -> FnComponent<F, O, E>
where
    F: FnMut(&mut RenderContext<'_>) -> Result<O, E> + 'static,
    O: 'static,
    E: std::error::Error + 'static,
{
    FnComponent {
        render,
        _marker: PhantomData,
    }
}

impl<F, O, E> Component for FnComponent<F, O, E>
where
    F: FnMut(&mut RenderContext<'_>) -> Result<O, E> + 'static,
    O: 'static,
    E: std::error::Error + 'static,
{
    type Output = O;
    type Error = E;

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<O, E> {
        (self.render)(cx)
    }
}
