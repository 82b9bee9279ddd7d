//! Reactive Value Graph
//!
//! This module implements the reactive values that components read: cells,
//! computed values, and watchers, plus the batching that groups changes into
//! transactions.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. Setting it notifies every
//! observer through the two-phase `will_update` / `update` protocol.
//!
//! ## Computed Values
//!
//! A Computed value is derived from other values and cached while observed.
//! It recomputes only after all of its changed inputs have settled.
//!
//! ## Watchers
//!
//! A Watcher is a side effect that re-runs when the values it read change.
//!
//! # Implementation Notes
//!
//! The graph is single-threaded (`Rc` and `RefCell` throughout). Dependency
//! tracking is explicit: bodies receive a tracking scope (`DepScope` here,
//! the render context in the component engine) and read through it with
//! `Track::get`. Nothing is recorded for reads made outside a scope.

mod batch;
mod cell;
mod computed;
mod observer;
mod scope;
mod watcher;

pub use batch::{batch, is_batching};
pub use cell::Cell;
pub use computed::{Computed, ComputedState};
pub use observer::{Observer, ObserverId, Readable, Source, SourceId, Track};
pub use scope::DepScope;
pub use watcher::Watcher;
