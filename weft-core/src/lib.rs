//! Weft Core
//!
//! This crate provides the rebuild engine behind Weft reactive components.
//! It implements:
//!
//! - Automatic dependency tracking of render passes
//! - Batch-aware rebuild requests (at most one rebuild per batch)
//! - Stable positional identity for local state and watchers
//! - Frame-based rebuild scheduling and complete teardown on unmount
//!
//! along with the small single-threaded reactive graph (cells, computed
//! values, watchers, batches) those components read from.
//!
//! # Architecture
//!
//! - `reactive`: the reactive values and the two-phase observer protocol
//! - `component`: tracker, component observer, slots, scheduler, lifecycle
//! - `config`: engine configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use std::convert::Infallible;
//! use weft_core::component::{component, Mounted, Scheduler};
//! use weft_core::reactive::{batch, Cell, Track};
//!
//! let a = Cell::new(0);
//! let b = Cell::new(1);
//!
//! let scheduler = Scheduler::new();
//! let sum = Mounted::mount(
//!     component({
//!         let (a, b) = (a.clone(), b.clone());
//!         move |cx| Ok::<_, Infallible>(cx.get(&a) + cx.get(&b))
//!     }),
//!     &scheduler,
//! )
//! .unwrap();
//!
//! batch(|| {
//!     a.set(5);
//!     b.set(8);
//! });
//! scheduler.flush().unwrap();
//!
//! assert_eq!(*sum.output().unwrap(), 13);
//! assert_eq!(sum.pass_count(), 2);
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod reactive;

pub use component::{component, Component, Mounted, RenderContext, Scheduler};
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, SlotError};
