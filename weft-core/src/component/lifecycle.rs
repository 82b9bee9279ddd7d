//! Mounting, rebuilding and unmounting component instances.
//!
//! A `Mounted` handle owns one component instance. Mounting runs the first
//! render pass; the scheduler (or the host, through `rebuild`) runs later
//! passes; unmounting, explicitly or by dropping the handle, tears
//! everything down.
//!
//! # Teardown
//!
//! Unmounting marks the instance unmounted first, so rebuild requests that
//! arrive afterwards are ignored. It then unsubscribes the component
//! observer from the current read set, releases every local state value
//! from the hold observer (letting computed values deactivate), stops every
//! local watcher, and finally calls `on_unmount`. A second unmount does
//! nothing.

use std::cell::{Cell as StdCell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::context::RenderContext;
use super::observer::{ComponentObserver, HoldObserver, ObserverPhase, RebuildTarget};
use super::scheduler::Scheduler;
use super::slots::SlotAllocator;
use super::tracker::{ReadSet, Tracker};
use super::{Component, InstanceId};
use crate::reactive::{Observer, ObserverId};

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Rebuild requests are honored.
    Mounted,

    /// Torn down. Rebuild requests are ignored.
    Unmounted,
}

/// A mounted component instance.
///
/// Dropping the handle unmounts the component.
pub struct Mounted<C: Component> {
    instance: Rc<Instance<C>>,
}

struct Instance<C: Component> {
    id: InstanceId,
    component: RefCell<C>,
    engine: RefCell<EngineState>,
    output: RefCell<Option<C::Output>>,
    lifecycle: StdCell<Lifecycle>,
    dirty: StdCell<bool>,
    passes: StdCell<u64>,
    observer: Rc<ComponentObserver>,
    hold: Rc<HoldObserver>,
    scheduler: Scheduler,
    this: Weak<Instance<C>>,
}

/// The per-instance engine state touched by render passes and teardown.
struct EngineState {
    reads: ReadSet,
    slots: SlotAllocator,
}

impl<C: Component> Mounted<C> {
    /// Mount `component` on `scheduler` and run its first render pass.
    ///
    /// If the first pass fails, the instance is torn down again and the
    /// render body's error is returned as is.
    pub fn mount(component: C, scheduler: &Scheduler) -> Result<Self, C::Error> {
        let id = InstanceId::new();
        let instance = Rc::new_cyclic(|this: &Weak<Instance<C>>| {
            let target: Weak<dyn RebuildTarget> = this.clone();
            Instance {
                id,
                component: RefCell::new(component),
                engine: RefCell::new(EngineState {
                    reads: ReadSet::new(),
                    slots: SlotAllocator::new(id),
                }),
                output: RefCell::new(None),
                lifecycle: StdCell::new(Lifecycle::Mounted),
                dirty: StdCell::new(false),
                passes: StdCell::new(0),
                observer: Rc::new(ComponentObserver::new(id, target)),
                hold: Rc::new(HoldObserver::new()),
                scheduler: scheduler.clone(),
                this: this.clone(),
            }
        });

        debug!(instance = %id, "mounting component");
        instance.component.borrow_mut().on_mount();

        match instance.render_pass() {
            Ok(()) => Ok(Self { instance }),
            Err(err) => {
                instance.teardown();
                Err(err)
            }
        }
    }

    /// The instance's identity.
    pub fn id(&self) -> InstanceId {
        self.instance.id
    }

    /// Re-run the render pass now, whether or not anything changed.
    ///
    /// Returns `Ok(false)` without rendering if the component is unmounted.
    pub fn rebuild(&self) -> Result<bool, C::Error> {
        if !self.is_mounted() {
            return Ok(false);
        }
        self.instance.render_pass()?;
        Ok(true)
    }

    /// Re-run the render pass only if a dependency changed since the last one.
    pub fn rebuild_if_dirty(&self) -> Result<bool, C::Error> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.rebuild()
    }

    /// Unmount the component. Returns false if it was already unmounted.
    pub fn unmount(&self) -> bool {
        self.instance.teardown()
    }

    pub fn is_mounted(&self) -> bool {
        self.instance.lifecycle.get() == Lifecycle::Mounted
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.instance.lifecycle.get()
    }

    /// Whether a rebuild has been requested and not yet run.
    pub fn is_dirty(&self) -> bool {
        self.instance.dirty.get()
    }

    /// Output of the last successful render pass.
    ///
    /// The returned guard borrows the instance. Release it before the next
    /// render pass runs (`rebuild`, or a `Scheduler::flush` that reaches this
    /// component): a pass that finds the output still borrowed panics. Use
    /// [`Mounted::with_output`] to avoid holding the borrow.
    pub fn output(&self) -> Option<Ref<'_, C::Output>> {
        Ref::filter_map(self.instance.output.borrow(), Option::as_ref).ok()
    }

    /// Run `f` on the output of the last successful render pass.
    ///
    /// The borrow ends when `f` returns.
    pub fn with_output<R>(&self, f: impl FnOnce(&C::Output) -> R) -> Option<R> {
        self.instance.output.borrow().as_ref().map(f)
    }

    /// Borrow the component itself.
    ///
    /// Like [`Mounted::output`], the guard must be released before the next
    /// render pass runs.
    pub fn component(&self) -> Ref<'_, C> {
        self.instance.component.borrow()
    }

    /// Number of successful render passes.
    pub fn pass_count(&self) -> u64 {
        self.instance.passes.get()
    }

    /// Number of rebuilds the component observer has requested.
    pub fn rebuild_requests(&self) -> u64 {
        self.instance.observer.requests()
    }

    /// Where the component observer is in the two-phase protocol.
    pub fn observer_phase(&self) -> ObserverPhase {
        self.instance.observer.phase()
    }

    /// Number of values the component is currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.instance.engine.borrow().reads.len()
    }

    /// Whether the component is currently subscribed to `source`.
    pub fn depends_on(&self, source: crate::reactive::SourceId) -> bool {
        self.instance.engine.borrow().reads.contains(source)
    }

    /// Number of local state values held.
    pub fn held_state_count(&self) -> usize {
        self.instance.engine.borrow().slots.state_count()
    }

    /// Number of local watchers held.
    pub fn watcher_count(&self) -> usize {
        self.instance.engine.borrow().slots.watcher_count()
    }
}

impl<C: Component> Instance<C> {
    /// Run one render pass under a fresh tracker.
    ///
    /// On success the new read set replaces the previous one. On failure the
    /// partial read set is rolled back, the previous one stays subscribed,
    /// and a failed first pass also empties the slot arena.
    fn render_pass(&self) -> Result<(), C::Error> {
        self.dirty.set(false);

        let config = self.scheduler.config();
        let observer: Rc<dyn Observer> = self.observer.clone();

        let first_pass = self.engine.borrow().slots.is_first_pass();
        let mut first_pass_guard = FirstPassGuard {
            owner: self.id,
            engine: &self.engine,
            hold: self.hold.observer_id(),
            armed: first_pass,
        };

        let mut engine = self.engine.borrow_mut();
        let EngineState { reads, slots } = &mut *engine;

        let tracker = Tracker::new(self.id, reads, observer.clone(), config.trace_reads);
        let mut cx = RenderContext::new(self.id, tracker, slots, self.hold.clone());
        let result = self.component.borrow_mut().render(&mut cx);
        let (tracker, declared) = cx.into_parts();

        match result {
            Ok(output) => {
                let current = tracker.commit();
                let (subscribed, unsubscribed) = reads.replace_with(current, &observer);
                let slot_check = slots.finish_pass(declared, config.strict_slot_counts);
                let dependencies = reads.len();
                drop(engine);
                first_pass_guard.armed = false;

                if let Err(err) = slot_check {
                    panic!("{err}");
                }

                *self.output.borrow_mut() = Some(output);
                let pass = self.passes.get() + 1;
                self.passes.set(pass);
                debug!(
                    instance = %self.id,
                    pass,
                    dependencies,
                    subscribed,
                    unsubscribed,
                    "render pass complete"
                );
                Ok(())
            }
            Err(err) => {
                drop(tracker);
                debug!(instance = %self.id, first_pass, "render pass failed");
                Err(err)
            }
        }
    }

    fn teardown(&self) -> bool {
        if self.lifecycle.replace(Lifecycle::Unmounted) == Lifecycle::Unmounted {
            return false;
        }
        self.dirty.set(false);

        let (unsubscribed, released, stopped) = {
            let mut engine = self.engine.borrow_mut();
            let unsubscribed = engine.reads.clear(self.observer.observer_id());
            let (released, stopped) = engine.slots.release(self.hold.observer_id());
            (unsubscribed, released, stopped)
        };

        self.component.borrow_mut().on_unmount();
        debug!(
            instance = %self.id,
            unsubscribed,
            released,
            stopped,
            "component unmounted"
        );
        true
    }
}

/// Empties the slot arena when a first pass does not complete.
///
/// Covers both a render body that returns an error and one that panics, so
/// watchers and held values created by the abandoned pass are released.
struct FirstPassGuard<'a> {
    owner: InstanceId,
    engine: &'a RefCell<EngineState>,
    hold: ObserverId,
    armed: bool,
}

impl Drop for FirstPassGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut engine) = self.engine.try_borrow_mut() else {
            return;
        };
        let (released, stopped) = engine.slots.release(self.hold);
        debug!(
            instance = %self.owner,
            released,
            stopped,
            "first pass abandoned, local state released"
        );
    }
}

impl<C: Component> RebuildTarget for Instance<C> {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn request_rebuild(&self) {
        if self.lifecycle.get() != Lifecycle::Mounted {
            return;
        }
        if !self.dirty.replace(true) {
            let target: Weak<dyn RebuildTarget> = self.this.clone();
            self.scheduler.enqueue(target);
        }
    }

    fn run_scheduled(&self) -> Option<Result<(), Box<dyn std::error::Error>>> {
        if self.lifecycle.get() != Lifecycle::Mounted || !self.dirty.get() {
            return None;
        }
        Some(
            self.render_pass()
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>),
        )
    }
}

impl<C: Component> Drop for Mounted<C> {
    fn drop(&mut self) {
        self.instance.teardown();
    }
}

impl<C: Component> fmt::Debug for Mounted<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("id", &self.instance.id)
            .field("lifecycle", &self.lifecycle())
            .field("dirty", &self.is_dirty())
            .field("passes", &self.pass_count())
            .finish()
    }
}
