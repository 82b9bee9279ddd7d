//! The render context handed to render bodies.

use std::rc::Rc;

use super::observer::HoldObserver;
use super::slots::{SlotAllocator, SlotCounts, SlotKind};
use super::tracker::Tracker;
use super::InstanceId;
use crate::error::SlotError;
use crate::reactive::{Cell, Computed, DepScope, Readable, Source, Track, Watcher};

/// Everything a render body can do: read reactive values (tracked) and
/// declare local state and watchers (positional).
///
/// Read values with [`Track::get`]:
///
/// ```rust
/// use std::convert::Infallible;
/// use weft_core::component::{component, Mounted, Scheduler};
/// use weft_core::reactive::{Cell, Track};
///
/// let name = Cell::new("world".to_string());
/// let greeting = component({
///     let name = name.clone();
///     move |cx| Ok::<_, Infallible>(format!("hello {}", cx.get(&name)))
/// });
///
/// let scheduler = Scheduler::new();
/// let mounted = Mounted::mount(greeting, &scheduler).unwrap();
/// assert_eq!(mounted.output().as_deref().map(String::as_str), Some("hello world"));
/// ```
///
/// The `use_*` declarations must run unconditionally and in the same order
/// on every pass. Declaring more of them on a later pass than on the first
/// pass aborts the pass with a panic.
pub struct RenderContext<'a> {
    owner: InstanceId,
    tracker: Tracker<'a>,
    slots: &'a mut SlotAllocator,
    hold: Rc<HoldObserver>,
    first_pass: bool,
    declared: SlotCounts,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        owner: InstanceId,
        tracker: Tracker<'a>,
        slots: &'a mut SlotAllocator,
        hold: Rc<HoldObserver>,
    ) -> Self {
        let first_pass = slots.is_first_pass();
        Self {
            owner,
            tracker,
            slots,
            hold,
            first_pass,
            declared: SlotCounts::default(),
        }
    }

    /// Give back the tracker and the number of declarations made.
    pub(crate) fn into_parts(self) -> (Tracker<'a>, SlotCounts) {
        (self.tracker, self.declared)
    }

    /// The component instance being rendered.
    pub fn instance_id(&self) -> InstanceId {
        self.owner
    }

    /// Whether this is the instance's first render pass.
    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }

    /// Number of distinct values read so far in this pass.
    pub fn read_count(&self) -> usize {
        self.tracker.len()
    }

    /// Declare a local cell. `init` runs on the first pass only; later passes
    /// return the same cell.
    pub fn use_state<T, F>(&mut self, init: F) -> Cell<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnOnce() -> T,
    {
        self.use_held(|| Cell::new(init()))
    }

    /// Declare a local computed value. The closure given on the first pass is
    /// the one that stays; later passes return the same computed value.
    ///
    /// The value is kept active for the component's lifetime even on passes
    /// that do not read it.
    pub fn use_computed<T, F>(&mut self, compute: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn(&mut DepScope) -> T + 'static,
    {
        self.use_held(|| Computed::new(compute))
    }

    /// Declare a local watcher. It is created and run on the first pass,
    /// never recreated, and stopped when the component unmounts.
    pub fn use_watch<F>(&mut self, run: F) -> Watcher
    where
        F: FnMut(&mut DepScope) + 'static,
    {
        let index = self.declared.next(SlotKind::Watcher);
        let key = self
            .slots
            .allocate(SlotKind::Watcher, index)
            .unwrap_or_else(|err| usage_error(err));

        if let Some(watcher) = self.slots.watcher(key) {
            return watcher;
        }

        let watcher = Watcher::new(run);
        self.slots.fill_watcher(key, watcher.clone());
        watcher
    }

    fn use_held<V>(&mut self, create: impl FnOnce() -> V) -> V
    where
        V: Readable + Clone + 'static,
    {
        let index = self.declared.next(SlotKind::State);
        let key = self
            .slots
            .allocate(SlotKind::State, index)
            .unwrap_or_else(|err| usage_error(err));

        match self.slots.state::<V>(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                let value = create();
                let source: Rc<dyn Source> = value.source();
                self.slots
                    .fill_state(key, value.clone(), source, self.hold.clone());
                value
            }
            Err(err) => usage_error(err),
        }
    }
}

impl Track for RenderContext<'_> {
    fn track(&mut self, source: Rc<dyn Source>) {
        self.tracker.track(source);
    }
}

#[track_caller]
fn usage_error(err: SlotError) -> ! {
    panic!("{err}")
}
