//! Integration Tests for Reactive Components
//!
//! These tests mount real components on a scheduler and drive them through
//! cells, computed values, and batches.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use weft_core::component::{component, Mounted, ObserverPhase, RenderContext, Scheduler};
use weft_core::reactive::{batch, Cell, Computed, Track, Watcher};
use weft_core::{Component, EngineConfig, EngineError};

/// Mount a closure component on a fresh scheduler.
fn mount<F, O>(render: F) -> (Scheduler, Mounted<impl Component<Output = O, Error = Infallible>>)
where
    F: FnMut(&mut RenderContext<'_>) -> Result<O, Infallible> + 'static,
    O: 'static,
{
    let scheduler = Scheduler::new();
    let mounted = Mounted::mount(component(render), &scheduler).unwrap();
    (scheduler, mounted)
}

/// Test the counter scenario: one cell rendered as text.
#[test]
fn counter_renders_each_change_once() {
    let count = Cell::new(0);
    let (scheduler, mounted) = mount({
        let count = count.clone();
        move |cx| Ok(cx.get(&count).to_string())
    });
    assert_eq!(mounted.output().as_deref().map(String::as_str), Some("0"));

    count.set(1);
    scheduler.flush().unwrap();
    assert_eq!(mounted.output().as_deref().map(String::as_str), Some("1"));

    batch(|| count.set(2));
    let report = scheduler.flush().unwrap();
    assert_eq!(report.rebuilt, 1);
    assert_eq!(mounted.output().as_deref().map(String::as_str), Some("2"));
    assert_eq!(mounted.pass_count(), 3);
}

/// Test that a batch touching several dependencies rebuilds once.
#[test]
fn batch_over_many_dependencies_rebuilds_once() {
    let cells: Vec<Cell<i32>> = (0..5).map(Cell::new).collect();
    let (scheduler, mounted) = mount({
        let cells = cells.clone();
        move |cx| Ok(cells.iter().map(|c| cx.get(c)).sum::<i32>())
    });
    assert_eq!(*mounted.output().unwrap(), 10);

    batch(|| {
        for cell in &cells {
            cell.update(|v| v + 1);
        }
    });

    assert_eq!(mounted.rebuild_requests(), 1);
    assert_eq!(scheduler.pending(), 1);

    let report = scheduler.flush().unwrap();
    assert_eq!(report.rebuilt, 1);
    assert_eq!(*mounted.output().unwrap(), 15);
    assert_eq!(mounted.pass_count(), 2);
}

/// Test the derived-sum scenario: no intermediate value is ever rendered.
#[test]
fn derived_sum_never_renders_an_intermediate_state() {
    let a = Cell::new(0);
    let b = Cell::new(1);
    let sum = Computed::new({
        let (a, b) = (a.clone(), b.clone());
        move |scope| scope.get(&a) + scope.get(&b)
    });

    let rendered = Rc::new(RefCell::new(Vec::new()));
    let (scheduler, mounted) = mount({
        let (sum, rendered) = (sum.clone(), rendered.clone());
        move |cx| {
            let value = cx.get(&sum);
            rendered.borrow_mut().push(value);
            Ok(value)
        }
    });

    batch(|| {
        a.set(5);
        b.set(8);
    });
    scheduler.flush().unwrap();

    assert_eq!(*mounted.output().unwrap(), 13);
    assert_eq!(*rendered.borrow(), vec![1, 13]);
    assert_eq!(mounted.rebuild_requests(), 1);
}

/// Test that a component mounted inside a batch catches up once it settles.
#[test]
fn component_mounted_mid_batch_renders_the_settled_value() {
    let a = Cell::new(0);
    let b = Cell::new(1);
    let sum = Computed::new({
        let (a, b) = (a.clone(), b.clone());
        move |scope| scope.get(&a) + scope.get(&b)
    });
    let reader = {
        let sum = sum.clone();
        move || {
            let sum = sum.clone();
            component(move |cx| Ok::<_, Infallible>(cx.get(&sum)))
        }
    };

    let scheduler = Scheduler::new();
    let early = Mounted::mount(reader(), &scheduler).unwrap();

    let late = batch(|| {
        a.set(5);
        b.set(8);
        Mounted::mount(reader(), &scheduler).unwrap()
    });
    assert!(late.is_dirty());

    scheduler.flush().unwrap();
    assert_eq!(*early.output().unwrap(), 13);
    assert_eq!(*late.output().unwrap(), 13);
    assert_eq!(late.pass_count(), 2);
}

/// Test that a component mounted inside a batch that reads a cell directly
/// ends up with the final value.
#[test]
fn component_mounted_mid_batch_tracks_cells_set_in_the_batch() {
    let count = Cell::new(0);
    let scheduler = Scheduler::new();

    let mounted = batch(|| {
        count.set(1);
        let mounted = Mounted::mount(
            component({
                let count = count.clone();
                move |cx| Ok::<_, Infallible>(cx.get(&count))
            }),
            &scheduler,
        )
        .unwrap();
        count.set(2);
        mounted
    });

    scheduler.flush().unwrap();
    assert_eq!(*mounted.output().unwrap(), 2);
}

/// Test that reading both inputs directly also rebuilds once per batch.
#[test]
fn direct_reads_of_batched_inputs_rebuild_once() {
    let a = Cell::new(0);
    let b = Cell::new(1);
    let rendered = Rc::new(RefCell::new(Vec::new()));
    let (scheduler, mounted) = mount({
        let (a, b, rendered) = (a.clone(), b.clone(), rendered.clone());
        move |cx| {
            let value = cx.get(&a) + cx.get(&b);
            rendered.borrow_mut().push(value);
            Ok(value)
        }
    });

    batch(|| {
        a.set(5);
        b.set(8);
    });
    scheduler.flush().unwrap();

    assert_eq!(*rendered.borrow(), vec![1, 13]);
    assert_eq!(mounted.pass_count(), 2);
}

/// Test that a batch which changes nothing requests no rebuild.
#[test]
fn unchanged_batch_requests_no_rebuild() {
    let a = Cell::new(1);
    let b = Cell::new(2);
    let (scheduler, mounted) = mount({
        let (a, b) = (a.clone(), b.clone());
        move |cx| Ok(cx.get(&a) * cx.get(&b))
    });

    batch(|| {
        a.set(1);
        b.set(3);
        b.set(2);
    });

    assert_eq!(mounted.rebuild_requests(), 0);
    assert!(!mounted.is_dirty());
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(mounted.observer_phase(), ObserverPhase::AwaitingChange);
}

/// Test that a computed value whose result is unchanged does not rebuild.
#[test]
fn computed_with_unchanged_result_requests_no_rebuild() {
    let n = Cell::new(4);
    let is_even = Computed::new({
        let n = n.clone();
        move |scope| scope.get(&n) % 2 == 0
    });
    let (scheduler, mounted) = mount({
        let is_even = is_even.clone();
        move |cx| Ok(cx.get(&is_even))
    });

    n.set(6);
    assert_eq!(mounted.rebuild_requests(), 0);

    n.set(7);
    scheduler.flush().unwrap();
    assert_eq!(mounted.rebuild_requests(), 1);
    assert!(!*mounted.output().unwrap());
}

/// Test dynamic dependencies: only the taken branch is tracked.
#[test]
fn untaken_branch_does_not_trigger_rebuilds() {
    let cond = Cell::new(false);
    let a = Cell::new(1);
    let b = Cell::new(2);
    let (scheduler, mounted) = mount({
        let (cond, a, b) = (cond.clone(), a.clone(), b.clone());
        move |cx| Ok(if cx.get(&cond) { cx.get(&a) } else { cx.get(&b) })
    });
    assert!(!mounted.depends_on(a.id()));

    a.set(10);
    assert_eq!(mounted.rebuild_requests(), 0);
    assert_eq!(scheduler.pending(), 0);

    cond.set(true);
    assert_eq!(mounted.rebuild_requests(), 1);
    scheduler.flush().unwrap();
    assert_eq!(*mounted.output().unwrap(), 10);
    assert!(mounted.depends_on(a.id()));
    assert!(!mounted.depends_on(b.id()));
}

/// Test that a value dropped from the read set is unsubscribed.
#[test]
fn unused_dependency_is_untracked_after_the_next_pass() {
    let show = Cell::new(true);
    let detail = Cell::new("detail".to_string());
    let (scheduler, mounted) = mount({
        let (show, detail) = (show.clone(), detail.clone());
        move |cx| {
            Ok(if cx.get(&show) {
                cx.get(&detail)
            } else {
                String::new()
            })
        }
    });
    assert_eq!(detail.observer_count(), 1);

    show.set(false);
    scheduler.flush().unwrap();

    assert_eq!(detail.observer_count(), 0);
    assert_eq!(mounted.dependency_count(), 1);

    detail.set("ignored".to_string());
    assert_eq!(scheduler.pending(), 0);
}

/// Test that local state keeps its identity and value across rebuilds.
#[test]
fn local_state_survives_rebuilds() {
    let tick = Cell::new(0);
    let handle: Rc<RefCell<Option<Cell<i32>>>> = Rc::new(RefCell::new(None));
    let (scheduler, mounted) = mount({
        let (tick, handle) = (tick.clone(), handle.clone());
        move |cx| {
            let local = cx.use_state(|| 100);
            cx.get(&tick);
            handle.borrow_mut().get_or_insert_with(|| local.clone());
            assert!(handle.borrow().as_ref().is_some_and(|h| h.ptr_eq(&local)));
            Ok(local.get_untracked())
        }
    });

    if let Some(local) = handle.borrow().as_ref() {
        local.set(7);
    }

    for i in 1..=5 {
        tick.set(i);
        scheduler.flush().unwrap();
    }

    assert_eq!(mounted.pass_count(), 6);
    assert_eq!(*mounted.output().unwrap(), 7);
    assert_eq!(mounted.held_state_count(), 1);
}

/// Test that writing to read local state rebuilds the component.
#[test]
fn reading_local_state_tracks_it() {
    let setter: Rc<RefCell<Option<Cell<u32>>>> = Rc::new(RefCell::new(None));
    let (scheduler, mounted) = mount({
        let setter = setter.clone();
        move |cx| {
            let clicks = cx.use_state(|| 0u32);
            if cx.is_first_pass() {
                *setter.borrow_mut() = Some(clicks.clone());
            }
            Ok(format!("clicked {} times", cx.get(&clicks)))
        }
    });

    if let Some(clicks) = setter.borrow().as_ref() {
        clicks.update(|n| n + 1);
        clicks.update(|n| n + 1);
    }
    scheduler.flush().unwrap();

    assert_eq!(
        mounted.output().as_deref().map(String::as_str),
        Some("clicked 2 times")
    );
}

/// Test that local computed values stay active while mounted, read or not.
#[test]
fn held_computed_stays_active_when_not_read() {
    let show = Cell::new(true);
    let base = Cell::new(3);
    let handle: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
    let (scheduler, mounted) = mount({
        let (show, base, handle) = (show.clone(), base.clone(), handle.clone());
        move |cx| {
            let tripled = cx.use_computed({
                let base = base.clone();
                move |scope| scope.get(&base) * 3
            });
            handle.borrow_mut().get_or_insert_with(|| tripled.clone());
            Ok(if cx.get(&show) { cx.get(&tripled) } else { 0 })
        }
    });

    show.set(false);
    scheduler.flush().unwrap();

    let tripled = handle.borrow().clone().unwrap();
    assert!(!mounted.depends_on(tripled.id()));
    assert!(tripled.is_active());
    assert_eq!(tripled.observer_count(), 1);

    drop(mounted);
    assert!(!tripled.is_active());
    assert_eq!(base.observer_count(), 0);
}

/// Test that local watchers are created once and re-run only on change.
#[test]
fn local_watcher_is_created_once() {
    let tick = Cell::new(0);
    let watched = Cell::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (scheduler, mounted) = mount({
        let (tick, watched, seen) = (tick.clone(), watched.clone(), seen.clone());
        move |cx| {
            let watcher = cx.use_watch({
                let (watched, seen) = (watched.clone(), seen.clone());
                move |scope| seen.borrow_mut().push(scope.get(&watched))
            });
            cx.get(&tick);
            Ok(watcher)
        }
    });

    for i in 1..=3 {
        tick.set(i);
        scheduler.flush().unwrap();
    }
    watched.set(9);

    assert_eq!(*seen.borrow(), vec![0, 9]);
    assert_eq!(mounted.watcher_count(), 1);
    assert_eq!(mounted.output().unwrap().run_count(), 2);
}

/// Test that unmount releases every subscription, state value, and watcher.
#[test]
fn unmount_disposes_everything_exactly_once() {
    let a = Cell::new(1);
    let b = Cell::new(2);
    let locals: Rc<RefCell<Vec<Cell<i32>>>> = Rc::new(RefCell::new(Vec::new()));
    let watchers: Rc<RefCell<Vec<Watcher>>> = Rc::new(RefCell::new(Vec::new()));
    let unmounts = Rc::new(RefCell::new(0));

    struct Panel {
        a: Cell<i32>,
        b: Cell<i32>,
        locals: Rc<RefCell<Vec<Cell<i32>>>>,
        watchers: Rc<RefCell<Vec<Watcher>>>,
        unmounts: Rc<RefCell<usize>>,
    }

    impl Component for Panel {
        type Output = i32;
        type Error = Infallible;

        fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<i32, Infallible> {
            let first = cx.use_state(|| 10);
            let second = cx.use_state(|| 20);
            let watcher = cx.use_watch({
                let a = self.a.clone();
                move |scope| {
                    scope.get(&a);
                }
            });
            if cx.is_first_pass() {
                self.locals.borrow_mut().extend([first.clone(), second.clone()]);
                self.watchers.borrow_mut().push(watcher);
            }
            Ok(cx.get(&self.a) + cx.get(&self.b) + cx.get(&first))
        }

        fn on_unmount(&mut self) {
            *self.unmounts.borrow_mut() += 1;
        }
    }

    let scheduler = Scheduler::new();
    let mounted = Mounted::mount(
        Panel {
            a: a.clone(),
            b: b.clone(),
            locals: locals.clone(),
            watchers: watchers.clone(),
            unmounts: unmounts.clone(),
        },
        &scheduler,
    )
    .unwrap();
    assert_eq!(*mounted.output().unwrap(), 13);
    assert_eq!(a.observer_count(), 2);

    assert!(mounted.unmount());
    assert!(!mounted.unmount());
    drop(mounted);

    assert_eq!(a.observer_count(), 0);
    assert_eq!(b.observer_count(), 0);
    assert!(locals.borrow().iter().all(|cell| cell.observer_count() == 0));
    assert!(watchers.borrow().iter().all(Watcher::is_stopped));
    assert_eq!(*unmounts.borrow(), 1);
}

/// Test that changes after unmount are ignored.
#[test]
fn notifications_after_unmount_are_ignored() {
    let count = Cell::new(0);
    let (scheduler, mounted) = mount({
        let count = count.clone();
        move |cx| Ok(cx.get(&count))
    });

    mounted.unmount();
    count.set(1);

    assert_eq!(scheduler.pending(), 0);
    assert!(!mounted.is_dirty());
}

/// Test that unmounting with a rebuild pending cancels it.
#[test]
fn unmount_cancels_a_pending_rebuild() {
    let count = Cell::new(0);
    let (scheduler, mounted) = mount({
        let count = count.clone();
        move |cx| Ok(cx.get(&count))
    });

    count.set(1);
    assert!(mounted.is_dirty());
    assert_eq!(scheduler.pending(), 1);

    mounted.unmount();
    let report = scheduler.flush().unwrap();
    assert_eq!(report.rebuilt, 0);
    assert_eq!(mounted.pass_count(), 1);
}

/// Test that a write during the pass to an already read value is not lost.
#[test]
fn write_after_read_in_the_same_pass_schedules_another_pass() {
    let count = Cell::new(0);
    let (scheduler, mounted) = mount({
        let count = count.clone();
        move |cx| {
            let value = cx.get(&count);
            if value < 3 {
                count.set(value + 1);
            }
            Ok(value)
        }
    });
    assert!(mounted.is_dirty());

    let report = scheduler.flush().unwrap();
    assert_eq!(report.rounds, 3);
    assert_eq!(*mounted.output().unwrap(), 3);
    assert_eq!(mounted.pass_count(), 4);
}

/// Test that a component that always dirties itself hits the round limit.
#[test]
fn runaway_component_hits_the_round_limit() {
    let config = EngineConfig::from_json(r#"{ "max_flush_rounds": 5 }"#).unwrap();
    let scheduler = Scheduler::with_config(config).unwrap();
    let count = Cell::new(0);
    let _mounted = Mounted::mount(
        component({
            let count = count.clone();
            move |cx| {
                let value = cx.get(&count);
                count.set(value + 1);
                Ok::<_, Infallible>(value)
            }
        }),
        &scheduler,
    )
    .unwrap();

    let err = scheduler.flush().unwrap_err();
    assert!(matches!(err, EngineError::RebuildLoop { rounds: 5 }));
}

/// Test that a shared cell rebuilds each of its components once.
#[test]
fn shared_cell_rebuilds_every_reader_once() {
    let theme = Cell::new("light");
    let scheduler = Scheduler::new();
    let readers: Vec<_> = (0..3)
        .map(|_| {
            Mounted::mount(
                component({
                    let theme = theme.clone();
                    move |cx| Ok::<_, Infallible>(cx.get(&theme))
                }),
                &scheduler,
            )
            .unwrap()
        })
        .collect();

    theme.set("dark");
    let report = scheduler.flush().unwrap();

    assert_eq!(report.rebuilt, 3);
    assert!(readers.iter().all(|r| *r.output().unwrap() == "dark"));
}

#[derive(Debug, PartialEq)]
struct LoadError(&'static str);

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load {}", self.0)
    }
}

impl std::error::Error for LoadError {}

/// Test that scheduled render errors are reported with the original error.
#[test]
fn scheduled_render_error_is_reported() {
    let broken = Cell::new(false);
    let scheduler = Scheduler::new();
    let mounted = Mounted::mount(
        component({
            let broken = broken.clone();
            move |cx| {
                if cx.get(&broken) {
                    Err(LoadError("profile"))
                } else {
                    Ok("profile")
                }
            }
        }),
        &scheduler,
    )
    .unwrap();

    broken.set(true);
    let report = scheduler.flush().unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].instance, mounted.id());
    assert_eq!(
        report.failures[0].error.downcast_ref::<LoadError>(),
        Some(&LoadError("profile"))
    );
    // The last good output and subscriptions survive.
    assert_eq!(*mounted.output().unwrap(), "profile");
    assert_eq!(broken.observer_count(), 1);

    broken.set(false);
    scheduler.flush().unwrap();
    assert_eq!(mounted.pass_count(), 2);
}

/// Test that a panicking pass does not strand the rest of its flush round.
#[test]
fn panic_during_flush_leaves_other_components_rebuildable() {
    let x = Cell::new(0);
    let scheduler = Scheduler::new();
    let fragile = Mounted::mount(
        component({
            let x = x.clone();
            move |cx| {
                let value = cx.get(&x);
                assert_ne!(value, 1, "cannot render 1");
                Ok::<_, Infallible>(value)
            }
        }),
        &scheduler,
    )
    .unwrap();
    let sturdy = Mounted::mount(
        component({
            let x = x.clone();
            move |cx| Ok::<_, Infallible>(cx.get(&x))
        }),
        &scheduler,
    )
    .unwrap();

    x.set(1);
    let flushed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.flush()));
    assert!(flushed.is_err());
    assert_eq!(scheduler.pending(), 1);

    x.set(2);
    scheduler.flush().unwrap();

    assert_eq!(*sturdy.output().unwrap(), 2);
    assert!(!sturdy.is_dirty());
    assert_eq!(*fragile.output().unwrap(), 2);
    assert_eq!(scheduler.pending(), 0);
}

/// Test that a panicking first pass leaves no watcher or subscription behind.
#[test]
fn panicking_mount_leaves_nothing_subscribed() {
    let x = Cell::new(0);
    let runs = Rc::new(RefCell::new(0));
    let scheduler = Scheduler::new();

    let mounted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        Mounted::mount(
            component({
                let (x, runs) = (x.clone(), runs.clone());
                move |cx: &mut RenderContext<'_>| -> Result<(), Infallible> {
                    cx.use_watch({
                        let (x, runs) = (x.clone(), runs.clone());
                        move |scope| {
                            scope.get(&x);
                            *runs.borrow_mut() += 1;
                        }
                    });
                    let seen = cx.get(&x);
                    panic!("cannot render {seen}");
                }
            }),
            &scheduler,
        )
    }));
    assert!(mounted.is_err());

    x.set(1);
    x.set(2);

    assert_eq!(*runs.borrow(), 1);
    assert_eq!(x.observer_count(), 0);
    assert_eq!(scheduler.pending(), 0);
}

/// Test that a conditional declaration aborts the pass.
#[test]
#[should_panic(expected = "were declared on the first pass")]
fn conditional_declaration_is_fatal() {
    let extra = Cell::new(false);
    let (_scheduler, mounted) = mount({
        let extra = extra.clone();
        move |cx| {
            let _always = cx.use_state(|| 0);
            if cx.get(&extra) {
                let _sometimes = cx.use_state(|| 1);
            }
            Ok(())
        }
    });

    extra.set(true);
    let _ = mounted.rebuild();
}

/// Test that, by default, a pass with fewer declarations is rejected.
#[test]
#[should_panic(expected = "on the first pass")]
fn missing_declarations_are_fatal_by_default() {
    let scheduler = Scheduler::new();
    assert!(scheduler.config().strict_slot_counts);
    let skip = Cell::new(false);
    let mounted = Mounted::mount(
        component({
            let skip = skip.clone();
            move |cx| {
                if !cx.get(&skip) {
                    let _state = cx.use_state(|| 0);
                }
                Ok::<_, Infallible>(())
            }
        }),
        &scheduler,
    )
    .unwrap();

    skip.set(true);
    let _ = mounted.rebuild();
}

/// Test that lenient mode tolerates a pass with fewer declarations.
#[test]
fn lenient_mode_tolerates_missing_declarations() {
    let config = EngineConfig {
        strict_slot_counts: false,
        ..EngineConfig::default()
    };
    let scheduler = Scheduler::with_config(config).unwrap();
    let skip = Cell::new(false);
    let mounted = Mounted::mount(
        component({
            let skip = skip.clone();
            move |cx| {
                if !cx.get(&skip) {
                    let _state = cx.use_state(|| 0);
                }
                Ok::<_, Infallible>(())
            }
        }),
        &scheduler,
    )
    .unwrap();

    skip.set(true);
    assert_eq!(mounted.rebuild(), Ok(true));
    assert_eq!(mounted.held_state_count(), 1);
}
