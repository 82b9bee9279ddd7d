//! Slot allocation for local state.
//!
//! Local state and watchers declared inside a render body are identified by
//! their position: the first `use_state` call is state slot 0, the second is
//! state slot 1, and so on, with watchers numbered separately. The first pass
//! creates the values; every later pass gets the same values back for the
//! same positions.
//!
//! This only works if declarations are unconditional. The allocator records
//! how many slots of each kind the first pass declared and rejects any later
//! request past that count. Anything subtler (swapping two declarations of
//! the same type) cannot be detected.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::InstanceId;
use crate::error::SlotError;
use crate::reactive::{Observer, ObserverId, Source, Watcher};

/// What a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// A stateful reactive value (cell or computed value).
    State,

    /// A watcher.
    Watcher,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::State => f.write_str("state"),
            SlotKind::Watcher => f.write_str("watcher"),
        }
    }
}

/// Stable identity of one positional declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub owner: InstanceId,
    pub kind: SlotKind,
    pub index: usize,
}

/// Number of declarations per kind in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    pub states: usize,
    pub watchers: usize,
}

impl SlotCounts {
    pub fn get(&self, kind: SlotKind) -> usize {
        match kind {
            SlotKind::State => self.states,
            SlotKind::Watcher => self.watchers,
        }
    }

    /// Claim the next ordinal of `kind`.
    pub(crate) fn next(&mut self, kind: SlotKind) -> usize {
        let counter = match kind {
            SlotKind::State => &mut self.states,
            SlotKind::Watcher => &mut self.watchers,
        };
        let index = *counter;
        *counter += 1;
        index
    }
}

struct StateSlot {
    value: Box<dyn Any>,
    source: Rc<dyn Source>,
}

/// Per-instance arena of slots, indexed by ordinal.
pub struct SlotAllocator {
    owner: InstanceId,
    /// Counts from the first completed pass.
    recorded: Option<SlotCounts>,
    states: Vec<StateSlot>,
    watchers: Vec<Watcher>,
}

impl SlotAllocator {
    pub fn new(owner: InstanceId) -> Self {
        Self {
            owner,
            recorded: None,
            states: Vec::new(),
            watchers: Vec::new(),
        }
    }

    /// True until a pass has completed and the counts are recorded.
    pub fn is_first_pass(&self) -> bool {
        self.recorded.is_none()
    }

    /// The counts recorded on the first pass, if it has completed.
    pub fn recorded(&self) -> Option<SlotCounts> {
        self.recorded
    }

    /// Number of stateful values held.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of watchers held.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Resolve the slot for the `index`-th declaration of `kind`.
    pub fn allocate(&self, kind: SlotKind, index: usize) -> Result<SlotKey, SlotError> {
        if let Some(recorded) = self.recorded {
            let limit = recorded.get(kind);
            if index >= limit {
                return Err(SlotError::Overflow {
                    owner: self.owner,
                    kind,
                    index,
                    recorded: limit,
                });
            }
        }

        Ok(SlotKey {
            owner: self.owner,
            kind,
            index,
        })
    }

    /// The state value stored at `key`, or `None` if the slot is still empty.
    pub fn state<V>(&self, key: SlotKey) -> Result<Option<V>, SlotError>
    where
        V: Clone + 'static,
    {
        let Some(slot) = self.states.get(key.index) else {
            return Ok(None);
        };

        slot.value
            .downcast_ref::<V>()
            .cloned()
            .map(Some)
            .ok_or(SlotError::TypeMismatch {
                owner: self.owner,
                kind: SlotKind::State,
                index: key.index,
                expected: type_name::<V>(),
            })
    }

    /// Store a newly created state value and put it under `hold`.
    pub(crate) fn fill_state<V>(
        &mut self,
        key: SlotKey,
        value: V,
        source: Rc<dyn Source>,
        hold: Rc<dyn Observer>,
    ) where
        V: 'static,
    {
        debug_assert_eq!(key.index, self.states.len(), "state slots filled out of order");
        source.add_observer(hold);
        self.states.push(StateSlot {
            value: Box::new(value),
            source,
        });
    }

    /// The watcher stored at `key`, if any.
    pub fn watcher(&self, key: SlotKey) -> Option<Watcher> {
        self.watchers.get(key.index).cloned()
    }

    pub(crate) fn fill_watcher(&mut self, key: SlotKey, watcher: Watcher) {
        debug_assert_eq!(key.index, self.watchers.len(), "watcher slots filled out of order");
        self.watchers.push(watcher);
    }

    /// Close a successful pass that declared `declared` slots.
    ///
    /// The first pass records the counts. A later pass that declared fewer
    /// slots is an error only when `strict` is set; otherwise it is logged.
    pub fn finish_pass(&mut self, declared: SlotCounts, strict: bool) -> Result<(), SlotError> {
        let Some(recorded) = self.recorded else {
            self.recorded = Some(declared);
            return Ok(());
        };

        for kind in [SlotKind::State, SlotKind::Watcher] {
            if declared.get(kind) < recorded.get(kind) {
                let err = SlotError::CountMismatch {
                    owner: self.owner,
                    kind,
                    declared: declared.get(kind),
                    recorded: recorded.get(kind),
                };
                if strict {
                    return Err(err);
                }
                warn!(instance = %self.owner, %kind, "{err}");
            }
        }
        Ok(())
    }

    /// Release every held state value from `hold` and stop every watcher.
    ///
    /// The arena is left empty, as before a first pass. Returns the number of
    /// state values released and watchers stopped; a second call returns
    /// `(0, 0)`.
    pub fn release(&mut self, hold: ObserverId) -> (usize, usize) {
        let released = self.states.len();
        for slot in self.states.drain(..) {
            slot.source.remove_observer(hold);
        }

        let mut stopped = 0;
        for watcher in self.watchers.drain(..) {
            if watcher.stop() {
                stopped += 1;
            }
        }

        self.recorded = None;
        (released, stopped)
    }
}

impl fmt::Debug for SlotAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("owner", &self.owner)
            .field("recorded", &self.recorded)
            .field("states", &self.states.len())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}
