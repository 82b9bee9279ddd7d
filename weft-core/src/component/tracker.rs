//! Dependency tracking for render passes.
//!
//! A `Tracker` records every value read during one render pass. It is
//! created fresh for each pass, handed to the render body inside the render
//! context, and either committed (the pass succeeded) or dropped (the body
//! returned an error or panicked).
//!
//! # Subscribing at read time
//!
//! A value read for the first time (not part of the previous pass's read set)
//! gets the component observer attached immediately, during the pass. If the
//! value changes between the read and the end of the pass, the observer still
//! hears about it.
//!
//! # Rollback
//!
//! Dropping a tracker without committing detaches the observer from every
//! value it attached, so a failed pass leaves exactly the previous read set
//! subscribed.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::InstanceId;
use crate::reactive::{Observer, ObserverId, Source, SourceId, Track};

/// The values read during one render pass, deduplicated by identity.
#[derive(Default)]
pub struct ReadSet {
    sources: IndexMap<SourceId, Rc<dyn Source>>,
}

impl ReadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    /// IDs in first-read order.
    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    /// Make `next` the subscribed generation.
    ///
    /// Values only in `next` are subscribed (normally already done at read
    /// time; `add_observer` is idempotent), values only in `self` are
    /// unsubscribed. Returns `(subscribed, unsubscribed)` counts.
    pub(crate) fn replace_with(
        &mut self,
        next: ReadSet,
        observer: &Rc<dyn Observer>,
    ) -> (usize, usize) {
        let id = observer.observer_id();
        let mut subscribed = 0;
        let mut unsubscribed = 0;

        for (source_id, source) in &next.sources {
            if !self.contains(*source_id) {
                source.add_observer(observer.clone());
                subscribed += 1;
            }
        }
        for (source_id, source) in &self.sources {
            if !next.contains(*source_id) {
                source.remove_observer(id);
                unsubscribed += 1;
            }
        }

        *self = next;
        (subscribed, unsubscribed)
    }

    /// Unsubscribe `observer` from every value and empty the set.
    pub(crate) fn clear(&mut self, observer: ObserverId) -> usize {
        let count = self.sources.len();
        for source in self.sources.values() {
            source.remove_observer(observer);
        }
        self.sources.clear();
        count
    }
}

impl fmt::Debug for ReadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.sources.keys()).finish()
    }
}

/// Records the reads of one render pass.
pub struct Tracker<'a> {
    owner: InstanceId,
    previous: &'a ReadSet,
    current: ReadSet,
    /// Values this pass attached the observer to. Detached again on rollback.
    attached: SmallVec<[Rc<dyn Source>; 8]>,
    observer: Rc<dyn Observer>,
    trace_reads: bool,
    committed: bool,
}

impl<'a> Tracker<'a> {
    pub(crate) fn new(
        owner: InstanceId,
        previous: &'a ReadSet,
        observer: Rc<dyn Observer>,
        trace_reads: bool,
    ) -> Self {
        Self {
            owner,
            previous,
            current: ReadSet::new(),
            attached: SmallVec::new(),
            observer,
            trace_reads,
            committed: false,
        }
    }

    /// Number of distinct values read so far.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Finish the pass and hand over the collected read set.
    pub(crate) fn commit(mut self) -> ReadSet {
        self.committed = true;
        std::mem::take(&mut self.current)
    }
}

impl Track for Tracker<'_> {
    fn track(&mut self, source: Rc<dyn Source>) {
        let id = source.source_id();
        if self.current.contains(id) {
            return;
        }

        if !self.previous.contains(id) {
            source.add_observer(self.observer.clone());
            self.attached.push(source.clone());
            if self.trace_reads {
                trace!(instance = %self.owner, source = %id, "tracking new dependency");
            }
        }

        self.current.sources.insert(id, source);
    }
}

impl Drop for Tracker<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let observer = self.observer.observer_id();
        for source in self.attached.drain(..) {
            source.remove_observer(observer);
        }
        debug!(
            instance = %self.owner,
            reads = self.current.len(),
            "render pass abandoned, partial read set discarded"
        );
    }
}
