//! Dependency scopes for computed values and watchers.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::observer::{Observer, ObserverId, Source, SourceId, Track};

/// The tracking scope handed to computed and watcher bodies.
///
/// Reads made through the scope become the body's dependencies for the
/// next run. Repeated reads of the same source collapse into one entry.
#[derive(Default)]
pub struct DepScope {
    sources: IndexMap<SourceId, Rc<dyn Source>>,
}

impl DepScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct sources read so far.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing was read.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Track for DepScope {
    fn track(&mut self, source: Rc<dyn Source>) {
        self.sources.entry(source.source_id()).or_insert(source);
    }
}

/// The set of sources an observer is currently subscribed to.
#[derive(Default)]
pub(crate) struct Dependencies {
    sources: RefCell<IndexMap<SourceId, Rc<dyn Source>>>,
}

impl Dependencies {
    /// Subscribe `observer` to the sources of `next` and drop stale ones.
    pub(crate) fn replace(&self, next: DepScope, observer: Rc<dyn Observer>) {
        let id = observer.observer_id();
        let previous = self.sources.replace(IndexMap::new());

        for (source_id, source) in &next.sources {
            if !previous.contains_key(source_id) {
                source.add_observer(observer.clone());
            }
        }
        for (source_id, source) in &previous {
            if !next.sources.contains_key(source_id) {
                source.remove_observer(id);
            }
        }

        *self.sources.borrow_mut() = next.sources;
    }

    /// Unsubscribe `observer` from everything.
    pub(crate) fn clear(&self, observer: ObserverId) {
        let previous = self.sources.replace(IndexMap::new());
        for source in previous.values() {
            source.remove_observer(observer);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sources.borrow().len()
    }
}
