use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use pageforge_transport::AbortHandle;

/// Tracks in-flight generations and owns their abort handles.
///
/// Injected into the pipeline rather than reached through process globals, so
/// independent pipelines (and tests) never share state. The registry is what
/// enforces the one-running-record-per-id invariant: a second start for a
/// registered id attaches instead of spawning a duplicate.
#[derive(Default)]
pub struct RunRegistry {
    active: DashMap<String, AbortHandle>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for a new run. Returns false when it is already claimed.
    pub(crate) fn register(&self, id: &str, handle: AbortHandle) -> bool {
        match self.active.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
                true
            }
        }
    }

    pub(crate) fn deregister(&self, id: &str) {
        self.active.remove(id);
    }

    /// Signals the abort handle for `id`, if it is running.
    pub(crate) fn abort(&self, id: &str) -> bool {
        match self.active.get(id) {
            Some(entry) => {
                entry.value().abort();
                true
            }
            None => false,
        }
    }

    /// Whether a run is currently registered for `id`.
    pub fn is_running(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    /// Ids with an in-flight run, in no particular order.
    pub fn running_ids(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }
}
