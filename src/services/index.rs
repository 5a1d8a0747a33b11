use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A record that can be looked up by id and by a set of secondary keys
/// (tags for images, names for containers).
pub(crate) trait Keyed {
    fn id(&self) -> &str;

    fn keys(&self) -> Vec<String>;
}

/// Records from one listing plus both indices derived from them.
///
/// Both indices point into the same `records` vector and are only ever built
/// together, so a snapshot is internally consistent by construction.
#[derive(Debug)]
pub(crate) struct Snapshot<R> {
    records: Vec<R>,
    by_key: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl<R: Keyed> Snapshot<R> {
    fn build(records: Vec<R>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut by_key = HashMap::new();
        let mut by_id = HashMap::new();

        for record in records {
            let position = kept.len();

            // a record without id could be reachable by key but never by id
            if !record.id().is_empty() {
                // the first listing of an id owns it; later ones are dropped
                if by_id.contains_key(record.id()) {
                    continue;
                }
                by_id.insert(record.id().to_string(), position);
                for key in record.keys() {
                    by_key.insert(key, position);
                }
            }

            kept.push(record);
        }

        Self {
            records: kept,
            by_key,
            by_id,
        }
    }
}

impl<R> Snapshot<R> {
    pub(crate) fn by_key(&self, key: &str) -> Option<&R> {
        self.by_key.get(key).map(|&position| &self.records[position])
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<&R> {
        self.by_id.get(id).map(|&position| &self.records[position])
    }

    pub(crate) fn records(&self) -> &[R] {
        &self.records
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }
}

/// Holds the current snapshot. Refresh builds a new snapshot off-lock and
/// swaps the `Arc`; readers keep whichever snapshot they loaded.
#[derive(Debug)]
pub(crate) struct SnapshotCell<R> {
    current: RwLock<Arc<Snapshot<R>>>,
}

impl<R: Keyed> SnapshotCell<R> {
    pub(crate) fn load(&self) -> Arc<Snapshot<R>> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub(crate) fn replace(&self, records: Vec<R>) {
        let next = Arc::new(Snapshot::build(records));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl<R: Keyed> Default for SnapshotCell<R> {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::build(Vec::new()))),
        }
    }
}
