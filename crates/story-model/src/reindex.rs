//! Dense-key collections and the reference remapping that keeps them dense.
//!
//! Every registry in a document is keyed `0..len`. Removing or inserting an
//! entry renumbers its neighbours, and every reference held elsewhere has to
//! be rewritten with the same rule in the same operation. The free functions
//! below are that rule; [`Registry`] applies it to its own keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};

pub type Key = usize;

/// Key a record lands on when inserted after `after` (`None` = front).
pub fn insertion_key(after: Option<Key>) -> Key {
    after.map_or(0, |k| k + 1)
}

/// Rewrite a single reference after `removed` was dropped.
///
/// A reference to the removed entry falls back to its predecessor, clamped
/// at zero.
pub fn shift_after_remove(reference: Key, removed: Key) -> Key {
    match reference.cmp(&removed) {
        std::cmp::Ordering::Greater => reference - 1,
        std::cmp::Ordering::Equal => removed.saturating_sub(1),
        std::cmp::Ordering::Less => reference,
    }
}

/// Rewrite a single reference after a record was inserted after `after`.
pub fn shift_after_insert(reference: Key, after: Option<Key>) -> Key {
    if reference >= insertion_key(after) {
        reference + 1
    } else {
        reference
    }
}

/// Drop `removed` from a reference list and renumber the rest.
pub fn prune_after_remove(list: &[Key], removed: Key) -> Vec<Key> {
    list.iter()
        .filter(|k| **k != removed)
        .map(|k| if *k > removed { k - 1 } else { *k })
        .collect()
}

/// Renumber a reference list after an insertion.
pub fn shift_list_after_insert(list: &[Key], after: Option<Key>) -> Vec<Key> {
    list.iter().map(|k| shift_after_insert(*k, after)).collect()
}

/// Produce a new map without `removed`, keys above it shifted down by one.
pub fn remove_and_reindex<T: ?Sized>(
    entries: &BTreeMap<Key, Arc<T>>,
    removed: Key,
) -> BTreeMap<Key, Arc<T>> {
    entries
        .iter()
        .filter(|(k, _)| **k != removed)
        .map(|(k, v)| (if *k > removed { k - 1 } else { *k }, Arc::clone(v)))
        .collect()
}

/// Produce a new map with `record` placed right after `after`, later keys
/// shifted up by one.
pub fn insert_and_reindex<T: ?Sized>(
    entries: &BTreeMap<Key, Arc<T>>,
    after: Option<Key>,
    record: Arc<T>,
) -> BTreeMap<Key, Arc<T>> {
    let at = insertion_key(after);
    let mut out: BTreeMap<Key, Arc<T>> = entries
        .iter()
        .map(|(k, v)| (shift_after_insert(*k, after), Arc::clone(v)))
        .collect();
    out.insert(at, record);
    out
}

/// Copy-on-write registry of records keyed `0..len`.
///
/// Records are shared through `Arc`; an update clones the record, patches
/// the clone and swaps it in, so snapshots taken earlier never observe the
/// change.
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    entries: BTreeMap<Key, Arc<T>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T: PartialEq> PartialEq for Registry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_records(kind: &'static str, records: impl IntoIterator<Item = T>) -> Self {
        Self {
            kind,
            entries: records
                .into_iter()
                .enumerate()
                .map(|(k, r)| (k, Arc::new(r)))
                .collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.entries.get(&key).map(|r| r.as_ref())
    }

    /// Shared handle to a record; two handles are pointer-equal until the
    /// record is updated.
    pub fn get_shared(&self, key: Key) -> Option<Arc<T>> {
        self.entries.get(&key).cloned()
    }

    pub fn require(&self, key: Key) -> ModelResult<&T> {
        self.get(key).ok_or(ModelError::missing(self.kind, key))
    }

    pub fn ensure(&self, key: Key) -> ModelResult<()> {
        self.require(key).map(|_| ())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.entries.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values().map(|v| v.as_ref())
    }

    /// All records in key order.
    pub fn all(&self) -> Vec<Arc<T>> {
        self.entries.values().cloned().collect()
    }

    pub fn last_key(&self) -> Option<Key> {
        self.entries.keys().next_back().copied()
    }

    pub fn is_dense(&self) -> bool {
        self.entries.keys().enumerate().all(|(i, k)| i == *k)
    }

    /// Insert `record` right after `after` and return its key.
    pub fn insert_after(&mut self, after: Option<Key>, record: T) -> ModelResult<Key> {
        if let Some(k) = after {
            self.ensure(k)?;
        }
        self.entries = insert_and_reindex(&self.entries, after, Arc::new(record));
        Ok(insertion_key(after))
    }

    pub fn push(&mut self, record: T) -> Key {
        let key = self.entries.len();
        self.entries.insert(key, Arc::new(record));
        key
    }

    pub fn remove(&mut self, key: Key) -> ModelResult<Arc<T>> {
        let removed = self
            .entries
            .get(&key)
            .cloned()
            .ok_or(ModelError::missing(self.kind, key))?;
        self.entries = remove_and_reindex(&self.entries, key);
        Ok(removed)
    }

    pub fn replace(&mut self, key: Key, record: T) -> ModelResult<Arc<T>> {
        self.ensure(key)?;
        let record = Arc::new(record);
        self.entries.insert(key, Arc::clone(&record));
        Ok(record)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> Registry<T> {
    /// Copy-on-write update.
    pub fn update(&mut self, key: Key, patch: impl FnOnce(&mut T)) -> ModelResult<Arc<T>> {
        self.try_update(key, |r| {
            patch(r);
            Ok(())
        })
    }

    /// Copy-on-write update that may reject the patch; nothing is written
    /// unless `patch` returns `Ok`.
    pub fn try_update(
        &mut self,
        key: Key,
        patch: impl FnOnce(&mut T) -> ModelResult<()>,
    ) -> ModelResult<Arc<T>> {
        let mut next = self.require(key)?.clone();
        patch(&mut next)?;
        let next = Arc::new(next);
        self.entries.insert(key, Arc::clone(&next));
        Ok(next)
    }

    /// Apply `patch` to every record, replacing only the ones it changed.
    pub fn update_all(&mut self, mut patch: impl FnMut(Key, &mut T) -> bool) {
        for (key, record) in self.entries.iter_mut() {
            let mut next = record.as_ref().clone();
            if patch(*key, &mut next) {
                *record = Arc::new(next);
            }
        }
    }
}
