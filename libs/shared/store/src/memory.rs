use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use tracing::debug;

/// Single-node typed document store.
///
/// Each `Collection` owns one keyed set of records behind an `RwLock`.
/// `update` runs the caller's closure while holding the write lock, so a
/// read-modify-write expressed as one closure is indivisible with respect to
/// every other `update` on the same collection. This is the atomic primitive
/// the reservation engine builds its claim/release on.
///
/// No await may happen inside the closures; the std lock is held across
/// plain computation only.
pub struct Collection<K, V> {
    records: RwLock<HashMap<K, V>>,
}

impl<K, V> Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.records
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.records
            .read()
            .expect("store lock poisoned")
            .contains_key(key)
    }

    /// Insert or replace a record, returning the previous value if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.records
            .write()
            .expect("store lock poisoned")
            .insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.records
            .write()
            .expect("store lock poisoned")
            .remove(key)
    }

    /// Apply `f` to the record under the write lock.
    ///
    /// Returns `None` when no record exists for `key`; otherwise the
    /// closure's result. The check-and-mutate inside `f` cannot interleave
    /// with any other `update`, `insert` or `remove` on this collection.
    pub fn update<T>(&self, key: &K, f: impl FnOnce(&mut V) -> T) -> Option<T> {
        let mut records = self.records.write().expect("store lock poisoned");
        records.get_mut(key).map(f)
    }

    /// Snapshot every record matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&V) -> bool) -> Vec<V> {
        self.records
            .read()
            .expect("store lock poisoned")
            .values()
            .filter(|v| predicate(v))
            .cloned()
            .collect()
    }

    /// First record matching `predicate`, if any.
    pub fn find_one(&self, predicate: impl Fn(&V) -> bool) -> Option<V> {
        self.records
            .read()
            .expect("store lock poisoned")
            .values()
            .find(|v| predicate(v))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut records = self.records.write().expect("store lock poisoned");
        debug!("clearing {} records", records.len());
        records.clear();
    }
}

impl<K, V> Default for Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
