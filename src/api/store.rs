//! Scoped key/value stores
//!
//! Every scope (engine, class, argument) owns a [`Store`] and a
//! [`SharedMap`]. Both are insertion-ordered and internally
//! synchronized; the store additionally closes closeable values in
//! reverse insertion order when the scope ends.

use std::any::Any;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::value::Slot;
use super::AutoClose;

/// Insertion-ordered key/value store with an auto-close contract.
///
/// Replacing an existing key keeps its original insertion position, so
/// teardown order reflects first insertion.
#[derive(Default)]
pub struct Store {
    entries: Mutex<Vec<(String, Slot)>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a plain value.
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.put_slot(key.into(), Slot::plain(value));
    }

    /// Insert or replace a value that is closed at scope end.
    pub fn put_closeable<T: Any + AutoClose + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.put_slot(key.into(), Slot::closeable(value));
    }

    fn put_slot(&self, key: String, slot: Slot) {
        let mut entries = self.entries.lock();
        if let Some(position) = entries.iter().position(|(k, _)| *k == key) {
            entries[position].1 = slot;
        } else {
            entries.push((key, slot));
        }
    }

    /// Borrow the value for `key` as `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<MappedMutexGuard<'_, T>> {
        let entries = self.entries.lock();
        MutexGuard::try_map(entries, |entries| {
            entries
                .iter_mut()
                .find(|(k, _)| k == key)
                .and_then(|(_, slot)| slot.downcast_mut::<T>())
        })
        .ok()
    }

    /// Atomically get the value for `key`, inserting it from `factory`
    /// when absent. Returns `None` only when an existing value has a
    /// type other than `T`.
    pub fn get_or_insert_with<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        factory: impl FnOnce() -> T,
    ) -> Option<MappedMutexGuard<'_, T>> {
        let key = key.into();
        let mut entries = self.entries.lock();

        if !entries.iter().any(|(k, _)| *k == key) {
            entries.push((key.clone(), Slot::plain(factory())));
        }

        MutexGuard::try_map(entries, |entries| {
            entries
                .iter_mut()
                .find(|(k, _)| *k == key)
                .and_then(|(_, slot)| slot.downcast_mut::<T>())
        })
        .ok()
    }

    /// Remove the entry for `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        entries.len() != before
    }

    /// Remove the entry for `key` and return it as `T`. The entry is
    /// removed even when the type does not match.
    pub fn remove_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Box<T>> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|(k, _)| k == key)?;
        let (_, slot) = entries.remove(index);
        slot.into_any().downcast::<T>().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().iter().any(|(k, _)| k == key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Close closeable values in reverse insertion order and clear the
    /// store. Entries are detached before closing so user `close`
    /// implementations may touch the store without deadlocking.
    pub(crate) fn close_all(&self) -> Vec<anyhow::Error> {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut errors = Vec::new();

        for (key, mut slot) in entries.into_iter().rev() {
            if let Err(error) = slot.close() {
                tracing::warn!("failed to close store entry [{key}]: {error}");
                errors.push(error);
            }
        }

        errors
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("keys", &self.keys()).finish()
    }
}

/// Insertion-ordered key/value map without the auto-close contract.
#[derive(Default)]
pub struct SharedMap {
    entries: Mutex<Vec<(String, Box<dyn Any + Send + Sync>)>>,
}

impl SharedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        let mut entries = self.entries.lock();
        if let Some(position) = entries.iter().position(|(k, _)| *k == key) {
            entries[position].1 = Box::new(value);
        } else {
            entries.push((key, Box::new(value)));
        }
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<MappedMutexGuard<'_, T>> {
        let entries = self.entries.lock();
        MutexGuard::try_map(entries, |entries| {
            entries
                .iter_mut()
                .find(|(k, _)| k == key)
                .and_then(|(_, value)| value.downcast_mut::<T>())
        })
        .ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        entries.len() != before
    }

    pub fn remove_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Box<T>> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|(k, _)| k == key)?;
        let (_, value) = entries.remove(index);
        value.downcast::<T>().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for SharedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMap")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct Tracked {
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl AutoClose for Tracked {
        fn close(&mut self) -> anyhow::Result<()> {
            self.order.lock().push(self.label);
            if self.fail {
                anyhow::bail!("close failed for {}", self.label);
            }
            Ok(())
        }
    }

    #[test]
    fn test_insertion_order_preserved() {
        let store = Store::new();
        store.put("b", 1u32);
        store.put("a", 2u32);
        store.put("c", 3u32);
        assert_eq!(store.keys(), vec!["b", "a", "c"]);

        // Replacing keeps the original position.
        store.put("a", 9u32);
        assert_eq!(store.keys(), vec!["b", "a", "c"]);
        assert_eq!(*store.get::<u32>("a").unwrap(), 9);
    }

    #[test]
    fn test_get_or_insert_with() {
        let store = Store::new();

        {
            let value = store.get_or_insert_with("n", || 7u32).unwrap();
            assert_eq!(*value, 7);
        }

        // Factory is not re-run for an existing key.
        let value = store
            .get_or_insert_with::<u32>("n", || unreachable!())
            .unwrap();
        assert_eq!(*value, 7u32);

        // Type mismatch on an existing key.
        assert!(store.get_or_insert_with("n", String::new).is_none());
    }

    #[test]
    fn test_remove_as() {
        let store = Store::new();
        store.put("k", "value".to_string());

        let value = store.remove_as::<String>("k").unwrap();
        assert_eq!(*value, "value");
        assert!(store.is_empty());
    }

    #[test]
    fn test_close_all_runs_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let store = Store::new();

        for label in ["a", "b", "c"] {
            store.put_closeable(
                label,
                Tracked {
                    label,
                    order: order.clone(),
                    fail: false,
                },
            );
        }

        let errors = store.close_all();
        assert!(errors.is_empty());
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_close_all_continues_past_errors() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let store = Store::new();

        for (label, fail) in [("a", false), ("b", true), ("c", false)] {
            store.put_closeable(
                label,
                Tracked {
                    label,
                    order: order.clone(),
                    fail,
                },
            );
        }

        let errors = store.close_all();
        assert_eq!(errors.len(), 1);
        // b failed but a was still closed after it.
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(Store::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.get_or_insert_with("shared", || {
                            counter.fetch_add(1, Ordering::SeqCst);
                            0u64
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // The factory ran exactly once despite concurrent callers.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_map() {
        let map = SharedMap::new();
        map.put("x", 1i64);
        map.put("y", 2i64);
        assert_eq!(map.keys(), vec!["x", "y"]);
        assert_eq!(*map.get::<i64>("y").unwrap(), 2);
        assert!(map.remove("x"));
        assert!(!map.contains("x"));
    }
}
