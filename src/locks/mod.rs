//! Keyed lock manager
//!
//! A map from user-supplied key to a reentrant mutex with
//! reference-counted lifetime: `lock` creates the entry on demand and
//! `unlock` removes it when the last balanced pair releases. Handoff is
//! fair (strict FIFO among waiters). These are blocking locks intended
//! for user-level coordination across argument workers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Unlock errors. The original engine raises illegal-monitor-state for
/// both cases; here they are typed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("lock [{0}] is not locked")]
    NotLocked(String),

    #[error("lock [{0}] is not held by the current thread")]
    NotOwner(String),
}

#[derive(Default)]
struct Entry {
    owner: Option<ThreadId>,
    depth: usize,
    /// Held acquisitions plus queued waiters; the entry is evicted when
    /// this reaches zero.
    ref_count: usize,
    queue: VecDeque<u64>,
}

/// Engine-scoped keyed lock manager.
pub struct LockManager {
    state: Mutex<HashMap<String, Entry>>,
    condvar: Condvar,
    next_ticket: AtomicU64,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Acquire the lock for `key`, blocking. Reentrant: a thread that
    /// already holds the lock acquires again immediately.
    pub fn lock(&self, key: impl Into<String>) {
        let key = key.into();
        let me = std::thread::current().id();
        let mut state = self.state.lock();

        let entry = state.entry(key.clone()).or_default();
        entry.ref_count += 1;

        if entry.owner == Some(me) {
            entry.depth += 1;
            return;
        }

        if entry.owner.is_none() && entry.queue.is_empty() {
            entry.owner = Some(me);
            entry.depth = 1;
            return;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        entry.queue.push_back(ticket);

        loop {
            self.condvar.wait(&mut state);
            // The entry cannot be evicted while our ticket holds a
            // reference.
            let entry = state.get_mut(&key).unwrap();
            if entry.owner.is_none() && entry.queue.front() == Some(&ticket) {
                entry.queue.pop_front();
                entry.owner = Some(me);
                entry.depth = 1;
                return;
            }
        }
    }

    /// Acquire the lock for `key` only if it is free (or already held by
    /// the current thread).
    pub fn try_lock(&self, key: impl Into<String>) -> bool {
        let key = key.into();
        let me = std::thread::current().id();
        let mut state = self.state.lock();

        let entry = state.entry(key.clone()).or_default();

        if entry.owner == Some(me) {
            entry.ref_count += 1;
            entry.depth += 1;
            return true;
        }

        if entry.owner.is_none() && entry.queue.is_empty() {
            entry.ref_count += 1;
            entry.owner = Some(me);
            entry.depth = 1;
            return true;
        }

        // Contended; the entry pre-existed, nothing to roll back.
        false
    }

    /// Acquire the lock for `key`, waiting at most `timeout`.
    pub fn try_lock_for(&self, key: impl Into<String>, timeout: Duration) -> bool {
        let key = key.into();
        let me = std::thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        let entry = state.entry(key.clone()).or_default();
        entry.ref_count += 1;

        if entry.owner == Some(me) {
            entry.depth += 1;
            return true;
        }

        if entry.owner.is_none() && entry.queue.is_empty() {
            entry.owner = Some(me);
            entry.depth = 1;
            return true;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        entry.queue.push_back(ticket);

        loop {
            let timed_out = self.condvar.wait_until(&mut state, deadline).timed_out();
            let entry = state.get_mut(&key).unwrap();

            if entry.owner.is_none() && entry.queue.front() == Some(&ticket) {
                entry.queue.pop_front();
                entry.owner = Some(me);
                entry.depth = 1;
                return true;
            }

            if timed_out {
                entry.queue.retain(|queued| *queued != ticket);
                entry.ref_count -= 1;
                if entry.ref_count == 0 {
                    state.remove(&key);
                } else {
                    // Our departure may have moved another waiter to
                    // the front.
                    self.condvar.notify_all();
                }
                return false;
            }
        }
    }

    /// Release one acquisition of the lock for `key`.
    pub fn unlock(&self, key: &str) -> Result<(), LockError> {
        let me = std::thread::current().id();
        let mut state = self.state.lock();

        let entry = state
            .get_mut(key)
            .ok_or_else(|| LockError::NotLocked(key.to_string()))?;

        if entry.owner != Some(me) {
            return Err(LockError::NotOwner(key.to_string()));
        }

        entry.depth -= 1;
        entry.ref_count -= 1;

        if entry.depth == 0 {
            entry.owner = None;
            if entry.ref_count == 0 {
                state.remove(key);
            }
            self.condvar.notify_all();
        }

        Ok(())
    }

    /// Acquire and return a guard that releases on drop.
    pub fn hold(&self, key: impl Into<String>) -> KeyedLockGuard<'_> {
        let key = key.into();
        self.lock(key.clone());
        KeyedLockGuard { manager: self, key }
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<R>(&self, key: impl Into<String>, f: impl FnOnce() -> R) -> R {
        let _guard = self.hold(key);
        f()
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.state.lock().len()
    }
}

/// Releases its key on drop.
pub struct KeyedLockGuard<'a> {
    manager: &'a LockManager,
    key: String,
}

impl KeyedLockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.manager.unlock(&self.key) {
            tracing::warn!("failed to release lock [{}]: {error}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_balanced_pair_leaves_no_entry() {
        let manager = LockManager::new();
        manager.lock("k");
        assert_eq!(manager.entry_count(), 1);
        manager.unlock("k").unwrap();
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_reentrant() {
        let manager = LockManager::new();
        manager.lock("k");
        manager.lock("k");
        manager.unlock("k").unwrap();
        // Still held after the inner release.
        assert_eq!(manager.entry_count(), 1);
        manager.unlock("k").unwrap();
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_unlock_without_lock() {
        let manager = LockManager::new();
        assert_eq!(
            manager.unlock("missing"),
            Err(LockError::NotLocked("missing".to_string()))
        );
    }

    #[test]
    fn test_unlock_from_other_thread() {
        let manager = Arc::new(LockManager::new());
        manager.lock("k");

        let other = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.unlock("k"))
        };

        assert_eq!(
            other.join().unwrap(),
            Err(LockError::NotOwner("k".to_string()))
        );

        manager.unlock("k").unwrap();
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_try_lock_contended() {
        let manager = Arc::new(LockManager::new());
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let manager = manager.clone();
            std::thread::spawn(move || {
                manager.lock("k");
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                manager.unlock("k").unwrap();
            })
        };

        held_rx.recv().unwrap();
        assert!(!manager.try_lock("k"));

        release_tx.send(()).unwrap();
        holder.join().unwrap();

        // The failed try did not leak an entry.
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_try_lock_uncontended() {
        let manager = LockManager::new();
        assert!(manager.try_lock("k"));
        assert!(manager.try_lock("k"));
        manager.unlock("k").unwrap();
        manager.unlock("k").unwrap();
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_try_lock_for_times_out() {
        let manager = Arc::new(LockManager::new());
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let manager = manager.clone();
            std::thread::spawn(move || {
                manager.lock("k");
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                manager.unlock("k").unwrap();
            })
        };

        held_rx.recv().unwrap();
        assert!(!manager.try_lock_for("k", Duration::from_millis(50)));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_try_lock_for_acquires_after_release() {
        let manager = Arc::new(LockManager::new());
        manager.lock("k");

        let waiter = {
            let manager = manager.clone();
            std::thread::spawn(move || {
                let acquired = manager.try_lock_for("k", Duration::from_secs(5));
                if acquired {
                    manager.unlock("k").unwrap();
                }
                acquired
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        manager.unlock("k").unwrap();

        assert!(waiter.join().unwrap());
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_with_lock_is_mutually_exclusive() {
        let manager = Arc::new(LockManager::new());
        let counter = Arc::new(Mutex::new(0u64));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        manager.with_lock("counter", || {
                            let mut counter = counter.lock();
                            *counter += 1;
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), 1000);
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let manager = LockManager::new();
        {
            let guard = manager.hold("k");
            assert_eq!(guard.key(), "k");
            assert_eq!(manager.entry_count(), 1);
        }
        assert_eq!(manager.entry_count(), 0);
    }
}
