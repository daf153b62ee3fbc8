//! Expiring Store
//!
//! Owns values under opaque keys with a deadline and a [`Disposer`] that is
//! released when the entry goes away.
//!
//! Expiry is lazy: nothing sweeps in the background. An entry whose deadline
//! has passed is evicted by the first `get` (or `remove`) that observes it.
//! Either path takes the entry out of the map under the lock, so the disposer
//! of an entry is released exactly once no matter how reads and removals race.
//!
//! Disposers run outside the map lock. While one runs, its key is marked as
//! draining and `set`/`insert_unique` on that key wait for the release to
//! finish before reusing it.

use crate::clock::{Clock, SystemClock};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Resource released when a store entry is evicted.
///
/// `release` consumes the box, so a disposer can run at most once. It must
/// return promptly; see [`ExpiringStore::set`].
pub trait Disposer: Send {
    fn release(self: Box<Self>);
}

impl<F> Disposer for F
where
    F: FnOnce() + Send,
{
    fn release(self: Box<Self>) {
        (*self)()
    }
}

struct Entry<V> {
    value: V,
    deadline: Instant,
    disposer: Box<dyn Disposer>,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    draining: HashSet<K>,
}

/// Key-value store with per-entry deadlines and lazy eviction
pub struct ExpiringStore<K, V> {
    inner: Mutex<Inner<K, V>>,
    drained: Condvar,
    clock: Arc<dyn Clock>,
}

impl<K, V> fmt::Debug for ExpiringStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExpiringStore")
            .field("entries", &inner.entries.len())
            .field("draining", &inner.draining.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl<K, V> Default for ExpiringStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl<K, V> ExpiringStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty store reading time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                draining: HashSet::new(),
            }),
            drained: Condvar::new(),
            clock,
        }
    }

    /// Insert or overwrite the entry for `key`, expiring `ttl` from now.
    ///
    /// An overwritten entry is dropped without releasing its disposer.
    ///
    /// Disposers must not block: `set` and `insert_unique` wait on a
    /// condition variable while the key's disposer runs, and are called from
    /// async request handlers on runtime worker threads.
    pub fn set<D>(&self, key: K, value: V, ttl: Duration, disposer: D)
    where
        D: Disposer + 'static,
    {
        let deadline = self.clock.now() + ttl;
        let mut inner = self.inner.lock();
        self.wait_drained(&mut inner, &key);
        inner.entries.insert(
            key,
            Entry {
                value,
                deadline,
                disposer: Box::new(disposer),
            },
        );
    }

    /// Insert only if no live entry exists under `key`.
    ///
    /// An expired occupant is evicted (and released) first. Returns `false`
    /// and drops `value` and `disposer` unreleased when the key is taken.
    pub fn insert_unique<D>(&self, key: K, value: V, ttl: Duration, disposer: D) -> bool
    where
        D: Disposer + 'static,
    {
        self.evict_if_expired(&key);

        let deadline = self.clock.now() + ttl;
        let mut inner = self.inner.lock();
        self.wait_drained(&mut inner, &key);
        if inner.entries.contains_key(&key) {
            return false;
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                deadline,
                disposer: Box::new(disposer),
            },
        );
        true
    }

    /// Look up a live value.
    ///
    /// Returns `None` if the key is absent or its deadline has passed; in the
    /// latter case the entry is evicted before returning.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        V: Clone,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let deadline = inner.entries.get(key)?.deadline;
        if now <= deadline {
            return inner.entries.get(key).map(|entry| entry.value.clone());
        }

        let entry = inner.entries.remove(key)?;
        self.evict(inner, key.to_owned(), entry);
        None
    }

    /// Remove the entry for `key`, releasing its disposer.
    ///
    /// Returns whether an entry was present. Removing an absent key is a no-op.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let mut inner = self.inner.lock();
        match inner.entries.remove(key) {
            Some(entry) => {
                self.evict(inner, key.to_owned(), entry);
                true
            }
            None => false,
        }
    }

    /// Number of stored entries, including expired ones not yet observed
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_if_expired(&self, key: &K) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired = inner
            .entries
            .get(key)
            .is_some_and(|entry| now > entry.deadline);
        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                self.evict(inner, key.clone(), entry);
            }
        }
    }

    /// Release an entry that has already been taken out of the map.
    fn evict(&self, mut inner: MutexGuard<'_, Inner<K, V>>, key: K, entry: Entry<V>) {
        inner.draining.insert(key.clone());
        drop(inner);

        let _drain = DrainGuard { store: self, key };
        let Entry {
            value, disposer, ..
        } = entry;
        disposer.release();
        drop(value);
    }

    fn wait_drained(&self, inner: &mut MutexGuard<'_, Inner<K, V>>, key: &K) {
        while inner.draining.contains(key) {
            self.drained.wait(inner);
        }
    }
}

/// Clears the draining mark even if a disposer panics
struct DrainGuard<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    store: &'a ExpiringStore<K, V>,
    key: K,
}

impl<K, V> Drop for DrainGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let mut inner = self.store.inner.lock();
        inner.draining.remove(&self.key);
        drop(inner);
        self.store.drained.notify_all();
    }
}
