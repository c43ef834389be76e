use crate::error::Error;
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded map with least-recently-used eviction.
///
/// Shared by the epoch consensus store and the proof-of-work dataset cache.
/// Values are cloned out of the lock, so callers typically store `Arc`s.
pub struct BoundedLru<K, V> {
    name: &'static str,
    inner: Mutex<LruCache<K, V>>,
}

impl<K, V> BoundedLru<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::InvalidConfig(format!("{name} cache capacity must be >= 1")))?;
        Ok(Self {
            name,
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Insert or replace `key`. Returns `true` if another entry was evicted.
    pub fn add(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock();
        match inner.push(key.clone(), value) {
            Some((evicted, _)) if evicted != key => {
                tracing::trace!(cache = self.name, key = ?evicted, "evicted entry");
                true
            }
            _ => false,
        }
    }

    /// Insert `value` under `key` if `check` admits it. `check` sees every
    /// entry and runs under the same lock as the insert. Returns `Ok(false)`
    /// when `check` declines without error.
    pub fn add_if<E, F>(&self, key: K, value: V, check: F) -> Result<bool, E>
    where
        F: FnOnce(&mut dyn Iterator<Item = (&K, &V)>) -> Result<bool, E>,
    {
        let mut inner = self.inner.lock();
        if !check(&mut inner.iter())? {
            return Ok(false);
        }
        if let Some((evicted, _)) = inner.push(key.clone(), value) {
            if evicted != key {
                tracing::trace!(cache = self.name, key = ?evicted, "evicted entry");
            }
        }
        Ok(true)
    }

    /// Fetch `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Fetch `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().peek(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    /// First entry matching `pred`, scanning from most to least recent
    /// without touching recency.
    pub fn find<F>(&self, pred: F) -> Option<(K, V)>
    where
        F: Fn(&K, &V) -> bool,
    {
        self.inner
            .lock()
            .iter()
            .find(|(k, v)| pred(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Return the cached value for `key`, building it with `ctor` on a miss.
    pub fn get_or_insert_with<F>(&self, key: K, ctor: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.get(&key) {
            return value.clone();
        }
        let value = ctor(&key);
        if let Some((evicted, _)) = inner.push(key, value.clone()) {
            tracing::trace!(cache = self.name, key = ?evicted, "evicted entry");
        }
        value
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
