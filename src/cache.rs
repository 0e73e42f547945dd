use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub refreshed_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        now.signed_duration_since(self.refreshed_at) < lifetime
    }
}

/// How a value was obtained from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Refreshed,
}

struct Slot<V> {
    // held for the whole refresh of this key
    refresh: Mutex<()>,
    entry: RwLock<Option<CacheEntry<V>>>,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            refresh: Mutex::new(()),
            entry: RwLock::new(None),
        }
    }
}

/// Time based cache where every key expires on its own.
///
/// Each key owns a slot whose refresh mutex is held for the whole refresh,
/// so at most one refresh per key is in flight. Requests queued on the same
/// key see the refreshed value instead of fetching again. The stored entry
/// sits behind its own lock that is only taken for reads and the final
/// write, so readers never wait on a refresh. The outer map lock is only
/// held long enough to find, create or drop a slot.
pub struct KeyedCache<K, V> {
    lifetime: Duration,
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &K) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::empty()))
            .clone()
    }

    /// Returns the cached value for `key` if it is still fresh, otherwise runs
    /// `refresh` and stores its result.
    ///
    /// A failed refresh leaves the stored value exactly as it was. A key that
    /// never held a value is forgotten again unless another request is
    /// already queued on it.
    pub async fn get_or_refresh<F, Fut, E>(
        &self,
        key: &K,
        clock: &dyn Clock,
        refresh: F,
    ) -> Result<(CacheEntry<V>, Lookup), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key).await;
        let refreshing = slot.refresh.lock().await;

        let now = clock.now();
        if let Some(entry) = slot.entry.read().await.as_ref() {
            if entry.is_fresh(now, self.lifetime) {
                return Ok((entry.clone(), Lookup::Hit));
            }
        }

        match refresh().await {
            Ok(value) => {
                let entry = CacheEntry {
                    value,
                    refreshed_at: now,
                };
                *slot.entry.write().await = Some(entry.clone());
                Ok((entry, Lookup::Refreshed))
            }
            Err(err) => {
                drop(refreshing);
                self.discard_if_unused(key, &slot).await;
                Err(err)
            }
        }
    }

    // Removes a slot that holds nothing and that only the map and the caller
    // still reference.
    async fn discard_if_unused(&self, key: &K, slot: &Arc<Slot<V>>) {
        let mut slots = self.slots.lock().await;
        if Arc::strong_count(slot) != 2 || slot.entry.read().await.is_some() {
            return;
        }
        if slots.get(key).is_some_and(|stored| Arc::ptr_eq(stored, slot)) {
            slots.remove(key);
        }
    }

    /// Fresh entry for `key`, if any. Never refreshes and never waits on a
    /// request that is currently refreshing or reading that key.
    pub async fn peek(&self, key: &K, now: DateTime<Utc>) -> Option<CacheEntry<V>> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let entry = slot.entry.read().await;
        entry
            .as_ref()
            .filter(|entry| entry.is_fresh(now, self.lifetime))
            .cloned()
    }
}
