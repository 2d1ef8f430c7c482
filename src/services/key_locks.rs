//! Per-key async mutexes used to serialise read-then-write sequences on
//! stock and revenue rows that share a composite key.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap<K> = DashMap<K, Arc<Mutex<()>>>;

/// Registry of lazily created mutexes, one per key.
///
/// An entry lives only while someone holds or waits for its mutex; the last
/// [`KeyGuard`] to be released removes it, so client-supplied keys do not
/// accumulate.
pub struct KeyedLocks<K> {
    locks: Arc<LockMap<K>>,
}

/// Exclusive access to one key. Releases the mutex on drop and evicts the
/// entry when nobody else references it.
pub struct KeyGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    locks: Arc<LockMap<K>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl<K> fmt::Debug for KeyGuard<K>
where
    K: Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.key).finish()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    fn mutex_for(&self, key: &K) -> Arc<Mutex<()>> {
        // The map shard guard must not live across an await.
        Arc::clone(
            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let guard = self.mutex_for(key).lock_owned().await;
        KeyGuard {
            key: key.clone(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Locks every distinct key in ascending order.
    ///
    /// All multi-key callers go through this so that two callers can never
    /// hold overlapping keys in opposite orders.
    pub async fn lock_many<I>(&self, keys: I) -> Vec<KeyGuard<K>>
    where
        I: IntoIterator<Item = K>,
    {
        let ordered: BTreeSet<K> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for KeyedLocks<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks")
            .field("keys", &self.locks.len())
            .finish()
    }
}
