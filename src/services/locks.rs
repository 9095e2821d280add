// src/services/locks.rs
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// One async lock per key, created on first use.
///
/// An entry lives only while someone holds or waits for its lock, so the map
/// stays as small as the set of keys currently in use.
pub struct KeyedLocks<K> {
    registry: Registry<K>,
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        KeyedLocks {
            registry: self.registry.clone(),
        }
    }
}

impl<K: Hash + Eq + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        KeyedLocks {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Held lock for one key. Dropping it releases the lock and forgets the key
/// if nobody else is using it.
pub struct KeyPermit<K: Hash + Eq> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    registry: Registry<K>,
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<K, Arc<AsyncMutex<()>>>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_for(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut locks = self.registry();
        if !locks.contains_key(key) {
            // entries left behind by abandoned waiters
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn permit(&self, key: K, guard: OwnedMutexGuard<()>) -> KeyPermit<K> {
        KeyPermit {
            guard: Some(guard),
            key,
            registry: self.registry.clone(),
        }
    }

    /// Takes the lock for `key` if it is free right now.
    pub fn try_acquire(&self, key: K) -> Option<KeyPermit<K>> {
        let lock = self.lock_for(&key);
        match lock.try_lock_owned() {
            Ok(guard) => Some(self.permit(key, guard)),
            Err(_) => None,
        }
    }

    /// Waits for the lock for `key`.
    pub async fn acquire(&self, key: K) -> KeyPermit<K> {
        let guard = self.lock_for(&key).lock_owned().await;
        self.permit(key, guard)
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq> Drop for KeyPermit<K> {
    fn drop(&mut self) {
        let mut locks = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // clones are only handed out under the registry mutex, so a count of
        // one here means no holder and no waiter
        self.guard.take();
        if locks.get(&self.key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyedLocks::new();

        let a = locks.acquire("a".to_string()).await;
        let b = locks.try_acquire("b".to_string()).unwrap();
        assert_eq!(locks.len(), 2);

        drop(a);
        assert_eq!(locks.len(), 1);
        drop(b);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn held_key_cannot_be_taken_twice() {
        let locks = KeyedLocks::new();

        let held = locks.try_acquire("alice").unwrap();
        assert!(locks.try_acquire("alice").is_none());
        assert!(locks.try_acquire("bob").is_some());

        drop(held);
        assert!(locks.try_acquire("alice").is_some());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_keeps_the_entry_until_it_is_done() {
        let locks = KeyedLocks::new();
        let held = locks.acquire("alice").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _permit = locks.acquire("alice").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert_eq!(locks.len(), 1, "waiter still needs the lock");
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_pin_the_entry() {
        let locks = KeyedLocks::new();
        let held = locks.acquire("alice").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _permit = locks.acquire("alice").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(held);
        let _other = locks.acquire("bob").await;
        assert_eq!(locks.len(), 1);
    }
}
