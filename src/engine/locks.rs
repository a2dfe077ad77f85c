use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by id. Holding the guard makes the enclosed
/// read-decide-write span a critical section for that key only.
///
/// An entry lives only while someone holds or waits on it.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// Releases the key on drop and prunes its entry once nobody else wants it.
pub struct KeyGuard<'a, K: Eq + Hash> {
    key: K,
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones happen under the shard lock, so a count of one means the map
        // holds the only reference.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Copy,
{
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        KeyGuard {
            key,
            locks: &self.locks,
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Locks every key in ascending order so callers never deadlock on each other.
    pub async fn lock_all(&self, keys: &[K]) -> Vec<KeyGuard<'_, K>> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Ord + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::KeyedLocks;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::<u32>::new();
        let _a = locks.lock(1).await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn lock_all_dedups_keys() {
        let locks = KeyedLocks::<u32>::new();
        let guards = locks.lock_all(&[3, 1, 3]).await;

        assert_eq!(guards.len(), 2);
        assert_eq!(locks.len(), 2);

        drop(guards);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn entries_are_pruned_once_contention_ends() {
        let locks = Arc::new(KeyedLocks::<u32>::new());

        let mut handles = Vec::new();
        for i in 0..64u32 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(i % 4).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn waiter_keeps_the_entry_alive() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let first = locks.lock(9).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(9).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert!(tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .is_ok());
        assert_eq!(locks.len(), 0);
    }
}
