//! Coalescing per-kind work queue.
//!
//! Duplicate events for the same key collapse while it waits; a key
//! being reconciled is marked dirty instead and re-queued when the
//! worker finishes, so at most one reconcile runs per key at any moment.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

struct QueueState<K> {
    ready: VecDeque<K>,
    queued: HashSet<K>,
    in_flight: HashSet<K>,
    dirty: HashSet<K>,
}

/// Work queue for one resource kind.
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
                dirty: HashSet::new(),
            }),
            notify: Notify::new(),
        })
    }

    /// Enqueue `key`, coalescing with an already-queued copy. A key
    /// currently being processed is marked dirty and re-queued on
    /// [`WorkQueue::done`].
    pub async fn add(&self, key: K) {
        let mut state = self.state.lock().await;
        if state.in_flight.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.ready.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Enqueue `key` after `delay`.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Wait for the next key and mark it in flight.
    pub async fn next(&self) -> K {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    return key;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark a key's reconcile finished; a dirty key goes straight back in.
    pub async fn done(&self, key: &K) {
        let requeue = {
            let mut state = self.state.lock().await;
            state.in_flight.remove(key);
            state.dirty.remove(key)
        };
        if requeue {
            self.add(key.clone()).await;
        }
    }

    /// Number of keys waiting (excluding in-flight).
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.ready.is_empty()
    }
}
