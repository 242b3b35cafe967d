//! Per-conversation locks.
//!
//! The registry map sits behind a plain `std` mutex that is only held long
//! enough to clone an `Arc`; it is never held across an `.await`. The
//! per-conversation locks themselves are tokio mutexes, held for the whole
//! of an operation including the module call.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    /// Set once the conversation is terminal (or turned out not to exist).
    retired_at: Option<DateTime<Utc>>,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            lock: Arc::new(AsyncMutex::new(())),
            retired_at: None,
        }
    }
}

/// Guard proving the holder has exclusive access to one conversation.
#[derive(Debug)]
pub struct ConversationGuard {
    conversation_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl ConversationGuard {
    #[must_use]
    pub const fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

#[derive(Debug, Default)]
pub struct LockRegistry {
    entries: Mutex<HashMap<Uuid, LockEntry>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, LockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `conversation_id`, creating its lock on first use.
    pub async fn acquire(&self, conversation_id: Uuid) -> ConversationGuard {
        let lock = {
            let mut entries = self.entries();
            Arc::clone(
                &entries
                    .entry(conversation_id)
                    .or_insert_with(LockEntry::new)
                    .lock,
            )
        };

        ConversationGuard {
            conversation_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Mark the conversation's lock as evictable from `at` onwards.
    pub fn retire(&self, conversation_id: Uuid, at: DateTime<Utc>) {
        if let Some(entry) = self.entries().get_mut(&conversation_id) {
            entry.retired_at.get_or_insert(at);
        }
    }

    /// Drop locks retired for longer than `grace` that nobody holds or waits on.
    ///
    /// Returns the number of entries removed.
    pub fn evict_idle(&self, now: DateTime<Utc>, grace: Duration) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            let expired = entry
                .retired_at
                .is_some_and(|retired| now - retired > grace);
            // The map holds one reference; any other is a holder or a waiter.
            !(expired && Arc::strong_count(&entry.lock) == 1)
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {evicted} idle conversation lock(s)");
        }
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    #[must_use]
    pub fn contains(&self, conversation_id: &Uuid) -> bool {
        self.entries().contains_key(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn lock_is_created_lazily() {
        let registry = LockRegistry::new();
        let id = Uuid::now_v7();
        assert!(registry.is_empty());

        let guard = registry.acquire(id).await;
        assert_eq!(guard.conversation_id(), id);
        assert!(registry.contains(&id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_conversation_is_serialized() {
        let registry = Arc::new(LockRegistry::new());
        let id = Uuid::now_v7();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let registry = LockRegistry::new();
        let _a = registry.acquire(Uuid::now_v7()).await;
        let acquired = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            registry.acquire(Uuid::now_v7()),
        )
        .await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn eviction_waits_for_grace_period() {
        let registry = LockRegistry::new();
        let id = Uuid::now_v7();
        let now = Utc::now();
        drop(registry.acquire(id).await);

        registry.retire(id, now);
        assert_eq!(registry.evict_idle(now + Duration::seconds(30), Duration::seconds(60)), 0);
        assert_eq!(registry.evict_idle(now + Duration::seconds(61), Duration::seconds(60)), 1);
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn held_locks_are_not_evicted() {
        let registry = LockRegistry::new();
        let id = Uuid::now_v7();
        let now = Utc::now();

        let guard = registry.acquire(id).await;
        registry.retire(id, now);
        assert_eq!(registry.evict_idle(now + Duration::hours(1), Duration::seconds(1)), 0);

        drop(guard);
        assert_eq!(registry.evict_idle(now + Duration::hours(1), Duration::seconds(1)), 1);
    }

    #[tokio::test]
    async fn unretired_locks_are_kept() {
        let registry = LockRegistry::new();
        let id = Uuid::now_v7();
        drop(registry.acquire(id).await);

        assert_eq!(registry.evict_idle(Utc::now() + Duration::days(1), Duration::zero()), 0);
        assert!(registry.contains(&id));
    }
}
