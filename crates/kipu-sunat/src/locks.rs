//! # Per-Document Lock Registry
//!
//! At-most-one in-flight submission per document.
//!
//! ## Why This Exists
//! State-gated UPDATEs (kipu-db) already prevent divergent WRITES, but two
//! callers could still race the read-build-send sequence and hit the gateway
//! twice before either write lands. The registry closes that window: the
//! lock is held across the whole load → build → send → transition sequence,
//! so the second caller doesn't start until the first finished — at which
//! point the state gate turns it away cleanly.
//!
//! The process model is single-process (embedded scheduler, SQLite), so an
//! in-process keyed mutex is the whole story; there is no second process to
//! coordinate with.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex registry, one lock per document id.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        DocumentLocks {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for `document_id`, waiting if another task holds it.
    ///
    /// The guard is owned, so it can be held across `.await` points for the
    /// full submit-and-transition sequence.
    pub async fn acquire(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;

            // Drop entries nobody holds anymore so the registry stays
            // bounded by the number of concurrently in-flight documents.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);

            map.entry(document_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_document_serializes() {
        let locks = Arc::new(DocumentLocks::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();

            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("doc-1").await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        // Never more than one holder of the same document's lock
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_documents_do_not_block() {
        let locks = DocumentLocks::new();

        let guard_a = locks.acquire("doc-a").await;
        // Acquiring a different document while doc-a is held must not hang
        let guard_b =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire("doc-b")).await;
        assert!(guard_b.is_ok());

        drop(guard_a);
    }

    #[tokio::test]
    async fn test_registry_prunes_released_entries() {
        let locks = DocumentLocks::new();

        for i in 0..100 {
            let _guard = locks.acquire(&format!("doc-{}", i)).await;
        }

        // Next acquire prunes everything released above
        let _guard = locks.acquire("doc-final").await;
        let map = locks.inner.lock().await;
        assert!(map.len() <= 2);
    }
}
