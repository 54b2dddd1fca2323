use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::BridgeError;

/// How many relays may queue on the lock before new submissions are
/// rejected outright.
pub const MAX_PENDING_RELAYS: usize = 20;

/// Upper bound on how long one relay may hold the lock.
pub const MAX_HOLD_TIME: Duration = Duration::from_secs(30);

/// The single process-wide relay lock. All relays serialize on it because
/// the relayer identity is one shared native account whose sequence number
/// must advance monotonically; per-sender locking would not help.
#[derive(Clone)]
pub struct RelayLock {
    inner: Arc<Inner>,
}

struct Inner {
    mutex: Arc<Mutex<()>>,
    queued: AtomicUsize,
    max_queued: usize,
}

/// Held for the duration of one simulate→submit→persist critical section.
pub struct RelayGuard {
    _permit: OwnedMutexGuard<()>,
}

impl RelayLock {
    pub fn new(max_queued: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                mutex: Arc::new(Mutex::new(())),
                queued: AtomicUsize::new(0),
                max_queued,
            }),
        }
    }

    /// Fast rejection once the wait queue is too deep. Never blocks.
    pub fn check_queue(&self) -> Result<(), BridgeError> {
        if self.inner.queued.load(Ordering::SeqCst) > self.inner.max_queued {
            return Err(BridgeError::Busy);
        }
        Ok(())
    }

    /// Number of callers currently waiting to enter the critical section.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// Wait for exclusive access. The queue count covers the whole wait,
    /// including a caller whose acquire future is dropped early.
    pub async fn acquire(&self) -> RelayGuard {
        struct QueueSlot<'a>(&'a AtomicUsize);
        impl Drop for QueueSlot<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        let _slot = QueueSlot(&self.inner.queued);
        let permit = self.inner.mutex.clone().lock_owned().await;
        RelayGuard { _permit: permit }
    }
}

impl Default for RelayLock {
    fn default() -> Self {
        Self::new(MAX_PENDING_RELAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for_queue(lock: &RelayLock, depth: usize) {
        for _ in 0..1000 {
            if lock.queued() >= depth {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("queue never reached depth {depth}");
    }

    #[tokio::test]
    async fn rejects_once_queue_is_full() {
        let lock = RelayLock::new(2);
        let held = lock.acquire().await;

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let lock = lock.clone();
                tokio::spawn(async move {
                    let _guard = lock.acquire().await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                })
            })
            .collect();

        wait_for_queue(&lock, 3).await;
        // Queue depth 3 > max 2: immediate rejection, no timeout involved.
        assert!(matches!(lock.check_queue(), Err(BridgeError::Busy)));

        drop(held);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(lock.queued(), 0);
        assert!(lock.check_queue().is_ok());
    }

    #[tokio::test]
    async fn serializes_critical_sections() {
        let lock = RelayLock::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let _guard = lock.acquire().await;
                    let inside = counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(inside, 0, "two relays inside the critical section");
                    tokio::task::yield_now().await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
    }
}
