#![forbid(unsafe_code)]

use cms_core::{ContentId, OperationStatus};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of the wait loop; bounds how late a cancel is noticed.
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Caller-owned cancel signal shared across threads.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), OperationStatus> {
        if self.is_cancelled() {
            Err(OperationStatus::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct LockSlot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Per-content exclusive locks. Slots are created on demand and dropped once idle.
#[derive(Debug)]
pub struct ContentLocks {
    slots: DashMap<ContentId, Arc<LockSlot>>,
    timeout: Duration,
}

impl ContentLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            timeout,
        }
    }

    /// Blocks until the node is free, the timeout passes (`ConcurrencyViolation`)
    /// or `cancel` fires (`Cancelled`).
    pub fn acquire(
        &self,
        content_id: ContentId,
        cancel: &CancellationToken,
    ) -> Result<ContentLockGuard<'_>, OperationStatus> {
        cancel.check()?;
        let slot = self.slots.entry(content_id).or_default().clone();
        let deadline = Instant::now() + self.timeout;

        let acquired = {
            let mut held = slot.held.lock();
            loop {
                if !*held {
                    *held = true;
                    break Ok(());
                }
                if cancel.is_cancelled() {
                    break Err(OperationStatus::Cancelled);
                }
                let now = Instant::now();
                if now >= deadline {
                    break Err(OperationStatus::ConcurrencyViolation);
                }
                slot.released.wait_until(&mut held, deadline.min(now + WAIT_SLICE));
            }
        };
        if let Err(status) = acquired {
            drop(slot);
            self.forget_if_idle(content_id);
            return Err(status);
        }

        Ok(ContentLockGuard {
            locks: self,
            content_id,
            slot,
        })
    }

    /// Locks several nodes in the given order; all or nothing.
    pub fn acquire_all(
        &self,
        content_ids: &[ContentId],
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentLockGuard<'_>>, OperationStatus> {
        let mut guards = Vec::with_capacity(content_ids.len());
        for content_id in content_ids {
            guards.push(self.acquire(*content_id, cancel)?);
        }
        Ok(guards)
    }

    pub fn is_locked(&self, content_id: ContentId) -> bool {
        self.slots
            .get(&content_id)
            .is_some_and(|slot| *slot.held.lock())
    }

    /// Number of slots currently tracked.
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    fn forget_if_idle(&self, content_id: ContentId) {
        self.slots.remove_if(&content_id, |_, slot| {
            Arc::strong_count(slot) == 1 && !*slot.held.lock()
        });
    }
}

pub struct ContentLockGuard<'a> {
    locks: &'a ContentLocks,
    content_id: ContentId,
    slot: Arc<LockSlot>,
}

impl ContentLockGuard<'_> {
    pub fn content_id(&self) -> ContentId {
        self.content_id
    }
}

impl Drop for ContentLockGuard<'_> {
    fn drop(&mut self) {
        *self.slot.held.lock() = false;
        self.slot.released.notify_one();
        let content_id = self.content_id;
        let locks = self.locks;
        // Our own Arc still counts here, so compare against two.
        locks.slots.remove_if(&content_id, |_, slot| {
            Arc::strong_count(slot) == 2 && !*slot.held.lock()
        });
    }
}

impl std::fmt::Debug for ContentLockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentLockGuard")
            .field("content_id", &self.content_id)
            .finish()
    }
}
