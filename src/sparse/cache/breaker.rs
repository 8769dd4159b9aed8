//! RAM accounting shared by the sparse caches.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Refuses reservations that would push usage past `limit`.
#[derive(Debug)]
pub struct MemoryBreaker {
    limit: usize,
    used: AtomicUsize,
}

impl MemoryBreaker {
    pub fn new(limit: usize) -> Self {
        MemoryBreaker {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserve `bytes` unless the limit would be exceeded.
    pub fn try_add(&self, bytes: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(bytes)?;
                (next <= self.limit).then_some(next)
            })
            .is_ok()
    }

    /// Reserve `bytes` even past the limit. Used for fixed per-entry overhead.
    pub fn add_without_breaking(&self, bytes: usize) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
