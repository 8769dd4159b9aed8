//! Cached forward index: doc id -> sparse vector for one segment field.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::warn;
use parking_lot::RwLock;

use crate::error::Result;
use crate::sparse::algorithm::SparseVectorReader;
use crate::sparse::cache::breaker::MemoryBreaker;
use crate::sparse::vector::SparseVector;

/// Result of [`ForwardIndexCacheItem::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The slot already holds a vector; it is left untouched.
    Occupied,
    /// The memory breaker refused the vector, or the item was evicted.
    Refused,
    OutOfRange,
}

/// Fixed-size slot array, one slot per document of the segment.
#[derive(Debug)]
pub struct ForwardIndexCacheItem {
    slots: RwLock<Vec<Option<Arc<SparseVector>>>>,
    ram_bytes: AtomicUsize,
    closed: AtomicBool,
    breaker: Arc<MemoryBreaker>,
}

impl ForwardIndexCacheItem {
    pub fn new(doc_count: usize, breaker: Arc<MemoryBreaker>) -> Self {
        let base = std::mem::size_of::<Self>()
            + doc_count * std::mem::size_of::<Option<Arc<SparseVector>>>();
        breaker.add_without_breaking(base);
        ForwardIndexCacheItem {
            slots: RwLock::new(vec![None; doc_count]),
            ram_bytes: AtomicUsize::new(base),
            closed: AtomicBool::new(false),
            breaker,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.slots.read().len()
    }

    pub fn get(&self, doc: i32) -> Option<Arc<SparseVector>> {
        let index = usize::try_from(doc).ok()?;
        self.slots.read().get(index).cloned().flatten()
    }

    /// Fill an empty slot. A filled slot is never overwritten.
    pub fn insert(&self, doc: i32, vector: SparseVector) -> InsertOutcome {
        let Ok(index) = usize::try_from(doc) else {
            return InsertOutcome::OutOfRange;
        };
        if self.closed.load(Ordering::Acquire) {
            return InsertOutcome::Refused;
        }
        match self.slots.read().get(index) {
            None => return InsertOutcome::OutOfRange,
            Some(Some(_)) => return InsertOutcome::Occupied,
            Some(None) => {}
        }

        let bytes = vector.ram_bytes_used();
        if !self.breaker.try_add(bytes) {
            warn!("memory limit reached, vector of doc {doc} will not be cached");
            return InsertOutcome::Refused;
        }

        let mut slots = self.slots.write();
        if self.closed.load(Ordering::Acquire) {
            self.breaker.release(bytes);
            return InsertOutcome::Refused;
        }
        if slots[index].is_some() {
            self.breaker.release(bytes);
            return InsertOutcome::Occupied;
        }
        slots[index] = Some(Arc::new(vector));
        self.ram_bytes.fetch_add(bytes, Ordering::AcqRel);
        InsertOutcome::Inserted
    }

    /// Empty a slot and return the bytes freed.
    pub fn erase(&self, doc: i32) -> usize {
        let Ok(index) = usize::try_from(doc) else {
            return 0;
        };
        let mut slots = self.slots.write();
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        let removed = match slots.get_mut(index) {
            Some(slot) => slot.take(),
            None => None,
        };
        let Some(vector) = removed else {
            return 0;
        };
        let bytes = vector.ram_bytes_used();
        self.ram_bytes.fetch_sub(bytes, Ordering::AcqRel);
        self.breaker.release(bytes);
        bytes
    }

    pub fn ram_bytes_used(&self) -> usize {
        self.ram_bytes.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hand every byte of this item back to the breaker. Later inserts are
    /// refused.
    pub(crate) fn release_all(&self) {
        let _slots = self.slots.write();
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.breaker.release(self.ram_bytes.swap(0, Ordering::AcqRel));
        }
    }
}

impl SparseVectorReader for ForwardIndexCacheItem {
    fn read(&self, doc: i32) -> Result<Option<Arc<SparseVector>>> {
        Ok(self.get(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(doc_count: usize, limit: usize) -> ForwardIndexCacheItem {
        ForwardIndexCacheItem::new(doc_count, Arc::new(MemoryBreaker::new(limit)))
    }

    #[test]
    fn test_insert_only_fills_empty_slots() {
        let cache = item(3, usize::MAX);
        let v = SparseVector::new(vec![(1, 9)]);
        assert_eq!(cache.insert(1, v.clone()), InsertOutcome::Inserted);
        assert_eq!(cache.insert(1, SparseVector::new(vec![(2, 1)])), InsertOutcome::Occupied);
        assert_eq!(cache.get(1).as_deref(), Some(&v));
        assert_eq!(cache.insert(3, v.clone()), InsertOutcome::OutOfRange);
        assert_eq!(cache.insert(-1, v), InsertOutcome::OutOfRange);
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn test_breaker_refuses_insert() {
        let cache = item(2, 0);
        assert_eq!(cache.insert(0, SparseVector::new(vec![(1, 1)])), InsertOutcome::Refused);
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn test_erase_releases_memory() {
        let breaker = Arc::new(MemoryBreaker::new(usize::MAX));
        let cache = ForwardIndexCacheItem::new(2, breaker.clone());
        let base = breaker.used();
        cache.insert(0, SparseVector::new(vec![(1, 1), (2, 2)]));
        assert!(breaker.used() > base);
        assert!(cache.erase(0) > 0);
        assert_eq!(breaker.used(), base);
        assert_eq!(cache.erase(0), 0);
        cache.release_all();
        assert_eq!(breaker.used(), 0);
    }

    #[test]
    fn test_released_item_refuses_inserts() {
        let breaker = Arc::new(MemoryBreaker::new(usize::MAX));
        let cache = ForwardIndexCacheItem::new(2, breaker.clone());
        cache.release_all();
        assert!(cache.is_closed());
        assert_eq!(breaker.used(), 0);

        assert_eq!(cache.insert(0, SparseVector::new(vec![(1, 1)])), InsertOutcome::Refused);
        assert!(cache.get(0).is_none());
        assert_eq!(breaker.used(), 0);
    }
}
