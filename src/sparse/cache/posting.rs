//! Cached clustered postings of one segment field, keyed by term bytes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ahash::AHashMap;
use log::warn;
use parking_lot::RwLock;

use crate::sparse::cache::breaker::MemoryBreaker;
use crate::sparse::cluster::{DocumentCluster, PostingClusters};

#[derive(Debug)]
pub struct ClusteredPostingCacheItem {
    postings: RwLock<AHashMap<Vec<u8>, Arc<PostingClusters>>>,
    ram_bytes: AtomicUsize,
    closed: AtomicBool,
    breaker: Arc<MemoryBreaker>,
}

fn entry_bytes(term: &[u8], clusters: &PostingClusters) -> usize {
    clusters.ram_bytes_used() + std::mem::size_of::<Vec<u8>>() + term.len()
}

impl ClusteredPostingCacheItem {
    pub fn new(breaker: Arc<MemoryBreaker>) -> Self {
        let base = std::mem::size_of::<Self>();
        breaker.add_without_breaking(base);
        ClusteredPostingCacheItem {
            postings: RwLock::new(AHashMap::new()),
            ram_bytes: AtomicUsize::new(base),
            closed: AtomicBool::new(false),
            breaker,
        }
    }

    pub fn get(&self, term: &[u8]) -> Option<Arc<PostingClusters>> {
        self.postings.read().get(term).cloned()
    }

    /// Cached terms in no particular order.
    pub fn terms(&self) -> Vec<Vec<u8>> {
        self.postings.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.postings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.read().is_empty()
    }

    /// Cache the clusters of `term`. Empty input is ignored; a concurrent
    /// writer of the same term may win, which is fine since cluster content
    /// for a term is deterministic. Once the item has been evicted every
    /// insert is refused.
    pub fn insert(&self, term: &[u8], clusters: Vec<DocumentCluster>) -> bool {
        if clusters.is_empty() || self.closed.load(Ordering::Acquire) {
            return false;
        }
        let clusters = PostingClusters::new(clusters);
        let bytes = entry_bytes(term, &clusters);
        if !self.breaker.try_add(bytes) {
            warn!(
                "memory limit reached, clusters of term {} will not be cached",
                String::from_utf8_lossy(term)
            );
            return false;
        }

        let mut postings = self.postings.write();
        if self.closed.load(Ordering::Acquire) {
            self.breaker.release(bytes);
            return false;
        }
        let previous = postings.insert(term.to_vec(), Arc::new(clusters));
        self.ram_bytes.fetch_add(bytes, Ordering::AcqRel);
        if let Some(previous) = previous {
            let freed = entry_bytes(term, &previous);
            self.ram_bytes.fetch_sub(freed, Ordering::AcqRel);
            self.breaker.release(freed);
        }
        true
    }

    /// Drop one term and return the bytes freed.
    pub fn erase(&self, term: &[u8]) -> usize {
        let mut postings = self.postings.write();
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        let Some(removed) = postings.remove(term) else {
            return 0;
        };
        let bytes = entry_bytes(term, &removed);
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

    /// Hand every byte of this item back to the breaker and refuse later
    /// inserts. Readers still holding the item keep seeing cached entries.
    pub(crate) fn release_all(&self) {
        let _postings = self.postings.write();
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.breaker.release(self.ram_bytes.swap(0, Ordering::AcqRel));
        }
    }
}
