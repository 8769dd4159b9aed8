//! Memory-bounded caches of forward indices and clustered postings.
//!
//! The service is owned by whoever builds the codec and is passed to every
//! writer and reader explicitly. Entries belong to one segment field and must
//! be evicted once that segment is merged away.

pub mod breaker;
pub mod forward_index;
pub mod posting;

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::sparse::cache::breaker::MemoryBreaker;
use crate::sparse::cache::forward_index::ForwardIndexCacheItem;
use crate::sparse::cache::posting::ClusteredPostingCacheItem;
use crate::sparse::codec::segment::{FieldInfo, SegmentInfo};
use crate::storage::codec_util::SegmentId;

/// Identity of one field of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub segment_name: String,
    pub segment_id: SegmentId,
    pub field: String,
}

impl CacheKey {
    pub fn new<S: Into<String>, F: Into<String>>(segment_name: S, segment_id: SegmentId, field: F) -> Self {
        CacheKey {
            segment_name: segment_name.into(),
            segment_id,
            field: field.into(),
        }
    }

    pub fn of(segment: &SegmentInfo, field: &FieldInfo) -> Self {
        Self::new(segment.name.clone(), segment.id, field.name.clone())
    }
}

/// Configuration for [`SparseCacheService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseCacheConfig {
    /// Upper bound for the RAM held by both caches together.
    pub memory_limit_bytes: usize,

    /// Cache forward-index vectors.
    pub forward_index_enabled: bool,

    /// Cache clustered postings.
    pub posting_cache_enabled: bool,
}

impl Default for SparseCacheConfig {
    fn default() -> Self {
        SparseCacheConfig {
            memory_limit_bytes: 512 * 1024 * 1024,
            forward_index_enabled: true,
            posting_cache_enabled: true,
        }
    }
}

impl SparseCacheConfig {
    pub fn with_memory_limit_bytes(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_forward_index_enabled(mut self, enabled: bool) -> Self {
        self.forward_index_enabled = enabled;
        self
    }

    pub fn with_posting_cache_enabled(mut self, enabled: bool) -> Self {
        self.posting_cache_enabled = enabled;
        self
    }
}

/// Owner of the forward-index and clustered-posting caches.
#[derive(Debug)]
pub struct SparseCacheService {
    config: SparseCacheConfig,
    breaker: Arc<MemoryBreaker>,
    forward_indices: RwLock<AHashMap<CacheKey, Arc<ForwardIndexCacheItem>>>,
    postings: RwLock<AHashMap<CacheKey, Arc<ClusteredPostingCacheItem>>>,
}

impl SparseCacheService {
    pub fn new(config: SparseCacheConfig) -> Self {
        let breaker = Arc::new(MemoryBreaker::new(config.memory_limit_bytes));
        SparseCacheService {
            config,
            breaker,
            forward_indices: RwLock::new(AHashMap::new()),
            postings: RwLock::new(AHashMap::new()),
        }
    }

    pub fn config(&self) -> &SparseCacheConfig {
        &self.config
    }

    pub fn forward_index(&self, key: &CacheKey) -> Option<Arc<ForwardIndexCacheItem>> {
        self.forward_indices.read().get(key).cloned()
    }

    /// The forward index of `key`, created with `doc_count` slots if missing.
    /// `None` when forward-index caching is disabled.
    pub fn forward_index_or_create(
        &self,
        key: &CacheKey,
        doc_count: usize,
    ) -> Option<Arc<ForwardIndexCacheItem>> {
        if !self.config.forward_index_enabled {
            return None;
        }
        if let Some(item) = self.forward_index(key) {
            return Some(item);
        }
        let mut map = self.forward_indices.write();
        let item = map.entry(key.clone()).or_insert_with(|| {
            debug!("creating forward index cache for {key:?} with {doc_count} slots");
            Arc::new(ForwardIndexCacheItem::new(doc_count, self.breaker.clone()))
        });
        Some(item.clone())
    }

    pub fn postings(&self, key: &CacheKey) -> Option<Arc<ClusteredPostingCacheItem>> {
        self.postings.read().get(key).cloned()
    }

    /// `None` when posting caching is disabled.
    pub fn postings_or_create(&self, key: &CacheKey) -> Option<Arc<ClusteredPostingCacheItem>> {
        if !self.config.posting_cache_enabled {
            return None;
        }
        if let Some(item) = self.postings(key) {
            return Some(item);
        }
        let mut map = self.postings.write();
        let item = map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ClusteredPostingCacheItem::new(self.breaker.clone())));
        Some(item.clone())
    }

    pub fn evict_forward_index(&self, key: &CacheKey) -> bool {
        let Some(item) = self.forward_indices.write().remove(key) else {
            return false;
        };
        item.release_all();
        debug!("evicted forward index cache of {key:?}");
        true
    }

    pub fn evict_postings(&self, key: &CacheKey) -> bool {
        let Some(item) = self.postings.write().remove(key) else {
            return false;
        };
        item.release_all();
        debug!("evicted clustered posting cache of {key:?}");
        true
    }

    /// Drop both caches of `key`. Returns whether anything was cached.
    pub fn evict(&self, key: &CacheKey) -> bool {
        let forward = self.evict_forward_index(key);
        let postings = self.evict_postings(key);
        forward || postings
    }

    pub fn ram_bytes_used(&self) -> usize {
        self.breaker.used()
    }
}

impl Default for SparseCacheService {
    fn default() -> Self {
        Self::new(SparseCacheConfig::default())
    }
}
