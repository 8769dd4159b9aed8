//! Readers that consult the cache service before going to disk, and fill it
//! on a miss.

use std::sync::Arc;

use crate::error::Result;
use crate::sparse::algorithm::SparseVectorReader;
use crate::sparse::cache::forward_index::ForwardIndexCacheItem;
use crate::sparse::cache::posting::ClusteredPostingCacheItem;
use crate::sparse::cluster::PostingClusters;
use crate::sparse::codec::producer::BinaryDocValues;
use crate::sparse::codec::terms::SparseTermsReader;
use crate::sparse::quantization::ByteQuantizer;
use crate::sparse::vector::SparseVector;

/// Clustered postings of one field. The term set always comes from disk.
#[derive(Debug, Clone)]
pub struct CacheGatedPostingsReader {
    field: String,
    disk: Arc<SparseTermsReader>,
    cache: Option<Arc<ClusteredPostingCacheItem>>,
}

impl CacheGatedPostingsReader {
    pub fn new<S: Into<String>>(
        field: S,
        disk: Arc<SparseTermsReader>,
        cache: Option<Arc<ClusteredPostingCacheItem>>,
    ) -> Self {
        CacheGatedPostingsReader {
            field: field.into(),
            disk,
            cache,
        }
    }

    pub fn read(&self, term: &[u8]) -> Result<Option<Arc<PostingClusters>>> {
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(term)) {
            return Ok(Some(hit));
        }
        let Some(clusters) = self.disk.read(&self.field, term)? else {
            return Ok(None);
        };
        if let Some(cache) = &self.cache {
            cache.insert(term, clusters.clusters().to_vec());
        }
        Ok(Some(Arc::new(clusters)))
    }

    pub fn terms(&self) -> Vec<Vec<u8>> {
        self.disk.terms(&self.field)
    }
}

/// Forward index of one segment field: cache first, then the stored doc value.
#[derive(Debug, Clone)]
pub struct CacheGatedForwardIndexReader {
    cache: Option<Arc<ForwardIndexCacheItem>>,
    doc_values: Option<Arc<BinaryDocValues>>,
    quantizer: ByteQuantizer,
}

impl CacheGatedForwardIndexReader {
    pub fn new(
        cache: Option<Arc<ForwardIndexCacheItem>>,
        doc_values: Option<Arc<BinaryDocValues>>,
        quantizer: ByteQuantizer,
    ) -> Self {
        CacheGatedForwardIndexReader {
            cache,
            doc_values,
            quantizer,
        }
    }
}

impl SparseVectorReader for CacheGatedForwardIndexReader {
    fn read(&self, doc: i32) -> Result<Option<Arc<SparseVector>>> {
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(doc)) {
            return Ok(Some(hit));
        }
        let Some(bytes) = self.doc_values.as_ref().and_then(|values| values.get(doc)) else {
            return Ok(None);
        };
        let vector = SparseVector::from_doc_value(bytes, &self.quantizer)?;
        if let Some(cache) = &self.cache {
            cache.insert(doc, vector.clone());
        }
        Ok(Some(Arc::new(vector)))
    }
}
