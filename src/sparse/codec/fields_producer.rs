use std::sync::Arc;

use crate::error::Result;
use crate::sparse::cache::{CacheKey, SparseCacheService};
use crate::sparse::cluster::PostingClusters;
use crate::sparse::codec::TERMS_EXTENSION;
use crate::sparse::codec::gated::CacheGatedPostingsReader;
use crate::sparse::codec::producer::{FieldsProducer, Postings};
use crate::sparse::codec::segment::SegmentState;
use crate::sparse::codec::terms::SparseTermsReader;

/// Postings of a segment: clustered fields from the sparse files, every other
/// field from the delegate.
#[derive(Debug)]
pub struct SparseFieldsProducer {
    state: SegmentState,
    delegate: Arc<dyn FieldsProducer>,
    sparse: Option<Arc<SparseTermsReader>>,
    cache: Arc<SparseCacheService>,
}

impl SparseFieldsProducer {
    pub fn open(
        state: SegmentState,
        delegate: Arc<dyn FieldsProducer>,
        cache: Arc<SparseCacheService>,
    ) -> Result<Self> {
        let sparse = if state.storage.file_exists(&state.file_name(TERMS_EXTENSION)) {
            Some(Arc::new(SparseTermsReader::open(&state)?))
        } else {
            None
        };
        Ok(SparseFieldsProducer {
            state,
            delegate,
            sparse,
            cache,
        })
    }

    /// Cache-gated reader of a clustered field; `None` for other fields.
    pub fn clustered(&self, field: &str) -> Option<CacheGatedPostingsReader> {
        let disk = self.sparse.as_ref().filter(|r| r.has_field(field))?;
        let info = self.state.field(field)?;
        let cache = self.cache.postings_or_create(&CacheKey::of(&self.state.segment, info));
        Some(CacheGatedPostingsReader::new(field, disk.clone(), cache))
    }

    pub fn read_clusters(&self, field: &str, term: &[u8]) -> Result<Option<Arc<PostingClusters>>> {
        match self.clustered(field) {
            Some(reader) => reader.read(term),
            None => Ok(None),
        }
    }
}

impl FieldsProducer for SparseFieldsProducer {
    fn terms(&self, field: &str) -> Result<Vec<Vec<u8>>> {
        match self.clustered(field) {
            Some(reader) => Ok(reader.terms()),
            None => self.delegate.terms(field),
        }
    }

    fn postings(&self, field: &str, term: &[u8]) -> Result<Option<Postings>> {
        let Some(reader) = self.clustered(field) else {
            return self.delegate.postings(field, term);
        };
        Ok(reader.read(term)?.map(|clusters| {
            let mut weights: Vec<_> = clusters.doc_weights().collect();
            weights.sort_by_key(|d| d.doc);
            Postings::Quantized(weights)
        }))
    }

    fn check_integrity(&self) -> Result<()> {
        self.delegate.check_integrity()?;
        if let Some(sparse) = &self.sparse {
            sparse.check_integrity()?;
        }
        Ok(())
    }
}
