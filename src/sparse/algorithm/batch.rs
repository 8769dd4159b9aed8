//! Merge-time clustering of a batch of terms.

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{IrisError, Result};
use crate::sparse::algorithm::{RandomClustering, SeismicPostingClusterer, SparseVectorReader};
use crate::sparse::cache::forward_index::ForwardIndexCacheItem;
use crate::sparse::cache::{CacheKey, SparseCacheService};
use crate::sparse::cluster::PostingClusters;
use crate::sparse::codec::merge::merged_postings_for_term;
use crate::sparse::codec::producer::BinaryDocValues;
use crate::sparse::codec::segment::{FieldInfo, MergeState};
use crate::sparse::params::SeismicParams;
use crate::sparse::quantization::ByteQuantizer;
use crate::sparse::vector::SparseVector;

#[derive(Debug)]
struct SourceVectors {
    cache: Option<Arc<ForwardIndexCacheItem>>,
    doc_values: Option<Arc<BinaryDocValues>>,
}

/// Vectors of merged documents: the source segment's cache, then the merged
/// segment's cache, then the source's stored doc value.
#[derive(Debug)]
struct MergedVectorReader {
    sources: Arc<Vec<SourceVectors>>,
    merged: Option<Arc<ForwardIndexCacheItem>>,
    origins: AHashMap<i32, (usize, i32)>,
    quantizer: ByteQuantizer,
}

impl SparseVectorReader for MergedVectorReader {
    fn read(&self, doc: i32) -> Result<Option<Arc<SparseVector>>> {
        let Some(&(index, old_doc)) = self.origins.get(&doc) else {
            return Ok(None);
        };
        let Some(source) = self.sources.get(index) else {
            return Ok(None);
        };
        if let Some(hit) = source.cache.as_ref().and_then(|c| c.get(old_doc)) {
            return Ok(Some(hit));
        }
        if let Some(hit) = self.merged.as_ref().and_then(|c| c.get(doc)) {
            return Ok(Some(hit));
        }
        match source.doc_values.as_ref().and_then(|v| v.get(old_doc)) {
            Some(bytes) => Ok(Some(Arc::new(SparseVector::from_doc_value(bytes, &self.quantizer)?))),
            None => Ok(None),
        }
    }
}

/// Clusters the merged postings of a batch of terms of one field.
#[derive(Debug)]
pub struct BatchClusteringTask<'a> {
    terms: Vec<Vec<u8>>,
    key: CacheKey,
    params: SeismicParams,
    n_postings: usize,
    merge: &'a MergeState,
    field: &'a FieldInfo,
    cache: &'a SparseCacheService,
}

impl<'a> BatchClusteringTask<'a> {
    pub fn new(
        terms: Vec<Vec<u8>>,
        merge: &'a MergeState,
        field: &'a FieldInfo,
        cache: &'a SparseCacheService,
    ) -> Result<Self> {
        let params = field.params()?;
        Ok(BatchClusteringTask {
            terms,
            key: CacheKey::of(&merge.segment, field),
            n_postings: params.n_postings_for(merge.segment.max_doc),
            params,
            merge,
            field,
            cache,
        })
    }

    pub fn terms(&self) -> &[Vec<u8>] {
        &self.terms
    }

    /// Postings kept per term, sized by the merged segment's document count.
    pub fn n_postings(&self) -> usize {
        self.n_postings
    }

    /// Cluster every term. The clusters also go to the merged segment's
    /// posting cache.
    pub fn run(&self) -> Result<Vec<(Vec<u8>, PostingClusters)>> {
        self.cluster_terms()
            .map_err(|e| IrisError::clustering_task(format!("field [{}]: {e}", self.field.name)))
    }

    fn cluster_terms(&self) -> Result<Vec<(Vec<u8>, PostingClusters)>> {
        let mut out = Vec::with_capacity(self.terms.len());
        if self.merge.total_docs() == 0 {
            return Ok(out);
        }

        let quantizer = ByteQuantizer::ingest();
        let sources = self
            .merge
            .sources
            .iter()
            .map(|source| {
                Ok(SourceVectors {
                    cache: self.cache.forward_index(&CacheKey::of(&source.segment, self.field)),
                    doc_values: source.doc_values.binary(&self.field.name)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let sources = Arc::new(sources);
        let merged = self.cache.forward_index(&self.key);
        let posting_cache = self.cache.postings_or_create(&self.key);

        for term in &self.terms {
            let postings = merged_postings_for_term(self.merge, &self.field.name, term, &quantizer)?;
            let reader = MergedVectorReader {
                sources: sources.clone(),
                merged: merged.clone(),
                origins: postings.origins,
                quantizer,
            };
            let clusterer = SeismicPostingClusterer::new(
                self.n_postings,
                RandomClustering::new(
                    self.params.summary_prune_ratio,
                    self.params.cluster_ratio,
                    Arc::new(reader),
                ),
            );
            let clusters = clusterer.cluster(&postings.postings)?;
            if let Some(cache) = &posting_cache {
                cache.insert(term, clusters.clone());
            }
            out.push((term.clone(), PostingClusters::new(clusters)));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::codec::producer::{
        DocValuesProducer, FieldsProducer, MemoryDocValuesProducer, MemoryFieldsProducer,
    };
    use crate::sparse::codec::segment::{DocMap, MergeSource, SegmentInfo};

    fn source(name: &str, max_doc: usize) -> MergeSource {
        MergeSource::new(
            SegmentInfo::new(name, max_doc),
            DocMap::default(),
            Arc::new(MemoryFieldsProducer::new()) as Arc<dyn FieldsProducer>,
            Arc::new(MemoryDocValuesProducer::new()) as Arc<dyn DocValuesProducer>,
        )
    }

    #[test]
    fn test_posting_budget_follows_merged_segment() {
        // Deletions shrink the merged segment below the sources' sum.
        let params = SeismicParams::default().with_approximate_threshold(0);
        let field = FieldInfo::sparse(0, "body", &params);
        let merge = MergeState::new(
            SegmentInfo::new("_3", 400_000),
            vec![field.clone()],
            vec![source("_1", 300_000), source("_2", 300_000)],
        );
        let cache = SparseCacheService::default();

        let task = BatchClusteringTask::new(vec![b"7".to_vec()], &merge, &field, &cache).unwrap();
        assert_eq!(task.n_postings(), params.n_postings_for(400_000));
        assert_ne!(task.n_postings(), params.n_postings_for(merge.total_docs()));
        assert_eq!(task.terms(), &[b"7".to_vec()]);
    }
}
