//! Codec for clustered sparse fields.
//!
//! A field whose attributes carry `sparse_field=true` is written as clustered
//! postings once its segment reaches the field's approximate threshold. Every
//! other field, and sparse fields of smaller segments, fall through to the
//! delegate consumers. Doc values must be written before postings: the
//! postings consumer reads member vectors from the forward index that the doc
//! values consumer fills.

pub mod consumer;
pub mod doc_values_consumer;
pub mod fields_producer;
pub mod gated;
pub mod merge;
pub mod postings_consumer;
pub mod postings_file;
pub mod producer;
pub mod segment;
pub mod terms;

use std::sync::Arc;

use crate::error::Result;
use crate::sparse::algorithm::{ClusteringExecutor, ClusteringExecutorConfig};
use crate::sparse::cache::{CacheKey, SparseCacheService};
use crate::sparse::codec::consumer::{DocValuesConsumer, FieldsConsumer};
use crate::sparse::codec::doc_values_consumer::SparseDocValuesConsumer;
use crate::sparse::codec::fields_producer::SparseFieldsProducer;
use crate::sparse::codec::gated::CacheGatedForwardIndexReader;
use crate::sparse::codec::postings_consumer::SparsePostingsConsumer;
use crate::sparse::codec::producer::{DocValuesProducer, FieldsProducer};
use crate::sparse::codec::segment::{FieldInfo, SegmentInfo, SegmentState};
use crate::sparse::quantization::ByteQuantizer;

pub const POSTINGS_EXTENSION: &str = "sppo";
pub const TERMS_EXTENSION: &str = "sptm";
pub const POSTINGS_CODEC_NAME: &str = "SparsePostings";
pub const TERMS_CODEC_NAME: &str = "SparseTerms";
pub const VERSION_START: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_START;

/// Entry point handing out the sparse postings and doc values formats.
#[derive(Debug, Clone)]
pub struct SparseCodec {
    cache: Arc<SparseCacheService>,
    executor: Arc<ClusteringExecutor>,
}

impl SparseCodec {
    pub fn new(cache: Arc<SparseCacheService>, executor: Arc<ClusteringExecutor>) -> Self {
        SparseCodec { cache, executor }
    }

    /// A codec with its own cache service and clustering pool.
    pub fn with_config(executor: ClusteringExecutorConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(SparseCacheService::default()),
            Arc::new(ClusteringExecutor::new(executor)?),
        ))
    }

    pub fn cache(&self) -> &Arc<SparseCacheService> {
        &self.cache
    }

    pub fn postings_format(&self) -> SparsePostingsFormat {
        SparsePostingsFormat {
            cache: self.cache.clone(),
            executor: self.executor.clone(),
        }
    }

    pub fn doc_values_format(&self) -> SparseDocValuesFormat {
        SparseDocValuesFormat {
            cache: self.cache.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SparsePostingsFormat {
    cache: Arc<SparseCacheService>,
    executor: Arc<ClusteringExecutor>,
}

impl SparsePostingsFormat {
    pub fn fields_consumer<D: FieldsConsumer>(&self, state: SegmentState, delegate: D) -> SparsePostingsConsumer<D> {
        SparsePostingsConsumer::new(state, delegate, self.cache.clone(), self.executor.clone())
    }

    pub fn fields_producer(
        &self,
        state: SegmentState,
        delegate: Arc<dyn FieldsProducer>,
    ) -> Result<SparseFieldsProducer> {
        SparseFieldsProducer::open(state, delegate, self.cache.clone())
    }
}

#[derive(Debug, Clone)]
pub struct SparseDocValuesFormat {
    cache: Arc<SparseCacheService>,
}

impl SparseDocValuesFormat {
    pub fn fields_consumer<D: DocValuesConsumer>(
        &self,
        state: SegmentState,
        delegate: D,
    ) -> SparseDocValuesConsumer<D> {
        SparseDocValuesConsumer::new(state, delegate, self.cache.clone())
    }

    /// Cache-gated vector reader over a segment's stored doc values.
    pub fn vector_reader(
        &self,
        segment: &SegmentInfo,
        field: &FieldInfo,
        doc_values: &dyn DocValuesProducer,
    ) -> Result<CacheGatedForwardIndexReader> {
        let cache = if field.clusters_in(segment.max_doc)? {
            self.cache
                .forward_index_or_create(&CacheKey::of(segment, field), segment.max_doc)
        } else {
            None
        };
        Ok(CacheGatedForwardIndexReader::new(
            cache,
            doc_values.binary(&field.name)?,
            ByteQuantizer::ingest(),
        ))
    }
}
