//! Postings consumer routing clustered sparse fields to the `.sppo`/`.sptm`
//! files and every other field to a delegate.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::error::{IrisError, Result};
use crate::sparse::algorithm::{BatchClusteringTask, ClusteringExecutor, RandomClustering, SeismicPostingClusterer};
use crate::sparse::cache::{CacheKey, SparseCacheService};
use crate::sparse::cluster::{DocWeight, DocumentCluster};
use crate::sparse::codec::consumer::FieldsConsumer;
use crate::sparse::codec::gated::CacheGatedForwardIndexReader;
use crate::sparse::codec::merge::{all_terms, source_keys};
use crate::sparse::codec::postings_file::ClusteredPostingWriter;
use crate::sparse::codec::producer::{DocValuesProducer, FieldsProducer, Postings};
use crate::sparse::codec::segment::{FieldInfo, MergeState, SegmentState};
use crate::sparse::codec::terms::SparseTermsWriter;
use crate::sparse::codec::{POSTINGS_EXTENSION, TERMS_EXTENSION};
use crate::sparse::quantization::ByteQuantizer;
use crate::sparse::value_encoder::decode_feature_value;

#[derive(Debug)]
pub struct SparsePostingsConsumer<D> {
    state: SegmentState,
    delegate: D,
    cache: Arc<SparseCacheService>,
    executor: Arc<ClusteringExecutor>,
    doc_values: Option<Arc<dyn DocValuesProducer>>,
    written: bool,
}

impl<D: FieldsConsumer> SparsePostingsConsumer<D> {
    pub fn new(
        state: SegmentState,
        delegate: D,
        cache: Arc<SparseCacheService>,
        executor: Arc<ClusteringExecutor>,
    ) -> Self {
        SparsePostingsConsumer {
            state,
            delegate,
            cache,
            executor,
            doc_values: None,
            written: false,
        }
    }

    /// Doc values of the segment being flushed, read when a vector is not cached.
    pub fn with_doc_values(mut self, doc_values: Arc<dyn DocValuesProducer>) -> Self {
        self.doc_values = Some(doc_values);
        self
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn into_delegate(self) -> D {
        self.delegate
    }

    fn start(&mut self) -> Result<()> {
        if self.written {
            return Err(IrisError::illegal_state(format!(
                "sparse postings of segment {} were already written",
                self.state.segment.name
            )));
        }
        self.written = true;
        Ok(())
    }

    /// Split `fields` into clustered fields and delegate fields.
    fn partition(fields: &[FieldInfo], max_doc: usize) -> Result<(Vec<FieldInfo>, Vec<FieldInfo>)> {
        let mut sparse = Vec::new();
        let mut others = Vec::new();
        for field in fields {
            if field.clusters_in(max_doc)? {
                sparse.push(field.clone());
            } else {
                others.push(field.clone());
            }
        }
        Ok((sparse, others))
    }

    fn write_sparse(&self, fields: &[FieldInfo], postings: &dyn FieldsProducer) -> Result<()> {
        let mut postings_out = ClusteredPostingWriter::create(&self.state)?;
        let mut terms_out = SparseTermsWriter::create(&self.state, fields.len())?;
        let max_doc = self.state.segment.max_doc;

        for field in fields {
            let key = CacheKey::of(&self.state.segment, field);
            let params = field.params()?;
            let doc_values = match &self.doc_values {
                Some(producer) => producer.binary(&field.name)?,
                None => None,
            };
            let reader = CacheGatedForwardIndexReader::new(
                self.cache.forward_index_or_create(&key, max_doc),
                doc_values,
                ByteQuantizer::ingest(),
            );
            let clusterer = SeismicPostingClusterer::new(
                params.n_postings_for(max_doc),
                RandomClustering::new(params.summary_prune_ratio, params.cluster_ratio, Arc::new(reader)),
            );
            let posting_cache = self.cache.postings_or_create(&key);

            let terms = postings.terms(&field.name)?;
            let batches: Vec<Vec<Vec<u8>>> = terms
                .chunks(self.executor.batch_size())
                .map(<[Vec<u8>]>::to_vec)
                .collect();
            let results = self.executor.run(batches, params.cluster_ratio == 0.0, |batch| {
                batch
                    .into_iter()
                    .map(|term| {
                        let weights = match postings.postings(&field.name, &term)? {
                            Some(p) => quantize_postings(p)?,
                            None => Vec::new(),
                        };
                        let clusters = clusterer.cluster(&weights)?;
                        Ok((term, clusters))
                    })
                    .collect::<Result<Vec<(Vec<u8>, Vec<DocumentCluster>)>>>()
            });

            let mut entries = Vec::with_capacity(terms.len());
            for result in results {
                for (term, clusters) in result? {
                    let offset = postings_out.write_clusters(&clusters)?;
                    if let Some(cache) = &posting_cache {
                        cache.insert(&term, clusters);
                    }
                    entries.push((term, offset));
                }
            }
            debug!("wrote {} clustered terms of field {}", entries.len(), field.name);
            terms_out.write_field(field.number, &entries)?;
        }

        postings_out.finish()?;
        terms_out.finish()
    }

    fn merge_sparse(&self, fields: &[FieldInfo], merge: &MergeState) -> Result<()> {
        let mut postings_out = ClusteredPostingWriter::create(&self.state)?;
        let mut terms_out = SparseTermsWriter::create(&self.state, fields.len())?;
        debug!("merging {} documents into segment {}", merge.total_docs(), merge.segment.name);

        for field in fields {
            let params = field.params()?;
            let terms: Vec<Vec<u8>> = all_terms(merge, &field.name)?.into_iter().collect();
            let batches: Vec<Vec<Vec<u8>>> = terms
                .chunks(self.executor.batch_size())
                .map(<[Vec<u8>]>::to_vec)
                .collect();
            let cache = self.cache.as_ref();
            let results = self.executor.run(batches, params.cluster_ratio == 0.0, |batch| {
                BatchClusteringTask::new(batch, merge, field, cache)?.run()
            });

            let mut entries = Vec::with_capacity(terms.len());
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok(clustered) => {
                        for (term, clusters) in clustered {
                            let offset = postings_out.write_clusters(clusters.clusters())?;
                            entries.push((term, offset));
                        }
                    }
                    Err(e) => {
                        error!(
                            "clustering of term batch {index} of field {} failed during merge: {e}",
                            field.name
                        );
                    }
                }
            }
            terms_out.write_field(field.number, &entries)?;
        }

        postings_out.finish()?;
        terms_out.finish()
    }

    /// Remove half-written sparse files.
    fn abort(&self) {
        for extension in [POSTINGS_EXTENSION, TERMS_EXTENSION] {
            let name = self.state.file_name(extension);
            if self.state.storage.file_exists(&name) {
                if let Err(e) = self.state.storage.delete_file(&name) {
                    warn!("failed to delete {name}: {e}");
                }
            }
        }
    }
}

impl<D: FieldsConsumer> FieldsConsumer for SparsePostingsConsumer<D> {
    fn write(&mut self, fields: &[FieldInfo], postings: &dyn FieldsProducer) -> Result<()> {
        self.start()?;
        let (sparse, others) = Self::partition(fields, self.state.segment.max_doc)?;
        self.delegate.write(&others, postings)?;
        if sparse.is_empty() {
            return Ok(());
        }
        self.write_sparse(&sparse, postings).inspect_err(|_| self.abort())
    }

    fn merge(&mut self, fields: &[FieldInfo], merge: &MergeState) -> Result<()> {
        self.start()?;
        let (sparse, others) = Self::partition(fields, merge.segment.max_doc)?;
        self.delegate.merge(&others, merge)?;
        if !sparse.is_empty() {
            self.merge_sparse(&sparse, merge).inspect_err(|_| self.abort())?;
        }

        for field in fields.iter().filter(|f| f.is_sparse()) {
            for key in source_keys(merge, field) {
                self.cache.evict_postings(&key);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.delegate.close()
    }
}

/// Quantized weights of one term's postings.
fn quantize_postings(postings: Postings) -> Result<Vec<DocWeight>> {
    match postings {
        Postings::Quantized(p) => Ok(p),
        Postings::Frequencies(p) => {
            let quantizer = ByteQuantizer::ingest();
            p.into_iter()
                .map(|(doc, freq)| {
                    if doc < 0 {
                        return Err(IrisError::illegal_state("doc id must be set before it is written"));
                    }
                    Ok(DocWeight::new(doc, quantizer.quantize(decode_feature_value(freq))))
                })
                .collect()
        }
    }
}
