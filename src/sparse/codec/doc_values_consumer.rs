//! Doc values consumer that also fills the forward-index cache of clustered
//! sparse fields.

use std::sync::Arc;

use log::{debug, error};

use crate::error::{IrisError, Result};
use crate::sparse::cache::forward_index::{ForwardIndexCacheItem, InsertOutcome};
use crate::sparse::cache::{CacheKey, SparseCacheService};
use crate::sparse::codec::consumer::DocValuesConsumer;
use crate::sparse::codec::merge::{merged_binary_entries, source_keys};
use crate::sparse::codec::producer::DocValuesProducer;
use crate::sparse::codec::segment::{FieldInfo, MergeState, SegmentState};
use crate::sparse::quantization::ByteQuantizer;
use crate::sparse::vector::SparseVector;

#[derive(Debug)]
pub struct SparseDocValuesConsumer<D> {
    state: SegmentState,
    delegate: D,
    cache: Arc<SparseCacheService>,
}

impl<D: DocValuesConsumer> SparseDocValuesConsumer<D> {
    pub fn new(state: SegmentState, delegate: D, cache: Arc<SparseCacheService>) -> Self {
        SparseDocValuesConsumer {
            state,
            delegate,
            cache,
        }
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn into_delegate(self) -> D {
        self.delegate
    }

    fn merge_field(&self, field: &FieldInfo, merge: &MergeState) -> Result<()> {
        if !field.clusters_in(merge.segment.max_doc)? {
            return Ok(());
        }
        let key = CacheKey::of(&merge.segment, field);
        let Some(forward) = self.cache.forward_index_or_create(&key, merge.segment.max_doc) else {
            return Ok(());
        };
        let quantizer = ByteQuantizer::ingest();
        let source_caches: Vec<_> = merge
            .sources
            .iter()
            .map(|source| self.cache.forward_index(&CacheKey::of(&source.segment, field)))
            .collect();

        let mut count = 0;
        for value in merged_binary_entries(merge, &field.name)? {
            let cached = source_caches
                .get(value.source)
                .and_then(Option::as_ref)
                .and_then(|cache| cache.get(value.old_doc));
            let vector = match cached {
                Some(vector) => vector.as_ref().clone(),
                None => SparseVector::from_doc_value(&value.bytes, &quantizer)?,
            };
            store(&forward, value.new_doc, vector)?;
            count += 1;
        }
        debug!("refilled forward index of {key:?} with {count} merged documents");
        Ok(())
    }
}

impl<D: DocValuesConsumer> DocValuesConsumer for SparseDocValuesConsumer<D> {
    fn add_binary_field(&mut self, field: &FieldInfo, values: &dyn DocValuesProducer) -> Result<()> {
        self.delegate.add_binary_field(field, values)?;
        let max_doc = self.state.segment.max_doc;
        if !field.clusters_in(max_doc)? {
            return Ok(());
        }
        let Some(binary) = values.binary(&field.name)? else {
            return Ok(());
        };
        let key = CacheKey::of(&self.state.segment, field);
        let Some(forward) = self.cache.forward_index_or_create(&key, max_doc) else {
            return Ok(());
        };
        let quantizer = ByteQuantizer::ingest();
        for (doc, bytes) in binary.iter() {
            store(&forward, doc, SparseVector::from_doc_value(bytes, &quantizer)?)?;
        }
        Ok(())
    }

    fn merge(&mut self, merge: &MergeState) -> Result<()> {
        self.delegate.merge(merge)?;
        for field in merge.fields.iter().filter(|f| f.is_sparse()) {
            if let Err(e) = self.merge_field(field, merge) {
                error!("merge of sparse doc values of field {} failed: {e}", field.name);
            }
            for key in source_keys(merge, field) {
                self.cache.evict_forward_index(&key);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.delegate.close()
    }
}

fn store(forward: &ForwardIndexCacheItem, doc: i32, vector: SparseVector) -> Result<()> {
    match forward.insert(doc, vector) {
        InsertOutcome::Inserted | InsertOutcome::Refused => Ok(()),
        InsertOutcome::Occupied => Err(IrisError::illegal_state(format!(
            "forward index slot of doc {doc} is already written"
        ))),
        InsertOutcome::OutOfRange => Err(IrisError::illegal_state(format!(
            "doc {doc} is outside the forward index of {} documents",
            forward.doc_count()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::codec::consumer::MemoryDocValuesConsumer;
    use crate::sparse::codec::producer::{BinaryDocValues, MemoryDocValuesProducer, MemoryFieldsProducer};
    use crate::sparse::codec::segment::{DocMap, MergeSource, SegmentInfo};
    use crate::sparse::params::SeismicParams;
    use crate::storage::memory::MemoryStorage;

    fn field() -> FieldInfo {
        FieldInfo::sparse(0, "embedding", &SeismicParams::default().with_approximate_threshold(0))
    }

    fn values(docs: &[(i32, &str)]) -> Arc<MemoryDocValuesProducer> {
        let binary: BinaryDocValues = docs
            .iter()
            .map(|&(doc, token)| (doc, SparseVector::encode_doc_value(&[(token, 1.0_f32)]).unwrap()))
            .collect();
        Arc::new(MemoryDocValuesProducer::new().with_binary("embedding", binary))
    }

    fn source(segment: &SegmentInfo, base: i32, docs: &[(i32, &str)]) -> MergeSource {
        MergeSource::new(
            segment.clone(),
            DocMap::shifted(segment.max_doc, base),
            Arc::new(MemoryFieldsProducer::new()),
            values(docs),
        )
    }

    #[test]
    fn test_merge_refills_forward_index_and_evicts_sources() {
        let cache = Arc::new(SparseCacheService::default());
        let s1 = SegmentInfo::new("_1", 2);
        let s2 = SegmentInfo::new("_2", 2);
        let s1_key = CacheKey::of(&s1, &field());
        let s2_key = CacheKey::of(&s2, &field());

        // A cached vector takes precedence over the stored doc value.
        let cached = cache.forward_index_or_create(&s1_key, 2).unwrap();
        assert_eq!(cached.insert(0, SparseVector::new(vec![(9, 40)])), InsertOutcome::Inserted);

        let s3 = SegmentInfo::new("_3", 4);
        let merge = MergeState::new(
            s3.clone(),
            vec![field()],
            vec![source(&s1, 0, &[(0, "7"), (1, "8")]), source(&s2, 2, &[(1, "5")])],
        );
        let state = SegmentState::new(Arc::new(MemoryStorage::default()), s3.clone(), vec![field()]);
        let mut consumer = SparseDocValuesConsumer::new(state, MemoryDocValuesConsumer::new(), cache.clone());
        consumer.merge(&merge).unwrap();

        let merged = cache.forward_index(&CacheKey::of(&s3, &field())).unwrap();
        assert_eq!(merged.get(0).unwrap().tokens(), &[9]);
        assert_eq!(merged.get(1).unwrap().tokens(), &[8]);
        assert!(merged.get(2).is_none());
        assert_eq!(merged.get(3).unwrap().tokens(), &[5]);
        assert!(cache.forward_index(&s1_key).is_none());
        assert!(cache.forward_index(&s2_key).is_none());

        let written = consumer.into_delegate().into_producer();
        assert_eq!(written.binary("embedding").unwrap().unwrap().len(), 3);
    }

    #[test]
    fn test_failed_field_merge_is_not_thrown() {
        let cache = Arc::new(SparseCacheService::default());
        let s1 = SegmentInfo::new("_1", 2);
        let s3 = SegmentInfo::new("_3", 2);
        // Slot 0 of the merged segment is already written.
        let target = cache.forward_index_or_create(&CacheKey::of(&s3, &field()), 2).unwrap();
        target.insert(0, SparseVector::new(vec![(1, 1)]));

        let merge = MergeState::new(s3.clone(), vec![field()], vec![source(&s1, 0, &[(0, "7")])]);
        let state = SegmentState::new(Arc::new(MemoryStorage::default()), s3, vec![field()]);
        let mut consumer = SparseDocValuesConsumer::new(state, MemoryDocValuesConsumer::new(), cache.clone());
        assert!(consumer.merge(&merge).is_ok());
        assert_eq!(target.get(0).unwrap().tokens(), &[1]);
    }
}
