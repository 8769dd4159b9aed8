//! Field-sorted hybrid collector, with optional `search_after` paging.

use std::cmp::Ordering;
use std::sync::Arc;

use log::info;

use crate::error::{IrisError, Result};
use crate::hybrid::collector::queue::TopNQueue;
use crate::hybrid::collector::{
    CollectControl, Collector, HitCounter, HitsThresholdChecker, HybridSearchCollector, ScoreMode,
    SegmentContext, check_sub_scores, is_competitive,
};
use crate::hybrid::score_doc::{
    DocId, ScoreDoc, SortField, SortFieldType, SortValue, TopDocs, TopDocsKind, TotalHits,
    TotalHitsRelation,
};
use crate::hybrid::sort::{SortComparator, can_early_terminate};

/// Queue entry ordered by a comparator chain; greater is better.
#[derive(Debug, Clone)]
pub(crate) struct FieldEntry {
    pub(crate) doc: DocId,
    pub(crate) score: f32,
    pub(crate) values: Vec<SortValue>,
    comparator: Arc<SortComparator>,
}

impl FieldEntry {
    pub(crate) fn new(
        doc: DocId,
        score: f32,
        values: Vec<SortValue>,
        comparator: Arc<SortComparator>,
    ) -> Self {
        FieldEntry {
            doc,
            score,
            values,
            comparator,
        }
    }

    pub(crate) fn into_score_doc(self) -> ScoreDoc {
        ScoreDoc::with_fields(self.doc, self.score, self.values)
    }
}

impl PartialEq for FieldEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldEntry {}

impl PartialOrd for FieldEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // The comparator puts the better doc first (`Less`), so flip it.
        self.comparator
            .compare_values(&other.values, &self.values)
            .then_with(|| other.doc.cmp(&self.doc))
    }
}

/// Sort values of one document for one sub-query score.
pub(crate) fn sort_values(
    fields: &[SortField],
    segment: &SegmentContext,
    local_doc: DocId,
    global_doc: DocId,
    score: f32,
) -> Result<Vec<SortValue>> {
    fields
        .iter()
        .map(|field| match field.field_type {
            SortFieldType::Score => Ok(SortValue::Float(score as f64)),
            SortFieldType::Doc => Ok(SortValue::Int(global_doc as i64)),
            _ => segment.sort_value(&field.field, local_doc),
        })
        .collect()
}

/// Check that a `search_after` cursor lines up with the sort.
pub fn validate_search_after(sort: &[SortField], after: &[SortValue]) -> Result<()> {
    if after.len() != sort.len() {
        return Err(IrisError::invalid_argument(format!(
            "after doc has {} value(s) but sort has {}",
            after.len(),
            sort.len()
        )));
    }
    for (field, value) in sort.iter().zip(after) {
        if !value.matches_type(field.field_type) {
            return Err(IrisError::invalid_argument(format!(
                "search_after value {value:?} does not match type {:?} of sort field [{}]",
                field.field_type, field.field
            )));
        }
    }
    Ok(())
}

/// Keeps the best `num_hits` documents of every sub-query by a sort chain.
#[derive(Debug)]
pub struct HybridTopFieldDocSortCollector {
    sort: Arc<SortComparator>,
    after: Option<ScoreDoc>,
    queues: Vec<TopNQueue<FieldEntry>>,
    hits: HitCounter,
    max_score: f32,
    segment: Option<SegmentContext>,
    segment_can_terminate: bool,
    terminated_early: bool,
}

impl HybridTopFieldDocSortCollector {
    pub fn new(
        num_sub_queries: usize,
        sort: Vec<SortField>,
        num_hits: usize,
        threshold_checker: Arc<HitsThresholdChecker>,
    ) -> Result<Self> {
        if sort.is_empty() {
            return Err(IrisError::invalid_argument("sort must contain at least one field"));
        }
        Ok(HybridTopFieldDocSortCollector {
            sort: Arc::new(SortComparator::new(sort)),
            after: None,
            queues: (0..num_sub_queries).map(|_| TopNQueue::new(num_hits)).collect(),
            hits: HitCounter::new(threshold_checker, num_sub_queries),
            max_score: 0.0,
            segment: None,
            segment_can_terminate: false,
            terminated_early: false,
        })
    }

    /// Paging variant: only documents strictly after `after` are kept.
    pub fn with_search_after(
        num_sub_queries: usize,
        sort: Vec<SortField>,
        num_hits: usize,
        threshold_checker: Arc<HitsThresholdChecker>,
        after: ScoreDoc,
    ) -> Result<Self> {
        validate_search_after(&sort, &after.fields)?;
        let mut collector = Self::new(num_sub_queries, sort, num_hits, threshold_checker)?;
        collector.after = Some(after);
        Ok(collector)
    }

    fn is_after_cursor(&self, values: &[SortValue], global_doc: DocId) -> bool {
        match &self.after {
            None => true,
            Some(after) => match self.sort.compare_values(values, &after.fields) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => global_doc > after.doc,
            },
        }
    }
}

impl Collector for HybridTopFieldDocSortCollector {
    fn score_mode(&self) -> ScoreMode {
        self.hits.score_mode()
    }

    fn set_next_segment(&mut self, context: &SegmentContext) -> Result<()> {
        self.segment_can_terminate = can_early_terminate(self.sort.fields(), &context.index_sort);
        self.segment = Some(context.clone());
        Ok(())
    }

    fn collect(&mut self, doc: DocId, sub_scores: &[f32]) -> Result<CollectControl> {
        check_sub_scores(self.queues.len(), sub_scores)?;
        let Some(segment) = &self.segment else {
            return Err(IrisError::illegal_state("collect called before set_next_segment"));
        };
        if !sub_scores.iter().any(|&s| is_competitive(s)) {
            return Ok(CollectControl::Continue);
        }

        self.hits.increment();
        if self.segment_can_terminate
            && self.queues.iter().all(|q| q.is_full())
            && self.hits.threshold_reached()
        {
            // Later docs of this segment sort after everything queued.
            info!(
                "hybrid sort collector terminated segment {} early after {} hits",
                segment.ord, self.hits.total_hits
            );
            self.terminated_early = true;
            self.hits.relation = TotalHitsRelation::GreaterThanOrEqualTo;
            return Ok(CollectControl::TerminateSegment);
        }

        let global = segment.doc_base + doc;
        for (i, &score) in sub_scores.iter().enumerate() {
            if !is_competitive(score) {
                continue;
            }
            self.hits.per_sub_query[i] += 1;
            self.max_score = self.max_score.max(score);

            let values = sort_values(self.sort.fields(), segment, doc, global, score)?;
            if !self.is_after_cursor(&values, global) {
                continue;
            }
            self.queues[i].offer(FieldEntry::new(global, score, values, self.sort.clone()));
        }
        Ok(CollectControl::Continue)
    }

    fn hybrid_collectors(&self) -> Vec<&dyn HybridSearchCollector> {
        vec![self]
    }
}

impl HybridSearchCollector for HybridTopFieldDocSortCollector {
    fn top_docs(&self) -> Result<Vec<TopDocs>> {
        Ok(self
            .queues
            .iter()
            .enumerate()
            .map(|(i, queue)| {
                let score_docs = queue
                    .to_sorted_vec()
                    .into_iter()
                    .map(FieldEntry::into_score_doc)
                    .collect();
                TopDocs::with_fields(
                    self.hits.sub_query_total(i),
                    score_docs,
                    self.sort.fields().to_vec(),
                )
            })
            .collect())
    }

    fn total_hits(&self) -> TotalHits {
        self.hits.total()
    }

    fn max_score(&self) -> f32 {
        self.max_score
    }

    fn result_kind(&self) -> TopDocsKind {
        TopDocsKind::Fields {
            sort_fields: self.sort.fields().to_vec(),
        }
    }

    fn terminated_early(&self) -> bool {
        self.terminated_early
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::collector::MemorySegmentDocValues;

    fn price_segment(prices: &[i64]) -> SegmentContext {
        let values = MemorySegmentDocValues::new()
            .with_sort_values("price", prices.iter().map(|&p| SortValue::Int(p)).collect());
        SegmentContext::new(0, 0, prices.len() as i32).with_doc_values(Arc::new(values))
    }

    fn price_sort() -> Vec<SortField> {
        vec![SortField::new("price", SortFieldType::Int)]
    }

    fn ids(top: &TopDocs) -> Vec<i32> {
        top.score_docs.iter().map(|d| d.doc).collect()
    }

    #[test]
    fn test_sorted_by_field() {
        let checker = Arc::new(HitsThresholdChecker::new(10_000));
        let mut c = HybridTopFieldDocSortCollector::new(2, price_sort(), 10, checker).unwrap();
        c.set_next_segment(&price_segment(&[30, 10, 20])).unwrap();
        c.collect(0, &[1.0, 0.0]).unwrap();
        c.collect(1, &[1.0, 2.0]).unwrap();
        c.collect(2, &[5.0, 0.0]).unwrap();

        let top = c.top_docs().unwrap();
        assert_eq!(ids(&top[0]), vec![1, 2, 0]);
        assert_eq!(ids(&top[1]), vec![1]);
        assert_eq!(top[0].score_docs[0].fields, vec![SortValue::Int(10)]);
        assert_eq!(c.total_hits().value, 3);
    }

    #[test]
    fn test_score_sort_uses_sub_query_score() {
        let checker = Arc::new(HitsThresholdChecker::new(10_000));
        let mut c =
            HybridTopFieldDocSortCollector::new(1, vec![SortField::score()], 10, checker).unwrap();
        c.set_next_segment(&SegmentContext::new(0, 0, 3)).unwrap();
        c.collect(0, &[1.0]).unwrap();
        c.collect(1, &[3.0]).unwrap();
        assert_eq!(ids(&c.top_docs().unwrap()[0]), vec![1, 0]);
    }

    #[test]
    fn test_search_after_skips_docs_up_to_cursor() {
        let checker = Arc::new(HitsThresholdChecker::new(10_000));
        let after = ScoreDoc::with_fields(1, 0.0, vec![SortValue::Int(20)]);
        let mut c =
            HybridTopFieldDocSortCollector::with_search_after(1, price_sort(), 10, checker, after)
                .unwrap();
        c.set_next_segment(&price_segment(&[10, 20, 20, 30])).unwrap();
        for doc in 0..4 {
            c.collect(doc, &[1.0]).unwrap();
        }
        // Doc 2 ties with the cursor on price but has a higher doc id.
        assert_eq!(ids(&c.top_docs().unwrap()[0]), vec![2, 3]);
        assert_eq!(c.total_hits().value, 4);
    }

    #[test]
    fn test_search_after_shape_must_match_sort() {
        let checker = Arc::new(HitsThresholdChecker::new(10));
        let after = ScoreDoc::with_fields(1, 0.0, vec![SortValue::Int(1), SortValue::Int(2)]);
        let err = HybridTopFieldDocSortCollector::with_search_after(
            1,
            price_sort(),
            10,
            checker.clone(),
            after,
        )
        .unwrap_err();
        assert!(err.is_user_error());

        let wrong_type = ScoreDoc::with_fields(1, 0.0, vec![SortValue::Str("x".into())]);
        assert!(
            HybridTopFieldDocSortCollector::with_search_after(
                1,
                price_sort(),
                10,
                checker,
                wrong_type
            )
            .is_err()
        );
    }

    #[test]
    fn test_early_termination_on_index_sort() {
        let checker = Arc::new(HitsThresholdChecker::new(2));
        let mut c = HybridTopFieldDocSortCollector::new(1, price_sort(), 2, checker).unwrap();
        let segment = price_segment(&[1, 2, 3, 4]).with_index_sort(price_sort());
        c.set_next_segment(&segment).unwrap();

        assert_eq!(c.collect(0, &[1.0]).unwrap(), CollectControl::Continue);
        assert_eq!(c.collect(1, &[1.0]).unwrap(), CollectControl::Continue);
        assert_eq!(c.collect(2, &[1.0]).unwrap(), CollectControl::TerminateSegment);

        assert!(c.terminated_early());
        assert!(c.total_hits().is_lower_bound());
        assert_eq!(ids(&c.top_docs().unwrap()[0]), vec![0, 1]);
    }
}
