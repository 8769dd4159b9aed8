//! Collapsing hybrid collector: groups hits by a field and keeps the best
//! groups of every sub-query.

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{IrisError, Result};
use crate::hybrid::collector::field_sort::{FieldEntry, sort_values};
use crate::hybrid::collector::queue::TopNQueue;
use crate::hybrid::collector::{
    CollectControl, Collector, HitCounter, HitsThresholdChecker, HybridSearchCollector, ScoreMode,
    SegmentContext, check_sub_scores, is_competitive,
};
use crate::hybrid::score_doc::{
    CollapseValue, DocId, ScoreDoc, SortField, SortValue, TopDocs, TopDocsKind, TotalHits,
};
use crate::hybrid::sort::SortComparator;

type Groups = AHashMap<CollapseValue, TopNQueue<FieldEntry>>;

#[derive(Debug)]
pub struct HybridCollapsingTopDocsCollector {
    field: String,
    /// `None` collapses by score.
    sort: Option<Vec<SortField>>,
    comparator: Arc<SortComparator>,
    num_hits: usize,
    docs_per_group_per_sub_query: usize,
    groups: Vec<Groups>,
    hits: HitCounter,
    max_score: f32,
    segment: Option<SegmentContext>,
}

impl HybridCollapsingTopDocsCollector {
    /// `num_hits` bounds the number of groups returned per sub-query.
    pub fn new(
        num_sub_queries: usize,
        field: impl Into<String>,
        sort: Option<Vec<SortField>>,
        num_hits: usize,
        docs_per_group_per_sub_query: usize,
        threshold_checker: Arc<HitsThresholdChecker>,
    ) -> Result<Self> {
        if docs_per_group_per_sub_query == 0 {
            return Err(IrisError::invalid_argument(
                "docs_per_group_per_sub_query must be greater than 0",
            ));
        }
        let comparator_fields = match &sort {
            Some(fields) if !fields.is_empty() => fields.clone(),
            Some(_) => {
                return Err(IrisError::invalid_argument("sort must contain at least one field"));
            }
            None => vec![SortField::score()],
        };
        Ok(HybridCollapsingTopDocsCollector {
            field: field.into(),
            sort,
            comparator: Arc::new(SortComparator::new(comparator_fields)),
            num_hits,
            docs_per_group_per_sub_query,
            groups: (0..num_sub_queries).map(|_| Groups::default()).collect(),
            hits: HitCounter::new(threshold_checker, num_sub_queries),
            max_score: 0.0,
            segment: None,
        })
    }

    fn sort_fields(&self) -> Vec<SortField> {
        self.sort.clone().unwrap_or_default()
    }

    fn output_doc(&self, entry: FieldEntry) -> ScoreDoc {
        if self.sort.is_some() {
            entry.into_score_doc()
        } else {
            ScoreDoc::new(entry.doc, entry.score)
        }
    }

    fn sub_query_top_docs(&self, index: usize) -> TopDocs {
        let mut ranked: Vec<(CollapseValue, Vec<FieldEntry>)> = self.groups[index]
            .iter()
            .map(|(value, queue)| (value.clone(), queue.to_sorted_vec()))
            .filter(|(_, entries)| !entries.is_empty())
            .collect();
        // Best group first, by the best entry of each group.
        ranked.sort_by(|(_, a), (_, b)| b[0].cmp(&a[0]));
        ranked.truncate(self.num_hits);

        let mut score_docs = Vec::new();
        let mut collapse_values = Vec::new();
        for (value, entries) in ranked {
            for entry in entries {
                score_docs.push(self.output_doc(entry));
                collapse_values.push(value.clone());
            }
        }
        TopDocs::collapsed(
            self.hits.sub_query_total(index),
            score_docs,
            self.field.clone(),
            self.sort_fields(),
            collapse_values,
        )
    }
}

impl Collector for HybridCollapsingTopDocsCollector {
    fn score_mode(&self) -> ScoreMode {
        self.hits.score_mode()
    }

    fn set_next_segment(&mut self, context: &SegmentContext) -> Result<()> {
        self.segment = Some(context.clone());
        Ok(())
    }

    fn collect(&mut self, doc: DocId, sub_scores: &[f32]) -> Result<CollectControl> {
        check_sub_scores(self.groups.len(), sub_scores)?;
        let Some(segment) = &self.segment else {
            return Err(IrisError::illegal_state("collect called before set_next_segment"));
        };
        if !sub_scores.iter().any(|&s| is_competitive(s)) {
            return Ok(CollectControl::Continue);
        }
        self.hits.increment();

        let global = segment.doc_base + doc;
        let group_value = segment.collapse_value(&self.field, doc)?;
        for (i, &score) in sub_scores.iter().enumerate() {
            if !is_competitive(score) {
                continue;
            }
            self.hits.per_sub_query[i] += 1;
            self.max_score = self.max_score.max(score);

            let values = match &self.sort {
                Some(fields) => sort_values(fields, segment, doc, global, score)?,
                None => vec![SortValue::Float(score as f64)],
            };
            let per_group = self.docs_per_group_per_sub_query;
            self.groups[i]
                .entry(group_value.clone())
                .or_insert_with(|| TopNQueue::new(per_group))
                .offer(FieldEntry::new(global, score, values, self.comparator.clone()));
        }
        Ok(CollectControl::Continue)
    }

    fn hybrid_collectors(&self) -> Vec<&dyn HybridSearchCollector> {
        vec![self]
    }
}

impl HybridSearchCollector for HybridCollapsingTopDocsCollector {
    fn top_docs(&self) -> Result<Vec<TopDocs>> {
        Ok((0..self.groups.len()).map(|i| self.sub_query_top_docs(i)).collect())
    }

    fn total_hits(&self) -> TotalHits {
        self.hits.total()
    }

    fn max_score(&self) -> f32 {
        self.max_score
    }

    fn result_kind(&self) -> TopDocsKind {
        TopDocsKind::Collapse {
            field: self.field.clone(),
            sort_fields: self.sort_fields(),
            collapse_values: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::collector::MemorySegmentDocValues;
    use crate::hybrid::score_doc::SortFieldType;

    fn segment() -> SegmentContext {
        let colors = ["red", "blue", "red", "green", "red"]
            .iter()
            .map(|c| CollapseValue::Str(c.to_string()))
            .collect();
        let prices = [5, 3, 1, 4, 2].iter().map(|&p| SortValue::Int(p)).collect();
        let values = MemorySegmentDocValues::new()
            .with_collapse_values("color", colors)
            .with_sort_values("price", prices);
        SegmentContext::new(0, 0, 5).with_doc_values(Arc::new(values))
    }

    fn checker() -> Arc<HitsThresholdChecker> {
        Arc::new(HitsThresholdChecker::new(10_000))
    }

    #[test]
    fn test_groups_by_score() {
        let mut c =
            HybridCollapsingTopDocsCollector::new(1, "color", None, 2, 2, checker()).unwrap();
        c.set_next_segment(&segment()).unwrap();
        for (doc, score) in [(0, 1.0), (1, 4.0), (2, 3.0), (3, 0.5), (4, 2.0)] {
            c.collect(doc, &[score]).unwrap();
        }

        let top = &c.top_docs().unwrap()[0];
        let docs: Vec<i32> = top.score_docs.iter().map(|d| d.doc).collect();
        // Blue (4.0) then red (3.0, 2.0); green falls outside the two groups.
        assert_eq!(docs, vec![1, 2, 4]);
        assert_eq!(
            top.collapse_values().unwrap(),
            &[
                CollapseValue::Str("blue".into()),
                CollapseValue::Str("red".into()),
                CollapseValue::Str("red".into()),
            ]
        );
        assert!(top.score_docs.iter().all(|d| d.fields.is_empty()));
        assert_eq!(top.total_hits.value, 5);
    }

    #[test]
    fn test_groups_by_sort_field() {
        let sort = vec![SortField::new("price", SortFieldType::Int)];
        let mut c =
            HybridCollapsingTopDocsCollector::new(2, "color", Some(sort.clone()), 10, 1, checker())
                .unwrap();
        c.set_next_segment(&segment()).unwrap();
        for doc in 0..5 {
            c.collect(doc, &[1.0, 0.0]).unwrap();
        }

        let top = c.top_docs().unwrap();
        let docs: Vec<i32> = top[0].score_docs.iter().map(|d| d.doc).collect();
        // Cheapest per color: red=doc 2, blue=doc 1, green=doc 3.
        assert_eq!(docs, vec![2, 1, 3]);
        assert_eq!(top[0].score_docs[0].fields, vec![SortValue::Int(1)]);
        assert_eq!(top[0].sort_fields(), Some(sort.as_slice()));
        assert!(top[1].score_docs.is_empty());
    }

    #[test]
    fn test_zero_docs_per_group_rejected() {
        assert!(HybridCollapsingTopDocsCollector::new(1, "color", None, 2, 0, checker()).is_err());
    }
}
