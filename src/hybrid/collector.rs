//! Per-segment hybrid collectors.
//!
//! A collector sees every matching document of a segment together with the
//! score of each sub-query (`0.0` when the sub-query did not match) and keeps a
//! bounded best-N list per sub-query. The manager only talks to collectors
//! through the [`HybridSearchCollector`] capability, so decorators such as
//! [`filtered::FilteredCollector`] and [`multi::MultiCollector`] can wrap them
//! freely.

pub mod collapse;
pub mod field_sort;
pub mod filtered;
pub mod multi;
mod queue;
pub mod top_score;

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};
use crate::hybrid::score_doc::{
    CollapseValue, DocId, SortField, SortValue, TopDocs, TopDocsKind, TotalHits,
    TotalHitsRelation,
};

/// Whether a collector needs every hit scored or only competitive ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    Complete,
    TopScores,
}

/// What the caller should do after a document was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectControl {
    Continue,
    /// Nothing later in this segment can be competitive.
    TerminateSegment,
}

/// How a manager hands out collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorReusePolicy {
    /// One collector serves every segment of the search.
    #[default]
    Owned,
    /// A fresh collector per call, for concurrent segment search.
    PerCall,
}

/// Per-document values a segment exposes for sorting and collapsing.
pub trait SegmentDocValues: Send + Sync + Debug {
    /// Sort value of a segment-local doc. `Null` when missing.
    fn sort_value(&self, field: &str, doc: DocId) -> Result<SortValue>;

    /// Collapse value of a segment-local doc. `Missing` when absent.
    fn collapse_value(&self, field: &str, doc: DocId) -> Result<CollapseValue>;
}

/// Column-per-field doc values held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySegmentDocValues {
    sort_values: AHashMap<String, Vec<SortValue>>,
    collapse_values: AHashMap<String, Vec<CollapseValue>>,
}

impl MemorySegmentDocValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort_values<S: Into<String>>(mut self, field: S, values: Vec<SortValue>) -> Self {
        self.sort_values.insert(field.into(), values);
        self
    }

    pub fn with_collapse_values<S: Into<String>>(
        mut self,
        field: S,
        values: Vec<CollapseValue>,
    ) -> Self {
        self.collapse_values.insert(field.into(), values);
        self
    }
}

impl SegmentDocValues for MemorySegmentDocValues {
    fn sort_value(&self, field: &str, doc: DocId) -> Result<SortValue> {
        Ok(self
            .sort_values
            .get(field)
            .and_then(|values| values.get(doc as usize))
            .cloned()
            .unwrap_or(SortValue::Null))
    }

    fn collapse_value(&self, field: &str, doc: DocId) -> Result<CollapseValue> {
        Ok(self
            .collapse_values
            .get(field)
            .and_then(|values| values.get(doc as usize))
            .cloned()
            .unwrap_or(CollapseValue::Missing))
    }
}

/// A segment as seen by a collector.
#[derive(Debug, Clone)]
pub struct SegmentContext {
    pub ord: usize,
    /// Added to segment-local doc ids to make them shard-global.
    pub doc_base: DocId,
    pub max_doc: DocId,
    /// Sort the segment's documents are stored in, empty when unsorted.
    pub index_sort: Vec<SortField>,
    pub doc_values: Option<Arc<dyn SegmentDocValues>>,
}

impl SegmentContext {
    pub fn new(ord: usize, doc_base: DocId, max_doc: DocId) -> Self {
        SegmentContext {
            ord,
            doc_base,
            max_doc,
            index_sort: Vec::new(),
            doc_values: None,
        }
    }

    pub fn with_index_sort(mut self, index_sort: Vec<SortField>) -> Self {
        self.index_sort = index_sort;
        self
    }

    pub fn with_doc_values(mut self, doc_values: Arc<dyn SegmentDocValues>) -> Self {
        self.doc_values = Some(doc_values);
        self
    }

    pub fn sort_value(&self, field: &str, doc: DocId) -> Result<SortValue> {
        match &self.doc_values {
            Some(values) => values.sort_value(field, doc),
            None => Ok(SortValue::Null),
        }
    }

    pub fn collapse_value(&self, field: &str, doc: DocId) -> Result<CollapseValue> {
        match &self.doc_values {
            Some(values) => values.collapse_value(field, doc),
            None => Ok(CollapseValue::Missing),
        }
    }
}

/// Counts hits across every collector of one search and decides when enough
/// hits were seen for the total to become a lower bound.
#[derive(Debug)]
pub struct HitsThresholdChecker {
    total_hits_threshold: usize,
    hit_count: AtomicUsize,
}

impl HitsThresholdChecker {
    pub fn new(total_hits_threshold: usize) -> Self {
        HitsThresholdChecker {
            total_hits_threshold,
            hit_count: AtomicUsize::new(0),
        }
    }

    pub fn increment_hit_count(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_threshold_reached(&self) -> bool {
        self.hit_count.load(Ordering::Relaxed) >= self.total_hits_threshold
    }

    pub fn score_mode(&self) -> ScoreMode {
        if self.total_hits_threshold == usize::MAX {
            ScoreMode::Complete
        } else {
            ScoreMode::TopScores
        }
    }

    pub fn total_hits_threshold(&self) -> usize {
        self.total_hits_threshold
    }
}

/// Per-segment document sink.
pub trait Collector: Send + Debug {
    fn score_mode(&self) -> ScoreMode;

    /// Switch to the next segment. Doc ids passed to `collect` are local to it.
    fn set_next_segment(&mut self, context: &SegmentContext) -> Result<()>;

    /// Offer one matching document with one score per sub-query.
    fn collect(&mut self, doc: DocId, sub_scores: &[f32]) -> Result<CollectControl>;

    /// Every hybrid result holder reachable from this collector.
    fn hybrid_collectors(&self) -> Vec<&dyn HybridSearchCollector> {
        Vec::new()
    }
}

/// Capability of collectors that produce per-subquery hybrid results.
pub trait HybridSearchCollector: Send + Debug {
    /// One result list per sub-query, in registration order.
    fn top_docs(&self) -> Result<Vec<TopDocs>>;

    fn total_hits(&self) -> TotalHits;

    fn max_score(&self) -> f32;

    /// Shape of the stream the manager builds from [`HybridSearchCollector::top_docs`].
    fn result_kind(&self) -> TopDocsKind;

    fn terminated_early(&self) -> bool {
        false
    }
}

/// Scores at or below zero never enter a queue.
pub(crate) fn is_competitive(score: f32) -> bool {
    score > 0.0
}

pub(crate) fn check_sub_scores(expected: usize, sub_scores: &[f32]) -> Result<()> {
    if sub_scores.len() != expected {
        return Err(IrisError::illegal_state(format!(
            "expected {expected} sub-query scores, got {}",
            sub_scores.len()
        )));
    }
    Ok(())
}

/// Shared hit accounting of the concrete collectors.
#[derive(Debug)]
pub(crate) struct HitCounter {
    checker: Arc<HitsThresholdChecker>,
    pub(crate) total_hits: u64,
    pub(crate) relation: TotalHitsRelation,
    pub(crate) per_sub_query: Vec<u64>,
}

impl HitCounter {
    pub(crate) fn new(checker: Arc<HitsThresholdChecker>, num_sub_queries: usize) -> Self {
        HitCounter {
            checker,
            total_hits: 0,
            relation: TotalHitsRelation::EqualTo,
            per_sub_query: vec![0; num_sub_queries],
        }
    }

    /// Count one matching document.
    pub(crate) fn increment(&mut self) {
        self.total_hits += 1;
        self.checker.increment_hit_count();
        if self.checker.is_threshold_reached() && self.checker.score_mode() != ScoreMode::Complete {
            self.relation = TotalHitsRelation::GreaterThanOrEqualTo;
        }
    }

    pub(crate) fn threshold_reached(&self) -> bool {
        self.checker.is_threshold_reached()
    }

    pub(crate) fn score_mode(&self) -> ScoreMode {
        self.checker.score_mode()
    }

    pub(crate) fn total(&self) -> TotalHits {
        TotalHits::new(self.total_hits, self.relation)
    }

    pub(crate) fn sub_query_total(&self, index: usize) -> TotalHits {
        TotalHits::new(self.per_sub_query[index], self.relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_checker() {
        let checker = HitsThresholdChecker::new(2);
        assert_eq!(checker.score_mode(), ScoreMode::TopScores);
        checker.increment_hit_count();
        assert!(!checker.is_threshold_reached());
        checker.increment_hit_count();
        assert!(checker.is_threshold_reached());

        assert_eq!(HitsThresholdChecker::new(usize::MAX).score_mode(), ScoreMode::Complete);
    }

    #[test]
    fn test_hit_counter_relation() {
        let checker = Arc::new(HitsThresholdChecker::new(1));
        let mut counter = HitCounter::new(checker, 2);
        counter.increment();
        assert_eq!(counter.total().value, 1);
        assert!(counter.total().is_lower_bound());

        let exhaustive = Arc::new(HitsThresholdChecker::new(usize::MAX));
        let mut counter = HitCounter::new(exhaustive, 1);
        counter.increment();
        assert!(!counter.total().is_lower_bound());
    }

    #[test]
    fn test_segment_context_values() {
        let values = MemorySegmentDocValues::new()
            .with_sort_values("price", vec![SortValue::Int(3)])
            .with_collapse_values("color", vec![CollapseValue::Str("red".into())]);
        let ctx = SegmentContext::new(0, 10, 1).with_doc_values(Arc::new(values));
        assert_eq!(ctx.sort_value("price", 0).unwrap(), SortValue::Int(3));
        assert_eq!(ctx.sort_value("price", 5).unwrap(), SortValue::Null);
        assert_eq!(ctx.collapse_value("size", 0).unwrap(), CollapseValue::Missing);
    }
}
