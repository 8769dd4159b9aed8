//! Score-ordered hybrid collector.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::hybrid::collector::queue::TopNQueue;
use crate::hybrid::collector::{
    CollectControl, Collector, HitCounter, HitsThresholdChecker, HybridSearchCollector, ScoreMode,
    SegmentContext, check_sub_scores, is_competitive,
};
use crate::hybrid::score_doc::{DocId, ScoreDoc, TopDocs, TopDocsKind, TotalHits};

/// Queue entry; greater is better. Equal scores prefer the lower doc id.
#[derive(Debug, Clone, Copy)]
struct ScoredEntry {
    doc: DocId,
    score: f32,
}

impl PartialEq for ScoredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredEntry {}

impl PartialOrd for ScoredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.doc.cmp(&self.doc))
    }
}

/// Keeps the best `num_hits` documents of every sub-query by score.
#[derive(Debug)]
pub struct HybridTopScoreDocCollector {
    queues: Vec<TopNQueue<ScoredEntry>>,
    hits: HitCounter,
    max_score: f32,
    doc_base: DocId,
}

impl HybridTopScoreDocCollector {
    pub fn new(
        num_sub_queries: usize,
        num_hits: usize,
        threshold_checker: Arc<HitsThresholdChecker>,
    ) -> Self {
        HybridTopScoreDocCollector {
            queues: (0..num_sub_queries).map(|_| TopNQueue::new(num_hits)).collect(),
            hits: HitCounter::new(threshold_checker, num_sub_queries),
            max_score: 0.0,
            doc_base: 0,
        }
    }
}

impl Collector for HybridTopScoreDocCollector {
    fn score_mode(&self) -> ScoreMode {
        self.hits.score_mode()
    }

    fn set_next_segment(&mut self, context: &SegmentContext) -> Result<()> {
        self.doc_base = context.doc_base;
        Ok(())
    }

    fn collect(&mut self, doc: DocId, sub_scores: &[f32]) -> Result<CollectControl> {
        check_sub_scores(self.queues.len(), sub_scores)?;

        // Every collected doc is a shard hit, competitive or not.
        self.hits.increment();
        let global = self.doc_base + doc;
        for (i, &score) in sub_scores.iter().enumerate() {
            if !is_competitive(score) {
                continue;
            }
            self.hits.per_sub_query[i] += 1;
            self.max_score = self.max_score.max(score);
            self.queues[i].offer(ScoredEntry { doc: global, score });
        }
        Ok(CollectControl::Continue)
    }

    fn hybrid_collectors(&self) -> Vec<&dyn HybridSearchCollector> {
        vec![self]
    }
}

impl HybridSearchCollector for HybridTopScoreDocCollector {
    fn top_docs(&self) -> Result<Vec<TopDocs>> {
        Ok(self
            .queues
            .iter()
            .enumerate()
            .map(|(i, queue)| {
                let score_docs = queue
                    .to_sorted_vec()
                    .into_iter()
                    .map(|entry| ScoreDoc::new(entry.doc, entry.score))
                    .collect();
                TopDocs::new(self.hits.sub_query_total(i), score_docs)
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
        TopDocsKind::Scores
    }
}
