//! Query-phase driver: feeds segment matches to the manager's collectors and
//! reduces them into a shard result.

use log::debug;
use rayon::prelude::*;

use crate::error::{IrisError, Result};
use crate::hybrid::collector::{CollectControl, CollectorReusePolicy, SegmentContext};
use crate::hybrid::manager::{
    HybridCollectorManager, HybridSearchContext, QuerySearchResult, SharedCollector,
};
use crate::hybrid::score_doc::DocId;

/// Outline of a query tree, enough to locate hybrid queries in it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    /// A hybrid query and its sub-queries.
    Hybrid(Vec<QueryShape>),
    /// Any other query wrapping child queries (bool, boost, ...).
    Compound(Vec<QueryShape>),
    Leaf(String),
}

impl QueryShape {
    fn contains_hybrid(&self) -> bool {
        match self {
            QueryShape::Hybrid(_) => true,
            QueryShape::Compound(children) => children.iter().any(QueryShape::contains_hybrid),
            QueryShape::Leaf(_) => false,
        }
    }
}

/// A matching document with one score per sub-query, `0.0` for no match.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentHit {
    pub doc: DocId,
    pub sub_scores: Vec<f32>,
}

impl SegmentHit {
    pub fn new(doc: DocId, sub_scores: Vec<f32>) -> Self {
        SegmentHit { doc, sub_scores }
    }
}

/// A segment with its matches in doc id order.
#[derive(Debug, Clone)]
pub struct SearchSegment {
    pub context: SegmentContext,
    pub hits: Vec<SegmentHit>,
}

impl SearchSegment {
    pub fn new(context: SegmentContext, hits: Vec<SegmentHit>) -> Self {
        SearchSegment { context, hits }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HybridQueryPhase {
    policy: CollectorReusePolicy,
}

impl HybridQueryPhase {
    pub fn new(policy: CollectorReusePolicy) -> Self {
        HybridQueryPhase { policy }
    }

    /// Number of sub-queries of a top-level hybrid query.
    pub fn sub_query_count(query: &QueryShape) -> Result<usize> {
        match query {
            QueryShape::Hybrid(subs) => {
                if subs.iter().any(QueryShape::contains_hybrid) {
                    return Err(nested_hybrid());
                }
                Ok(subs.len())
            }
            other if other.contains_hybrid() => Err(nested_hybrid()),
            _ => Err(IrisError::invalid_argument("query is not a hybrid query")),
        }
    }

    pub fn execute(
        &self,
        query: &QueryShape,
        ctx: &mut HybridSearchContext,
        segments: &[SearchSegment],
    ) -> Result<QuerySearchResult> {
        ctx.num_sub_queries = Self::sub_query_count(query)?;
        let manager = HybridCollectorManager::new(ctx, self.policy)?;

        let collectors = match self.policy {
            CollectorReusePolicy::Owned => {
                let collector = manager.new_collector()?;
                for segment in segments {
                    collect_segment(&collector, segment)?;
                }
                vec![collector]
            }
            CollectorReusePolicy::PerCall => segments
                .par_iter()
                .map(|segment| {
                    let collector = manager.new_collector()?;
                    collect_segment(&collector, segment)?;
                    Ok(collector)
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let mut result = manager.reduce(&collectors)?;
        if let Some(from) = manager.original_from() {
            ctx.from = from;
            result.from = from;
        }
        Ok(result)
    }
}

fn nested_hybrid() -> IrisError {
    IrisError::invalid_argument(
        "hybrid query must be a top level query and cannot be wrapped into other queries",
    )
}

fn collect_segment(collector: &SharedCollector, segment: &SearchSegment) -> Result<()> {
    let mut collector = collector.lock();
    collector.set_next_segment(&segment.context)?;
    for hit in &segment.hits {
        if collector.collect(hit.doc, &hit.sub_scores)? == CollectControl::TerminateSegment {
            debug!("stopped collecting segment {} at doc {}", segment.context.ord, hit.doc);
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::format::split_sub_queries;
    use crate::hybrid::score_doc::TotalHits;

    fn hybrid(n: usize) -> QueryShape {
        QueryShape::Hybrid((0..n).map(|i| QueryShape::Leaf(format!("q{i}"))).collect())
    }

    fn segments() -> Vec<SearchSegment> {
        vec![
            SearchSegment::new(
                SegmentContext::new(0, 0, 30),
                vec![
                    SegmentHit::new(10, vec![2.0, 0.0]),
                    SegmentHit::new(20, vec![1.0, 0.0]),
                ],
            ),
            SearchSegment::new(
                SegmentContext::new(1, 30, 30),
                vec![SegmentHit::new(0, vec![0.0, 3.0])],
            ),
        ]
    }

    #[test]
    fn test_nested_hybrid_rejected() {
        let nested = QueryShape::Compound(vec![hybrid(2)]);
        let err = HybridQueryPhase::sub_query_count(&nested).unwrap_err();
        assert!(err.to_string().contains("must be a top level query"));

        let inner = QueryShape::Hybrid(vec![hybrid(1)]);
        assert!(HybridQueryPhase::sub_query_count(&inner).is_err());
        assert_eq!(HybridQueryPhase::sub_query_count(&hybrid(3)).unwrap(), 3);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        for policy in [CollectorReusePolicy::Owned, CollectorReusePolicy::PerCall] {
            let mut ctx = HybridSearchContext::new(0, 60);
            let result = HybridQueryPhase::new(policy)
                .execute(&hybrid(2), &mut ctx, &segments())
                .unwrap();
            let docs = &result.top_docs.top_docs;
            assert_eq!(docs.total_hits, TotalHits::exact(3));
            let runs: Vec<Vec<i32>> = split_sub_queries(&docs.score_docs)
                .unwrap()
                .into_iter()
                .map(|run| run.iter().map(|d| d.doc).collect())
                .collect();
            assert_eq!(runs, vec![vec![10, 20], vec![30]], "{policy:?}");
        }
    }

    #[test]
    fn test_from_is_restored_after_single_shard_search() {
        let mut ctx = HybridSearchContext::new(0, 60)
            .with_from(1)
            .with_pagination_depth(10)
            .with_single_shard(true);
        let result = HybridQueryPhase::default()
            .execute(&hybrid(2), &mut ctx, &segments())
            .unwrap();
        assert_eq!(ctx.from, 1);
        assert_eq!(result.from, 1);
        // The whole window is returned; trimming happens downstream.
        assert_eq!(result.top_docs.top_docs.total_hits.value, 3);
    }
}
