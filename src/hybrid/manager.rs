//! Collector manager for hybrid queries.
//!
//! The manager validates the request, hands out collectors according to its
//! [`CollectorReusePolicy`] and, once every collector is done, reduces their
//! per-subquery results into a single delimited [`TopDocs`] stream.

use std::sync::Arc;

use log::error;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};
use crate::hybrid::collector::collapse::HybridCollapsingTopDocsCollector;
use crate::hybrid::collector::field_sort::{
    HybridTopFieldDocSortCollector, validate_search_after,
};
use crate::hybrid::collector::filtered::{DocFilter, FilteredCollector};
use crate::hybrid::collector::top_score::HybridTopScoreDocCollector;
use crate::hybrid::collector::{
    Collector, CollectorReusePolicy, HitsThresholdChecker, HybridSearchCollector,
};
use crate::hybrid::format::build_stream;
use crate::hybrid::merge::TopDocsMerger;
use crate::hybrid::rescore::RescoreContext;
use crate::hybrid::score_doc::{
    DocId, ScoreDoc, SortField, SortValue, TopDocs, TopDocsAndMaxScore, TotalHits,
    TotalHitsRelation,
};
use crate::hybrid::sort::sorts_by_score;

/// Hit counting is switched off.
pub const TRACK_TOTAL_HITS_DISABLED: i64 = -1;
/// Count every hit exactly.
pub const TRACK_TOTAL_HITS_ACCURATE: i64 = i32::MAX as i64;
pub const DEFAULT_TRACK_TOTAL_HITS_UP_TO: i64 = 10_000;
pub const MIN_PAGINATION_DEPTH: usize = 1;
pub const MAX_PAGINATION_DEPTH: usize = 10_000;

/// A collector handed out by the manager.
pub type SharedCollector = Arc<Mutex<Box<dyn Collector>>>;

/// Field collapsing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseConfig {
    pub field: String,
    pub docs_per_group_per_sub_query: usize,
}

impl CollapseConfig {
    pub fn new<S: Into<String>>(field: S) -> Self {
        CollapseConfig {
            field: field.into(),
            docs_per_group_per_sub_query: 1,
        }
    }

    pub fn with_docs_per_group_per_sub_query(mut self, docs: usize) -> Self {
        self.docs_per_group_per_sub_query = docs;
        self
    }
}

/// Request-level settings of one hybrid search on one shard.
#[derive(Debug, Clone)]
pub struct HybridSearchContext {
    pub from: usize,
    pub size: usize,
    pub pagination_depth: Option<usize>,
    pub sort: Option<Vec<SortField>>,
    pub track_scores: bool,
    pub scroll: bool,
    pub search_after: Option<Vec<SortValue>>,
    pub collapse: Option<CollapseConfig>,
    pub track_total_hits_up_to: i64,
    pub post_filter: Option<Arc<dyn DocFilter>>,
    pub rescore: Vec<RescoreContext>,
    /// Live documents of the reader the search runs against.
    pub reader_num_docs: usize,
    pub num_sub_queries: usize,
    pub shard_index: i32,
    /// The whole index lives on this one shard.
    pub single_shard: bool,
}

impl Default for HybridSearchContext {
    fn default() -> Self {
        HybridSearchContext {
            from: 0,
            size: 10,
            pagination_depth: None,
            sort: None,
            track_scores: false,
            scroll: false,
            search_after: None,
            collapse: None,
            track_total_hits_up_to: DEFAULT_TRACK_TOTAL_HITS_UP_TO,
            post_filter: None,
            rescore: Vec::new(),
            reader_num_docs: 0,
            num_sub_queries: 1,
            shard_index: -1,
            single_shard: false,
        }
    }
}

impl HybridSearchContext {
    pub fn new(num_sub_queries: usize, reader_num_docs: usize) -> Self {
        HybridSearchContext {
            num_sub_queries,
            reader_num_docs,
            ..Default::default()
        }
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_pagination_depth(mut self, depth: usize) -> Self {
        self.pagination_depth = Some(depth);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_track_scores(mut self, track_scores: bool) -> Self {
        self.track_scores = track_scores;
        self
    }

    pub fn with_scroll(mut self, scroll: bool) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn with_search_after(mut self, values: Vec<SortValue>) -> Self {
        self.search_after = Some(values);
        self
    }

    pub fn with_collapse(mut self, collapse: CollapseConfig) -> Self {
        self.collapse = Some(collapse);
        self
    }

    pub fn with_track_total_hits_up_to(mut self, up_to: i64) -> Self {
        self.track_total_hits_up_to = up_to;
        self
    }

    pub fn with_post_filter(mut self, filter: Arc<dyn DocFilter>) -> Self {
        self.post_filter = Some(filter);
        self
    }

    pub fn with_rescore(mut self, rescore: RescoreContext) -> Self {
        self.rescore.push(rescore);
        self
    }

    pub fn with_shard_index(mut self, shard_index: i32) -> Self {
        self.shard_index = shard_index;
        self
    }

    pub fn with_single_shard(mut self, single_shard: bool) -> Self {
        self.single_shard = single_shard;
        self
    }

    /// Reject option combinations hybrid retrieval cannot serve.
    pub fn validate(&self) -> Result<()> {
        if self.scroll {
            return Err(IrisError::invalid_argument(
                "Scroll operation is not supported in hybrid query",
            ));
        }
        if let Some(sort) = &self.sort {
            if sorts_by_score(sort) && sort.len() > 1 {
                return Err(IrisError::invalid_argument(
                    "_score sort criteria cannot be applied with any other criteria. Please select one sort criteria out of them.",
                ));
            }
            if self.track_scores {
                return Err(IrisError::invalid_argument(
                    "Hybrid search results when sorted by any field, docId or score, cannot be tracked",
                ));
            }
        }
        match (&self.search_after, &self.sort) {
            (Some(_), None) => {
                return Err(IrisError::invalid_argument(
                    "search_after can only be used together with sort",
                ));
            }
            (Some(after), Some(sort)) => validate_search_after(sort, after)?,
            _ => {}
        }
        match self.pagination_depth {
            None if self.from > 0 => {
                return Err(IrisError::invalid_argument(
                    "pagination_depth param is missing in the search request",
                ));
            }
            Some(depth) if !(MIN_PAGINATION_DEPTH..=MAX_PAGINATION_DEPTH).contains(&depth) => {
                return Err(IrisError::invalid_argument(format!(
                    "pagination_depth should be less than or equal to {MAX_PAGINATION_DEPTH} and more than {}",
                    MIN_PAGINATION_DEPTH - 1
                )));
            }
            _ => {}
        }
        if self.num_sub_queries == 0 {
            return Err(IrisError::invalid_argument(
                "hybrid query must have at least one sub-query",
            ));
        }
        Ok(())
    }

    /// Number of documents each sub-query has to retrieve.
    pub fn retrieval_window(&self) -> usize {
        self.pagination_depth.unwrap_or(self.size)
    }
}

/// Reduced result of one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySearchResult {
    pub top_docs: TopDocsAndMaxScore,
    pub terminated_early: bool,
    pub from: usize,
    pub size: usize,
    pub sort_fields: Option<Vec<SortField>>,
    pub shard_index: i32,
}

/// Creates collectors for a hybrid search and reduces their results.
#[derive(Debug)]
pub struct HybridCollectorManager {
    policy: CollectorReusePolicy,
    num_sub_queries: usize,
    num_hits: usize,
    threshold_checker: Arc<HitsThresholdChecker>,
    track_total_hits_up_to: i64,
    sort: Option<Vec<SortField>>,
    search_after: Option<Vec<SortValue>>,
    collapse: Option<CollapseConfig>,
    post_filter: Option<Arc<dyn DocFilter>>,
    rescore: Vec<RescoreContext>,
    from: usize,
    size: usize,
    /// `from` of the request when it was zeroed for a single-shard search.
    original_from: Option<usize>,
    shard_index: i32,
    owned: Option<SharedCollector>,
}

impl HybridCollectorManager {
    /// Validate `ctx` and build a manager for it.
    ///
    /// On a single shard a non-zero `from` is reset to 0 in `ctx` so the
    /// caller keeps the full window; [`Self::original_from`] remembers it.
    pub fn new(ctx: &mut HybridSearchContext, policy: CollectorReusePolicy) -> Result<Self> {
        ctx.validate()?;

        let num_hits = ctx.retrieval_window().min(ctx.reader_num_docs).max(1);
        let threshold = if ctx.track_total_hits_up_to == TRACK_TOTAL_HITS_ACCURATE {
            usize::MAX
        } else {
            num_hits.max(ctx.track_total_hits_up_to.max(0) as usize)
        };

        let original_from = if ctx.single_shard && ctx.from > 0 {
            let from = ctx.from;
            ctx.from = 0;
            Some(from)
        } else {
            None
        };

        let mut manager = HybridCollectorManager {
            policy,
            num_sub_queries: ctx.num_sub_queries,
            num_hits,
            threshold_checker: Arc::new(HitsThresholdChecker::new(threshold)),
            track_total_hits_up_to: ctx.track_total_hits_up_to,
            sort: ctx.sort.clone(),
            search_after: ctx.search_after.clone(),
            collapse: ctx.collapse.clone(),
            post_filter: ctx.post_filter.clone(),
            rescore: ctx.rescore.clone(),
            from: ctx.from,
            size: ctx.size,
            original_from,
            shard_index: ctx.shard_index,
            owned: None,
        };
        if policy == CollectorReusePolicy::Owned {
            manager.owned = Some(Arc::new(Mutex::new(manager.create_collector()?)));
        }
        Ok(manager)
    }

    pub fn policy(&self) -> CollectorReusePolicy {
        self.policy
    }

    pub fn num_hits(&self) -> usize {
        self.num_hits
    }

    pub fn num_sub_queries(&self) -> usize {
        self.num_sub_queries
    }

    pub fn original_from(&self) -> Option<usize> {
        self.original_from
    }

    pub fn threshold_checker(&self) -> &Arc<HitsThresholdChecker> {
        &self.threshold_checker
    }

    /// The shared collector with the `Owned` policy, a fresh one otherwise.
    pub fn new_collector(&self) -> Result<SharedCollector> {
        match &self.owned {
            Some(collector) => Ok(collector.clone()),
            None => Ok(Arc::new(Mutex::new(self.create_collector()?))),
        }
    }

    fn create_collector(&self) -> Result<Box<dyn Collector>> {
        let checker = self.threshold_checker.clone();
        let n = self.num_sub_queries;
        let collector: Box<dyn Collector> = match (&self.collapse, &self.sort) {
            (Some(collapse), sort) => Box::new(HybridCollapsingTopDocsCollector::new(
                n,
                collapse.field.clone(),
                sort.clone(),
                self.num_hits,
                collapse.docs_per_group_per_sub_query,
                checker,
            )?),
            (None, Some(sort)) => match &self.search_after {
                Some(after) => {
                    // The cursor doc id never wins a tie on its sort values.
                    let after = ScoreDoc::with_fields(DocId::MAX, f32::NAN, after.clone());
                    Box::new(HybridTopFieldDocSortCollector::with_search_after(
                        n,
                        sort.clone(),
                        self.num_hits,
                        checker,
                        after,
                    )?)
                }
                None => Box::new(HybridTopFieldDocSortCollector::new(
                    n,
                    sort.clone(),
                    self.num_hits,
                    checker,
                )?),
            },
            (None, None) => Box::new(HybridTopScoreDocCollector::new(n, self.num_hits, checker)),
        };
        Ok(match &self.post_filter {
            Some(filter) => Box::new(FilteredCollector::new(collector, filter.clone())),
            None => collector,
        })
    }

    /// Merge the results of every collector into one delimited result.
    pub fn reduce(&self, collectors: &[SharedCollector]) -> Result<QuerySearchResult> {
        let mut unique: Vec<&SharedCollector> = Vec::with_capacity(collectors.len());
        for collector in collectors {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, collector)) {
                unique.push(collector);
            }
        }
        let guards: Vec<_> = unique.iter().map(|c| c.lock()).collect();
        let hybrid: Vec<&dyn HybridSearchCollector> =
            guards.iter().flat_map(|g| g.hybrid_collectors()).collect();
        if hybrid.is_empty() {
            return Err(IrisError::illegal_state(
                "cannot collect results of hybrid search query, there are no proper score collectors",
            ));
        }

        let merger = TopDocsMerger::new(self.sort.clone(), self.collapse.is_some());
        let mut merged: Option<TopDocsAndMaxScore> = None;
        let mut terminated_early = false;
        for collector in hybrid {
            let partial = self.collector_result(collector)?;
            terminated_early |= collector.terminated_early();
            merged = Some(match merged {
                None => partial,
                Some(source) => merger.merge(&source, &partial)?,
            });
        }
        let top_docs = merged.ok_or_else(|| IrisError::internal("no hybrid result to reduce"))?;

        Ok(QuerySearchResult {
            top_docs,
            terminated_early,
            from: self.from,
            size: self.size,
            sort_fields: self.sort.clone(),
            shard_index: self.shard_index,
        })
    }

    fn collector_result(&self, collector: &dyn HybridSearchCollector) -> Result<TopDocsAndMaxScore> {
        let mut sub_query_docs = collector.top_docs()?;
        let max_score = if self.rescore.is_empty() {
            collector.max_score()
        } else {
            sub_query_docs = sub_query_docs
                .into_iter()
                .map(|docs| self.apply_rescore(docs))
                .collect::<Result<Vec<_>>>()?;
            sub_query_docs
                .iter()
                .filter_map(|docs| docs.score_docs.first().map(|d| d.score))
                .fold(0.0_f32, f32::max)
        };

        let total_hits = self.total_hits(collector, &sub_query_docs);
        let mut stream = build_stream(&sub_query_docs, total_hits, &collector.result_kind());
        for doc in &mut stream.score_docs {
            doc.shard_index = self.shard_index;
        }
        Ok(TopDocsAndMaxScore::new(stream, max_score))
    }

    fn apply_rescore(&self, mut docs: TopDocs) -> Result<TopDocs> {
        for rescore in &self.rescore {
            docs = rescore.apply(docs).map_err(|e| {
                error!("rescore of hybrid sub-query results failed: {e}");
                IrisError::rescore(e)
            })?;
        }
        Ok(docs)
    }

    fn total_hits(&self, collector: &dyn HybridSearchCollector, sub_query_docs: &[TopDocs]) -> TotalHits {
        let collected = collector.total_hits();
        let relation = if self.track_total_hits_up_to == TRACK_TOTAL_HITS_DISABLED {
            TotalHitsRelation::GreaterThanOrEqualTo
        } else {
            collected.relation
        };
        if sub_query_docs.is_empty() {
            return TotalHits::new(0, relation);
        }
        TotalHits::new(collected.value, relation)
    }
}
