//! Post-filter decorator.

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashSet;

use crate::error::{IrisError, Result};
use crate::hybrid::collector::{
    CollectControl, Collector, HybridSearchCollector, ScoreMode, SegmentContext,
};
use crate::hybrid::score_doc::DocId;

/// Decides whether a matching document is passed on.
pub trait DocFilter: Send + Sync + Debug {
    /// `doc` is local to `segment`.
    fn matches(&self, segment: &SegmentContext, doc: DocId) -> Result<bool>;
}

/// Accepts a fixed set of shard-global doc ids.
#[derive(Debug, Clone, Default)]
pub struct AllowListFilter {
    docs: AHashSet<DocId>,
}

impl AllowListFilter {
    pub fn new<I: IntoIterator<Item = DocId>>(docs: I) -> Self {
        AllowListFilter {
            docs: docs.into_iter().collect(),
        }
    }
}

impl DocFilter for AllowListFilter {
    fn matches(&self, segment: &SegmentContext, doc: DocId) -> Result<bool> {
        Ok(self.docs.contains(&(segment.doc_base + doc)))
    }
}

/// Forwards only documents accepted by a [`DocFilter`].
#[derive(Debug)]
pub struct FilteredCollector {
    inner: Box<dyn Collector>,
    filter: Arc<dyn DocFilter>,
    segment: Option<SegmentContext>,
}

impl FilteredCollector {
    pub fn new(inner: Box<dyn Collector>, filter: Arc<dyn DocFilter>) -> Self {
        FilteredCollector {
            inner,
            filter,
            segment: None,
        }
    }

    pub fn inner(&self) -> &dyn Collector {
        self.inner.as_ref()
    }
}

impl Collector for FilteredCollector {
    fn score_mode(&self) -> ScoreMode {
        self.inner.score_mode()
    }

    fn set_next_segment(&mut self, context: &SegmentContext) -> Result<()> {
        self.segment = Some(context.clone());
        self.inner.set_next_segment(context)
    }

    fn collect(&mut self, doc: DocId, sub_scores: &[f32]) -> Result<CollectControl> {
        let Some(segment) = &self.segment else {
            return Err(IrisError::illegal_state("collect called before set_next_segment"));
        };
        if !self.filter.matches(segment, doc)? {
            return Ok(CollectControl::Continue);
        }
        self.inner.collect(doc, sub_scores)
    }

    fn hybrid_collectors(&self) -> Vec<&dyn HybridSearchCollector> {
        self.inner.hybrid_collectors()
    }
}
