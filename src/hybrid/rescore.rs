//! Rescoring hook applied to each sub-query result list before the reduce merge.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::hybrid::score_doc::TopDocs;

/// Re-ranks the head of one sub-query's result list.
pub trait Rescorer: Send + Sync + Debug {
    /// Rescore at most `window_size` leading documents of `top_docs` and return
    /// the list in its new order.
    fn rescore(&self, top_docs: TopDocs, window_size: usize) -> Result<TopDocs>;
}

/// One configured rescore pass.
#[derive(Debug, Clone)]
pub struct RescoreContext {
    pub rescorer: Arc<dyn Rescorer>,
    pub window_size: usize,
}

impl RescoreContext {
    pub fn new(rescorer: Arc<dyn Rescorer>, window_size: usize) -> Self {
        RescoreContext {
            rescorer,
            window_size,
        }
    }

    pub fn apply(&self, top_docs: TopDocs) -> Result<TopDocs> {
        self.rescorer.rescore(top_docs, self.window_size)
    }
}

/// Multiplies the scores inside the window by a constant and re-sorts them.
#[derive(Debug, Clone, Copy)]
pub struct ScaleRescorer {
    pub factor: f32,
}

impl ScaleRescorer {
    pub fn new(factor: f32) -> Self {
        ScaleRescorer { factor }
    }
}

impl Rescorer for ScaleRescorer {
    fn rescore(&self, mut top_docs: TopDocs, window_size: usize) -> Result<TopDocs> {
        let window = window_size.min(top_docs.score_docs.len());
        let head = &mut top_docs.score_docs[..window];
        for doc in head.iter_mut() {
            doc.score *= self.factor;
        }
        head.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc.cmp(&b.doc)));
        Ok(top_docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::score_doc::{ScoreDoc, TotalHits};

    #[test]
    fn test_scale_rescorer_only_touches_window() {
        let docs = TopDocs::new(
            TotalHits::exact(3),
            vec![ScoreDoc::new(1, 3.0), ScoreDoc::new(2, 2.0), ScoreDoc::new(3, 1.0)],
        );
        let ctx = RescoreContext::new(Arc::new(ScaleRescorer::new(2.0)), 2);
        let out = ctx.apply(docs).unwrap();
        let scores: Vec<f32> = out.score_docs.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![6.0, 4.0, 1.0]);
    }
}
