//! Fan-out to several collectors.

use crate::error::Result;
use crate::hybrid::collector::{
    CollectControl, Collector, HybridSearchCollector, ScoreMode, SegmentContext,
};
use crate::hybrid::score_doc::DocId;

/// Feeds every document to each child until the child terminates the segment.
#[derive(Debug, Default)]
pub struct MultiCollector {
    collectors: Vec<Box<dyn Collector>>,
    terminated: Vec<bool>,
}

impl MultiCollector {
    pub fn new(collectors: Vec<Box<dyn Collector>>) -> Self {
        let terminated = vec![false; collectors.len()];
        MultiCollector {
            collectors,
            terminated,
        }
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl Collector for MultiCollector {
    fn score_mode(&self) -> ScoreMode {
        if self
            .collectors
            .iter()
            .any(|c| c.score_mode() == ScoreMode::Complete)
        {
            ScoreMode::Complete
        } else {
            ScoreMode::TopScores
        }
    }

    fn set_next_segment(&mut self, context: &SegmentContext) -> Result<()> {
        self.terminated.iter_mut().for_each(|t| *t = false);
        for collector in &mut self.collectors {
            collector.set_next_segment(context)?;
        }
        Ok(())
    }

    fn collect(&mut self, doc: DocId, sub_scores: &[f32]) -> Result<CollectControl> {
        for (collector, terminated) in self.collectors.iter_mut().zip(self.terminated.iter_mut()) {
            if *terminated {
                continue;
            }
            if collector.collect(doc, sub_scores)? == CollectControl::TerminateSegment {
                *terminated = true;
            }
        }
        if self.terminated.iter().all(|&t| t) {
            Ok(CollectControl::TerminateSegment)
        } else {
            Ok(CollectControl::Continue)
        }
    }

    fn hybrid_collectors(&self) -> Vec<&dyn HybridSearchCollector> {
        self.collectors
            .iter()
            .flat_map(|c| c.hybrid_collectors())
            .collect()
    }
}
