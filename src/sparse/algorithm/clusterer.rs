//! Pruning and clustering of one term's postings.

use crate::error::Result;
use crate::sparse::algorithm::ClusteringAlgorithm;
use crate::sparse::algorithm::postings_processor::top_k;
use crate::sparse::cluster::{DocWeight, DocumentCluster};

/// Posting lists shorter than this are kept whole in one unskippable cluster.
pub const MINIMAL_DOC_SIZE_TO_CLUSTER: usize = 10;

/// Prunes a term's postings and clusters what is left.
#[derive(Debug)]
pub struct SeismicPostingClusterer<A> {
    n_postings: usize,
    algorithm: A,
}

impl<A: ClusteringAlgorithm> SeismicPostingClusterer<A> {
    pub fn new(n_postings: usize, algorithm: A) -> Self {
        SeismicPostingClusterer { n_postings, algorithm }
    }

    pub fn n_postings(&self) -> usize {
        self.n_postings
    }

    pub fn cluster(&self, postings: &[DocWeight]) -> Result<Vec<DocumentCluster>> {
        if postings.is_empty() || self.n_postings == 0 {
            return Ok(Vec::new());
        }
        if postings.len() < MINIMAL_DOC_SIZE_TO_CLUSTER {
            return Ok(vec![DocumentCluster::new(postings.to_vec(), None, true)]);
        }
        let mut kept = top_k(postings, self.n_postings);
        kept.sort_by_key(|d| d.doc);
        self.algorithm.cluster(&kept)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sparse::algorithm::{NoopVectorReader, RandomClustering};

    fn postings(n: i32) -> Vec<DocWeight> {
        (0..n).map(|d| DocWeight::new(d, (d * 3) as u8)).collect()
    }

    fn clusterer(n_postings: usize, cluster_ratio: f32) -> SeismicPostingClusterer<RandomClustering> {
        SeismicPostingClusterer::new(
            n_postings,
            RandomClustering::new(0.4, cluster_ratio, Arc::new(NoopVectorReader)).with_seed(3),
        )
    }

    #[test]
    fn test_empty_inputs() {
        assert!(clusterer(10, 0.1).cluster(&[]).unwrap().is_empty());
        assert!(clusterer(0, 0.1).cluster(&postings(20)).unwrap().is_empty());
    }

    #[test]
    fn test_short_lists_are_not_clustered() {
        let input = postings(9);
        let clusters = clusterer(100, 0.5).cluster(&input).unwrap();
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].should_not_skip);
        assert!(clusters[0].summary.is_none());
        assert_eq!(clusters[0].docs, input);
    }

    #[test]
    fn test_pruned_to_strongest_postings() {
        let input = postings(20);
        let clusters = clusterer(5, 0.0).cluster(&input).unwrap();
        assert_eq!(clusters.len(), 1);
        let docs: Vec<i32> = clusters[0].docs.iter().map(|d| d.doc).collect();
        assert_eq!(docs, vec![15, 16, 17, 18, 19]);
        // The caller's list is untouched.
        assert_eq!(input, postings(20));
    }
}
