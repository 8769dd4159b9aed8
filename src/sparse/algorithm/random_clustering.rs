//! Clustering around randomly chosen centre documents.

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

use crate::error::Result;
use crate::sparse::algorithm::postings_processor::summarize;
use crate::sparse::algorithm::{ClusteringAlgorithm, SparseVectorReader};
use crate::sparse::cluster::{DocWeight, DocumentCluster};

pub struct RandomClustering {
    summary_prune_ratio: f32,
    cluster_ratio: f32,
    reader: Arc<dyn SparseVectorReader>,
    seed: Option<u64>,
}

impl fmt::Debug for RandomClustering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomClustering")
            .field("summary_prune_ratio", &self.summary_prune_ratio)
            .field("cluster_ratio", &self.cluster_ratio)
            .field("seed", &self.seed)
            .finish()
    }
}

impl RandomClustering {
    pub fn new(summary_prune_ratio: f32, cluster_ratio: f32, reader: Arc<dyn SparseVectorReader>) -> Self {
        RandomClustering {
            summary_prune_ratio,
            cluster_ratio,
            reader,
            seed: None,
        }
    }

    /// Fix the centre selection, for reproducible clusters.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

impl ClusteringAlgorithm for RandomClustering {
    fn cluster(&self, postings: &[DocWeight]) -> Result<Vec<DocumentCluster>> {
        if postings.is_empty() {
            return Ok(Vec::new());
        }
        if self.cluster_ratio == 0.0 {
            return Ok(vec![DocumentCluster::new(postings.to_vec(), None, true)]);
        }

        let num_clusters = ((postings.len() as f64 * self.cluster_ratio as f64).ceil() as usize)
            .clamp(1, postings.len());
        let mut rng = self.rng();
        let centres = index::sample(&mut rng, postings.len(), num_clusters)
            .into_iter()
            .map(|i| {
                Ok(self
                    .reader
                    .read(postings[i].doc)?
                    .map(|v| v.to_dense())
                    .unwrap_or_default())
            })
            .collect::<Result<Vec<Vec<u8>>>>()?;

        let mut members: Vec<Vec<DocWeight>> = vec![Vec::new(); num_clusters];
        for &posting in postings {
            let target = match self.reader.read(posting.doc)? {
                Some(vector) => {
                    let mut best = 0;
                    let mut best_score = 0u32;
                    for (i, centre) in centres.iter().enumerate() {
                        let score = vector.dot_product(centre);
                        if score > best_score {
                            best = i;
                            best_score = score;
                        }
                    }
                    best
                }
                None => 0,
            };
            members[target].push(posting);
        }

        let mut clusters = Vec::with_capacity(num_clusters);
        for mut docs in members.into_iter().filter(|m| !m.is_empty()) {
            docs.sort_by_key(|d| d.doc);
            let mut cluster = DocumentCluster::new(docs, None, false);
            summarize(&mut cluster, self.reader.as_ref(), self.summary_prune_ratio)?;
            clusters.push(cluster);
        }
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::algorithm::NoopVectorReader;
    use crate::sparse::vector::SparseVector;

    fn vectors() -> Arc<dyn SparseVectorReader> {
        // Docs 0..4 lean on token 1, docs 4..8 on token 2.
        let reader = |doc: i32| -> Result<Option<Arc<SparseVector>>> {
            let token = if doc < 4 { 1 } else { 2 };
            Ok(Some(Arc::new(SparseVector::new(vec![(token, 100), (3, 1)]))))
        };
        Arc::new(reader)
    }

    fn postings(n: i32) -> Vec<DocWeight> {
        (0..n).rev().map(|d| DocWeight::new(d, (d + 1) as u8)).collect()
    }

    #[test]
    fn test_zero_ratio_single_cluster() {
        let clustering = RandomClustering::new(0.4, 0.0, Arc::new(NoopVectorReader));
        let clusters = clustering.cluster(&postings(5)).unwrap();
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].should_not_skip);
        assert!(clusters[0].summary.is_none());
        assert_eq!(clusters[0].docs, postings(5));
    }

    #[test]
    fn test_every_posting_lands_in_one_cluster() {
        let clustering = RandomClustering::new(1.0, 0.5, vectors()).with_seed(42);
        let clusters = clustering.cluster(&postings(8)).unwrap();
        assert!(!clusters.is_empty() && clusters.len() <= 4);

        let mut all: Vec<DocWeight> = clusters.iter().flat_map(|c| c.docs.clone()).collect();
        all.sort_by_key(|d| d.doc);
        let mut expected = postings(8);
        expected.sort_by_key(|d| d.doc);
        assert_eq!(all, expected);

        for cluster in &clusters {
            assert!(!cluster.should_not_skip);
            assert!(cluster.docs.windows(2).all(|w| w[0].doc < w[1].doc));
            assert!(cluster.summary.is_some());
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = RandomClustering::new(0.4, 0.3, vectors()).with_seed(7);
        let b = RandomClustering::new(0.4, 0.3, vectors()).with_seed(7);
        assert_eq!(a.cluster(&postings(8)).unwrap(), b.cluster(&postings(8)).unwrap());
    }

    #[test]
    fn test_docs_without_vectors_join_first_cluster() {
        let clustering = RandomClustering::new(0.4, 0.5, Arc::new(NoopVectorReader)).with_seed(1);
        let clusters = clustering.cluster(&postings(4)).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 4);
        assert!(clusters[0].summary.is_none());
    }
}
