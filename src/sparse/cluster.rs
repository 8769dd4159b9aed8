//! Posting clusters.

use serde::{Deserialize, Serialize};

use crate::sparse::vector::SparseVector;

/// A posting: document and quantized weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocWeight {
    pub doc: i32,
    pub weight: u8,
}

impl DocWeight {
    pub fn new(doc: i32, weight: u8) -> Self {
        DocWeight { doc, weight }
    }
}

/// Documents of one cluster, ordered by doc id, with an optional summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCluster {
    pub docs: Vec<DocWeight>,
    /// Pruned per-token maximum of the member vectors.
    pub summary: Option<SparseVector>,
    /// Always scan this cluster, whatever its summary scores.
    pub should_not_skip: bool,
}

impl DocumentCluster {
    pub fn new(docs: Vec<DocWeight>, summary: Option<SparseVector>, should_not_skip: bool) -> Self {
        DocumentCluster {
            docs,
            summary,
            should_not_skip,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.docs.capacity() * std::mem::size_of::<DocWeight>()
            + self.summary.as_ref().map_or(0, SparseVector::ram_bytes_used)
    }
}

/// Every cluster of one term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingClusters {
    clusters: Vec<DocumentCluster>,
}

impl PostingClusters {
    pub fn new(clusters: Vec<DocumentCluster>) -> Self {
        PostingClusters { clusters }
    }

    pub fn clusters(&self) -> &[DocumentCluster] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<DocumentCluster> {
        self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Postings of all clusters, cluster by cluster.
    pub fn doc_weights(&self) -> impl Iterator<Item = DocWeight> + '_ {
        self.clusters.iter().flat_map(|c| c.docs.iter().copied())
    }

    pub fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.clusters.iter().map(DocumentCluster::ram_bytes_used).sum::<usize>()
    }
}
