//! Posting clustering.
//!
//! [`SeismicPostingClusterer`] prunes a term's postings to the strongest
//! documents and hands them to a [`ClusteringAlgorithm`], normally
//! [`RandomClustering`]. Summaries are built from member vectors looked up
//! through a [`SparseVectorReader`].

pub mod batch;
pub mod clusterer;
pub mod executor;
pub mod postings_processor;
pub mod random_clustering;

use std::sync::Arc;

use crate::error::Result;
use crate::sparse::cluster::{DocWeight, DocumentCluster};
use crate::sparse::vector::SparseVector;

pub use batch::BatchClusteringTask;
pub use clusterer::SeismicPostingClusterer;
pub use executor::{ClusteringExecutor, ClusteringExecutorConfig};
pub use random_clustering::RandomClustering;

/// Lookup of a document's sparse vector.
pub trait SparseVectorReader: Send + Sync {
    /// `None` when the document has no vector.
    fn read(&self, doc: i32) -> Result<Option<Arc<SparseVector>>>;
}

impl<F> SparseVectorReader for F
where
    F: Fn(i32) -> Result<Option<Arc<SparseVector>>> + Send + Sync,
{
    fn read(&self, doc: i32) -> Result<Option<Arc<SparseVector>>> {
        self(doc)
    }
}

/// Reader that knows no vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVectorReader;

impl SparseVectorReader for NoopVectorReader {
    fn read(&self, _doc: i32) -> Result<Option<Arc<SparseVector>>> {
        Ok(None)
    }
}

/// Groups a pruned, doc-ordered posting list into clusters.
pub trait ClusteringAlgorithm: Send + Sync {
    fn cluster(&self, postings: &[DocWeight]) -> Result<Vec<DocumentCluster>>;
}
