//! # Iris Neural
//!
//! Hybrid multi-subquery retrieval and a clustered sparse-vector posting codec
//! for the Iris search library.
//!
//! ## Features
//!
//! - Per-subquery top document collection packed into one delimited stream
//! - Reduce-phase merging of partial results across concurrent segment slices
//! - Field sort, `search_after` paging and collapsing collectors
//! - SEISMIC-style clustered postings with summary vectors
//! - Cache-gated readers backed by an explicit, memory-bounded cache service
//! - Pluggable storage backends
pub mod error;
pub mod hybrid;
pub mod sparse;
pub mod storage;
mod util;

// Re-exports for the public API
pub use error::{ErrorCategory, IrisError, Result};
pub use hybrid::collector::{CollectorReusePolicy, HybridSearchCollector};
pub use hybrid::manager::{HybridCollectorManager, HybridSearchContext, QuerySearchResult};
pub use hybrid::merge::{ScoreDocsMerger, TopDocsMerger};
pub use hybrid::query_phase::HybridQueryPhase;
pub use hybrid::score_doc::{ScoreDoc, TopDocs, TopDocsAndMaxScore, TotalHits, TotalHitsRelation};
pub use sparse::cache::{CacheKey, SparseCacheConfig, SparseCacheService};
pub use sparse::codec::SparseCodec;
pub use sparse::params::SeismicParams;
pub use storage::{Storage, StorageConfig, StorageFactory};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
