//! Clustered sparse-vector postings (SEISMIC).
//!
//! Index time: every term's postings are pruned to the strongest documents,
//! grouped into clusters around random centres and written with a summary
//! vector per cluster. A per-segment forward index (doc id -> sparse vector)
//! feeds the summaries. Both structures are also kept in an explicitly owned,
//! memory-bounded [`cache::SparseCacheService`] that readers consult before
//! going to disk.

pub mod algorithm;
pub mod cache;
pub mod cluster;
pub mod codec;
pub mod params;
pub mod quantization;
pub mod value_encoder;
pub mod vector;
