//! Hybrid multi-subquery retrieval.
//!
//! A hybrid query runs several independently scored sub-queries in one pass.
//! Every collector keeps a bounded top-N list per sub-query, and the lists are
//! packed into one flat "delimited stream" so the rest of the pipeline can move
//! them around as an ordinary top-docs result:
//!
//! ```text
//! START_STOP, DELIM, a1, a2, ..., DELIM, b1, ..., START_STOP
//! ```
//!
//! # Architecture
//!
//! - **score_doc**: `ScoreDoc`, `TopDocs`, `TotalHits` and sort/collapse values
//! - **format**: sentinel markers and stream assembly/parsing
//! - **sort**: field comparator chains
//! - **merge**: `ScoreDocsMerger` and `TopDocsMerger` for the reduce phase
//! - **collector**: per-segment collectors and the hits threshold checker
//! - **manager**: `HybridCollectorManager` (validation, collector creation, reduce)
//! - **rescore**: per-subquery rescoring hook
//! - **query_phase**: drives a manager over a set of segments

pub mod collector;
pub mod format;
pub mod manager;
pub mod merge;
pub mod query_phase;
pub mod rescore;
pub mod score_doc;
pub mod sort;
