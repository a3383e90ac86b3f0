//! Feed pipeline stages.
//!
//! - signals: requester viewing context (degrades, never fails on lookup errors)
//! - candidates: mode -> predicate and weight set
//! - scoring / ranking: pure feature scoring, deterministic order, page window and total
//! - diversity: consecutive-author cap over the ranked window
//! - enrichment: author metadata with bounded concurrency
//! - feed_engine: orchestration under the request deadline

pub mod candidates;
pub mod diversity;
pub mod enrichment;
pub mod feed_engine;
pub mod ranking;
pub mod scoring;
pub mod signals;

pub use feed_engine::ProducerFeedEngine;
