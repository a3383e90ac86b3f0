//! Ranker / Paginator
//!
//! Deterministic ordering of scored candidates, the over-fetched page window, and the
//! page total computed independently of the window.

use std::cmp::Ordering;
use tracing::error;

use crate::db::{CandidateFilter, FeedStore};
use crate::metrics;
use crate::services::scoring::ScoredCandidate;

/// Total derived from the fetched window when neither count path succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountApprox {
    pub approximate: u64,
}

pub type TotalCount = Result<u64, CountApprox>;

/// Sort by score desc, then newer first, then (proximity ranking only) nearer first with
/// unlocated posts last, then id.
pub fn rank(candidates: &mut [ScoredCandidate], by_proximity: bool) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.item.posted_at.cmp(&a.item.posted_at))
            .then_with(|| {
                if by_proximity {
                    compare_distance(a.distance_km, b.distance_km)
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.item.id.cmp(&b.item.id))
    });
}

fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Slice `size` ranked items starting at `offset`
pub fn window<T>(ranked: Vec<T>, offset: usize, size: usize) -> Vec<T> {
    ranked.into_iter().skip(offset).take(size).collect()
}

/// Exact number of candidates matching `filter`. Falls back to the id-only path when the
/// count fails; `None` when both fail.
pub async fn exact_total(store: &dyn FeedStore, filter: &CandidateFilter) -> Option<u64> {
    match store.count_candidates(filter).await {
        Ok(total) => {
            metrics::record_total_source("count");
            return Some(total);
        }
        Err(e) => {
            error!(filter = filter.describe(), error = %e, "Candidate count failed, retrying via id scan");
        }
    }

    match store.candidate_ids(filter).await {
        Ok(ids) => {
            metrics::record_total_source("candidate_ids");
            Some(ids.len() as u64)
        }
        Err(e) => {
            error!(filter = filter.describe(), error = %e, "Candidate id scan failed, total will be approximated");
            None
        }
    }
}

pub fn resolve_total(exact: Option<u64>, offset: usize, window_len: usize) -> TotalCount {
    match exact {
        Some(total) => Ok(total),
        None => {
            metrics::record_total_source("approximate");
            Err(CountApprox {
                approximate: (offset + window_len) as u64,
            })
        }
    }
}
