//! Scoring Engine
//!
//! Each candidate gets a feature vector and one scalar score:
//! - Recency: 1 / (1 + age_days), age clamped at 0
//! - Popularity: raw like count
//! - Interaction: 1 if the requester liked the post
//! - Relevance: number of post tags shared with the requester profile
//! - Proximity: 1 / (1 + distance_km), local trends with a known origin only
//!
//! Score = Σ weight × feature. Pure function of (items, context, weights, now).

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::config::ScoringWeights;
use crate::models::{ContentItem, GeoPoint};
use crate::services::signals::ViewingContext;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector {
    pub recency: f64,
    pub popularity: f64,
    pub interaction: f64,
    pub relevance: f64,
    pub proximity: Option<f64>,
}

impl FeatureVector {
    pub fn combine(&self, weights: &ScoringWeights) -> f64 {
        weights.recency * self.recency
            + weights.popularity * self.popularity
            + weights.interaction * self.interaction
            + weights.relevance * self.relevance
            + weights.proximity * self.proximity.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub item: ContentItem,
    pub features: FeatureVector,
    pub score: f64,
    /// Distance from the proximity origin, when both ends are located
    pub distance_km: Option<f64>,
}

/// Recency feature in (0, 1]. Future timestamps count as brand new.
pub fn recency(posted_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = ((now - posted_at).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY).max(0.0);
    1.0 / (1.0 + age_days)
}

pub fn proximity(distance_km: f64) -> f64 {
    1.0 / (1.0 + distance_km.max(0.0))
}

pub fn score_candidates(
    items: Vec<ContentItem>,
    context: &ViewingContext,
    weights: &ScoringWeights,
    proximity_origin: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let profile_tags: HashSet<&str> = context.tags.iter().map(String::as_str).collect();

    items
        .into_iter()
        .map(|item| {
            let distance_km = match (proximity_origin, item.location) {
                (Some(origin), Some(location)) => Some(origin.distance_km(&location)),
                _ => None,
            };

            let features = FeatureVector {
                recency: recency(item.posted_at, now),
                popularity: item.likes_count as f64,
                interaction: if context.liked.contains(&item.id) { 1.0 } else { 0.0 },
                relevance: tag_overlap(&item.tags, &profile_tags) as f64,
                proximity: distance_km.map(proximity),
            };
            let score = features.combine(weights);

            ScoredCandidate {
                item,
                features,
                score,
                distance_km,
            }
        })
        .collect()
}

fn tag_overlap(item_tags: &[String], profile_tags: &HashSet<&str>) -> usize {
    if item_tags.is_empty() || profile_tags.is_empty() {
        return 0;
    }
    item_tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .collect::<HashSet<_>>()
        .iter()
        .filter(|tag| profile_tags.contains(tag.as_str()))
        .count()
}
