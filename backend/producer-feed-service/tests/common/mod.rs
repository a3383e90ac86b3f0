//! In-memory `FeedStore` used by the integration tests.
//!
//! Candidate queries evaluate `CandidateFilter::matches` and return rows in `scan_order`, so
//! the fake selects exactly what the Postgres queries select. Individual operations can be
//! switched to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use producer_feed_service::config::{FeedConfig, ScoringConfig};
use producer_feed_service::db::{scan_order, CandidateFilter, FeedStore, StoreError};
use producer_feed_service::models::{
    AccountProfile, AccountRef, Author, ContentItem, GeoPoint, VenueCategory,
};

#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub requester_profile: bool,
    pub liked: bool,
    pub scan: Option<StoreErrorKind>,
    pub count: bool,
    pub candidate_ids: bool,
    pub ping: bool,
    /// Author lookups for these ids fail
    pub author_ids: HashSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum StoreErrorKind {
    Unavailable,
    Query,
}

#[derive(Default)]
pub struct InMemoryStore {
    pub profiles: HashMap<AccountRef, AccountProfile>,
    pub posts: Vec<ContentItem>,
    /// Keyed by (role, account id)
    pub likes: HashMap<(&'static str, String), HashSet<String>>,
    pub failures: Failures,
    /// Requester id whose profile lookup is subject to `failures.requester_profile`
    pub requester_id: Option<String>,
    pub profile_delay: Option<StdDuration>,
    pub profile_lookups: AtomicUsize,
    pub scans: AtomicUsize,
    pub last_scan_limit: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, account: AccountRef, profile: AccountProfile) -> Self {
        self.profiles.insert(account, profile);
        self
    }

    pub fn with_posts(mut self, posts: Vec<ContentItem>) -> Self {
        self.posts.extend(posts);
        self
    }

    pub fn with_likes(mut self, account: &AccountRef, post_ids: &[&str]) -> Self {
        self.likes
            .entry((account.kind.role(), account.id.clone()))
            .or_default()
            .extend(post_ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn with_failures(mut self, failures: Failures) -> Self {
        self.failures = failures;
        self
    }

    pub fn failing_requester(mut self, requester_id: &str) -> Self {
        self.requester_id = Some(requester_id.to_string());
        self.failures.requester_profile = true;
        self
    }

    pub fn with_profile_delay(mut self, delay: StdDuration) -> Self {
        self.profile_delay = Some(delay);
        self
    }

    fn error(kind: StoreErrorKind, what: &str) -> StoreError {
        match kind {
            StoreErrorKind::Unavailable => StoreError::Unavailable(format!("{} unavailable", what)),
            StoreErrorKind::Query => StoreError::Query(format!("{} failed", what)),
        }
    }
}

#[async_trait]
impl FeedStore for InMemoryStore {
    async fn find_profile(&self, account: &AccountRef) -> Result<Option<AccountProfile>, StoreError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.profile_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.requester_profile && self.requester_id.as_deref() == Some(account.id.as_str()) {
            return Err(StoreError::Query("profile lookup failed".into()));
        }
        if self.failures.author_ids.contains(&account.id) {
            return Err(StoreError::Unavailable("author lookup failed".into()));
        }
        Ok(self.profiles.get(account).cloned())
    }

    async fn liked_item_ids(&self, account: &AccountRef) -> Result<HashSet<String>, StoreError> {
        if self.failures.liked {
            return Err(StoreError::Query("liked lookup failed".into()));
        }
        Ok(self
            .likes
            .get(&(account.kind.role(), account.id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn scan_candidates(
        &self,
        filter: &CandidateFilter,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.last_scan_limit.store(limit, Ordering::SeqCst);
        if let Some(kind) = self.failures.scan {
            return Err(Self::error(kind, "scan"));
        }
        let mut matching: Vec<ContentItem> = self
            .posts
            .iter()
            .filter(|post| filter.matches(post))
            .cloned()
            .collect();
        matching.sort_by(scan_order);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn count_candidates(&self, filter: &CandidateFilter) -> Result<u64, StoreError> {
        if self.failures.count {
            return Err(StoreError::Query("count failed".into()));
        }
        Ok(self.posts.iter().filter(|post| filter.matches(post)).count() as u64)
    }

    async fn candidate_ids(&self, filter: &CandidateFilter) -> Result<Vec<String>, StoreError> {
        if self.failures.candidate_ids {
            return Err(StoreError::Query("id scan failed".into()));
        }
        Ok(self
            .posts
            .iter()
            .filter(|post| filter.matches(post))
            .map(|post| post.id.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.failures.ping {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

pub fn restaurant(id: &str) -> AccountRef {
    AccountRef::venue(id, VenueCategory::Restaurant)
}

pub fn venue_profile(id: &str, name: &str) -> AccountProfile {
    AccountProfile {
        id: id.to_string(),
        display_name: Some(name.to_string()),
        avatar: Some(format!("https://cdn.choice.app/{}.jpg", id)),
        ..AccountProfile::default()
    }
}

pub fn user_profile(id: &str, name: &str) -> AccountProfile {
    AccountProfile {
        id: id.to_string(),
        display_name: Some(name.to_string()),
        ..AccountProfile::default()
    }
}

pub fn venue_author(id: &str) -> Author {
    Author::Venue {
        id: id.to_string(),
        category: Some(VenueCategory::Restaurant),
    }
}

pub fn user_author(id: &str) -> Author {
    Author::User(id.to_string())
}

pub fn post(id: &str, author: Author, hours_ago: i64, likes: u64) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        author,
        content: format!("post {}", id),
        media: vec![],
        tags: vec![],
        posted_at: Utc::now() - Duration::hours(hours_ago),
        likes_count: likes,
        comments_count: 0,
        shares_count: 0,
        location: None,
        target_venue_id: None,
        mentioned_venue_ids: vec![],
        is_automated: false,
    }
}

pub fn located(mut item: ContentItem, latitude: f64, longitude: f64) -> ContentItem {
    item.location = GeoPoint::new(latitude, longitude);
    item
}

pub fn feed_config() -> FeedConfig {
    FeedConfig::default()
}

pub fn scoring_config() -> ScoringConfig {
    ScoringConfig::default()
}
