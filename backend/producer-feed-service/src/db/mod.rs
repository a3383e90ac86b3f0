//! Backing store seam.
//!
//! The feed engine only needs point lookups, capped filtered scans, counts and the liked set.
//! Follow lists come from the profile document itself.
//! `FeedStore` captures exactly that; `PgFeedStore` is the production implementation.

mod pg_store;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{
    AccountProfile, AccountRef, Author, ContentItem, InteractionType, VenueCategory,
};

pub use pg_store::PgFeedStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached at all
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Predicate defining a candidate pool over the post collection
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateFilter {
    /// No restriction
    All,
    /// Posts written by one venue
    AuthoredByVenue {
        venue_id: String,
        include_automated: bool,
    },
    /// End-user posts that target, tag or name a venue
    MentionsVenue {
        venue_id: String,
        venue_name: Option<String>,
    },
    /// End-user posts by any of the given accounts
    AuthoredByUsers { user_ids: Vec<String> },
    /// Posts written by any venue of a category
    VenueCategory(VenueCategory),
}

impl CandidateFilter {
    /// In-process evaluation of the predicate. Store implementations must select exactly
    /// the items for which this returns true.
    pub fn matches(&self, item: &ContentItem) -> bool {
        match self {
            CandidateFilter::All => true,
            CandidateFilter::AuthoredByVenue {
                venue_id,
                include_automated,
            } => {
                matches!(&item.author, Author::Venue { id, .. } if id == venue_id)
                    && (*include_automated || !item.is_automated)
            }
            CandidateFilter::MentionsVenue { .. } => {
                item.author.is_user() && self.interaction_type(item).is_some()
            }
            CandidateFilter::AuthoredByUsers { user_ids } => {
                matches!(&item.author, Author::User(id) if user_ids.contains(id))
            }
            CandidateFilter::VenueCategory(category) => matches!(
                &item.author,
                Author::Venue { category: Some(c), .. } if c == category
            ),
        }
    }

    /// Which clause of a `MentionsVenue` filter the item satisfies. A name match wins over
    /// a target match, which wins over a tag. `None` for every other filter.
    pub fn interaction_type(&self, item: &ContentItem) -> Option<InteractionType> {
        let CandidateFilter::MentionsVenue {
            venue_id,
            venue_name,
        } = self
        else {
            return None;
        };

        let named = venue_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| item.content.to_lowercase().contains(&name.to_lowercase()))
            .unwrap_or(false);

        if named {
            Some(InteractionType::Mention)
        } else if item.target_venue_id.as_deref() == Some(venue_id.as_str()) {
            Some(InteractionType::Target)
        } else if item.mentioned_venue_ids.iter().any(|id| id == venue_id) {
            Some(InteractionType::Tag)
        } else {
            None
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CandidateFilter::All => "all",
            CandidateFilter::AuthoredByVenue { .. } => "authored_by_venue",
            CandidateFilter::MentionsVenue { .. } => "mentions_venue",
            CandidateFilter::AuthoredByUsers { .. } => "authored_by_users",
            CandidateFilter::VenueCategory(_) => "venue_category",
        }
    }
}

/// Order in which stores return a capped scan: newest first, then id
pub fn scan_order(a: &ContentItem, b: &ContentItem) -> Ordering {
    b.posted_at.cmp(&a.posted_at).then_with(|| a.id.cmp(&b.id))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Point lookup of an account document in its partition
    async fn find_profile(&self, account: &AccountRef) -> Result<Option<AccountProfile>, StoreError>;

    /// Ids of every post the account has liked. Likes are keyed by role and id.
    async fn liked_item_ids(&self, account: &AccountRef) -> Result<HashSet<String>, StoreError>;

    /// At most `limit` posts matching the filter, in `scan_order`, with like/comment counts
    /// derived at read time
    async fn scan_candidates(
        &self,
        filter: &CandidateFilter,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError>;

    /// Exact number of posts matching the filter
    async fn count_candidates(&self, filter: &CandidateFilter) -> Result<u64, StoreError>;

    /// Ids of posts matching the filter, without counters or joins
    async fn candidate_ids(&self, filter: &CandidateFilter) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
