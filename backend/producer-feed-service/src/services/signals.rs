//! Signal Collector
//!
//! Gathers the requester's viewing context: profile (location, tags, display name, and the
//! follow list when the mode needs it) and liked posts. The two lookups run concurrently.
//! A failed sub-lookup degrades to a neutral value and never fails the request; only a
//! successful lookup that finds no requester is an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::db::FeedStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{AccountProfile, AccountRef, FeedMode, GeoPoint};

#[derive(Debug, Clone, Default)]
pub struct ViewingContext {
    pub display_name: Option<String>,
    pub location: Option<GeoPoint>,
    /// Lower-cased profile tags
    pub tags: Vec<String>,
    pub liked: HashSet<String>,
    /// Followed account ids. Empty unless the mode is followed-accounts.
    pub followed: Vec<String>,
    /// Names of the signals that fell back to neutral values
    pub degraded: Vec<&'static str>,
}

impl ViewingContext {
    fn from_profile(profile: AccountProfile, mode: FeedMode) -> Self {
        let followed = match (mode, profile.follow_list) {
            (FeedMode::FollowedAccounts, Some(followed)) => followed,
            _ => Vec::new(),
        };
        Self {
            display_name: profile.display_name,
            location: profile.location,
            tags: profile.tags,
            followed,
            ..Self::default()
        }
    }

    fn degrade(&mut self, signal: &'static str) {
        metrics::record_degraded_signal(signal);
        self.degraded.push(signal);
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

pub struct SignalCollector {
    store: Arc<dyn FeedStore>,
}

impl SignalCollector {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    pub async fn collect(&self, requester: &AccountRef, mode: FeedMode) -> Result<ViewingContext> {
        let start = Instant::now();

        let (profile, liked) = tokio::join!(
            self.store.find_profile(requester),
            self.store.liked_item_ids(requester)
        );

        let mut context = match profile {
            Ok(Some(profile)) => {
                if mode == FeedMode::FollowedAccounts && profile.follow_list.is_none() {
                    debug!(requester = %requester.id, "No follow list on file");
                }
                ViewingContext::from_profile(profile, mode)
            }
            Ok(None) => {
                return Err(AppError::NotFound(format!(
                    "Producer {} not found in {} partition",
                    requester.id,
                    requester.kind.as_str()
                )));
            }
            Err(e) => {
                warn!(
                    requester = %requester.id,
                    error = %e,
                    "Profile lookup failed, continuing without location, tags, name or follow list"
                );
                let mut context = ViewingContext::default();
                context.degrade("profile");
                if mode == FeedMode::FollowedAccounts {
                    context.degrade("follow_list");
                }
                context
            }
        };

        match liked {
            Ok(liked) => context.liked = liked,
            Err(e) => {
                warn!(requester = %requester.id, error = %e, "Liked-set lookup failed, interaction signal disabled");
                context.degrade("liked");
            }
        }

        metrics::observe_stage("signals", start.elapsed());
        debug!(
            requester = %requester.id,
            has_location = context.location.is_some(),
            tags = context.tags.len(),
            liked = context.liked.len(),
            followed = context.followed.len(),
            degraded = ?context.degraded,
            "Collected viewing context"
        );

        Ok(context)
    }
}
