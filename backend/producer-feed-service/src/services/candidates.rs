//! Candidate Selector
//!
//! Maps (mode, requester, viewing context) to a candidate predicate and the weight set used
//! to score it. Pure; no store access.

use tracing::{debug, warn};

use crate::config::{ScoringConfig, ScoringWeights};
use crate::db::CandidateFilter;
use crate::models::{AccountKind, AccountRef, FeedMode, GeoPoint};
use crate::services::signals::ViewingContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Followed-accounts mode with no follow list, an empty one, or one that failed to load
    NoFollowedAccounts,
}

impl EmptyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmptyReason::NoFollowedAccounts => "no_followed_accounts",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Pool {
        filter: CandidateFilter,
        weights: ScoringWeights,
        /// Set only in local-trends mode with a known requester location
        proximity_origin: Option<GeoPoint>,
    },
    /// The predicate cannot match anything; no store scan is issued
    Empty(EmptyReason),
}

pub fn select_candidates(
    mode: FeedMode,
    requester: &AccountRef,
    context: &ViewingContext,
    scoring: &ScoringConfig,
) -> Selection {
    let pool = |filter: CandidateFilter| Selection::Pool {
        filter,
        weights: scoring.weights_for(mode),
        proximity_origin: None,
    };

    match mode {
        FeedMode::OwnVenue => pool(CandidateFilter::AuthoredByVenue {
            venue_id: requester.id.clone(),
            include_automated: true,
        }),
        FeedMode::SocialMentions => pool(CandidateFilter::MentionsVenue {
            venue_id: requester.id.clone(),
            venue_name: context.display_name.clone(),
        }),
        FeedMode::FollowedAccounts => {
            if context.followed.is_empty() {
                debug!(requester = %requester.id, "No followed accounts, returning empty selection");
                return Selection::Empty(EmptyReason::NoFollowedAccounts);
            }
            pool(CandidateFilter::AuthoredByUsers {
                user_ids: context.followed.clone(),
            })
        }
        FeedMode::LocalTrends => match context.location {
            Some(origin) => Selection::Pool {
                filter: CandidateFilter::All,
                weights: scoring.local_trends,
                proximity_origin: Some(origin),
            },
            None => {
                warn!(
                    requester = %requester.id,
                    "Requester location unknown, local trends falls back to the default feed"
                );
                Selection::Pool {
                    filter: default_filter(requester),
                    weights: scoring.default,
                    proximity_origin: None,
                }
            }
        },
        FeedMode::Default => pool(default_filter(requester)),
    }
}

fn default_filter(requester: &AccountRef) -> CandidateFilter {
    match requester.kind {
        AccountKind::Venue(category) => CandidateFilter::VenueCategory(category),
        AccountKind::User => CandidateFilter::All,
    }
}
