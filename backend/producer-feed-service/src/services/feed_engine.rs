//! Producer feed engine
//!
//! signals -> candidate selection -> (capped scan ∥ exact count) -> scoring -> ranking
//! -> window -> diversification -> enrichment, all under one request deadline.
//!
//! The scan loads at most `max_candidates` of the newest matching posts, and the reported
//! total is capped the same way so `hasMore` never points past what can be ranked.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::config::{FeedConfig, ScoringConfig};
use crate::db::{scan_order, CandidateFilter, FeedStore};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{AccountRef, ContentItem, FeedItem, FeedPage, FeedRequest};
use crate::services::candidates::{select_candidates, Selection};
use crate::services::diversity::DiversityLayer;
use crate::services::enrichment::Enricher;
use crate::services::ranking::{exact_total, rank, resolve_total, window, TotalCount};
use crate::services::scoring::score_candidates;
use crate::services::signals::SignalCollector;

pub struct ProducerFeedEngine {
    store: Arc<dyn FeedStore>,
    signals: SignalCollector,
    diversity: DiversityLayer,
    enricher: Enricher,
    feed: FeedConfig,
    scoring: ScoringConfig,
}

impl ProducerFeedEngine {
    pub fn new(store: Arc<dyn FeedStore>, feed: FeedConfig, scoring: ScoringConfig) -> Self {
        Self {
            signals: SignalCollector::new(Arc::clone(&store)),
            diversity: DiversityLayer::new(feed.max_consecutive_per_author),
            enricher: Enricher::new(
                Arc::clone(&store),
                feed.enrichment_concurrency,
                feed.default_venue_partition,
            ),
            store,
            feed,
            scoring,
        }
    }

    pub fn feed_config(&self) -> &FeedConfig {
        &self.feed
    }

    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    /// Ranked, diversified and enriched page for the requester
    pub async fn feed(&self, request: FeedRequest) -> Result<FeedPage> {
        let mode = request.mode.as_str();
        self.with_deadline(mode, self.build_feed(&request)).await
    }

    /// The venue's own posts, newest first. No scoring and no diversification.
    pub async fn venue_posts(&self, venue: AccountRef, page: u32, limit: u32) -> Result<FeedPage> {
        self.with_deadline("venue_posts", self.build_venue_posts(&venue, page, limit))
            .await
    }

    async fn with_deadline<F>(&self, label: &str, work: F) -> Result<FeedPage>
    where
        F: Future<Output = Result<FeedPage>>,
    {
        let start = Instant::now();
        let outcome = match timeout(self.feed.request_timeout(), work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    mode = label,
                    timeout_ms = self.feed.request_timeout_ms,
                    "Feed request exceeded its deadline, in-flight lookups dropped"
                );
                Err(AppError::Timeout(format!(
                    "Feed not assembled within {}ms",
                    self.feed.request_timeout_ms
                )))
            }
        };

        let label_outcome = match &outcome {
            Ok(page) if page.items.is_empty() => "empty",
            Ok(_) => "ok",
            Err(AppError::NotFound(_)) => "not_found",
            Err(AppError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::record_feed_request(label, label_outcome);
        metrics::observe_stage("total", start.elapsed());
        outcome
    }

    #[instrument(skip(self, request), fields(requester = %request.requester.id, mode = request.mode.as_str(), page = request.page))]
    async fn build_feed(&self, request: &FeedRequest) -> Result<FeedPage> {
        let context = self
            .signals
            .collect(&request.requester, request.mode)
            .await?;

        let (filter, weights, proximity_origin) =
            match select_candidates(request.mode, &request.requester, &context, &self.scoring) {
                Selection::Pool {
                    filter,
                    weights,
                    proximity_origin,
                } => (filter, weights, proximity_origin),
                Selection::Empty(reason) => {
                    info!(reason = reason.as_str(), "Candidate predicate cannot match, empty page");
                    return Ok(FeedPage::empty(request.page));
                }
            };

        let cap = self.feed.max_candidates;
        let (items, exact) = self.scan_with_total(&filter, cap).await?;
        let exact = exact.map(|total| total.min(cap as u64));

        let stage = Instant::now();
        let candidates = items.len();
        let mut scored = score_candidates(items, &context, &weights, proximity_origin, Utc::now());
        rank(&mut scored, proximity_origin.is_some());

        let offset = request.offset();
        let ranked_window = window(scored, offset, self.feed.window_size(request.limit));
        let total = resolve_total(exact, offset, ranked_window.len());
        let selected = self.diversity.rerank(ranked_window, request.limit as usize);
        metrics::observe_stage("ranking", stage.elapsed());

        info!(
            candidates,
            selected = selected.len(),
            degraded = context.is_degraded(),
            "Ranked producer feed"
        );

        let labels: Vec<_> = selected
            .iter()
            .map(|candidate| filter.interaction_type(&candidate.item))
            .collect();

        let mut items = self
            .enricher
            .enrich(
                selected
                    .into_iter()
                    .map(|candidate| (candidate.item, Some(candidate.score)))
                    .collect(),
            )
            .await;
        for (item, label) in items.iter_mut().zip(labels) {
            item.interaction_type = label;
        }

        Ok(page_from(items, request.page, request.limit, total))
    }

    #[instrument(skip(self, venue), fields(venue = %venue.id))]
    async fn build_venue_posts(&self, venue: &AccountRef, page: u32, limit: u32) -> Result<FeedPage> {
        match self.store.find_profile(venue).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(AppError::NotFound(format!(
                    "Producer {} not found in {} partition",
                    venue.id,
                    venue.kind.as_str()
                )));
            }
            Err(e) => {
                warn!(error = %e, "Venue lookup failed, listing posts without existence check");
                metrics::record_degraded_signal("profile");
            }
        }

        let filter = CandidateFilter::AuthoredByVenue {
            venue_id: venue.id.clone(),
            include_automated: false,
        };
        let offset = (page.max(1) as usize - 1) * limit as usize;
        let (mut items, exact) = self.scan_with_total(&filter, offset + limit as usize).await?;
        items.sort_by(scan_order);

        let listed: Vec<ContentItem> = window(items, offset, limit as usize);
        let total = resolve_total(exact, offset, listed.len());

        let items = self
            .enricher
            .enrich(listed.into_iter().map(|item| (item, None)).collect())
            .await;

        Ok(page_from(items, page, limit, total))
    }

    /// Capped candidate scan and exact count, concurrently. A failed scan fails the request.
    async fn scan_with_total(
        &self,
        filter: &CandidateFilter,
        limit: usize,
    ) -> Result<(Vec<ContentItem>, Option<u64>)> {
        let stage = Instant::now();
        let (scan, exact) = tokio::join!(
            self.store.scan_candidates(filter, limit),
            exact_total(self.store.as_ref(), filter)
        );
        metrics::observe_stage("candidates", stage.elapsed());

        let items = scan.map_err(|e| {
            error!(filter = filter.describe(), error = %e, "Candidate scan failed");
            AppError::from(e)
        })?;
        Ok((items, exact))
    }
}

fn page_from(items: Vec<FeedItem>, page: u32, limit: u32, total: TotalCount) -> FeedPage {
    match total {
        Ok(total) => FeedPage::new(items, page, limit, total, true),
        Err(approx) => FeedPage::new(items, page, limit, approx.approximate, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockFeedStore, StoreError};
    use crate::models::{AccountProfile, Author, FeedMode, InteractionType, VenueCategory};
    use chrono::Duration;
    use std::collections::HashSet;

    fn post(id: &str, author: Author, hours_ago: i64, automated: bool) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            author,
            content: String::new(),
            media: vec![],
            tags: vec![],
            posted_at: Utc::now() - Duration::hours(hours_ago),
            likes_count: 0,
            comments_count: 0,
            shares_count: 0,
            location: None,
            target_venue_id: None,
            mentioned_venue_ids: vec![],
            is_automated: automated,
        }
    }

    fn venue_author() -> Author {
        Author::Venue {
            id: "v1".into(),
            category: Some(VenueCategory::Restaurant),
        }
    }

    fn venue_profile() -> AccountProfile {
        AccountProfile {
            id: "v1".into(),
            display_name: Some("Le Petit Zinc".into()),
            ..AccountProfile::default()
        }
    }

    fn request(mode: FeedMode) -> FeedRequest {
        FeedRequest {
            requester: AccountRef::venue("v1", VenueCategory::Restaurant),
            mode,
            page: 1,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn test_followers_without_follow_list_skips_scan() {
        let mut store = MockFeedStore::new();
        store
            .expect_find_profile()
            .returning(|_| Ok(Some(venue_profile())));
        store
            .expect_liked_item_ids()
            .returning(|_| Ok(HashSet::new()));
        store.expect_scan_candidates().never();
        store.expect_count_candidates().never();

        let engine = ProducerFeedEngine::new(Arc::new(store), FeedConfig::default(), ScoringConfig::default());
        let page = engine.feed(request(FeedMode::FollowedAccounts)).await.unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_scan_unavailable_is_service_unavailable() {
        let mut store = MockFeedStore::new();
        store
            .expect_find_profile()
            .returning(|_| Ok(Some(venue_profile())));
        store
            .expect_liked_item_ids()
            .returning(|_| Ok(HashSet::new()));
        store
            .expect_scan_candidates()
            .returning(|_, _| Err(StoreError::Unavailable("pool timed out".into())));
        store.expect_count_candidates().returning(|_| Ok(3));

        let engine = ProducerFeedEngine::new(Arc::new(store), FeedConfig::default(), ScoringConfig::default());
        let err = engine.feed(request(FeedMode::Default)).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_venue_posts_newest_first_without_scores() {
        let mut store = MockFeedStore::new();
        store
            .expect_find_profile()
            .returning(|_| Ok(Some(venue_profile())));
        store.expect_scan_candidates().returning(|filter, limit| {
            assert_eq!(limit, 2);
            assert_eq!(
                filter,
                &CandidateFilter::AuthoredByVenue {
                    venue_id: "v1".into(),
                    include_automated: false,
                }
            );
            Ok(vec![
                post("old", venue_author(), 48, false),
                post("new", venue_author(), 1, false),
                post("mid", venue_author(), 10, false),
            ])
        });
        store.expect_count_candidates().returning(|_| Ok(3));

        let engine = ProducerFeedEngine::new(Arc::new(store), FeedConfig::default(), ScoringConfig::default());
        let page = engine
            .venue_posts(AccountRef::venue("v1", VenueCategory::Restaurant), 1, 2)
            .await
            .unwrap();

        let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert!(page.items.iter().all(|i| i.score.is_none()));
        assert_eq!(page.total, 3);
        assert!(page.has_more);
        assert_eq!(page.items[0].author_name, "Le Petit Zinc");
    }

    #[tokio::test]
    async fn test_ranked_scan_is_capped_and_total_follows_the_cap() {
        let mut store = MockFeedStore::new();
        store
            .expect_find_profile()
            .returning(|_| Ok(Some(venue_profile())));
        store
            .expect_liked_item_ids()
            .returning(|_| Ok(HashSet::new()));
        store.expect_scan_candidates().returning(|_, limit| {
            assert_eq!(limit, 100);
            Ok((0..100)
                .map(|i| post(&format!("p{:03}", i), venue_author(), i, false))
                .collect())
        });
        store.expect_count_candidates().returning(|_| Ok(5_000));

        let feed = FeedConfig {
            max_candidates: 100,
            max_consecutive_per_author: 10,
            ..FeedConfig::default()
        };
        let engine = ProducerFeedEngine::new(Arc::new(store), feed, ScoringConfig::default());

        let last = engine
            .feed(FeedRequest {
                page: 10,
                ..request(FeedMode::Default)
            })
            .await
            .unwrap();
        assert_eq!(last.total, 100);
        assert_eq!(last.total_pages, 10);
        assert!(!last.has_more);
        assert!(last.total_is_exact);
    }

    #[tokio::test]
    async fn test_interactions_items_carry_their_match_kind() {
        let mut store = MockFeedStore::new();
        store
            .expect_find_profile()
            .returning(|_| Ok(Some(venue_profile())));
        store
            .expect_liked_item_ids()
            .returning(|_| Ok(HashSet::new()));
        store.expect_scan_candidates().returning(|_, _| {
            let mut named = post("named", Author::User("u1".into()), 1, false);
            named.content = "Merci Le Petit Zinc !".into();
            let mut targeted = post("targeted", Author::User("u2".into()), 2, false);
            targeted.target_venue_id = Some("v1".into());
            let mut tagged = post("tagged", Author::User("u3".into()), 3, false);
            tagged.mentioned_venue_ids = vec!["v1".into()];
            Ok(vec![named, targeted, tagged])
        });
        store.expect_count_candidates().returning(|_| Ok(3));

        let engine = ProducerFeedEngine::new(Arc::new(store), FeedConfig::default(), ScoringConfig::default());
        let page = engine.feed(request(FeedMode::SocialMentions)).await.unwrap();

        let labels: Vec<(&str, Option<InteractionType>)> = page
            .items
            .iter()
            .map(|i| (i.id.as_str(), i.interaction_type))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("named", Some(InteractionType::Mention)),
                ("targeted", Some(InteractionType::Target)),
                ("tagged", Some(InteractionType::Tag)),
            ]
        );
    }

    #[tokio::test]
    async fn test_other_modes_have_no_interaction_type() {
        let mut store = MockFeedStore::new();
        store
            .expect_find_profile()
            .returning(|_| Ok(Some(venue_profile())));
        store
            .expect_liked_item_ids()
            .returning(|_| Ok(HashSet::new()));
        store
            .expect_scan_candidates()
            .returning(|_, _| Ok(vec![post("own", venue_author(), 1, false)]));
        store.expect_count_candidates().returning(|_| Ok(1));

        let engine = ProducerFeedEngine::new(Arc::new(store), FeedConfig::default(), ScoringConfig::default());
        let page = engine.feed(request(FeedMode::OwnVenue)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].interaction_type.is_none());
    }

    #[tokio::test]
    async fn test_venue_posts_unknown_venue_is_not_found() {
        let mut store = MockFeedStore::new();
        store.expect_find_profile().returning(|_| Ok(None));
        store.expect_scan_candidates().never();

        let engine = ProducerFeedEngine::new(Arc::new(store), FeedConfig::default(), ScoringConfig::default());
        let err = engine
            .venue_posts(AccountRef::venue("nope", VenueCategory::Restaurant), 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
