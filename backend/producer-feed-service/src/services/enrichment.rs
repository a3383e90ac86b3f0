//! Enricher
//!
//! Resolves author display metadata for a finished page. One lookup per distinct author,
//! run with bounded concurrency. Items are never dropped: a failed or missing lookup
//! renders placeholder metadata instead.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::db::FeedStore;
use crate::metrics;
use crate::models::{AccountKind, AccountProfile, AccountRef, Author, ContentItem, FeedItem, VenueCategory};

const USER_PLACEHOLDER_NAME: &str = "Utilisateur";
const VENUE_PLACEHOLDER_NAME: &str = "Établissement";
const ANONYMOUS_NAME: &str = "Anonyme";
const UNKNOWN_CATEGORY: &str = "unknown";
const ANONYMOUS_CATEGORY: &str = "anonymous";

/// Outcome of one author lookup
enum Resolved {
    Found(AccountProfile),
    Missing,
    Failed,
}

pub struct Enricher {
    store: Arc<dyn FeedStore>,
    concurrency: usize,
    default_venue_partition: VenueCategory,
}

impl Enricher {
    pub fn new(store: Arc<dyn FeedStore>, concurrency: usize, default_venue_partition: VenueCategory) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            default_venue_partition,
        }
    }

    /// Partition holding the author's account; `None` for anonymous posts
    fn author_account(&self, author: &Author) -> Option<AccountRef> {
        match author {
            Author::User(id) => Some(AccountRef::user(id.clone())),
            Author::Venue {
                id,
                category: Some(category),
            } => Some(AccountRef::venue(id.clone(), *category)),
            Author::Venue { id, category: None } => {
                warn!(
                    author = %id,
                    partition = %self.default_venue_partition,
                    "Venue author without category, resolving in default partition"
                );
                Some(AccountRef::venue(id.clone(), self.default_venue_partition))
            }
            Author::Anonymous => None,
        }
    }

    /// Attach author metadata. Output order and length match the input.
    pub async fn enrich(&self, items: Vec<(ContentItem, Option<f64>)>) -> Vec<FeedItem> {
        let start = Instant::now();

        let accounts: Vec<Option<AccountRef>> = items
            .iter()
            .map(|(item, _)| self.author_account(&item.author))
            .collect();

        let distinct: HashSet<AccountRef> = accounts.iter().flatten().cloned().collect();
        let lookups = distinct.len();

        let resolved: HashMap<AccountRef, Resolved> = stream::iter(distinct)
            .map(|account| {
                let store = Arc::clone(&self.store);
                async move {
                    let outcome = match store.find_profile(&account).await {
                        Ok(Some(profile)) => Resolved::Found(profile),
                        Ok(None) => Resolved::Missing,
                        Err(e) => {
                            warn!(author = %account.id, error = %e, "Author lookup failed, using placeholder");
                            Resolved::Failed
                        }
                    };
                    (account, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let missing = resolved.values().filter(|r| matches!(r, Resolved::Missing)).count();
        let failed = resolved.values().filter(|r| matches!(r, Resolved::Failed)).count();
        if missing > 0 {
            metrics::record_enrichment_placeholder("missing", missing);
        }
        if failed > 0 {
            metrics::record_enrichment_placeholder("lookup_failed", failed);
        }

        let enriched: Vec<FeedItem> = items
            .into_iter()
            .zip(accounts)
            .map(|((item, score), account)| {
                let profile = account.as_ref().and_then(|a| resolved.get(a));
                render(item, score, account.as_ref(), profile)
            })
            .collect();

        metrics::observe_stage("enrichment", start.elapsed());
        debug!(items = enriched.len(), lookups, missing, failed, "Enriched feed page");
        enriched
    }
}

fn render(
    item: ContentItem,
    score: Option<f64>,
    account: Option<&AccountRef>,
    resolved: Option<&Resolved>,
) -> FeedItem {
    let is_user_post = item.author.is_user();
    let is_venue_post = matches!(item.author, Author::Venue { .. });

    let (author_name, author_avatar, author_category) = match (account, resolved) {
        (Some(account), Some(Resolved::Found(profile))) => (
            profile
                .display_name
                .clone()
                .unwrap_or_else(|| placeholder_name(account.kind).to_string()),
            profile.avatar.clone().unwrap_or_default(),
            account.kind.as_str().to_string(),
        ),
        (Some(account), _) => (
            placeholder_name(account.kind).to_string(),
            String::new(),
            UNKNOWN_CATEGORY.to_string(),
        ),
        (None, _) => (
            ANONYMOUS_NAME.to_string(),
            String::new(),
            ANONYMOUS_CATEGORY.to_string(),
        ),
    };

    FeedItem {
        author_id: item.author.id().map(str::to_string),
        id: item.id,
        content: item.content,
        media: item.media,
        tags: item.tags,
        posted_at: item.posted_at,
        author_name,
        author_avatar,
        author_category,
        is_user_post,
        is_venue_post,
        likes_count: item.likes_count,
        comments_count: item.comments_count,
        shares_count: item.shares_count,
        score,
        interaction_type: None,
    }
}

fn placeholder_name(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::User => USER_PLACEHOLDER_NAME,
        AccountKind::Venue(_) => VENUE_PLACEHOLDER_NAME,
    }
}
