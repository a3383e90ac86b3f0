/// PostgreSQL Feed Store
///
/// Posts live in `posts`; likes and comments are rows in `post_likes` / `post_comments`
/// and are counted at read time. Likes carry the liking account's role. Each account partition is a table of JSONB documents.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{CandidateFilter, FeedStore, StoreError};
use crate::config::DatabaseConfig;
use crate::models::{
    AccountKind, AccountProfile, AccountRef, Author, ContentItem, GeoPoint, VenueCategory,
};

/// Outer select over the capped `candidates` CTE. Like and comment counts are computed
/// for the capped rows only.
const POST_SELECT: &str = r#"
    SELECT
        p.id,
        p.user_id,
        p.venue_id,
        p.venue_category,
        p.content,
        p.media,
        p.tags,
        p.posted_at,
        p.latitude,
        p.longitude,
        p.target_venue_id,
        p.mentioned_venue_ids,
        p.is_automated,
        p.shares_count,
        (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS likes_count,
        (SELECT COUNT(*) FROM post_comments c WHERE c.post_id = p.id) AS comments_count
    FROM candidates p
    ORDER BY p.posted_at DESC, p.id ASC
"#;

/// Keep in step with `db::scan_order`
const SCAN_ORDER: &str = " ORDER BY p.posted_at DESC, p.id ASC";

#[derive(Debug, FromRow)]
struct PostRow {
    id: String,
    user_id: Option<String>,
    venue_id: Option<String>,
    venue_category: Option<String>,
    content: Option<String>,
    media: Option<Vec<String>>,
    tags: Option<Vec<String>>,
    posted_at: DateTime<Utc>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    target_venue_id: Option<String>,
    mentioned_venue_ids: Option<Vec<String>>,
    is_automated: Option<bool>,
    shares_count: Option<i64>,
    likes_count: i64,
    comments_count: i64,
}

impl From<PostRow> for ContentItem {
    fn from(row: PostRow) -> Self {
        let non_empty = |value: Option<String>| value.filter(|s| !s.trim().is_empty());
        let category = row.venue_category.as_deref().and_then(VenueCategory::parse);
        let target_venue_id = non_empty(row.target_venue_id);

        // Older user posts also carry the venue they were written about in `venue_id`
        let (author, target_venue_id) = match (non_empty(row.user_id), non_empty(row.venue_id)) {
            (Some(user_id), venue_id) => (Author::User(user_id), target_venue_id.or(venue_id)),
            (None, Some(venue_id)) => (
                Author::Venue {
                    id: venue_id,
                    category,
                },
                target_venue_id,
            ),
            (None, None) => (Author::Anonymous, target_venue_id),
        };

        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lng)) => GeoPoint::new(lat, lng),
            _ => None,
        };

        ContentItem {
            id: row.id,
            author,
            content: row.content.unwrap_or_default(),
            media: row.media.unwrap_or_default(),
            tags: row.tags.unwrap_or_default(),
            posted_at: row.posted_at,
            likes_count: row.likes_count.max(0) as u64,
            comments_count: row.comments_count.max(0) as u64,
            shares_count: row.shares_count.unwrap_or(0).max(0) as u64,
            location,
            target_venue_id,
            mentioned_venue_ids: row.mentioned_venue_ids.unwrap_or_default(),
            is_automated: row.is_automated.unwrap_or(false),
        }
    }
}

pub struct PgFeedStore {
    pool: PgPool,
}

impl PgFeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the connection pool and verify connectivity
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(
            "Database Pool Configuration: max_connections={}, min_connections={}, acquire_timeout={}s",
            config.max_connections, config.min_connections, config.acquire_timeout_secs
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!("Failed to create database pool: {}", e);
                StoreError::from(e)
            })?;

        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("migration failed: {}", e)))
    }
}

fn partition_table(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::User => "users",
        AccountKind::Venue(VenueCategory::Restaurant) => "restaurant_venues",
        AccountKind::Venue(VenueCategory::Leisure) => "leisure_venues",
        AccountKind::Venue(VenueCategory::Wellness) => "wellness_venues",
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Append the WHERE clause for a filter. Must select exactly what `CandidateFilter::matches`
/// accepts after row normalization.
fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, filter: &CandidateFilter) {
    match filter {
        CandidateFilter::All => {
            qb.push(" WHERE TRUE");
        }
        CandidateFilter::AuthoredByVenue {
            venue_id,
            include_automated,
        } => {
            qb.push(" WHERE NULLIF(TRIM(p.user_id), '') IS NULL AND p.venue_id = ");
            qb.push_bind(venue_id.clone());
            if !include_automated {
                qb.push(" AND COALESCE(p.is_automated, FALSE) = FALSE");
            }
        }
        CandidateFilter::MentionsVenue {
            venue_id,
            venue_name,
        } => {
            qb.push(" WHERE NULLIF(TRIM(p.user_id), '') IS NOT NULL AND (");
            qb.push("COALESCE(NULLIF(TRIM(p.target_venue_id), ''), p.venue_id) = ");
            qb.push_bind(venue_id.clone());
            qb.push(" OR ");
            qb.push_bind(venue_id.clone());
            qb.push(" = ANY(COALESCE(p.mentioned_venue_ids, '{}'))");
            if let Some(name) = venue_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                qb.push(" OR p.content ILIKE ");
                qb.push_bind(format!("%{}%", escape_like(name)));
                qb.push(" ESCAPE '\\'");
            }
            qb.push(")");
        }
        CandidateFilter::AuthoredByUsers { user_ids } => {
            qb.push(" WHERE p.user_id = ANY(");
            qb.push_bind(user_ids.clone());
            qb.push(")");
        }
        CandidateFilter::VenueCategory(category) => {
            let aliases: Vec<String> = category.aliases().iter().map(|a| a.to_string()).collect();
            qb.push(
                " WHERE NULLIF(TRIM(p.user_id), '') IS NULL \
                 AND NULLIF(TRIM(p.venue_id), '') IS NOT NULL \
                 AND LOWER(TRIM(p.venue_category)) = ANY(",
            );
            qb.push_bind(aliases);
            qb.push(")");
        }
    }
}

/// Newest `limit` matching posts in a CTE, then counters over those rows only
fn capped_scan(filter: &CandidateFilter, limit: usize) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("WITH candidates AS (SELECT p.* FROM posts p");
    push_predicate(&mut qb, filter);
    qb.push(SCAN_ORDER);
    qb.push(" LIMIT ");
    qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    qb.push(")");
    qb.push(POST_SELECT);
    qb
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn find_profile(&self, account: &AccountRef) -> Result<Option<AccountProfile>, StoreError> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", partition_table(account.kind));
        let doc = sqlx::query_scalar::<_, Value>(&sql)
            .bind(&account.id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(doc.map(|doc| AccountProfile::from_document(account, &doc)))
    }

    async fn liked_item_ids(&self, account: &AccountRef) -> Result<HashSet<String>, StoreError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT post_id
            FROM post_likes
            WHERE account_kind = $1 AND account_id = $2
            "#,
        )
        .bind(account.kind.role())
        .bind(&account.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn scan_candidates(
        &self,
        filter: &CandidateFilter,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let mut qb = capped_scan(filter, limit);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await?;

        debug!(filter = filter.describe(), limit, rows = rows.len(), "Scanned candidate posts");
        Ok(rows.into_iter().map(ContentItem::from).collect())
    }

    async fn count_candidates(&self, filter: &CandidateFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        push_predicate(&mut qb, filter);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn candidate_ids(&self, filter: &CandidateFilter) -> Result<Vec<String>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT p.id FROM posts p");
        push_predicate(&mut qb, filter);

        Ok(qb.build_query_scalar::<String>().fetch_all(&self.pool).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
