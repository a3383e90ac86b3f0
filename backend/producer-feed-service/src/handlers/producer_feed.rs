use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::FeedConfig;
use crate::error::{AppError, Result};
use crate::models::{AccountRef, FeedMode, FeedRequest, VenueCategory};
use crate::services::ProducerFeedEngine;

const MAX_VENUE_ID_LEN: usize = 64;

pub struct FeedHandlerState {
    pub engine: Arc<ProducerFeedEngine>,
}

/// Query parameters shared by the producer feed endpoints. Numbers arrive as strings so
/// malformed values get the JSON error body instead of the extractor's plain-text one.
#[derive(Debug, Default, Deserialize)]
pub struct ProducerFeedQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub filter: Option<String>,
    #[serde(rename = "producerType")]
    pub producer_type: Option<String>,
}

impl ProducerFeedQuery {
    fn page(&self) -> Result<u32> {
        match self.page.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => {
                let page: i64 = raw
                    .parse()
                    .map_err(|_| AppError::BadRequest(format!("Invalid page: {}", raw)))?;
                Ok(page.clamp(1, i64::from(u32::MAX)) as u32)
            }
            None => Ok(1),
        }
    }

    fn limit(&self, feed: &FeedConfig) -> Result<u32> {
        match self.limit.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(raw) => {
                let limit: i64 = raw
                    .parse()
                    .map_err(|_| AppError::BadRequest(format!("Invalid limit: {}", raw)))?;
                Ok(feed.clamp_limit(Some(limit)))
            }
            None => Ok(feed.clamp_limit(None)),
        }
    }

    fn mode(&self) -> Result<FeedMode> {
        let filter = self.filter.as_deref().unwrap_or("default").trim();
        FeedMode::from_filter(filter)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown filter: {}", filter)))
    }

    fn category(&self) -> Result<VenueCategory> {
        match self.producer_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => VenueCategory::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown producerType: {}", raw))),
            None => Ok(VenueCategory::Restaurant),
        }
    }
}

fn validate_venue_id(raw: &str) -> Result<String> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_VENUE_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(raw.to_string())
    } else {
        Err(AppError::BadRequest(format!("Invalid venue id: {}", raw)))
    }
}

fn feed_request(venue_id: &str, query: &ProducerFeedQuery, mode: FeedMode, feed: &FeedConfig) -> Result<FeedRequest> {
    Ok(FeedRequest {
        requester: AccountRef::venue(validate_venue_id(venue_id)?, query.category()?),
        mode,
        page: query.page()?,
        limit: query.limit(feed)?,
    })
}

/// Ranked producer feed
///
/// GET /api/v1/producer-feed/{venueId}?page=&limit=&filter=&producerType=
#[get("/{venue_id}")]
pub async fn get_producer_feed(
    state: web::Data<FeedHandlerState>,
    path: web::Path<String>,
    query: web::Query<ProducerFeedQuery>,
) -> Result<HttpResponse> {
    let engine = &state.engine;
    let mode = query.mode()?;
    let request = feed_request(&path, &query, mode, engine.feed_config())?;

    debug!(
        venue = %request.requester.id,
        mode = mode.as_str(),
        page = request.page,
        limit = request.limit,
        "Producer feed request"
    );

    let page = engine.feed(request).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// The venue's own posts, newest first
///
/// GET /api/v1/producer-feed/{venueId}/venue-posts?page=&limit=&producerType=
#[get("/{venue_id}/venue-posts")]
pub async fn get_venue_posts(
    state: web::Data<FeedHandlerState>,
    path: web::Path<String>,
    query: web::Query<ProducerFeedQuery>,
) -> Result<HttpResponse> {
    let engine = &state.engine;
    let venue = AccountRef::venue(validate_venue_id(&path)?, query.category()?);
    let page = query.page()?;
    let limit = query.limit(engine.feed_config())?;

    let page = engine.venue_posts(venue, page, limit).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Posts by end users about the venue
///
/// GET /api/v1/producer-feed/{venueId}/interactions?page=&limit=&producerType=
#[get("/{venue_id}/interactions")]
pub async fn get_venue_interactions(
    state: web::Data<FeedHandlerState>,
    path: web::Path<String>,
    query: web::Query<ProducerFeedQuery>,
) -> Result<HttpResponse> {
    let engine = &state.engine;
    let request = feed_request(&path, &query, FeedMode::SocialMentions, engine.feed_config())?;

    let page = engine.feed(request).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Posts ranked with proximity to the venue as an ordering key
///
/// GET /api/v1/producer-feed/{venueId}/local-trends?page=&limit=&producerType=
#[get("/{venue_id}/local-trends")]
pub async fn get_local_trends(
    state: web::Data<FeedHandlerState>,
    path: web::Path<String>,
    query: web::Query<ProducerFeedQuery>,
) -> Result<HttpResponse> {
    let engine = &state.engine;
    let request = feed_request(&path, &query, FeedMode::LocalTrends, engine.feed_config())?;

    let page = engine.feed(request).await?;
    Ok(HttpResponse::Ok().json(page))
}
