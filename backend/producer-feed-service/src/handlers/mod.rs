pub mod health;
pub mod producer_feed;

use actix_web::web;

pub use producer_feed::{
    get_local_trends, get_producer_feed, get_venue_interactions, get_venue_posts,
    FeedHandlerState,
};

/// Register the feed and health routes. `/metrics` is added by the binary.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::live))
        .route("/api/v1/health/live", web::get().to(health::live))
        .route("/api/v1/health/ready", web::get().to(health::ready))
        .service(
            web::scope("/api/v1/producer-feed")
                .service(get_venue_posts)
                .service(get_venue_interactions)
                .service(get_local_trends)
                .service(get_producer_feed),
        );
}
