use actix_web::{dev::Service, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use producer_feed_service::config::Config;
use producer_feed_service::db::{FeedStore, PgFeedStore};
use producer_feed_service::handlers::{self, FeedHandlerState};
use producer_feed_service::metrics;
use producer_feed_service::services::ProducerFeedEngine;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting producer-feed-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);
    info!(
        default_limit = config.feed.default_limit,
        max_limit = config.feed.max_limit,
        window_factor = config.feed.window_factor,
        max_consecutive_per_author = config.feed.max_consecutive_per_author,
        request_timeout_ms = config.feed.request_timeout_ms,
        weights = ?config.scoring,
        "Feed configuration loaded"
    );

    let store = PgFeedStore::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("failed to run database migrations")?;
        info!("Database migrations applied");
    }

    let store: Arc<dyn FeedStore> = Arc::new(store);
    if let Err(e) = store.ping().await {
        warn!(error = %e, "Database not reachable at startup, readiness will report unavailable");
    }

    let engine = Arc::new(ProducerFeedEngine::new(
        store,
        config.feed.clone(),
        config.scoring,
    ));
    let feed_handler_state = web::Data::new(FeedHandlerState { engine });

    let bind_addr = format!("0.0.0.0:{}", config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(feed_handler_state.clone())
            .wrap(TracingLogger::default())
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            metrics::observe_http_request(&method, &path, 500, start.elapsed());
                            Err(err)
                        }
                    }
                }
            })
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}
