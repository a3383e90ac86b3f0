use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::{FeedMode, VenueCategory};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },

    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

/// Paging, diversification and enrichment knobs (`FEED_*`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    /// Over-fetch factor applied to the page size before diversification
    #[serde(default = "default_window_factor")]
    pub window_factor: f64,
    #[serde(default = "default_max_consecutive_per_author")]
    pub max_consecutive_per_author: usize,
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Newest matching posts loaded per ranked request. Ranking, paging and totals never
    /// reach past this many candidates.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Partition used to resolve venue authors whose category is unknown
    #[serde(default = "default_venue_partition")]
    pub default_venue_partition: VenueCategory,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            window_factor: default_window_factor(),
            max_consecutive_per_author: default_max_consecutive_per_author(),
            enrichment_concurrency: default_enrichment_concurrency(),
            request_timeout_ms: default_request_timeout_ms(),
            max_candidates: default_max_candidates(),
            default_venue_partition: default_venue_partition(),
        }
    }
}

impl FeedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Number of ranked items fetched for a page of `limit` items
    pub fn window_size(&self, limit: u32) -> usize {
        (f64::from(limit) * self.window_factor).ceil() as usize
    }

    /// Clamp a requested page size into `1..=max_limit`
    pub fn clamp_limit(&self, requested: Option<i64>) -> u32 {
        match requested {
            Some(limit) => limit.clamp(1, i64::from(self.max_limit)) as u32,
            None => self.default_limit,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |var: &'static str, value: String| Err(ConfigError::Invalid { var, value });

        if self.max_limit == 0 {
            return invalid("FEED_MAX_LIMIT", self.max_limit.to_string());
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return invalid("FEED_DEFAULT_LIMIT", self.default_limit.to_string());
        }
        if !self.window_factor.is_finite() || self.window_factor < 1.0 {
            return invalid("FEED_WINDOW_FACTOR", self.window_factor.to_string());
        }
        if self.max_consecutive_per_author == 0 {
            return invalid("FEED_MAX_CONSECUTIVE_PER_AUTHOR", "0".to_string());
        }
        if self.enrichment_concurrency == 0 {
            return invalid("FEED_ENRICHMENT_CONCURRENCY", "0".to_string());
        }
        if self.request_timeout_ms == 0 {
            return invalid("FEED_REQUEST_TIMEOUT_MS", "0".to_string());
        }
        if self.max_candidates < self.window_size(self.max_limit) {
            return invalid("FEED_MAX_CANDIDATES", self.max_candidates.to_string());
        }
        Ok(())
    }
}

/// Linear combination weights for the scoring features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub recency: f64,
    pub popularity: f64,
    pub interaction: f64,
    pub relevance: f64,
    pub proximity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: 0.4,
            popularity: 0.2,
            interaction: 0.1,
            relevance: 0.3,
            proximity: 0.0,
        }
    }
}

/// Partial weight set read from a prefixed group of variables
#[derive(Debug, Default, Deserialize)]
struct WeightOverrides {
    recency: Option<f64>,
    popularity: Option<f64>,
    interaction: Option<f64>,
    relevance: Option<f64>,
    proximity: Option<f64>,
}

impl WeightOverrides {
    fn apply(self, base: ScoringWeights) -> ScoringWeights {
        ScoringWeights {
            recency: self.recency.unwrap_or(base.recency),
            popularity: self.popularity.unwrap_or(base.popularity),
            interaction: self.interaction.unwrap_or(base.interaction),
            relevance: self.relevance.unwrap_or(base.relevance),
            proximity: self.proximity.unwrap_or(base.proximity),
        }
    }
}

/// Per-mode weight sets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoringConfig {
    pub default: ScoringWeights,
    /// Starts from `default` and applies `FEED_LOCAL_TRENDS_WEIGHT_*` on top
    pub local_trends: ScoringWeights,
}

impl ScoringConfig {
    pub fn weights_for(&self, mode: FeedMode) -> ScoringWeights {
        match mode {
            FeedMode::LocalTrends => self.local_trends,
            FeedMode::OwnVenue
            | FeedMode::SocialMentions
            | FeedMode::FollowedAccounts
            | FeedMode::Default => self.default,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let get = |key: &str| vars.get(key).cloned();

        let app = AppConfig {
            env: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            port: parse_or(&vars, "APP_PORT", 8080)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        let database = DatabaseConfig {
            url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            max_connections: parse_or(&vars, "DATABASE_MAX_CONNECTIONS", 10)?,
            min_connections: parse_or(&vars, "DATABASE_MIN_CONNECTIONS", 1)?,
            acquire_timeout_secs: parse_or(&vars, "DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?,
            run_migrations: parse_or(&vars, "DATABASE_RUN_MIGRATIONS", false)?,
        };

        let feed: FeedConfig = envy::prefixed("FEED_").from_iter(vars.clone())?;
        feed.validate()?;

        let default_weights = envy::prefixed("FEED_WEIGHT_")
            .from_iter::<_, WeightOverrides>(vars.clone())?
            .apply(ScoringWeights::default());
        let local_trends_weights = envy::prefixed("FEED_LOCAL_TRENDS_WEIGHT_")
            .from_iter::<_, WeightOverrides>(vars)?
            .apply(default_weights);

        Ok(Config {
            app,
            database,
            feed,
            scoring: ScoringConfig {
                default: default_weights,
                local_trends: local_trends_weights,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(var) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

fn default_limit() -> u32 {
    10
}

fn default_max_limit() -> u32 {
    50
}

fn default_window_factor() -> f64 {
    1.5
}

fn default_max_consecutive_per_author() -> usize {
    2
}

fn default_enrichment_concurrency() -> usize {
    8
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_max_candidates() -> usize {
    1000
}

fn default_venue_partition() -> VenueCategory {
    VenueCategory::Restaurant
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut vars = vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/choice".to_string(),
        )];
        vars.extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        vars
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.app.port, 8080);
        assert_eq!(config.feed.default_limit, 10);
        assert_eq!(config.feed.max_limit, 50);
        assert_eq!(config.feed.max_consecutive_per_author, 2);
        assert_eq!(config.feed.max_candidates, 1000);
        assert_eq!(config.feed.default_venue_partition, VenueCategory::Restaurant);
        assert_eq!(config.scoring.default, ScoringWeights::default());
        assert_eq!(config.scoring.local_trends, ScoringWeights::default());
        assert!(!config.database.run_migrations);
    }

    #[test]
    fn test_database_url_is_required() {
        let err = Config::from_vars(Vec::<(String, String)>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_weight_overrides_layer_onto_defaults() {
        let config = Config::from_vars(vars(&[
            ("FEED_WEIGHT_POPULARITY", "0.05"),
            ("FEED_LOCAL_TRENDS_WEIGHT_PROXIMITY", "2.5"),
        ]))
        .unwrap();

        assert_eq!(config.scoring.default.popularity, 0.05);
        assert_eq!(config.scoring.default.recency, 0.4);
        assert_eq!(config.scoring.local_trends.popularity, 0.05);
        assert_eq!(config.scoring.local_trends.proximity, 2.5);
        assert_eq!(config.scoring.weights_for(FeedMode::Default).proximity, 0.0);
        assert_eq!(config.scoring.weights_for(FeedMode::LocalTrends).proximity, 2.5);
    }

    #[test]
    fn test_feed_settings_from_env() {
        let config = Config::from_vars(vars(&[
            ("FEED_MAX_LIMIT", "20"),
            ("FEED_DEFAULT_LIMIT", "5"),
            ("FEED_DEFAULT_VENUE_PARTITION", "leisure"),
            ("FEED_REQUEST_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.feed.max_limit, 20);
        assert_eq!(config.feed.default_venue_partition, VenueCategory::Leisure);
        assert_eq!(config.feed.request_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_vars(vars(&[("APP_PORT", "http")])).is_err());
        assert!(Config::from_vars(vars(&[("FEED_WINDOW_FACTOR", "0.5")])).is_err());
        assert!(Config::from_vars(vars(&[("FEED_DEFAULT_LIMIT", "80")])).is_err());
        // Smaller than one full window at the maximum page size
        assert!(Config::from_vars(vars(&[("FEED_MAX_CANDIDATES", "40")])).is_err());
        assert!(Config::from_vars(vars(&[("FEED_MAX_CANDIDATES", "75")])).is_ok());
    }

    #[test]
    fn test_window_and_limit_clamping() {
        let feed = FeedConfig::default();
        assert_eq!(feed.window_size(10), 15);
        assert_eq!(feed.window_size(3), 5);
        assert_eq!(feed.clamp_limit(None), 10);
        assert_eq!(feed.clamp_limit(Some(0)), 1);
        assert_eq!(feed.clamp_limit(Some(500)), 50);
    }
}
