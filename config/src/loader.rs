//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles. Variables override defaults; the embedding caller may still
//! override the loaded values before constructing the engine.
//!
//! # Naming Convention
//! All variables carry the `ST_` prefix:
//! - `ST_API_TOKEN`: bearer token for the remote record service
//! - `ST_DATABASE`: database reference (raw 32-hex id, dashed UUID, or URL)
//! - `ST_BASE_URL`: remote API base URL
//! - `ST_API_VERSION`: fixed API-version header value
//! - `ST_TIMEOUT_SECS`: per-request timeout
//! - `ST_MAX_RETRIES`: retry budget (total attempts = retries + 1)
//! - `ST_BASE_DELAY_MS`: first backoff delay
//! - `ST_BACKOFF_MULTIPLIER`: backoff growth factor
//! - `ST_SNAPSHOT_TTL_SECS`: snapshot cache TTL
//! - `ST_SCHEMA_TTL_SECS`: schema cache TTL
//! - `ST_MATCH_THRESHOLD`: fuzzy-match acceptance threshold
//! - `ST_PAGE_SIZE`: remote query page size (1..=100)
//! - `ST_SLA_DAYS`: stall threshold for SLA blockers
//! - `ST_REFRESH_INTERVAL_SECS`: periodic refresh interval

use crate::config::StagetrackConfig;
use errors::ConfigResult;
use std::env;

pub fn load_from_env() -> ConfigResult<StagetrackConfig> {
    let mut config = StagetrackConfig::default();

    if let Ok(token) = env::var("ST_API_TOKEN") {
        if !token.is_empty() {
            config.remote.api_token = Some(token);
        }
    }
    if let Ok(database) = env::var("ST_DATABASE") {
        if !database.is_empty() {
            config.remote.database = Some(database);
        }
    }
    if let Ok(base_url) = env::var("ST_BASE_URL") {
        config.remote.base_url = base_url;
    }
    if let Ok(version) = env::var("ST_API_VERSION") {
        config.remote.api_version = version;
    }

    set_parsed("ST_TIMEOUT_SECS", &mut config.remote.timeout_secs);
    set_parsed("ST_MAX_RETRIES", &mut config.retry.max_retries);
    set_parsed("ST_BASE_DELAY_MS", &mut config.retry.base_delay_ms);
    set_parsed("ST_BACKOFF_MULTIPLIER", &mut config.retry.multiplier);
    set_parsed("ST_SNAPSHOT_TTL_SECS", &mut config.cache.snapshot_ttl_secs);
    set_parsed("ST_SCHEMA_TTL_SECS", &mut config.cache.schema_ttl_secs);
    set_parsed("ST_MATCH_THRESHOLD", &mut config.matching.threshold);
    set_parsed("ST_PAGE_SIZE", &mut config.sync.page_size);
    set_parsed("ST_SLA_DAYS", &mut config.sync.sla_days);
    set_parsed(
        "ST_REFRESH_INTERVAL_SECS",
        &mut config.sync.refresh_interval_secs
    );

    config.validate()?;
    Ok(config)
}

fn set_parsed<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "Ignoring unparsable value");
            }
        }
    }
}
