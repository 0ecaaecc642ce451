use errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use st_core::types::StageStatus;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagetrackConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub statuses: StatusMap,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub sync: SyncSettings
}

impl StagetrackConfig {
    /// Surface configuration problems immediately rather than at first use.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.remote.api_token.is_some() && self.remote.database.is_none() {
            return Err(ConfigError::Invalid {
                message: "api token set but no database configured".into()
            });
        }
        self.matching.validate()?;
        if self.sync.page_size == 0 || self.sync.page_size > 100 {
            return Err(ConfigError::Invalid {
                message: format!("page size must be 1..=100, got {}", self.sync.page_size)
            });
        }
        Ok(())
    }
}

/// Remote record service connection settings. Both fields optional: with no
/// credentials the engine runs fully offline and every flush is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub api_token: Option<String>,
    /// Free-form database reference: raw 32-hex id, dashed UUID, or a URL
    /// containing either.
    pub database: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64
}

fn default_base_url() -> String {
    "https://api.notion.com/v1".to_string()
}

fn default_api_version() -> String {
    "2022-06-28".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            database: None,
            base_url: default_base_url(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs()
        }
    }
}

impl RemoteConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_token.is_some() && self.database.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote property names for each record field. The remote schema is
/// user-configurable text, so every name here is just a lookup key; names
/// absent from the discovered schema are skipped on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMap {
    pub title: String,
    pub company: String,
    pub url: String,
    pub location: String,
    pub notes: String,
    pub status: String,
    pub deadline: String,
    pub source: String
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            title: "Name".into(),
            company: "Company".into(),
            url: "URL".into(),
            location: "Location".into(),
            notes: "Notes".into(),
            status: "Status".into(),
            deadline: "Deadline".into(),
            source: "Source".into()
        }
    }
}

/// Status vocabulary. Remote status labels are free text; each list holds
/// the accepted spellings for one canonical status, first entry being the
/// label written back to the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMap {
    pub open: Vec<String>,
    pub applied: Vec<String>,
    pub interviewing: Vec<String>,
    pub rejected: Vec<String>
}

impl Default for StatusMap {
    fn default() -> Self {
        Self {
            open: vec![
                "Open".into(),
                "Saved".into(),
                "Bookmarked".into(),
                "To apply".into(),
                "Wishlist".into(),
            ],
            applied: vec![
                "Applied".into(),
                "Application sent".into(),
                "Submitted".into(),
                "In review".into(),
            ],
            interviewing: vec![
                "Interviewing".into(),
                "Interview".into(),
                "Phone screen".into(),
                "Onsite".into(),
            ],
            rejected: vec![
                "Rejected".into(),
                "Declined".into(),
                "Closed".into(),
                "No offer".into(),
            ]
        }
    }
}

impl StatusMap {
    /// Label written to the remote side for a canonical status.
    pub fn label_for(&self, status: StageStatus) -> &str {
        let list = match status {
            StageStatus::Open => &self.open,
            StageStatus::Applied => &self.applied,
            StageStatus::Interviewing => &self.interviewing,
            StageStatus::Rejected => &self.rejected
        };
        list.first().map_or("Open", |s| s.as_str())
    }

    /// Accepted spellings for a canonical status, normalization left to the
    /// caller.
    pub fn vocabulary(&self) -> [(StageStatus, &Vec<String>); 4] {
        [
            (StageStatus::Applied, &self.applied),
            (StageStatus::Interviewing, &self.interviewing),
            (StageStatus::Rejected, &self.rejected),
            (StageStatus::Open, &self.open),
        ]
    }
}

/// Explicit retry-policy values for the resilient remote client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    /// Delay applied on a 429 without a usable Retry-After header.
    pub rate_limit_fallback_secs: u64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 600,
            multiplier: 1.8,
            rate_limit_fallback_secs: 2
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub snapshot_ttl_secs: u64,
    /// Schema shape changes rarely; cached much longer than records.
    pub schema_ttl_secs: u64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 90,
            schema_ttl_secs: 3600
        }
    }
}

impl CacheConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_ttl_secs)
    }
}

/// Fuzzy-match tuning. The defaults are empirical carry-overs, not derived
/// from a labeled dataset; embedders may tune them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub threshold: f64,
    pub title_weight: f64,
    pub company_weight: f64
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.86,
            title_weight: 0.7,
            company_weight: 0.3
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid {
                message: format!("match threshold must be within 0..=1, got {}", self.threshold)
            });
        }
        if self.title_weight <= 0.0 || self.company_weight < 0.0 {
            return Err(ConfigError::Invalid {
                message: "match weights must be positive".into()
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Remote query page size; the service caps pages at 100.
    pub page_size: u32,
    /// Days without movement before an in-flight application counts as an
    /// SLA blocker.
    pub sla_days: i64,
    /// Interval for the periodic refresh scheduler.
    pub refresh_interval_secs: u64
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            sla_days: 14,
            refresh_interval_secs: 300
        }
    }
}

impl SyncSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        StagetrackConfig::default().validate().unwrap();
    }

    #[test]
    fn test_token_without_database_rejected() {
        let mut config = StagetrackConfig::default();
        config.remote.api_token = Some("secret".into());
        assert!(config.validate().is_err());
        config.remote.database = Some("a".repeat(32));
        config.validate().unwrap();
        assert!(config.remote.has_credentials());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = StagetrackConfig::default();
        config.sync.page_size = 0;
        assert!(config.validate().is_err());
        config.sync.page_size = 101;
        assert!(config.validate().is_err());
        config.sync.page_size = 100;
        config.validate().unwrap();
    }

    #[test]
    fn test_status_write_labels() {
        let map = StatusMap::default();
        assert_eq!(map.label_for(StageStatus::Applied), "Applied");
        assert_eq!(map.label_for(StageStatus::Open), "Open");
    }

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 4);
        assert_eq!(retry.base_delay_ms, 600);
        assert!((retry.multiplier - 1.8).abs() < f64::EPSILON);
    }
}
