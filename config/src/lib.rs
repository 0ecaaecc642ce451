//! # Configuration
//!
//! Typed configuration for the Stagetrack system: remote credentials, the
//! user-configurable field and status vocabularies, retry/cache/matching
//! tuning, and a 12-factor environment loader.

pub mod config;
pub mod loader;

pub use config::{
    CacheConfig, FieldMap, MatchConfig, RemoteConfig, RetryConfig, StagetrackConfig, StatusMap,
    SyncSettings
};
pub use loader::load_from_env;
