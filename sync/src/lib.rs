//! # Sync Engine
//!
//! Reconciliation between the local record collection and the remote
//! record service: duplicate detection and merge, a durable offline queue
//! for failed writes, and a staleness-aware snapshot cache with
//! single-flight refresh.

pub mod cache;
pub mod queue;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod similarity;
pub mod state;
pub mod urlnorm;
pub mod views;

#[cfg(test)]
mod proptests;

pub use cache::{CacheOptions, SchemaCache, SnapshotCache};
pub use queue::{FlushReport, OfflineQueue};
pub use reconcile::{is_same_application, merge_records, reconcile};
pub use service::{Outcome, OutcomeKind, StageService};
