//! # Remote Client
//!
//! Resilient client for the remote record service plus the mapper between
//! its schema-driven property representation and `StageRecord`.
//!
//! The client retries transient failures with exponential backoff, honors
//! server-supplied rate-limit delays, and classifies everything else as
//! fatal. The mapper degrades on partial data: unknown status labels fall
//! back to Open and configured fields missing from the discovered schema
//! are skipped, never errors.

pub mod client;
pub mod ids;
pub mod mapper;
pub mod retry;
pub mod schema;

pub use client::{NotionStore, PageBatch, RemoteStore};
pub use ids::normalize_container_id;
pub use retry::RetryPolicy;
pub use schema::{DatabaseSchema, PropertyKind, PropertyValue};
