//! # Stagetrack Core
//!
//! Shared types and traits for the Stagetrack system.
//!
//! This crate provides:
//! - The canonical `StageRecord` entity and its lifecycle status enum
//! - Queued-write (`PendingOperation`) and snapshot types
//! - Collaborator traits for blob storage and diagnostics

pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use traits::{DiagnosticsSink, NullSink, Severity, StorageBackend, TracingSink};
pub use types::{
    OperationKind, PendingOperation, Provenance, Snapshot, SnapshotSource, SnapshotViews,
    StageRecord, StageStatus
};
