use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an application stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Open,
    Applied,
    Interviewing,
    Rejected
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Applied => "applied",
            Self::Interviewing => "interviewing",
            Self::Rejected => "rejected"
        }
    }

    /// Statuses that still require attention from the user.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a record originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Manual,
    Imported,
    Remote
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Imported => write!(f, "imported"),
            Self::Remote => write!(f, "remote")
        }
    }
}

/// Prefix for identifiers issued locally before the first successful remote
/// create. Promotion to the remote-issued id happens on that first create.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// The canonical application-stage entity.
///
/// Identity of the *logical* application is decided by the reconciliation
/// engine, not by `id` alone; two records with different ids may still
/// describe the same application and get merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

impl StageRecord {
    /// Create a local draft record with a locally-issued identifier.
    pub fn new_local(title: impl Into<String>, company: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()),
            title: title.into(),
            company: company.into(),
            url: String::new(),
            location: String::new(),
            notes: String::new(),
            status: StageStatus::Open,
            deadline: None,
            source: Some(Provenance::Manual),
            created_at: now,
            updated_at: now
        }
    }

    /// True while the record has not been created on the remote side yet.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// A queued write operation awaiting replay against the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32
}

impl PendingOperation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            enqueued_at: Utc::now(),
            retry_count: 0
        }
    }

    /// Identity of the record this operation targets.
    pub fn target_id(&self) -> &str {
        self.kind.target_id()
    }

    /// Two operations collapse when they are the same kind of write against
    /// the same logical target.
    pub fn collapses_with(&self, other: &PendingOperation) -> bool {
        self.kind.discriminant() == other.kind.discriminant()
            && self.target_id() == other.target_id()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationKind {
    #[serde(rename_all = "camelCase")]
    UpsertRecord { record: StageRecord },
    #[serde(rename_all = "camelCase")]
    UpdateStatus { id: String, status: StageStatus }
}

impl OperationKind {
    pub fn target_id(&self) -> &str {
        match self {
            Self::UpsertRecord { record } => &record.id,
            Self::UpdateStatus { id, .. } => id
        }
    }

    pub(crate) fn discriminant(&self) -> u8 {
        match self {
            Self::UpsertRecord { .. } => 0,
            Self::UpdateStatus { .. } => 1
        }
    }
}

/// Whether a snapshot was produced by a network refresh or served from the
/// cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Network,
    Cache
}

/// An immutable, timestamped view of the full reconciled collection.
///
/// The derived views are always computed from the record list carried by the
/// same snapshot; a refresh replaces the whole value, it never mutates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub source: SnapshotSource,
    pub stale: bool,
    pub records: Vec<StageRecord>,
    pub views: SnapshotViews
}

impl Snapshot {
    /// A copy of this snapshot flagged as served-stale-from-cache.
    pub fn marked_stale(&self) -> Snapshot {
        let mut snap = self.clone();
        snap.stale = true;
        snap.source = SnapshotSource::Cache;
        snap
    }

    /// A copy of this snapshot flagged as a fresh cache hit.
    pub fn marked_cached(&self) -> Snapshot {
        let mut snap = self.clone();
        snap.source = SnapshotSource::Cache;
        snap
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotViews {
    pub status_counts: StatusCounts,
    pub open_items: Vec<String>,
    pub sla_blockers: Vec<SlaBlocker>,
    pub quality_issues: Vec<QualityIssue>,
    pub weekly: WeeklyKpis,
    pub upcoming_deadlines: Vec<UpcomingDeadline>
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub open: usize,
    pub applied: usize,
    pub interviewing: usize,
    pub rejected: usize
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.open + self.applied + self.interviewing + self.rejected
    }
}

/// An in-flight application that has sat without movement past the SLA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaBlocker {
    pub id: String,
    pub title: String,
    pub company: String,
    pub days_stalled: i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityIssue {
    pub id: String,
    pub field: String,
    pub problem: String
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyKpis {
    pub created: usize,
    pub applied: usize,
    pub interviewing: usize,
    pub rejected: usize
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingDeadline {
    pub id: String,
    pub title: String,
    pub deadline: NaiveDate,
    pub days_left: i64
}
