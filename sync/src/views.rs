use chrono::{DateTime, Duration, Utc};
use st_core::types::{
    QualityIssue, SlaBlocker, SnapshotViews, StageRecord, StageStatus, StatusCounts,
    UpcomingDeadline, WeeklyKpis
};

const DEADLINE_HORIZON_DAYS: i64 = 14;

/// Derive the secondary views from one record list. Always called with the
/// list that ends up in the same snapshot, so aggregates and records can
/// never come from different generations.
pub fn compute_views(records: &[StageRecord], now: DateTime<Utc>, sla_days: i64) -> SnapshotViews {
    SnapshotViews {
        status_counts: status_counts(records),
        open_items: records
            .iter()
            .filter(|r| r.status == StageStatus::Open)
            .map(|r| r.id.clone())
            .collect(),
        sla_blockers: sla_blockers(records, now, sla_days),
        quality_issues: quality_issues(records, now),
        weekly: weekly_kpis(records, now),
        upcoming_deadlines: upcoming_deadlines(records, now)
    }
}

fn status_counts(records: &[StageRecord]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for record in records {
        match record.status {
            StageStatus::Open => counts.open += 1,
            StageStatus::Applied => counts.applied += 1,
            StageStatus::Interviewing => counts.interviewing += 1,
            StageStatus::Rejected => counts.rejected += 1
        }
    }
    counts
}

/// In-flight applications that have not moved within the SLA window.
fn sla_blockers(records: &[StageRecord], now: DateTime<Utc>, sla_days: i64) -> Vec<SlaBlocker> {
    let mut blockers: Vec<SlaBlocker> = records
        .iter()
        .filter(|r| matches!(r.status, StageStatus::Applied | StageStatus::Interviewing))
        .filter_map(|r| {
            let stalled = now.signed_duration_since(r.updated_at).num_days();
            (stalled >= sla_days).then(|| SlaBlocker {
                id: r.id.clone(),
                title: r.title.clone(),
                company: r.company.clone(),
                days_stalled: stalled
            })
        })
        .collect();
    blockers.sort_by(|a, b| b.days_stalled.cmp(&a.days_stalled));
    blockers
}

fn quality_issues(records: &[StageRecord], now: DateTime<Utc>) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    for record in records {
        if record.title.trim().is_empty() {
            issues.push(issue(record, "title", "missing title"));
        }
        if record.company.trim().is_empty() {
            issues.push(issue(record, "company", "missing company"));
        }
        if record.url.trim().is_empty() {
            issues.push(issue(record, "url", "missing posting URL"));
        }
        if let Some(deadline) = record.deadline {
            if record.status == StageStatus::Open && deadline < now.date_naive() {
                issues.push(issue(record, "deadline", "deadline passed while still open"));
            }
        }
    }
    issues
}

fn issue(record: &StageRecord, field: &str, problem: &str) -> QualityIssue {
    QualityIssue {
        id: record.id.clone(),
        field: field.to_string(),
        problem: problem.to_string()
    }
}

/// Movement within the trailing seven days, bucketed by current status.
fn weekly_kpis(records: &[StageRecord], now: DateTime<Utc>) -> WeeklyKpis {
    let week_ago = now - Duration::days(7);
    let mut kpis = WeeklyKpis::default();
    for record in records {
        if record.created_at >= week_ago {
            kpis.created += 1;
        }
        if record.updated_at >= week_ago {
            match record.status {
                StageStatus::Applied => kpis.applied += 1,
                StageStatus::Interviewing => kpis.interviewing += 1,
                StageStatus::Rejected => kpis.rejected += 1,
                StageStatus::Open => {}
            }
        }
    }
    kpis
}

fn upcoming_deadlines(records: &[StageRecord], now: DateTime<Utc>) -> Vec<UpcomingDeadline> {
    let today = now.date_naive();
    let mut deadlines: Vec<UpcomingDeadline> = records
        .iter()
        .filter(|r| r.status.is_active())
        .filter_map(|r| {
            let deadline = r.deadline?;
            let days_left = deadline.signed_duration_since(today).num_days();
            (0..=DEADLINE_HORIZON_DAYS).contains(&days_left).then(|| UpcomingDeadline {
                id: r.id.clone(),
                title: r.title.clone(),
                deadline,
                days_left
            })
        })
        .collect();
    deadlines.sort_by(|a, b| a.days_left.cmp(&b.days_left));
    deadlines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    fn record(id: &str, status: StageStatus, updated_days_ago: i64) -> StageRecord {
        let t = now() - Duration::days(updated_days_ago);
        StageRecord {
            id: id.into(),
            title: format!("Role {id}"),
            company: "Acme".into(),
            url: format!("https://a.co/{id}"),
            location: String::new(),
            notes: String::new(),
            status,
            deadline: None,
            source: None,
            created_at: t,
            updated_at: t
        }
    }

    #[test]
    fn test_status_counts_and_open_items() {
        let records = vec![
            record("a", StageStatus::Open, 1),
            record("b", StageStatus::Applied, 1),
            record("c", StageStatus::Open, 2),
        ];
        let views = compute_views(&records, now(), 14);
        assert_eq!(views.status_counts.open, 2);
        assert_eq!(views.status_counts.applied, 1);
        assert_eq!(views.status_counts.total(), 3);
        assert_eq!(views.open_items, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_sla_blockers() {
        let records = vec![
            record("fresh", StageStatus::Applied, 3),
            record("stalled", StageStatus::Applied, 20),
            record("stale-open", StageStatus::Open, 40),
        ];
        let views = compute_views(&records, now(), 14);
        assert_eq!(views.sla_blockers.len(), 1);
        assert_eq!(views.sla_blockers[0].id, "stalled");
        assert_eq!(views.sla_blockers[0].days_stalled, 20);
    }

    #[test]
    fn test_quality_issues() {
        let mut bad = record("bad", StageStatus::Open, 1);
        bad.url = String::new();
        bad.deadline = NaiveDate::from_ymd_opt(2026, 1, 1);
        let views = compute_views(&[bad], now(), 14);
        let fields: Vec<&str> = views.quality_issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"url"));
        assert!(fields.contains(&"deadline"));
        assert!(!fields.contains(&"title"));
    }

    #[test]
    fn test_weekly_kpis() {
        let records = vec![
            record("new-applied", StageStatus::Applied, 2),
            record("old-applied", StageStatus::Applied, 30),
            record("new-rejected", StageStatus::Rejected, 1),
        ];
        let views = compute_views(&records, now(), 14);
        assert_eq!(views.weekly.created, 2);
        assert_eq!(views.weekly.applied, 1);
        assert_eq!(views.weekly.rejected, 1);
    }

    #[test]
    fn test_upcoming_deadlines_sorted_and_bounded() {
        let mut soon = record("soon", StageStatus::Open, 1);
        soon.deadline = NaiveDate::from_ymd_opt(2026, 8, 10);
        let mut later = record("later", StageStatus::Open, 1);
        later.deadline = NaiveDate::from_ymd_opt(2026, 8, 18);
        let mut far = record("far", StageStatus::Open, 1);
        far.deadline = NaiveDate::from_ymd_opt(2026, 12, 1);
        let mut rejected = record("rejected", StageStatus::Rejected, 1);
        rejected.deadline = NaiveDate::from_ymd_opt(2026, 8, 10);

        let views = compute_views(&[later, soon, far, rejected], now(), 14);
        let ids: Vec<&str> = views.upcoming_deadlines.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "later"]);
    }
}
