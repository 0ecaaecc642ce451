use crate::similarity::{combined_score, normalize_text};
use crate::urlnorm::canonical_url;
use chrono::{DateTime, Utc};
use config::MatchConfig;
use st_core::types::StageRecord;
use tracing::debug;

/// Decide whether two records describe the same logical application.
///
/// Identity checks run in order of strength: exact id, canonical URL,
/// weighted bigram similarity over title and company. URL equality takes
/// precedence over text: two records sharing a canonical URL merge even
/// when their titles disagree.
pub fn is_same_application(a: &StageRecord, b: &StageRecord, config: &MatchConfig) -> bool {
    if a.id == b.id {
        return true;
    }

    if let (Some(url_a), Some(url_b)) = (canonical_url(&a.url), canonical_url(&b.url)) {
        if url_a == url_b {
            return true;
        }
    }

    let title_a = normalize_text(&a.title);
    let title_b = normalize_text(&b.title);
    let company_a = normalize_text(&a.company);
    let company_b = normalize_text(&b.company);

    // Rows with no usable text only ever match on id or URL.
    if (title_a.is_empty() && company_a.is_empty()) || (title_b.is_empty() && company_b.is_empty())
    {
        return false;
    }

    if title_a == title_b && company_a == company_b {
        return true;
    }

    combined_score(&a.title, &a.company, &b.title, &b.company, config) >= config.threshold
}

/// Merge an incoming record into an existing one.
///
/// Identity is sticky to the first-seen record: the existing id and
/// creation timestamp survive. Every other field takes the incoming value;
/// provenance is kept from the existing record only when the incoming side
/// carries none.
pub fn merge_records(
    existing: &StageRecord,
    incoming: &StageRecord,
    now: DateTime<Utc>
) -> StageRecord {
    StageRecord {
        id: existing.id.clone(),
        title: incoming.title.clone(),
        company: incoming.company.clone(),
        url: incoming.url.clone(),
        location: incoming.location.clone(),
        notes: incoming.notes.clone(),
        status: incoming.status,
        deadline: incoming.deadline,
        source: incoming.source.or(existing.source),
        created_at: existing.created_at,
        updated_at: now
    }
}

/// Reconcile the local collection with a batch of remote records.
///
/// Deterministic and side-effect-free: the merge timestamp is a parameter,
/// matching walks the collection in order, and the result is re-sorted by
/// last-modified descending. Unmatched incoming records append as new.
pub fn reconcile(
    local: &[StageRecord],
    remote: &[StageRecord],
    config: &MatchConfig,
    now: DateTime<Utc>
) -> Vec<StageRecord> {
    let mut collection: Vec<StageRecord> = local.to_vec();

    for incoming in remote {
        match collection
            .iter()
            .position(|existing| is_same_application(existing, incoming, config))
        {
            Some(index) => {
                let merged = merge_records(&collection[index], incoming, now);
                debug!(id = %merged.id, incoming = %incoming.id, "Merged duplicate record");
                collection[index] = merged;
            }
            None => collection.push(incoming.clone())
        }
    }

    sort_by_recency(&mut collection);
    collection
}

/// Insert or merge one record into the collection; the upsert path of the
/// caller-facing API. Returns the stored form of the record.
pub fn upsert(
    collection: &mut Vec<StageRecord>,
    record: StageRecord,
    config: &MatchConfig,
    now: DateTime<Utc>
) -> StageRecord {
    let stored = match collection
        .iter()
        .position(|existing| is_same_application(existing, &record, config))
    {
        Some(index) => {
            let merged = merge_records(&collection[index], &record, now);
            collection[index] = merged.clone();
            merged
        }
        None => {
            collection.push(record.clone());
            record
        }
    };
    sort_by_recency(collection);
    stored
}

fn sort_by_recency(collection: &mut [StageRecord]) {
    collection.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
}
