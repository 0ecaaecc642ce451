use crate::schema::{DatabaseSchema, PropertyKind, PropertyValue};
use chrono::{DateTime, NaiveDate, Utc};
use config::{FieldMap, StatusMap};
use serde_json::{Map, Value};
use st_core::types::{Provenance, StageRecord, StageStatus};
use tracing::debug;

/// Case-fold, diacritic-fold and whitespace-fold a status label for
/// comparison. Folding is limited to the Latin ranges that show up in
/// real status vocabularies.
pub fn normalize_status_text(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'ñ' => 'n',
        _ => c
    }
}

/// Map free-text remote status to the canonical enum.
///
/// Exact (normalized) match wins; otherwise prefix/substring heuristics run
/// against the configured vocabulary. An unmapped or newly invented label
/// must never abort ingestion, so the fallback is always `Open`.
pub fn status_from_remote(raw: &str, statuses: &StatusMap) -> StageStatus {
    let norm = normalize_status_text(raw);
    if norm.is_empty() {
        return StageStatus::Open;
    }

    for (status, vocab) in statuses.vocabulary() {
        if vocab.iter().any(|v| normalize_status_text(v) == norm) {
            return status;
        }
    }

    for (status, vocab) in statuses.vocabulary() {
        for label in vocab {
            let v = normalize_status_text(label);
            if v.is_empty() {
                continue;
            }
            if norm.starts_with(&v) || v.starts_with(&norm) || norm.contains(&v) {
                return status;
            }
        }
    }

    StageStatus::Open
}

/// Pull a plain-text rendering out of any property value the schema can
/// declare. Returns None for empty or unsupported shapes.
fn plain_text_of(prop: &Value) -> Option<String> {
    let kind = prop.get("type").and_then(Value::as_str)?;
    let text = match kind {
        "title" | "rich_text" => prop
            .get(kind)?
            .as_array()?
            .iter()
            .filter_map(|span| span.get("plain_text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        "url" => prop.get("url")?.as_str()?.to_string(),
        "select" | "status" => prop
            .get(kind)?
            .get("name")?
            .as_str()?
            .to_string(),
        "multi_select" => prop
            .get(kind)?
            .as_array()?
            .iter()
            .filter_map(|opt| opt.get("name").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(", "),
        "date" => prop
            .get("date")?
            .get("start")?
            .as_str()?
            .to_string(),
        _ => return None
    };
    if text.is_empty() { None } else { Some(text) }
}

fn field_text(props: &Value, name: &str) -> Option<String> {
    props.get(name).and_then(plain_text_of)
}

fn parse_time(page: &Value, key: &str) -> DateTime<Utc> {
    page.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc))
}

/// Map one raw remote page to a `StageRecord`. Returns None only when the
/// page carries no id at all; every other missing field degrades to a
/// default so partial rows never block ingestion of the rest.
pub fn to_record(page: &Value, fields: &FieldMap, statuses: &StatusMap) -> Option<StageRecord> {
    let id = page.get("id").and_then(Value::as_str)?.to_string();
    let props = page.get("properties").cloned().unwrap_or(Value::Null);

    let status = field_text(&props, &fields.status)
        .map_or(StageStatus::Open, |raw| status_from_remote(&raw, statuses));

    let deadline = field_text(&props, &fields.deadline)
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok());

    let source = field_text(&props, &fields.source).and_then(|raw| {
        match normalize_status_text(&raw).as_str() {
            "manual" => Some(Provenance::Manual),
            "imported" => Some(Provenance::Imported),
            "remote" => Some(Provenance::Remote),
            _ => None
        }
    });

    Some(StageRecord {
        id,
        title: field_text(&props, &fields.title).unwrap_or_default(),
        company: field_text(&props, &fields.company).unwrap_or_default(),
        url: field_text(&props, &fields.url).unwrap_or_default(),
        location: field_text(&props, &fields.location).unwrap_or_default(),
        notes: field_text(&props, &fields.notes).unwrap_or_default(),
        status,
        deadline,
        source,
        created_at: parse_time(page, "created_time"),
        updated_at: parse_time(page, "last_edited_time")
    })
}

/// Coerce one of our plain-text fields into the shape the schema declares
/// for it. Kinds that cannot carry the value mean the field is skipped.
fn coerce_text(kind: PropertyKind, text: &str) -> Option<PropertyValue> {
    match kind {
        PropertyKind::Title => Some(PropertyValue::Title(text.to_string())),
        PropertyKind::Text => Some(PropertyValue::Text(text.to_string())),
        PropertyKind::Url => Some(PropertyValue::Url(text.to_string())),
        PropertyKind::Select => Some(PropertyValue::Select(text.to_string())),
        PropertyKind::Status => Some(PropertyValue::Status(text.to_string())),
        PropertyKind::MultiSelect => Some(PropertyValue::MultiSelect(vec![text.to_string()])),
        PropertyKind::Date | PropertyKind::Unsupported => None
    }
}

/// Build the property set for a create or patch of `record`.
///
/// Each configured field name is looked up in the discovered schema; names
/// the schema does not carry are silently skipped, so a user renaming a
/// column never fails the whole write.
pub fn to_write_payload(
    record: &StageRecord,
    schema: &DatabaseSchema,
    fields: &FieldMap,
    statuses: &StatusMap
) -> Map<String, Value> {
    let mut payload = Map::new();

    let mut put = |name: &str, value: Option<PropertyValue>| {
        if let Some(value) = value {
            payload.insert(name.to_string(), value.to_json());
        }
    };

    let text_fields = [
        (&fields.title, &record.title),
        (&fields.company, &record.company),
        (&fields.url, &record.url),
        (&fields.location, &record.location),
        (&fields.notes, &record.notes),
    ];
    for (name, value) in text_fields {
        if value.is_empty() {
            continue;
        }
        match schema.kind_of(name) {
            Some(kind) => put(name, coerce_text(kind, value)),
            None => debug!(field = %name, "Field not in remote schema, skipping")
        }
    }

    if let Some(kind) = schema.kind_of(&fields.status) {
        put(
            &fields.status,
            coerce_text(kind, statuses.label_for(record.status))
        );
    }

    if let Some(deadline) = record.deadline {
        if schema.kind_of(&fields.deadline) == Some(PropertyKind::Date) {
            put(&fields.deadline, Some(PropertyValue::Date(deadline)));
        }
    }

    if let Some(source) = record.source {
        if let Some(kind) = schema.kind_of(&fields.source) {
            put(&fields.source, coerce_text(kind, &source.to_string()));
        }
    }

    payload
}

/// Property set for a status-only patch. Empty when the configured status
/// field is absent from the schema, in which case there is nothing to write.
pub fn status_payload(
    status: StageStatus,
    schema: &DatabaseSchema,
    fields: &FieldMap,
    statuses: &StatusMap
) -> Map<String, Value> {
    let mut payload = Map::new();
    if let Some(kind) = schema.kind_of(&fields.status) {
        if let Some(value) = coerce_text(kind, statuses.label_for(status)) {
            payload.insert(fields.status.clone(), value.to_json());
        }
    }
    payload
}
