use chrono::NaiveDate;
use errors::{RemoteError, RemoteResult};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Declared type of a remote property, reduced to the closed set the mapper
/// knows how to read and write. Everything else is `Unsupported` and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Title,
    Text,
    Url,
    Select,
    Status,
    MultiSelect,
    Date,
    Unsupported
}

impl PropertyKind {
    fn from_type_name(name: &str) -> Self {
        match name {
            "title" => Self::Title,
            "rich_text" => Self::Text,
            "url" => Self::Url,
            "select" => Self::Select,
            "status" => Self::Status,
            "multi_select" => Self::MultiSelect,
            "date" => Self::Date,
            _ => Self::Unsupported
        }
    }
}

/// Property names and declared types discovered from the remote container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseSchema {
    pub properties: HashMap<String, PropertyKind>
}

impl DatabaseSchema {
    /// Parse the schema-fetch response body. A body without a `properties`
    /// object is a permanent failure; individual properties of unknown type
    /// are kept as `Unsupported` rather than dropped.
    pub fn parse(body: &Value) -> RemoteResult<Self> {
        let props = body
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| RemoteError::MalformedBody {
                reason: "schema response missing properties object".into()
            })?;

        let mut properties = HashMap::new();
        for (name, prop) in props {
            let kind = prop
                .get("type")
                .and_then(Value::as_str)
                .map_or(PropertyKind::Unsupported, PropertyKind::from_type_name);
            properties.insert(name.clone(), kind);
        }

        Ok(Self { properties })
    }

    pub fn kind_of(&self, name: &str) -> Option<PropertyKind> {
        self.properties.get(name).copied()
    }
}

/// A typed value ready to be written as one remote property. Produced by the
/// mapper after a schema lookup, so writes always carry the shape the remote
/// schema declares.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    Text(String),
    Url(String),
    Select(String),
    Status(String),
    MultiSelect(Vec<String>),
    Date(NaiveDate)
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Title(text) => json!({ "title": [{ "text": { "content": text } }] }),
            Self::Text(text) => json!({ "rich_text": [{ "text": { "content": text } }] }),
            Self::Url(url) => json!({ "url": url }),
            Self::Select(name) => json!({ "select": { "name": name } }),
            Self::Status(name) => json!({ "status": { "name": name } }),
            Self::MultiSelect(names) => {
                let options: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
                json!({ "multi_select": options })
            }
            Self::Date(date) => json!({ "date": { "start": date.format("%Y-%m-%d").to_string() } })
        }
    }
}
