use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::trello::card_url;

pub const DESCRIPTION_KEY: &str = "description";

/// What an extracted key holds. Exactly one of these per key.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Rich text waiting for the rendering pass.
    Pending,
    /// Parsed structured-data literal.
    Data(Value),
    /// Rendered rich text.
    Html(String),
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Pending => Value::Null,
            PropertyValue::Data(value) => value.clone(),
            PropertyValue::Html(html) => Value::String(html.clone()),
        }
    }

    pub fn as_html(&self) -> Option<&str> {
        match self {
            PropertyValue::Html(html) => Some(html),
            _ => None,
        }
    }
}

/// One output record per card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardRecord {
    pub id: String,
    /// The 8-character id used in `https://trello.com/c/<short_id>` links. Not emitted.
    pub short_id: String,
    pub title: String,
    pub list: Option<String>,
    pub cover: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub draft: bool,
    pub labels: IndexMap<String, bool>,
    /// `description` first, then each property in document order.
    pub properties: IndexMap<String, PropertyValue>,
}

impl CardRecord {
    pub fn new(id: &str, short_id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            short_id: short_id.to_string(),
            title: title.to_string(),
            list: None,
            cover: None,
            date: None,
            draft: false,
            labels: IndexMap::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn url(&self) -> String {
        card_url(&self.short_id)
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn description(&self) -> Option<&str> {
        self.property(DESCRIPTION_KEY).and_then(PropertyValue::as_html)
    }

    /// Flat JSON object. Later keys overwrite earlier ones, so a property
    /// named like a label or a base field wins.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("id".into(), Value::String(self.id.clone()));
        obj.insert("title".into(), Value::String(self.title.clone()));
        obj.insert(
            "list".into(),
            self.list.clone().map(Value::String).unwrap_or(Value::Null),
        );
        if let Some(cover) = &self.cover {
            obj.insert("cover".into(), Value::String(cover.clone()));
        }
        if let Some(date) = &self.date {
            obj.insert(
                "date".into(),
                Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        obj.insert("draft".into(), Value::Bool(self.draft));
        for (name, present) in &self.labels {
            obj.insert(name.clone(), Value::Bool(*present));
        }
        for (key, value) in &self.properties {
            obj.insert(key.clone(), value.to_json());
        }
        Value::Object(obj)
    }
}

impl Serialize for CardRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ── Tests ──
