//! Records exchanged with a peer
//!
//! Records are opaque JSON to the core. Only a handful of fields are read
//! to drive protocol decisions: the identifier and UUID for routing, the
//! timestamp for pull dedup and the `protected` flag for signing.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// Record types with a view/index endpoint on the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Event,
    GalaxyCluster,
}

impl RecordKind {
    /// Key the peer wraps a record in (`{"Event": {...}}`)
    pub fn wrapper_key(&self) -> &'static str {
        match self {
            RecordKind::Event => "Event",
            RecordKind::GalaxyCluster => "GalaxyCluster",
        }
    }

    /// Controller segment of the peer's URL space
    pub fn path_segment(&self) -> &'static str {
        match self {
            RecordKind::Event => "events",
            RecordKind::GalaxyCluster => "galaxy_clusters",
        }
    }

    /// `/<records>/view/<id>`
    pub fn view_path(&self, id: &str) -> String {
        format!("/{}/view/{}", self.path_segment(), id)
    }

    /// `/<records>/index`
    pub fn index_path(&self) -> String {
        format!("/{}/index", self.path_segment())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wrapper_key())
    }
}

/// Read an identifier that peers send either as a string or a number
pub(crate) fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a unix timestamp sent either as a string or a number
pub(crate) fn value_as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Serde helper for ids that arrive as strings or numbers
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_as_id(&value).ok_or_else(|| serde::de::Error::custom("expected string or numeric id"))
}

/// Serde helper for timestamps that arrive as strings or numbers
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_as_timestamp(&value)
        .ok_or_else(|| serde::de::Error::custom("expected string or numeric timestamp"))
}

/// A record in the peer's wire form, `{"<Kind>": {...}}`
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: RecordKind,
    /// Object under the wrapper key
    body: Map<String, Value>,
    /// Keys next to the wrapper key, passed through untouched
    siblings: Map<String, Value>,
}

impl Record {
    /// Wrap a JSON object as a record of `kind`
    ///
    /// Accepts both the wrapped form and a bare object, which is wrapped
    /// under the kind's key.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Decode` if the value is not a JSON object.
    pub fn from_value(kind: RecordKind, value: Value) -> SyncResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(SyncError::Decode(format!("{} must be a JSON object", kind)));
        };
        match map.remove(kind.wrapper_key()) {
            Some(Value::Object(body)) => Ok(Self {
                kind,
                body,
                siblings: map,
            }),
            Some(other) => {
                map.insert(kind.wrapper_key().to_string(), other);
                Ok(Self {
                    kind,
                    body: map,
                    siblings: Map::new(),
                })
            }
            None => Ok(Self {
                kind,
                body: map,
                siblings: Map::new(),
            }),
        }
    }

    pub fn event(value: Value) -> SyncResult<Self> {
        Self::from_value(RecordKind::Event, value)
    }

    pub fn galaxy_cluster(value: Value) -> SyncResult<Self> {
        Self::from_value(RecordKind::GalaxyCluster, value)
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Inner object (the part under the wrapper key)
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Local numeric id, if set
    pub fn id(&self) -> Option<String> {
        self.body.get("id").and_then(value_as_id)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.body
            .get("uuid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Last modification timestamp, used for pull dedup
    pub fn timestamp(&self) -> Option<i64> {
        self.body.get("timestamp").and_then(value_as_timestamp)
    }

    /// Protected records are signed before being pushed
    pub fn is_protected(&self) -> bool {
        match self.body.get("protected") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            Some(Value::String(s)) => !s.is_empty() && s != "0",
            _ => false,
        }
    }

    /// Short label for logs: uuid, else id, else `?`
    pub fn label(&self) -> String {
        self.uuid()
            .map(str::to_string)
            .or_else(|| self.id())
            .unwrap_or_else(|| "?".to_string())
    }

    /// Wire form
    pub fn to_value(&self) -> Value {
        let mut map = self.siblings.clone();
        map.insert(
            self.kind.wrapper_key().to_string(),
            Value::Object(self.body.clone()),
        );
        Value::Object(map)
    }

    pub fn into_value(self) -> Value {
        let mut map = self.siblings;
        map.insert(self.kind.wrapper_key().to_string(), Value::Object(self.body));
        Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.siblings.len() + 1))?;
        for (key, value) in &self.siblings {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(self.kind.wrapper_key(), &self.body)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wraps_bare_object() {
        let record = Record::event(json!({"id": "12", "uuid": "5f1c"})).unwrap();
        assert_eq!(record.to_value(), json!({"Event": {"id": "12", "uuid": "5f1c"}}));
        assert_eq!(record.id().as_deref(), Some("12"));
        assert_eq!(record.uuid(), Some("5f1c"));
    }

    #[test]
    fn test_keeps_wrapped_object() {
        let value = json!({"Event": {"id": 12, "timestamp": "1700000000"}, "Extra": [1]});
        let record = Record::event(value.clone()).unwrap();
        assert_eq!(record.to_value(), value);
        assert_eq!(serde_json::to_value(&record).unwrap(), value);
        assert_eq!(record.id().as_deref(), Some("12"));
        assert_eq!(record.timestamp(), Some(1_700_000_000));
        assert_eq!(record.uuid(), None);
    }

    #[test]
    fn test_rejects_non_object() {
        let err = Record::galaxy_cluster(json!([1, 2])).unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[test]
    fn test_protected_flag_forms() {
        for (raw, expected) in [
            (json!(true), true),
            (json!(false), false),
            (json!(1), true),
            (json!(0), false),
            (json!("1"), true),
            (json!("0"), false),
            (json!(""), false),
            (json!(null), false),
        ] {
            let record = Record::event(json!({"protected": raw})).unwrap();
            assert_eq!(record.is_protected(), expected, "protected = {}", raw);
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(RecordKind::Event.view_path("abc"), "/events/view/abc");
        assert_eq!(RecordKind::GalaxyCluster.view_path("9"), "/galaxy_clusters/view/9");
        assert_eq!(RecordKind::Event.index_path(), "/events/index");
    }

    #[test]
    fn test_label_fallbacks() {
        assert_eq!(Record::event(json!({"uuid": "u-1", "id": 3})).unwrap().label(), "u-1");
        assert_eq!(Record::event(json!({"id": 3})).unwrap().label(), "3");
        assert_eq!(Record::event(json!({})).unwrap().label(), "?");
    }
}
