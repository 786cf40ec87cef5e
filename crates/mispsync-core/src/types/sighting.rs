//! Sightings attached to event attributes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::types::record::value_as_id;

/// Org attribution used when a sighting carries none
pub const DEFAULT_ORG_ID: &str = "0";

/// A single sighting as exchanged with peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sighting(Map<String, Value>);

impl Sighting {
    /// # Errors
    ///
    /// Returns `SyncError::Decode` if the value is not a JSON object.
    pub fn from_value(value: Value) -> SyncResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SyncError::Decode(format!(
                "Sighting must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn uuid(&self) -> Option<&str> {
        self.0.get("uuid").and_then(Value::as_str)
    }

    pub fn org_id(&self) -> Option<String> {
        self.0.get("org_id").and_then(value_as_id)
    }

    /// Give the sighting the default org attribution when it has none
    ///
    /// A `null` org counts as absent.
    pub fn ensure_org_attribution(&mut self) {
        let missing = matches!(self.0.get("org_id"), None | Some(Value::Null));
        if missing {
            self.0
                .insert("org_id".to_string(), Value::String(DEFAULT_ORG_ID.to_string()));
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Collect sightings nested under `Event.Attribute[].Sighting[]`
///
/// Entries that are not JSON objects are ignored.
pub fn sightings_from_event(event: &Value) -> Vec<Sighting> {
    let attributes = event
        .get("Event")
        .unwrap_or(event)
        .get("Attribute")
        .and_then(Value::as_array);

    let Some(attributes) = attributes else {
        return Vec::new();
    };

    attributes
        .iter()
        .filter_map(|attribute| attribute.get("Sighting").and_then(Value::as_array))
        .flatten()
        .filter_map(|s| Sighting::from_value(s.clone()).ok())
        .collect()
}
