use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventError;

/// An event in its exported form: a single-entry map `{"<event_name>": {payload}}`.
///
/// This is what leaves an aggregate when its events are drained, what ETL
/// artifacts carry between stages and what replay consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct ExportedEvent {
    name: String,
    payload: Value,
}

impl ExportedEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Serialize an externally tagged event enum into its exported form.
    pub fn from_event<E: Serialize>(event: &E) -> Result<Self, EventError> {
        match serde_json::to_value(event)? {
            Value::Object(map) => {
                let len = map.len();
                let mut entries = map.into_iter();
                match (entries.next(), len) {
                    (Some((name, payload)), 1) => Ok(Self { name, payload }),
                    _ => Err(EventError::Malformed(len)),
                }
            }
            _ => Err(EventError::Malformed(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Parse into an externally tagged event enum.
    pub fn parse<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        let mut map = serde_json::Map::with_capacity(1);
        map.insert(self.name.clone(), self.payload.clone());
        serde_json::from_value(Value::Object(map))
    }
}

impl TryFrom<BTreeMap<String, Value>> for ExportedEvent {
    type Error = EventError;

    fn try_from(value: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let len = value.len();
        match value.into_iter().next() {
            Some((name, payload)) if len == 1 => Ok(Self { name, payload }),
            _ => Err(EventError::Malformed(len)),
        }
    }
}

impl From<ExportedEvent> for BTreeMap<String, Value> {
    fn from(value: ExportedEvent) -> Self {
        BTreeMap::from([(value.name, value.payload)])
    }
}
