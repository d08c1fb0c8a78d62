//! Event input/output types and the JSON wire codec.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{offset::Offset, path::StreamPath, trace::TraceContext};

/// A non-empty, namespaced event type string, e.g.
/// `iterate:llm-loop:request-ended`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

#[derive(Debug, thiserror::Error)]
#[error("event type must not be empty")]
pub struct EmptyEventType;

impl EventType {
    pub fn new(s: impl Into<String>) -> Result<Self, EmptyEventType> {
        let s = s.into();
        if s.is_empty() {
            return Err(EmptyEventType);
        }
        Ok(EventType(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EventType {
    type Error = EmptyEventType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EventType::new(value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}

/// A short decimal version string; absent in input decodes to `"1"`.
///
/// Accepts either a JSON string or a JSON number on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version(String);

impl Default for Version {
    fn default() -> Self {
        Version("1".to_string())
    }
}

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Num(serde_json::Number),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Str(s) => Ok(Version(s)),
            Repr::Num(n) => Ok(Version(n.to_string())),
        }
    }
}

/// Caller-supplied event payload, decoded from the `POST` body.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub r#type: EventType,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub version: Version,
}

impl EventInput {
    pub fn new(r#type: EventType, payload: Map<String, Value>) -> Self {
        EventInput {
            r#type,
            payload,
            version: Version::default(),
        }
    }
}

/// A persisted event: `EventInput` plus the fields assigned at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub r#type: EventType,
    pub payload: Map<String, Value>,
    pub version: Version,
    pub path: StreamPath,
    pub offset: Offset,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub trace: TraceContext,
}

impl Event {
    pub fn from_input(
        input: EventInput,
        path: StreamPath,
        offset: Offset,
        created_at: DateTime<Utc>,
        trace: TraceContext,
    ) -> Self {
        Event {
            r#type: input.r#type,
            payload: input.payload,
            version: input.version,
            path,
            offset,
            created_at,
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_defaults_to_one_when_absent() {
        let input: EventInput =
            serde_json::from_value(serde_json::json!({"type": "t", "payload": {"n": 1}}))
                .unwrap();
        assert_eq!(input.version.as_str(), "1");
    }

    #[test]
    fn version_decodes_from_string_or_number() {
        let from_str: EventInput =
            serde_json::from_value(serde_json::json!({"type": "t", "payload": {}, "version": "2"}))
                .unwrap();
        assert_eq!(from_str.version.as_str(), "2");

        let from_num: EventInput =
            serde_json::from_value(serde_json::json!({"type": "t", "payload": {}, "version": 2}))
                .unwrap();
        assert_eq!(from_num.version.as_str(), "2");
    }

    #[test]
    fn event_wire_shape_matches_spec() {
        let input = EventInput::new(
            EventType::new("t").unwrap(),
            Map::from_iter([("n".to_string(), Value::from(1))]),
        );
        let event = Event::from_input(
            input,
            StreamPath::new("test/read").unwrap(),
            Offset::zero(),
            "2025-01-07T14:03:22.119Z".parse().unwrap(),
            TraceContext::synthesize(0),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "t");
        assert_eq!(json["offset"], "0000000000000000");
        assert_eq!(json["path"], "test/read");
        assert!(json["trace"]["traceId"].is_string());
    }
}
