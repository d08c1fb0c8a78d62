//! Typed constructors and decoders for the reserved `iterate:*` event
//! namespaces.
//!
//! Each payload struct is paired with a `make_*` constructor that
//! produces an [`EventInput`] and a `decode` method that recovers the
//! typed payload from a stored [`Event`]. This is the event-schema
//! registry: a table of registered descriptors keyed by type-string,
//! each carrying a JSON decoder.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::{
    event::{Event, EventInput, EventType},
    offset::Offset,
};

fn event_type(s: &str) -> EventType {
    EventType::new(s).expect("registry type strings are non-empty literals")
}

fn to_payload<T: Serialize>(value: &T) -> Map<String, serde_json::Value> {
    match serde_json::to_value(value).expect("payload types are always serializable") {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn from_payload<T: for<'de> Deserialize<'de>>(event: &Event) -> Option<T> {
    serde_json::from_value(serde_json::Value::Object(event.payload.clone())).ok()
}

/// `openai | grok`, with a catch-all for forward-compatible models so
/// decoding an unfamiliar `model` value never hard-fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Openai,
    Grok,
    #[serde(untagged)]
    Other(String),
}

pub const CONFIG_SET: &str = "iterate:agent:config:set";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSet {
    pub model: ModelKind,
}

pub fn make_config_set(model: ModelKind) -> EventInput {
    EventInput::new(event_type(CONFIG_SET), to_payload(&ConfigSet { model }))
}

pub fn decode_config_set(event: &Event) -> Option<ConfigSet> {
    (event.r#type.as_str() == CONFIG_SET)
        .then(|| from_payload(event))
        .flatten()
}

pub const SEND_USER_MESSAGE: &str = "iterate:agent:action:send-user-message:called";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendUserMessage {
    pub content: String,
}

pub fn make_send_user_message(content: impl Into<String>) -> EventInput {
    EventInput::new(
        event_type(SEND_USER_MESSAGE),
        to_payload(&SendUserMessage {
            content: content.into(),
        }),
    )
}

pub fn decode_send_user_message(event: &Event) -> Option<SendUserMessage> {
    (event.r#type.as_str() == SEND_USER_MESSAGE)
        .then(|| from_payload(event))
        .flatten()
}

pub const SEND_USER_AUDIO: &str = "iterate:agent:action:send-user-audio:called";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendUserAudio {
    pub audio: String,
}

pub fn make_send_user_audio(audio_base64: impl Into<String>) -> EventInput {
    EventInput::new(
        event_type(SEND_USER_AUDIO),
        to_payload(&SendUserAudio {
            audio: audio_base64.into(),
        }),
    )
}

pub const REQUEST_STARTED: &str = "iterate:llm-loop:request-started";

pub fn make_request_started() -> EventInput {
    EventInput::new(event_type(REQUEST_STARTED), Map::new())
}

pub const RESPONSE_SSE: &str = "iterate:llm-loop:response:sse";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSse {
    pub part: serde_json::Value,
    #[serde(rename = "requestOffset")]
    pub request_offset: Offset,
}

pub fn make_response_sse(part: serde_json::Value, request_offset: Offset) -> EventInput {
    EventInput::new(
        event_type(RESPONSE_SSE),
        to_payload(&ResponseSse {
            part,
            request_offset,
        }),
    )
}

pub const REQUEST_ENDED: &str = "iterate:llm-loop:request-ended";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnded {
    #[serde(rename = "requestOffset")]
    pub request_offset: Offset,
}

pub fn make_request_ended(request_offset: Offset) -> EventInput {
    EventInput::new(
        event_type(REQUEST_ENDED),
        to_payload(&RequestEnded { request_offset }),
    )
}

pub const REQUEST_CANCELLED: &str = "iterate:llm-loop:request-cancelled";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCancelled {
    #[serde(rename = "requestOffset")]
    pub request_offset: Offset,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

pub fn make_request_cancelled(
    request_offset: Offset,
    reason: impl Into<String>,
    message: Option<String>,
) -> EventInput {
    EventInput::new(
        event_type(REQUEST_CANCELLED),
        to_payload(&RequestCancelled {
            request_offset,
            reason: reason.into(),
            message,
        }),
    )
}

pub const REQUEST_INTERRUPTED: &str = "iterate:llm-loop:request-interrupted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInterrupted {
    #[serde(rename = "requestOffset")]
    pub request_offset: Option<Offset>,
}

pub fn make_request_interrupted(request_offset: Option<Offset>) -> EventInput {
    EventInput::new(
        event_type(REQUEST_INTERRUPTED),
        to_payload(&RequestInterrupted { request_offset }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_set_roundtrips() {
        let input = make_config_set(ModelKind::Openai);
        assert_eq!(input.r#type.as_str(), CONFIG_SET);
        assert_eq!(input.payload["model"], "openai");
    }

    #[test]
    fn request_interrupted_omits_null_by_default_shape() {
        let input = make_request_interrupted(None);
        assert!(input.payload.contains_key("requestOffset"));
        assert!(input.payload["requestOffset"].is_null());
    }

    #[test]
    fn request_cancelled_carries_reason_and_offset() {
        let input = make_request_cancelled(Offset::from_u64(3), "interrupted", None);
        assert_eq!(input.payload["reason"], "interrupted");
        assert_eq!(input.payload["requestOffset"], "0000000000000003");
        assert!(!input.payload.contains_key("message"));
    }
}
