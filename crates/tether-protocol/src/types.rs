//! Core payload types.
//!
//! A [`Payload`] is whatever a caller hands to `send` or receives from a
//! `message` listener. It starts life as text, bytes or a structured JSON
//! value, gets reshaped by the plugin chain, and is finally rendered as a
//! [`Frame`] for the underlying channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_transport::Frame;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A message at any stage of the plugin pipeline.
///
/// Plugins may change the variant as the payload passes through them: a
/// text codec turns `Value` into `Text` on the way out and back on the way
/// in, a binary codec turns `Value` into `Binary`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain text, sent as a text frame.
    Text(String),
    /// Raw bytes, sent as a binary frame.
    Binary(Vec<u8>),
    /// Structured data. Needs a codec plugin to pick its wire form; without
    /// one it is rendered as JSON text.
    Value(Value),
}

impl Payload {
    /// Builds a structured payload from any serializable value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if `value` cannot be represented
    /// as JSON (e.g. a map with non-string keys).
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        serde_json::to_value(value)
            .map(Payload::Value)
            .map_err(ProtocolError::Encode)
    }

    /// Returns the structured value, if this payload has one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the text, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a binary payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the envelope `type` discriminator of a structured payload.
    ///
    /// `None` for text, binary, non-object values, and objects whose
    /// `type` field is missing or not a string.
    pub fn type_tag(&self) -> Option<&str> {
        self.as_value()?.get("type")?.as_str()
    }

    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Binary(_) => "binary",
            Payload::Value(_) => "value",
        }
    }

    /// Renders the payload as a wire frame.
    ///
    /// A `Value` that no codec has encoded becomes compact JSON text.
    pub fn into_frame(self) -> Frame {
        match self {
            Payload::Text(text) => Frame::Text(text),
            Payload::Binary(bytes) => Frame::Binary(bytes),
            Payload::Value(value) => Frame::Text(value.to_string()),
        }
    }
}

impl From<Frame> for Payload {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Payload::Text(text),
            Frame::Binary(bytes) => Payload::Binary(bytes),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<Envelope> for Payload {
    fn from(envelope: Envelope) -> Self {
        Payload::Value(envelope.into_value())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A `type`-tagged message, the routing unit for event effects.
///
/// On the wire the tag and the fields sit side by side:
///
/// ```text
/// { "type": "user_update", "data": { "id": 1 } }
/// ```
///
/// ```rust
/// use serde_json::json;
/// use tether_protocol::{Envelope, Payload};
///
/// let payload: Payload = Envelope::new("user_update")
///     .field("data", json!({ "id": 1 }))
///     .into();
/// assert_eq!(payload.type_tag(), Some("user_update"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The routing discriminator.
    #[serde(rename = "type")]
    pub kind: String,

    /// Every other top-level field.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Adds (or replaces) a top-level field.
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Parses an envelope out of a structured payload.
    ///
    /// Returns `None` if the payload is not an object with a string `type`.
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        let object = payload.as_value()?.as_object()?;
        let kind = object.get("type")?.as_str()?.to_owned();
        let fields = object
            .iter()
            .filter(|(key, _)| key.as_str() != "type")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Self { kind, fields })
    }

    /// Flattens the envelope back into a JSON object.
    pub fn into_value(self) -> Value {
        let mut object = self.fields;
        object.insert("type".to_owned(), Value::String(self.kind));
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_type_tag_reads_string_field() {
        let payload = Payload::Value(json!({ "type": "chat", "text": "hi" }));
        assert_eq!(payload.type_tag(), Some("chat"));
    }

    #[test]
    fn test_type_tag_absent_cases() {
        assert_eq!(Payload::from("{\"type\":\"chat\"}").type_tag(), None);
        assert_eq!(Payload::Value(json!({ "data": 1 })).type_tag(), None);
        assert_eq!(Payload::Value(json!({ "type": 5 })).type_tag(), None);
        assert_eq!(Payload::Value(json!([1, 2])).type_tag(), None);
    }

    #[test]
    fn test_value_renders_as_json_text() {
        let frame = Payload::Value(json!({ "a": 1 })).into_frame();
        assert_eq!(frame, Frame::Text("{\"a\":1}".into()));
    }

    #[test]
    fn test_frame_round_trips_through_payload() {
        let payload = Payload::from(Frame::Binary(vec![9, 8]));
        assert_eq!(payload.as_bytes(), Some(&[9u8, 8][..]));
        assert_eq!(payload.into_frame(), Frame::Binary(vec![9, 8]));
    }

    #[test]
    fn test_envelope_serializes_flat() {
        let envelope = Envelope::new("user_update").field("data", json!({ "id": 1 }));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({ "type": "user_update", "data": { "id": 1 } }));
        assert_eq!(envelope.into_value(), value);
    }

    #[test]
    fn test_envelope_from_payload() {
        let payload = Payload::Value(json!({ "type": "ping", "seq": 3 }));
        let envelope = Envelope::from_payload(&payload).unwrap();
        assert_eq!(envelope.kind, "ping");
        assert_eq!(envelope.fields.get("seq"), Some(&json!(3)));
        assert!(!envelope.fields.contains_key("type"));

        assert!(Envelope::from_payload(&Payload::Value(json!({ "seq": 3 }))).is_none());
    }

    #[test]
    fn test_payload_json_from_struct() {
        #[derive(Serialize)]
        struct Move {
            row: u8,
        }
        let payload = Payload::json(&Move { row: 2 }).unwrap();
        assert_eq!(payload.as_value(), Some(&json!({ "row": 2 })));
        assert_eq!(payload.kind(), "value");
    }
}
