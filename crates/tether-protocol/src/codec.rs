//! Codec plugins: how structured payloads become frames and back.
//!
//! Two codecs are provided:
//!
//! - [`JsonPlugin`]: text framing. Forgiving on the way in: anything that
//!   is not JSON is delivered untouched.
//! - [`SchemaPlugin`]: binary framing through a caller-supplied schema.
//!   Strict on the way in: a frame the schema cannot decode is an error.
//!
//! Both are stateless, so they behave identically on every channel a socket
//! opens over its lifetime.

use serde_json::Value;

use crate::{Inbound, Payload, Plugin, ProtocolError};

// ---------------------------------------------------------------------------
// JsonPlugin
// ---------------------------------------------------------------------------

/// Text codec: structured values go out as JSON text, JSON text comes back
/// as structured values.
///
/// | direction | input            | output                     |
/// |-----------|------------------|----------------------------|
/// | send      | `Value`          | `Text` (compact JSON)      |
/// | send      | `Text`, `Binary` | unchanged                  |
/// | message   | `Text` (JSON)    | `Value`                    |
/// | message   | `Text` (other)   | unchanged                  |
/// | message   | `Binary`         | unchanged                  |
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPlugin;

/// Creates a [`JsonPlugin`].
pub fn json_plugin() -> JsonPlugin {
    JsonPlugin
}

impl Plugin for JsonPlugin {
    fn name(&self) -> &'static str {
        "json"
    }

    fn on_send(&mut self, payload: Payload) -> Result<Payload, ProtocolError> {
        match payload {
            Payload::Value(value) => serde_json::to_string(&value)
                .map(Payload::Text)
                .map_err(ProtocolError::Encode),
            other => Ok(other),
        }
    }

    fn on_message(&mut self, payload: Payload) -> Result<Inbound, ProtocolError> {
        let payload = match payload {
            Payload::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => Payload::Value(value),
                Err(_) => Payload::Text(text),
            },
            other => other,
        };
        Ok(Inbound::Deliver(payload))
    }
}

// ---------------------------------------------------------------------------
// SchemaPlugin
// ---------------------------------------------------------------------------

/// Encodes structured values into a schema's binary layout.
pub trait SchemaEncoder: Send + 'static {
    /// Encodes `value`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::SchemaMismatch`] if `value` does not fit the
    /// schema, or a codec-specific error if encoding itself fails.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, ProtocolError>;
}

/// Decodes a schema's binary layout into structured values.
pub trait SchemaDecoder: Send + 'static {
    /// Decodes one frame.
    ///
    /// # Errors
    /// Returns a codec-specific error if `bytes` is not a valid frame.
    fn decode(&self, bytes: &[u8]) -> Result<Value, ProtocolError>;
}

/// Binary codec driven by a send schema and a receive schema.
///
/// Outbound `Value`s are encoded with the send schema into `Binary`
/// payloads. Inbound `Binary` frames are decoded with the receive schema.
/// Text passes through in both directions, which is what lets a heartbeat
/// plugin placed nearer the channel exchange plain-text probes on the same
/// connection.
pub struct SchemaPlugin<E, D> {
    encoder: E,
    decoder: D,
}

/// Creates a [`SchemaPlugin`] from a send schema and a receive schema.
pub fn schema_plugin<E, D>(encoder: E, decoder: D) -> SchemaPlugin<E, D>
where
    E: SchemaEncoder,
    D: SchemaDecoder,
{
    SchemaPlugin { encoder, decoder }
}

impl<E, D> Plugin for SchemaPlugin<E, D>
where
    E: SchemaEncoder,
    D: SchemaDecoder,
{
    fn name(&self) -> &'static str {
        "schema"
    }

    fn on_send(&mut self, payload: Payload) -> Result<Payload, ProtocolError> {
        match payload {
            Payload::Value(value) => self.encoder.encode(&value).map(Payload::Binary),
            other => Ok(other),
        }
    }

    fn on_message(&mut self, payload: Payload) -> Result<Inbound, ProtocolError> {
        match payload {
            Payload::Binary(bytes) => {
                let value = self.decoder.decode(&bytes)?;
                Ok(Inbound::Deliver(Payload::Value(value)))
            }
            other => Ok(Inbound::Deliver(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// BincodeSchema
// ---------------------------------------------------------------------------

/// A schema backed by a serde type and `bincode`.
///
/// The type `T` is the schema: values are checked against it on the way
/// out, and frames are decoded into it on the way in.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use tether_protocol::{BincodeSchema, SchemaDecoder, SchemaEncoder};
///
/// #[derive(Serialize, Deserialize)]
/// struct Ping {
///     id: u32,
/// }
///
/// let schema = BincodeSchema::<Ping>::new();
/// let bytes = schema.encode(&json!({ "id": 7 })).unwrap();
/// assert_eq!(schema.decode(&bytes).unwrap(), json!({ "id": 7 }));
/// ```
#[cfg(feature = "bincode")]
pub struct BincodeSchema<T> {
    _schema: std::marker::PhantomData<fn() -> T>,
}

#[cfg(feature = "bincode")]
impl<T> BincodeSchema<T> {
    /// Creates the schema.
    pub fn new() -> Self {
        Self {
            _schema: std::marker::PhantomData,
        }
    }
}

#[cfg(feature = "bincode")]
impl<T> Default for BincodeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "bincode")]
impl<T> SchemaEncoder for BincodeSchema<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    fn encode(&self, value: &Value) -> Result<Vec<u8>, ProtocolError> {
        let typed: T =
            serde_json::from_value(value.clone()).map_err(ProtocolError::SchemaMismatch)?;
        bincode::serialize(&typed).map_err(ProtocolError::Binary)
    }
}

#[cfg(feature = "bincode")]
impl<T> SchemaDecoder for BincodeSchema<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    fn decode(&self, bytes: &[u8]) -> Result<Value, ProtocolError> {
        let typed: T = bincode::deserialize(bytes).map_err(ProtocolError::Binary)?;
        serde_json::to_value(&typed).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_send_serializes_values_only() {
        let mut plugin = json_plugin();
        assert_eq!(
            plugin.on_send(Payload::Value(json!({ "a": [1, 2] }))).unwrap(),
            Payload::Text("{\"a\":[1,2]}".into())
        );
        assert_eq!(
            plugin.on_send(Payload::from("raw")).unwrap(),
            Payload::from("raw")
        );
        assert_eq!(
            plugin.on_send(Payload::from(vec![1u8])).unwrap(),
            Payload::from(vec![1u8])
        );
    }

    #[test]
    fn test_json_message_parses_json_text() {
        let mut plugin = json_plugin();
        let inbound = plugin.on_message(Payload::from("{\"type\":\"x\"}")).unwrap();
        assert_eq!(inbound, Inbound::Deliver(Payload::Value(json!({ "type": "x" }))));
    }

    #[test]
    fn test_json_message_passes_through_non_json() {
        let mut plugin = json_plugin();
        assert_eq!(
            plugin.on_message(Payload::from("not json {")).unwrap(),
            Inbound::Deliver(Payload::from("not json {"))
        );
        assert_eq!(
            plugin.on_message(Payload::from(vec![0xff, 0x00])).unwrap(),
            Inbound::Deliver(Payload::from(vec![0xff, 0x00]))
        );
    }

    #[cfg(feature = "bincode")]
    mod schema {
        use serde::{Deserialize, Serialize};
        use serde_json::json;

        use super::super::*;

        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Item {
            id: u32,
            label: String,
        }

        #[test]
        fn test_schema_encodes_to_bincode_layout() {
            let mut plugin = schema_plugin(BincodeSchema::<Item>::new(), BincodeSchema::<Item>::new());
            let payload = plugin
                .on_send(Payload::Value(json!({ "id": 3, "label": "c" })))
                .unwrap();

            let expected = bincode::serialize(&Item {
                id: 3,
                label: "c".into(),
            })
            .unwrap();
            assert_eq!(payload, Payload::Binary(expected));
        }

        #[test]
        fn test_schema_decodes_binary_frames() {
            let mut plugin = schema_plugin(BincodeSchema::<Item>::new(), BincodeSchema::<Item>::new());
            let bytes = bincode::serialize(&Item {
                id: 9,
                label: "z".into(),
            })
            .unwrap();

            let inbound = plugin.on_message(Payload::Binary(bytes)).unwrap();
            assert_eq!(
                inbound,
                Inbound::Deliver(Payload::Value(json!({ "id": 9, "label": "z" })))
            );
        }

        #[test]
        fn test_schema_passes_text_through() {
            let mut plugin = schema_plugin(BincodeSchema::<Item>::new(), BincodeSchema::<Item>::new());
            assert_eq!(
                plugin.on_message(Payload::from("pong")).unwrap(),
                Inbound::Deliver(Payload::from("pong"))
            );
            assert_eq!(plugin.on_send(Payload::from("ping")).unwrap(), Payload::from("ping"));
        }

        #[test]
        fn test_schema_rejects_mismatched_value() {
            let mut plugin = schema_plugin(BincodeSchema::<Item>::new(), BincodeSchema::<Item>::new());
            let err = plugin
                .on_send(Payload::Value(json!({ "id": "seven" })))
                .unwrap_err();
            assert!(matches!(err, ProtocolError::SchemaMismatch(_)));
        }

        #[test]
        fn test_schema_rejects_truncated_frame() {
            let mut plugin = schema_plugin(BincodeSchema::<Item>::new(), BincodeSchema::<Item>::new());
            let err = plugin.on_message(Payload::Binary(vec![1, 0])).unwrap_err();
            assert!(matches!(err, ProtocolError::Binary(_)));
        }
    }
}
