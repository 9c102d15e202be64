//! Error types for the protocol layer.
//!
//! Each crate in Tether defines its own error enum. A `ProtocolError` always
//! means a payload could not be transformed by a plugin; it never means the
//! connection itself is in trouble.

/// Errors that can occur while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A structured value does not have the shape a schema expects.
    ///
    /// Raised by schema codecs before any bytes are produced, e.g. when
    /// `{"id": "seven"}` is sent through a schema whose `id` is a `u32`.
    #[error("value does not match schema: {0}")]
    SchemaMismatch(serde_json::Error),

    /// The binary codec rejected the value or the bytes.
    #[cfg(feature = "bincode")]
    #[error("binary codec failed: {0}")]
    Binary(bincode::Error),

    /// The payload is invalid for the plugin that received it.
    ///
    /// For plugins written outside this crate, e.g. one that only accepts
    /// text. The built-in codecs pass payloads they do not handle through
    /// instead.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A plugin in a chain failed. Carries the plugin's name so logs point
    /// at the culprit.
    #[error("plugin `{plugin}` failed: {source}")]
    Plugin {
        plugin: &'static str,
        #[source]
        source: Box<ProtocolError>,
    },
}
