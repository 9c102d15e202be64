//! Payloads and the plugin pipeline for Tether.
//!
//! This crate defines what travels between a caller and the underlying
//! channel, and how it is reshaped on the way:
//!
//! - **Types** ([`Payload`], [`Envelope`]): the values callers send and
//!   receive.
//! - **Plugins** ([`Plugin`] trait, [`PluginChain`], [`PluginLink`]): the
//!   ordered, reversible transform pipeline.
//! - **Codecs** ([`JsonPlugin`], [`SchemaPlugin`]): built-in plugins that
//!   pick a wire form for structured values.
//! - **Errors** ([`ProtocolError`]): what can go wrong while transforming.
//!
//! # Architecture
//!
//! The protocol layer sits between the caller and the transport. It does not
//! know about reconnects or timers; it only knows how to turn payloads into
//! frames and back.
//!
//! ```text
//! Caller (Payload) → Plugin chain → Transport (Frame)
//! ```
//!
//! # Feature Flags
//!
//! - `bincode` (default): [`BincodeSchema`], a schema backed by a serde type

mod codec;
mod error;
mod plugin;
mod types;

#[cfg(feature = "bincode")]
pub use codec::BincodeSchema;
pub use codec::{json_plugin, schema_plugin, JsonPlugin, SchemaDecoder, SchemaEncoder, SchemaPlugin};
pub use error::ProtocolError;
pub use plugin::{Inbound, LinkCommand, Plugin, PluginChain, PluginLink};
pub use types::{Envelope, Payload};
