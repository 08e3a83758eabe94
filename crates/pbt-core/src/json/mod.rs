//! Canonical protobuf JSON and number JSON.
//!
//! Conversion runs between wire_json documents (or raw message bytes) and
//! `serde_json` values, driven by a message type from a [`DescriptorStore`].
//! [`KeyStyle::JsonName`] produces the canonical mapping; [`KeyStyle::FieldNumber`]
//! keys objects by field number and is otherwise identical.

mod parse;
mod print;
mod well_known;

use crate::descriptor::{resolve_message, DescriptorStore};
use crate::error::Result;
use crate::wire::{WireJson, WireType};
use prost_reflect::Kind;
use serde_json::Value;
use tracing::debug;

use parse::Parser;
use print::Printer;

/// Default nesting limit for messages and `Struct` values
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// How JSON object keys name fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStyle {
    /// lowerCamelCase JSON names from the descriptor
    #[default]
    JsonName,
    /// Decimal field numbers
    FieldNumber,
}

/// Options for JSON conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonOptions {
    /// Print implicit-presence fields even when they hold their default
    pub emit_default_values: bool,
    /// Object key naming
    pub key_style: KeyStyle,
    /// Maximum nesting depth
    pub max_depth: usize,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            emit_default_values: false,
            key_style: KeyStyle::JsonName,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl JsonOptions {
    /// Canonical JSON defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Number JSON defaults
    pub fn numbers() -> Self {
        Self::default().key_style(KeyStyle::FieldNumber)
    }

    /// Set whether default values are printed
    pub fn emit_default_values(mut self, emit: bool) -> Self {
        self.emit_default_values = emit;
        self
    }

    /// Set the key style
    pub fn key_style(mut self, style: KeyStyle) -> Self {
        self.key_style = style;
        self
    }

    /// Set the nesting limit
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Convert encoded message bytes to JSON
pub fn message_to_json(
    store: &DescriptorStore,
    set: &str,
    type_name: &str,
    data: &[u8],
    options: &JsonOptions,
) -> Result<Value> {
    let doc = WireJson::from_message(data)?;
    wire_json_to_json(store, set, type_name, &doc, options)
}

/// Convert a wire_json document to JSON
pub fn wire_json_to_json(
    store: &DescriptorStore,
    set: &str,
    type_name: &str,
    doc: &WireJson,
    options: &JsonOptions,
) -> Result<Value> {
    let pool = store.pool(set)?;
    let descriptor = resolve_message(pool, type_name)?;
    debug!("printing {} as {:?} JSON", descriptor.full_name(), options.key_style);
    Printer::new(pool, options).message(&descriptor, doc, 0)
}

/// Convert JSON to a wire_json document.
///
/// Keys that name no field of the type are dropped.
pub fn json_to_wire_json(
    store: &DescriptorStore,
    set: &str,
    type_name: &str,
    json: &Value,
    options: &JsonOptions,
) -> Result<WireJson> {
    let pool = store.pool(set)?;
    let descriptor = resolve_message(pool, type_name)?;
    debug!("parsing JSON as {}", descriptor.full_name());
    Parser::new(pool, options).message(&descriptor, json, "$", 0)
}

/// Convert JSON to encoded message bytes
pub fn json_to_message(
    store: &DescriptorStore,
    set: &str,
    type_name: &str,
    json: &Value,
    options: &JsonOptions,
) -> Result<Vec<u8>> {
    Ok(json_to_wire_json(store, set, type_name, json, options)?.to_message())
}

/// Wire type of one unpacked element of `kind`
pub(crate) fn wire_type_of(kind: &Kind) -> WireType {
    match kind {
        Kind::Double | Kind::Fixed64 | Kind::Sfixed64 => WireType::I64,
        Kind::Float | Kind::Fixed32 | Kind::Sfixed32 => WireType::I32,
        Kind::String | Kind::Bytes | Kind::Message(_) => WireType::Len,
        _ => WireType::Varint,
    }
}
