//! # pbt-core
//!
//! A library for reading, editing and converting Protocol Buffer messages
//! without generated code.
//!
//! This crate provides the core functionality for:
//! - Decoding and encoding the protobuf wire format
//! - Typed, order-preserving edits on the wire_json intermediate form
//! - Resolving message, enum and field metadata from descriptor sets
//! - Converting between messages and canonical protobuf JSON
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`bits`]: Two's complement, ZigZag and IEEE-754 reinterpretation
//! - [`varint`]: LEB128 varint codec
//! - [`wire`]: Tags, field iteration, packing and the [`WireJson`] document
//! - [`editor`]: Typed get/set/insert/remove over [`WireJson`]
//! - [`descriptor`]: The [`DescriptorStore`] and field resolution
//! - [`json`]: Canonical JSON and number JSON
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use pbt_core::{json, DescriptorStore, JsonOptions, WireJson};
//! use pbt_core::editor::types::Int32;
//!
//! let doc = WireJson::from_message(&[0x08, 0x96, 0x01])?;
//! assert_eq!(doc.get_field::<Int32>(1)?, Some(150));
//!
//! let mut store = DescriptorStore::new();
//! store.load("app", &std::fs::read("app.desc")?)?;
//! let value = json::wire_json_to_json(&store, "app", "app.Counter", &doc, &JsonOptions::new())?;
//! println!("{}", value);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod bits;
pub mod descriptor;
pub mod editor;
pub mod error;
pub mod json;
pub mod varint;
pub mod wire;

// Re-export primary types for convenience
pub use descriptor::{DescriptorStore, FieldInfo, FieldKind, FieldRef, Label, ScalarKind};
pub use editor::ProtoType;
pub use error::{Error, Result};
pub use json::{JsonOptions, KeyStyle};
pub use wire::{message_to_wire_json, wire_json_to_message, Occurrence, WireJson, WireType, WireValue};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
