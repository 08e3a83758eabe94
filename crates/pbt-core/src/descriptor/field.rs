//! Resolved field metadata.

use crate::error::{Error, Result};
use crate::wire::WireType;
use prost_reflect::{Cardinality, FieldDescriptor, Kind};
use std::fmt;

/// Protobuf scalar field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `sint32`
    SInt32,
    /// `sint64`
    SInt64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    SFixed32,
    /// `sfixed64`
    SFixed64,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
}

impl ScalarKind {
    /// Scalar kind of a prost-reflect kind, `None` for enums and messages
    pub fn from_kind(kind: &Kind) -> Option<Self> {
        Some(match kind {
            Kind::Double => Self::Double,
            Kind::Float => Self::Float,
            Kind::Int32 => Self::Int32,
            Kind::Int64 => Self::Int64,
            Kind::Uint32 => Self::UInt32,
            Kind::Uint64 => Self::UInt64,
            Kind::Sint32 => Self::SInt32,
            Kind::Sint64 => Self::SInt64,
            Kind::Fixed32 => Self::Fixed32,
            Kind::Fixed64 => Self::Fixed64,
            Kind::Sfixed32 => Self::SFixed32,
            Kind::Sfixed64 => Self::SFixed64,
            Kind::Bool => Self::Bool,
            Kind::String => Self::String,
            Kind::Bytes => Self::Bytes,
            Kind::Message(_) | Kind::Enum(_) => return None,
        })
    }

    /// Wire type of one unpacked element
    pub fn wire_type(self) -> WireType {
        match self {
            Self::Double | Self::Fixed64 | Self::SFixed64 => WireType::I64,
            Self::Float | Self::Fixed32 | Self::SFixed32 => WireType::I32,
            Self::String | Self::Bytes => WireType::Len,
            _ => WireType::Varint,
        }
    }

    /// Protobuf type name
    pub fn name(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::SInt32 => "sint32",
            Self::SInt64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::SFixed32 => "sfixed32",
            Self::SFixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Whether protobuf allows this type as a map key
    pub fn is_valid_map_key(self) -> bool {
        !matches!(self, Self::Double | Self::Float | Self::Bytes)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field type, as a tagged union over what a field can hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Scalar value
    Scalar(ScalarKind),
    /// Enum, by fully-qualified name
    Enum(String),
    /// Embedded message, by fully-qualified name
    Message(String),
    /// Map field (a repeated synthetic entry message with `key` = 1, `value` = 2)
    Map {
        /// Key type
        key: ScalarKind,
        /// Value type
        value: Box<FieldKind>,
    },
}

impl FieldKind {
    fn from_kind(kind: &Kind) -> Self {
        match kind {
            Kind::Enum(e) => Self::Enum(e.full_name().to_string()),
            Kind::Message(m) => Self::Message(m.full_name().to_string()),
            // from_kind only returns None for the two arms above
            scalar => Self::Scalar(ScalarKind::from_kind(scalar).unwrap_or(ScalarKind::Bytes)),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{}", s),
            Self::Enum(name) | Self::Message(name) => write!(f, "{}", name),
            Self::Map { key, value } => write!(f, "map<{}, {}>", key, value),
        }
    }
}

/// Field label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Singular field
    Optional,
    /// Proto2 required field
    Required,
    /// Repeated field (including maps)
    Repeated,
}

impl Label {
    /// Label keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Required => "required",
            Label::Repeated => "repeated",
        }
    }
}

/// Resolved metadata of one message field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field number
    pub number: u32,
    /// Declared name
    pub name: String,
    /// JSON name (explicit `json_name` or lowerCamelCase of the name)
    pub json_name: String,
    /// Field type
    pub kind: FieldKind,
    /// Field label
    pub label: Label,
    /// Index of the containing oneof declaration, synthetic ones included
    pub oneof_index: Option<u32>,
    /// True for map fields
    pub is_map: bool,
    /// True for proto3 `optional` fields
    pub proto3_optional: bool,
    /// Schema packing default (informational; writes take an explicit flag)
    pub packed: bool,
}

impl FieldInfo {
    /// Build from a prost-reflect field descriptor.
    ///
    /// Fails with `InvalidMapKeyType` for map fields whose key protobuf does
    /// not allow.
    pub fn from_descriptor(field: &FieldDescriptor) -> Result<Self> {
        let proto = field.field_descriptor_proto();
        let kind = match field.kind() {
            Kind::Message(entry) if field.is_map() => {
                let key_kind = entry.map_entry_key_field().kind();
                let key = ScalarKind::from_kind(&key_kind)
                    .filter(|k| k.is_valid_map_key())
                    .ok_or_else(|| Error::InvalidMapKeyType {
                        field: field.full_name().to_string(),
                        key_type: FieldKind::from_kind(&key_kind).to_string(),
                    })?;
                FieldKind::Map {
                    key,
                    value: Box::new(FieldKind::from_kind(&entry.map_entry_value_field().kind())),
                }
            }
            other => FieldKind::from_kind(&other),
        };

        Ok(Self {
            number: field.number(),
            name: field.name().to_string(),
            json_name: field.json_name().to_string(),
            kind,
            label: match field.cardinality() {
                Cardinality::Optional => Label::Optional,
                Cardinality::Required => Label::Required,
                Cardinality::Repeated => Label::Repeated,
            },
            oneof_index: proto.oneof_index.and_then(|i| u32::try_from(i).ok()),
            is_map: field.is_map(),
            proto3_optional: proto.proto3_optional(),
            packed: field.is_packed(),
        })
    }

    /// Member of a real (non-synthetic) oneof
    pub fn in_real_oneof(&self) -> bool {
        self.oneof_index.is_some() && !self.proto3_optional
    }
}

impl fmt::Display for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_map {
            write!(f, "{} ", self.label.as_str())?;
        }
        write!(f, "{} {} = {}", self.kind, self.name, self.number)?;
        if let Some(index) = self.oneof_index.filter(|_| !self.proto3_optional) {
            write!(f, " (oneof #{})", index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_wire_types() {
        assert_eq!(ScalarKind::Double.wire_type(), WireType::I64);
        assert_eq!(ScalarKind::SFixed32.wire_type(), WireType::I32);
        assert_eq!(ScalarKind::SInt64.wire_type(), WireType::Varint);
        assert_eq!(ScalarKind::Bool.wire_type(), WireType::Varint);
        assert_eq!(ScalarKind::Bytes.wire_type(), WireType::Len);
    }

    #[test]
    fn test_map_key_validity() {
        assert!(ScalarKind::String.is_valid_map_key());
        assert!(ScalarKind::SFixed64.is_valid_map_key());
        assert!(ScalarKind::Bool.is_valid_map_key());
        assert!(!ScalarKind::Double.is_valid_map_key());
        assert!(!ScalarKind::Float.is_valid_map_key());
        assert!(!ScalarKind::Bytes.is_valid_map_key());
    }

    #[test]
    fn test_kind_display() {
        let kind = FieldKind::Map {
            key: ScalarKind::String,
            value: Box::new(FieldKind::Message("pkg.Item".to_string())),
        };
        assert_eq!(kind.to_string(), "map<string, pkg.Item>");
    }
}
