//! Error types for the pbt-core library.
//!
//! Every operation in the crate either succeeds with a fresh value or fails
//! with one of these variants; there is no partial success.

use crate::wire::WireType;
use thiserror::Error;

/// Result type alias for pbt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all pbt operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Varint ran past the end of the input or past 10 bytes
    #[error("malformed varint at offset {offset}: truncated or longer than 10 bytes")]
    MalformedVarint {
        /// Byte offset where the varint started
        offset: usize,
    },

    /// Truncated or otherwise invalid byte stream
    #[error("malformed protobuf message at offset {offset}: {details}")]
    MalformedMessage {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Wire type outside {0, 1, 2, 5}
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType {
        /// The raw 3-bit wire type
        wire_type: u8,
        /// Byte offset of the offending tag
        offset: usize,
    },

    /// Field number outside 1..=2^29-1
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u64,
        /// Maximum valid field number
        max: u32,
    },

    /// Repeated-field index outside the logical element sequence
    #[error("index {index} out of range for field {number} with {count} element(s)")]
    IndexOutOfRange {
        /// Field number being addressed
        number: u32,
        /// Requested index
        index: i64,
        /// Number of logical elements present
        count: usize,
    },

    /// Stored occurrence cannot carry the requested protobuf type
    #[error("field {number} holds wire type {actual:?}, expected {expected:?}")]
    WireTypeMismatch {
        /// Field number being read
        number: u32,
        /// Wire type the requested type uses
        expected: WireType,
        /// Wire type actually stored
        actual: WireType,
    },

    /// Structurally invalid wire_json document
    #[error("invalid wire_json document: {0}")]
    InvalidWireJson(String),

    /// No descriptor set registered under the given name
    #[error("unknown descriptor set '{name}'")]
    UnknownDescriptorSet {
        /// Name the caller asked for
        name: String,
    },

    /// Message or enum type not present in the descriptor set
    #[error("unknown type '{name}'")]
    UnknownType {
        /// Fully-qualified type name
        name: String,
    },

    /// Field not declared on the message type
    #[error("unknown field '{field}' in message '{message}'")]
    UnknownField {
        /// Fully-qualified message name
        message: String,
        /// Field number or name as given
        field: String,
    },

    /// Enum value name not declared on the enum type
    #[error("unknown value '{value}' for enum '{enum_name}'")]
    UnknownEnumName {
        /// Fully-qualified enum name
        enum_name: String,
        /// The unresolvable value name
        value: String,
    },

    /// Map field declared with a key type protobuf does not allow
    #[error("map field '{field}' has invalid key type {key_type}")]
    InvalidMapKeyType {
        /// Fully-qualified field name
        field: String,
        /// Name of the offending key type
        key_type: String,
    },

    /// JSON literal that cannot be converted for the target field
    #[error("invalid JSON at '{path}': {details}")]
    InvalidJson {
        /// Location inside the input document
        path: String,
        /// Detailed description of the issue
        details: String,
    },

    /// String field whose bytes are not valid UTF-8
    #[error("field {number} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field number being read
        number: u32,
    },

    /// Nesting deeper than the configured limit
    #[error("nesting depth exceeds limit of {limit}")]
    RecursionLimit {
        /// Configured limit
        limit: usize,
    },

    /// Failed to parse FileDescriptorSet
    #[error("failed to parse FileDescriptorSet: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to build the descriptor pool with prost-reflect
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// JSON text could not be parsed
    #[error("JSON syntax error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a new malformed message error
    pub fn malformed_message(offset: usize, details: impl Into<String>) -> Self {
        Self::MalformedMessage {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new malformed varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new index error
    pub fn index_out_of_range(number: u32, index: i64, count: usize) -> Self {
        Self::IndexOutOfRange {
            number,
            index,
            count,
        }
    }

    /// Creates a new wire_json structure error
    pub fn invalid_wire_json(msg: impl Into<String>) -> Self {
        Self::InvalidWireJson(msg.into())
    }

    /// Creates a new unknown type error
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates a new unknown field error
    pub fn unknown_field(message: impl Into<String>, field: impl ToString) -> Self {
        Self::UnknownField {
            message: message.into(),
            field: field.to_string(),
        }
    }

    /// Creates a new JSON conversion error
    pub fn invalid_json(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidJson {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Returns true for failures caused by the input bytes rather than the schema
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedVarint { .. }
                | Self::MalformedMessage { .. }
                | Self::UnsupportedWireType { .. }
        )
    }

    /// Returns true for failures in descriptor lookup
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownDescriptorSet { .. }
                | Self::UnknownType { .. }
                | Self::UnknownField { .. }
                | Self::UnknownEnumName { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::index_out_of_range(3, -1, 2);
        assert!(err.to_string().contains("index -1"));
        assert!(err.to_string().contains("field 3"));

        let err = Error::unknown_field("pkg.Msg", 7);
        assert_eq!(err.to_string(), "unknown field '7' in message 'pkg.Msg'");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::malformed_varint(0).is_malformed_input());
        assert!(!Error::unknown_type("x").is_malformed_input());
        assert!(Error::unknown_type("x").is_resolution_error());
        assert!(!Error::invalid_wire_json("x").is_resolution_error());
    }
}
