//! Protobuf scalar types as unit structs.
//!
//! Each protobuf field type has a marker implementing [`ProtoType`], which
//! fixes its wire type and how a Rust value maps to and from a
//! [`WireValue`]. The editor operations are generic over these markers.

use crate::bits;
use crate::error::{Error, Result};
use crate::wire::{WireType, WireValue};
use bytes::Bytes;

/// A protobuf field type the editor can read and write
pub trait ProtoType {
    /// Rust representation of one element
    type Value: Clone;

    /// Protobuf type name, as used in `.proto` files
    const NAME: &'static str;

    /// Wire type of a single unpacked element
    const WIRE_TYPE: WireType;

    /// Encode one element as a wire payload
    fn encode(value: &Self::Value) -> WireValue;

    /// Decode one element payload already known to have [`Self::WIRE_TYPE`].
    ///
    /// `Ok(None)` is the missing value (NaN and infinities for floats).
    fn decode_payload(number: u32, value: &WireValue) -> Result<Option<Self::Value>>;

    /// Whether repeated fields of this type may use packed encoding
    fn packable() -> bool {
        Self::WIRE_TYPE != WireType::Len
    }

    /// Decode one element payload, checking its wire type
    fn decode(number: u32, value: &WireValue) -> Result<Option<Self::Value>> {
        if value.wire_type() != Self::WIRE_TYPE {
            return Err(Error::WireTypeMismatch {
                number,
                expected: Self::WIRE_TYPE,
                actual: value.wire_type(),
            });
        }
        Self::decode_payload(number, value)
    }
}

fn varint(value: &WireValue) -> u64 {
    match value {
        WireValue::Varint(v) | WireValue::I64(v) => *v,
        WireValue::I32(v) => u64::from(*v),
        WireValue::Len(_) => 0,
    }
}

fn fixed32(value: &WireValue) -> u32 {
    match value {
        WireValue::I32(v) => *v,
        other => varint(other) as u32,
    }
}

macro_rules! varint_type {
    ($(#[$doc:meta])* $name:ident, $proto:literal, $value:ty, |$e:ident| $encode:expr, |$d:ident| $decode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ProtoType for $name {
            type Value = $value;
            const NAME: &'static str = $proto;
            const WIRE_TYPE: WireType = WireType::Varint;

            fn encode($e: &$value) -> WireValue {
                WireValue::Varint($encode)
            }

            fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<$value>> {
                let $d = varint(value);
                Ok(Some($decode))
            }
        }
    };
}

varint_type!(
    /// `int32`: negative values are sign-extended to ten bytes
    Int32, "int32", i32, |v| i64::from(*v) as u64, |raw| raw as i32
);
varint_type!(
    /// `int64`
    Int64, "int64", i64, |v| bits::reinterpret_int64_as_uint64(*v), |raw| bits::reinterpret_uint64_as_int64(raw)
);
varint_type!(
    /// `uint32`
    UInt32, "uint32", u32, |v| u64::from(*v), |raw| raw as u32
);
varint_type!(
    /// `uint64`
    UInt64, "uint64", u64, |v| *v, |raw| raw
);
varint_type!(
    /// `sint32`: ZigZag
    SInt32, "sint32", i32, |v| u64::from(bits::reinterpret_sint32_as_uint32(*v)), |raw| bits::reinterpret_uint32_as_sint32(raw as u32)
);
varint_type!(
    /// `sint64`: ZigZag
    SInt64, "sint64", i64, |v| bits::reinterpret_sint64_as_uint64(*v), |raw| bits::reinterpret_uint64_as_sint64(raw)
);
varint_type!(
    /// `bool`: any non-zero varint reads as true
    Bool, "bool", bool, |v| u64::from(*v), |raw| raw != 0
);
varint_type!(
    /// `enum`: the numeric value, int32 semantics
    Enum, "enum", i32, |v| i64::from(*v) as u64, |raw| raw as i32
);

/// `fixed32`
#[derive(Debug, Clone, Copy)]
pub struct Fixed32;

impl ProtoType for Fixed32 {
    type Value = u32;
    const NAME: &'static str = "fixed32";
    const WIRE_TYPE: WireType = WireType::I32;

    fn encode(value: &u32) -> WireValue {
        WireValue::I32(*value)
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<u32>> {
        Ok(Some(fixed32(value)))
    }
}

/// `sfixed32`
#[derive(Debug, Clone, Copy)]
pub struct SFixed32;

impl ProtoType for SFixed32 {
    type Value = i32;
    const NAME: &'static str = "sfixed32";
    const WIRE_TYPE: WireType = WireType::I32;

    fn encode(value: &i32) -> WireValue {
        WireValue::I32(bits::reinterpret_int32_as_uint32(*value))
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<i32>> {
        Ok(Some(bits::reinterpret_uint32_as_int32(fixed32(value))))
    }
}

/// `float`: NaN and infinities read as missing
#[derive(Debug, Clone, Copy)]
pub struct Float;

impl ProtoType for Float {
    type Value = f32;
    const NAME: &'static str = "float";
    const WIRE_TYPE: WireType = WireType::I32;

    fn encode(value: &f32) -> WireValue {
        WireValue::I32(bits::reinterpret_float_as_uint32(*value))
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<f32>> {
        Ok(bits::reinterpret_uint32_as_float(fixed32(value)))
    }
}

/// `fixed64`
#[derive(Debug, Clone, Copy)]
pub struct Fixed64;

impl ProtoType for Fixed64 {
    type Value = u64;
    const NAME: &'static str = "fixed64";
    const WIRE_TYPE: WireType = WireType::I64;

    fn encode(value: &u64) -> WireValue {
        WireValue::I64(*value)
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<u64>> {
        Ok(Some(varint(value)))
    }
}

/// `sfixed64`
#[derive(Debug, Clone, Copy)]
pub struct SFixed64;

impl ProtoType for SFixed64 {
    type Value = i64;
    const NAME: &'static str = "sfixed64";
    const WIRE_TYPE: WireType = WireType::I64;

    fn encode(value: &i64) -> WireValue {
        WireValue::I64(bits::reinterpret_int64_as_uint64(*value))
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<i64>> {
        Ok(Some(bits::reinterpret_uint64_as_int64(varint(value))))
    }
}

/// `double`: NaN and infinities read as missing
#[derive(Debug, Clone, Copy)]
pub struct Double;

impl ProtoType for Double {
    type Value = f64;
    const NAME: &'static str = "double";
    const WIRE_TYPE: WireType = WireType::I64;

    fn encode(value: &f64) -> WireValue {
        WireValue::I64(bits::reinterpret_double_as_uint64(*value))
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<f64>> {
        Ok(bits::reinterpret_uint64_as_double(varint(value)))
    }
}

fn len_payload(value: &WireValue) -> Bytes {
    match value {
        WireValue::Len(data) => data.clone(),
        _ => Bytes::new(),
    }
}

/// `string`: payload must be UTF-8
#[derive(Debug, Clone, Copy)]
pub struct Str;

impl ProtoType for Str {
    type Value = String;
    const NAME: &'static str = "string";
    const WIRE_TYPE: WireType = WireType::Len;

    fn encode(value: &String) -> WireValue {
        WireValue::Len(Bytes::copy_from_slice(value.as_bytes()))
    }

    fn decode_payload(number: u32, value: &WireValue) -> Result<Option<String>> {
        String::from_utf8(len_payload(value).to_vec())
            .map(Some)
            .map_err(|_| Error::InvalidUtf8 { number })
    }
}

/// `bytes`
#[derive(Debug, Clone, Copy)]
pub struct Blob;

impl ProtoType for Blob {
    type Value = Bytes;
    const NAME: &'static str = "bytes";
    const WIRE_TYPE: WireType = WireType::Len;

    fn encode(value: &Bytes) -> WireValue {
        WireValue::Len(value.clone())
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<Bytes>> {
        Ok(Some(len_payload(value)))
    }
}

/// Embedded message, as its encoded bytes
#[derive(Debug, Clone, Copy)]
pub struct Message;

impl ProtoType for Message {
    type Value = Bytes;
    const NAME: &'static str = "message";
    const WIRE_TYPE: WireType = WireType::Len;

    fn encode(value: &Bytes) -> WireValue {
        WireValue::Len(value.clone())
    }

    fn decode_payload(_number: u32, value: &WireValue) -> Result<Option<Bytes>> {
        Ok(Some(len_payload(value)))
    }
}
