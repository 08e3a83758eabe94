//! Low-level protobuf wire format handling.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field occurrence is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Groups (wire types 3 and 4) are rejected.
//!
//! Decoded occurrences are collected into a [`WireJson`] document, the
//! structural intermediate form every editor and JSON operation works on.

mod document;

use crate::error::{Error, Result};
use crate::varint::{read_varint_at, write_uint64_as_varint};
use crate::MAX_FIELD_NUMBER;
use bytes::Bytes;

pub use document::{message_to_wire_json, wire_json_to_message, Occurrence, WireJson};

/// Protobuf wire types accepted by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed fields)
    Len = 2,
    /// 32-bit fixed-width
    I32 = 5,
}

impl WireType {
    /// Raw 3-bit value used in tags
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Width in bytes of one element inside a packed payload, if fixed
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            WireType::I32 => Some(4),
            WireType::I64 => Some(8),
            WireType::Varint | WireType::Len => None,
        }
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::I32),
            _ => Err(Error::UnsupportedWireType {
                wire_type: value,
                offset: 0,
            }),
        }
    }
}

/// Field number part of a tag
pub fn tag_to_field_number(tag: u64) -> u64 {
    tag >> 3
}

/// Wire type part of a tag (not validated)
pub fn tag_to_wire_type(tag: u64) -> u8 {
    (tag & 0x07) as u8
}

/// Build a tag from a field number and wire type
pub fn make_tag(number: u32, wire_type: WireType) -> u64 {
    (u64::from(number) << 3) | u64::from(wire_type.as_u8())
}

/// Check a field number against the protobuf range 1..=2^29-1
pub fn validate_field_number(number: u64) -> Result<u32> {
    if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
        return Err(Error::InvalidFieldNumber {
            number,
            max: MAX_FIELD_NUMBER,
        });
    }
    Ok(number as u32)
}

/// One decoded field payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireValue {
    /// VARINT payload, raw 64 bits
    Varint(u64),
    /// I64 payload, little-endian bit pattern
    I64(u64),
    /// LEN payload bytes
    Len(Bytes),
    /// I32 payload, little-endian bit pattern
    I32(u32),
}

impl WireValue {
    /// Wire type this payload is framed with
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Varint(_) => WireType::Varint,
            WireValue::I64(_) => WireType::I64,
            WireValue::Len(_) => WireType::Len,
            WireValue::I32(_) => WireType::I32,
        }
    }

    /// Append the payload (without tag) to `buf`
    pub fn write_payload(&self, buf: &mut Vec<u8>) {
        match self {
            WireValue::Varint(v) => write_uint64_as_varint(*v, buf),
            WireValue::I64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            WireValue::Len(data) => {
                write_uint64_as_varint(data.len() as u64, buf);
                buf.extend_from_slice(data);
            }
        }
    }
}

/// Append a full field occurrence (tag and payload) to `buf`
pub fn write_field(buf: &mut Vec<u8>, number: u32, value: &WireValue) {
    write_uint64_as_varint(make_tag(number, value.wire_type()), buf);
    value.write_payload(buf);
}

/// Iterator over the field occurrences of an encoded message.
///
/// Yields `(field_number, value)` in byte order. Stops after the first
/// error.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    position: usize,
    failed: bool,
}

impl<'a> FieldReader<'a> {
    /// Creates a reader over a complete encoded message
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            failed: false,
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.position
    }

    fn read_field(&mut self) -> Result<(u32, WireValue)> {
        let start = self.position;
        let (tag, tag_len) = read_varint_at(self.data, start)?;
        let mut offset = start + tag_len;

        let wire_type =
            WireType::try_from(tag_to_wire_type(tag)).map_err(|_| Error::UnsupportedWireType {
                wire_type: tag_to_wire_type(tag),
                offset: start,
            })?;
        let number = validate_field_number(tag_to_field_number(tag))?;

        let value = match wire_type {
            WireType::Varint => {
                let (v, len) = read_varint_at(self.data, offset)?;
                offset += len;
                WireValue::Varint(v)
            }
            WireType::I64 => {
                let v = crate::bits::read_u64_le(&self.data[offset..])
                    .ok_or_else(|| Error::malformed_message(offset, "not enough bytes for I64"))?;
                offset += 8;
                WireValue::I64(v)
            }
            WireType::I32 => {
                let v = crate::bits::read_u32_le(&self.data[offset..])
                    .ok_or_else(|| Error::malformed_message(offset, "not enough bytes for I32"))?;
                offset += 4;
                WireValue::I32(v)
            }
            WireType::Len => {
                let (length, len) = read_varint_at(self.data, offset)?;
                offset += len;
                let end = usize::try_from(length)
                    .ok()
                    .and_then(|l| offset.checked_add(l))
                    .filter(|&end| end <= self.data.len())
                    .ok_or_else(|| {
                        Error::malformed_message(
                            offset,
                            format!(
                                "not enough bytes for LEN field (need {}, have {})",
                                length,
                                self.data.len() - offset
                            ),
                        )
                    })?;
                let payload = Bytes::copy_from_slice(&self.data[offset..end]);
                offset = end;
                WireValue::Len(payload)
            }
        };

        self.position = offset;
        Ok((number, value))
    }
}

impl Iterator for FieldReader<'_> {
    type Item = Result<(u32, WireValue)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.data.len() {
            return None;
        }
        let item = self.read_field();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Split a packed payload into elements of the given wire type.
///
/// Fails with `MalformedMessage` if the payload length is not a multiple of
/// the element width or a varint runs past the end.
pub fn unpack(payload: &[u8], element: WireType) -> Result<Vec<WireValue>> {
    match element {
        WireType::Varint => {
            let mut values = Vec::new();
            let mut offset = 0;
            while offset < payload.len() {
                let (v, len) = read_varint_at(payload, offset)?;
                values.push(WireValue::Varint(v));
                offset += len;
            }
            Ok(values)
        }
        WireType::I32 => {
            if payload.len() % 4 != 0 {
                return Err(Error::malformed_message(
                    payload.len(),
                    "packed fixed32 payload length is not a multiple of 4",
                ));
            }
            Ok(payload
                .chunks_exact(4)
                .filter_map(crate::bits::read_u32_le)
                .map(WireValue::I32)
                .collect())
        }
        WireType::I64 => {
            if payload.len() % 8 != 0 {
                return Err(Error::malformed_message(
                    payload.len(),
                    "packed fixed64 payload length is not a multiple of 8",
                ));
            }
            Ok(payload
                .chunks_exact(8)
                .filter_map(crate::bits::read_u64_le)
                .map(WireValue::I64)
                .collect())
        }
        WireType::Len => Err(Error::malformed_message(
            0,
            "length-delimited values cannot be packed",
        )),
    }
}

/// Concatenate element payloads into one packed LEN value
pub fn pack<'a>(elements: impl IntoIterator<Item = &'a WireValue>) -> WireValue {
    let mut buf = Vec::new();
    for element in elements {
        element.write_payload(&mut buf);
    }
    WireValue::Len(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(1).unwrap(), WireType::I64);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(matches!(
            WireType::try_from(3),
            Err(Error::UnsupportedWireType { wire_type: 3, .. })
        ));
        assert!(WireType::try_from(4).is_err());
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_tag_parts() {
        assert_eq!(tag_to_field_number(0x08), 1);
        assert_eq!(tag_to_wire_type(0x08), 0);
        assert_eq!(tag_to_field_number(0x12), 2);
        assert_eq!(tag_to_wire_type(0x12), 2);
        assert_eq!(make_tag(1, WireType::Len), 0x0A);
        assert_eq!(make_tag(16, WireType::Varint), 0x80);
    }

    #[test]
    fn test_validate_field_number() {
        assert!(validate_field_number(0).is_err());
        assert_eq!(validate_field_number(1).unwrap(), 1);
        assert_eq!(
            validate_field_number(u64::from(MAX_FIELD_NUMBER)).unwrap(),
            MAX_FIELD_NUMBER
        );
        assert!(matches!(
            validate_field_number(u64::from(MAX_FIELD_NUMBER) + 1),
            Err(Error::InvalidFieldNumber { .. })
        ));
    }

    #[test]
    fn test_read_varint_field() {
        let data = [0x08, 0x96, 0x01];
        let fields: Vec<_> = FieldReader::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(fields, vec![(1, WireValue::Varint(150))]);
    }

    #[test]
    fn test_read_mixed_fields() {
        let data = [
            0x0A, 0x05, b'h', b'e', b'l', b'l', b'o', // 1: "hello"
            0x15, 0x01, 0x02, 0x03, 0x04, // 2: fixed32
            0x19, 0x01, 0, 0, 0, 0, 0, 0, 0, // 3: fixed64
        ];
        let fields: Vec<_> = FieldReader::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], (1, WireValue::Len(Bytes::from_static(b"hello"))));
        assert_eq!(fields[1], (2, WireValue::I32(0x0403_0201)));
        assert_eq!(fields[2], (3, WireValue::I64(1)));
    }

    #[test]
    fn test_read_truncated_len() {
        let data = [0x0A, 0x05, b'h', b'i'];
        let err = FieldReader::new(&data).next().unwrap().unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_read_truncated_fixed() {
        let data = [0x0D, 0x01, 0x02];
        assert!(FieldReader::new(&data).next().unwrap().is_err());
        let data = [0x09, 0x01];
        assert!(FieldReader::new(&data).next().unwrap().is_err());
    }

    #[test]
    fn test_read_group_rejected() {
        let data = [0x0B, 0x0C];
        let err = FieldReader::new(&data).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedWireType {
                wire_type: 3,
                offset: 0
            }
        ));
    }

    #[test]
    fn test_reader_stops_after_error() {
        let data = [0x08, 0x01, 0x00, 0x01, 0x08, 0x02];
        let mut reader = FieldReader::new(&data);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_write_field() {
        let mut buf = Vec::new();
        write_field(&mut buf, 1, &WireValue::Varint(150));
        write_field(&mut buf, 2, &WireValue::Len(Bytes::from_static(b"hi")));
        assert_eq!(buf, vec![0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_pack_and_unpack_varints() {
        let elements = vec![
            WireValue::Varint(3),
            WireValue::Varint(270),
            WireValue::Varint(86942),
        ];
        let packed = pack(&elements);
        let WireValue::Len(payload) = &packed else {
            panic!("expected LEN");
        };
        assert_eq!(payload.as_ref(), &[0x03, 0x8E, 0x02, 0x9E, 0xA7, 0x05]);
        assert_eq!(unpack(payload, WireType::Varint).unwrap(), elements);
    }

    #[test]
    fn test_unpack_fixed_width() {
        let payload = [1, 0, 0, 0, 2, 0, 0, 0];
        assert_eq!(
            unpack(&payload, WireType::I32).unwrap(),
            vec![WireValue::I32(1), WireValue::I32(2)]
        );
        assert_eq!(
            unpack(&payload, WireType::I64).unwrap(),
            vec![WireValue::I64(0x0000_0002_0000_0001)]
        );
        assert!(unpack(&payload[..6], WireType::I32).is_err());
        assert!(unpack(&[0x80], WireType::Varint).is_err());
        assert!(unpack(&payload, WireType::Len).is_err());
    }
}
