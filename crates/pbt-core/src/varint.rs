//! LEB128 varint encoding as used by protobuf.
//!
//! Seven payload bits per byte, least significant group first, high bit set
//! on every byte except the last. A 64-bit value needs at most 10 bytes; the
//! tenth byte may only contribute bit 63, any higher bits are masked off the
//! same way reference decoders do.

use crate::error::{Error, Result};

/// Longest legal varint encoding in bytes
pub const MAX_VARINT_LEN: usize = 10;

/// Decode a varint from the start of `data`.
///
/// Returns the decoded value and the number of bytes consumed. Non-minimal
/// encodings (redundant `0x80` continuation bytes) are accepted as long as
/// they fit in 10 bytes.
pub fn read_varint_as_uint64(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(Error::malformed_varint(0));
        }

        // shift of 63 keeps only the lowest payload bit of the tenth byte
        result |= u64::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::malformed_varint(0))
}

/// Decode a varint starting at `offset`, reporting errors at that offset
pub(crate) fn read_varint_at(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let tail = data.get(offset..).unwrap_or_default();
    read_varint_as_uint64(tail).map_err(|_| Error::malformed_varint(offset))
}

/// Append the minimal varint encoding of `value` to `buf`
pub fn write_uint64_as_varint(value: u64, buf: &mut Vec<u8>) {
    let mut value = value;
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Minimal varint encoding of `value` as a fresh vector
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(varint_len(value));
    write_uint64_as_varint(value, &mut buf);
    buf
}

/// Number of bytes the minimal encoding of `value` occupies
pub fn varint_len(value: u64) -> usize {
    // bits needed, rounded up to 7-bit groups, at least one byte
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_varint_single_byte() {
        let data = [0x08];
        let (value, len) = read_varint_as_uint64(&data).unwrap();
        assert_eq!(value, 8);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02];
        let (value, len) = read_varint_as_uint64(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_max() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let (value, len) = read_varint_as_uint64(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_varint_int32_max() {
        let (value, len) = read_varint_as_uint64(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]).unwrap();
        assert_eq!(value, 2_147_483_647);
        assert_eq!(len, 5);
    }

    #[test]
    fn test_decode_varint_masks_overflow_bits() {
        // tenth byte 0x7F carries bits beyond 63
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        let (value, len) = read_varint_as_uint64(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_varint_too_long() {
        let data = [0x80; 11];
        assert!(matches!(
            read_varint_as_uint64(&data),
            Err(Error::MalformedVarint { .. })
        ));
    }

    #[test]
    fn test_decode_varint_truncated() {
        assert!(read_varint_as_uint64(&[]).is_err());
        assert!(read_varint_as_uint64(&[0x80, 0x80]).is_err());
    }

    #[test]
    fn test_decode_varint_non_minimal() {
        let (value, len) = read_varint_as_uint64(&[0x81, 0x80, 0x00]).unwrap();
        assert_eq!(value, 1);
        assert_eq!(len, 3);
    }

    #[test]
    fn test_read_varint_at_reports_offset() {
        let err = read_varint_at(&[0x08, 0x80], 1).unwrap_err();
        assert!(matches!(err, Error::MalformedVarint { offset: 1 }));
    }

    #[test]
    fn test_encode_varint() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(150), vec![0x96, 0x01]);
        assert_eq!(encode_varint(u64::MAX).len(), 10);
        assert_eq!(encode_varint(-1i64 as u64), vec![0xFF; 9].into_iter().chain([0x01]).collect::<Vec<_>>());
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(u64::MAX), 10);
    }

    proptest! {
        #[test]
        fn prop_varint_bijection(u in any::<u64>()) {
            let encoded = encode_varint(u);
            prop_assert_eq!(encoded.len(), varint_len(u));
            let (decoded, len) = read_varint_as_uint64(&encoded).unwrap();
            prop_assert_eq!(decoded, u);
            prop_assert_eq!(len, encoded.len());
        }
    }
}
