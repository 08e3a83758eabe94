//! Bit and byte reinterpretation helpers.
//!
//! Protobuf stores every scalar as an unsigned bit pattern on the wire. These
//! helpers move values between the signed, ZigZag, IEEE-754 and raw unsigned
//! views without changing any bits (except ZigZag, which is a bijection).
//!
//! Float conversions from bits return `None` for NaN and the infinities: the
//! downstream float column type cannot hold non-finite values, so those
//! patterns surface as a missing value instead.

/// Reverse the byte order of a 32-bit value
pub fn swap_endian_32(value: u32) -> u32 {
    value.swap_bytes()
}

/// Reverse the byte order of a 64-bit value
pub fn swap_endian_64(value: u64) -> u64 {
    value.swap_bytes()
}

/// Two's-complement view of an `i32` as `u32`
pub fn reinterpret_int32_as_uint32(value: i32) -> u32 {
    value as u32
}

/// Inverse of [`reinterpret_int32_as_uint32`]
pub fn reinterpret_uint32_as_int32(value: u32) -> i32 {
    value as i32
}

/// Two's-complement view of an `i64` as `u64`
pub fn reinterpret_int64_as_uint64(value: i64) -> u64 {
    value as u64
}

/// Inverse of [`reinterpret_int64_as_uint64`]
pub fn reinterpret_uint64_as_int64(value: u64) -> i64 {
    value as i64
}

/// ZigZag-encode a signed 32-bit value
pub fn reinterpret_sint32_as_uint32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// ZigZag-decode a 32-bit value
pub fn reinterpret_uint32_as_sint32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// ZigZag-encode a signed 64-bit value
pub fn reinterpret_sint64_as_uint64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// ZigZag-decode a 64-bit value
pub fn reinterpret_uint64_as_sint64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// IEEE-754 single precision from its bit pattern; `None` for NaN/±Infinity
pub fn reinterpret_uint32_as_float(bits: u32) -> Option<f32> {
    let value = f32::from_bits(bits);
    value.is_finite().then_some(value)
}

/// Bit pattern of an IEEE-754 single precision value
pub fn reinterpret_float_as_uint32(value: f32) -> u32 {
    value.to_bits()
}

/// IEEE-754 double precision from its bit pattern; `None` for NaN/±Infinity
pub fn reinterpret_uint64_as_double(bits: u64) -> Option<f64> {
    let value = f64::from_bits(bits);
    value.is_finite().then_some(value)
}

/// Bit pattern of an IEEE-754 double precision value
pub fn reinterpret_double_as_uint64(value: f64) -> u64 {
    value.to_bits()
}

/// Read a little-endian `u32` from the first four bytes of `data`
pub(crate) fn read_u32_le(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Read a little-endian `u64` from the first eight bytes of `data`
pub(crate) fn read_u64_le(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
