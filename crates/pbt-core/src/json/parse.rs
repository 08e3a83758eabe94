//! JSON to wire_json.

use super::print::NULL_VALUE;
use super::{well_known, JsonOptions};
use crate::descriptor::{enum_number, find_field, oneof_siblings, FieldRef};
use crate::editor::types::{
    Bool, Double, Enum, Fixed32, Fixed64, Float, Int32, Int64, ProtoType, SFixed32, SFixed64,
    SInt32, SInt64, UInt32, UInt64,
};
use crate::error::{Error, Result};
use crate::wire::{pack, WireJson, WireValue};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use prost_reflect::{DescriptorPool, FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{Map, Value};
use tracing::{debug, trace};

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

const VALUE: &str = "google.protobuf.Value";

pub(super) struct Parser<'a> {
    pub(super) pool: &'a DescriptorPool,
    options: &'a JsonOptions,
}

impl<'a> Parser<'a> {
    pub(super) fn new(pool: &'a DescriptorPool, options: &'a JsonOptions) -> Self {
        Self { pool, options }
    }

    pub(super) fn message(
        &self,
        descriptor: &MessageDescriptor,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<WireJson> {
        if depth > self.options.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.options.max_depth,
            });
        }
        if well_known::is_well_known(descriptor.full_name()) {
            return well_known::parse(self, descriptor, value, path, depth);
        }
        let object = value.as_object().ok_or_else(|| {
            Error::invalid_json(path, format!("expected object for {}", descriptor.full_name()))
        })?;
        let mut doc = WireJson::new();
        self.fields_into(&mut doc, descriptor, object, path, depth)?;
        Ok(doc)
    }

    /// Write every recognised key of `object`, in ascending field-number order
    pub(super) fn fields_into(
        &self,
        doc: &mut WireJson,
        descriptor: &MessageDescriptor,
        object: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        let mut fields = Vec::with_capacity(object.len());
        for (key, value) in object {
            match find_field(descriptor, &FieldRef::from(key.as_str())) {
                Ok(field) => fields.push((field, key, value)),
                Err(_) => debug!("dropping unknown key '{}' at {}", key, path),
            }
        }
        fields.sort_by_key(|(field, _, _)| field.number());

        for (field, key, value) in fields {
            self.field(doc, &field, value, &format!("{}.{}", path, key), depth)?;
        }
        Ok(())
    }

    /// Write one field's JSON value into `doc`
    pub(super) fn field(
        &self,
        doc: &mut WireJson,
        field: &FieldDescriptor,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        let kind = field.kind();
        let number = field.number();
        if value.is_null() && !accepts_null(&kind) {
            return Ok(());
        }

        if field.is_map() {
            return self.map(doc, field, value, path, depth);
        }
        if field.is_list() {
            let items = value
                .as_array()
                .ok_or_else(|| Error::invalid_json(path, "expected array"))?;
            let mut encoded = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                if item.is_null() && !accepts_null(&kind) {
                    return Err(Error::invalid_json(item_path, "null is not a valid element"));
                }
                encoded.push(self.element(&kind, item, &item_path, depth)?);
            }
            if encoded.is_empty() {
                return Ok(());
            }
            if field.is_packed() {
                doc.push(number, pack(&encoded));
            } else {
                for value in encoded {
                    doc.push(number, value);
                }
            }
            return Ok(());
        }

        let encoded = self.element(&kind, value, path, depth)?;
        if !field.supports_presence() && is_default(&encoded) {
            trace!("skipping default value at {}", path);
            return Ok(());
        }
        for sibling in oneof_siblings(field) {
            doc.remove_bucket(sibling);
        }
        doc.replace_field(number, encoded);
        Ok(())
    }

    fn map(
        &self,
        doc: &mut WireJson,
        field: &FieldDescriptor,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        let Kind::Message(entry) = field.kind() else {
            return Ok(());
        };
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_json(path, "expected object for map field"))?;
        let key_kind = entry.map_entry_key_field().kind();
        let value_kind = entry.map_entry_value_field().kind();

        for (key, item) in object {
            let item_path = format!("{}.{}", path, key);
            if item.is_null() && !accepts_null(&value_kind) {
                return Err(Error::invalid_json(item_path, "null is not a valid map value"));
            }
            let mut entry_doc = WireJson::new();
            entry_doc.push(1, map_key(&key_kind, key, &item_path)?);
            entry_doc.push(2, self.element(&value_kind, item, &item_path, depth)?);
            doc.push(field.number(), WireValue::Len(Bytes::from(entry_doc.to_message())));
        }
        Ok(())
    }

    /// Encode one JSON element as a payload of `kind`
    pub(super) fn element(
        &self,
        kind: &Kind,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<WireValue> {
        Ok(match kind {
            Kind::Double => Double::encode(&json_f64(value, path)?),
            Kind::Float => Float::encode(&json_f32(value, path)?),
            Kind::Int32 => Int32::encode(&json_i32(value, path)?),
            Kind::Sint32 => SInt32::encode(&json_i32(value, path)?),
            Kind::Sfixed32 => SFixed32::encode(&json_i32(value, path)?),
            Kind::Uint32 => UInt32::encode(&json_u32(value, path)?),
            Kind::Fixed32 => Fixed32::encode(&json_u32(value, path)?),
            Kind::Int64 => Int64::encode(&json_i64(value, path)?),
            Kind::Sint64 => SInt64::encode(&json_i64(value, path)?),
            Kind::Sfixed64 => SFixed64::encode(&json_i64(value, path)?),
            Kind::Uint64 => UInt64::encode(&json_u64(value, path)?),
            Kind::Fixed64 => Fixed64::encode(&json_u64(value, path)?),
            Kind::Bool => Bool::encode(
                &value
                    .as_bool()
                    .ok_or_else(|| Error::invalid_json(path, "expected boolean"))?,
            ),
            Kind::String => WireValue::Len(Bytes::from(json_str(value, path)?.to_string())),
            Kind::Bytes => WireValue::Len(Bytes::from(json_bytes(value, path)?)),
            Kind::Enum(descriptor) => {
                let number = match value {
                    Value::Null if descriptor.full_name() == NULL_VALUE => 0,
                    Value::String(name) => match enum_number(descriptor, name) {
                        Ok(number) => number,
                        // numeric strings are accepted like numbers
                        Err(e) => name.parse().map_err(|_| e)?,
                    },
                    other => json_i32(other, path)?,
                };
                Enum::encode(&number)
            }
            Kind::Message(descriptor) => {
                let inner = self.message(descriptor, value, path, depth + 1)?;
                WireValue::Len(Bytes::from(inner.to_message()))
            }
        })
    }
}

/// Whether `null` is a value of `kind` rather than absence
fn accepts_null(kind: &Kind) -> bool {
    match kind {
        Kind::Message(m) => m.full_name() == VALUE,
        Kind::Enum(e) => e.full_name() == NULL_VALUE,
        _ => false,
    }
}

fn is_default(value: &WireValue) -> bool {
    match value {
        WireValue::Varint(v) | WireValue::I64(v) => *v == 0,
        WireValue::I32(v) => *v == 0,
        WireValue::Len(data) => data.is_empty(),
    }
}

fn map_key(kind: &Kind, key: &str, path: &str) -> Result<WireValue> {
    let text = Value::String(key.to_string());
    Ok(match kind {
        Kind::Bool => match key {
            "true" => Bool::encode(&true),
            "false" => Bool::encode(&false),
            _ => return Err(Error::invalid_json(path, "map key must be \"true\" or \"false\"")),
        },
        Kind::String => WireValue::Len(Bytes::from(key.to_string())),
        Kind::Int32 => Int32::encode(&json_i32(&text, path)?),
        Kind::Sint32 => SInt32::encode(&json_i32(&text, path)?),
        Kind::Sfixed32 => SFixed32::encode(&json_i32(&text, path)?),
        Kind::Uint32 => UInt32::encode(&json_u32(&text, path)?),
        Kind::Fixed32 => Fixed32::encode(&json_u32(&text, path)?),
        Kind::Int64 => Int64::encode(&json_i64(&text, path)?),
        Kind::Sint64 => SInt64::encode(&json_i64(&text, path)?),
        Kind::Sfixed64 => SFixed64::encode(&json_i64(&text, path)?),
        Kind::Uint64 => UInt64::encode(&json_u64(&text, path)?),
        Kind::Fixed64 => Fixed64::encode(&json_u64(&text, path)?),
        other => {
            return Err(Error::InvalidMapKeyType {
                field: path.to_string(),
                key_type: format!("{:?}", other),
            })
        }
    })
}

pub(super) fn json_str<'v>(value: &'v Value, path: &str) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| Error::invalid_json(path, format!("expected string, got {}", value)))
}

fn json_bytes(value: &Value, path: &str) -> Result<Vec<u8>> {
    let text = json_str(value, path)?;
    let engine = if text.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };
    engine
        .decode(text)
        .map_err(|e| Error::invalid_json(path, format!("invalid base64: {}", e)))
}

/// Integral value of a JSON number or decimal string
fn integral(value: &Value) -> Option<IntegralValue> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(IntegralValue::Signed)
            .or_else(|| n.as_u64().map(IntegralValue::Unsigned))
            .or_else(|| n.as_f64().and_then(float_integral)),
        Value::String(s) => s
            .parse::<i64>()
            .map(IntegralValue::Signed)
            .or_else(|_| s.parse::<u64>().map(IntegralValue::Unsigned))
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(float_integral)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum IntegralValue {
    Signed(i64),
    Unsigned(u64),
}

fn float_integral(f: f64) -> Option<IntegralValue> {
    if f.fract() != 0.0 || !f.is_finite() {
        return None;
    }
    if f >= 0.0 && f < u64::MAX as f64 {
        Some(IntegralValue::Unsigned(f as u64))
    } else if f >= i64::MIN as f64 && f < 0.0 {
        Some(IntegralValue::Signed(f as i64))
    } else {
        None
    }
}

fn not_integer(value: &Value, path: &str, ty: &str) -> Error {
    Error::invalid_json(path, format!("expected {}, got {}", ty, value))
}

fn json_i64(value: &Value, path: &str) -> Result<i64> {
    match integral(value) {
        Some(IntegralValue::Signed(v)) => Some(v),
        Some(IntegralValue::Unsigned(v)) => i64::try_from(v).ok(),
        None => None,
    }
    .ok_or_else(|| not_integer(value, path, "int64"))
}

fn json_u64(value: &Value, path: &str) -> Result<u64> {
    match integral(value) {
        Some(IntegralValue::Signed(v)) => u64::try_from(v).ok(),
        Some(IntegralValue::Unsigned(v)) => Some(v),
        None => None,
    }
    .ok_or_else(|| not_integer(value, path, "uint64"))
}

fn json_i32(value: &Value, path: &str) -> Result<i32> {
    json_i64(value, path)
        .ok()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| not_integer(value, path, "int32"))
}

fn json_u32(value: &Value, path: &str) -> Result<u32> {
    json_u64(value, path)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| not_integer(value, path, "uint32"))
}

fn json_f64(value: &Value, path: &str) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok().filter(|f: &f64| f.is_finite()),
        },
        _ => None,
    }
    .ok_or_else(|| Error::invalid_json(path, format!("expected number, got {}", value)))
}

fn json_f32(value: &Value, path: &str) -> Result<f32> {
    let v = json_f64(value, path)?;
    if v.is_finite() && v.abs() > f64::from(f32::MAX) {
        return Err(Error::invalid_json(path, format!("{} is out of range for float", v)));
    }
    Ok(v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers() {
        assert_eq!(json_i64(&json!("-9223372036854775808"), "$").unwrap(), i64::MIN);
        assert_eq!(json_u64(&json!("18446744073709551615"), "$").unwrap(), u64::MAX);
        assert_eq!(json_i32(&json!(1e3), "$").unwrap(), 1000);
        assert_eq!(json_i32(&json!("-7"), "$").unwrap(), -7);
        assert!(json_i32(&json!(2_147_483_648u64), "$").is_err());
        assert!(json_u32(&json!(-1), "$").is_err());
        assert!(json_i64(&json!(true), "$").is_err());
        assert!(json_i64(&json!("1.5"), "$").is_err());
    }

    #[test]
    fn test_int64_from_each_integral_form() {
        assert_eq!(json_i64(&json!(-5), "$").unwrap(), -5);
        assert_eq!(json_i64(&json!(-2.0), "$").unwrap(), -2);
        assert_eq!(json_i64(&json!(i64::MAX as u64), "$").unwrap(), i64::MAX);
        assert!(json_i64(&json!(u64::MAX), "$").is_err());
        assert!(json_i64(&json!("18446744073709551615"), "$").is_err());
        assert_eq!(json_u64(&json!(-0.0), "$").unwrap(), 0);
    }

    #[test]
    fn test_floats() {
        assert!(json_f64(&json!("NaN"), "$").unwrap().is_nan());
        assert_eq!(json_f64(&json!("-Infinity"), "$").unwrap(), f64::NEG_INFINITY);
        assert_eq!(json_f64(&json!("2.5"), "$").unwrap(), 2.5);
        assert!(json_f64(&json!("inf"), "$").is_err());
        assert!(json_f32(&json!(1e300), "$").is_err());
        assert_eq!(json_f32(&json!(0.5), "$").unwrap(), 0.5);
    }

    #[test]
    fn test_bytes_alphabets() {
        assert_eq!(json_bytes(&json!("aGk="), "$").unwrap(), b"hi");
        assert_eq!(json_bytes(&json!("aGk"), "$").unwrap(), b"hi");
        assert_eq!(json_bytes(&json!("-_8"), "$").unwrap(), vec![0xFB, 0xFF]);
        assert_eq!(json_bytes(&json!("+/8="), "$").unwrap(), vec![0xFB, 0xFF]);
        assert!(json_bytes(&json!("!!"), "$").is_err());
    }

    #[test]
    fn test_map_keys() {
        assert_eq!(map_key(&Kind::Bool, "true", "$").unwrap(), WireValue::Varint(1));
        assert_eq!(map_key(&Kind::Sint32, "-1", "$").unwrap(), WireValue::Varint(1));
        assert!(map_key(&Kind::Bool, "yes", "$").is_err());
        assert!(map_key(&Kind::Int32, "x", "$").is_err());
    }
}
