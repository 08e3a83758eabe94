//! wire_json to JSON.

use super::{well_known, wire_type_of, JsonOptions, KeyStyle};
use crate::editor::types::{
    Blob, Bool, Enum, Fixed32, Fixed64, Int32, Int64, ProtoType, SFixed32, SFixed64, SInt32,
    SInt64, Str, UInt32, UInt64,
};
use crate::error::{Error, Result};
use crate::wire::{WireJson, WireValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::BytesMut;
use prost_reflect::{DescriptorPool, EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{json, Map, Number, Value};

pub(super) const NULL_VALUE: &str = "google.protobuf.NullValue";

pub(super) struct Printer<'a> {
    pub(super) pool: &'a DescriptorPool,
    pub(super) options: &'a JsonOptions,
}

impl<'a> Printer<'a> {
    pub(super) fn new(pool: &'a DescriptorPool, options: &'a JsonOptions) -> Self {
        Self { pool, options }
    }

    pub(super) fn message(
        &self,
        descriptor: &MessageDescriptor,
        doc: &WireJson,
        depth: usize,
    ) -> Result<Value> {
        if depth > self.options.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.options.max_depth,
            });
        }
        if well_known::is_well_known(descriptor.full_name()) {
            return well_known::print(self, descriptor, doc, depth);
        }

        let mut object = Map::new();
        self.fields_into(&mut object, descriptor, doc, depth)?;
        Ok(Value::Object(object))
    }

    /// Print every present field of a regular message into `object`
    pub(super) fn fields_into(
        &self,
        object: &mut Map<String, Value>,
        descriptor: &MessageDescriptor,
        doc: &WireJson,
        depth: usize,
    ) -> Result<()> {
        for field in descriptor.fields() {
            if let Some(value) = self.field(&field, doc, depth)? {
                object.insert(self.key(&field), value);
            }
        }
        Ok(())
    }

    fn key(&self, field: &FieldDescriptor) -> String {
        match self.options.key_style {
            KeyStyle::JsonName => field.json_name().to_string(),
            KeyStyle::FieldNumber => field.number().to_string(),
        }
    }

    /// JSON for one field, `None` when it is omitted
    pub(super) fn field(
        &self,
        field: &FieldDescriptor,
        doc: &WireJson,
        depth: usize,
    ) -> Result<Option<Value>> {
        let emit = self.options.emit_default_values;
        if field.is_map() {
            let object = self.map(field, doc, depth)?;
            return Ok((emit || !object.is_empty()).then_some(Value::Object(object)));
        }
        if field.is_list() {
            let kind = field.kind();
            let items = doc
                .elements(field.number(), wire_type_of(&kind))?
                .iter()
                .map(|value| self.element(&kind, field.number(), value, depth))
                .collect::<Result<Vec<_>>>()?;
            return Ok((emit || !items.is_empty()).then_some(Value::Array(items)));
        }

        let value = match self.singular(field, doc, depth)? {
            Some(value) => value,
            None if emit && !field.supports_presence() => default_value(&field.kind()),
            None => return Ok(None),
        };
        // -0.0 compares equal to the 0.0 default and is omitted like it
        if !emit && !field.supports_presence() && value == default_value(&field.kind()) {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Last occurrence of a singular field; embedded messages merge
    pub(super) fn singular(
        &self,
        field: &FieldDescriptor,
        doc: &WireJson,
        depth: usize,
    ) -> Result<Option<Value>> {
        let kind = field.kind();
        let values = doc.elements(field.number(), wire_type_of(&kind))?;
        if let Kind::Message(descriptor) = &kind {
            if values.is_empty() {
                return Ok(None);
            }
            let mut merged = BytesMut::new();
            for value in &values {
                if let WireValue::Len(data) = value {
                    merged.extend_from_slice(data);
                }
            }
            let inner = WireJson::from_message(&merged)?;
            return self.message(descriptor, &inner, depth + 1).map(Some);
        }
        values
            .last()
            .map(|value| self.element(&kind, field.number(), value, depth))
            .transpose()
    }

    fn map(
        &self,
        field: &FieldDescriptor,
        doc: &WireJson,
        depth: usize,
    ) -> Result<Map<String, Value>> {
        let mut object = Map::new();
        let Kind::Message(entry) = field.kind() else {
            return Ok(object);
        };
        let key_field = entry.map_entry_key_field();
        let value_field = entry.map_entry_value_field();
        let value_kind = value_field.kind();

        for data in doc.elements(field.number(), wire_type_of(&field.kind()))? {
            let WireValue::Len(data) = data else { continue };
            let entry_doc = WireJson::from_message(&data)?;

            let key = match entry_doc.elements(1, wire_type_of(&key_field.kind()))?.last() {
                Some(raw) => map_key(&key_field.kind(), raw)?,
                None => map_key_default(&key_field.kind()),
            };
            let value = match &value_kind {
                Kind::Message(_) => self
                    .singular(&value_field, &entry_doc, depth)?
                    .map_or_else(|| self.empty_message(&value_kind, depth), Ok)?,
                _ => match entry_doc.elements(2, wire_type_of(&value_kind))?.last() {
                    Some(raw) => self.element(&value_kind, 2, raw, depth)?,
                    None => default_value(&value_kind),
                },
            };
            // later entries with the same key win
            object.insert(key, value);
        }
        Ok(object)
    }

    fn empty_message(&self, kind: &Kind, depth: usize) -> Result<Value> {
        match kind {
            Kind::Message(descriptor) => self.message(descriptor, &WireJson::new(), depth + 1),
            other => Ok(default_value(other)),
        }
    }

    /// JSON for one element payload of `kind`
    pub(super) fn element(
        &self,
        kind: &Kind,
        number: u32,
        value: &WireValue,
        depth: usize,
    ) -> Result<Value> {
        Ok(match kind {
            Kind::Double => float_json(f64::from_bits(decoded::<Fixed64>(number, value)?)),
            Kind::Float => float_json(f32_to_f64(f32::from_bits(decoded::<Fixed32>(number, value)?))),
            Kind::Int32 => json!(decoded::<Int32>(number, value)?),
            Kind::Sint32 => json!(decoded::<SInt32>(number, value)?),
            Kind::Sfixed32 => json!(decoded::<SFixed32>(number, value)?),
            Kind::Uint32 => json!(decoded::<UInt32>(number, value)?),
            Kind::Fixed32 => json!(decoded::<Fixed32>(number, value)?),
            Kind::Int64 => json!(decoded::<Int64>(number, value)?.to_string()),
            Kind::Sint64 => json!(decoded::<SInt64>(number, value)?.to_string()),
            Kind::Sfixed64 => json!(decoded::<SFixed64>(number, value)?.to_string()),
            Kind::Uint64 => json!(decoded::<UInt64>(number, value)?.to_string()),
            Kind::Fixed64 => json!(decoded::<Fixed64>(number, value)?.to_string()),
            Kind::Bool => json!(decoded::<Bool>(number, value)?),
            Kind::String => json!(decoded::<Str>(number, value)?),
            Kind::Bytes => json!(STANDARD.encode(decoded::<Blob>(number, value)?)),
            Kind::Enum(descriptor) => enum_json(descriptor, decoded::<Enum>(number, value)?),
            Kind::Message(descriptor) => {
                let WireValue::Len(data) = value else {
                    return Err(Error::malformed_message(0, format!("field {} is not length-delimited", number)));
                };
                let inner = WireJson::from_message(data)?;
                self.message(descriptor, &inner, depth + 1)?
            }
        })
    }
}

/// Decode a payload whose type always yields a value
fn decoded<T: ProtoType>(number: u32, value: &WireValue) -> Result<T::Value> {
    T::decode(number, value)?.ok_or_else(|| {
        Error::malformed_message(0, format!("field {} holds no {} value", number, T::NAME))
    })
}

/// Widen through the shortest decimal form so `1.1f32` prints as `1.1`
fn f32_to_f64(value: f32) -> f64 {
    if !value.is_finite() {
        return f64::from(value);
    }
    value.to_string().parse().unwrap_or(f64::from(value))
}

pub(super) fn float_json(value: f64) -> Value {
    if value.is_nan() {
        json!("NaN")
    } else if value.is_infinite() {
        json!(if value > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

pub(super) fn enum_json(descriptor: &EnumDescriptor, number: i32) -> Value {
    if descriptor.full_name() == NULL_VALUE {
        return Value::Null;
    }
    match descriptor.get_value(number) {
        Some(value) => json!(value.name()),
        None => json!(number),
    }
}

/// JSON default of a field kind
pub(super) fn default_value(kind: &Kind) -> Value {
    match kind {
        Kind::Double | Kind::Float => json!(0.0),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 | Kind::Uint64 | Kind::Fixed64 => json!("0"),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Uint32 | Kind::Fixed32 => json!(0),
        Kind::Bool => json!(false),
        Kind::String | Kind::Bytes => json!(""),
        Kind::Enum(descriptor) => enum_json(descriptor, 0),
        Kind::Message(_) => Value::Null,
    }
}

fn map_key(kind: &Kind, raw: &WireValue) -> Result<String> {
    Ok(match kind {
        Kind::Int32 => decoded::<Int32>(1, raw)?.to_string(),
        Kind::Sint32 => decoded::<SInt32>(1, raw)?.to_string(),
        Kind::Sfixed32 => decoded::<SFixed32>(1, raw)?.to_string(),
        Kind::Uint32 => decoded::<UInt32>(1, raw)?.to_string(),
        Kind::Fixed32 => decoded::<Fixed32>(1, raw)?.to_string(),
        Kind::Int64 => decoded::<Int64>(1, raw)?.to_string(),
        Kind::Sint64 => decoded::<SInt64>(1, raw)?.to_string(),
        Kind::Sfixed64 => decoded::<SFixed64>(1, raw)?.to_string(),
        Kind::Uint64 => decoded::<UInt64>(1, raw)?.to_string(),
        Kind::Fixed64 => decoded::<Fixed64>(1, raw)?.to_string(),
        Kind::Bool => decoded::<Bool>(1, raw)?.to_string(),
        Kind::String => decoded::<Str>(1, raw)?,
        other => {
            return Err(Error::InvalidMapKeyType {
                field: "key".to_string(),
                key_type: format!("{:?}", other),
            })
        }
    })
}

fn map_key_default(kind: &Kind) -> String {
    match kind {
        Kind::Bool => "false".to_string(),
        Kind::String => String::new(),
        _ => "0".to_string(),
    }
}
