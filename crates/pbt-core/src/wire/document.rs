//! The wire_json document.
//!
//! A [`WireJson`] maps field numbers to buckets of occurrence records. Each
//! record carries a global occurrence index `i`; sorting every record of the
//! document by `i` reproduces the byte-stream field order, which is what
//! [`wire_json_to_message`] emits.
//!
//! Text form:
//!
//! ```text
//! {"1":[{"i":0,"n":1,"t":0,"v":42}],"2":[{"i":1,"n":2,"t":2,"v":"aGk="}]}
//! ```
//!
//! LEN values are standard base64; the other wire types carry unsigned JSON
//! numbers.
//!
//! Documents are values. Buckets sit behind `Arc`, so cloning a document is
//! cheap and an edit copies only the buckets it touches.

use super::{validate_field_number, write_field, FieldReader, WireType, WireValue};
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

/// One field occurrence inside a wire_json document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Global occurrence index (`i`)
    pub index: u32,
    /// Field number (`n`)
    pub number: u32,
    /// Decoded payload (`t` and `v`)
    pub value: WireValue,
}

impl Occurrence {
    /// Creates a new occurrence record
    pub fn new(index: u32, number: u32, value: WireValue) -> Self {
        Self {
            index,
            number,
            value,
        }
    }

    fn to_json(&self) -> Value {
        let v = match &self.value {
            WireValue::Varint(v) | WireValue::I64(v) => json!(v),
            WireValue::I32(v) => json!(v),
            WireValue::Len(data) => json!(STANDARD.encode(data)),
        };
        json!({
            "i": self.index,
            "n": self.number,
            "t": self.value.wire_type().as_u8(),
            "v": v,
        })
    }
}

/// A decoded protobuf message in wire_json form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireJson {
    fields: BTreeMap<u32, Arc<Vec<Occurrence>>>,
}

/// Decode an encoded message into a wire_json document
pub fn message_to_wire_json(data: &[u8]) -> Result<WireJson> {
    WireJson::from_message(data)
}

/// Encode a wire_json document back into message bytes
pub fn wire_json_to_message(doc: &WireJson) -> Vec<u8> {
    doc.to_message()
}

impl WireJson {
    /// Creates an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an encoded message, assigning indices in byte order
    pub fn from_message(data: &[u8]) -> Result<Self> {
        let mut doc = Self::new();
        for (index, field) in FieldReader::new(data).enumerate() {
            let (number, value) = field?;
            trace!("field {} occurrence {}: {:?}", number, index, value.wire_type());
            doc.bucket_mut(number)
                .push(Occurrence::new(index as u32, number, value));
        }
        debug!(
            "decoded {} bytes into {} field number(s)",
            data.len(),
            doc.fields.len()
        );
        Ok(doc)
    }

    /// Encode the document, emitting occurrences in `i` order
    pub fn to_message(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for occurrence in self.ordered() {
            write_field(&mut buf, occurrence.number, &occurrence.value);
        }
        buf
    }

    /// Returns true if the document holds no occurrences
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field numbers present, ascending
    pub fn field_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.keys().copied()
    }

    /// Occurrences of one field number, in `i` order
    pub fn occurrences(&self, number: u32) -> &[Occurrence] {
        self.fields
            .get(&number)
            .map(|b| b.as_slice())
            .unwrap_or_default()
    }

    /// Every occurrence of the document, in `i` order
    pub fn ordered(&self) -> Vec<&Occurrence> {
        let mut all: Vec<&Occurrence> = self.fields.values().flat_map(|b| b.iter()).collect();
        all.sort_by_key(|o| o.index);
        all
    }

    /// Total number of occurrences
    pub fn len(&self) -> usize {
        self.fields.values().map(|b| b.len()).sum()
    }

    /// Index the next appended occurrence receives
    pub fn next_index(&self) -> u32 {
        self.fields
            .values()
            .flat_map(|b| b.iter().map(|o| o.index))
            .max()
            .map_or(0, |i| i.saturating_add(1))
    }

    /// Append an occurrence with the next global index
    pub(crate) fn push(&mut self, number: u32, value: WireValue) {
        let index = self.next_index();
        self.bucket_mut(number)
            .push(Occurrence::new(index, number, value));
    }

    /// Mutable access to a bucket, creating it if absent
    pub(crate) fn bucket_mut(&mut self, number: u32) -> &mut Vec<Occurrence> {
        Arc::make_mut(self.fields.entry(number).or_default())
    }

    /// Replace a bucket; an empty bucket removes the key
    pub(crate) fn put_bucket(&mut self, number: u32, bucket: Vec<Occurrence>) {
        if bucket.is_empty() {
            self.fields.remove(&number);
        } else {
            self.fields.insert(number, Arc::new(bucket));
        }
    }

    /// Drop a field number entirely
    pub(crate) fn remove_bucket(&mut self, number: u32) {
        self.fields.remove(&number);
    }

    /// Add one to every occurrence index at or above `from`
    pub(crate) fn shift_indices_from(&mut self, from: u32) {
        for bucket in self.fields.values_mut() {
            if bucket.iter().any(|o| o.index >= from) {
                for occurrence in Arc::make_mut(bucket).iter_mut() {
                    if occurrence.index >= from {
                        occurrence.index += 1;
                    }
                }
            }
        }
    }

    /// Render the document as a JSON value
    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        for (number, bucket) in &self.fields {
            let records = bucket.iter().map(Occurrence::to_json).collect();
            map.insert(number.to_string(), Value::Array(records));
        }
        Value::Object(map)
    }

    /// Build a document from its JSON value form.
    ///
    /// Missing `n` defaults to the bucket key, missing `t` is inferred from
    /// the value (string means LEN, number means VARINT) and missing `i` is
    /// assigned after the largest index present.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_wire_json("document must be an object"))?;

        let mut doc = Self::new();
        let mut pending: Vec<(u32, WireValue)> = Vec::new();
        let mut seen = HashSet::new();

        for (key, records) in object {
            let number = key
                .parse::<u64>()
                .map_err(|_| Error::invalid_wire_json(format!("key '{}' is not a field number", key)))
                .and_then(validate_field_number)?;
            let records = records.as_array().ok_or_else(|| {
                Error::invalid_wire_json(format!("field {} must map to an array", key))
            })?;

            for record in records {
                let (index, value) = parse_record(number, record)?;
                match index {
                    Some(index) => {
                        if !seen.insert(index) {
                            return Err(Error::invalid_wire_json(format!(
                                "duplicate occurrence index {}",
                                index
                            )));
                        }
                        doc.bucket_mut(number)
                            .push(Occurrence::new(index, number, value));
                    }
                    None => pending.push((number, value)),
                }
            }
        }

        for (number, value) in pending {
            doc.push(number, value);
        }
        for bucket in doc.fields.values_mut() {
            Arc::make_mut(bucket).sort_by_key(|o| o.index);
        }
        doc.fields.retain(|_, bucket| !bucket.is_empty());
        Ok(doc)
    }
}

fn parse_record(number: u32, record: &Value) -> Result<(Option<u32>, WireValue)> {
    let record = record.as_object().ok_or_else(|| {
        Error::invalid_wire_json(format!("field {} occurrence must be an object", number))
    })?;

    let index = match record.get("i") {
        None | Some(Value::Null) => None,
        Some(i) => Some(
            i.as_u64()
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| Error::invalid_wire_json(format!("field {}: bad index {}", number, i)))?,
        ),
    };

    if let Some(n) = record.get("n") {
        if n.as_u64() != Some(u64::from(number)) {
            return Err(Error::invalid_wire_json(format!(
                "field {}: record number {} does not match key",
                number, n
            )));
        }
    }

    let raw = record
        .get("v")
        .ok_or_else(|| Error::invalid_wire_json(format!("field {}: missing value", number)))?;

    let wire_type = match record.get("t") {
        Some(t) => {
            let t = t
                .as_u64()
                .and_then(|t| u8::try_from(t).ok())
                .ok_or_else(|| Error::invalid_wire_json(format!("field {}: bad wire type {}", number, t)))?;
            WireType::try_from(t)?
        }
        None if raw.is_string() => WireType::Len,
        None => WireType::Varint,
    };

    let value = match wire_type {
        WireType::Len => {
            let text = raw.as_str().ok_or_else(|| {
                Error::invalid_wire_json(format!("field {}: LEN value must be a base64 string", number))
            })?;
            let data = STANDARD.decode(text).map_err(|e| {
                Error::invalid_wire_json(format!("field {}: invalid base64: {}", number, e))
            })?;
            WireValue::Len(Bytes::from(data))
        }
        WireType::Varint => WireValue::Varint(json_u64(number, raw)?),
        WireType::I64 => WireValue::I64(json_u64(number, raw)?),
        WireType::I32 => {
            let v = json_u64(number, raw)?;
            WireValue::I32(u32::try_from(v).map_err(|_| {
                Error::invalid_wire_json(format!("field {}: I32 value {} out of range", number, v))
            })?)
        }
    };

    Ok((index, value))
}

/// Unsigned wire value; negative numbers are taken as two's complement
fn json_u64(number: u32, raw: &Value) -> Result<u64> {
    raw.as_u64()
        .or_else(|| raw.as_i64().map(|v| v as u64))
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| Error::invalid_wire_json(format!("field {}: bad numeric value {}", number, raw)))
}

impl fmt::Display for WireJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_value())
    }
}

impl FromStr for WireJson {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json_value(&value)
    }
}
