//! Typed field access over wire_json documents.
//!
//! Every operation is generic over a [`ProtoType`] marker from [`types`]
//! and returns a new document; the receiver is never modified.
//!
//! ## Singular fields
//!
//! Reads follow protobuf "last wins" semantics: the value of the last
//! occurrence (by global index) is returned. Writes replace every occurrence
//! of the field with one record, reusing the first prior index so the field
//! keeps its position in the encoded output.
//!
//! ## Repeated fields
//!
//! The logical element sequence of a field is the concatenation, in index
//! order, of all its occurrences, where a LEN occurrence of a packable type
//! is a packed payload holding several elements. Reads accept both forms;
//! appends take an explicit `packed` flag; positional edits follow the
//! physical form already present at the target position.
//!
//! ```
//! use pbt_core::editor::types::Int32;
//! use pbt_core::WireJson;
//!
//! let doc: WireJson = r#"{"1":[{"i":0,"n":1,"t":0,"v":42}]}"#.parse()?;
//! let doc = doc.remove_repeated_element::<Int32>(1, 0)?;
//! assert_eq!(doc.to_string(), "{}");
//! # Ok::<(), pbt_core::Error>(())
//! ```

pub mod types;

use crate::error::{Error, Result};
use crate::wire::{pack, unpack, validate_field_number, Occurrence, WireJson, WireType, WireValue};
use tracing::trace;

pub use types::ProtoType;

/// Where one logical element of a repeated field lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    /// Position of the occurrence within its bucket
    occurrence: usize,
    /// Position inside a packed payload, `None` for an unpacked element
    packed: Option<usize>,
}

/// Logical elements of a bucket with their physical locations
fn elements(
    bucket: &[Occurrence],
    number: u32,
    wire_type: WireType,
) -> Result<Vec<(Slot, WireValue)>> {
    let mut out = Vec::new();
    for (position, occurrence) in bucket.iter().enumerate() {
        match &occurrence.value {
            value if value.wire_type() == wire_type => out.push((
                Slot {
                    occurrence: position,
                    packed: None,
                },
                value.clone(),
            )),
            WireValue::Len(payload) if wire_type != WireType::Len => {
                for (j, element) in unpack(payload, wire_type)?.into_iter().enumerate() {
                    out.push((
                        Slot {
                            occurrence: position,
                            packed: Some(j),
                        },
                        element,
                    ));
                }
            }
            other => {
                return Err(Error::WireTypeMismatch {
                    number,
                    expected: wire_type,
                    actual: other.wire_type(),
                })
            }
        }
    }
    Ok(out)
}

fn decode_all<T: ProtoType>(number: u32, values: &[WireValue]) -> Result<Vec<Option<T::Value>>> {
    values.iter().map(|v| T::decode(number, v)).collect()
}

impl WireJson {
    /// Logical elements of a field as raw payloads of `wire_type`.
    ///
    /// Packed payloads are expanded when `wire_type` is not LEN.
    pub fn elements(&self, number: u32, wire_type: WireType) -> Result<Vec<WireValue>> {
        Ok(elements(self.occurrences(number), number, wire_type)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// True iff at least one occurrence of `number` exists
    pub fn has_field(&self, number: u32) -> bool {
        !self.occurrences(number).is_empty()
    }

    /// Value of the last occurrence, `None` if absent or missing
    pub fn get_field<T: ProtoType>(&self, number: u32) -> Result<Option<T::Value>> {
        match self.elements(number, T::WIRE_TYPE)?.last() {
            Some(value) => T::decode(number, value),
            None => Ok(None),
        }
    }

    /// Value of the last occurrence, or `default` if the field is absent
    pub fn get_field_or<T: ProtoType>(
        &self,
        number: u32,
        default: T::Value,
    ) -> Result<Option<T::Value>> {
        match self.elements(number, T::WIRE_TYPE)?.last() {
            Some(value) => T::decode(number, value),
            None => Ok(Some(default)),
        }
    }

    /// Replace every occurrence of `number` with a single value
    pub fn set_field<T: ProtoType>(&self, number: u32, value: &T::Value) -> Result<Self> {
        let number = validate_field_number(u64::from(number))?;
        trace!("set {} field {}", T::NAME, number);
        let mut doc = self.clone();
        doc.replace_field(number, T::encode(value));
        Ok(doc)
    }

    /// Replace every occurrence of `number` in place, keeping the first index
    pub(crate) fn replace_field(&mut self, number: u32, value: WireValue) {
        let index = self
            .occurrences(number)
            .first()
            .map_or_else(|| self.next_index(), |o| o.index);
        self.put_bucket(number, vec![Occurrence::new(index, number, value)]);
    }

    /// Set a oneof member, clearing its sibling members first
    pub fn set_oneof_field<T: ProtoType>(
        &self,
        number: u32,
        value: &T::Value,
        siblings: &[u32],
    ) -> Result<Self> {
        let mut doc = self.clone();
        for &sibling in siblings.iter().filter(|&&s| s != number) {
            doc.remove_bucket(sibling);
        }
        doc.set_field::<T>(number, value)
    }

    /// Remove a field entirely
    pub fn clear_field(&self, number: u32) -> Self {
        let mut doc = self.clone();
        doc.remove_bucket(number);
        doc
    }

    /// Remove a repeated field entirely
    pub fn clear_repeated_field(&self, number: u32) -> Self {
        self.clear_field(number)
    }

    /// Number of logical elements, packed or not
    pub fn repeated_count<T: ProtoType>(&self, number: u32) -> Result<usize> {
        Ok(elements(self.occurrences(number), number, T::WIRE_TYPE)?.len())
    }

    /// All logical elements, decoded
    pub fn get_repeated_all<T: ProtoType>(&self, number: u32) -> Result<Vec<Option<T::Value>>> {
        decode_all::<T>(number, &self.elements(number, T::WIRE_TYPE)?)
    }

    /// Element at a 0-based logical index
    pub fn get_repeated<T: ProtoType>(&self, number: u32, index: usize) -> Result<Option<T::Value>> {
        let values = self.elements(number, T::WIRE_TYPE)?;
        let value = values
            .get(index)
            .ok_or_else(|| Error::index_out_of_range(number, index as i64, values.len()))?;
        T::decode(number, value)
    }

    /// Append one element
    pub fn add_repeated<T: ProtoType>(&self, number: u32, value: &T::Value, packed: bool) -> Result<Self> {
        self.add_all_repeated::<T>(number, std::slice::from_ref(value), packed)
    }

    /// Append several elements.
    ///
    /// With `packed` (packable types only) the elements extend the field's
    /// last occurrence if it is a packed payload, else form a new one.
    pub fn add_all_repeated<T: ProtoType>(
        &self,
        number: u32,
        values: &[T::Value],
        packed: bool,
    ) -> Result<Self> {
        let number = validate_field_number(u64::from(number))?;
        if values.is_empty() {
            return Ok(self.clone());
        }
        let encoded: Vec<WireValue> = values.iter().map(T::encode).collect();
        let mut doc = self.clone();

        if !(packed && T::packable()) {
            for value in encoded {
                doc.push(number, value);
            }
            return Ok(doc);
        }

        let last_packed = doc.occurrences(number).last().and_then(|o| match &o.value {
            WireValue::Len(payload) => Some((o.index, payload.clone())),
            _ => None,
        });
        match last_packed {
            Some((index, payload)) => {
                let mut merged = unpack(&payload, T::WIRE_TYPE)?;
                merged.extend(encoded);
                let bucket = doc.bucket_mut(number);
                if let Some(last) = bucket.last_mut() {
                    *last = Occurrence::new(index, number, pack(&merged));
                }
            }
            None => doc.push(number, pack(&encoded)),
        }
        Ok(doc)
    }

    /// Overwrite the element at `index`
    pub fn set_repeated_element<T: ProtoType>(
        &self,
        number: u32,
        index: usize,
        value: &T::Value,
    ) -> Result<Self> {
        self.edit_element::<T>(
            number,
            index,
            |payload, position| payload[position] = T::encode(value),
            |mut occurrence| {
                occurrence.value = T::encode(value);
                Some(occurrence)
            },
        )
    }

    /// Insert before the element at `index`, shifting later elements right
    pub fn insert_repeated_element<T: ProtoType>(
        &self,
        number: u32,
        index: usize,
        value: &T::Value,
    ) -> Result<Self> {
        let bucket = self.occurrences(number);
        let located = elements(bucket, number, T::WIRE_TYPE)?;
        let (slot, _) = located
            .get(index)
            .ok_or_else(|| Error::index_out_of_range(number, index as i64, located.len()))?;

        if slot.packed.is_some() {
            return self.edit_element::<T>(
                number,
                index,
                |payload, position| payload.insert(position, T::encode(value)),
                Some,
            );
        }

        // new unpacked occurrence takes the target's index; everything at or
        // after it moves up by one
        let target = bucket[slot.occurrence].index;
        let mut doc = self.clone();
        doc.shift_indices_from(target);
        doc.bucket_mut(number)
            .insert(slot.occurrence, Occurrence::new(target, number, T::encode(value)));
        Ok(doc)
    }

    /// Remove the element at `index`, shifting later elements left.
    ///
    /// Removing the last remaining element removes the field.
    pub fn remove_repeated_element<T: ProtoType>(&self, number: u32, index: usize) -> Result<Self> {
        self.edit_element::<T>(
            number,
            index,
            |payload, position| {
                payload.remove(position);
            },
            |_| None,
        )
    }

    /// Apply an edit to the occurrence holding element `index`.
    ///
    /// `packed_edit` rewrites the unpacked element list of a packed payload;
    /// `plain_edit` maps an unpacked occurrence to its replacement (or
    /// `None` to drop it). Empty payloads and buckets are removed.
    fn edit_element<T: ProtoType>(
        &self,
        number: u32,
        index: usize,
        packed_edit: impl FnOnce(&mut Vec<WireValue>, usize),
        plain_edit: impl FnOnce(Occurrence) -> Option<Occurrence>,
    ) -> Result<Self> {
        let mut bucket = self.occurrences(number).to_vec();
        let located = elements(&bucket, number, T::WIRE_TYPE)?;
        let (slot, _) = located
            .get(index)
            .ok_or_else(|| Error::index_out_of_range(number, index as i64, located.len()))?;

        let occurrence = bucket.remove(slot.occurrence);
        let packed_payload = match (&occurrence.value, slot.packed) {
            (WireValue::Len(payload), Some(position)) => Some((payload.clone(), position)),
            _ => None,
        };
        let replacement = match packed_payload {
            Some((payload, position)) => {
                let mut payload = unpack(&payload, T::WIRE_TYPE)?;
                packed_edit(&mut payload, position);
                (!payload.is_empty())
                    .then(|| Occurrence::new(occurrence.index, number, pack(&payload)))
            }
            None => plain_edit(occurrence),
        };
        if let Some(replacement) = replacement {
            bucket.insert(slot.occurrence, replacement);
        }
        // zero-element packed payloads left behind keep the field present
        if elements(&bucket, number, T::WIRE_TYPE)?.is_empty() {
            bucket.clear();
        }

        let mut doc = self.clone();
        doc.put_bucket(number, bucket);
        Ok(doc)
    }

    /// Embedded message field decoded as its own document
    pub fn get_message_field(&self, number: u32) -> Result<Option<WireJson>> {
        self.get_field::<types::Message>(number)?
            .map(|data| WireJson::from_message(&data))
            .transpose()
    }
}
