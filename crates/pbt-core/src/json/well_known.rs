//! JSON mappings of the `google.protobuf` well-known types.

use super::parse::{json_str, Parser};
use super::print::{default_value, Printer};
use crate::descriptor::resolve_message;
use crate::editor::types::{Blob, Int32, Int64, ProtoType, Str};
use crate::error::{Error, Result};
use crate::wire::{WireJson, WireValue};
use bytes::Bytes;
use chrono::DateTime;
use prost_reflect::{FieldDescriptor, MessageDescriptor};
use serde_json::{json, Map, Value};

const ANY: &str = "google.protobuf.Any";
const TIMESTAMP: &str = "google.protobuf.Timestamp";
const DURATION: &str = "google.protobuf.Duration";
const STRUCT: &str = "google.protobuf.Struct";
const VALUE: &str = "google.protobuf.Value";
const LIST_VALUE: &str = "google.protobuf.ListValue";
const EMPTY: &str = "google.protobuf.Empty";
const FIELD_MASK: &str = "google.protobuf.FieldMask";

const WRAPPERS: [&str; 9] = [
    "google.protobuf.DoubleValue",
    "google.protobuf.FloatValue",
    "google.protobuf.Int64Value",
    "google.protobuf.UInt64Value",
    "google.protobuf.Int32Value",
    "google.protobuf.UInt32Value",
    "google.protobuf.BoolValue",
    "google.protobuf.StringValue",
    "google.protobuf.BytesValue",
];

/// 0001-01-01T00:00:00Z
const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;
/// 9999-12-31T23:59:59Z
const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;
/// Roughly 10,000 years
const MAX_DURATION_SECONDS: i64 = 315_576_000_000;
const NANOS_PER_SECOND: i32 = 1_000_000_000;

pub(super) fn is_well_known(name: &str) -> bool {
    matches!(
        name,
        ANY | TIMESTAMP | DURATION | STRUCT | VALUE | LIST_VALUE | EMPTY | FIELD_MASK
    ) || WRAPPERS.contains(&name)
}

fn first_field(descriptor: &MessageDescriptor) -> Result<FieldDescriptor> {
    descriptor
        .get_field(1)
        .ok_or_else(|| Error::unknown_field(descriptor.full_name(), 1))
}

pub(super) fn print(
    printer: &Printer<'_>,
    descriptor: &MessageDescriptor,
    doc: &WireJson,
    depth: usize,
) -> Result<Value> {
    let name = descriptor.full_name();
    match name {
        TIMESTAMP => timestamp_string(doc).map(Value::String),
        DURATION => duration_string(doc).map(Value::String),
        EMPTY => Ok(json!({})),
        FIELD_MASK => {
            let paths: Vec<String> = doc
                .get_repeated_all::<Str>(1)?
                .into_iter()
                .flatten()
                .map(|path| snake_to_camel(&path))
                .collect();
            Ok(json!(paths.join(",")))
        }
        STRUCT => {
            let fields = first_field(descriptor)?;
            Ok(printer.field(&fields, doc, depth)?.unwrap_or_else(|| json!({})))
        }
        LIST_VALUE => {
            let values = first_field(descriptor)?;
            Ok(printer.field(&values, doc, depth)?.unwrap_or_else(|| json!([])))
        }
        VALUE => value_json(printer, descriptor, doc, depth),
        ANY => any_json(printer, doc, depth),
        _ => {
            let value = first_field(descriptor)?;
            Ok(printer
                .singular(&value, doc, depth)?
                .unwrap_or_else(|| default_value(&value.kind())))
        }
    }
}

pub(super) fn parse(
    parser: &Parser<'_>,
    descriptor: &MessageDescriptor,
    value: &Value,
    path: &str,
    depth: usize,
) -> Result<WireJson> {
    let mut doc = WireJson::new();
    match descriptor.full_name() {
        TIMESTAMP => {
            let (seconds, nanos) = parse_timestamp(json_str(value, path)?, path)?;
            write_seconds_nanos(&mut doc, seconds, nanos);
        }
        DURATION => {
            let (seconds, nanos) = parse_duration(json_str(value, path)?, path)?;
            write_seconds_nanos(&mut doc, seconds, nanos);
        }
        EMPTY => {
            if !value.is_object() {
                return Err(Error::invalid_json(path, "expected {} for Empty"));
            }
        }
        FIELD_MASK => {
            for part in json_str(value, path)?.split(',').filter(|p| !p.is_empty()) {
                doc.push(1, WireValue::Len(Bytes::from(camel_to_snake(part))));
            }
        }
        STRUCT => {
            if !value.is_object() {
                return Err(Error::invalid_json(path, "expected object for Struct"));
            }
            parser.field(&mut doc, &first_field(descriptor)?, value, path, depth)?;
        }
        LIST_VALUE => {
            if !value.is_array() {
                return Err(Error::invalid_json(path, "expected array for ListValue"));
            }
            parser.field(&mut doc, &first_field(descriptor)?, value, path, depth)?;
        }
        VALUE => {
            // kind oneof: null, number, string, bool, struct, list
            let number = match value {
                Value::Null => 1,
                Value::Number(_) => 2,
                Value::String(_) => 3,
                Value::Bool(_) => 4,
                Value::Object(_) => 5,
                Value::Array(_) => 6,
            };
            let field = descriptor
                .get_field(number)
                .ok_or_else(|| Error::unknown_field(VALUE, number))?;
            parser.field(&mut doc, &field, value, path, depth)?;
        }
        ANY => return parse_any(parser, value, path, depth),
        _ => parser.field(&mut doc, &first_field(descriptor)?, value, path, depth)?,
    }
    Ok(doc)
}

fn write_seconds_nanos(doc: &mut WireJson, seconds: i64, nanos: i32) {
    if seconds != 0 {
        doc.replace_field(1, Int64::encode(&seconds));
    }
    if nanos != 0 {
        doc.replace_field(2, Int32::encode(&nanos));
    }
}

fn seconds_nanos(doc: &WireJson) -> Result<(i64, i32)> {
    Ok((
        doc.get_field::<Int64>(1)?.unwrap_or_default(),
        doc.get_field::<Int32>(2)?.unwrap_or_default(),
    ))
}

/// Fraction digits in groups of three, none for whole seconds
fn fraction(nanos: u32) -> String {
    if nanos == 0 {
        String::new()
    } else if nanos % 1_000_000 == 0 {
        format!(".{:03}", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!(".{:06}", nanos / 1_000)
    } else {
        format!(".{:09}", nanos)
    }
}

fn timestamp_string(doc: &WireJson) -> Result<String> {
    let (seconds, nanos) = seconds_nanos(doc)?;
    let out_of_range = || {
        Error::invalid_json(
            TIMESTAMP,
            format!("seconds {} nanos {} out of range", seconds, nanos),
        )
    };
    if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&seconds)
        || !(0..NANOS_PER_SECOND).contains(&nanos)
    {
        return Err(out_of_range());
    }
    let nanos = nanos.unsigned_abs();
    let time = DateTime::from_timestamp(seconds, nanos).ok_or_else(out_of_range)?;
    Ok(format!(
        "{}{}Z",
        time.format("%Y-%m-%dT%H:%M:%S"),
        fraction(nanos)
    ))
}

fn parse_timestamp(text: &str, path: &str) -> Result<(i64, i32)> {
    let time = DateTime::parse_from_rfc3339(text)
        .map_err(|e| Error::invalid_json(path, format!("invalid timestamp '{}': {}", text, e)))?;
    let seconds = time.timestamp();
    let nanos = i32::try_from(time.timestamp_subsec_nanos()).unwrap_or(NANOS_PER_SECOND);
    if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&seconds)
        || nanos >= NANOS_PER_SECOND
    {
        return Err(Error::invalid_json(path, format!("timestamp '{}' out of range", text)));
    }
    Ok((seconds, nanos))
}

fn duration_string(doc: &WireJson) -> Result<String> {
    let (seconds, nanos) = seconds_nanos(doc)?;
    if seconds.abs() > MAX_DURATION_SECONDS
        || nanos.abs() >= NANOS_PER_SECOND
        || (seconds > 0 && nanos < 0)
        || (seconds < 0 && nanos > 0)
    {
        return Err(Error::invalid_json(
            DURATION,
            format!("seconds {} nanos {} out of range", seconds, nanos),
        ));
    }
    let sign = if seconds < 0 || nanos < 0 { "-" } else { "" };
    Ok(format!(
        "{}{}{}s",
        sign,
        seconds.unsigned_abs(),
        fraction(nanos.unsigned_abs())
    ))
}

fn parse_duration(text: &str, path: &str) -> Result<(i64, i32)> {
    let invalid = || Error::invalid_json(path, format!("invalid duration '{}'", text));
    let body = text.strip_suffix('s').ok_or_else(invalid)?;
    let (negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !digits(whole) || !digits(frac) || frac.len() > 9 {
        return Err(invalid());
    }

    let seconds: i64 = whole.parse().map_err(|_| invalid())?;
    let nanos: i32 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac).parse().map_err(|_| invalid())?
    };
    if seconds > MAX_DURATION_SECONDS {
        return Err(invalid());
    }
    Ok(if negative {
        (-seconds, -nanos)
    } else {
        (seconds, nanos)
    })
}

fn value_json(
    printer: &Printer<'_>,
    descriptor: &MessageDescriptor,
    doc: &WireJson,
    depth: usize,
) -> Result<Value> {
    // the member written last is the one set
    let present = descriptor
        .fields()
        .filter_map(|f| doc.occurrences(f.number()).last().map(|o| (o.index, f)))
        .max_by_key(|(index, _)| *index);
    let Some((_, field)) = present else {
        return Ok(Value::Null);
    };
    let value = printer.singular(&field, doc, depth)?.unwrap_or(Value::Null);
    if field.number() == 2 && value.is_string() {
        return Err(Error::invalid_json(VALUE, "number_value must be finite"));
    }
    Ok(value)
}

fn type_name_of(type_url: &str) -> &str {
    type_url.rsplit_once('/').map_or(type_url, |(_, name)| name)
}

fn any_json(printer: &Printer<'_>, doc: &WireJson, depth: usize) -> Result<Value> {
    let type_url = doc.get_field::<Str>(1)?.unwrap_or_default();
    let payload = doc.get_field::<Blob>(2)?.unwrap_or_default();
    if type_url.is_empty() {
        return Ok(json!({}));
    }
    let descriptor = resolve_message(printer.pool, type_name_of(&type_url))?;
    let inner = WireJson::from_message(&payload)?;

    let mut object = Map::new();
    object.insert("@type".to_string(), json!(type_url));
    if is_well_known(descriptor.full_name()) {
        object.insert(
            "value".to_string(),
            printer.message(&descriptor, &inner, depth + 1)?,
        );
    } else {
        printer.fields_into(&mut object, &descriptor, &inner, depth + 1)?;
    }
    Ok(Value::Object(object))
}

fn parse_any(parser: &Parser<'_>, value: &Value, path: &str, depth: usize) -> Result<WireJson> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::invalid_json(path, "expected object for Any"))?;
    let type_url = match object.get("@type") {
        Some(url) => json_str(url, path)?,
        None if object.is_empty() => return Ok(WireJson::new()),
        None => return Err(Error::invalid_json(path, "Any is missing '@type'")),
    };
    let descriptor = resolve_message(parser.pool, type_name_of(type_url))?;

    let inner = if is_well_known(descriptor.full_name()) {
        let embedded = object
            .get("value")
            .ok_or_else(|| Error::invalid_json(path, "Any of a well-known type needs 'value'"))?;
        parser.message(&descriptor, embedded, &format!("{}.value", path), depth + 1)?
    } else {
        let rest: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| key.as_str() != "@type")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let mut inner = WireJson::new();
        parser.fields_into(&mut inner, &descriptor, &rest, path, depth + 1)?;
        inner
    };

    let mut doc = WireJson::new();
    doc.replace_field(1, Str::encode(&type_url.to_string()));
    let payload = inner.to_message();
    if !payload.is_empty() {
        doc.replace_field(2, Blob::encode(&Bytes::from(payload)));
    }
    Ok(doc)
}

fn snake_to_camel(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut upper = false;
    for c in path.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn camel_to_snake(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 4);
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds_doc(seconds: i64, nanos: i32) -> WireJson {
        let mut doc = WireJson::new();
        write_seconds_nanos(&mut doc, seconds, nanos);
        doc
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(timestamp_string(&seconds_doc(0, 0)).unwrap(), "1970-01-01T00:00:00Z");
        assert_eq!(
            timestamp_string(&seconds_doc(1_700_000_000, 500_000_000)).unwrap(),
            "2023-11-14T22:13:20.500Z"
        );
        assert_eq!(
            timestamp_string(&seconds_doc(-1, 1_000)).unwrap(),
            "1969-12-31T23:59:59.000001Z"
        );
        assert!(timestamp_string(&seconds_doc(MAX_TIMESTAMP_SECONDS + 1, 0)).is_err());
        assert!(timestamp_string(&seconds_doc(0, -1)).is_err());
    }

    #[test]
    fn test_timestamp_parse() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z", "$").unwrap(), (0, 0));
        assert_eq!(
            parse_timestamp("2023-11-14T23:13:20.5+01:00", "$").unwrap(),
            (1_700_000_000, 500_000_000)
        );
        assert!(parse_timestamp("yesterday", "$").is_err());
    }

    #[test]
    fn test_duration() {
        assert_eq!(duration_string(&seconds_doc(1, 500_000_000)).unwrap(), "1.500s");
        assert_eq!(duration_string(&seconds_doc(-3, -1)).unwrap(), "-3.000000001s");
        assert_eq!(duration_string(&seconds_doc(0, -5_000_000)).unwrap(), "-0.005s");
        assert!(duration_string(&seconds_doc(1, -1)).is_err());

        assert_eq!(parse_duration("1.5s", "$").unwrap(), (1, 500_000_000));
        assert_eq!(parse_duration("-0.005s", "$").unwrap(), (0, -5_000_000));
        assert_eq!(parse_duration("30s", "$").unwrap(), (30, 0));
        assert!(parse_duration("1.5", "$").is_err());
        assert!(parse_duration("1.0000000001s", "$").is_err());
        assert!(parse_duration("+1s", "$").is_err());
    }

    #[test]
    fn test_field_mask_names() {
        assert_eq!(snake_to_camel("user.display_name"), "user.displayName");
        assert_eq!(camel_to_snake("user.displayName"), "user.display_name");
    }

    #[test]
    fn test_type_url() {
        assert_eq!(type_name_of("type.googleapis.com/pkg.Msg"), "pkg.Msg");
        assert_eq!(type_name_of("pkg.Msg"), "pkg.Msg");
    }

    #[test]
    fn test_well_known_names() {
        assert!(is_well_known("google.protobuf.Int64Value"));
        assert!(is_well_known(TIMESTAMP));
        assert!(!is_well_known("google.protobuf.FileDescriptorSet"));
    }
}
