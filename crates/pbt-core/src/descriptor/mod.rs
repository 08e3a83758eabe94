//! Descriptor sets and type resolution.
//!
//! A [`DescriptorStore`] holds named descriptor pools built from
//! `FileDescriptorSet`s. It is an ordinary value passed into every
//! resolution or JSON call; nothing in the crate keeps global state.
//!
//! ```no_run
//! use pbt_core::{DescriptorStore, FieldRef};
//!
//! let mut store = DescriptorStore::new();
//! store.load("app", &std::fs::read("app.desc")?)?;
//! let field = store.resolve_field("app", "app.User", FieldRef::from("email"))?;
//! println!("{}", field);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod field;

use crate::error::{Error, Result};
use prost::Message;
use prost_reflect::{DescriptorPool, EnumDescriptor, FieldDescriptor, MessageDescriptor};
use prost_types::FileDescriptorSet;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub use field::{FieldInfo, FieldKind, Label, ScalarKind};

/// A field addressed by number or by declared name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    /// Field number
    Number(u32),
    /// Declared field name (the JSON name is accepted as well)
    Name(String),
}

impl From<u32> for FieldRef {
    fn from(number: u32) -> Self {
        FieldRef::Number(number)
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        // numeric strings address by number
        match name.parse() {
            Ok(number) => FieldRef::Number(number),
            Err(_) => FieldRef::Name(name.to_string()),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Number(n) => write!(f, "{}", n),
            FieldRef::Name(name) => f.write_str(name),
        }
    }
}

/// Named registry of descriptor pools
#[derive(Debug, Clone, Default)]
pub struct DescriptorStore {
    sets: BTreeMap<String, DescriptorPool>,
}

impl DescriptorStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an encoded `FileDescriptorSet` under `name`, replacing any
    /// previous set of that name
    pub fn load(&mut self, name: &str, file_descriptor_set: &[u8]) -> Result<()> {
        // decode with prost first so malformed bytes surface as DescriptorParse
        FileDescriptorSet::decode(file_descriptor_set)?;
        let pool = DescriptorPool::decode(file_descriptor_set)
            .map_err(|e| Error::descriptor_build(e.to_string()))?;
        debug!(
            "loaded descriptor set '{}' with {} message type(s)",
            name,
            pool.all_messages().count()
        );
        self.sets.insert(name.to_string(), pool);
        Ok(())
    }

    /// Register an already decoded `FileDescriptorSet`
    pub fn load_set(&mut self, name: &str, set: &FileDescriptorSet) -> Result<()> {
        let mut bytes = Vec::new();
        set.encode(&mut bytes).map_err(|e| {
            Error::descriptor_build(format!("failed to encode descriptor set: {}", e))
        })?;
        self.load(name, &bytes)
    }

    /// True if a set is registered under `name`
    pub fn exists(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    /// Remove a set; returns whether it existed
    pub fn delete(&mut self, name: &str) -> bool {
        self.sets.remove(name).is_some()
    }

    /// Registered set names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// The pool registered under `name`
    pub fn pool(&self, name: &str) -> Result<&DescriptorPool> {
        self.sets.get(name).ok_or_else(|| Error::UnknownDescriptorSet {
            name: name.to_string(),
        })
    }

    /// True if the set declares message type `type_name`
    pub fn contains_message_type(&self, set: &str, type_name: &str) -> Result<bool> {
        Ok(self
            .pool(set)?
            .get_message_by_name(strip_leading_dot(type_name))
            .is_some())
    }

    /// True if the set declares enum type `type_name`
    pub fn contains_enum_type(&self, set: &str, type_name: &str) -> Result<bool> {
        Ok(self
            .pool(set)?
            .get_enum_by_name(strip_leading_dot(type_name))
            .is_some())
    }

    /// Message descriptor by fully-qualified name
    pub fn resolve_message(&self, set: &str, type_name: &str) -> Result<MessageDescriptor> {
        resolve_message(self.pool(set)?, type_name)
    }

    /// Enum descriptor by fully-qualified name
    pub fn resolve_enum(&self, set: &str, type_name: &str) -> Result<EnumDescriptor> {
        let name = strip_leading_dot(type_name);
        self.pool(set)?
            .get_enum_by_name(name)
            .ok_or_else(|| Error::unknown_type(name))
    }

    /// Field metadata by number or name
    pub fn resolve_field(&self, set: &str, type_name: &str, field: FieldRef) -> Result<FieldInfo> {
        let message = self.resolve_message(set, type_name)?;
        FieldInfo::from_descriptor(&find_field(&message, &field)?)
    }

    /// Symbolic name of an enum number, `None` if undeclared
    pub fn enum_value_name(&self, set: &str, type_name: &str, number: i32) -> Result<Option<String>> {
        Ok(self
            .resolve_enum(set, type_name)?
            .get_value(number)
            .map(|v| v.name().to_string()))
    }

    /// Number of a symbolic enum value
    pub fn enum_value_number(&self, set: &str, type_name: &str, value: &str) -> Result<i32> {
        let descriptor = self.resolve_enum(set, type_name)?;
        enum_number(&descriptor, value)
    }

    /// Field numbers sharing a real oneof with `field`, the field excluded
    pub fn oneof_siblings(&self, set: &str, type_name: &str, field: FieldRef) -> Result<Vec<u32>> {
        let message = self.resolve_message(set, type_name)?;
        Ok(oneof_siblings(&find_field(&message, &field)?))
    }
}

pub(crate) fn strip_leading_dot(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

pub(crate) fn resolve_message(pool: &DescriptorPool, type_name: &str) -> Result<MessageDescriptor> {
    let name = strip_leading_dot(type_name);
    pool.get_message_by_name(name)
        .ok_or_else(|| Error::unknown_type(name))
}

pub(crate) fn find_field(message: &MessageDescriptor, field: &FieldRef) -> Result<FieldDescriptor> {
    let found = match field {
        FieldRef::Number(n) => message.get_field(*n),
        FieldRef::Name(name) => message
            .get_field_by_name(name)
            .or_else(|| message.fields().find(|f| f.json_name() == name)),
    };
    found.ok_or_else(|| Error::unknown_field(message.full_name(), field))
}

pub(crate) fn enum_number(descriptor: &EnumDescriptor, value: &str) -> Result<i32> {
    descriptor
        .get_value_by_name(value)
        .map(|v| v.number())
        .ok_or_else(|| Error::UnknownEnumName {
            enum_name: descriptor.full_name().to_string(),
            value: value.to_string(),
        })
}

/// Other members of the field's real oneof; empty outside one
pub(crate) fn oneof_siblings(field: &FieldDescriptor) -> Vec<u32> {
    if field.field_descriptor_proto().proto3_optional() {
        return Vec::new();
    }
    field
        .containing_oneof()
        .map(|oneof| {
            oneof
                .fields()
                .map(|f| f.number())
                .filter(|&n| n != field.number())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::field_descriptor_proto::{Label as ProtoLabel, Type};
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, MessageOptions, OneofDescriptorProto,
    };

    fn field(name: &str, number: i32, ty: Type, label: ProtoLabel) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(ty as i32),
            label: Some(label as i32),
            ..Default::default()
        }
    }

    fn typed(mut f: FieldDescriptorProto, type_name: &str) -> FieldDescriptorProto {
        f.type_name = Some(type_name.to_string());
        f
    }

    fn oneof_member(mut f: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
        f.oneof_index = Some(index);
        f
    }

    fn map_entry(name: &str, key: Type, value: Type) -> DescriptorProto {
        DescriptorProto {
            name: Some(name.to_string()),
            field: vec![
                field("key", 1, key, ProtoLabel::Optional),
                field("value", 2, value, ProtoLabel::Optional),
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn sample_set() -> FileDescriptorSet {
        let mut optional = field("nickname", 6, Type::String, ProtoLabel::Optional);
        optional.oneof_index = Some(1);
        optional.proto3_optional = Some(true);

        let user = DescriptorProto {
            name: Some("User".to_string()),
            field: vec![
                field("user_id", 1, Type::Int64, ProtoLabel::Optional),
                field("tags", 2, Type::Int32, ProtoLabel::Repeated),
                typed(field("status", 3, Type::Enum, ProtoLabel::Optional), ".test.Status"),
                oneof_member(field("email", 4, Type::String, ProtoLabel::Optional), 0),
                oneof_member(field("phone", 5, Type::String, ProtoLabel::Optional), 0),
                optional,
                typed(
                    field("attrs", 7, Type::Message, ProtoLabel::Repeated),
                    ".test.User.AttrsEntry",
                ),
            ],
            nested_type: vec![map_entry("AttrsEntry", Type::String, Type::Int32)],
            oneof_decl: vec![
                OneofDescriptorProto {
                    name: Some("contact".to_string()),
                    ..Default::default()
                },
                OneofDescriptorProto {
                    name: Some("_nickname".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let status = EnumDescriptorProto {
            name: Some("Status".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("STATUS_UNSPECIFIED".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("STATUS_ACTIVE".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("test.proto".to_string()),
                package: Some("test".to_string()),
                syntax: Some("proto3".to_string()),
                message_type: vec![user],
                enum_type: vec![status],
                ..Default::default()
            }],
        }
    }

    fn store() -> DescriptorStore {
        let mut store = DescriptorStore::new();
        store.load_set("s", &sample_set()).unwrap();
        store
    }

    #[test]
    fn test_registry_operations() {
        let mut store = store();
        assert!(store.exists("s"));
        assert!(!store.exists("other"));
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["s"]);
        assert!(store.delete("s"));
        assert!(!store.delete("s"));
        assert!(matches!(
            store.contains_message_type("s", "test.User"),
            Err(Error::UnknownDescriptorSet { .. })
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut store = DescriptorStore::new();
        assert!(store.load("bad", &[0x0A, 0x05, 0x01]).is_err());
        assert!(!store.exists("bad"));
    }

    #[test]
    fn test_contains_types() {
        let store = store();
        assert!(store.contains_message_type("s", "test.User").unwrap());
        assert!(store.contains_message_type("s", ".test.User").unwrap());
        assert!(!store.contains_message_type("s", "test.Nope").unwrap());
        assert!(store.contains_enum_type("s", "test.Status").unwrap());
        assert!(!store.contains_enum_type("s", "test.User").unwrap());
    }

    #[test]
    fn test_resolve_scalar_and_repeated() {
        let store = store();
        let id = store.resolve_field("s", "test.User", FieldRef::from(1)).unwrap();
        assert_eq!(id.name, "user_id");
        assert_eq!(id.json_name, "userId");
        assert_eq!(id.kind, FieldKind::Scalar(ScalarKind::Int64));
        assert_eq!(id.label, Label::Optional);

        let tags = store.resolve_field("s", "test.User", FieldRef::from("tags")).unwrap();
        assert_eq!(tags.label, Label::Repeated);
        assert!(tags.packed);
        assert!(!tags.is_map);

        let by_json = store.resolve_field("s", "test.User", FieldRef::from("userId")).unwrap();
        assert_eq!(by_json.number, 1);
    }

    #[test]
    fn test_resolve_enum_map_oneof() {
        let store = store();
        let status = store.resolve_field("s", "test.User", "status".into()).unwrap();
        assert_eq!(status.kind, FieldKind::Enum("test.Status".to_string()));

        let attrs = store.resolve_field("s", "test.User", 7.into()).unwrap();
        assert!(attrs.is_map);
        assert_eq!(
            attrs.kind,
            FieldKind::Map {
                key: ScalarKind::String,
                value: Box::new(FieldKind::Scalar(ScalarKind::Int32)),
            }
        );

        let email = store.resolve_field("s", "test.User", "email".into()).unwrap();
        assert_eq!(email.oneof_index, Some(0));
        assert!(email.in_real_oneof());

        let nickname = store.resolve_field("s", "test.User", "nickname".into()).unwrap();
        assert!(nickname.proto3_optional);
        assert!(!nickname.in_real_oneof());
    }

    #[test]
    fn test_oneof_siblings() {
        let store = store();
        assert_eq!(store.oneof_siblings("s", "test.User", 4.into()).unwrap(), vec![5]);
        assert!(store.oneof_siblings("s", "test.User", 6.into()).unwrap().is_empty());
        assert!(store.oneof_siblings("s", "test.User", 1.into()).unwrap().is_empty());
    }

    #[test]
    fn test_resolution_errors() {
        let store = store();
        assert!(matches!(
            store.resolve_field("s", "test.Missing", 1.into()),
            Err(Error::UnknownType { .. })
        ));
        assert!(matches!(
            store.resolve_field("s", "test.User", 99.into()),
            Err(Error::UnknownField { .. })
        ));
        assert!(matches!(
            store.enum_value_number("s", "test.Status", "NOPE"),
            Err(Error::UnknownEnumName { .. })
        ));
    }

    #[test]
    fn test_enum_values() {
        let store = store();
        assert_eq!(
            store.enum_value_name("s", "test.Status", 1).unwrap().as_deref(),
            Some("STATUS_ACTIVE")
        );
        assert_eq!(store.enum_value_name("s", "test.Status", 7).unwrap(), None);
        assert_eq!(store.enum_value_number("s", "test.Status", "STATUS_ACTIVE").unwrap(), 1);
    }

    #[test]
    fn test_invalid_map_key() {
        let mut set = sample_set();
        let user = &mut set.file[0].message_type[0];
        user.nested_type[0] = map_entry("AttrsEntry", Type::Double, Type::Int32);
        let mut store = DescriptorStore::new();
        // prost-reflect may reject the schema itself; either way it never resolves
        if store.load_set("s", &set).is_ok() {
            assert!(matches!(
                store.resolve_field("s", "test.User", 7.into()),
                Err(Error::InvalidMapKeyType { .. })
            ));
        }
    }
}
