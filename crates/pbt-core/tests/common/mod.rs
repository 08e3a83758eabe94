//! Shared fixtures: a schema compiled from `.proto` text with protox.

#![allow(dead_code)]

use pbt_core::DescriptorStore;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use std::fs;

pub const SET: &str = "test";

pub const TEST_PROTO: &str = r#"
syntax = "proto3";

package test;

import "google/protobuf/any.proto";
import "google/protobuf/duration.proto";
import "google/protobuf/empty.proto";
import "google/protobuf/field_mask.proto";
import "google/protobuf/struct.proto";
import "google/protobuf/timestamp.proto";
import "google/protobuf/wrappers.proto";

enum EnumType {
  ENUM_TYPE_UNSPECIFIED = 0;
  ENUM_TYPE_ONE = 1;
  ENUM_TYPE_TWO = 2;
}

message Nested {
  int32 value = 1;
  string label = 2;
}

message Scalars {
  double double_field = 1;
  float float_field = 2;
  int32 int32_field = 3;
  int64 int64_field = 4;
  uint32 uint32_field = 5;
  uint64 uint64_field = 6;
  sint32 sint32_field = 7;
  sint64 sint64_field = 8;
  fixed32 fixed32_field = 9;
  fixed64 fixed64_field = 10;
  sfixed32 sfixed32_field = 11;
  sfixed64 sfixed64_field = 12;
  bool bool_field = 13;
  string string_field = 14;
  bytes bytes_field = 15;
  EnumType enum_field = 16;
  Nested nested_field = 17;
  repeated int32 repeated_int32 = 18;
  repeated string repeated_string = 19;
  repeated Nested repeated_nested = 20;
  repeated EnumType repeated_enum = 21;
  map<string, int32> string_map = 22;
  map<int64, Nested> int64_map = 23;
  map<bool, string> bool_map = 24;
  oneof choice {
    string choice_text = 25;
    Nested choice_nested = 26;
    int32 choice_number = 27;
  }
  optional int32 optional_int32 = 28;
  string custom_name = 29 [json_name = "renamed"];
}

message WellKnown {
  google.protobuf.Timestamp timestamp = 1;
  google.protobuf.Duration duration = 2;
  google.protobuf.Struct struct_field = 3;
  google.protobuf.Value value = 4;
  google.protobuf.ListValue list_value = 5;
  google.protobuf.Int64Value int64_wrapper = 6;
  google.protobuf.StringValue string_wrapper = 7;
  google.protobuf.BoolValue bool_wrapper = 8;
  google.protobuf.FieldMask mask = 9;
  google.protobuf.Any any = 10;
  google.protobuf.Empty empty = 11;
  google.protobuf.NullValue null_value = 12;
  google.protobuf.DoubleValue double_wrapper = 13;
}
"#;

/// Compile [`TEST_PROTO`] into an encoded FileDescriptorSet
pub fn descriptor_set_bytes() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("test.proto"), TEST_PROTO).unwrap();

    let mut compiler = protox::Compiler::new([dir.path()]).unwrap();
    compiler.include_imports(true);
    compiler.open_file("test.proto").unwrap();
    compiler.file_descriptor_set().encode_to_vec()
}

pub fn store() -> DescriptorStore {
    let mut store = DescriptorStore::new();
    store.load(SET, &descriptor_set_bytes()).unwrap();
    store
}

/// Reference pool for prost-reflect comparisons
pub fn reference_pool() -> DescriptorPool {
    DescriptorPool::decode(descriptor_set_bytes().as_slice()).unwrap()
}

pub fn reference_descriptor(name: &str) -> MessageDescriptor {
    reference_pool().get_message_by_name(name).unwrap()
}

/// Encode a JSON value with the reference implementation
pub fn reference_encode(name: &str, json: &serde_json::Value) -> Vec<u8> {
    let message = DynamicMessage::deserialize(reference_descriptor(name), json.clone()).unwrap();
    message.encode_to_vec()
}

/// Canonical JSON of encoded bytes from the reference implementation
pub fn reference_json(name: &str, data: &[u8]) -> serde_json::Value {
    let message = DynamicMessage::decode(reference_descriptor(name), data).unwrap();
    serde_json::to_value(&message).unwrap()
}
