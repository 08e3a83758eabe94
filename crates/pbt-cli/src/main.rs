//! pbt - Inspect, edit and convert Protocol Buffer messages
//!
//! This tool decodes binary messages into the wire_json intermediate form,
//! encodes them back, reads single typed fields, and converts messages to
//! and from canonical protobuf JSON using a descriptor set.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pbt_core::editor::types::{
    Blob, Bool, Double, Enum, Fixed32, Fixed64, Float, Int32, Int64, Message, SFixed32, SFixed64,
    SInt32, SInt64, Str, UInt32, UInt64,
};
use pbt_core::{json, DescriptorStore, Error, FieldRef, JsonOptions, ProtoType, WireJson};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Name the CLI registers its descriptor set under
const SET_NAME: &str = "cli";

/// Inspect, edit and convert Protocol Buffer messages
#[derive(Parser, Debug)]
#[command(name = "pbt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a binary message into wire_json
    Decode {
        #[command(flatten)]
        source: IoArgs,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Encode wire_json into a binary message
    Encode {
        #[command(flatten)]
        source: IoArgs,
    },

    /// Convert a binary message to JSON
    ToJson {
        #[command(flatten)]
        source: IoArgs,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Print fields that hold their default value
        #[arg(long)]
        emit_defaults: bool,

        /// Key objects by field number instead of JSON name
        #[arg(long)]
        numbers: bool,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Convert JSON to a binary message
    FromJson {
        #[command(flatten)]
        source: IoArgs,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Input keys objects by field number
        #[arg(long)]
        numbers: bool,
    },

    /// Read one typed field from a binary message
    Get {
        #[command(flatten)]
        source: IoArgs,

        /// Field number
        #[arg(short, long)]
        field: u32,

        /// Protobuf type of the field
        #[arg(short, long, value_enum)]
        kind: FieldType,

        /// Element index for repeated fields
        #[arg(long, allow_negative_numbers = true)]
        index: Option<i64>,

        /// Print the number of repeated elements instead of a value
        #[arg(long, conflicts_with = "index")]
        count: bool,
    },

    /// Describe a field of a message type
    Field {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Field number or name
        #[arg(short, long)]
        field: String,
    },
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Read input from a file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Binary messages are base64 text, on input and output
    #[arg(long)]
    base64: bool,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Encoded FileDescriptorSet (protoc --descriptor_set_out)
    #[arg(short, long)]
    descriptor_set: PathBuf,

    /// Fully-qualified message type name
    #[arg(short = 't', long = "type")]
    type_name: String,
}

/// Protobuf field types accepted by `get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FieldType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Decode { source, pretty } => {
            let doc = WireJson::from_message(&read_message(&source)?)
                .context("Failed to decode message")?;
            info!("Decoded {} field occurrence(s)", doc.len());
            print_json(&doc.to_json_value(), pretty)
        }
        Command::Encode { source } => {
            let text = String::from_utf8(read_input(source.input.as_deref())?)
                .context("wire_json input is not UTF-8")?;
            let doc: WireJson = text.trim().parse().context("Failed to parse wire_json")?;
            write_message(&doc.to_message(), source.base64)
        }
        Command::ToJson {
            source,
            schema,
            emit_defaults,
            numbers,
            pretty,
        } => {
            let store = load_store(&schema.descriptor_set)?;
            let options = json_options(numbers).emit_default_values(emit_defaults);
            let value = json::message_to_json(
                &store,
                SET_NAME,
                &schema.type_name,
                &read_message(&source)?,
                &options,
            )
            .with_context(|| format!("Failed to convert message to {} JSON", schema.type_name))?;
            print_json(&value, pretty)
        }
        Command::FromJson {
            source,
            schema,
            numbers,
        } => {
            let store = load_store(&schema.descriptor_set)?;
            let value: serde_json::Value = serde_json::from_slice(&read_input(source.input.as_deref())?)
                .context("Failed to parse JSON input")?;
            let data = json::json_to_message(
                &store,
                SET_NAME,
                &schema.type_name,
                &value,
                &json_options(numbers),
            )
            .with_context(|| format!("Failed to convert JSON to {}", schema.type_name))?;
            write_message(&data, source.base64)
        }
        Command::Get {
            source,
            field,
            kind,
            index,
            count,
        } => {
            let doc = WireJson::from_message(&read_message(&source)?)
                .context("Failed to decode message")?;
            let query = Query {
                number: field,
                index,
                count,
            };
            println!("{}", query.run(&doc, kind)?);
            Ok(())
        }
        Command::Field { schema, field } => {
            let store = load_store(&schema.descriptor_set)?;
            let reference = FieldRef::from(field.as_str());
            let info = store.resolve_field(SET_NAME, &schema.type_name, reference.clone())?;
            let siblings = store.oneof_siblings(SET_NAME, &schema.type_name, reference)?;
            println!("{}", info);
            println!("json_name: {}", info.json_name);
            if info.proto3_optional {
                println!("presence: explicit (proto3 optional)");
            }
            if !siblings.is_empty() {
                let numbers: Vec<String> = siblings.iter().map(u32::to_string).collect();
                println!("oneof siblings: {}", numbers.join(", "));
            }
            Ok(())
        }
    }
}

fn json_options(numbers: bool) -> JsonOptions {
    if numbers {
        JsonOptions::numbers()
    } else {
        JsonOptions::new()
    }
}

/// Load a descriptor set file into a fresh store
fn load_store(path: &Path) -> Result<DescriptorStore> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
    let mut store = DescriptorStore::new();
    store
        .load(SET_NAME, &bytes)
        .with_context(|| format!("Invalid descriptor set: {}", path.display()))?;
    debug!("Loaded descriptor set from {}", path.display());
    Ok(store)
}

/// Read a file, or stdin when no path is given
fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            if !path.is_file() {
                bail!("Input file does not exist: {}", path.display());
            }
            fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Read a binary message, decoding base64 text if requested
fn read_message(source: &IoArgs) -> Result<Vec<u8>> {
    let raw = read_input(source.input.as_deref())?;
    if source.base64 {
        decode_base64(&raw)
    } else {
        Ok(raw)
    }
}

fn decode_base64(raw: &[u8]) -> Result<Vec<u8>> {
    let text: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(text).context("Input is not valid base64")
}

fn write_message(data: &[u8], base64: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if base64 {
        writeln!(stdout, "{}", STANDARD.encode(data))?;
    } else {
        stdout.write_all(data)?;
    }
    stdout.flush().context("Failed to write output")
}

fn print_json(value: &serde_json::Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn display<V: std::fmt::Display>(value: &V) -> String {
    value.to_string()
}

fn blob(value: &Bytes) -> String {
    STANDARD.encode(value)
}

/// A typed read of one field
#[derive(Debug, Clone, Copy)]
struct Query {
    number: u32,
    index: Option<i64>,
    count: bool,
}

impl Query {
    fn run(&self, doc: &WireJson, kind: FieldType) -> Result<String> {
        match kind {
            FieldType::Int32 => self.read::<Int32>(doc, display),
            FieldType::Int64 => self.read::<Int64>(doc, display),
            FieldType::Uint32 => self.read::<UInt32>(doc, display),
            FieldType::Uint64 => self.read::<UInt64>(doc, display),
            FieldType::Sint32 => self.read::<SInt32>(doc, display),
            FieldType::Sint64 => self.read::<SInt64>(doc, display),
            FieldType::Fixed32 => self.read::<Fixed32>(doc, display),
            FieldType::Fixed64 => self.read::<Fixed64>(doc, display),
            FieldType::Sfixed32 => self.read::<SFixed32>(doc, display),
            FieldType::Sfixed64 => self.read::<SFixed64>(doc, display),
            FieldType::Float => self.read::<Float>(doc, display),
            FieldType::Double => self.read::<Double>(doc, display),
            FieldType::Bool => self.read::<Bool>(doc, display),
            FieldType::String => self.read::<Str>(doc, display),
            FieldType::Enum => self.read::<Enum>(doc, display),
            FieldType::Bytes => self.read::<Blob>(doc, blob),
            FieldType::Message => self.read::<Message>(doc, blob),
        }
    }

    /// Missing values print as `null`
    fn read<T: ProtoType>(&self, doc: &WireJson, render: impl Fn(&T::Value) -> String) -> Result<String> {
        if self.count {
            return Ok(doc.repeated_count::<T>(self.number)?.to_string());
        }
        let value = match self.index {
            None => doc.get_field::<T>(self.number)?,
            Some(index) => {
                let position = usize::try_from(index).map_err(|_| {
                    let count = doc.repeated_count::<T>(self.number).unwrap_or(0);
                    Error::index_out_of_range(self.number, index, count)
                })?;
                doc.get_repeated::<T>(self.number, position)?
            }
        };
        Ok(value.as_ref().map_or_else(|| "null".to_string(), render))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample() -> WireJson {
        // 1: 150, 2: "hi", 3: packed [1, 2, 3]
        WireJson::from_message(&[
            0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i', 0x1A, 0x03, 0x01, 0x02, 0x03,
        ])
        .unwrap()
    }

    fn query(number: u32, index: Option<i64>) -> Query {
        Query {
            number,
            index,
            count: false,
        }
    }

    #[test]
    fn test_get_scalars() {
        let doc = sample();
        assert_eq!(query(1, None).run(&doc, FieldType::Int32).unwrap(), "150");
        assert_eq!(query(2, None).run(&doc, FieldType::String).unwrap(), "hi");
        assert_eq!(query(2, None).run(&doc, FieldType::Bytes).unwrap(), "aGk=");
        assert_eq!(query(9, None).run(&doc, FieldType::Int64).unwrap(), "null");
    }

    #[test]
    fn test_get_repeated() {
        let doc = sample();
        assert_eq!(query(3, Some(2)).run(&doc, FieldType::Uint32).unwrap(), "3");
        let count = Query {
            number: 3,
            index: None,
            count: true,
        };
        assert_eq!(count.run(&doc, FieldType::Uint32).unwrap(), "3");
    }

    #[test]
    fn test_get_negative_index() {
        let err = query(3, Some(-1)).run(&sample(), FieldType::Int32).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::IndexOutOfRange { index: -1, count: 3, .. })
        ));
    }

    #[test]
    fn test_read_input_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"CJYB\n").unwrap();
        let source = IoArgs {
            input: Some(file.path().to_path_buf()),
            base64: true,
        };
        assert_eq!(read_message(&source).unwrap(), vec![0x08, 0x96, 0x01]);
        assert!(read_input(Some(Path::new("/nonexistent/pbt-input"))).is_err());
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(decode_base64(b"not base64!").is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
