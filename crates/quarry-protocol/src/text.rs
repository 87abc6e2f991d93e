//! Text components.
//!
//! Chat lines, disconnect reasons and the MOTD arrive as text components:
//! either a bare string or an object with `text`, `translate`, `with` and
//! `extra` children. Status and login packets carry them as JSON. Later
//! states carry them as network NBT, which [`read_nbt`] converts into the
//! same `serde_json::Value` shape so [`flatten`] handles both.

use serde_json::{Map, Value};

use crate::ProtocolError;
use crate::wire::PacketReader;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

const MAX_DEPTH: usize = 64;

/// Concatenates the visible text of a component.
///
/// Translated components contribute their key followed by their
/// arguments, which is enough to recognise them in logs.
pub fn flatten(component: &Value) -> String {
    let mut out = String::new();
    flatten_into(component, &mut out);
    out
}

fn flatten_into(component: &Value, out: &mut String) {
    match component {
        Value::String(s) => out.push_str(s),
        Value::Array(parts) => parts.iter().for_each(|p| flatten_into(p, out)),
        Value::Object(obj) => {
            if let Some(Value::String(text)) = obj.get("text") {
                out.push_str(text);
            } else if let Some(Value::String(text)) = obj.get("") {
                // Heterogeneous NBT lists wrap plain strings this way.
                out.push_str(text);
            }
            if let Some(Value::String(key)) = obj.get("translate") {
                out.push_str(key);
                if let Some(Value::Array(args)) = obj.get("with") {
                    for arg in args {
                        out.push(' ');
                        flatten_into(arg, out);
                    }
                }
            }
            if let Some(Value::Array(extra)) = obj.get("extra") {
                extra.iter().for_each(|e| flatten_into(e, out));
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => {}
    }
}

/// Parses a JSON text component (login disconnects, status MOTD).
pub fn parse_json(raw: &str) -> Result<Value, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

/// Reads one network NBT value: a tag type byte followed by an unnamed
/// payload.
pub fn read_nbt(reader: &mut PacketReader<'_>) -> Result<Value, ProtocolError> {
    let tag = reader.read_u8()?;
    if tag == TAG_END {
        return Ok(Value::Null);
    }
    read_payload(reader, tag, 0)
}

fn read_nbt_string(reader: &mut PacketReader<'_>) -> Result<String, ProtocolError> {
    let len = reader.read_u16()? as usize;
    let bytes = reader.read_bytes(len)?;
    // Modified UTF-8 differs only for NUL and supplementary characters.
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_count(reader: &mut PacketReader<'_>) -> Result<usize, ProtocolError> {
    let n = reader.read_i32()?;
    if n < 0 || n as usize > reader.remaining() {
        return Err(ProtocolError::InvalidNbt(format!("bad element count {n}")));
    }
    Ok(n as usize)
}

fn read_payload(
    reader: &mut PacketReader<'_>,
    tag: u8,
    depth: usize,
) -> Result<Value, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::InvalidNbt("nesting too deep".into()));
    }
    let value = match tag {
        TAG_BYTE => Value::from(reader.read_i8()?),
        TAG_SHORT => Value::from(reader.read_i16()?),
        TAG_INT => Value::from(reader.read_i32()?),
        TAG_LONG => Value::from(reader.read_i64()?),
        TAG_FLOAT => Value::from(reader.read_f32()? as f64),
        TAG_DOUBLE => Value::from(reader.read_f64()?),
        TAG_BYTE_ARRAY => {
            let n = read_count(reader)?;
            Value::Array(
                reader
                    .read_bytes(n)?
                    .iter()
                    .map(|b| Value::from(*b as i8))
                    .collect(),
            )
        }
        TAG_STRING => Value::String(read_nbt_string(reader)?),
        TAG_LIST => {
            let elem = reader.read_u8()?;
            let n = reader.read_i32()?;
            if n <= 0 || elem == TAG_END {
                Value::Array(Vec::new())
            } else {
                let mut items = Vec::new();
                for _ in 0..n {
                    items.push(read_payload(reader, elem, depth + 1)?);
                }
                Value::Array(items)
            }
        }
        TAG_COMPOUND => {
            let mut map = Map::new();
            loop {
                let child = reader.read_u8()?;
                if child == TAG_END {
                    break;
                }
                let name = read_nbt_string(reader)?;
                let value = read_payload(reader, child, depth + 1)?;
                map.insert(name, value);
            }
            Value::Object(map)
        }
        TAG_INT_ARRAY => {
            let n = read_count(reader)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(Value::from(reader.read_i32()?));
            }
            Value::Array(items)
        }
        TAG_LONG_ARRAY => {
            let n = read_count(reader)?;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(Value::from(reader.read_i64()?));
            }
            Value::Array(items)
        }
        other => {
            return Err(ProtocolError::InvalidNbt(format!("unknown tag type {other}")));
        }
    };
    Ok(value)
}
