//! AMF0 codec: the legacy Action Message Format, plus the `AVMPLUS`
//! marker that switches an AMF0 stream into an embedded AMF3 payload.
//!
//! Only `Object`, `ECMA Array`, `Strict Array` and `Typed Object` are
//! referenceable in AMF0 — `Date`, `String` and `XMLDocument` are not, and
//! are decoded/encoded inline every time.

use super::amf3;
use super::classmap::Mapper;
use super::reftable::{DecodeRefs, EncodeRefs};
use super::value::Value;
use crate::config::CodecLimits;
use crate::error::{Error, Result};
use crate::io::{Reader, Writer};

const NUMBER: u8 = 0x00;
const BOOLEAN: u8 = 0x01;
const STRING: u8 = 0x02;
const OBJECT: u8 = 0x03;
const MOVIE_CLIP: u8 = 0x04;
const NULL: u8 = 0x05;
const UNDEFINED: u8 = 0x06;
const REFERENCE: u8 = 0x07;
const ECMA_ARRAY: u8 = 0x08;
const OBJECT_END: u8 = 0x09;
const STRICT_ARRAY: u8 = 0x0A;
const DATE: u8 = 0x0B;
const LONG_STRING: u8 = 0x0C;
const UNSUPPORTED: u8 = 0x0D;
const RECORDSET: u8 = 0x0E;
const XML_DOCUMENT: u8 = 0x0F;
const TYPED_OBJECT: u8 = 0x10;
const AVMPLUS: u8 = 0x11;

const MAX_NESTING_DEPTH: usize = 64;
const VERSION: u8 = 0;

fn too_deep(depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        Err(Error::arg_error(format!("AMF0 nesting exceeds {MAX_NESTING_DEPTH} levels")))
    } else {
        Ok(())
    }
}

fn read_utf8(reader: &mut Reader) -> Result<String> {
    let len = reader.read_u16_be()? as usize;
    let bytes = reader.read_bytes(len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf8_long(reader: &mut Reader) -> Result<String> {
    let len = reader.read_u32_be()? as usize;
    let bytes = reader.read_bytes(len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn write_utf8(writer: &mut Writer, s: &str) {
    let len = s.len().min(0xFFFF);
    writer.write_u16_be(len as u16);
    writer.write_bytes(&s.as_bytes()[..len]);
}

fn write_utf8_long(writer: &mut Writer, s: &str) {
    writer.write_u32_be(s.len() as u32);
    writer.write_bytes(s.as_bytes());
}

/// Top-level AMF0 decode: reads the marker byte then dispatches.
pub fn decode(
    reader: &mut Reader,
    refs: &mut DecodeRefs,
    mapper: &Mapper,
    limits: &CodecLimits,
    depth: usize,
) -> Result<Value> {
    too_deep(depth)?;
    let marker = reader.read_u8()?;
    match marker {
        NUMBER => Ok(Value::Double(reader.read_f64_be()?)),
        BOOLEAN => Ok(Value::Bool(reader.read_u8()? != 0)),
        STRING => Ok(Value::String(read_utf8(reader)?)),
        OBJECT => decode_object_body(reader, refs, mapper, limits, depth, None),
        NULL => Ok(Value::Null),
        UNDEFINED => Ok(Value::Undefined),
        REFERENCE => {
            let index = reader.read_u16_be()? as u32;
            refs.get_object(index)
        }
        ECMA_ARRAY => decode_ecma_array(reader, refs, mapper, limits, depth),
        STRICT_ARRAY => decode_strict_array(reader, refs, mapper, limits, depth),
        DATE => {
            let millis = reader.read_f64_be()?;
            let _timezone = reader.read_u16_be()?; // deprecated, always 0
            Ok(Value::Date(millis, 0))
        }
        LONG_STRING => Ok(Value::String(read_utf8_long(reader)?)),
        UNSUPPORTED => Ok(Value::Undefined),
        XML_DOCUMENT => Ok(Value::Xml(read_utf8_long(reader)?)),
        TYPED_OBJECT => {
            let class_name = read_utf8(reader)?;
            decode_object_body(reader, refs, mapper, limits, depth, Some(class_name))
        }
        AVMPLUS => {
            // Entirely switches to AMF3 for this value; fresh tables, since
            // AMF3's object/string/trait reference spaces are independent
            // of anything interned so far in the AMF0 stream.
            let mut amf3_refs = DecodeRefs::new();
            amf3::decode(reader, &mut amf3_refs, mapper, limits, 0)
        }
        MOVIE_CLIP | RECORDSET => Err(Error::bad_marker(marker, VERSION)),
        other => Err(Error::bad_marker(other, VERSION)),
    }
}

fn decode_members(
    reader: &mut Reader,
    refs: &mut DecodeRefs,
    mapper: &Mapper,
    limits: &CodecLimits,
    depth: usize,
) -> Result<Vec<(String, Value)>> {
    let mut entries = Vec::new();
    loop {
        let key = read_utf8(reader)?;
        if key.is_empty() {
            let marker = reader.read_u8()?;
            if marker != OBJECT_END {
                return Err(Error::bad_marker(marker, VERSION));
            }
            break;
        }
        let value = decode(reader, refs, mapper, limits, depth + 1)?;
        entries.push((key, value));
    }
    Ok(entries)
}

fn decode_object_body(
    reader: &mut Reader,
    refs: &mut DecodeRefs,
    mapper: &Mapper,
    limits: &CodecLimits,
    depth: usize,
    class_name: Option<String>,
) -> Result<Value> {
    let idx = refs.reserve_object();
    let entries = decode_members(reader, refs, mapper, limits, depth)?;
    let value = match class_name {
        Some(remote_name) => {
            let mut obj = mapper.materialize(&remote_name);
            mapper.inject_props(&mut obj, entries, Vec::new())?;
            obj
        }
        None => Value::Object { class_name: None, sealed: Vec::new(), dynamic: entries, externalizable_body: None },
    };
    refs.fill_object(idx, value.clone());
    Ok(value)
}

fn decode_ecma_array(
    reader: &mut Reader,
    refs: &mut DecodeRefs,
    mapper: &Mapper,
    limits: &CodecLimits,
    depth: usize,
) -> Result<Value> {
    let _count_hint = reader.read_u32_be()?; // not authoritative; the terminator is
    let idx = refs.reserve_object();
    let entries = decode_members(reader, refs, mapper, limits, depth)?;
    let value = Value::Object { class_name: None, sealed: Vec::new(), dynamic: entries, externalizable_body: None };
    refs.fill_object(idx, value.clone());
    Ok(value)
}

fn decode_strict_array(
    reader: &mut Reader,
    refs: &mut DecodeRefs,
    mapper: &Mapper,
    limits: &CodecLimits,
    depth: usize,
) -> Result<Value> {
    let count = reader.read_u32_be()? as usize;
    let idx = refs.reserve_object();
    let mut elements = Vec::with_capacity(count.min(limits.max_collection_prealloc));
    for _ in 0..count {
        elements.push(decode(reader, refs, mapper, limits, depth + 1)?);
    }
    let value = Value::Array(elements);
    refs.fill_object(idx, value.clone());
    Ok(value)
}

/// Top-level AMF0 encode: writes the marker byte then dispatches.
pub fn encode(writer: &mut Writer, refs: &mut EncodeRefs, mapper: &Mapper, value: &Value) -> Result<()> {
    match value {
        Value::Undefined => writer.write_u8(UNDEFINED),
        Value::Null => writer.write_u8(NULL),
        Value::Bool(b) => {
            writer.write_u8(BOOLEAN);
            writer.write_u8(if *b { 1 } else { 0 });
        }
        Value::Integer(i) => {
            writer.write_u8(NUMBER);
            writer.write_f64_be(*i as f64);
        }
        Value::Double(d) => {
            writer.write_u8(NUMBER);
            writer.write_f64_be(*d);
        }
        Value::String(s) => {
            if s.len() > 0xFFFF {
                writer.write_u8(LONG_STRING);
                write_utf8_long(writer, s);
            } else {
                writer.write_u8(STRING);
                write_utf8(writer, s);
            }
        }
        Value::Xml(s) | Value::XmlDoc(s) => {
            writer.write_u8(XML_DOCUMENT);
            write_utf8_long(writer, s);
        }
        Value::Date(millis, _tz) => {
            writer.write_u8(DATE);
            writer.write_f64_be(*millis);
            writer.write_u16_be(0);
        }
        Value::Array(elements) => {
            writer.write_u8(STRICT_ARRAY);
            encode_reference_or(writer, refs, value, |writer, refs| {
                writer.write_u32_be(elements.len() as u32);
                for el in elements {
                    encode(writer, refs, mapper, el)?;
                }
                Ok(())
            })?;
        }
        Value::Object { class_name: None, sealed, dynamic, .. } => {
            writer.write_u8(OBJECT);
            encode_reference_or(writer, refs, value, |writer, refs| {
                for (k, v) in sealed.iter().chain(dynamic.iter()) {
                    write_utf8(writer, k);
                    encode(writer, refs, mapper, v)?;
                }
                write_utf8(writer, "");
                writer.write_u8(OBJECT_END);
                Ok(())
            })?;
        }
        Value::Object { class_name: Some(_), .. } => {
            writer.write_u8(TYPED_OBJECT);
            encode_reference_or(writer, refs, value, |writer, refs| {
                let remote_name = mapper.get_remote_name(value).unwrap_or_default();
                write_utf8(writer, &remote_name);
                for (k, v) in mapper.extract_props(value) {
                    write_utf8(writer, &k);
                    encode(writer, refs, mapper, &v)?;
                }
                write_utf8(writer, "");
                writer.write_u8(OBJECT_END);
                Ok(())
            })?;
        }
        Value::ByteArray(_) | Value::Dict(_) => {
            // Neither type exists in AMF0; an envelope choosing AMF0 for a
            // body containing one has already taken a wrong turn upstream.
            return Err(Error::unsupported("<AMF3-only value in AMF0 context>"));
        }
    }
    Ok(())
}

/// AMF0's back-reference mechanism only covers the four composite types
/// (`Object`, `ECMA Array`, `Typed Object`, `Strict Array`); the reference
/// index is a 16-bit integer, unlike AMF3's variable-length one.
fn encode_reference_or(
    writer: &mut Writer,
    refs: &mut EncodeRefs,
    value: &Value,
    write_body: impl FnOnce(&mut Writer, &mut EncodeRefs) -> Result<()>,
) -> Result<()> {
    match refs.object_lookup(value as *const Value) {
        super::reftable::Lookup::Ref(idx) => {
            if idx > u16::MAX as u32 {
                return Err(Error::range_error(idx as i64));
            }
            writer.write_u8(REFERENCE);
            writer.write_u16_be(idx as u16);
            Ok(())
        }
        super::reftable::Lookup::New(_) => write_body(writer, refs),
    }
}
