//! Remoting envelope (C7): AMF0-framed headers and messages, with
//! message bodies written in AMF0 or AMF3 depending on `amf_version`.
//!
//! Grounded in `remoting.c`: headers are always AMF0-encoded regardless of
//! `amf_version`; message bodies switch to AMF3 only when `amf_version ==
//! 3`, via the same `AVMPLUS` marker byte the AMF0 codec already
//! recognizes inline. Each header and each message gets its own fresh pair
//! of reference tables — an envelope's headers and messages do not share
//! back-references with each other.

use super::amf0;
use super::amf3;
use super::classmap::Mapper;
use super::reftable::{DecodeRefs, EncodeRefs};
use super::value::Value;
use crate::config::CodecLimits;
use crate::error::{Error, Result};
use crate::io::{Reader, Writer};

/// A single remoting header: an out-of-band name/value pair that may be
/// marked as mandatory for the receiver to understand.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    pub must_understand: bool,
    pub body: Value,
}

/// A single remoting message: a request or response addressed by URI.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub target_uri: String,
    pub response_uri: String,
    pub body: Value,
}

/// The full remoting envelope: version, ordered headers, ordered messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub amf_version: u16,
    pub headers: Vec<Header>,
    pub messages: Vec<Message>,
}

impl Envelope {
    pub fn new(amf_version: u16) -> Self {
        Envelope { amf_version, headers: Vec::new(), messages: Vec::new() }
    }

    /// Parses a full envelope from a byte stream.
    pub fn populate_from_stream(reader: &mut Reader, mapper: &Mapper, limits: &CodecLimits) -> Result<Envelope> {
        let amf_version = reader.read_u16_be()?;

        let header_count = reader.read_u16_be()?;
        let mut headers = Vec::with_capacity((header_count as usize).min(limits.max_collection_prealloc));
        for _ in 0..header_count {
            let name = read_header_string(reader)?;
            let must_understand = reader.read_u8()? != 0;
            let _length_hint = reader.read_u32_be()?; // ignored, as in the source
            let mut refs = DecodeRefs::new();
            let body = amf0::decode(reader, &mut refs, mapper, limits, 0)?;
            headers.push(Header { name, must_understand, body });
        }

        let message_count = reader.read_u16_be()?;
        let mut messages = Vec::with_capacity((message_count as usize).min(limits.max_collection_prealloc));
        for _ in 0..message_count {
            let target_uri = read_header_string(reader)?;
            let response_uri = read_header_string(reader)?;
            let _length_hint = reader.read_u32_be()?; // ignored
            let mut refs = DecodeRefs::new();
            let mut body = amf0::decode(reader, &mut refs, mapper, limits, 0)?;

            // Flex remoting convention: a single-element array wrapping an
            // AbstractMessage-descended value is unwrapped.
            if let Value::Array(elements) = &body {
                if elements.len() == 1 && is_abstract_message(&elements[0]) {
                    body = elements[0].clone();
                }
            }
            messages.push(Message { target_uri, response_uri, body });
        }

        Ok(Envelope { amf_version, headers, messages })
    }

    /// Serializes the envelope back to bytes.
    pub fn serialize(&self, mapper: &Mapper, limits: &CodecLimits) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        writer.write_u16_be(self.amf_version);

        writer.write_u16_be(self.headers.len() as u16);
        for header in &self.headers {
            write_header_string(&mut writer, &header.name);
            writer.write_u8(if header.must_understand { 1 } else { 0 });
            writer.write_u32_be(0xFFFF_FFFF); // length unknown, as in the source
            let mut refs = EncodeRefs::new();
            amf0::encode(&mut writer, &mut refs, mapper, &header.body)?;
        }

        writer.write_u16_be(self.messages.len() as u16);
        for message in &self.messages {
            write_header_string(&mut writer, &message.target_uri);
            write_header_string(&mut writer, &message.response_uri);
            writer.write_u32_be(0xFFFF_FFFF);
            if self.amf_version == 3 {
                writer.write_u8(amf0_avmplus_marker());
                let mut refs = EncodeRefs::new();
                amf3::encode(&mut writer, &mut refs, mapper, &message.body)?;
            } else {
                let mut refs = EncodeRefs::new();
                amf0::encode(&mut writer, &mut refs, mapper, &message.body)?;
            }
        }

        if writer.len() > limits.max_output_buffer {
            return Err(Error::arg_error(format!(
                "envelope output {} bytes exceeds max_output_buffer {}",
                writer.len(),
                limits.max_output_buffer
            )));
        }
        Ok(writer.into_bytes())
    }
}

/// The `AVMPLUS` marker is private to `amf0`; re-stated here by value since
/// the envelope, not the AMF0 codec, decides when to emit it.
fn amf0_avmplus_marker() -> u8 {
    0x11
}

/// There is no Ruby-style `kind_of?` ancestry check available, so the
/// AbstractMessage check is done against the fixed set of local class names
/// the default mapper seeds for the Flex messaging hierarchy — every one of
/// which descends from `AbstractMessage`.
fn is_abstract_message(value: &Value) -> bool {
    matches!(
        value.class_name(),
        Some("AbstractMessage" | "RemotingMessage" | "AsyncMessage" | "CommandMessage" | "AcknowledgeMessage" | "ErrorMessage")
    )
}

/// Header/message name strings are plain length-prefixed UTF-8 with no
/// leading type marker, same shape as AMF0 inline strings.
fn read_header_string(reader: &mut Reader) -> Result<String> {
    let len = reader.read_u16_be()? as usize;
    let bytes = reader.read_bytes(len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn write_header_string(writer: &mut Writer, s: &str) {
    let len = s.len().min(0xFFFF);
    writer.write_u16_be(len as u16);
    writer.write_bytes(&s.as_bytes()[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_empty_envelope() {
        let mapper = Mapper::new();
        let limits = CodecLimits::default();
        let env = Envelope::new(0);
        let bytes = env.serialize(&mapper, &limits).unwrap();
        let mut r = Reader::new(&bytes);
        let decoded = Envelope::populate_from_stream(&mut r, &mapper, &limits).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_roundtrip_header_and_amf0_message() {
        let mapper = Mapper::new();
        let limits = CodecLimits::default();
        let mut env = Envelope::new(0);
        env.headers.push(Header {
            name: "Credentials".into(),
            must_understand: true,
            body: Value::String("secret".into()),
        });
        env.messages.push(Message {
            target_uri: "echo".into(),
            response_uri: "/1".into(),
            body: Value::Double(42.0),
        });
        let bytes = env.serialize(&mapper, &limits).unwrap();
        let mut r = Reader::new(&bytes);
        let decoded = Envelope::populate_from_stream(&mut r, &mapper, &limits).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_amf3_message_body_uses_avmplus_switch() {
        let mapper = Mapper::new();
        let limits = CodecLimits::default();
        let mut env = Envelope::new(3);
        env.messages.push(Message {
            target_uri: "echo".into(),
            response_uri: "/1".into(),
            body: Value::String("hi".into()),
        });
        let bytes = env.serialize(&mapper, &limits).unwrap();
        let mut r = Reader::new(&bytes);
        let decoded = Envelope::populate_from_stream(&mut r, &mapper, &limits).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_single_element_abstract_message_array_is_unwrapped() {
        let mapper = Mapper::new();
        let limits = CodecLimits::default();
        let inner = Value::typed_object("AsyncMessage");
        let mut w = Writer::new();
        w.write_u16_be(0); // amf_version
        w.write_u16_be(0); // header count
        w.write_u16_be(1); // message count
        write_header_string(&mut w, "echo");
        write_header_string(&mut w, "/1");
        w.write_u32_be(0xFFFF_FFFF);
        let mut refs = EncodeRefs::new();
        amf0::encode(&mut w, &mut refs, &mapper, &Value::Array(vec![inner.clone()])).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = Envelope::populate_from_stream(&mut r, &mapper, &limits).unwrap();
        assert_eq!(decoded.messages[0].body, inner);
    }

    #[test]
    fn test_non_abstract_message_array_is_not_unwrapped() {
        let mapper = Mapper::new();
        let limits = CodecLimits::default();
        let mut w = Writer::new();
        w.write_u16_be(0);
        w.write_u16_be(0);
        w.write_u16_be(1);
        write_header_string(&mut w, "echo");
        write_header_string(&mut w, "/1");
        w.write_u32_be(0xFFFF_FFFF);
        let mut refs = EncodeRefs::new();
        amf0::encode(&mut w, &mut refs, &mapper, &Value::Array(vec![Value::Double(1.0)])).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = Envelope::populate_from_stream(&mut r, &mapper, &limits).unwrap();
        assert_eq!(decoded.messages[0].body, Value::Array(vec![Value::Double(1.0)]));
    }
}
