//! Public encoding entry point (C8).
//!
//! Wraps a [`Mapper`] and [`CodecLimits`] so callers don't have to thread
//! reference tables by hand. Each [`Serializer::serialize`] call gets a
//! fresh [`EncodeRefs`] — reference compaction never leaks across
//! unrelated top-level values.

use tracing::{instrument, trace};

use crate::amf::{amf0, amf3};
use crate::amf::reftable::EncodeRefs;
use crate::amf::value::Value;
use crate::amf::Mapper;
use crate::config::CodecLimits;
use crate::error::{Error, Result};
use crate::io::Writer;

/// Implemented by user types that want to bypass the codec's default
/// struct-dispatch and write their own AMF representation.
pub trait Encodable {
    fn encode_amf(&self, serializer: &mut Serializer) -> Result<Value>;
}

pub struct Serializer<'m> {
    mapper: &'m Mapper,
    limits: CodecLimits,
}

impl<'m> Serializer<'m> {
    pub fn new(mapper: &'m Mapper, limits: CodecLimits) -> Self {
        Serializer { mapper, limits }
    }

    /// Encodes `value` as a complete top-level AMF payload. `version` must
    /// be 0 or 3.
    #[instrument(skip(self, value), fields(version = version))]
    pub fn serialize(&self, version: u16, value: &Value) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        let mut refs = EncodeRefs::new();
        match version {
            0 => amf0::encode(&mut writer, &mut refs, self.mapper, value)?,
            3 => amf3::encode(&mut writer, &mut refs, self.mapper, value)?,
            other => return Err(Error::arg_error(format!("unsupported AMF version {other}, expected 0 or 3"))),
        }
        if writer.len() > self.limits.max_output_buffer {
            return Err(Error::arg_error(format!(
                "serialized output {} bytes exceeds max_output_buffer {}",
                writer.len(),
                self.limits.max_output_buffer
            )));
        }
        trace!(bytes = writer.len(), "serialized value");
        Ok(writer.into_bytes())
    }

    /// Encodes a value through its [`Encodable`] hook instead of the
    /// default structural dispatch, then frames the result the same way
    /// [`serialize`](Self::serialize) does.
    pub fn serialize_with<T: Encodable>(&mut self, version: u16, value: &T) -> Result<Vec<u8>> {
        let encoded = value.encode_amf(self)?;
        self.serialize(version, &encoded)
    }

    /// Streaming helper for custom [`Encodable`] encoders that need to emit
    /// a dense array body without going through [`serialize`]'s top-level
    /// framing.
    pub fn write_array(&self, writer: &mut Writer, version: u16, elements: &[Value]) -> Result<()> {
        let mut refs = EncodeRefs::new();
        let array = Value::Array(elements.to_vec());
        match version {
            0 => amf0::encode(writer, &mut refs, self.mapper, &array),
            3 => amf3::encode(writer, &mut refs, self.mapper, &array),
            other => Err(Error::arg_error(format!("unsupported AMF version {other}, expected 0 or 3"))),
        }
    }

    /// Streaming helper for custom [`Encodable`] encoders that need to emit
    /// an object body.
    pub fn write_object(&self, writer: &mut Writer, version: u16, value: &Value) -> Result<()> {
        let mut refs = EncodeRefs::new();
        match version {
            0 => amf0::encode(writer, &mut refs, self.mapper, value),
            3 => amf3::encode(writer, &mut refs, self.mapper, value),
            other => Err(Error::arg_error(format!("unsupported AMF version {other}, expected 0 or 3"))),
        }
    }
}
