//! Public decoding entry point (C8).
//!
//! Mirrors [`Serializer`](crate::serializer::Serializer): wraps a
//! [`Mapper`] and [`CodecLimits`], and gives each top-level
//! [`Deserializer::deserialize`] call a fresh [`DecodeRefs`].

use tracing::{instrument, trace};

use crate::amf::{amf0, amf3};
use crate::amf::reftable::DecodeRefs;
use crate::amf::value::Value;
use crate::amf::Mapper;
use crate::config::CodecLimits;
use crate::error::{Error, Result};
use crate::io::Reader;

pub struct Deserializer<'m> {
    mapper: &'m Mapper,
    limits: CodecLimits,
}

impl<'m> Deserializer<'m> {
    pub fn new(mapper: &'m Mapper, limits: CodecLimits) -> Self {
        Deserializer { mapper, limits }
    }

    /// Decodes one complete top-level AMF value from `source`. `version`
    /// must be 0 or 3; `source`'s position is advanced past the value on
    /// success and left untouched on error.
    #[instrument(skip(self, source), fields(version = version))]
    pub fn deserialize(&self, version: u16, source: &mut Reader) -> Result<Value> {
        let mut refs = DecodeRefs::new();
        let value = match version {
            0 => amf0::decode(source, &mut refs, self.mapper, &self.limits, 0)?,
            3 => amf3::decode(source, &mut refs, self.mapper, &self.limits, 0)?,
            other => return Err(Error::arg_error(format!("unsupported AMF version {other}, expected 0 or 3"))),
        };
        trace!(pos = source.pos(), "deserialized value");
        Ok(value)
    }

    /// Streaming helper for custom decoders that have already consumed a
    /// type marker and need to read a nested object body at the given
    /// version.
    pub fn read_object(&self, version: u16, source: &mut Reader) -> Result<Value> {
        self.deserialize(version, source)
    }
}
