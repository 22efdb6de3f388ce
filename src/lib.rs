//! Action Message Format (AMF0/AMF3) binary codec.
//!
//! Encodes and decodes the two co-existing AMF wire variants — the legacy
//! AMF0 and the revised AMF3 — plus the envelope framing Flex remoting
//! wraps around them. The core pieces, leaves first:
//!
//! - [`io`] — bounds-checked byte reader/writer and the AMF3 variable-length
//!   29-bit integer codec.
//! - [`amf::reftable`] — the three parallel reference tables (object,
//!   string, trait) shared by both codecs.
//! - [`amf::classmap`] — the bidirectional remote/local class-name registry.
//! - [`amf::amf0`] / [`amf::amf3`] — the two wire codecs.
//! - [`amf::envelope`] — header/message framing around AMF payloads.
//! - [`serializer`] / [`deserializer`] — the public encode/decode entry
//!   points most callers want.

pub mod amf;
pub mod config;
pub mod deserializer;
pub mod error;
pub mod io;
pub mod serializer;

pub use amf::{Envelope, Header, Mapper, Message, Trait, TypeDescriptor, Value};
pub use config::CodecLimits;
pub use deserializer::Deserializer;
pub use error::{Error, Result};
pub use serializer::{Encodable, Serializer};
