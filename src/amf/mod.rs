//! AMF codec: value model, reference tables, class mapper, the AMF0 and
//! AMF3 wire codecs, and the remoting envelope that frames them.

pub mod amf0;
pub mod amf3;
pub mod classmap;
pub mod envelope;
pub mod reftable;
pub mod value;

pub use classmap::{ExternalReader, ExternalWriter, Mapper, TypeDescriptor, ARRAY_COLLECTION_CLASS};
pub use envelope::{Envelope, Header, Message};
pub use reftable::{DecodeRefs, EncodeRefs, Lookup};
pub use value::{Trait, Value};
