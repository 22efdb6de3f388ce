//! Crate-wide error taxonomy.
//!
//! One enum covers every failure mode a codec invocation can hit. There is
//! no `thiserror` here on purpose — `Display`/`Error` are implemented by
//! hand, matching the rest of this crate's ambient style.

use std::fmt;

use tracing::{error, warn};

/// Every error a codec invocation (decode, encode, or class-mapper lookup)
/// can surface. Errors are non-recoverable within the invocation that
/// raised them: the caller sees exactly one `Error` value, never a partial
/// result.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A read ran past the end of the stream, or a length-prefixed field's
    /// declared length runs off the end.
    OutOfBounds { requested: usize, remaining: usize },

    /// A back-reference index pointed outside the current table.
    BadReference { index: u32, table_len: usize, table: &'static str },

    /// An unrecognized marker byte for the active AMF version.
    BadMarker { marker: u8, version: u8 },

    /// A value exceeds the variable-length integer range; the caller must
    /// demote to Double rather than attempt to encode it as an integer.
    RangeError { value: i64 },

    /// Property injection into a target lacking both a setter and
    /// index-assignment.
    TypeError { local_name: String, property: String },

    /// An externalizable type has no registered `external_reader`/
    /// `external_writer` capability.
    Unsupported { class_name: String },

    /// An invalid public-API argument, e.g. an AMF version other than 0 or 3.
    ArgError { message: String },
}

impl Error {
    /// A read ran past the end of the stream. Warn-level: the caller can
    /// recover by re-reading once more bytes are available.
    pub(crate) fn out_of_bounds(requested: usize, remaining: usize) -> Self {
        warn!(requested, remaining, "read past end of stream");
        Error::OutOfBounds { requested, remaining }
    }

    /// A back-reference index pointed outside its table. Warn-level:
    /// malformed input the caller can reject and retry elsewhere.
    pub(crate) fn bad_reference(index: u32, table_len: usize, table: &'static str) -> Self {
        warn!(index, table_len, table, "back-reference out of range");
        Error::BadReference { index, table_len, table }
    }

    /// An unrecognized marker byte. Warn-level: malformed or unsupported
    /// input, not a codec-internal fault.
    pub(crate) fn bad_marker(marker: u8, version: u8) -> Self {
        warn!(marker = format!("0x{marker:02x}"), version, "unrecognized marker byte");
        Error::BadMarker { marker, version }
    }

    /// A value falls outside the variable-length integer range. Warn-level:
    /// the caller is expected to demote to Double and retry.
    pub(crate) fn range_error(value: i64) -> Self {
        warn!(value, "value exceeds variable-length integer range");
        Error::RangeError { value }
    }

    /// Property injection found neither a setter nor index-assignment.
    /// Error-level: this means a registered `TypeDescriptor` is out of
    /// sync with the type it describes.
    pub(crate) fn type_error(local_name: impl Into<String>, property: impl Into<String>) -> Self {
        let local_name = local_name.into();
        let property = property.into();
        error!(local_name = %local_name, property = %property, "property injection has no setter or index-assignment");
        Error::TypeError { local_name, property }
    }

    /// An externalizable class has no registered reader/writer capability.
    /// Error-level: the caller's mapper setup is missing a registration.
    pub(crate) fn unsupported(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        error!(class_name = %class_name, "externalizable class has no registered external reader/writer");
        Error::Unsupported { class_name }
    }

    /// An invalid public-API argument. Error-level: a caller-side bug,
    /// not malformed wire input.
    pub(crate) fn arg_error(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(message = %message, "invalid public API argument");
        Error::ArgError { message }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfBounds { requested, remaining } => write!(
                f,
                "out of bounds: requested {requested} bytes, {remaining} remaining"
            ),
            Error::BadReference { index, table_len, table } => write!(
                f,
                "bad {table} reference: index {index} out of range (len {table_len})"
            ),
            Error::BadMarker { marker, version } => {
                write!(f, "unrecognized AMF{version} marker 0x{marker:02x}")
            }
            Error::RangeError { value } => {
                write!(f, "value {value} exceeds variable-length integer range")
            }
            Error::TypeError { local_name, property } => write!(
                f,
                "cannot inject property '{property}' into '{local_name}': no setter or index-assignment"
            ),
            Error::Unsupported { class_name } => write!(
                f,
                "externalizable class '{class_name}' has no registered external reader/writer"
            ),
            Error::ArgError { message } => write!(f, "invalid argument: {message}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
