//! The universal value tree produced by decode and consumed by encode.
//!
//! `Value::Object`'s `sealed`/`dynamic` members and `Value::Dict`'s entries
//! are ordered sequences (`Vec`), not hash maps — AMF3 reference compaction
//! and the `ArrayCollection` special case both depend on member order
//! surviving a round-trip, which a `HashMap` cannot guarantee.

/// A decoded (or to-be-encoded) AMF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Distinct from `Null` on the wire (AMF3 marker 0x00 vs 0x01; AMF0
    /// marker 0x06 vs 0x05). Both ends of this codec preserve the
    /// distinction rather than folding it.
    Undefined,
    Bool(bool),
    /// Always in the closed range `[-2^28, 2^28 - 1]`; values outside this
    /// range are represented as `Double` instead; see the AMF3 codec.
    Integer(i32),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Object {
        class_name: Option<String>,
        sealed: Vec<(String, Value)>,
        dynamic: Vec<(String, Value)>,
        /// Opaque payload for externalizable objects with no registered
        /// `Externalizable` capability; carried through so a decode-then-
        /// re-encode of an unsupported class can still round-trip bytes
        /// the caller chooses to hand back verbatim.
        externalizable_body: Option<Vec<u8>>,
    },
    Dict(Vec<(Value, Value)>),
    ByteArray(Vec<u8>),
    Xml(String),
    XmlDoc(String),
    /// Milliseconds since epoch, plus a timezone offset in minutes that is
    /// always written as 0 and ignored on decode (see Design Notes).
    Date(f64, i16),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn object() -> Value {
        Value::Object {
            class_name: None,
            sealed: Vec::new(),
            dynamic: Vec::new(),
            externalizable_body: None,
        }
    }

    pub fn typed_object(class_name: impl Into<String>) -> Value {
        Value::Object {
            class_name: Some(class_name.into()),
            sealed: Vec::new(),
            dynamic: Vec::new(),
            externalizable_body: None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Xml(s) | Value::XmlDoc(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the object's class name, if it is a typed object.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Value::Object { class_name, .. } => class_name.as_deref(),
            _ => None,
        }
    }

    /// Looks up a property by name across sealed then dynamic members.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object { sealed, dynamic, .. } => sealed
                .iter()
                .chain(dynamic.iter())
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Inserts or overwrites a dynamic property by name, appending a new
    /// entry if absent (preserving insertion order, matching the index-
    /// assignment semantics `ClassMapper::inject_props` falls back to).
    pub fn set_dynamic(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object { sealed, dynamic, .. } = self {
            let key = key.into();
            if let Some(slot) = sealed.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }
            if let Some(slot) = dynamic.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }
            dynamic.push((key, value));
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Immutable descriptor of a typed object's schema: class name, sealed
/// member order, and the externalizable/dynamic flags. Interned in the
/// trait table by value at decode time and by class name at encode time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trait {
    pub class_name: String,
    pub externalizable: bool,
    pub dynamic: bool,
    pub members: Vec<String>,
}

impl Trait {
    pub fn anonymous(dynamic: bool) -> Trait {
        Trait {
            class_name: String::new(),
            externalizable: false,
            dynamic,
            members: Vec::new(),
        }
    }
}
