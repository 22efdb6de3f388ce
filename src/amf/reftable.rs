//! The three parallel reference tables (object, string, trait) shared by
//! the AMF0 and AMF3 codecs.
//!
//! Decode and encode need different shapes: decode just needs an
//! append-only `Vec` indexed by position, with a placeholder-then-patch
//! step so a value can intern itself before its children are decoded.
//! Encode needs a lookup keyed by content (strings, trait class names) or
//! by identity (objects) so a second encounter of the same value emits a
//! back-reference instead of a duplicate inline payload.
//!
//! A fresh pair of tables is created per top-level codec invocation; AMF0
//! decoding an AMF3-switch marker constructs a fresh `DecodeRefs`/
//! `EncodeRefs` for the embedded AMF3 payload rather than reusing AMF0's.

use std::collections::HashMap;

use tracing::trace;

use super::value::{Trait, Value};
use crate::error::{Error, Result};

/// Outcome of a content-keyed lookup during encode: either the value was
/// already interned (emit a back-reference) or this is its first sighting
/// (emit inline, and the table has already recorded the new index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Ref(u32),
    New(u32),
}

/// Decode-side tables: append-only vectors indexed by insertion order.
#[derive(Default)]
pub struct DecodeRefs {
    objects: Vec<Value>,
    strings: Vec<String>,
    traits: Vec<Trait>,
}

impl DecodeRefs {
    pub fn new() -> Self {
        trace!("decode reference tables reset");
        Self::default()
    }

    /// Reserves a slot for a complex value before its children are
    /// decoded, so a self-referential structure resolves. Returns the
    /// index to later `fill_object` with the completed value.
    pub fn reserve_object(&mut self) -> u32 {
        self.objects.push(Value::Null);
        (self.objects.len() - 1) as u32
    }

    pub fn fill_object(&mut self, index: u32, value: Value) {
        self.objects[index as usize] = value;
    }

    pub fn get_object(&self, index: u32) -> Result<Value> {
        self.objects
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::bad_reference(index, self.objects.len(), "object"))
    }

    /// Interns a non-empty string; the empty string is never added (the
    /// caller encodes/decodes it via the single-byte sentinel instead).
    pub fn intern_string(&mut self, s: String) {
        if !s.is_empty() {
            self.strings.push(s);
        }
    }

    pub fn get_string(&self, index: u32) -> Result<String> {
        self.strings
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::bad_reference(index, self.strings.len(), "string"))
    }

    pub fn intern_trait(&mut self, t: Trait) -> u32 {
        self.traits.push(t);
        (self.traits.len() - 1) as u32
    }

    pub fn get_trait(&self, index: u32) -> Result<Trait> {
        self.traits
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::bad_reference(index, self.traits.len(), "trait"))
    }
}

/// Encode-side tables: content- or identity-keyed lookups.
///
/// Objects are keyed by the pointer identity of the `Value` node being
/// encoded — the Rust analogue of the source's Ruby-object-identity
/// cache. Two structurally-equal-but-distinct `Value`s are never
/// conflated, matching "never dedupes by structural equality."
#[derive(Default)]
pub struct EncodeRefs {
    objects: HashMap<usize, u32>,
    strings: HashMap<String, u32>,
    /// Keyed by class name; the empty class name (anonymous dynamic
    /// object) is never cached, since every anonymous trait is distinct.
    traits: HashMap<String, u32>,
}

impl EncodeRefs {
    pub fn new() -> Self {
        trace!("encode reference tables reset");
        Self::default()
    }

    pub fn object_lookup(&mut self, ptr: *const Value) -> Lookup {
        let key = ptr as usize;
        if let Some(&idx) = self.objects.get(&key) {
            return Lookup::Ref(idx);
        }
        let idx = self.objects.len() as u32;
        self.objects.insert(key, idx);
        Lookup::New(idx)
    }

    pub fn string_lookup(&mut self, s: &str) -> Lookup {
        if let Some(&idx) = self.strings.get(s) {
            return Lookup::Ref(idx);
        }
        let idx = self.strings.len() as u32;
        self.strings.insert(s.to_string(), idx);
        Lookup::New(idx)
    }

    pub fn trait_lookup(&mut self, class_name: &str) -> Lookup {
        if class_name.is_empty() {
            // Anonymous traits are never cached; every inline trait is new.
            let idx = self.traits.len() as u32;
            return Lookup::New(idx);
        }
        if let Some(&idx) = self.traits.get(class_name) {
            return Lookup::Ref(idx);
        }
        let idx = self.traits.len() as u32;
        self.traits.insert(class_name.to_string(), idx);
        Lookup::New(idx)
    }
}
