//! Class mapper (C4): bidirectional remote/local class-name registry,
//! object materialization, and property extraction/injection.
//!
//! The source (`class_mapping.c`) resolves local types through Ruby
//! reflection — listing an object's zero-arity public methods. This
//! implementation is static-typed, so local types opt in explicitly by
//! registering a [`TypeDescriptor`]: a local name plus its ordered,
//! sealed property-name list. An unregistered remote class still decodes
//! fine — it materializes as a generic typed mapping with no sealed
//! members, all properties dynamic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::value::Value;
use crate::error::{Error, Result};
use crate::io::{Reader, Writer};

/// A custom decoder for an externalizable class's opaque body. Reads
/// directly from the same byte stream the surrounding codec is consuming;
/// the caller is responsible for knowing how many bytes to take.
pub type ExternalReader = Arc<dyn Fn(&mut Reader) -> Result<Value> + Send + Sync>;

/// A custom encoder for an externalizable class's opaque body.
pub type ExternalWriter = Arc<dyn Fn(&Value, &mut Writer) -> Result<()> + Send + Sync>;

/// The static substitute for runtime introspection: a local type's name
/// and the ordered list of property names the class mapper should treat
/// as sealed members when materializing or extracting.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub local_name: String,
    pub properties: Vec<String>,
}

impl TypeDescriptor {
    pub fn new(local_name: impl Into<String>, properties: Vec<String>) -> Self {
        TypeDescriptor {
            local_name: local_name.into(),
            properties,
        }
    }
}

/// The six Flex messaging classes every mapper seeds by default (grounded
/// in `class_mapping.c`'s `mapset_map_defaults`).
const FLEX_MESSAGING_CLASSES: &[(&str, &str)] = &[
    (
        "AbstractMessage",
        "flex.messaging.messages.AbstractMessage",
    ),
    (
        "RemotingMessage",
        "flex.messaging.messages.RemotingMessage",
    ),
    ("AsyncMessage", "flex.messaging.messages.AsyncMessage"),
    ("CommandMessage", "flex.messaging.messages.CommandMessage"),
    (
        "AcknowledgeMessage",
        "flex.messaging.messages.AcknowledgeMessage",
    ),
    ("ErrorMessage", "flex.messaging.messages.ErrorMessage"),
);

/// The Flex wrapper class that marks a sequence as an `ArrayCollection`.
pub const ARRAY_COLLECTION_CLASS: &str = "flex.messaging.io.ArrayCollection";

/// Long-lived, bidirectional remote↔local class-name registry plus
/// per-type property cache. Intended to be constructed once and threaded
/// through every `Serializer`/`Deserializer`/`Envelope` invocation.
///
/// Not `Clone`: it may hold registered external-codec closures, which are
/// cheap to share via `Arc<Mapper>` but not meaningful to duplicate.
pub struct Mapper {
    as_to_local: HashMap<String, String>,
    local_to_as: HashMap<String, String>,
    types: HashMap<String, TypeDescriptor>,
    externals: HashMap<String, (ExternalReader, ExternalWriter)>,
    use_array_collection: bool,
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("as_to_local", &self.as_to_local)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("externals", &self.externals.keys().collect::<Vec<_>>())
            .field("use_array_collection", &self.use_array_collection)
            .finish()
    }
}

impl Default for Mapper {
    fn default() -> Self {
        let mut mapper = Mapper {
            as_to_local: HashMap::new(),
            local_to_as: HashMap::new(),
            types: HashMap::new(),
            externals: HashMap::new(),
            use_array_collection: false,
        };
        for &(local, remote) in FLEX_MESSAGING_CLASSES {
            mapper.map(remote, local);
        }
        mapper
    }
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bidirectional remote↔local association. Both
    /// directions are kept consistent.
    pub fn map(&mut self, remote_name: impl Into<String>, local_name: impl Into<String>) {
        let remote_name = remote_name.into();
        let local_name = local_name.into();
        debug!(remote = %remote_name, local = %local_name, "class mapper: registered remote/local mapping");
        self.as_to_local.insert(remote_name.clone(), local_name.clone());
        self.local_to_as.insert(local_name, remote_name);
    }

    /// Registers the sealed property list for a local type, used by
    /// `materialize`/`extract_props` in place of reflection.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) {
        debug!(local = %descriptor.local_name, properties = descriptor.properties.len(), "class mapper: registered type descriptor");
        self.types.insert(descriptor.local_name.clone(), descriptor);
    }

    /// Registers the externalizable read/write capability for a remote
    /// class name. Presence of a registration is itself the signal that a
    /// value tagged with this class name should be encoded/decoded as
    /// externalizable — see `is_externalizable`.
    pub fn register_external(
        &mut self,
        remote_name: impl Into<String>,
        reader: ExternalReader,
        writer: ExternalWriter,
    ) {
        let remote_name = remote_name.into();
        debug!(remote = %remote_name, "class mapper: registered externalizable capability");
        self.externals.insert(remote_name, (reader, writer));
    }

    pub fn is_externalizable(&self, remote_name: &str) -> bool {
        self.externals.contains_key(remote_name)
    }

    pub fn external_reader(&self, remote_name: &str) -> Option<&ExternalReader> {
        self.externals.get(remote_name).map(|(r, _)| r)
    }

    pub fn external_writer(&self, remote_name: &str) -> Option<&ExternalWriter> {
        self.externals.get(remote_name).map(|(_, w)| w)
    }

    pub fn use_array_collection(&self) -> bool {
        self.use_array_collection
    }

    pub fn set_use_array_collection(&mut self, value: bool) {
        self.use_array_collection = value;
    }

    /// A plain key-value mapping (no class name) returns `None`; a typed
    /// object returns its remote name, falling back to the class name
    /// itself (passthrough) when it has no registered mapping.
    pub fn get_remote_name(&self, value: &Value) -> Option<String> {
        let class_name = value.class_name()?;
        Some(
            self.local_to_as
                .get(class_name)
                .cloned()
                .unwrap_or_else(|| class_name.to_string()),
        )
    }

    /// Constructs a default instance for `remote_name`. If a local type is
    /// registered, its sealed member list is pre-populated with `Null`
    /// placeholders (to be filled by `inject_props`); otherwise a generic
    /// typed mapping is produced with no sealed members.
    pub fn materialize(&self, remote_name: &str) -> Value {
        let local_name = self.as_to_local.get(remote_name).cloned();
        let descriptor = local_name.as_ref().and_then(|name| self.types.get(name));

        match descriptor {
            Some(descriptor) => Value::Object {
                class_name: Some(descriptor.local_name.clone()),
                sealed: descriptor
                    .properties
                    .iter()
                    .map(|name| (name.clone(), Value::Null))
                    .collect(),
                dynamic: Vec::new(),
                externalizable_body: None,
            },
            None => Value::typed_object(local_name.unwrap_or_else(|| remote_name.to_string())),
        }
    }

    /// Returns the object's own properties in their stored order (sealed
    /// then dynamic). For anything other than `Value::Object`, an empty
    /// list — there is nothing to extract from a scalar.
    pub fn extract_props(&self, value: &Value) -> Vec<(String, Value)> {
        match value {
            Value::Object { sealed, dynamic, .. } => {
                sealed.iter().chain(dynamic.iter()).cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Applies `props` as sealed-or-dynamic assignments and `dynamic_props`
    /// as dynamic-only assignments. Every `Value::Object` supports
    /// index-assignment, so injection into an object never fails; injecting
    /// into anything else raises `TypeError`, since no setter and no
    /// index-assignment operation exists for a scalar.
    pub fn inject_props(
        &self,
        object: &mut Value,
        props: Vec<(String, Value)>,
        dynamic_props: Vec<(String, Value)>,
    ) -> Result<()> {
        match object {
            Value::Object { .. } => {
                for (name, value) in props.into_iter().chain(dynamic_props) {
                    object.set_dynamic(name, value);
                }
                Ok(())
            }
            _ => {
                let (name, _) = props
                    .into_iter()
                    .chain(dynamic_props)
                    .next()
                    .unwrap_or_else(|| ("<unknown>".to_string(), Value::Null));
                Err(Error::type_error("<non-object target>", name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_flex_classes() {
        let mapper = Mapper::new();
        let v = Value::typed_object("AbstractMessage");
        assert_eq!(
            mapper.get_remote_name(&v),
            Some("flex.messaging.messages.AbstractMessage".to_string())
        );
    }

    #[test]
    fn test_plain_object_has_no_remote_name() {
        let mapper = Mapper::new();
        assert_eq!(mapper.get_remote_name(&Value::object()), None);
    }

    #[test]
    fn test_unmapped_remote_name_passthrough() {
        let mapper = Mapper::new();
        let v = Value::typed_object("com.example.Widget");
        assert_eq!(
            mapper.get_remote_name(&v),
            Some("com.example.Widget".to_string())
        );
    }

    #[test]
    fn test_materialize_unregistered_remote_class() {
        let mapper = Mapper::new();
        let v = mapper.materialize("com.example.Widget");
        match v {
            Value::Object { class_name, sealed, .. } => {
                assert_eq!(class_name.as_deref(), Some("com.example.Widget"));
                assert!(sealed.is_empty());
            }
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_materialize_registered_type_prepopulates_sealed() {
        let mut mapper = Mapper::new();
        mapper.map("com.example.Widget", "Widget");
        mapper.register_type(TypeDescriptor::new(
            "Widget",
            vec!["name".to_string(), "count".to_string()],
        ));
        let v = mapper.materialize("com.example.Widget");
        match v {
            Value::Object { sealed, .. } => {
                assert_eq!(sealed.len(), 2);
                assert_eq!(sealed[0].0, "name");
            }
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_inject_props_into_object_ok() {
        let mapper = Mapper::new();
        let mut v = Value::object();
        mapper
            .inject_props(&mut v, vec![("a".to_string(), Value::Integer(1))], vec![])
            .unwrap();
        assert_eq!(v.get("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_inject_props_into_scalar_is_type_error() {
        let mapper = Mapper::new();
        let mut v = Value::Integer(5);
        let err = mapper
            .inject_props(&mut v, vec![("a".to_string(), Value::Integer(1))], vec![])
            .unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn test_external_registration_round_trip() {
        let mut mapper = Mapper::new();
        assert!(!mapper.is_externalizable("com.example.Blob"));
        mapper.register_external(
            "com.example.Blob",
            Arc::new(|r| {
                let n = r.read_u8()?;
                Ok(Value::ByteArray(vec![n]))
            }),
            Arc::new(|v, w| {
                if let Value::ByteArray(bytes) = v {
                    w.write_u8(bytes[0]);
                }
                Ok(())
            }),
        );
        assert!(mapper.is_externalizable("com.example.Blob"));
        assert!(mapper.external_reader("com.example.Blob").is_some());
        assert!(mapper.external_writer("com.example.Blob").is_some());
    }

    #[test]
    fn test_extract_props_order_preserved() {
        let mapper = Mapper::new();
        let v = Value::Object {
            class_name: None,
            sealed: vec![("a".into(), Value::Integer(1))],
            dynamic: vec![("b".into(), Value::Integer(2))],
            externalizable_body: None,
        };
        let props = mapper.extract_props(&v);
        assert_eq!(props, vec![
            ("a".to_string(), Value::Integer(1)),
            ("b".to_string(), Value::Integer(2)),
        ]);
    }
}
