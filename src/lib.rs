//! Descriptor-driven XML encoding and decoding.
//!
//! A [`TypeDescriptor`] describes the shape of a type once; the engine then
//! maps values of that shape to XML documents and back. Descriptors decide
//! whether a field rides as an attribute, a child element or character
//! content, how collections wrap their items, which qualified names apply,
//! and how polymorphic values pick their concrete type.
//!
//! ```
//! use xmlbind::{Field, TypeDescriptor, Value};
//!
//! let person = TypeDescriptor::class("Person")
//!     .field(Field::new("name", TypeDescriptor::string()))
//!     .field(Field::new("age", TypeDescriptor::int()));
//!
//! let value = Value::Struct(vec![Value::string("Ada"), Value::Int(36)]);
//! let xml = xmlbind::to_string(&person, &value)?;
//! assert_eq!(xml, r#"<Person name="Ada" age="36"></Person>"#);
//!
//! let back = xmlbind::from_str(&person, &xml)?;
//! assert_eq!(back, value);
//! # Ok::<(), xmlbind::XmlError>(())
//! ```
//!
//! Self-referential types register their descriptors in a [`Registry`] and
//! point at them by name through [`TypeRef::named`]; the shared engine
//! state lives in [`Xml`].

#![deny(unsafe_code)]

mod decode;
mod descriptor;
mod encode;
mod error;
mod naming;
mod qname;
mod reader;
mod writer;

use std::sync::Arc;

pub use descriptor::{
    Field, FieldConfig, Kind, NameTemplate, PrimitiveKind, Registry, TypeConfig,
    TypeDescriptor, TypeRef, Value,
};
pub use error::{Location, XmlError, XmlErrorKind};
pub use naming::{OutputKind, output_kind, root_name};
pub use qname::{NamespaceScope, QName, XMLNS_NAMESPACE};
pub use reader::{DocumentReader, EventType, XmlRead};
pub use writer::{TextWriter, XmlWrite};

use decode::Decoder;
use encode::Encoder;

/// An engine instance: a descriptor registry plus the codec entry points.
///
/// All state is read-only once the descriptors are registered, so one
/// `Xml` can serve any number of independent encode and decode calls.
#[derive(Debug, Default)]
pub struct Xml {
    registry: Registry,
}

impl Xml {
    pub fn new() -> Self {
        Xml::default()
    }

    /// Register a descriptor so [`TypeRef::named`] references and
    /// polymorphic discriminators can resolve it.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        self.registry.register(descriptor)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode a value as an XML string.
    pub fn to_string(&self, desc: &TypeDescriptor, value: &Value) -> Result<String, XmlError> {
        let mut writer = TextWriter::new();
        self.encode(desc, value, &mut writer)?;
        Ok(writer.finish())
    }

    /// Encode a value into an arbitrary writer.
    pub fn encode(
        &self,
        desc: &TypeDescriptor,
        value: &Value,
        writer: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        Encoder::new(&self.registry).encode(desc, value, writer)
    }

    /// Decode a value from an XML string.
    pub fn from_str(&self, desc: &TypeDescriptor, input: &str) -> Result<Value, XmlError> {
        let mut reader = DocumentReader::new(input)?;
        self.decode(desc, &mut reader)
    }

    /// Decode a value from an arbitrary reader.
    pub fn decode(
        &self,
        desc: &TypeDescriptor,
        reader: &mut dyn XmlRead,
    ) -> Result<Value, XmlError> {
        Decoder::new(&self.registry).decode(desc, reader)
    }
}

/// Encode a value as an XML string, without a registry.
pub fn to_string(desc: &TypeDescriptor, value: &Value) -> Result<String, XmlError> {
    Xml::new().to_string(desc, value)
}

/// Decode a value from an XML string, without a registry.
pub fn from_str(desc: &TypeDescriptor, input: &str) -> Result<Value, XmlError> {
    Xml::new().from_str(desc, input)
}
