//! Type descriptors: the immutable shape descriptions the engine walks.
//!
//! A [`TypeDescriptor`] is built once per structured type and shared
//! read-only across every encode and decode that touches the type. The
//! engine never mutates a descriptor; per-operation state lives in the
//! encoder/decoder frames.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{self, XmlError};

/// Subkind of a primitive descriptor, driving scalar parse/print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Int,
    Float,
    Str,
}

impl PrimitiveKind {
    pub(crate) fn expected(&self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "a boolean",
            PrimitiveKind::Int => "an integer",
            PrimitiveKind::Float => "a floating point number",
            PrimitiveKind::Str => "a string",
        }
    }
}

/// Structural kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A scalar value.
    Primitive(PrimitiveKind),
    /// A product type with named fields.
    Class,
    /// A homogeneous sequence; the item type is element 0.
    List,
    /// A key/value collection; key is element 0, value is element 1.
    Map,
    /// A closed set of named variants, carried as a name string.
    Enum,
    /// An open union dispatched by discriminator or matched tag name.
    Polymorphic,
    /// A type with exactly one value and no fields.
    Object,
}

impl Kind {
    /// Scalar kinds are attribute-eligible and carry no child structure.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Kind::Primitive(_) | Kind::Enum)
    }
}

/// The parts of an explicitly configured qualified name.
///
/// An unset namespace or prefix inherits the corresponding part of the
/// parent tag's name when the template is expanded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameTemplate {
    pub local: String,
    pub namespace: Option<String>,
    pub prefix: Option<String>,
}

impl NameTemplate {
    /// A template with only the local name set.
    pub fn local(local: impl Into<String>) -> Self {
        NameTemplate {
            local: local.into(),
            namespace: None,
            prefix: None,
        }
    }

    /// Pin the namespace URI (an unset prefix still inherits).
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Pin the prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

/// Type-level configuration.
#[derive(Debug, Clone, Default)]
pub struct TypeConfig {
    /// Explicit serial name for the type's own tag.
    pub name: Option<NameTemplate>,
    /// Explicit name for the children of a collection at the type level.
    pub children_name: Option<NameTemplate>,
}

/// Per-field configuration, as harvested by a descriptor builder.
///
/// At most one of `element == Some(true)`, `element == Some(false)` and
/// `text` is meaningful per field; classification resolves the final
/// output kind.
#[derive(Debug, Clone, Default)]
pub struct FieldConfig {
    /// Explicit name override for this field.
    pub name: Option<NameTemplate>,
    /// Wrapper children name: forces element output and names the items.
    pub children_name: Option<NameTemplate>,
    /// `Some(true)` forces element output, `Some(false)` forces attribute.
    pub element: Option<bool>,
    /// The field is the element's character content.
    pub text: bool,
    /// Default value, itself parsed as an XML fragment when applied.
    pub default: Option<String>,
    /// Polymorphic children declarations: `"full.TypeName"` or
    /// `"full.TypeName=tag"`.
    pub poly_children: Vec<String>,
}

/// A reference to a child type: either inline or by registered name.
///
/// Named references are resolved lazily through the [`Registry`], which is
/// what makes self-referential types representable; an unregistered name
/// resolves to "descriptor unavailable" and the engine degrades per the
/// absence heuristics instead of recursing forever.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Inline(Arc<TypeDescriptor>),
    Named(String),
}

impl TypeRef {
    /// Reference a type by its registered logical name.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Resolve the reference; `None` when the descriptor is unavailable.
    pub fn resolve(&self, registry: &Registry) -> Option<Arc<TypeDescriptor>> {
        match self {
            TypeRef::Inline(d) => Some(Arc::clone(d)),
            TypeRef::Named(name) => registry.lookup(name),
        }
    }
}

impl From<TypeDescriptor> for TypeRef {
    fn from(d: TypeDescriptor) -> Self {
        TypeRef::Inline(Arc::new(d))
    }
}

impl From<Arc<TypeDescriptor>> for TypeRef {
    fn from(d: Arc<TypeDescriptor>) -> Self {
        TypeRef::Inline(d)
    }
}

/// One element (field, item slot, variant) of a type.
#[derive(Debug, Clone)]
pub struct Field {
    /// Declared field name, used as the fallback tag name.
    pub name: String,
    /// Optional fields may be absent without defaulting or error.
    pub optional: bool,
    /// Field configuration.
    pub config: FieldConfig,
    /// The field's type; `None` for enum variants.
    pub child: Option<TypeRef>,
}

impl Field {
    /// A field of the given child type.
    pub fn new(name: impl Into<String>, child: impl Into<TypeRef>) -> Self {
        Field {
            name: name.into(),
            optional: false,
            config: FieldConfig::default(),
            child: Some(child.into()),
        }
    }

    /// Mark the field optional: absence is fine and yields null.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Force the field to encode as a child element.
    pub fn element(mut self) -> Self {
        self.config.element = Some(true);
        self
    }

    /// Force the field to encode as an attribute.
    pub fn attribute(mut self) -> Self {
        self.config.element = Some(false);
        self
    }

    /// Make the field the element's character content.
    pub fn text(mut self) -> Self {
        self.config.text = true;
        self
    }

    /// Explicit qualified name for the field.
    pub fn with_name(mut self, name: NameTemplate) -> Self {
        self.config.name = Some(name);
        self
    }

    /// Wrap repeated items in an element carrying this children name.
    pub fn with_children_name(mut self, name: NameTemplate) -> Self {
        self.config.children_name = Some(name);
        self
    }

    /// Declare a default value string for the field.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.config.default = Some(default.into());
        self
    }

    /// Declare the polymorphic children this field accepts.
    pub fn with_poly_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.poly_children = children.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn resolve_child(&self, registry: &Registry) -> Option<Arc<TypeDescriptor>> {
        self.child.as_ref().and_then(|c| c.resolve(registry))
    }
}

/// The read-only shape description of one type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Logical type identifier, also the discriminator string for
    /// polymorphic dispatch and the fallback root tag name.
    pub type_name: String,
    /// Structural kind.
    pub kind: Kind,
    /// A nullable type decodes to null when absent.
    pub nullable: bool,
    /// Type-level configuration.
    pub config: TypeConfig,
    /// Elements: fields of a class, item slot of a list (index 0), key and
    /// value slots of a map (0 and 1), variants of an enum or union.
    pub fields: Vec<Field>,
}

impl TypeDescriptor {
    fn with_kind(type_name: impl Into<String>, kind: Kind) -> Self {
        TypeDescriptor {
            type_name: type_name.into(),
            kind,
            nullable: false,
            config: TypeConfig::default(),
            fields: Vec::new(),
        }
    }

    /// A string descriptor.
    pub fn string() -> Self {
        Self::with_kind("string", Kind::Primitive(PrimitiveKind::Str))
    }

    /// A signed integer descriptor.
    pub fn int() -> Self {
        Self::with_kind("int", Kind::Primitive(PrimitiveKind::Int))
    }

    /// A boolean descriptor.
    pub fn boolean() -> Self {
        Self::with_kind("boolean", Kind::Primitive(PrimitiveKind::Bool))
    }

    /// A floating point descriptor.
    pub fn float() -> Self {
        Self::with_kind("float", Kind::Primitive(PrimitiveKind::Float))
    }

    /// A class-like descriptor; add fields with [`TypeDescriptor::field`].
    pub fn class(type_name: impl Into<String>) -> Self {
        Self::with_kind(type_name, Kind::Class)
    }

    /// A singleton object descriptor (no fields, one value).
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::with_kind(type_name, Kind::Object)
    }

    /// A list descriptor over the given item type.
    pub fn list(type_name: impl Into<String>, item: impl Into<TypeRef>) -> Self {
        let mut d = Self::with_kind(type_name, Kind::List);
        d.fields.push(Field::new("item", item));
        d
    }

    /// A map descriptor over the given key and value types.
    pub fn map(
        type_name: impl Into<String>,
        key: impl Into<TypeRef>,
        value: impl Into<TypeRef>,
    ) -> Self {
        let mut d = Self::with_kind(type_name, Kind::Map);
        d.fields.push(Field::new("key", key));
        d.fields.push(Field::new("value", value));
        d
    }

    /// An enum descriptor over the given variant names.
    pub fn enumeration<I, S>(type_name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut d = Self::with_kind(type_name, Kind::Enum);
        for v in variants {
            d.fields.push(Field {
                name: v.into(),
                optional: false,
                config: FieldConfig::default(),
                child: None,
            });
        }
        d
    }

    /// An open polymorphic descriptor; variants are looked up by type name.
    pub fn polymorphic<I>(type_name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (String, TypeRef)>,
    {
        let mut d = Self::with_kind(type_name, Kind::Polymorphic);
        for (name, child) in variants {
            d.fields.push(Field::new(name, child));
        }
        d
    }

    /// Add a field to a class-like descriptor.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Explicit serial name for the type's own tag.
    pub fn with_name(mut self, name: NameTemplate) -> Self {
        self.config.name = Some(name);
        self
    }

    /// Explicit children name at the type level (collections).
    pub fn with_children_name(mut self, name: NameTemplate) -> Self {
        self.config.children_name = Some(name);
        self
    }

    /// Mark the type nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.fields.len()
    }

    /// Declared name of element `i`.
    pub fn element_name(&self, i: usize) -> &str {
        &self.fields[i].name
    }

    /// Whether element `i` may be absent without consequence.
    pub fn is_element_optional(&self, i: usize) -> bool {
        self.fields[i].optional
    }

    /// Resolve element `i`'s descriptor; `None` when unavailable.
    pub fn element_descriptor(
        &self,
        i: usize,
        registry: &Registry,
    ) -> Option<Arc<TypeDescriptor>> {
        self.fields[i].resolve_child(registry)
    }

    /// The item slot of a list descriptor. The kind and fields of a
    /// descriptor are public, so a hand-assembled list may lack one.
    pub(crate) fn item_field(&self) -> Result<&Field, XmlError> {
        self.fields.first().ok_or_else(|| {
            error::structure_mismatch(
                format!("an item slot on list descriptor '{}'", self.type_name),
                "no elements",
            )
        })
    }

    /// The key and value slots of a map descriptor.
    pub(crate) fn entry_fields(&self) -> Result<(&Field, &Field), XmlError> {
        match self.fields.as_slice() {
            [key, value, ..] => Ok((key, value)),
            _ => Err(error::structure_mismatch(
                format!(
                    "key and value slots on map descriptor '{}'",
                    self.type_name
                ),
                format!("{} elements", self.fields.len()),
            )),
        }
    }

    /// Index of the field designated as character content, if any.
    pub(crate) fn text_field(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.config.text)
    }

    /// Look up an enum variant or union variant by name.
    pub(crate) fn variant_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Shared store of descriptors, keyed by logical type name.
///
/// Registration happens up front; all engine access is read-only, so a
/// registry can back any number of concurrent encode/decode calls on
/// independent documents.
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a descriptor under its type name, returning the shared handle.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let handle = Arc::new(descriptor);
        self.types
            .insert(handle.type_name.clone(), Arc::clone(&handle));
        handle
    }

    /// Look up a descriptor by logical type name.
    pub fn lookup(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(type_name).cloned()
    }
}

/// A dynamic value, the engine's input and output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence; encodes as nothing at all.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Fields of a class, positionally matching the descriptor.
    Struct(Vec<Value>),
    List(Vec<Value>),
    /// Entries in document order; keys are not deduplicated.
    Map(Vec<(Value, Value)>),
    /// An enum carried by variant name.
    Enum(String),
    /// A polymorphic value tagged with its concrete type name.
    Variant {
        type_name: String,
        value: Box<Value>,
    },
}

impl Value {
    /// Convenience constructor for string values.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Convenience constructor for polymorphic values.
    pub fn variant(type_name: impl Into<String>, value: Value) -> Self {
        Value::Variant {
            type_name: type_name.into(),
            value: Box::new(value),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}
