//! Value-to-XML encoding.
//!
//! The encoder walks a value and its descriptor in lockstep and pushes
//! markup into an [`XmlWrite`]. Field order follows the descriptor, not the
//! document: attribute-classified fields land on the start tag even when
//! they are declared after element content, which is what the buffered
//! writer replay is for.

use std::sync::Arc;

use crate::descriptor::{Field, Kind, Registry, TypeDescriptor, Value};
use crate::error::{self, XmlError};
use crate::naming::{
    self, OutputKind, abbreviate_type_name, expand_template, output_kind, requested_name,
    root_name,
};
use crate::qname::QName;
use crate::writer::{BufferedWriter, XmlWrite};

pub(crate) struct Encoder<'a> {
    registry: &'a Registry,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Encoder { registry }
    }

    /// Encode a complete document.
    pub(crate) fn encode(
        &self,
        desc: &TypeDescriptor,
        value: &Value,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        w.start_document()?;
        if value.is_null() {
            return Ok(());
        }
        let tag = root_name(desc);
        log::trace!("encoding root <{tag}> as {}", desc.type_name);
        self.encode_value(desc, value, &tag, w)
    }

    fn encode_value(
        &self,
        desc: &TypeDescriptor,
        value: &Value,
        tag: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        match desc.kind {
            Kind::Primitive(_) | Kind::Enum => {
                let text = scalar_text(Some(desc), value)?;
                w.start_tag(tag)?;
                w.text(&text)?;
                w.end_tag(tag)
            }
            Kind::Class | Kind::Object => self.encode_tag(desc, value, tag, w),
            Kind::List => self.encode_list_wrapper(desc, desc.item_field()?, value, tag, w),
            Kind::Map => self.encode_map_wrapper(desc, value, tag, w),
            Kind::Polymorphic => {
                // A bare union at the root has no declaring field, so it
                // always carries its discriminator explicitly.
                self.encode_poly_explicit(desc, value, tag, w)
            }
        }
    }

    /// Encode one class or object frame.
    fn encode_tag(
        &self,
        desc: &TypeDescriptor,
        value: &Value,
        tag: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        w.start_tag(tag)?;
        if desc.kind == Kind::Object {
            return w.end_tag(tag);
        }

        let values = match value {
            Value::Struct(values) if values.len() == desc.fields.len() => values,
            Value::Struct(values) => {
                return Err(error::structure_mismatch(
                    format!("{} field values for {}", desc.fields.len(), desc.type_name),
                    format!("{}", values.len()),
                ));
            }
            other => {
                return Err(error::structure_mismatch(
                    format!("a struct value for {}", desc.type_name),
                    describe_value(other),
                ));
            }
        };

        let children: Vec<Option<Arc<TypeDescriptor>>> = desc
            .fields
            .iter()
            .map(|f| f.resolve_child(self.registry))
            .collect();
        let kinds: Vec<OutputKind> = desc
            .fields
            .iter()
            .zip(&children)
            .map(|(f, c)| output_kind(f, c.as_deref()))
            .collect();

        // Element content gets buffered up to the last attribute declared
        // after it, so every attribute still reaches the open start tag.
        let last_inverted = last_inverted_index(&kinds);
        let mut buffer = last_inverted.map(|_| BufferedWriter::new(w.namespace_scope()));
        let scope = w.namespace_scope();

        for (i, (field, v)) in desc.fields.iter().zip(values).enumerate() {
            if !v.is_null() {
                let child = children[i].as_deref();
                match kinds[i] {
                    OutputKind::Attribute => {
                        let name = attribute_name(tag, field, child, &scope)?;
                        let text = scalar_text(child, v)?;
                        w.attribute(&name, &text)?;
                    }
                    OutputKind::Text => {
                        let text = scalar_text(child, v)?;
                        match (&mut buffer, last_inverted) {
                            (Some(buf), Some(li)) if i <= li => buf.text(&text)?,
                            _ => w.text(&text)?,
                        }
                    }
                    OutputKind::Element => {
                        let sink: &mut dyn XmlWrite = match (&mut buffer, last_inverted) {
                            (Some(buf), Some(li)) if i <= li => buf,
                            _ => &mut *w,
                        };
                        self.encode_field_element(field, children[i].clone(), v, tag, sink)?;
                    }
                }
            }
            if last_inverted == Some(i)
                && let Some(buf) = buffer.take()
            {
                buf.flush_to(w)?;
            }
        }
        if let Some(buf) = buffer.take() {
            buf.flush_to(w)?;
        }
        w.end_tag(tag)
    }

    /// Encode one element-classified field.
    fn encode_field_element(
        &self,
        field: &Field,
        child: Option<Arc<TypeDescriptor>>,
        value: &Value,
        parent: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let scope = w.namespace_scope();
        let name = requested_name(parent, field, child.as_deref(), &scope)?;
        let Some(child) = child else {
            // Descriptor unavailable: degrade to a simple text element.
            let text = scalar_text(None, value)?;
            w.start_tag(&name)?;
            w.text(&text)?;
            w.end_tag(&name)?;
            return Ok(());
        };

        match child.kind {
            Kind::Primitive(_) | Kind::Enum => {
                let text = scalar_text(Some(&child), value)?;
                w.start_tag(&name)?;
                w.text(&text)?;
                w.end_tag(&name)
            }
            Kind::Class | Kind::Object => self.encode_tag(&child, value, &name, w),
            Kind::List => {
                if wrapper_name(field, &child).is_some() {
                    self.encode_list_wrapper(&child, field, value, &name, w)
                } else {
                    self.encode_repeats(field, &child, value, &name, parent, w)
                }
            }
            Kind::Map => {
                if wrapper_name(field, &child).is_some() {
                    self.encode_map_wrapper(&child, value, &name, w)
                } else {
                    let Value::Map(entries) = value else {
                        return Err(error::structure_mismatch(
                            format!("a map value for field '{}'", field.name),
                            describe_value(value),
                        ));
                    };
                    for (k, v) in entries {
                        self.encode_map_entry(&child, k, v, &name, w)?;
                    }
                    Ok(())
                }
            }
            Kind::Polymorphic => self.encode_poly(field, &child, value, &name, parent, w),
        }
    }

    /// A collection behind its wrapper element.
    fn encode_list_wrapper(
        &self,
        list: &TypeDescriptor,
        field: &Field,
        value: &Value,
        tag: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let Value::List(items) = value else {
            return Err(error::structure_mismatch(
                format!("a list value for field '{}'", field.name),
                describe_value(value),
            ));
        };
        let item_field = list.item_field()?;
        let item_desc = item_field.resolve_child(self.registry);
        let item_name = match wrapper_name(field, list) {
            Some(template) => expand_template(template, tag),
            None => QName::prefixed(tag.namespace_uri(), &item_field.name, tag.prefix()),
        };

        w.start_tag(tag)?;
        // Declare the item namespace once on the wrapper instead of on
        // every item.
        if !item_name.prefix().is_empty()
            && w.namespace_scope().needs_declaration(&item_name)
        {
            w.namespace_attr(item_name.prefix(), item_name.namespace_uri())?;
        }
        for item in items {
            self.encode_item(item_desc.as_deref(), item, &item_name, w)?;
        }
        w.end_tag(tag)
    }

    /// A collection flattened into repeated sibling elements.
    fn encode_repeats(
        &self,
        field: &Field,
        list: &TypeDescriptor,
        value: &Value,
        tag: &QName,
        parent: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let Value::List(items) = value else {
            return Err(error::structure_mismatch(
                format!("a list value for field '{}'", field.name),
                describe_value(value),
            ));
        };
        let item_desc = list.item_field()?.resolve_child(self.registry);
        for item in items {
            match (item, item_desc.as_deref()) {
                (Value::Variant { .. }, Some(base)) if base.kind == Kind::Polymorphic => {
                    self.encode_poly(field, base, item, tag, parent, w)?;
                }
                _ => self.encode_item(item_desc.as_deref(), item, tag, w)?,
            }
        }
        Ok(())
    }

    fn encode_item(
        &self,
        desc: Option<&TypeDescriptor>,
        value: &Value,
        tag: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        match desc {
            Some(d) => self.encode_value(d, value, tag, w),
            None => {
                let text = scalar_text(None, value)?;
                w.start_tag(tag)?;
                w.text(&text)?;
                w.end_tag(tag)
            }
        }
    }

    fn encode_map_wrapper(
        &self,
        map: &TypeDescriptor,
        value: &Value,
        tag: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let Value::Map(entries) = value else {
            return Err(error::structure_mismatch(
                format!("a map value for {}", map.type_name),
                describe_value(value),
            ));
        };
        let entry_name = match &map.config.children_name {
            Some(template) => expand_template(template, tag),
            None => QName::prefixed(tag.namespace_uri(), "entry", tag.prefix()),
        };
        w.start_tag(tag)?;
        for (k, v) in entries {
            self.encode_map_entry(map, k, v, &entry_name, w)?;
        }
        w.end_tag(tag)
    }

    /// One map entry: an element holding a key child and a value child.
    fn encode_map_entry(
        &self,
        map: &TypeDescriptor,
        key: &Value,
        value: &Value,
        entry_name: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let (key_field, value_field) = map.entry_fields()?;
        w.start_tag(entry_name)?;
        let key_name =
            QName::prefixed(entry_name.namespace_uri(), &key_field.name, entry_name.prefix());
        self.encode_item(
            key_field.resolve_child(self.registry).as_deref(),
            key,
            &key_name,
            w,
        )?;
        let value_name = QName::prefixed(
            entry_name.namespace_uri(),
            &value_field.name,
            entry_name.prefix(),
        );
        self.encode_item(
            value_field.resolve_child(self.registry).as_deref(),
            value,
            &value_name,
            w,
        )?;
        w.end_tag(entry_name)
    }

    /// A polymorphic value in field position: transparent when the field
    /// declares a tag for the concrete type, explicit otherwise.
    fn encode_poly(
        &self,
        field: &Field,
        base: &TypeDescriptor,
        value: &Value,
        tag: &QName,
        parent: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let Value::Variant { type_name, value } = value else {
            return Err(error::structure_mismatch(
                format!("a variant value for field '{}'", field.name),
                describe_value(value),
            ));
        };
        for declared in &field.config.poly_children {
            let info = naming::poly_tag_name(parent, declared, 0, &base.type_name);
            if &info.type_name == type_name {
                let variant = self.variant_descriptor(base, type_name)?;
                return self.encode_value(&variant, value, &info.tag_name, w);
            }
        }
        self.encode_poly_explicit(base, &Value::variant(type_name.clone(), (**value).clone()), tag, w)
    }

    /// The explicit union shape: a `type` attribute plus a `value` child.
    fn encode_poly_explicit(
        &self,
        base: &TypeDescriptor,
        value: &Value,
        tag: &QName,
        w: &mut dyn XmlWrite,
    ) -> Result<(), XmlError> {
        let Value::Variant { type_name, value } = value else {
            return Err(error::structure_mismatch(
                format!("a variant value for {}", base.type_name),
                describe_value(value),
            ));
        };
        let variant = self.variant_descriptor(base, type_name)?;
        w.start_tag(tag)?;
        w.attribute(
            &QName::local("type"),
            &abbreviate_type_name(type_name, &base.type_name),
        )?;
        let value_name = QName::prefixed(tag.namespace_uri(), "value", tag.prefix());
        self.encode_value(&variant, value, &value_name, w)?;
        w.end_tag(tag)
    }

    fn variant_descriptor(
        &self,
        base: &TypeDescriptor,
        type_name: &str,
    ) -> Result<Arc<TypeDescriptor>, XmlError> {
        if let Some(d) = self.registry.lookup(type_name) {
            return Ok(d);
        }
        base.variant_index(type_name)
            .and_then(|i| base.fields[i].resolve_child(self.registry))
            .ok_or_else(|| error::descriptor_unavailable(type_name))
    }
}

/// The wrapper-vs-repeats decision for a collection field: a configured
/// children name (on the field or the collection type) means wrapped.
fn wrapper_name<'a>(field: &'a Field, child: &'a TypeDescriptor) -> Option<&'a crate::descriptor::NameTemplate> {
    field
        .config
        .children_name
        .as_ref()
        .or(child.config.children_name.as_ref())
}

/// The index of the last attribute field declared after element or text
/// content, if any. Content up to that index has to be buffered.
fn last_inverted_index(kinds: &[OutputKind]) -> Option<usize> {
    let first_content = kinds.iter().position(|k| *k != OutputKind::Attribute)?;
    kinds
        .iter()
        .enumerate()
        .skip(first_content)
        .filter(|(_, k)| **k == OutputKind::Attribute)
        .map(|(i, _)| i)
        .last()
}

/// Attribute names written unprefixed land in no namespace; retrying them
/// against the parent namespace on decode restores the match.
fn attribute_name(
    tag: &QName,
    field: &Field,
    child: Option<&TypeDescriptor>,
    scope: &crate::qname::NamespaceScope,
) -> Result<QName, XmlError> {
    let name = requested_name(tag, field, child, scope)?;
    if name.prefix().is_empty() && name.namespace_uri() == tag.namespace_uri() {
        return Ok(QName::local(name.local_name()));
    }
    Ok(name)
}

fn scalar_text(desc: Option<&TypeDescriptor>, value: &Value) -> Result<String, XmlError> {
    match value {
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Text(s) => Ok(s.clone()),
        Value::Enum(name) => {
            if let Some(d) = desc
                && d.kind == Kind::Enum
                && d.variant_index(name).is_none()
            {
                return Err(error::invalid_value(
                    name,
                    format!("a variant of '{}'", d.type_name),
                ));
            }
            Ok(name.clone())
        }
        other => Err(error::structure_mismatch(
            "a scalar value",
            describe_value(other),
        )),
    }
}

pub(crate) fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Int(_) => "an integer",
        Value::Float(_) => "a floating point number",
        Value::Text(_) => "a string",
        Value::Struct(_) => "a struct",
        Value::List(_) => "a list",
        Value::Map(_) => "a map",
        Value::Enum(_) => "an enum value",
        Value::Variant { .. } => "a variant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_index_only_when_content_precedes_attributes() {
        use OutputKind::*;
        assert_eq!(last_inverted_index(&[Attribute, Attribute, Element]), None);
        assert_eq!(last_inverted_index(&[Attribute, Element, Attribute]), Some(2));
        assert_eq!(
            last_inverted_index(&[Element, Attribute, Element, Attribute]),
            Some(3)
        );
        assert_eq!(last_inverted_index(&[Element, Element]), None);
        assert_eq!(last_inverted_index(&[]), None);
    }
}
