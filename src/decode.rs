//! XML-to-value decoding.
//!
//! Each structured element is decoded in three phases: attributes off the
//! start tag, then children and character content in document order, then
//! defaulting for whatever was never seen. The cursor convention is strict:
//! every decode step is entered with the cursor on a start tag and returns
//! with it on the matching end tag.

use std::sync::Arc;

use crate::descriptor::{Field, Kind, PrimitiveKind, Registry, TypeDescriptor, Value};
use crate::encode::describe_value;
use crate::error::{self, XmlError};
use crate::naming::{NameHit, NameIndex, expand_template, expand_type_name, root_name};
use crate::qname::QName;
use crate::reader::{DocumentReader, EventType, XmlRead};

pub(crate) struct Decoder<'a> {
    registry: &'a Registry,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Decoder { registry }
    }

    /// Decode a complete document.
    pub(crate) fn decode(
        &self,
        desc: &TypeDescriptor,
        r: &mut dyn XmlRead,
    ) -> Result<Value, XmlError> {
        r.next_tag()?;
        r.require(EventType::StartElement, None, None)?;
        let expected = root_name(desc);
        let actual = r.name();
        if actual.local_name() != expected.local_name()
            || (!expected.namespace_uri().is_empty()
                && actual.namespace_uri() != expected.namespace_uri())
        {
            return Err(error::structure_mismatch(
                format!("root tag '{expected}'"),
                actual.to_string(),
            )
            .at(r.location()));
        }
        log::trace!("decoding root <{actual}> as {}", desc.type_name);
        let value = self.decode_element_value(desc, r, &actual)?;

        // Only ignorable content may follow the root element.
        loop {
            match r.next()? {
                EventType::EndDocument => return Ok(value),
                EventType::Comment
                | EventType::ProcessingInstruction
                | EventType::DocDecl => continue,
                EventType::Text if r.is_whitespace() => continue,
                other => {
                    return Err(error::structure_mismatch(
                        "end of document",
                        other.describe(),
                    )
                    .at(r.location()));
                }
            }
        }
    }

    /// Decode the element whose start tag the cursor rests on. Returns on
    /// the matching end tag.
    fn decode_element_value(
        &self,
        desc: &TypeDescriptor,
        r: &mut dyn XmlRead,
        tag: &QName,
    ) -> Result<Value, XmlError> {
        match desc.kind {
            Kind::Primitive(_) | Kind::Enum => {
                let location = r.location();
                let raw = r.read_simple_element()?;
                parse_scalar(&raw, Some(desc), None).map_err(|e| e.at(location))
            }
            Kind::Class | Kind::Object => self.decode_tag(desc, r, tag),
            Kind::List => self.decode_named_list(desc, None, r, tag),
            Kind::Map => self.decode_named_map(desc, r, tag),
            Kind::Polymorphic => self.decode_poly_explicit(desc, r),
        }
    }

    /// The three-phase struct decoder.
    fn decode_tag(
        &self,
        desc: &TypeDescriptor,
        r: &mut dyn XmlRead,
        tag: &QName,
    ) -> Result<Value, XmlError> {
        let scope = r.namespace_scope();
        let index = NameIndex::build(desc, tag, self.registry, &scope)?;
        let mut values: Vec<Option<Value>> = vec![None; desc.fields.len()];
        let text_index = desc.text_field();
        let mut text: Option<String> = None;

        // Phase 1: attributes.
        for i in 0..r.attribute_count() {
            let name = r.attribute_name(i);
            if name.is_namespace_declaration() {
                continue;
            }
            let hit = index.resolve(&name, true, r.location())?;
            let field = &desc.fields[hit.index];
            let child = field.resolve_child(self.registry);
            let value = parse_scalar(
                r.attribute_value(i),
                child.as_deref(),
                field.config.default.as_deref(),
            )
            .map_err(|e| e.at(r.location()))?;
            values[hit.index] = Some(value);
        }

        // Phase 2: children and character content.
        loop {
            match r.next()? {
                EventType::EndElement => break,
                EventType::Comment
                | EventType::ProcessingInstruction
                | EventType::DocDecl => continue,
                EventType::Text => {
                    if text_index.is_some() {
                        text.get_or_insert_with(String::new).push_str(r.text());
                    } else if !r.is_whitespace() {
                        return Err(error::structure_mismatch(
                            format!("a field of {}", desc.type_name),
                            format!("text '{}'", r.text().trim()),
                        )
                        .at(r.location()));
                    }
                }
                EventType::StartElement => {
                    let name = r.name();
                    let hit = index.resolve(&name, false, r.location())?;
                    self.decode_child(desc, &hit, r, &name, &mut values)?;
                }
                other => {
                    return Err(error::structure_mismatch(
                        format!("the content of {}", desc.type_name),
                        other.describe(),
                    )
                    .at(r.location()));
                }
            }
        }

        // Text content parses like a simple element, empty when absent. A
        // slot already filled during the attribute phase stays filled.
        if let Some(ti) = text_index
            && values[ti].is_none()
        {
            let field = &desc.fields[ti];
            let child = field.resolve_child(self.registry);
            let raw = text.unwrap_or_default();
            values[ti] = Some(
                parse_scalar(&raw, child.as_deref(), field.config.default.as_deref())
                    .map_err(|e| e.at(r.location()))?,
            );
        }

        // Phase 3: defaulting for unseen fields.
        for (i, slot) in values.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let field = &desc.fields[i];
            let child = field.resolve_child(self.registry);
            if let Some(default) = &field.config.default {
                *slot = Some(self.parse_default(default, child.as_deref())?);
            } else if field.optional {
                *slot = Some(Value::Null);
            } else {
                *slot = Some(match child.as_deref() {
                    None => Value::Null,
                    Some(d) if d.nullable => Value::Null,
                    Some(d) if d.kind == Kind::List => Value::List(Vec::new()),
                    Some(d) if d.kind == Kind::Map => Value::Map(Vec::new()),
                    Some(_) => {
                        return Err(error::missing_field(&field.name).at(r.location()));
                    }
                });
            }
        }

        Ok(Value::Struct(
            values.into_iter().map(|v| v.unwrap_or(Value::Null)).collect(),
        ))
    }

    /// Decode one child element into its field slot. The cursor is on the
    /// child's start tag.
    fn decode_child(
        &self,
        desc: &TypeDescriptor,
        hit: &NameHit,
        r: &mut dyn XmlRead,
        name: &QName,
        values: &mut [Option<Value>],
    ) -> Result<(), XmlError> {
        let field = &desc.fields[hit.index];
        let Some(child) = field.resolve_child(self.registry) else {
            // Descriptor unavailable: keep the raw character content.
            let raw = r.read_simple_element()?;
            values[hit.index] = Some(Value::Text(raw));
            return Ok(());
        };

        match child.kind {
            Kind::Primitive(_) | Kind::Enum => {
                let location = r.location();
                let raw = r.read_simple_element()?;
                let value =
                    parse_scalar(&raw, Some(&child), field.config.default.as_deref())
                        .map_err(|e| e.at(location))?;
                values[hit.index] = Some(value);
            }
            Kind::Class | Kind::Object => {
                values[hit.index] = Some(self.decode_tag(&child, r, name)?);
            }
            Kind::List => {
                if wrapper_name(field, &child).is_some() {
                    values[hit.index] =
                        Some(self.decode_named_list(&child, Some(field), r, name)?);
                } else {
                    // Unwrapped repeats arrive one element at a time.
                    let item_desc = child.item_field()?.resolve_child(self.registry);
                    let item = match &hit.poly {
                        Some(info) => {
                            let base = item_desc.as_deref().unwrap_or(&child);
                            let variant = self.variant_descriptor(base, &info.type_name)?;
                            Value::variant(
                                info.type_name.clone(),
                                self.decode_element_value(&variant, r, name)?,
                            )
                        }
                        None => self.decode_item(item_desc.as_deref(), r, name)?,
                    };
                    push_list_item(&mut values[hit.index], item);
                }
            }
            Kind::Map => {
                if wrapper_name(field, &child).is_some() {
                    values[hit.index] = Some(self.decode_named_map(&child, r, name)?);
                } else {
                    let entry = self.decode_map_entry(&child, r, name)?;
                    push_map_entry(&mut values[hit.index], entry);
                }
            }
            Kind::Polymorphic => {
                let value = match &hit.poly {
                    Some(info) => {
                        let variant = self.variant_descriptor(&child, &info.type_name)?;
                        Value::variant(
                            info.type_name.clone(),
                            self.decode_element_value(&variant, r, name)?,
                        )
                    }
                    None => self.decode_poly_explicit(&child, r)?,
                };
                values[hit.index] = Some(value);
            }
        }
        Ok(())
    }

    fn decode_item(
        &self,
        desc: Option<&TypeDescriptor>,
        r: &mut dyn XmlRead,
        tag: &QName,
    ) -> Result<Value, XmlError> {
        match desc {
            Some(d) => self.decode_element_value(d, r, tag),
            None => Ok(Value::Text(r.read_simple_element()?)),
        }
    }

    /// Decode a wrapped collection: the cursor is on the wrapper's start
    /// tag, items are the wrapper's children.
    fn decode_named_list(
        &self,
        list: &TypeDescriptor,
        field: Option<&Field>,
        r: &mut dyn XmlRead,
        wrapper: &QName,
    ) -> Result<Value, XmlError> {
        let item_field = list.item_field()?;
        let item_desc = item_field.resolve_child(self.registry);
        let item_name = field
            .and_then(|f| wrapper_name(f, list))
            .or(list.config.children_name.as_ref())
            .map(|t| expand_template(t, wrapper))
            .unwrap_or_else(|| {
                QName::prefixed(wrapper.namespace_uri(), &item_field.name, wrapper.prefix())
            });

        let mut items = Vec::new();
        loop {
            match r.next_tag()? {
                EventType::EndElement => break,
                EventType::StartElement => {
                    let name = r.name();
                    if name.normalize() != item_name.normalize() {
                        return Err(error::structure_mismatch(
                            format!("list item '{item_name}'"),
                            name.to_string(),
                        )
                        .at(r.location()));
                    }
                    items.push(self.decode_item(item_desc.as_deref(), r, &name)?);
                }
                other => {
                    return Err(error::structure_mismatch(
                        format!("items of '{wrapper}'"),
                        other.describe(),
                    )
                    .at(r.location()));
                }
            }
        }
        Ok(Value::List(items))
    }

    fn decode_named_map(
        &self,
        map: &TypeDescriptor,
        r: &mut dyn XmlRead,
        wrapper: &QName,
    ) -> Result<Value, XmlError> {
        let entry_name = map
            .config
            .children_name
            .as_ref()
            .map(|t| expand_template(t, wrapper))
            .unwrap_or_else(|| {
                QName::prefixed(wrapper.namespace_uri(), "entry", wrapper.prefix())
            });

        let mut entries = Vec::new();
        loop {
            match r.next_tag()? {
                EventType::EndElement => break,
                EventType::StartElement => {
                    let name = r.name();
                    if name.normalize() != entry_name.normalize() {
                        return Err(error::structure_mismatch(
                            format!("map entry '{entry_name}'"),
                            name.to_string(),
                        )
                        .at(r.location()));
                    }
                    entries.push(self.decode_map_entry(map, r, &name)?);
                }
                other => {
                    return Err(error::structure_mismatch(
                        format!("entries of '{wrapper}'"),
                        other.describe(),
                    )
                    .at(r.location()));
                }
            }
        }
        Ok(Value::Map(entries))
    }

    /// One map entry element with key and value children, in either order.
    fn decode_map_entry(
        &self,
        map: &TypeDescriptor,
        r: &mut dyn XmlRead,
        entry: &QName,
    ) -> Result<(Value, Value), XmlError> {
        let (key_field, value_field) = map.entry_fields()?;
        let mut key = None;
        let mut value = None;
        loop {
            match r.next_tag()? {
                EventType::EndElement => break,
                EventType::StartElement => {
                    let name = r.name();
                    if name.local_name() == key_field.name {
                        key = Some(self.decode_item(
                            key_field.resolve_child(self.registry).as_deref(),
                            r,
                            &name,
                        )?);
                    } else if name.local_name() == value_field.name {
                        value = Some(self.decode_item(
                            value_field.resolve_child(self.registry).as_deref(),
                            r,
                            &name,
                        )?);
                    } else {
                        return Err(error::unknown_field(
                            name.to_string(),
                            vec![key_field.name.clone(), value_field.name.clone()],
                        )
                        .at(r.location()));
                    }
                }
                other => {
                    return Err(error::structure_mismatch(
                        format!("children of '{entry}'"),
                        other.describe(),
                    )
                    .at(r.location()));
                }
            }
        }
        let key = key.ok_or_else(|| error::missing_field(&key_field.name).at(r.location()))?;
        let value =
            value.ok_or_else(|| error::missing_field(&value_field.name).at(r.location()))?;
        Ok((key, value))
    }

    /// The explicit union shape: a `type` attribute and a `value` child.
    fn decode_poly_explicit(
        &self,
        base: &TypeDescriptor,
        r: &mut dyn XmlRead,
    ) -> Result<Value, XmlError> {
        let location = r.location();
        let discriminator = r
            .attribute_value_by_name("", "type")
            .map(str::to_owned)
            .ok_or_else(|| {
                error::type_mismatch(format!(
                    "missing 'type' discriminator for '{}'",
                    base.type_name
                ))
                .at(location)
            })?;
        let type_name = expand_type_name(&discriminator, &base.type_name);
        let variant = self.variant_descriptor(base, &type_name).map_err(|_| {
            error::type_mismatch(format!(
                "'{discriminator}' is not a known variant of '{}'",
                base.type_name
            ))
            .at(location)
        })?;

        r.next_tag()?;
        r.require(EventType::StartElement, None, Some("value"))?;
        let value_tag = r.name();
        let value = self.decode_element_value(&variant, r, &value_tag)?;
        r.next_tag()?;
        r.require(EventType::EndElement, None, None)?;
        Ok(Value::variant(type_name, value))
    }

    /// Re-parse a declared default string as an XML fragment of the
    /// field's type.
    fn parse_default(
        &self,
        default: &str,
        desc: Option<&TypeDescriptor>,
    ) -> Result<Value, XmlError> {
        let Some(desc) = desc else {
            return Ok(Value::Text(default.to_owned()));
        };
        match desc.kind {
            Kind::Primitive(_) | Kind::Enum => {
                let mut fragment = DocumentReader::fragment(default)?;
                fragment.next()?;
                let text = fragment.all_text()?;
                parse_scalar(&text, Some(desc), None)
            }
            Kind::Class | Kind::Object | Kind::Polymorphic => {
                let mut fragment = DocumentReader::fragment(default)?;
                fragment.next_tag()?;
                fragment.require(EventType::StartElement, None, None)?;
                let tag = fragment.name();
                self.decode_element_value(desc, &mut fragment, &tag)
            }
            Kind::List => {
                let item_desc = desc.item_field()?.resolve_child(self.registry);
                let mut fragment = DocumentReader::fragment(default)?;
                let mut items = Vec::new();
                loop {
                    match fragment.next_tag()? {
                        EventType::EndDocument => break,
                        EventType::StartElement => {
                            let tag = fragment.name();
                            items.push(self.decode_item(
                                item_desc.as_deref(),
                                &mut fragment,
                                &tag,
                            )?);
                        }
                        other => {
                            return Err(error::structure_mismatch(
                                "default list items",
                                other.describe(),
                            ));
                        }
                    }
                }
                Ok(Value::List(items))
            }
            Kind::Map => {
                let mut fragment = DocumentReader::fragment(default)?;
                let mut entries = Vec::new();
                loop {
                    match fragment.next_tag()? {
                        EventType::EndDocument => break,
                        EventType::StartElement => {
                            let tag = fragment.name();
                            entries.push(self.decode_map_entry(desc, &mut fragment, &tag)?);
                        }
                        other => {
                            return Err(error::structure_mismatch(
                                "default map entries",
                                other.describe(),
                            ));
                        }
                    }
                }
                Ok(Value::Map(entries))
            }
        }
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

/// The wrapper-vs-repeats decision, mirrored from the encoder.
fn wrapper_name<'a>(
    field: &'a Field,
    child: &'a TypeDescriptor,
) -> Option<&'a crate::descriptor::NameTemplate> {
    field
        .config
        .children_name
        .as_ref()
        .or(child.config.children_name.as_ref())
}

fn push_list_item(slot: &mut Option<Value>, item: Value) {
    let list = slot.get_or_insert_with(|| Value::List(Vec::new()));
    if let Value::List(items) = list {
        items.push(item);
    }
}

fn push_map_entry(slot: &mut Option<Value>, entry: (Value, Value)) {
    let map = slot.get_or_insert_with(|| Value::Map(Vec::new()));
    if let Value::Map(entries) = map {
        entries.push(entry);
    }
}

/// Parse a scalar string per its descriptor. An empty string falls back to
/// the declared default for every kind except plain strings, where empty
/// is a value in its own right.
pub(crate) fn parse_scalar(
    raw: &str,
    desc: Option<&TypeDescriptor>,
    default: Option<&str>,
) -> Result<Value, XmlError> {
    let Some(desc) = desc else {
        return Ok(Value::Text(raw.to_owned()));
    };
    let effective = match default {
        Some(d)
            if raw.is_empty()
                && desc.kind != Kind::Primitive(PrimitiveKind::Str) =>
        {
            d
        }
        _ => raw,
    };
    match desc.kind {
        Kind::Primitive(PrimitiveKind::Str) => Ok(Value::Text(raw.to_owned())),
        Kind::Primitive(PrimitiveKind::Bool) => match effective {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(error::invalid_value(effective, PrimitiveKind::Bool.expected())),
        },
        Kind::Primitive(PrimitiveKind::Int) => effective
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| error::invalid_value(effective, PrimitiveKind::Int.expected())),
        Kind::Primitive(PrimitiveKind::Float) => effective
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| error::invalid_value(effective, PrimitiveKind::Float.expected())),
        Kind::Enum => {
            if desc.variant_index(effective).is_none() {
                return Err(error::invalid_value(
                    effective,
                    format!("a variant of '{}'", desc.type_name),
                ));
            }
            Ok(Value::Enum(effective.to_owned()))
        }
        _ => Err(error::structure_mismatch(
            format!("a scalar for {}", desc.type_name),
            describe_value(&Value::Text(raw.to_owned())),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_parsing_by_kind() {
        let int = TypeDescriptor::int();
        assert_eq!(parse_scalar("42", Some(&int), None).unwrap(), Value::Int(42));
        assert!(parse_scalar("x", Some(&int), None).is_err());

        let b = TypeDescriptor::boolean();
        assert_eq!(parse_scalar("true", Some(&b), None).unwrap(), Value::Bool(true));
        assert!(parse_scalar("TRUE", Some(&b), None).is_err());
    }

    #[test]
    fn empty_scalar_falls_back_to_default() {
        let int = TypeDescriptor::int();
        assert_eq!(
            parse_scalar("", Some(&int), Some("7")).unwrap(),
            Value::Int(7)
        );
        // Non-empty input ignores the default.
        assert_eq!(
            parse_scalar("3", Some(&int), Some("7")).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn empty_string_is_a_value_not_a_default_trigger() {
        let s = TypeDescriptor::string();
        assert_eq!(
            parse_scalar("", Some(&s), Some("fallback")).unwrap(),
            Value::Text(String::new())
        );
    }

    #[test]
    fn enum_rejects_unknown_variant() {
        let e = TypeDescriptor::enumeration("Color", ["red", "blue"]);
        assert_eq!(
            parse_scalar("red", Some(&e), None).unwrap(),
            Value::Enum("red".into())
        );
        assert!(parse_scalar("mauve", Some(&e), None).is_err());
    }
}
