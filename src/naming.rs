//! Field classification and qualified tag name resolution.
//!
//! Everything in this module is a pure function of descriptor configuration
//! and the name inherited from the parent tag; the engines call in here and
//! never invent names themselves.

use std::collections::HashMap;

use crate::descriptor::{Field, NameTemplate, Registry, TypeDescriptor};
use crate::error::{self, Location, XmlError};
use crate::qname::{NamespaceScope, QName};

/// What a field becomes in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Element,
    Attribute,
    Text,
}

/// Classify a field as element, attribute or text content.
///
/// A configured children name forces element output: a repeated value can
/// never be an attribute. Explicit element/attribute/text configuration
/// wins next; otherwise scalar fields default to attributes and anything
/// structured becomes an element.
pub fn output_kind(field: &Field, child: Option<&TypeDescriptor>) -> OutputKind {
    if field.config.children_name.is_some() {
        return OutputKind::Element;
    }
    if field.config.text {
        return OutputKind::Text;
    }
    if let Some(element) = field.config.element {
        return if element {
            OutputKind::Element
        } else {
            OutputKind::Attribute
        };
    }
    match child {
        Some(c) if c.kind.is_scalar() => OutputKind::Attribute,
        _ => OutputKind::Element,
    }
}

/// Expand an explicit name template against the parent tag's name.
///
/// An unset namespace inherits both the parent's namespace and prefix; a
/// set namespace with an unset prefix yields an unprefixed name.
pub fn expand_template(template: &NameTemplate, parent: &QName) -> QName {
    match (&template.namespace, &template.prefix) {
        (None, _) => QName::prefixed(parent.namespace_uri(), &template.local, parent.prefix()),
        (Some(ns), None) => QName::new(ns, &template.local),
        (Some(ns), Some(prefix)) => QName::prefixed(ns, &template.local, prefix),
    }
}

/// The tag name for a value of this type at the document root.
///
/// An explicit type-level name wins; with no namespace set it stays in no
/// namespace (there is no parent to inherit from). Otherwise the last
/// segment of the logical type name is used verbatim.
pub fn root_name(desc: &TypeDescriptor) -> QName {
    match &desc.config.name {
        Some(t) => match (&t.namespace, &t.prefix) {
            (None, _) => QName::local(&t.local),
            (Some(ns), None) => QName::new(ns, &t.local),
            (Some(ns), Some(p)) => QName::prefixed(ns, &t.local, p),
        },
        None => QName::local(last_segment(&desc.type_name)),
    }
}

/// Compute the tag name a field is written with and matched against.
///
/// Resolution order: an explicit per-field name override wins outright.
/// Polymorphic children use the field's declared name in the parent's
/// namespace verbatim; class-like children default to the child type's own
/// declared name. Everything else (scalars, collections, unresolvable
/// children) uses the field name qualified by the parent's namespace. A
/// field name written as `prefix:local` resolves its prefix against the
/// current namespace scope.
pub fn requested_name(
    parent: &QName,
    field: &Field,
    child: Option<&TypeDescriptor>,
    scope: &NamespaceScope,
) -> Result<QName, XmlError> {
    use crate::descriptor::Kind;

    if let Some(template) = &field.config.name {
        return Ok(expand_template(template, parent));
    }
    match child {
        Some(c) if c.kind == Kind::Polymorphic => {
            return Ok(QName::prefixed(
                parent.namespace_uri(),
                &field.name,
                parent.prefix(),
            ));
        }
        Some(c) if matches!(c.kind, Kind::Class | Kind::Object) => {
            return Ok(match &c.config.name {
                Some(template) => expand_template(template, parent),
                None => QName::prefixed(
                    parent.namespace_uri(),
                    last_segment(&c.type_name),
                    parent.prefix(),
                ),
            });
        }
        _ => {}
    }
    if let Some((prefix, local)) = field.name.split_once(':') {
        let uri = scope.resolve(prefix).ok_or_else(|| {
            error::invalid_value(&field.name, format!("a bound namespace prefix '{prefix}'"))
        })?;
        return Ok(QName::prefixed(uri, local, prefix));
    }
    Ok(QName::prefixed(
        parent.namespace_uri(),
        &field.name,
        parent.prefix(),
    ))
}

/// A resolved polymorphic child binding.
#[derive(Debug, Clone)]
pub struct PolyInfo {
    /// The tag this variant is written as.
    pub tag_name: QName,
    /// The concrete type's logical name.
    pub type_name: String,
    /// The declaring field's index.
    pub index: usize,
}

/// Expand one polymorphic child declaration against the parent tag.
///
/// A declaration is `"full.TypeName"` or `"full.TypeName=tag"`. A type
/// name starting with `.` is relative to the base type's package. The tag
/// defaults to the type name's last segment and lives in the parent's
/// namespace.
pub fn poly_tag_name(parent: &QName, declared: &str, index: usize, base_type: &str) -> PolyInfo {
    let (type_part, tag_part) = match declared.split_once('=') {
        Some((t, tag)) => (t.trim(), Some(tag.trim())),
        None => (declared.trim(), None),
    };
    let type_name = expand_type_name(type_part, base_type);
    let tag = tag_part
        .map(str::to_owned)
        .unwrap_or_else(|| last_segment(&type_name).to_owned());
    PolyInfo {
        tag_name: QName::prefixed(parent.namespace_uri(), tag, parent.prefix()),
        type_name,
        index,
    }
}

/// Expand a `.`-relative type name against the base type's package.
pub fn expand_type_name(name: &str, base_type: &str) -> String {
    if let Some(rest) = name.strip_prefix('.') {
        match base_type.rsplit_once('.') {
            Some((package, _)) => format!("{package}.{rest}"),
            None => rest.to_owned(),
        }
    } else {
        name.to_owned()
    }
}

/// Abbreviate a type name back to `.`-relative form when it shares the
/// base type's package.
pub fn abbreviate_type_name(name: &str, base_type: &str) -> String {
    if let (Some((package, local)), Some((base_package, _))) =
        (name.rsplit_once('.'), base_type.rsplit_once('.'))
    {
        if package == base_package {
            return format!(".{local}");
        }
    }
    name.to_owned()
}

fn last_segment(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

/// A successful name resolution: the field index and, when the hit came
/// through the polymorphic table, the matched binding.
#[derive(Debug, Clone)]
pub(crate) struct NameHit {
    pub index: usize,
    pub poly: Option<PolyInfo>,
}

/// Per-frame lookup tables from normalized names to field indices.
///
/// Built once when a tag frame opens and queried for every attribute and
/// child element. The fallback order on a miss is part of the observable
/// contract: normalized hit, polymorphic hit, then (attributes only) the
/// unprefixed name retried in the parent's namespace, then names in the
/// parent's own namespace retried with no namespace.
#[derive(Debug)]
pub(crate) struct NameIndex {
    names: HashMap<QName, usize>,
    poly: HashMap<QName, PolyInfo>,
    parent: QName,
}

impl NameIndex {
    pub(crate) fn build(
        desc: &TypeDescriptor,
        parent: &QName,
        registry: &Registry,
        scope: &NamespaceScope,
    ) -> Result<Self, XmlError> {
        let mut names = HashMap::new();
        let mut poly = HashMap::new();
        for (i, field) in desc.fields.iter().enumerate() {
            if field.config.poly_children.is_empty() {
                let child = field.resolve_child(registry);
                let name = requested_name(parent, field, child.as_deref(), scope)?;
                names.insert(name.normalize(), i);
            } else {
                // For a repeated field the declarations are relative to the
                // item type, not the list type.
                let base = field
                    .resolve_child(registry)
                    .and_then(|d| match d.kind {
                        crate::descriptor::Kind::List => d
                            .fields
                            .first()
                            .and_then(|f| f.resolve_child(registry)),
                        _ => Some(d),
                    })
                    .map(|d| d.type_name.clone())
                    .unwrap_or_else(|| desc.type_name.clone());
                for declared in &field.config.poly_children {
                    let info = poly_tag_name(parent, declared, i, &base);
                    poly.insert(info.tag_name.normalize(), info);
                }
            }
        }
        Ok(NameIndex {
            names,
            poly,
            parent: parent.clone(),
        })
    }

    pub(crate) fn resolve(
        &self,
        name: &QName,
        is_attribute: bool,
        location: Location,
    ) -> Result<NameHit, XmlError> {
        let normal = name.normalize();
        if let Some(&index) = self.names.get(&normal) {
            return Ok(NameHit { index, poly: None });
        }
        if let Some(info) = self.poly.get(&normal) {
            return Ok(NameHit {
                index: info.index,
                poly: Some(info.clone()),
            });
        }

        let parent_ns = self.parent.namespace_uri();
        // Attributes in the null namespace may match fields declared in the
        // parent tag's namespace.
        if is_attribute && name.namespace_uri().is_empty() {
            let retry = normal.in_namespace(parent_ns);
            if let Some(&index) = self.names.get(&retry) {
                return Ok(NameHit { index, poly: None });
            }
            if let Some(info) = self.poly.get(&retry) {
                return Ok(NameHit {
                    index: info.index,
                    poly: Some(info.clone()),
                });
            }
        }
        // When the name sits in the parent's own namespace, retry it with
        // no namespace at all.
        if !parent_ns.is_empty() && parent_ns == name.namespace_uri() {
            if let Some(&index) = self.names.get(&QName::local(name.local_name())) {
                return Ok(NameHit { index, poly: None });
            }
        }

        Err(error::unknown_field(name.to_string(), self.candidates()).at(location))
    }

    pub(crate) fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .names
            .keys()
            .chain(self.poly.keys())
            .map(QName::to_string)
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Field, TypeDescriptor};

    fn scope() -> std::rc::Rc<NamespaceScope> {
        NamespaceScope::root()
    }

    #[test]
    fn scalar_defaults_to_attribute() {
        let f = Field::new("age", TypeDescriptor::int());
        let child = TypeDescriptor::int();
        assert_eq!(output_kind(&f, Some(&child)), OutputKind::Attribute);
    }

    #[test]
    fn struct_defaults_to_element() {
        let f = Field::new("address", TypeDescriptor::class("Address"));
        let child = TypeDescriptor::class("Address");
        assert_eq!(output_kind(&f, Some(&child)), OutputKind::Element);
    }

    #[test]
    fn children_name_forces_element() {
        let f = Field::new("tags", TypeDescriptor::int())
            .with_children_name(NameTemplate::local("tag"));
        let child = TypeDescriptor::int();
        assert_eq!(output_kind(&f, Some(&child)), OutputKind::Element);
    }

    #[test]
    fn force_flags_override_defaults() {
        let child = TypeDescriptor::int();
        let forced_el = Field::new("n", TypeDescriptor::int()).element();
        assert_eq!(output_kind(&forced_el, Some(&child)), OutputKind::Element);
        let forced_text = Field::new("n", TypeDescriptor::int()).text();
        assert_eq!(output_kind(&forced_text, Some(&child)), OutputKind::Text);
    }

    #[test]
    fn template_inherits_parent_namespace() {
        let parent = QName::prefixed("urn:x", "root", "x");
        let expanded = expand_template(&NameTemplate::local("item"), &parent);
        assert_eq!(expanded, QName::prefixed("urn:x", "item", "x"));

        let pinned = expand_template(
            &NameTemplate::local("item").in_namespace("urn:y"),
            &parent,
        );
        assert_eq!(pinned, QName::new("urn:y", "item"));
    }

    #[test]
    fn root_name_falls_back_to_type_name_segment() {
        let d = TypeDescriptor::class("com.example.Person");
        assert_eq!(root_name(&d), QName::local("Person"));
    }

    #[test]
    fn class_child_is_named_by_its_type() {
        let parent = QName::local("root");
        let child = TypeDescriptor::class("com.example.Address");
        let f = Field::new("home", child.clone());
        let name = requested_name(&parent, &f, Some(&child), &scope()).unwrap();
        assert_eq!(name, QName::local("Address"));

        // An explicit field name still wins over the type's name.
        let renamed = f.with_name(NameTemplate::local("home"));
        let name = requested_name(&parent, &renamed, Some(&child), &scope()).unwrap();
        assert_eq!(name, QName::local("home"));
    }

    #[test]
    fn field_name_inherits_parent_namespace() {
        let parent = QName::new("urn:x", "root");
        let f = Field::new("child", TypeDescriptor::string());
        let child = TypeDescriptor::string();
        let name = requested_name(&parent, &f, Some(&child), &scope()).unwrap();
        assert_eq!(name.normalize(), QName::new("urn:x", "child"));
    }

    #[test]
    fn poly_declaration_parses_tag_override() {
        let parent = QName::local("zoo");
        let info = poly_tag_name(&parent, "com.example.Dog=dog", 2, "com.example.Animal");
        assert_eq!(info.tag_name, QName::local("dog"));
        assert_eq!(info.type_name, "com.example.Dog");
        assert_eq!(info.index, 2);
    }

    #[test]
    fn poly_declaration_defaults_tag_to_last_segment() {
        let parent = QName::local("zoo");
        let info = poly_tag_name(&parent, ".Cat", 0, "com.example.Animal");
        assert_eq!(info.tag_name, QName::local("Cat"));
        assert_eq!(info.type_name, "com.example.Cat");
    }

    #[test]
    fn type_name_expansion_and_abbreviation() {
        assert_eq!(expand_type_name(".Dog", "com.example.Animal"), "com.example.Dog");
        assert_eq!(expand_type_name("other.Dog", "com.example.Animal"), "other.Dog");
        assert_eq!(
            abbreviate_type_name("com.example.Dog", "com.example.Animal"),
            ".Dog"
        );
        assert_eq!(abbreviate_type_name("other.Dog", "com.example.Animal"), "other.Dog");
    }

    #[test]
    fn attribute_empty_namespace_falls_back_to_parent() {
        let parent = QName::new("urn:x", "root");
        let desc = TypeDescriptor::class("T").field(Field::new("id", TypeDescriptor::int()));
        let reg = Registry::new();
        let idx = NameIndex::build(&desc, &parent, &reg, &scope()).unwrap();
        // Unprefixed attributes live in no namespace but still match.
        let hit = idx
            .resolve(&QName::local("id"), true, Location::default())
            .unwrap();
        assert_eq!(hit.index, 0);
        // The same name as an element does not get the attribute fallback.
        assert!(idx.resolve(&QName::local("id"), false, Location::default()).is_err());
    }

    #[test]
    fn unknown_name_reports_candidates() {
        let parent = QName::local("root");
        let desc = TypeDescriptor::class("T")
            .field(Field::new("a", TypeDescriptor::int()))
            .field(Field::new("b", TypeDescriptor::int()));
        let reg = Registry::new();
        let idx = NameIndex::build(&desc, &parent, &reg, &scope()).unwrap();
        let err = idx
            .resolve(&QName::local("c"), false, Location::default())
            .unwrap_err();
        match err.kind() {
            crate::error::XmlErrorKind::UnknownField { name, candidates } => {
                assert_eq!(name, "c");
                assert_eq!(candidates, &["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
