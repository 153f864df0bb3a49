//! Pull-style XML reading.
//!
//! [`DocumentReader`] tokenizes the whole input up front with quick-xml and
//! then serves events through the [`XmlRead`] cursor interface the decoder
//! drives. Tokenizing eagerly keeps namespace resolution in one place: every
//! event carries its resolved names and the namespace scope that was in
//! force where it appeared.

use std::rc::Rc;

use quick_xml::NsReader;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;

use crate::error::{self, Location, XmlError};
use crate::qname::{NamespaceScope, QName, XMLNS_NAMESPACE};

/// The kind of event a reader cursor can rest on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    StartDocument,
    EndDocument,
    StartElement,
    EndElement,
    Text,
    Comment,
    ProcessingInstruction,
    DocDecl,
}

impl EventType {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            EventType::StartDocument => "start of document",
            EventType::EndDocument => "end of document",
            EventType::StartElement => "a start tag",
            EventType::EndElement => "an end tag",
            EventType::Text => "text",
            EventType::Comment => "a comment",
            EventType::ProcessingInstruction => "a processing instruction",
            EventType::DocDecl => "a document type declaration",
        }
    }
}

/// A cursor over an XML event stream.
///
/// The decoder is written against this trait so tests and embedders can
/// substitute their own event sources. The cursor starts on
/// [`EventType::StartDocument`] and never advances past
/// [`EventType::EndDocument`].
pub trait XmlRead {
    /// The kind of the current event.
    fn event_type(&self) -> EventType;

    /// Advance to the next event and return its kind.
    fn next(&mut self) -> Result<EventType, XmlError>;

    /// The resolved name of the current start or end tag.
    fn name(&self) -> QName;

    /// Character data of the current text event.
    fn text(&self) -> &str;

    /// Whether the current text event is ignorable whitespace.
    fn is_whitespace(&self) -> bool;

    /// Number of attributes on the current start tag, namespace
    /// declarations included.
    fn attribute_count(&self) -> usize;

    /// Resolved name of attribute `i`.
    fn attribute_name(&self, i: usize) -> QName;

    /// Unescaped value of attribute `i`.
    fn attribute_value(&self, i: usize) -> &str;

    /// Look up an attribute on the current start tag by namespace URI and
    /// local name; the prefix it was written with does not matter.
    fn attribute_value_by_name(&self, namespace_uri: &str, local_name: &str) -> Option<&str>;

    /// The namespace scope in force at the current event.
    fn namespace_scope(&self) -> Rc<NamespaceScope>;

    /// Input position of the current event.
    fn location(&self) -> Location;

    /// Advance to the next start or end tag, skipping whitespace, comments
    /// and processing instructions. Non-whitespace text is a structure
    /// error.
    fn next_tag(&mut self) -> Result<EventType, XmlError> {
        loop {
            match self.next()? {
                EventType::Comment
                | EventType::ProcessingInstruction
                | EventType::DocDecl
                | EventType::StartDocument => continue,
                EventType::Text => {
                    if self.is_whitespace() {
                        continue;
                    }
                    return Err(error::structure_mismatch(
                        "a start or end tag",
                        format!("text '{}'", self.text().trim()),
                    )
                    .at(self.location()));
                }
                other => return Ok(other),
            }
        }
    }

    /// Check the current event against an expected shape.
    fn require(
        &self,
        kind: EventType,
        namespace_uri: Option<&str>,
        local_name: Option<&str>,
    ) -> Result<(), XmlError> {
        if self.event_type() != kind {
            return Err(error::structure_mismatch(
                kind.describe(),
                self.event_type().describe(),
            )
            .at(self.location()));
        }
        if matches!(kind, EventType::StartElement | EventType::EndElement) {
            let name = self.name();
            if let Some(ns) = namespace_uri
                && name.namespace_uri() != ns
            {
                return Err(error::structure_mismatch(
                    format!("a tag in namespace '{ns}'"),
                    name.to_string(),
                )
                .at(self.location()));
            }
            if let Some(local) = local_name
                && name.local_name() != local
            {
                return Err(error::structure_mismatch(
                    format!("tag '{local}'"),
                    name.to_string(),
                )
                .at(self.location()));
            }
        }
        Ok(())
    }

    /// Read the character content of the element whose start tag the
    /// cursor rests on. Ends on the matching end tag. Child elements are a
    /// structure error.
    fn read_simple_element(&mut self) -> Result<String, XmlError> {
        self.require(EventType::StartElement, None, None)?;
        let mut out = String::new();
        loop {
            match self.next()? {
                EventType::Text => out.push_str(self.text()),
                EventType::Comment
                | EventType::ProcessingInstruction
                | EventType::DocDecl => continue,
                EventType::EndElement => return Ok(out),
                other => {
                    return Err(error::structure_mismatch(
                        "character content",
                        other.describe(),
                    )
                    .at(self.location()));
                }
            }
        }
    }

    /// Collect consecutive text events at the cursor, skipping comments
    /// and processing instructions, stopping before the next structural
    /// event.
    fn all_text(&mut self) -> Result<String, XmlError> {
        let mut out = String::new();
        loop {
            match self.event_type() {
                EventType::Text => {
                    out.push_str(self.text());
                    self.next()?;
                }
                EventType::Comment
                | EventType::ProcessingInstruction
                | EventType::DocDecl => {
                    self.next()?;
                }
                _ => return Ok(out),
            }
        }
    }
}

#[derive(Debug)]
struct RawEvent {
    kind: EventType,
    name: Option<QName>,
    attrs: Vec<(QName, String)>,
    text: String,
    whitespace: bool,
    offset: u64,
    scope: Rc<NamespaceScope>,
}

impl RawEvent {
    fn plain(kind: EventType, offset: u64, scope: Rc<NamespaceScope>) -> Self {
        RawEvent {
            kind,
            name: None,
            attrs: Vec::new(),
            text: String::new(),
            whitespace: false,
            offset,
            scope,
        }
    }
}

/// An [`XmlRead`] over an in-memory document, tokenized eagerly.
pub struct DocumentReader {
    events: Vec<RawEvent>,
    pos: usize,
}

impl DocumentReader {
    /// Tokenize a complete document.
    pub fn new(input: &str) -> Result<Self, XmlError> {
        Self::tokenize(input)
    }

    /// Tokenize an XML fragment: bare text and multiple top level elements
    /// are permitted. Used for default value strings.
    pub fn fragment(input: &str) -> Result<Self, XmlError> {
        Self::tokenize(input)
    }

    fn tokenize(input: &str) -> Result<Self, XmlError> {
        let mut reader = NsReader::from_reader(input.as_bytes());
        let mut buf = Vec::new();

        let root_scope = NamespaceScope::root();
        let mut scope_stack: Vec<Rc<NamespaceScope>> = vec![Rc::clone(&root_scope)];
        let mut events = vec![RawEvent::plain(
            EventType::StartDocument,
            0,
            Rc::clone(&root_scope),
        )];

        loop {
            buf.clear();
            // The event's resolve result borrows the reader, so take the
            // position first and resolve the namespace before touching the
            // reader again.
            let offset = reader.buffer_position();
            let (resolve, event) = reader
                .read_resolved_event_into(&mut buf)
                .map_err(|e| error::parse_error(e.to_string()).at(Location { offset }))?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let uri = resolved_namespace(resolve, offset)?;
                    let parent = scope_stack
                        .last()
                        .map(Rc::clone)
                        .ok_or_else(|| error::parse_error("unbalanced tags"))?;
                    let (name, attrs, bindings) = read_start_tag(&reader, uri, e, offset)?;
                    let scope = if bindings.is_empty() {
                        parent
                    } else {
                        NamespaceScope::child(&parent, bindings)
                    };
                    let empty = matches!(event, Event::Empty(_));
                    events.push(RawEvent {
                        kind: EventType::StartElement,
                        name: Some(name.clone()),
                        attrs,
                        text: String::new(),
                        whitespace: false,
                        offset,
                        scope: Rc::clone(&scope),
                    });
                    if empty {
                        let mut end =
                            RawEvent::plain(EventType::EndElement, offset, scope);
                        end.name = Some(name);
                        events.push(end);
                    } else {
                        scope_stack.push(scope);
                    }
                }
                Event::End(ref e) => {
                    if scope_stack.len() <= 1 {
                        return Err(error::parse_error("unbalanced tags")
                            .at(Location { offset }));
                    }
                    let scope = scope_stack
                        .pop()
                        .unwrap_or_else(|| Rc::clone(&root_scope));
                    let prefix = e
                        .name()
                        .prefix()
                        .map(|p| decode_utf8(p.as_ref(), offset))
                        .transpose()?
                        .unwrap_or_default();
                    let local = decode_utf8(e.local_name().as_ref(), offset)?;
                    let uri = scope.resolve(&prefix).unwrap_or_default().to_owned();
                    let mut end = RawEvent::plain(EventType::EndElement, offset, scope);
                    end.name = Some(QName::prefixed(uri, local, prefix));
                    events.push(end);
                }
                Event::Text(e) => {
                    let text = e
                        .decode()
                        .map_err(|err| {
                            error::parse_error(err.to_string()).at(Location { offset })
                        })?
                        .into_owned();
                    let whitespace = text.chars().all(char::is_whitespace);
                    let mut ev = RawEvent::plain(
                        EventType::Text,
                        offset,
                        current_scope(&scope_stack),
                    );
                    ev.text = text;
                    ev.whitespace = whitespace;
                    events.push(ev);
                }
                Event::CData(e) => {
                    let text = decode_utf8(e.as_ref(), offset)?;
                    let mut ev = RawEvent::plain(
                        EventType::Text,
                        offset,
                        current_scope(&scope_stack),
                    );
                    ev.text = text;
                    events.push(ev);
                }
                Event::GeneralRef(e) => {
                    let raw = e.decode().map_err(|err| {
                        error::parse_error(err.to_string()).at(Location { offset })
                    })?;
                    let mut ev = RawEvent::plain(
                        EventType::Text,
                        offset,
                        current_scope(&scope_stack),
                    );
                    // Entity-written whitespace is intentional, never ignorable.
                    ev.text = resolve_entity(&raw, offset)?;
                    events.push(ev);
                }
                Event::Comment(e) => {
                    let mut ev = RawEvent::plain(
                        EventType::Comment,
                        offset,
                        current_scope(&scope_stack),
                    );
                    ev.text = e
                        .decode()
                        .map_err(|err| {
                            error::parse_error(err.to_string()).at(Location { offset })
                        })?
                        .into_owned();
                    events.push(ev);
                }
                Event::PI(_) => {
                    events.push(RawEvent::plain(
                        EventType::ProcessingInstruction,
                        offset,
                        current_scope(&scope_stack),
                    ));
                }
                Event::DocType(_) => {
                    events.push(RawEvent::plain(
                        EventType::DocDecl,
                        offset,
                        current_scope(&scope_stack),
                    ));
                }
                Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        if scope_stack.len() > 1 {
            return Err(error::parse_error("unexpected end of document"));
        }
        let offset = reader.buffer_position();
        events.push(RawEvent::plain(EventType::EndDocument, offset, root_scope));
        Ok(DocumentReader { events, pos: 0 })
    }

    fn current(&self) -> &RawEvent {
        &self.events[self.pos]
    }
}

impl XmlRead for DocumentReader {
    fn event_type(&self) -> EventType {
        self.current().kind
    }

    fn next(&mut self) -> Result<EventType, XmlError> {
        if self.pos + 1 >= self.events.len() {
            return Err(error::parse_error("unexpected end of document")
                .at(self.location()));
        }
        self.pos += 1;
        Ok(self.current().kind)
    }

    fn name(&self) -> QName {
        self.current()
            .name
            .clone()
            .unwrap_or_else(|| QName::local("#document"))
    }

    fn text(&self) -> &str {
        &self.current().text
    }

    fn is_whitespace(&self) -> bool {
        self.current().whitespace
    }

    fn attribute_count(&self) -> usize {
        self.current().attrs.len()
    }

    fn attribute_name(&self, i: usize) -> QName {
        self.current().attrs[i].0.clone()
    }

    fn attribute_value(&self, i: usize) -> &str {
        &self.current().attrs[i].1
    }

    fn attribute_value_by_name(&self, namespace_uri: &str, local_name: &str) -> Option<&str> {
        self.current()
            .attrs
            .iter()
            .find(|(name, _)| {
                name.namespace_uri() == namespace_uri && name.local_name() == local_name
            })
            .map(|(_, value)| value.as_str())
    }

    fn namespace_scope(&self) -> Rc<NamespaceScope> {
        Rc::clone(&self.current().scope)
    }

    fn location(&self) -> Location {
        Location {
            offset: self.current().offset,
        }
    }
}

fn current_scope(stack: &[Rc<NamespaceScope>]) -> Rc<NamespaceScope> {
    stack
        .last()
        .map(Rc::clone)
        .unwrap_or_else(NamespaceScope::root)
}

type StartTagParts = (QName, Vec<(QName, String)>, Vec<(String, String)>);

fn read_start_tag<R>(
    reader: &NsReader<R>,
    uri: String,
    e: &BytesStart<'_>,
    offset: u64,
) -> Result<StartTagParts, XmlError> {
    let prefix = e
        .name()
        .prefix()
        .map(|p| decode_utf8(p.as_ref(), offset))
        .transpose()?
        .unwrap_or_default();
    let local = decode_utf8(e.local_name().as_ref(), offset)?;
    let name = QName::prefixed(uri, local, prefix);

    let mut attrs = Vec::new();
    let mut bindings = Vec::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| error::parse_error(err.to_string()).at(Location { offset }))?;
        let key = attr.key;
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| error::parse_error(err.to_string()).at(Location { offset }))?
            .into_owned();

        // Namespace declarations become scope bindings but stay visible as
        // attributes so callers can skip them by name.
        if key.as_ref() == b"xmlns" {
            bindings.push((String::new(), value.clone()));
            attrs.push((QName::local("xmlns"), value));
            continue;
        }
        if let Some(p) = key.prefix()
            && p.as_ref() == b"xmlns"
        {
            let declared = decode_utf8(key.local_name().as_ref(), offset)?;
            bindings.push((declared.clone(), value.clone()));
            attrs.push((
                QName::prefixed(XMLNS_NAMESPACE, declared, "xmlns"),
                value,
            ));
            continue;
        }

        let (attr_resolve, _) = reader.resolver().resolve_attribute(key);
        let attr_uri = resolved_namespace(attr_resolve, offset)?;
        let attr_prefix = key
            .prefix()
            .map(|p| decode_utf8(p.as_ref(), offset))
            .transpose()?
            .unwrap_or_default();
        let attr_local = decode_utf8(key.local_name().as_ref(), offset)?;
        attrs.push((QName::prefixed(attr_uri, attr_local, attr_prefix), value));
    }
    Ok((name, attrs, bindings))
}

fn resolved_namespace(resolve: ResolveResult<'_>, offset: u64) -> Result<String, XmlError> {
    match resolve {
        ResolveResult::Bound(ns) => decode_utf8(ns.as_ref(), offset),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(error::parse_error(format!(
            "unbound namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))
        .at(Location { offset })),
    }
}

fn decode_utf8(bytes: &[u8], offset: u64) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|err| {
            error::parse_error(format!("invalid UTF-8: {err}")).at(Location { offset })
        })
}

/// Resolve a general entity reference, named or numeric.
fn resolve_entity(raw: &str, offset: u64) -> Result<String, XmlError> {
    if let Some(resolved) = resolve_xml_entity(raw) {
        return Ok(resolved.into());
    }
    if let Some(rest) = raw.strip_prefix('#') {
        let code = if let Some(hex) = rest.strip_prefix('x').or_else(|| rest.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).map_err(|_| {
                error::parse_error(format!("invalid hex character reference: #{rest}"))
                    .at(Location { offset })
            })?
        } else {
            rest.parse::<u32>().map_err(|_| {
                error::parse_error(format!("invalid character reference: #{rest}"))
                    .at(Location { offset })
            })?
        };
        let ch = char::from_u32(code).ok_or_else(|| {
            error::parse_error(format!("invalid Unicode code point: {code}"))
                .at(Location { offset })
        })?;
        return Ok(ch.to_string());
    }
    Err(error::parse_error(format!("unknown entity reference: &{raw};"))
        .at(Location { offset }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_document() {
        let mut r = DocumentReader::new(r#"<root a="1"><child/></root>"#).unwrap();
        assert_eq!(r.event_type(), EventType::StartDocument);
        assert_eq!(r.next_tag().unwrap(), EventType::StartElement);
        assert_eq!(r.name(), QName::local("root"));
        assert_eq!(r.attribute_count(), 1);
        assert_eq!(r.attribute_name(0), QName::local("a"));
        assert_eq!(r.attribute_value(0), "1");
        assert_eq!(r.next_tag().unwrap(), EventType::StartElement);
        assert_eq!(r.name(), QName::local("child"));
        assert_eq!(r.next_tag().unwrap(), EventType::EndElement);
        assert_eq!(r.next_tag().unwrap(), EventType::EndElement);
        assert_eq!(r.name(), QName::local("root"));
        assert_eq!(r.next_tag().unwrap(), EventType::EndDocument);
    }

    #[test]
    fn resolves_element_and_attribute_namespaces() {
        let mut r = DocumentReader::new(
            r#"<x:root xmlns:x="urn:a" x:id="7" plain="y"><x:item/></x:root>"#,
        )
        .unwrap();
        r.next_tag().unwrap();
        let name = r.name();
        assert_eq!(name.namespace_uri(), "urn:a");
        assert_eq!(name.local_name(), "root");
        assert_eq!(name.prefix(), "x");
        assert_eq!(r.attribute_value_by_name("urn:a", "id"), Some("7"));
        // Unprefixed attributes stay in no namespace.
        assert_eq!(r.attribute_value_by_name("", "plain"), Some("y"));
        assert_eq!(r.attribute_value_by_name("urn:a", "plain"), None);
        r.next_tag().unwrap();
        assert_eq!(r.name().namespace_uri(), "urn:a");
    }

    #[test]
    fn namespace_declarations_stay_visible_as_attributes() {
        let mut r =
            DocumentReader::new(r#"<root xmlns="urn:d" xmlns:p="urn:p" p:a="1"/>"#).unwrap();
        r.next_tag().unwrap();
        assert_eq!(r.attribute_count(), 3);
        assert!(r.attribute_name(0).is_namespace_declaration());
        assert!(r.attribute_name(1).is_namespace_declaration());
        assert!(!r.attribute_name(2).is_namespace_declaration());
        let scope = r.namespace_scope();
        assert_eq!(scope.resolve(""), Some("urn:d"));
        assert_eq!(scope.resolve("p"), Some("urn:p"));
    }

    #[test]
    fn simple_element_collects_text_and_entities() {
        let mut r = DocumentReader::new("<v>a &amp; b &#33;</v>").unwrap();
        r.next_tag().unwrap();
        assert_eq!(r.read_simple_element().unwrap(), "a & b !");
        assert_eq!(r.event_type(), EventType::EndElement);
    }

    #[test]
    fn simple_element_rejects_children() {
        let mut r = DocumentReader::new("<v>text<nested/></v>").unwrap();
        r.next_tag().unwrap();
        let err = r.read_simple_element().unwrap_err();
        assert_eq!(err.kind().code(), "xml::structure_mismatch");
    }

    #[test]
    fn next_tag_skips_comments_and_whitespace() {
        let mut r = DocumentReader::new("<root>\n  <!-- note -->\n  <a/>\n</root>").unwrap();
        r.next_tag().unwrap();
        assert_eq!(r.next_tag().unwrap(), EventType::StartElement);
        assert_eq!(r.name(), QName::local("a"));
    }

    #[test]
    fn next_tag_rejects_stray_text() {
        let mut r = DocumentReader::new("<root>stray<a/></root>").unwrap();
        r.next_tag().unwrap();
        assert!(r.next_tag().is_err());
    }

    #[test]
    fn fragment_allows_bare_text() {
        let mut r = DocumentReader::fragment("just text").unwrap();
        r.next().unwrap();
        assert_eq!(r.all_text().unwrap(), "just text");
        assert_eq!(r.event_type(), EventType::EndDocument);
    }

    #[test]
    fn unbalanced_input_is_a_parse_error() {
        assert!(DocumentReader::new("<root><a></root>").is_err());
    }
}
