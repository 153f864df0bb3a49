//! Push-style XML writing.
//!
//! [`TextWriter`] emits markup directly into a string, deferring the `>` of
//! each start tag so attributes and namespace declarations can still be
//! added. [`BufferedWriter`] records write calls for later replay, which is
//! how the encoder reorders attribute writes in front of child content.

use std::rc::Rc;

use crate::error::{self, XmlError};
use crate::qname::{NamespaceScope, QName};

/// A sink for XML markup.
///
/// The encoder drives this trait; structural misuse (an attribute after the
/// start tag has been closed, an end tag with nothing open) is reported as
/// a write error rather than silently producing malformed markup.
pub trait XmlWrite {
    /// Called once before the root element.
    fn start_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    /// Open an element.
    fn start_tag(&mut self, name: &QName) -> Result<(), XmlError>;

    /// Close the innermost open element.
    fn end_tag(&mut self, name: &QName) -> Result<(), XmlError>;

    /// Add an attribute to the element whose start tag is still open.
    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), XmlError>;

    /// Add an explicit namespace declaration to the open start tag. An
    /// empty prefix declares the default namespace.
    fn namespace_attr(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError>;

    /// Write character content.
    fn text(&mut self, text: &str) -> Result<(), XmlError>;

    /// Write a comment.
    fn comment(&mut self, text: &str) -> Result<(), XmlError>;

    /// The namespace scope in force at the current write position.
    fn namespace_scope(&self) -> Rc<NamespaceScope>;

    /// Resolve a prefix against the current scope.
    fn namespace_uri(&self, prefix: &str) -> Option<String> {
        self.namespace_scope().resolve(prefix).map(str::to_owned)
    }
}

/// Conventional prefixes for namespaces that show up constantly in the
/// wild; preferred over synthesized `ns{n}` prefixes when free.
const WELL_KNOWN_NAMESPACES: &[(&str, &str)] = &[
    ("http://www.w3.org/2001/XMLSchema-instance", "xsi"),
    ("http://www.w3.org/2001/XMLSchema", "xs"),
    ("http://www.w3.org/XML/1998/namespace", "xml"),
    ("http://www.w3.org/1999/xlink", "xlink"),
    ("http://www.w3.org/2000/svg", "svg"),
    ("http://www.w3.org/1999/xhtml", "xhtml"),
    ("http://schemas.xmlsoap.org/soap/envelope/", "soap"),
    ("http://www.w3.org/2003/05/soap-envelope", "soap12"),
];

/// An [`XmlWrite`] that renders markup into an in-memory string.
pub struct TextWriter {
    out: String,
    /// Open elements: rendered tag name and the scope to restore on close.
    stack: Vec<(String, Rc<NamespaceScope>)>,
    scope: Rc<NamespaceScope>,
    tag_open: bool,
    next_ns_index: usize,
}

impl Default for TextWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextWriter {
    pub fn new() -> Self {
        TextWriter {
            out: String::new(),
            stack: Vec::new(),
            scope: NamespaceScope::root(),
            tag_open: false,
            next_ns_index: 0,
        }
    }

    /// Consume the writer and return the rendered document.
    pub fn finish(self) -> String {
        self.out
    }

    fn close_open_tag(&mut self) {
        if self.tag_open {
            self.out.push('>');
            self.tag_open = false;
        }
    }

    fn bind(&mut self, prefix: &str, uri: &str) {
        self.scope = NamespaceScope::child(
            &self.scope,
            vec![(prefix.to_owned(), uri.to_owned())],
        );
    }

    fn write_ns_decl(&mut self, prefix: &str, uri: &str) {
        if prefix.is_empty() {
            self.out.push_str(" xmlns=\"");
        } else {
            self.out.push_str(" xmlns:");
            self.out.push_str(prefix);
            self.out.push_str("=\"");
        }
        escape_attr(&mut self.out, uri);
        self.out.push('"');
    }

    /// Pick a prefix for a namespace that has no usable in-scope binding:
    /// the conventional prefix when free, a counted `ns{n}` otherwise.
    fn get_or_create_prefix(&mut self, uri: &str) -> String {
        if let Some((_, p)) = WELL_KNOWN_NAMESPACES.iter().find(|(u, _)| *u == uri)
            && self.scope.resolve(p).is_none()
        {
            return (*p).to_owned();
        }
        loop {
            let p = format!("ns{}", self.next_ns_index);
            self.next_ns_index += 1;
            if self.scope.resolve(&p).is_none() {
                return p;
            }
        }
    }
}

impl XmlWrite for TextWriter {
    fn start_tag(&mut self, name: &QName) -> Result<(), XmlError> {
        self.close_open_tag();
        let saved = Rc::clone(&self.scope);

        let uri = name.namespace_uri();
        let prefix = name.prefix();
        let (rendered, decl) = if uri.is_empty() {
            (name.local_name().to_owned(), None)
        } else if !prefix.is_empty() {
            let rendered = format!("{prefix}:{}", name.local_name());
            if self.scope.resolve(prefix) == Some(uri) {
                (rendered, None)
            } else {
                (rendered, Some((prefix.to_owned(), uri.to_owned())))
            }
        } else if self.scope.resolve("") == Some(uri) {
            (name.local_name().to_owned(), None)
        } else if let Some(p) = self
            .scope
            .prefix_for(uri)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
        {
            (format!("{p}:{}", name.local_name()), None)
        } else {
            // Claim the default namespace for the subtree.
            (
                name.local_name().to_owned(),
                Some((String::new(), uri.to_owned())),
            )
        };

        self.out.push('<');
        self.out.push_str(&rendered);
        if let Some((p, u)) = decl {
            self.write_ns_decl(&p, &u);
            self.bind(&p, &u);
        }
        self.stack.push((rendered, saved));
        self.tag_open = true;
        Ok(())
    }

    fn end_tag(&mut self, name: &QName) -> Result<(), XmlError> {
        let (rendered, saved) = self
            .stack
            .pop()
            .ok_or_else(|| error::write_error("end tag with no open element"))?;
        let rendered_local = rendered.rsplit(':').next().unwrap_or(rendered.as_str());
        if rendered_local != name.local_name() {
            return Err(error::write_error(format!(
                "mismatched end tag: open element is '{rendered}', got '{}'",
                name.local_name()
            )));
        }
        self.close_open_tag();
        self.out.push_str("</");
        self.out.push_str(&rendered);
        self.out.push('>');
        self.scope = saved;
        Ok(())
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), XmlError> {
        if !self.tag_open {
            return Err(error::write_error(format!(
                "attribute '{}' outside of a start tag",
                name.local_name()
            )));
        }

        let uri = name.namespace_uri();
        let prefix = name.prefix();
        let rendered = if uri.is_empty() {
            name.local_name().to_owned()
        } else if !prefix.is_empty() {
            if self.scope.resolve(prefix) != Some(uri) {
                self.write_ns_decl(prefix, uri);
                self.bind(prefix, uri);
            }
            format!("{prefix}:{}", name.local_name())
        } else {
            // Attributes never ride the default namespace; find or invent
            // a real prefix.
            match self
                .scope
                .prefix_for(uri)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
            {
                Some(p) => format!("{p}:{}", name.local_name()),
                None => {
                    let p = self.get_or_create_prefix(uri);
                    self.write_ns_decl(&p, uri);
                    self.bind(&p, uri);
                    format!("{p}:{}", name.local_name())
                }
            }
        };

        self.out.push(' ');
        self.out.push_str(&rendered);
        self.out.push_str("=\"");
        escape_attr(&mut self.out, value);
        self.out.push('"');
        Ok(())
    }

    fn namespace_attr(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        if !self.tag_open {
            return Err(error::write_error(
                "namespace declaration outside of a start tag",
            ));
        }
        if self.scope.resolve(prefix) == Some(uri) {
            return Ok(());
        }
        self.write_ns_decl(prefix, uri);
        self.bind(prefix, uri);
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), XmlError> {
        self.close_open_tag();
        escape_text(&mut self.out, text);
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        if text.contains("--") {
            return Err(error::write_error("'--' is not allowed inside a comment"));
        }
        self.close_open_tag();
        self.out.push_str("<!--");
        self.out.push_str(text);
        self.out.push_str("-->");
        Ok(())
    }

    fn namespace_scope(&self) -> Rc<NamespaceScope> {
        Rc::clone(&self.scope)
    }
}

fn escape_text(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[derive(Debug, Clone)]
enum WriteOp {
    StartTag(QName),
    EndTag(QName),
    Attribute(QName, String),
    NamespaceAttr(String, String),
    Text(String),
    Comment(String),
}

/// An [`XmlWrite`] that records operations for replay into another writer.
///
/// The encoder opens one of these per tag frame whose attributes are
/// declared after element content: element writes land in the buffer while
/// attribute writes go straight to the real start tag, and the buffer is
/// replayed once the last attribute is out.
pub(crate) struct BufferedWriter {
    ops: Vec<WriteOp>,
    scope: Rc<NamespaceScope>,
}

impl BufferedWriter {
    pub(crate) fn new(scope: Rc<NamespaceScope>) -> Self {
        BufferedWriter {
            ops: Vec::new(),
            scope,
        }
    }

    /// Replay everything recorded so far into `target`, in order.
    pub(crate) fn flush_to(self, target: &mut dyn XmlWrite) -> Result<(), XmlError> {
        for op in self.ops {
            match op {
                WriteOp::StartTag(name) => target.start_tag(&name)?,
                WriteOp::EndTag(name) => target.end_tag(&name)?,
                WriteOp::Attribute(name, value) => target.attribute(&name, &value)?,
                WriteOp::NamespaceAttr(prefix, uri) => {
                    target.namespace_attr(&prefix, &uri)?
                }
                WriteOp::Text(text) => target.text(&text)?,
                WriteOp::Comment(text) => target.comment(&text)?,
            }
        }
        Ok(())
    }
}

impl XmlWrite for BufferedWriter {
    fn start_tag(&mut self, name: &QName) -> Result<(), XmlError> {
        self.ops.push(WriteOp::StartTag(name.clone()));
        Ok(())
    }

    fn end_tag(&mut self, name: &QName) -> Result<(), XmlError> {
        self.ops.push(WriteOp::EndTag(name.clone()));
        Ok(())
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<(), XmlError> {
        self.ops.push(WriteOp::Attribute(name.clone(), value.to_owned()));
        Ok(())
    }

    fn namespace_attr(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        self.ops
            .push(WriteOp::NamespaceAttr(prefix.to_owned(), uri.to_owned()));
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), XmlError> {
        self.ops.push(WriteOp::Text(text.to_owned()));
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), XmlError> {
        self.ops.push(WriteOp::Comment(text.to_owned()));
        Ok(())
    }

    fn namespace_scope(&self) -> Rc<NamespaceScope> {
        Rc::clone(&self.scope)
    }
}
