//! Qualified names and namespace scopes.

use std::fmt;
use std::rc::Rc;

/// Namespace URI reserved for `xmlns` declarations themselves.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// A qualified XML name: namespace URI, local name and a cosmetic prefix.
///
/// Two names route to the same field when their namespace URI and local name
/// agree; the prefix is presentation only. Use [`QName::normalize`] before
/// comparing names for routing purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    namespace_uri: String,
    local_name: String,
    prefix: String,
}

impl QName {
    /// Create a name with no namespace and no prefix.
    pub fn local(local_name: impl Into<String>) -> Self {
        Self::prefixed("", local_name, "")
    }

    /// Create a name in a namespace, with no prefix.
    pub fn new(namespace_uri: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::prefixed(namespace_uri, local_name, "")
    }

    /// Create a fully specified name.
    pub fn prefixed(
        namespace_uri: impl Into<String>,
        local_name: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        let local_name = local_name.into();
        debug_assert!(!local_name.is_empty(), "local name must not be empty");
        QName {
            namespace_uri: namespace_uri.into(),
            local_name,
            prefix: prefix.into(),
        }
    }

    /// The namespace URI; empty for "no namespace".
    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    /// The local part of the name.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The prefix the name was written with; empty for unprefixed names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Strip the cosmetic prefix, leaving only the routing identity.
    pub fn normalize(&self) -> QName {
        QName {
            namespace_uri: self.namespace_uri.clone(),
            local_name: self.local_name.clone(),
            prefix: String::new(),
        }
    }

    /// The same local name placed in a different namespace.
    pub(crate) fn in_namespace(&self, namespace_uri: impl Into<String>) -> QName {
        QName {
            namespace_uri: namespace_uri.into(),
            local_name: self.local_name.clone(),
            prefix: String::new(),
        }
    }

    /// True for `xmlns` and `xmlns:*` attribute names.
    pub(crate) fn is_namespace_declaration(&self) -> bool {
        self.namespace_uri == XMLNS_NAMESPACE
            || self.prefix == "xmlns"
            || (self.prefix.is_empty() && self.local_name == "xmlns")
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace_uri, self.local_name)
        }
    }
}

/// A chain of prefix-to-URI bindings with lexical inheritance.
///
/// Each structural level of a document owns its own scope and shares the
/// enclosing bindings through the parent link; nothing is copied. The root
/// scope binds the empty prefix to the empty URI, so an unprefixed name in
/// an undeclared document resolves to "no namespace".
#[derive(Debug)]
pub struct NamespaceScope {
    parent: Option<Rc<NamespaceScope>>,
    bindings: Vec<(String, String)>,
}

impl NamespaceScope {
    /// The document root scope.
    pub fn root() -> Rc<Self> {
        Rc::new(NamespaceScope {
            parent: None,
            bindings: vec![(String::new(), String::new())],
        })
    }

    /// Open a nested scope carrying the given fresh bindings.
    pub fn child(parent: &Rc<Self>, bindings: Vec<(String, String)>) -> Rc<Self> {
        Rc::new(NamespaceScope {
            parent: Some(Rc::clone(parent)),
            bindings,
        })
    }

    /// Resolve a prefix to the nearest enclosing binding.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        for (p, uri) in self.bindings.iter().rev() {
            if p == prefix {
                return Some(uri);
            }
        }
        self.parent.as_ref().and_then(|p| p.resolve(prefix))
    }

    /// Whether writing `name` at this scope requires a fresh `xmlns`
    /// declaration: the nearest binding for its prefix is absent or bound
    /// to a different URI.
    pub fn needs_declaration(&self, name: &QName) -> bool {
        self.resolve(name.prefix()) != Some(name.namespace_uri())
    }

    /// Find an in-scope prefix already bound to the given URI.
    pub fn prefix_for(&self, namespace_uri: &str) -> Option<&str> {
        for (p, uri) in self.bindings.iter().rev() {
            if uri == namespace_uri {
                return Some(p);
            }
        }
        self.parent
            .as_ref()
            .and_then(|p| p.prefix_for(namespace_uri))
    }
}
