//! Error types for XML encoding and decoding.

use std::{
    error::Error,
    fmt::{self, Display},
};

/// A position in the input document, for diagnostics.
///
/// The offset is a byte position into the original input. Events produced by
/// the reader carry the position at which they were tokenized, so errors
/// raised mid-decode point at the offending construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Byte offset into the input.
    pub offset: u64,
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "byte {}", self.offset)
    }
}

/// Error type for XML encoding and decoding.
#[derive(Debug)]
pub struct XmlError {
    /// The specific kind of error
    pub(crate) kind: XmlErrorKind,
    /// Position in the input where the error occurred, if known
    pub(crate) location: Option<Location>,
}

impl XmlError {
    /// Returns a reference to the error kind for detailed error inspection.
    pub fn kind(&self) -> &XmlErrorKind {
        &self.kind
    }

    /// Returns the input position associated with this error, if any.
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Create a new error with the given kind.
    pub(crate) fn new(kind: XmlErrorKind) -> Self {
        XmlError {
            kind,
            location: None,
        }
    }

    /// Attach an input position to this error for diagnostics.
    pub(crate) fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} (at {loc})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Error for XmlError {}

impl From<XmlErrorKind> for XmlError {
    fn from(kind: XmlErrorKind) -> Self {
        XmlError::new(kind)
    }
}

/// Detailed classification of XML codec errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum XmlErrorKind {
    /// An element or attribute name matched no field of the descriptor.
    UnknownField {
        /// The unresolvable name, as encountered.
        name: String,
        /// The names the descriptor would have accepted.
        candidates: Vec<String>,
    },
    /// A required field was never seen and has no usable default.
    MissingField {
        /// The field name as declared on the descriptor.
        field: String,
    },
    /// The cursor did not match the expected structural shape.
    StructureMismatch {
        /// What the engine expected to find.
        expected: String,
        /// What the cursor was actually positioned on.
        found: String,
    },
    /// A polymorphic discriminator did not resolve to a known variant.
    TypeMismatch(String),
    /// A recursive or unregistered type's descriptor could not be resolved
    /// in a position where one is required.
    DescriptorUnavailable {
        /// The logical type name that failed to resolve.
        type_name: String,
    },
    /// A scalar value could not be parsed as its declared primitive kind.
    InvalidValue {
        /// The offending string.
        value: String,
        /// The primitive kind it was expected to parse as.
        expected: String,
    },
    /// Failed to tokenize the XML document.
    Parse(String),
    /// A structural write call was invalid at the current writer position.
    Write(String),
}

impl XmlErrorKind {
    /// Returns a stable error code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            XmlErrorKind::UnknownField { .. } => "xml::unknown_field",
            XmlErrorKind::MissingField { .. } => "xml::missing_field",
            XmlErrorKind::StructureMismatch { .. } => "xml::structure_mismatch",
            XmlErrorKind::TypeMismatch(_) => "xml::type_mismatch",
            XmlErrorKind::DescriptorUnavailable { .. } => "xml::descriptor_unavailable",
            XmlErrorKind::InvalidValue { .. } => "xml::invalid_value",
            XmlErrorKind::Parse(_) => "xml::parse",
            XmlErrorKind::Write(_) => "xml::write",
        }
    }
}

impl Display for XmlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlErrorKind::UnknownField { name, candidates } => {
                write!(
                    f,
                    "unknown field '{}', expected one of: {}",
                    name,
                    candidates.join(", ")
                )
            }
            XmlErrorKind::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            XmlErrorKind::StructureMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            XmlErrorKind::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            XmlErrorKind::DescriptorUnavailable { type_name } => {
                write!(f, "no descriptor available for type '{type_name}'")
            }
            XmlErrorKind::InvalidValue { value, expected } => {
                write!(f, "invalid value '{value}', expected {expected}")
            }
            XmlErrorKind::Parse(msg) => write!(f, "XML parse error: {msg}"),
            XmlErrorKind::Write(msg) => write!(f, "XML write error: {msg}"),
        }
    }
}

pub(crate) fn unknown_field(name: impl Into<String>, candidates: Vec<String>) -> XmlError {
    XmlError::new(XmlErrorKind::UnknownField {
        name: name.into(),
        candidates,
    })
}

pub(crate) fn missing_field(field: impl Into<String>) -> XmlError {
    XmlError::new(XmlErrorKind::MissingField {
        field: field.into(),
    })
}

pub(crate) fn structure_mismatch(
    expected: impl Into<String>,
    found: impl Into<String>,
) -> XmlError {
    XmlError::new(XmlErrorKind::StructureMismatch {
        expected: expected.into(),
        found: found.into(),
    })
}

pub(crate) fn type_mismatch(msg: impl Into<String>) -> XmlError {
    XmlError::new(XmlErrorKind::TypeMismatch(msg.into()))
}

pub(crate) fn descriptor_unavailable(type_name: impl Into<String>) -> XmlError {
    XmlError::new(XmlErrorKind::DescriptorUnavailable {
        type_name: type_name.into(),
    })
}

pub(crate) fn invalid_value(value: impl Into<String>, expected: impl Into<String>) -> XmlError {
    XmlError::new(XmlErrorKind::InvalidValue {
        value: value.into(),
        expected: expected.into(),
    })
}

pub(crate) fn parse_error(msg: impl Into<String>) -> XmlError {
    XmlError::new(XmlErrorKind::Parse(msg.into()))
}

pub(crate) fn write_error(msg: impl Into<String>) -> XmlError {
    XmlError::new(XmlErrorKind::Write(msg.into()))
}
