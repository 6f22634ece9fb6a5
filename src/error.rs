// ABOUTME: Error types for object-graph encoding, decoding and registry construction.
// ABOUTME: Variants group into registration, unknown-handle, shape and stream failures.

use std::fmt;

/// The result type for graph codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a registry or encoding/decoding a graph.
///
/// Any error aborts the whole operation. A partially decoded graph is never
/// returned, and [`encode_to_writer`](crate::encode_to_writer) emits nothing
/// when encoding fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A type could not be registered or its codec could not be compiled.
    Registration(String),

    /// A type handle read from the stream has no registry entry.
    UnknownHandle(i16),

    /// A sub-type handle read after a family handle has no registry entry.
    UnknownSubHandle { handle: i16, sub_handle: i16 },

    /// A value's runtime type was never registered.
    UnregisteredType(String),

    /// A type name could not be parsed.
    InvalidTypeName(String),

    /// A container's shape disagrees with what the stream or registry declares.
    Shape(String),

    /// A value does not match the type of the slot it is written into.
    TypeMismatch { expected: String, found: String },

    /// A cookie that is neither a known back-reference nor the next new cookie.
    InvalidCookie(i32),

    /// A back-reference points at an object that was skipped, not materialized.
    SkippedReference(i32),

    /// Unexpected end of input data.
    Truncated,

    /// Unconsumed bytes after decoding the root value.
    TrailingBytes,

    /// Invalid UTF-8 byte sequence in a string.
    InvalidUtf8,

    /// Malformed primitive data (bad bool byte, bad char scalar, ...).
    InvalidData(String),

    /// Object nesting too deep.
    MaxDepthExceeded,

    /// String exceeds length limit.
    MaxStringLengthExceeded,

    /// Array, list or dictionary has too many elements.
    MaxCollectionSizeExceeded,

    /// IO error while flushing encoded bytes.
    Io(String),
}

impl Error {
    /// Returns a stable, machine-matchable name for the error kind.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Registration(_) => "registration",
            Error::UnknownHandle(_) => "unknown_handle",
            Error::UnknownSubHandle { .. } => "unknown_sub_handle",
            Error::UnregisteredType(_) => "unregistered_type",
            Error::InvalidTypeName(_) => "invalid_type_name",
            Error::Shape(_) => "shape",
            Error::TypeMismatch { .. } => "type_mismatch",
            Error::InvalidCookie(_) => "invalid_cookie",
            Error::SkippedReference(_) => "skipped_reference",
            Error::Truncated => "truncated",
            Error::TrailingBytes => "trailing_bytes",
            Error::InvalidUtf8 => "invalid_utf8",
            Error::InvalidData(_) => "invalid_data",
            Error::MaxDepthExceeded => "max_depth_exceeded",
            Error::MaxStringLengthExceeded => "max_string_length_exceeded",
            Error::MaxCollectionSizeExceeded => "max_collection_size_exceeded",
            Error::Io(_) => "io_error",
        }
    }

    /// True for errors caused by a writer/reader registry mismatch.
    #[must_use]
    pub fn is_registry_mismatch(&self) -> bool {
        matches!(
            self,
            Error::UnknownHandle(_) | Error::UnknownSubHandle { .. } | Error::UnregisteredType(_)
        )
    }

    pub(crate) fn mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Registration(msg) => write!(f, "registration failed: {msg}"),
            Error::UnknownHandle(h) => write!(f, "unknown type handle: {h}"),
            Error::UnknownSubHandle { handle, sub_handle } => {
                write!(f, "unknown sub-type handle {sub_handle} for handle {handle}")
            }
            Error::UnregisteredType(name) => write!(f, "type is not registered: {name}"),
            Error::InvalidTypeName(name) => write!(f, "invalid type name: {name:?}"),
            Error::Shape(msg) => write!(f, "shape error: {msg}"),
            Error::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Error::InvalidCookie(c) => write!(f, "invalid object cookie: {c}"),
            Error::SkippedReference(c) => {
                write!(f, "back-reference to skipped object with cookie {c}")
            }
            Error::Truncated => write!(f, "unexpected end of input"),
            Error::TrailingBytes => write!(f, "trailing bytes after root value"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8 sequence"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::MaxDepthExceeded => write!(f, "maximum object depth exceeded"),
            Error::MaxStringLengthExceeded => write!(f, "maximum string length exceeded"),
            Error::MaxCollectionSizeExceeded => write!(f, "maximum collection size exceeded"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
