// ABOUTME: Runtime type model, canonical type-name grammar and fixed type handles.
// ABOUTME: Handle and wire constants here are part of the binary format.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A small integer alias for a registered type, valid only within one registry.
pub type TypeHandle = i16;

/// Fixed type handles. These values are part of the wire format.
pub mod handle {
    use super::TypeHandle;

    /// Null value in a polymorphic slot; "no sub-type" after a family handle.
    pub const NONE: TypeHandle = 0;

    pub const BOOL: TypeHandle = 1;
    pub const CHAR: TypeHandle = 2;
    pub const I8: TypeHandle = 3;
    pub const U8: TypeHandle = 4;
    pub const I16: TypeHandle = 5;
    pub const U16: TypeHandle = 6;
    pub const I32: TypeHandle = 7;
    pub const U32: TypeHandle = 8;
    pub const I64: TypeHandle = 9;
    pub const U64: TypeHandle = 10;
    pub const F32: TypeHandle = 11;
    pub const F64: TypeHandle = 12;
    pub const STRING: TypeHandle = 13;
    pub const OBJECT: TypeHandle = 14;
    pub const TYPE: TypeHandle = 15;
    pub const OBJECT_ARRAY: TypeHandle = 16;

    // Open shapes. Only ARRAY is followed by a sub-handle on the wire.
    pub const ARRAY: TypeHandle = 20;
    pub const NULLABLE_ARRAY: TypeHandle = 21;
    pub const LIST: TypeHandle = 22;
    pub const DICTIONARY: TypeHandle = 23;

    /// First handle assigned to user registrations.
    pub const FIRST_USER: TypeHandle = 32;
}

/// Wire markers shared by several surrogates.
pub mod wire {
    /// Cookie written for a null reference.
    pub const NULL_COOKIE: i32 = -1;

    /// Terminates the index/value pairs of a sparse nullable array.
    pub const SPARSE_END: i32 = -1;

    /// Presence flags ahead of strings, nullable values and type values.
    pub const ABSENT: u8 = 0;
    pub const PRESENT: u8 = 1;

    /// Generic argument counts carried by list and dictionary payloads.
    pub const LIST_ARITY: i32 = 1;
    pub const DICTIONARY_ARITY: i32 = 2;
}

/// Default resource limits applied by the reader.
pub mod limits {
    /// Maximum object nesting depth
    pub const MAX_DEPTH: usize = 512;

    /// Maximum elements in a single array, list or dictionary
    pub const MAX_COLLECTION_LEN: usize = 1_000_000;

    /// Maximum string length in bytes
    pub const MAX_STRING_LENGTH: usize = 10_000_000;

    /// Maximum slots allocated for sparse nullable arrays in one decode
    pub const MAX_SPARSE_SLOTS: usize = 4_000_000;

    /// Maximum length of a type name carried on the wire
    pub const MAX_TYPE_NAME_LENGTH: usize = 1024;
}

/// A runtime type as understood by the codec.
///
/// `Nullable` is only meaningful as a declared slot or element type over a
/// value type; no value ever has `Nullable` as its runtime type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    /// The open base type: any value, written with its concrete type tag.
    Object,
    /// A type value (the self-describing type).
    Type,
    /// A user record type, by registered name.
    Record(Arc<str>),
    Array(Box<TypeDesc>),
    Nullable(Box<TypeDesc>),
    List(Box<TypeDesc>),
    Dictionary(Box<TypeDesc>, Box<TypeDesc>),
}

const KEYWORDS: &[(&str, TypeDesc)] = &[
    ("bool", TypeDesc::Bool),
    ("char", TypeDesc::Char),
    ("i8", TypeDesc::I8),
    ("u8", TypeDesc::U8),
    ("i16", TypeDesc::I16),
    ("u16", TypeDesc::U16),
    ("i32", TypeDesc::I32),
    ("u32", TypeDesc::U32),
    ("i64", TypeDesc::I64),
    ("u64", TypeDesc::U64),
    ("f32", TypeDesc::F32),
    ("f64", TypeDesc::F64),
    ("string", TypeDesc::String),
    ("object", TypeDesc::Object),
    ("type", TypeDesc::Type),
];

const LIST_NAME: &str = "List";
const DICTIONARY_NAME: &str = "Dictionary";

impl TypeDesc {
    /// Create a record type descriptor.
    pub fn record(name: impl Into<Arc<str>>) -> Self {
        TypeDesc::Record(name.into())
    }

    /// Create an array type descriptor.
    pub fn array(element: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(element))
    }

    /// Create a nullable type descriptor.
    pub fn nullable(inner: TypeDesc) -> Self {
        TypeDesc::Nullable(Box::new(inner))
    }

    /// Create a generic list type descriptor.
    pub fn list(element: TypeDesc) -> Self {
        TypeDesc::List(Box::new(element))
    }

    /// Create a generic dictionary type descriptor.
    pub fn dictionary(key: TypeDesc, value: TypeDesc) -> Self {
        TypeDesc::Dictionary(Box::new(key), Box::new(value))
    }

    /// Returns true for fixed-size value types (no null, no identity).
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeDesc::Bool
                | TypeDesc::Char
                | TypeDesc::I8
                | TypeDesc::U8
                | TypeDesc::I16
                | TypeDesc::U16
                | TypeDesc::I32
                | TypeDesc::U32
                | TypeDesc::I64
                | TypeDesc::U64
                | TypeDesc::F32
                | TypeDesc::F64
        )
    }

    /// Returns true if a slot of this type can hold null.
    #[must_use]
    pub fn admits_null(&self) -> bool {
        !self.is_value_type()
    }

    /// The handle reserved for this type, if it is a built-in.
    #[must_use]
    pub fn builtin_handle(&self) -> Option<TypeHandle> {
        let h = match self {
            TypeDesc::Bool => handle::BOOL,
            TypeDesc::Char => handle::CHAR,
            TypeDesc::I8 => handle::I8,
            TypeDesc::U8 => handle::U8,
            TypeDesc::I16 => handle::I16,
            TypeDesc::U16 => handle::U16,
            TypeDesc::I32 => handle::I32,
            TypeDesc::U32 => handle::U32,
            TypeDesc::I64 => handle::I64,
            TypeDesc::U64 => handle::U64,
            TypeDesc::F32 => handle::F32,
            TypeDesc::F64 => handle::F64,
            TypeDesc::String => handle::STRING,
            TypeDesc::Object => handle::OBJECT,
            TypeDesc::Type => handle::TYPE,
            TypeDesc::Array(elem) if **elem == TypeDesc::Object => handle::OBJECT_ARRAY,
            _ => return None,
        };
        Some(h)
    }

    /// Iterate over the record names this type mentions, at any depth.
    pub(crate) fn for_each_record(&self, f: &mut dyn FnMut(&Arc<str>)) {
        match self {
            TypeDesc::Record(name) => f(name),
            TypeDesc::Array(t) | TypeDesc::Nullable(t) | TypeDesc::List(t) => t.for_each_record(f),
            TypeDesc::Dictionary(k, v) => {
                k.for_each_record(f);
                v.for_each_record(f);
            }
            _ => {}
        }
    }
}

/// Check whether a name is usable as a record name.
pub(crate) fn is_valid_record_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return false,
    }
    bytes.iter().all(|b| is_ident_byte(*b))
        && name != LIST_NAME
        && name != DICTIONARY_NAME
        && !KEYWORDS.iter().any(|(kw, _)| *kw == name)
}

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b':'
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Record(name) => f.write_str(name),
            TypeDesc::Array(elem) => write!(f, "{elem}[]"),
            TypeDesc::Nullable(inner) => write!(f, "{inner}?"),
            TypeDesc::List(elem) => write!(f, "{LIST_NAME}<{elem}>"),
            TypeDesc::Dictionary(k, v) => write!(f, "{DICTIONARY_NAME}<{k},{v}>"),
            other => {
                let name = KEYWORDS
                    .iter()
                    .find(|(_, t)| t == other)
                    .map_or("?", |(kw, _)| kw);
                f.write_str(name)
            }
        }
    }
}

impl FromStr for TypeDesc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if memchr::memchr(0, s.as_bytes()).is_some() {
            return Err(Error::InvalidTypeName(s.to_owned()));
        }
        let mut parser = TypeNameParser { src: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error());
        }
        Ok(ty)
    }
}

/// Recursive-descent parser for canonical type names.
struct TypeNameParser<'a> {
    src: &'a str,
    pos: usize,
}

impl TypeNameParser<'_> {
    fn error(&self) -> Error {
        Error::InvalidTypeName(self.src.to_owned())
    }

    fn skip_ws(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_ws();
        if self.peek() != Some(byte) {
            return Err(self.error());
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_type(&mut self) -> Result<TypeDesc> {
        let mut ty = self.parse_base()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'[') => {
                    self.pos += 1;
                    self.expect(b']')?;
                    ty = TypeDesc::array(ty);
                }
                Some(b'?') => {
                    self.pos += 1;
                    if !ty.is_value_type() {
                        return Err(self.error());
                    }
                    ty = TypeDesc::nullable(ty);
                }
                _ => return Ok(ty),
            }
        }
    }

    fn parse_base(&mut self) -> Result<TypeDesc> {
        self.skip_ws();
        let start = self.pos;
        let len = self.src.as_bytes()[start..]
            .iter()
            .position(|b| !is_ident_byte(*b))
            .unwrap_or(self.src.len() - start);
        if len == 0 {
            return Err(self.error());
        }
        self.pos += len;
        let ident = &self.src[start..self.pos];

        self.skip_ws();
        if self.peek() == Some(b'<') {
            self.pos += 1;
            let mut args = vec![self.parse_type()?];
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        args.push(self.parse_type()?);
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error()),
                }
            }
            return match (ident, args.len()) {
                (LIST_NAME, 1) => Ok(TypeDesc::list(args.remove(0))),
                (DICTIONARY_NAME, 2) => {
                    let value = args.remove(1);
                    Ok(TypeDesc::dictionary(args.remove(0), value))
                }
                _ => Err(self.error()),
            };
        }

        if let Some((_, ty)) = KEYWORDS.iter().find(|(kw, _)| *kw == ident) {
            return Ok(ty.clone());
        }
        if is_valid_record_name(ident) {
            Ok(TypeDesc::record(ident))
        } else {
            Err(self.error())
        }
    }
}

impl Serialize for TypeDesc {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeDesc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
