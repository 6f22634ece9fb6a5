// ABOUTME: Compact binary object-graph codec with identity-preserving back-references.
// ABOUTME: Exposes the registry, the dynamic graph model and encode/decode entry points.

//! # graphcodec
//!
//! A compact binary codec for object graphs. Shared objects are written once
//! and referenced by cookie afterwards, so shared and cyclic graphs survive a
//! round trip with their identity intact.
//!
//! Types are announced by small integer handles drawn from a [`Registry`].
//! Writer and reader must build their registries from the same ordered list
//! of registrations; a [`RegistryConfig`] is the easy way to share one.
//!
//! ## Quick Start
//!
//! ```rust
//! use graphcodec::{decode, encode, record_schema, Registry, Value};
//!
//! let mut builder = Registry::builder();
//! builder.register_record(record_schema!(Node { value: "i32", next: "Node" })?)?;
//! let registry = builder.build()?;
//!
//! // A two-node cycle.
//! let a = registry.new_record("Node")?;
//! let b = registry.new_record("Node")?;
//! if let Some(r) = a.borrow_mut().as_record_mut() {
//!     r.set("value", 1)?;
//!     r.set("next", b.clone())?;
//! }
//! if let Some(r) = b.borrow_mut().as_record_mut() {
//!     r.set("value", 2)?;
//!     r.set("next", a.clone())?;
//! }
//!
//! let bytes = encode(&registry, &Value::Object(a))?;
//! let decoded = decode(&registry, &bytes)?;
//!
//! let first = decoded.as_object().unwrap().clone();
//! let second = first.borrow().as_record().unwrap().get("next").unwrap().clone();
//! let back = second.as_object().unwrap().borrow().as_record().unwrap().get("next").unwrap().clone();
//! assert!(back.as_object().unwrap().ptr_eq(&first));
//! # Ok::<(), graphcodec::Error>(())
//! ```
//!
//! ## Wire Format
//!
//! All integers are little-endian. A slot declared as `object` starts with a
//! type tag (`i16` handle, plus an `i16` sub-handle after the array family
//! handle); handle 0 is null. Heap objects start with an `i32` cookie: -1 is
//! null, a cookie seen before is a back-reference, and the next new cookie is
//! followed by the object's payload.
//!
//! ## Resource Limits
//!
//! Default limits applied when decoding:
//! - Maximum nesting depth: 512 (also enforced when encoding, see [`WriterConfig`])
//! - Maximum collection size: 1,000,000 elements
//! - Maximum string length: 10 MB
//! - Maximum sparse array slots per decode: 4,000,000
//!
//! Dense array lengths are also checked against the remaining input before
//! any slots are allocated.

pub mod array;
pub mod config;
pub mod context;
pub mod error;
pub mod generic;
pub mod graph;
pub mod primitives;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod surrogate;
pub mod types;
pub mod value;
pub mod writer;

// Re-export commonly used items at the crate root
pub use config::{RegistryConfig, TypeEntry};
pub use error::{Error, Result};
pub use graph::{ObjectReader, ObjectWriter};
pub use reader::ReaderConfig;
pub use registry::{Registry, RegistryBuilder, TypeTag};
pub use schema::{FieldDecl, RecordCodec, RecordSchema};
pub use surrogate::{Codec, ContextSensitive, Memoized, Surrogate, SurrogateRef};
pub use types::{handle, limits, TypeDesc, TypeHandle};
pub use value::{ArrayObject, DictionaryObject, ListObject, Object, ObjectRef, Record, Value};
pub use writer::WriterConfig;

// The record_schema! macro is exported at crate root via #[macro_export]

use std::io::Write;
use tracing::debug;

/// Encode a graph rooted in an `object` slot.
///
/// # Example
///
/// ```rust
/// use graphcodec::{encode, handle, Registry, Value};
///
/// let registry = Registry::builder().build().unwrap();
/// let bytes = encode(&registry, &Value::I32(42)).unwrap();
/// assert_eq!(bytes, vec![handle::I32 as u8, 0, 42, 0, 0, 0]);
/// ```
pub fn encode(registry: &Registry, value: &Value) -> Result<Vec<u8>> {
    encode_with_config(registry, value, WriterConfig::default())
}

/// Encode a graph rooted in an `object` slot with custom limits.
///
/// Raise `max_depth` to encode graphs nested deeper than the default, and
/// raise the reader's limit to match when decoding them.
pub fn encode_with_config(registry: &Registry, value: &Value, config: WriterConfig) -> Result<Vec<u8>> {
    let mut writer = ObjectWriter::with_config(registry, config);
    writer.write_object(value)?;
    let bytes = writer.into_bytes();
    debug!(len = bytes.len(), "encoded graph");
    Ok(bytes)
}

/// Encode a graph into a root slot of a known type, which omits the root's type tag.
pub fn encode_as(registry: &Registry, value: &Value, declared: &TypeDesc) -> Result<Vec<u8>> {
    let mut writer = ObjectWriter::new(registry);
    writer.write_as(declared, value)?;
    Ok(writer.into_bytes())
}

/// Encode a graph to a writer.
///
/// The graph is encoded in full before anything is written, so a failed
/// encode leaves the sink untouched.
pub fn encode_to_writer<W: Write>(registry: &Registry, mut sink: W, value: &Value) -> Result<()> {
    let bytes = encode(registry, value)?;
    sink.write_all(&bytes)?;
    Ok(())
}

/// Decode a graph written by [`encode`].
///
/// Decoded cycles are reference-count cycles; free them with
/// [`ObjectRef::release_graph`].
pub fn decode(registry: &Registry, data: &[u8]) -> Result<Value> {
    decode_with_config(registry, data, ReaderConfig::default())
}

/// Decode a graph written by [`encode`] with custom limits.
pub fn decode_with_config(registry: &Registry, data: &[u8], config: ReaderConfig) -> Result<Value> {
    let mut reader = ObjectReader::with_config(registry, data, config);
    let value = reader.read_object()?;
    reader.finish()?;
    Ok(value)
}

/// Decode a graph written by [`encode_as`] with the same declared type.
pub fn decode_as(registry: &Registry, data: &[u8], declared: &TypeDesc) -> Result<Value> {
    let mut reader = ObjectReader::new(registry, data);
    let value = reader.read_as(declared)?;
    reader.finish()?;
    Ok(value)
}

/// Walk a graph written by [`encode`] without materializing it.
pub fn skip(registry: &Registry, data: &[u8]) -> Result<()> {
    let mut reader = ObjectReader::new(registry, data);
    reader.skip_object()?;
    reader.finish()
}
