// ABOUTME: Object-level writer and reader that surrogates drive during one encode or decode.
// ABOUTME: Owns the primitive stream, the memoization context, the depth guard and type tags.

use crate::context::{ReadContext, WriteContext};
use crate::error::{Error, Result};
use crate::reader::{Reader, ReaderConfig};
use crate::registry::{Registry, TypeTag};
use crate::types::{handle, limits, TypeDesc};
use crate::value::Value;
use crate::writer::{Writer, WriterConfig};
use tracing::warn;

/// Writes one object graph into an in-memory buffer.
///
/// Output is buffered so that a failed encode never reaches the caller's sink.
pub struct ObjectWriter<'a> {
    stream: Writer<Vec<u8>>,
    registry: &'a Registry,
    context: WriteContext,
    depth: usize,
    max_depth: usize,
}

impl<'a> ObjectWriter<'a> {
    #[must_use]
    pub fn new(registry: &'a Registry) -> Self {
        Self::with_config(registry, WriterConfig::default())
    }

    #[must_use]
    pub fn with_config(registry: &'a Registry, config: WriterConfig) -> Self {
        Self {
            stream: Writer::new(Vec::new()),
            registry,
            context: WriteContext::new(),
            depth: 0,
            max_depth: config.max_depth,
        }
    }

    #[inline]
    pub fn stream(&mut self) -> &mut Writer<Vec<u8>> {
        &mut self.stream
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    #[inline]
    pub fn context(&mut self) -> &mut WriteContext {
        &mut self.context
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.into_inner()
    }

    pub(crate) fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Write a value into a slot declared as `object`: type tag, then payload.
    pub fn write_object(&mut self, value: &Value) -> Result<()> {
        let Some(ty) = value.runtime_type() else {
            return self.stream.write_i16(handle::NONE);
        };
        let tag = self.registry.type_tag(&ty)?;
        self.write_type_tag(tag)?;
        self.registry.surrogate_for_tag(tag)?.write(self, value)
    }

    /// Write a value into a slot of a statically known type. No type tag.
    pub fn write_as(&mut self, declared: &TypeDesc, value: &Value) -> Result<()> {
        self.registry.resolve(declared)?.write(self, value)
    }

    pub fn write_type_tag(&mut self, tag: TypeTag) -> Result<()> {
        self.stream.write_i16(tag.handle)?;
        if let Some(sub) = tag.sub_handle {
            self.stream.write_i16(sub)?;
        }
        Ok(())
    }

    /// Write a canonical type name.
    pub fn write_type_name(&mut self, ty: &TypeDesc) -> Result<()> {
        self.stream.write_string(&ty.to_string())
    }
}

/// Reads one object graph from a byte slice.
pub struct ObjectReader<'a> {
    stream: Reader<'a>,
    registry: &'a Registry,
    context: ReadContext,
    depth: usize,
    input_len: usize,
    dense_slots: usize,
    sparse_slots: usize,
}

impl<'a> ObjectReader<'a> {
    #[must_use]
    pub fn new(registry: &'a Registry, data: &'a [u8]) -> Self {
        Self::with_config(registry, data, ReaderConfig::default())
    }

    #[must_use]
    pub fn with_config(registry: &'a Registry, data: &'a [u8], config: ReaderConfig) -> Self {
        Self {
            stream: Reader::with_config(data, config),
            registry,
            context: ReadContext::new(),
            depth: 0,
            input_len: data.len(),
            dense_slots: 0,
            sparse_slots: 0,
        }
    }

    #[inline]
    pub fn stream(&mut self) -> &mut Reader<'a> {
        &mut self.stream
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    #[inline]
    pub fn context(&mut self) -> &mut ReadContext {
        &mut self.context
    }

    /// Verify the whole input was consumed.
    pub fn finish(&self) -> Result<()> {
        self.stream.finish()
    }

    pub(crate) fn enter(&mut self) -> Result<()> {
        if self.depth >= self.stream.config().max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Account for a dense array shell of `len` slots before allocating it.
    ///
    /// Each dense slot is encoded with at least one byte of its own, so a
    /// well-formed stream never needs more slots than it has bytes, in total
    /// or ahead of the current position.
    pub(crate) fn reserve_dense(&mut self, len: usize) -> Result<()> {
        self.dense_slots = self.dense_slots.saturating_add(len);
        if len > self.stream.remaining().len() || self.dense_slots > self.input_len {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    /// Account for a sparse array shell of `len` slots before allocating it.
    pub(crate) fn reserve_sparse(&mut self, len: usize) -> Result<()> {
        self.sparse_slots = self.sparse_slots.saturating_add(len);
        if self.sparse_slots > self.stream.config().max_sparse_slots {
            return Err(Error::MaxCollectionSizeExceeded);
        }
        Ok(())
    }

    /// Read a value from a slot declared as `object`.
    pub fn read_object(&mut self) -> Result<Value> {
        let Some(tag) = self.read_type_tag()? else {
            return Ok(Value::Null);
        };
        let surrogate = self.registry.surrogate_for_tag(tag).inspect_err(|err| {
            warn!(handle = tag.handle, sub_handle = ?tag.sub_handle, %err, "unresolvable type tag");
        })?;
        surrogate.read(self)
    }

    /// Read a value from a slot of a statically known type.
    pub fn read_as(&mut self, declared: &TypeDesc) -> Result<Value> {
        self.registry.resolve(declared)?.read(self)
    }

    /// Consume a value from a slot declared as `object`.
    pub fn skip_object(&mut self) -> Result<()> {
        match self.read_type_tag()? {
            None => Ok(()),
            Some(tag) => self.registry.surrogate_for_tag(tag)?.skip(self),
        }
    }

    /// Read a type tag. `None` means a null value.
    pub fn read_type_tag(&mut self) -> Result<Option<TypeTag>> {
        let h = self.stream.read_i16()?;
        if h == handle::NONE {
            return Ok(None);
        }
        let sub_handle = if h == handle::ARRAY {
            Some(self.stream.read_i16()?)
        } else {
            None
        };
        Ok(Some(TypeTag { handle: h, sub_handle }))
    }

    /// Read and parse a canonical type name.
    pub fn read_type_name(&mut self) -> Result<TypeDesc> {
        let name = self.stream.read_string()?;
        if name.len() > limits::MAX_TYPE_NAME_LENGTH {
            return Err(Error::InvalidTypeName(name.to_owned()));
        }
        name.parse()
    }

    /// Consume a type name without parsing it.
    pub fn skip_type_name(&mut self) -> Result<()> {
        self.stream.skip_block()
    }
}
