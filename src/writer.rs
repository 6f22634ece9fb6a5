// ABOUTME: Primitive stream writer: fixed-width little-endian scalars, strings and byte blocks.
// ABOUTME: Knows nothing about object identity; the graph layer builds on top of it.

use crate::error::{Error, Result};
use crate::types::limits;
use std::io::Write;

/// Configuration options for encoding.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum object nesting depth
    pub max_depth: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_depth: limits::MAX_DEPTH,
        }
    }
}

/// A primitive writer over any `Write` sink.
pub struct Writer<W: Write> {
    writer: W,
}

impl<W: Write> Writer<W> {
    /// Create a new writer that writes to the given sink.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Write raw bytes with no length prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    #[inline]
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a boolean as a single 0/1 byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Write a char as its 32-bit scalar value.
    #[inline]
    pub fn write_char(&mut self, value: char) -> Result<()> {
        self.write_u32(u32::from(value))
    }

    /// Write a collection length or count as an `i32`.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len)
            .map_err(|_| Error::Shape(format!("collection length {len} exceeds i32")))?;
        self.write_i32(len)
    }

    /// Write a length-prefixed byte block: `[length:i32][bytes]`.
    pub fn write_block(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.write_bytes(bytes)
    }

    /// Write a length-prefixed UTF-8 string: `[length:i32][bytes]`.
    #[inline]
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_block(value.as_bytes())
    }
}
