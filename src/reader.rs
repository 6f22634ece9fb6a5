// ABOUTME: Primitive stream reader over a byte slice, with configurable resource limits.
// ABOUTME: Mirrors the writer: little-endian scalars, length-prefixed strings and blocks.

#![allow(clippy::cast_sign_loss)]

use crate::error::{Error, Result};
use crate::types::limits;

/// Validate and convert bytes to a UTF-8 string.
/// Uses simdutf8 for SIMD-accelerated validation when the feature is enabled.
#[cfg(feature = "simd-utf8")]
#[inline]
fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

#[cfg(not(feature = "simd-utf8"))]
#[inline]
fn validate_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}

/// Configuration options for decoding.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Allow bytes after the root value (default: false)
    pub allow_trailing_bytes: bool,
    /// Maximum object nesting depth
    pub max_depth: usize,
    /// Maximum elements in an array, list or dictionary
    pub max_collection_len: usize,
    /// Maximum string length in bytes
    pub max_string_length: usize,
    /// Maximum slots allocated for sparse nullable arrays across one decode
    pub max_sparse_slots: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            allow_trailing_bytes: false,
            max_depth: limits::MAX_DEPTH,
            max_collection_len: limits::MAX_COLLECTION_LEN,
            max_string_length: limits::MAX_STRING_LENGTH,
            max_sparse_slots: limits::MAX_SPARSE_SLOTS,
        }
    }
}

/// A primitive reader over a byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    config: ReaderConfig,
}

impl<'a> Reader<'a> {
    /// Create a new reader for the given data.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_config(data, ReaderConfig::default())
    }

    /// Create a new reader with custom configuration.
    #[must_use]
    pub fn with_config(data: &'a [u8], config: ReaderConfig) -> Self {
        Self { data, pos: 0, config }
    }

    /// Get the remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Check if we've reached the end of input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get the reader configuration.
    #[must_use]
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read exactly n bytes.
    #[inline]
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::Truncated)?;
        if end > self.data.len() {
            return Err(Error::Truncated);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a boolean byte, rejecting anything but 0 or 1.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::InvalidData(format!("invalid bool byte 0x{b:02x}"))),
        }
    }

    /// Read a char from its 32-bit scalar value.
    pub fn read_char(&mut self) -> Result<char> {
        let scalar = self.read_u32()?;
        char::from_u32(scalar)
            .ok_or_else(|| Error::InvalidData(format!("invalid char scalar 0x{scalar:x}")))
    }

    /// Read a collection length, checking sign and the configured limit.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::Shape(format!("negative collection length {len}")));
        }
        let len = len as usize;
        if len > self.config.max_collection_len {
            return Err(Error::MaxCollectionSizeExceeded);
        }
        Ok(len)
    }

    /// Read a length-prefixed byte block.
    pub fn read_block(&mut self) -> Result<&'a [u8]> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::Shape(format!("negative block length {len}")));
        }
        let len = len as usize;
        if len > self.config.max_string_length {
            return Err(Error::MaxStringLengthExceeded);
        }
        self.read_bytes(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_block()?;
        validate_utf8(bytes)
    }

    /// Skip a length-prefixed block without validating its content.
    pub fn skip_block(&mut self) -> Result<()> {
        self.read_block().map(|_| ())
    }

    /// Finish reading and verify no trailing bytes remain.
    pub fn finish(&self) -> Result<()> {
        if !self.config.allow_trailing_bytes && !self.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(())
    }
}
