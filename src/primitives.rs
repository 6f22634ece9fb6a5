// ABOUTME: Surrogates for slots without identity: value types, nullables, strings and type values.
// ABOUTME: Also the polymorphic `object` surrogate, which defers to the type tag in the stream.

use crate::error::{Error, Result};
use crate::graph::{ObjectReader, ObjectWriter};
use crate::reader::Reader;
use crate::surrogate::Surrogate;
use crate::types::{handle, wire, TypeDesc};
use crate::value::Value;
use crate::writer::Writer;

/// Write a value-type value with no framing.
pub(crate) fn write_raw(stream: &mut Writer<Vec<u8>>, ty: &TypeDesc, value: &Value) -> Result<()> {
    match (ty, value) {
        (TypeDesc::Bool, Value::Bool(v)) => stream.write_bool(*v),
        (TypeDesc::Char, Value::Char(v)) => stream.write_char(*v),
        (TypeDesc::I8, Value::I8(v)) => stream.write_i8(*v),
        (TypeDesc::U8, Value::U8(v)) => stream.write_u8(*v),
        (TypeDesc::I16, Value::I16(v)) => stream.write_i16(*v),
        (TypeDesc::U16, Value::U16(v)) => stream.write_u16(*v),
        (TypeDesc::I32, Value::I32(v)) => stream.write_i32(*v),
        (TypeDesc::U32, Value::U32(v)) => stream.write_u32(*v),
        (TypeDesc::I64, Value::I64(v)) => stream.write_i64(*v),
        (TypeDesc::U64, Value::U64(v)) => stream.write_u64(*v),
        (TypeDesc::F32, Value::F32(v)) => stream.write_f32(*v),
        (TypeDesc::F64, Value::F64(v)) => stream.write_f64(*v),
        _ => Err(Error::mismatch(ty, value.type_name())),
    }
}

/// Read a value-type value with no framing.
pub(crate) fn read_raw(stream: &mut Reader<'_>, ty: &TypeDesc) -> Result<Value> {
    Ok(match ty {
        TypeDesc::Bool => Value::Bool(stream.read_bool()?),
        TypeDesc::Char => Value::Char(stream.read_char()?),
        TypeDesc::I8 => Value::I8(stream.read_i8()?),
        TypeDesc::U8 => Value::U8(stream.read_u8()?),
        TypeDesc::I16 => Value::I16(stream.read_i16()?),
        TypeDesc::U16 => Value::U16(stream.read_u16()?),
        TypeDesc::I32 => Value::I32(stream.read_i32()?),
        TypeDesc::U32 => Value::U32(stream.read_u32()?),
        TypeDesc::I64 => Value::I64(stream.read_i64()?),
        TypeDesc::U64 => Value::U64(stream.read_u64()?),
        TypeDesc::F32 => Value::F32(stream.read_f32()?),
        TypeDesc::F64 => Value::F64(stream.read_f64()?),
        other => return Err(Error::Shape(format!("{other} is not a value type"))),
    })
}

/// Encoded width of a value type.
pub(crate) fn raw_width(ty: &TypeDesc) -> Result<usize> {
    Ok(match ty {
        TypeDesc::Bool | TypeDesc::I8 | TypeDesc::U8 => 1,
        TypeDesc::I16 | TypeDesc::U16 => 2,
        TypeDesc::Char | TypeDesc::I32 | TypeDesc::U32 | TypeDesc::F32 => 4,
        TypeDesc::I64 | TypeDesc::U64 | TypeDesc::F64 => 8,
        other => return Err(Error::Shape(format!("{other} is not a value type"))),
    })
}

/// Read a presence flag: `false` for absent, `true` for present.
pub(crate) fn read_presence(stream: &mut Reader<'_>) -> Result<bool> {
    match stream.read_u8()? {
        wire::ABSENT => Ok(false),
        wire::PRESENT => Ok(true),
        b => Err(Error::InvalidData(format!("invalid presence flag 0x{b:02x}"))),
    }
}

/// A built-in value type, written raw.
pub struct PrimitiveSurrogate {
    ty: TypeDesc,
}

impl PrimitiveSurrogate {
    pub fn new(ty: TypeDesc) -> Result<Self> {
        if !ty.is_value_type() {
            return Err(Error::Registration(format!("{ty} is not a value type")));
        }
        Ok(Self { ty })
    }
}

impl Surrogate for PrimitiveSurrogate {
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        write_raw(w.stream(), &self.ty, value)
    }

    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        read_raw(r.stream(), &self.ty)
    }

    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        r.stream().read_bytes(raw_width(&self.ty)?).map(|_| ())
    }
}

/// A nullable value type: `[presence:u8][raw value if present]`.
pub struct NullableSurrogate {
    inner: TypeDesc,
}

impl NullableSurrogate {
    pub fn new(inner: TypeDesc) -> Result<Self> {
        if !inner.is_value_type() {
            return Err(Error::Registration(format!("{inner}? is not a nullable value type")));
        }
        Ok(Self { inner })
    }
}

impl Surrogate for NullableSurrogate {
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        if value.is_null() {
            return w.stream().write_u8(wire::ABSENT);
        }
        // Check before emitting the flag so a mismatch leaves nothing behind.
        if value.runtime_type().as_ref() != Some(&self.inner) {
            return Err(Error::mismatch(TypeDesc::nullable(self.inner.clone()), value.type_name()));
        }
        w.stream().write_u8(wire::PRESENT)?;
        write_raw(w.stream(), &self.inner, value)
    }

    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        if !read_presence(r.stream())? {
            return Ok(Value::Null);
        }
        read_raw(r.stream(), &self.inner)
    }

    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        if read_presence(r.stream())? {
            r.stream().read_bytes(raw_width(&self.inner)?)?;
        }
        Ok(())
    }
}

/// Strings: `[presence:u8][length:i32][utf8 bytes]`. Strings carry no identity.
pub struct StringSurrogate;

impl Surrogate for StringSurrogate {
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        match value {
            Value::Null => w.stream().write_u8(wire::ABSENT),
            Value::String(s) => {
                w.stream().write_u8(wire::PRESENT)?;
                w.stream().write_string(s)
            }
            other => Err(Error::mismatch(TypeDesc::String, other.type_name())),
        }
    }

    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        if !read_presence(r.stream())? {
            return Ok(Value::Null);
        }
        Ok(Value::String(r.stream().read_string()?.to_owned()))
    }

    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        if read_presence(r.stream())? {
            r.stream().skip_block()?;
        }
        Ok(())
    }
}

/// Type values: `[presence:u8][handle:i16]`, with handle 0 followed by the
/// canonical name for types the registry has no handle for.
pub struct TypeSurrogate;

impl Surrogate for TypeSurrogate {
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        let ty = match value {
            Value::Null => return w.stream().write_u8(wire::ABSENT),
            Value::Type(ty) => ty,
            other => return Err(Error::mismatch(TypeDesc::Type, other.type_name())),
        };
        w.stream().write_u8(wire::PRESENT)?;
        match w.registry().handle_for(ty) {
            Some(h) => w.stream().write_i16(h),
            None => {
                w.stream().write_i16(handle::NONE)?;
                w.write_type_name(ty)
            }
        }
    }

    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        if !read_presence(r.stream())? {
            return Ok(Value::Null);
        }
        let h = r.stream().read_i16()?;
        let ty = if h == handle::NONE {
            r.read_type_name()?
        } else {
            r.registry().type_of(h)?.clone()
        };
        Ok(Value::Type(ty))
    }

    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        if read_presence(r.stream())? && r.stream().read_i16()? == handle::NONE {
            r.skip_type_name()?;
        }
        Ok(())
    }
}

/// The open `object` slot: a type tag followed by the concrete encoding.
pub struct ObjectSurrogate;

impl Surrogate for ObjectSurrogate {
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        w.write_object(value)
    }

    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        r.read_object()
    }

    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        r.skip_object()
    }
}
