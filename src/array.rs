// ABOUTME: Array surrogates: fixed-element, dynamically typed, heterogeneous object and sparse nullable.
// ABOUTME: All are payload codecs; identity tracking comes from wrapping them in Memoized.

use crate::error::{Error, Result};
use crate::graph::{ObjectReader, ObjectWriter};
use crate::primitives::{raw_width, read_raw, write_raw};
use crate::surrogate::{Codec, ContextSensitive};
use crate::types::{handle, wire, TypeDesc};
use crate::value::{ArrayObject, Object, ObjectRef, Value};

fn array_of(object: &Object) -> Result<&ArrayObject> {
    object
        .as_array()
        .ok_or_else(|| Error::mismatch("array", object.runtime_type()))
}

fn shell_len(shell: &ObjectRef) -> usize {
    shell.borrow().as_array().map_or(0, |a| a.items.len())
}

fn store(shell: &ObjectRef, index: usize, value: Value) {
    if let Some(array) = shell.borrow_mut().as_array_mut() {
        array.items[index] = value;
    }
}

fn new_shell(element: TypeDesc, len: usize) -> ObjectRef {
    ObjectRef::new(Object::Array(ArrayObject::with_len(element, len)))
}

fn check_element(expected: Option<&TypeDesc>, object: &Object) -> Result<()> {
    let array = array_of(object)?;
    match expected {
        Some(e) if *e != array.element => {
            Err(Error::mismatch(TypeDesc::array(e.clone()), object.runtime_type()))
        }
        _ => Ok(()),
    }
}

/// Arrays whose element type has a handle in both registries: `[length:i32][element]*`.
pub struct FixedArraySurrogate {
    element: TypeDesc,
    codec: Codec,
}

impl FixedArraySurrogate {
    #[must_use]
    pub fn new(element: TypeDesc, codec: Codec) -> Self {
        Self { element, codec }
    }
}

impl ContextSensitive for FixedArraySurrogate {
    fn describe(&self) -> String {
        TypeDesc::array(self.element.clone()).to_string()
    }

    fn check(&self, object: &Object) -> Result<()> {
        check_element(Some(&self.element), object)
    }

    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        let len = r.stream().read_len()?;
        r.reserve_dense(len)?;
        Ok(new_shell(self.element.clone(), len))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        for i in 0..shell_len(shell) {
            let item = self.codec.read(r)?;
            store(shell, i, item);
        }
        Ok(())
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let array = array_of(&object)?;
        w.stream().write_len(array.items.len())?;
        for item in &array.items {
            self.codec.write(w, item)?;
        }
        Ok(())
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        let len = r.stream().read_len()?;
        for _ in 0..len {
            self.codec.skip(r)?;
        }
        Ok(())
    }
}

/// Arrays whose element type has no handle: `[elementName][length:i32][element]*`.
///
/// The element codec is resolved from the name at run time. With `expected`
/// set, the surrogate serves one declared array type and rejects any other
/// element name.
pub struct DynamicArraySurrogate {
    expected: Option<TypeDesc>,
}

impl DynamicArraySurrogate {
    #[must_use]
    pub fn new(expected: Option<TypeDesc>) -> Self {
        Self { expected }
    }
}

impl ContextSensitive for DynamicArraySurrogate {
    fn describe(&self) -> String {
        match &self.expected {
            Some(e) => TypeDesc::array(e.clone()).to_string(),
            None => "array".into(),
        }
    }

    fn check(&self, object: &Object) -> Result<()> {
        check_element(self.expected.as_ref(), object)
    }

    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        let element = r.read_type_name()?;
        if let Some(expected) = &self.expected {
            if *expected != element {
                return Err(Error::Shape(format!(
                    "array element type {element} where {expected} was declared"
                )));
            }
        }
        let len = r.stream().read_len()?;
        r.reserve_dense(len)?;
        Ok(new_shell(element, len))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        let element = shell.borrow().as_array().map(|a| a.element.clone());
        let Some(element) = element else {
            return Ok(());
        };
        let codec = r.registry().resolve(&element)?;
        for i in 0..shell_len(shell) {
            let item = codec.read(r)?;
            store(shell, i, item);
        }
        Ok(())
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let array = array_of(&object)?;
        let codec = w.registry().resolve(&array.element)?;
        w.write_type_name(&array.element)?;
        w.stream().write_len(array.items.len())?;
        for item in &array.items {
            codec.write(w, item)?;
        }
        Ok(())
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        let element = r.read_type_name()?;
        let codec = r.registry().resolve(&element)?;
        let len = r.stream().read_len()?;
        for _ in 0..len {
            codec.skip(r)?;
        }
        Ok(())
    }
}

/// Arrays of `object`: `[length:i32][tag][element]*`.
///
/// When every non-null element shares one concrete type that can represent
/// null, that type's tag is written once and elements use its slot encoding.
/// Otherwise the tag is the `object` handle and each element carries its own.
pub struct ObjectArraySurrogate;

impl ObjectArraySurrogate {
    fn shared_type(items: &[Value]) -> Option<TypeDesc> {
        let mut shared: Option<TypeDesc> = None;
        let mut saw_null = false;
        for item in items {
            match item.runtime_type() {
                None => saw_null = true,
                Some(ty) => match &shared {
                    None => shared = Some(ty),
                    Some(s) if *s == ty => {}
                    Some(_) => return None,
                },
            }
        }
        shared.filter(|ty| !saw_null || ty.admits_null())
    }
}

impl ContextSensitive for ObjectArraySurrogate {
    fn describe(&self) -> String {
        TypeDesc::array(TypeDesc::Object).to_string()
    }

    fn check(&self, object: &Object) -> Result<()> {
        check_element(Some(&TypeDesc::Object), object)
    }

    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        let len = r.stream().read_len()?;
        r.reserve_dense(len)?;
        Ok(new_shell(TypeDesc::Object, len))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        let tag = r
            .read_type_tag()?
            .ok_or_else(|| Error::Shape("object array without element tag".into()))?;
        let len = shell_len(shell);
        if tag.handle == handle::OBJECT {
            for i in 0..len {
                let item = r.read_object()?;
                store(shell, i, item);
            }
        } else {
            let surrogate = r.registry().surrogate_for_tag(tag)?;
            for i in 0..len {
                let item = surrogate.read(r)?;
                store(shell, i, item);
            }
        }
        Ok(())
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let array = array_of(&object)?;
        w.stream().write_len(array.items.len())?;

        let Some(shared) = Self::shared_type(&array.items) else {
            w.stream().write_i16(handle::OBJECT)?;
            for item in &array.items {
                w.write_object(item)?;
            }
            return Ok(());
        };

        let tag = w.registry().type_tag(&shared)?;
        w.write_type_tag(tag)?;
        let surrogate = w.registry().surrogate_for_tag(tag)?;
        for item in &array.items {
            surrogate.write(w, item)?;
        }
        Ok(())
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        let len = r.stream().read_len()?;
        let tag = r
            .read_type_tag()?
            .ok_or_else(|| Error::Shape("object array without element tag".into()))?;
        if tag.handle == handle::OBJECT {
            for _ in 0..len {
                r.skip_object()?;
            }
        } else {
            let surrogate = r.registry().surrogate_for_tag(tag)?;
            for _ in 0..len {
                surrogate.skip(r)?;
            }
        }
        Ok(())
    }
}

/// Arrays of a nullable value type, written sparsely:
/// `[elementHandle:i16][length:i32]([index:i32][raw value])*[-1]`.
///
/// Only non-null slots are written, in ascending index order.
pub struct NullableArraySurrogate {
    expected: Option<TypeDesc>,
}

impl NullableArraySurrogate {
    /// `expected` is the underlying value type, without the nullable wrapper.
    pub fn new(expected: Option<TypeDesc>) -> Result<Self> {
        if let Some(inner) = &expected {
            if !inner.is_value_type() {
                return Err(Error::Registration(format!("{inner}?[] needs a value type")));
            }
        }
        Ok(Self { expected })
    }

    fn inner_of(array: &ArrayObject) -> Option<&TypeDesc> {
        match &array.element {
            TypeDesc::Nullable(inner) => Some(inner),
            _ => None,
        }
    }

    fn read_header(&self, r: &mut ObjectReader<'_>) -> Result<(TypeDesc, usize)> {
        let h = r.stream().read_i16()?;
        let inner = r.registry().type_of(h)?.clone();
        if !inner.is_value_type() {
            return Err(Error::Shape(format!("nullable array over non-value type {inner}")));
        }
        if let Some(expected) = &self.expected {
            if *expected != inner {
                return Err(Error::Shape(format!(
                    "nullable array of {inner} where {expected} was declared"
                )));
            }
        }
        let len = r.stream().read_len()?;
        Ok((inner, len))
    }

    /// Walk the index/value pairs, handing each decoded slot to `visit`.
    fn read_pairs(
        r: &mut ObjectReader<'_>,
        inner: &TypeDesc,
        len: usize,
        mut visit: impl FnMut(usize, Value),
    ) -> Result<()> {
        let mut next = 0usize;
        loop {
            let index = r.stream().read_i32()?;
            if index < 0 {
                return Ok(());
            }
            let index = index as usize;
            if index >= len || index < next {
                return Err(Error::Shape(format!(
                    "sparse index {index} out of order or beyond length {len}"
                )));
            }
            next = index + 1;
            visit(index, read_raw(r.stream(), inner)?);
        }
    }
}

impl ContextSensitive for NullableArraySurrogate {
    fn describe(&self) -> String {
        match &self.expected {
            Some(e) => TypeDesc::array(TypeDesc::nullable(e.clone())).to_string(),
            None => "nullable array".into(),
        }
    }

    fn check(&self, object: &Object) -> Result<()> {
        let array = array_of(object)?;
        match (Self::inner_of(array), &self.expected) {
            (Some(inner), Some(expected)) if inner == expected => Ok(()),
            (Some(inner), None) if inner.is_value_type() => Ok(()),
            _ => Err(Error::mismatch(self.describe(), object.runtime_type())),
        }
    }

    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        let (inner, len) = self.read_header(r)?;
        r.reserve_sparse(len)?;
        Ok(new_shell(TypeDesc::nullable(inner), len))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        let inner = {
            let object = shell.borrow();
            array_of(&object).ok().and_then(Self::inner_of).cloned()
        };
        let Some(inner) = inner else {
            return Ok(());
        };
        Self::read_pairs(r, &inner, shell_len(shell), |i, v| store(shell, i, v))
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let array = array_of(&object)?;
        let inner = Self::inner_of(array)
            .ok_or_else(|| Error::mismatch(self.describe(), object.runtime_type()))?;
        let h = inner
            .builtin_handle()
            .ok_or_else(|| Error::Shape(format!("nullable array over non-value type {inner}")))?;

        w.stream().write_i16(h)?;
        w.stream().write_len(array.items.len())?;
        for (index, item) in array.items.iter().enumerate() {
            if item.is_null() {
                continue;
            }
            w.stream().write_len(index)?;
            write_raw(w.stream(), inner, item)?;
        }
        w.stream().write_i32(wire::SPARSE_END)
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        let (inner, len) = self.read_header(r)?;
        let width = raw_width(&inner)?;
        let mut next = 0usize;
        loop {
            let index = r.stream().read_i32()?;
            if index < 0 {
                return Ok(());
            }
            let index = index as usize;
            if index >= len || index < next {
                return Err(Error::Shape(format!(
                    "sparse index {index} out of order or beyond length {len}"
                )));
            }
            next = index + 1;
            r.stream().read_bytes(width)?;
        }
    }
}
