// ABOUTME: Surrogates for the generic List<T> and Dictionary<K,V> containers.
// ABOUTME: Payloads name their generic arguments, so open slots decode without prior knowledge.

use crate::error::{Error, Result};
use crate::graph::{ObjectReader, ObjectWriter};
use crate::surrogate::ContextSensitive;
use crate::types::{wire, TypeDesc};
use crate::value::{Object, ObjectRef};

fn read_arity(r: &mut ObjectReader<'_>, expected: i32, what: &str) -> Result<()> {
    let arity = r.stream().read_i32()?;
    if arity != expected {
        return Err(Error::Shape(format!(
            "{what} expects {expected} generic argument(s), stream has {arity}"
        )));
    }
    Ok(())
}

fn check_declared(declared: Option<&TypeDesc>, found: &TypeDesc) -> Result<()> {
    match declared {
        Some(d) if d != found => Err(Error::Shape(format!("{found} where {d} was declared"))),
        _ => Ok(()),
    }
}

/// `[argCount:i32 = 1][elementName][count:i32][element]*`
pub struct ListSurrogate {
    expected: Option<TypeDesc>,
}

impl ListSurrogate {
    /// `expected` is the element type of the declared list, if any.
    #[must_use]
    pub fn new(expected: Option<TypeDesc>) -> Self {
        Self { expected }
    }
}

impl ContextSensitive for ListSurrogate {
    fn describe(&self) -> String {
        match &self.expected {
            Some(e) => TypeDesc::list(e.clone()).to_string(),
            None => "List".into(),
        }
    }

    fn check(&self, object: &Object) -> Result<()> {
        let list = object
            .as_list()
            .ok_or_else(|| Error::mismatch(self.describe(), object.runtime_type()))?;
        match &self.expected {
            Some(e) if *e != list.element => {
                Err(Error::mismatch(self.describe(), object.runtime_type()))
            }
            _ => Ok(()),
        }
    }

    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        read_arity(r, wire::LIST_ARITY, "List")?;
        let element = r.read_type_name()?;
        let declared = self.expected.clone().map(TypeDesc::list);
        check_declared(declared.as_ref(), &TypeDesc::list(element.clone()))?;
        Ok(ObjectRef::list(element, Vec::new()))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        let element = shell.borrow().as_list().map(|l| l.element.clone());
        let Some(element) = element else {
            return Ok(());
        };
        let codec = r.registry().resolve(&element)?;
        let count = r.stream().read_len()?;
        for _ in 0..count {
            let item = codec.read(r)?;
            if let Some(list) = shell.borrow_mut().as_list_mut() {
                list.items.push(item);
            }
        }
        Ok(())
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let list = object
            .as_list()
            .ok_or_else(|| Error::mismatch(self.describe(), object.runtime_type()))?;
        let codec = w.registry().resolve(&list.element)?;

        w.stream().write_i32(wire::LIST_ARITY)?;
        w.write_type_name(&list.element)?;
        w.stream().write_len(list.items.len())?;
        for item in &list.items {
            codec.write(w, item)?;
        }
        Ok(())
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        read_arity(r, wire::LIST_ARITY, "List")?;
        let element = r.read_type_name()?;
        let codec = r.registry().resolve(&element)?;
        let count = r.stream().read_len()?;
        for _ in 0..count {
            codec.skip(r)?;
        }
        Ok(())
    }
}

/// `[argCount:i32 = 2][keyName][valueName][count:i32]([key][value])*`
///
/// Entries are written in insertion order. Null keys are rejected.
pub struct DictionarySurrogate {
    expected: Option<(TypeDesc, TypeDesc)>,
}

impl DictionarySurrogate {
    #[must_use]
    pub fn new(expected: Option<(TypeDesc, TypeDesc)>) -> Self {
        Self { expected }
    }

    fn declared(&self) -> Option<TypeDesc> {
        self.expected
            .as_ref()
            .map(|(k, v)| TypeDesc::dictionary(k.clone(), v.clone()))
    }
}

impl ContextSensitive for DictionarySurrogate {
    fn describe(&self) -> String {
        self.declared()
            .map_or_else(|| "Dictionary".into(), |d| d.to_string())
    }

    fn check(&self, object: &Object) -> Result<()> {
        let dict = object
            .as_dictionary()
            .ok_or_else(|| Error::mismatch(self.describe(), object.runtime_type()))?;
        match &self.expected {
            Some((k, v)) if *k != dict.key || *v != dict.value => {
                Err(Error::mismatch(self.describe(), object.runtime_type()))
            }
            _ => Ok(()),
        }
    }

    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        read_arity(r, wire::DICTIONARY_ARITY, "Dictionary")?;
        let key = r.read_type_name()?;
        let value = r.read_type_name()?;
        let found = TypeDesc::dictionary(key.clone(), value.clone());
        check_declared(self.declared().as_ref(), &found)?;
        Ok(ObjectRef::dictionary(key, value, Vec::new()))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        let types = shell
            .borrow()
            .as_dictionary()
            .map(|d| (d.key.clone(), d.value.clone()));
        let Some((key_ty, value_ty)) = types else {
            return Ok(());
        };
        let key_codec = r.registry().resolve(&key_ty)?;
        let value_codec = r.registry().resolve(&value_ty)?;
        let count = r.stream().read_len()?;
        for _ in 0..count {
            let key = key_codec.read(r)?;
            if key.is_null() {
                return Err(Error::Shape("null dictionary key".into()));
            }
            let value = value_codec.read(r)?;
            if let Some(dict) = shell.borrow_mut().as_dictionary_mut() {
                dict.entries.push((key, value));
            }
        }
        Ok(())
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let dict = object
            .as_dictionary()
            .ok_or_else(|| Error::mismatch(self.describe(), object.runtime_type()))?;
        let key_codec = w.registry().resolve(&dict.key)?;
        let value_codec = w.registry().resolve(&dict.value)?;

        w.stream().write_i32(wire::DICTIONARY_ARITY)?;
        w.write_type_name(&dict.key)?;
        w.write_type_name(&dict.value)?;
        w.stream().write_len(dict.entries.len())?;
        for (key, value) in &dict.entries {
            if key.is_null() {
                return Err(Error::Shape("null dictionary key".into()));
            }
            key_codec.write(w, key)?;
            value_codec.write(w, value)?;
        }
        Ok(())
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        read_arity(r, wire::DICTIONARY_ARITY, "Dictionary")?;
        let key_codec = {
            let key = r.read_type_name()?;
            r.registry().resolve(&key)?
        };
        let value_codec = {
            let value = r.read_type_name()?;
            r.registry().resolve(&value)?
        };
        let count = r.stream().read_len()?;
        for _ in 0..count {
            key_codec.skip(r)?;
            value_codec.skip(r)?;
        }
        Ok(())
    }
}
