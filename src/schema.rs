// ABOUTME: Record schemas and the codecs compiled from them at registry build time.
// ABOUTME: A compiled record codec resolves every field once and never inspects types per value.

use crate::error::{Error, Result};
use crate::graph::{ObjectReader, ObjectWriter};
use crate::surrogate::{Codec, ContextSensitive};
use crate::types::{is_valid_record_name, TypeDesc};
use crate::value::{Object, ObjectRef, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One declared field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDesc,
}

/// The declared shape of a record type: a name and ordered, typed fields.
///
/// Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    name: Arc<str>,
    #[serde(default)]
    fields: Vec<FieldDecl>,
}

impl RecordSchema {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
        });
        self
    }

    /// Append a field whose type is given by canonical name.
    pub fn try_field(self, name: impl Into<String>, ty: &str) -> Result<Self> {
        Ok(self.field(name, ty.parse()?))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The type descriptor naming this record.
    #[must_use]
    pub fn type_desc(&self) -> TypeDesc {
        TypeDesc::Record(self.name_arc())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !is_valid_record_name(&self.name) {
            return Err(Error::Registration(format!("invalid record name {:?}", self.name)));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::Registration(format!("{}: empty field name", self.name)));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Registration(format!(
                    "{}: duplicate field {}",
                    self.name, field.name
                )));
            }
            if let TypeDesc::Nullable(inner) = &field.ty {
                if !inner.is_value_type() {
                    return Err(Error::Registration(format!(
                        "{}.{}: {} is not nullable",
                        self.name, field.name, inner
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Build a [`RecordSchema`] from field names and canonical type names.
///
/// ```
/// use graphcodec::record_schema;
///
/// let node = record_schema!(Node { value: "i32", next: "Node" }).unwrap();
/// assert_eq!(node.fields().len(), 2);
/// ```
#[macro_export]
macro_rules! record_schema {
    ($name:ident { $($field:ident : $ty:expr),* $(,)? }) => {
        (|| -> $crate::Result<$crate::RecordSchema> {
            #[allow(unused_mut)]
            let mut schema = $crate::RecordSchema::new(stringify!($name));
            $(
                schema = schema.try_field(stringify!($field), $ty)?;
            )*
            Ok(schema)
        })()
    };
}

/// Encode/decode routine compiled from a record schema.
///
/// Field codecs are resolved once against the registry's handle table. Fields
/// of registered types are referenced by handle, so self-referential records
/// compile without creating codec cycles.
pub struct RecordCodec {
    schema: Arc<RecordSchema>,
    fields: Vec<Codec>,
}

impl RecordCodec {
    pub(crate) fn new(schema: Arc<RecordSchema>, fields: Vec<Codec>) -> Self {
        Self { schema, fields }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// A fresh instance with every field at its default.
    #[must_use]
    pub fn new_record(&self) -> Record {
        Record::new(Arc::clone(&self.schema))
    }
}

impl ContextSensitive for RecordCodec {
    fn describe(&self) -> String {
        self.schema.name().to_owned()
    }

    fn check(&self, object: &Object) -> Result<()> {
        match object.as_record() {
            Some(r) if Arc::ptr_eq(r.schema(), &self.schema) || **r.schema() == *self.schema => Ok(()),
            _ => Err(Error::mismatch(self.schema.name(), object.runtime_type())),
        }
    }

    fn instantiate(&self, _r: &mut ObjectReader<'_>) -> Result<ObjectRef> {
        Ok(ObjectRef::record(self.new_record()))
    }

    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()> {
        for (index, codec) in self.fields.iter().enumerate() {
            let value = codec.read(r)?;
            if let Some(record) = shell.borrow_mut().as_record_mut() {
                record.set_at(index, value);
            }
        }
        Ok(())
    }

    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()> {
        let object = object.borrow();
        let record = object
            .as_record()
            .ok_or_else(|| Error::mismatch(self.schema.name(), object.runtime_type()))?;
        for (codec, value) in self.fields.iter().zip(record.fields()) {
            codec.write(w, value)?;
        }
        Ok(())
    }

    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        for codec in &self.fields {
            codec.skip(r)?;
        }
        Ok(())
    }
}
