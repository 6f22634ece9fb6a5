// ABOUTME: Dynamic object-graph model: scalar values plus identity-bearing heap objects.
// ABOUTME: Objects live behind shared RefCell handles so shared and cyclic graphs are expressible.

use crate::error::{Error, Result};
use crate::schema::RecordSchema;
use crate::types::TypeDesc;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A value in an object graph.
///
/// Scalars, strings and type values are plain data. Records, arrays, lists and
/// dictionaries are [`ObjectRef`]s: cloning a `Value::Object` shares the object,
/// and equality on objects is identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Type(TypeDesc),
    Object(ObjectRef),
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The runtime type of this value, or `None` for null.
    #[must_use]
    pub fn runtime_type(&self) -> Option<TypeDesc> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => TypeDesc::Bool,
            Value::Char(_) => TypeDesc::Char,
            Value::I8(_) => TypeDesc::I8,
            Value::U8(_) => TypeDesc::U8,
            Value::I16(_) => TypeDesc::I16,
            Value::U16(_) => TypeDesc::U16,
            Value::I32(_) => TypeDesc::I32,
            Value::U32(_) => TypeDesc::U32,
            Value::I64(_) => TypeDesc::I64,
            Value::U64(_) => TypeDesc::U64,
            Value::F32(_) => TypeDesc::F32,
            Value::F64(_) => TypeDesc::F64,
            Value::String(_) => TypeDesc::String,
            Value::Type(_) => TypeDesc::Type,
            Value::Object(obj) => obj.runtime_type(),
        };
        Some(ty)
    }

    /// Human-readable type name, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.runtime_type()
            .map_or_else(|| "null".to_owned(), |t| t.to_string())
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_type(&self) -> Option<&TypeDesc> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    char => Char,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    TypeDesc => Type,
    ObjectRef => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl TypeDesc {
    /// The value a freshly constructed slot of this type holds.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::Char => Value::Char('\0'),
            TypeDesc::I8 => Value::I8(0),
            TypeDesc::U8 => Value::U8(0),
            TypeDesc::I16 => Value::I16(0),
            TypeDesc::U16 => Value::U16(0),
            TypeDesc::I32 => Value::I32(0),
            TypeDesc::U32 => Value::U32(0),
            TypeDesc::I64 => Value::I64(0),
            TypeDesc::U64 => Value::U64(0),
            TypeDesc::F32 => Value::F32(0.0),
            TypeDesc::F64 => Value::F64(0.0),
            _ => Value::Null,
        }
    }
}

/// A shared handle to a heap object. Equality and hashing are by identity.
///
/// Handles are reference counted, so a cyclic graph keeps itself alive after
/// the last outside handle is dropped. Call [`ObjectRef::release_graph`] on a
/// cyclic graph, decoded or built by hand, once it is no longer needed.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    /// Create an array object from its element type and items.
    pub fn array(element: TypeDesc, items: Vec<Value>) -> Self {
        Self::new(Object::Array(ArrayObject { element, items }))
    }

    /// Create a list object from its element type and items.
    pub fn list(element: TypeDesc, items: Vec<Value>) -> Self {
        Self::new(Object::List(ListObject { element, items }))
    }

    /// Create a dictionary object from its key/value types and entries.
    pub fn dictionary(key: TypeDesc, value: TypeDesc, entries: Vec<(Value, Value)>) -> Self {
        Self::new(Object::Dictionary(DictionaryObject { key, value, entries }))
    }

    /// Create a record object.
    pub fn record(record: Record) -> Self {
        Self::new(Object::Record(record))
    }

    /// Immutably borrow the object. Panics if it is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    /// Mutably borrow the object. Panics if it is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    /// True if both handles point at the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Unlink every object reachable from this one so the graph can be freed.
    ///
    /// Every object-valued record field, array slot, list item and dictionary
    /// entry in the graph is cleared; scalar contents stay in place. Panics if
    /// any reachable object is borrowed.
    pub fn release_graph(&self) {
        let mut seen = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(obj) = pending.pop() {
            if seen.insert(obj.addr()) {
                obj.0.borrow_mut().take_links(&mut pending);
            }
        }
    }

    /// Identity key for memoization tables.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// The runtime type of the referenced object.
    #[must_use]
    pub fn runtime_type(&self) -> TypeDesc {
        self.0.borrow().runtime_type()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl std::hash::Hash for ObjectRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never recurse into the object: graphs may be cyclic.
        match self.0.try_borrow() {
            Ok(obj) => write!(f, "ObjectRef({} @ {:#x})", obj.runtime_type(), self.addr()),
            Err(_) => write!(f, "ObjectRef(<borrowed> @ {:#x})", self.addr()),
        }
    }
}

/// A heap object with identity.
#[derive(Debug)]
pub enum Object {
    Record(Record),
    Array(ArrayObject),
    List(ListObject),
    Dictionary(DictionaryObject),
}

fn take_link(slot: &mut Value, out: &mut Vec<ObjectRef>) {
    if matches!(slot, Value::Object(_)) {
        if let Value::Object(obj) = std::mem::take(slot) {
            out.push(obj);
        }
    }
}

impl Object {
    /// Move every object reference held directly by this object into `out`.
    fn take_links(&mut self, out: &mut Vec<ObjectRef>) {
        match self {
            Object::Record(r) => r.fields.iter_mut().for_each(|v| take_link(v, out)),
            Object::Array(a) => a.items.iter_mut().for_each(|v| take_link(v, out)),
            Object::List(l) => l.items.drain(..).for_each(|mut v| take_link(&mut v, out)),
            Object::Dictionary(d) => {
                for (mut k, mut v) in d.entries.drain(..) {
                    take_link(&mut k, out);
                    take_link(&mut v, out);
                }
            }
        }
    }

    #[must_use]
    pub fn runtime_type(&self) -> TypeDesc {
        match self {
            Object::Record(r) => TypeDesc::Record(r.schema.name_arc()),
            Object::Array(a) => TypeDesc::array(a.element.clone()),
            Object::List(l) => TypeDesc::list(l.element.clone()),
            Object::Dictionary(d) => TypeDesc::dictionary(d.key.clone(), d.value.clone()),
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Object::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Object::Record(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayObject> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayObject> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ListObject> {
        match self {
            Object::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ListObject> {
        match self {
            Object::List(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dictionary(&self) -> Option<&DictionaryObject> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dictionary_mut(&mut self) -> Option<&mut DictionaryObject> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

/// An instance of a registered record type. Fields are stored in schema order.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<RecordSchema>,
    fields: Vec<Value>,
}

impl Record {
    /// Create a record with every field at its type's default value.
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        let fields = schema.fields().iter().map(|f| f.ty.default_value()).collect();
        Self { schema, fields }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Field values in schema order.
    #[must_use]
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Look up a field by name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema.field_index(field).map(|i| &self.fields[i])
    }

    /// Set a field by name.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let index = self
            .schema
            .field_index(field)
            .ok_or_else(|| Error::Shape(format!("record {} has no field {field}", self.name())))?;
        self.fields[index] = value.into();
        Ok(())
    }

    /// Set a field by schema position.
    pub(crate) fn set_at(&mut self, index: usize, value: Value) {
        self.fields[index] = value;
    }
}

/// An array with a fixed element type.
#[derive(Debug, Clone)]
pub struct ArrayObject {
    pub element: TypeDesc,
    pub items: Vec<Value>,
}

impl ArrayObject {
    /// Allocate an array of `len` default-valued slots.
    #[must_use]
    pub fn with_len(element: TypeDesc, len: usize) -> Self {
        let items = vec![element.default_value(); len];
        Self { element, items }
    }
}

/// A generic list, in insertion order.
#[derive(Debug, Clone)]
pub struct ListObject {
    pub element: TypeDesc,
    pub items: Vec<Value>,
}

/// A generic dictionary, in insertion order.
#[derive(Debug, Clone)]
pub struct DictionaryObject {
    pub key: TypeDesc,
    pub value: TypeDesc,
    pub entries: Vec<(Value, Value)>,
}

impl DictionaryObject {
    /// Look up the value stored under a key.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace an entry, returning the previous value.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_types() {
        assert_eq!(Value::from(5i32).runtime_type(), Some(TypeDesc::I32));
        assert_eq!(Value::from("x").runtime_type(), Some(TypeDesc::String));
        assert_eq!(Value::Null.runtime_type(), None);
        assert_eq!(Value::from(None::<i32>), Value::Null);

        let arr = ObjectRef::array(TypeDesc::I32, vec![Value::I32(1)]);
        assert_eq!(arr.runtime_type(), TypeDesc::array(TypeDesc::I32));
        let dict = ObjectRef::dictionary(TypeDesc::String, TypeDesc::Object, Vec::new());
        assert_eq!(Value::from(dict).type_name(), "Dictionary<string,object>");
    }

    #[test]
    fn test_object_identity() {
        let a = ObjectRef::list(TypeDesc::I32, Vec::new());
        let b = ObjectRef::list(TypeDesc::I32, Vec::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(Value::Object(a.clone()), Value::Object(b));
    }

    #[test]
    fn test_dictionary_insert_replaces() {
        let mut d = DictionaryObject {
            key: TypeDesc::String,
            value: TypeDesc::I32,
            entries: Vec::new(),
        };
        assert_eq!(d.insert("a".into(), 1.into()), None);
        assert_eq!(d.insert("b".into(), 2.into()), None);
        assert_eq!(d.insert("a".into(), 3.into()), Some(Value::I32(1)));
        assert_eq!(d.len(), 2);
        assert_eq!(d.get(&"a".into()), Some(&Value::I32(3)));
        assert_eq!(d.entries[0].0, Value::from("a"));
    }

    #[test]
    fn test_array_defaults() {
        let a = ArrayObject::with_len(TypeDesc::I16, 3);
        assert_eq!(a.items, vec![Value::I16(0); 3]);
        let a = ArrayObject::with_len(TypeDesc::nullable(TypeDesc::I16), 2);
        assert_eq!(a.items, vec![Value::Null; 2]);
    }

    #[test]
    fn test_release_graph_frees_cycle() {
        let schema = Arc::new(
            RecordSchema::new("Node")
                .field("value", TypeDesc::I32)
                .field("next", TypeDesc::record("Node")),
        );
        let a = ObjectRef::record(Record::new(schema.clone()));
        let b = ObjectRef::record(Record::new(schema));
        a.borrow_mut().as_record_mut().unwrap().set("value", 1).unwrap();
        a.borrow_mut().as_record_mut().unwrap().set("next", b.clone()).unwrap();
        b.borrow_mut().as_record_mut().unwrap().set("next", a.clone()).unwrap();
        let entries = vec![(Value::Object(a.clone()), Value::Object(b.clone()))];
        let dict = ObjectRef::dictionary(TypeDesc::Object, TypeDesc::Object, entries);
        let weak_a = Rc::downgrade(&a.0);
        let weak_b = Rc::downgrade(&b.0);

        a.release_graph();
        assert_eq!(a.borrow().as_record().unwrap().get("value"), Some(&Value::I32(1)));
        assert!(a.borrow().as_record().unwrap().get("next").unwrap().is_null());

        dict.release_graph();
        assert!(dict.borrow().as_dictionary().unwrap().is_empty());
        drop((a, b));
        assert!(weak_a.upgrade().is_none());
        assert!(weak_b.upgrade().is_none());
    }

    #[test]
    fn test_debug_does_not_recurse() {
        let list = ObjectRef::list(TypeDesc::Object, Vec::new());
        list.borrow_mut()
            .as_list_mut()
            .unwrap()
            .items
            .push(Value::Object(list.clone()));
        let text = format!("{list:?}");
        assert!(text.starts_with("ObjectRef(List<object>"));
    }
}
