// ABOUTME: Type registry: stable handle assignment, surrogate lookup and closed-type resolution.
// ABOUTME: Built once from a builder, then immutable and shareable across threads.

use crate::array::{DynamicArraySurrogate, FixedArraySurrogate, NullableArraySurrogate, ObjectArraySurrogate};
use crate::config::{RegistryConfig, TypeEntry};
use crate::error::{Error, Result};
use crate::generic::{DictionarySurrogate, ListSurrogate};
use crate::primitives::{NullableSurrogate, ObjectSurrogate, PrimitiveSurrogate, StringSurrogate, TypeSurrogate};
use crate::schema::{RecordCodec, RecordSchema};
use crate::surrogate::{Codec, Memoized, Surrogate, SurrogateRef};
use crate::types::{handle, TypeDesc, TypeHandle};
use crate::value::{ObjectRef, Record};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The type tag written ahead of a value in a polymorphic slot.
///
/// `sub_handle` is present only after [`handle::ARRAY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTag {
    pub handle: TypeHandle,
    pub sub_handle: Option<TypeHandle>,
}

impl TypeTag {
    #[must_use]
    pub const fn simple(handle: TypeHandle) -> Self {
        Self {
            handle,
            sub_handle: None,
        }
    }
}

const BUILTINS: [(TypeHandle, TypeDesc); 15] = [
    (handle::BOOL, TypeDesc::Bool),
    (handle::CHAR, TypeDesc::Char),
    (handle::I8, TypeDesc::I8),
    (handle::U8, TypeDesc::U8),
    (handle::I16, TypeDesc::I16),
    (handle::U16, TypeDesc::U16),
    (handle::I32, TypeDesc::I32),
    (handle::U32, TypeDesc::U32),
    (handle::I64, TypeDesc::I64),
    (handle::U64, TypeDesc::U64),
    (handle::F32, TypeDesc::F32),
    (handle::F64, TypeDesc::F64),
    (handle::STRING, TypeDesc::String),
    (handle::OBJECT, TypeDesc::Object),
    (handle::TYPE, TypeDesc::Type),
];

/// Reject `T?` over anything but a value type, at any depth.
fn check_nullable(desc: &TypeDesc) -> Result<()> {
    match desc {
        TypeDesc::Nullable(inner) if !inner.is_value_type() => {
            Err(Error::Registration(format!("{inner} cannot be nullable")))
        }
        TypeDesc::Array(t) | TypeDesc::List(t) | TypeDesc::Nullable(t) => check_nullable(t),
        TypeDesc::Dictionary(k, v) => {
            check_nullable(k)?;
            check_nullable(v)
        }
        _ => Ok(()),
    }
}

/// Handle assignments, indexed densely by handle.
#[derive(Debug, Clone)]
struct HandleTable {
    types: Vec<Option<TypeDesc>>,
    handles: HashMap<TypeDesc, TypeHandle>,
}

impl HandleTable {
    fn with_builtins() -> Self {
        let mut types = vec![None; handle::FIRST_USER as usize];
        let mut handles = HashMap::new();
        let object_array = TypeDesc::array(TypeDesc::Object);
        for (h, ty) in BUILTINS.iter().cloned().chain([(handle::OBJECT_ARRAY, object_array)]) {
            types[h as usize] = Some(ty.clone());
            handles.insert(ty, h);
        }
        Self { types, handles }
    }

    #[inline]
    fn get(&self, desc: &TypeDesc) -> Option<TypeHandle> {
        self.handles.get(desc).copied()
    }

    fn type_of(&self, h: TypeHandle) -> Option<&TypeDesc> {
        usize::try_from(h)
            .ok()
            .and_then(|i| self.types.get(i))
            .and_then(Option::as_ref)
    }

    fn insert(&mut self, desc: TypeDesc) -> Result<TypeHandle> {
        let h = TypeHandle::try_from(self.types.len())
            .map_err(|_| Error::Registration("type handle space exhausted".into()))?;
        self.types.push(Some(desc.clone()));
        self.handles.insert(desc, h);
        Ok(h)
    }

    fn user_types(&self) -> impl Iterator<Item = (TypeHandle, &TypeDesc)> {
        self.types
            .iter()
            .enumerate()
            .skip(handle::FIRST_USER as usize)
            .filter_map(|(i, ty)| ty.as_ref().map(|ty| (i as TypeHandle, ty)))
    }

    /// Fail if `desc` mentions a record without a handle.
    fn ensure_known(&self, desc: &TypeDesc) -> Result<()> {
        let mut missing = None;
        desc.for_each_record(&mut |name| {
            if missing.is_none() && self.get(&TypeDesc::Record(Arc::clone(name))).is_none() {
                missing = Some(name.to_string());
            }
        });
        match missing {
            Some(name) => Err(Error::UnregisteredType(name)),
            None => Ok(()),
        }
    }

    /// How a slot declared as `desc` is encoded.
    fn resolve(&self, desc: &TypeDesc) -> Result<Codec> {
        if let Some(h) = self.get(desc) {
            return Ok(Codec::Handle(h));
        }
        match desc {
            TypeDesc::Nullable(inner) => Ok(Codec::Composite(Arc::new(NullableSurrogate::new(
                (**inner).clone(),
            )?))),
            _ => self.container(desc).map(Codec::Composite),
        }
    }

    /// The surrogate for a closed container type, ignoring any handle it has.
    fn container(&self, desc: &TypeDesc) -> Result<SurrogateRef> {
        let surrogate: SurrogateRef = match desc {
            TypeDesc::Array(element) => match element.as_ref() {
                TypeDesc::Nullable(inner) => Arc::new(Memoized(NullableArraySurrogate::new(Some(
                    (**inner).clone(),
                ))?)),
                TypeDesc::Object => Arc::new(Memoized(ObjectArraySurrogate)),
                element => match self.get(element) {
                    Some(h) => Arc::new(Memoized(FixedArraySurrogate::new(
                        element.clone(),
                        Codec::Handle(h),
                    ))),
                    None => {
                        self.ensure_known(element)?;
                        Arc::new(Memoized(DynamicArraySurrogate::new(Some(element.clone()))))
                    }
                },
            },
            TypeDesc::List(element) => {
                self.ensure_known(element)?;
                Arc::new(Memoized(ListSurrogate::new(Some((**element).clone()))))
            }
            TypeDesc::Dictionary(key, value) => {
                self.ensure_known(key)?;
                self.ensure_known(value)?;
                Arc::new(Memoized(DictionarySurrogate::new(Some((
                    (**key).clone(),
                    (**value).clone(),
                )))))
            }
            other => return Err(Error::UnregisteredType(other.to_string())),
        };
        Ok(surrogate)
    }
}

/// Collects registrations and compiles them into a [`Registry`].
///
/// Registration order determines handles. Two builders fed the same
/// registrations in the same order produce registries that agree on every
/// handle, which is what makes their streams mutually readable.
#[derive(Debug)]
pub struct RegistryBuilder {
    table: HandleTable,
    schemas: HashMap<Arc<str>, Arc<RecordSchema>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: HandleTable::with_builtins(),
            schemas: HashMap::new(),
        }
    }

    /// Apply every entry of a configuration, in order.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let mut builder = Self::new();
        for entry in &config.types {
            match entry {
                TypeEntry::Record(schema) => builder.register_record(schema.clone())?,
                TypeEntry::Type { name } => builder.register(name.clone())?,
            };
        }
        Ok(builder)
    }

    /// Register a non-record type and return its handle.
    ///
    /// Built-ins and types registered earlier return their existing handle.
    /// Records must go through [`RegistryBuilder::register_record`] first.
    pub fn register(&mut self, desc: TypeDesc) -> Result<TypeHandle> {
        if let Some(h) = self.table.get(&desc) {
            return Ok(h);
        }
        match &desc {
            TypeDesc::Nullable(_) => {
                return Err(Error::Registration(format!(
                    "{desc} is a slot type, not a runtime type"
                )))
            }
            TypeDesc::Record(name) if !self.schemas.contains_key(name) => {
                return Err(Error::Registration(format!("record {name} has no schema")))
            }
            _ => {}
        }
        check_nullable(&desc)?;

        let h = self.table.insert(desc.clone())?;
        debug!(handle = h, ty = %desc, "registered type");
        Ok(h)
    }

    /// Register a type given by canonical name.
    pub fn register_name(&mut self, name: &str) -> Result<TypeHandle> {
        self.register(name.parse()?)
    }

    /// Register a record schema and return the record's handle.
    ///
    /// Field types may name records registered later; they are resolved at
    /// [`RegistryBuilder::build`].
    pub fn register_record(&mut self, schema: RecordSchema) -> Result<TypeHandle> {
        schema.validate()?;
        for field in schema.fields() {
            check_nullable(&field.ty)?;
        }
        let name = schema.name_arc();
        if let Some(existing) = self.schemas.get(&name) {
            if **existing != schema {
                return Err(Error::Registration(format!(
                    "record {name} registered twice with different fields"
                )));
            }
        } else {
            self.schemas.insert(Arc::clone(&name), Arc::new(schema));
        }
        self.register(TypeDesc::Record(name))
    }

    fn compile(&self, desc: &TypeDesc) -> Result<SurrogateRef> {
        let TypeDesc::Record(name) = desc else {
            return self
                .table
                .container(desc)
                .map_err(|err| Error::Registration(format!("{desc}: {err}")));
        };
        let schema = self
            .schemas
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Registration(format!("record {name} has no schema")))?;
        let fields = schema
            .fields()
            .iter()
            .map(|field| {
                self.table.resolve(&field.ty).map_err(|err| {
                    Error::Registration(format!("{name}.{}: {err}", field.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Memoized(RecordCodec::new(schema, fields))))
    }

    /// Compile every registration into an immutable registry.
    pub fn build(self) -> Result<Registry> {
        let mut surrogates: Vec<Option<SurrogateRef>> = vec![None; self.table.types.len()];
        for (h, ty) in &BUILTINS {
            let surrogate: SurrogateRef = match ty {
                TypeDesc::String => Arc::new(StringSurrogate),
                TypeDesc::Object => Arc::new(ObjectSurrogate),
                TypeDesc::Type => Arc::new(TypeSurrogate),
                value => Arc::new(PrimitiveSurrogate::new(value.clone())?),
            };
            surrogates[*h as usize] = Some(surrogate);
        }
        surrogates[handle::OBJECT_ARRAY as usize] = Some(Arc::new(Memoized(ObjectArraySurrogate)));

        for (h, ty) in self.table.user_types() {
            surrogates[h as usize] = Some(self.compile(ty)?);
        }

        // Polymorphic `[ARRAY][sub]` tags select these by sub-handle.
        let fixed_arrays = self
            .table
            .types
            .iter()
            .enumerate()
            .map(|(h, ty)| {
                ty.as_ref().map(|element| -> SurrogateRef {
                    Arc::new(Memoized(FixedArraySurrogate::new(
                        element.clone(),
                        Codec::Handle(h as TypeHandle),
                    )))
                })
            })
            .collect();

        let registry = Registry {
            table: self.table,
            surrogates,
            fixed_arrays,
            schemas: self.schemas,
            dynamic_array: Arc::new(Memoized(DynamicArraySurrogate::new(None))),
            nullable_array: Arc::new(Memoized(NullableArraySurrogate::new(None)?)),
            list: Arc::new(Memoized(ListSurrogate::new(None))),
            dictionary: Arc::new(Memoized(DictionarySurrogate::new(None))),
        };
        debug!(user_types = registry.len(), "registry built");
        Ok(registry)
    }
}

/// An immutable mapping between runtime types, handles and surrogates.
pub struct Registry {
    table: HandleTable,
    surrogates: Vec<Option<SurrogateRef>>,
    fixed_arrays: Vec<Option<SurrogateRef>>,
    schemas: HashMap<Arc<str>, Arc<RecordSchema>>,
    dynamic_array: SurrogateRef,
    nullable_array: SurrogateRef,
    list: SurrogateRef,
    dictionary: SurrogateRef,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("user_types", &self.table.user_types().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Number of user registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.user_types().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// User registrations in handle order.
    pub fn user_types(&self) -> impl Iterator<Item = (TypeHandle, &TypeDesc)> {
        self.table.user_types()
    }

    /// The handle registered for exactly this type, if any.
    #[must_use]
    pub fn handle_for(&self, desc: &TypeDesc) -> Option<TypeHandle> {
        self.table.get(desc)
    }

    /// The type registered under a handle.
    pub fn type_of(&self, h: TypeHandle) -> Result<&TypeDesc> {
        self.table.type_of(h).ok_or(Error::UnknownHandle(h))
    }

    /// The surrogate registered under a handle.
    pub fn surrogate(&self, h: TypeHandle) -> Result<&dyn Surrogate> {
        self.surrogate_ref(h).map(|s| s.as_ref())
    }

    fn surrogate_ref(&self, h: TypeHandle) -> Result<&SurrogateRef> {
        usize::try_from(h)
            .ok()
            .and_then(|i| self.surrogates.get(i))
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownHandle(h))
    }

    /// The surrogate for a type, synthesizing one for unregistered closed
    /// arrays, nullables, lists and dictionaries.
    pub fn surrogate_for(&self, desc: &TypeDesc) -> Result<SurrogateRef> {
        match self.table.resolve(desc)? {
            Codec::Handle(h) => self.surrogate_ref(h).cloned(),
            Codec::Composite(s) => Ok(s),
        }
    }

    /// The surrogate selected by a handle and sub-handle read from a stream.
    /// The sub-handle is ignored unless `h` is [`handle::ARRAY`].
    pub fn surrogate_for_handle(&self, h: TypeHandle, sub_handle: TypeHandle) -> Result<SurrogateRef> {
        let sub_handle = (h == handle::ARRAY).then_some(sub_handle);
        self.surrogate_for_tag(TypeTag { handle: h, sub_handle })
    }

    /// The slot codec for a statically declared type.
    pub fn resolve(&self, desc: &TypeDesc) -> Result<Codec> {
        self.table.resolve(desc)
    }

    /// The tag that announces a value of runtime type `desc` in an open slot.
    pub fn type_tag(&self, desc: &TypeDesc) -> Result<TypeTag> {
        if let Some(h) = self.table.get(desc) {
            return Ok(TypeTag::simple(h));
        }
        match desc {
            TypeDesc::Array(element) => {
                if matches!(element.as_ref(), TypeDesc::Nullable(_)) {
                    return Ok(TypeTag::simple(handle::NULLABLE_ARRAY));
                }
                let sub = match self.table.get(element) {
                    Some(h) => h,
                    None => {
                        self.table.ensure_known(element)?;
                        handle::NONE
                    }
                };
                Ok(TypeTag {
                    handle: handle::ARRAY,
                    sub_handle: Some(sub),
                })
            }
            TypeDesc::List(_) => Ok(TypeTag::simple(handle::LIST)),
            TypeDesc::Dictionary(..) => Ok(TypeTag::simple(handle::DICTIONARY)),
            other => Err(Error::UnregisteredType(other.to_string())),
        }
    }

    /// The surrogate a type tag selects.
    pub fn surrogate_for_tag(&self, tag: TypeTag) -> Result<SurrogateRef> {
        match tag.handle {
            handle::ARRAY => {
                let sub = tag.sub_handle.unwrap_or(handle::NONE);
                if sub == handle::NONE {
                    return Ok(Arc::clone(&self.dynamic_array));
                }
                usize::try_from(sub)
                    .ok()
                    .and_then(|i| self.fixed_arrays.get(i))
                    .and_then(Option::as_ref)
                    .cloned()
                    .ok_or(Error::UnknownSubHandle {
                        handle: handle::ARRAY,
                        sub_handle: sub,
                    })
            }
            handle::NULLABLE_ARRAY => Ok(Arc::clone(&self.nullable_array)),
            handle::LIST => Ok(Arc::clone(&self.list)),
            handle::DICTIONARY => Ok(Arc::clone(&self.dictionary)),
            h => self.surrogate_ref(h).cloned(),
        }
    }

    /// The schema of a registered record.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&Arc<RecordSchema>> {
        self.schemas.get(name)
    }

    /// A new instance of a registered record, every field at its default.
    pub fn new_record(&self, name: &str) -> Result<ObjectRef> {
        let schema = self
            .schema(name)
            .ok_or_else(|| Error::UnregisteredType(name.to_owned()))?;
        Ok(ObjectRef::record(Record::new(Arc::clone(schema))))
    }

    /// A configuration that rebuilds a registry with identical handles.
    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        let types = self
            .user_types()
            .filter_map(|(_, ty)| match ty {
                TypeDesc::Record(name) => self
                    .schemas
                    .get(name)
                    .map(|schema| TypeEntry::Record((**schema).clone())),
                other => Some(TypeEntry::Type { name: other.clone() }),
            })
            .collect();
        RegistryConfig { types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> RecordSchema {
        RecordSchema::new("Node")
            .field("value", TypeDesc::I32)
            .field("next", TypeDesc::record("Node"))
    }

    #[test]
    fn test_registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }

    #[test]
    fn test_builtin_handles_are_fixed() {
        let registry = Registry::builder().build().unwrap();
        assert_eq!(registry.handle_for(&TypeDesc::String), Some(handle::STRING));
        assert_eq!(registry.handle_for(&TypeDesc::array(TypeDesc::Object)), Some(handle::OBJECT_ARRAY));
        assert_eq!(registry.type_of(handle::F64).unwrap(), &TypeDesc::F64);
        assert!(registry.is_empty());
        assert!(matches!(registry.type_of(handle::LIST), Err(Error::UnknownHandle(_))));
        assert!(matches!(registry.type_of(-3), Err(Error::UnknownHandle(-3))));
    }

    #[test]
    fn test_registration_order_assigns_handles() {
        let mut builder = Registry::builder();
        assert_eq!(builder.register_record(node()).unwrap(), handle::FIRST_USER);
        assert_eq!(builder.register_name("Node[]").unwrap(), handle::FIRST_USER + 1);
        // Idempotent.
        assert_eq!(builder.register_record(node()).unwrap(), handle::FIRST_USER);
        assert_eq!(builder.register(TypeDesc::I32).unwrap(), handle::I32);
        let registry = builder.build().unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registration_errors() {
        let mut builder = Registry::builder();
        assert!(matches!(builder.register(TypeDesc::record("Ghost")), Err(Error::Registration(_))));
        assert!(matches!(builder.register_name("i32?"), Err(Error::Registration(_))));
        assert!(builder
            .register(TypeDesc::array(TypeDesc::nullable(TypeDesc::String)))
            .is_err());

        builder.register_record(node()).unwrap();
        let other = RecordSchema::new("Node").field("value", TypeDesc::I64);
        assert!(matches!(builder.register_record(other), Err(Error::Registration(_))));
    }

    #[test]
    fn test_unresolvable_field_fails_build() {
        let mut builder = Registry::builder();
        builder
            .register_record(RecordSchema::new("Holder").field("inner", TypeDesc::record("Missing")))
            .unwrap();
        assert!(matches!(builder.build(), Err(Error::Registration(_))));

        let mut builder = Registry::builder();
        builder.register_name("List<Missing>").unwrap();
        assert!(matches!(builder.build(), Err(Error::Registration(_))));
    }

    #[test]
    fn test_type_tags() {
        let mut builder = Registry::builder();
        let node_handle = builder.register_record(node()).unwrap();
        let registry = builder.build().unwrap();

        let tag = |s: &str| registry.type_tag(&s.parse().unwrap()).unwrap();
        assert_eq!(tag("Node"), TypeTag::simple(node_handle));
        assert_eq!(tag("Node[]"), TypeTag { handle: handle::ARRAY, sub_handle: Some(node_handle) });
        assert_eq!(tag("Node[][]"), TypeTag { handle: handle::ARRAY, sub_handle: Some(handle::NONE) });
        assert_eq!(tag("f32?[]"), TypeTag::simple(handle::NULLABLE_ARRAY));
        assert_eq!(tag("List<Node>"), TypeTag::simple(handle::LIST));
        assert_eq!(tag("Dictionary<string,object>"), TypeTag::simple(handle::DICTIONARY));

        assert!(matches!(
            registry.type_tag(&TypeDesc::record("Other")),
            Err(Error::UnregisteredType(_))
        ));
        assert!(matches!(
            registry.type_tag(&"Other[][]".parse().unwrap()),
            Err(Error::UnregisteredType(_))
        ));
    }

    #[test]
    fn test_surrogate_lookup_by_handle() {
        let registry = Registry::builder().build().unwrap();
        assert!(registry.surrogate_for_handle(handle::I32, 0).is_ok());
        assert!(registry.surrogate_for_handle(handle::ARRAY, handle::U8).is_ok());
        assert!(registry.surrogate_for_handle(handle::LIST, 0).is_ok());
        assert!(matches!(
            registry.surrogate_for_handle(handle::ARRAY, 77),
            Err(Error::UnknownSubHandle { handle: handle::ARRAY, sub_handle: 77 })
        ));
        assert!(matches!(registry.surrogate_for_handle(999, 0), Err(Error::UnknownHandle(999))));
        assert!(registry.surrogate_for(&"Dictionary<i32,string[]>".parse().unwrap()).is_ok());
        assert!(registry.surrogate_for(&TypeDesc::record("Nope")).is_err());
    }

    #[test]
    fn test_fixed_array_surrogates_are_shared() {
        let mut builder = Registry::builder();
        let node_handle = builder.register_record(node()).unwrap();
        let registry = builder.build().unwrap();

        for sub in [handle::U8, handle::STRING, node_handle] {
            let a = registry.surrogate_for_handle(handle::ARRAY, sub).unwrap();
            let b = registry.surrogate_for_handle(handle::ARRAY, sub).unwrap();
            assert!(Arc::ptr_eq(&a, &b), "sub-handle {sub}");
        }
        assert!(matches!(
            registry.surrogate_for_handle(handle::ARRAY, -3),
            Err(Error::UnknownSubHandle { sub_handle: -3, .. })
        ));
        assert!(matches!(
            registry.surrogate_for_handle(handle::ARRAY, node_handle + 1),
            Err(Error::UnknownSubHandle { .. })
        ));
    }

    #[test]
    fn test_config_rebuilds_identical_handles() {
        let mut builder = Registry::builder();
        builder.register_name("i64[]").unwrap();
        builder.register_record(node()).unwrap();
        builder.register_name("List<Node>").unwrap();
        let registry = builder.build().unwrap();

        let rebuilt = RegistryBuilder::from_config(&registry.config()).unwrap().build().unwrap();
        let a: Vec<_> = registry.user_types().map(|(h, t)| (h, t.clone())).collect();
        let b: Vec<_> = rebuilt.user_types().map(|(h, t)| (h, t.clone())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_new_record() {
        let mut builder = Registry::builder();
        builder.register_record(node()).unwrap();
        let registry = builder.build().unwrap();
        let obj = registry.new_record("Node").unwrap();
        assert_eq!(obj.borrow().as_record().unwrap().get("value"), Some(&crate::Value::I32(0)));
        assert!(registry.new_record("Edge").is_err());
    }
}
