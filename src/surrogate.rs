// ABOUTME: The surrogate contract and the reference-memoization protocol built on top of it.
// ABOUTME: Memoized<S> turns payload-only codecs into identity-preserving, cycle-safe ones.

use crate::context::CookieLookup;
use crate::error::{Error, Result};
use crate::graph::{ObjectReader, ObjectWriter};
use crate::types::{wire, TypeHandle};
use crate::value::{Object, ObjectRef, Value};
use std::sync::Arc;
use tracing::trace;

/// A per-type codec plugged into the registry.
///
/// Surrogates hold no per-graph state and are shared by every encode and
/// decode running against the same registry.
pub trait Surrogate: Send + Sync {
    /// Write `value` into a slot of this surrogate's type.
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()>;

    /// Read a value previously written by [`Surrogate::write`].
    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value>;

    /// Consume a value without materializing it.
    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()>;
}

/// A shared surrogate.
pub type SurrogateRef = Arc<dyn Surrogate>;

/// Payload-only codec for heap objects, ignorant of identity tracking.
///
/// Wrap in [`Memoized`] to obtain a [`Surrogate`].
pub trait ContextSensitive: Send + Sync {
    /// Human-readable name of the type this codec handles.
    fn describe(&self) -> String;

    /// Verify that `object` has the shape this codec writes and reads.
    fn check(&self, object: &Object) -> Result<()>;

    /// Read whatever header is needed and allocate an unpopulated shell.
    fn instantiate(&self, r: &mut ObjectReader<'_>) -> Result<ObjectRef>;

    /// Populate a shell that is already registered under its cookie.
    fn read_direct(&self, r: &mut ObjectReader<'_>, shell: &ObjectRef) -> Result<()>;

    /// Write the full payload, header included.
    fn write_direct(&self, w: &mut ObjectWriter<'_>, object: &ObjectRef) -> Result<()>;

    /// Consume the full payload, header included.
    fn skip_direct(&self, r: &mut ObjectReader<'_>) -> Result<()>;
}

/// The reference-memoization protocol: `[cookie:i32][payload on first occurrence]`.
///
/// A cookie is recorded before the payload is written, and a shell is
/// registered before its payload is read, so a payload that reaches back to
/// its own object resolves to the cookie instead of recursing.
pub struct Memoized<S>(pub S);

impl<S: ContextSensitive> Memoized<S> {
    fn read_new(&self, r: &mut ObjectReader<'_>, cookie: i32) -> Result<ObjectRef> {
        let shell = self.0.instantiate(r)?;
        r.context().register(shell.clone());
        trace!(cookie, ty = %self.0.describe(), "materializing object");
        self.0.read_direct(r, &shell)?;
        Ok(shell)
    }
}

impl<S: ContextSensitive> Surrogate for Memoized<S> {
    fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        let object = match value {
            Value::Null => return w.stream().write_i32(wire::NULL_COOKIE),
            Value::Object(object) => object,
            other => return Err(Error::mismatch(self.0.describe(), other.type_name())),
        };

        // Back-references are checked too: the reader checks every cookie it resolves.
        self.0.check(&object.borrow())?;
        if let Some(cookie) = w.context().lookup(object) {
            trace!(cookie, "back-reference");
            return w.stream().write_i32(cookie);
        }

        let cookie = w.context().assign(object)?;
        trace!(cookie, ty = %self.0.describe(), "new object");
        w.stream().write_i32(cookie)?;

        w.enter()?;
        let result = self.0.write_direct(w, object);
        w.leave();
        result
    }

    fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        let cookie = r.stream().read_i32()?;
        if cookie == wire::NULL_COOKIE {
            return Ok(Value::Null);
        }

        match r.context().lookup(cookie)? {
            CookieLookup::Known(object) => {
                self.0.check(&object.borrow())?;
                Ok(Value::Object(object))
            }
            CookieLookup::Skipped => Err(Error::SkippedReference(cookie)),
            CookieLookup::New => {
                r.enter()?;
                let result = self.read_new(r, cookie);
                r.leave();
                result.map(Value::Object)
            }
        }
    }

    fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        let cookie = r.stream().read_i32()?;
        if cookie == wire::NULL_COOKIE {
            return Ok(());
        }

        match r.context().lookup(cookie)? {
            CookieLookup::Known(_) | CookieLookup::Skipped => Ok(()),
            CookieLookup::New => {
                r.context().register_skipped();
                r.enter()?;
                let result = self.0.skip_direct(r);
                r.leave();
                result
            }
        }
    }
}

/// How a slot of a statically known type is encoded, resolved once up front.
///
/// Registered types are referenced by handle, which keeps self-referential
/// record types from forming reference cycles between surrogates.
#[derive(Clone)]
pub enum Codec {
    Handle(TypeHandle),
    Composite(SurrogateRef),
}

impl Codec {
    pub fn write(&self, w: &mut ObjectWriter<'_>, value: &Value) -> Result<()> {
        match self {
            Codec::Handle(h) => w.registry().surrogate(*h)?.write(w, value),
            Codec::Composite(s) => s.write(w, value),
        }
    }

    pub fn read(&self, r: &mut ObjectReader<'_>) -> Result<Value> {
        match self {
            Codec::Handle(h) => r.registry().surrogate(*h)?.read(r),
            Codec::Composite(s) => s.read(r),
        }
    }

    pub fn skip(&self, r: &mut ObjectReader<'_>) -> Result<()> {
        match self {
            Codec::Handle(h) => r.registry().surrogate(*h)?.skip(r),
            Codec::Composite(s) => s.skip(r),
        }
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Handle(h) => write!(f, "Codec::Handle({h})"),
            Codec::Composite(_) => f.write_str("Codec::Composite"),
        }
    }
}
