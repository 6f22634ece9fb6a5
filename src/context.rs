// ABOUTME: Per-operation identity memoization: object-to-cookie on write, cookie-to-object on read.
// ABOUTME: A context lives for exactly one encode or decode call and is never shared.

use crate::error::{Error, Result};
use crate::value::ObjectRef;
use std::collections::HashMap;

/// Write-side memoization table.
///
/// Cookies are assigned in first-encounter order starting at zero. The table
/// is keyed by object address, which is stable because the graph being encoded
/// is borrowed for the whole operation.
#[derive(Debug, Default)]
pub struct WriteContext {
    cookies: HashMap<usize, i32>,
    next: i32,
}

impl WriteContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cookie already assigned to this object, if any.
    #[must_use]
    pub fn lookup(&self, object: &ObjectRef) -> Option<i32> {
        self.cookies.get(&object.addr()).copied()
    }

    /// Assign the next cookie to an object not seen before.
    pub fn assign(&mut self, object: &ObjectRef) -> Result<i32> {
        let cookie = self.next;
        self.next = self
            .next
            .checked_add(1)
            .ok_or_else(|| Error::Shape("too many objects in one graph".into()))?;
        self.cookies.insert(object.addr(), cookie);
        Ok(cookie)
    }

    /// Number of distinct objects emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// What a cookie read from the stream refers to.
#[derive(Debug)]
pub enum CookieLookup {
    /// An object already materialized in this operation.
    Known(ObjectRef),
    /// An object whose payload was skipped.
    Skipped,
    /// The next new cookie; its payload follows.
    New,
}

/// Read-side memoization table, indexed densely by cookie.
#[derive(Debug, Default)]
pub struct ReadContext {
    objects: Vec<Option<ObjectRef>>,
}

impl ReadContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a non-null cookie.
    ///
    /// A writer assigns cookies in order, so a new cookie must be exactly the
    /// next index. Anything larger means the stream is corrupt.
    pub fn lookup(&self, cookie: i32) -> Result<CookieLookup> {
        let index = usize::try_from(cookie).map_err(|_| Error::InvalidCookie(cookie))?;
        match index.cmp(&self.objects.len()) {
            std::cmp::Ordering::Less => Ok(match &self.objects[index] {
                Some(obj) => CookieLookup::Known(obj.clone()),
                None => CookieLookup::Skipped,
            }),
            std::cmp::Ordering::Equal => Ok(CookieLookup::New),
            std::cmp::Ordering::Greater => Err(Error::InvalidCookie(cookie)),
        }
    }

    /// Register a shell under the next cookie, before its payload is read.
    pub fn register(&mut self, shell: ObjectRef) {
        self.objects.push(Some(shell));
    }

    /// Reserve the next cookie for an object that is being skipped.
    pub fn register_skipped(&mut self) {
        self.objects.push(None);
    }

    /// Number of cookies seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
