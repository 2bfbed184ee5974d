//! Type registry
//!
//! Every kind of value, built-in or added by an extension module, is
//! described by a [`TypeDescriptor`]: a code, a display name and a
//! [`TypeOps`] implementation. Descriptors live in a fixed number of hash
//! buckets keyed by `code % TYPE_HASH_SIZE`; within a bucket the most
//! recently registered descriptor is found first.
//!
//! Registrations are never removed. Looking up a code that was never
//! registered means a value was forged or memory is corrupt, so
//! [`TypeRegistry::get_type`] panics rather than returning an error.

use crate::dispatch::{Stream, type_equal};
use crate::heap::Heap;
use crate::mark::{Marker, SweepContext};
use cellmem_core::{MAX_WIDE_TYPES, TypeCode, Value};
use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::rc::Rc;

/// Number of hash buckets
pub const TYPE_HASH_SIZE: usize = 32;

/// Operations a type plugs into the heap
///
/// Every method has a default, so a type implements only what it needs.
pub trait TypeOps {
    /// Order two values whose first operand has this type.
    /// `Equal` means equal; any other result means not equal.
    fn compare(&self, _heap: &Heap, a: Value, b: Value) -> Ordering {
        type_equal(a, b)
    }

    /// Write the human-readable form
    fn princ(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        write!(stream, "#<{}>", heap.type_name(value))
    }

    /// Write the machine-readable form
    fn print(&self, heap: &mut Heap, stream: &mut Stream<'_>, value: Value) -> fmt::Result {
        self.princ(heap, stream, value)
    }

    /// Release every unmarked instance this type owns
    fn sweep(&self, _ctx: &mut SweepContext<'_>) {}

    /// Mark type-global state not reachable through ordinary values
    fn mark_type(&self, _marker: &mut Marker<'_>) {}

    /// Mark the values owned by one instance
    fn mark(&self, _marker: &mut Marker<'_>, _value: Value) {}

    /// Enter a dynamic binding of `value`; the returned handle is given back
    /// to `unbind`
    fn bind(&self, _heap: &mut Heap, _value: Value) -> Value {
        Value::Null
    }

    /// Leave a dynamic binding entered by `bind`
    fn unbind(&self, _heap: &mut Heap, _value: Value, _handle: Value) {}
}

/// A registered type
#[derive(Clone)]
pub struct TypeDescriptor {
    pub code: TypeCode,
    pub name: String,
    pub ops: Rc<dyn TypeOps>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("code", &self.code)
            .field("name", &self.name)
            .finish()
    }
}

#[inline]
fn bucket_of(code: TypeCode) -> usize {
    code.raw() as usize % TYPE_HASH_SIZE
}

/// Code-keyed table of type descriptors
pub struct TypeRegistry {
    buckets: Vec<Vec<TypeDescriptor>>,
    next_wide: usize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            buckets: (0..TYPE_HASH_SIZE).map(|_| Vec::new()).collect(),
            next_wide: 0,
        }
    }

    /// Install a descriptor under `code`
    pub fn register_type(&mut self, code: TypeCode, name: &str, ops: Rc<dyn TypeOps>) {
        if self.find_type(code).is_some() {
            tracing::warn!("type code {} registered again as {}", code, name);
        }
        tracing::debug!("registered type {} ({})", name, code);
        // Newest first within the bucket
        self.buckets[bucket_of(code)].insert(
            0,
            TypeDescriptor {
                code,
                name: name.to_string(),
                ops,
            },
        );
    }

    /// Allocate the next extension type code and register it
    ///
    /// # Panics
    /// Panics once all 256 extension codes are in use.
    pub fn register_new_type(&mut self, name: &str, ops: Rc<dyn TypeOps>) -> TypeCode {
        assert!(
            self.next_wide < MAX_WIDE_TYPES,
            "cannot register type {}: all {} extension type codes are in use",
            name,
            MAX_WIDE_TYPES
        );
        let code = TypeCode::wide(self.next_wide as u8);
        self.next_wide += 1;
        self.register_type(code, name, ops);
        code
    }

    /// Look up a descriptor
    ///
    /// # Panics
    /// Panics if `code` was never registered.
    pub fn get_type(&self, code: TypeCode) -> &TypeDescriptor {
        match self.find_type(code) {
            Some(t) => t,
            None => panic!("no type registered for code {}", code),
        }
    }

    /// Look up a descriptor without treating a miss as fatal
    pub fn find_type(&self, code: TypeCode) -> Option<&TypeDescriptor> {
        self.buckets[bucket_of(code)].iter().find(|t| t.code == code)
    }

    /// Extension codes handed out so far
    pub fn wide_types(&self) -> usize {
        self.next_wide
    }

    /// Every descriptor in bucket order, newest first within a bucket
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> + '_ {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    /// Descriptors that lookups resolve to; shadowed registrations are
    /// skipped so no pool is swept twice
    pub fn active(&self) -> impl Iterator<Item = &TypeDescriptor> + '_ {
        self.iter().filter(|t| {
            self.find_type(t.code)
                .is_some_and(|found| std::ptr::eq(found, *t))
        })
    }
}
