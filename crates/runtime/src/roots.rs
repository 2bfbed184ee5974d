//! Root protection
//!
//! Native code that holds values across anything that may collect pins them
//! here. Three root sets exist:
//!
//! - single values, pushed and popped in strict LIFO order ([`Root`])
//! - arrays of values such as argument lists ([`ArrayRoot`]), same discipline
//! - static values with process lifetime ([`StaticRoot`]), never removed
//!
//! The slots are owned by the heap. A token identifies its slot and is
//! consumed when the slot is popped, so a token can be popped at most once;
//! popping out of order is a programming error and panics.

use crate::heap::Heap;
use cellmem_core::Value;

/// Initial capacity of the static root table
pub const INITIAL_STATIC_ROOTS: usize = 256;

/// Token for a protected single value
#[derive(Debug)]
#[must_use = "a protected value must be unprotected"]
pub struct Root {
    depth: usize,
}

/// Token for a protected array of values
#[derive(Debug)]
#[must_use = "a protected array must be unprotected"]
pub struct ArrayRoot {
    depth: usize,
}

/// Handle to a static root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRoot {
    index: usize,
}

impl StaticRoot {
    /// Stand-in used while a heap is under construction
    pub(crate) const fn placeholder() -> Self {
        Self { index: 0 }
    }
}

pub(crate) struct RootStack {
    pub(crate) singles: Vec<Value>,
    pub(crate) arrays: Vec<Vec<Value>>,
    pub(crate) statics: Vec<Value>,
}

impl RootStack {
    pub(crate) fn new() -> Self {
        Self {
            singles: Vec::new(),
            arrays: Vec::new(),
            statics: Vec::with_capacity(INITIAL_STATIC_ROOTS),
        }
    }

    /// Every value in the single and array stacks
    pub(crate) fn stacked(&self) -> impl Iterator<Item = Value> + '_ {
        self.singles
            .iter()
            .copied()
            .chain(self.arrays.iter().flat_map(|a| a.iter().copied()))
    }
}

impl Heap {
    /// Protect `value` until the returned token is unprotected
    pub fn protect(&mut self, value: Value) -> Root {
        self.roots.singles.push(value);
        Root {
            depth: self.roots.singles.len() - 1,
        }
    }

    /// Pop the most recent single root
    ///
    /// # Panics
    /// Panics if `root` is not the most recently protected value.
    pub fn unprotect(&mut self, root: Root) -> Value {
        let top = self.roots.singles.len();
        assert!(
            top > 0 && root.depth == top - 1,
            "unbalanced root pop: depth {} with {} roots protected",
            root.depth,
            top
        );
        self.roots.singles.pop().unwrap_or_default()
    }

    /// Current value of a protected slot
    pub fn root(&self, root: &Root) -> Value {
        self.roots.singles[root.depth]
    }

    /// Replace the value in a protected slot
    pub fn set_root(&mut self, root: &Root, value: Value) {
        self.roots.singles[root.depth] = value;
    }

    /// Run `f` with `value` protected, unprotecting on every exit path
    /// that returns (early `?` returns included)
    pub fn with_protected<R>(&mut self, value: Value, f: impl FnOnce(&mut Heap, &Root) -> R) -> R {
        let root = self.protect(value);
        let result = f(self, &root);
        self.unprotect(root);
        result
    }

    /// Protect a run of values
    pub fn protect_array(&mut self, values: Vec<Value>) -> ArrayRoot {
        self.roots.arrays.push(values);
        ArrayRoot {
            depth: self.roots.arrays.len() - 1,
        }
    }

    /// Pop the most recent array root, handing the values back
    ///
    /// # Panics
    /// Panics if `root` is not the most recently protected array.
    pub fn unprotect_array(&mut self, root: ArrayRoot) -> Vec<Value> {
        let top = self.roots.arrays.len();
        assert!(
            top > 0 && root.depth == top - 1,
            "unbalanced array root pop: depth {} with {} arrays protected",
            root.depth,
            top
        );
        self.roots.arrays.pop().unwrap_or_default()
    }

    pub fn array_root(&self, root: &ArrayRoot) -> &[Value] {
        &self.roots.arrays[root.depth]
    }

    pub fn array_root_mut(&mut self, root: &ArrayRoot) -> &mut Vec<Value> {
        &mut self.roots.arrays[root.depth]
    }

    /// Register a value that stays reachable for the life of the heap
    pub fn register_static(&mut self, value: Value) -> StaticRoot {
        let roots = &mut self.roots.statics;
        if roots.len() == roots.capacity() {
            // Geometric growth from the initial table size
            let extra = roots.capacity().max(INITIAL_STATIC_ROOTS);
            roots.reserve_exact(extra);
        }
        roots.push(value);
        StaticRoot {
            index: roots.len() - 1,
        }
    }

    pub fn static_root(&self, root: StaticRoot) -> Value {
        self.roots.statics[root.index]
    }

    pub fn set_static_root(&mut self, root: StaticRoot, value: Value) {
        self.roots.statics[root.index] = value;
    }

    /// Single roots currently protected
    pub fn root_depth(&self) -> usize {
        self.roots.singles.len()
    }

    /// Array roots currently protected
    pub fn array_root_depth(&self) -> usize {
        self.roots.arrays.len()
    }

    /// Static roots registered so far
    pub fn static_root_count(&self) -> usize {
        self.roots.statics.len()
    }
}
