//! Cellmem Core: value representation for an embedded Lisp heap
//!
//! This crate holds the pieces that every heap client needs without pulling
//! in the collector itself.
//!
//! Key design principles:
//! - Value: What the interpreter talks about (Null, Int, Cell, Wide)
//! - Word: The packed 64-bit form stored in heap cell slots
//! - TypeCode: The key into the runtime type registry
//!
//! # Modules
//!
//! - `error`: Recoverable allocation errors
//! - `memory_stats`: Cross-heap memory statistics registry
//! - `value`: Core Value enum, cell kinds, cell ids and type codes
//! - `word`: Packed one-word encoding of values

pub mod error;
pub mod memory_stats;
pub mod value;
pub mod word;

pub use value::{CellId, CellKind, MAX_INT, MAX_WIDE_TYPES, MIN_INT, TypeCode, Value};
pub use word::Word;

// Error handling
pub use error::{HeapError, HeapResult};

// Memory statistics
pub use memory_stats::{AggregateMemoryStats, HeapSnapshot, memory_registry, next_heap_id};
