//! Cellmem Runtime: the heap of an embedded Lisp
//!
//! Key design principles:
//! - Value: one tagged word per slot (see `cellmem-core`)
//! - Heap: an explicit context owning every pool, the type registry and the
//!   root stacks; tests build as many as they need
//! - Collection: mark-and-sweep with per-type callbacks, run only when the
//!   embedder asks, never from inside an allocator
//! - Marking: an explicit worklist plus tail loops, so arbitrarily long lists
//!   cost constant native stack

mod chain;
pub mod collector;
pub mod config;
pub mod debug_buffer;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod dispatch;
pub mod heap;
#[cfg(feature = "dumped-image")]
pub mod image;
pub mod mark;
pub mod match_regs;
mod pairs;
mod print;
pub mod registry;
pub mod roots;
pub mod space;
mod types;

// Report (diagnostics feature or stub)
#[cfg(feature = "diagnostics")]
pub mod report;
#[cfg(not(feature = "diagnostics"))]
#[path = "report_stub.rs"]
pub mod report;

pub use cellmem_core::{
    CellId, CellKind, HeapError, HeapResult, MAX_INT, MAX_WIDE_TYPES, MIN_INT, TypeCode, Value,
    Word,
};

pub use collector::{CallFrame, GcPhase, GcStats};
pub use config::{Activity, GcConfig};
pub use debug_buffer::{BufferId, DebugBuffer, DebugBuffers};
pub use dispatch::{Stream, ptr_cmp, type_equal};
pub use heap::{Funarg, Heap};
pub use mark::{Marker, SweepContext};
pub use match_regs::{ForeignData, MatchData, NSUBEXP, Registers};
pub use registry::{TYPE_HASH_SIZE, TypeDescriptor, TypeOps, TypeRegistry};
pub use roots::{ArrayRoot, Root, StaticRoot};

#[cfg(feature = "dumped-image")]
pub use image::{FrozenImage, ImagePair, ImageSymbol, ImageValue, ImageVector, LoadedImage, Obarray};

#[cfg(feature = "diagnostics")]
pub use diagnostics::{dump_diagnostics, install_signal_handler};
pub use report::emit_report;
