//! Preloaded image support
//!
//! An interpreter may start from cells baked into the program rather than
//! built at startup. [`Heap::load_image`] makes such a [`FrozenImage`]
//! usable:
//!
//! - pairs, vectors and strings become read-only cells that are never marked,
//!   swept or written
//! - symbols become cells that are marked (their slots stay writable) but
//!   never swept, and are kept reachable for the life of the heap
//! - references between image cells are resolved to heap values
//! - `Uninit` slots become void, or nil for property lists
//! - every symbol is interned, the image's nil first
//!
//! Loading takes nothing from the pool free-lists and does not count toward
//! the collection threshold. Load an image straight after creating the heap:
//! an image nil replaces the heap's nil, and cells built earlier keep the
//! old one.

use crate::heap::Heap;
use crate::pairs::PairCell;
use crate::space::SymbolCell;
use cellmem_core::{CellId, HeapResult, Value, Word};
use tracing::debug;

/// A slot in an image cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageValue {
    Null,
    Int(i64),
    /// Index into [`FrozenImage::pairs`]
    Pair(usize),
    /// Index into [`FrozenImage::vectors`]
    Vector(usize),
    /// Index into [`FrozenImage::strings`]
    String(usize),
    /// Index into [`FrozenImage::symbols`]
    Symbol(usize),
    Void,
    /// Slot never initialised when the image was made
    Uninit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub car: ImageValue,
    pub cdr: ImageValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVector {
    /// A compiled-code block rather than a plain vector
    pub compiled: bool,
    pub slots: Vec<ImageValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSymbol {
    /// Must be an [`ImageValue::String`]
    pub name: ImageValue,
    pub value: ImageValue,
    pub function: ImageValue,
    pub prop_list: ImageValue,
}

/// Cells produced by an earlier run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrozenImage {
    pub pairs: Vec<ImagePair>,
    pub vectors: Vec<ImageVector>,
    pub strings: Vec<Vec<u8>>,
    pub symbols: Vec<ImageSymbol>,
    /// Index of the image's nil symbol
    pub nil: Option<usize>,
}

/// The embedder's symbol table
pub trait Obarray {
    fn intern(&mut self, heap: &mut Heap, symbol: Value);
}

/// Heap values of the loaded cells, index for index
#[derive(Debug, Clone, Default)]
pub struct LoadedImage {
    pub pairs: Vec<Value>,
    pub vectors: Vec<Value>,
    pub strings: Vec<Value>,
    pub symbols: Vec<Value>,
}

impl LoadedImage {
    /// Resolve an image slot
    ///
    /// # Panics
    /// Panics if the slot refers past the end of the image.
    fn resolve(&self, slot: ImageValue, uninit: Value) -> Value {
        fn at(table: &[Value], index: usize, kind: &str) -> Value {
            match table.get(index) {
                Some(&v) => v,
                None => panic!("image {} reference {} out of range", kind, index),
            }
        }
        match slot {
            ImageValue::Null => Value::Null,
            ImageValue::Int(n) => Value::int(n),
            ImageValue::Pair(i) => at(&self.pairs, i, "pair"),
            ImageValue::Vector(i) => at(&self.vectors, i, "vector"),
            ImageValue::String(i) => at(&self.strings, i, "string"),
            ImageValue::Symbol(i) => at(&self.symbols, i, "symbol"),
            ImageValue::Void => Value::VOID,
            ImageValue::Uninit => uninit,
        }
    }
}

fn cell(value: Value) -> CellId {
    match value {
        Value::Cell(_, id) => id,
        other => panic!("image cell resolved to {:?}", other),
    }
}

impl Heap {
    /// Install a preloaded image and intern its symbols
    pub fn load_image(
        &mut self,
        image: &FrozenImage,
        obarray: &mut dyn Obarray,
    ) -> HeapResult<LoadedImage> {
        let mut loaded = LoadedImage {
            pairs: self
                .space
                .pairs
                .install_image(image.pairs.len())?
                .into_iter()
                .map(Value::pair)
                .collect(),
            ..LoadedImage::default()
        };
        for bytes in &image.strings {
            loaded
                .strings
                .push(Value::string(self.space.frozen_string(bytes)?));
        }
        for v in &image.vectors {
            let id = self.space.frozen_vector(v.slots.len())?;
            loaded.vectors.push(if v.compiled {
                Value::compiled(id)
            } else {
                Value::vector(id)
            });
        }
        for _ in &image.symbols {
            let id = self.space.frozen_symbol(SymbolCell {
                name: Word::NULL,
                value: Word::NULL,
                function: Word::NULL,
                prop_list: Word::NULL,
                next: Word::NULL,
            })?;
            loaded.symbols.push(Value::symbol(id));
        }

        let nil = match image.nil {
            Some(i) => loaded.resolve(ImageValue::Symbol(i), Value::Null),
            None => self.nil(),
        };

        for (p, &value) in image.pairs.iter().zip(&loaded.pairs) {
            *self.space.pairs.get_mut(cell(value)) = PairCell {
                car: Word::pack(loaded.resolve(p.car, Value::VOID)),
                cdr: Word::pack(loaded.resolve(p.cdr, Value::VOID)),
            };
        }
        for (v, &value) in image.vectors.iter().zip(&loaded.vectors) {
            let slots = &mut self.space.vectors.get_mut(cell(value)).slots;
            for (slot, &item) in slots.iter_mut().zip(&v.slots) {
                *slot = Word::pack(loaded.resolve(item, Value::VOID));
            }
        }
        for (i, (s, &value)) in image.symbols.iter().zip(&loaded.symbols).enumerate() {
            // nil evaluates to itself
            let unbound = if image.nil == Some(i) { nil } else { Value::VOID };
            let sym = self.space.symbols.get_mut(cell(value));
            sym.name = Word::pack(loaded.resolve(s.name, Value::Null));
            sym.value = Word::pack(loaded.resolve(s.value, unbound));
            sym.function = Word::pack(loaded.resolve(s.function, Value::VOID));
            sym.prop_list = Word::pack(loaded.resolve(s.prop_list, nil));
        }

        if image.nil.is_some() {
            self.set_nil(nil);
            obarray.intern(self, nil);
        }
        for &symbol in &loaded.symbols {
            self.register_static(symbol);
            if symbol != nil {
                obarray.intern(self, symbol);
            }
        }

        debug!(
            "heap {}: loaded image with {} pairs, {} vectors, {} strings, {} symbols",
            self.heap_id(),
            loaded.pairs.len(),
            loaded.vectors.len(),
            loaded.strings.len(),
            loaded.symbols.len()
        );
        self.publish_stats();
        Ok(loaded)
    }
}
