//! The global symbol interner.
//!
//! Symbols are content-addressed: interning the same string twice returns the
//! same leaked `Symbol`, so identity comparison is pointer equality. Symbols
//! live for the lifetime of the process and are never GC-reclaimed.
//!
//! A second table keyed by symbol identity resolves the primitive type names
//! (`u8`, `cons`, ...) the parser accepts in type expressions.

use std::hash::{Hash, Hasher};
use std::ptr;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use alder_gc::{Any, Payload, TypeRef};

use crate::runtime::type_index::types;

/// An interned symbol. Stable address for the lifetime of the process.
#[derive(Debug)]
pub struct Symbol {
    name: Box<str>,
}

impl Symbol {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Shared handle to an interned symbol. Identity comparison is pointer
/// equality.
pub type SymbolRef = &'static Symbol;

/// Symbol identity usable as a hash-map key.
#[derive(Clone, Copy, Debug)]
pub struct SymbolId(pub SymbolRef);

impl PartialEq for SymbolId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Eq for SymbolId {}

impl Hash for SymbolId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0 as *const Symbol as usize);
    }
}

static SYMBOLS: Lazy<Mutex<HashMap<&'static str, SymbolRef>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Intern a string, returning the unique symbol with that content.
pub fn intern_symbol(name: &str) -> SymbolRef {
    let mut table = SYMBOLS.lock();
    if let Some(symbol) = table.get(name).copied() {
        return symbol;
    }
    let symbol: SymbolRef = Box::leak(Box::new(Symbol { name: name.into() }));
    table.insert(symbol.name(), symbol);
    symbol
}

/// Intern a string and wrap the symbol as an `Any`.
pub fn intern(name: &str) -> Any {
    let symbol = intern_symbol(name);
    Any::new(
        types().ptr_symbol,
        Payload { ptr: symbol as *const Symbol as *mut u8 },
    )
}

static PRIMITIVE_TYPES: Lazy<HashMap<SymbolId, TypeRef>> = Lazy::new(|| {
    let t = types();
    let mut table = HashMap::new();
    let mut bind = |name: &str, ty: TypeRef| {
        table.insert(SymbolId(intern_symbol(name)), ty);
    };
    bind("any", t.any);
    bind("nil", t.nil);
    bind("u8", t.u8);
    bind("u16", t.u16);
    bind("u32", t.u32);
    bind("u64", t.u64);
    bind("i8", t.i8);
    bind("i16", t.i16);
    bind("i32", t.i32);
    bind("i64", t.i64);
    bind("f32", t.f32);
    bind("f64", t.f64);
    bind("bool", t.bool);
    bind("cons", t.cons);
    drop(bind);
    table
});

/// Resolve a primitive type name (`u32`, `cons`, ...) to its descriptor.
pub fn lookup_primitive_type(symbol: SymbolRef) -> Option<TypeRef> {
    PRIMITIVE_TYPES.get(&SymbolId(symbol)).copied()
}
