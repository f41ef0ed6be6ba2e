//! Modules: source map, globals and function-body ownership.
//!
//! The source map records, for every list cons the reader builds, where its
//! `car` began in the source text; the parser and evaluator use it for
//! diagnostics. Map keys are cons identities (payload addresses), so the
//! current module is an implicit GC root: every keyed cons must be marked or
//! the keys would dangle.

use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use hashbrown::HashMap;

use alder_gc::{Any, Tracer};

use crate::runtime::ast::AstNode;
use crate::runtime::error::SourceLoc;
use crate::runtime::symbol::{SymbolId, SymbolRef};
use crate::runtime::type_index::types;
use crate::runtime::values::Cons;

/// Cons identity usable as a hash-map key.
#[derive(Clone, Copy, Debug)]
pub struct ConsId(pub *mut Cons);

impl PartialEq for ConsId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ConsId {}

impl Hash for ConsId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0 as usize);
    }
}

/// One compilation unit: forms read so far, their source locations, and the
/// toplevel definitions evaluated from them.
pub struct Module {
    /// Source location of each list cons's `car`, keyed by cons identity.
    sourcemap: HashMap<ConsId, SourceLoc>,
    /// Toplevel definitions by symbol identity.
    globals: HashMap<SymbolId, Any>,
    /// Function bodies referenced by `Func` boxes; owned here so the boxes
    /// can hold stable pointers.
    fn_bodies: Vec<Box<AstNode>>,
}

impl Module {
    pub fn new() -> Module {
        Module {
            sourcemap: HashMap::new(),
            globals: HashMap::new(),
            fn_bodies: Vec::new(),
        }
    }

    /// Record where a cons's `car` began in the source text.
    pub fn record_source_loc(&mut self, cons: *mut Cons, loc: SourceLoc) {
        self.sourcemap.insert(ConsId(cons), loc);
    }

    pub fn source_loc(&self, cons: *mut Cons) -> Option<SourceLoc> {
        self.sourcemap.get(&ConsId(cons)).copied()
    }

    pub fn sourcemap_len(&self) -> usize {
        self.sourcemap.len()
    }

    pub fn clear_sourcemap(&mut self) {
        self.sourcemap.clear();
    }

    /// Record a toplevel definition. Returns false if the name is taken.
    pub fn define_global(&mut self, name: SymbolRef, value: Any) -> bool {
        match self.globals.entry(SymbolId(name)) {
            hashbrown::hash_map::Entry::Occupied(_) => false,
            hashbrown::hash_map::Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    pub fn global(&self, name: SymbolRef) -> Option<Any> {
        self.globals.get(&SymbolId(name)).copied()
    }

    /// Take ownership of a function body, returning a stable pointer for the
    /// `Func` box.
    pub fn own_fn_body(&mut self, body: AstNode) -> NonNull<AstNode> {
        let body = Box::new(body);
        let ptr = NonNull::from(&*body);
        self.fn_bodies.push(body);
        ptr
    }

    /// Trace the module's implicit roots: every source-map key and every
    /// global value.
    pub fn visit_roots(&mut self, tracer: &mut Tracer<'_>) {
        let boxed_cons = types().boxed_cons;
        for key in self.sourcemap.keys() {
            if let Some(cons) = NonNull::new(key.0 as *mut u8) {
                unsafe {
                    tracer.trace_boxed(cons, boxed_cons);
                }
            }
        }
        let any = types().any;
        for value in self.globals.values_mut() {
            unsafe {
                tracer.trace_slot(NonNull::from(value).cast(), any);
            }
        }
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}
