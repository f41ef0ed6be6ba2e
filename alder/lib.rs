//! alder - runtime core of a small dynamic-typed, Lisp-flavored language.
//!
//! Values carry type descriptors at runtime; composite data (lists, strings,
//! symbols, arrays, closures) lives in garbage-collected memory; a reader
//! turns source text into nested list forms; a parser turns forms into typed
//! AST nodes; a tree-walking evaluator executes those nodes.
//!
//! The descriptor/GC substrate lives in the `alder_gc` crate; this crate adds
//! the language runtime on top: the global type index and symbol interner,
//! value constructors, reader, parser, evaluator and printer.

pub mod runtime;

pub use runtime::{
    ast::{dump_ast, AstNode},
    error::{SourceError, SourceLoc, SourceResult},
    eval::{eval, Evaluator},
    module::Module,
    parser::{parse_module, parse_toplevel},
    printer::display,
    reader::{read, read_all},
    symbol::{intern, intern_symbol, Symbol, SymbolRef},
    task::Task,
    type_index::{types, TypeIndex},
};
