//! alder Garbage Collector
//!
//! A precise stop-the-world mark-sweep garbage collector driven by structural
//! type descriptors. This crate provides the value-representation and GC
//! substrate without depending on the language runtime.
//!
//! Key types:
//! - `Type` / `TypeRegistry`: structural type descriptors and their interner
//! - `Any`: a two-word tagged value (descriptor + payload)
//! - `BoxHeader`: header prepended to each heap allocation
//! - `Heap`: the managed heap
//! - `RootStack`: stack of typed root frames scanned during marking
//!
//! The runtime provides root enumeration through the callback passed to
//! `Heap::collect`; everything else the collector needs to walk a value is
//! encoded in its descriptor.

#![no_std]
extern crate alloc;

mod box_header;
mod heap;
mod roots;
mod types;
mod value;

pub use box_header::BoxHeader;
pub use heap::{Heap, Tracer};
pub use roots::{RootStack, TypedSlot};
pub use types::{FuncParam, Kind, StructField, Type, TypeData, TypeFlags, TypeRef, TypeRegistry};
pub use value::{Any, Payload};

#[cfg(test)]
mod tests;
