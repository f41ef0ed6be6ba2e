//! The process-wide type index.
//!
//! Owns the descriptor registry behind a mutex and caches shorthand handles
//! for every primitive descriptor the runtime reaches for constantly. Interned
//! descriptors are `&'static`, so handles stay valid outside the lock.

use std::mem::{offset_of, size_of};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use alder_gc::{Any, FuncParam, Kind, StructField, TypeRef, TypeRegistry};

use crate::runtime::values::Cons;

static TYPES: Lazy<TypeIndex> = Lazy::new(TypeIndex::init);

/// The global type index.
#[inline]
pub fn types() -> &'static TypeIndex {
    &TYPES
}

pub struct TypeIndex {
    registry: Mutex<TypeRegistry>,

    /* type shorthands */
    pub any: TypeRef,
    pub nil: TypeRef,
    pub type_desc: TypeRef,

    pub u8: TypeRef,
    pub u16: TypeRef,
    pub u32: TypeRef,
    pub u64: TypeRef,

    pub i8: TypeRef,
    pub i16: TypeRef,
    pub i32: TypeRef,
    pub i64: TypeRef,

    pub f32: TypeRef,
    pub f64: TypeRef,

    pub bool: TypeRef,

    pub cons: TypeRef,
    pub boxed_cons: TypeRef,

    pub string: TypeRef,
    pub boxed_string: TypeRef,

    pub symbol: TypeRef,
    pub ptr_symbol: TypeRef,
}

impl TypeIndex {
    fn init() -> TypeIndex {
        let mut registry = TypeRegistry::new();

        let any = registry.simple(Kind::Any, size_of::<Any>());
        let nil = registry.simple(Kind::Nil, 0);
        let type_desc = registry.simple(Kind::Type, size_of::<*const u8>());

        let u8 = registry.simple(Kind::Unsigned, 1);
        let u16 = registry.simple(Kind::Unsigned, 2);
        let u32 = registry.simple(Kind::Unsigned, 4);
        let u64 = registry.simple(Kind::Unsigned, 8);

        let i8 = registry.simple(Kind::Signed, 1);
        let i16 = registry.simple(Kind::Signed, 2);
        let i32 = registry.simple(Kind::Signed, 4);
        let i64 = registry.simple(Kind::Signed, 8);

        let f32 = registry.simple(Kind::Real, 4);
        let f64 = registry.simple(Kind::Real, 8);

        let bool = registry.simple(Kind::Bool, 1);

        let cons = registry.struct_type(
            Some("cons"),
            size_of::<Cons>(),
            vec![
                StructField::new(any, "car", offset_of!(Cons, car)),
                StructField::new(any, "cdr", offset_of!(Cons, cdr)),
            ],
        );
        let boxed_cons = registry.boxed(cons);

        let chars = registry.array(u8, 0);
        let string =
            registry.struct_type(Some("string"), 0, vec![StructField::new(chars, "chars", 0)]);
        let boxed_string = registry.boxed(string);

        let symbol =
            registry.struct_type(Some("symbol"), 0, vec![StructField::new(string, "string", 0)]);
        // Symbols are interned process-wide, not GC memory, so this pointer
        // is not a box pointer and is never traced as one.
        let ptr_symbol = registry.ptr(symbol);

        TypeIndex {
            registry: Mutex::new(registry),
            any,
            nil,
            type_desc,
            u8,
            u16,
            u32,
            u64,
            i8,
            i16,
            i32,
            i64,
            f32,
            f64,
            bool,
            cons,
            boxed_cons,
            string,
            boxed_string,
            symbol,
            ptr_symbol,
        }
    }

    /// Non-box pointer to `target`.
    pub fn ptr(&self, target: TypeRef) -> TypeRef {
        self.registry.lock().ptr(target)
    }

    /// Interior pointer into a box of `box_type`, `box_offset` bytes past the
    /// end of the box header.
    pub fn box_ptr(&self, target: TypeRef, box_type: TypeRef, box_offset: usize) -> TypeRef {
        self.registry.lock().box_ptr(target, box_type, box_offset)
    }

    /// Pointer to a fresh box holding exactly `target`.
    pub fn boxed(&self, target: TypeRef) -> TypeRef {
        self.registry.lock().boxed(target)
    }

    /// Weak counterpart of a boxed pointer type.
    pub fn weak(&self, ptr_type: TypeRef) -> TypeRef {
        self.registry.lock().weak(ptr_type)
    }

    /// `weak(boxed(target))`.
    pub fn weak_boxed(&self, target: TypeRef) -> TypeRef {
        self.registry.lock().weak_boxed(target)
    }

    /// Array of `length` elements; `length == 0` means unsized.
    pub fn array(&self, elem: TypeRef, length: usize) -> TypeRef {
        self.registry.lock().array(elem, length)
    }

    /// `boxed(array(elem, length))`.
    pub fn boxed_array(&self, elem: TypeRef, length: usize) -> TypeRef {
        self.registry.lock().boxed_array(elem, length)
    }

    /// Struct descriptor canonicalized by size and fields.
    pub fn struct_type(
        &self,
        name: Option<&str>,
        size: usize,
        fields: Vec<StructField>,
    ) -> TypeRef {
        self.registry.lock().struct_type(name, size, fields)
    }

    /// Function descriptor from return type and parameters.
    pub fn func(&self, ret: TypeRef, params: Vec<FuncParam>) -> TypeRef {
        self.registry.lock().func(ret, params)
    }
}
