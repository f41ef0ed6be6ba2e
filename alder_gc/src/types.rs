//! Structural type descriptors and their interner.
//!
//! Every runtime value is described by a `Type`. Descriptors carry enough
//! structural information (kind, slot size, field/element layout, box offset)
//! that the collector can walk any value from its descriptor alone.
//!
//! Descriptors are interned: the registry keeps one bucket per constructor
//! family and always returns the shared handle for structurally equal
//! requests, so pointer equality on `TypeRef` means structural equality.

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;
use hashbrown::HashMap;

/// Shared handle to an interned type descriptor.
///
/// Descriptors live for the lifetime of the process, so handles are
/// free-standing `'static` references and can be copied anywhere.
pub type TypeRef = &'static Type;

/// The closed set of value categories driving dispatch in tracing, printing,
/// equality and primitive coercion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Tuple of descriptor pointer and payload, where the payload is
    /// described by the descriptor.
    Any,
    /// The type of nil. Zero-initialized `Any` slots read as nil.
    Nil,
    /// Pointer into boxes, or to stack or unmanaged memory.
    Ptr,

    /* composite kinds */
    Struct,
    Array,

    /* scalar kinds */
    Bool,
    Signed,
    Unsigned,
    Real,

    /// Function value; stored boxed, with the signature in the descriptor.
    Func,
    /// A type descriptor used as a first-class value.
    Type,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        /// Pointer whose referent may be collected; the slot is nulled when
        /// the referent dies. Implies `Kind::Ptr` with a box type.
        const WEAK_PTR = 1 << 0;
        /// Set on any descriptor that can transitively reference a box. The
        /// tracer short-circuits on descriptors without this flag.
        const NEEDS_GC_MARK = 1 << 1;
    }
}

/// One field of a struct descriptor.
#[derive(Clone, Debug)]
pub struct StructField {
    pub ty: TypeRef,
    pub name: String,
    pub offset: usize,
}

impl StructField {
    pub fn new(ty: TypeRef, name: &str, offset: usize) -> StructField {
        StructField { ty, name: name.to_owned(), offset }
    }
}

/// One parameter of a function descriptor.
#[derive(Clone, Debug)]
pub struct FuncParam {
    pub ty: TypeRef,
    pub name: String,
}

impl FuncParam {
    pub fn new(ty: TypeRef, name: &str) -> FuncParam {
        FuncParam { ty, name: name.to_owned() }
    }
}

/// Kind-specific descriptor payload.
#[derive(Debug)]
pub enum TypeData {
    None,
    Ptr {
        target: TypeRef,
        /// Outermost type of the containing box, set when this pointer
        /// targets GC memory.
        box_type: Option<TypeRef>,
        /// Bytes from the end of the box header to the pointee.
        box_offset: usize,
    },
    Struct {
        name: Option<String>,
        fields: Vec<StructField>,
    },
    Array {
        elem: TypeRef,
    },
    Func {
        ret: TypeRef,
        params: Vec<FuncParam>,
    },
}

/// A structural type descriptor.
#[derive(Debug)]
pub struct Type {
    kind: Kind,
    flags: TypeFlags,
    /// Size in bytes of a storage location of this type. If 0 then this type
    /// is unsized and cannot be used for a storage location directly; it must
    /// be boxed.
    size: usize,
    /// Human-readable description, derived from the structure.
    desc: String,
    data: TypeData,
}

impl Type {
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn desc(&self) -> &str {
        &self.desc
    }

    #[inline]
    pub fn data(&self) -> &TypeData {
        &self.data
    }

    #[inline]
    pub fn is_weak(&self) -> bool {
        self.flags.contains(TypeFlags::WEAK_PTR)
    }

    #[inline]
    pub fn needs_gc_mark(&self) -> bool {
        self.flags.contains(TypeFlags::NEEDS_GC_MARK)
    }

    /// Target type of a pointer descriptor.
    pub fn target_type(&self) -> TypeRef {
        match &self.data {
            TypeData::Ptr { target, .. } => *target,
            _ => panic!("not a pointer type: {}", self.desc),
        }
    }

    /// Box type of a pointer descriptor, if it targets GC memory.
    pub fn box_type(&self) -> Option<TypeRef> {
        match &self.data {
            TypeData::Ptr { box_type, .. } => *box_type,
            _ => panic!("not a pointer type: {}", self.desc),
        }
    }

    /// Box offset of a pointer descriptor.
    pub fn box_offset(&self) -> usize {
        match &self.data {
            TypeData::Ptr { box_offset, .. } => *box_offset,
            _ => panic!("not a pointer type: {}", self.desc),
        }
    }

    /// Element type of an array descriptor.
    pub fn elem_type(&self) -> TypeRef {
        match &self.data {
            TypeData::Array { elem } => *elem,
            _ => panic!("not an array type: {}", self.desc),
        }
    }

    /// Fields of a struct descriptor.
    pub fn fields(&self) -> &[StructField] {
        match &self.data {
            TypeData::Struct { fields, .. } => fields,
            _ => panic!("not a struct type: {}", self.desc),
        }
    }

    /// Return type and parameters of a function descriptor.
    pub fn signature(&self) -> (TypeRef, &[FuncParam]) {
        match &self.data {
            TypeData::Func { ret, params } => (*ret, params.as_slice()),
            _ => panic!("not a function type: {}", self.desc),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.desc)
    }
}

// ============================================================================
// Interner keys
// ============================================================================

/// Identity key for an interned descriptor. Descriptors are interned, so the
/// address is a stable structural identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct TypeKey(usize);

impl TypeKey {
    #[inline]
    fn of(ty: TypeRef) -> TypeKey {
        TypeKey(ty as *const Type as usize)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct StructKey {
    size: usize,
    fields: Vec<(TypeKey, String, usize)>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct FuncKey {
    ret: TypeKey,
    params: Vec<(TypeKey, String)>,
}

// ============================================================================
// Registry
// ============================================================================

/// Uniquifying interner for type descriptors.
///
/// One bucket per constructor family. Each request canonicalizes its inputs
/// and returns the shared descriptor, leaking a new one on first use.
pub struct TypeRegistry {
    simple: HashMap<(Kind, usize), TypeRef>,
    ptrs: HashMap<TypeKey, TypeRef>,
    box_ptrs: HashMap<(TypeKey, TypeKey, usize), TypeRef>,
    weak_ptrs: HashMap<(TypeKey, TypeKey, usize), TypeRef>,
    arrays: HashMap<(TypeKey, usize), TypeRef>,
    structs: HashMap<StructKey, TypeRef>,
    funcs: HashMap<FuncKey, TypeRef>,
}

const PTR_SIZE: usize = core::mem::size_of::<*const u8>();

fn leak(ty: Type) -> TypeRef {
    Box::leak(Box::new(ty))
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry {
            simple: HashMap::new(),
            ptrs: HashMap::new(),
            box_ptrs: HashMap::new(),
            weak_ptrs: HashMap::new(),
            arrays: HashMap::new(),
            structs: HashMap::new(),
            funcs: HashMap::new(),
        }
    }

    /// Intern a non-composite descriptor: scalars, `any`, `nil`, `type`.
    pub fn simple(&mut self, kind: Kind, size: usize) -> TypeRef {
        assert!(
            !matches!(kind, Kind::Ptr | Kind::Struct | Kind::Array | Kind::Func),
            "composite kinds have dedicated constructors"
        );
        *self.simple.entry((kind, size)).or_insert_with(|| {
            // An `any` slot can hold anything, including boxed pointers.
            let flags = if kind == Kind::Any {
                TypeFlags::NEEDS_GC_MARK
            } else {
                TypeFlags::empty()
            };
            leak(Type {
                kind,
                flags,
                size,
                desc: simple_desc(kind, size),
                data: TypeData::None,
            })
        })
    }

    /// Intern a non-box pointer. The pointee may live on the stack or in
    /// unmanaged memory; it is traced through but never marked as a box.
    pub fn ptr(&mut self, target: TypeRef) -> TypeRef {
        *self.ptrs.entry(TypeKey::of(target)).or_insert_with(|| {
            let flags = if target.needs_gc_mark() {
                TypeFlags::NEEDS_GC_MARK
            } else {
                TypeFlags::empty()
            };
            leak(Type {
                kind: Kind::Ptr,
                flags,
                size: PTR_SIZE,
                desc: format!("ptr[{}]", target.desc),
                data: TypeData::Ptr { target, box_type: None, box_offset: 0 },
            })
        })
    }

    /// Intern an interior pointer into a box: `box_type` is the outermost
    /// type of the containing box, `box_offset` the distance in bytes from
    /// the end of the box header to the pointee.
    pub fn box_ptr(&mut self, target: TypeRef, box_type: TypeRef, box_offset: usize) -> TypeRef {
        let key = (TypeKey::of(target), TypeKey::of(box_type), box_offset);
        *self.box_ptrs.entry(key).or_insert_with(|| {
            leak(Type {
                kind: Kind::Ptr,
                flags: TypeFlags::NEEDS_GC_MARK,
                size: PTR_SIZE,
                desc: box_ptr_desc("boxptr", target, box_type, box_offset),
                data: TypeData::Ptr { target, box_type: Some(box_type), box_offset },
            })
        })
    }

    /// Pointer to a fresh box holding exactly `target`.
    pub fn boxed(&mut self, target: TypeRef) -> TypeRef {
        self.box_ptr(target, target, 0)
    }

    /// Weak counterpart of a boxed pointer. Idempotent: weakening a weak
    /// pointer returns it unchanged.
    pub fn weak(&mut self, ptr_type: TypeRef) -> TypeRef {
        if ptr_type.is_weak() {
            return ptr_type;
        }
        assert_eq!(ptr_type.kind(), Kind::Ptr, "weak requires a pointer type");
        let (target, box_type, box_offset) = match ptr_type.data() {
            TypeData::Ptr { target, box_type, box_offset } => {
                let box_type = box_type.expect("weak requires a boxed pointer");
                (*target, box_type, *box_offset)
            }
            _ => unreachable!(),
        };
        let key = (TypeKey::of(target), TypeKey::of(box_type), box_offset);
        *self.weak_ptrs.entry(key).or_insert_with(|| {
            leak(Type {
                kind: Kind::Ptr,
                flags: TypeFlags::WEAK_PTR | TypeFlags::NEEDS_GC_MARK,
                size: PTR_SIZE,
                desc: box_ptr_desc("weakptr", target, box_type, box_offset),
                data: TypeData::Ptr { target, box_type: Some(box_type), box_offset },
            })
        })
    }

    /// `weak(boxed(target))`.
    pub fn weak_boxed(&mut self, target: TypeRef) -> TypeRef {
        let boxed = self.boxed(target);
        self.weak(boxed)
    }

    /// Intern an array descriptor. `length == 0` means unsized: the length
    /// lives in the box prefix and the descriptor's size is 0.
    pub fn array(&mut self, elem: TypeRef, length: usize) -> TypeRef {
        assert!(elem.size() > 0, "array element type must be sized");
        let size = length * elem.size();
        *self.arrays.entry((TypeKey::of(elem), size)).or_insert_with(|| {
            let flags = if elem.needs_gc_mark() {
                TypeFlags::NEEDS_GC_MARK
            } else {
                TypeFlags::empty()
            };
            leak(Type {
                kind: Kind::Array,
                flags,
                size,
                desc: format!("array[{} {}]", elem.desc, length),
                data: TypeData::Array { elem },
            })
        })
    }

    /// `boxed(array(elem, length))`.
    pub fn boxed_array(&mut self, elem: TypeRef, length: usize) -> TypeRef {
        let array = self.array(elem, length);
        self.boxed(array)
    }

    /// Intern a struct descriptor, canonicalized by size, field count and
    /// per-field (type, name, offset). The name is diagnostic only.
    ///
    /// An unsized struct (`size == 0`) must end with an unsized field; a
    /// sized struct must consist of sized fields only.
    pub fn struct_type(
        &mut self,
        name: Option<&str>,
        size: usize,
        fields: Vec<StructField>,
    ) -> TypeRef {
        for field in fields.iter().take(fields.len().saturating_sub(1)) {
            assert!(field.ty.size() > 0, "only the last struct field may be unsized");
        }
        match fields.last() {
            Some(last) => {
                if size == 0 {
                    assert_eq!(last.ty.size(), 0, "unsized struct requires an unsized last field");
                } else {
                    assert_ne!(last.ty.size(), 0, "sized struct requires sized fields");
                }
            }
            None => assert_eq!(size, 0, "empty struct must be unsized"),
        }

        let key = StructKey {
            size,
            fields: fields
                .iter()
                .map(|f| (TypeKey::of(f.ty), f.name.clone(), f.offset))
                .collect(),
        };
        *self.structs.entry(key).or_insert_with(|| {
            let needs_mark = fields.iter().any(|f| f.ty.needs_gc_mark());
            let flags = if needs_mark {
                TypeFlags::NEEDS_GC_MARK
            } else {
                TypeFlags::empty()
            };
            let desc = match name {
                Some(name) => format!("struct {name}"),
                None => "struct".to_owned(),
            };
            leak(Type {
                kind: Kind::Struct,
                flags,
                size,
                desc,
                data: TypeData::Struct { name: name.map(|n| n.to_owned()), fields },
            })
        })
    }

    /// Intern a function descriptor from its return type and parameters.
    /// Function values are stored boxed; the box payload is pointer-sized.
    pub fn func(&mut self, ret: TypeRef, params: Vec<FuncParam>) -> TypeRef {
        let key = FuncKey {
            ret: TypeKey::of(ret),
            params: params.iter().map(|p| (TypeKey::of(p.ty), p.name.clone())).collect(),
        };
        *self.funcs.entry(key).or_insert_with(|| {
            let mut desc = String::from("fn[");
            for (i, p) in params.iter().enumerate() {
                if i != 0 {
                    desc.push(' ');
                }
                desc.push_str(&p.ty.desc);
            }
            desc.push_str(" -> ");
            desc.push_str(&ret.desc);
            desc.push(']');
            leak(Type {
                kind: Kind::Func,
                flags: TypeFlags::empty(),
                size: PTR_SIZE,
                desc,
                data: TypeData::Func { ret, params },
            })
        })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn simple_desc(kind: Kind, size: usize) -> String {
    match kind {
        Kind::Any => String::from("any"),
        Kind::Nil => String::from("nil"),
        Kind::Bool => String::from("bool"),
        Kind::Type => String::from("type"),
        Kind::Signed => format!("i{}", size * 8),
        Kind::Unsigned => format!("u{}", size * 8),
        Kind::Real => format!("f{}", size * 8),
        _ => unreachable!("composite kinds are not simple"),
    }
}

fn box_ptr_desc(prefix: &str, target: TypeRef, box_type: TypeRef, box_offset: usize) -> String {
    if box_offset == 0 && core::ptr::eq(target, box_type) {
        format!("{}[{}]", prefix, target.desc)
    } else {
        format!("{}[{} @{} in {}]", prefix, target.desc, box_offset, box_type.desc)
    }
}
