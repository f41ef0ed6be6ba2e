//! The tagged value representation.
//!
//! `Any` is a two-word value: a pointer to the type descriptor plus an inline
//! payload wide enough for any scalar or a pointer. A missing descriptor
//! denotes nil, so zero-initialized memory reads as nil.

use crate::types::{Kind, TypeRef};

/// Inline payload of an `Any`. Wide enough for any scalar or a pointer.
///
/// Which field is meaningful is decided by the accompanying descriptor;
/// reading a field is only sound when the descriptor says so.
#[repr(C)]
#[derive(Clone, Copy)]
pub union Payload {
    pub ptr: *mut u8,
    pub word: usize,
    pub u8: u8,
    pub u16: u16,
    pub u32: u32,
    pub u64: u64,
    pub i8: i8,
    pub i16: i16,
    pub i32: i32,
    pub i64: i64,
    pub f32: f32,
    pub f64: f64,
    pub boolean: bool,
}

impl Payload {
    #[inline]
    pub const fn zeroed() -> Payload {
        Payload { u64: 0 }
    }
}

impl core::fmt::Debug for Payload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Payload(0x{:016x})", unsafe { self.word })
    }
}

/// A discriminated runtime value: type descriptor plus inline payload.
///
/// `Any` has value semantics; ownership of any referent is collective through
/// the GC reachability graph.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Any {
    ty: Option<TypeRef>,
    payload: Payload,
}

impl Any {
    /// The nil value: no descriptor, zero payload.
    #[inline]
    pub const fn nil() -> Any {
        Any { ty: None, payload: Payload::zeroed() }
    }

    #[inline]
    pub fn new(ty: TypeRef, payload: Payload) -> Any {
        Any { ty: Some(ty), payload }
    }

    /// Wrap a pointer value with a pointer descriptor.
    #[inline]
    pub fn from_ptr(ty: TypeRef, ptr: *mut u8) -> Any {
        debug_assert_eq!(ty.kind(), Kind::Ptr);
        Any { ty: Some(ty), payload: Payload { ptr } }
    }

    #[inline]
    pub fn ty(&self) -> Option<TypeRef> {
        self.ty
    }

    #[inline]
    pub fn payload(&self) -> Payload {
        self.payload
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.ty.is_none()
    }

    #[inline]
    pub fn kind(&self) -> Option<Kind> {
        self.ty.map(|t| t.kind())
    }

    /// Read the payload as a raw pointer.
    ///
    /// # Safety
    /// The descriptor must be of pointer kind (or the caller must otherwise
    /// know the payload holds a pointer).
    #[inline]
    pub unsafe fn as_raw_ptr(&self) -> *mut u8 {
        self.payload.ptr
    }

    /// Replace the descriptor, keeping the payload. Used to weaken pointer
    /// values.
    #[inline]
    pub fn with_type(&self, ty: TypeRef) -> Any {
        Any { ty: Some(ty), payload: self.payload }
    }

    /// Address of the descriptor slot, for the collector's weak-edge buffer.
    #[inline]
    pub(crate) fn ty_slot(&mut self) -> *mut Option<TypeRef> {
        &mut self.ty
    }

    /// Address of the payload, for descriptor-driven tracing.
    #[inline]
    pub(crate) fn payload_slot(&mut self) -> *mut Payload {
        &mut self.payload
    }
}

impl Default for Any {
    #[inline]
    fn default() -> Any {
        Any::nil()
    }
}
