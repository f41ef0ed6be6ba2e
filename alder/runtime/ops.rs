//! Scalar constructors, coercions and equality over `Any` values.

use alder_gc::{Any, Kind, Payload, Type, TypeRef};

use crate::runtime::type_index::types;
use crate::runtime::values::type_of;

// ============================================================================
// Scalar constructors
// ============================================================================

macro_rules! scalar_ctor {
    ($name:ident, $ty:ty, $field:ident, $desc:ident) => {
        #[inline]
        pub fn $name(value: $ty) -> Any {
            Any::new(types().$desc, Payload { $field: value })
        }
    };
}

scalar_ctor!(new_u8, u8, u8, u8);
scalar_ctor!(new_u16, u16, u16, u16);
scalar_ctor!(new_u32, u32, u32, u32);
scalar_ctor!(new_u64, u64, u64, u64);

scalar_ctor!(new_i8, i8, i8, i8);
scalar_ctor!(new_i16, i16, i16, i16);
scalar_ctor!(new_i32, i32, i32, i32);
scalar_ctor!(new_i64, i64, i64, i64);

scalar_ctor!(new_f32, f32, f32, f32);
scalar_ctor!(new_f64, f64, f64, f64);

scalar_ctor!(new_bool, bool, boolean, bool);

/// Wrap a type descriptor as a first-class value.
#[inline]
pub fn new_type(ty: TypeRef) -> Any {
    Any::new(types().type_desc, Payload { ptr: ty as *const Type as *mut u8 })
}

/// The descriptor behind a type value.
pub fn as_type(any: Any) -> Option<TypeRef> {
    if any.kind() == Some(Kind::Type) {
        unsafe { Some(&*(any.as_raw_ptr() as *const Type)) }
    } else {
        None
    }
}

// ============================================================================
// Coercions
// ============================================================================

pub fn to_bool(any: Any) -> bool {
    assert_eq!(type_of(any).kind(), Kind::Bool, "expected a bool");
    unsafe { any.payload().boolean }
}

pub fn to_u64(any: Any) -> u64 {
    let ty = type_of(any);
    assert_eq!(ty.kind(), Kind::Unsigned, "expected an unsigned value");
    let payload = any.payload();
    unsafe {
        match ty.size() {
            1 => payload.u8 as u64,
            2 => payload.u16 as u64,
            4 => payload.u32 as u64,
            _ => payload.u64,
        }
    }
}

pub fn to_i64(any: Any) -> i64 {
    let ty = type_of(any);
    assert_eq!(ty.kind(), Kind::Signed, "expected a signed value");
    let payload = any.payload();
    unsafe {
        match ty.size() {
            1 => payload.i8 as i64,
            2 => payload.i16 as i64,
            4 => payload.i32 as i64,
            _ => payload.i64,
        }
    }
}

pub fn to_f64(any: Any) -> f64 {
    let ty = type_of(any);
    assert_eq!(ty.kind(), Kind::Real, "expected a real value");
    let payload = any.payload();
    unsafe {
        if ty.size() == 4 {
            payload.f32 as f64
        } else {
            payload.f64
        }
    }
}

/// Convert an unsigned value to `i64` when representable; any other value is
/// returned unchanged.
pub fn to_signed(any: Any) -> Any {
    if type_of(any).kind() == Kind::Unsigned {
        let value = to_u64(any);
        if value <= i64::MAX as u64 {
            return new_i64(value as i64);
        }
    }
    any
}

/// Convert a non-negative signed value to `u64`; any other value is returned
/// unchanged.
pub fn to_unsigned(any: Any) -> Any {
    if type_of(any).kind() == Kind::Signed {
        let value = to_i64(any);
        if value >= 0 {
            return new_u64(value as u64);
        }
    }
    any
}

// ============================================================================
// Equality and weakening
// ============================================================================

/// Structural equality over tagged values.
///
/// Numbers compare across signedness after promotion, so `u8(23)` equals
/// `i64(23)`. Pointers (symbols included) compare by address. Functions never
/// compare equal.
pub fn equals(a: Any, b: Any) -> bool {
    if a.is_nil() && b.is_nil() {
        return true;
    }
    if a.is_nil() || b.is_nil() {
        return false;
    }

    let mut a = a;
    let mut b = b;
    if type_of(a).kind() != type_of(b).kind() {
        // Try to unify numeric kinds by promoting to unsigned, then signed.
        if type_of(a).kind() == Kind::Unsigned {
            b = to_unsigned(b);
            if type_of(b).kind() == Kind::Signed {
                a = to_signed(a);
            }
        } else if type_of(b).kind() == Kind::Unsigned {
            a = to_unsigned(a);
            if type_of(a).kind() == Kind::Signed {
                b = to_signed(b);
            }
        } else {
            return false;
        }
        if type_of(a).kind() != type_of(b).kind() {
            return false;
        }
    }

    match type_of(a).kind() {
        Kind::Ptr => unsafe { a.as_raw_ptr() == b.as_raw_ptr() },
        Kind::Bool => to_bool(a) == to_bool(b),
        Kind::Signed => to_i64(a) == to_i64(b),
        Kind::Unsigned => to_u64(a) == to_u64(b),
        Kind::Real => to_f64(a) == to_f64(b),
        _ => false,
    }
}

/// Replace a boxed pointer value's descriptor with its weak counterpart.
/// Non-pointer and non-box values are returned unchanged.
pub fn weak_any(any: Any) -> Any {
    let ty = match any.ty() {
        Some(ty) if ty.kind() == Kind::Ptr => ty,
        _ => return any,
    };
    if ty.box_type().is_none() {
        return any;
    }
    any.with_type(types().weak(ty))
}
