//! The printer: descriptor-driven rendering of `Any` values.
//!
//! Lists print in `(a b c)` notation (dotted when improper), strings print
//! quoted with escapes, booleans as `#t`/`#f`, so a printed form reads back
//! structurally equal.

use std::fmt::{self, Write as _};
use std::mem::size_of;

use alder_gc::{Any, Kind, Payload, TypeRef};

use crate::runtime::symbol::Symbol;
use crate::runtime::type_index::types;
use crate::runtime::values::{is_cons, is_nil, type_of, Cons};

/// Display adapter: `println!("{}", display(value))`.
pub fn display(any: Any) -> AnyDisplay {
    AnyDisplay(any)
}

pub struct AnyDisplay(pub Any);

impl fmt::Display for AnyDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_any(f, self.0)
    }
}

fn write_any(f: &mut fmt::Formatter<'_>, any: Any) -> fmt::Result {
    let payload = any.payload();
    unsafe { write_value(f, &payload as *const Payload as *const u8, type_of(any)) }
}

/// Render the value stored at `ptr`, as described by `ty`.
unsafe fn write_value(f: &mut fmt::Formatter<'_>, ptr: *const u8, ty: TypeRef) -> fmt::Result {
    match ty.kind() {
        Kind::Nil => f.write_str("nil"),
        Kind::Any => write_any(f, *(ptr as *const Any)),
        Kind::Ptr => {
            let target = *(ptr as *const *const u8);
            if target.is_null() {
                return f.write_str("nil");
            }
            if std::ptr::eq(ty, types().ptr_symbol) {
                let symbol = &*(target as *const Symbol);
                return f.write_str(symbol.name());
            }
            write_value(f, target, ty.target_type())
        }
        Kind::Struct => {
            if std::ptr::eq(ty, types().string) {
                return write_string(f, ptr);
            }
            if std::ptr::eq(ty, types().symbol) {
                let symbol = &*(ptr as *const Symbol);
                return f.write_str(symbol.name());
            }
            if std::ptr::eq(ty, types().cons) {
                return write_cons(f, ptr as *const Cons);
            }
            f.write_str("{")?;
            let fields = ty.fields();
            for (i, field) in fields.iter().enumerate() {
                write!(f, "{}: ", field.name)?;
                write_value(f, ptr.add(field.offset), field.ty)?;
                if i != fields.len() - 1 {
                    f.write_str(", ")?;
                }
            }
            f.write_str("}")
        }
        Kind::Array => {
            f.write_str("[")?;
            let elem = ty.elem_type();
            let elem_size = elem.size();
            let (mut ptr, length) = if ty.size() != 0 {
                (ptr, ty.size() / elem_size)
            } else {
                (ptr.add(size_of::<usize>()), *(ptr as *const usize))
            };
            for i in 0..length {
                write_value(f, ptr, elem)?;
                ptr = ptr.add(elem_size);
                if i != length - 1 {
                    f.write_str(" ")?;
                }
            }
            f.write_str("]")
        }
        Kind::Bool => f.write_str(if *(ptr as *const bool) { "#t" } else { "#f" }),
        Kind::Signed => match ty.size() {
            1 => write!(f, "{}", *(ptr as *const i8)),
            2 => write!(f, "{}", *(ptr as *const i16)),
            4 => write!(f, "{}", *(ptr as *const i32)),
            _ => write!(f, "{}", *(ptr as *const i64)),
        },
        Kind::Unsigned => match ty.size() {
            1 => write!(f, "{}", *(ptr as *const u8)),
            2 => write!(f, "{}", *(ptr as *const u16)),
            4 => write!(f, "{}", *(ptr as *const u32)),
            _ => write!(f, "{}", *(ptr as *const u64)),
        },
        Kind::Real => {
            // Debug formatting keeps a decimal point, so floats re-read as
            // floats.
            if ty.size() == 4 {
                write!(f, "{:?}", *(ptr as *const f32))
            } else {
                write!(f, "{:?}", *(ptr as *const f64))
            }
        }
        Kind::Func => write!(f, "#<{}>", ty.desc()),
        Kind::Type => {
            let pointee = *(ptr as *const *const alder_gc::Type);
            write!(f, "#<type {}>", (*pointee).desc())
        }
    }
}

unsafe fn write_string(f: &mut fmt::Formatter<'_>, ptr: *const u8) -> fmt::Result {
    let length = *(ptr as *const usize);
    let bytes = std::slice::from_raw_parts(ptr.add(size_of::<usize>()), length);
    // String boxes only ever hold the UTF-8 the reader stored.
    let text = std::str::from_utf8_unchecked(bytes);
    f.write_str("\"")?;
    for ch in text.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            _ => f.write_char(ch)?,
        }
    }
    f.write_str("\"")
}

unsafe fn write_cons(f: &mut fmt::Formatter<'_>, mut cons: *const Cons) -> fmt::Result {
    f.write_str("(")?;
    let mut first = true;
    loop {
        if !first {
            f.write_str(" ")?;
        }
        first = false;
        write_any(f, (*cons).car)?;
        let cdr = (*cons).cdr;
        if is_nil(cdr) {
            break;
        }
        if !is_cons(cdr) {
            f.write_str(" . ")?;
            write_any(f, cdr)?;
            break;
        }
        cons = cdr.as_raw_ptr() as *const Cons;
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ops::{equals, new_bool, new_f64, new_i64, new_u8};
    use crate::runtime::reader::read;
    use crate::runtime::symbol::intern;
    use crate::runtime::task::Task;
    use crate::runtime::values::{car, cdr, new_cons, new_string};

    /// Structural equality over forms: conses recurse, atoms use `equals`.
    fn forms_equal(a: Any, b: Any) -> bool {
        if is_cons(a) && is_cons(b) {
            return forms_equal(car(a), car(b)) && forms_equal(cdr(a), cdr(b));
        }
        equals(a, b)
    }

    #[test]
    fn test_print_atoms() {
        assert_eq!(display(Any::nil()).to_string(), "nil");
        assert_eq!(display(new_i64(-42)).to_string(), "-42");
        assert_eq!(display(new_u8(7)).to_string(), "7");
        assert_eq!(display(new_bool(true)).to_string(), "#t");
        assert_eq!(display(new_f64(4.25)).to_string(), "4.25");
        assert_eq!(display(intern("foo")).to_string(), "foo");
    }

    #[test]
    fn test_float_print_keeps_decimal_point() {
        assert_eq!(display(new_f64(250.0)).to_string(), "250.0");
    }

    #[test]
    fn test_print_list() {
        let mut task = Task::new();
        let form = read(&mut task, "(foo (bar 1) baz)").unwrap();
        assert_eq!(display(form).to_string(), "(foo (bar 1) baz)");
    }

    #[test]
    fn test_print_dotted_pair() {
        let mut task = Task::new();
        let pair = new_cons(&mut task, new_i64(1), new_i64(2));
        assert_eq!(display(pair).to_string(), "(1 . 2)");
    }

    #[test]
    fn test_print_string_escapes() {
        let mut task = Task::new();
        let value = new_string(&mut task, "a\"b\\c\nd");
        assert_eq!(display(value).to_string(), "\"a\\\"b\\\\c\\nd\"");
    }

    #[test]
    fn test_read_print_round_trip() {
        let mut task = Task::new();
        let source = "(foo (bar 1 2.5) \"s\\\"x\" #t #f 'q -3)";
        let form = read(&mut task, source).unwrap();
        let printed = display(form).to_string();
        let reread = read(&mut task, &printed).unwrap();
        assert!(forms_equal(form, reread), "round trip failed: {printed}");
    }
}
