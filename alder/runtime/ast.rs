//! Typed AST nodes produced by the parser and walked by the evaluator.

use std::fmt::Write;
use std::mem::size_of;
use std::ptr::NonNull;

use alder_gc::{Any, Kind, TypeRef};

use crate::runtime::error::SourceLoc;
use crate::runtime::printer::display;
use crate::runtime::symbol::SymbolRef;
use crate::runtime::task::Task;
use crate::runtime::values::is_func;

#[derive(Debug)]
pub struct AstNode {
    pub loc: SourceLoc,
    pub result_type: TypeRef,
    pub kind: AstKind,
}

#[derive(Debug)]
pub enum AstKind {
    /// A constant value.
    Literal { value: Any },
    /// Reserves `var_count` stack slots around `expr`.
    Scope { var_count: u32, expr: Box<AstNode> },
    /// Evaluates children in order, yielding the last.
    Block { exprs: Vec<AstNode> },
    GetGlobal { name: SymbolRef },
    GetLocal { stack_index: u32 },
    SetLocal { stack_index: u32, expr: Box<AstNode> },
    Cond { pred: Box<AstNode>, then_expr: Box<AstNode>, else_expr: Box<AstNode> },
    Loop { pred: Box<AstNode>, body: Box<AstNode> },
    Call { callee: Box<AstNode>, args: Vec<AstNode> },
    /// Toplevel definition; rejected in expression position.
    DefGlobal { name: SymbolRef, expr: Box<AstNode> },
}

impl AstNode {
    pub fn new(loc: SourceLoc, result_type: TypeRef, kind: AstKind) -> AstNode {
        AstNode { loc, result_type, kind }
    }
}

/// The payload of a boxed function value. The body AST is owned by the
/// module the function was parsed in.
#[repr(C)]
pub struct Func {
    pub body: NonNull<AstNode>,
}

/// Allocate a function box. `ptr_type` must be a boxed pointer to a function
/// descriptor.
pub fn new_func(task: &mut Task, ptr_type: TypeRef, body: NonNull<AstNode>) -> Any {
    debug_assert_eq!(ptr_type.kind(), Kind::Ptr);
    debug_assert_eq!(ptr_type.target_type().kind(), Kind::Func);
    let payload = task.heap.alloc(size_of::<Func>());
    unsafe {
        (*(payload.as_ptr() as *mut Func)).body = body;
    }
    Any::from_ptr(ptr_type, payload.as_ptr())
}

/// The body of a boxed function value.
pub fn func_body(any: Any) -> NonNull<AstNode> {
    assert!(is_func(any), "expected a function value");
    unsafe { (*(any.as_raw_ptr() as *const Func)).body }
}

/// Render an indented debug dump of an AST: node kind plus result type.
pub fn dump_ast(node: &AstNode) -> String {
    let mut out = String::new();
    write_node(&mut out, node, 0);
    out
}

fn write_header(out: &mut String, name: &str, node: &AstNode, indent: usize) {
    let _ = writeln!(out, "{:indent$}{}: {}", "", name, node.result_type.desc());
}

fn write_node(out: &mut String, node: &AstNode, indent: usize) {
    match &node.kind {
        AstKind::Literal { value } => {
            write_header(out, "literal", node, indent);
            if is_func(*value) {
                let body = unsafe { func_body(*value).as_ref() };
                write_node(out, body, indent + 4);
            } else {
                let _ = writeln!(out, "{:indent$}{}", "", display(*value), indent = indent + 4);
            }
        }
        AstKind::Scope { expr, .. } => {
            write_header(out, "scope", node, indent);
            write_node(out, expr, indent + 4);
        }
        AstKind::Block { exprs } => {
            write_header(out, "block", node, indent);
            for expr in exprs {
                write_node(out, expr, indent + 4);
            }
        }
        AstKind::GetGlobal { name } => {
            let _ = writeln!(
                out,
                "{:indent$}get_global {}: {}",
                "",
                name.name(),
                node.result_type.desc()
            );
        }
        AstKind::GetLocal { stack_index } => {
            let _ = writeln!(
                out,
                "{:indent$}get_local {}: {}",
                "",
                stack_index,
                node.result_type.desc()
            );
        }
        AstKind::SetLocal { stack_index, expr } => {
            let _ = writeln!(
                out,
                "{:indent$}set_local {}: {}",
                "",
                stack_index,
                node.result_type.desc()
            );
            write_node(out, expr, indent + 4);
        }
        AstKind::Cond { pred, then_expr, else_expr } => {
            write_header(out, "cond", node, indent);
            write_node(out, pred, indent + 4);
            write_node(out, then_expr, indent + 4);
            write_node(out, else_expr, indent + 4);
        }
        AstKind::Loop { pred, body } => {
            write_header(out, "loop", node, indent);
            write_node(out, pred, indent + 4);
            write_node(out, body, indent + 4);
        }
        AstKind::Call { callee, args } => {
            write_header(out, "call", node, indent);
            write_node(out, callee, indent + 4);
            for arg in args {
                write_node(out, arg, indent + 4);
            }
        }
        AstKind::DefGlobal { name, expr } => {
            let _ = writeln!(
                out,
                "{:indent$}def {}: {}",
                "",
                name.name(),
                node.result_type.desc()
            );
            write_node(out, expr, indent + 4);
        }
    }
}
