//! The evaluator: a tree-walking interpreter over typed AST nodes.
//!
//! Values live on a fixed-depth stack; each call installs a new frame base
//! and pushes its arguments, so `GetLocal`/`SetLocal` index relative to the
//! current frame. Errors abort evaluation with the offending node's source
//! location.

use std::ptr;

use alder_gc::{Any, Kind};

use crate::runtime::ast::{func_body, AstKind, AstNode};
use crate::runtime::error::{SourceError, SourceResult};
use crate::runtime::ops::to_bool;
use crate::runtime::task::Task;
use crate::runtime::type_index::types;
use crate::runtime::values::{is_func, type_of};

/// Maximum depth of the value stack, in slots.
const STACK_CAPACITY: usize = 4096;

pub struct Evaluator<'t> {
    task: &'t mut Task,
    stack: Vec<Any>,
    frame_base: usize,
}

impl<'t> Evaluator<'t> {
    pub fn new(task: &'t mut Task) -> Evaluator<'t> {
        Evaluator { task, stack: Vec::with_capacity(STACK_CAPACITY), frame_base: 0 }
    }

    pub fn task(&mut self) -> &mut Task {
        self.task
    }

    fn error(&self, node: &AstNode, message: impl Into<String>) -> SourceError {
        SourceError::new(node.loc, message)
    }

    fn reserve(&mut self, node: &AstNode, slots: usize) -> SourceResult<()> {
        if self.stack.len() + slots > STACK_CAPACITY {
            return Err(self.error(node, "value stack overflow"));
        }
        Ok(())
    }

    /// Evaluate a toplevel node. `def` is only meaningful here.
    pub fn eval_toplevel(&mut self, node: &AstNode) -> SourceResult<Any> {
        match &node.kind {
            AstKind::Block { exprs } => {
                let mut result = Any::nil();
                for expr in exprs {
                    result = self.eval_toplevel(expr)?;
                }
                Ok(result)
            }
            AstKind::DefGlobal { name, expr } => {
                let name = *name;
                if self.task.module.global(name).is_some() {
                    return Err(self.error(
                        node,
                        format!(
                            "redefinition of already defined toplevel name: {}",
                            name.name()
                        ),
                    ));
                }
                let value = self.eval_expr(expr)?;
                self.task.module.define_global(name, value);
                Ok(value)
            }
            _ => self.eval_expr(node),
        }
    }

    pub fn eval_expr(&mut self, node: &AstNode) -> SourceResult<Any> {
        match &node.kind {
            AstKind::Literal { value } => Ok(*value),

            AstKind::Scope { var_count, expr } => {
                let slots = *var_count as usize;
                self.reserve(node, slots)?;
                for _ in 0..slots {
                    self.stack.push(Any::nil());
                }
                let result = self.eval_expr(expr);
                self.stack.truncate(self.stack.len() - slots);
                result
            }

            AstKind::Block { exprs } => {
                let mut result = Any::nil();
                for expr in exprs {
                    result = self.eval_expr(expr)?;
                }
                Ok(result)
            }

            AstKind::GetGlobal { name } => {
                let name = *name;
                self.task.module.global(name).ok_or_else(|| {
                    self.error(
                        node,
                        format!("no toplevel item with name '{}' found", name.name()),
                    )
                })
            }

            AstKind::GetLocal { stack_index } => {
                Ok(self.stack[self.frame_base + *stack_index as usize])
            }

            AstKind::SetLocal { stack_index, expr } => {
                let value = self.eval_expr(expr)?;
                self.stack[self.frame_base + *stack_index as usize] = value;
                Ok(value)
            }

            AstKind::Cond { pred, then_expr, else_expr } => {
                let pred_value = self.eval_expr(pred)?;
                if type_of(pred_value).kind() != Kind::Bool {
                    return Err(
                        self.error(node, "boolean value required for conditional predicate")
                    );
                }
                if to_bool(pred_value) {
                    self.eval_expr(then_expr)
                } else {
                    self.eval_expr(else_expr)
                }
            }

            AstKind::Loop { pred, body } => {
                let mut result = Any::nil();
                loop {
                    let pred_value = self.eval_expr(pred)?;
                    if type_of(pred_value).kind() != Kind::Bool {
                        return Err(
                            self.error(node, "boolean value required for loop predicate")
                        );
                    }
                    if !to_bool(pred_value) {
                        break;
                    }
                    result = self.eval_expr(body)?;
                }
                Ok(result)
            }

            AstKind::Call { callee, args } => self.eval_call(node, callee, args),

            AstKind::DefGlobal { .. } => {
                Err(self.error(node, "can only define globals at toplevel"))
            }
        }
    }

    fn eval_call(&mut self, node: &AstNode, callee: &AstNode, args: &[AstNode]) -> SourceResult<Any> {
        let callee_value = self.eval_expr(callee)?;
        if !is_func(callee_value) {
            return Err(self.error(node, "expected a callable value"));
        }
        let func_type = type_of(callee_value).target_type();
        let (_, params) = func_type.signature();
        if args.len() != params.len() {
            return Err(self.error(
                node,
                format!("expected {} arguments, got {}", params.len(), args.len()),
            ));
        }

        let mut arg_values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(params) {
            let value = self.eval_expr(arg)?;
            // Arguments match their parameter by descriptor identity; an
            // `any` parameter accepts everything.
            if !ptr::eq(param.ty, types().any) && !ptr::eq(type_of(value), param.ty) {
                return Err(self.error(
                    arg,
                    format!(
                        "argument type mismatch: expected {}, got {}",
                        param.ty.desc(),
                        type_of(value).desc()
                    ),
                ));
            }
            arg_values.push(value);
        }

        self.reserve(node, arg_values.len())?;
        let saved_base = self.frame_base;
        self.frame_base = self.stack.len();
        self.stack.extend(arg_values);

        let body = func_body(callee_value);
        let result = self.eval_expr(unsafe { body.as_ref() });

        self.stack.truncate(self.frame_base);
        self.frame_base = saved_base;
        result
    }
}

/// Evaluate a parsed module or single toplevel node against the task.
pub fn eval(task: &mut Task, node: &AstNode) -> SourceResult<Any> {
    Evaluator::new(task).eval_toplevel(node)
}
