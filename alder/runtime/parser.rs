//! The parser: list forms to typed AST nodes.
//!
//! Walks a form tree, resolving type expressions through the registry and
//! local names to stack indices. Source locations come from the module's
//! source map, keyed by cons identity.
//!
//! Surface handled:
//! - toplevel: `(def name expr)`
//! - expressions: `(fn params body...)`, `(fn (: params return-type) body...)`,
//!   `(if pred then else)`, `(while pred body...)`,
//!   `(let ((name val) ...) body...)`, `(set! name expr)`, `(quote x)`, calls
//! - parameters: bare symbol, or `(: name T)` resolved through `parse_type`
//! - type expressions: `T`, `(array T)`, `(array T N)`, `(ptr T)`

use std::ptr;

use alder_gc::{Any, FuncParam, TypeRef};

use crate::runtime::ast::{new_func, AstKind, AstNode};
use crate::runtime::error::{SourceError, SourceLoc, SourceResult};
use crate::runtime::ops::{to_u64, to_unsigned};
use crate::runtime::symbol::{lookup_primitive_type, SymbolRef};
use crate::runtime::task::Task;
use crate::runtime::type_index::types;
use crate::runtime::values::{
    as_symbol, car, cdr, cons_ptr, is_cons, is_nil, is_unsigned, type_of,
};

/// Parse a whole module: a list of toplevel forms.
pub fn parse_module(task: &mut Task, forms: Any) -> SourceResult<AstNode> {
    let mut parser = Parser { task, locals: Vec::new() };
    let loc = parser.loc_of(forms);
    let items = parser.list_items(forms)?;
    let mut exprs = Vec::with_capacity(items.len());
    for item in items {
        exprs.push(parser.parse_toplevel_form(item)?);
    }
    Ok(AstNode::new(loc, types().any, AstKind::Block { exprs }))
}

/// Parse a single toplevel form.
pub fn parse_toplevel(task: &mut Task, form: Any) -> SourceResult<AstNode> {
    let mut parser = Parser { task, locals: Vec::new() };
    parser.parse_toplevel_form(form)
}

struct Parser<'t> {
    task: &'t mut Task,
    /// Names of in-scope locals; a name's position is its stack index
    /// relative to the frame base.
    locals: Vec<SymbolRef>,
}

impl Parser<'_> {
    fn loc_of(&self, form: Any) -> SourceLoc {
        if is_cons(form) {
            self.task
                .module
                .source_loc(cons_ptr(form).as_ptr())
                .unwrap_or_default()
        } else {
            SourceLoc::default()
        }
    }

    fn error(&self, form: Any, message: impl Into<String>) -> SourceError {
        SourceError::new(self.loc_of(form), message)
    }

    /// Collect the items of a proper list.
    fn list_items(&self, form: Any) -> SourceResult<Vec<Any>> {
        let mut items = Vec::new();
        let mut cursor = form;
        while is_cons(cursor) {
            items.push(car(cursor));
            cursor = cdr(cursor);
        }
        if !is_nil(cursor) {
            return Err(self.error(form, "expected a proper list"));
        }
        Ok(items)
    }

    fn local_index(&self, name: SymbolRef) -> Option<u32> {
        self.locals
            .iter()
            .rposition(|local| ptr::eq(*local, name))
            .map(|index| index as u32)
    }

    fn parse_toplevel_form(&mut self, form: Any) -> SourceResult<AstNode> {
        if is_cons(form) {
            if let Some(head) = as_symbol(car(form)) {
                if head.name() == "def" {
                    return self.parse_def(form);
                }
            }
        }
        self.parse_expr(form)
    }

    fn parse_def(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() != 3 {
            return Err(self.error(form, "def requires a name and an expression"));
        }
        let name = as_symbol(items[1])
            .ok_or_else(|| self.error(form, "def requires a symbol name"))?;
        let expr = self.parse_expr(items[2])?;
        Ok(AstNode::new(
            self.loc_of(form),
            expr.result_type,
            AstKind::DefGlobal { name, expr: Box::new(expr) },
        ))
    }

    fn parse_expr(&mut self, form: Any) -> SourceResult<AstNode> {
        if is_cons(form) {
            if let Some(head) = as_symbol(car(form)) {
                match head.name() {
                    "quote" => return self.parse_quote(form),
                    "fn" => return self.parse_fn(form),
                    "if" => return self.parse_if(form),
                    "while" => return self.parse_while(form),
                    "let" => return self.parse_let(form),
                    "set!" => return self.parse_set(form),
                    "def" => {
                        return Err(self.error(form, "can only define globals at toplevel"))
                    }
                    _ => {}
                }
            }
            self.parse_call(form)
        } else if let Some(name) = as_symbol(form) {
            match self.local_index(name) {
                Some(stack_index) => Ok(AstNode::new(
                    self.loc_of(form),
                    types().any,
                    AstKind::GetLocal { stack_index },
                )),
                None => Ok(AstNode::new(
                    self.loc_of(form),
                    types().any,
                    AstKind::GetGlobal { name },
                )),
            }
        } else {
            // Self-evaluating atom: number, bool, string, nil.
            Ok(AstNode::new(
                self.loc_of(form),
                type_of(form),
                AstKind::Literal { value: form },
            ))
        }
    }

    fn parse_quote(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() != 2 {
            return Err(self.error(form, "quote requires exactly one form"));
        }
        Ok(AstNode::new(
            self.loc_of(form),
            type_of(items[1]),
            AstKind::Literal { value: items[1] },
        ))
    }

    fn parse_if(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() != 4 {
            return Err(self.error(form, "if requires a predicate, a then and an else form"));
        }
        let pred = self.parse_expr(items[1])?;
        let then_expr = self.parse_expr(items[2])?;
        let else_expr = self.parse_expr(items[3])?;
        Ok(AstNode::new(
            self.loc_of(form),
            types().any,
            AstKind::Cond {
                pred: Box::new(pred),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
        ))
    }

    fn parse_while(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() < 2 {
            return Err(self.error(form, "while requires a predicate"));
        }
        let pred = self.parse_expr(items[1])?;
        let body = self.parse_body(form, &items[2..])?;
        Ok(AstNode::new(
            self.loc_of(form),
            types().any,
            AstKind::Loop { pred: Box::new(pred), body: Box::new(body) },
        ))
    }

    fn parse_let(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() < 2 {
            return Err(self.error(form, "let requires a binding list"));
        }
        let bindings = self.list_items(items[1])?;
        let base = self.locals.len();

        // Bindings are sequential: each init sees the locals bound before it.
        let mut exprs = Vec::with_capacity(bindings.len() + items.len() - 2);
        for binding in &bindings {
            let pair = self.list_items(*binding)?;
            if pair.len() != 2 {
                return Err(self.error(*binding, "let binding requires a name and a value"));
            }
            let name = as_symbol(pair[0])
                .ok_or_else(|| self.error(*binding, "let binding requires a symbol name"))?;
            let init = self.parse_expr(pair[1])?;
            let stack_index = self.locals.len() as u32;
            self.locals.push(name);
            exprs.push(AstNode::new(
                self.loc_of(*binding),
                init.result_type,
                AstKind::SetLocal { stack_index, expr: Box::new(init) },
            ));
        }

        let body = self.parse_body(form, &items[2..]);
        self.locals.truncate(base);
        let body = body?;
        let result_type = body.result_type;
        exprs.push(body);

        let block = AstNode::new(self.loc_of(form), result_type, AstKind::Block { exprs });
        Ok(AstNode::new(
            self.loc_of(form),
            result_type,
            AstKind::Scope {
                var_count: bindings.len() as u32,
                expr: Box::new(block),
            },
        ))
    }

    fn parse_set(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() != 3 {
            return Err(self.error(form, "set! requires a name and an expression"));
        }
        let name = as_symbol(items[1])
            .ok_or_else(|| self.error(form, "set! requires a symbol name"))?;
        let stack_index = self
            .local_index(name)
            .ok_or_else(|| self.error(form, format!("no local with name '{}'", name.name())))?;
        let expr = self.parse_expr(items[2])?;
        Ok(AstNode::new(
            self.loc_of(form),
            expr.result_type,
            AstKind::SetLocal { stack_index, expr: Box::new(expr) },
        ))
    }

    /// Parse a body form sequence into a block.
    fn parse_body(&mut self, parent: Any, forms: &[Any]) -> SourceResult<AstNode> {
        let mut exprs = Vec::with_capacity(forms.len());
        for form in forms {
            exprs.push(self.parse_expr(*form)?);
        }
        let result_type = exprs.last().map_or(types().nil, |e| e.result_type);
        Ok(AstNode::new(
            self.loc_of(parent),
            result_type,
            AstKind::Block { exprs },
        ))
    }

    fn parse_call(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.is_empty() {
            return Err(self.error(form, "cannot call an empty form"));
        }
        let callee = self.parse_expr(items[0])?;
        let mut args = Vec::with_capacity(items.len() - 1);
        for item in &items[1..] {
            args.push(self.parse_expr(*item)?);
        }
        Ok(AstNode::new(
            self.loc_of(form),
            types().any,
            AstKind::Call { callee: Box::new(callee), args },
        ))
    }

    /// `(fn params body...)` or `(fn (: params return-type) body...)`.
    ///
    /// `params` is a list of parameter forms: a bare symbol takes type `any`,
    /// `(: name T)` resolves `T` through `parse_type`.
    fn parse_fn(&mut self, form: Any) -> SourceResult<AstNode> {
        let items = self.list_items(form)?;
        if items.len() < 2 {
            return Err(self.error(form, "fn requires a parameter list"));
        }

        // An annotated parameter list (: params return-type) fixes the
        // return type; otherwise it is any.
        let (params_form, return_type) = match self.annotated_form(items[1])? {
            Some((subject, type_form)) => {
                (subject, self.parse_type(items[1], type_form)?)
            }
            None => (items[1], types().any),
        };

        let mut params = Vec::new();
        let mut names = Vec::new();
        for param in self.list_items(params_form)? {
            if let Some(name) = as_symbol(param) {
                params.push(FuncParam::new(types().any, name.name()));
                names.push(name);
            } else {
                let (subject, type_form) = self
                    .annotated_form(param)?
                    .ok_or_else(|| self.error(param, "invalid parameter"))?;
                let name = as_symbol(subject)
                    .ok_or_else(|| self.error(param, "invalid parameter name"))?;
                let ty = self.parse_type(param, type_form)?;
                params.push(FuncParam::new(ty, name.name()));
                names.push(name);
            }
        }

        // The function body opens a fresh frame: only parameters in scope.
        let saved_locals = std::mem::replace(&mut self.locals, names);
        let body = self.parse_body(form, &items[2..]);
        self.locals = saved_locals;
        let mut body = body?;
        body.result_type = return_type;

        let func_type = types().func(return_type, params);
        let boxed_func = types().boxed(func_type);
        let body_ptr = self.task.module.own_fn_body(body);
        let value = new_func(self.task, boxed_func, body_ptr);
        Ok(AstNode::new(
            self.loc_of(form),
            boxed_func,
            AstKind::Literal { value },
        ))
    }

    /// Match a `(: subject T)` annotation form, returning `(subject, T)`.
    fn annotated_form(&self, form: Any) -> SourceResult<Option<(Any, Any)>> {
        if !is_cons(form) {
            return Ok(None);
        }
        match as_symbol(car(form)) {
            Some(head) if head.name() == ":" => {
                let items = self.list_items(form)?;
                if items.len() != 3 {
                    return Err(self.error(form, "invalid type annotation"));
                }
                Ok(Some((items[1], items[2])))
            }
            _ => Ok(None),
        }
    }

    /// Resolve a type expression: `T`, `(array T)`, `(array T N)`, `(ptr T)`.
    fn parse_type(&mut self, parent_form: Any, form: Any) -> SourceResult<TypeRef> {
        if !is_cons(form) {
            let symbol = as_symbol(form)
                .ok_or_else(|| self.error(parent_form, "invalid type"))?;
            return lookup_primitive_type(symbol)
                .ok_or_else(|| {
                    self.error(parent_form, format!("unrecognized type: {}", symbol.name()))
                });
        }

        let items = self.list_items(form)?;
        let head = as_symbol(items[0])
            .ok_or_else(|| self.error(form, "invalid type"))?;
        match head.name() {
            "array" => {
                if items.len() < 2 || items.len() > 3 {
                    return Err(self.error(form, "invalid array type"));
                }
                let elem = self.parse_type(form, items[1])?;
                let length = if items.len() == 3 {
                    let count = to_unsigned(items[2]);
                    if !is_unsigned(count) {
                        return Err(
                            self.error(form, "invalid array type. expected element count")
                        );
                    }
                    to_u64(count) as usize
                } else {
                    0
                };
                Ok(types().array(elem, length))
            }
            "ptr" => {
                if items.len() != 2 {
                    return Err(self.error(form, "invalid pointer type"));
                }
                let target = self.parse_type(form, items[1])?;
                Ok(types().ptr(target))
            }
            name => Err(self.error(form, format!("unrecognized type: {name}"))),
        }
    }
}
