//! The tree-walking evaluator.
//!
//! One `Evaluator` drives one thread of execution: the main module run, or a
//! generator body on its producer thread. All mutable program state lives in
//! the shared [`Ctx`] and in `Arc`-shared values/frames, so the evaluator
//! itself is just control state (recursion depth, the yield port, the
//! currently-handled exception stack).

mod attrs;
mod call;
mod classes;
mod expr;
mod import;
mod iterate;
mod pattern;
mod repr;
mod subscript;

use std::sync::Arc;

use ahash::AHashSet;

use crate::{
    ctx::{Ctx, EventKind, EventPayload},
    env::{Frame, FrameKind},
    exceptions::{ExcType, Raised, RunError, RunResult},
    expressions::{AssignTarget, ExceptClause, ExprLoc, Stmt, StmtLoc, UnpackItem},
    generator::YieldPort,
    value::{FunctionValue, Value, plock},
};

/// Maximum user-level call depth.
pub(crate) const MAX_RECURSION_DEPTH: usize = 500;

/// Non-exceptional control flow out of a statement.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Name-resolution context for a block: the frame plus, for function bodies,
/// the set of names that are local (drives `UnboundLocalError`).
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub frame: Arc<Frame>,
    /// `Some` inside function bodies: every name assigned anywhere in the
    /// function (including parameters).
    pub locals: Option<Arc<AHashSet<Arc<str>>>>,
}

impl Scope {
    pub(crate) fn module(frame: Arc<Frame>) -> Self {
        Self { frame, locals: None }
    }

    pub(crate) fn function(frame: Arc<Frame>, locals: Arc<AHashSet<Arc<str>>>) -> Self {
        Self {
            frame,
            locals: Some(locals),
        }
    }
}

/// The evaluator: one per execution thread.
pub(crate) struct Evaluator {
    pub ctx: Ctx,
    pub(crate) depth: usize,
    /// Set on generator producer threads; `yield` goes through it.
    pub(crate) yield_port: Option<YieldPort>,
    /// Stack of exception instances currently being handled (bare `raise`).
    pub(crate) handling: Vec<Value>,
    /// Stack of (defining class, self) for zero-argument `super()`.
    pub(crate) method_stack: Vec<(Arc<crate::value::ClassValue>, Value)>,
}

impl Evaluator {
    pub(crate) fn new(ctx: Ctx) -> Self {
        Self {
            ctx,
            depth: 0,
            yield_port: None,
            handling: Vec::new(),
            method_stack: Vec::new(),
        }
    }

    pub(crate) fn for_generator(ctx: Ctx, port: YieldPort) -> Self {
        Self {
            ctx,
            depth: 0,
            yield_port: Some(port),
            handling: Vec::new(),
            method_stack: Vec::new(),
        }
    }

    /// Runs a module body; the result is the value of the final expression
    /// statement (or an explicit module-level `return`), `None` otherwise.
    pub(crate) fn run_module(&mut self, body: &[StmtLoc], frame: &Arc<Frame>) -> RunResult<Value> {
        let scope = Scope::module(frame.clone());
        let mut last = Value::None;
        for stmt in body {
            match self.exec_stmt_tracked(stmt, &scope, &mut last)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(value),
                Flow::Break | Flow::Continue => {
                    return Err(RunError::raise(
                        ExcType::SyntaxError,
                        "'break' or 'continue' outside of a loop",
                    )
                    .into_with_line(stmt.line));
                }
            }
        }
        Ok(last)
    }

    fn exec_stmt_tracked(&mut self, stmt: &StmtLoc, scope: &Scope, last: &mut Value) -> RunResult<Flow> {
        if let Stmt::Expr(expr) = &stmt.stmt {
            self.ctx.check_time().map_err(|e| e.into_with_line(stmt.line))?;
            let value = self.eval(expr, scope)?;
            *last = value;
            return Ok(Flow::Normal);
        }
        self.exec_stmt(stmt, scope)
    }

    /// Runs a generator function body on its producer thread.
    pub(crate) fn run_generator_body(&mut self, func: &Arc<FunctionValue>, frame: &Arc<Frame>) -> RunResult<Value> {
        let scope = Scope::function(frame.clone(), func.assigned.clone());
        match self.exec_block(&func.body, &scope)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    // ---- statements --------------------------------------------------------

    pub(crate) fn exec_block(&mut self, body: &[StmtLoc], scope: &Scope) -> RunResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &StmtLoc, scope: &Scope) -> RunResult<Flow> {
        self.ctx.check_time().map_err(|e| e.into_with_line(stmt.line))?;
        let line = stmt.line;
        let result = self.exec_stmt_inner(stmt, scope);
        match result {
            Err(RunError::Raise(raised)) => Err(RunError::Raise(Box::new(raised.with_line(line)))),
            other => other,
        }
    }

    fn exec_stmt_inner(&mut self, stmt: &StmtLoc, scope: &Scope) -> RunResult<Flow> {
        match &stmt.stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign_target(target, value.clone(), scope)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::AnnAssign { target, value, .. } => {
                // annotations are kept (on classes) but not type-checked
                if let Some(value) = value {
                    let value = self.eval(value, scope)?;
                    self.assign_target(target, value, scope)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::AugAssign { target, op, value } => {
                let rhs = self.eval(value, scope)?;
                let current = self.read_target(target, scope, value.line)?;
                let updated = self.binary(*op, &current, &rhs, value.line)?;
                self.assign_target(target, updated, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::If { branches, orelse } => {
                for (arm, (condition, body)) in branches.iter().enumerate() {
                    if self.truthy(condition, scope)? {
                        self.ctx.record(EventKind::Branch, EventPayload::Arm(arm as u32))?;
                        return self.exec_block(body, scope);
                    }
                }
                self.ctx
                    .record(EventKind::Branch, EventPayload::Arm(branches.len() as u32))?;
                match orelse {
                    Some(body) => self.exec_block(body, scope),
                    None => Ok(Flow::Normal),
                }
            }
            Stmt::While {
                condition,
                body,
                orelse,
            } => {
                let mut broke = false;
                loop {
                    self.ctx.check_time().map_err(|e| e.into_with_line(stmt.line))?;
                    if !self.truthy(condition, scope)? {
                        break;
                    }
                    self.ctx.record(EventKind::LoopIter, EventPayload::None)?;
                    match self.exec_block(body, scope)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                if !broke {
                    if let Some(orelse) = orelse {
                        return self.exec_block(orelse, scope);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, scope)?;
                let iterator = self.get_iter(&iterable, iter.line)?;
                let mut broke = false;
                loop {
                    self.ctx.check_time().map_err(|e| e.into_with_line(stmt.line))?;
                    let Some(item) = self.iter_next(&iterator, iter.line)? else {
                        break;
                    };
                    self.ctx.record(EventKind::LoopIter, EventPayload::None)?;
                    self.assign_target(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                if !broke {
                    if let Some(orelse) = orelse {
                        return self.exec_block(orelse, scope);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Pass => Ok(Flow::Normal),
            Stmt::Def(def) => {
                let func = self.make_function(def, scope)?;
                let mut value = func;
                // decorators apply bottom-up
                for decorator in def.decorators.iter().rev() {
                    let dec = self.eval(decorator, scope)?;
                    value = self.call_value(&dec, vec![value], Vec::new(), decorator.line)?;
                }
                self.write_name(&def.name, value, scope)?;
                self.record_assign(&def.name)?;
                Ok(Flow::Normal)
            }
            Stmt::Class(def) => {
                let class = self.exec_class_def(def, scope)?;
                self.write_name(&def.name, class, scope)?;
                self.record_assign(&def.name)?;
                Ok(Flow::Normal)
            }
            Stmt::Import { module, alias } => {
                let value = self.import_module(module, stmt.line)?;
                let bound: Arc<str> = match alias {
                    Some(alias) => alias.clone(),
                    None => match module.split('.').next() {
                        Some(first) if first.len() != module.len() => {
                            // `import a.b` binds `a`, which must itself be importable
                            let first: Arc<str> = Arc::from(first);
                            let value = self.import_module(&first, stmt.line)?;
                            self.write_name(&first, value, scope)?;
                            return Ok(Flow::Normal);
                        }
                        _ => module.clone(),
                    },
                };
                self.write_name(&bound, value, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::FromImport { module, names } => {
                let module_value = self.import_module(module, stmt.line)?;
                for (name, alias) in names {
                    let value = self.module_attr(&module_value, name).ok_or_else(|| {
                        RunError::raise(
                            ExcType::ImportError,
                            format!("cannot import name '{name}' from '{module}'"),
                        )
                    })?;
                    let bound = alias.as_ref().unwrap_or(name).clone();
                    self.write_name(&bound, value, scope)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finally,
            } => self.exec_try(body, handlers, orelse.as_deref(), finally.as_deref(), scope),
            Stmt::Raise { exc, cause } => {
                if let Some(cause) = cause {
                    // `raise X from Y`: the cause is evaluated then discarded
                    self.eval(cause, scope)?;
                }
                match exc {
                    Some(expr) => {
                        let value = self.eval(expr, scope)?;
                        Err(self.raise_value(value, expr.line)?)
                    }
                    None => match self.handling.last().cloned() {
                        Some(current) => Err(self.raise_value(current, stmt.line)?),
                        None => Err(RunError::runtime_error("No active exception to re-raise")),
                    },
                }
            }
            Stmt::With { items, body } => self.exec_with(items, body, scope),
            Stmt::Assert { condition, message } => {
                if self.truthy(condition, scope)? {
                    Ok(Flow::Normal)
                } else {
                    let detail = match message {
                        Some(expr) => {
                            let value = self.eval(expr, scope)?;
                            self.str_value(&value)?
                        }
                        None => String::new(),
                    };
                    Err(RunError::raise(ExcType::AssertionError, detail))
                }
            }
            Stmt::Del(targets) => {
                for target in targets {
                    self.delete_target(target, scope)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Match { subject, cases } => self.exec_match(subject, cases, scope),
            Stmt::Global(names) => {
                for name in names {
                    scope.frame.declare_global(name.clone());
                }
                Ok(Flow::Normal)
            }
            Stmt::Nonlocal(names) => {
                for name in names {
                    if scope.frame.nonlocal_target(name).is_none() {
                        return Err(RunError::raise(
                            ExcType::SyntaxError,
                            format!("no binding for nonlocal '{name}' found"),
                        ));
                    }
                    scope.frame.declare_nonlocal(name.clone());
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_try(
        &mut self,
        body: &[StmtLoc],
        handlers: &[ExceptClause],
        orelse: Option<&[StmtLoc]>,
        finally: Option<&[StmtLoc]>,
        scope: &Scope,
    ) -> RunResult<Flow> {
        let mut outcome = self.exec_block(body, scope);

        match outcome {
            Err(RunError::Raise(raised)) => {
                outcome = self.run_handlers(*raised, handlers, scope);
            }
            Ok(Flow::Normal) => {
                if let Some(orelse) = orelse {
                    outcome = self.exec_block(orelse, scope);
                }
            }
            _ => {}
        }

        if let Some(finally) = finally {
            // suspension tears down without running cleanup: the resumed run
            // replays the try body itself
            if !matches!(outcome, Err(RunError::Suspend)) {
                match self.exec_block(finally, scope) {
                    Ok(Flow::Normal) => {}
                    // a finally exit replaces any pending outcome
                    other => outcome = other,
                }
            }
        }
        outcome
    }

    fn run_handlers(&mut self, raised: Raised, handlers: &[ExceptClause], scope: &Scope) -> RunResult<Flow> {
        for handler in handlers {
            if !self.handler_matches(&handler.exc_class, &raised, scope)? {
                continue;
            }
            let instance = self.materialize_exception(&raised);
            if let Some(binding) = &handler.binding {
                self.write_name(binding, instance.clone(), scope)?;
            }
            self.handling.push(instance);
            let result = self.exec_block(&handler.body, scope);
            self.handling.pop();
            return result;
        }
        Err(RunError::Raise(Box::new(raised)))
    }

    /// Does this `except` clause match the raised exception? `None` (bare
    /// `except:`) matches everything catchable.
    fn handler_matches(&mut self, exc_class: &Option<ExprLoc>, raised: &Raised, scope: &Scope) -> RunResult<bool> {
        let Some(class_expr) = exc_class else {
            return Ok(true);
        };
        let class_value = self.eval(class_expr, scope)?;
        let raised_class = self.exception_class_of(raised);
        let classes = match &class_value {
            Value::Tuple(items) => items.to_vec(),
            other => vec![other.clone()],
        };
        for candidate in classes {
            let Value::Class(handler_class) = candidate else {
                return Err(RunError::type_error(
                    "catching classes that do not inherit from Exception is not allowed",
                ));
            };
            if raised_class.is_subclass(&handler_class) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn exec_with(
        &mut self,
        items: &[(ExprLoc, Option<AssignTarget>)],
        body: &[StmtLoc],
        scope: &Scope,
    ) -> RunResult<Flow> {
        let Some(((cm_expr, target), rest)) = items.split_first() else {
            return self.exec_block(body, scope);
        };
        let cm = self.eval(cm_expr, scope)?;
        let has_dunders = self.has_attr_method(&cm, "__enter__");
        let entered = if has_dunders {
            self.call_method(&cm, "__enter__", vec![], cm_expr.line)?
        } else {
            // plain values act as degenerate context managers
            cm.clone()
        };
        if let Some(target) = target {
            self.assign_target(target, entered, scope)?;
        }

        let outcome = if rest.is_empty() {
            self.exec_block(body, scope)
        } else {
            self.exec_with(rest, body, scope)
        };

        if matches!(outcome, Err(RunError::Suspend)) {
            return outcome;
        }
        if !self.has_attr_method(&cm, "__exit__") {
            return outcome;
        }
        match outcome {
            Err(RunError::Raise(raised)) => {
                let instance = self.materialize_exception(&raised);
                let exc_class = Value::Class(self.exception_class_of(&raised));
                let suppress = self.call_method(&cm, "__exit__", vec![exc_class, instance, Value::None], cm_expr.line)?;
                if self.value_truthy(&suppress)? {
                    Ok(Flow::Normal)
                } else {
                    Err(RunError::Raise(raised))
                }
            }
            outcome => {
                self.call_method(&cm, "__exit__", vec![Value::None, Value::None, Value::None], cm_expr.line)?;
                outcome
            }
        }
    }

    // ---- names and targets --------------------------------------------------

    pub(crate) fn record_assign(&self, name: &str) -> RunResult<()> {
        self.ctx
            .record(EventKind::Assign, EventPayload::Name(name.to_owned()))
            .map(|_| ())
    }

    /// Reads a name per scoping rules: declarations, locals, enclosing
    /// chain, builtins.
    pub(crate) fn read_name(&mut self, name: &str, scope: &Scope, line: u32) -> RunResult<Value> {
        if scope.frame.is_declared_global(name) {
            return scope
                .frame
                .module_frame()
                .get_local(name)
                .ok_or_else(|| RunError::name_error(name));
        }
        if scope.frame.is_declared_nonlocal(name) {
            if let Some(target) = scope.frame.nonlocal_target(name) {
                if let Some(value) = target.get_local(name) {
                    return Ok(value);
                }
            }
            return Err(RunError::name_error(name));
        }
        if let Some(value) = scope.frame.get_local(name) {
            return Ok(value);
        }
        if let Some(locals) = &scope.locals {
            if locals.contains(name) {
                return Err(RunError::raise(
                    ExcType::UnboundLocalError,
                    format!("local variable '{name}' referenced before assignment"),
                ));
            }
        }
        if let Some(value) = scope.frame.lookup(name) {
            return Ok(value);
        }
        self.builtin_name(name, line)
    }

    /// Builtin-scope resolution, including the deliberate feature rejections.
    fn builtin_name(&mut self, name: &str, _line: u32) -> RunResult<Value> {
        match name {
            "exec" | "eval" | "compile" => {
                return Err(RunError::not_implemented(&format!("{name}()")));
            }
            _ => {}
        }
        if let Some(value) = self.ctx.inner.classes.lookup_name(name) {
            return Ok(value);
        }
        if let Some(value) = crate::builtins::lookup(name) {
            return Ok(value);
        }
        Err(RunError::name_error(name))
    }

    /// Writes a name respecting `global`/`nonlocal` declarations.
    pub(crate) fn write_name(&mut self, name: &Arc<str>, value: Value, scope: &Scope) -> RunResult<()> {
        if scope.frame.is_declared_global(name) {
            scope.frame.module_frame().set_local(name.clone(), value);
            return Ok(());
        }
        if scope.frame.is_declared_nonlocal(name) {
            if let Some(target) = scope.frame.nonlocal_target(name) {
                target.set_local(name.clone(), value);
                return Ok(());
            }
            return Err(RunError::name_error(name));
        }
        scope.frame.set_local(name.clone(), value);
        Ok(())
    }

    /// Walrus writes bind in the nearest non-comprehension frame.
    pub(crate) fn write_name_skip_comprehension(
        &mut self,
        name: &Arc<str>,
        value: Value,
        scope: &Scope,
    ) -> RunResult<()> {
        let mut frame = scope.frame.clone();
        while frame.kind == FrameKind::Comprehension {
            match &frame.parent {
                Some(parent) => frame = parent.clone(),
                None => break,
            }
        }
        frame.set_local(name.clone(), value);
        Ok(())
    }

    pub(crate) fn assign_target(&mut self, target: &AssignTarget, value: Value, scope: &Scope) -> RunResult<()> {
        match target {
            AssignTarget::Name(name) => {
                self.write_name(name, value, scope)?;
                self.record_assign(name)
            }
            AssignTarget::Attr { value: obj, name } => {
                let obj = self.eval(obj, scope)?;
                self.set_attr(&obj, name, value)
            }
            AssignTarget::Subscript { value: obj, index } => {
                let line = obj.line;
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                self.set_item(&obj, &index, value, line)
            }
            AssignTarget::Unpack(items) => self.assign_unpack(items, value, scope),
        }
    }

    fn assign_unpack(&mut self, items: &[UnpackItem], value: Value, scope: &Scope) -> RunResult<()> {
        let star_pos = items.iter().position(|i| matches!(i, UnpackItem::Starred(_)));
        let values = self.collect_for_unpack(&value)?;
        match star_pos {
            None => {
                if values.len() < items.len() {
                    return Err(RunError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        items.len(),
                        values.len()
                    )));
                }
                if values.len() > items.len() {
                    return Err(RunError::value_error(format!(
                        "too many values to unpack (expected {})",
                        items.len()
                    )));
                }
                for (item, v) in items.iter().zip(values) {
                    let UnpackItem::Target(t) = item else { unreachable!() };
                    self.assign_target(t, v, scope)?;
                }
                Ok(())
            }
            Some(star) => {
                let before = star;
                let after = items.len() - star - 1;
                if values.len() < before + after {
                    return Err(RunError::value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        before + after,
                        values.len()
                    )));
                }
                for (item, v) in items[..before].iter().zip(values[..before].iter()) {
                    let UnpackItem::Target(t) = item else { unreachable!() };
                    self.assign_target(t, v.clone(), scope)?;
                }
                let middle: Vec<Value> = values[before..values.len() - after].to_vec();
                let UnpackItem::Starred(star_target) = &items[star] else {
                    unreachable!()
                };
                self.assign_target(star_target, Value::list(middle), scope)?;
                for (item, v) in items[star + 1..].iter().zip(values[values.len() - after..].iter()) {
                    let UnpackItem::Target(t) = item else { unreachable!() };
                    self.assign_target(t, v.clone(), scope)?;
                }
                Ok(())
            }
        }
    }

    /// Materialises an iterable for unpacking (strictly finite sources).
    fn collect_for_unpack(&mut self, value: &Value) -> RunResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(plock(items).clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            _ => {
                let iterator = self.get_iter(value, 0)?;
                let mut out = Vec::new();
                while let Some(item) = self.iter_next(&iterator, 0)? {
                    out.push(item);
                    if out.len() > 1_000_000 {
                        return Err(RunError::value_error("too many values to unpack"));
                    }
                }
                Ok(out)
            }
        }
    }

    /// Reads the current value of an augmented-assignment target.
    fn read_target(&mut self, target: &AssignTarget, scope: &Scope, line: u32) -> RunResult<Value> {
        match target {
            AssignTarget::Name(name) => self.read_name(name, scope, line),
            AssignTarget::Attr { value, name } => {
                let obj = self.eval(value, scope)?;
                self.get_attr(&obj, name, line)
            }
            AssignTarget::Subscript { value, index } => {
                let obj = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                self.get_item(&obj, &index, line)
            }
            AssignTarget::Unpack(_) => Err(RunError::type_error(
                "augmented assignment target must be a single name, attribute or subscript",
            )),
        }
    }

    fn delete_target(&mut self, target: &AssignTarget, scope: &Scope) -> RunResult<()> {
        match target {
            AssignTarget::Name(name) => {
                if scope.frame.delete_local(name) {
                    Ok(())
                } else {
                    Err(RunError::name_error(name))
                }
            }
            AssignTarget::Attr { value, name } => {
                let obj = self.eval(value, scope)?;
                self.del_attr(&obj, name)
            }
            AssignTarget::Subscript { value, index } => {
                let obj = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                self.del_item(&obj, &index, value.line)
            }
            AssignTarget::Unpack(items) => {
                for item in items {
                    match item {
                        UnpackItem::Target(t) | UnpackItem::Starred(t) => self.delete_target(t, scope)?,
                    }
                }
                Ok(())
            }
        }
    }

    // ---- misc helpers -------------------------------------------------------

    fn truthy(&mut self, condition: &ExprLoc, scope: &Scope) -> RunResult<bool> {
        let value = self.eval(condition, scope)?;
        self.value_truthy(&value)
    }

    /// Truthiness with `__bool__`/`__len__` dunder support.
    pub(crate) fn value_truthy(&mut self, value: &Value) -> RunResult<bool> {
        if let Value::Instance(_) = value {
            if let Some(result) = self.try_dunder(value, "__bool__", vec![])? {
                let Value::Bool(b) = result else {
                    return Err(RunError::type_error(format!(
                        "__bool__ should return bool, returned {}",
                        result.type_name()
                    )));
                };
                return Ok(b);
            }
            if let Some(result) = self.try_dunder(value, "__len__", vec![])? {
                return Ok(result.as_index().is_some_and(|n| n != 0));
            }
            return Ok(true);
        }
        Ok(value.is_truthy())
    }

    /// The `yield` rendezvous; errors outside a generator body.
    pub(crate) fn do_yield(&mut self, value: Value) -> RunResult<Value> {
        // the clock keeps running: an in-script consumer is still compute
        match &self.yield_port {
            Some(port) => port.emit(value),
            None => Err(RunError::raise(
                ExcType::SyntaxError,
                "'yield' outside a function",
            )),
        }
    }
}

impl RunError {
    /// Attaches a line to a raised exception if it has none yet.
    pub(crate) fn into_with_line(self, line: u32) -> Self {
        match self {
            Self::Raise(raised) => Self::Raise(Box::new(raised.with_line(line))),
            other => other,
        }
    }
}

