//! Expression evaluation.

use std::sync::Arc;

use crate::{
    env::{Frame, FrameKind},
    eval::{Evaluator, Scope},
    exceptions::{ExcType, RunError, RunResult},
    expressions::{
        BinOp, BoolOpKind, CallArg, CmpOp, CompClause, DictItem, Expr, ExprLoc, Literal, UnaryOp,
    },
    fstring,
    generator::GeneratorValue,
    value::{
        BoundMethod, DictData, FunctionValue, Key, SetData, Value, as_number, binary_op, plock, py_cmp, py_eq,
    },
};

impl Evaluator {
    pub(crate) fn eval(&mut self, expr: &ExprLoc, scope: &Scope) -> RunResult<Value> {
        let line = expr.line;
        self.eval_inner(expr, scope).map_err(|e| e.into_with_line(line))
    }

    fn eval_inner(&mut self, expr: &ExprLoc, scope: &Scope) -> RunResult<Value> {
        match &expr.expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Name(name) => self.read_name(name, scope, expr.line),
            Expr::BinOp { left, op, right } => {
                let lhs = self.eval(left, scope)?;
                let rhs = self.eval(right, scope)?;
                self.binary(*op, &lhs, &rhs, expr.line)
            }
            Expr::UnaryOp { op, operand } => {
                let value = self.eval(operand, scope)?;
                self.unary(*op, &value)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for (i, value_expr) in values.iter().enumerate() {
                    last = self.eval(value_expr, scope)?;
                    if i + 1 == values.len() {
                        break;
                    }
                    let truthy = self.value_truthy(&last)?;
                    match op {
                        BoolOpKind::And if !truthy => return Ok(last),
                        BoolOpKind::Or if truthy => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first, scope)?;
                for (op, right_expr) in rest {
                    let right = self.eval(right_expr, scope)?;
                    if !self.compare(*op, &left, &right, right_expr.line)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { callee, args } => {
                let callee_value = self.eval(callee, scope)?;
                let (pos, kw) = self.eval_call_args(args, scope)?;
                self.call_value(&callee_value, pos, kw, expr.line)
            }
            Expr::Attr { value, name } => {
                let obj = self.eval(value, scope)?;
                self.get_attr(&obj, name, expr.line)
            }
            Expr::Subscript { value, index } => {
                let obj = self.eval(value, scope)?;
                if let Expr::Slice { lower, upper, step } = &index.expr {
                    let lower = self.eval_opt(lower.as_deref(), scope)?;
                    let upper = self.eval_opt(upper.as_deref(), scope)?;
                    let step = self.eval_opt(step.as_deref(), scope)?;
                    return self.get_slice(&obj, &lower, &upper, &step, expr.line);
                }
                let index = self.eval(index, scope)?;
                self.get_item(&obj, &index, expr.line)
            }
            Expr::Slice { .. } => Err(RunError::raise(
                ExcType::SyntaxError,
                "slice is not allowed outside subscripts",
            )),
            Expr::List(items) => Ok(Value::list(self.eval_elements(items, scope)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_elements(items, scope)?)),
            Expr::Set(items) => {
                let mut data = SetData::default();
                for item in self.eval_elements(items, scope)? {
                    data.insert(Key::new(item)?);
                }
                Ok(Value::set(data))
            }
            Expr::Dict(items) => {
                let mut data = DictData::default();
                for item in items {
                    match item {
                        DictItem::Pair(k, v) => {
                            let key = self.eval(k, scope)?;
                            let value = self.eval(v, scope)?;
                            data.insert(Key::new(key)?, value);
                        }
                        DictItem::DoubleStar(mapping) => {
                            let mapping = self.eval(mapping, scope)?;
                            let Value::Dict(d) = &mapping else {
                                return Err(RunError::type_error(format!(
                                    "argument after ** must be a mapping, not {}",
                                    mapping.type_name()
                                )));
                            };
                            for (k, v) in plock(d).iter() {
                                data.insert(k.clone(), v.clone());
                            }
                        }
                    }
                }
                Ok(Value::dict(data))
            }
            Expr::Starred(_) => Err(RunError::raise(
                ExcType::SyntaxError,
                "starred expression is not allowed here",
            )),
            Expr::ListComp { elt, clauses } => {
                let comp_scope = self.comprehension_scope(scope);
                let mut out = Vec::new();
                self.run_comp(clauses, &comp_scope, &mut |ev, s| {
                    out.push(ev.eval(elt, s)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Expr::SetComp { elt, clauses } => {
                let comp_scope = self.comprehension_scope(scope);
                let mut data = SetData::default();
                self.run_comp(clauses, &comp_scope, &mut |ev, s| {
                    let item = ev.eval(elt, s)?;
                    data.insert(Key::new(item)?);
                    Ok(())
                })?;
                Ok(Value::set(data))
            }
            Expr::DictComp { key, value, clauses } => {
                let comp_scope = self.comprehension_scope(scope);
                let mut data = DictData::default();
                self.run_comp(clauses, &comp_scope, &mut |ev, s| {
                    let k = ev.eval(key, s)?;
                    let v = ev.eval(value, s)?;
                    data.insert(Key::new(k)?, v);
                    Ok(())
                })?;
                Ok(Value::dict(data))
            }
            Expr::GenExp { body } => {
                let mut assigned = ahash::AHashSet::new();
                crate::expressions::collect_assigned(body, &mut assigned);
                let func = Arc::new(FunctionValue {
                    name: Arc::from("<genexpr>"),
                    params: Arc::new(crate::expressions::Params::default()),
                    body: body.clone(),
                    assigned: Arc::new(assigned),
                    closure: scope.frame.clone(),
                    defaults: Vec::new(),
                    is_generator: true,
                    annotations: Vec::new(),
                    defining_class: std::sync::Mutex::new(None),
                });
                let frame = Frame::child(&func.closure, FrameKind::Function);
                Ok(Value::Generator(Arc::new(GeneratorValue::new(
                    func.name.clone(),
                    func.clone(),
                    frame,
                    self.ctx.clone(),
                ))))
            }
            Expr::Lambda { params, body } => {
                let mut assigned = ahash::AHashSet::new();
                for name in params.names() {
                    assigned.insert(name.clone());
                }
                let return_stmt = crate::expressions::StmtLoc {
                    stmt: crate::expressions::Stmt::Return(Some((**body).clone())),
                    line: body.line,
                };
                let defaults = self.eval_param_defaults(params, scope)?;
                Ok(Value::Function(Arc::new(FunctionValue {
                    name: Arc::from("<lambda>"),
                    params: params.clone(),
                    body: Arc::from(vec![return_stmt]),
                    assigned: Arc::new(assigned),
                    closure: scope.frame.closure_base(),
                    defaults,
                    is_generator: false,
                    annotations: Vec::new(),
                    defining_class: std::sync::Mutex::new(None),
                })))
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if self.truthy_expr(condition, scope)? {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Walrus { name, value } => {
                let value = self.eval(value, scope)?;
                self.write_name_skip_comprehension(name, value.clone(), scope)?;
                self.record_assign(name)?;
                Ok(value)
            }
            Expr::Yield(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                self.do_yield(value)
            }
            Expr::YieldFrom(inner) => {
                let iterable = self.eval(inner, scope)?;
                let iterator = self.get_iter(&iterable, inner.line)?;
                loop {
                    // inner exceptions propagate to the outer generator
                    let Some(item) = self.iter_next(&iterator, inner.line)? else {
                        break;
                    };
                    self.do_yield(item)?;
                }
                Ok(Value::None)
            }
            Expr::FString(parts) => fstring::format_fstring(self, parts, scope),
        }
    }

    fn eval_opt(&mut self, expr: Option<&ExprLoc>, scope: &Scope) -> RunResult<Value> {
        match expr {
            Some(expr) => self.eval(expr, scope),
            None => Ok(Value::None),
        }
    }

    fn truthy_expr(&mut self, expr: &ExprLoc, scope: &Scope) -> RunResult<bool> {
        let value = self.eval(expr, scope)?;
        self.value_truthy(&value)
    }

    /// Evaluates display elements, expanding `*splat`s.
    fn eval_elements(&mut self, items: &[ExprLoc], scope: &Scope) -> RunResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = &item.expr {
                let iterable = self.eval(inner, scope)?;
                let iterator = self.get_iter(&iterable, inner.line)?;
                while let Some(v) = self.iter_next(&iterator, inner.line)? {
                    out.push(v);
                }
            } else {
                out.push(self.eval(item, scope)?);
            }
        }
        Ok(out)
    }

    pub(crate) fn eval_call_args(
        &mut self,
        args: &[CallArg],
        scope: &Scope,
    ) -> RunResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut pos = Vec::new();
        let mut kw = Vec::new();
        for arg in args {
            match arg {
                CallArg::Positional(expr) => pos.push(self.eval(expr, scope)?),
                CallArg::Keyword(name, expr) => kw.push((name.clone(), self.eval(expr, scope)?)),
                CallArg::Star(expr) => {
                    let iterable = self.eval(expr, scope)?;
                    let iterator = self.get_iter(&iterable, expr.line)?;
                    while let Some(v) = self.iter_next(&iterator, expr.line)? {
                        pos.push(v);
                    }
                }
                CallArg::DoubleStar(expr) => {
                    let mapping = self.eval(expr, scope)?;
                    let Value::Dict(d) = &mapping else {
                        return Err(RunError::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            mapping.type_name()
                        )));
                    };
                    for (k, v) in plock(d).iter() {
                        let Value::Str(name) = &k.value else {
                            return Err(RunError::type_error("keywords must be strings"));
                        };
                        kw.push((name.to_string(), v.clone()));
                    }
                }
            }
        }
        Ok((pos, kw))
    }

    fn comprehension_scope(&self, scope: &Scope) -> Scope {
        Scope {
            frame: Frame::child(&scope.frame, FrameKind::Comprehension),
            locals: None,
        }
    }

    /// Walks comprehension clauses in order, calling `emit` for each element
    /// combination that survives the filters.
    fn run_comp(
        &mut self,
        clauses: &[CompClause],
        scope: &Scope,
        emit: &mut dyn FnMut(&mut Self, &Scope) -> RunResult<()>,
    ) -> RunResult<()> {
        let Some((clause, rest)) = clauses.split_first() else {
            return emit(self, scope);
        };
        match clause {
            CompClause::For { target, iter } => {
                let iterable = self.eval(iter, scope)?;
                let iterator = self.get_iter(&iterable, iter.line)?;
                loop {
                    self.ctx.check_time()?;
                    let Some(item) = self.iter_next(&iterator, iter.line)? else {
                        break;
                    };
                    self.assign_target(target, item, scope)?;
                    self.run_comp(rest, scope, emit)?;
                }
                Ok(())
            }
            CompClause::If(condition) => {
                if self.truthy_expr(condition, scope)? {
                    self.run_comp(rest, scope, emit)?;
                }
                Ok(())
            }
        }
    }

    // ---- operators ----------------------------------------------------------

    /// Binary operator with dunder dispatch for instances.
    pub(crate) fn binary(&mut self, op: BinOp, lhs: &Value, rhs: &Value, line: u32) -> RunResult<Value> {
        if matches!(lhs, Value::Instance(_)) {
            if let Some(result) = self.try_dunder(lhs, op.dunder(), vec![rhs.clone()])? {
                return Ok(result);
            }
        }
        binary_op(op, lhs, rhs).map_err(|e| e.into_with_line(line))
    }

    pub(crate) fn unary(&mut self, op: UnaryOp, value: &Value) -> RunResult<Value> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!self.value_truthy(value)?)),
            UnaryOp::Pos => match value {
                Value::Int(_) | Value::BigInt(_) | Value::Float(_) | Value::Bool(_) => Ok(value.clone()),
                _ => Err(RunError::type_error(format!(
                    "bad operand type for unary +: '{}'",
                    value.type_name()
                ))),
            },
            UnaryOp::Neg => {
                if let Value::Instance(_) = value {
                    if let Some(result) = self.try_dunder(value, "__neg__", vec![])? {
                        return Ok(result);
                    }
                }
                match value {
                    Value::Int(i) => match i.checked_neg() {
                        Some(n) => Ok(Value::Int(n)),
                        None => Ok(Value::from_bigint(-num_bigint::BigInt::from(*i))),
                    },
                    Value::BigInt(b) => Ok(Value::from_bigint(-(**b).clone())),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
                    _ => Err(RunError::type_error(format!(
                        "bad operand type for unary -: '{}'",
                        value.type_name()
                    ))),
                }
            }
            UnaryOp::Invert => match value.as_index() {
                Some(i) => Ok(Value::Int(!i)),
                None => match value {
                    Value::BigInt(b) => Ok(Value::from_bigint(!(**b).clone())),
                    _ => Err(RunError::type_error(format!(
                        "bad operand type for unary ~: '{}'",
                        value.type_name()
                    ))),
                },
            },
        }
    }

    /// One link of a comparison chain.
    pub(crate) fn compare(&mut self, op: CmpOp, lhs: &Value, rhs: &Value, line: u32) -> RunResult<bool> {
        match op {
            CmpOp::Is => Ok(lhs.is_same(rhs)),
            CmpOp::IsNot => Ok(!lhs.is_same(rhs)),
            CmpOp::Eq => self.values_equal(lhs, rhs),
            CmpOp::NotEq => Ok(!self.values_equal(lhs, rhs)?),
            CmpOp::In => self.contains(rhs, lhs, line),
            CmpOp::NotIn => Ok(!self.contains(rhs, lhs, line)?),
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
                if let Value::Instance(_) = lhs {
                    let dunder = match op {
                        CmpOp::Lt => "__lt__",
                        CmpOp::LtE => "__le__",
                        CmpOp::Gt => "__gt__",
                        _ => "__ge__",
                    };
                    if let Some(result) = self.try_dunder(lhs, dunder, vec![rhs.clone()])? {
                        return self.value_truthy(&result);
                    }
                }
                let ordering = py_cmp(lhs, rhs)?.ok_or_else(|| {
                    RunError::type_error(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        lhs.type_name(),
                        rhs.type_name()
                    ))
                    .into_with_line(line)
                })?;
                Ok(match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::LtE => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }

    /// `==` with `__eq__`/`__ne__` dunder support at the top level.
    pub(crate) fn values_equal(&mut self, lhs: &Value, rhs: &Value) -> RunResult<bool> {
        if let Value::Instance(_) = lhs {
            if let Some(result) = self.try_dunder(lhs, "__eq__", vec![rhs.clone()])? {
                return self.value_truthy(&result);
            }
        }
        if let Value::Instance(_) = rhs {
            if let Some(result) = self.try_dunder(rhs, "__eq__", vec![lhs.clone()])? {
                return self.value_truthy(&result);
            }
        }
        Ok(py_eq(lhs, rhs))
    }

    /// Membership test (`item in container`).
    pub(crate) fn contains(&mut self, container: &Value, item: &Value, line: u32) -> RunResult<bool> {
        if let Value::Instance(_) = container {
            if let Some(result) = self.try_dunder(container, "__contains__", vec![item.clone()])? {
                return self.value_truthy(&result);
            }
            // fall back to iteration
            let iterator = self.get_iter(container, line)?;
            while let Some(candidate) = self.iter_next(&iterator, line)? {
                if self.values_equal(&candidate, item)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(&**needle)),
                _ => Err(RunError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    item.type_name()
                ))),
            },
            Value::List(items) => {
                let items = plock(items).clone();
                for candidate in &items {
                    if self.values_equal(candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Tuple(items) => {
                for candidate in items.iter() {
                    if self.values_equal(candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Dict(d) => {
                let key = Key::new(item.clone())?;
                Ok(plock(d).contains_key(&key))
            }
            Value::Set(s) => {
                let key = Key::new(item.clone())?;
                Ok(plock(s).contains(&key))
            }
            Value::Range(r) => match item.as_index() {
                Some(i) => Ok(r.contains(i)),
                None => match as_number(item) {
                    Some(_) => Ok(false),
                    None => Ok(false),
                },
            },
            Value::Generator(_) | Value::Iterator(_) => {
                let iterator = container.clone();
                while let Some(candidate) = self.iter_next(&iterator, line)? {
                    if self.values_equal(&candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(RunError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Calls a dunder on an instance if its class defines it.
    pub(crate) fn try_dunder(&mut self, value: &Value, name: &str, args: Vec<Value>) -> RunResult<Option<Value>> {
        let Value::Instance(inst) = value else {
            return Ok(None);
        };
        let Some(method) = inst.class.lookup(name) else {
            return Ok(None);
        };
        let bound = Value::BoundMethod(Arc::new(BoundMethod {
            recv: value.clone(),
            func: method,
        }));
        self.call_value(&bound, args, Vec::new(), 0).map(Some)
    }

    /// Calls a named method on any value (attribute lookup + call).
    pub(crate) fn call_method(&mut self, value: &Value, name: &str, args: Vec<Value>, line: u32) -> RunResult<Value> {
        let method = self.get_attr(value, name, line)?;
        self.call_value(&method, args, Vec::new(), line)
    }

    /// Does the value expose a callable attribute (used by `with`)?
    pub(crate) fn has_attr_method(&mut self, value: &Value, name: &str) -> bool {
        match value {
            Value::Instance(inst) => inst.class.lookup(name).is_some() || plock(&inst.attrs).contains_key(name),
            Value::File(_) => matches!(name, "__enter__" | "__exit__"),
            _ => false,
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::BigInt(b) => Value::BigInt(b.clone()),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}
