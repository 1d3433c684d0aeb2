//! Calling: user functions, natives, bound methods, classes, generators.

use std::sync::Arc;

use ahash::AHashSet;

use crate::{
    ctx::{EventKind, EventPayload},
    env::{Frame, FrameKind},
    eval::{Evaluator, Flow, MAX_RECURSION_DEPTH, Scope},
    exceptions::{ExcType, RunError, RunResult},
    expressions::{FuncDef, Params},
    generator::GeneratorValue,
    object::Object,
    value::{
        BoundMethod, DictData, FunctionValue, Key, NativeImpl, Value, plock,
    },
};

impl Evaluator {
    /// Builds a function value from a `def` (decorators applied by the caller).
    pub(crate) fn make_function(&mut self, def: &FuncDef, scope: &Scope) -> RunResult<Value> {
        let defaults = self.eval_param_defaults(&def.params, scope)?;
        // the local-name set covers assignments and parameters
        let mut assigned: AHashSet<Arc<str>> = (*def.assigned).clone();
        for name in def.params.names() {
            assigned.insert(name.clone());
        }
        let mut annotations = Vec::new();
        for param in def.params.args.iter().chain(def.params.kw_only.iter()) {
            if let Some(ann) = &param.annotation {
                annotations.push((param.name.clone(), ann.clone()));
            }
        }
        Ok(Value::Function(Arc::new(FunctionValue {
            name: def.name.clone(),
            params: def.params.clone(),
            body: def.body.clone(),
            assigned: Arc::new(assigned),
            closure: scope.frame.closure_base(),
            defaults,
            is_generator: def.is_generator,
            annotations,
            defining_class: std::sync::Mutex::new(None),
        })))
    }

    pub(crate) fn eval_param_defaults(&mut self, params: &Params, scope: &Scope) -> RunResult<Vec<(Arc<str>, Value)>> {
        let mut defaults = Vec::new();
        for param in params.args.iter().chain(params.kw_only.iter()) {
            if let Some(default) = &param.default {
                let value = self.eval(default, scope)?;
                defaults.push((param.name.clone(), value));
            }
        }
        Ok(defaults)
    }

    /// The central call dispatcher.
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        pos: Vec<Value>,
        kw: Vec<(String, Value)>,
        line: u32,
    ) -> RunResult<Value> {
        match callee {
            Value::Function(func) => self.call_user_function(func, pos, kw, line),
            Value::Builtin(builtin) => crate::builtins::call(self, *builtin, pos, kw, line),
            Value::Native(native) => match &native.imp {
                NativeImpl::Fixed(f) => {
                    if let Some((name, _)) = kw.first() {
                        return Err(RunError::type_error(format!(
                            "{}() got an unexpected keyword argument '{name}'",
                            native.name
                        )));
                    }
                    f(self, pos)
                }
                NativeImpl::Kw(f) => f(self, pos, kw),
                NativeImpl::Host(f) => {
                    let args: Vec<Object> = pos.iter().map(|v| self.to_object(v)).collect();
                    if let Some((name, _)) = kw.first() {
                        return Err(RunError::type_error(format!(
                            "{}() got an unexpected keyword argument '{name}'",
                            native.name
                        )));
                    }
                    match f(&args) {
                        Ok(result) => self.from_object(&result),
                        Err(message) => Err(RunError::runtime_error(message)),
                    }
                }
                NativeImpl::HostKw(f) => {
                    let args: Vec<Object> = pos.iter().map(|v| self.to_object(v)).collect();
                    let kwargs: Vec<(String, Object)> =
                        kw.iter().map(|(k, v)| (k.clone(), self.to_object(v))).collect();
                    match f(&args, &kwargs) {
                        Ok(result) => self.from_object(&result),
                        Err(message) => Err(RunError::runtime_error(message)),
                    }
                }
            },
            Value::NativeMethod(method) => {
                let recv = method.recv.clone();
                (method.imp)(self, &recv, pos, kw)
            }
            Value::BoundMethod(bound) => {
                let mut all = Vec::with_capacity(pos.len() + 1);
                all.push(bound.recv.clone());
                all.extend(pos);
                self.call_value(&bound.func, all, kw, line)
            }
            Value::Class(class) => self.instantiate(class, pos, kw, line),
            Value::Instance(_) => {
                if let Some(result) = self.try_dunder_kw(callee, "__call__", pos, kw)? {
                    return Ok(result);
                }
                Err(RunError::type_error(format!(
                    "'{}' object is not callable",
                    callee.type_name()
                )))
            }
            other => Err(RunError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn try_dunder_kw(
        &mut self,
        value: &Value,
        name: &str,
        pos: Vec<Value>,
        kw: Vec<(String, Value)>,
    ) -> RunResult<Option<Value>> {
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
        self.call_value(&bound, pos, kw, 0).map(Some)
    }

    pub(crate) fn call_user_function(
        &mut self,
        func: &Arc<FunctionValue>,
        pos: Vec<Value>,
        kw: Vec<(String, Value)>,
        line: u32,
    ) -> RunResult<Value> {
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RunError::raise(
                ExcType::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let frame = Frame::child(&func.closure, FrameKind::Function);
        let self_value = pos.first().cloned();
        self.bind_args(func, pos, kw, &frame)?;

        if func.is_generator {
            return Ok(Value::Generator(Arc::new(GeneratorValue::new(
                func.name.clone(),
                func.clone(),
                frame,
                self.ctx.clone(),
            ))));
        }

        self.ctx
            .record(EventKind::CallEnter, EventPayload::Name(func.name.to_string()))?;
        let defining_class = plock(&func.defining_class).as_ref().and_then(std::sync::Weak::upgrade);
        let pushed_method = match (defining_class, self_value) {
            (Some(class), Some(receiver)) => {
                self.method_stack.push((class, receiver));
                true
            }
            _ => false,
        };

        self.depth += 1;
        let scope = Scope::function(frame, func.assigned.clone());
        let result = self.exec_block(&func.body, &scope);
        self.depth -= 1;
        if pushed_method {
            self.method_stack.pop();
        }

        let value = match result {
            Ok(Flow::Return(value)) => value,
            Ok(_) => Value::None,
            Err(err) => return Err(err.into_with_line(line)),
        };
        self.ctx
            .record(EventKind::CallExit, EventPayload::Name(func.name.to_string()))?;
        Ok(value)
    }

    /// Binds call arguments into the call frame per the parameter list.
    pub(crate) fn bind_args(
        &mut self,
        func: &Arc<FunctionValue>,
        pos: Vec<Value>,
        kw: Vec<(String, Value)>,
        frame: &Arc<Frame>,
    ) -> RunResult<()> {
        let params = &func.params;
        let name = &func.name;
        let mut pos_iter = pos.into_iter();
        let mut kw: Vec<(String, Value)> = kw;
        let default_of = |param: &Arc<str>| -> Option<Value> {
            func.defaults
                .iter()
                .find(|(n, _)| n == param)
                .map(|(_, v)| v.clone())
        };

        for param in &params.args {
            if let Some(value) = pos_iter.next() {
                // positional wins; a duplicate keyword is an error
                if kw.iter().any(|(k, _)| k.as_str() == &*param.name) {
                    return Err(RunError::type_error(format!(
                        "{name}() got multiple values for argument '{}'",
                        param.name
                    )));
                }
                frame.set_local(param.name.clone(), value);
                continue;
            }
            if let Some(idx) = kw.iter().position(|(k, _)| k.as_str() == &*param.name) {
                let (_, value) = kw.remove(idx);
                frame.set_local(param.name.clone(), value);
                continue;
            }
            if let Some(default) = default_of(&param.name) {
                frame.set_local(param.name.clone(), default);
                continue;
            }
            return Err(RunError::type_error(format!(
                "{name}() missing required argument: '{}'",
                param.name
            )));
        }

        let extra_pos: Vec<Value> = pos_iter.collect();
        match (&params.var_args, extra_pos.is_empty()) {
            (Some(var_args), _) => {
                frame.set_local(var_args.clone(), Value::tuple(extra_pos));
            }
            (None, false) => {
                return Err(RunError::type_error(format!(
                    "{name}() takes {} positional argument{} but {} were given",
                    params.args.len(),
                    if params.args.len() == 1 { "" } else { "s" },
                    params.args.len() + extra_pos.len(),
                )));
            }
            (None, true) => {}
        }

        for param in &params.kw_only {
            if let Some(idx) = kw.iter().position(|(k, _)| k.as_str() == &*param.name) {
                let (_, value) = kw.remove(idx);
                frame.set_local(param.name.clone(), value);
                continue;
            }
            if let Some(default) = default_of(&param.name) {
                frame.set_local(param.name.clone(), default);
                continue;
            }
            return Err(RunError::type_error(format!(
                "{name}() missing required keyword-only argument: '{}'",
                param.name
            )));
        }

        match (&params.var_kwargs, kw.is_empty()) {
            (Some(var_kwargs), _) => {
                let mut data = DictData::default();
                for (k, v) in kw {
                    data.insert(Key::new(Value::str(k))?, v);
                }
                frame.set_local(var_kwargs.clone(), Value::dict(data));
            }
            (None, false) => {
                let (unexpected, _) = &kw[0];
                return Err(RunError::type_error(format!(
                    "{name}() got an unexpected keyword argument '{unexpected}'"
                )));
            }
            (None, true) => {}
        }
        Ok(())
    }
}
