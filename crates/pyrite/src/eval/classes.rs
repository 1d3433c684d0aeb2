//! Class definition, instantiation, exception materialisation, `super()`.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::{
    env::{Frame, FrameKind},
    eval::{Evaluator, Scope},
    exceptions::{ExcType, Raised, RunError, RunResult},
    expressions::{ClassDef, Stmt},
    value::{
        AttrTable, BoundMethod, ClassValue, InstanceValue, SuperValue, Value, plock,
    },
    types::class_table::new_user_class,
};

impl Evaluator {
    /// Evaluates a `class` statement: runs the body in a class frame, builds
    /// the class value (MRO computed here, at definition time), applies
    /// decorators.
    pub(crate) fn exec_class_def(&mut self, def: &ClassDef, scope: &Scope) -> RunResult<Value> {
        let mut bases = Vec::new();
        for base_expr in &def.bases {
            let base = self.eval(base_expr, scope)?;
            let Value::Class(base_class) = base else {
                return Err(RunError::type_error(format!(
                    "class '{}' base must be a class, not '{}'",
                    def.name,
                    base.type_name()
                )));
            };
            bases.push(base_class);
        }

        let class_frame = Frame::child(&scope.frame, FrameKind::Class);
        let class_scope = Scope {
            frame: class_frame.clone(),
            locals: None,
        };
        self.exec_block(&def.body, &class_scope)?;

        let mut attrs: AttrTable = IndexMap::default();
        for (name, value) in class_frame.bindings() {
            attrs.insert(name, value);
        }

        // class-body `name: annotation` declarations become field specs
        let mut annotations = Vec::new();
        for stmt in def.body.iter() {
            if let Stmt::AnnAssign { target, annotation, .. } = &stmt.stmt {
                if let crate::expressions::AssignTarget::Name(name) = target {
                    annotations.push((name.clone(), annotation.clone()));
                }
            }
        }

        let class = new_user_class(
            def.name.clone(),
            bases,
            attrs,
            annotations,
            &self.ctx.inner.classes.object,
        )
        .map_err(RunError::type_error)?;

        // tag methods with their defining class for zero-argument super()
        for value in plock(&class.attrs).values() {
            if let Value::Function(func) = value {
                *plock(&func.defining_class) = Some(Arc::downgrade(&class));
            }
        }

        let mut result = Value::Class(class);
        for decorator in def.decorators.iter().rev() {
            let dec = self.eval(decorator, scope)?;
            result = self.call_value(&dec, vec![result], Vec::new(), decorator.line)?;
        }
        Ok(result)
    }

    /// Calls a class: builtin type constructors, exception construction, or
    /// user instantiation via `__init__`.
    pub(crate) fn instantiate(
        &mut self,
        class: &Arc<ClassValue>,
        pos: Vec<Value>,
        kw: Vec<(String, Value)>,
        line: u32,
    ) -> RunResult<Value> {
        if let Some(tag) = class.type_tag() {
            return crate::builtins::construct_type(self, tag, pos, kw, line);
        }

        let instance = Value::Instance(Arc::new(InstanceValue {
            class: class.clone(),
            attrs: Mutex::new(AttrTable::default()),
        }));

        match class.lookup("__init__") {
            Some(init) => {
                let bound = Value::BoundMethod(Arc::new(BoundMethod {
                    recv: instance.clone(),
                    func: init,
                }));
                let result = self.call_value(&bound, pos, kw, line)?;
                if !matches!(result, Value::None) {
                    return Err(RunError::type_error(format!(
                        "__init__() should return None, not '{}'",
                        result.type_name()
                    )));
                }
            }
            None => {
                if !pos.is_empty() || !kw.is_empty() {
                    return Err(RunError::type_error(format!(
                        "{}() takes no arguments",
                        class.name
                    )));
                }
            }
        }
        Ok(instance)
    }

    /// `isinstance` core: the value's class against one target class.
    pub(crate) fn value_isinstance(&self, value: &Value, target: &Arc<ClassValue>) -> bool {
        let class = self.ctx.inner.classes.class_of(value);
        class.is_subclass(target)
    }

    // ---- exceptions ---------------------------------------------------------

    /// Converts a raise operand (class or instance) into a propagating error.
    pub(crate) fn raise_value(&mut self, value: Value, line: u32) -> RunResult<RunError> {
        let instance = match &value {
            Value::Class(class) if class.exc_type().is_some() => {
                self.instantiate(class, vec![], vec![], line)?
            }
            Value::Class(class) => {
                // a plain class that is not an exception type
                return Err(RunError::type_error(format!(
                    "exceptions must derive from Exception, not '{}'",
                    class.name
                )));
            }
            Value::Instance(inst) => {
                if inst.class.exc_type().is_none() {
                    return Err(RunError::type_error(format!(
                        "exceptions must derive from Exception, not '{}'",
                        inst.class.name
                    )));
                }
                value.clone()
            }
            other => {
                return Err(RunError::type_error(format!(
                    "exceptions must derive from Exception, not '{}'",
                    other.type_name()
                )));
            }
        };
        let Value::Instance(inst) = &instance else { unreachable!() };
        let type_name = inst.class.name.to_string();
        let message = self.exception_message(&instance)?;
        Ok(RunError::Raise(Box::new(Raised {
            value: instance,
            type_name,
            message,
            line: Some(line),
        })))
    }

    /// `str(e)` rendering: no args -> "", one arg -> str(arg), otherwise a
    /// comma-joined tuple rendering.
    pub(crate) fn exception_message(&mut self, instance: &Value) -> RunResult<String> {
        let Value::Instance(inst) = instance else {
            return Ok(String::new());
        };
        let args = plock(&inst.attrs).get("args").cloned();
        match args {
            Some(Value::Tuple(items)) => match items.len() {
                0 => Ok(String::new()),
                1 => self.str_value(&items[0]),
                _ => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items.iter() {
                        parts.push(self.repr_value(item)?);
                    }
                    Ok(format!("({})", parts.join(", ")))
                }
            },
            _ => Ok(String::new()),
        }
    }

    /// The class of a raised exception: the instance's class, or the builtin
    /// class matching the recorded type name for lazily-built raises.
    pub(crate) fn exception_class_of(&self, raised: &Raised) -> Arc<ClassValue> {
        if let Value::Instance(inst) = &raised.value {
            return inst.class.clone();
        }
        match raised.type_name.parse::<ExcType>() {
            Ok(exc_type) => self.ctx.inner.classes.exc_class(exc_type),
            Err(_) => self.ctx.inner.classes.exc_class(ExcType::Exception),
        }
    }

    /// Ensures a raised exception has a real instance value (native raises
    /// carry only type + message until user code observes them).
    pub(crate) fn materialize_exception(&mut self, raised: &Raised) -> Value {
        if let Value::Instance(_) = &raised.value {
            return raised.value.clone();
        }
        let class = self.exception_class_of(raised);
        let mut attrs = AttrTable::default();
        let args = if raised.message.is_empty() {
            Vec::new()
        } else {
            vec![Value::str(raised.message.clone())]
        };
        attrs.insert(Arc::from("args"), Value::tuple(args));
        Value::Instance(Arc::new(InstanceValue {
            class,
            attrs: Mutex::new(attrs),
        }))
    }

    // ---- super --------------------------------------------------------------

    /// Zero-argument `super()`: uses the innermost method call context.
    pub(crate) fn make_super(&mut self) -> RunResult<Value> {
        let Some((class, receiver)) = self.method_stack.last().cloned() else {
            return Err(RunError::runtime_error(
                "super(): no arguments and no enclosing method call",
            ));
        };
        Ok(Value::Super(Arc::new(SuperValue {
            class,
            instance: receiver,
        })))
    }

    /// Attribute lookup on a `super()` proxy: continue the instance's MRO
    /// after the declaring class, binding functions to the instance.
    pub(crate) fn super_getattr(&mut self, sup: &SuperValue, name: &str) -> RunResult<Value> {
        let instance_class = self.ctx.inner.classes.class_of(&sup.instance);
        // full resolution order of the instance's class: itself, then mro
        let mut order: Vec<Arc<ClassValue>> = Vec::with_capacity(instance_class.mro.len() + 1);
        order.push(instance_class.clone());
        order.extend(instance_class.mro.iter().cloned());
        let start = order
            .iter()
            .position(|c| Arc::ptr_eq(c, &sup.class))
            .map_or(0, |i| i + 1);
        for class in &order[start..] {
            if let Some(value) = plock(&class.attrs).get(name).cloned() {
                return Ok(match value {
                    Value::Function(_) | Value::Native(_) => Value::BoundMethod(Arc::new(BoundMethod {
                        recv: sup.instance.clone(),
                        func: value,
                    })),
                    other => other,
                });
            }
        }
        Err(RunError::raise(
            ExcType::AttributeError,
            format!("'super' object has no attribute '{name}'"),
        ))
    }
}
