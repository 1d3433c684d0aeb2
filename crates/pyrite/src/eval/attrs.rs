//! Attribute access: instances, classes, modules, builtin method tables.

use std::sync::Arc;

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    types::{dict_ops, file, list_ops, set_ops, str_ops},
    value::{BoundMethod, NativeMethod, Value, plock},
};

impl Evaluator {
    pub(crate) fn get_attr(&mut self, value: &Value, name: &str, line: u32) -> RunResult<Value> {
        match value {
            Value::Instance(inst) => {
                if let Some(v) = plock(&inst.attrs).get(name).cloned() {
                    return Ok(v);
                }
                if let Some(v) = inst.class.lookup(name) {
                    return Ok(match v {
                        Value::Function(_) | Value::Native(_) => Value::BoundMethod(Arc::new(BoundMethod {
                            recv: value.clone(),
                            func: v,
                        })),
                        other => other,
                    });
                }
                Err(RunError::raise(
                    ExcType::AttributeError,
                    format!("'{}' object has no attribute '{name}'", inst.class.name),
                ))
            }
            Value::Class(class) => {
                if name == "__name__" {
                    return Ok(Value::str(class.name.to_string()));
                }
                class.lookup(name).ok_or_else(|| {
                    RunError::raise(
                        ExcType::AttributeError,
                        format!("type object '{}' has no attribute '{name}'", class.name),
                    )
                })
            }
            Value::Module(module) => self.module_attr(value, name).ok_or_else(|| {
                RunError::raise(
                    ExcType::AttributeError,
                    format!("module '{}' has no attribute '{name}'", module.name),
                )
            }),
            Value::Super(sup) => self.super_getattr(sup, name),
            Value::Str(_) => method_or_missing(value, name, str_ops::method(name), "str"),
            Value::List(_) => method_or_missing(value, name, list_ops::method(name), "list"),
            Value::Dict(_) => method_or_missing(value, name, dict_ops::method(name), "dict"),
            Value::Set(_) => method_or_missing(value, name, set_ops::method(name), "set"),
            Value::Tuple(_) => method_or_missing(value, name, list_ops::tuple_method(name), "tuple"),
            Value::File(_) => method_or_missing(value, name, file::method(name), "file"),
            Value::Generator(generator) => match name {
                "close" => Ok(native_method(value, name, generator_close)),
                "send" => Ok(native_method(value, name, generator_send)),
                "__next__" => Ok(native_method(value, name, generator_dunder_next)),
                "__iter__" => Ok(native_method(value, name, identity_iter)),
                _ => Err(RunError::raise(
                    ExcType::AttributeError,
                    format!("'generator' object has no attribute '{name}'"),
                )),
            },
            Value::Range(range) => match name {
                "start" => Ok(Value::Int(range.start)),
                "stop" => Ok(Value::Int(range.stop)),
                "step" => Ok(Value::Int(range.step)),
                _ => Err(RunError::raise(
                    ExcType::AttributeError,
                    format!("'range' object has no attribute '{name}'"),
                )),
            },
            other => {
                let _ = line;
                Err(RunError::raise(
                    ExcType::AttributeError,
                    format!("'{}' object has no attribute '{name}'", other.type_name()),
                ))
            }
        }
    }

    pub(crate) fn set_attr(&mut self, value: &Value, name: &str, new_value: Value) -> RunResult<()> {
        match value {
            Value::Instance(inst) => {
                plock(&inst.attrs).insert(Arc::from(name), new_value);
                Ok(())
            }
            Value::Class(class) => {
                plock(&class.attrs).insert(Arc::from(name), new_value);
                Ok(())
            }
            Value::Module(module) => {
                plock(&module.namespace).insert(Arc::from(name), new_value);
                Ok(())
            }
            other => Err(RunError::raise(
                ExcType::AttributeError,
                format!("'{}' object attributes are read-only", other.type_name()),
            )),
        }
    }

    pub(crate) fn del_attr(&mut self, value: &Value, name: &str) -> RunResult<()> {
        match value {
            Value::Instance(inst) => {
                if plock(&inst.attrs).shift_remove(name).is_some() {
                    Ok(())
                } else {
                    Err(RunError::raise(
                        ExcType::AttributeError,
                        format!("'{}' object has no attribute '{name}'", inst.class.name),
                    ))
                }
            }
            other => Err(RunError::raise(
                ExcType::AttributeError,
                format!("'{}' object attributes are read-only", other.type_name()),
            )),
        }
    }

    /// Module attribute lookup (shared by `from x import y` and `x.y`).
    pub(crate) fn module_attr(&self, module: &Value, name: &str) -> Option<Value> {
        let Value::Module(module) = module else {
            return None;
        };
        plock(&module.namespace).get(name).cloned()
    }
}

fn method_or_missing(
    recv: &Value,
    name: &str,
    method: Option<crate::value::MethodFn>,
    type_name: &str,
) -> RunResult<Value> {
    match method {
        Some(imp) => Ok(Value::NativeMethod(Arc::new(NativeMethod {
            name: Arc::from(name),
            recv: recv.clone(),
            imp,
        }))),
        None => Err(RunError::raise(
            ExcType::AttributeError,
            format!("'{type_name}' object has no attribute '{name}'"),
        )),
    }
}

fn native_method(recv: &Value, name: &str, imp: crate::value::MethodFn) -> Value {
    Value::NativeMethod(Arc::new(NativeMethod {
        name: Arc::from(name),
        recv: recv.clone(),
        imp,
    }))
}

fn generator_close(
    _ev: &mut Evaluator,
    recv: &Value,
    _pos: Vec<Value>,
    _kw: Vec<(String, Value)>,
) -> RunResult<Value> {
    if let Value::Generator(generator) = recv {
        generator.close();
    }
    Ok(Value::None)
}

fn generator_send(ev: &mut Evaluator, recv: &Value, mut pos: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let Value::Generator(generator) = recv else {
        return Err(RunError::type_error("send() requires a generator"));
    };
    let sent = if pos.is_empty() { Value::None } else { pos.remove(0) };
    let _ = ev;
    match generator.resume_with(sent)? {
        Some(value) => Ok(value),
        None => Err(RunError::stop_iteration()),
    }
}

fn generator_dunder_next(
    _ev: &mut Evaluator,
    recv: &Value,
    _pos: Vec<Value>,
    _kw: Vec<(String, Value)>,
) -> RunResult<Value> {
    let Value::Generator(generator) = recv else {
        return Err(RunError::type_error("__next__() requires a generator"));
    };
    match generator.next()? {
        Some(value) => Ok(value),
        None => Err(RunError::stop_iteration()),
    }
}

fn identity_iter(_ev: &mut Evaluator, recv: &Value, _pos: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Ok(recv.clone())
}
