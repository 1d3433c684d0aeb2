//! `repr()` / `str()` rendering, cycle-safe and dunder-aware.

use ahash::AHashSet;

use crate::{
    eval::Evaluator,
    exceptions::RunResult,
    value::{Value, float_repr, int_repr, plock, str_repr},
};

impl Evaluator {
    pub(crate) fn repr_value(&mut self, value: &Value) -> RunResult<String> {
        let mut visited = AHashSet::new();
        self.repr_inner(value, &mut visited)
    }

    pub(crate) fn str_value(&mut self, value: &Value) -> RunResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Instance(inst) => {
                if inst.class.lookup("__str__").is_some() {
                    let result = self.call_method(value, "__str__", vec![], 0)?;
                    return self.str_value(&result);
                }
                // exception instances read as "Type: message" via their args
                if inst.class.exc_type().is_some() {
                    return self.exception_message(value);
                }
                self.repr_value(value)
            }
            other => self.repr_value(other),
        }
    }

    fn repr_inner(&mut self, value: &Value, visited: &mut AHashSet<usize>) -> RunResult<String> {
        match value {
            Value::None => Ok("None".to_owned()),
            Value::Bool(true) => Ok("True".to_owned()),
            Value::Bool(false) => Ok("False".to_owned()),
            Value::Int(_) | Value::BigInt(_) => Ok(int_repr(value).unwrap_or_default()),
            Value::Float(f) => Ok(float_repr(*f)),
            Value::Str(s) => Ok(str_repr(s)),
            Value::List(items) => {
                let ptr = std::sync::Arc::as_ptr(items) as usize;
                if !visited.insert(ptr) {
                    return Ok("[...]".to_owned());
                }
                let snapshot = plock(items).clone();
                let mut parts = Vec::with_capacity(snapshot.len());
                for item in &snapshot {
                    parts.push(self.repr_inner(item, visited)?);
                }
                visited.remove(&ptr);
                Ok(format!("[{}]", parts.join(", ")))
            }
            Value::Tuple(items) => {
                let ptr = items.as_ptr() as usize;
                if !visited.insert(ptr) {
                    return Ok("(...)".to_owned());
                }
                let mut parts = Vec::with_capacity(items.len());
                for item in items.iter() {
                    parts.push(self.repr_inner(item, visited)?);
                }
                visited.remove(&ptr);
                if parts.len() == 1 {
                    Ok(format!("({},)", parts[0]))
                } else {
                    Ok(format!("({})", parts.join(", ")))
                }
            }
            Value::Dict(d) => {
                let ptr = std::sync::Arc::as_ptr(d) as usize;
                if !visited.insert(ptr) {
                    return Ok("{...}".to_owned());
                }
                let snapshot = plock(d).clone();
                let mut parts = Vec::with_capacity(snapshot.len());
                for (key, val) in &snapshot {
                    let k = self.repr_inner(&key.value, visited)?;
                    let v = self.repr_inner(val, visited)?;
                    parts.push(format!("{k}: {v}"));
                }
                visited.remove(&ptr);
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            Value::Set(s) => {
                let ptr = std::sync::Arc::as_ptr(s) as usize;
                if !visited.insert(ptr) {
                    return Ok("{...}".to_owned());
                }
                let snapshot = plock(s).clone();
                if snapshot.is_empty() {
                    visited.remove(&ptr);
                    return Ok("set()".to_owned());
                }
                let mut parts = Vec::with_capacity(snapshot.len());
                for key in &snapshot {
                    parts.push(self.repr_inner(&key.value, visited)?);
                }
                visited.remove(&ptr);
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            Value::Range(r) => {
                if r.step == 1 {
                    Ok(format!("range({}, {})", r.start, r.stop))
                } else {
                    Ok(format!("range({}, {}, {})", r.start, r.stop, r.step))
                }
            }
            Value::Instance(inst) => {
                if inst.class.lookup("__repr__").is_some() {
                    let result = self.call_method(value, "__repr__", vec![], 0)?;
                    return self.str_value(&result);
                }
                if inst.class.exc_type().is_some() {
                    let message = self.exception_message(value)?;
                    return Ok(format!("{}({})", inst.class.name, str_repr(&message)));
                }
                Ok(format!("<{} object>", inst.class.name))
            }
            Value::Function(func) => Ok(format!("<function {}>", func.name)),
            Value::BoundMethod(bound) => match &bound.func {
                Value::Function(func) => Ok(format!("<bound method {}>", func.name)),
                _ => Ok("<bound method>".to_owned()),
            },
            Value::Builtin(builtin) => Ok(format!("<built-in function {builtin}>")),
            Value::Native(native) => Ok(format!("<built-in function {}>", native.name)),
            Value::NativeMethod(method) => Ok(format!("<built-in method {}>", method.name)),
            Value::Class(class) => Ok(format!("<class '{}'>", class.name)),
            Value::Generator(generator) => Ok(format!("<generator object {}>", generator.name)),
            Value::Iterator(_) => Ok("<iterator>".to_owned()),
            Value::Module(module) => Ok(format!("<module '{}'>", module.name)),
            Value::File(file) => {
                let handle = plock(file);
                Ok(format!("<file '{}'>", handle.path))
            }
            Value::Super(_) => Ok("<super>".to_owned()),
        }
    }
}
